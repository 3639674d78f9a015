use bincode::{Decode, Encode};

use crate::{
    apu::Apu,
    cartridge::Cartidge,
    info::*,
    log,
    macros::{in_ranges, match_range},
    ppu::Ppu,
    regs::{ActionButtons, CgbPaletteIndex, DPad, IntData, JoyPad, Key1},
    serial::Serial,
    timer::Timer,
};
#[cfg(feature = "sgb")]
use crate::sgb::Sgb;

/// The memory sub-system, contains the `Cartridge`, `Ppu`, `Timer`, `Serial`
/// and some registers, other registers are owned by components they belong to.
#[derive(Encode, Decode)]
pub(crate) struct Mmu {
    /// Is running in dual-speed(aka CGB mode).
    // This property is duplicated in all components contained in it which
    // need it, because we do not want to use `Rc` and its good enough.
    pub(crate) is_2x: bool,

    pub(crate) ppu: Ppu,
    pub(crate) apu: Apu,
    pub(crate) timer: Timer,
    pub(crate) serial: Serial,
    pub(crate) cart: Cartidge,

    // Registers and memory owned by it.
    #[bincode(with_serde)]
    pub(crate) key1: Key1,
    #[bincode(with_serde)]
    pub(crate) iflag: IntData,
    #[bincode(with_serde)]
    pub(crate) ienable: IntData,
    #[bincode(with_serde)]
    pub(crate) joypad: JoyPad,
    #[bincode(with_serde)]
    pub(crate) bgpi: CgbPaletteIndex,
    #[bincode(with_serde)]
    pub(crate) obpi: CgbPaletteIndex,
    pub(crate) opri: u8,
    pub(crate) dma: u8,
    pub(crate) wram_idx: usize,
    pub(crate) vram_idx: usize,

    hdma: Hdma,
    /// PPU mode observed at the end of the previous `tick`, used to detect
    /// the HBlank entry edge that paces an active HBlank-DMA transfer.
    was_hblank: bool,

    // First WRAM region always refers to bank-0 and
    // second WRAM region can refer to any of the 1-7 banks.
    wram: [[u8; SIZE_WRAM_BANK]; WRAM_BANKS],
    hram: [u8; SIZE_HRAM],

    #[bincode(with_serde)]
    dpad: DPad,
    #[bincode(with_serde)]
    buttons: ActionButtons,

    #[cfg(feature = "sgb")]
    sgb: Sgb,
}

/// VRAM DMA controller (HDMA1-5). General-purpose transfers (HDMA5 bit-7
/// clear) run to completion the instant HDMA5 is written. HBlank-paced
/// transfers (bit-7 set) are trickled out one 0x10-byte block per HBlank.
#[derive(Default, Encode, Decode)]
struct Hdma {
    src_hi: u8,
    src_lo: u8,
    dst_hi: u8,
    dst_lo: u8,
    /// 0x10-byte blocks left to copy in an armed HBlank transfer, including
    /// the one about to be copied on the next HBlank edge. `None` when idle.
    hblank_blocks_left: Option<u8>,
    /// Bytes already copied out of the armed transfer; advances the
    /// src/dst offsets independently of the HDMA1-4 registers.
    offset: u16,
}

impl Hdma {
    fn src(&self) -> u16 {
        (u16::from(self.src_hi) << 8 | u16::from(self.src_lo)) & 0xFFF0
    }

    fn dst(&self) -> u16 {
        0x8000 | ((u16::from(self.dst_hi) << 8 | u16::from(self.dst_lo)) & 0x1FF0)
    }
}

impl Mmu {
    pub(crate) fn new(cartd: Cartidge) -> Self {
        let mut ppu = Ppu::new();
        ppu.fetcher.is_cgb = cartd.is_cgb;
        ppu.is_super = cartd.is_sgb;

        Self {
            is_2x: false,
            cart: cartd,

            ppu,
            apu: Apu::new(),
            timer: Timer::new(),
            serial: Serial::new(),

            wram: [[0; SIZE_WRAM_BANK]; WRAM_BANKS],
            hram: [0; SIZE_HRAM],
            ienable: Default::default(),
            iflag: Default::default(),
            key1: Default::default(),
            joypad: Default::default(),
            bgpi: Default::default(),
            obpi: Default::default(),
            wram_idx: 1,
            vram_idx: 0,
            opri: 0,
            dma: 0,
            hdma: Default::default(),
            was_hblank: false,

            dpad: Default::default(),
            buttons: Default::default(),

            #[cfg(feature = "sgb")]
            sgb: Sgb::new(),
        }
    }

    pub(crate) fn tick(&mut self, mcycles: u32) {
        // Dual-speed mode does not change PPU or Audio speed.
        let dots = if self.is_2x { mcycles * 2 } else { mcycles * 4 };

        let intr = self.ppu.tick(dots as u16);
        self.add_interrupt(intr);

        let in_hblank = self.get_mode() == MODE_HBLANK;
        if in_hblank && !self.was_hblank {
            self.step_hdma_hblank();
        }
        self.was_hblank = in_hblank;

        if self.timer.tick(mcycles as u16) {
            self.iflag.timer = 1;
        }

        if self.serial.tick(mcycles as u16, self.cart.is_cgb) {
            self.iflag.serial = 1;
        }

        self.apu.tick(dots, self.timer.is_apu_event() as u8);
    }

    /// Reads one byte, use when executing instructions by CPU.
    pub(crate) fn read(&self, addr: u16) -> u8 {
        let addr = addr as usize;

        if is_cart_addr(addr) {
            return self.cart.read(addr);
        }

        match_range! { a@addr {
            ADDR_AUDIO_WAVE_RAM => { self.apu.wave_ram[a] }

            // VRAM is inaccessible to the CPU while the PPU is drawing.
            ADDR_VRAM => {
                if self.get_mode() == MODE_DRAW {
                    0xFF
                } else {
                    self.ppu.fetcher.vram[self.vram_idx][a]
                }
            }
            ADDR_WRAM0 => { self.wram[0][a] }
            ADDR_WRAM1 => { self.wram[self.wram_idx][a] }
            ADDR_ECHO_RAM => { self.read(get_echo_ram_addr(a) as u16) }
            // OAM is inaccessible while the PPU is scanning or drawing.
            ADDR_OAM => {
                if matches!(self.get_mode(), MODE_SCAN | MODE_DRAW) {
                    0xFF
                } else {
                    self.ppu.oam[a]
                }
            }
            ADDR_UNUSABLE => { 0xFF }
            ADDR_HRAM => { self.hram[a] }
            ADDR_IO_REGS => { self.read_reg(addr) }
            ADDR_IE => { self.read_reg(addr) }

            _ => { unreachable!() }
        }}
    }

    /// Reads a byte for instruction fetch/decode; identical to `read`, kept
    /// as a separate entry point since opcode fetches always come from the
    /// CPU and never need to observe OAM-DMA source-address conflicts.
    pub(crate) fn read_cpu(&mut self, addr: u16) -> u8 {
        self.read(addr)
    }

    /// Writes one byte, use when executing instructions by CPU.
    /// Writes to read-only registers are ignored, use `reg_set` for that.
    pub(crate) fn write(&mut self, addr: u16, val: u8) {
        let addr = addr as usize;

        if is_cart_addr(addr) {
            self.cart.write(addr, val);
            return;
        }

        // Audio wave RAM is lies in the range of ADDR_IO_REGS,
        // so it must be before it otherwise we will lose writes to it.
        match_range! { a@addr {
            ADDR_AUDIO_WAVE_RAM => { self.apu.wave_ram[a] = val }

            ADDR_VRAM => {
                #[cfg(feature = "sgb")]
                if self.cart.is_sgb && self.sgb.pal_trn_pending {
                    self.sgb.pal_trn_feed_byte(val);
                }
                if self.get_mode() != MODE_DRAW {
                    self.ppu.fetcher.write_vram(self.vram_idx, a, val)
                }
            }
            ADDR_WRAM0 => { self.wram[0][a] = val}
            ADDR_WRAM1 => { self.wram[self.wram_idx][a] = val }
            ADDR_ECHO_RAM => { self.write(get_echo_ram_addr(a) as u16, val) }
            ADDR_OAM => {
                if !matches!(self.get_mode(), MODE_SCAN | MODE_DRAW) {
                    self.ppu.oam[a] = val
                }
            }
            ADDR_UNUSABLE => {}
            ADDR_HRAM => { self.hram[a] = val}
            ADDR_IO_REGS => { self.write_reg(addr, val) }
            ADDR_IE => { self.write_reg(addr, val); }

            _ => { unreachable!() }
        }}
    }

    fn read_reg(&self, addr: usize) -> u8 {
        match addr {
            IO_JOYPAD => self.joypad.read(),
            IO_SB => self.serial.sb,
            IO_SC => self.serial.sc.read(),
            IO_DIV => self.timer.get_div(),
            IO_TIMA => self.timer.tima,
            IO_TMA => self.timer.tma,
            IO_TAC => self.timer.tac.read(),
            IO_IF => self.iflag.read(),
            IO_IE => self.ienable.read(),

            IO_NR10..=IO_NR52 => self.apu.read(addr),

            IO_LCDC => self.ppu.fetcher.lcdc.read(),
            IO_STAT => self.ppu.stat.read(),
            IO_SCY => self.ppu.fetcher.scy,
            IO_SCX => self.ppu.fetcher.scx,
            IO_LY => self.ppu.ly,
            IO_LYC => self.ppu.lyc,
            IO_WY => self.ppu.fetcher.wy,
            IO_WX => self.ppu.fetcher.wx,
            IO_BGP => self.ppu.bgp,
            IO_OBP0 => self.ppu.obp0,
            IO_OBP1 => self.ppu.obp1,
            IO_BGPI => self.bgpi.read(),
            IO_BGPD => self.ppu.bg_palette[self.bgpi.addr as usize],
            IO_OBPI => self.obpi.read(),
            IO_OBPD => self.ppu.obj_palette[self.obpi.addr as usize],
            IO_OPRI => self.opri,

            IO_SVBK => self.wram_idx as u8,
            IO_VBK => self.vram_idx as u8,
            IO_HDMA1 | IO_HDMA2 | IO_HDMA3 | IO_HDMA4 => 0xFF,
            // Bit-7 clear and low 7 bits report remaining 0x10-byte blocks
            // (minus one) while a HBlank transfer is active; 0xFF once idle.
            IO_HDMA5 => match self.hdma.hblank_blocks_left {
                Some(blocks) => (blocks.saturating_sub(1)) & mask(7),
                None => 0xFF,
            },
            IO_DMA => self.dma,
            IO_KEY1 => self.key1.read(),
            // Infrared port is not emulated, report "no signal received".
            IO_RP => 0xFF,

            _ => 0,
        }
    }

    /// Writes to a register and performs necessary action
    /// corresponding to the register if any.
    ///
    /// Writes to read-only registers(or register fields) are ignored.
    fn write_reg(&mut self, addr: usize, v: u8) {
        /// Set value but keep the masked bits preserved.
        macro_rules! set {
            ($target:expr, $val:expr, $keep_mask:expr) => {{
                let combined = ($target.read() & $keep_mask) | ($val & !$keep_mask);
                $target.write(combined);
            }};
        }

        match addr {
            IO_JOYPAD => {
                set!(self.joypad, v, mask(4));
                self.update_joypad(self.dpad, self.buttons);

                #[cfg(feature = "sgb")]
                if self.cart.is_sgb {
                    self.sgb.observe_joypad_write(v);
                }
            }

            IO_SB => self.serial.sb = v,
            IO_SC => set!(self.serial.sc, v, mask(5) << 2),
            IO_DIV => self.timer.set_div(v),
            IO_TIMA => self.timer.tima = v,
            IO_TMA => self.timer.tma = v,
            IO_TAC => self.timer.tac.write(v),
            IO_IF => set!(self.iflag, v, !mask(5)),
            IO_IE => set!(self.ienable, v, !mask(5)),

            IO_NR10..=IO_NR52 => self.apu.write(addr, v),

            IO_LCDC => self.ppu.fetcher.lcdc.write(v),
            IO_STAT => set!(self.ppu.stat, v, mask(3)),
            IO_SCY => self.ppu.fetcher.scy = v,
            IO_SCX => self.ppu.fetcher.scx = v,
            IO_LY => (),
            IO_LYC => self.ppu.lyc = v,
            IO_WY => self.ppu.fetcher.wy = v,
            IO_WX => self.ppu.fetcher.wx = v,
            IO_BGP => self.ppu.bgp = v,
            IO_OBP0 => self.ppu.obp0 = v,
            IO_OBP1 => self.ppu.obp1 = v,
            IO_BGPI => self.bgpi.write(v),
            IO_OBPI => self.obpi.write(v),

            // CGB paletes are locked while PPU is drawing(Mode-3).
            IO_BGPD if self.get_mode() != MODE_DRAW => {
                self.ppu.bg_palette[self.bgpi.addr as usize] = v;
                self.ppu.recompute_cgb_palette_cache(false, self.bgpi.addr >> 3);
                if self.bgpi.auto_inc == 1 {
                    self.bgpi.addr = (self.bgpi.addr + 1) & mask(6);
                }
            }
            IO_OBPD if self.get_mode() != MODE_DRAW => {
                self.ppu.obj_palette[self.obpi.addr as usize] = v;
                self.ppu.recompute_cgb_palette_cache(true, self.obpi.addr >> 3);
                if self.obpi.auto_inc == 1 {
                    self.obpi.addr = (self.obpi.addr + 1) & mask(6);
                }
            }

            IO_OPRI => self.opri = v & 1,
            IO_SVBK => {
                if self.is_2x {
                    self.wram_idx = if v == 0 { 1 } else { (v & mask(3)) as usize };
                }
            }
            IO_VBK => {
                if self.is_2x {
                    self.vram_idx = (v as usize) & 1
                }
            }

            IO_HDMA1 => self.hdma.src_hi = v,
            IO_HDMA2 => self.hdma.src_lo = v,
            IO_HDMA3 => self.hdma.dst_hi = v,
            IO_HDMA4 => self.hdma.dst_lo = v,
            IO_HDMA5 => self.do_hdma(v),

            IO_DMA => self.do_dma(v),
            IO_KEY1 => set!(self.key1, v, !mask(1)),
            IO_RP => (),

            _ => (),
        }
    }

    /// Set IF register by ORing bits of `iflag` in.
    pub(crate) fn add_interrupt(&mut self, iflag: IntData) {
        let val = self.iflag.read() | iflag.read();
        self.iflag.write(val);
    }

    /// Update joypad buttons and Joypad/P1 register.
    /// Also, raise Joypad interrupt if condition is met.
    pub(crate) fn update_joypad(&mut self, dpad: DPad, btns: ActionButtons) {
        let mut new = mask(4); // In Joypad 0-bit means pressed.

        if self.joypad.select_dpad == 0 {
            new &= !dpad.read();
        }
        if self.joypad.select_buttons == 0 {
            new &= !btns.read();
        }

        // Interrupt only when any of the lower 4-bits of Joypad falls.
        if (self.joypad.state & !new) & mask(4) != 0 {
            self.add_interrupt(IntData {
                joypad: 1,
                ..Default::default()
            });
        }

        self.joypad.state = new;
        self.dpad = dpad;
        self.buttons = btns;
    }

    pub(crate) fn get_mode(&self) -> u8 {
        self.ppu.stat.ppu_mode
    }

    /// Called once per completed frame. Lets the coprocessor recolor the
    /// raw mono frame before it is handed to `Emulator::fill_frame`.
    #[cfg(feature = "sgb")]
    pub(crate) fn finish_frame(&mut self) {
        if self.cart.is_sgb {
            let frame = self.sgb.colourise_frame(self.ppu.mono_frame());
            self.ppu.set_frame(frame);
        }
    }

    #[cfg(not(feature = "sgb"))]
    pub(crate) fn finish_frame(&mut self) {}

    fn do_dma(&mut self, addr: u8) {
        // DMA address specifies the high-byte value of the 16-bit
        // source address. Valid values for it are from 0x00 to 0xDF.
        // If it is more than that then we just wrap around it.
        let src = ((addr as usize) % (0xDF + 1)) << 8;
        self.dma = addr;

        for (i, _) in ADDR_OAM.enumerate() {
            self.ppu.oam[i] = self.read((src + i) as u16);
        }
    }

    /// Handle a write to HDMA5: general-purpose transfers (bit-7 clear) run
    /// to completion immediately; HBlank-paced transfers (bit-7 set) are
    /// armed and trickled out by `step_hdma_hblank`. Writing bit-7 again
    /// while a HBlank transfer is active stops it, per hardware semantics.
    fn do_hdma(&mut self, ctrl: u8) {
        let blocks = usize::from(ctrl & 0x7F) + 1;

        if ctrl & 0x80 == 0 {
            self.hdma.hblank_blocks_left = None;
            self.copy_hdma_bytes(0, blocks * 0x10);
            return;
        }

        if self.hdma.hblank_blocks_left.is_some() {
            self.hdma.hblank_blocks_left = None;
        } else {
            self.hdma.hblank_blocks_left = Some(blocks as u8);
            self.hdma.offset = 0;
        }
    }

    /// Copy `length` bytes from the HDMA source to VRAM, `offset` bytes
    /// into the overall transfer.
    fn copy_hdma_bytes(&mut self, offset: u16, length: usize) {
        let src = self.hdma.src().wrapping_add(offset);
        let dst = self.hdma.dst() as usize - *ADDR_VRAM.start();

        if src as usize >= SIZE_ROM_BANK * 2 && !in_ranges!(src as usize, ADDR_EXT_RAM) {
            log::warn("mmu: HDMA source address outside ROM/external RAM");
        }

        for i in 0..length {
            let byte = self.read(src.wrapping_add(i as u16));
            let vram_addr = (dst + offset as usize + i) & (SIZE_VRAM_BANK - 1);
            self.ppu.fetcher.write_vram(self.vram_idx, vram_addr, byte);
        }
    }

    /// Copy one 0x10-byte block of an armed HBlank-paced transfer; called
    /// once per HBlank entry.
    fn step_hdma_hblank(&mut self) {
        let Some(blocks) = self.hdma.hblank_blocks_left else {
            return;
        };

        self.copy_hdma_bytes(self.hdma.offset, 0x10);
        self.hdma.offset += 0x10;
        self.hdma.hblank_blocks_left = if blocks > 1 { Some(blocks - 1) } else { None };
    }
}

#[inline]
fn is_cart_addr(addr: usize) -> bool {
    in_ranges!(addr, ADDR_ROM0, ADDR_ROM1, ADDR_EXT_RAM)
}

/// Get ECHO RAM addres which is mapped to WRAM masked by 13-bits.
#[inline]
fn get_echo_ram_addr(rel_addr: usize) -> usize {
    (rel_addr & ECHO_RAM_ADDR_MASK) + *ADDR_WRAM0.start()
}

#[inline(always)]
const fn mask(bit_cnt: u32) -> u8 {
    u8::MAX >> (8 - bit_cnt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hdma_transfers_bytes_into_vram() {
        let cart = Cartidge::new(&make_min_rom()).unwrap();
        let mut mmu = Mmu::new(cart);
        mmu.vram_idx = 0;

        // Point source at WRAM bank 0, fill it with a pattern.
        for i in 0..0x10u16 {
            mmu.write(0xC000 + i, i as u8 + 1);
        }
        // HDMA only reads from ROM/external RAM on hardware; for this test
        // we just want to verify the copy mechanics using wram as a stand-in
        // since our transfer loop goes through the generic `read`.
        mmu.write(0xFF51, 0xC0); // src hi
        mmu.write(0xFF52, 0x00); // src lo
        mmu.write(0xFF53, 0x00); // dst hi (relative to 0x8000)
        mmu.write(0xFF54, 0x00); // dst lo
        mmu.write(0xFF55, 0x00); // 1 block of 0x10 bytes, general purpose

        for i in 0..0x10u16 {
            assert_eq!(mmu.read(0x8000 + i), i as u8 + 1);
        }
    }

    #[test]
    fn hdma_hblank_trickles_one_block_per_entry() {
        let cart = Cartidge::new(&make_min_rom()).unwrap();
        let mut mmu = Mmu::new(cart);
        mmu.vram_idx = 0;

        for i in 0..0x20u16 {
            mmu.write(0xC000 + i, i as u8 + 1);
        }
        mmu.write(0xFF51, 0xC0); // src hi
        mmu.write(0xFF52, 0x00); // src lo
        mmu.write(0xFF53, 0x00); // dst hi (relative to 0x8000)
        mmu.write(0xFF54, 0x00); // dst lo
        mmu.write(0xFF55, 0x81); // bit-7 set, 2 blocks of 0x10 bytes

        // Armed but nothing copied yet; one block left after the next entry.
        assert_eq!(mmu.read_reg(0xFF55), 0x01);

        mmu.step_hdma_hblank();
        for i in 0..0x10u16 {
            assert_eq!(mmu.read(0x8000 + i), i as u8 + 1);
        }
        assert_eq!(mmu.read_reg(0xFF55), 0x00);

        mmu.step_hdma_hblank();
        for i in 0x10..0x20u16 {
            assert_eq!(mmu.read(0x8000 + i), i as u8 + 1);
        }
        assert_eq!(mmu.read_reg(0xFF55), 0xFF);

        // A third call with no transfer armed must be a no-op.
        mmu.step_hdma_hblank();
        assert_eq!(mmu.read_reg(0xFF55), 0xFF);
    }

    fn make_min_rom() -> Vec<u8> {
        let mut rom = vec![0u8; SIZE_ROM_BANK * 2];
        rom[CART_LOGO].copy_from_slice(&CART_LOGO_VAL);
        rom[CART_TYPE] = 0x00;
        rom[CART_RAM_SIZE] = 0x00;

        let sum = rom[*CART_TITLE.start()..CART_HEADER_CSUM]
            .iter()
            .fold(0u8, |acc, &b| acc.wrapping_sub(b));
        rom[CART_HEADER_CSUM] = sum.wrapping_sub(1);

        rom
    }
}
