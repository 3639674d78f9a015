mod mbc;
pub(crate) mod rtc;

use bincode::{Decode, Encode};

use crate::{info::*, log, macros::match_range, EmulatorErr};

#[derive(Default, Encode, Decode)]
pub(crate) struct Cartidge {
    pub(crate) is_cgb: bool,
    /// Cartridge declares Super-variant coprocessor support via its header.
    pub(crate) is_sgb: bool,
    pub(crate) mbc: mbc::Mbc,

    /// Cartridge ROM fixed size on load.
    rom: Box<[u8]>,
    /// External RAM, sized up-front from the header's RAM-size byte.
    ram: Vec<u8>,
}

impl Default for mbc::Mbc {
    fn default() -> Self {
        mbc::Mbc::new(0x00).expect("MbcKind::None is always constructible")
    }
}

impl Cartidge {
    /// Copy the rom and create a new cartridge, reading the header to pick
    /// the bank controller and size the external RAM.
    pub(crate) fn new(rom: &[u8]) -> Result<Self, EmulatorErr> {
        if rom.len() < CART_HEADER.end() + 1 {
            return Err(EmulatorErr::InvalidRomSize(rom.len()));
        }

        if rom[CART_LOGO] != CART_LOGO_VAL {
            return Err(EmulatorErr::MissingLogo);
        }
        verify_header_checksum(rom)?;

        let is_cgb_rom = matches!(rom[CART_CGB_FLAG], CART_CGB_TOO | CART_CGB_ONLY);
        // 0x03 is the only value real SGB-aware games use; anything else
        // (0x00 most commonly) means "not SGB", regardless of the old
        // licensee code that real hardware also checks.
        let is_sgb_rom = rom[CART_SGB_FLAG] == 0x03;
        let mbc = mbc::Mbc::new(rom[CART_TYPE])?;

        if rom.len() % SIZE_ROM_BANK != 0 {
            log::warn("cartridge: ROM size is not a multiple of 16KiB");
        }

        let ram_size = ram_size_from_header(&mbc.kind, rom[CART_RAM_SIZE])?;

        Ok(Self {
            is_cgb: is_cgb_rom,
            is_sgb: is_sgb_rom,
            mbc,
            rom: rom.to_vec().into_boxed_slice(),
            ram: vec![0; ram_size],
        })
    }

    pub(crate) fn read(&self, addr: usize) -> u8 {
        // Some ROM sizes may not be multiples of SIZE_ROM_BANK, in such cases
        // an address might overflow on last ROM bank.
        let safe_read = |addr: usize| self.rom.get(addr).copied().unwrap_or(0xFF);

        match_range! { v@addr {
            ADDR_ROM0 => { safe_read(self.mbc.rom0_addr(v)) }
            ADDR_ROM1 => { safe_read(self.mbc.rom1_addr(v)) }
            ADDR_EXT_RAM => {
                if let Some(reg) = self.mbc.kind.get_mbc3_rtc_reg_if_set() {
                    self.mbc.rtc.read(reg)
                } else if self.mbc.ram_enabled {
                    self.ram.get(self.mbc.ram_addr(v)).copied().unwrap_or(0xFF)
                } else {
                    0xFF
                }
            }
            _ => { unreachable!() }
        }}
    }

    pub(crate) fn write(&mut self, addr: usize, val: u8) {
        match_range! { v@addr {
            ADDR_ROM0 => { self.mbc.write(addr, val) }
            ADDR_ROM1 => { self.mbc.write(addr, val) }

            ADDR_EXT_RAM => {
                if let Some(reg) = self.mbc.kind.get_mbc3_rtc_reg_if_set() {
                    self.mbc.rtc.write(reg, val);
                } else if self.mbc.ram_enabled {
                    if let Some(slot) = self.ram.get_mut(self.mbc.ram_addr(v)) {
                        *slot = val;
                    }
                }
            }
            _ => { unreachable!() }
        }}
    }

    /// Raw ROM bytes as loaded, for embedding in full-state save files.
    pub(crate) fn rom_bytes(&self) -> &[u8] {
        &self.rom
    }

    /// Raw battery RAM, for save-file persistence.
    pub(crate) fn battery_ram(&self) -> &[u8] {
        &self.ram
    }

    pub(crate) fn load_battery_ram(&mut self, data: &[u8]) {
        let n = self.ram.len().min(data.len());
        self.ram[..n].copy_from_slice(&data[..n]);
    }

    pub(crate) fn has_timer(&self) -> bool {
        matches!(self.mbc.kind, mbc::MbcKind::Mbc3 { has_timer: true, .. })
    }

    pub(crate) fn seed_rtc(&mut self, total_seconds: u64) {
        self.mbc.rtc.seed_from_seconds(total_seconds);
    }

    pub(crate) fn rtc_save_bytes(&self) -> [u8; 16] {
        self.mbc.rtc.to_save_bytes()
    }

    pub(crate) fn load_rtc_save_bytes(&mut self, bytes: &[u8; 16]) {
        self.mbc.rtc.load_save_bytes(bytes);
    }
}

/// Map the header's RAM-size byte (0x149) to a byte count, erroring on any
/// value we don't recognize rather than guessing. MBC2's RAM is built into
/// the mapper itself and ignores this byte entirely.
fn ram_size_from_header(kind: &mbc::MbcKind, ram_size_byte: u8) -> Result<usize, EmulatorErr> {
    if matches!(kind, mbc::MbcKind::Mbc2 { .. }) {
        return Ok(mask_span(9));
    }

    Ok(match ram_size_byte {
        0x00 => 0,
        0x01 => 2 * KB,
        0x02 => 8 * KB,
        0x03 => 32 * KB,
        0x04 => 128 * KB,
        0x05 => 64 * KB,
        b => return Err(EmulatorErr::UnknownRamSize(b)),
    })
}

const fn mask_span(bits: u32) -> usize {
    1usize << bits
}

/// Verify the header checksum over `0x134..=0x14C`: `x = (-sum - 1) mod 256`
/// must equal the stored checksum byte at `0x14D`.
fn verify_header_checksum(rom: &[u8]) -> Result<(), EmulatorErr> {
    let sum = rom[*CART_TITLE.start()..CART_HEADER_CSUM]
        .iter()
        .fold(0u8, |acc, &b| acc.wrapping_sub(b));
    let computed = sum.wrapping_sub(1);
    let expected = rom[CART_HEADER_CSUM];

    if computed != expected {
        return Err(EmulatorErr::HeaderChecksumMismatch(expected, computed));
    }
    Ok(())
}
