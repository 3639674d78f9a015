mod fetcher;

use bincode::{Decode, Encode};

use fetcher::{LineFetcher, OamEntry, Pixel};

use crate::{
    frame::{self, Color, Frame},
    info::*,
    regs::{CgbPaletteColor, IntData, LcdStat},
};

#[derive(Encode, Decode)]
pub(crate) struct Ppu {
    pub(crate) fetcher: LineFetcher,

    // Memory and registers owned by it.
    pub(crate) oam: [u8; SIZE_OAM],
    // CGB color palettes are stored in a seperate RAM accesed indirectly.
    pub(crate) bg_palette: [u8; SIZE_CGB_PALETTE],
    pub(crate) obj_palette: [u8; SIZE_CGB_PALETTE],
    /// Precomputed RGB-24 values for each of the 8x4 CGB palette colors,
    /// recomputed whenever the raw byte backing it changes. Keeps the
    /// per-pixel renderer path off the BGR555 conversion math.
    bg_palette_rgba: [[Color; 4]; 8],
    obj_palette_rgba: [[Color; 4]; 8],
    #[bincode(with_serde)]
    pub(crate) stat: LcdStat,
    pub(crate) ly: u8,
    pub(crate) lyc: u8,
    pub(crate) bgp: u8,
    pub(crate) obp0: u8,
    pub(crate) obp1: u8,

    /// Current PPU mode updates to it are carried to STAT register.
    mode: PpuMode,
    /// Frame containing an RGB-24 representation of the screen pixels.
    frame: Frame,
    /// Set for carts that declared Super-variant coprocessor support; while
    /// set, `step_draw` fills `mono` with raw 2-bit color indices instead of
    /// resolving them to DMG grey shades, since the coprocessor recolors
    /// each 8x8 cell itself once a frame completes.
    pub(crate) is_super: bool,
    mono: [[u8; SCREEN_RESOLUTION.0]; SCREEN_RESOLUTION.1],
    /// Amount of dots left, which determines how much to advance.
    /// In normal mode     : 4 dots per M-cycle.
    /// In dual-speed mode : 2 dots per M-cycle.
    dots_left: u16,
    /// Number of dots consumed for the current scan-line `LY`.
    dots_in_line: u16,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Encode, Decode)]
#[repr(u8)]
enum PpuMode {
    HBlank = MODE_HBLANK,
    VBlank = MODE_VBLANK,
    #[default]
    Scan = MODE_SCAN,
    Draw = MODE_DRAW,
}

impl Ppu {
    pub(crate) fn new() -> Self {
        Self {
            fetcher: LineFetcher::new(),
            oam: [0; SIZE_OAM],
            bg_palette: [0; SIZE_CGB_PALETTE],
            obj_palette: [0; SIZE_CGB_PALETTE],
            bg_palette_rgba: [[Color::default(); 4]; 8],
            obj_palette_rgba: [[Color::default(); 4]; 8],
            stat: Default::default(),
            ly: 0,
            lyc: 0,
            bgp: 0,
            obp0: 0,
            obp1: 0,
            frame: Default::default(),
            is_super: false,
            mono: [[0; SCREEN_RESOLUTION.0]; SCREEN_RESOLUTION.1],
            mode: PpuMode::Scan,
            dots_in_line: 0,
            dots_left: 0,
        }
    }

    pub(crate) fn fill_frame(&self, frame: &mut frame::Frame) {
        *frame = self.frame.clone();
    }

    /// Run for `dots` cycles, `dots` must be an even number.
    pub(crate) fn tick(&mut self, dots: u16) -> IntData {
        // Reset and do nothing if PPU is disabled.
        if self.fetcher.lcdc.ppu_enable == 0 {
            self.reset();
            return IntData::new(0);
        }

        assert!(dots % 2 == 0);
        self.dots_left += dots;
        let mut ret = IntData::default();

        while self.dots_left > 0 {
            let mode = match self.mode {
                PpuMode::HBlank => self.step_hblank(),
                PpuMode::VBlank => self.step_vblank(),
                PpuMode::Scan => self.step_scan(),
                PpuMode::Draw => self.step_draw(),
            };

            let new_intrps = self.update_lcd_state(mode);
            ret.write(ret.read() | new_intrps.read());
        }

        ret
    }

    fn reset(&mut self) {
        self.stat.ppu_mode = MODE_HBLANK;
        self.ly = 0;
        self.dots_in_line = 0;
        self.mode = PpuMode::Scan;
    }

    fn step_scan(&mut self) -> PpuMode {
        // 2 dots per entry scan. Lasts 80 dots for scanning 40 entries.
        let idx = self.dots_in_line as usize / 2;
        match idx {
            0 => self.fetcher.new_line(self.ly),
            OAM_ENTRIES => return PpuMode::Draw,
            _ => (),
        }

        self.eat_dots(2);
        let obj = get_oam_entry(&self.oam, idx);

        // If the spte buffer is not full, then a sprite is added to it if:
        // It is on the scan-line as per its Y-pos and objects are enabled.
        // "Ypos - 16" is sprite top position on screen.
        // A sprite can have size: 8x8 or 8x16(tall object mode).
        let height = if self.fetcher.lcdc.obj_size == 1 {
            16
        } else {
            8
        };
        if self.fetcher.objects.len() < MAX_OBJ_PER_LINE
            && obj.ypos <= self.ly + 16
            && self.ly + 16 < obj.ypos + height
        {
            self.fetcher.objects.push(obj);
        }

        PpuMode::Scan
    }

    fn step_draw(&mut self) -> PpuMode {
        self.eat_dots(2);
        self.fetcher.tick_2_dots();

        if self.fetcher.is_done() {
            // Copy all pixel colors to frame if done.
            for i in 0..SCREEN_RESOLUTION.0 {
                let px = self.fetcher.screen_line[i];
                if self.is_super {
                    self.mono[self.ly as usize][i] = self.pixel_to_mono_index(px);
                } else {
                    let color = self.pixel_to_color(px);
                    self.frame.set(i, self.ly as usize, color);
                }
            }

            PpuMode::HBlank
        } else {
            PpuMode::Draw
        }
    }

    fn step_hblank(&mut self) -> PpuMode {
        // If current scan-line finishes and it was last draw line then
        // goto VBlank, if not last line then just go back to OAM-Scan mode.
        if self.eat_dots(self.dots_left) {
            if self.ly == PPU_DRAW_LINES {
                PpuMode::VBlank
            } else {
                PpuMode::Scan
            }
        } else {
            PpuMode::HBlank
        }
    }

    fn step_vblank(&mut self) -> PpuMode {
        self.eat_dots(self.dots_left);

        if self.ly == PPU_DRAW_LINES + PPU_VBLANK_LINES {
            self.dots_in_line = 0;
            self.ly = 0;
            PpuMode::Scan // Start next frame.
        } else {
            PpuMode::VBlank
        }
    }

    /// Update STAT and LY registers and raise interrupts if any.
    /// Must be called after each step.
    fn update_lcd_state(&mut self, new_mode: PpuMode) -> IntData {
        let mut iflag = IntData::new(0);

        // For interrupt on condition: LYC == LY.
        // It is trigerred at the begining of a scan line only.
        if self.dots_in_line == 0 && self.stat.lyc_int == 1 && self.lyc == self.ly {
            iflag.stat = 1;
        }
        // If mode changes and interrupt condition is met then interrupt.
        if new_mode != self.mode {
            iflag.vblank = matches!(new_mode, PpuMode::VBlank) as u8;
            iflag.stat = match self.mode {
                PpuMode::HBlank if self.stat.mode0_int == 1 => 1,
                PpuMode::VBlank if self.stat.mode1_int == 1 => 1,
                PpuMode::Scan if self.stat.mode2_int == 1 => 1,
                _ => iflag.stat,
            };
        }

        self.stat.ppu_mode = new_mode as u8;
        self.stat.ly_eq_lyc = (self.lyc == self.ly) as u8;
        self.mode = new_mode;
        iflag
    }

    /// Consume as much dots as possible from `dots_left` without overflowing
    /// into the next scan-line. Return true if current scan-line finished.
    fn eat_dots(&mut self, dots: u16) -> bool {
        assert!(dots <= PPU_HSCAN_DOTS);
        assert!(dots <= self.dots_left);
        let r = self.dots_in_line + dots;

        if r >= PPU_HSCAN_DOTS {
            // Consume only as many dots as needed to finish this line.
            self.dots_left -= dots - (r - PPU_HSCAN_DOTS);
            self.dots_in_line = 0;
            self.ly += 1;
            true
        } else {
            self.dots_in_line += dots;
            self.dots_left -= dots;
            false
        }
    }

    // Pixel to color synthesis stuff
    //---------------------------------------------------------------
    fn pixel_to_color(&self, px: Pixel) -> Color {
        // In non-CGB mode palette is taken from BGP/OBP0/OBP1 registers,
        // where colors are stored according to color IDs as: [MSB] 33-22-11-00 [LSB]
        let mono_color = |palette, color_id| (palette >> color_id * 2) & 0b11;

        if self.fetcher.is_cgb {
            // Transparent[color=0] object pixels have already been
            // handeled by the fetcher during pixel mixing.
            let cache = if px.is_obj {
                &self.obj_palette_rgba
            } else {
                &self.bg_palette_rgba
            };
            cache[px.palette as usize][px.color_id as usize]
        } else {
            let palette = if px.is_obj {
                if px.palette == 0 {
                    self.obp0
                } else {
                    self.obp1
                }
            } else {
                self.bgp
            };

            let color = mono_color(palette, px.color_id);
            mono_to_color(color)
        }
    }

    /// 2-bit color index a pixel resolves to, before palette lookup. Used
    /// in place of `pixel_to_color` when the coprocessor owns recoloring.
    fn pixel_to_mono_index(&self, px: Pixel) -> u8 {
        let mono_color = |palette, color_id| (palette >> color_id * 2) & 0b11;
        let palette = if px.is_obj {
            if px.palette == 0 {
                self.obp0
            } else {
                self.obp1
            }
        } else {
            self.bgp
        };
        mono_color(palette, px.color_id)
    }

    /// Current frame's raw 2-bit color indices, valid while `is_super`.
    pub(crate) fn mono_frame(&self) -> &[[u8; SCREEN_RESOLUTION.0]; SCREEN_RESOLUTION.1] {
        &self.mono
    }

    /// Replace the rendered frame with one synthesized by the coprocessor.
    pub(crate) fn set_frame(&mut self, frame: Frame) {
        self.frame = frame;
    }

    fn read_cgb_palette(&self, is_obj: bool, pal_index: u8) -> [u16; 4] {
        let mut ret = [0u16; 4];

        for (i, r) in ret.iter_mut().enumerate() {
            // Each palette is of 8-bytes consisting of 4 colors of 2-bytes each.
            let idx = (pal_index as usize) * 8 + i * 2;

            *r = u16::from_le_bytes(if is_obj {
                [self.obj_palette[idx], self.obj_palette[idx + 1]]
            } else {
                [self.bg_palette[idx], self.bg_palette[idx + 1]]
            });
        }

        ret
    }

    /// Recompute the precomputed-RGBA cache entry for one palette after a
    /// write to its backing raw bytes. Called once per BGPD/OBPD write.
    pub(crate) fn recompute_cgb_palette_cache(&mut self, is_obj: bool, pal_index: u8) {
        let raw = self.read_cgb_palette(is_obj, pal_index);
        let cache = if is_obj {
            &mut self.obj_palette_rgba
        } else {
            &mut self.bg_palette_rgba
        };
        cache[pal_index as usize] = raw.map(cgb_to_color);
    }
}

fn get_oam_entry(oam: &[u8], idx: usize) -> OamEntry {
    let d = &oam[(idx * 4)..(idx * 4 + 4)];
    OamEntry::from_array([d[0], d[1], d[2], d[3]])
}

#[inline]
fn mono_to_color(mono_color: u8) -> Color {
    // Mono color is of 2 bits.
    // Where in mono color: 3 in it means dark and 0 white.
    const SCALE: u8 = 255 / 3;
    let c = (3 - mono_color) * SCALE;
    Color { r: c, g: c, b: c }
}

#[inline]
fn cgb_to_color(cgb_color: u16) -> Color {
    // Each CGB color component of 5 bits.
    const SCALE: u8 = 255 / 31;
    let c = CgbPaletteColor::new(cgb_color);
    Color {
        r: (c.red as u8) * SCALE,
        g: (c.green as u8) * SCALE,
        b: (c.blue as u8) * SCALE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cgb_palette_cache_matches_direct_conversion() {
        let mut ppu = Ppu::new();
        ppu.fetcher.is_cgb = true;

        // Palette 2, color slot 1: raw BGR555 0x1234 written little-endian.
        let idx = 2 * 8 + 1 * 2;
        ppu.bg_palette[idx] = 0x34;
        ppu.bg_palette[idx + 1] = 0x12;
        ppu.recompute_cgb_palette_cache(false, 2);

        let px = Pixel {
            color_id: 1,
            palette: 2,
            is_obj: false,
            ..Default::default()
        };
        assert_eq!(ppu.pixel_to_color(px), cgb_to_color(0x1234));
    }

    #[test]
    fn super_variant_draw_fills_mono_buffer_not_frame() {
        let mut ppu = Ppu::new();
        ppu.is_super = true;
        ppu.bgp = 0b11_10_01_00; // ids 0,1,2,3 map to shades 0,1,2,3 MSB-first

        let px = Pixel {
            color_id: 2,
            palette: 0,
            is_obj: false,
            ..Default::default()
        };
        ppu.mono[0][5] = ppu.pixel_to_mono_index(px);
        assert_eq!(ppu.mono[0][5], 2);
        // Regular frame buffer stays untouched by the mono path.
        assert_eq!(ppu.frame.get(5, 0), Color::default());
    }
}
