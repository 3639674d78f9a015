//! Super-variant coprocessor: reassembles the bit-serial command protocol
//! carried over writes to the joypad register (0xFF00), applies the
//! supported palette/attribute/mask commands, and colorizes the
//! monochrome frame the PPU produces for Super-variant carts.

use bincode::{Decode, Encode};

use crate::{
    frame::{Color, Frame},
    info::SCREEN_RESOLUTION,
    log,
    regs::CgbPaletteColor,
};

const PACKET_LEN: usize = 16;
const CELLS_X: usize = 20;
const CELLS_Y: usize = 18;
const SYSTEM_PALETTE_LEN: usize = 512;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Encode, Decode)]
enum MaskMode {
    #[default]
    Off,
    Freeze,
    Black,
    White,
}

/// Bit-serial packet reassembly state plus the coprocessor's own register
/// file. Lives in the `Mmu` and is tapped from the joypad-register write
/// path; everything else about the joypad stays untouched.
#[derive(Encode, Decode)]
pub(crate) struct Sgb {
    /// Last observed 2-bit select-line code, used to detect edges.
    prev_sel: u8,
    in_packet: bool,
    bit_idx: u8,
    byte_idx: u8,
    current: [u8; PACKET_LEN],
    queue: Vec<[u8; PACKET_LEN]>,
    packet_count: u8,
    command: u8,

    /// Four active palettes of four colors each, used by `colourise_frame`.
    palettes: [[u16; 4]; 4],
    /// Raw system palette bank loaded by PAL_TRN, kept for save-state
    /// round-tripping; nothing in the supported command set reads from it
    /// since PAL_SET (which would copy a system-palette entry into an
    /// active palette slot) is not implemented.
    system_palette: Vec<[u16; 4]>,
    /// Per-character-cell (20x18) index into `palettes`.
    cell_palette: [u8; CELLS_X * CELLS_Y],
    mask: MaskMode,
    frozen: Option<Frame>,
    pub(crate) pal_trn_pending: bool,
    /// Bytes consumed so far of the 512-entry*4-color*2-byte PAL_TRN stream.
    pal_trn_count: usize,
    /// Low byte of a color currently being assembled, if one was seen.
    pal_trn_lo: Option<u8>,
    multitap_enabled: bool,
    joypad_rotation: u8,
}

impl Default for Sgb {
    fn default() -> Self {
        Self {
            prev_sel: 0b11,
            in_packet: false,
            bit_idx: 0,
            byte_idx: 0,
            current: [0; PACKET_LEN],
            queue: Vec::with_capacity(7),
            packet_count: 0,
            command: 0,

            palettes: [[0; 4]; 4],
            system_palette: vec![[0; 4]; SYSTEM_PALETTE_LEN],
            cell_palette: [0; CELLS_X * CELLS_Y],
            mask: MaskMode::default(),
            frozen: None,
            pal_trn_pending: false,
            pal_trn_count: 0,
            pal_trn_lo: None,
            multitap_enabled: false,
            joypad_rotation: 0,
        }
    }
}

impl Sgb {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Observe a write to the joypad register's select lines (bits 4-5) and
    /// advance the packet reassembly state machine on an edge. Calling this
    /// on every joypad write is cheap; it only does work when the select
    /// bits actually change.
    pub(crate) fn observe_joypad_write(&mut self, val: u8) {
        let dpad_sel = (val >> 4) & 1;
        let btn_sel = (val >> 5) & 1;
        let sel = (btn_sel << 1) | dpad_sel;

        if sel == self.prev_sel {
            return;
        }
        self.prev_sel = sel;

        match sel {
            0b00 => self.start_packet(),
            0b01 => self.shift_bit(0),
            0b10 => self.shift_bit(1),
            _ => (),
        }
    }

    /// Write a system palette entry transferred via the VRAM tile-data path
    /// while `pal_trn_pending` is set. `idx` is the system-palette index
    /// (0..512) and `color_idx` its slot (0..4) within that palette.
    pub(crate) fn pal_trn_write(&mut self, idx: usize, color_idx: usize, color: u16) {
        if let Some(entry) = self.system_palette.get_mut(idx) {
            entry[color_idx] = color;
        }
    }

    /// Feed one raw byte of the PAL_TRN VRAM stream; every second byte
    /// resolves a little-endian BGR555 color into the system palette.
    pub(crate) fn pal_trn_feed_byte(&mut self, byte: u8) {
        match self.pal_trn_lo.take() {
            None => self.pal_trn_lo = Some(byte),
            Some(lo) => {
                let color = u16::from_le_bytes([lo, byte]);
                let idx = self.pal_trn_count / 4;
                let slot = self.pal_trn_count % 4;
                self.pal_trn_write(idx, slot, color);

                self.pal_trn_count += 1;
                if self.pal_trn_count >= SYSTEM_PALETTE_LEN * 4 {
                    self.pal_trn_pending = false;
                    self.pal_trn_count = 0;
                }
            }
        }
    }

    fn start_packet(&mut self) {
        self.in_packet = true;
        self.bit_idx = 0;
        self.byte_idx = 0;
        self.current = [0; PACKET_LEN];
    }

    fn shift_bit(&mut self, bit: u8) {
        if !self.in_packet {
            return;
        }

        self.current[self.byte_idx as usize] |= bit << self.bit_idx;
        self.bit_idx += 1;
        if self.bit_idx == 8 {
            self.bit_idx = 0;
            self.byte_idx += 1;
        }

        if self.byte_idx as usize == PACKET_LEN {
            self.commit_packet();
        }
    }

    fn commit_packet(&mut self) {
        self.in_packet = false;

        if self.queue.is_empty() {
            self.packet_count = (self.current[0] & 0b111) + 1;
            self.command = self.current[0] >> 3;
        }
        self.queue.push(self.current);

        if self.queue.len() as u8 >= self.packet_count {
            self.dispatch();
        }
    }

    fn dispatch(&mut self) {
        let packets = std::mem::take(&mut self.queue);
        let cmd = self.command;

        match cmd {
            0x00 => self.load_palette_pair(&packets[0], 0, 1), // PAL01
            0x01 => self.load_palette_pair(&packets[0], 2, 3), // PAL23
            0x02 => self.load_palette_pair(&packets[0], 0, 3), // PAL03
            0x03 => self.load_palette_pair(&packets[0], 1, 2), // PAL12
            0x04 => self.apply_attr_blk(&packets),
            0x05 => self.apply_attr_lin(&packets),
            0x06 => self.apply_attr_div(&packets[0]),
            0x07 => self.apply_attr_chr(&packets),
            0x0B => self.pal_trn_pending = true,
            0x17 => self.apply_mask_en(&packets[0]),
            0x11 => self.apply_mlt_req(&packets[0]),
            op => log::trace(&format!("sgb: dropped unsupported command opcode {op:#04x}")),
        }
    }

    /// PAL01/PAL23/PAL03/PAL12: byte 0 is the packet header, byte 1-2 is the
    /// color shared as slot 0 of both named palettes, bytes 3-8 are the
    /// remaining 3 colors of the first palette and bytes 9-14 of the second.
    fn load_palette_pair(&mut self, p: &[u8; PACKET_LEN], a: usize, b: usize) {
        let color = |lo: usize| u16::from_le_bytes([p[lo], p[lo + 1]]);

        let shared = color(1);
        self.palettes[a][0] = shared;
        self.palettes[b][0] = shared;
        for i in 0..3 {
            self.palettes[a][1 + i] = color(3 + i * 2);
        }
        for i in 0..3 {
            self.palettes[b][1 + i] = color(9 + i * 2);
        }
    }

    /// ATTR_BLK: the first payload byte's low 5 bits give a group count,
    /// each group is 6 bytes: control code, palette nibble, and a clamped
    /// (xLeft, yTop, xRight, yBottom) cell rectangle.
    fn apply_attr_blk(&mut self, packets: &[[u8; PACKET_LEN]]) {
        let data = flatten_payload(packets);
        if data.is_empty() {
            return;
        }

        let count = (data[0] & 0b1_1111) as usize;
        let mut idx = 1;

        for _ in 0..count {
            if idx + 6 > data.len() {
                break;
            }

            let ctrl = data[idx];
            let pal = data[idx + 1];
            let x_left = data[idx + 2].min(19);
            let y_top = data[idx + 3].min(17);
            let x_right = data[idx + 4].min(19);
            let y_bottom = data[idx + 5].min(17);
            idx += 6;

            let inside_pal = pal & 0b11;
            let border_pal = (pal >> 2) & 0b11;
            let outside_pal = (pal >> 4) & 0b11;

            let inside = ctrl & 0b001 != 0;
            let border = ctrl & 0b010 != 0;
            let outside = ctrl & 0b100 != 0;

            for y in y_top..=y_bottom {
                for x in x_left..=x_right {
                    let on_border = y == y_top || y == y_bottom || x == x_left || x == x_right;
                    let pal = if on_border && border {
                        Some(border_pal)
                    } else if !on_border && inside {
                        Some(inside_pal)
                    } else if !on_border && outside {
                        Some(outside_pal)
                    } else {
                        None
                    };

                    if let Some(pal) = pal {
                        self.set_cell(x as usize, y as usize, pal);
                    }
                }
            }
        }
    }

    /// ATTR_LIN: a run of 2-byte entries, each selecting a full row or
    /// column and a palette index.
    fn apply_attr_lin(&mut self, packets: &[[u8; PACKET_LEN]]) {
        let data = flatten_payload(packets);
        for entry in data.chunks_exact(2) {
            let (flags, pal_byte) = (entry[0], entry[1]);
            let is_column = flags & 0x80 != 0;
            let index = (flags & 0x1F) as usize;
            let pal = pal_byte & 0b11;

            if is_column {
                let x = index.min(CELLS_X - 1);
                for y in 0..CELLS_Y {
                    self.set_cell(x, y, pal);
                }
            } else {
                let y = index.min(CELLS_Y - 1);
                for x in 0..CELLS_X {
                    self.set_cell(x, y, pal);
                }
            }
        }
    }

    /// ATTR_DIV: splits the screen along one line into two regions plus the
    /// dividing line itself, each with its own palette.
    fn apply_attr_div(&mut self, p: &[u8; PACKET_LEN]) {
        let ctrl = p[1];
        let is_vertical = ctrl & 0x20 != 0;
        let pal_first = ctrl & 0b11;
        let pal_second = (ctrl >> 2) & 0b11;
        let pal_line = (ctrl >> 4) & 0b11;
        let pos = p[2];

        if is_vertical {
            let line = (pos as usize).min(CELLS_X - 1);
            for y in 0..CELLS_Y {
                for x in 0..CELLS_X {
                    let pal = match x.cmp(&line) {
                        std::cmp::Ordering::Less => pal_first,
                        std::cmp::Ordering::Equal => pal_line,
                        std::cmp::Ordering::Greater => pal_second,
                    };
                    self.set_cell(x, y, pal);
                }
            }
        } else {
            let line = (pos as usize).min(CELLS_Y - 1);
            for y in 0..CELLS_Y {
                let pal = match y.cmp(&line) {
                    std::cmp::Ordering::Less => pal_first,
                    std::cmp::Ordering::Equal => pal_line,
                    std::cmp::Ordering::Greater => pal_second,
                };
                for x in 0..CELLS_X {
                    self.set_cell(x, y, pal);
                }
            }
        }
    }

    /// ATTR_CHR: a run of per-cell palette assignments starting at a given
    /// cell, advancing row-major or column-major, packed 4 per byte.
    fn apply_attr_chr(&mut self, packets: &[[u8; PACKET_LEN]]) {
        let data = flatten_payload(packets);
        if data.len() < 4 {
            return;
        }

        let mut x = (data[0] as usize).min(CELLS_X - 1);
        let mut y = (data[1] as usize).min(CELLS_Y - 1);
        let column_major = data[2] & 1 != 0;
        let count = u16::from_le_bytes([data[3], *data.get(4).unwrap_or(&0)]) as usize;

        let mut n = 0;
        'outer: for &byte in &data[5..] {
            for shift in [0, 2, 4, 6] {
                if n >= count {
                    break 'outer;
                }
                let pal = (byte >> shift) & 0b11;
                self.set_cell(x, y, pal);
                n += 1;

                if column_major {
                    y += 1;
                    if y >= CELLS_Y {
                        y = 0;
                        x = (x + 1) % CELLS_X;
                    }
                } else {
                    x += 1;
                    if x >= CELLS_X {
                        x = 0;
                        y = (y + 1) % CELLS_Y;
                    }
                }
            }
        }
    }

    fn apply_mask_en(&mut self, p: &[u8; PACKET_LEN]) {
        let new_mask = match p[1] & 0b11 {
            0 => MaskMode::Off,
            1 => MaskMode::Freeze,
            2 => MaskMode::Black,
            _ => MaskMode::White,
        };

        if matches!(new_mask, MaskMode::Off) {
            self.frozen = None;
        }
        self.mask = new_mask;
    }

    fn apply_mlt_req(&mut self, p: &[u8; PACKET_LEN]) {
        self.multitap_enabled = p[1] & 0b11 != 0;
        self.joypad_rotation = 0;
    }

    fn set_cell(&mut self, x: usize, y: usize, pal: u8) {
        if x < CELLS_X && y < CELLS_Y {
            self.cell_palette[y * CELLS_X + x] = pal;
        }
    }

    /// Advance the multitap rotation index; the host calls this once per
    /// full P1-P4 joypad read cycle it performs.
    pub(crate) fn advance_joypad_rotation(&mut self) -> u8 {
        let cur = self.joypad_rotation;
        if self.multitap_enabled {
            self.joypad_rotation = (self.joypad_rotation + 1) % 4;
        }
        cur
    }

    /// Colorize a monochrome 2-bit index frame into RGBA using the
    /// per-cell palette map, honoring the current freeze/mask state.
    pub(crate) fn colourise_frame(
        &mut self,
        mono: &[[u8; SCREEN_RESOLUTION.0]; SCREEN_RESOLUTION.1],
    ) -> Frame {
        if self.mask == MaskMode::Freeze {
            if let Some(frame) = &self.frozen {
                return frame.clone();
            }
        }

        let mut frame = Frame::default();
        for y in 0..SCREEN_RESOLUTION.1 {
            for x in 0..SCREEN_RESOLUTION.0 {
                let color = match self.mask {
                    MaskMode::Black => Color { r: 0, g: 0, b: 0 },
                    MaskMode::White => Color {
                        r: 255,
                        g: 255,
                        b: 255,
                    },
                    _ => {
                        let cell = (y / 8) * CELLS_X + (x / 8);
                        let pal = self.cell_palette[cell] as usize;
                        let idx = mono[y][x] as usize;
                        bgr555_to_color(self.palettes[pal][idx])
                    }
                };
                frame.set(x, y, color);
            }
        }

        if self.mask == MaskMode::Off {
            self.frozen = Some(frame.clone());
        }
        frame
    }
}

/// Flatten a queued packet sequence into a single payload stream, dropping
/// only the first packet's header byte (packet-count/opcode).
fn flatten_payload(packets: &[[u8; PACKET_LEN]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(packets.len() * PACKET_LEN);
    for (i, packet) in packets.iter().enumerate() {
        if i == 0 {
            out.extend_from_slice(&packet[1..]);
        } else {
            out.extend_from_slice(packet);
        }
    }
    out
}

#[inline]
fn bgr555_to_color(raw: u16) -> Color {
    const SCALE: u8 = 255 / 31;
    let c = CgbPaletteColor::new(raw);
    Color {
        r: (c.red as u8) * SCALE,
        g: (c.green as u8) * SCALE,
        b: (c.blue as u8) * SCALE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send_reset(sgb: &mut Sgb) {
        sgb.observe_joypad_write(0b0000_0000);
        sgb.observe_joypad_write(0b0011_0000); // back to idle before next edge
    }

    fn send_bit(sgb: &mut Sgb, bit: u8) {
        let sel = if bit == 0 { 0b01_0000 } else { 0b10_0000 };
        sgb.observe_joypad_write(sel);
        sgb.observe_joypad_write(0b0011_0000);
    }

    fn send_byte(sgb: &mut Sgb, byte: u8) {
        for i in 0..8 {
            send_bit(sgb, (byte >> i) & 1);
        }
    }

    #[test]
    fn pal01_command_loads_shared_color0() {
        let mut sgb = Sgb::new();
        send_reset(&mut sgb);

        let mut packet = [0u8; PACKET_LEN];
        packet[0] = 0 << 3 | 0; // PAL01, packet-count=1
        packet[1..3].copy_from_slice(&0x1234u16.to_le_bytes()); // shared color0
        packet[3..5].copy_from_slice(&1u16.to_le_bytes());
        packet[5..7].copy_from_slice(&2u16.to_le_bytes());
        packet[7..9].copy_from_slice(&3u16.to_le_bytes());
        packet[9..11].copy_from_slice(&4u16.to_le_bytes());
        packet[11..13].copy_from_slice(&5u16.to_le_bytes());
        packet[13..15].copy_from_slice(&6u16.to_le_bytes());

        for &byte in &packet {
            send_byte(&mut sgb, byte);
        }

        assert_eq!(sgb.palettes[0][0], 0x1234);
        assert_eq!(sgb.palettes[1][0], 0x1234);
        assert_eq!(sgb.palettes[0][1], 1);
        assert_eq!(sgb.palettes[1][1], 4);
    }

    #[test]
    fn mask_en_black_overrides_cell_palettes() {
        let mut sgb = Sgb::new();
        let mono = [[0u8; SCREEN_RESOLUTION.0]; SCREEN_RESOLUTION.1];

        let mut packet = [0u8; PACKET_LEN];
        packet[1] = 2; // MASK_EN = black
        sgb.apply_mask_en(&packet);

        let frame = sgb.colourise_frame(&mono);
        assert_eq!(frame.get(0, 0), Color { r: 0, g: 0, b: 0 });
    }

    #[test]
    fn unsupported_command_is_dropped_without_panicking() {
        let mut sgb = Sgb::new();
        send_reset(&mut sgb);

        let mut packet = [0u8; PACKET_LEN];
        packet[0] = 0x1F << 3; // an opcode outside the supported set
        for &byte in &packet {
            send_byte(&mut sgb, byte);
        }
        // No supported state should have changed.
        assert_eq!(sgb.palettes, [[0; 4]; 4]);
    }

    #[test]
    fn pal_trn_feed_byte_fills_system_palette_and_clears_pending() {
        let mut sgb = Sgb::new();
        sgb.pal_trn_pending = true;

        for i in 0..SYSTEM_PALETTE_LEN * 4 {
            let color = (i as u16).wrapping_mul(7) & 0x7FFF;
            let [lo, hi] = color.to_le_bytes();
            sgb.pal_trn_feed_byte(lo);
            sgb.pal_trn_feed_byte(hi);
        }

        assert!(!sgb.pal_trn_pending);
        assert_eq!(sgb.system_palette[0][0], 0);
        assert_eq!(sgb.system_palette[1][0], (4u16 * 7) & 0x7FFF);
        assert_eq!(
            sgb.system_palette[SYSTEM_PALETTE_LEN - 1][3],
            ((SYSTEM_PALETTE_LEN * 4 - 1) as u16).wrapping_mul(7) & 0x7FFF
        );
    }
}
