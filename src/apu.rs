//! Audio Processing Unit register bank.
//!
//! This is a register-access hook only: it stores exactly the bits real
//! software can observe (including the read-only-high "unused" bits) and
//! gates writes on the master power bit, but never synthesizes samples.

use bincode::{Decode, Encode};

use crate::info::*;

const NR10: usize = IO_NR10 - IO_NR10;
const NR11: usize = IO_NR11 - IO_NR10;
const NR12: usize = IO_NR12 - IO_NR10;
const NR13: usize = IO_NR13 - IO_NR10;
const NR14: usize = IO_NR14 - IO_NR10;
const NR21: usize = IO_NR21 - IO_NR10;
const NR22: usize = IO_NR22 - IO_NR10;
const NR23: usize = IO_NR23 - IO_NR10;
const NR24: usize = IO_NR24 - IO_NR10;
const NR30: usize = IO_NR30 - IO_NR10;
const NR31: usize = IO_NR31 - IO_NR10;
const NR32: usize = IO_NR32 - IO_NR10;
const NR33: usize = IO_NR33 - IO_NR10;
const NR34: usize = IO_NR34 - IO_NR10;
const NR41: usize = IO_NR41 - IO_NR10;
const NR42: usize = IO_NR42 - IO_NR10;
const NR43: usize = IO_NR43 - IO_NR10;
const NR44: usize = IO_NR44 - IO_NR10;
const NR50: usize = IO_NR50 - IO_NR10;
const NR51: usize = IO_NR51 - IO_NR10;
const NR52: usize = IO_NR52 - IO_NR10;
const REGS_LEN: usize = IO_NR52 - IO_NR10 + 1;

/// Bits that always read back as 1 regardless of what was written, per
/// register offset from `IO_NR10`. Registers not listed here are fully
/// readable/writable.
fn open_bus_mask(offset: usize) -> u8 {
    match offset {
        NR10 => 0x80,
        NR11 => 0x3F,
        NR13 => 0xFF,
        NR14 => 0xBF,
        NR21 => 0x3F,
        NR23 => 0xFF,
        NR24 => 0xBF,
        NR30 => 0x7F,
        NR31 => 0xFF,
        NR32 => 0x9F,
        NR33 => 0xFF,
        NR34 => 0xBF,
        NR41 => 0xFF,
        NR44 => 0xBF,
        NR52 => 0x70,
        _ => 0x00,
    }
}

#[derive(Encode, Decode)]
pub(crate) struct Apu {
    regs: [u8; REGS_LEN],
    pub(crate) wave_ram: [u8; SIZE_AUDIO_WAVE_RAM],
}

impl Apu {
    pub(crate) fn new() -> Self {
        Self {
            regs: [0; REGS_LEN],
            wave_ram: [0; SIZE_AUDIO_WAVE_RAM],
        }
    }

    /// Nothing to advance without sample synthesis; kept so the caller's
    /// tick loop doesn't need to special-case audio.
    pub(crate) fn tick(&mut self, _dots: u32, _apu_ticks: u8) {}

    pub(crate) fn read(&self, addr: usize) -> u8 {
        self.regs[addr - IO_NR10] | open_bus_mask(addr - IO_NR10)
    }

    pub(crate) fn write(&mut self, addr: usize, val: u8) {
        let offset = addr - IO_NR10;

        if offset == NR52 {
            let was_on = self.is_on();
            self.regs[NR52] = val & 0x80;
            if was_on && !self.is_on() {
                self.power_off();
            }
            return;
        }

        if !self.is_on() {
            return;
        }

        self.regs[offset] = val;
    }

    fn is_on(&self) -> bool {
        self.regs[NR52] & 0x80 != 0
    }

    /// Powering off clears every register except NR52 itself and the
    /// length-timer load registers, which stay writable while APU is off.
    fn power_off(&mut self) {
        for (i, r) in self.regs.iter_mut().enumerate() {
            if !matches!(i, NR11 | NR21 | NR31 | NR41 | NR52) {
                *r = 0;
            }
        }
    }
}
