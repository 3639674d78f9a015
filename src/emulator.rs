//! Orchestrator tying together the CPU/MMU/PPU stack behind a single
//! `tick`-driven API, decoupled from any particular front-end or clock
//! source. Callers push wall-clock deltas in; the emulator converts them
//! into an M-cycle budget and pumps the CPU until either a frame finishes
//! or the budget runs out.

use std::time::{SystemTime, UNIX_EPOCH};

use bincode::{Decode, Encode};

use crate::{
    cartridge::Cartidge, cpu::Cpu, frame::Frame, info, mmu::Mmu, msg::ButtonState, save,
    EmulatorErr,
};

/// Result of a single `Emulator::tick` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A full frame was completed; pull it out via `Emulator::fill_frame`.
    FrameReady,
    /// Cycle budget for this tick was consumed without finishing a frame.
    Running,
    /// The CPU hit an illegal opcode and has permanently stopped executing.
    Halted,
}

#[derive(Encode, Decode)]
pub struct Emulator {
    cpu: Cpu,
    /// Leftover fractional M-cycles carried over from the previous tick, so
    /// short or irregularly-spaced ticks do not lose cycles.
    cycle_debt: f64,
    was_vblank: bool,
}

impl Emulator {
    /// Load a cartridge from raw ROM bytes, put the CPU in its post-bootrom
    /// state and start a fresh emulator.
    pub fn from_rom(rom: &[u8]) -> Result<Self, EmulatorErr> {
        let cart = Cartidge::new(rom)?;
        let mmu = Mmu::new(cart);
        let mut cpu = Cpu::new(mmu);
        init_post_bootrom(&mut cpu);
        Ok(Self::from_cpu(cpu))
    }

    /// Restore a previously saved full emulator-state snapshot.
    pub fn from_saved(bytes: &[u8]) -> Result<Self, EmulatorErr> {
        let cpu = save::decode_state(bytes)?;
        Ok(Self::from_cpu(cpu))
    }

    /// Recover just the ROM image embedded in a saved snapshot, without
    /// resuming execution.
    pub fn rom_from_saved(bytes: &[u8]) -> Result<Vec<u8>, EmulatorErr> {
        let cpu = save::decode_state(bytes)?;
        Ok(cpu.mmu.cart.rom_bytes().to_vec())
    }

    fn from_cpu(cpu: Cpu) -> Self {
        Self {
            cpu,
            cycle_debt: 0.0,
            was_vblank: false,
        }
    }

    /// Encode the full emulator state (CPU, MMU, cartridge and embedded ROM)
    /// into a self-contained byte buffer suitable for `from_saved`.
    pub fn save_state(&self) -> Vec<u8> {
        save::encode_state(&self.cpu)
    }

    /// Does the inserted cartridge have battery-backed RAM (or an RTC)
    /// worth persisting to a `.gsv` file.
    pub fn has_battery(&self) -> bool {
        !self.cpu.mmu.cart.battery_ram().is_empty() || self.cpu.mmu.cart.has_timer()
    }

    /// Load a `.gsv` battery-save file into the cartridge, seeding the RTC
    /// from the host clock if the file does not exist yet.
    pub fn load_battery_save(&mut self, path: &std::path::Path) -> Result<(), EmulatorErr> {
        save::load_battery_save(&mut self.cpu.mmu.cart, path)
    }

    /// Write the cartridge's battery RAM (and RTC state, if any) out to a
    /// `.gsv` file.
    pub fn save_battery_save(&self, path: &std::path::Path) -> Result<(), EmulatorErr> {
        save::save_battery_save(&self.cpu.mmu.cart, path)
    }

    /// Copy the currently completed frame's pixels into `frame`.
    pub fn fill_frame(&self, frame: &mut Frame) {
        self.cpu.mmu.ppu.fill_frame(frame);
    }

    /// Advance the emulator by `elapsed_ms` milliseconds of wall-clock time,
    /// applying the given button state at the start of the tick.
    pub fn tick(&mut self, elapsed_ms: f64, buttons: ButtonState) -> TickOutcome {
        if !self.cpu.running {
            return TickOutcome::Halted;
        }

        let (dpad, btns) = buttons.to_internal_repr();
        self.cpu.mmu.update_joypad(dpad, btns);

        let wanted = elapsed_ms / 1000.0 * self.cpu.frequency as f64 + self.cycle_debt;
        let mut budget = (wanted as u64).min(info::MAX_CYCLE_BUDGET);
        self.cycle_debt = wanted - budget as f64;

        while budget > 0 {
            if !self.cpu.running {
                return TickOutcome::Halted;
            }

            let mcycles = self.cpu.step() as u64;
            budget = budget.saturating_sub(mcycles);

            let is_vblank = self.cpu.mmu.get_mode() == info::MODE_VBLANK;
            if is_vblank && !self.was_vblank {
                self.was_vblank = true;
                self.cpu.mmu.finish_frame();
                return TickOutcome::FrameReady;
            }
            self.was_vblank = is_vblank;
        }

        TickOutcome::Running
    }
}

/// Bring the CPU up into the state the boot ROM would have left it in,
/// since we skip running the actual boot ROM. Values are the well known
/// post-bootrom register/IO defaults.
fn init_post_bootrom(cpu: &mut Cpu) {
    cpu.pc.0 = 0x0100;
    cpu.sp.0 = 0xFFFE;

    let m = &mut cpu.mmu;
    m.joypad.write(0xCF);
    m.wram_idx = 1;
    m.ppu.bgp = 0xFC;
    m.ppu.fetcher.lcdc.write(0x91);
    m.ppu.stat.write(0x85);

    // CGB boot ROM leaves palette RAM in a pseudo-random state; games that
    // rely on reading it back before setting their own palettes expect some
    // noise rather than all-zero. Seed a tiny PRNG from the host clock.
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
        | 1;
    let mut rng = seed;
    let mut next = || {
        rng ^= rng << 13;
        rng ^= rng >> 7;
        rng ^= rng << 17;
        rng
    };
    for n in m.ppu.bg_palette.iter_mut() {
        *n = next() as u8;
    }
    for n in m.ppu.obj_palette.iter_mut() {
        *n = next() as u8;
    }
}
