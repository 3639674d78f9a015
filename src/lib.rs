mod apu;
mod cartridge;
mod counter;
mod cpu;
mod emulator;
mod frame;
mod info;
mod log;
mod macros;
mod mmu;
mod msg;
mod ppu;
mod regs;
mod save;
#[cfg(feature = "sgb")]
mod sgb;
mod serial;
mod timer;

pub use emulator::{Emulator, TickOutcome};
pub use frame::{Color, Frame, SCREEN_SIZE};
pub use info::FREQUENCY;
pub use msg::ButtonState;

/// Errors surfaced across the crate's fallible boundaries: ROM loading,
/// save-file I/O, and cartridge-header interpretation.
#[derive(Debug, thiserror::Error)]
pub enum EmulatorErr {
    #[error("save file is corrupted or was not produced by this emulator")]
    SaveFileCorrupted,
    #[error("ROM image size ({0} bytes) is not valid for a Game Boy cartridge")]
    InvalidRomSize(usize),
    #[error("ROM size in header does not match the ROM image's actual length")]
    RomSizeMismatch,
    #[error("cartridge header declares an unknown ROM size byte (0x{0:02X})")]
    UnknownRomSize(u8),
    #[error("cartridge header declares an unknown RAM size byte (0x{0:02X})")]
    UnknownRamSize(u8),
    #[error("cartridge header logo does not match the required boot logo")]
    MissingLogo,
    #[error("cartridge header checksum 0x{0:02X} does not match computed 0x{1:02X}")]
    HeaderChecksumMismatch(u8, u8),
    #[error("cartridge header declares an unsupported or unknown mapper byte (0x{0:02X})")]
    UnknownMBC(u8),
    #[error("cartridge type 0x{0:02X} ({1}) is a recognized but unimplemented mapper")]
    NotImplemented(u8, &'static str),
    #[error("I/O error while accessing save file: {0}")]
    Io(#[from] std::io::Error),
}
