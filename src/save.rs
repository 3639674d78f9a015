//! Save-file handling: battery-backed cartridge RAM (`.gsv`) and full
//! emulator-state snapshots used by the CLI's `resume`/`extract-rom`
//! commands.

use std::{
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use bincode::config;

use crate::{cartridge::Cartidge, cpu::Cpu, log, EmulatorErr};

const BINCODE_CONFIG: config::Configuration = config::standard();

/// Load battery RAM (and RTC state, if the cartridge has one) from disk into
/// `cart`. If `path` does not exist yet, the RTC is seeded from the host's
/// current wall-clock time instead, same as a freshly inserted cartridge
/// would start ticking from power-on.
pub(crate) fn load_battery_save(cart: &mut Cartidge, path: &Path) -> Result<(), EmulatorErr> {
    let data = match std::fs::read(path) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if cart.has_timer() {
                let secs = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                cart.seed_rtc(secs);
            }
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let ram_len = cart.battery_ram().len();
    if data.len() < ram_len || (cart.has_timer() && data.len() != ram_len + 16) {
        return Err(EmulatorErr::SaveFileCorrupted);
    }

    cart.load_battery_ram(&data[..ram_len]);
    if cart.has_timer() {
        let mut rtc = [0u8; 16];
        rtc.copy_from_slice(&data[ram_len..ram_len + 16]);
        cart.load_rtc_save_bytes(&rtc);
    }

    log::trace("save: loaded battery save file");
    Ok(())
}

/// Write battery RAM (and RTC state, if present) to disk at `path`.
pub(crate) fn save_battery_save(cart: &Cartidge, path: &Path) -> Result<(), EmulatorErr> {
    if cart.battery_ram().is_empty() && !cart.has_timer() {
        return Ok(());
    }

    let mut data = cart.battery_ram().to_vec();
    if cart.has_timer() {
        data.extend_from_slice(&cart.rtc_save_bytes());
    }

    std::fs::write(path, data)?;
    log::trace("save: wrote battery save file");
    Ok(())
}

/// Encode the full emulator state (including the ROM image, via the
/// cartridge's own fields) into a single self-contained byte buffer.
pub(crate) fn encode_state(cpu: &Cpu) -> Vec<u8> {
    bincode::encode_to_vec(cpu, BINCODE_CONFIG).expect("encoding emulator state never fails")
}

/// Decode a full emulator-state snapshot produced by `encode_state`.
pub(crate) fn decode_state(bytes: &[u8]) -> Result<Cpu, EmulatorErr> {
    let (cpu, _) = bincode::decode_from_slice(bytes, BINCODE_CONFIG)
        .map_err(|_| EmulatorErr::SaveFileCorrupted)?;
    Ok(cpu)
}
