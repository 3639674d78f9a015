use std::{
    fmt::{Debug, Display},
    fs::File,
    io::Write,
    path::{Path, PathBuf},
    process::exit,
    time::Instant,
};

use clap::{Parser, Subcommand};
use gbemu::{ButtonState, Emulator, Frame, TickOutcome};

#[derive(Parser)]
#[command(name = "gbemu", about = "Gameboy Emulator")]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a ROM into the emulator and run it headlessly.
    #[command(arg_required_else_help = true)]
    Run {
        /// Gameboy ROM file
        rom_file: PathBuf,
        /// Save the emulator state into a save file on exit
        #[arg(long, value_name = "SAVE_FILE")]
        save_to: Option<PathBuf>,
        #[command(flatten)]
        run: RunOpts,
    },

    /// Resume the emulator from a save file, on exit the new state is
    /// saved into the same file unless changed using options below.
    #[command(verbatim_doc_comment, arg_required_else_help = true)]
    Resume {
        /// Saved file
        save_file: PathBuf,
        /// Do not save new state into the current save file
        #[arg(long, conflicts_with = "save_to")]
        no_save: bool,
        /// Save new state into the given file while leaving the
        /// current save file unchanged
        #[arg(long, value_name = "SAVE_FILE", conflicts_with = "no_save")]
        save_to: Option<PathBuf>,
        #[command(flatten)]
        run: RunOpts,
    },

    /// Extract ROM from the save file and save it into the given file
    ExtractRom {
        /// Saved file
        save_file: PathBuf,
        /// New ROM file
        rom_file: PathBuf,
    },
}

#[derive(clap::Args)]
struct RunOpts {
    /// Stop after this many frames instead of running until interrupted
    #[arg(long, value_name = "N")]
    frames: Option<u64>,
    /// Dump every completed frame as a PPM image into this directory
    #[arg(long, value_name = "DIR")]
    dump_ppm: Option<PathBuf>,
}

fn main() {
    #[cfg(feature = "cli")]
    env_logger::init();

    let cli = Cli::parse();
    let (emulator, save_to, run) = match cli.commands {
        Commands::Run {
            rom_file,
            save_to,
            run,
        } => (
            Emulator::from_rom(&read_or_exit(&rom_file, "ROM file")),
            save_to,
            run,
        ),

        Commands::Resume {
            save_file,
            no_save,
            save_to,
            run,
        } => {
            let save_to = if no_save {
                None
            } else if save_to.is_some() {
                save_to
            } else {
                Some(save_file.clone())
            };
            (
                Emulator::from_saved(&read_or_exit(&save_file, "save file")),
                save_to,
                run,
            )
        }

        Commands::ExtractRom {
            save_file,
            rom_file,
        } => {
            match Emulator::rom_from_saved(&read_or_exit(&save_file, "save file")) {
                Ok(rom) => {
                    write_or_exit(&rom_file, "ROM file", &rom);
                    eprintln!("ROM saved to file {rom_file:?}.");
                }
                Err(e) => err_exit("Decoding save file failed", e),
            }
            return;
        }
    };

    if let Some(path) = &save_to {
        if path.exists() && !path.is_file() {
            err_exit(format!("{path:?} is not a file"), "InvalidArgument");
        }
    }

    let mut emulator = match emulator {
        Ok(e) => e,
        Err(e) => err_exit("Failed to initialize emulator", e),
    };

    if let Some(dir) = &run.dump_ppm {
        if let Err(e) = std::fs::create_dir_all(dir) {
            err_exit(format!("Cannot create PPM output directory {dir:?}"), e.kind());
        }
    }

    run_headless(&mut emulator, &run);

    if let Some(path) = save_to {
        let data = emulator.save_state();
        write_or_exit(&path, "save file", &data);
        eprintln!("Game state saved to file {path:?}.");
    }

    eprintln!("Quit.");
}

/// Pump the emulator with real wall-clock deltas until either the
/// requested frame count is reached or the CPU halts on an illegal
/// opcode. With no `--frames` limit this runs until the process itself
/// is interrupted.
fn run_headless(emulator: &mut Emulator, run: &RunOpts) {
    let mut frame = Frame::default();
    let mut frame_count: u64 = 0;
    let mut last = Instant::now();

    loop {
        if let Some(limit) = run.frames {
            if frame_count >= limit {
                break;
            }
        }

        let now = Instant::now();
        let elapsed_ms = now.duration_since(last).as_secs_f64() * 1000.0;
        last = now;

        match emulator.tick(elapsed_ms, ButtonState::default()) {
            TickOutcome::FrameReady => {
                emulator.fill_frame(&mut frame);
                frame_count += 1;
                if let Some(dir) = &run.dump_ppm {
                    dump_ppm(dir, frame_count, &frame);
                }
            }
            TickOutcome::Running => {}
            TickOutcome::Halted => {
                eprintln!("CPU halted on an illegal opcode after {frame_count} frames.");
                break;
            }
        }
    }
}

fn dump_ppm(dir: &Path, frame_no: u64, frame: &Frame) {
    let path = dir.join(format!("frame_{frame_no:06}.ppm"));
    let (w, h) = gbemu::SCREEN_SIZE;

    let mut data = Vec::with_capacity(w * h * 3 + 32);
    data.extend_from_slice(format!("P6\n{w} {h}\n255\n").as_bytes());
    for y in 0..h {
        for x in 0..w {
            let c = frame.get(x, y);
            data.extend_from_slice(&[c.r, c.g, c.b]);
        }
    }

    if let Err(e) = std::fs::write(&path, data) {
        eprintln!("Warning: failed to write {path:?}: {e}");
    }
}

fn read_or_exit(path: &PathBuf, err_name: &str) -> Vec<u8> {
    match std::fs::read(path) {
        Ok(ret) => ret,
        Err(e) => err_exit(
            format!("Cannot open {err_name} {path:?} for reading"),
            e.kind(),
        ),
    }
}

fn write_or_exit(path: &PathBuf, err_name: &str, data: &[u8]) {
    match File::create(path) {
        Ok(mut f) => {
            if let Err(e) = f.write_all(data) {
                err_exit(format!("Write to {err_name} {path:?} failed"), e.kind());
            }
        }
        Err(e) => err_exit(
            format!("Cannot open {err_name} {path:?} for writing"),
            e.kind(),
        ),
    }
}

fn err_exit<M: Display, E: Debug>(msg: M, err: E) -> ! {
    eprintln!("{msg}.");
    eprintln!("Error: {err:?}.");
    exit(1);
}
