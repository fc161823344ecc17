use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use goblin::elf::program_header::PT_LOAD;
use log::{debug, error, info};

use deimos_core::board::Board;
use deimos_core::registers::Specifier;

#[derive(Parser, Debug)]
#[command(version, about = "Run an RV32I image on the deimos core", long_about = None)]
struct Args {
    /// Image to execute: an ELF file, or a flat binary loaded at 0.
    binary: PathBuf,
    /// Treat the image as a flat binary even if it looks like an ELF.
    #[arg(long)]
    raw: bool,
    /// Maximum number of clock ticks to simulate.
    #[arg(short, long, default_value_t = 10_000_000)]
    cycles: u64,
    /// Log every retired instruction.
    #[arg(short, long)]
    trace: bool,
    /// Log level (error, warn, info, debug, trace).
    #[arg(long, default_value = "info")]
    log: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let logger = match flexi_logger::Logger::try_with_str(&args.log) {
        Ok(logger) => logger.start().ok(),
        Err(e) => {
            eprintln!("bad log level: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = run(&args);
    drop(logger);
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), String> {
    let image = fs::read(&args.binary)
        .map_err(|e| format!("cannot read {}: {e}", args.binary.display()))?;

    let mut board = Board::new().map_err(|e| format!("bad microcode image: {e}"))?;
    if !args.raw && image.starts_with(b"\x7fELF") {
        load_elf(&mut board, &image)?;
    } else {
        board.load(0, &image);
    }

    let mut retired: u64 = 0;
    for tick in 0..args.cycles {
        if let Some(retirement) = board.tick() {
            retired += 1;
            if args.trace {
                info!(
                    "retire #{:<6} pc {:#010x} insn {:#010x}{}{}",
                    retirement.order,
                    retirement.pc_rdata,
                    retirement.insn,
                    if retirement.trap { " trap" } else { "" },
                    if retirement.intr { " intr" } else { "" },
                );
            }
        }
        if board.core().halted() {
            info!("core halted after {tick} ticks");
            break;
        }
    }

    info!(
        "{retired} instructions retired, final pc {:#010x}",
        board.core().pc()
    );
    for index in (0u32..32).step_by(4) {
        info!(
            "x{index:<2} {:#010x}  x{:<2} {:#010x}  x{:<2} {:#010x}  x{:<2} {:#010x}",
            board.core().x(Specifier::from_bits(index)),
            index + 1,
            board.core().x(Specifier::from_bits(index + 1)),
            index + 2,
            board.core().x(Specifier::from_bits(index + 2)),
            index + 3,
            board.core().x(Specifier::from_bits(index + 3)),
        );
    }
    Ok(())
}

fn load_elf(board: &mut Board, image: &[u8]) -> Result<(), String> {
    let elf = goblin::elf::Elf::parse(image).map_err(|e| format!("bad ELF: {e}"))?;
    for header in elf.program_headers.iter().filter(|h| h.p_type == PT_LOAD) {
        debug!(
            "loading segment: file range [{:#010x}..{:#010x}] to [{:#010x}..{:#010x}]",
            header.p_offset,
            header.p_offset + header.p_filesz,
            header.p_paddr,
            header.p_paddr + header.p_memsz,
        );
        let range = header.file_range();
        if range.end > image.len() {
            return Err("ELF segment extends past end of file".into());
        }
        board.load(header.p_paddr as u32, &image[range]);
    }
    Ok(())
}
