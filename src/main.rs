//! # Romualdo compiler and VM executable
//!
//! `romualdo <path>` compiles a storyworld source file and runs it
//! immediately. `--emit-bytecode`/`--from-bytecode` exercise the persisted
//! bytecode framing instead of recompiling from source every time;
//! `--disassemble` prints a chunk's instructions instead of executing them.

use clap::Parser;
use romualdo::bytecode::disassemble::disassemble_chunk;
use romualdo::{compiler, persist, vm};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "romualdo", version, about = "Storyworld compiler and virtual machine")]
struct Cli {
    /// Storyworld source file, or a compiled bytecode file with --from-bytecode.
    path: PathBuf,

    /// Write the compiled bytecode to this path instead of running it.
    #[arg(long, value_name = "OUT")]
    emit_bytecode: Option<PathBuf>,

    /// Treat `path` as a bytecode file produced by --emit-bytecode.
    #[arg(long)]
    from_bytecode: bool,

    /// Print disassembled instructions instead of executing.
    #[arg(long)]
    disassemble: bool,
}

const EX_USAGE: u8 = 64;
const EX_SOFTWARE: u8 = 70;

fn main() -> ExitCode {
    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            eprint!("{e}");
            return ExitCode::from(EX_USAGE);
        }
    };

    run(cli)
}

fn run(cli: Cli) -> ExitCode {
    let mut unit = if cli.from_bytecode {
        let bytes = match std::fs::read(&cli.path) {
            Ok(b) => b,
            Err(e) => {
                eprintln!("{e}");
                return ExitCode::from(EX_USAGE);
            }
        };
        let payload = match persist::unframe(&bytes) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("{e}");
                return ExitCode::from(EX_USAGE);
            }
        };
        match persist::deserialize_unit(payload) {
            Ok(unit) => unit,
            Err(e) => {
                eprintln!("{e}");
                return ExitCode::from(EX_USAGE);
            }
        }
    } else {
        let source = match std::fs::read_to_string(&cli.path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("{e}");
                return ExitCode::from(EX_USAGE);
            }
        };
        match compiler::compile(&source) {
            Ok(unit) => unit,
            Err(errors) => {
                for e in &errors {
                    eprintln!("{e}");
                }
                return ExitCode::from(1);
            }
        }
    };

    if let Some(out_path) = &cli.emit_bytecode {
        let payload = persist::serialize_unit(&unit);
        let framed = persist::frame(&payload);
        if let Err(e) = std::fs::write(out_path, framed) {
            eprintln!("{e}");
            return ExitCode::from(EX_USAGE);
        }
        return ExitCode::SUCCESS;
    }

    if cli.disassemble {
        for idx in 0..unit.chunks.len() as u32 {
            print!("{}", disassemble_chunk(&unit, idx));
        }
        return ExitCode::SUCCESS;
    }

    let mut stdout = std::io::stdout();
    match vm::run(&mut unit, &mut stdout) {
        Ok(status) => ExitCode::from(status as u8),
        Err(vm::ExecError::Runtime(e)) => {
            eprintln!("{e}");
            ExitCode::from(2)
        }
        Err(vm::ExecError::Internal(e)) => {
            eprintln!("{e}");
            ExitCode::from(EX_SOFTWARE)
        }
    }
}
