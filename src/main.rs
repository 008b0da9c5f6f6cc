use clap::{Parser as ClapParser, ValueEnum};
use monkey::compiler::Compiler;
use monkey::environment::Environment;
use monkey::error::MonkeyError;
use monkey::vm::Vm;
use monkey::repl;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EngineArg {
    Eval,
    Vm,
}

/// A small dynamically-typed scripting language: lexer, Pratt parser, tree-walking evaluator, and
/// bytecode compiler/VM.
#[derive(Debug, ClapParser)]
#[command(name = "monkey", version, about)]
struct Cli {
    /// Source file to run. If omitted, starts the REPL.
    file: Option<PathBuf>,

    /// Which execution engine to use.
    #[arg(long, value_enum, default_value = "vm")]
    engine: EngineArg,

    /// Raise logging verbosity (pass multiple times for more detail).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.file {
        Some(path) => match run_file(&path, cli.engine) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                log::error!("{err}");
                eprintln!("{err}");
                ExitCode::FAILURE
            }
        },
        None => {
            let engine = match cli.engine {
                EngineArg::Eval => repl::Engine::Eval,
                EngineArg::Vm => repl::Engine::Vm,
            };
            if let Err(err) = repl::run(engine) {
                log::error!("repl error: {err}");
                eprintln!("{err}");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
}

fn run_file(path: &PathBuf, engine: EngineArg) -> monkey::Result<()> {
    let source = std::fs::read_to_string(path).map_err(|e| {
        MonkeyError::Runtime(format!("could not read {}: {e}", path.display()))
    })?;

    let program = monkey::parse_checked(&source)?;

    let result = match engine {
        EngineArg::Eval => monkey::evaluator::eval_program(&program, &Environment::new()),
        EngineArg::Vm => {
            let bytecode = Compiler::new()
                .compile_program(&program)
                .map_err(MonkeyError::Compile)?;
            let mut vm = Vm::new(bytecode);
            vm.run().map_err(|e| {
                MonkeyError::Runtime(e.error_message().unwrap_or_default().to_string())
            })?;
            vm.last_popped_stack_elem()
        }
    };

    if let Some(msg) = result.error_message() {
        return Err(MonkeyError::Runtime(msg.to_string()));
    }

    Ok(())
}
