//! The interactive read-eval-print loop: reads lines with `rustyline`, parses each one, then
//! either evaluates it or compiles-and-runs it, printing the resulting value or any diagnostic.
//!
//! Grounded on `original_source/compiler/repl.cpp`'s prompt loop (parse → compile → run, printing
//! parser errors without bailing, preserving compiler/VM state across lines) restructured around
//! `rustyline` for line editing and history, per the pack's convention for REPL binaries.

use crate::compiler::Compiler;
use crate::environment::Environment;
use crate::parser::parse;
use crate::symbol_table::SymbolTable;
use crate::value::Value;
use crate::vm::Vm;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

const PROMPT: &str = ">> ";

/// Which engine the REPL drives each line through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Eval,
    Vm,
}

/// Runs the REPL until EOF (Ctrl-D) or an interrupt (Ctrl-C).
pub fn run(engine: Engine) -> rustyline::Result<()> {
    let mut editor = DefaultEditor::new()?;
    let history_path = history_file_path();
    if let Some(path) = &history_path {
        let _ = editor.load_history(path);
    }

    println!("Hello! This is the Monkey programming language.");
    println!("Feel free to type in commands.");

    let env = Environment::new();
    let symbol_table = SymbolTable::new();
    for (i, builtin) in crate::builtins::BUILTINS.iter().enumerate() {
        symbol_table.define_builtin(i, builtin.name);
    }
    let mut constants = Vec::new();
    let mut globals = vec![Value::Null; 65536];

    loop {
        match editor.readline(PROMPT) {
            Ok(line) => {
                let _ = editor.add_history_entry(&line);
                if line.trim().is_empty() {
                    continue;
                }

                let (program, errors) = parse(&line);
                if !errors.is_empty() {
                    print_parse_errors(&errors);
                    continue;
                }

                match engine {
                    Engine::Eval => {
                        let result = crate::evaluator::eval_program(&program, &env);
                        println!("{result}");
                    }
                    Engine::Vm => {
                        let compiler = Compiler::new_with_state(symbol_table.clone(), constants.clone());
                        match compiler.compile_program(&program) {
                            Ok(bytecode) => {
                                constants = bytecode.constants.clone();
                                let mut vm = Vm::with_globals(bytecode, globals.clone());
                                match vm.run() {
                                    Ok(()) => {
                                        globals = vm.globals();
                                        println!("{}", vm.last_popped_stack_elem());
                                    }
                                    Err(err) => {
                                        log::error!("runtime error: {err}");
                                        eprintln!("{err}");
                                    }
                                }
                            }
                            Err(err) => {
                                log::error!("compile error: {err}");
                                eprintln!("Woops! Compilation failed:\n\t{err}");
                            }
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                log::error!("readline error: {err}");
                break;
            }
        }
    }

    if let Some(path) = &history_path {
        let _ = editor.save_history(path);
    }

    Ok(())
}

fn print_parse_errors(errors: &[String]) {
    println!("Woops! We ran into some monkey business here!");
    println!(" parser errors:");
    for err in errors {
        println!("\t{err}");
    }
}

fn history_file_path() -> Option<std::path::PathBuf> {
    dirs_next_state_dir().map(|mut dir| {
        dir.push("monkey_history.txt");
        dir
    })
}

/// A minimal, dependency-free stand-in for an XDG state directory lookup: `$HOME` is good enough
/// for a REPL convenience file.
fn dirs_next_state_dir() -> Option<std::path::PathBuf> {
    std::env::var_os("HOME").map(std::path::PathBuf::from)
}
