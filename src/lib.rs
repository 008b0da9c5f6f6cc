//! A lexer, Pratt parser, tree-walking evaluator, and bytecode compiler/VM for a small
//! dynamically-typed scripting language.
//!
//! See [part III][bytecode] of [Crafting Interpreters][book] for the bytecode half's lineage, and
//! ["Writing a Compiler in Go"][wacig] for the specific compiler/VM split this crate follows.
//!
//! [book]: https://craftinginterpreters.com/
//! [bytecode]: https://craftinginterpreters.com/a-bytecode-virtual-machine.html
//! [wacig]: https://compilerbook.com/

pub mod ast;
pub mod builtins;
pub mod bytecode;
pub mod compiler;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod symbol_table;
pub mod token;
pub mod value;
pub mod vm;

/// The type returned by the crate's compile/run entry points. The error is always
/// [error::MonkeyError].
pub type Result<T> = std::result::Result<T, error::MonkeyError>;

/// Re-exports the items most call sites need, in the spirit of `rlox::prelude`.
pub mod prelude {
    pub use crate::compiler::{Bytecode, Compiler};
    pub use crate::environment::Environment;
    pub use crate::error::MonkeyError;
    pub use crate::evaluator::eval_program;
    pub use crate::parser::parse;
    pub use crate::symbol_table::SymbolTable;
    pub use crate::value::Value;
    pub use crate::vm::Vm;
}

/// Parses `source`, failing fast with [error::MonkeyError::Parse] if the parser accumulated any
/// errors.
pub fn parse_checked(source: &str) -> Result<ast::Program> {
    let (program, errors) = parser::parse(source);
    if errors.is_empty() {
        Ok(program)
    } else {
        Err(error::MonkeyError::Parse(errors))
    }
}

/// Parses and evaluates `source` with the tree-walking evaluator.
pub fn eval(source: &str, env: &environment::Environment) -> Result<value::Value> {
    let program = parse_checked(source)?;
    Ok(evaluator::eval_program(&program, env))
}

/// Parses and compiles `source`, then runs it on a fresh VM, returning the last popped stack
/// element (see [vm::Vm::last_popped_stack_elem]).
pub fn run(source: &str) -> Result<value::Value> {
    let program = parse_checked(source)?;
    let bytecode = compiler::Compiler::new()
        .compile_program(&program)
        .map_err(error::MonkeyError::Compile)?;
    let mut vm = vm::Vm::new(bytecode);
    vm.run()
        .map_err(|e| error::MonkeyError::Runtime(e.error_message().unwrap_or_default().to_string()))?;
    Ok(vm.last_popped_stack_elem())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn eval_and_run_agree_on_fibonacci() {
        let input = "let fibonacci = fn(x) { if (x == 0) { 0 } else { if (x == 1) { 1 } else { fibonacci(x - 1) + fibonacci(x - 2) } } }; fibonacci(10);";

        let eval_result = eval(input, &environment::Environment::new()).unwrap();
        let vm_result = run(input).unwrap();

        assert_eq!(value::Value::Integer(55), eval_result);
        assert_eq!(value::Value::Integer(55), vm_result);
    }

    #[test]
    fn parse_checked_surfaces_parser_errors() {
        let err = parse_checked("let x 5;").unwrap_err();
        assert!(matches!(err, error::MonkeyError::Parse(_)));
    }
}
