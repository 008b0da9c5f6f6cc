//! Times `fibonacci(35)` on both execution engines and prints wall-clock duration for each.
//!
//! Grounded on `original_source/compiler/benchmark.cpp`/`original_source/interpreter/benchmark.cpp`
//! (construct the fib program, time `Eval`/`VM::run`, print duration) and `rlox`'s convention of a
//! bare extra binary for manual inspection alongside the main CLI.

use monkey::compiler::Compiler;
use monkey::environment::Environment;
use monkey::evaluator::eval_program;
use monkey::parser::parse;
use monkey::vm::Vm;
use std::time::Instant;

const SOURCE: &str = "\
    let fibonacci = fn(x) {
        if (x == 0) {
            0
        } else {
            if (x == 1) {
                1
            } else {
                fibonacci(x - 1) + fibonacci(x - 2)
            }
        }
    };
    fibonacci(35);
";

fn main() {
    let (program, errors) = parse(SOURCE);
    assert!(errors.is_empty(), "benchmark program failed to parse: {errors:?}");

    let start = Instant::now();
    let eval_result = eval_program(&program, &Environment::new());
    let eval_duration = start.elapsed();

    let bytecode = Compiler::new()
        .compile_program(&program)
        .expect("benchmark program failed to compile");
    let start = Instant::now();
    let mut vm = Vm::new(bytecode);
    vm.run().expect("benchmark program failed at runtime");
    let vm_result = vm.last_popped_stack_elem();
    let vm_duration = start.elapsed();

    println!("engine=eval result={eval_result} duration={eval_duration:?}");
    println!("engine=vm   result={vm_result} duration={vm_duration:?}");
}
