//! The stack-based bytecode virtual machine: operand stack, globals array, call-frame stack, and
//! the fetch-decode-execute loop.
//!
//! Generalizes `rlox::vm::VmWithChunk`'s `next_bytecode!`/`current_ip!` fetch macros and
//! `binary_op` closure-based dispatch from Lox's float-only arithmetic to this language's
//! integer/string value model, plus call frames and closures that `rlox`'s single-chunk VM has no
//! counterpart for.

use crate::bytecode::{read_u16, OpCode};
use crate::compiler::Bytecode;
use crate::value::{Closure, CompiledFunction, HashKey, Hashable, Value};
use crate::builtins::BUILTINS;
use std::collections::HashMap;
use std::rc::Rc;

const STACK_SIZE: usize = 2048;
const GLOBALS_SIZE: usize = 65536;
const MAX_FRAMES: usize = 1024;

struct Frame {
    closure: Rc<Closure>,
    ip: isize,
    base_pointer: usize,
}

impl Frame {
    fn instructions(&self) -> &[u8] {
        &self.closure.func.instructions
    }
}

/// Executes compiled [Bytecode]. One VM instance owns its `globals` array so that a REPL can reuse
/// it across successive compiles (see SPEC_FULL.md's global-index-space note).
pub struct Vm {
    constants: Vec<Value>,
    stack: Vec<Value>,
    sp: usize,
    globals: Vec<Value>,
    frames: Vec<Frame>,
}

impl Vm {
    pub fn new(bytecode: Bytecode) -> Self {
        Self::with_globals(bytecode, vec![Value::Null; GLOBALS_SIZE])
    }

    /// Constructs a VM reusing a prior run's `globals`, for REPL state preservation.
    pub fn with_globals(bytecode: Bytecode, globals: Vec<Value>) -> Self {
        let main_fn = Rc::new(CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
        });
        let main_closure = Rc::new(Closure {
            func: main_fn,
            free: Vec::new(),
        });
        let main_frame = Frame {
            closure: main_closure,
            ip: -1,
            base_pointer: 0,
        };

        let mut frames = Vec::with_capacity(MAX_FRAMES);
        frames.push(main_frame);

        Vm {
            constants: bytecode.constants,
            stack: vec![Value::Null; STACK_SIZE],
            sp: 0,
            globals,
            frames,
        }
    }

    pub fn globals(&self) -> Vec<Value> {
        self.globals.clone()
    }

    /// The most recent value popped from the stack. Used by tests (and the REPL) to observe the
    /// result of the last top-level expression statement.
    pub fn last_popped_stack_elem(&self) -> Value {
        self.stack[self.sp].clone()
    }

    fn current_frame(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("at least the main frame is always present")
    }

    fn push_frame(&mut self, frame: Frame) -> Result<(), Value> {
        if self.frames.len() >= MAX_FRAMES {
            return Err(Value::error("stack overflow"));
        }
        self.frames.push(frame);
        Ok(())
    }

    fn pop_frame(&mut self) -> Frame {
        self.frames.pop().expect("pop_frame called with no frame to pop")
    }

    fn push(&mut self, value: Value) -> Result<(), Value> {
        if self.sp >= STACK_SIZE {
            return Err(Value::error("stack overflow"));
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> Value {
        self.sp -= 1;
        // Left in place (not cleared) so last_popped_stack_elem can read it back.
        self.stack[self.sp].clone()
    }

    /// Runs the loaded bytecode to completion. Returns the runtime [Value::Error] if execution
    /// aborted, or `Ok(())` on normal termination (the frame stack unwound to empty).
    pub fn run(&mut self) -> Result<(), Value> {
        while self.frames.last().expect("main frame").ip + 1 < self.current_instructions_len() as isize {
            let ip = {
                let frame = self.current_frame();
                frame.ip += 1;
                frame.ip as usize
            };
            let op_byte = self.current_frame().instructions()[ip];
            let Ok(op) = OpCode::try_from(op_byte) else {
                return Err(Value::error(format!("unknown opcode {op_byte}")));
            };

            log::trace!("ip={ip} op={op} sp={}", self.sp);

            match op {
                OpCode::Constant => {
                    let idx = self.read_u16_operand();
                    let constant = self.constants[idx as usize].clone();
                    self.push(constant)?;
                }
                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div => {
                    self.execute_binary_operation(op)?;
                }
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::True => self.push(Value::Boolean(true))?,
                OpCode::False => self.push(Value::Boolean(false))?,
                OpCode::Null => self.push(Value::Null)?,
                OpCode::Equal | OpCode::NotEqual | OpCode::GreaterThan => {
                    self.execute_comparison(op)?;
                }
                OpCode::Bang => self.execute_bang()?,
                OpCode::Minus => self.execute_minus()?,
                OpCode::JumpNotTruthy => {
                    let target = self.read_u16_operand();
                    let condition = self.pop();
                    if !condition.is_truthy() {
                        self.current_frame().ip = target as isize - 1;
                    }
                }
                OpCode::Jump => {
                    let target = self.read_u16_operand();
                    self.current_frame().ip = target as isize - 1;
                }
                OpCode::SetGlobal => {
                    let idx = self.read_u16_operand();
                    let value = self.pop();
                    self.globals[idx as usize] = value;
                }
                OpCode::GetGlobal => {
                    let idx = self.read_u16_operand();
                    self.push(self.globals[idx as usize].clone())?;
                }
                OpCode::Array => {
                    let n = self.read_u16_operand() as usize;
                    let elements = self.stack[self.sp - n..self.sp].to_vec();
                    self.sp -= n;
                    self.push(Value::Array(Rc::new(elements)))?;
                }
                OpCode::Hash => {
                    let n = self.read_u16_operand() as usize;
                    let hash = self.build_hash(self.sp - n, self.sp)?;
                    self.sp -= n;
                    self.push(hash)?;
                }
                OpCode::Index => {
                    let index = self.pop();
                    let container = self.pop();
                    let value = self.execute_index(&container, &index)?;
                    self.push(value)?;
                }
                OpCode::Call => {
                    let argc = self.read_u8_operand() as usize;
                    self.execute_call(argc)?;
                }
                OpCode::ReturnValue => {
                    let return_value = self.pop();
                    let frame = self.pop_frame();
                    self.sp = frame.base_pointer - 1;
                    self.push(return_value)?;
                }
                OpCode::Return => {
                    let frame = self.pop_frame();
                    self.sp = frame.base_pointer - 1;
                    self.push(Value::Null)?;
                }
                OpCode::SetLocal => {
                    let idx = self.read_u8_operand() as usize;
                    let base = self.current_frame().base_pointer;
                    let value = self.pop();
                    self.stack[base + idx] = value;
                }
                OpCode::GetLocal => {
                    let idx = self.read_u8_operand() as usize;
                    let base = self.current_frame().base_pointer;
                    self.push(self.stack[base + idx].clone())?;
                }
                OpCode::GetBuiltin => {
                    let idx = self.read_u8_operand() as usize;
                    self.push(Value::Builtin(BUILTINS[idx].clone()))?;
                }
                OpCode::Closure => {
                    let const_idx = self.read_u16_operand() as usize;
                    let num_free = self.read_u8_operand() as usize;
                    self.execute_closure(const_idx, num_free)?;
                }
                OpCode::GetFree => {
                    let idx = self.read_u8_operand() as usize;
                    let value = self.current_frame().closure.free[idx].clone();
                    self.push(value)?;
                }
                OpCode::CurrentClosure => {
                    let closure = self.current_frame().closure.clone();
                    self.push(Value::Closure(closure))?;
                }
            }
        }

        Ok(())
    }

    fn current_instructions_len(&self) -> usize {
        self.frames.last().expect("main frame").instructions().len()
    }

    fn read_u16_operand(&mut self) -> u16 {
        let frame = self.current_frame();
        let ip = frame.ip as usize;
        let value = read_u16(&frame.instructions()[ip + 1..]);
        frame.ip += 2;
        value
    }

    fn read_u8_operand(&mut self) -> u8 {
        let frame = self.current_frame();
        let ip = frame.ip as usize;
        let value = frame.instructions()[ip + 1];
        frame.ip += 1;
        value
    }

    fn execute_binary_operation(&mut self, op: OpCode) -> Result<(), Value> {
        let right = self.pop();
        let left = self.pop();

        let result = match (&left, &right) {
            (Value::Integer(l), Value::Integer(r)) => Self::execute_integer_binary(op, *l, *r)?,
            (Value::String(l), Value::String(r)) if op == OpCode::Add => {
                Value::String(Rc::from(format!("{l}{r}")))
            }
            _ => return Err(Value::error("unsupported types for binary operation")),
        };

        self.push(result)
    }

    fn execute_integer_binary(op: OpCode, left: i64, right: i64) -> Result<Value, Value> {
        let result = match op {
            OpCode::Add => left.wrapping_add(right),
            OpCode::Sub => left.wrapping_sub(right),
            OpCode::Mul => left.wrapping_mul(right),
            OpCode::Div => {
                if right == 0 {
                    return Err(Value::error("division by zero"));
                }
                left.wrapping_div(right)
            }
            _ => unreachable!("execute_integer_binary only called for Add/Sub/Mul/Div"),
        };
        Ok(Value::Integer(result))
    }

    fn execute_comparison(&mut self, op: OpCode) -> Result<(), Value> {
        let right = self.pop();
        let left = self.pop();

        let result = match (&left, &right) {
            (Value::Integer(l), Value::Integer(r)) => match op {
                OpCode::Equal => l == r,
                OpCode::NotEqual => l != r,
                OpCode::GreaterThan => l > r,
                _ => unreachable!(),
            },
            (_, _) => match op {
                OpCode::Equal => left == right,
                OpCode::NotEqual => left != right,
                OpCode::GreaterThan => {
                    return Err(Value::error(format!(
                        "unsupported types for comparison: {} {}",
                        left.type_name(),
                        right.type_name()
                    )))
                }
                _ => unreachable!(),
            },
        };

        self.push(Value::Boolean(result))
    }

    fn execute_bang(&mut self) -> Result<(), Value> {
        let operand = self.pop();
        let result = match operand {
            Value::Boolean(false) | Value::Null => Value::Boolean(true),
            Value::Boolean(true) => Value::Boolean(false),
            _ => Value::Boolean(false),
        };
        self.push(result)
    }

    fn execute_minus(&mut self) -> Result<(), Value> {
        let operand = self.pop();
        match operand {
            Value::Integer(v) => self.push(Value::Integer(-v)),
            other => Err(Value::error(format!(
                "unsupported type for negation: {}",
                other.type_name()
            ))),
        }
    }

    fn build_hash(&self, start: usize, end: usize) -> Result<Value, Value> {
        let mut map = HashMap::new();
        let mut i = start;
        while i < end {
            let key = self.stack[i].clone();
            let value = self.stack[i + 1].clone();
            if !key.is_hashable() {
                return Err(Value::error(format!("unusable as hash key: {}", key.type_name())));
            }
            map.insert(key.hash_key(), (key, value));
            i += 2;
        }
        Ok(Value::Hash(Rc::new(map)))
    }

    fn execute_index(&self, container: &Value, index: &Value) -> Result<Value, Value> {
        match (container, index) {
            (Value::Array(elements), Value::Integer(i)) => Ok(Self::execute_array_index(elements, *i)),
            (Value::Hash(pairs), key) => self.execute_hash_index(pairs, key),
            (other, _) => Err(Value::error(format!("index operator not supported: {}", other.type_name()))),
        }
    }

    fn execute_array_index(elements: &[Value], index: i64) -> Value {
        if index < 0 || index as usize >= elements.len() {
            return Value::Null;
        }
        elements[index as usize].clone()
    }

    fn execute_hash_index(&self, pairs: &HashMap<HashKey, (Value, Value)>, key: &Value) -> Result<Value, Value> {
        if !key.is_hashable() {
            return Err(Value::error(format!("unusable as hash key: {}", key.type_name())));
        }
        Ok(pairs.get(&key.hash_key()).map(|(_, v)| v.clone()).unwrap_or(Value::Null))
    }

    fn execute_call(&mut self, argc: usize) -> Result<(), Value> {
        let callee = self.stack[self.sp - 1 - argc].clone();
        match callee {
            Value::Closure(closure) => self.call_closure(closure, argc),
            Value::Builtin(builtin) => {
                let args = self.stack[self.sp - argc..self.sp].to_vec();
                let result = (builtin.func)(&args);
                self.sp -= argc + 1;
                self.push(result)
            }
            _ => Err(Value::error("calling non-function")),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, argc: usize) -> Result<(), Value> {
        if argc != closure.func.num_parameters {
            return Err(Value::error(format!(
                "wrong number of arguments: want={}, got={}",
                closure.func.num_parameters, argc
            )));
        }

        let num_locals = closure.func.num_locals;
        let base_pointer = self.sp - argc;
        let frame = Frame {
            closure,
            ip: -1,
            base_pointer,
        };
        self.push_frame(frame)?;
        self.sp = base_pointer + num_locals;
        Ok(())
    }

    fn execute_closure(&mut self, const_idx: usize, num_free: usize) -> Result<(), Value> {
        let constant = self.constants[const_idx].clone();
        let Value::CompiledFunction(func) = constant else {
            return Err(Value::error("not a function"));
        };

        let free = self.stack[self.sp - num_free..self.sp].to_vec();
        self.sp -= num_free;

        let closure = Rc::new(Closure { func, free });
        self.push(Value::Closure(closure))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compiler::Compiler;
    use crate::parser::parse;

    fn run_vm(input: &str) -> Value {
        let (program, errors) = parse(input);
        assert!(errors.is_empty(), "parser errors: {errors:?}");
        let bytecode = Compiler::new().compile_program(&program).expect("should compile");
        let mut vm = Vm::new(bytecode);
        vm.run().expect("should run without error");
        vm.last_popped_stack_elem()
    }

    #[test]
    fn integer_arithmetic() {
        assert_eq!(Value::Integer(55), run_vm("50 / 2 * 2 + 10 - 5"));
        assert_eq!(Value::Integer(32), run_vm("2 * 2 * 2 * 2 * 2"));
    }

    #[test]
    fn boolean_expressions() {
        assert_eq!(Value::Boolean(true), run_vm("1 < 2"));
        assert_eq!(Value::Boolean(true), run_vm("(1 < 2) == true"));
        assert_eq!(Value::Boolean(false), run_vm("1 > 2"));
    }

    #[test]
    fn conditionals() {
        assert_eq!(Value::Integer(10), run_vm("if (true) { 10 }"));
        assert_eq!(Value::Null, run_vm("if (false) { 10 }"));
        assert_eq!(Value::Integer(20), run_vm("if ((if (false) { 10 })) { 10 } else { 20 }"));
    }

    #[test]
    fn global_let_statements() {
        assert_eq!(Value::Integer(1), run_vm("let one = 1; one"));
        assert_eq!(Value::Integer(3), run_vm("let one = 1; let two = 2; one + two"));
    }

    #[test]
    fn string_expressions() {
        assert_eq!(Value::String(Rc::from("monkey")), run_vm(r#""mon" + "key""#));
    }

    #[test]
    fn array_literals() {
        let result = run_vm("[1, 2, 3]");
        assert_eq!(
            Value::Array(Rc::new(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)])),
            result
        );
    }

    #[test]
    fn hash_literals_and_index() {
        let input = r#"let h = {"name": "Monkey", "age": 0, "type": "Language"}; h["name"]"#;
        assert_eq!(Value::String(Rc::from("Monkey")), run_vm(input));
    }

    #[test]
    fn index_out_of_range_is_null() {
        assert_eq!(Value::Null, run_vm("[1, 2, 3][99]"));
        assert_eq!(Value::Null, run_vm("[1, 2, 3][-1]"));
        assert_eq!(Value::Null, run_vm(r#"{"a": 1}["b"]"#));
    }

    #[test]
    fn calling_functions_without_arguments() {
        let input = "let fivePlusTen = fn() { 5 + 10; }; fivePlusTen();";
        assert_eq!(Value::Integer(15), run_vm(input));
    }

    #[test]
    fn calling_functions_with_bindings_and_arguments() {
        let input = "let sum = fn(a, b) { let c = a + b; c; }; sum(1, 2);";
        assert_eq!(Value::Integer(3), run_vm(input));
    }

    #[test]
    fn first_class_functions_and_closures() {
        let input = "let newAdder = fn(a) { fn(b) { a + b } }; let addTwo = newAdder(2); addTwo(3);";
        assert_eq!(Value::Integer(5), run_vm(input));
    }

    #[test]
    fn recursive_function_via_current_closure() {
        let input = "let counter = fn(x) { if (x > 100) { return 99; } else { counter(x + 1); } }; counter(0);";
        assert_eq!(Value::Integer(99), run_vm(input));
    }

    #[test]
    fn fibonacci_ten() {
        let input = "let fibonacci = fn(x) { if (x == 0) { 0 } else { if (x == 1) { 1 } else { fibonacci(x - 1) + fibonacci(x - 2) } } }; fibonacci(10);";
        assert_eq!(Value::Integer(55), run_vm(input));
    }

    #[test]
    fn calling_a_function_with_wrong_number_of_arguments_is_an_error() {
        let (program, errors) = parse("let f = fn(a, b) { a + b; }; f(1);");
        assert!(errors.is_empty());
        let bytecode = Compiler::new().compile_program(&program).unwrap();
        let mut vm = Vm::new(bytecode);
        let err = vm.run().unwrap_err();
        assert_eq!("wrong number of arguments: want=2, got=1", err.error_message().unwrap());
    }

    #[test]
    fn calling_a_non_function_is_an_error() {
        let (program, errors) = parse("let notAFunction = 10; notAFunction();");
        assert!(errors.is_empty());
        let bytecode = Compiler::new().compile_program(&program).unwrap();
        let mut vm = Vm::new(bytecode);
        let err = vm.run().unwrap_err();
        assert_eq!("calling non-function", err.error_message().unwrap());
    }

    #[test]
    fn builtin_functions() {
        assert_eq!(Value::Integer(2), run_vm("first(rest(push([1, 2, 3], 4)))"));
        assert_eq!(Value::Integer(5), run_vm(r#"len("hello")"#));
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let (program, errors) = parse("1 / 0");
        assert!(errors.is_empty());
        let bytecode = Compiler::new().compile_program(&program).unwrap();
        let mut vm = Vm::new(bytecode);
        let err = vm.run().unwrap_err();
        assert_eq!("division by zero", err.error_message().unwrap());
    }

    #[test]
    fn negating_a_non_integer_is_a_runtime_error() {
        let (program, errors) = parse("-true");
        assert!(errors.is_empty());
        let bytecode = Compiler::new().compile_program(&program).unwrap();
        let mut vm = Vm::new(bytecode);
        let err = vm.run().unwrap_err();
        assert_eq!("unsupported type for negation: BOOLEAN", err.error_message().unwrap());
    }

    #[test]
    fn repl_state_preservation_across_runs() {
        let (program1, errors1) = parse("let x = 1;");
        assert!(errors1.is_empty());
        let compiler = Compiler::new();
        let symbol_table = compiler.symbol_table();
        let bytecode1 = compiler.compile_program(&program1).unwrap();
        let mut vm = Vm::new(bytecode1);
        vm.run().unwrap();

        let (program2, errors2) = parse("x;");
        assert!(errors2.is_empty());
        let compiler2 = Compiler::new_with_state(symbol_table, vm.constants.clone());
        let bytecode2 = compiler2.compile_program(&program2).unwrap();
        let mut vm2 = Vm::with_globals(bytecode2, vm.globals());
        vm2.run().unwrap();

        assert_eq!(Value::Integer(1), vm2.last_popped_stack_elem());
    }
}
