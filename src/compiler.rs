//! Walks the AST and emits bytecode: constant interning, nested compilation scopes, peephole
//! rewrites, jump patching, and free-variable resolution into closures.
//!
//! Grounded on `rlox::compiler`'s scope-stack shape generalized to the full Monkey grammar; the
//! `last_emitted`/`previous_emitted` bookkeeping plays the same role `rlox`'s own `Compiler`
//! fields do, here put to use for the `If`/function-epilogue peephole rewrites this language needs.

use crate::ast::{ordered_hash_pairs, BlockStatement, Expression, Program, Statement};
use crate::builtins::BUILTINS;
use crate::bytecode::{make, OpCode};
use crate::symbol_table::{SymbolScope, SymbolTable};
use crate::value::{CompiledFunction, Value};
use std::rc::Rc;

/// The compiled output: a flat instruction stream plus the constant pool it indexes into.
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    pub instructions: Vec<u8>,
    pub constants: Vec<Value>,
}

#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: OpCode,
    position: usize,
}

#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Vec<u8>,
    last_emitted: Option<EmittedInstruction>,
    previous_emitted: Option<EmittedInstruction>,
}

/// Compiles an AST [Program] into [Bytecode].
///
/// Construct with [Compiler::new] for a one-shot compile, or [Compiler::new_with_state] to reuse a
/// symbol table and constant pool across REPL lines (see SPEC_FULL.md's global-index-space note).
pub struct Compiler {
    constants: Vec<Value>,
    symbol_table: SymbolTable,
    scopes: Vec<CompilationScope>,
}

impl Compiler {
    pub fn new() -> Self {
        let symbol_table = SymbolTable::new();
        for (i, builtin) in BUILTINS.iter().enumerate() {
            symbol_table.define_builtin(i, builtin.name);
        }

        Compiler {
            constants: Vec::new(),
            symbol_table,
            scopes: vec![CompilationScope::default()],
        }
    }

    /// Reconstructs a compiler over previously-accumulated `constants` and `symbol_table`, for the
    /// REPL's line-to-line state preservation.
    pub fn new_with_state(symbol_table: SymbolTable, constants: Vec<Value>) -> Self {
        Compiler {
            constants,
            symbol_table,
            scopes: vec![CompilationScope::default()],
        }
    }

    pub fn symbol_table(&self) -> SymbolTable {
        self.symbol_table.clone()
    }

    pub fn compile_program(mut self, program: &Program) -> Result<Bytecode, String> {
        for stmt in &program.statements {
            self.compile_statement(stmt)?;
        }
        let instructions = self
            .scopes
            .pop()
            .expect("top-level scope is always present")
            .instructions;
        Ok(Bytecode {
            instructions,
            constants: self.constants,
        })
    }

    fn current_instructions(&self) -> &Vec<u8> {
        &self.scopes.last().expect("always at least one scope").instructions
    }

    fn compile_block(&mut self, block: &BlockStatement) -> Result<(), String> {
        for stmt in &block.statements {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    fn compile_statement(&mut self, stmt: &Statement) -> Result<(), String> {
        match stmt {
            Statement::Let { name, value } => {
                let symbol = self.symbol_table.define(name);
                self.compile_expression(value)?;
                match symbol.scope {
                    SymbolScope::Global => self.emit(OpCode::SetGlobal, &[symbol.index]),
                    _ => self.emit(OpCode::SetLocal, &[symbol.index]),
                };
                Ok(())
            }
            Statement::Return { value } => {
                self.compile_expression(value)?;
                self.emit(OpCode::ReturnValue, &[]);
                Ok(())
            }
            Statement::Expression(expr) => {
                self.compile_expression(expr)?;
                self.emit(OpCode::Pop, &[]);
                Ok(())
            }
            Statement::Block(block) => self.compile_block(block),
        }
    }

    fn compile_expression(&mut self, expr: &Expression) -> Result<(), String> {
        match expr {
            Expression::IntegerLiteral(v) => {
                let idx = self.add_constant(Value::Integer(*v));
                self.emit(OpCode::Constant, &[idx]);
            }
            Expression::StringLiteral(v) => {
                let idx = self.add_constant(Value::String(Rc::from(v.as_str())));
                self.emit(OpCode::Constant, &[idx]);
            }
            Expression::BooleanLiteral(true) => {
                self.emit(OpCode::True, &[]);
            }
            Expression::BooleanLiteral(false) => {
                self.emit(OpCode::False, &[]);
            }
            Expression::Prefix { operator, right } => {
                self.compile_expression(right)?;
                match operator.as_str() {
                    "!" => self.emit(OpCode::Bang, &[]),
                    "-" => self.emit(OpCode::Minus, &[]),
                    op => return Err(format!("unknown operator: {op}")),
                };
            }
            Expression::Infix {
                left,
                operator,
                right,
            } if operator == "<" => {
                // No dedicated less-than opcode: swap operands and emit GreaterThan.
                self.compile_expression(right)?;
                self.compile_expression(left)?;
                self.emit(OpCode::GreaterThan, &[]);
            }
            Expression::Infix {
                left,
                operator,
                right,
            } => {
                self.compile_expression(left)?;
                self.compile_expression(right)?;
                match operator.as_str() {
                    "+" => self.emit(OpCode::Add, &[]),
                    "-" => self.emit(OpCode::Sub, &[]),
                    "*" => self.emit(OpCode::Mul, &[]),
                    "/" => self.emit(OpCode::Div, &[]),
                    "==" => self.emit(OpCode::Equal, &[]),
                    "!=" => self.emit(OpCode::NotEqual, &[]),
                    ">" => self.emit(OpCode::GreaterThan, &[]),
                    op => return Err(format!("unknown operator: {op}")),
                };
            }
            Expression::If {
                condition,
                consequence,
                alternative,
            } => self.compile_if(condition, consequence, alternative.as_ref())?,
            Expression::Identifier(name) => self.compile_identifier(name)?,
            Expression::ArrayLiteral(elements) => {
                for elem in elements {
                    self.compile_expression(elem)?;
                }
                self.emit(OpCode::Array, &[elements.len()]);
            }
            Expression::HashLiteral { pairs } => {
                let ordered = ordered_hash_pairs(pairs);
                for (key, value) in &ordered {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit(OpCode::Hash, &[ordered.len() * 2]);
            }
            Expression::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(OpCode::Index, &[]);
            }
            Expression::FunctionLiteral {
                parameters,
                body,
                name,
            } => self.compile_function_literal(parameters, body, name.as_deref())?,
            Expression::Call { function, arguments } => {
                self.compile_expression(function)?;
                for arg in arguments {
                    self.compile_expression(arg)?;
                }
                self.emit(OpCode::Call, &[arguments.len()]);
            }
        }
        Ok(())
    }

    fn compile_identifier(&mut self, name: &str) -> Result<(), String> {
        let symbol = self
            .symbol_table
            .resolve(name)
            .ok_or_else(|| format!("undefined variable {name}"))?;

        match symbol.scope {
            SymbolScope::Global => self.emit(OpCode::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(OpCode::GetLocal, &[symbol.index]),
            SymbolScope::Builtin => self.emit(OpCode::GetBuiltin, &[symbol.index]),
            SymbolScope::Free => self.emit(OpCode::GetFree, &[symbol.index]),
            SymbolScope::Function => self.emit(OpCode::CurrentClosure, &[]),
        };
        Ok(())
    }

    fn compile_if(
        &mut self,
        condition: &Expression,
        consequence: &BlockStatement,
        alternative: Option<&BlockStatement>,
    ) -> Result<(), String> {
        self.compile_expression(condition)?;
        let jump_not_truthy_pos = self.emit(OpCode::JumpNotTruthy, &[9999]);

        self.compile_block(consequence)?;
        if self.last_instruction_is(OpCode::Pop) {
            self.remove_last_pop();
        }

        let jump_pos = self.emit(OpCode::Jump, &[9999]);
        let after_consequence = self.current_instructions().len();
        self.change_operand(jump_not_truthy_pos, after_consequence);

        match alternative {
            None => {
                self.emit(OpCode::Null, &[]);
            }
            Some(alt) => {
                self.compile_block(alt)?;
                if self.last_instruction_is(OpCode::Pop) {
                    self.remove_last_pop();
                }
            }
        }

        let after_alternative = self.current_instructions().len();
        self.change_operand(jump_pos, after_alternative);

        Ok(())
    }

    fn compile_function_literal(
        &mut self,
        parameters: &[String],
        body: &BlockStatement,
        name: Option<&str>,
    ) -> Result<(), String> {
        self.enter_scope();

        if let Some(name) = name {
            self.symbol_table.define_function_name(name);
        }
        for param in parameters {
            self.symbol_table.define(param);
        }

        self.compile_block(body)?;

        if self.last_instruction_is(OpCode::Pop) {
            self.replace_last_pop_with_return();
        }
        if !self.last_instruction_is(OpCode::ReturnValue) {
            self.emit(OpCode::Return, &[]);
        }

        let free_symbols = self.symbol_table.free_symbols();
        let num_locals = self.symbol_table.num_definitions();
        let instructions = self.leave_scope();

        let num_free = free_symbols.len();
        for symbol in &free_symbols {
            self.load_outer_symbol(symbol)?;
        }

        let compiled = CompiledFunction {
            instructions,
            num_locals,
            num_parameters: parameters.len(),
        };
        let idx = self.add_constant(Value::CompiledFunction(Rc::new(compiled)));
        self.emit(OpCode::Closure, &[idx, num_free]);

        Ok(())
    }

    /// Emits a load for a symbol as it was resolved in the *enclosing* scope, so that its value
    /// ends up on the stack right before `OpClosure` captures it as a free variable.
    fn load_outer_symbol(&mut self, symbol: &crate::symbol_table::Symbol) -> Result<(), String> {
        match symbol.scope {
            SymbolScope::Global => self.emit(OpCode::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(OpCode::GetLocal, &[symbol.index]),
            SymbolScope::Builtin => self.emit(OpCode::GetBuiltin, &[symbol.index]),
            SymbolScope::Free => self.emit(OpCode::GetFree, &[symbol.index]),
            SymbolScope::Function => self.emit(OpCode::CurrentClosure, &[]),
        };
        Ok(())
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        self.symbol_table = SymbolTable::new_enclosed(&self.symbol_table);
    }

    fn leave_scope(&mut self) -> Vec<u8> {
        let scope = self.scopes.pop().expect("enter_scope/leave_scope balanced");
        let outer = self
            .symbol_table
            .outer()
            .expect("leave_scope called without a matching enter_scope");
        self.symbol_table = outer;
        scope.instructions
    }

    fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    fn emit(&mut self, op: OpCode, operands: &[usize]) -> usize {
        let instruction = make(op, operands);
        let scope = self.scopes.last_mut().expect("always at least one scope");
        let position = scope.instructions.len();
        scope.instructions.extend_from_slice(&instruction);

        scope.previous_emitted = scope.last_emitted;
        scope.last_emitted = Some(EmittedInstruction {
            opcode: op,
            position,
        });

        position
    }

    fn last_instruction_is(&self, op: OpCode) -> bool {
        self.scopes
            .last()
            .expect("always at least one scope")
            .last_emitted
            .map(|e| e.opcode == op)
            .unwrap_or(false)
    }

    fn remove_last_pop(&mut self) {
        let scope = self.scopes.last_mut().expect("always at least one scope");
        let last = scope.last_emitted.expect("remove_last_pop requires a last instruction");
        scope.instructions.truncate(last.position);
        scope.last_emitted = scope.previous_emitted;
    }

    fn replace_last_pop_with_return(&mut self) {
        let scope = self.scopes.last_mut().expect("always at least one scope");
        let last = scope.last_emitted.expect("replace_last_pop_with_return requires a last instruction");
        let new_instruction = make(OpCode::ReturnValue, &[]);
        scope.instructions[last.position..last.position + new_instruction.len()]
            .copy_from_slice(&new_instruction);
        scope.last_emitted = Some(EmittedInstruction {
            opcode: OpCode::ReturnValue,
            position: last.position,
        });
    }

    /// Overwrites the operand of the (multi-byte) instruction at `position` in place. Only valid
    /// when `new_operand` fits the same operand width the instruction was originally emitted with.
    fn change_operand(&mut self, position: usize, new_operand: usize) {
        let scope = self.scopes.last_mut().expect("always at least one scope");
        let op = OpCode::try_from(scope.instructions[position]).expect("valid opcode byte");
        let new_instruction = make(op, &[new_operand]);
        scope.instructions[position..position + new_instruction.len()]
            .copy_from_slice(&new_instruction);
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}
