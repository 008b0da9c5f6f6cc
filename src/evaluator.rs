//! Direct recursive tree-walking interpreter over the AST.
//!
//! Dispatches per [Expression]/[Statement] variant, mirroring the match-per-opcode style
//! `rlox::vm::VmWithChunk::run`'s loop uses, but one AST node at a time instead of one bytecode
//! instruction at a time.

use crate::ast::{ordered_hash_pairs, BlockStatement, Expression, Program, Statement};
use crate::builtins;
use crate::environment::Environment;
use crate::value::{Function, Hashable, HashKey, Value};
use std::collections::HashMap;
use std::rc::Rc;

/// Evaluates a complete [Program] in `env`, returning its final value (or a propagated
/// [Value::Error]). A top-level `return` unwraps immediately, matching the call-boundary rule.
pub fn eval_program(program: &Program, env: &Environment) -> Value {
    let mut result = Value::Null;
    for stmt in &program.statements {
        result = eval_statement(stmt, env);
        match result {
            Value::ReturnWrapper(ref inner) => return (**inner).clone(),
            Value::Error(_) => return result,
            _ => {}
        }
    }
    result
}

fn eval_block(block: &BlockStatement, env: &Environment) -> Value {
    let mut result = Value::Null;
    for stmt in &block.statements {
        result = eval_statement(stmt, env);
        // Unlike eval_program, a ReturnWrapper here is *not* unwrapped: it must propagate through
        // nested blocks unchanged so an outer call boundary can unwrap it exactly once.
        if matches!(result, Value::ReturnWrapper(_) | Value::Error(_)) {
            return result;
        }
    }
    result
}

fn eval_statement(stmt: &Statement, env: &Environment) -> Value {
    match stmt {
        Statement::Let { name, value } => {
            let value = eval_expression(value, env);
            if value.is_error() {
                return value;
            }
            env.set(name.clone(), value);
            Value::Null
        }
        Statement::Return { value } => {
            let value = eval_expression(value, env);
            if value.is_error() {
                return value;
            }
            Value::ReturnWrapper(Rc::new(value))
        }
        Statement::Expression(expr) => eval_expression(expr, env),
        Statement::Block(block) => eval_block(block, env),
    }
}

fn eval_expression(expr: &Expression, env: &Environment) -> Value {
    match expr {
        Expression::IntegerLiteral(v) => Value::Integer(*v),
        Expression::BooleanLiteral(v) => Value::Boolean(*v),
        Expression::StringLiteral(v) => Value::String(Rc::from(v.as_str())),
        Expression::Identifier(name) => eval_identifier(name, env),
        Expression::Prefix { operator, right } => {
            let right = eval_expression(right, env);
            if right.is_error() {
                return right;
            }
            eval_prefix_expression(operator, &right)
        }
        Expression::Infix { left, operator, right } => {
            let left = eval_expression(left, env);
            if left.is_error() {
                return left;
            }
            let right = eval_expression(right, env);
            if right.is_error() {
                return right;
            }
            eval_infix_expression(operator, &left, &right)
        }
        Expression::If {
            condition,
            consequence,
            alternative,
        } => eval_if_expression(condition, consequence, alternative.as_ref(), env),
        Expression::FunctionLiteral {
            parameters, body, ..
        } => Value::Function(Rc::new(Function {
            parameters: parameters.clone(),
            body: body.clone(),
            env: env.clone(),
        })),
        Expression::Call { function, arguments } => eval_call(function, arguments, env),
        Expression::ArrayLiteral(elements) => {
            let mut values = Vec::with_capacity(elements.len());
            for elem in elements {
                let value = eval_expression(elem, env);
                if value.is_error() {
                    return value;
                }
                values.push(value);
            }
            Value::Array(Rc::new(values))
        }
        Expression::HashLiteral { pairs } => eval_hash_literal(pairs, env),
        Expression::Index { left, index } => {
            let left = eval_expression(left, env);
            if left.is_error() {
                return left;
            }
            let index = eval_expression(index, env);
            if index.is_error() {
                return index;
            }
            eval_index_expression(&left, &index)
        }
    }
}

fn eval_identifier(name: &str, env: &Environment) -> Value {
    if let Some(value) = env.get(name) {
        return value;
    }
    if let Some(builtin) = builtins::get_by_name(name) {
        return Value::Builtin(builtin.clone());
    }
    Value::error(format!("identifier not found: {name}"))
}

fn eval_prefix_expression(operator: &str, right: &Value) -> Value {
    match operator {
        "!" => eval_bang_operator(right),
        "-" => eval_minus_prefix_operator(right),
        op => Value::error(format!("unknown operator: {op}{}", right.type_name())),
    }
}

fn eval_bang_operator(right: &Value) -> Value {
    match right {
        Value::Boolean(true) => Value::Boolean(false),
        Value::Boolean(false) | Value::Null => Value::Boolean(true),
        _ => Value::Boolean(false),
    }
}

fn eval_minus_prefix_operator(right: &Value) -> Value {
    match right {
        Value::Integer(v) => Value::Integer(-v),
        other => Value::error(format!("unknown operator: -{}", other.type_name())),
    }
}

fn eval_infix_expression(operator: &str, left: &Value, right: &Value) -> Value {
    match (left, right) {
        (Value::Integer(l), Value::Integer(r)) => eval_integer_infix(operator, *l, *r),
        (Value::String(l), Value::String(r)) if operator == "+" => {
            Value::String(Rc::from(format!("{l}{r}")))
        }
        (Value::String(_), Value::String(_)) => {
            Value::error(format!("unknown operator: STRING {operator} STRING"))
        }
        (_, _) if operator == "==" => Value::Boolean(left == right),
        (_, _) if operator == "!=" => Value::Boolean(left != right),
        (l, r) if l.type_name() != r.type_name() => Value::error(format!(
            "type mismatch: {} {operator} {}",
            l.type_name(),
            r.type_name()
        )),
        (l, _) => Value::error(format!("unknown operator: {} {operator} {}", l.type_name(), l.type_name())),
    }
}

fn eval_integer_infix(operator: &str, left: i64, right: i64) -> Value {
    match operator {
        "+" => Value::Integer(left.wrapping_add(right)),
        "-" => Value::Integer(left.wrapping_sub(right)),
        "*" => Value::Integer(left.wrapping_mul(right)),
        "/" => {
            if right == 0 {
                Value::error("division by zero")
            } else {
                Value::Integer(left.wrapping_div(right))
            }
        }
        "<" => Value::Boolean(left < right),
        ">" => Value::Boolean(left > right),
        "==" => Value::Boolean(left == right),
        "!=" => Value::Boolean(left != right),
        op => Value::error(format!("unknown operator: INTEGER {op} INTEGER")),
    }
}

fn eval_if_expression(
    condition: &Expression,
    consequence: &BlockStatement,
    alternative: Option<&BlockStatement>,
    env: &Environment,
) -> Value {
    let condition = eval_expression(condition, env);
    if condition.is_error() {
        return condition;
    }

    if condition.is_truthy() {
        eval_block(consequence, env)
    } else if let Some(alt) = alternative {
        eval_block(alt, env)
    } else {
        Value::Null
    }
}

fn eval_call(function: &Expression, arguments: &[Expression], env: &Environment) -> Value {
    let func = eval_expression(function, env);
    if func.is_error() {
        return func;
    }

    let mut args = Vec::with_capacity(arguments.len());
    for arg in arguments {
        let value = eval_expression(arg, env);
        if value.is_error() {
            return value;
        }
        args.push(value);
    }

    apply_function(&func, &args)
}

fn apply_function(func: &Value, args: &[Value]) -> Value {
    match func {
        Value::Function(f) => {
            if args.len() != f.parameters.len() {
                return Value::error(format!(
                    "wrong number of arguments. got={}, want={}",
                    args.len(),
                    f.parameters.len()
                ));
            }
            let call_env = Environment::new_enclosed(&f.env);
            for (param, arg) in f.parameters.iter().zip(args) {
                call_env.set(param.clone(), arg.clone());
            }
            let result = eval_block(&f.body, &call_env);
            match result {
                Value::ReturnWrapper(inner) => (*inner).clone(),
                other => other,
            }
        }
        Value::Builtin(b) => (b.func)(args),
        other => Value::error(format!("not a function: {}", other.type_name())),
    }
}

fn eval_hash_literal(pairs: &[(Expression, Expression)], env: &Environment) -> Value {
    let mut map = HashMap::new();
    for (key_expr, value_expr) in ordered_hash_pairs(pairs) {
        let key = eval_expression(key_expr, env);
        if key.is_error() {
            return key;
        }
        if !key.is_hashable() {
            return Value::error("unusable as hash key.");
        }
        let value = eval_expression(value_expr, env);
        if value.is_error() {
            return value;
        }
        map.insert(key.hash_key(), (key, value));
    }
    Value::Hash(Rc::new(map))
}

fn eval_index_expression(left: &Value, index: &Value) -> Value {
    match (left, index) {
        (Value::Array(elements), Value::Integer(i)) => eval_array_index(elements, *i),
        (Value::Hash(pairs), key) if key.is_hashable() => eval_hash_index(pairs, key),
        (Value::Hash(_), _) => Value::error("unusable as hash key.".to_string()),
        (l, _) => Value::error(format!("index operator not supported: {}", l.type_name())),
    }
}

fn eval_array_index(elements: &[Value], index: i64) -> Value {
    if index < 0 || index as usize >= elements.len() {
        return Value::Null;
    }
    elements[index as usize].clone()
}

fn eval_hash_index(pairs: &HashMap<HashKey, (Value, Value)>, key: &Value) -> Value {
    pairs
        .get(&key.hash_key())
        .map(|(_, v)| v.clone())
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parser::parse;

    fn eval(input: &str) -> Value {
        let (program, errors) = parse(input);
        assert!(errors.is_empty(), "parser errors: {errors:?}");
        eval_program(&program, &Environment::new())
    }

    #[test]
    fn integer_expressions() {
        let cases = [
            ("5", 5),
            ("10", 10),
            ("-5", -5),
            ("5 + 5 + 5 + 5 - 10", 10),
            ("2 * 2 * 2 * 2 * 2", 32),
            ("50 / 2 * 2 + 10", 60),
            ("5 * (2 + 10)", 60),
        ];
        for (input, expected) in cases {
            assert_eq!(Value::Integer(expected), eval(input), "input: {input}");
        }
    }

    #[test]
    fn boolean_expressions() {
        let cases = [
            ("true", true),
            ("1 < 2", true),
            ("1 > 2", false),
            ("1 == 1", true),
            ("1 != 1", false),
            ("true == true", true),
            ("true != false", true),
            ("(1 < 2) == true", true),
        ];
        for (input, expected) in cases {
            assert_eq!(Value::Boolean(expected), eval(input), "input: {input}");
        }
    }

    #[test]
    fn bang_operator() {
        let cases = [("!true", false), ("!false", true), ("!5", false), ("!!true", true)];
        for (input, expected) in cases {
            assert_eq!(Value::Boolean(expected), eval(input), "input: {input}");
        }
    }

    #[test]
    fn if_else_expressions() {
        assert_eq!(Value::Integer(10), eval("if (true) { 10 }"));
        assert_eq!(Value::Null, eval("if (false) { 10 }"));
        assert_eq!(Value::Integer(20), eval("if (false) { 10 } else { 20 }"));
    }

    #[test]
    fn return_statements() {
        assert_eq!(Value::Integer(10), eval("return 10;"));
        assert_eq!(Value::Integer(10), eval("9; return 10; 9;"));
        let nested = "if (10 > 1) { if (10 > 1) { return 10; } return 1; }";
        assert_eq!(Value::Integer(10), eval(nested));
    }

    #[test]
    fn error_handling() {
        let cases = [
            ("5 + true;", "type mismatch: INTEGER + BOOLEAN"),
            ("-true", "unknown operator: -BOOLEAN"),
            ("true + false;", "unknown operator: BOOLEAN + BOOLEAN"),
            ("if (10 > 1) { true + false; }", "unknown operator: BOOLEAN + BOOLEAN"),
            ("foobar", "identifier not found: foobar"),
            (r#""a" - "b""#, "unknown operator: STRING - STRING"),
        ];
        for (input, expected) in cases {
            match eval(input) {
                Value::Error(msg) => assert_eq!(expected, msg.as_ref(), "input: {input}"),
                other => panic!("expected error for {input:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        match eval("1 / 0") {
            Value::Error(msg) => assert_eq!("division by zero", msg.as_ref()),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn let_statements() {
        assert_eq!(Value::Integer(5), eval("let a = 5; a;"));
        assert_eq!(Value::Integer(25), eval("let a = 5 * 5; a;"));
        assert_eq!(Value::Integer(5), eval("let a = 5; let b = a; b;"));
    }

    #[test]
    fn function_application() {
        assert_eq!(Value::Integer(5), eval("let identity = fn(x) { x; }; identity(5);"));
        assert_eq!(Value::Integer(10), eval("let identity = fn(x) { return x; }; identity(10);"));
        assert_eq!(Value::Integer(4), eval("let double = fn(x) { x * 2; }; double(2);"));
        assert_eq!(Value::Integer(10), eval("let add = fn(x, y) { x + y; }; add(5, 5);"));
    }

    #[test]
    fn closures_capture_values_at_definition_time() {
        let input = "let newAdder = fn(a) { fn(b) { a + b }; }; let addTwo = newAdder(2); addTwo(3);";
        assert_eq!(Value::Integer(5), eval(input));
    }

    #[test]
    fn string_literal_and_concatenation() {
        assert_eq!(Value::String(Rc::from("Hello World!")), eval(r#""Hello" + " " + "World!""#));
    }

    #[test]
    fn array_literals_and_indexing() {
        assert_eq!(Value::Integer(3), eval("[1, 2, 3][2]"));
        assert_eq!(Value::Null, eval("[1, 2, 3][3]"));
        assert_eq!(Value::Null, eval("[1, 2, 3][-1]"));
    }

    #[test]
    fn hash_literals_and_indexing() {
        let input = r#"let h = {"name": "Monkey", "age": 0, "type": "Language"}; h["name"]"#;
        assert_eq!(Value::String(Rc::from("Monkey")), eval(input));
    }

    #[test]
    fn builtins_len_first_last_rest_push() {
        assert_eq!(Value::Integer(2), eval("first(rest(push([1], 2)))"));
        assert_eq!(Value::Integer(5), eval(r#"len("hello")"#));
    }

    #[test]
    fn recursive_function_via_self_reference() {
        let input = "let counter = fn(x) { if (x > 100) { return 99; } else { counter(x + 1); } }; counter(0);";
        assert_eq!(Value::Integer(99), eval(input));
    }

    #[test]
    fn fibonacci_ten() {
        let input = "let fibonacci = fn(x) { if (x == 0) { 0 } else { if (x == 1) { 1 } else { fibonacci(x - 1) + fibonacci(x - 2) } } }; fibonacci(10);";
        assert_eq!(Value::Integer(55), eval(input));
    }
}
