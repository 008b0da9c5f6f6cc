//! A Pratt (top-down operator precedence) parser.
//!
//! Structurally this follows the same shape as [rlox::compiler]'s `Parser`/`Compiler` split
//! (`advance`/`consume`/`check`, a precedence-keyed rule table, `parse_precedence`), generalized
//! from rlox's single-pass "parse straight to bytecode" design into a parser that builds a
//! reusable [crate::ast::Program].

use crate::ast::{BlockStatement, Expression, Program, Statement};
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};

/// Precedences ascending; `as u8` ordering drives the Pratt algorithm's comparisons.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Eq, Ord)]
enum Precedence {
    Lowest,
    Equals,      // == !=
    LessGreater, // < >
    Sum,         // + -
    Product,     // * /
    Prefix,      // -x !x
    Call,        // f(...)
    Index,       // arr[...]
}

fn precedence_of(kind: TokenKind) -> Precedence {
    use TokenKind::*;
    match kind {
        Eq | NotEq => Precedence::Equals,
        Lt | Gt => Precedence::LessGreater,
        Plus | Minus => Precedence::Sum,
        Slash | Asterisk => Precedence::Product,
        LParen => Precedence::Call,
        LBracket => Precedence::Index,
        _ => Precedence::Lowest,
    }
}

/// Parses a complete program from `source`, returning the (best-effort) [Program] and any
/// accumulated error messages. A non-empty error list means the `Program` is not safe to compile
/// or evaluate.
pub fn parse(source: &str) -> (Program, Vec<String>) {
    let mut parser = Parser::new(Lexer::new(source));
    let program = parser.parse_program();
    (program, parser.errors)
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    cur_token: Token,
    peek_token: Token,
    errors: Vec<String>,
}

impl<'a> Parser<'a> {
    fn new(mut lexer: Lexer<'a>) -> Self {
        let cur_token = lexer.next_token();
        let peek_token = lexer.next_token();
        Parser {
            lexer,
            cur_token,
            peek_token,
            errors: Vec::new(),
        }
    }

    fn next_token(&mut self) {
        self.cur_token = std::mem::replace(&mut self.peek_token, self.lexer.next_token());
    }

    fn cur_is(&self, kind: TokenKind) -> bool {
        self.cur_token.kind() == kind
    }

    fn peek_is(&self, kind: TokenKind) -> bool {
        self.peek_token.kind() == kind
    }

    /// If the peek token is `kind`, consumes it and returns true; otherwise records an error and
    /// returns false.
    fn expect_peek(&mut self, kind: TokenKind) -> bool {
        if self.peek_is(kind) {
            self.next_token();
            true
        } else {
            self.peek_error(kind);
            false
        }
    }

    fn peek_error(&mut self, expected: TokenKind) {
        self.errors.push(format!(
            "expected next token to be {expected}, got {} instead",
            self.peek_token.kind()
        ));
    }

    fn no_prefix_parse_fn_error(&mut self, kind: TokenKind) {
        self.errors
            .push(format!("no prefix parse function for {kind} found"));
    }

    fn peek_precedence(&self) -> Precedence {
        precedence_of(self.peek_token.kind())
    }

    fn cur_precedence(&self) -> Precedence {
        precedence_of(self.cur_token.kind())
    }

    fn parse_program(&mut self) -> Program {
        let mut program = Program::default();
        while !self.cur_is(TokenKind::Eof) {
            if let Some(stmt) = self.parse_statement() {
                program.statements.push(stmt);
            }
            self.next_token();
        }
        program
    }

    fn parse_statement(&mut self) -> Option<Statement> {
        match self.cur_token.kind() {
            TokenKind::Let => self.parse_let_statement(),
            TokenKind::Return => self.parse_return_statement(),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_let_statement(&mut self) -> Option<Statement> {
        if !self.expect_peek(TokenKind::Ident) {
            return None;
        }
        let name = self.cur_token.literal().to_string();

        if !self.expect_peek(TokenKind::Assign) {
            return None;
        }
        self.next_token();

        let mut value = self.parse_expression(Precedence::Lowest)?;
        if let Expression::FunctionLiteral { name: fn_name, .. } = &mut value {
            *fn_name = Some(name.clone());
        }

        if self.peek_is(TokenKind::Semicolon) {
            self.next_token();
        }

        Some(Statement::Let { name, value })
    }

    fn parse_return_statement(&mut self) -> Option<Statement> {
        self.next_token();

        let value = self.parse_expression(Precedence::Lowest)?;

        if self.peek_is(TokenKind::Semicolon) {
            self.next_token();
        }

        Some(Statement::Return { value })
    }

    fn parse_expression_statement(&mut self) -> Option<Statement> {
        let expr = self.parse_expression(Precedence::Lowest)?;

        if self.peek_is(TokenKind::Semicolon) {
            self.next_token();
        }

        Some(Statement::Expression(expr))
    }

    fn parse_expression(&mut self, precedence: Precedence) -> Option<Expression> {
        let mut left = self.parse_prefix()?;

        while !self.peek_is(TokenKind::Semicolon) && precedence < self.peek_precedence() {
            if !is_infix_token(self.peek_token.kind()) {
                return Some(left);
            }
            self.next_token();
            left = self.parse_infix(left)?;
        }

        Some(left)
    }

    fn parse_prefix(&mut self) -> Option<Expression> {
        match self.cur_token.kind() {
            TokenKind::Ident => Some(Expression::Identifier(self.cur_token.literal().to_string())),
            TokenKind::Int => self.parse_integer_literal(),
            TokenKind::True => Some(Expression::BooleanLiteral(true)),
            TokenKind::False => Some(Expression::BooleanLiteral(false)),
            TokenKind::String => Some(Expression::StringLiteral(
                self.cur_token.literal().to_string(),
            )),
            TokenKind::Bang | TokenKind::Minus => self.parse_prefix_expression(),
            TokenKind::LParen => self.parse_grouped_expression(),
            TokenKind::If => self.parse_if_expression(),
            TokenKind::Function => self.parse_function_literal(),
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_hash_literal(),
            kind => {
                self.no_prefix_parse_fn_error(kind);
                None
            }
        }
    }

    fn parse_infix(&mut self, left: Expression) -> Option<Expression> {
        match self.cur_token.kind() {
            TokenKind::LParen => self.parse_call_expression(left),
            TokenKind::LBracket => self.parse_index_expression(left),
            _ => self.parse_infix_expression(left),
        }
    }

    fn parse_integer_literal(&mut self) -> Option<Expression> {
        match self.cur_token.literal().parse::<i64>() {
            Ok(value) => Some(Expression::IntegerLiteral(value)),
            Err(_) => {
                self.errors.push(format!(
                    "could not parse {:?} as integer",
                    self.cur_token.literal()
                ));
                None
            }
        }
    }

    fn parse_prefix_expression(&mut self) -> Option<Expression> {
        let operator = self.cur_token.literal().to_string();
        self.next_token();
        let right = self.parse_expression(Precedence::Prefix)?;
        Some(Expression::Prefix {
            operator,
            right: Box::new(right),
        })
    }

    fn parse_infix_expression(&mut self, left: Expression) -> Option<Expression> {
        let operator = self.cur_token.literal().to_string();
        let precedence = self.cur_precedence();
        self.next_token();
        let right = self.parse_expression(precedence)?;
        Some(Expression::Infix {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        })
    }

    fn parse_grouped_expression(&mut self) -> Option<Expression> {
        self.next_token();
        let expr = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(TokenKind::RParen) {
            return None;
        }
        Some(expr)
    }

    fn parse_if_expression(&mut self) -> Option<Expression> {
        if !self.expect_peek(TokenKind::LParen) {
            return None;
        }
        self.next_token();
        let condition = self.parse_expression(Precedence::Lowest)?;

        if !self.expect_peek(TokenKind::RParen) {
            return None;
        }
        if !self.expect_peek(TokenKind::LBrace) {
            return None;
        }
        let consequence = self.parse_block_statement();

        let alternative = if self.peek_is(TokenKind::Else) {
            self.next_token();
            if !self.expect_peek(TokenKind::LBrace) {
                return None;
            }
            Some(self.parse_block_statement())
        } else {
            None
        };

        Some(Expression::If {
            condition: Box::new(condition),
            consequence,
            alternative,
        })
    }

    fn parse_block_statement(&mut self) -> BlockStatement {
        let mut block = BlockStatement::default();
        self.next_token();

        while !self.cur_is(TokenKind::RBrace) && !self.cur_is(TokenKind::Eof) {
            if let Some(stmt) = self.parse_statement() {
                block.statements.push(stmt);
            }
            self.next_token();
        }

        block
    }

    fn parse_function_literal(&mut self) -> Option<Expression> {
        if !self.expect_peek(TokenKind::LParen) {
            return None;
        }
        let parameters = self.parse_function_parameters()?;

        if !self.expect_peek(TokenKind::LBrace) {
            return None;
        }
        let body = self.parse_block_statement();

        Some(Expression::FunctionLiteral {
            parameters,
            body,
            name: None,
        })
    }

    fn parse_function_parameters(&mut self) -> Option<Vec<String>> {
        let mut params = Vec::new();

        if self.peek_is(TokenKind::RParen) {
            self.next_token();
            return Some(params);
        }

        self.next_token();
        params.push(self.cur_token.literal().to_string());

        while self.peek_is(TokenKind::Comma) {
            self.next_token();
            self.next_token();
            params.push(self.cur_token.literal().to_string());
        }

        if !self.expect_peek(TokenKind::RParen) {
            return None;
        }

        Some(params)
    }

    fn parse_call_expression(&mut self, function: Expression) -> Option<Expression> {
        let arguments = self.parse_expression_list(TokenKind::RParen)?;
        Some(Expression::Call {
            function: Box::new(function),
            arguments,
        })
    }

    fn parse_array_literal(&mut self) -> Option<Expression> {
        let elements = self.parse_expression_list(TokenKind::RBracket)?;
        Some(Expression::ArrayLiteral(elements))
    }

    fn parse_expression_list(&mut self, end: TokenKind) -> Option<Vec<Expression>> {
        let mut list = Vec::new();

        if self.peek_is(end) {
            self.next_token();
            return Some(list);
        }

        self.next_token();
        list.push(self.parse_expression(Precedence::Lowest)?);

        while self.peek_is(TokenKind::Comma) {
            self.next_token();
            self.next_token();
            list.push(self.parse_expression(Precedence::Lowest)?);
        }

        if !self.expect_peek(end) {
            return None;
        }

        Some(list)
    }

    fn parse_hash_literal(&mut self) -> Option<Expression> {
        let mut pairs = Vec::new();

        while !self.peek_is(TokenKind::RBrace) {
            self.next_token();
            let key = self.parse_expression(Precedence::Lowest)?;

            if !self.expect_peek(TokenKind::Colon) {
                return None;
            }

            self.next_token();
            let value = self.parse_expression(Precedence::Lowest)?;

            pairs.push((key, value));

            if !self.peek_is(TokenKind::RBrace) && !self.expect_peek(TokenKind::Comma) {
                return None;
            }
        }

        if !self.expect_peek(TokenKind::RBrace) {
            return None;
        }

        Some(Expression::HashLiteral { pairs })
    }

    fn parse_index_expression(&mut self, left: Expression) -> Option<Expression> {
        self.next_token();
        let index = self.parse_expression(Precedence::Lowest)?;

        if !self.expect_peek(TokenKind::RBracket) {
            return None;
        }

        Some(Expression::Index {
            left: Box::new(left),
            index: Box::new(index),
        })
    }
}

fn is_infix_token(kind: TokenKind) -> bool {
    use TokenKind::*;
    matches!(
        kind,
        Plus | Minus | Slash | Asterisk | Eq | NotEq | Lt | Gt | LParen | LBracket
    )
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse_ok(input: &str) -> Program {
        let (program, errors) = parse(input);
        assert!(errors.is_empty(), "parser errors: {errors:?}");
        program
    }

    #[test]
    fn let_statements() {
        let program = parse_ok("let x = 5; let y = true; let foobar = y;");
        assert_eq!(3, program.statements.len());
    }

    #[test]
    fn operator_precedence() {
        let cases = [
            ("-a * b", "((-a) * b)"),
            ("!-a", "(!(-a))"),
            ("a + b + c", "((a + b) + c)"),
            ("a + b - c", "((a + b) - c)"),
            ("a * b * c", "((a * b) * c)"),
            ("a * b / c", "((a * b) / c)"),
            ("a + b / c", "(a + (b / c))"),
            ("a + b * c + d / e - f", "(((a + (b * c)) + (d / e)) - f)"),
            ("3 + 4; -5 * 5", "(3 + 4)((-5) * 5)"),
            ("5 > 4 == 3 < 4", "((5 > 4) == (3 < 4))"),
            ("5 < 4 != 3 > 4", "((5 < 4) != (3 > 4))"),
            (
                "3 + 4 * 5 == 3 * 1 + 4 * 5",
                "((3 + (4 * 5)) == ((3 * 1) + (4 * 5)))",
            ),
            ("1 + (2 + 3) + 4", "((1 + (2 + 3)) + 4)"),
            ("(5 + 5) * 2", "((5 + 5) * 2)"),
            ("2 / (5 + 5)", "(2 / (5 + 5))"),
            ("-(5 + 5)", "(-(5 + 5))"),
            ("!(true == true)", "(!(true == true))"),
            (
                "a * [1, 2, 3, 4][b * c] * d",
                "((a * ([1, 2, 3, 4][(b * c)])) * d)",
            ),
            (
                "add(a * b[2], b[1], 2 * [1, 2][1])",
                "add((a * (b[2])), (b[1]), (2 * ([1, 2][1])))",
            ),
        ];

        for (input, expected) in cases {
            let program = parse_ok(input);
            assert_eq!(expected, program.to_string(), "input: {input}");
        }
    }

    #[test]
    fn if_expression() {
        let program = parse_ok("if (x < y) { x }");
        assert_eq!(1, program.statements.len());
    }

    #[test]
    fn function_literal_parameters() {
        let cases = [
            ("fn() {};", Vec::<&str>::new()),
            ("fn(x) {};", vec!["x"]),
            ("fn(x, y, z) {};", vec!["x", "y", "z"]),
        ];

        for (input, expected_params) in cases {
            let program = parse_ok(input);
            match &program.statements[0] {
                Statement::Expression(Expression::FunctionLiteral { parameters, .. }) => {
                    assert_eq!(expected_params, *parameters);
                }
                other => panic!("expected function literal, got {other:?}"),
            }
        }
    }

    #[test]
    fn let_bound_function_literal_gets_name() {
        let program = parse_ok("let myFunction = fn() { };");
        match &program.statements[0] {
            Statement::Let { value, .. } => match value {
                Expression::FunctionLiteral { name, .. } => {
                    assert_eq!(Some("myFunction".to_string()), *name);
                }
                other => panic!("expected function literal, got {other:?}"),
            },
            other => panic!("expected let statement, got {other:?}"),
        }
    }

    #[test]
    fn string_literal_expression() {
        let program = parse_ok(r#""hello world";"#);
        match &program.statements[0] {
            Statement::Expression(Expression::StringLiteral(s)) => assert_eq!("hello world", s),
            other => panic!("expected string literal, got {other:?}"),
        }
    }

    #[test]
    fn array_literal_expression() {
        let program = parse_ok("[1, 2 * 2, 3 + 3]");
        match &program.statements[0] {
            Statement::Expression(Expression::ArrayLiteral(elements)) => {
                assert_eq!(3, elements.len());
            }
            other => panic!("expected array literal, got {other:?}"),
        }
    }

    #[test]
    fn hash_literal_with_string_keys() {
        let program = parse_ok(r#"{"one": 1, "two": 2, "three": 3}"#);
        match &program.statements[0] {
            Statement::Expression(Expression::HashLiteral { pairs }) => {
                assert_eq!(3, pairs.len());
            }
            other => panic!("expected hash literal, got {other:?}"),
        }
    }

    #[test]
    fn empty_hash_literal() {
        let program = parse_ok("{}");
        match &program.statements[0] {
            Statement::Expression(Expression::HashLiteral { pairs }) => {
                assert!(pairs.is_empty());
            }
            other => panic!("expected hash literal, got {other:?}"),
        }
    }

    #[test]
    fn index_expression() {
        let program = parse_ok("myArray[1 + 1]");
        match &program.statements[0] {
            Statement::Expression(Expression::Index { .. }) => {}
            other => panic!("expected index expression, got {other:?}"),
        }
    }

    #[test]
    fn missing_prefix_rule_records_error() {
        let (_program, errors) = parse(")");
        assert!(!errors.is_empty());
        assert!(errors[0].contains("no prefix parse function"));
    }

    #[test]
    fn missing_token_records_error() {
        let (_program, errors) = parse("let x 5;");
        assert!(!errors.is_empty());
        assert!(errors[0].contains("expected next token to be ="));
    }
}
