//! The parser's output: a discriminated tree of statement and expression nodes.
//!
//! Every node implements [std::fmt::Display], producing the canonical parenthesized string form
//! used both for debugging and for the operator-precedence tests in [crate::parser].

use std::fmt;

/// An ordered sequence of top-level statements; the root of a parsed program.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub statements: Vec<Statement>,
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stmt in &self.statements {
            write!(f, "{stmt}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum Statement {
    Let { name: String, value: Expression },
    Return { value: Expression },
    Expression(Expression),
    Block(BlockStatement),
}

#[derive(Debug, Clone, Default)]
pub struct BlockStatement {
    pub statements: Vec<Statement>,
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Let { name, value } => write!(f, "let {name} = {value};"),
            Statement::Return { value } => write!(f, "return {value};"),
            Statement::Expression(expr) => write!(f, "{expr}"),
            Statement::Block(block) => write!(f, "{block}"),
        }
    }
}

impl fmt::Display for BlockStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stmt in &self.statements {
            write!(f, "{stmt}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum Expression {
    Identifier(String),
    IntegerLiteral(i64),
    BooleanLiteral(bool),
    StringLiteral(String),
    Prefix {
        operator: String,
        right: Box<Expression>,
    },
    Infix {
        left: Box<Expression>,
        operator: String,
        right: Box<Expression>,
    },
    If {
        condition: Box<Expression>,
        consequence: BlockStatement,
        alternative: Option<BlockStatement>,
    },
    FunctionLiteral {
        parameters: Vec<String>,
        body: BlockStatement,
        /// The name this function was bound to by an enclosing `let`, if any. Used only by
        /// tooling (e.g. debug printing); it has no effect on compilation or evaluation.
        name: Option<String>,
    },
    Call {
        function: Box<Expression>,
        arguments: Vec<Expression>,
    },
    ArrayLiteral(Vec<Expression>),
    /// Pairs are stored in parse order; consumers that need the deterministic iteration order
    /// described in the language's hash-literal semantics should call
    /// [ordered_hash_pairs] rather than iterating `pairs` directly.
    HashLiteral {
        pairs: Vec<(Expression, Expression)>,
    },
    Index {
        left: Box<Expression>,
        index: Box<Expression>,
    },
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Identifier(name) => write!(f, "{name}"),
            Expression::IntegerLiteral(v) => write!(f, "{v}"),
            Expression::BooleanLiteral(v) => write!(f, "{v}"),
            Expression::StringLiteral(v) => write!(f, "{v}"),
            Expression::Prefix { operator, right } => write!(f, "({operator}{right})"),
            Expression::Infix {
                left,
                operator,
                right,
            } => write!(f, "({left} {operator} {right})"),
            Expression::If {
                condition,
                consequence,
                alternative,
            } => {
                write!(f, "if{condition} {consequence}")?;
                if let Some(alt) = alternative {
                    write!(f, "else {alt}")?;
                }
                Ok(())
            }
            Expression::FunctionLiteral {
                parameters, body, ..
            } => {
                write!(f, "fn({}) {{ {body} }}", parameters.join(", "))
            }
            Expression::Call {
                function,
                arguments,
            } => {
                let args: Vec<String> = arguments.iter().map(|a| a.to_string()).collect();
                write!(f, "{function}({})", args.join(", "))
            }
            Expression::ArrayLiteral(elements) => {
                let elems: Vec<String> = elements.iter().map(|e| e.to_string()).collect();
                write!(f, "[{}]", elems.join(", "))
            }
            Expression::HashLiteral { pairs } => {
                let entries: Vec<String> =
                    pairs.iter().map(|(k, v)| format!("{k}:{v}")).collect();
                write!(f, "{{{}}}", entries.join(", "))
            }
            Expression::Index { left, index } => write!(f, "({left}[{index}])"),
        }
    }
}

/// Returns `pairs` sorted by the lexicographic order of each key expression's canonical string
/// form. Both the compiler and the evaluator must iterate hash-literal pairs in this order so
/// that constant emission order (and thus exact bytecode) and evaluation order are reproducible.
pub fn ordered_hash_pairs(pairs: &[(Expression, Expression)]) -> Vec<&(Expression, Expression)> {
    let mut ordered: Vec<&(Expression, Expression)> = pairs.iter().collect();
    ordered.sort_by(|(k1, _), (k2, _)| k1.to_string().cmp(&k2.to_string()));
    ordered
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn let_statement_displays_canonically() {
        let stmt = Statement::Let {
            name: "x".to_string(),
            value: Expression::IntegerLiteral(5),
        };
        assert_eq!("let x = 5;", stmt.to_string());
    }

    #[test]
    fn infix_expression_is_fully_parenthesized() {
        let expr = Expression::Infix {
            left: Box::new(Expression::IntegerLiteral(1)),
            operator: "+".to_string(),
            right: Box::new(Expression::Infix {
                left: Box::new(Expression::IntegerLiteral(2)),
                operator: "*".to_string(),
                right: Box::new(Expression::IntegerLiteral(3)),
            }),
        };
        assert_eq!("(1 + (2 * 3))", expr.to_string());
    }

    #[test]
    fn hash_literal_pairs_sort_lexicographically_by_key() {
        let pairs = vec![
            (
                Expression::StringLiteral("b".into()),
                Expression::IntegerLiteral(2),
            ),
            (
                Expression::StringLiteral("a".into()),
                Expression::IntegerLiteral(1),
            ),
        ];
        let ordered = ordered_hash_pairs(&pairs);
        assert_eq!("a", ordered[0].0.to_string());
        assert_eq!("b", ordered[1].0.to_string());
    }
}
