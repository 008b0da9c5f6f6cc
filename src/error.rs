//! Unifies the three error taxonomies (parse, compile, runtime) behind one crate-wide enum.

use thiserror::Error;

/// Any error that can surface out of the parse → compile → run pipeline.
///
/// Generalizes `rlox::error::InterpretationError`'s two bare variants into ones that carry the
/// underlying message(s), so driver and REPL code can report specifics instead of a fixed string.
#[derive(Debug, Error)]
pub enum MonkeyError {
    /// One or more parser errors; the accumulated messages from [crate::parser::parse].
    #[error("parse error: {}", .0.join("; "))]
    Parse(Vec<String>),

    /// A single compile-time error, e.g. an undefined variable reference.
    #[error("compile error: {0}")]
    Compile(String),

    /// An unhandled top-level runtime [crate::value::Value::Error].
    #[error("runtime error: {0}")]
    Runtime(String),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_error_display_contains_messages() {
        let err = MonkeyError::Parse(vec!["no prefix parse function for + found".to_string()]);
        assert!(err.to_string().contains("no prefix parse function for + found"));
    }

    #[test]
    fn compile_error_display_contains_message() {
        let err = MonkeyError::Compile("undefined variable foo".to_string());
        assert!(err.to_string().contains("undefined variable foo"));
    }

    #[test]
    fn runtime_error_display_contains_message() {
        let err = MonkeyError::Runtime("division by zero".to_string());
        assert!(err.to_string().contains("division by zero"));
    }
}
