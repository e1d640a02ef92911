use thiserror::Error;

use crate::lex::TokenInstance;

/// A hard grammar violation, located at the offending token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at line {line}, column {column}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }

    pub(crate) fn at(token: &TokenInstance, message: impl Into<String>) -> Self {
        Self::new(message, token.line(), token.column())
    }
}
