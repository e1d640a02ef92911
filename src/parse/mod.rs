mod cursor;
mod error;
mod grammar;

pub use error::ParseError;

use crate::lex::tokenize;
use crate::types::ValidationResult;

use cursor::TokenCursor;

/// Parse script text into a [`ValidationResult`].
///
/// Never fails. The first grammar violation stops rule extraction and is
/// recorded as the result's only error; blank input is a valid script with
/// no rules.
#[must_use]
pub fn parse(text: &str) -> ValidationResult {
    let mut result = ValidationResult::default();
    if text.trim().is_empty() {
        return result;
    }

    let mut cursor = TokenCursor::new(tokenize(text));
    if let Err(err) = grammar::script(&mut cursor, &mut result) {
        tracing::debug!(line = err.line, column = err.column, message = %err.message, "script rejected");
        result.fail(err);
    }

    tracing::debug!(
        valid = result.is_valid(),
        rules = result.rule_count(),
        warnings = result.warnings().len(),
        "parsed rules script"
    );
    result
}
