use std::fmt;

use thiserror::Error;

/// A field mapping the compiler cannot generate SQL against.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("schema setting '{setting}' must not be empty")]
    EmptySchemaSetting { setting: &'static str },

    #[error("'{identifier}' is not a valid SQL identifier")]
    InvalidIdentifier { identifier: String },

    #[error("grid child field '{field}' refers to grid '{grid}', which has no table")]
    GridWithoutTable { field: String, grid: String },
}

/// A non-fatal compilation diagnostic. Compilation continues and the
/// affected rule still gets best-effort SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompilationWarning {
    /// Code of the rule being compiled, `None` for ruleset-level warnings.
    pub rule: Option<String>,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl fmt::Display for CompilationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.rule {
            Some(rule) => write!(
                f,
                "rule {rule} (line {}, column {}): {}",
                self.line, self.column, self.message
            ),
            None => f.write_str(&self.message),
        }
    }
}
