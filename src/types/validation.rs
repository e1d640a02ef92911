use std::fmt;

use super::{Rule, RuleType};
use crate::parse::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum Severity {
    #[default]
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("ERROR"),
            Severity::Warning => f.write_str("WARNING"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValidationError {
    pub line: usize,
    pub column: usize,
    pub message: String,
    pub severity: Severity,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at line {}, column {}: {}",
            self.severity, self.line, self.column, self.message
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValidationWarning {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WARNING at line {}, column {}: {}",
            self.line, self.column, self.message
        )
    }
}

/// Per-rule overview reported alongside the parsed rules.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct RuleSummary {
    pub name: String,
    pub code: String,
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub rule_type: RuleType,
    pub condition_count: usize,
}

impl From<&Rule> for RuleSummary {
    fn from(rule: &Rule) -> Self {
        Self {
            name: rule.name.clone(),
            code: rule.code.clone(),
            rule_type: rule.rule_type,
            condition_count: rule.condition_count(),
        }
    }
}

/// Outcome of parsing a script: the extracted rules plus every diagnostic.
///
/// `is_valid()` holds exactly when `errors()` is empty. A failed parse keeps
/// the warnings gathered before the failure but reports no rules.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ValidationResult {
    valid: bool,
    rule_count: usize,
    rules: Vec<Rule>,
    #[cfg_attr(feature = "serde", serde(rename = "ruleSummaries"))]
    summaries: Vec<RuleSummary>,
    errors: Vec<ValidationError>,
    warnings: Vec<ValidationWarning>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self {
            valid: true,
            rule_count: 0,
            rules: Vec::new(),
            summaries: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

impl ValidationResult {
    pub(crate) fn push_rule(&mut self, rule: Rule) {
        self.summaries.push(RuleSummary::from(&rule));
        self.rules.push(rule);
        self.rule_count = self.rules.len();
    }

    pub(crate) fn push_warning(&mut self, line: usize, column: usize, message: impl Into<String>) {
        self.warnings.push(ValidationWarning {
            line,
            column,
            message: message.into(),
        });
    }

    /// Record a fatal error. Rules extracted so far are discarded.
    pub(crate) fn fail(&mut self, err: ParseError) {
        self.errors.push(ValidationError {
            line: err.line,
            column: err.column,
            message: err.message,
            severity: Severity::Error,
        });
        self.valid = false;
        self.rules.clear();
        self.summaries.clear();
        self.rule_count = 0;
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rule_count
    }

    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    #[must_use]
    pub fn into_rules(self) -> Vec<Rule> {
        self.rules
    }

    #[must_use]
    pub fn summaries(&self) -> &[RuleSummary] {
        &self.summaries
    }

    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    #[must_use]
    pub fn warnings(&self) -> &[ValidationWarning] {
        &self.warnings
    }

    /// The fatal error, if any, as a [`ParseError`].
    #[must_use]
    pub fn first_error(&self) -> Option<ParseError> {
        self.errors
            .first()
            .map(|e| ParseError::new(e.message.clone(), e.line, e.column))
    }
}
