use std::fmt;

use super::error::CompilationWarning;
use super::rule::RuleType;

/// SQL generated for a single rule.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct CompiledRule {
    pub rule_name: String,
    pub rule_code: String,
    pub rule_type: RuleType,
    pub mandatory: bool,
    pub score: Option<i64>,
    /// Boolean predicate over the base table alias.
    pub where_clause: String,
    /// `CASE WHEN ... END` yielding the rule's score (BONUS) or a 1/0 pass
    /// flag (every other type).
    pub select_expression: String,
    /// Field ids referenced by the rule, in order of first use.
    pub used_fields: Vec<String>,
}

/// Output of one compile call: per-rule SQL, the aggregate clauses, and the
/// assembled queries. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct CompiledRuleset {
    pub(crate) ruleset_code: String,
    pub(crate) scope_code: String,
    pub(crate) total_rules: usize,
    pub(crate) inclusion_rules: usize,
    pub(crate) exclusion_rules: usize,
    pub(crate) priority_rules: usize,
    pub(crate) bonus_rules: usize,
    pub(crate) eligibility_where_clause: String,
    pub(crate) exclusion_where_clause: String,
    pub(crate) score_expression: String,
    pub(crate) eligibility_check_query: String,
    pub(crate) scoring_query: String,
    pub(crate) full_eligibility_query: String,
    pub(crate) compiled_rules: Vec<CompiledRule>,
    pub(crate) compilation_warnings: Vec<CompilationWarning>,
}

impl CompiledRuleset {
    #[must_use]
    pub fn ruleset_code(&self) -> &str {
        &self.ruleset_code
    }

    #[must_use]
    pub fn scope_code(&self) -> &str {
        &self.scope_code
    }

    #[must_use]
    pub fn total_rules(&self) -> usize {
        self.total_rules
    }

    #[must_use]
    pub fn inclusion_rules(&self) -> usize {
        self.inclusion_rules
    }

    #[must_use]
    pub fn exclusion_rules(&self) -> usize {
        self.exclusion_rules
    }

    #[must_use]
    pub fn priority_rules(&self) -> usize {
        self.priority_rules
    }

    #[must_use]
    pub fn bonus_rules(&self) -> usize {
        self.bonus_rules
    }

    /// AND of every mandatory INCLUSION and PRIORITY predicate; `1 = 1` when
    /// there are none.
    #[must_use]
    pub fn eligibility_where_clause(&self) -> &str {
        &self.eligibility_where_clause
    }

    /// OR of every EXCLUSION predicate; `1 = 0` when there are none. A row
    /// matching it is disqualified.
    #[must_use]
    pub fn exclusion_where_clause(&self) -> &str {
        &self.exclusion_where_clause
    }

    /// Sum of the BONUS select expressions; `0` when there are none.
    #[must_use]
    pub fn score_expression(&self) -> &str {
        &self.score_expression
    }

    #[must_use]
    pub fn eligibility_check_query(&self) -> &str {
        &self.eligibility_check_query
    }

    #[must_use]
    pub fn scoring_query(&self) -> &str {
        &self.scoring_query
    }

    #[must_use]
    pub fn full_eligibility_query(&self) -> &str {
        &self.full_eligibility_query
    }

    #[must_use]
    pub fn compiled_rules(&self) -> &[CompiledRule] {
        &self.compiled_rules
    }

    /// Look up a compiled rule by its code.
    #[must_use]
    pub fn rule(&self, code: &str) -> Option<&CompiledRule> {
        self.compiled_rules.iter().find(|r| r.rule_code == code)
    }

    #[must_use]
    pub fn compilation_warnings(&self) -> &[CompilationWarning] {
        &self.compilation_warnings
    }

    /// Every field id used by any rule, deduplicated, in order of first use.
    #[must_use]
    pub fn used_fields(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for field in self.compiled_rules.iter().flat_map(|r| &r.used_fields) {
            if !out.contains(&field.as_str()) {
                out.push(field);
            }
        }
        out
    }

    /// Number of rules of the given type.
    #[must_use]
    pub fn count_of(&self, rule_type: RuleType) -> usize {
        match rule_type {
            RuleType::Inclusion => self.inclusion_rules,
            RuleType::Exclusion => self.exclusion_rules,
            RuleType::Priority => self.priority_rules,
            RuleType::Bonus => self.bonus_rules,
        }
    }
}

#[cfg(feature = "binary-cache")]
impl CompiledRuleset {
    /// Serialize this compiled ruleset to a byte vector.
    ///
    /// The optional `source_text` is hashed (BLAKE3) and embedded in the
    /// payload metadata so callers can tell when the script has changed.
    ///
    /// # Errors
    ///
    /// Returns [`SerializeError`](crate::serial::SerializeError) if encoding fails.
    pub fn to_bytes(
        &self,
        source_text: Option<&str>,
    ) -> Result<Vec<u8>, crate::serial::SerializeError> {
        crate::serial::encode(self, source_text)
    }

    /// Deserialize a compiled ruleset produced by [`to_bytes`](Self::to_bytes).
    ///
    /// # Errors
    ///
    /// Returns [`DeserializeError`](crate::serial::DeserializeError) on
    /// format, integrity, or validation failure.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, crate::serial::DeserializeError> {
        crate::serial::decode(bytes)
    }

    /// # Errors
    ///
    /// Returns [`SerializeError`](crate::serial::SerializeError) on
    /// encoding or I/O failure.
    pub fn to_binary_file(
        &self,
        path: impl AsRef<std::path::Path>,
        source_text: Option<&str>,
    ) -> Result<(), crate::serial::SerializeError> {
        let bytes = self.to_bytes(source_text)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`DeserializeError`](crate::serial::DeserializeError) on
    /// I/O, format, integrity, or validation failure.
    pub fn from_binary_file(
        path: impl AsRef<std::path::Path>,
    ) -> Result<Self, crate::serial::DeserializeError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for CompiledRuleset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CompiledRuleset({} for {}: {} rules, {} warnings)",
            self.ruleset_code,
            self.scope_code,
            self.total_rules,
            self.compilation_warnings.len(),
        )
    }
}
