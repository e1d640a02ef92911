use std::fmt;
use std::str::FromStr;

use super::Condition;

/// How a rule participates in the compiled ruleset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum RuleType {
    /// Must hold for a candidate to be eligible.
    #[default]
    Inclusion,
    /// Disqualifies a candidate when it holds.
    Exclusion,
    /// Ranks candidates; mandatory priority rules also gate eligibility.
    Priority,
    /// Adds its score when it holds.
    Bonus,
}

impl RuleType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RuleType::Inclusion => "INCLUSION",
            RuleType::Exclusion => "EXCLUSION",
            RuleType::Priority => "PRIORITY",
            RuleType::Bonus => "BONUS",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown rule type '{0}'")]
pub struct UnknownRuleType(pub String);

impl FromStr for RuleType {
    type Err = UnknownRuleType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INCLUSION" => Ok(RuleType::Inclusion),
            "EXCLUSION" => Ok(RuleType::Exclusion),
            "PRIORITY" => Ok(RuleType::Priority),
            "BONUS" => Ok(RuleType::Bonus),
            _ => Err(UnknownRuleType(s.to_owned())),
        }
    }
}

/// One `RULE "<name>" ...` block.
///
/// Built by the parser, or directly with [`Rule::new`] and the `with_*`
/// setters for programmatic rulesets.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Rule {
    pub name: String,
    /// Stable identifier derived from the name, see [`rule_code`].
    pub code: String,
    pub rule_type: RuleType,
    pub category: Option<String>,
    pub mandatory: bool,
    pub order: Option<i64>,
    pub condition: Option<Condition>,
    pub score: Option<i64>,
    pub weight: Option<i64>,
    pub pass_message: Option<String>,
    pub fail_message: Option<String>,
    pub start_line: usize,
    pub end_line: usize,
}

impl Rule {
    /// A mandatory INCLUSION rule with no condition.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            code: rule_code(&name),
            name,
            rule_type: RuleType::default(),
            category: None,
            mandatory: true,
            order: None,
            condition: None,
            score: None,
            weight: None,
            pass_message: None,
            fail_message: None,
            start_line: 0,
            end_line: 0,
        }
    }

    #[must_use]
    pub fn with_type(mut self, rule_type: RuleType) -> Self {
        self.rule_type = rule_type;
        self
    }

    #[must_use]
    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    #[must_use]
    pub fn with_score(mut self, score: i64) -> Self {
        self.score = Some(score);
        self
    }

    #[must_use]
    pub fn with_mandatory(mut self, mandatory: bool) -> Self {
        self.mandatory = mandatory;
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Number of leaf conditions, 0 when there is no `WHEN` clause.
    #[must_use]
    pub fn condition_count(&self) -> usize {
        self.condition.as_ref().map_or(0, Condition::leaf_count)
    }
}

/// Derive a rule code from its display name: uppercased, with every run of
/// characters other than ASCII letters and digits collapsed to `_`.
///
/// `"Age Check (18+)"` becomes `AGE_CHECK_18`.
#[must_use]
pub fn rule_code(name: &str) -> String {
    let mut code = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !code.is_empty() {
                code.push('_');
            }
            pending_sep = false;
            code.push(c.to_ascii_uppercase());
        } else {
            pending_sep = true;
        }
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::field;

    #[test]
    fn rule_code_collapses_separators() {
        assert_eq!(rule_code("Age Check"), "AGE_CHECK");
        assert_eq!(rule_code("  Age -- Check (18+) "), "AGE_CHECK_18");
        assert_eq!(rule_code("***"), "");
    }

    #[test]
    fn new_rule_defaults() {
        let rule = Rule::new("Has Land");
        assert_eq!(rule.code, "HAS_LAND");
        assert_eq!(rule.rule_type, RuleType::Inclusion);
        assert!(rule.mandatory);
        assert!(rule.condition.is_none());
        assert_eq!(rule.condition_count(), 0);
    }

    #[test]
    fn builder_setters() {
        let rule = Rule::new("Young farmer")
            .with_type(RuleType::Bonus)
            .with_score(10)
            .when(field("age").lt(35_i64).and(field("farmSize").gt(0_i64)));
        assert_eq!(rule.rule_type, RuleType::Bonus);
        assert_eq!(rule.score, Some(10));
        assert_eq!(rule.condition_count(), 2);
    }

    #[test]
    fn rule_type_parse_and_display() {
        assert_eq!("bonus".parse::<RuleType>(), Ok(RuleType::Bonus));
        assert_eq!(RuleType::Priority.to_string(), "PRIORITY");
        assert!("OTHER".parse::<RuleType>().is_err());
    }
}
