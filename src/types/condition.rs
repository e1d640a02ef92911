use std::fmt;
use std::ops::Not;
use std::str::FromStr;

use super::Value;
use crate::lex::Position;

/// Comparison operators of leaf conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    StartsWith,
    EndsWith,
    Between,
    In,
    IsEmpty,
    IsNotEmpty,
}

impl Operator {
    pub const ALL: [Operator; 13] = [
        Operator::Eq,
        Operator::Neq,
        Operator::Gt,
        Operator::Gte,
        Operator::Lt,
        Operator::Lte,
        Operator::Contains,
        Operator::StartsWith,
        Operator::EndsWith,
        Operator::Between,
        Operator::In,
        Operator::IsEmpty,
        Operator::IsNotEmpty,
    ];

    /// How the operator is written in a script.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Neq => "!=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Contains => "CONTAINS",
            Operator::StartsWith => "STARTS WITH",
            Operator::EndsWith => "ENDS WITH",
            Operator::Between => "BETWEEN",
            Operator::In => "IN",
            Operator::IsEmpty => "IS EMPTY",
            Operator::IsNotEmpty => "IS NOT EMPTY",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Returned when a stored operator name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown operator '{0}'")]
pub struct UnknownOperator(pub String);

impl FromStr for Operator {
    type Err = UnknownOperator;

    /// Accepts script symbols and the underscore names used in stored field
    /// metadata (`STARTS_WITH`, `IS_NOT_EMPTY`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['_', ' '], "");
        let op = match normalized.as_str() {
            "=" | "==" | "EQ" | "EQUALS" => Operator::Eq,
            "!=" | "<>" | "NEQ" | "NE" | "NOTEQUALS" => Operator::Neq,
            ">" | "GT" => Operator::Gt,
            ">=" | "GTE" | "GE" => Operator::Gte,
            "<" | "LT" => Operator::Lt,
            "<=" | "LTE" | "LE" => Operator::Lte,
            "CONTAINS" => Operator::Contains,
            "STARTSWITH" => Operator::StartsWith,
            "ENDSWITH" => Operator::EndsWith,
            "BETWEEN" => Operator::Between,
            "IN" | "NOTIN" => Operator::In,
            "ISEMPTY" => Operator::IsEmpty,
            "ISNOTEMPTY" => Operator::IsNotEmpty,
            _ => return Err(UnknownOperator(s.to_owned())),
        };
        Ok(op)
    }
}

/// Aggregation and grid-check functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum FunctionType {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    HasAny,
    HasAll,
    HasNone,
}

impl FunctionType {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            FunctionType::Count => "COUNT",
            FunctionType::Sum => "SUM",
            FunctionType::Avg => "AVG",
            FunctionType::Min => "MIN",
            FunctionType::Max => "MAX",
            FunctionType::HasAny => "HAS_ANY",
            FunctionType::HasAll => "HAS_ALL",
            FunctionType::HasNone => "HAS_NONE",
        }
    }

    /// `COUNT`, `SUM`, `AVG`, `MIN` and `MAX` take a trailing comparison.
    #[must_use]
    pub fn is_aggregation(self) -> bool {
        matches!(
            self,
            FunctionType::Count
                | FunctionType::Sum
                | FunctionType::Avg
                | FunctionType::Min
                | FunctionType::Max
        )
    }

    /// `HAS_ANY`, `HAS_ALL` and `HAS_NONE` take a value list.
    #[must_use]
    pub fn is_grid_check(self) -> bool {
        !self.is_aggregation()
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned when a stored function name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown function '{0}'")]
pub struct UnknownFunction(pub String);

impl FromStr for FunctionType {
    type Err = UnknownFunction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let f = match s.trim().to_ascii_uppercase().as_str() {
            "COUNT" => FunctionType::Count,
            "SUM" => FunctionType::Sum,
            "AVG" => FunctionType::Avg,
            "MIN" => FunctionType::Min,
            "MAX" => FunctionType::Max,
            "HAS_ANY" => FunctionType::HasAny,
            "HAS_ALL" => FunctionType::HasAll,
            "HAS_NONE" => FunctionType::HasNone,
            _ => return Err(UnknownFunction(s.to_owned())),
        };
        Ok(f)
    }
}

/// The right-hand side of a leaf comparison. Its shape is fixed by the
/// operator: `BETWEEN` takes a range, `IN` a list, the `IS [NOT] EMPTY`
/// checks nothing.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operand {
    None,
    Single(Value),
    Range(Value, Value),
    List(Vec<Value>),
}

/// `field op operand`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Comparison {
    pub field: String,
    pub op: Operator,
    pub operand: Operand,
    pub position: Position,
}

/// `FUNC(target [, values]) [op value]`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct FunctionCall {
    pub function: FunctionType,
    pub target: String,
    /// Values of a grid check; always empty for aggregations.
    pub values: Vec<Value>,
    /// Trailing comparison of an aggregation; always `None` for grid checks.
    pub comparison: Option<(Operator, Value)>,
    pub position: Position,
}

/// A condition tree. Produced by the parser, consumed by the compiler.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Condition {
    Comparison(Comparison),
    Function(FunctionCall),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
    /// Explicit parentheses. Semantically transparent.
    Group(Box<Condition>),
}

impl Condition {
    #[must_use]
    pub fn and(self, other: Condition) -> Condition {
        Condition::And(Box::new(self), Box::new(other))
    }

    #[must_use]
    pub fn or(self, other: Condition) -> Condition {
        Condition::Or(Box::new(self), Box::new(other))
    }

    #[must_use]
    pub fn group(self) -> Condition {
        Condition::Group(Box::new(self))
    }

    /// Number of leaves (comparisons and function calls) in the tree.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        match self {
            Condition::Comparison(_) | Condition::Function(_) => 1,
            Condition::And(a, b) | Condition::Or(a, b) => a.leaf_count() + b.leaf_count(),
            Condition::Not(inner) | Condition::Group(inner) => inner.leaf_count(),
        }
    }

    /// Position of the first leaf, in source order.
    #[must_use]
    pub fn position(&self) -> Position {
        match self {
            Condition::Comparison(c) => c.position,
            Condition::Function(f) => f.position,
            Condition::And(a, _) | Condition::Or(a, _) => a.position(),
            Condition::Not(inner) | Condition::Group(inner) => inner.position(),
        }
    }

    /// Strip any number of enclosing groups.
    #[must_use]
    pub fn ungrouped(&self) -> &Condition {
        match self {
            Condition::Group(inner) => inner.ungrouped(),
            other => other,
        }
    }
}

impl Not for Condition {
    type Output = Condition;

    fn not(self) -> Condition {
        Condition::Not(Box::new(self))
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, values: &[Value]) -> fmt::Result {
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{v}")?;
    }
    Ok(())
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operand {
            Operand::None => write!(f, "{} {}", self.field, self.op),
            Operand::Single(v) => write!(f, "{} {} {v}", self.field, self.op),
            Operand::Range(lo, hi) => write!(f, "{} {} {lo} AND {hi}", self.field, self.op),
            Operand::List(values) => {
                write!(f, "{} {} (", self.field, self.op)?;
                write_list(f, values)?;
                f.write_str(")")
            }
        }
    }
}

impl fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}", self.function, self.target)?;
        if !self.values.is_empty() {
            f.write_str(", ")?;
            write_list(f, &self.values)?;
        }
        f.write_str(")")?;
        if let Some((op, value)) = &self.comparison {
            write!(f, " {op} {value}")?;
        }
        Ok(())
    }
}

/// Renders back to script syntax. Only explicit groups are parenthesized,
/// so a parsed condition round-trips through its own grammar.
impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Comparison(c) => write!(f, "{c}"),
            Condition::Function(func) => write!(f, "{func}"),
            Condition::And(a, b) => write!(f, "{a} AND {b}"),
            Condition::Or(a, b) => write!(f, "{a} OR {b}"),
            Condition::Not(inner) => match inner.as_ref() {
                Condition::Comparison(Comparison {
                    field,
                    op: Operator::In,
                    operand: Operand::List(values),
                    ..
                }) => {
                    write!(f, "{field} NOT IN (")?;
                    write_list(f, values)?;
                    f.write_str(")")
                }
                other => write!(f, "NOT {other}"),
            },
            Condition::Group(inner) => write!(f, "({inner})"),
        }
    }
}

/// Intermediate builder for leaf comparisons. Created by [`field()`].
#[derive(Debug, Clone)]
pub struct FieldCondition {
    field: String,
}

impl FieldCondition {
    fn compare(self, op: Operator, operand: Operand) -> Condition {
        Condition::Comparison(Comparison {
            field: self.field,
            op,
            operand,
            position: Position::default(),
        })
    }

    #[must_use]
    pub fn eq(self, value: impl Into<Value>) -> Condition {
        self.compare(Operator::Eq, Operand::Single(value.into()))
    }

    #[must_use]
    pub fn neq(self, value: impl Into<Value>) -> Condition {
        self.compare(Operator::Neq, Operand::Single(value.into()))
    }

    #[must_use]
    pub fn gt(self, value: impl Into<Value>) -> Condition {
        self.compare(Operator::Gt, Operand::Single(value.into()))
    }

    #[must_use]
    pub fn gte(self, value: impl Into<Value>) -> Condition {
        self.compare(Operator::Gte, Operand::Single(value.into()))
    }

    #[must_use]
    pub fn lt(self, value: impl Into<Value>) -> Condition {
        self.compare(Operator::Lt, Operand::Single(value.into()))
    }

    #[must_use]
    pub fn lte(self, value: impl Into<Value>) -> Condition {
        self.compare(Operator::Lte, Operand::Single(value.into()))
    }

    #[must_use]
    pub fn contains(self, value: impl Into<Value>) -> Condition {
        self.compare(Operator::Contains, Operand::Single(value.into()))
    }

    #[must_use]
    pub fn starts_with(self, value: impl Into<Value>) -> Condition {
        self.compare(Operator::StartsWith, Operand::Single(value.into()))
    }

    #[must_use]
    pub fn ends_with(self, value: impl Into<Value>) -> Condition {
        self.compare(Operator::EndsWith, Operand::Single(value.into()))
    }

    #[must_use]
    pub fn between(self, low: impl Into<Value>, high: impl Into<Value>) -> Condition {
        self.compare(Operator::Between, Operand::Range(low.into(), high.into()))
    }

    #[must_use]
    pub fn is_in<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Condition {
        let values = values.into_iter().map(Into::into).collect();
        self.compare(Operator::In, Operand::List(values))
    }

    #[must_use]
    pub fn is_empty(self) -> Condition {
        self.compare(Operator::IsEmpty, Operand::None)
    }

    #[must_use]
    pub fn is_not_empty(self) -> Condition {
        self.compare(Operator::IsNotEmpty, Operand::None)
    }
}

#[must_use]
pub fn field(id: &str) -> FieldCondition {
    FieldCondition {
        field: id.to_owned(),
    }
}

/// Build a function-call condition with no values and no trailing comparison.
#[must_use]
pub fn function(function: FunctionType, target: &str) -> FunctionCall {
    FunctionCall {
        function,
        target: target.to_owned(),
        values: Vec::new(),
        comparison: None,
        position: Position::default(),
    }
}

impl FunctionCall {
    #[must_use]
    pub fn with_values<V: Into<Value>>(mut self, values: impl IntoIterator<Item = V>) -> Self {
        self.values = values.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn compared(mut self, op: Operator, value: impl Into<Value>) -> Self {
        self.comparison = Some((op, value.into()));
        self
    }
}

impl From<FunctionCall> for Condition {
    fn from(call: FunctionCall) -> Self {
        Condition::Function(call)
    }
}
