use std::fmt;

/// A literal operand in a condition.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    /// A whole number, e.g. `18` or `-5`.
    Int(i64),
    /// A number with a fractional part, e.g. `2.5`.
    Float(f64),
    /// `YES`/`Y`/`TRUE` or `NO`/`N`/`FALSE`.
    Bool(bool),
    /// A quoted string, unquoted.
    String(String),
    /// A bare word: an enumeration code or another field id.
    Identifier(String),
}

impl Value {
    /// Build a numeric value from a NUMBER lexeme. Lexemes with a decimal
    /// point become [`Value::Float`].
    #[must_use]
    pub fn from_number(lexeme: &str) -> Option<Value> {
        if lexeme.contains('.') {
            lexeme.parse().ok().map(Value::Float)
        } else {
            lexeme
                .parse()
                .ok()
                .map(Value::Int)
                .or_else(|| lexeme.parse().ok().map(Value::Float))
        }
    }

    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// The value as text, without quotes.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Value::Int(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Bool(v) => v.to_string(),
            Value::String(v) | Value::Identifier(v) => v.clone(),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(true) => write!(f, "YES"),
            Value::Bool(false) => write!(f, "NO"),
            Value::String(v) => write!(f, "\"{}\"", v.replace('"', "\\\"")),
            Value::Identifier(v) => write!(f, "{v}"),
        }
    }
}
