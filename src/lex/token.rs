use std::fmt;

/// A 1-based line/column location in the script source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    #[must_use]
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The closed set of token kinds produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Rule structure
    Rule,
    Type,
    Category,
    Mandatory,
    Order,
    When,
    Score,
    Weight,
    PassMessage,
    FailMessage,

    // Rule types
    Inclusion,
    Exclusion,
    Priority,
    Bonus,

    // Booleans
    Yes,
    No,
    True,
    False,

    // Logical operators
    And,
    Or,
    Not,

    // Comparison operators
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Between,
    In,
    NotIn,
    Contains,
    StartsWith,
    EndsWith,
    IsEmpty,
    IsNotEmpty,

    // Aggregation functions
    Count,
    Sum,
    Avg,
    Min,
    Max,

    // Grid checks
    HasAny,
    HasAll,
    HasNone,

    // Literals
    String,
    Number,
    Identifier,

    // Punctuation
    LParen,
    RParen,
    Comma,
    Colon,
    Dot,
    Plus,
    Minus,

    // Structural
    Comment,
    Newline,
    Eof,
    Unknown,
}

impl TokenKind {
    /// Look up a single-word keyword, case-insensitively.
    #[must_use]
    pub fn keyword(word: &str) -> Option<TokenKind> {
        let kind = match word.to_ascii_uppercase().as_str() {
            "RULE" => TokenKind::Rule,
            "TYPE" => TokenKind::Type,
            "CATEGORY" => TokenKind::Category,
            "MANDATORY" => TokenKind::Mandatory,
            "ORDER" => TokenKind::Order,
            "WHEN" => TokenKind::When,
            "SCORE" => TokenKind::Score,
            "WEIGHT" => TokenKind::Weight,
            "INCLUSION" => TokenKind::Inclusion,
            "EXCLUSION" => TokenKind::Exclusion,
            "PRIORITY" => TokenKind::Priority,
            "BONUS" => TokenKind::Bonus,
            "YES" | "Y" => TokenKind::Yes,
            "NO" | "N" => TokenKind::No,
            "TRUE" => TokenKind::True,
            "FALSE" => TokenKind::False,
            "AND" => TokenKind::And,
            "OR" => TokenKind::Or,
            "NOT" => TokenKind::Not,
            "BETWEEN" => TokenKind::Between,
            "IN" => TokenKind::In,
            "CONTAINS" => TokenKind::Contains,
            "COUNT" => TokenKind::Count,
            "SUM" => TokenKind::Sum,
            "AVG" => TokenKind::Avg,
            "MIN" => TokenKind::Min,
            "MAX" => TokenKind::Max,
            "HAS_ANY" => TokenKind::HasAny,
            "HAS_ALL" => TokenKind::HasAll,
            "HAS_NONE" => TokenKind::HasNone,
            _ => return None,
        };
        Some(kind)
    }

    #[must_use]
    pub fn is_rule_type(self) -> bool {
        matches!(
            self,
            TokenKind::Inclusion | TokenKind::Exclusion | TokenKind::Priority | TokenKind::Bonus
        )
    }

    /// Operators that may follow a field in a leaf comparison, including the
    /// atomic forms (`BETWEEN`, `IN`, `IS EMPTY`, ...).
    #[must_use]
    pub fn is_comparison_operator(self) -> bool {
        self.is_binary_operator()
            || matches!(
                self,
                TokenKind::Between
                    | TokenKind::In
                    | TokenKind::NotIn
                    | TokenKind::IsEmpty
                    | TokenKind::IsNotEmpty
            )
    }

    /// Operators of the plain `field op value` form.
    #[must_use]
    pub fn is_binary_operator(self) -> bool {
        matches!(
            self,
            TokenKind::Eq
                | TokenKind::Neq
                | TokenKind::Gt
                | TokenKind::Gte
                | TokenKind::Lt
                | TokenKind::Lte
                | TokenKind::Contains
                | TokenKind::StartsWith
                | TokenKind::EndsWith
        )
    }

    #[must_use]
    pub fn is_logical_operator(self) -> bool {
        matches!(self, TokenKind::And | TokenKind::Or | TokenKind::Not)
    }

    #[must_use]
    pub fn is_aggregation_function(self) -> bool {
        matches!(
            self,
            TokenKind::Count | TokenKind::Sum | TokenKind::Avg | TokenKind::Min | TokenKind::Max
        )
    }

    #[must_use]
    pub fn is_grid_check_function(self) -> bool {
        matches!(
            self,
            TokenKind::HasAny | TokenKind::HasAll | TokenKind::HasNone
        )
    }

    #[must_use]
    pub fn is_boolean_value(self) -> bool {
        matches!(
            self,
            TokenKind::Yes | TokenKind::No | TokenKind::True | TokenKind::False
        )
    }
}

/// One lexed token: its kind, raw source text and where it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInstance {
    pub kind: TokenKind,
    pub text: String,
    pub position: Position,
}

impl TokenInstance {
    pub(crate) fn new(kind: TokenKind, text: impl Into<String>, position: Position) -> Self {
        Self {
            kind,
            text: text.into(),
            position,
        }
    }

    #[must_use]
    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    #[must_use]
    pub fn is_any(&self, kinds: &[TokenKind]) -> bool {
        kinds.contains(&self.kind)
    }

    #[must_use]
    pub fn line(&self) -> usize {
        self.position.line
    }

    #[must_use]
    pub fn column(&self) -> usize {
        self.position.column
    }

    /// The numeric value of a NUMBER token, `None` for any other kind.
    #[must_use]
    pub fn numeric_value(&self) -> Option<f64> {
        if self.kind != TokenKind::Number {
            return None;
        }
        self.text.parse().ok()
    }

    /// The unquoted, unescaped content of a STRING token. Other kinds return
    /// their raw text.
    #[must_use]
    pub fn string_value(&self) -> String {
        if self.kind != TokenKind::String {
            return self.text.clone();
        }
        let mut chars = self.text.chars();
        let Some(quote) = chars.next() else {
            return String::new();
        };
        let body = chars.as_str();
        // Unterminated strings have no closing quote to strip.
        let body = match body.strip_suffix(quote) {
            Some(inner) if !inner.ends_with('\\') => inner,
            _ => body,
        };
        let mut out = String::with_capacity(body.len());
        let mut iter = body.chars().peekable();
        while let Some(c) = iter.next() {
            if c == '\\' && iter.peek() == Some(&quote) {
                out.push(quote);
                iter.next();
            } else {
                out.push(c);
            }
        }
        out
    }
}

impl fmt::Display for TokenInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}('{}') at {}", self.kind, self.text, self.position)
    }
}
