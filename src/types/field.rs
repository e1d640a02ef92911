use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::{FunctionType, Operator};

/// Data type of a field, which decides the operators it accepts and how
/// emptiness is tested in SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum FieldType {
    #[default]
    Text,
    Number,
    Date,
    Boolean,
    Lookup,
    /// A repeating child table. Only usable as a function target.
    Grid,
}

impl FieldType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Text => "TEXT",
            FieldType::Number => "NUMBER",
            FieldType::Date => "DATE",
            FieldType::Boolean => "BOOLEAN",
            FieldType::Lookup => "LOOKUP",
            FieldType::Grid => "GRID",
        }
    }

    /// Operators a field of this type accepts when its definition does not
    /// list any.
    #[must_use]
    pub fn default_operators(self) -> &'static [Operator] {
        use Operator::*;
        match self {
            FieldType::Number | FieldType::Date => &[
                Eq, Neq, Gt, Gte, Lt, Lte, Between, In, IsEmpty, IsNotEmpty,
            ],
            FieldType::Text => &[
                Eq, Neq, Contains, StartsWith, EndsWith, In, IsEmpty, IsNotEmpty,
            ],
            FieldType::Boolean => &[Eq, Neq, IsEmpty, IsNotEmpty],
            FieldType::Lookup => &[Eq, Neq, In, IsEmpty, IsNotEmpty],
            FieldType::Grid => &[],
        }
    }

    /// Whether an emptiness test is a plain `IS NULL`. Text-like columns
    /// also treat `''` as empty.
    #[must_use]
    pub fn null_means_empty(self) -> bool {
        matches!(self, FieldType::Number | FieldType::Date | FieldType::Boolean)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = std::convert::Infallible;

    /// Case-insensitive. Unrecognized names are treated as text.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "NUMBER" | "NUMERIC" | "INTEGER" | "DECIMAL" => FieldType::Number,
            "DATE" | "DATETIME" => FieldType::Date,
            "BOOLEAN" | "BOOL" => FieldType::Boolean,
            "LOOKUP" | "SELECT" => FieldType::Lookup,
            "GRID" => FieldType::Grid,
            _ => FieldType::Text,
        })
    }
}

/// Metadata describing one field a script may reference.
///
/// Dotted ids (`householdMembers.age`) are grid-child fields belonging to
/// the grid named by the first segment.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct FieldDefinition {
    pub field_id: String,
    pub label: String,
    pub scope_code: String,
    pub field_type: FieldType,
    pub category: String,
    /// Empty means the type's [default operators](FieldType::default_operators).
    pub applicable_operators: Vec<Operator>,
    pub is_grid: bool,
    pub grid_parent_field: Option<String>,
    /// Empty means every aggregation is allowed.
    pub aggregation_functions: Vec<FunctionType>,
    pub lookup_form_id: Option<String>,
    pub lookup_values: Vec<String>,
    pub help_text: Option<String>,
    pub display_order: i32,
}

pub const DEFAULT_DISPLAY_ORDER: i32 = 100;

impl FieldDefinition {
    #[must_use]
    pub fn new(field_id: impl Into<String>, field_type: FieldType) -> Self {
        let field_id = field_id.into();
        Self {
            label: field_id.clone(),
            field_id,
            scope_code: String::new(),
            field_type,
            category: String::new(),
            applicable_operators: Vec::new(),
            is_grid: field_type == FieldType::Grid,
            grid_parent_field: None,
            aggregation_functions: Vec::new(),
            lookup_form_id: None,
            lookup_values: Vec::new(),
            help_text: None,
            display_order: DEFAULT_DISPLAY_ORDER,
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    #[must_use]
    pub fn with_scope(mut self, scope_code: impl Into<String>) -> Self {
        self.scope_code = scope_code.into();
        self
    }

    #[must_use]
    pub fn with_operators(mut self, operators: impl IntoIterator<Item = Operator>) -> Self {
        self.applicable_operators = operators.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_aggregations(mut self, functions: impl IntoIterator<Item = FunctionType>) -> Self {
        self.aggregation_functions = functions.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_display_order(mut self, order: i32) -> Self {
        self.display_order = order;
        self
    }

    /// Build a definition from a stored record of string properties
    /// (`fieldId`, `fieldType`, `applicableOperators`, ...). Returns `None`
    /// when the record has no `fieldId`.
    ///
    /// List properties go through [`parse_list`]. Operator and function names
    /// that are not recognized are dropped.
    #[must_use]
    pub fn from_record(record: &BTreeMap<String, String>) -> Option<Self> {
        let get = |key: &str| record.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());
        let field_id = get("fieldId")?;
        let field_type = get("fieldType")
            .and_then(|t| t.parse().ok())
            .unwrap_or_default();

        let mut def = FieldDefinition::new(field_id, field_type);
        if let Some(label) = get("fieldLabel") {
            def.label = label.to_owned();
        }
        def.scope_code = get("scopeCode").unwrap_or_default().to_owned();
        def.category = get("category").unwrap_or_default().to_owned();
        def.applicable_operators = parse_list(get("applicableOperators"))
            .iter()
            .filter_map(|op| op.parse().ok())
            .collect();
        def.is_grid = get("isGrid").is_some_and(|v| v == "Y") || field_type == FieldType::Grid;
        def.grid_parent_field = get("gridParentField").map(str::to_owned);
        def.aggregation_functions = parse_list(get("aggregationFunctions"))
            .iter()
            .filter_map(|f| f.parse().ok())
            .collect();
        def.lookup_form_id = get("lookupFormId").map(str::to_owned);
        def.lookup_values = parse_list(get("lookupValues"));
        def.help_text = get("helpText").map(str::to_owned);
        def.display_order = get("displayOrder")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_DISPLAY_ORDER);
        Some(def)
    }

    #[must_use]
    pub fn is_grid_child_field(&self) -> bool {
        self.field_id.contains('.')
    }

    /// The owning grid of a grid-child field: everything before the first dot.
    #[must_use]
    pub fn parent_grid_field_id(&self) -> Option<&str> {
        self.field_id.split_once('.').map(|(grid, _)| grid)
    }

    /// Operators this field accepts, falling back to the type's defaults.
    #[must_use]
    pub fn operators(&self) -> &[Operator] {
        if self.applicable_operators.is_empty() {
            self.field_type.default_operators()
        } else {
            &self.applicable_operators
        }
    }

    #[must_use]
    pub fn allows_operator(&self, op: Operator) -> bool {
        self.operators().contains(&op)
    }

    #[must_use]
    pub fn allows_aggregation(&self, function: FunctionType) -> bool {
        self.aggregation_functions.is_empty() || self.aggregation_functions.contains(&function)
    }
}

/// Split a stored list property. Accepts `;`, `,` or newline separators and
/// an optional surrounding JSON-style `[...]`; double quotes are removed.
#[must_use]
pub fn parse_list(value: Option<&str>) -> Vec<String> {
    let Some(value) = value else {
        return Vec::new();
    };
    let value = value.strip_prefix('[').unwrap_or(value);
    let value = value.strip_suffix(']').unwrap_or(value);
    value
        .split([';', ',', '\n'])
        .map(|part| part.trim().replace('"', ""))
        .filter(|part| !part.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_type_parse_is_lenient() {
        assert_eq!("number".parse::<FieldType>(), Ok(FieldType::Number));
        assert_eq!("Grid".parse::<FieldType>(), Ok(FieldType::Grid));
        assert_eq!("whatever".parse::<FieldType>(), Ok(FieldType::Text));
    }

    #[test]
    fn grid_child_detection() {
        let def = FieldDefinition::new("householdMembers.age", FieldType::Number);
        assert!(def.is_grid_child_field());
        assert_eq!(def.parent_grid_field_id(), Some("householdMembers"));

        let def = FieldDefinition::new("age", FieldType::Number);
        assert!(!def.is_grid_child_field());
        assert_eq!(def.parent_grid_field_id(), None);
    }

    #[test]
    fn operators_fall_back_to_type_defaults() {
        let def = FieldDefinition::new("age", FieldType::Number);
        assert!(def.allows_operator(Operator::Between));
        assert!(!def.allows_operator(Operator::Contains));

        let def = def.with_operators([Operator::Eq]);
        assert!(!def.allows_operator(Operator::Between));
    }

    #[test]
    fn aggregations_default_to_all() {
        let def = FieldDefinition::new("crops", FieldType::Grid);
        assert!(def.allows_aggregation(FunctionType::Sum));
        let def = def.with_aggregations([FunctionType::Count]);
        assert!(!def.allows_aggregation(FunctionType::Sum));
    }

    #[test]
    fn parse_list_separators() {
        assert_eq!(parse_list(Some("a; b,c\nd")), vec!["a", "b", "c", "d"]);
        assert_eq!(parse_list(Some(r#"["=", ">="]"#)), vec!["=", ">="]);
        assert!(parse_list(Some("")).is_empty());
        assert!(parse_list(None).is_empty());
    }

    #[test]
    fn from_record() {
        let record: BTreeMap<String, String> = [
            ("fieldId", "monthlyIncome"),
            ("fieldLabel", "Monthly income"),
            ("fieldType", "NUMBER"),
            ("category", "economic"),
            ("applicableOperators", "=;>;>=;BETWEEN;bogus"),
            ("displayOrder", "abc"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();
        let def = FieldDefinition::from_record(&record).unwrap();
        assert_eq!(def.field_id, "monthlyIncome");
        assert_eq!(def.label, "Monthly income");
        assert_eq!(def.field_type, FieldType::Number);
        assert_eq!(
            def.applicable_operators,
            vec![Operator::Eq, Operator::Gt, Operator::Gte, Operator::Between]
        );
        assert_eq!(def.display_order, DEFAULT_DISPLAY_ORDER);
        assert!(!def.is_grid);
    }

    #[test]
    fn from_record_requires_field_id() {
        assert!(FieldDefinition::from_record(&BTreeMap::new()).is_none());
    }
}
