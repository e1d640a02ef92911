//! How script field ids map onto the relational schema.
//!
//! Base fields are columns of one base table. Grid fields are child tables
//! joined to the base table through a foreign key, and `grid.child` ids are
//! columns of those child tables.

use std::collections::BTreeMap;

use crate::types::{CompileError, FieldDefinition, FieldType, FunctionType, Operator};

/// Table, alias and literal conventions of the target schema.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct SchemaConfig {
    pub base_table: String,
    pub base_alias: String,
    pub key_column: String,
    /// Prepended to a field id to form its column name.
    pub column_prefix: String,
    /// Prepended to a grid id to form its table name.
    pub table_prefix: String,
    pub grid_alias: String,
    /// Column of a grid table holding the base row's key.
    pub grid_foreign_key: String,
    pub true_literal: String,
    pub false_literal: String,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            base_table: "app_fd_farmer_registry".to_owned(),
            base_alias: "b".to_owned(),
            key_column: "id".to_owned(),
            column_prefix: "c_".to_owned(),
            table_prefix: "app_fd_".to_owned(),
            grid_alias: "g".to_owned(),
            grid_foreign_key: "c_parentId".to_owned(),
            true_literal: "'Y'".to_owned(),
            false_literal: "'N'".to_owned(),
        }
    }
}

impl SchemaConfig {
    #[must_use]
    pub fn with_base_table(mut self, table: impl Into<String>) -> Self {
        self.base_table = table.into();
        self
    }

    #[must_use]
    pub fn with_boolean_literals(
        mut self,
        true_literal: impl Into<String>,
        false_literal: impl Into<String>,
    ) -> Self {
        self.true_literal = true_literal.into();
        self.false_literal = false_literal.into();
        self
    }

    /// `b.id` with the default settings.
    #[must_use]
    pub fn key_expression(&self) -> String {
        format!("{}.{}", self.base_alias, self.key_column)
    }
}

#[derive(Debug, Clone)]
struct MappedField {
    definition: FieldDefinition,
    /// Column name, or table name for grids.
    target: String,
}

/// A field id resolved against the mapping.
#[derive(Debug, Clone, Copy)]
pub(crate) enum FieldRef<'a> {
    Base {
        column: &'a str,
        field: &'a FieldDefinition,
    },
    Grid {
        table: &'a str,
        field: &'a FieldDefinition,
    },
    GridChild {
        table: &'a str,
        column: &'a str,
        field: &'a FieldDefinition,
    },
}

impl<'a> FieldRef<'a> {
    pub(crate) fn definition(&self) -> &'a FieldDefinition {
        match self {
            FieldRef::Base { field, .. }
            | FieldRef::Grid { field, .. }
            | FieldRef::GridChild { field, .. } => field,
        }
    }
}

/// Resolves script field ids to SQL for one scope.
#[derive(Debug, Clone)]
pub struct FieldMapping {
    scope_code: String,
    schema: SchemaConfig,
    fields: BTreeMap<String, MappedField>,
}

impl FieldMapping {
    #[must_use]
    pub fn new(scope_code: impl Into<String>, schema: SchemaConfig) -> Self {
        Self {
            scope_code: scope_code.into(),
            schema,
            fields: BTreeMap::new(),
        }
    }

    /// Build a mapping from registry definitions, using the schema's naming
    /// conventions for every column and grid table.
    #[must_use]
    pub fn from_definitions(
        scope_code: impl Into<String>,
        schema: SchemaConfig,
        definitions: impl IntoIterator<Item = FieldDefinition>,
    ) -> Self {
        definitions
            .into_iter()
            .fold(Self::new(scope_code, schema), Self::with_definition)
    }

    #[must_use]
    pub fn with_field(self, field_id: &str, field_type: FieldType) -> Self {
        self.with_definition(FieldDefinition::new(field_id, field_type))
    }

    #[must_use]
    pub fn with_definition(mut self, definition: FieldDefinition) -> Self {
        let target = self.conventional_target(&definition);
        self.fields.insert(
            definition.field_id.clone(),
            MappedField { definition, target },
        );
        self
    }

    /// Override the column name of a base or grid-child field. Unknown ids
    /// are added as text fields.
    #[must_use]
    pub fn with_column(mut self, field_id: &str, column: impl Into<String>) -> Self {
        let column = column.into();
        match self.fields.get_mut(field_id) {
            Some(mapped) => mapped.target = column,
            None => {
                self.fields.insert(
                    field_id.to_owned(),
                    MappedField {
                        definition: FieldDefinition::new(field_id, FieldType::Text),
                        target: column,
                    },
                );
            }
        }
        self
    }

    /// Declare a grid stored in `table`, or move an existing one.
    #[must_use]
    pub fn with_grid(mut self, grid_id: &str, table: impl Into<String>) -> Self {
        let table = table.into();
        match self.fields.get_mut(grid_id) {
            Some(mapped) => {
                mapped.definition.field_type = FieldType::Grid;
                mapped.definition.is_grid = true;
                mapped.target = table;
            }
            None => {
                self.fields.insert(
                    grid_id.to_owned(),
                    MappedField {
                        definition: FieldDefinition::new(grid_id, FieldType::Grid),
                        target: table,
                    },
                );
            }
        }
        self
    }

    fn conventional_target(&self, definition: &FieldDefinition) -> String {
        if definition.is_grid || definition.field_type == FieldType::Grid {
            format!("{}{}", self.schema.table_prefix, definition.field_id)
        } else {
            let name = definition
                .field_id
                .split_once('.')
                .map_or(definition.field_id.as_str(), |(_, child)| child);
            format!("{}{}", self.schema.column_prefix, name)
        }
    }

    #[must_use]
    pub fn scope_code(&self) -> &str {
        &self.scope_code
    }

    #[must_use]
    pub fn schema(&self) -> &SchemaConfig {
        &self.schema
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn contains(&self, field_id: &str) -> bool {
        self.fields.contains_key(field_id)
    }

    #[must_use]
    pub fn field(&self, field_id: &str) -> Option<&FieldDefinition> {
        self.fields.get(field_id).map(|m| &m.definition)
    }

    /// All mapped field definitions, ordered by field id.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.values().map(|m| &m.definition)
    }

    /// The SQL column expression for a base field (`b.c_age`), or the child
    /// column qualified by the grid alias for a grid-child field
    /// (`g.c_age`). `None` for grids and unmapped ids.
    #[must_use]
    pub fn column_expression(&self, field_id: &str) -> Option<String> {
        match self.resolve(field_id)? {
            FieldRef::Base { column, .. } => Some(format!("{}.{column}", self.schema.base_alias)),
            FieldRef::GridChild { column, .. } => {
                Some(format!("{}.{column}", self.schema.grid_alias))
            }
            FieldRef::Grid { .. } => None,
        }
    }

    /// The child table of a grid field. `None` for other fields.
    #[must_use]
    pub fn grid_table(&self, grid_id: &str) -> Option<&str> {
        let mapped = self.fields.get(grid_id)?;
        mapped.definition.is_grid.then_some(mapped.target.as_str())
    }

    pub(crate) fn resolve(&self, field_id: &str) -> Option<FieldRef<'_>> {
        let mapped = self.fields.get(field_id)?;
        let field = &mapped.definition;
        if field.is_grid {
            return Some(FieldRef::Grid {
                table: &mapped.target,
                field,
            });
        }
        if let Some(grid_id) = field.parent_grid_field_id() {
            let table = self.grid_table(grid_id)?;
            return Some(FieldRef::GridChild {
                table,
                column: &mapped.target,
                field,
            });
        }
        Some(FieldRef::Base {
            column: &mapped.target,
            field,
        })
    }

    /// Column name a grid-child id would get by convention, used for
    /// children that are not mapped themselves.
    pub(crate) fn conventional_child_column(&self, field_id: &str) -> Option<String> {
        let (_, child) = field_id.split_once('.')?;
        Some(format!("{}{}", self.schema.column_prefix, child))
    }

    /// Check that every table, alias and column is usable in generated SQL.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError`] for an empty schema setting, a name that is
    /// not a plain SQL identifier, or a grid-child field whose grid is not
    /// mapped to a table.
    pub fn validate(&self) -> Result<(), CompileError> {
        let s = &self.schema;
        for (setting, value) in [
            ("base_table", &s.base_table),
            ("base_alias", &s.base_alias),
            ("key_column", &s.key_column),
            ("grid_alias", &s.grid_alias),
            ("grid_foreign_key", &s.grid_foreign_key),
            ("true_literal", &s.true_literal),
            ("false_literal", &s.false_literal),
        ] {
            if value.trim().is_empty() {
                return Err(CompileError::EmptySchemaSetting { setting });
            }
        }
        for name in [&s.base_alias, &s.key_column, &s.grid_alias, &s.grid_foreign_key] {
            check_identifier(name, false)?;
        }
        check_identifier(&s.base_table, true)?;

        for mapped in self.fields.values() {
            let field = &mapped.definition;
            check_identifier(&mapped.target, field.is_grid)?;
            if field.is_grid {
                continue;
            }
            if let Some(grid) = field.parent_grid_field_id() {
                if self.grid_table(grid).is_none() {
                    return Err(CompileError::GridWithoutTable {
                        field: field.field_id.clone(),
                        grid: grid.to_owned(),
                    });
                }
            }
        }
        Ok(())
    }

    /// The farmer registry scope: household, land, income and grid fields of
    /// a farmer eligibility program, in the default schema.
    #[must_use]
    pub fn farmer_eligibility() -> Self {
        use FieldType::{Boolean, Date, Grid, Lookup, Number, Text};

        let fields: [(&str, FieldType, &str); 24] = [
            ("fullName", Text, "demographic"),
            ("age", Number, "demographic"),
            ("gender", Lookup, "demographic"),
            ("maritalStatus", Lookup, "demographic"),
            ("isDisabled", Boolean, "demographic"),
            ("district", Lookup, "location"),
            ("village", Text, "location"),
            ("registrationDate", Date, "registration"),
            ("farmSize", Number, "agricultural"),
            ("hasIrrigation", Boolean, "agricultural"),
            ("monthlyIncome", Number, "economic"),
            ("receivesOtherSupport", Boolean, "economic"),
            ("householdSize", Number, "household"),
            ("householdMembers", Grid, "household"),
            ("householdMembers.age", Number, "household"),
            ("householdMembers.sex", Lookup, "household"),
            ("householdMembers.relationship", Lookup, "household"),
            ("householdMembers.isDisabled", Boolean, "household"),
            ("livestock", Grid, "agricultural"),
            ("livestock.type", Lookup, "agricultural"),
            ("livestock.count", Number, "agricultural"),
            ("crops", Grid, "agricultural"),
            ("crops.type", Lookup, "agricultural"),
            ("crops.area", Number, "agricultural"),
        ];

        let scope = "FARMER_ELIGIBILITY";
        let definitions = fields.into_iter().enumerate().map(|(i, (id, ty, category))| {
            let mut def = FieldDefinition::new(id, ty)
                .with_scope(scope)
                .with_category(category)
                .with_display_order(i32::try_from(i).unwrap_or(i32::MAX));
            if ty == Grid {
                def = def.with_aggregations([
                    FunctionType::Count,
                    FunctionType::HasAny,
                    FunctionType::HasAll,
                    FunctionType::HasNone,
                ]);
            }
            if id == "gender" || id == "householdMembers.sex" {
                def.lookup_values = vec!["MALE".to_owned(), "FEMALE".to_owned()];
            }
            if id == "gender" {
                def = def.with_operators([Operator::Eq, Operator::Neq, Operator::In]);
            }
            def
        });
        Self::from_definitions(scope, SchemaConfig::default(), definitions)
    }
}

/// Plain identifiers only: letters, digits and `_`, not starting with a
/// digit. Table names may be schema-qualified with dots.
fn check_identifier(name: &str, allow_dots: bool) -> Result<(), CompileError> {
    let valid_part = |part: &str| {
        let mut chars = part.chars();
        chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    let valid = if allow_dots {
        name.split('.').all(valid_part)
    } else {
        valid_part(name)
    };
    if valid {
        Ok(())
    } else {
        Err(CompileError::InvalidIdentifier {
            identifier: name.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> FieldMapping {
        FieldMapping::new("TEST", SchemaConfig::default())
            .with_field("age", FieldType::Number)
            .with_grid("members", "app_fd_members")
            .with_field("members.age", FieldType::Number)
    }

    #[test]
    fn conventional_columns() {
        let m = mapping();
        assert_eq!(m.column_expression("age").as_deref(), Some("b.c_age"));
        assert_eq!(m.column_expression("members.age").as_deref(), Some("g.c_age"));
        assert_eq!(m.column_expression("members"), None);
        assert_eq!(m.grid_table("members"), Some("app_fd_members"));
        assert_eq!(m.grid_table("age"), None);
    }

    #[test]
    fn with_column_overrides() {
        let m = mapping().with_column("age", "c_age_years");
        assert_eq!(m.column_expression("age").as_deref(), Some("b.c_age_years"));
    }

    #[test]
    fn resolve_variants() {
        let m = mapping();
        assert!(matches!(m.resolve("age"), Some(FieldRef::Base { column: "c_age", .. })));
        assert!(matches!(
            m.resolve("members"),
            Some(FieldRef::Grid { table: "app_fd_members", .. })
        ));
        assert!(matches!(
            m.resolve("members.age"),
            Some(FieldRef::GridChild { table: "app_fd_members", column: "c_age", .. })
        ));
        assert!(m.resolve("missing").is_none());
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(mapping().validate().is_ok());
        assert!(FieldMapping::farmer_eligibility().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_setting() {
        let schema = SchemaConfig::default().with_base_table("");
        let m = FieldMapping::new("S", schema);
        assert_eq!(
            m.validate(),
            Err(CompileError::EmptySchemaSetting {
                setting: "base_table"
            })
        );
    }

    #[test]
    fn validate_rejects_bad_identifier() {
        let m = mapping().with_column("age", "c_age; DROP TABLE x");
        assert!(matches!(
            m.validate(),
            Err(CompileError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn validate_rejects_orphan_grid_child() {
        let m = FieldMapping::new("S", SchemaConfig::default())
            .with_field("plots.area", FieldType::Number);
        assert_eq!(
            m.validate(),
            Err(CompileError::GridWithoutTable {
                field: "plots.area".into(),
                grid: "plots".into()
            })
        );
    }

    #[test]
    fn schema_qualified_table_is_allowed() {
        let schema = SchemaConfig::default().with_base_table("registry.farmers");
        assert!(FieldMapping::new("S", schema).validate().is_ok());
    }

    #[test]
    fn farmer_preset_contents() {
        let m = FieldMapping::farmer_eligibility();
        assert_eq!(m.scope_code(), "FARMER_ELIGIBILITY");
        assert_eq!(m.field("age").map(|f| f.field_type), Some(FieldType::Number));
        assert_eq!(
            m.grid_table("householdMembers"),
            Some("app_fd_householdMembers")
        );
        assert_eq!(
            m.column_expression("householdMembers.sex").as_deref(),
            Some("g.c_sex")
        );
        assert!(!m.field("gender").unwrap().allows_operator(Operator::Contains));
    }
}
