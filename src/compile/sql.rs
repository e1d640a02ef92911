use crate::lex::Position;
use crate::mapping::{FieldMapping, FieldRef};
use crate::types::{
    CompilationWarning, Comparison, Condition, FieldDefinition, FieldType, FunctionCall,
    FunctionType, Operand, Operator, Value,
};

pub(crate) const ALWAYS: &str = "1 = 1";
pub(crate) const NEVER: &str = "1 = 0";
const LIKE_ESCAPE: char = '!';

/// Single-quote a string literal, doubling embedded quotes.
pub(crate) fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// `LIKE` with the value's own `%` and `_` matched literally.
fn like(column: &str, prefix: &str, text: &str, suffix: &str) -> String {
    let escaped = text
        .replace(LIKE_ESCAPE, "!!")
        .replace('%', "!%")
        .replace('_', "!_");
    let pattern = quote(&format!("{prefix}{escaped}{suffix}"));
    if escaped.len() == text.len() {
        format!("{column} LIKE {pattern}")
    } else {
        format!("{column} LIKE {pattern} ESCAPE '{LIKE_ESCAPE}'")
    }
}

fn ungrouped(mut condition: &Condition) -> &Condition {
    while let Condition::Group(inner) = condition {
        condition = inner.as_ref();
    }
    condition
}

fn binary_sql(op: Operator) -> Option<&'static str> {
    let sql = match op {
        Operator::Eq => "=",
        Operator::Neq => "<>",
        Operator::Gt => ">",
        Operator::Gte => ">=",
        Operator::Lt => "<",
        Operator::Lte => "<=",
        _ => return None,
    };
    Some(sql)
}

/// Translates one rule's condition tree into a SQL predicate, collecting the
/// fields it touches and any warnings on the way.
pub(crate) struct PredicateCompiler<'a> {
    mapping: &'a FieldMapping,
    rule_code: &'a str,
    used_fields: Vec<String>,
    warnings: Vec<CompilationWarning>,
}

impl<'a> PredicateCompiler<'a> {
    pub(crate) fn new(mapping: &'a FieldMapping, rule_code: &'a str) -> Self {
        Self {
            mapping,
            rule_code,
            used_fields: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub(crate) fn finish(self) -> (Vec<String>, Vec<CompilationWarning>) {
        (self.used_fields, self.warnings)
    }

    pub(crate) fn warn(&mut self, position: Position, message: String) {
        self.warnings.push(CompilationWarning {
            rule: Some(self.rule_code.to_owned()),
            line: position.line,
            column: position.column,
            message,
        });
    }

    fn use_field(&mut self, field_id: &str) {
        if !self.used_fields.iter().any(|f| f == field_id) {
            self.used_fields.push(field_id.to_owned());
        }
    }

    // -- Composites ---------------------------------------------------------

    pub(crate) fn condition(&mut self, condition: &Condition) -> String {
        match condition {
            Condition::Comparison(cmp) => self.comparison(cmp, false),
            Condition::Function(call) => self.function(call),
            Condition::And(a, b) => {
                let left = self.and_operand(a);
                let right = self.and_operand(b);
                format!("{left} AND {right}")
            }
            Condition::Or(a, b) => {
                let left = self.condition(a);
                let right = self.condition(b);
                format!("{left} OR {right}")
            }
            Condition::Not(inner) => match (ungrouped(inner), inner.as_ref()) {
                (Condition::Comparison(cmp), _) if cmp.op == Operator::In => {
                    self.comparison(cmp, true)
                }
                (_, Condition::Group(_)) => format!("NOT {}", self.condition(inner)),
                _ => format!("NOT ({})", self.condition(inner)),
            },
            Condition::Group(inner) => format!("({})", self.condition(inner)),
        }
    }

    /// OR binds looser than AND in SQL too, so it needs parentheses here.
    fn and_operand(&mut self, condition: &Condition) -> String {
        let sql = self.condition(condition);
        if matches!(condition, Condition::Or(_, _)) {
            format!("({sql})")
        } else {
            sql
        }
    }

    // -- Leaf comparisons ---------------------------------------------------

    fn comparison(&mut self, cmp: &Comparison, negated: bool) -> String {
        self.use_field(&cmp.field);
        let mapping = self.mapping;
        let schema = mapping.schema();

        match mapping.resolve(&cmp.field) {
            Some(FieldRef::Base { column, field }) => {
                self.check_operator(field, cmp.op, cmp.position);
                let column = format!("{}.{column}", schema.base_alias);
                self.leaf(&column, cmp, Some(field.field_type), negated)
            }
            Some(FieldRef::GridChild {
                table,
                column,
                field,
            }) => {
                self.check_operator(field, cmp.op, cmp.position);
                let column = format!("{}.{column}", schema.grid_alias);
                let filter = self.leaf(&column, cmp, Some(field.field_type), false);
                self.row_exists(table, &filter, negated)
            }
            Some(FieldRef::Grid { .. }) => {
                self.warn(
                    cmp.position,
                    format!(
                        "Grid field '{}' can only be used inside a function such as COUNT or HAS_ANY",
                        cmp.field
                    ),
                );
                if negated {
                    format!("NOT ({NEVER})")
                } else {
                    NEVER.to_owned()
                }
            }
            None => {
                self.warn(cmp.position, format!("Unknown field '{}'", cmp.field));
                let grid_child = cmp
                    .field
                    .split_once('.')
                    .and_then(|(grid, _)| mapping.grid_table(grid))
                    .zip(mapping.conventional_child_column(&cmp.field));
                match grid_child {
                    Some((table, column)) => {
                        let column = format!("{}.{column}", schema.grid_alias);
                        let filter = self.leaf(&column, cmp, None, false);
                        self.row_exists(table, &filter, negated)
                    }
                    None => self.leaf(&cmp.field, cmp, None, negated),
                }
            }
        }
    }

    fn check_operator(&mut self, field: &FieldDefinition, op: Operator, position: Position) {
        if !field.allows_operator(op) {
            self.warn(
                position,
                format!(
                    "Operator '{op}' is not applicable to field '{}' ({})",
                    field.field_id, field.field_type
                ),
            );
        }
    }

    fn leaf(
        &mut self,
        column: &str,
        cmp: &Comparison,
        field_type: Option<FieldType>,
        negated: bool,
    ) -> String {
        let null_only = field_type.is_some_and(FieldType::null_means_empty);
        match (cmp.op, &cmp.operand) {
            (Operator::IsEmpty, _) if null_only => format!("{column} IS NULL"),
            (Operator::IsEmpty, _) => format!("({column} IS NULL OR {column} = '')"),
            (Operator::IsNotEmpty, _) if null_only => format!("{column} IS NOT NULL"),
            (Operator::IsNotEmpty, _) => format!("({column} IS NOT NULL AND {column} <> '')"),
            (Operator::Between, Operand::Range(low, high)) => {
                let low = self.literal(low);
                let high = self.literal(high);
                format!("{column} BETWEEN {low} AND {high}")
            }
            (Operator::In, Operand::List(values)) => {
                let list = self.literal_list(values);
                let keyword = if negated { "NOT IN" } else { "IN" };
                format!("{column} {keyword} ({list})")
            }
            (Operator::Contains, Operand::Single(v)) => like(column, "%", &v.as_text(), "%"),
            (Operator::StartsWith, Operand::Single(v)) => like(column, "", &v.as_text(), "%"),
            (Operator::EndsWith, Operand::Single(v)) => like(column, "%", &v.as_text(), ""),
            (op, Operand::Single(v)) => match binary_sql(op) {
                Some(sql) => {
                    let literal = self.literal(v);
                    format!("{column} {sql} {literal}")
                }
                None => self.malformed(cmp),
            },
            _ => self.malformed(cmp),
        }
    }

    fn malformed(&mut self, cmp: &Comparison) -> String {
        self.warn(
            cmp.position,
            format!(
                "Operator '{}' has a malformed operand on field '{}'",
                cmp.op, cmp.field
            ),
        );
        NEVER.to_owned()
    }

    // -- Literals -----------------------------------------------------------

    fn literal(&mut self, value: &Value) -> String {
        let mapping = self.mapping;
        let schema = mapping.schema();
        match value {
            Value::Int(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Bool(true) => schema.true_literal.clone(),
            Value::Bool(false) => schema.false_literal.clone(),
            Value::String(s) => quote(s),
            Value::Identifier(id) => match mapping.resolve(id) {
                Some(FieldRef::Base { column, .. }) => {
                    self.use_field(id);
                    format!("{}.{column}", schema.base_alias)
                }
                _ => quote(id),
            },
        }
    }

    fn literal_list(&mut self, values: &[Value]) -> String {
        values
            .iter()
            .map(|v| self.literal(v))
            .collect::<Vec<_>>()
            .join(", ")
    }

    // -- Grid subqueries ----------------------------------------------------

    /// `FROM <table> g WHERE g.<fk> = b.<key>`
    fn correlation(&self, table: &str) -> String {
        let schema = self.mapping.schema();
        format!(
            "FROM {table} {g} WHERE {g}.{fk} = {key}",
            g = schema.grid_alias,
            fk = schema.grid_foreign_key,
            key = schema.key_expression(),
        )
    }

    /// A negated grid-child comparison means no row matches, never that
    /// some row fails to match.
    fn row_exists(&self, table: &str, filter: &str, negated: bool) -> String {
        let exists = self.exists(table, Some(filter));
        if negated {
            format!("NOT {exists}")
        } else {
            exists
        }
    }

    fn exists(&self, table: &str, filter: Option<&str>) -> String {
        let correlation = self.correlation(table);
        match filter {
            Some(filter) => format!("EXISTS (SELECT 1 {correlation} AND {filter})"),
            None => format!("EXISTS (SELECT 1 {correlation})"),
        }
    }

    // -- Functions ----------------------------------------------------------

    fn function(&mut self, call: &FunctionCall) -> String {
        self.use_field(&call.target);
        let mapping = self.mapping;
        let schema = mapping.schema();

        let target = match mapping.resolve(&call.target) {
            Some(FieldRef::Grid { table, field }) => {
                self.check_function(field, call.function, call.position);
                Some((table.to_owned(), None))
            }
            Some(FieldRef::GridChild {
                table,
                column,
                field,
            }) => {
                self.check_function(field, call.function, call.position);
                Some((table.to_owned(), Some(format!("{}.{column}", schema.grid_alias))))
            }
            Some(FieldRef::Base { .. }) => {
                self.warn(
                    call.position,
                    format!(
                        "Function {} needs a grid field, '{}' is not a grid",
                        call.function, call.target
                    ),
                );
                None
            }
            None => {
                self.warn(call.position, format!("Unknown field '{}'", call.target));
                Some(match call.target.split_once('.') {
                    Some((grid, child)) => {
                        let table = mapping
                            .grid_table(grid)
                            .map_or_else(|| format!("{}{grid}", schema.table_prefix), str::to_owned);
                        let column =
                            format!("{}.{}{child}", schema.grid_alias, schema.column_prefix);
                        (table, Some(column))
                    }
                    None => (format!("{}{}", schema.table_prefix, call.target), None),
                })
            }
        };

        let Some((table, column)) = target else {
            return NEVER.to_owned();
        };
        if call.function.is_aggregation() {
            self.aggregation(call, &table, column.as_deref())
        } else {
            self.grid_check(call, &table, column.as_deref())
        }
    }

    fn check_function(&mut self, field: &FieldDefinition, function: FunctionType, position: Position) {
        if !field.allows_aggregation(function) {
            self.warn(
                position,
                format!(
                    "Function {function} is not permitted for field '{}'",
                    field.field_id
                ),
            );
        }
    }

    fn aggregation(&mut self, call: &FunctionCall, table: &str, column: Option<&str>) -> String {
        let aggregate = match (call.function, column) {
            (FunctionType::Count, None) => "COUNT(*)".to_owned(),
            (FunctionType::Count, Some(c)) => format!("COUNT({c})"),
            (FunctionType::Sum, Some(c)) => format!("COALESCE(SUM({c}), 0)"),
            (function, Some(c)) => format!("{function}({c})"),
            (function, None) => {
                self.warn(
                    call.position,
                    format!(
                        "Function {function} needs a grid child field such as '{}.<column>'",
                        call.target
                    ),
                );
                return NEVER.to_owned();
            }
        };
        let subquery = format!("(SELECT {aggregate} {})", self.correlation(table));

        match &call.comparison {
            Some((op, value)) => match binary_sql(*op) {
                Some(sql) => {
                    let literal = self.literal(value);
                    format!("{subquery} {sql} {literal}")
                }
                None => {
                    self.warn(
                        call.position,
                        format!("Operator '{op}' cannot compare the result of {}", call.function),
                    );
                    NEVER.to_owned()
                }
            },
            None if matches!(call.function, FunctionType::Count | FunctionType::Sum) => {
                format!("{subquery} > 0")
            }
            None => format!("{subquery} IS NOT NULL"),
        }
    }

    fn grid_check(&mut self, call: &FunctionCall, table: &str, column: Option<&str>) -> String {
        if call.values.is_empty() && call.function == FunctionType::HasAll {
            self.warn(
                call.position,
                format!("HAS_ALL({}) without values always matches", call.target),
            );
            return ALWAYS.to_owned();
        }

        let negate = call.function == FunctionType::HasNone;
        let exists = match column {
            None if call.values.is_empty() => self.exists(table, None),
            None => {
                self.warn(
                    call.position,
                    format!(
                        "Function {} with values needs a grid child field such as '{}.<column>'",
                        call.function, call.target
                    ),
                );
                return NEVER.to_owned();
            }
            Some(column) if call.values.is_empty() => {
                self.exists(table, Some(&format!("{column} IS NOT NULL")))
            }
            Some(column) if call.function == FunctionType::HasAll => {
                let checks: Vec<String> = call
                    .values
                    .iter()
                    .map(|v| {
                        let literal = self.literal(v);
                        self.exists(table, Some(&format!("{column} = {literal}")))
                    })
                    .collect();
                return if checks.len() == 1 {
                    checks.concat()
                } else {
                    format!("({})", checks.join(" AND "))
                };
            }
            Some(column) => {
                let list = self.literal_list(&call.values);
                self.exists(table, Some(&format!("{column} IN ({list})")))
            }
        };

        if negate {
            format!("NOT {exists}")
        } else {
            exists
        }
    }
}
