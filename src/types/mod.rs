mod compiled;
mod condition;
mod error;
mod field;
mod rule;
mod validation;
mod value;

pub use compiled::{CompiledRule, CompiledRuleset};
pub use condition::{
    field, function, Comparison, Condition, FieldCondition, FunctionCall, FunctionType, Operand,
    Operator, UnknownFunction, UnknownOperator,
};
pub use error::{CompilationWarning, CompileError};
pub use field::{parse_list, FieldDefinition, FieldType, DEFAULT_DISPLAY_ORDER};
pub use rule::{rule_code, Rule, RuleType, UnknownRuleType};
pub use validation::{
    RuleSummary, Severity, ValidationError, ValidationResult, ValidationWarning,
};
pub use value::Value;
