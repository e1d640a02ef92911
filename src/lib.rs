pub mod lex;
pub mod mapping;
pub mod parse;
pub mod registry;
#[cfg(feature = "binary-cache")]
pub mod serial;

mod compile;
mod error;
mod types;

pub use compile::{compile, compile_file, compile_script};
pub use error::RulescriptError;
pub use mapping::{FieldMapping, SchemaConfig};
pub use parse::{parse, ParseError};
pub use registry::{FieldRegistry, FieldSource, RegistryConfig, RegistryError};
pub use types::{
    field, function, parse_list, rule_code, CompilationWarning, CompileError, CompiledRule,
    CompiledRuleset, Comparison, Condition, FieldCondition, FieldDefinition, FieldType,
    FunctionCall, FunctionType, Operand, Operator, Rule, RuleSummary, RuleType, Severity,
    UnknownFunction, UnknownOperator, UnknownRuleType, ValidationError, ValidationResult,
    ValidationWarning, Value, DEFAULT_DISPLAY_ORDER,
};
