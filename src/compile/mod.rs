mod sql;

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::lex::Position;
use crate::mapping::FieldMapping;
use crate::types::{
    CompilationWarning, CompileError, CompiledRule, CompiledRuleset, Rule, RuleType,
};
use crate::RulescriptError;

use sql::{PredicateCompiler, ALWAYS, NEVER};

/// Compile parsed rules into SQL against `mapping`.
///
/// Unknown fields, inapplicable operators and similar problems do not stop
/// compilation; they are reported through
/// [`CompiledRuleset::compilation_warnings`] and the affected rule gets
/// best-effort SQL.
///
/// # Errors
///
/// Returns [`CompileError`] when the mapping itself cannot produce valid SQL
/// (see [`FieldMapping::validate`]).
pub fn compile(
    rules: &[Rule],
    ruleset_code: &str,
    scope_code: &str,
    mapping: &FieldMapping,
) -> Result<CompiledRuleset, CompileError> {
    mapping.validate()?;
    debug!(
        ruleset = ruleset_code,
        scope = scope_code,
        rules = rules.len(),
        "compiling ruleset"
    );

    let mut warnings = Vec::new();
    if !scope_code.is_empty() && mapping.scope_code() != scope_code {
        warnings.push(ruleset_warning(format!(
            "Field mapping is for scope '{}' but the ruleset targets scope '{scope_code}'",
            mapping.scope_code()
        )));
    }

    let mut seen_codes = HashSet::new();
    let mut compiled_rules = Vec::with_capacity(rules.len());
    for rule in rules {
        if !seen_codes.insert(rule.code.as_str()) {
            warnings.push(ruleset_warning(format!(
                "Duplicate rule code '{}' (rule '{}')",
                rule.code, rule.name
            )));
        }
        let (compiled, rule_warnings) = compile_rule(rule, mapping);
        trace!(
            rule = %compiled.rule_code,
            rule_type = %compiled.rule_type,
            predicate = %compiled.where_clause,
            "compiled rule"
        );
        warnings.extend(rule_warnings);
        compiled_rules.push(compiled);
    }

    let ruleset = assemble(
        ruleset_code,
        scope_code,
        mapping,
        compiled_rules,
        warnings,
    );
    debug!(
        ruleset = ruleset_code,
        rules = ruleset.total_rules,
        warnings = ruleset.compilation_warnings.len(),
        "compiled ruleset"
    );
    Ok(ruleset)
}

/// Parse and compile script text in one step.
///
/// # Errors
///
/// Returns [`RulescriptError::Parse`] with the first grammar violation when
/// the script is invalid, or [`RulescriptError::Compile`] for a bad mapping.
pub fn compile_script(
    text: &str,
    ruleset_code: &str,
    scope_code: &str,
    mapping: &FieldMapping,
) -> Result<CompiledRuleset, RulescriptError> {
    let parsed = crate::parse::parse(text);
    if let Some(err) = parsed.first_error() {
        return Err(err.into());
    }
    Ok(compile(parsed.rules(), ruleset_code, scope_code, mapping)?)
}

/// Read a script file, then parse and compile it.
///
/// # Errors
///
/// Returns [`RulescriptError`] on I/O, parse, or compile failure.
pub fn compile_file(
    path: impl AsRef<std::path::Path>,
    ruleset_code: &str,
    scope_code: &str,
    mapping: &FieldMapping,
) -> Result<CompiledRuleset, RulescriptError> {
    let text = std::fs::read_to_string(path)?;
    compile_script(&text, ruleset_code, scope_code, mapping)
}

fn ruleset_warning(message: String) -> CompilationWarning {
    CompilationWarning {
        rule: None,
        line: 0,
        column: 0,
        message,
    }
}

fn compile_rule(rule: &Rule, mapping: &FieldMapping) -> (CompiledRule, Vec<CompilationWarning>) {
    let mut compiler = PredicateCompiler::new(mapping, &rule.code);
    let rule_start = Position::new(rule.start_line, 1);

    let where_clause = match &rule.condition {
        Some(condition) => compiler.condition(condition),
        None => {
            compiler.warn(
                rule_start,
                format!("Rule '{}' has no WHEN condition and always matches", rule.name),
            );
            ALWAYS.to_owned()
        }
    };

    let select_expression = if rule.rule_type == RuleType::Bonus {
        let score = rule.score.unwrap_or_else(|| {
            compiler.warn(
                rule_start,
                format!("BONUS rule '{}' has no SCORE and contributes 0", rule.name),
            );
            0
        });
        format!("CASE WHEN {where_clause} THEN {score} ELSE 0 END")
    } else {
        format!("CASE WHEN {where_clause} THEN 1 ELSE 0 END")
    };

    let (used_fields, warnings) = compiler.finish();
    let compiled = CompiledRule {
        rule_name: rule.name.clone(),
        rule_code: rule.code.clone(),
        rule_type: rule.rule_type,
        mandatory: rule.mandatory,
        score: rule.score,
        where_clause,
        select_expression,
        used_fields,
    };
    (compiled, warnings)
}

fn join_or(parts: &[String], separator: &str, empty: &str) -> String {
    if parts.is_empty() {
        empty.to_owned()
    } else {
        parts.join(separator)
    }
}

fn assemble(
    ruleset_code: &str,
    scope_code: &str,
    mapping: &FieldMapping,
    compiled_rules: Vec<CompiledRule>,
    compilation_warnings: Vec<CompilationWarning>,
) -> CompiledRuleset {
    let count = |t: RuleType| compiled_rules.iter().filter(|r| r.rule_type == t).count();
    let inclusion_rules = count(RuleType::Inclusion);
    let exclusion_rules = count(RuleType::Exclusion);
    let priority_rules = count(RuleType::Priority);
    let bonus_rules = count(RuleType::Bonus);

    let gate: Vec<String> = compiled_rules
        .iter()
        .filter(|r| r.mandatory && matches!(r.rule_type, RuleType::Inclusion | RuleType::Priority))
        .map(|r| format!("({})", r.where_clause))
        .collect();
    let exclusions: Vec<String> = compiled_rules
        .iter()
        .filter(|r| r.rule_type == RuleType::Exclusion)
        .map(|r| format!("({})", r.where_clause))
        .collect();
    let scores: Vec<String> = compiled_rules
        .iter()
        .filter(|r| r.rule_type == RuleType::Bonus)
        .map(|r| r.select_expression.clone())
        .collect();

    let eligibility_where_clause = join_or(&gate, " AND ", ALWAYS);
    let exclusion_where_clause = join_or(&exclusions, " OR ", NEVER);
    let score_expression = join_or(&scores, " + ", "0");

    let schema = mapping.schema();
    let key = schema.key_expression();
    let from = format!("FROM {} {}", schema.base_table, schema.base_alias);
    let eligibility_check_query =
        format!("SELECT {key} {from} WHERE {eligibility_where_clause}");
    let scoring_query = format!("SELECT {key}, {score_expression} AS total_score {from}");
    let full_eligibility_query = format!(
        "{scoring_query} WHERE ({eligibility_where_clause}) AND NOT ({exclusion_where_clause}) \
         ORDER BY total_score DESC"
    );

    CompiledRuleset {
        ruleset_code: ruleset_code.to_owned(),
        scope_code: scope_code.to_owned(),
        total_rules: compiled_rules.len(),
        inclusion_rules,
        exclusion_rules,
        priority_rules,
        bonus_rules,
        eligibility_where_clause,
        exclusion_where_clause,
        score_expression,
        eligibility_check_query,
        scoring_query,
        full_eligibility_query,
        compiled_rules,
        compilation_warnings,
    }
}
