use crate::lex::{TokenInstance, TokenKind};
use crate::types::{
    Comparison, Condition, FunctionCall, FunctionType, Operand, Operator, Rule, RuleType,
    ValidationResult, Value,
};

use super::cursor::TokenCursor;
use super::ParseError;

type PResult<T> = Result<T, ParseError>;

// -- Script -----------------------------------------------------------------

/// Parse every rule block in the stream into `result`. Stray tokens between
/// rules are reported as warnings and skipped.
pub(crate) fn script(cursor: &mut TokenCursor, result: &mut ValidationResult) -> PResult<()> {
    loop {
        cursor.skip_newlines();
        if cursor.is_at_end() {
            return Ok(());
        }
        if cursor.check(TokenKind::Rule) {
            let rule = rule(cursor, result)?;
            result.push_rule(rule);
        } else {
            let token = cursor.advance();
            let message = format!("Unexpected token outside rule: {}", token.text);
            let (line, column) = (token.line(), token.column());
            result.push_warning(line, column, message);
        }
    }
}

// -- Rule blocks ------------------------------------------------------------

fn rule(cursor: &mut TokenCursor, result: &mut ValidationResult) -> PResult<Rule> {
    let start_line = cursor.consume(TokenKind::Rule, "Expected RULE keyword")?.line();
    let name = cursor
        .consume(TokenKind::String, "Expected rule name after RULE")?
        .string_value();

    let mut rule = Rule::new(name);
    rule.start_line = start_line;

    loop {
        cursor.skip_newlines();
        let kind = cursor.peek().kind;
        match kind {
            TokenKind::Type => {
                clause_header(cursor, "Expected ':' after TYPE")?;
                rule.rule_type = rule_type(cursor)?;
            }
            TokenKind::Category => {
                clause_header(cursor, "Expected ':' after CATEGORY")?;
                rule.category = Some(category(cursor)?);
            }
            TokenKind::Mandatory => {
                clause_header(cursor, "Expected ':' after MANDATORY")?;
                rule.mandatory = bool_value(cursor)?;
            }
            TokenKind::Order => {
                clause_header(cursor, "Expected ':' after ORDER")?;
                rule.order = Some(integer(cursor, "Expected number after ORDER:")?);
            }
            TokenKind::When => {
                cursor.advance();
                cursor.skip_newlines();
                rule.condition = Some(condition(cursor)?);
            }
            TokenKind::Score => {
                clause_header(cursor, "Expected ':' after SCORE")?;
                let negative = cursor.eat(TokenKind::Minus);
                if !negative {
                    cursor.eat(TokenKind::Plus);
                }
                let score = integer(cursor, "Expected number after SCORE:")?;
                // Out-of-range numbers already saturate, so negation does too.
                rule.score = Some(if negative { score.saturating_neg() } else { score });
            }
            TokenKind::Weight => {
                clause_header(cursor, "Expected ':' after WEIGHT")?;
                rule.weight = Some(integer(cursor, "Expected number after WEIGHT:")?);
            }
            TokenKind::PassMessage => {
                clause_header(cursor, "Expected ':' after PASS MESSAGE")?;
                let message = cursor
                    .consume(TokenKind::String, "Expected string after PASS MESSAGE:")?
                    .string_value();
                rule.pass_message = Some(message);
            }
            TokenKind::FailMessage => {
                clause_header(cursor, "Expected ':' after FAIL MESSAGE")?;
                let message = cursor
                    .consume(TokenKind::String, "Expected string after FAIL MESSAGE:")?
                    .string_value();
                rule.fail_message = Some(message);
            }
            // RULE, EOF, or anything unrecognized ends the block.
            _ => break,
        }
    }

    rule.end_line = cursor.previous_line();
    if rule.condition.is_none() {
        result.push_warning(
            rule.start_line,
            1,
            format!("Rule '{}' has no WHEN condition", rule.name),
        );
    }
    Ok(rule)
}

/// Consume a clause keyword and its `:`.
fn clause_header(cursor: &mut TokenCursor, message: &str) -> PResult<()> {
    cursor.advance();
    cursor.consume(TokenKind::Colon, message)?;
    Ok(())
}

fn rule_type(cursor: &mut TokenCursor) -> PResult<RuleType> {
    let rule_type = match cursor.peek().kind {
        TokenKind::Inclusion => RuleType::Inclusion,
        TokenKind::Exclusion => RuleType::Exclusion,
        TokenKind::Priority => RuleType::Priority,
        TokenKind::Bonus => RuleType::Bonus,
        _ => {
            return Err(cursor
                .error("Expected rule type (INCLUSION, EXCLUSION, PRIORITY, or BONUS)"))
        }
    };
    cursor.advance();
    Ok(rule_type)
}

fn category(cursor: &mut TokenCursor) -> PResult<String> {
    match cursor.peek().kind {
        TokenKind::Identifier => Ok(cursor.advance().text.clone()),
        TokenKind::String => Ok(cursor.advance().string_value()),
        _ => Err(cursor.error("Expected category identifier")),
    }
}

fn bool_value(cursor: &mut TokenCursor) -> PResult<bool> {
    let token = cursor.peek();
    let value = match token.kind {
        TokenKind::Yes | TokenKind::True => true,
        TokenKind::No | TokenKind::False => false,
        TokenKind::Number => token.numeric_value().is_some_and(|n| n != 0.0),
        _ => return Err(cursor.error("Expected boolean value (YES, NO, TRUE, FALSE, 1, 0)")),
    };
    cursor.advance();
    Ok(value)
}

/// A NUMBER token truncated toward zero.
fn integer(cursor: &mut TokenCursor, message: &str) -> PResult<i64> {
    let token = cursor.consume(TokenKind::Number, message)?;
    match token.numeric_value() {
        #[allow(clippy::cast_possible_truncation)]
        Some(n) => Ok(n.trunc() as i64),
        None => Err(ParseError::at(token, message)),
    }
}

// -- Conditions (precedence: OR < AND < NOT < primary) ----------------------

pub(crate) fn condition(cursor: &mut TokenCursor) -> PResult<Condition> {
    or_expr(cursor)
}

fn or_expr(cursor: &mut TokenCursor) -> PResult<Condition> {
    let mut left = and_expr(cursor)?;
    while cursor.eat_continued(TokenKind::Or) {
        cursor.skip_newlines();
        let right = and_expr(cursor)?;
        left = left.or(right);
    }
    Ok(left)
}

fn and_expr(cursor: &mut TokenCursor) -> PResult<Condition> {
    let mut left = unary(cursor)?;
    while cursor.eat_continued(TokenKind::And) {
        cursor.skip_newlines();
        let right = unary(cursor)?;
        left = left.and(right);
    }
    Ok(left)
}

fn unary(cursor: &mut TokenCursor) -> PResult<Condition> {
    if cursor.eat(TokenKind::Not) {
        cursor.skip_newlines();
        return Ok(!primary(cursor)?);
    }
    primary(cursor)
}

fn primary(cursor: &mut TokenCursor) -> PResult<Condition> {
    cursor.skip_newlines();
    let kind = cursor.peek().kind;
    if kind == TokenKind::LParen {
        cursor.open_paren("Expected '('")?;
        let inner = condition(cursor)?;
        cursor.close_paren("Expected ')' after grouped expression")?;
        return Ok(inner.group());
    }
    if kind.is_aggregation_function() || kind.is_grid_check_function() {
        return function_call(cursor).map(Condition::Function);
    }
    if kind == TokenKind::Identifier {
        return comparison(cursor);
    }
    Err(cursor.error("Expected condition (field, function, or grouped expression)"))
}

fn function_type(kind: TokenKind) -> Option<FunctionType> {
    let function = match kind {
        TokenKind::Count => FunctionType::Count,
        TokenKind::Sum => FunctionType::Sum,
        TokenKind::Avg => FunctionType::Avg,
        TokenKind::Min => FunctionType::Min,
        TokenKind::Max => FunctionType::Max,
        TokenKind::HasAny => FunctionType::HasAny,
        TokenKind::HasAll => FunctionType::HasAll,
        TokenKind::HasNone => FunctionType::HasNone,
        _ => return None,
    };
    Some(function)
}

fn function_call(cursor: &mut TokenCursor) -> PResult<FunctionCall> {
    let token = cursor.peek();
    let position = token.position;
    let Some(function) = function_type(token.kind) else {
        return Err(cursor.error("Expected function name"));
    };
    cursor.advance();

    cursor.open_paren("Expected '(' after function name")?;
    let target = cursor
        .consume(TokenKind::Identifier, "Expected field identifier in function")?
        .text
        .clone();
    let mut values = Vec::new();
    if function.is_grid_check() && cursor.eat(TokenKind::Comma) {
        values = value_list(cursor)?;
    }
    cursor.close_paren("Expected ')' after function arguments")?;

    let mut comparison = None;
    if function.is_aggregation() {
        if let Some(op) = binary_operator(cursor.peek()) {
            cursor.advance();
            comparison = Some((op, value(cursor)?));
        }
    }

    Ok(FunctionCall {
        function,
        target,
        values,
        comparison,
        position,
    })
}

fn comparison(cursor: &mut TokenCursor) -> PResult<Condition> {
    let field_token = cursor.consume(TokenKind::Identifier, "Expected field identifier")?;
    let field = field_token.text.clone();
    let position = field_token.position;
    let leaf = |op, operand| {
        Condition::Comparison(Comparison {
            field: field.clone(),
            op,
            operand,
            position,
        })
    };

    match cursor.peek().kind {
        TokenKind::IsEmpty => {
            cursor.advance();
            Ok(leaf(Operator::IsEmpty, Operand::None))
        }
        TokenKind::IsNotEmpty => {
            cursor.advance();
            Ok(leaf(Operator::IsNotEmpty, Operand::None))
        }
        TokenKind::Between => {
            cursor.advance();
            let low = value(cursor)?;
            cursor.consume(TokenKind::And, "Expected AND in BETWEEN expression")?;
            let high = value(cursor)?;
            Ok(leaf(Operator::Between, Operand::Range(low, high)))
        }
        TokenKind::In => {
            cursor.advance();
            cursor.open_paren("Expected '(' after IN")?;
            let values = value_list(cursor)?;
            cursor.close_paren("Expected ')' after IN values")?;
            Ok(leaf(Operator::In, Operand::List(values)))
        }
        TokenKind::NotIn => {
            cursor.advance();
            cursor.open_paren("Expected '(' after NOT IN")?;
            let values = value_list(cursor)?;
            cursor.close_paren("Expected ')' after NOT IN values")?;
            Ok(!leaf(Operator::In, Operand::List(values)))
        }
        _ => {
            let Some(op) = binary_operator(cursor.peek()) else {
                return Err(cursor.error("Expected comparison operator"));
            };
            cursor.advance();
            let value = value(cursor)?;
            Ok(leaf(op, Operand::Single(value)))
        }
    }
}

fn binary_operator(token: &TokenInstance) -> Option<Operator> {
    let op = match token.kind {
        TokenKind::Eq => Operator::Eq,
        TokenKind::Neq => Operator::Neq,
        TokenKind::Gt => Operator::Gt,
        TokenKind::Gte => Operator::Gte,
        TokenKind::Lt => Operator::Lt,
        TokenKind::Lte => Operator::Lte,
        TokenKind::Contains => Operator::Contains,
        TokenKind::StartsWith => Operator::StartsWith,
        TokenKind::EndsWith => Operator::EndsWith,
        _ => return None,
    };
    Some(op)
}

// -- Values -----------------------------------------------------------------

const EXPECTED_VALUE: &str = "Expected value (string, number, boolean, or identifier)";

fn value(cursor: &mut TokenCursor) -> PResult<Value> {
    let token = cursor.peek();
    let value = match token.kind {
        TokenKind::String => Value::String(token.string_value()),
        TokenKind::Number => {
            Value::from_number(&token.text).ok_or_else(|| cursor.error(EXPECTED_VALUE))?
        }
        TokenKind::Yes | TokenKind::True => Value::Bool(true),
        TokenKind::No | TokenKind::False => Value::Bool(false),
        TokenKind::Identifier => Value::Identifier(token.text.clone()),
        _ => return Err(cursor.error(EXPECTED_VALUE)),
    };
    cursor.advance();
    Ok(value)
}

fn value_list(cursor: &mut TokenCursor) -> PResult<Vec<Value>> {
    let mut values = vec![value(cursor)?];
    while cursor.eat(TokenKind::Comma) {
        values.push(value(cursor)?);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lex::{tokenize, Position};
    use crate::types::field;

    fn cond(source: &str) -> Condition {
        let mut cursor = TokenCursor::new(tokenize(source));
        condition(&mut cursor).unwrap()
    }

    fn cond_err(source: &str) -> ParseError {
        let mut cursor = TokenCursor::new(tokenize(source));
        condition(&mut cursor).unwrap_err()
    }

    /// Compare ignoring positions by rendering back to script syntax.
    fn same(a: &Condition, b: &Condition) {
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn simple_comparison_keeps_position() {
        let c = cond("  age >= 18");
        match c {
            Condition::Comparison(cmp) => {
                assert_eq!(cmp.field, "age");
                assert_eq!(cmp.op, Operator::Gte);
                assert_eq!(cmp.operand, Operand::Single(Value::Int(18)));
                assert_eq!(cmp.position, Position::new(1, 3));
            }
            other => panic!("expected Comparison, got {other:?}"),
        }
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let c = cond("a = 1 AND b = 2 OR c = 3");
        match &c {
            Condition::Or(left, _) => assert!(matches!(left.as_ref(), Condition::And(_, _))),
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn not_binds_tighter_than_and() {
        let c = cond("NOT a = 1 AND b = 2");
        match &c {
            Condition::And(left, _) => assert!(matches!(left.as_ref(), Condition::Not(_))),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn or_chain_folds_left() {
        let c = cond("a = 1 OR b = 2 OR c = 3");
        same(
            &c,
            &field("a")
                .eq(Value::Int(1))
                .or(field("b").eq(Value::Int(2)))
                .or(field("c").eq(Value::Int(3))),
        );
        match &c {
            Condition::Or(left, _) => assert!(matches!(left.as_ref(), Condition::Or(_, _))),
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn group_is_preserved() {
        let c = cond("(a = 1 OR b = 2) AND c = 3");
        match &c {
            Condition::And(left, _) => assert!(matches!(left.as_ref(), Condition::Group(_))),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn between_is_atomic() {
        let c = cond("age BETWEEN 18 AND 60 AND x = 1");
        match &c {
            Condition::And(left, _) => match left.as_ref() {
                Condition::Comparison(cmp) => {
                    assert_eq!(cmp.operand, Operand::Range(Value::Int(18), Value::Int(60)));
                }
                other => panic!("expected Comparison, got {other:?}"),
            },
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn not_in_wraps_in() {
        let c = cond("district NOT IN ('A', 'B')");
        match &c {
            Condition::Not(inner) => match inner.as_ref() {
                Condition::Comparison(cmp) => {
                    assert_eq!(cmp.op, Operator::In);
                    assert_eq!(
                        cmp.operand,
                        Operand::List(vec![Value::String("A".into()), Value::String("B".into())])
                    );
                }
                other => panic!("expected Comparison, got {other:?}"),
            },
            other => panic!("expected Not, got {other:?}"),
        }
    }

    #[test]
    fn empty_checks() {
        assert!(matches!(
            cond("phone IS EMPTY"),
            Condition::Comparison(Comparison { op: Operator::IsEmpty, operand: Operand::None, .. })
        ));
        assert!(matches!(
            cond("phone is not empty"),
            Condition::Comparison(Comparison { op: Operator::IsNotEmpty, .. })
        ));
    }

    #[test]
    fn aggregation_with_trailing_comparison() {
        match cond("COUNT(householdMembers) >= 3") {
            Condition::Function(call) => {
                assert_eq!(call.function, FunctionType::Count);
                assert_eq!(call.target, "householdMembers");
                assert_eq!(call.comparison, Some((Operator::Gte, Value::Int(3))));
                assert!(call.values.is_empty());
            }
            other => panic!("expected Function, got {other:?}"),
        }
    }

    #[test]
    fn grid_check_with_values() {
        match cond("HAS_ANY(crops.type, 'maize', rice)") {
            Condition::Function(call) => {
                assert_eq!(call.function, FunctionType::HasAny);
                assert_eq!(
                    call.values,
                    vec![Value::String("maize".into()), Value::Identifier("rice".into())]
                );
                assert!(call.comparison.is_none());
            }
            other => panic!("expected Function, got {other:?}"),
        }
    }

    #[test]
    fn grid_check_ignores_trailing_operator() {
        let mut cursor = TokenCursor::new(tokenize("HAS_NONE(crops.type) = 1"));
        let c = condition(&mut cursor).unwrap();
        assert!(matches!(c, Condition::Function(_)));
        assert!(cursor.check(TokenKind::Eq));
    }

    #[test]
    fn continuation_lines() {
        let c = cond("a = 1\n  AND b = 2\n  OR c = 3");
        assert_eq!(c.leaf_count(), 3);
        assert!(matches!(c, Condition::Or(_, _)));
    }

    #[test]
    fn condition_stops_at_newline() {
        let mut cursor = TokenCursor::new(tokenize("a = 1\nSCORE: 5"));
        let c = condition(&mut cursor).unwrap();
        assert_eq!(c.leaf_count(), 1);
        assert!(cursor.check(TokenKind::Newline));
    }

    #[test]
    fn newlines_inside_parens() {
        let c = cond("(\n  a = 1\n  OR\n  b = 2\n)");
        assert!(matches!(c, Condition::Group(_)));
        assert_eq!(c.leaf_count(), 2);
    }

    #[test]
    fn value_kinds() {
        assert!(matches!(
            cond("x = YES"),
            Condition::Comparison(Comparison { operand: Operand::Single(Value::Bool(true)), .. })
        ));
        assert!(matches!(
            cond("x = 2.5"),
            Condition::Comparison(Comparison { operand: Operand::Single(Value::Float(_)), .. })
        ));
        assert!(matches!(
            cond("x = otherField"),
            Condition::Comparison(Comparison { operand: Operand::Single(Value::Identifier(_)), .. })
        ));
    }

    #[test]
    fn missing_value_is_error_at_eof() {
        let err = cond_err("age >=");
        assert_eq!(err.message, EXPECTED_VALUE);
        assert_eq!((err.line, err.column), (1, 7));
    }

    #[test]
    fn missing_operator() {
        let err = cond_err("age 18");
        assert_eq!(err.message, "Expected comparison operator");
        assert_eq!((err.line, err.column), (1, 5));
    }

    #[test]
    fn unclosed_group() {
        let err = cond_err("(a = 1");
        assert_eq!(err.message, "Expected ')' after grouped expression");
    }

    #[test]
    fn bad_primary() {
        let err = cond_err("= 5");
        assert_eq!(
            err.message,
            "Expected condition (field, function, or grouped expression)"
        );
    }
}
