use rulescript::{
    compile, compile_file, compile_script, field, parse, CompileError, FieldMapping, FieldType,
    Rule, RuleType, RulescriptError, SchemaConfig,
};

const SCOPE: &str = "FARMER_ELIGIBILITY";

const PROGRAMME: &str = r#"
RULE "Working Age"
  WHEN age BETWEEN 18 AND 65

RULE "Smallholder"
  TYPE: PRIORITY
  WHEN farmSize > 0 AND farmSize <= 5

RULE "Already Supported"
  TYPE: EXCLUSION
  WHEN receivesOtherSupport = YES

RULE "Large Household"
  TYPE: BONUS
  WHEN COUNT(householdMembers) >= 6
  SCORE: 15

RULE "Female Headed"
  TYPE: BONUS
  WHEN gender = "FEMALE" AND maritalStatus IN ("WIDOWED", "DIVORCED")
  SCORE: 10
"#;

fn programme() -> rulescript::CompiledRuleset {
    compile_script(PROGRAMME, "SUPPORT_2026", SCOPE, &FieldMapping::farmer_eligibility()).unwrap()
}

#[test]
fn rule_counts() {
    let compiled = programme();
    assert_eq!(compiled.ruleset_code(), "SUPPORT_2026");
    assert_eq!(compiled.scope_code(), SCOPE);
    assert_eq!(compiled.total_rules(), 5);
    assert_eq!(compiled.inclusion_rules(), 1);
    assert_eq!(compiled.priority_rules(), 1);
    assert_eq!(compiled.exclusion_rules(), 1);
    assert_eq!(compiled.bonus_rules(), 2);
    assert_eq!(compiled.count_of(RuleType::Bonus), 2);
    assert!(
        compiled.compilation_warnings().is_empty(),
        "{:?}",
        compiled.compilation_warnings()
    );
}

#[test]
fn per_rule_predicates() {
    let compiled = programme();
    let where_of = |code: &str| compiled.rule(code).unwrap().where_clause.clone();

    assert_eq!(where_of("WORKING_AGE"), "b.c_age BETWEEN 18 AND 65");
    assert_eq!(where_of("SMALLHOLDER"), "b.c_farmSize > 0 AND b.c_farmSize <= 5");
    assert_eq!(where_of("ALREADY_SUPPORTED"), "b.c_receivesOtherSupport = 'Y'");
    assert_eq!(
        where_of("LARGE_HOUSEHOLD"),
        "(SELECT COUNT(*) FROM app_fd_householdMembers g WHERE g.c_parentId = b.id) >= 6"
    );
    assert_eq!(
        where_of("FEMALE_HEADED"),
        "b.c_gender = 'FEMALE' AND b.c_maritalStatus IN ('WIDOWED', 'DIVORCED')"
    );
}

#[test]
fn aggregate_clauses_and_queries() {
    let compiled = programme();
    assert_eq!(
        compiled.eligibility_where_clause(),
        "(b.c_age BETWEEN 18 AND 65) AND (b.c_farmSize > 0 AND b.c_farmSize <= 5)"
    );
    assert_eq!(
        compiled.exclusion_where_clause(),
        "(b.c_receivesOtherSupport = 'Y')"
    );
    let household = "CASE WHEN (SELECT COUNT(*) FROM app_fd_householdMembers g \
                     WHERE g.c_parentId = b.id) >= 6 THEN 15 ELSE 0 END";
    let female = "CASE WHEN b.c_gender = 'FEMALE' AND b.c_maritalStatus IN ('WIDOWED', 'DIVORCED') \
                  THEN 10 ELSE 0 END";
    assert_eq!(compiled.score_expression(), format!("{household} + {female}"));

    assert_eq!(
        compiled.eligibility_check_query(),
        format!(
            "SELECT b.id FROM app_fd_farmer_registry b WHERE {}",
            compiled.eligibility_where_clause()
        )
    );
    assert_eq!(
        compiled.scoring_query(),
        format!(
            "SELECT b.id, {} AS total_score FROM app_fd_farmer_registry b",
            compiled.score_expression()
        )
    );
    assert_eq!(
        compiled.full_eligibility_query(),
        format!(
            "{} WHERE ({}) AND NOT ({}) ORDER BY total_score DESC",
            compiled.scoring_query(),
            compiled.eligibility_where_clause(),
            compiled.exclusion_where_clause()
        )
    );
}

#[test]
fn used_fields_across_rules() {
    let compiled = programme();
    assert_eq!(
        compiled.used_fields(),
        vec![
            "age",
            "farmSize",
            "receivesOtherSupport",
            "householdMembers",
            "gender",
            "maritalStatus",
        ]
    );
}

#[test]
fn non_mandatory_inclusion_is_not_a_gate() {
    let rules = parse("RULE \"Nice To Have\"\n  MANDATORY: NO\n  WHEN farmSize > 10")
        .into_rules();
    let compiled = compile(&rules, "RS", SCOPE, &FieldMapping::farmer_eligibility()).unwrap();
    assert_eq!(compiled.eligibility_where_clause(), "1 = 1");
    assert_eq!(
        compiled.compiled_rules()[0].select_expression,
        "CASE WHEN b.c_farmSize > 10 THEN 1 ELSE 0 END"
    );
}

#[test]
fn multiple_exclusions_are_ored() {
    let rules = [
        Rule::new("A").with_type(RuleType::Exclusion).when(field("age").lt(18_i64)),
        Rule::new("B").with_type(RuleType::Exclusion).when(field("age").gt(80_i64)),
    ];
    let compiled = compile(&rules, "RS", SCOPE, &FieldMapping::farmer_eligibility()).unwrap();
    assert_eq!(
        compiled.exclusion_where_clause(),
        "(b.c_age < 18) OR (b.c_age > 80)"
    );
}

#[test]
fn grid_child_conditions() {
    let script = r#"
RULE "Grows Maize"
  WHEN HAS_ANY(crops.type, "MAIZE", "SORGHUM")
RULE "No Tobacco"
  WHEN HAS_NONE(crops.type, "TOBACCO")
RULE "Has Elderly"
  WHEN householdMembers.age >= 60
RULE "Irrigated Area"
  WHEN SUM(crops.area) > 2.5
"#;
    let compiled =
        compile_script(script, "RS", SCOPE, &FieldMapping::farmer_eligibility()).unwrap();
    let where_of = |code: &str| compiled.rule(code).unwrap().where_clause.clone();
    assert_eq!(
        where_of("GROWS_MAIZE"),
        "EXISTS (SELECT 1 FROM app_fd_crops g WHERE g.c_parentId = b.id \
         AND g.c_type IN ('MAIZE', 'SORGHUM'))"
    );
    assert_eq!(
        where_of("NO_TOBACCO"),
        "NOT EXISTS (SELECT 1 FROM app_fd_crops g WHERE g.c_parentId = b.id \
         AND g.c_type IN ('TOBACCO'))"
    );
    assert_eq!(
        where_of("HAS_ELDERLY"),
        "EXISTS (SELECT 1 FROM app_fd_householdMembers g WHERE g.c_parentId = b.id \
         AND g.c_age >= 60)"
    );
    assert_eq!(
        where_of("IRRIGATED_AREA"),
        "(SELECT COALESCE(SUM(g.c_area), 0) FROM app_fd_crops g WHERE g.c_parentId = b.id) > 2.5"
    );
    assert!(compiled.compilation_warnings().is_empty());
}

/// Each rule's WHERE clause, compiled from script text.
fn where_clauses(script: &str) -> Vec<String> {
    compile_script(script, "RS", SCOPE, &FieldMapping::farmer_eligibility())
        .unwrap()
        .compiled_rules()
        .iter()
        .map(|r| r.where_clause.clone())
        .collect()
}

#[test]
fn grouping_is_transparent() {
    let clauses = where_clauses(
        r#"
RULE "Plain"
  WHEN age > 18 AND crops.area >= 2
RULE "Grouped"
  WHEN (age > 18 AND crops.area >= 2)
RULE "Nested"
  WHEN ((age > 18) AND (crops.area >= 2))
"#,
    );
    let strip = |sql: &str| sql.replace(['(', ')'], "");
    assert_eq!(clauses[1], format!("({})", clauses[0]));
    assert_eq!(strip(&clauses[0]), strip(&clauses[1]));
    assert_eq!(strip(&clauses[0]), strip(&clauses[2]));
}

#[test]
fn not_in_matches_negated_group() {
    let clauses = where_clauses(
        r#"
RULE "Base Not In"
  WHEN district NOT IN ("NORTH", "EAST")
RULE "Base Negated Group"
  WHEN NOT (district IN ("NORTH", "EAST"))
RULE "Grid Not In"
  WHEN crops.type NOT IN ("TOBACCO")
RULE "Grid Negated Group"
  WHEN NOT (crops.type IN ("TOBACCO"))
RULE "Grid Has None"
  WHEN HAS_NONE(crops.type, "TOBACCO")
"#,
    );
    assert_eq!(clauses[0], "b.c_district NOT IN ('NORTH', 'EAST')");
    assert_eq!(clauses[0], clauses[1]);
    assert_eq!(
        clauses[2],
        "NOT EXISTS (SELECT 1 FROM app_fd_crops g WHERE g.c_parentId = b.id AND g.c_type IN ('TOBACCO'))"
    );
    assert_eq!(clauses[2], clauses[3]);
    assert_eq!(clauses[2], clauses[4]);
}

#[test]
fn contains_value_with_wildcards() {
    let clauses = where_clauses("RULE \"Discount\"\n  WHEN fullName CONTAINS \"50%_off\"");
    assert_eq!(clauses[0], "b.c_fullName LIKE '%50!%!_off%' ESCAPE '!'");
}

#[test]
fn warnings_do_not_stop_compilation() {
    let script = "RULE \"Odd\"\n  WHEN shoeSize > 40 AND gender CONTAINS \"MA\"";
    let compiled =
        compile_script(script, "RS", SCOPE, &FieldMapping::farmer_eligibility()).unwrap();
    let warnings = compiled.compilation_warnings();
    assert_eq!(warnings.len(), 2);
    assert_eq!(warnings[0].rule.as_deref(), Some("ODD"));
    assert_eq!((warnings[0].line, warnings[0].column), (2, 8));
    assert_eq!(warnings[0].message, "Unknown field 'shoeSize'");
    assert_eq!(
        warnings[1].message,
        "Operator 'CONTAINS' is not applicable to field 'gender' (LOOKUP)"
    );
    assert_eq!(
        compiled.rule("ODD").unwrap().where_clause,
        "shoeSize > 40 AND b.c_gender LIKE '%MA%'"
    );
}

#[test]
fn string_literals_are_escaped() {
    let compiled = compile_script(
        "RULE \"Name\"\n  WHEN fullName = \"O'Neil\"",
        "RS",
        SCOPE,
        &FieldMapping::farmer_eligibility(),
    )
    .unwrap();
    assert_eq!(
        compiled.rule("NAME").unwrap().where_clause,
        "b.c_fullName = 'O''Neil'"
    );
}

#[test]
fn custom_schema() {
    let schema = SchemaConfig::default()
        .with_base_table("registry.farmers")
        .with_boolean_literals("TRUE", "FALSE");
    let mapping = FieldMapping::new("S", schema)
        .with_field("active", FieldType::Boolean)
        .with_column("district", "region_code");
    let compiled = compile_script(
        "RULE \"R\"\n  WHEN active = NO AND district = \"N1\"",
        "RS",
        "S",
        &mapping,
    )
    .unwrap();
    assert_eq!(
        compiled.eligibility_check_query(),
        "SELECT b.id FROM registry.farmers b WHERE (b.c_active = FALSE AND b.region_code = 'N1')"
    );
}

#[test]
fn parse_failure_is_reported() {
    let err = compile_script(
        "RULE \"Bad\"\n  WHEN age 18",
        "RS",
        SCOPE,
        &FieldMapping::farmer_eligibility(),
    )
    .unwrap_err();
    match err {
        RulescriptError::Parse(e) => {
            assert_eq!(e.message, "Expected comparison operator");
            assert_eq!((e.line, e.column), (2, 12));
        }
        other => panic!("expected Parse, got {other:?}"),
    }
}

#[test]
fn orphan_grid_child_is_a_mapping_error() {
    let mapping = FieldMapping::new("S", SchemaConfig::default())
        .with_field("pets.name", FieldType::Text);
    let err = compile(&[], "RS", "S", &mapping).unwrap_err();
    assert_eq!(
        err,
        CompileError::GridWithoutTable {
            field: "pets.name".to_owned(),
            grid: "pets".to_owned(),
        }
    );
}

#[test]
fn compile_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("programme.rules");
    std::fs::write(&path, PROGRAMME).unwrap();
    let compiled =
        compile_file(&path, "SUPPORT_2026", SCOPE, &FieldMapping::farmer_eligibility()).unwrap();
    assert_eq!(compiled, programme());

    let missing = compile_file(
        dir.path().join("missing.rules"),
        "RS",
        SCOPE,
        &FieldMapping::farmer_eligibility(),
    );
    assert!(matches!(missing, Err(RulescriptError::Io(_))));
}
