use std::sync::Arc;
use std::thread;

use rulescript::registry::StaticFieldSource;
use rulescript::{
    compile, compile_script, parse, FieldMapping, FieldRegistry, SchemaConfig,
};

const SCRIPT: &str = r#"
RULE "Working Age"
  WHEN age BETWEEN 18 AND 65
RULE "Already Supported"
  TYPE: EXCLUSION
  WHEN receivesOtherSupport = YES
RULE "Has Livestock"
  TYPE: BONUS
  WHEN HAS_ANY(livestock.type, "CATTLE", "GOAT")
  SCORE: 5
"#;

#[test]
fn compile_shared_mapping_across_threads() {
    let mapping = Arc::new(FieldMapping::farmer_eligibility());
    let expected = compile_script(SCRIPT, "RS", "FARMER_ELIGIBILITY", &mapping).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let mapping = Arc::clone(&mapping);
            thread::spawn(move || {
                compile_script(SCRIPT, "RS", "FARMER_ELIGIBILITY", &mapping).unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}

#[test]
fn parsed_rules_shared_across_threads() {
    let rules = Arc::new(parse(SCRIPT).into_rules());
    let mapping = Arc::new(FieldMapping::farmer_eligibility());

    let handles: Vec<_> = ["A", "B", "C", "D"]
        .into_iter()
        .map(|code| {
            let rules = Arc::clone(&rules);
            let mapping = Arc::clone(&mapping);
            thread::spawn(move || {
                compile(&rules, code, "FARMER_ELIGIBILITY", &mapping).unwrap()
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for (compiled, code) in results.iter().zip(["A", "B", "C", "D"]) {
        assert_eq!(compiled.ruleset_code(), code);
        assert_eq!(
            compiled.full_eligibility_query(),
            results[0].full_eligibility_query()
        );
    }
}

#[test]
fn registry_is_shared_across_threads() {
    let source = StaticFieldSource::new(
        FieldMapping::farmer_eligibility()
            .fields()
            .cloned()
            .collect::<Vec<_>>(),
    );
    let registry = Arc::new(FieldRegistry::new(source));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                if i % 3 == 0 {
                    registry.clear_cache();
                }
                let mapping = registry
                    .field_mapping("FARMER_ELIGIBILITY", SchemaConfig::default())
                    .unwrap();
                compile_script(SCRIPT, "RS", "FARMER_ELIGIBILITY", &mapping).unwrap()
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for compiled in &results {
        assert!(compiled.compilation_warnings().is_empty());
        assert_eq!(compiled, &results[0]);
    }
}
