use rulescript::{compile, parse, FieldMapping};

fn main() {
    let text = std::fs::read_to_string("demos/farmer_support.rules").expect("failed to read rules");

    let result = parse(&text);
    for warning in result.warnings() {
        println!("{warning}");
    }
    if !result.is_valid() {
        for error in result.errors() {
            eprintln!("{error}");
        }
        std::process::exit(1);
    }

    for summary in result.summaries() {
        println!(
            "{:<20} {:<10} {} condition(s)",
            summary.code, summary.rule_type, summary.condition_count
        );
    }
    println!();

    let mapping = FieldMapping::farmer_eligibility();
    let compiled = compile(result.rules(), "SUBSIDY_2026", mapping.scope_code(), &mapping)
        .expect("failed to compile ruleset");

    println!("{compiled}");
    for warning in compiled.compilation_warnings() {
        println!("warning: {warning}");
    }
    println!();
    println!("Eligibility check:\n  {}", compiled.eligibility_check_query());
    println!();
    println!("Ranked candidates:\n  {}", compiled.full_eligibility_query());
}
