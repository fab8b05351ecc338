//! Engine tests through the public API
//!
//! Covers the end-to-end scenarios, the validation/evaluation agreement and
//! concurrent use of the shared sandbox.

use pretty_assertions::assert_eq;
use royalbit_kpi_forge::core::{RecordEvaluator, Sandbox};
use royalbit_kpi_forge::workspace::{MemoryExecutionLog, Workspace};
use royalbit_kpi_forge::{record, KpiEngine, Record, RecordValue};
use std::sync::Arc;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// ═══════════════════════════════════════════════════════════════════════════
// SCENARIOS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_single_record_markup() {
    let engine = KpiEngine::new();
    let value = engine
        .calculate_on_records("{monthlyRate} * 1.15", &[record([("monthlyRate", 100.0)])])
        .unwrap();
    assert!(close(value, 115.0), "got {}", value);
}

#[test]
fn test_prefix_fields_do_not_collide() {
    let engine = KpiEngine::new();
    let value = engine
        .calculate_on_records("{a} + {ab}", &[record([("a", 1.0), ("ab", 2.0)])])
        .unwrap();
    assert_eq!(value, 3.0);
}

#[test]
fn test_unparseable_value_contributes_zero() {
    let engine = KpiEngine::new();
    let records = vec![
        record([("cost", RecordValue::from(10.0))]),
        record([("cost", RecordValue::from("bad"))]),
        record([("cost", RecordValue::from(20.0))]),
    ];
    let result = engine.calculate_records("{cost} * 1", &records);
    assert!(result.success);
    assert_eq!(result.value, Some(30.0));
    assert_eq!(result.input_record_count, 3);
    assert!(result.diagnostics.is_empty());
}

#[test]
fn test_empty_formula_rejected() {
    let result = KpiEngine::new().validate_formula("");
    assert!(!result.valid);
    assert_eq!(result.error.as_deref(), Some("Formula cannot be empty"));
}

#[test]
fn test_code_execution_keyword_rejected() {
    let engine = KpiEngine::new();
    for formula in ["eval(1)", "{cost} * eval", "require", "Function", "constructor"] {
        let result = engine.validate_formula(formula);
        assert!(!result.valid, "{} should be rejected", formula);
        assert!(result
            .error
            .unwrap()
            .starts_with("Formula contains forbidden pattern: "));
    }
}

#[test]
fn test_division_by_zero_record_excluded() {
    let engine = KpiEngine::new();
    let records = vec![
        record([("a", 10.0), ("b", 2.0)]),
        record([("a", 1.0), ("b", 0.0)]),
    ];
    let result = engine.calculate_records("{a} / {b}", &records);
    assert!(result.success);
    assert_eq!(result.value, Some(5.0));
    assert_eq!(result.diagnostics, vec!["Record 1: non-finite result (inf)".to_string()]);
}

// ═══════════════════════════════════════════════════════════════════════════
// PROPERTIES
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_every_record_failing_is_zero_success() {
    let engine = KpiEngine::new();
    let records = vec![record([("x", -1.0)]), record([("x", -4.0)])];
    let result = engine.calculate_records("sqrt({x})", &records);
    assert!(result.success);
    assert_eq!(result.value, Some(0.0));
    assert_eq!(result.diagnostics.len(), 2);
}

#[test]
fn test_failed_result_has_no_value() {
    let result = KpiEngine::new().calculate_records("process", &[record([("x", 1.0)])]);
    assert!(!result.success);
    assert_eq!(result.value, None);
}

#[test]
fn test_aggregate_is_order_independent() {
    let engine = KpiEngine::new();
    let records: Vec<Record> = (1..=20)
        .map(|i| record([("x", i as f64), ("y", (i % 4) as f64)]))
        .collect();
    let mut shuffled = records.clone();
    shuffled.reverse();
    shuffled.swap(0, 7);

    let a = engine.calculate_on_records("{x} / {y}", &records).unwrap();
    let b = engine.calculate_on_records("{x} / {y}", &shuffled).unwrap();
    assert!((a - b).abs() <= 1e-9 * a.abs().max(1.0));
}

#[test]
fn test_evaluation_is_idempotent_and_pure() {
    let evaluator = RecordEvaluator::shared();
    let rec = record([("cost", RecordValue::from("12.5")), ("qty", RecordValue::from(3.0))]);
    let before = rec.clone();
    let first = evaluator.evaluate("{cost} * {qty}", &rec).unwrap();
    let second = evaluator.evaluate("{cost} * {qty}", &rec).unwrap();
    assert_eq!(first, 37.5);
    assert_eq!(first, second);
    assert_eq!(rec, before);
}

#[test]
fn test_formula_without_placeholders_ignores_records() {
    let evaluator = RecordEvaluator::shared();
    let a = evaluator.evaluate("max(3, 7) * 2", &Record::new()).unwrap();
    let b = evaluator
        .evaluate("max(3, 7) * 2", &record([("anything", 99.0)]))
        .unwrap();
    assert_eq!(a, 14.0);
    assert_eq!(a, b);
}

#[test]
fn test_validation_agrees_with_dry_run() {
    let engine = KpiEngine::new();
    let evaluator = engine.evaluator();
    let formulas = [
        "{a} + {b}",
        "{a} * (",
        "sqrt({a} - 200)",
        "log({a})",
        "unknown({a})",
        "{a} > 50 ? {b} : 0",
        "parse({a})",
        "1 +* 2",
    ];
    for formula in formulas {
        let sentinel: Record = royalbit_kpi_forge::core::extract_placeholders(formula)
            .into_iter()
            .map(|field| (field, RecordValue::Number(100.0)))
            .collect();
        let dry_run_ok = evaluator.evaluate(formula, &sentinel).is_ok();
        assert_eq!(
            engine.validate_formula(formula).valid,
            dry_run_ok,
            "formula {}",
            formula
        );
    }
}

#[test]
fn test_disabled_capabilities_cannot_be_called() {
    let evaluator = RecordEvaluator::shared();
    for name in ["import", "evaluate", "parse", "compile", "createUnit", "simplify"] {
        let err = evaluator
            .evaluate(&format!("{}(1)", name), &Record::new())
            .unwrap_err();
        assert!(
            err.to_string()
                .contains(&format!("Function {} is disabled in the sandbox", name)),
            "{}",
            err
        );
    }
}

#[test]
fn test_deep_nesting_is_an_error_not_a_crash() {
    let deep = format!("{}{{x}}{}", "(".repeat(10_000), ")".repeat(10_000));
    let config = royalbit_kpi_forge::EngineConfig {
        max_formula_length: 50_000,
        max_expression_length: 50_000,
        ..Default::default()
    };
    let engine = KpiEngine::with_config(config).unwrap();
    assert!(!engine.validate_formula(&deep).valid);
    assert!(engine
        .calculate_records(&deep, &[record([("x", 1.0)])])
        .diagnostics[0]
        .contains("nesting"));
}

#[test]
fn test_long_operator_chain_on_small_stack() {
    let chain = vec!["1"; 2048].join("+");
    let value = std::thread::Builder::new()
        .stack_size(2 * 1024 * 1024)
        .spawn(move || Sandbox::shared().evaluate(&chain, &Default::default()))
        .unwrap()
        .join()
        .unwrap()
        .unwrap();
    assert_eq!(value, 2048.0);
}

#[test]
fn test_long_placeholder_chain_with_raised_limits() {
    let formula = vec!["{x}"; 100_000].join("+");
    let config = royalbit_kpi_forge::EngineConfig {
        max_formula_length: 1_000_000,
        max_expression_length: 1_000_000,
        ..Default::default()
    };
    let engine = KpiEngine::with_config(config).unwrap();
    assert!(engine.validate_formula(&formula).valid);

    let result = engine.calculate_records(&formula, &[record([("x", 2.0)])]);
    assert!(result.success);
    assert_eq!(result.value, Some(200_000.0));
}

#[test]
fn test_aggregate_overflow_is_reported() {
    let records = vec![record([("x", 1e308)]), record([("x", 1e308)])];
    let result = KpiEngine::new().calculate_records("{x}", &records);
    assert!(!result.success);
    assert_eq!(result.value, None);

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["success"], serde_json::json!(false));
    assert!(json["error"].as_str().unwrap().contains("overflowed"));
}

// ═══════════════════════════════════════════════════════════════════════════
// CONCURRENCY
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_shared_sandbox_concurrent_evaluations() {
    let formulas = ["{x} * 2", "{x} + 100", "{x} ^ 2", "{x} > 5 ? 1 : 0"];

    std::thread::scope(|s| {
        for (t, formula) in formulas.iter().enumerate() {
            s.spawn(move || {
                let engine = KpiEngine::new();
                for i in 0..200 {
                    let x = (i + t) as f64;
                    let value = engine
                        .calculate_on_records(formula, &[record([("x", x)])])
                        .unwrap();
                    let expected = match t {
                        0 => x * 2.0,
                        1 => x + 100.0,
                        2 => x * x,
                        _ => {
                            if x > 5.0 {
                                1.0
                            } else {
                                0.0
                            }
                        }
                    };
                    assert!(close(value, expected), "{} with x={}: {}", formula, x, value);
                }
            });
        }
    });

    // Every engine above used the one shared sandbox
    assert!(Arc::ptr_eq(&Sandbox::shared(), &Sandbox::shared()));
}

#[test]
fn test_scope_does_not_leak_between_threads() {
    std::thread::scope(|s| {
        let with_field = s.spawn(|| {
            let evaluator = RecordEvaluator::shared();
            (0..100)
                .map(|_| evaluator.evaluate("{secret} + 1", &record([("secret", 41.0)])))
                .all(|v| v.map(|v| v == 42.0).unwrap_or(false))
        });
        let without_field = s.spawn(|| {
            let evaluator = RecordEvaluator::shared();
            (0..100)
                .map(|_| evaluator.evaluate("{secret} + 1", &Record::new()))
                .all(|v| v.map(|v| v == 1.0).unwrap_or(false))
        });
        assert!(with_field.join().unwrap());
        assert!(without_field.join().unwrap());
    });
}

// ═══════════════════════════════════════════════════════════════════════════
// COLLABORATORS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_calculate_through_workspace() {
    let workspace = Workspace::from_yaml(
        r#"
kpis:
  - id: margin
    org_id: acme
    name: Gross margin
    formula: "{revenue} - {cost}"
records:
  acme:
    - { id: s1, revenue: 500, cost: 200 }
    - { id: s2, revenue: "300", cost: 100 }
    - { id: s3, revenue: 50 }
"#,
    )
    .unwrap();
    let log = MemoryExecutionLog::default();

    let result = KpiEngine::new().calculate("margin", "acme", "alice", &workspace, &log);
    assert!(result.success);
    assert_eq!(result.value, Some(550.0));
    assert_eq!(result.input_record_count, 3);

    let entries = log.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].user_id, "alice");
    assert_eq!(entries[0].formula, "{revenue} - {cost}");
    assert_eq!(entries[0].value, Some(550.0));
}

#[test]
fn test_custom_sandbox_function() {
    use royalbit_kpi_forge::core::sandbox::FunctionSpec;

    let sandbox = Sandbox::builder()
        .function(FunctionSpec::new(
            "pct",
            2,
            Some(2),
            "Percentage of a in b",
            |args, _| Ok(args[0] / args[1] * 100.0),
        ))
        .unwrap()
        .build();
    let engine =
        KpiEngine::with_sandbox(Default::default(), Arc::new(sandbox)).unwrap();
    let value = engine
        .calculate_on_records("pct({part}, {whole})", &[record([("part", 1.0), ("whole", 4.0)])])
        .unwrap();
    assert_eq!(value, 25.0);
}
