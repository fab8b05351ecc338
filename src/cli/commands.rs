use crate::catalog::{available_fields, example_formulas};
use crate::config::EngineConfig;
use crate::engine::KpiEngine;
use crate::error::{KpiError, KpiResult};
use crate::types::CalculationResult;
use crate::workspace::{load_record, load_records, TracingExecutionLog, Workspace};
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Format a number for display, removing unnecessary decimal places
pub(crate) fn format_number(n: f64) -> String {
    if !n.is_finite() {
        return n.to_string();
    }
    // 6 decimal places is enough for KPI values
    let rounded = (n * 1e6).round() / 1e6;
    format!("{:.6}", rounded)
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

/// Build an engine from an optional YAML config file
pub fn load_engine(config: Option<&Path>) -> KpiResult<KpiEngine> {
    match config {
        Some(path) => KpiEngine::with_config(EngineConfig::from_path(path)?),
        None => Ok(KpiEngine::new()),
    }
}

fn print_json<T: Serialize>(value: &T) -> KpiResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Execute the validate command
pub fn validate(engine: &KpiEngine, formula: &str, json: bool) -> KpiResult<()> {
    let result = engine.validate_formula(formula);

    if json {
        print_json(&result)?;
    } else {
        println!("{}", "🔍 KPI Forge - Validating formula".bold().green());
        println!("   Formula: {}\n", formula.bright_blue());

        if result.valid {
            println!("{}", "✅ Formula is valid".bold().green());
            let variables = result.parsed_variables.as_deref().unwrap_or_default();
            if variables.is_empty() {
                println!("   No placeholders");
            } else {
                println!("   Placeholders:");
                for name in variables {
                    println!("      {}", name.cyan());
                }
            }
        } else {
            println!(
                "{}",
                format!("❌ Formula is invalid: {}", result.error.as_deref().unwrap_or("unknown error"))
                    .bold()
                    .red()
            );
        }
    }

    if result.valid {
        Ok(())
    } else {
        Err(KpiError::Validation(result.error.unwrap_or_default()))
    }
}

/// Execute the test command: preview a formula against one record
pub fn test(engine: &KpiEngine, formula: &str, record: &str, json: bool) -> KpiResult<()> {
    let sample = load_record(record)?;
    let result = engine.test_formula(formula, &sample);

    if json {
        print_json(&result)?;
    } else {
        println!("{}", "🧪 KPI Forge - Testing formula".bold().green());
        println!("   Formula: {}", formula.bright_blue());
        println!("   Fields:  {}\n", sample.len());

        match (result.success, result.value) {
            (true, Some(value)) => {
                println!("{} {}", "✅ Result:".bold().green(), format_number(value).bold())
            }
            _ => println!(
                "{}",
                format!("❌ Test failed: {}", result.error.as_deref().unwrap_or("unknown error"))
                    .bold()
                    .red()
            ),
        }
    }

    if result.success {
        Ok(())
    } else {
        Err(KpiError::Calculation(result.error.unwrap_or_default()))
    }
}

fn print_calculation(result: &CalculationResult, verbose: bool) {
    if result.success {
        let value = result.value.unwrap_or_default();
        println!("{} {}", "✅ Aggregate:".bold().green(), format_number(value).bold());
    } else {
        println!(
            "{}",
            format!("❌ Calculation failed: {}", result.error.as_deref().unwrap_or("unknown error"))
                .bold()
                .red()
        );
    }

    println!("   Records:  {}", result.input_record_count);
    if !result.diagnostics.is_empty() {
        println!(
            "   Skipped:  {}",
            result.diagnostics.len().to_string().yellow()
        );
    }
    println!("   Time:     {:.3} ms", result.execution_time_ms);

    if verbose && !result.diagnostics.is_empty() {
        println!("\n{}", "⚠️  Skipped records:".yellow());
        for line in &result.diagnostics {
            println!("   {}", line.yellow());
        }
    }
}

fn finish_calculation(result: CalculationResult, json: bool, verbose: bool) -> KpiResult<()> {
    if json {
        print_json(&result)?;
    } else {
        print_calculation(&result, verbose);
    }

    if result.success {
        Ok(())
    } else {
        Err(KpiError::Calculation(result.error.unwrap_or_default()))
    }
}

/// Execute the calculate command: aggregate a formula over a records file
pub fn calculate(
    engine: &KpiEngine,
    formula: &str,
    records: PathBuf,
    verbose: bool,
    json: bool,
) -> KpiResult<()> {
    if !json {
        println!("{}", "🔥 KPI Forge - Calculating".bold().green());
        println!("   Formula: {}", formula.bright_blue());
        println!("   Records: {}\n", records.display());
    }

    let records = load_records(&records)?;
    let result = engine.calculate_records(formula, &records);
    finish_calculation(result, json, verbose)
}

/// Execute the run command: calculate a stored KPI from a workspace file
pub fn run(
    engine: &KpiEngine,
    workspace: PathBuf,
    kpi: &str,
    org: &str,
    user: &str,
    verbose: bool,
    json: bool,
) -> KpiResult<()> {
    if !json {
        println!("{}", "🔥 KPI Forge - Running KPI".bold().green());
        println!("   Workspace: {}", workspace.display());
        println!("   KPI:       {} ({})\n", kpi.bright_blue(), org);
    }

    let source = Workspace::from_path(&workspace)?;
    let result = engine.calculate(kpi, org, user, &source, &TracingExecutionLog);
    finish_calculation(result, json, verbose)
}

/// Execute the fields command
pub fn fields(json: bool) -> KpiResult<()> {
    if json {
        return print_json(&available_fields());
    }

    println!("{}", "📋 Available fields".bold().green());
    for field in available_fields() {
        println!(
            "   {:<14} {:<7} {}",
            field.name.bright_blue(),
            field.kind.to_string().cyan(),
            field.description
        );
    }
    Ok(())
}

/// Execute the examples command
pub fn examples(json: bool) -> KpiResult<()> {
    if json {
        return print_json(&example_formulas());
    }

    println!("{}", "💡 Example formulas".bold().green());
    for example in example_formulas() {
        println!("\n   {}", example.name.bold());
        println!("      {}", example.formula.bright_blue());
        println!("      {}", example.description);
    }
    Ok(())
}
