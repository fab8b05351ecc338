//! Expression evaluator for the sandbox
//!
//! Walks an AST and produces a number. Truth values are numbers: comparisons
//! yield 1 or 0 and any non-zero, non-NaN value is true.

use super::functions::{self, FunctionRegistry};
use super::parser::Expr;
use super::EvaluationScope;
use crate::config::NumericConfig;

/// Built-in constants, resolved after scope variables
const CONSTANTS: &[(&str, f64)] = &[
    ("pi", std::f64::consts::PI),
    ("e", std::f64::consts::E),
    ("tau", std::f64::consts::TAU),
    ("true", 1.0),
    ("false", 0.0),
];

/// Everything one evaluation may read. Borrowed for the duration of the call.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub scope: &'a EvaluationScope,
    pub functions: &'a FunctionRegistry,
    pub numeric: &'a NumericConfig,
}

/// Error during evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct EvalError {
    pub message: String,
}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for EvalError {}

impl From<super::TokenizeError> for EvalError {
    fn from(e: super::TokenizeError) -> Self {
        EvalError::new(e.to_string())
    }
}

impl From<super::ParseError> for EvalError {
    fn from(e: super::ParseError) -> Self {
        EvalError::new(e.to_string())
    }
}

fn truthy(value: f64) -> bool {
    value != 0.0 && !value.is_nan()
}

fn from_bool(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Evaluate an expression in the given context
pub fn evaluate(expr: &Expr, ctx: &EvalContext<'_>) -> Result<f64, EvalError> {
    match expr {
        Expr::Number(n) => Ok(*n),

        Expr::Variable(name) => evaluate_variable(name, ctx),

        Expr::FunctionCall { name, args } => evaluate_function(name, args, ctx),

        Expr::BinaryOp { .. } => evaluate_chain(expr, ctx),

        Expr::UnaryOp { op, operand } => {
            let val = evaluate(operand, ctx)?;
            match op.as_str() {
                "-" => Ok(-val),
                "+" => Ok(val),
                "not" => Ok(from_bool(!truthy(val))),
                _ => Err(EvalError::new(format!("Unknown unary operator: {}", op))),
            }
        }

        Expr::Conditional {
            condition,
            then_branch,
            else_branch,
        } => {
            if truthy(evaluate(condition, ctx)?) {
                evaluate(then_branch, ctx)
            } else {
                evaluate(else_branch, ctx)
            }
        }
    }
}

/// Evaluate a run of binary operators along its left spine.
///
/// Left-associative chains nest to the left, so the spine is collected and
/// folded in a loop instead of recursing once per operator.
fn evaluate_chain(expr: &Expr, ctx: &EvalContext<'_>) -> Result<f64, EvalError> {
    let mut pending = Vec::new();
    let mut node = expr;
    while let Expr::BinaryOp { op, left, right } = node {
        pending.push((op.as_str(), &**right));
        node = &**left;
    }

    let mut acc = evaluate(node, ctx)?;
    for (op, right) in pending.into_iter().rev() {
        acc = match op {
            // Logical operators short-circuit
            "and" => {
                if truthy(acc) {
                    from_bool(truthy(evaluate(right, ctx)?))
                } else {
                    0.0
                }
            }
            "or" => {
                if truthy(acc) {
                    1.0
                } else {
                    from_bool(truthy(evaluate(right, ctx)?))
                }
            }
            _ => {
                let r = evaluate(right, ctx)?;
                evaluate_binary_op(op, acc, r, ctx.numeric)?
            }
        };
    }
    Ok(acc)
}

fn evaluate_variable(name: &str, ctx: &EvalContext<'_>) -> Result<f64, EvalError> {
    if let Some(value) = ctx.scope.get(name) {
        return Ok(*value);
    }
    CONSTANTS
        .iter()
        .find(|(constant, _)| *constant == name)
        .map(|(_, value)| *value)
        .ok_or_else(|| EvalError::new(format!("Undefined symbol {}", name)))
}

/// Evaluate a binary arithmetic or comparison operation
fn evaluate_binary_op(op: &str, l: f64, r: f64, numeric: &NumericConfig) -> Result<f64, EvalError> {
    let eps = numeric.epsilon;
    let equal = || functions::nearly_equal(l, r, eps);

    match op {
        "+" => Ok(l + r),
        "-" => Ok(l - r),
        "*" => Ok(l * r),
        // IEEE semantics; non-finite results are filtered by the aggregator
        "/" => Ok(l / r),
        "%" => functions::modulo(l, r),
        "^" => Ok(l.powf(r)),

        "==" => Ok(from_bool(equal())),
        "!=" => Ok(from_bool(!equal())),
        "<" => Ok(from_bool(l < r && !equal())),
        ">" => Ok(from_bool(l > r && !equal())),
        "<=" => Ok(from_bool(l < r || equal())),
        ">=" => Ok(from_bool(l > r || equal())),

        _ => Err(EvalError::new(format!("Unknown operator: {}", op))),
    }
}

/// Evaluate a function call against the allow-list
fn evaluate_function(name: &str, args: &[Expr], ctx: &EvalContext<'_>) -> Result<f64, EvalError> {
    if functions::is_disabled(name) {
        return Err(EvalError::new(format!(
            "Function {} is disabled in the sandbox",
            name
        )));
    }

    let spec = ctx
        .functions
        .get(name)
        .ok_or_else(|| EvalError::new(format!("Undefined function {}", name)))?;

    let values = args
        .iter()
        .map(|arg| evaluate(arg, ctx))
        .collect::<Result<Vec<f64>, EvalError>>()?;

    spec.call(&values, ctx.numeric)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sandbox::parser::parse;
    use crate::core::sandbox::tokenizer::tokenize;

    fn eval_with(expression: &str, scope: &EvaluationScope) -> Result<f64, EvalError> {
        let tokens = tokenize(expression)?;
        let ast = parse(tokens)?;
        let functions = FunctionRegistry::with_builtins();
        let numeric = NumericConfig::default();
        let ctx = EvalContext {
            scope,
            functions: &functions,
            numeric: &numeric,
        };
        evaluate(&ast, &ctx)
    }

    fn eval(expression: &str) -> Result<f64, EvalError> {
        eval_with(expression, &EvaluationScope::new())
    }

    #[test]
    fn test_eval_arithmetic() {
        assert_eq!(eval("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(eval("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(eval("10 / 4").unwrap(), 2.5);
        assert_eq!(eval("2 ^ 10").unwrap(), 1024.0);
        assert_eq!(eval("7 % 3").unwrap(), 1.0);
    }

    #[test]
    fn test_eval_unary() {
        assert_eq!(eval("-5 + 2").unwrap(), -3.0);
        assert_eq!(eval("-2 ^ 2").unwrap(), -4.0);
        assert_eq!(eval("+4").unwrap(), 4.0);
        assert_eq!(eval("not 0").unwrap(), 1.0);
        assert_eq!(eval("!3").unwrap(), 0.0);
    }

    #[test]
    fn test_eval_division_by_zero_is_ieee() {
        assert_eq!(eval("1 / 0").unwrap(), f64::INFINITY);
        assert!(eval("0 / 0").unwrap().is_nan());
    }

    #[test]
    fn test_eval_comparison_uses_epsilon() {
        assert_eq!(eval("0.1 + 0.2 == 0.3").unwrap(), 1.0);
        assert_eq!(eval("0.1 + 0.2 > 0.3").unwrap(), 0.0);
        assert_eq!(eval("0.1 + 0.2 >= 0.3").unwrap(), 1.0);
        assert_eq!(eval("1 != 2").unwrap(), 1.0);
        assert_eq!(eval("1 < 2").unwrap(), 1.0);
        assert_eq!(eval("2 <= 1").unwrap(), 0.0);
    }

    #[test]
    fn test_eval_logical_short_circuit() {
        // right side would fail with an undefined symbol
        assert_eq!(eval("0 and missing").unwrap(), 0.0);
        assert_eq!(eval("1 or missing").unwrap(), 1.0);
        assert!(eval("1 and missing").is_err());
        assert_eq!(eval("2 and 3").unwrap(), 1.0);
    }

    #[test]
    fn test_eval_conditional_is_lazy() {
        assert_eq!(eval("1 > 0 ? 10 : missing").unwrap(), 10.0);
        assert_eq!(eval("1 < 0 ? missing : 20").unwrap(), 20.0);
    }

    #[test]
    fn test_eval_scope_variables() {
        let mut scope = EvaluationScope::new();
        scope.insert("cost".to_string(), 100.0);
        scope.insert("e".to_string(), 2.0);
        assert_eq!(eval_with("cost * 1.15", &scope).unwrap(), 115.0);
        // scope shadows constants
        assert_eq!(eval_with("e * 3", &scope).unwrap(), 6.0);
    }

    #[test]
    fn test_eval_constants() {
        assert_eq!(eval("pi").unwrap(), std::f64::consts::PI);
        assert_eq!(eval("true + true").unwrap(), 2.0);
    }

    #[test]
    fn test_eval_undefined_symbol() {
        let err = eval("unknown * 2").unwrap_err();
        assert_eq!(err.message, "Undefined symbol unknown");
    }

    #[test]
    fn test_eval_functions() {
        assert_eq!(eval("max(1, 5, 3)").unwrap(), 5.0);
        assert_eq!(eval("round(2.567, 2)").unwrap(), 2.57);
        assert_eq!(eval("if(2 > 1, 7, 8)").unwrap(), 7.0);
        assert_eq!(eval("abs(-3) + sqrt(16)").unwrap(), 7.0);
    }

    #[test]
    fn test_eval_long_chains() {
        let sum = vec!["1"; 20_000].join("+");
        assert_eq!(eval(&sum).unwrap(), 20_000.0);

        let mixed = format!("{} - 5 * 2", vec!["2"; 10_000].join(" * 1 + "));
        assert_eq!(eval(&mixed).unwrap(), 19_990.0);

        let ands = vec!["1"; 5_000].join(" and ");
        assert_eq!(eval(&ands).unwrap(), 1.0);
        // short-circuit still skips the undefined tail
        assert_eq!(eval(&format!("0 and {} and missing", ands)).unwrap(), 0.0);
    }

    #[test]
    fn test_eval_unknown_function() {
        let err = eval("system(1)").unwrap_err();
        assert_eq!(err.message, "Undefined function system");
    }

    #[test]
    fn test_eval_disabled_capabilities() {
        for name in ["import", "evaluate", "parse", "compile", "createUnit", "help"] {
            let err = eval(&format!("{}(1)", name)).unwrap_err();
            assert!(
                err.message.contains("disabled"),
                "{} should be disabled, got {}",
                name,
                err.message
            );
        }
    }
}
