//! Allow-listed sandbox functions
//!
//! Every callable name lives in a [`FunctionRegistry`]. Nothing outside the
//! registry can be invoked, and names from [`DISABLED_CAPABILITIES`] can never
//! be registered.

use std::collections::BTreeMap;

use super::evaluator::EvalError;
use crate::config::NumericConfig;

/// Native implementation of a sandbox function
pub type NativeFn = fn(&[f64], &NumericConfig) -> Result<f64, EvalError>;

/// Names that are never callable, whatever the registry contains.
///
/// These are the entry points a general-purpose expression engine exposes for
/// code generation, module loading, re-entrant parsing and introspection.
pub const DISABLED_CAPABILITIES: &[&str] = &[
    "import",
    "createUnit",
    "evaluate",
    "parse",
    "compile",
    "simplify",
    "derivative",
    "resolve",
    "help",
    "chain",
    "reviver",
    "replacer",
    "config",
    "typed",
    "eval",
    "Function",
    "require",
];

/// Returns true when `name` is a disabled capability
pub fn is_disabled(name: &str) -> bool {
    DISABLED_CAPABILITIES.contains(&name)
}

/// Signature and implementation of one allowed function
#[derive(Clone, Copy)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub min_args: usize,
    /// `None` means variadic
    pub max_args: Option<usize>,
    pub description: &'static str,
    pub eval: NativeFn,
}

impl std::fmt::Debug for FunctionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionSpec")
            .field("name", &self.name)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .finish()
    }
}

impl FunctionSpec {
    pub const fn new(
        name: &'static str,
        min_args: usize,
        max_args: Option<usize>,
        description: &'static str,
        eval: NativeFn,
    ) -> Self {
        Self {
            name,
            min_args,
            max_args,
            description,
            eval,
        }
    }

    /// Check the argument count and run the function
    pub fn call(&self, args: &[f64], numeric: &NumericConfig) -> Result<f64, EvalError> {
        let count = args.len();
        let too_many = self.max_args.is_some_and(|max| count > max);
        if count < self.min_args || too_many {
            let expected = match self.max_args {
                Some(max) if max == self.min_args => format!("{}", max),
                Some(max) => format!("{} to {}", self.min_args, max),
                None => format!("at least {}", self.min_args),
            };
            return Err(EvalError::new(format!(
                "Wrong number of arguments in function {} ({} provided, {} expected)",
                self.name, count, expected
            )));
        }
        (self.eval)(args, numeric)
    }
}

/// The set of callable functions, keyed by name
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: BTreeMap<&'static str, FunctionSpec>,
}

impl FunctionRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in function
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for spec in BUILTINS {
            registry.functions.insert(spec.name, *spec);
        }
        registry
    }

    /// Add a function. Disabled capability names are refused.
    pub fn register(&mut self, spec: FunctionSpec) -> Result<(), EvalError> {
        if is_disabled(spec.name) {
            return Err(EvalError::new(format!(
                "Function {} is disabled in the sandbox and cannot be registered",
                spec.name
            )));
        }
        self.functions.insert(spec.name, spec);
        Ok(())
    }

    /// Remove a function; returns whether it was present
    pub fn remove(&mut self, name: &str) -> bool {
        self.functions.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&FunctionSpec> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Function names in alphabetical order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.functions.keys().copied()
    }

    pub fn specs(&self) -> impl Iterator<Item = &FunctionSpec> {
        self.functions.values()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Relative comparison with an absolute floor at machine epsilon
pub fn nearly_equal(a: f64, b: f64, epsilon: f64) -> bool {
    if a == b {
        return true;
    }
    if a.is_nan() || b.is_nan() || !a.is_finite() || !b.is_finite() {
        return false;
    }
    let diff = (a - b).abs();
    if diff < f64::EPSILON {
        return true;
    }
    diff <= a.abs().max(b.abs()) * epsilon
}

/// Round `value` to `digits` decimals (digits already validated)
pub fn round_to(value: f64, digits: i32) -> f64 {
    let multiplier = 10_f64.powi(digits);
    let scaled = value * multiplier;
    // Too large to carry that many decimals; already a whole number
    if !scaled.is_finite() {
        return value;
    }
    scaled.round() / multiplier
}

/// Remainder with the sign of the divisor; zero divisor is an error
pub fn modulo(value: f64, divisor: f64) -> Result<f64, EvalError> {
    if divisor == 0.0 {
        return Err(EvalError::new("mod: Division by zero"));
    }
    Ok(value - divisor * (value / divisor).floor())
}

fn abs(args: &[f64], _: &NumericConfig) -> Result<f64, EvalError> {
    Ok(args[0].abs())
}

fn ceil(args: &[f64], numeric: &NumericConfig) -> Result<f64, EvalError> {
    let x = args[0];
    if nearly_equal(x, x.round(), numeric.epsilon) {
        Ok(x.round())
    } else {
        Ok(x.ceil())
    }
}

fn floor(args: &[f64], numeric: &NumericConfig) -> Result<f64, EvalError> {
    let x = args[0];
    if nearly_equal(x, x.round(), numeric.epsilon) {
        Ok(x.round())
    } else {
        Ok(x.floor())
    }
}

fn round(args: &[f64], numeric: &NumericConfig) -> Result<f64, EvalError> {
    let digits = args.get(1).copied().unwrap_or(0.0);
    if digits.fract() != 0.0 || digits < 0.0 || digits > f64::from(numeric.precision) {
        return Err(EvalError::new(format!(
            "round: digits must be an integer between 0 and {}",
            numeric.precision
        )));
    }
    Ok(round_to(args[0], digits as i32))
}

fn trunc(args: &[f64], _: &NumericConfig) -> Result<f64, EvalError> {
    Ok(args[0].trunc())
}

fn sign(args: &[f64], _: &NumericConfig) -> Result<f64, EvalError> {
    let x = args[0];
    Ok(if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    })
}

fn sqrt(args: &[f64], _: &NumericConfig) -> Result<f64, EvalError> {
    if args[0] < 0.0 {
        return Err(EvalError::new(
            "sqrt: Cannot compute square root of negative number",
        ));
    }
    Ok(args[0].sqrt())
}

fn cbrt(args: &[f64], _: &NumericConfig) -> Result<f64, EvalError> {
    Ok(args[0].cbrt())
}

fn exp(args: &[f64], _: &NumericConfig) -> Result<f64, EvalError> {
    Ok(args[0].exp())
}

fn log(args: &[f64], _: &NumericConfig) -> Result<f64, EvalError> {
    let x = args[0];
    if x <= 0.0 {
        return Err(EvalError::new("log: Argument must be positive"));
    }
    match args.get(1) {
        None => Ok(x.ln()),
        Some(&base) if base > 0.0 && base != 1.0 => Ok(x.ln() / base.ln()),
        Some(_) => Err(EvalError::new("log: Base must be positive and not 1")),
    }
}

fn log10(args: &[f64], _: &NumericConfig) -> Result<f64, EvalError> {
    if args[0] <= 0.0 {
        return Err(EvalError::new("log10: Argument must be positive"));
    }
    Ok(args[0].log10())
}

fn log2(args: &[f64], _: &NumericConfig) -> Result<f64, EvalError> {
    if args[0] <= 0.0 {
        return Err(EvalError::new("log2: Argument must be positive"));
    }
    Ok(args[0].log2())
}

fn pow(args: &[f64], _: &NumericConfig) -> Result<f64, EvalError> {
    Ok(args[0].powf(args[1]))
}

fn modulo_fn(args: &[f64], _: &NumericConfig) -> Result<f64, EvalError> {
    modulo(args[0], args[1])
}

fn min(args: &[f64], _: &NumericConfig) -> Result<f64, EvalError> {
    Ok(args.iter().copied().fold(f64::INFINITY, f64::min))
}

fn max(args: &[f64], _: &NumericConfig) -> Result<f64, EvalError> {
    Ok(args.iter().copied().fold(f64::NEG_INFINITY, f64::max))
}

fn sum(args: &[f64], _: &NumericConfig) -> Result<f64, EvalError> {
    Ok(args.iter().sum())
}

fn mean(args: &[f64], _: &NumericConfig) -> Result<f64, EvalError> {
    Ok(args.iter().sum::<f64>() / args.len() as f64)
}

fn median(args: &[f64], _: &NumericConfig) -> Result<f64, EvalError> {
    let mut sorted = args.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Ok((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Ok(sorted[mid])
    }
}

fn clamp(args: &[f64], _: &NumericConfig) -> Result<f64, EvalError> {
    let (x, lo, hi) = (args[0], args[1], args[2]);
    if lo > hi {
        return Err(EvalError::new("clamp: min must not exceed max"));
    }
    Ok(x.max(lo).min(hi))
}

fn hypot(args: &[f64], _: &NumericConfig) -> Result<f64, EvalError> {
    Ok(args.iter().map(|x| x * x).sum::<f64>().sqrt())
}

fn if_fn(args: &[f64], _: &NumericConfig) -> Result<f64, EvalError> {
    Ok(if args[0] != 0.0 && !args[0].is_nan() {
        args[1]
    } else {
        args[2]
    })
}

fn sin(args: &[f64], _: &NumericConfig) -> Result<f64, EvalError> {
    Ok(args[0].sin())
}

fn cos(args: &[f64], _: &NumericConfig) -> Result<f64, EvalError> {
    Ok(args[0].cos())
}

fn tan(args: &[f64], _: &NumericConfig) -> Result<f64, EvalError> {
    Ok(args[0].tan())
}

fn asin(args: &[f64], _: &NumericConfig) -> Result<f64, EvalError> {
    Ok(args[0].asin())
}

fn acos(args: &[f64], _: &NumericConfig) -> Result<f64, EvalError> {
    Ok(args[0].acos())
}

fn atan(args: &[f64], _: &NumericConfig) -> Result<f64, EvalError> {
    Ok(args[0].atan())
}

fn atan2(args: &[f64], _: &NumericConfig) -> Result<f64, EvalError> {
    Ok(args[0].atan2(args[1]))
}

const BUILTINS: &[FunctionSpec] = &[
    // Rounding & sign
    FunctionSpec::new("abs", 1, Some(1), "Absolute value", abs),
    FunctionSpec::new("ceil", 1, Some(1), "Round up to an integer", ceil),
    FunctionSpec::new("floor", 1, Some(1), "Round down to an integer", floor),
    FunctionSpec::new("round", 1, Some(2), "Round to n decimals", round),
    FunctionSpec::new("trunc", 1, Some(1), "Drop the fractional part", trunc),
    FunctionSpec::new("fix", 1, Some(1), "Round towards zero", trunc),
    FunctionSpec::new("sign", 1, Some(1), "Sign of a number (-1, 0, 1)", sign),
    // Powers & logarithms
    FunctionSpec::new("sqrt", 1, Some(1), "Square root", sqrt),
    FunctionSpec::new("cbrt", 1, Some(1), "Cube root", cbrt),
    FunctionSpec::new("exp", 1, Some(1), "e raised to x", exp),
    FunctionSpec::new("log", 1, Some(2), "Natural log, or log in a base", log),
    FunctionSpec::new("log10", 1, Some(1), "Base-10 logarithm", log10),
    FunctionSpec::new("log2", 1, Some(1), "Base-2 logarithm", log2),
    FunctionSpec::new("pow", 2, Some(2), "x raised to y", pow),
    FunctionSpec::new("mod", 2, Some(2), "Remainder with divisor sign", modulo_fn),
    // Aggregates over arguments
    FunctionSpec::new("min", 1, None, "Smallest argument", min),
    FunctionSpec::new("max", 1, None, "Largest argument", max),
    FunctionSpec::new("sum", 1, None, "Sum of arguments", sum),
    FunctionSpec::new("mean", 1, None, "Arithmetic mean", mean),
    FunctionSpec::new("avg", 1, None, "Arithmetic mean", mean),
    FunctionSpec::new("median", 1, None, "Median of arguments", median),
    FunctionSpec::new("clamp", 3, Some(3), "Limit x to [min, max]", clamp),
    FunctionSpec::new("hypot", 1, None, "Euclidean norm", hypot),
    // Logic
    FunctionSpec::new("if", 3, Some(3), "if(condition, then, else)", if_fn),
    // Trigonometry
    FunctionSpec::new("sin", 1, Some(1), "Sine", sin),
    FunctionSpec::new("cos", 1, Some(1), "Cosine", cos),
    FunctionSpec::new("tan", 1, Some(1), "Tangent", tan),
    FunctionSpec::new("asin", 1, Some(1), "Inverse sine", asin),
    FunctionSpec::new("acos", 1, Some(1), "Inverse cosine", acos),
    FunctionSpec::new("atan", 1, Some(1), "Inverse tangent", atan),
    FunctionSpec::new("atan2", 2, Some(2), "Two-argument inverse tangent", atan2),
];
