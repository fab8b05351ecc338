//! Placeholder resolution
//!
//! Turns `{field}` tokens into sandbox identifiers bound in an
//! [`EvaluationScope`]. Substitution is a single regex pass over the original
//! formula that swaps each whole `{token}` match, so `{a}` can never touch the
//! inside of `{ab}`.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::sandbox::EvaluationScope;
use crate::types::{Record, RecordValue};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\w+)\}").expect("placeholder pattern is a valid regex"));

/// A formula with placeholders swapped for scope identifiers
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFormula {
    pub expression: String,
    pub scope: EvaluationScope,
}

/// Field names referenced by `{field}` tokens, in order of first appearance
pub fn extract_placeholders(formula: &str) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(formula) {
        let field = &caps[1];
        if !fields.iter().any(|f| f == field) {
            fields.push(field.to_string());
        }
    }
    fields
}

/// Identifier a field is bound to inside the sandbox.
///
/// Field names that are already valid identifiers are used as-is; others
/// (e.g. `2024_total`) get a positional alias.
fn identifier_for(field: &str, index: usize) -> String {
    let starts_ok = field
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_');
    let all_ok = field.chars().all(|c| c.is_alphanumeric() || c == '_');
    let keyword = matches!(field, "and" | "or" | "not");
    if starts_ok && all_ok && !keyword && !field.starts_with("__f") {
        field.to_string()
    } else {
        format!("__f{}", index)
    }
}

/// Build the scope and placeholder-free expression for one record
pub fn resolve(formula: &str, record: &Record) -> ResolvedFormula {
    let fields = extract_placeholders(formula);

    let mut identifiers: HashMap<&str, String> = HashMap::with_capacity(fields.len());
    let mut scope = EvaluationScope::with_capacity(fields.len());

    for (index, field) in fields.iter().enumerate() {
        let ident = identifier_for(field, index);
        scope.insert(ident.clone(), coerce_number(record.get(field.as_str())));
        identifiers.insert(field.as_str(), ident);
    }

    // Padded so adjacent tokens like `{a}{b}` or `{cost}2` stay separate
    let expression = PLACEHOLDER
        .replace_all(formula, |caps: &Captures<'_>| {
            let ident = identifiers.get(&caps[1]).map_or(&caps[1], String::as_str);
            format!(" {} ", ident)
        })
        .into_owned();

    ResolvedFormula { expression, scope }
}

/// Coerce a raw field value to a number.
///
/// Missing, null and unparseable values become `0`. This is a lenient
/// policy: bad data degrades to zero instead of failing the record.
pub fn coerce_number(value: Option<&RecordValue>) -> f64 {
    let n = match value {
        None | Some(RecordValue::Null) => 0.0,
        Some(RecordValue::Number(n)) => *n,
        Some(RecordValue::Boolean(b)) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Some(RecordValue::Text(s)) => parse_numeric_text(s),
        Some(RecordValue::Date(d)) => d.timestamp_millis() as f64,
        Some(RecordValue::List(items)) => match items.as_slice() {
            [] => 0.0,
            [single] => coerce_number(Some(single)),
            _ => f64::NAN,
        },
        Some(RecordValue::Object(_)) => f64::NAN,
    };
    if n.is_nan() {
        0.0
    } else {
        n
    }
}

/// Numeric reading of a text field; NaN when it is not a number
fn parse_numeric_text(text: &str) -> f64 {
    let s = text.trim();
    if s.is_empty() {
        return 0.0;
    }

    match s {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }

    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = s.strip_prefix(prefix) {
            return u64::from_str_radix(digits, radix)
                .map(|v| v as f64)
                .unwrap_or(f64::NAN);
        }
    }

    // Rust accepts spellings ("inf", "nan") that are not numbers here
    let plain = s
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if !plain {
        return f64::NAN;
    }
    s.parse::<f64>().unwrap_or(f64::NAN)
}
