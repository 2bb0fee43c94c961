// SPDX-License-Identifier: MIT

//! Selection and logsource matching against one log record.
//!
//! Field predicates use suffix modifiers on field names: bare `field` is
//! equality (membership when the value is a list), `field|contains` is a
//! case-insensitive substring test, `field|startswith` / `field|endswith`
//! the corresponding anchored forms. List-valued predicates are any-match.
//! String comparisons are case-insensitive throughout.

use serde_json::Value;
use tw_core::{LogRecord, LogSource, Selection};

/// Field-name modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Modifier {
    Equals,
    Contains,
    StartsWith,
    EndsWith,
}

fn split_field(field: &str) -> (&str, Modifier) {
    match field.rsplit_once('|') {
        Some((name, "contains")) => (name, Modifier::Contains),
        Some((name, "startswith")) => (name, Modifier::StartsWith),
        Some((name, "endswith")) => (name, Modifier::EndsWith),
        _ => (field, Modifier::Equals),
    }
}

/// Render a JSON scalar the way predicates compare it.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn scalar_matches(actual: &Value, expected: &Value, modifier: Modifier) -> bool {
    match modifier {
        Modifier::Equals => match (actual, expected) {
            // Strings compare case-insensitively; other scalars strictly.
            (Value::String(a), Value::String(b)) => a.eq_ignore_ascii_case(b),
            (a, b) => a == b,
        },
        Modifier::Contains | Modifier::StartsWith | Modifier::EndsWith => {
            let (Some(actual), Some(needle)) = (scalar_text(actual), scalar_text(expected)) else {
                return false;
            };
            let actual = actual.to_lowercase();
            let needle = needle.to_lowercase();
            match modifier {
                Modifier::Contains => actual.contains(&needle),
                Modifier::StartsWith => actual.starts_with(&needle),
                Modifier::EndsWith => actual.ends_with(&needle),
                Modifier::Equals => false,
            }
        }
    }
}

/// One field predicate: list values are any-match.
fn predicate_matches(actual: &Value, expected: &Value, modifier: Modifier) -> bool {
    match expected {
        Value::Array(options) => {
            options.iter().any(|option| scalar_matches(actual, option, modifier))
        }
        single => scalar_matches(actual, single, modifier),
    }
}

/// Whether one selection (a conjunction of field predicates) matches a log.
/// An empty selection never matches.
pub fn selection_matches(selection: &Selection, log: &LogRecord) -> bool {
    if selection.is_empty() {
        return false;
    }
    selection.iter().all(|(field, expected)| {
        let (name, modifier) = split_field(field);
        match log.field(name) {
            Some(actual) => predicate_matches(&actual, expected, modifier),
            None => false,
        }
    })
}

/// Whether a log passes the logsource pre-filter. Every provided selector
/// field must equal the log's corresponding attribute; absent fields are
/// wildcards.
pub fn logsource_matches(logsource: &LogSource, log: &LogRecord) -> bool {
    let field_equals = |field: &str, expected: &str| match log.field(field) {
        Some(Value::String(actual)) => actual.eq_ignore_ascii_case(expected),
        _ => false,
    };

    if let Some(product) = &logsource.product {
        if !field_equals("product", product) {
            return false;
        }
    }
    if let Some(service) = &logsource.service {
        if !field_equals("service", service) {
            return false;
        }
    }
    if let Some(category) = &logsource.category {
        if !field_equals("category", category) {
            return false;
        }
    }
    true
}

#[cfg(test)]
#[path = "matcher_tests.rs"]
mod tests;
