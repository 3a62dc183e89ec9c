//! Predicate evaluation for projector store queries.

use std::cmp::Ordering;

use serde_json::Value as JsonValue;

use folio_events::{Condition, Operator, State};

/// Evaluate `condition` against a field value (a missing field reads as `null`).
///
/// Numbers compare numerically, strings lexicographically and booleans
/// `false < true`; ordering operators are false across mismatched types.
/// `in`/`nin` expect an array value and fall back to `eq`/`neq` otherwise.
pub fn evaluate(condition: &Condition, field: Option<&JsonValue>) -> bool {
    let field = field.unwrap_or(&JsonValue::Null);
    let value = &condition.value;

    match condition.operator {
        Operator::Eq => loose_eq(field, value),
        Operator::Neq => !loose_eq(field, value),
        Operator::Lt => compare(field, value) == Some(Ordering::Less),
        Operator::Lte => matches!(compare(field, value), Some(Ordering::Less | Ordering::Equal)),
        Operator::Gt => compare(field, value) == Some(Ordering::Greater),
        Operator::Gte => matches!(
            compare(field, value),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Operator::In => contains(value, field),
        Operator::Nin => !contains(value, field),
    }
}

/// Whether every `(key, value)` of `filter` equals the same key of `state`.
///
/// Values are compared by their textual form, so `1` and `"1"` match. This is
/// the equality used by projection commits; richer predicates go through
/// [`evaluate`].
pub fn matches_filter(state: &State, filter: &State) -> bool {
    filter.iter().all(|(key, expected)| {
        state
            .get(key)
            .is_some_and(|actual| key_text(actual) == key_text(expected))
    })
}

/// Textual form of a JSON value used for keys and filter equality.
pub fn key_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn loose_eq(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
        (JsonValue::Bool(x), JsonValue::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn contains(values: &JsonValue, field: &JsonValue) -> bool {
    match values {
        JsonValue::Array(items) => items.iter().any(|v| loose_eq(field, v)),
        other => loose_eq(field, other),
    }
}
