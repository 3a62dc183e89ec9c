//! Projection model: the changes a projector wants applied to a read model,
//! the records a projector store keeps, and the query language over them.
//!
//! Read models are **disposable**; events are the source of truth. A
//! projector turns each committed event into a [`Projection`] (a set of
//! conditional upserts and deletes), and the projector store applies it under
//! the event's global id as watermark.
//!
//! ## Idempotency
//!
//! Every stored record carries the watermark of the last commit that touched
//! it. A commit only affects records whose watermark is strictly lower than
//! its own, so redelivering an event (at-least-once delivery) never applies
//! the same change to a record twice.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Projection state: a flat JSON object. Every stored state has a string `id`.
pub type State = serde_json::Map<String, JsonValue>;

/// Conditional upsert: merge `values` into every eligible record matching `filter`.
///
/// When `filter` contains an `id` that has no record yet, the store seeds one
/// first so the match can find it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Upsert {
    #[serde(rename = "where")]
    pub filter: State,
    pub values: State,
}

/// Conditional delete: remove every eligible record matching `filter`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delete {
    #[serde(rename = "where")]
    pub filter: State,
}

/// Changes produced by a projector for one event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub upserts: Vec<Upsert>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deletes: Vec<Delete>,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(mut self, filter: State, values: State) -> Self {
        self.upserts.push(Upsert { filter, values });
        self
    }

    pub fn delete(mut self, filter: State) -> Self {
        self.deletes.push(Delete { filter });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }
}

/// A stored projection row and the watermark of the last commit applied to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionRecord {
    pub state: State,
    pub watermark: i64,
}

impl ProjectionRecord {
    pub fn id(&self) -> Option<&str> {
        self.state.get("id").and_then(JsonValue::as_str)
    }
}

/// Rows affected by one `where` clause of a commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitCount {
    #[serde(rename = "where")]
    pub filter: State,
    pub count: usize,
}

/// Outcome of a projector store commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionResults {
    pub upserted: Vec<CommitCount>,
    pub deleted: Vec<CommitCount>,
    pub watermark: i64,
}

impl ProjectionResults {
    pub fn new(watermark: i64) -> Self {
        Self {
            upserted: Vec::new(),
            deleted: Vec::new(),
            watermark,
        }
    }

    /// Total number of rows upserted or deleted.
    pub fn affected(&self) -> usize {
        self.upserted.iter().chain(&self.deleted).map(|c| c.count).sum()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    Nin,
}

/// A single field predicate of a [`ProjectionQuery`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub operator: Operator,
    pub value: JsonValue,
}

impl Condition {
    pub fn new(operator: Operator, value: impl Into<JsonValue>) -> Self {
        Self {
            operator,
            value: value.into(),
        }
    }

    pub fn eq(value: impl Into<JsonValue>) -> Self {
        Self::new(Operator::Eq, value)
    }

    pub fn neq(value: impl Into<JsonValue>) -> Self {
        Self::new(Operator::Neq, value)
    }

    pub fn lt(value: impl Into<JsonValue>) -> Self {
        Self::new(Operator::Lt, value)
    }

    pub fn lte(value: impl Into<JsonValue>) -> Self {
        Self::new(Operator::Lte, value)
    }

    pub fn gt(value: impl Into<JsonValue>) -> Self {
        Self::new(Operator::Gt, value)
    }

    pub fn gte(value: impl Into<JsonValue>) -> Self {
        Self::new(Operator::Gte, value)
    }

    pub fn is_in(values: impl Into<JsonValue>) -> Self {
        Self::new(Operator::In, values)
    }

    pub fn not_in(values: impl Into<JsonValue>) -> Self {
        Self::new(Operator::Nin, values)
    }
}

/// Predicate scan over a projector store.
///
/// All conditions must hold for a record to match. Sorting and field
/// selection are not supported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectionQuery {
    #[serde(rename = "where", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filter: BTreeMap<String, Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl ProjectionQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: impl Into<String>, condition: Condition) -> Self {
        self.filter.insert(field.into(), condition);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(value: JsonValue) -> State {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn projection_uses_where_on_the_wire() {
        let p = Projection::new()
            .upsert(state(json!({ "id": "a" })), state(json!({ "n": 1 })))
            .delete(state(json!({ "id": "b" })));

        let value = serde_json::to_value(&p).unwrap();
        assert_eq!(value["upserts"][0]["where"]["id"], json!("a"));
        assert_eq!(value["deletes"][0]["where"]["id"], json!("b"));

        let back: Projection = serde_json::from_value(value).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn query_parses_operators() {
        let q: ProjectionQuery = serde_json::from_value(json!({
            "where": { "total": { "operator": "gte", "value": 10 } },
            "limit": 5
        }))
        .unwrap();

        assert_eq!(q, ProjectionQuery::new().filter("total", Condition::gte(10)).limit(5));
    }

    #[test]
    fn results_sum_affected_rows() {
        let mut results = ProjectionResults::new(3);
        results.upserted.push(CommitCount { filter: State::new(), count: 2 });
        results.deleted.push(CommitCount { filter: State::new(), count: 1 });
        assert_eq!(results.affected(), 3);
    }
}
