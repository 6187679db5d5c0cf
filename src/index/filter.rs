//! Metadata predicate builder.
//!
//! Criteria keys select a field and an operator by suffix: `<field>_after`,
//! `<field>_before`, `<field>_contains`, or a bare `<field>` for equality.
//! A chunk passes only if every criterion holds; a missing field or an
//! incomparable value pair rejects the chunk.

use serde_json::Value;
use std::cmp::Ordering;

use crate::models::Chunk;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    After,
    Before,
    Contains,
    Equals,
}

#[derive(Debug, Clone)]
struct Criterion {
    field: String,
    op: Op,
    value: Value,
}

#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    criteria: Vec<Criterion>,
}

impl MetadataFilter {
    /// Build a filter from `key -> value` criteria, e.g.
    /// `{"created_at_after": "2023-01-01", "name_contains": "report"}`.
    pub fn new(criteria: impl IntoIterator<Item = (String, Value)>) -> Self {
        let criteria = criteria
            .into_iter()
            .map(|(key, value)| {
                let (field, op) = if let Some(field) = key.strip_suffix("_after") {
                    (field.to_string(), Op::After)
                } else if let Some(field) = key.strip_suffix("_before") {
                    (field.to_string(), Op::Before)
                } else if let Some(field) = key.strip_suffix("_contains") {
                    (field.to_string(), Op::Contains)
                } else {
                    (key, Op::Equals)
                };
                Criterion { field, op, value }
            })
            .collect();
        Self { criteria }
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn matches(&self, chunk: &Chunk) -> bool {
        self.criteria.iter().all(|criterion| {
            resolve_field(chunk, &criterion.field)
                .map(|actual| evaluate(criterion.op, &actual, &criterion.value))
                .unwrap_or(false)
        })
    }
}

/// Look a field up on the chunk metadata: the two built-in fields first,
/// then the open-ended extras.
fn resolve_field(chunk: &Chunk, field: &str) -> Option<Value> {
    match field {
        "name" => Some(Value::String(chunk.metadata.name.clone())),
        "created_at" => Some(Value::String(chunk.metadata.created_at.to_rfc3339())),
        other => chunk.metadata.extra.get(other).cloned(),
    }
}

fn evaluate(op: Op, actual: &Value, expected: &Value) -> bool {
    match op {
        Op::After => compare(actual, expected) == Some(Ordering::Greater),
        Op::Before => compare(actual, expected) == Some(Ordering::Less),
        Op::Contains => contains(actual, expected),
        Op::Equals => actual == expected,
    }
}

/// Order two JSON values when they are of a comparable kind. Numbers compare
/// numerically; strings lexicographically (RFC 3339 timestamps therefore
/// order chronologically).
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64()?, y.as_f64()?);
            x.partial_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => Some(x.as_str().cmp(y.as_str())),
        _ => None,
    }
}

fn contains(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
        (Value::Array(items), needle) => items.contains(needle),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn chunk_with(name: &str, year: i32, extra: &[(&str, Value)]) -> Chunk {
        let mut metadata = ChunkMetadata::named(name);
        metadata.created_at = Utc.with_ymd_and_hms(year, 6, 15, 12, 0, 0).unwrap();
        for (k, v) in extra {
            metadata.extra.insert(k.to_string(), v.clone());
        }
        Chunk::new("text".into(), vec![0.0, 0.0], metadata)
    }

    fn filter(pairs: &[(&str, Value)]) -> MetadataFilter {
        MetadataFilter::new(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())))
    }

    #[test]
    fn equality_on_name() {
        let f = filter(&[("name", json!("report"))]);
        assert!(f.matches(&chunk_with("report", 2023, &[])));
        assert!(!f.matches(&chunk_with("summary", 2023, &[])));
    }

    #[test]
    fn contains_on_name() {
        let f = filter(&[("name_contains", json!("port"))]);
        assert!(f.matches(&chunk_with("quarterly report", 2023, &[])));
        assert!(!f.matches(&chunk_with("summary", 2023, &[])));
    }

    #[test]
    fn created_at_window() {
        let after = filter(&[("created_at_after", json!("2022-12-31"))]);
        assert!(after.matches(&chunk_with("a", 2023, &[])));
        assert!(!after.matches(&chunk_with("a", 2021, &[])));

        let before = filter(&[("created_at_before", json!("2022-01-01"))]);
        assert!(before.matches(&chunk_with("a", 2021, &[])));
        assert!(!before.matches(&chunk_with("a", 2023, &[])));
    }

    #[test]
    fn numeric_comparison_on_extra_field() {
        let f = filter(&[("page_after", json!(3))]);
        assert!(f.matches(&chunk_with("a", 2023, &[("page", json!(5))])));
        assert!(!f.matches(&chunk_with("a", 2023, &[("page", json!(2))])));
        assert!(!f.matches(&chunk_with("a", 2023, &[("page", json!(3))])));
    }

    #[test]
    fn array_membership_via_contains() {
        let f = filter(&[("tags_contains", json!("draft"))]);
        assert!(f.matches(&chunk_with("a", 2023, &[("tags", json!(["draft", "q2"]))])));
        assert!(!f.matches(&chunk_with("a", 2023, &[("tags", json!(["final"]))])));
    }

    #[test]
    fn missing_field_rejects() {
        let f = filter(&[("owner", json!("alice"))]);
        assert!(!f.matches(&chunk_with("a", 2023, &[])));
        // A suffix that resolves to a nonexistent field behaves the same way.
        let f = filter(&[("owner_contains", json!("ali"))]);
        assert!(!f.matches(&chunk_with("a", 2023, &[])));
    }

    #[test]
    fn all_criteria_must_hold() {
        let f = filter(&[
            ("name_contains", json!("report")),
            ("page_after", json!(1)),
        ]);
        assert!(f.matches(&chunk_with("report", 2023, &[("page", json!(2))])));
        assert!(!f.matches(&chunk_with("report", 2023, &[("page", json!(1))])));
    }

    #[test]
    fn incomparable_values_reject() {
        let f = filter(&[("page_after", json!("three"))]);
        assert!(!f.matches(&chunk_with("a", 2023, &[("page", json!(5))])));
    }

    #[test]
    fn empty_filter_accepts_everything() {
        let f = MetadataFilter::default();
        assert!(f.matches(&chunk_with("anything", 2023, &[])));
    }
}
