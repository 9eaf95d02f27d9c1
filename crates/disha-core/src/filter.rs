//! Structured filter expressions over collection fields.
//!
//! The tree shape and serialized form match the vector database's wire
//! format: `must`/`must_not` clause lists, each clause a field key plus an
//! exact match, full-text match, set membership, or numeric/date range.
//!
//! Planner output is untrusted, so construction from model JSON is
//! defensive: unrecognized clauses are dropped, never propagated as
//! errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::schema::DOC_ID_FIELD;

/// Match condition on a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchValue {
    /// Exact value match
    Value(Value),
    /// Full-text match
    Text(String),
    /// Membership in a value set
    Any(Vec<String>),
}

/// Numeric or date range bounds. Unset bounds are omitted on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RangeCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<f64>,
}

impl RangeCondition {
    pub fn is_empty(&self) -> bool {
        self.lt.is_none() && self.lte.is_none() && self.gt.is_none() && self.gte.is_none()
    }
}

/// One filter clause: a field key plus exactly one condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub key: String,
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub match_value: Option<MatchValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<RangeCondition>,
}

impl Condition {
    pub fn match_value(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            match_value: Some(MatchValue::Value(value)),
            range: None,
        }
    }

    pub fn match_text(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            match_value: Some(MatchValue::Text(text.into())),
            range: None,
        }
    }

    pub fn match_any(key: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            key: key.into(),
            match_value: Some(MatchValue::Any(values)),
            range: None,
        }
    }

    pub fn range(key: impl Into<String>, range: RangeCondition) -> Self {
        Self {
            key: key.into(),
            match_value: None,
            range: Some(range),
        }
    }
}

/// Boolean filter tree: all `must` clauses hold, no `must_not` clause
/// holds.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must_not: Vec<Condition>,
}

impl Filter {
    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.must_not.is_empty()
    }

    /// Membership filter used by the content resolver: doc_id in `ids`.
    pub fn doc_id_in(ids: Vec<String>) -> Self {
        Self {
            must: vec![Condition::match_any(DOC_ID_FIELD, ids)],
            must_not: Vec::new(),
        }
    }

    /// Whether the existence clause (non-empty doc_id) is already present.
    pub fn has_existence_clause(&self) -> bool {
        self.must_not.iter().any(|c| {
            c.key == DOC_ID_FIELD
                && matches!(&c.match_value, Some(MatchValue::Value(v)) if v == &Value::String(String::new()))
        })
    }

    /// Add the mandatory existence clause unless already present. Every
    /// filter applied to a curated search excludes documents with an
    /// empty doc_id.
    pub fn with_existence_clause(mut self) -> Self {
        if !self.has_existence_clause() {
            self.must_not
                .push(Condition::match_value(DOC_ID_FIELD, Value::String(String::new())));
        }
        self
    }

    /// Build a filter from planner-emitted JSON. The input is untrusted:
    /// anything that is not a recognizable clause is dropped.
    pub fn from_planner_value(value: &Value) -> Self {
        Self {
            must: parse_clause_list(value.get("must")),
            must_not: parse_clause_list(value.get("must_not")),
        }
    }
}

fn parse_clause_list(value: Option<&Value>) -> Vec<Condition> {
    let Some(entries) = value.and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| match parse_clause(entry) {
            Some(condition) => Some(condition),
            None => {
                debug!("Dropping unrecognized filter clause: {}", entry);
                None
            }
        })
        .collect()
}

fn parse_clause(entry: &Value) -> Option<Condition> {
    let key = entry.get("key")?.as_str()?.to_string();

    if let Some(m) = entry.get("match") {
        let match_value = if let Some(text) = m.get("text").and_then(|t| t.as_str()) {
            MatchValue::Text(text.to_string())
        } else if let Some(any) = m.get("any").and_then(|a| a.as_array()) {
            MatchValue::Any(
                any.iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect(),
            )
        } else if let Some(value) = m.get("value") {
            MatchValue::Value(value.clone())
        } else {
            return None;
        };
        return Some(Condition {
            key,
            match_value: Some(match_value),
            range: None,
        });
    }

    if let Some(r) = entry.get("range") {
        let range = RangeCondition {
            lt: r.get("lt").and_then(|v| v.as_f64()),
            lte: r.get("lte").and_then(|v| v.as_f64()),
            gt: r.get("gt").and_then(|v| v.as_f64()),
            gte: r.get("gte").and_then(|v| v.as_f64()),
        };
        if range.is_empty() {
            return None;
        }
        return Some(Condition {
            key,
            match_value: None,
            range: Some(range),
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format_match_text() {
        let filter = Filter {
            must: vec![Condition::match_text("content_type", "acts")],
            must_not: Vec::new(),
        };
        let wire = serde_json::to_value(&filter).unwrap();
        assert_eq!(
            wire,
            json!({"must": [{"key": "content_type", "match": {"text": "acts"}}]})
        );
    }

    #[test]
    fn test_wire_format_range_and_existence() {
        let filter = Filter {
            must: vec![Condition::range(
                "year",
                RangeCondition {
                    lte: Some(2009.0),
                    ..Default::default()
                },
            )],
            must_not: Vec::new(),
        }
        .with_existence_clause();

        let wire = serde_json::to_value(&filter).unwrap();
        assert_eq!(
            wire,
            json!({
                "must": [{"key": "year", "range": {"lte": 2009.0}}],
                "must_not": [{"key": "doc_id", "match": {"value": ""}}]
            })
        );
    }

    #[test]
    fn test_existence_clause_is_idempotent() {
        let filter = Filter::default()
            .with_existence_clause()
            .with_existence_clause();
        assert_eq!(filter.must_not.len(), 1);
        assert!(filter.has_existence_clause());
    }

    #[test]
    fn test_doc_id_membership() {
        let filter = Filter::doc_id_in(vec!["d1".into(), "d2".into()]);
        assert_eq!(
            filter.must,
            vec![Condition::match_any("doc_id", vec!["d1".into(), "d2".into()])]
        );
    }

    #[test]
    fn test_from_planner_value_parses_known_shapes() {
        let raw = json!({
            "must": [
                {"key": "Category", "match": {"text": "acts"}},
                {"key": "year", "range": {"lte": 2009}}
            ],
            "must_not": [
                {"key": "doc_id", "match": {"value": ""}}
            ]
        });

        let filter = Filter::from_planner_value(&raw);
        assert_eq!(filter.must.len(), 2);
        assert_eq!(filter.must[0], Condition::match_text("Category", "acts"));
        assert_eq!(filter.must[1].range.unwrap().lte, Some(2009.0));
        assert!(filter.has_existence_clause());
    }

    #[test]
    fn test_from_planner_value_drops_garbage() {
        let raw = json!({
            "must": [
                {"no_key": true},
                {"key": "year"},
                {"key": "year", "range": {}},
                {"key": "state", "match": {"text": "GOA"}},
                "not even an object"
            ]
        });

        let filter = Filter::from_planner_value(&raw);
        assert_eq!(filter.must, vec![Condition::match_text("state", "GOA")]);
    }

    #[test]
    fn test_from_planner_value_non_object() {
        let filter = Filter::from_planner_value(&json!("nonsense"));
        assert!(filter.is_empty());
    }
}
