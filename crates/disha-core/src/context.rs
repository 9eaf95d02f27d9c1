//! Context assembly.
//!
//! Retrieved documents become one tagged text block the conversational
//! model can ground its answer in. Curated documents render as labeled
//! `key: value` lines; uncurated raw-data rows render as bare values,
//! their field names being machine-generated noise.

use serde_json::Value;

use crate::fusion::ScoredDocument;

/// Assemble retrieved documents into a `<documents>` context block.
/// Key order within a document is the payload map's iteration order,
/// so output is deterministic for a given result set.
pub fn assemble(curated: &[ScoredDocument], uncurated: &[ScoredDocument]) -> String {
    let mut context = String::from("<documents>\n");

    for doc in curated {
        context.push_str("<doc>");
        for (key, value) in &doc.payload {
            context.push_str(key);
            context.push_str(": ");
            context.push_str(&render(value));
            context.push('\n');
        }
        context.push_str("</doc>\n");
    }

    for doc in uncurated {
        context.push_str("<doc>");
        for value in doc.payload.values() {
            context.push_str(&render(value));
        }
        context.push_str("</doc>\n");
    }

    context.push_str("</documents>\n");
    context
}

/// Render a payload value as plain text: strings unquoted, everything
/// else in its JSON form.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn doc(payload: Value) -> ScoredDocument {
        let Value::Object(payload) = payload else {
            panic!("payload must be an object");
        };
        ScoredDocument {
            payload,
            score: 1.0,
        }
    }

    #[test]
    fn test_curated_docs_render_key_value_lines() {
        let context = assemble(
            &[doc(json!({"doc_id": "d1", "sector": "Education", "year": 2015}))],
            &[],
        );
        assert_eq!(
            context,
            "<documents>\n<doc>doc_id: d1\nsector: Education\nyear: 2015\n</doc>\n</documents>\n"
        );
    }

    #[test]
    fn test_uncurated_docs_render_values_only() {
        let context = assemble(
            &[],
            &[doc(json!({"a_col": "rainfall 820mm", "b_col": " in Kerala"}))],
        );
        assert_eq!(
            context,
            "<documents>\n<doc>rainfall 820mm in Kerala</doc>\n</documents>\n"
        );
    }

    #[test]
    fn test_curated_before_uncurated() {
        let context = assemble(
            &[doc(json!({"doc_id": "d1"}))],
            &[doc(json!({"value": "42"}))],
        );
        assert_eq!(
            context,
            "<documents>\n<doc>doc_id: d1\n</doc>\n<doc>42</doc>\n</documents>\n"
        );
    }

    #[test]
    fn test_empty_results_still_produce_block() {
        assert_eq!(assemble(&[], &[]), "<documents>\n</documents>\n");
    }

    #[test]
    fn test_non_string_values_render_as_json() {
        let mut payload = Map::new();
        payload.insert("tags".to_string(), json!(["a", "b"]));
        let context = assemble(
            &[ScoredDocument {
                payload,
                score: 1.0,
            }],
            &[],
        );
        assert!(context.contains("tags: [\"a\",\"b\"]\n"));
    }
}
