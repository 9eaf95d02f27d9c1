//! Query planner.
//!
//! Turns a free-text query plus a collection's field schema into a
//! retrieval plan: a short vector-search string and a structured filter.
//! The plan comes from a structured-output model call and is treated as
//! untrusted; any parse failure degrades to a fallback plan (the raw
//! query, no filter) instead of failing the turn.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::filter::Filter;
use crate::model::{ChatModel, ModelError};
use crate::schema::CollectionSchema;

/// One retrieval plan for one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalPlan {
    /// Short text sent to the embedding models
    pub vector_string: String,
    /// Structured filter over the collection's fields
    pub filter: Filter,
}

impl RetrievalPlan {
    /// Plan used when planning fails to parse: the raw query and no
    /// filter. Retrieval still works, just unfiltered.
    pub fn fallback(query: &str) -> Self {
        Self {
            vector_string: query.to_string(),
            filter: Filter::default(),
        }
    }
}

pub struct QueryPlanner {
    model: Arc<dyn ChatModel>,
}

impl QueryPlanner {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Plan retrieval for `query` against a collection's schema.
    ///
    /// Returns `Err` only when the model call itself fails. A response
    /// that comes back but does not parse yields the fallback plan.
    /// Parsed plans get the mandatory existence clause appended; the
    /// fallback plan keeps its empty filter.
    pub async fn plan(
        &self,
        query: &str,
        schema: &CollectionSchema,
    ) -> Result<RetrievalPlan, ModelError> {
        let prompt = build_prompt(query, &schema.field_block());
        let raw = self.model.generate_json(&prompt).await?;

        let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&raw) else {
            warn!(
                collection = schema.name,
                "Planner response is not JSON, using fallback plan: {}", raw
            );
            return Ok(RetrievalPlan::fallback(query));
        };

        let vector_string = parsed
            .get("vector_string")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(query)
            .to_string();

        let filter = parsed
            .get("filter")
            .map(Filter::from_planner_value)
            .unwrap_or_default()
            .with_existence_clause();

        debug!(
            collection = schema.name,
            vector_string, "planned retrieval"
        );

        Ok(RetrievalPlan {
            vector_string,
            filter,
        })
    }
}

fn build_prompt(query: &str, field_block: &str) -> String {
    format!(
        r#"Analyze the following user query and create a 'vector_string' for semantic vector similarity search and a filter object based on the provided filterable fields. Keep the vector string short and simple.

Use the following filter to filter for documents present in the database:

{DOC_ID_FILTER_TEMPLATE}

<query>"{query}"</query>

<fields>{field_block}</fields>

<examples>{WORKED_EXAMPLES}</examples>
"#
    )
}

const DOC_ID_FILTER_TEMPLATE: &str = r#"{
    "must_not": [
      {
        "key": "doc_id",
        "match": {
          "value": ""
        }
      }
    ],
"#;

const WORKED_EXAMPLES: &str = r#"
Examples:
Query: "Find acts related to environmental protection before 2010"
Response:
{
  "vector_string": "environmental protection",
  "filter": {
    "must": [
      {
        "key": "Category",
        "match": {
          "text": "acts"
        }
      },
      {
        "key": "Year",
        "range": {
          "lte": 2009
        }
      }
    ]
  }
}

Query: "Show me best practices about citizen engagement"
Response:
{
  "vector_string": "citizen engagement",
  "filter": {}
}

Query: "Policies present in the database related to education reform"
Response:
{
  "vector_string": "education reform",
  "filter": {
    "must_not": [
      {
        "key": "doc_id",
        "match": {
          "value": ""
        }
      }
    ],
    "must": [
      {
        "key": "Category",
        "match": {
          "text": "policies"
        }
      }
    ]
  }
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Condition;
    use crate::model::FakeChatModel;
    use crate::schema::SchemaRegistry;

    fn schema() -> CollectionSchema {
        SchemaRegistry::standard().get("policies").unwrap().clone()
    }

    #[tokio::test]
    async fn test_plan_parses_model_response() {
        let model = Arc::new(
            FakeChatModel::builder()
                .json_response(
                    r#"{"vector_string": "education reform", "filter": {"must": [{"key": "sector", "match": {"text": "Education"}}]}}"#,
                )
                .build(),
        );
        let planner = QueryPlanner::new(model.clone());

        let plan = planner
            .plan("policies about education reform", &schema())
            .await
            .unwrap();

        assert_eq!(plan.vector_string, "education reform");
        assert_eq!(
            plan.filter.must,
            vec![Condition::match_text("sector", "Education")]
        );
        assert!(plan.filter.has_existence_clause());

        // Prompt carries the query and the schema's field listing
        let prompts = model.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("policies about education reform"));
        assert!(prompts[0].contains("sdg_goal"));
    }

    #[tokio::test]
    async fn test_unparseable_response_yields_fallback() {
        let model = Arc::new(
            FakeChatModel::builder()
                .json_response("I think the filter should be...")
                .build(),
        );
        let planner = QueryPlanner::new(model);

        let plan = planner.plan("water policy", &schema()).await.unwrap();
        assert_eq!(plan, RetrievalPlan::fallback("water policy"));
        assert!(plan.filter.is_empty());
    }

    #[tokio::test]
    async fn test_missing_fields_fall_back_per_field() {
        // Parseable JSON without vector_string keeps the raw query but
        // still gets the existence clause
        let model = Arc::new(
            FakeChatModel::builder()
                .json_response(r#"{"filter": {}}"#)
                .build(),
        );
        let planner = QueryPlanner::new(model);

        let plan = planner.plan("water policy", &schema()).await.unwrap();
        assert_eq!(plan.vector_string, "water policy");
        assert!(plan.filter.has_existence_clause());
    }

    #[tokio::test]
    async fn test_year_range_plan() {
        let model = Arc::new(
            FakeChatModel::builder()
                .json_response(
                    r#"{"vector_string": "environmental protection", "filter": {"must": [{"key": "content_type", "match": {"text": "Act"}}, {"key": "year_mm_yyyy", "range": {"lte": 2009}}]}}"#,
                )
                .build(),
        );
        let planner = QueryPlanner::new(model);

        let plan = planner
            .plan("find acts on environmental protection before 2010", &schema())
            .await
            .unwrap();

        assert_eq!(plan.vector_string, "environmental protection");
        let range = plan
            .filter
            .must
            .iter()
            .find_map(|c| c.range)
            .expect("range clause");
        assert_eq!(range.lte, Some(2009.0));
        assert!(range.lt.is_none() && range.gt.is_none() && range.gte.is_none());
    }

    #[tokio::test]
    async fn test_model_failure_propagates() {
        let model = Arc::new(FakeChatModel::builder().fail_generate().build());
        let planner = QueryPlanner::new(model);

        let err = planner.plan("water policy", &schema()).await.unwrap_err();
        assert!(matches!(err, ModelError::NotAvailable(_)));
    }
}
