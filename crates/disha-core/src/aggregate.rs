//! Cross-collection retrieval aggregation.
//!
//! One `search_documents` call fans out over the requested collections.
//! Curated collections each get their own planned query (vector string
//! plus filter); the uncurated raw-data collection is searched with the
//! caller's query verbatim, no filter, at its own fixed limit.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::config::RetrievalConfig;
use crate::error::EngineError;
use crate::fusion::{FusionEngine, ScoredDocument};
use crate::planner::{QueryPlanner, RetrievalPlan};
use crate::schema::SchemaRegistry;

/// Result of one aggregated search.
#[derive(Debug, Default)]
pub struct AggregateOutcome {
    /// Curated results, keyed by collection name
    pub curated: HashMap<String, Vec<ScoredDocument>>,
    /// Uncurated raw-data results, if the uncurated collection was asked
    pub uncurated: Vec<ScoredDocument>,
    /// Plans used per curated collection, for downstream reuse
    pub plans: HashMap<String, RetrievalPlan>,
}

pub struct Aggregator {
    planner: QueryPlanner,
    fusion: Arc<FusionEngine>,
    registry: Arc<SchemaRegistry>,
    default_limit: usize,
    uncurated_limit: usize,
}

impl Aggregator {
    pub fn new(
        planner: QueryPlanner,
        fusion: Arc<FusionEngine>,
        registry: Arc<SchemaRegistry>,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self {
            planner,
            fusion,
            registry,
            default_limit: retrieval.default_limit,
            uncurated_limit: retrieval.uncurated_limit,
        }
    }

    /// Search `query` across `collections`. Unknown collection names are
    /// skipped with a warning; a model or store failure aborts the whole
    /// aggregation.
    pub async fn search(
        &self,
        query: &str,
        collections: &[String],
        limit: Option<usize>,
    ) -> Result<AggregateOutcome, EngineError> {
        let limit = limit.unwrap_or(self.default_limit);
        let mut outcome = AggregateOutcome::default();

        for collection in collections {
            let Some(schema) = self.registry.get(collection.as_str()) else {
                warn!("Skipping unknown collection: {}", collection);
                continue;
            };

            let plan = self.planner.plan(query, schema).await?;

            if self.registry.is_uncurated(collection) {
                // Raw data: planned vector string, but no filter and a
                // fixed limit regardless of what the caller asked for
                let results = self
                    .fusion
                    .search(collection, &plan.vector_string, None, self.uncurated_limit)
                    .await?;
                outcome.uncurated.extend(results);
                outcome.plans.insert(collection.clone(), plan);
                continue;
            }

            let results = self
                .fusion
                .search(
                    collection,
                    &plan.vector_string,
                    Some(plan.filter.clone()),
                    limit,
                )
                .await?;

            outcome.plans.insert(collection.clone(), plan);
            outcome.curated.insert(collection.clone(), results);
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FakeChatModel;
    use crate::vector::{FakeVectorStore, ScoredPoint};
    use serde_json::json;

    fn aggregator(
        model: FakeChatModel,
        store: Arc<FakeVectorStore>,
    ) -> Aggregator {
        let registry = Arc::new(SchemaRegistry::standard());
        let model = Arc::new(model);
        Aggregator::new(
            QueryPlanner::new(model),
            Arc::new(FusionEngine::new(store, registry.clone(), 60)),
            registry,
            &RetrievalConfig::default(),
        )
    }

    fn plan_json(vector_string: &str) -> String {
        json!({"vector_string": vector_string, "filter": {}}).to_string()
    }

    #[tokio::test]
    async fn test_curated_collections_each_get_a_plan() {
        let store = Arc::new(FakeVectorStore::new());
        store.push_response(
            "best_practices",
            vec![ScoredPoint::new("b1", json!({"doc_id": "b1"}), 0.9)],
        );
        store.push_response("best_practices", vec![]);
        store.push_response(
            "policies",
            vec![ScoredPoint::new("p1", json!({"doc_id": "p1"}), 0.8)],
        );
        store.push_response("policies", vec![]);

        let model = FakeChatModel::builder()
            .json_response(plan_json("water harvesting"))
            .json_response(plan_json("water policy"))
            .build();

        let agg = aggregator(model, store.clone());
        let outcome = agg
            .search(
                "rainwater harvesting",
                &["best_practices".to_string(), "policies".to_string()],
                None,
            )
            .await
            .unwrap();

        assert_eq!(outcome.curated.len(), 2);
        assert_eq!(outcome.plans.len(), 2);
        assert!(outcome.uncurated.is_empty());

        // Planned vector strings, not the raw query, hit the store
        let texts: Vec<String> = store.calls().into_iter().map(|c| c.text).collect();
        assert!(texts.contains(&"water harvesting".to_string()));
        assert!(texts.contains(&"water policy".to_string()));
        assert!(!texts.contains(&"rainwater harvesting".to_string()));
    }

    #[tokio::test]
    async fn test_uncurated_collection_drops_filter_and_caps_limit() {
        let store = Arc::new(FakeVectorStore::new());
        store.push_response(
            "data",
            vec![ScoredPoint::new("r1", json!({"rainfall_mm": 820}), 0.5)],
        );

        // The planner still runs (empty schema) and may even emit a
        // filter; the filter must not reach the store
        let model = FakeChatModel::builder()
            .json_response(
                json!({
                    "vector_string": "rainfall",
                    "filter": {"must": [{"key": "year", "range": {"gte": 2020}}]}
                })
                .to_string(),
            )
            .build();

        let agg = aggregator(model, store.clone());
        let outcome = agg
            .search("rainfall statistics", &["data".to_string()], Some(20))
            .await
            .unwrap();

        assert_eq!(outcome.uncurated.len(), 1);
        assert!(outcome.curated.is_empty());
        assert!(outcome.plans.contains_key("data"));

        for call in store.calls() {
            assert_eq!(call.collection, "data");
            // Planned vector string, unfiltered, fixed limit regardless
            // of caller's n
            assert_eq!(call.text, "rainfall");
            assert!(call.filter.is_none());
            assert_eq!(call.limit, 5);
        }
    }

    #[tokio::test]
    async fn test_repeated_uncurated_collection_appends_results() {
        let store = Arc::new(FakeVectorStore::new());
        store.push_response(
            "data",
            vec![ScoredPoint::new("r1", json!({"rainfall_mm": 820}), 0.5)],
        );
        // Second pass over the same collection yields a different row
        store.push_response("data", vec![]);
        store.push_response(
            "data",
            vec![ScoredPoint::new("r2", json!({"rainfall_mm": 400}), 0.4)],
        );

        let model = FakeChatModel::builder()
            .json_response(plan_json("rainfall"))
            .json_response(plan_json("rainfall"))
            .build();

        let agg = aggregator(model, store);
        let outcome = agg
            .search(
                "rainfall statistics",
                &["data".to_string(), "data".to_string()],
                None,
            )
            .await
            .unwrap();

        // Both passes land in the uncurated bucket, in order
        assert_eq!(outcome.uncurated.len(), 2);
        assert_eq!(outcome.uncurated[0].payload["rainfall_mm"], 820);
        assert_eq!(outcome.uncurated[1].payload["rainfall_mm"], 400);
    }

    #[tokio::test]
    async fn test_unknown_collection_is_skipped() {
        let store = Arc::new(FakeVectorStore::new());
        let model = FakeChatModel::builder().build();

        let agg = aggregator(model, store.clone());
        let outcome = agg
            .search("anything", &["nonexistent".to_string()], None)
            .await
            .unwrap();

        assert!(outcome.curated.is_empty());
        assert!(outcome.uncurated.is_empty());
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_aborts_aggregation() {
        let store = Arc::new(FakeVectorStore::failing());
        let model = FakeChatModel::builder()
            .json_response(plan_json("water policy"))
            .build();

        let agg = aggregator(model, store);
        let err = agg
            .search("water policy", &["policies".to_string()], None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::VectorStore(_)));
    }
}
