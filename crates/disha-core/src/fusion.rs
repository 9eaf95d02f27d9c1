//! Hybrid retrieval with reciprocal rank fusion.
//!
//! One search runs the same query text through the dense and sparse
//! spaces of a collection, then merges the two ranked lists by RRF:
//! each point scores `sum(1 / (k + rank))` over the lists it appears
//! in, ranks 1-based. Raw similarity scores never cross spaces; only
//! ranks do.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::filter::Filter;
use crate::schema::{SchemaRegistry, DOC_ID_FIELD, DOC_ID_SENTINEL};
use crate::vector::{ScoredPoint, VectorSpace, VectorStore, VectorStoreError};

/// One fused, projected result document.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    /// Projected payload (allow-listed for curated collections)
    pub payload: Map<String, Value>,
    /// Fused RRF score
    pub score: f64,
}

impl ScoredDocument {
    /// The document's doc_id, when present and a string.
    pub fn doc_id(&self) -> Option<&str> {
        self.payload.get(DOC_ID_FIELD).and_then(|v| v.as_str())
    }
}

pub struct FusionEngine {
    store: Arc<dyn VectorStore>,
    registry: Arc<SchemaRegistry>,
    rrf_k: u32,
}

impl FusionEngine {
    pub fn new(store: Arc<dyn VectorStore>, registry: Arc<SchemaRegistry>, rrf_k: u32) -> Self {
        Self {
            store,
            registry,
            rrf_k,
        }
    }

    /// Hybrid search over one collection: dense and sparse queries at
    /// `limit` each, RRF-fused, truncated to `limit`, projected through
    /// the collection's allow-list.
    ///
    /// Any supplied filter gets the existence clause appended before it
    /// reaches the store; a `None` filter stays unfiltered.
    pub async fn search(
        &self,
        collection: &str,
        text: &str,
        filter: Option<Filter>,
        limit: usize,
    ) -> Result<Vec<ScoredDocument>, VectorStoreError> {
        let filter = filter.map(Filter::with_existence_clause);
        let filter_ref = filter.as_ref();

        let dense = self
            .store
            .search(collection, VectorSpace::Dense, text, filter_ref, limit)
            .await?;
        let sparse = self
            .store
            .search(collection, VectorSpace::Sparse, text, filter_ref, limit)
            .await?;

        let mut fused = rrf_fuse(&[dense, sparse], self.rrf_k);
        fused.truncate(limit);

        debug!(collection, results = fused.len(), "hybrid search fused");

        Ok(fused
            .into_iter()
            .map(|point| ScoredDocument {
                payload: self.project(collection, point.payload),
                score: point.score,
            })
            .collect())
    }

    /// Project a payload through the collection's allow-list. Collections
    /// without one (uncurated, content) pass through unchanged. A curated
    /// payload missing its doc_id gets the sentinel so downstream always
    /// sees the field.
    fn project(&self, collection: &str, payload: Map<String, Value>) -> Map<String, Value> {
        let Some(allowed) = self.registry.allow_list(collection) else {
            return payload;
        };

        let mut projected = Map::new();
        for field in allowed {
            if let Some(value) = payload.get(*field) {
                projected.insert((*field).to_string(), value.clone());
            }
        }
        if !projected.contains_key(DOC_ID_FIELD) {
            projected.insert(
                DOC_ID_FIELD.to_string(),
                Value::String(DOC_ID_SENTINEL.to_string()),
            );
        }
        projected
    }
}

/// Fuse ranked lists by reciprocal rank: each point contributes
/// `1 / (k + rank)` per list it appears in, ranks starting at 1. The
/// first-seen payload wins; output is sorted by fused score descending.
pub fn rrf_fuse(lists: &[Vec<ScoredPoint>], k: u32) -> Vec<ScoredPoint> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut payloads: HashMap<String, Map<String, Value>> = HashMap::new();

    for list in lists {
        for (index, point) in list.iter().enumerate() {
            let contribution = 1.0 / (k as f64 + (index + 1) as f64);
            match scores.get_mut(&point.id) {
                Some(score) => *score += contribution,
                None => {
                    scores.insert(point.id.clone(), contribution);
                    order.push(point.id.clone());
                    payloads.insert(point.id.clone(), point.payload.clone());
                }
            }
        }
    }

    let mut fused: Vec<ScoredPoint> = order
        .into_iter()
        .map(|id| {
            let score = scores[&id];
            let payload = payloads.remove(&id).unwrap_or_default();
            ScoredPoint { id, payload, score }
        })
        .collect();

    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::FakeVectorStore;
    use approx::assert_relative_eq;
    use serde_json::json;

    fn point(id: &str, score: f64) -> ScoredPoint {
        ScoredPoint::new(id, json!({"doc_id": id}), score)
    }

    #[test]
    fn test_rrf_scores_use_ranks_not_raw_scores() {
        // d1 is rank 1 dense and rank 2 sparse; d2 the reverse.
        // Raw scores are wildly different scales and must not matter.
        let dense = vec![point("d1", 0.99), point("d2", 0.42)];
        let sparse = vec![point("d2", 812.0), point("d1", 5.0)];

        let fused = rrf_fuse(&[dense, sparse], 60);
        assert_eq!(fused.len(), 2);
        // Both appear at ranks {1,2}, so scores tie exactly
        assert_relative_eq!(fused[0].score, 1.0 / 61.0 + 1.0 / 62.0);
        assert_relative_eq!(fused[0].score, fused[1].score);
    }

    #[test]
    fn test_rrf_single_list_membership_beats_lower_ranks() {
        let dense = vec![point("a", 0.9), point("b", 0.8), point("c", 0.7)];
        let sparse = vec![point("b", 1.0)];

        let fused = rrf_fuse(&[dense, sparse], 60);
        // b: 1/62 + 1/61 beats a: 1/61
        assert_eq!(fused[0].id, "b");
        assert_relative_eq!(fused[0].score, 1.0 / 62.0 + 1.0 / 61.0);
        assert_eq!(fused[1].id, "a");
        assert_relative_eq!(fused[1].score, 1.0 / 61.0);
        assert_eq!(fused[2].id, "c");
    }

    #[test]
    fn test_rrf_keeps_first_seen_payload() {
        let dense = vec![ScoredPoint::new("x", json!({"from": "dense"}), 0.9)];
        let sparse = vec![ScoredPoint::new("x", json!({"from": "sparse"}), 0.8)];

        let fused = rrf_fuse(&[dense, sparse], 60);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].payload["from"], "dense");
    }

    #[tokio::test]
    async fn test_search_queries_both_spaces_with_existence_clause() {
        let store = Arc::new(FakeVectorStore::new());
        store.push_response("policies", vec![point("d1", 0.9)]);
        store.push_response("policies", vec![point("d1", 3.0)]);

        let engine = FusionEngine::new(
            store.clone(),
            Arc::new(SchemaRegistry::standard()),
            60,
        );

        let results = engine
            .search("policies", "education", Some(Filter::default()), 5)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);

        let calls = store.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].space, VectorSpace::Dense);
        assert_eq!(calls[1].space, VectorSpace::Sparse);
        assert_eq!(calls[0].text, "education");
        assert_eq!(calls[0].limit, 5);
        // Supplied filter picked up the existence clause
        assert!(calls[0].filter.as_ref().unwrap().has_existence_clause());
    }

    #[tokio::test]
    async fn test_search_without_filter_stays_unfiltered() {
        let store = Arc::new(FakeVectorStore::new());
        let engine = FusionEngine::new(
            store.clone(),
            Arc::new(SchemaRegistry::standard()),
            60,
        );

        engine.search("data", "rainfall", None, 5).await.unwrap();
        for call in store.calls() {
            assert!(call.filter.is_none());
        }
    }

    #[tokio::test]
    async fn test_projection_drops_unlisted_fields_and_adds_sentinel() {
        let store = Arc::new(FakeVectorStore::new());
        store.push_response(
            "policies",
            vec![ScoredPoint::new(
                "p1",
                json!({
                    "sector": "Education",
                    "embedding_internal": [0.1, 0.2],
                    "description": "School reform"
                }),
                0.9,
            )],
        );

        let engine = FusionEngine::new(
            store,
            Arc::new(SchemaRegistry::standard()),
            60,
        );

        let results = engine.search("policies", "schools", None, 5).await.unwrap();
        let payload = &results[0].payload;
        assert_eq!(payload["sector"], "Education");
        assert_eq!(payload["description"], "School reform");
        assert!(!payload.contains_key("embedding_internal"));
        // No doc_id in the payload, sentinel substituted
        assert_eq!(payload[DOC_ID_FIELD], DOC_ID_SENTINEL);
    }

    #[tokio::test]
    async fn test_uncurated_payload_passes_through() {
        let store = Arc::new(FakeVectorStore::new());
        store.push_response(
            "data",
            vec![ScoredPoint::new(
                "r1",
                json!({"anything": "goes", "value": 42}),
                0.5,
            )],
        );

        let engine = FusionEngine::new(
            store,
            Arc::new(SchemaRegistry::standard()),
            60,
        );

        let results = engine.search("data", "rainfall", None, 5).await.unwrap();
        let payload = &results[0].payload;
        assert_eq!(payload["anything"], "goes");
        assert_eq!(payload["value"], 42);
        assert!(!payload.contains_key(DOC_ID_FIELD));
    }

    #[tokio::test]
    async fn test_truncates_to_limit_after_fusion() {
        let store = Arc::new(FakeVectorStore::new());
        store.push_response("data", vec![point("a", 0.9), point("b", 0.8)]);
        store.push_response("data", vec![point("c", 2.0), point("d", 1.0)]);

        let engine = FusionEngine::new(
            store,
            Arc::new(SchemaRegistry::standard()),
            60,
        );

        let results = engine.search("data", "rainfall", None, 2).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let store = Arc::new(FakeVectorStore::failing());
        let engine = FusionEngine::new(
            store,
            Arc::new(SchemaRegistry::standard()),
            60,
        );

        let err = engine.search("policies", "anything", None, 5).await.unwrap_err();
        assert!(matches!(err, VectorStoreError::NotAvailable(_)));
    }
}
