//! Content resolution for QnA answers.
//!
//! Document-level search returns metadata; answering factual questions
//! needs the content chunks behind those documents. The resolver runs a
//! hybrid search over the content collection, scoped to a doc_id
//! membership filter so only the named documents' chunks come back.

use std::sync::Arc;
use tracing::debug;

use crate::filter::Filter;
use crate::fusion::{FusionEngine, ScoredDocument};
use crate::schema::SchemaRegistry;
use crate::vector::VectorStoreError;

pub struct ContentResolver {
    fusion: Arc<FusionEngine>,
    registry: Arc<SchemaRegistry>,
    content_limit: usize,
}

impl ContentResolver {
    pub fn new(
        fusion: Arc<FusionEngine>,
        registry: Arc<SchemaRegistry>,
        content_limit: usize,
    ) -> Self {
        Self {
            fusion,
            registry,
            content_limit,
        }
    }

    /// Fetch content chunks relevant to `intent` from the documents in
    /// `doc_ids`. An empty id list short-circuits to an empty result;
    /// there is nothing to scope the search to.
    pub async fn resolve(
        &self,
        intent: &str,
        doc_ids: &[String],
        limit: Option<usize>,
    ) -> Result<Vec<ScoredDocument>, VectorStoreError> {
        if doc_ids.is_empty() {
            return Ok(Vec::new());
        }

        let limit = limit.unwrap_or(self.content_limit);
        let filter = Filter::doc_id_in(doc_ids.to_vec());

        debug!(docs = doc_ids.len(), limit, "resolving content chunks");

        self.fusion
            .search(
                self.registry.content_collection(),
                intent,
                Some(filter),
                limit,
            )
            .await
    }
}
