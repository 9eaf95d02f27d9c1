//! Vector database client.
//!
//! The engine talks to the vector database through the `VectorStore`
//! trait: one similarity query per embedding space. Rank fusion across
//! spaces happens in the fusion engine, not here.
//!
//! Production code uses `QdrantStore` (REST API with server-side text
//! inference). Test code uses `FakeVectorStore` with queued responses.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use crate::config::VectorConfig;
use crate::filter::Filter;

/// Embedding space a similarity query runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorSpace {
    /// Semantic embedding, cosine-style similarity
    Dense,
    /// Lexical term-weighted embedding
    Sparse,
}

impl VectorSpace {
    /// Named vector the collection stores this space under.
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorSpace::Dense => "dense",
            VectorSpace::Sparse => "sparse",
        }
    }
}

/// One ranked point returned by a similarity query.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    /// Point identifier, used to merge ranked lists across spaces
    pub id: String,
    /// Opaque payload mapping
    pub payload: Map<String, Value>,
    /// Space-local similarity score (not comparable across spaces)
    pub score: f64,
}

impl ScoredPoint {
    /// Build a point from a JSON object payload. Panics if `payload` is
    /// not an object; intended for tests and fixtures.
    pub fn new(id: impl Into<String>, payload: Value, score: f64) -> Self {
        let Value::Object(payload) = payload else {
            panic!("ScoredPoint payload must be a JSON object");
        };
        Self {
            id: id.into(),
            payload,
            score,
        }
    }
}

/// Error from vector database operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum VectorStoreError {
    #[error("vector database not available: {0}")]
    NotAvailable(String),
    #[error("request timed out")]
    Timeout,
    #[error("HTTP error: {0}")]
    HttpError(String),
    #[error("parse error: {0}")]
    ParseError(String),
}

/// Similarity search over one collection and one embedding space.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn search(
        &self,
        collection: &str,
        space: VectorSpace,
        text: &str,
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, VectorStoreError>;
}

// ============================================================================
// Qdrant REST client (production)
// ============================================================================

/// Qdrant client using the points/query REST endpoint with server-side
/// text inference: the query is sent as text plus an embedding model
/// name, and the server embeds it.
#[derive(Debug, Clone)]
pub struct QdrantStore {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    dense_model: String,
    sparse_model: String,
}

impl QdrantStore {
    pub fn new(config: &VectorConfig) -> Self {
        let api_key = config
            .api_key_env
            .as_ref()
            .and_then(|env| std::env::var(env).ok())
            .filter(|key| !key.is_empty());

        Self {
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            dense_model: config.dense_model.clone(),
            sparse_model: config.sparse_model.clone(),
        }
    }

    fn model_for(&self, space: VectorSpace) -> &str {
        match space {
            VectorSpace::Dense => &self.dense_model,
            VectorSpace::Sparse => &self.sparse_model,
        }
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn search(
        &self,
        collection: &str,
        space: VectorSpace,
        text: &str,
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, VectorStoreError> {
        let url = format!("{}/collections/{}/points/query", self.base_url, collection);

        let mut body = json!({
            "query": {
                "text": text,
                "model": self.model_for(space),
            },
            "using": space.as_str(),
            "limit": limit,
            "with_payload": true,
        });
        if let Some(filter) = filter {
            if !filter.is_empty() {
                body["filter"] = serde_json::to_value(filter)
                    .map_err(|e| VectorStoreError::ParseError(e.to_string()))?;
            }
        }

        debug!(
            collection,
            space = space.as_str(),
            limit,
            "vector query: {}",
            text
        );

        let mut request = self.http_client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key.clone());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                VectorStoreError::Timeout
            } else if e.is_connect() {
                VectorStoreError::NotAvailable(e.to_string())
            } else {
                VectorStoreError::HttpError(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(VectorStoreError::HttpError(format!(
                "status {}: {}",
                status, body
            )));
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| VectorStoreError::ParseError(e.to_string()))?;

        let points = parsed
            .get("result")
            .and_then(|r| r.get("points"))
            .and_then(|p| p.as_array())
            .ok_or_else(|| {
                VectorStoreError::ParseError("response missing result.points".to_string())
            })?;

        let mut results = Vec::with_capacity(points.len());
        for point in points {
            let id = match point.get("id") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => continue,
            };
            let score = point.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0);
            let payload = point
                .get("payload")
                .and_then(|p| p.as_object())
                .cloned()
                .unwrap_or_default();
            results.push(ScoredPoint { id, payload, score });
        }

        Ok(results)
    }
}

// ============================================================================
// Fake vector store (testing)
// ============================================================================

/// One recorded search call, for assertions.
#[derive(Debug, Clone)]
pub struct RecordedSearch {
    pub collection: String,
    pub space: VectorSpace,
    pub text: String,
    pub filter: Option<Filter>,
    pub limit: usize,
}

/// Deterministic in-memory vector store. Responses are queued per
/// collection and consumed in call order (dense query first, then
/// sparse, matching the fusion engine). An exhausted queue yields an
/// empty result list, not an error.
#[derive(Default)]
pub struct FakeVectorStore {
    responses: Mutex<HashMap<String, VecDeque<Vec<ScoredPoint>>>>,
    calls: Mutex<Vec<RecordedSearch>>,
    fail_all: bool,
}

impl FakeVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store where every search fails with `NotAvailable`.
    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    /// Queue a response list for the next search against `collection`.
    pub fn push_response(&self, collection: &str, points: Vec<ScoredPoint>) {
        self.responses
            .lock()
            .expect("fake store poisoned")
            .entry(collection.to_string())
            .or_default()
            .push_back(points);
    }

    /// All searches recorded so far.
    pub fn calls(&self) -> Vec<RecordedSearch> {
        self.calls.lock().expect("fake store poisoned").clone()
    }
}

#[async_trait]
impl VectorStore for FakeVectorStore {
    async fn search(
        &self,
        collection: &str,
        space: VectorSpace,
        text: &str,
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, VectorStoreError> {
        self.calls.lock().expect("fake store poisoned").push(RecordedSearch {
            collection: collection.to_string(),
            space,
            text: text.to_string(),
            filter: filter.cloned(),
            limit,
        });

        if self.fail_all {
            return Err(VectorStoreError::NotAvailable(
                "fake store configured to fail".to_string(),
            ));
        }

        Ok(self
            .responses
            .lock()
            .expect("fake store poisoned")
            .get_mut(collection)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_default())
    }
}
