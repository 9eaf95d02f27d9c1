//! Engine-level error taxonomy.
//!
//! Component clients keep their own error enums (`ModelError`,
//! `VectorStoreError`); this type is what crosses the orchestration
//! boundary. Turn-level failures are never fatal to the process and never
//! poison a session.

use crate::model::ModelError;
use crate::vector::VectorStoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Language-model service failed (generation or tool-call turn).
    #[error("model service error: {0}")]
    Model(#[from] ModelError),

    /// Vector database unreachable or erroring. Not retried in the core.
    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    /// No session with this identifier exists in the store.
    #[error("unknown session: {0}")]
    SessionNotFound(String),
}
