//! Disha Core - Hybrid retrieval and conversational orchestration engine
//!
//! Document discovery over curated and raw-data collections with dense +
//! sparse rank fusion, LLM-planned filters, and a tool-calling
//! conversation loop that streams grounded answers.

pub mod aggregate;
pub mod config;
pub mod context;
pub mod error;
pub mod filter;
pub mod fusion;
pub mod model;
pub mod orchestrator;
pub mod planner;
pub mod resolver;
pub mod schema;
pub mod session;
pub mod tools;
pub mod vector;

pub use aggregate::{AggregateOutcome, Aggregator};
pub use config::DishaConfig;
pub use error::EngineError;
pub use filter::{Condition, Filter, MatchValue, RangeCondition};
pub use fusion::{FusionEngine, ScoredDocument};
pub use model::{ChatMessage, ChatModel, ModelError, OpenAiChatModel};
pub use orchestrator::{Fragment, Orchestrator, TurnStream, SYSTEM_INSTRUCTION};
pub use planner::{QueryPlanner, RetrievalPlan};
pub use resolver::ContentResolver;
pub use schema::{SchemaRegistry, DOC_ID_FIELD, DOC_ID_SENTINEL};
pub use session::{SessionStore, TurnState};
pub use tools::{SearchMode, ToolInvocation};
pub use vector::{QdrantStore, ScoredPoint, VectorSpace, VectorStore, VectorStoreError};
