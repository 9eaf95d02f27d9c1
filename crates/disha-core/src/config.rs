//! Configuration management for the disha engine.
//!
//! Loads settings from /etc/disha/config.toml or uses defaults. Every
//! field has a serde default so partial config files work.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/disha/config.toml";

/// Language-model service configuration (OpenAI-compatible endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base URL of the chat-completions endpoint
    #[serde(default = "default_model_base_url")]
    pub base_url: String,

    /// Model used for the conversational turn loop
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Model used for query planning (structured output); fast and small
    #[serde(default = "default_planner_model")]
    pub planner_model: String,

    /// Environment variable holding the API key, if the endpoint needs one
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
}

fn default_model_base_url() -> String {
    // Ollama's OpenAI-compatible endpoint; any compatible server works
    "http://127.0.0.1:11434/v1".to_string()
}

fn default_chat_model() -> String {
    "qwen2.5:7b-instruct".to_string()
}

fn default_planner_model() -> String {
    "qwen2.5:1.5b-instruct".to_string()
}

fn default_model_timeout() -> u64 {
    120
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_model_base_url(),
            chat_model: default_chat_model(),
            planner_model: default_planner_model(),
            api_key_env: None,
            timeout_secs: default_model_timeout(),
        }
    }
}

/// Vector database service configuration (Qdrant REST API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    /// Base URL of the Qdrant instance
    #[serde(default = "default_vector_base_url")]
    pub base_url: String,

    /// Environment variable holding the api-key header value, if any
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Dense embedding model for server-side query inference
    #[serde(default = "default_dense_model")]
    pub dense_model: String,

    /// Sparse embedding model for server-side query inference
    #[serde(default = "default_sparse_model")]
    pub sparse_model: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_vector_timeout")]
    pub timeout_secs: u64,
}

fn default_vector_base_url() -> String {
    "http://127.0.0.1:6333".to_string()
}

fn default_dense_model() -> String {
    "BAAI/bge-base-en-v1.5".to_string()
}

fn default_sparse_model() -> String {
    "prithivida/Splade_PP_en_v1".to_string()
}

fn default_vector_timeout() -> u64 {
    30
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            base_url: default_vector_base_url(),
            api_key_env: None,
            dense_model: default_dense_model(),
            sparse_model: default_sparse_model(),
            timeout_secs: default_vector_timeout(),
        }
    }
}

/// Retrieval tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Default document-level result limit when the model does not ask for one
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Fixed limit for the uncurated collection (regardless of caller limit)
    #[serde(default = "default_uncurated_limit")]
    pub uncurated_limit: usize,

    /// Limit for content-chunk resolution in QnA mode
    #[serde(default = "default_content_limit")]
    pub content_limit: usize,

    /// Reciprocal rank fusion smoothing constant
    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,

    /// Maximum live sessions before least-recently-used eviction
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_limit() -> usize {
    5
}

fn default_uncurated_limit() -> usize {
    5
}

fn default_content_limit() -> usize {
    50
}

fn default_rrf_k() -> u32 {
    60
}

fn default_max_sessions() -> usize {
    64
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            uncurated_limit: default_uncurated_limit(),
            content_limit: default_content_limit(),
            rrf_k: default_rrf_k(),
            max_sessions: default_max_sessions(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DishaConfig {
    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub vector: VectorConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

impl DishaConfig {
    /// Load config from the given path, falling back to defaults if the
    /// file is missing or malformed. A broken config file should never
    /// keep the engine from starting.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(raw) => match toml::from_str(&raw) {
                Ok(config) => {
                    info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("Invalid config at {}: {} - using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Cannot read {}: {} - using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    /// Strict variant for callers that want the parse error.
    pub fn try_load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}
