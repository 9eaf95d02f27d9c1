//! Tool surface exposed to the conversational model.
//!
//! Two tools: `search_documents` for document-level discovery (with a
//! search/qna mode switch) and `search_content` for drilling into
//! documents whose ids are already in context. Tool-call arguments come
//! from the model and are validated here before anything downstream
//! sees them.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::model::FunctionCall;

pub const SEARCH_DOCUMENTS: &str = "search_documents";
pub const SEARCH_CONTENT: &str = "search_content";

/// How a `search_documents` call should be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Return document metadata for discovery
    Search,
    /// Retrieve documents, then resolve their content for fact answers
    Qna,
}

/// A validated tool invocation, ready to dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    SearchDocuments {
        formatted_query: String,
        mode: SearchMode,
        limit: Option<usize>,
    },
    SearchContent {
        intent: String,
        doc_ids: Vec<String>,
        limit: Option<usize>,
    },
}

/// Why a tool call was rejected. Rejection skips the call; it never
/// fails the turn.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ToolValidationError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("invalid argument {0}: {1}")]
    InvalidArgument(&'static str, String),
}

impl ToolInvocation {
    /// Validate a raw model call into a typed invocation.
    pub fn validate(call: &FunctionCall) -> Result<Self, ToolValidationError> {
        match call.name.as_str() {
            SEARCH_DOCUMENTS => {
                let formatted_query = required_str(&call.arguments, "formatted_query")?;
                let mode_raw = required_str(&call.arguments, "mode")?;
                let mode = match mode_raw.as_str() {
                    "search" => SearchMode::Search,
                    "qna" => SearchMode::Qna,
                    other => {
                        return Err(ToolValidationError::InvalidArgument(
                            "mode",
                            other.to_string(),
                        ))
                    }
                };
                Ok(ToolInvocation::SearchDocuments {
                    formatted_query,
                    mode,
                    limit: optional_limit(&call.arguments)?,
                })
            }
            SEARCH_CONTENT => {
                let intent = required_str(&call.arguments, "intent")?;
                let doc_ids = call
                    .arguments
                    .get("doc_ids")
                    .and_then(|v| v.as_array())
                    .ok_or(ToolValidationError::MissingArgument("doc_ids"))?
                    .iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect();
                Ok(ToolInvocation::SearchContent {
                    intent,
                    doc_ids,
                    limit: optional_limit(&call.arguments)?,
                })
            }
            other => Err(ToolValidationError::UnknownTool(other.to_string())),
        }
    }
}

fn required_str(args: &Value, name: &'static str) -> Result<String, ToolValidationError> {
    args.get(name)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or(ToolValidationError::MissingArgument(name))
}

fn optional_limit(args: &Value) -> Result<Option<usize>, ToolValidationError> {
    match args.get("n") {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| ToolValidationError::InvalidArgument("n", v.to_string())),
    }
}

/// Tool declarations in chat-completions format, sent with every
/// dispatch turn.
pub fn declarations() -> Vec<Value> {
    vec![
        json!({
            "type": "function",
            "function": {
                "name": SEARCH_DOCUMENTS,
                "description": "Searches for documents in database based on the user's intent and the collection to search in. Call this function if the user wants to search for practices, policies, acts etc or wants specific statistics. Also use this if user wants to filter before getting content.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "formatted_query": {
                            "type": "string",
                            "description": "String inferred from the user's query based on available context. If in another language, translate to english. Keep it short and simple so it can be used for vector search.",
                        },
                        "mode": {
                            "type": "string",
                            "enum": ["search", "qna"],
                            "description": "Whether to search for entire documents or query information inside those documents. If the user wants to search for specifc practices or policy documents, use 'search'. If the user's query is asking about facts and data, use 'qna'.",
                        },
                        "n": {
                            "type": "integer",
                            "description": "Number of documents the user wants. Default is 5.",
                        },
                    },
                    "required": ["formatted_query", "mode"],
                },
            },
        }),
        json!({
            "type": "function",
            "function": {
                "name": SEARCH_CONTENT,
                "description": "Searches for document content if doc_ids are already available in context.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "intent": {
                            "type": "string",
                            "description": "Extracted intent from the user's query (e.g., 'Search for best practices of format website.'). If in another language, translate to english first.",
                        },
                        "doc_ids": {
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "List of doc_ids of the documents to be searched in.",
                        },
                        "n": {
                            "type": "integer",
                            "description": "Number of documents the user wants. Default is 5. Increase it if the context does not completely answer the query.",
                        },
                    },
                    "required": ["intent", "doc_ids"],
                },
            },
        }),
    ]
}
