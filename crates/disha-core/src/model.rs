//! Language-model client (OpenAI-compatible chat-completions API).
//!
//! Three operations: structured JSON generation for the query planner,
//! a tool-call turn for dispatch decisions, and token streaming for the
//! user-facing answer. Production code uses `OpenAiChatModel` against
//! any compatible server (Ollama, vLLM, hosted APIs). Test code uses
//! `FakeChatModel` with scripted responses.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::ModelConfig;

/// Channel depth for streamed answer fragments
const STREAM_CHANNEL_CAPACITY: usize = 16;

/// Error from language-model operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    #[error("model service not available: {0}")]
    NotAvailable(String),
    #[error("request timed out")]
    Timeout,
    #[error("HTTP error: {0}")]
    HttpError(String),
    #[error("parse error: {0}")]
    ParseError(String),
}

// ============================================================================
// Message types (chat-completions wire format)
// ============================================================================

/// Raw tool call as it appears in an assistant message: arguments stay a
/// JSON-encoded string until validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCallWire,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallWire {
    pub name: String,
    pub arguments: String,
}

/// One message in a conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Assistant message carrying tool calls, recorded in history so the
    /// tool responses that follow have their antecedent.
    pub fn assistant_calls(calls: Vec<ToolCallMessage>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: None,
            tool_calls: calls,
            tool_call_id: None,
        }
    }

    /// Tool response tied to a call id.
    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// A tool call with arguments already parsed from the wire string.
#[derive(Debug, Clone)]
pub struct FunctionCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Result of one non-streaming model turn: answer text, tool calls, or
/// both. The raw wire calls are kept so the orchestrator can replay them
/// into history verbatim.
#[derive(Debug, Clone, Default)]
pub struct ModelTurn {
    pub text: Option<String>,
    pub calls: Vec<FunctionCall>,
    pub raw_calls: Vec<ToolCallMessage>,
}

impl ModelTurn {
    pub fn has_calls(&self) -> bool {
        !self.calls.is_empty()
    }
}

// ============================================================================
// Trait
// ============================================================================

/// Language-model operations the engine depends on.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Single-shot structured generation: prompt in, JSON text out.
    /// Runs on the planner model with JSON response format enforced.
    async fn generate_json(&self, prompt: &str) -> Result<String, ModelError>;

    /// One conversational turn with tool declarations available.
    async fn chat(
        &self,
        history: &[ChatMessage],
        tools: &[Value],
    ) -> Result<ModelTurn, ModelError>;

    /// Streamed conversational turn. Fragments arrive on the channel in
    /// generation order; a transport failure mid-stream arrives as an
    /// `Err` item and ends the stream.
    async fn chat_stream(
        &self,
        history: &[ChatMessage],
    ) -> Result<mpsc::Receiver<Result<String, ModelError>>, ModelError>;
}

// ============================================================================
// OpenAI-compatible client (production)
// ============================================================================

pub struct OpenAiChatModel {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    chat_model: String,
    planner_model: String,
}

impl OpenAiChatModel {
    pub fn new(config: &ModelConfig) -> Self {
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
            chat_model: config.chat_model.clone(),
            planner_model: config.planner_model.clone(),
        }
    }

    fn request(&self, body: &Value) -> reqwest::RequestBuilder {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self.http_client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.clone());
        }
        request
    }

    async fn send(&self, body: &Value) -> Result<Value, ModelError> {
        let response = self.request(body).send().await.map_err(map_reqwest_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ModelError::HttpError(format!("status {}: {}", status, text)));
        }

        response
            .json()
            .await
            .map_err(|e| ModelError::ParseError(e.to_string()))
    }
}

fn map_reqwest_error(e: reqwest::Error) -> ModelError {
    if e.is_timeout() {
        ModelError::Timeout
    } else if e.is_connect() {
        ModelError::NotAvailable(e.to_string())
    } else {
        ModelError::HttpError(e.to_string())
    }
}

/// Pull `choices[0].message` out of a completions response.
fn response_message(parsed: &Value) -> Result<&Value, ModelError> {
    parsed
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .ok_or_else(|| ModelError::ParseError("response missing choices[0].message".to_string()))
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn generate_json(&self, prompt: &str) -> Result<String, ModelError> {
        let body = json!({
            "model": self.planner_model,
            "messages": [{"role": "user", "content": prompt}],
            "response_format": {"type": "json_object"},
            "temperature": 0.0,
        });

        let parsed = self.send(&body).await?;
        let content = response_message(&parsed)?
            .get("content")
            .and_then(|c| c.as_str())
            .ok_or_else(|| ModelError::ParseError("response missing content".to_string()))?;

        Ok(content.to_string())
    }

    async fn chat(
        &self,
        history: &[ChatMessage],
        tools: &[Value],
    ) -> Result<ModelTurn, ModelError> {
        let mut body = json!({
            "model": self.chat_model,
            "messages": history,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.to_vec());
        }

        let parsed = self.send(&body).await?;
        let message = response_message(&parsed)?;

        let text = message
            .get("content")
            .and_then(|c| c.as_str())
            .filter(|c| !c.is_empty())
            .map(|c| c.to_string());

        let mut calls = Vec::new();
        let mut raw_calls = Vec::new();
        if let Some(wire_calls) = message.get("tool_calls").and_then(|t| t.as_array()) {
            for wire in wire_calls {
                let Ok(raw) = serde_json::from_value::<ToolCallMessage>(wire.clone()) else {
                    warn!("Skipping malformed tool call in response: {}", wire);
                    continue;
                };
                let arguments = serde_json::from_str(&raw.function.arguments)
                    .unwrap_or(Value::Null);
                calls.push(FunctionCall {
                    id: raw.id.clone(),
                    name: raw.function.name.clone(),
                    arguments,
                });
                raw_calls.push(raw);
            }
        }

        debug!(
            calls = calls.len(),
            has_text = text.is_some(),
            "model turn complete"
        );

        Ok(ModelTurn { text, calls, raw_calls })
    }

    async fn chat_stream(
        &self,
        history: &[ChatMessage],
    ) -> Result<mpsc::Receiver<Result<String, ModelError>>, ModelError> {
        let body = json!({
            "model": self.chat_model,
            "messages": history,
            "stream": true,
        });

        let mut response = self.request(&body).send().await.map_err(map_reqwest_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ModelError::HttpError(format!("status {}: {}", status, text)));
        }

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut buffer = String::new();

            loop {
                let chunk = match response.chunk().await {
                    Ok(Some(chunk)) => chunk,
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(map_reqwest_error(e))).await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));

                // SSE frames are newline-delimited; a partial line stays
                // buffered until the next chunk completes it.
                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if data == "[DONE]" {
                        return;
                    }

                    let Ok(event) = serde_json::from_str::<Value>(data) else {
                        continue;
                    };
                    let delta = event
                        .get("choices")
                        .and_then(|c| c.as_array())
                        .and_then(|c| c.first())
                        .and_then(|c| c.get("delta"))
                        .and_then(|d| d.get("content"))
                        .and_then(|t| t.as_str());

                    if let Some(text) = delta {
                        if tx.send(Ok(text.to_string())).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}

// ============================================================================
// Fake chat model (testing)
// ============================================================================

/// Scripted chat model. Each operation consumes its own response queue;
/// an exhausted queue is an error because it means the test scripted
/// fewer responses than the engine asked for.
#[derive(Default)]
pub struct FakeChatModel {
    json_responses: Mutex<VecDeque<String>>,
    turns: Mutex<VecDeque<ModelTurn>>,
    streams: Mutex<VecDeque<Vec<Result<String, ModelError>>>>,
    fail_generate: bool,
    fail_chat: bool,
    fail_stream: bool,
    prompts: Mutex<Vec<String>>,
    histories: Mutex<Vec<Vec<ChatMessage>>>,
}

impl FakeChatModel {
    pub fn builder() -> FakeChatModelBuilder {
        FakeChatModelBuilder::default()
    }

    /// Planner prompts seen by `generate_json`, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("fake model poisoned").clone()
    }

    /// Histories seen by `chat` and `chat_stream`, in call order.
    pub fn histories(&self) -> Vec<Vec<ChatMessage>> {
        self.histories.lock().expect("fake model poisoned").clone()
    }
}

#[derive(Default)]
pub struct FakeChatModelBuilder {
    json_responses: VecDeque<String>,
    turns: VecDeque<ModelTurn>,
    streams: VecDeque<Vec<Result<String, ModelError>>>,
    fail_generate: bool,
    fail_chat: bool,
    fail_stream: bool,
}

impl FakeChatModelBuilder {
    /// Queue a planner response.
    pub fn json_response(mut self, raw: impl Into<String>) -> Self {
        self.json_responses.push_back(raw.into());
        self
    }

    /// Queue a plain-text turn with no tool calls.
    pub fn text_turn(mut self, text: impl Into<String>) -> Self {
        self.turns.push_back(ModelTurn {
            text: Some(text.into()),
            ..Default::default()
        });
        self
    }

    /// Queue a turn issuing the given tool calls.
    pub fn call_turn(mut self, calls: Vec<(&str, &str, Value)>) -> Self {
        let mut parsed = Vec::new();
        let mut raw = Vec::new();
        for (id, name, arguments) in calls {
            raw.push(ToolCallMessage {
                id: id.to_string(),
                call_type: "function".to_string(),
                function: FunctionCallWire {
                    name: name.to_string(),
                    arguments: arguments.to_string(),
                },
            });
            parsed.push(FunctionCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments,
            });
        }
        self.turns.push_back(ModelTurn {
            text: None,
            calls: parsed,
            raw_calls: raw,
        });
        self
    }

    /// Queue a streamed answer delivered as the given fragments.
    pub fn stream(mut self, fragments: Vec<&str>) -> Self {
        self.streams
            .push_back(fragments.into_iter().map(|f| Ok(f.to_string())).collect());
        self
    }

    /// Queue a stream that fails after the given fragments.
    pub fn broken_stream(mut self, fragments: Vec<&str>) -> Self {
        let mut items: Vec<Result<String, ModelError>> =
            fragments.into_iter().map(|f| Ok(f.to_string())).collect();
        items.push(Err(ModelError::HttpError("stream interrupted".to_string())));
        self.streams.push_back(items);
        self
    }

    pub fn fail_generate(mut self) -> Self {
        self.fail_generate = true;
        self
    }

    pub fn fail_chat(mut self) -> Self {
        self.fail_chat = true;
        self
    }

    pub fn fail_stream(mut self) -> Self {
        self.fail_stream = true;
        self
    }

    pub fn build(self) -> FakeChatModel {
        FakeChatModel {
            json_responses: Mutex::new(self.json_responses),
            turns: Mutex::new(self.turns),
            streams: Mutex::new(self.streams),
            fail_generate: self.fail_generate,
            fail_chat: self.fail_chat,
            fail_stream: self.fail_stream,
            prompts: Mutex::new(Vec::new()),
            histories: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChatModel for FakeChatModel {
    async fn generate_json(&self, prompt: &str) -> Result<String, ModelError> {
        self.prompts
            .lock()
            .expect("fake model poisoned")
            .push(prompt.to_string());

        if self.fail_generate {
            return Err(ModelError::NotAvailable(
                "fake model configured to fail".to_string(),
            ));
        }

        self.json_responses
            .lock()
            .expect("fake model poisoned")
            .pop_front()
            .ok_or_else(|| ModelError::ParseError("no scripted json response".to_string()))
    }

    async fn chat(
        &self,
        history: &[ChatMessage],
        _tools: &[Value],
    ) -> Result<ModelTurn, ModelError> {
        self.histories
            .lock()
            .expect("fake model poisoned")
            .push(history.to_vec());

        if self.fail_chat {
            return Err(ModelError::NotAvailable(
                "fake model configured to fail".to_string(),
            ));
        }

        self.turns
            .lock()
            .expect("fake model poisoned")
            .pop_front()
            .ok_or_else(|| ModelError::ParseError("no scripted turn".to_string()))
    }

    async fn chat_stream(
        &self,
        history: &[ChatMessage],
    ) -> Result<mpsc::Receiver<Result<String, ModelError>>, ModelError> {
        self.histories
            .lock()
            .expect("fake model poisoned")
            .push(history.to_vec());

        if self.fail_stream {
            return Err(ModelError::NotAvailable(
                "fake model configured to fail".to_string(),
            ));
        }

        let items = self
            .streams
            .lock()
            .expect("fake model poisoned")
            .pop_front()
            .ok_or_else(|| ModelError::ParseError("no scripted stream".to_string()))?;

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            for item in items {
                if tx.send(item).await.is_err() {
                    return;
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_serialization_omits_empty_fields() {
        let msg = ChatMessage::user("hello");
        let wire = serde_json::to_value(&msg).unwrap();
        assert_eq!(wire, json!({"role": "user", "content": "hello"}));
    }

    #[test]
    fn test_tool_message_carries_call_id() {
        let msg = ChatMessage::tool("call_1", "{\"results\": []}");
        let wire = serde_json::to_value(&msg).unwrap();
        assert_eq!(wire["tool_call_id"], "call_1");
        assert_eq!(wire["role"], "tool");
    }

    #[tokio::test]
    async fn test_fake_model_scripted_turn() {
        let model = FakeChatModel::builder()
            .call_turn(vec![(
                "call_1",
                "search_documents",
                json!({"formatted_query": "education policy", "mode": "search"}),
            )])
            .build();

        let turn = model.chat(&[ChatMessage::user("hi")], &[]).await.unwrap();
        assert!(turn.has_calls());
        assert_eq!(turn.calls[0].name, "search_documents");
        assert_eq!(turn.raw_calls[0].id, "call_1");
        assert_eq!(model.histories().len(), 1);
    }

    #[tokio::test]
    async fn test_fake_model_stream_order() {
        let model = FakeChatModel::builder()
            .stream(vec!["Hello", " world"])
            .build();

        let mut rx = model.chat_stream(&[ChatMessage::user("hi")]).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().unwrap(), "Hello");
        assert_eq!(rx.recv().await.unwrap().unwrap(), " world");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_fake_model_broken_stream() {
        let model = FakeChatModel::builder()
            .broken_stream(vec!["partial"])
            .build();

        let mut rx = model.chat_stream(&[ChatMessage::user("hi")]).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().unwrap(), "partial");
        assert!(rx.recv().await.unwrap().is_err());
    }
}
