//! Conversation orchestrator.
//!
//! Drives one turn end to end: user text goes to the model with the
//! tool declarations, tool calls are dispatched against retrieval, and
//! the grounded answer streams back as fragments. Turn failures become
//! a single error fragment; the session returns to idle and stays
//! usable.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::aggregate::{AggregateOutcome, Aggregator};
use crate::context;
use crate::error::EngineError;
use crate::fusion::ScoredDocument;
use crate::model::{ChatMessage, ChatModel, FunctionCall};
use crate::resolver::ContentResolver;
use crate::schema::DOC_ID_SENTINEL;
use crate::session::{SessionStore, TurnState};
use crate::tools::{self, SearchMode, ToolInvocation};

/// Fragment channel depth; model streams are consumed at forwarding pace
const FRAGMENT_CHANNEL_CAPACITY: usize = 16;

/// Persona and grounding rules for the conversational model.
pub const SYSTEM_INSTRUCTION: &str = "You are an assistant that helps users interact with NITI Aayog's NITI For States platform. You will be provided the relevant information in the context. Answer only in the language of the original query. Limit your answers to the context. If the context is not sufficient, say so. Do not answer from outside the context. If listing practices and policies, briefly describe them as well. Provide sources and links for any text you use. Link the source beneath the referenced text with the label 'Source'.";

/// One streamed piece of an answer. Empty model deltas are surfaced, not
/// dropped, so consumers see the stream's true shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Text(String),
    Empty,
}

/// Handle to a running turn. Dropping or cancelling it aborts the turn
/// task; the session itself is left to return to idle on its own.
#[derive(Debug)]
pub struct TurnStream {
    rx: mpsc::Receiver<Fragment>,
    task: JoinHandle<()>,
}

impl TurnStream {
    /// Next fragment, or `None` when the turn is finished.
    pub async fn next(&mut self) -> Option<Fragment> {
        self.rx.recv().await
    }

    /// Abort the turn. Already-queued fragments are discarded.
    pub fn cancel(self) {
        self.task.abort();
    }
}

impl Drop for TurnStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct Orchestrator {
    model: Arc<dyn ChatModel>,
    aggregator: Aggregator,
    resolver: ContentResolver,
    sessions: SessionStore,
}

impl Orchestrator {
    pub fn new(
        model: Arc<dyn ChatModel>,
        aggregator: Aggregator,
        resolver: ContentResolver,
        sessions: SessionStore,
    ) -> Self {
        Self {
            model,
            aggregator,
            resolver,
            sessions,
        }
    }

    pub fn create_session(&self) -> String {
        self.sessions.create()
    }

    pub fn switch_session(&self, id: &str) -> bool {
        self.sessions.switch(id)
    }

    pub fn dispose_session(&self, id: &str) -> bool {
        self.sessions.dispose(id)
    }

    /// Run one conversational turn. Returns a stream of answer fragments;
    /// the turn itself runs on a spawned task so the caller can consume
    /// at its own pace or cancel.
    pub fn process_turn(
        self: &Arc<Self>,
        session_id: &str,
        text: &str,
        collections: &[String],
    ) -> Result<TurnStream, EngineError> {
        let session = self
            .sessions
            .get(session_id)
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;

        let (tx, rx) = mpsc::channel(FRAGMENT_CHANNEL_CAPACITY);
        let orchestrator = Arc::clone(self);
        let text = text.to_string();
        let collections = collections.to_vec();

        let task = tokio::spawn(async move {
            let mut session = session.lock().await;
            if session.state == TurnState::Closed {
                let _ = tx
                    .send(Fragment::Text(
                        "An error occurred: session is closed".to_string(),
                    ))
                    .await;
                return;
            }

            if let Err(e) = orchestrator
                .run_turn(&mut session, &text, &collections, &tx)
                .await
            {
                warn!("Turn failed in session {}: {}", session.id, e);
                let _ = tx
                    .send(Fragment::Text(format!("An error occurred: {}", e)))
                    .await;
            }
            session.state = TurnState::Idle;
        });

        Ok(TurnStream { rx, task })
    }

    async fn run_turn(
        &self,
        session: &mut crate::session::Session,
        text: &str,
        collections: &[String],
        tx: &mpsc::Sender<Fragment>,
    ) -> Result<(), EngineError> {
        session.history.push(ChatMessage::user(text));
        session.state = TurnState::AwaitingModel;

        let declarations = tools::declarations();
        let turn = self.model.chat(&session.history, &declarations).await?;

        if !turn.has_calls() {
            // Direct answer, no retrieval: forward the text unchanged
            let answer = turn.text.unwrap_or_default();
            session.history.push(ChatMessage::assistant(answer.clone()));
            let fragment = if answer.is_empty() {
                Fragment::Empty
            } else {
                Fragment::Text(answer)
            };
            let _ = tx.send(fragment).await;
            return Ok(());
        }

        session.state = TurnState::Dispatching;
        session
            .history
            .push(ChatMessage::assistant_calls(turn.raw_calls.clone()));

        for call in &turn.calls {
            let content = self.dispatch(call, collections).await?;
            session.history.push(ChatMessage::tool(&call.id, content));
        }

        session.state = TurnState::Streaming;
        let mut stream = self.model.chat_stream(&session.history).await?;

        let mut answer = String::new();
        while let Some(item) = stream.recv().await {
            match item {
                Ok(delta) => {
                    answer.push_str(&delta);
                    let fragment = if delta.is_empty() {
                        Fragment::Empty
                    } else {
                        Fragment::Text(delta)
                    };
                    if tx.send(fragment).await.is_err() {
                        // Consumer went away; keep the partial answer
                        break;
                    }
                }
                Err(e) => {
                    if !answer.is_empty() {
                        session.history.push(ChatMessage::assistant(answer));
                    }
                    return Err(e.into());
                }
            }
        }

        session.history.push(ChatMessage::assistant(answer));
        Ok(())
    }

    /// Dispatch one tool call to retrieval. A malformed call yields a
    /// diagnostic tool response instead of failing the turn; the model
    /// sees what went wrong and can recover in its answer.
    async fn dispatch(
        &self,
        call: &FunctionCall,
        collections: &[String],
    ) -> Result<String, EngineError> {
        let invocation = match ToolInvocation::validate(call) {
            Ok(invocation) => invocation,
            Err(e) => {
                warn!("Skipping malformed tool call {}: {}", call.name, e);
                return Ok(format!("Tool call could not be executed: {}", e));
            }
        };

        match invocation {
            ToolInvocation::SearchDocuments {
                formatted_query,
                mode,
                limit,
            } => {
                let outcome = self
                    .aggregator
                    .search(&formatted_query, collections, limit)
                    .await?;

                match mode {
                    SearchMode::Search => {
                        let curated = flatten_curated(&outcome, collections);
                        Ok(context::assemble(&curated, &outcome.uncurated))
                    }
                    SearchMode::Qna => {
                        let curated = flatten_curated(&outcome, collections);
                        let doc_ids: Vec<String> = curated
                            .iter()
                            .filter_map(|doc| doc.doc_id())
                            .filter(|id| *id != DOC_ID_SENTINEL)
                            .map(|id| id.to_string())
                            .collect();

                        // Content search reuses the first collection's
                        // planned vector string when one exists
                        let intent = collections
                            .first()
                            .and_then(|c| outcome.plans.get(c))
                            .map(|plan| plan.vector_string.clone())
                            .unwrap_or(formatted_query);

                        let chunks = self.resolver.resolve(&intent, &doc_ids, None).await?;
                        debug!(chunks = chunks.len(), "qna content resolved");
                        Ok(context::assemble(&chunks, &outcome.uncurated))
                    }
                }
            }
            ToolInvocation::SearchContent {
                intent,
                doc_ids,
                limit,
            } => {
                let chunks = self.resolver.resolve(&intent, &doc_ids, limit).await?;
                Ok(context::assemble(&chunks, &[]))
            }
        }
    }
}

/// Flatten curated results into one list, in the caller's collection
/// order so context assembly is deterministic.
fn flatten_curated(outcome: &AggregateOutcome, collections: &[String]) -> Vec<ScoredDocument> {
    let mut flat = Vec::new();
    for collection in collections {
        if let Some(docs) = outcome.curated.get(collection) {
            flat.extend(docs.iter().cloned());
        }
    }
    flat
}
