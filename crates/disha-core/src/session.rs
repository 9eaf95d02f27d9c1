//! Conversation sessions.
//!
//! A session owns one conversation history and a turn state machine.
//! Sessions live in an LRU store; evicting or disposing one never
//! interrupts a turn already running against it, because turns hold
//! their own `Arc` to the session.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::model::ChatMessage;

/// Where a session is in its turn lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// Ready for the next user turn
    Idle,
    /// User turn sent, waiting on the model's dispatch decision
    AwaitingModel,
    /// Executing tool calls
    Dispatching,
    /// Forwarding the streamed answer
    Streaming,
    /// Disposed; never leaves this state
    Closed,
}

/// One conversation: history plus turn state.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub history: Vec<ChatMessage>,
    pub state: TurnState,
}

impl Session {
    fn new(id: String, system_instruction: &str) -> Self {
        Self {
            id,
            history: vec![ChatMessage::system(system_instruction)],
            state: TurnState::Idle,
        }
    }
}

/// LRU-bounded session store. The outer lock only guards the map;
/// per-session locks are tokio mutexes so a turn can hold one across
/// awaits.
pub struct SessionStore {
    sessions: Mutex<LruCache<String, Arc<tokio::sync::Mutex<Session>>>>,
    system_instruction: String,
}

impl SessionStore {
    pub fn new(max_sessions: usize, system_instruction: impl Into<String>) -> Self {
        let capacity = NonZeroUsize::new(max_sessions.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            sessions: Mutex::new(LruCache::new(capacity)),
            system_instruction: system_instruction.into(),
        }
    }

    /// Create a session and return its id. May evict the least recently
    /// used session when the store is full.
    pub fn create(&self) -> String {
        let id = Uuid::new_v4().to_string();
        let session = Arc::new(tokio::sync::Mutex::new(Session::new(
            id.clone(),
            &self.system_instruction,
        )));

        let mut sessions = self.sessions.lock().expect("session store poisoned");
        if let Some((evicted_id, _)) = sessions.push(id.clone(), session) {
            if evicted_id != id {
                warn!("Session store full, evicted {}", evicted_id);
            }
        }

        debug!("Created session {}", id);
        id
    }

    /// Touch a session, marking it most recently used. Returns whether
    /// it exists.
    pub fn switch(&self, id: &str) -> bool {
        self.sessions
            .lock()
            .expect("session store poisoned")
            .get(id)
            .is_some()
    }

    pub fn get(&self, id: &str) -> Option<Arc<tokio::sync::Mutex<Session>>> {
        self.sessions
            .lock()
            .expect("session store poisoned")
            .get(id)
            .cloned()
    }

    /// Remove a session. A turn still holding the session keeps its Arc;
    /// the closed state stops any further turns.
    pub fn dispose(&self, id: &str) -> bool {
        let removed = self
            .sessions
            .lock()
            .expect("session store poisoned")
            .pop(id);

        match removed {
            Some(session) => {
                // Best effort: if a turn holds the lock the session is
                // unreachable from the store anyway
                if let Ok(mut guard) = session.try_lock() {
                    guard.state = TurnState::Closed;
                }
                debug!("Disposed session {}", id);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().expect("session store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
