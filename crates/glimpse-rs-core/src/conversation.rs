//! Per-key conversation state.

use glimpse_rs_protocol::{ConversationKey, Turn};
use log::{debug, info};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Where an ask for a key currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConversationPhase {
    #[default]
    Idle,
    AwaitingMemory,
    AwaitingModel,
    Streaming,
}

/// History and phase of one conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationState {
    pub turns: Vec<Turn>,
    pub phase: ConversationPhase,
}

/// Storage for conversation state keyed by conversation key.
pub trait ConversationStore: Send + Sync {
    /// Create an empty conversation unless one already exists.
    fn create(&self, key: &str);
    /// Snapshot of a conversation.
    fn get(&self, key: &str) -> Option<ConversationState>;
    /// Replace a conversation with an empty one, creating it if missing.
    fn reset(&self, key: &str);
    /// Drop a conversation; returns whether it existed.
    fn destroy(&self, key: &str) -> bool;
    /// Append a turn, creating the conversation if missing.
    fn append_turn(&self, key: &str, turn: Turn);
    /// Record the phase of a conversation, creating it if missing.
    fn set_phase(&self, key: &str, phase: ConversationPhase);
    /// Current phase; unknown keys are idle.
    fn phase(&self, key: &str) -> ConversationPhase;
    /// All known keys, sorted.
    fn list_keys(&self) -> Vec<ConversationKey>;
}

/// Process-lifetime conversation store.
#[derive(Clone, Default)]
pub struct InMemoryConversationStore {
    conversations: Arc<RwLock<HashMap<ConversationKey, ConversationState>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConversationStore for InMemoryConversationStore {
    fn create(&self, key: &str) {
        self.conversations
            .write()
            .entry(key.to_string())
            .or_default();
    }

    fn get(&self, key: &str) -> Option<ConversationState> {
        self.conversations.read().get(key).cloned()
    }

    fn reset(&self, key: &str) {
        debug!("resetting conversation (key={})", key);
        self.conversations
            .write()
            .insert(key.to_string(), ConversationState::default());
    }

    fn destroy(&self, key: &str) -> bool {
        let existed = self.conversations.write().remove(key).is_some();
        info!("conversation ended (key={}, existed={})", key, existed);
        existed
    }

    fn append_turn(&self, key: &str, turn: Turn) {
        let mut conversations = self.conversations.write();
        let state = conversations.entry(key.to_string()).or_default();
        debug!(
            "appending turn (key={}, role={}, text_len={})",
            key,
            turn.role.as_str(),
            turn.text.len()
        );
        state.turns.push(turn);
    }

    fn set_phase(&self, key: &str, phase: ConversationPhase) {
        self.conversations
            .write()
            .entry(key.to_string())
            .or_default()
            .phase = phase;
    }

    fn phase(&self, key: &str) -> ConversationPhase {
        self.conversations
            .read()
            .get(key)
            .map(|state| state.phase)
            .unwrap_or_default()
    }

    fn list_keys(&self) -> Vec<ConversationKey> {
        let mut keys: Vec<_> = self.conversations.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}
