//! Wire protocol types for Glimpse requests, events, and conversation turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a conversation (typically one browser tab).
pub type ConversationKey = String;
/// Unique identifier for a single ask invocation.
pub type TurnId = Uuid;
/// Unique identifier for an inbound request.
pub type RequestId = Uuid;
/// Identifier assigned to a saved memory.
pub type MemoryId = u64;

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Text written by the user.
    User,
    /// Text generated by the model.
    Model,
}

impl Role {
    /// Role name as understood by the generation endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// One message of a conversation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    /// Build a user turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    /// Build a model turn.
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// Arguments of an ask operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AskRequest {
    /// Conversation the question belongs to.
    pub key: ConversationKey,
    /// Highlighted question text.
    pub question: String,
    /// Text content of the page the question was asked on.
    #[serde(default)]
    pub page_context: String,
    /// Discard prior history for the key before answering.
    #[serde(default)]
    pub is_new_search: bool,
}

/// Wrapper for requests delivered by the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Unique id for the request.
    pub id: RequestId,
    /// Timestamp when the request was created.
    pub created_at: DateTime<Utc>,
    /// Request payload content.
    pub payload: Request,
}

impl RequestEnvelope {
    /// Wrap a payload with a fresh id and timestamp.
    pub fn new(payload: Request) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            payload,
        }
    }
}

/// Every operation the transport layer can invoke.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "payload")]
pub enum Request {
    /// Ask a question and stream the answer.
    Ask(AskRequest),
    /// Persist a snippet into memory.
    Save {
        text: String,
        #[serde(default)]
        source_url: String,
    },
    /// List all saved memories.
    ListMemories,
    /// Delete a saved memory.
    DeleteMemory { id: MemoryId },
    /// Drop the turn history of a conversation.
    EndConversation { key: ConversationKey },
}

/// Display view of a saved memory (embedding omitted).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemorySummary {
    pub id: MemoryId,
    pub text: String,
    pub source_url: String,
    pub created_at: DateTime<Utc>,
}

/// Wrapper for events emitted back to the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMsg {
    /// Unique id for the event.
    pub id: Uuid,
    /// Request that produced the event, when known.
    #[serde(default)]
    pub request_id: Option<RequestId>,
    /// Timestamp when the event was created.
    pub created_at: DateTime<Utc>,
    /// Event payload content.
    pub payload: EventPayload,
}

impl EventMsg {
    /// Build an event with a fresh id and timestamp.
    pub fn new(request_id: Option<RequestId>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id,
            created_at: Utc::now(),
            payload,
        }
    }
}

/// All events emitted by the assistant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "type", content = "payload")]
pub enum EventPayload {
    /// An ask began processing.
    AnswerStarted {
        key: ConversationKey,
        turn_id: TurnId,
    },
    /// Streaming answer delta.
    AnswerDelta { turn_id: TurnId, delta: String },
    /// Answer stream finished successfully.
    AnswerCompleted { turn_id: TurnId },
    /// Answer stream ended with a terminal error.
    AnswerFailed { turn_id: TurnId, message: String },
    /// A memory was persisted.
    MemorySaved { id: MemoryId },
    /// Persisting a memory failed.
    MemorySaveFailed { message: String },
    /// Current contents of the memory store.
    MemoryList { memories: Vec<MemorySummary> },
    /// A delete request was processed.
    MemoryDeleted { id: MemoryId, removed: bool },
    /// Conversation history was dropped.
    ConversationEnded { key: ConversationKey, existed: bool },
    /// Request-level error not tied to an answer stream.
    Error { message: String },
}

impl EventPayload {
    /// True for events that end an answer stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventPayload::AnswerCompleted { .. } | EventPayload::AnswerFailed { .. }
        )
    }
}

/// Sink interface for assistant events.
pub trait EventSink: Send + Sync {
    /// Emit an event to downstream listeners.
    fn emit(&self, event: EventMsg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn ask_request_decodes_with_defaults() {
        let envelope: RequestEnvelope = serde_json::from_value(json!({
            "id": Uuid::nil(),
            "created_at": "2024-01-01T00:00:00Z",
            "payload": {
                "type": "ask",
                "payload": { "key": "tab-1", "question": "why?" }
            }
        }))
        .expect("decode");

        let Request::Ask(ask) = envelope.payload else {
            panic!("expected ask request");
        };
        assert_eq!(
            ask,
            AskRequest {
                key: "tab-1".to_string(),
                question: "why?".to_string(),
                page_context: String::new(),
                is_new_search: false,
            }
        );
    }

    #[test]
    fn unit_requests_use_type_tag_only() {
        let request: Request =
            serde_json::from_value(json!({ "type": "list_memories" })).expect("decode");
        assert!(matches!(request, Request::ListMemories));

        let encoded = serde_json::to_value(Request::DeleteMemory { id: 7 }).expect("encode");
        assert_eq!(
            encoded,
            json!({ "type": "delete_memory", "payload": { "id": 7 } })
        );
    }

    #[test]
    fn event_payload_encodes_tagged() {
        let turn_id = Uuid::nil();
        let encoded = serde_json::to_value(EventPayload::AnswerDelta {
            turn_id,
            delta: "Hi".to_string(),
        })
        .expect("encode");
        assert_eq!(
            encoded,
            json!({
                "type": "answer_delta",
                "payload": { "turn_id": turn_id, "delta": "Hi" }
            })
        );
    }

    #[test]
    fn terminal_events_are_flagged() {
        let turn_id = Uuid::nil();
        assert!(EventPayload::AnswerCompleted { turn_id }.is_terminal());
        assert!(
            EventPayload::AnswerFailed {
                turn_id,
                message: "boom".to_string()
            }
            .is_terminal()
        );
        assert!(
            !EventPayload::AnswerDelta {
                turn_id,
                delta: "x".to_string()
            }
            .is_terminal()
        );
    }

    #[test]
    fn role_names_match_generation_endpoint() {
        assert_eq!(Role::User.as_str(), "user");
        assert_eq!(Role::Model.as_str(), "model");
        assert_eq!(Turn::user("q").role, Role::User);
    }
}
