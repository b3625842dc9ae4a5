//! Core assistant primitives for Glimpse.
//!
//! This crate owns the remote embedding and generation clients, the streamed
//! answer decoder, per-key conversation state, and the `Assistant` that ties
//! them to the memory store.

mod api;
pub mod assistant;
pub mod conversation;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod prompt;
pub mod stream;

/// Assistant facade and ask handles.
pub use assistant::{
    Assistant, AssistantBuilder, AskOutcome, AskStream, MISSING_API_KEY_MESSAGE,
};
/// Conversation state storage.
pub use conversation::{
    ConversationPhase, ConversationState, ConversationStore, InMemoryConversationStore,
};
/// Remote clients.
pub use embedding::{EmbeddingClient, GeminiEmbeddingClient};
pub use error::GlimpseCoreError;
pub use generation::{ByteStream, GeminiGenerationClient, GenerationClient, GenerationRequest};
pub use glimpse_rs_protocol::EventSink;
/// Stream decoding.
pub use stream::{SseDecoder, StreamChunk, decode_stream};
