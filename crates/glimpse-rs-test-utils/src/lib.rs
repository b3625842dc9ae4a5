//! Test helpers shared across Glimpse crates.

pub mod embedding;
pub mod events;
pub mod generation;

pub use embedding::{PendingEmbeddingClient, StubEmbeddingClient};
pub use events::RecordingEventSink;
pub use generation::{FailingGenerationClient, ScriptedGenerationClient, sse_data_line};
