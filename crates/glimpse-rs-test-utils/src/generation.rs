use async_trait::async_trait;
use futures_util::stream;
use futures_util::StreamExt;
use glimpse_rs_core::{ByteStream, GenerationClient, GenerationRequest, GlimpseCoreError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// One SSE `data:` line carrying `text` as the first candidate part.
pub fn sse_data_line(text: &str) -> String {
    format!(
        "data: {}\n",
        serde_json::json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })
    )
}

#[derive(Debug, Clone)]
enum Fragment {
    Bytes(Vec<u8>),
    Error(String),
}

/// Generation client replaying a fixed byte script and recording requests.
#[derive(Debug, Clone)]
pub struct ScriptedGenerationClient {
    fragments: Vec<Fragment>,
    delay: Option<Duration>,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl ScriptedGenerationClient {
    /// Stream each delta as its own SSE record, then the end sentinel.
    pub fn from_deltas(deltas: &[&str]) -> Self {
        let mut fragments: Vec<Fragment> = deltas
            .iter()
            .map(|delta| Fragment::Bytes(sse_data_line(delta).into_bytes()))
            .collect();
        fragments.push(Fragment::Bytes(b"data: [DONE]\n".to_vec()));
        Self::from_fragments(fragments)
    }

    /// Stream raw fragments exactly as given.
    pub fn from_chunks(chunks: Vec<Vec<u8>>) -> Self {
        Self::from_fragments(chunks.into_iter().map(Fragment::Bytes).collect())
    }

    fn from_fragments(fragments: Vec<Fragment>) -> Self {
        Self {
            fragments,
            delay: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Append a transport error after the scripted fragments.
    pub fn then_fail(mut self, message: impl Into<String>) -> Self {
        self.fragments.push(Fragment::Error(message.into()));
        self
    }

    /// Sleep before yielding each fragment.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl GenerationClient for ScriptedGenerationClient {
    async fn stream_generate(
        &self,
        request: GenerationRequest,
    ) -> Result<ByteStream, GlimpseCoreError> {
        self.requests.lock().push(request);
        let delay = self.delay;
        let fragments = stream::iter(self.fragments.clone()).then(move |fragment| async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            match fragment {
                Fragment::Bytes(bytes) => Ok(bytes),
                Fragment::Error(message) => Err(GlimpseCoreError::Transport(message)),
            }
        });
        Ok(Box::pin(fragments))
    }
}

/// Generation client whose initial response always fails.
#[derive(Debug, Clone)]
pub struct FailingGenerationClient {
    status: u16,
    message: String,
    calls: Arc<Mutex<usize>>,
}

impl FailingGenerationClient {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl GenerationClient for FailingGenerationClient {
    async fn stream_generate(
        &self,
        _request: GenerationRequest,
    ) -> Result<ByteStream, GlimpseCoreError> {
        *self.calls.lock() += 1;
        Err(GlimpseCoreError::Network {
            status: self.status,
            message: self.message.clone(),
        })
    }
}
