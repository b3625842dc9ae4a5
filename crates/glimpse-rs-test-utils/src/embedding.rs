use async_trait::async_trait;
use glimpse_rs_core::{EmbeddingClient, GlimpseCoreError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Embedding client returning fixed vectors per input text.
#[derive(Debug, Clone)]
pub struct StubEmbeddingClient {
    vectors: Arc<Mutex<HashMap<String, Vec<f32>>>>,
    fallback: Option<Vec<f32>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl StubEmbeddingClient {
    /// Client that fails for any text without a registered vector.
    pub fn new() -> Self {
        Self {
            vectors: Arc::new(Mutex::new(HashMap::new())),
            fallback: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Client answering every unregistered text with `fallback`.
    pub fn with_fallback(fallback: Vec<f32>) -> Self {
        Self {
            fallback: Some(fallback),
            ..Self::new()
        }
    }

    /// Register the vector returned for `text`.
    pub fn with(self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.lock().insert(text.into(), vector);
        self
    }

    /// Texts embedded so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl Default for StubEmbeddingClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingClient for StubEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GlimpseCoreError> {
        self.calls.lock().push(text.to_string());
        if let Some(vector) = self.vectors.lock().get(text) {
            return Ok(vector.clone());
        }
        self.fallback.clone().ok_or_else(|| GlimpseCoreError::Network {
            status: 500,
            message: format!("no stub embedding for `{text}`"),
        })
    }
}

/// Embedding client whose calls never complete.
#[derive(Debug, Clone, Default)]
pub struct PendingEmbeddingClient {
    calls: Arc<Mutex<usize>>,
}

impl PendingEmbeddingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl EmbeddingClient for PendingEmbeddingClient {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, GlimpseCoreError> {
        *self.calls.lock() += 1;
        std::future::pending().await
    }
}
