//! Text embedding clients.

use crate::api::{model_url, response_to_error};
use crate::error::GlimpseCoreError;
use async_trait::async_trait;
use glimpse_rs_config::EmbeddingConfig;
use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[async_trait]
/// Turns text into a fixed-length vector.
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GlimpseCoreError>;
}

/// Client for the `embedContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiEmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiEmbeddingClient {
    pub fn new(
        config: &EmbeddingConfig,
        api_key: impl Into<String>,
    ) -> Result<Self, GlimpseCoreError> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.request_timeout_secs))
                .build()?,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            api_key: api_key.into(),
        })
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: String,
    content: EmbedContent<'a>,
}

#[derive(Serialize)]
struct EmbedContent<'a> {
    parts: [EmbedPart<'a>; 1],
}

#[derive(Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[async_trait]
impl EmbeddingClient for GeminiEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GlimpseCoreError> {
        if text.trim().is_empty() {
            return Err(GlimpseCoreError::InvalidRequest(
                "cannot embed empty text".to_string(),
            ));
        }
        let body = EmbedRequest {
            model: format!("models/{}", self.model),
            content: EmbedContent {
                parts: [EmbedPart { text }],
            },
        };
        let response = self
            .http
            .post(model_url(&self.base_url, &self.model, "embedContent"))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(response_to_error(response).await);
        }
        let parsed: EmbedResponse = response.json().await?;
        debug!(
            "embedding received (model={}, text_len={}, dims={})",
            self.model,
            text.len(),
            parsed.embedding.values.len()
        );
        Ok(parsed.embedding.values)
    }
}
