//! Streaming text generation clients.

use crate::api::{model_url, response_to_error};
use crate::error::GlimpseCoreError;
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use glimpse_rs_config::GenerationConfig;
use glimpse_rs_protocol::Turn;
use log::debug;
use serde::Serialize;
use std::pin::Pin;

/// Raw response body fragments in transport order.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, GlimpseCoreError>> + Send>>;

/// A single generation call: conversation turns plus sampling settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub turns: Vec<Turn>,
    pub system_instruction: Option<String>,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl GenerationRequest {
    /// Build a request for `turns` using the configured sampling settings.
    pub fn from_config(turns: Vec<Turn>, config: &GenerationConfig) -> Self {
        Self {
            turns,
            system_instruction: config.system_instruction.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        }
    }
}

#[async_trait]
/// Starts a streamed generation and hands back the raw event stream.
///
/// Implementations validate the initial response before returning, so a
/// non-success status surfaces here rather than mid-stream.
pub trait GenerationClient: Send + Sync {
    async fn stream_generate(
        &self,
        request: GenerationRequest,
    ) -> Result<ByteStream, GlimpseCoreError>;
}

/// Client for the `streamGenerateContent` endpoint in SSE mode.
#[derive(Debug, Clone)]
pub struct GeminiGenerationClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiGenerationClient {
    pub fn new(
        config: &GenerationConfig,
        api_key: impl Into<String>,
    ) -> Result<Self, GlimpseCoreError> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            api_key: api_key.into(),
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody<'a> {
    contents: Vec<WireContent<'a>>,
    generation_config: WireGenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireInstruction<'a>>,
}

#[derive(Serialize)]
struct WireContent<'a> {
    role: &'static str,
    parts: [WirePart<'a>; 1],
}

#[derive(Serialize)]
struct WirePart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Serialize)]
struct WireInstruction<'a> {
    parts: [WirePart<'a>; 1],
}

impl<'a> GenerateBody<'a> {
    fn from_request(request: &'a GenerationRequest) -> Self {
        Self {
            contents: request
                .turns
                .iter()
                .map(|turn| WireContent {
                    role: turn.role.as_str(),
                    parts: [WirePart { text: &turn.text }],
                })
                .collect(),
            generation_config: WireGenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
            },
            system_instruction: request
                .system_instruction
                .as_deref()
                .map(|text| WireInstruction {
                    parts: [WirePart { text }],
                }),
        }
    }
}

#[async_trait]
impl GenerationClient for GeminiGenerationClient {
    async fn stream_generate(
        &self,
        request: GenerationRequest,
    ) -> Result<ByteStream, GlimpseCoreError> {
        let body = GenerateBody::from_request(&request);
        debug!(
            "starting generation stream (model={}, turns={})",
            self.model,
            request.turns.len()
        );
        let response = self
            .http
            .post(model_url(&self.base_url, &self.model, "streamGenerateContent"))
            .query(&[("alt", "sse"), ("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(response_to_error(response).await);
        }
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(GlimpseCoreError::from));
        Ok(Box::pin(stream))
    }
}
