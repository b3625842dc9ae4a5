//! Configuration schema for Glimpse.

use serde::{Deserialize, Serialize};

/// Root config for the Glimpse engine.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GlimpseConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

impl GlimpseConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> GlimpseConfigBuilder {
        GlimpseConfigBuilder::new()
    }

    /// Resolve the API credential from the explicit key or the configured env var.
    ///
    /// Returns `None` when neither source yields a non-empty value.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = self.credentials.api_key.as_deref()
            && !key.trim().is_empty()
        {
            return Some(key.trim().to_string());
        }
        let var = self.credentials.api_key_env.as_deref()?;
        std::env::var(var)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

/// Builder for assembling a `GlimpseConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct GlimpseConfigBuilder {
    config: GlimpseConfig,
}

impl GlimpseConfigBuilder {
    /// Create a new builder seeded with default config values.
    pub fn new() -> Self {
        Self {
            config: GlimpseConfig::default(),
        }
    }

    /// Set an explicit API key.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.credentials.api_key = Some(api_key.into());
        self
    }

    /// Replace the generation configuration.
    pub fn generation(mut self, generation: GenerationConfig) -> Self {
        self.config.generation = generation;
        self
    }

    /// Replace the embedding configuration.
    pub fn embedding(mut self, embedding: EmbeddingConfig) -> Self {
        self.config.embedding = embedding;
        self
    }

    /// Replace the memory configuration.
    pub fn memory(mut self, memory: MemoryConfig) -> Self {
        self.config.memory = memory;
        self
    }

    /// Replace the prompt configuration.
    pub fn prompt(mut self, prompt: PromptConfig) -> Self {
        self.config.prompt = prompt;
        self
    }

    /// Finalize and return the built `GlimpseConfig`.
    pub fn build(self) -> GlimpseConfig {
        self.config
    }
}

/// API credential sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: Option<String>,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_api_key_env() -> Option<String> {
    Some("GEMINI_API_KEY".to_string())
}

/// Remote text generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_system_instruction")]
    pub system_instruction: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_generation_model(),
            base_url: default_base_url(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            system_instruction: default_system_instruction(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_generation_model() -> String {
    "gemini-2.0-flash-exp".to_string()
}

/// Default API root shared by generation and embedding endpoints.
fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_output_tokens() -> u32 {
    2048
}

fn default_system_instruction() -> Option<String> {
    Some(
        "You are a helpful AI assistant. Answer questions concisely based on the provided \
         context. If the answer isn't in the context, say so briefly."
            .to_string(),
    )
}

fn default_request_timeout_secs() -> u64 {
    120
}

/// Remote embedding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Upper bound for one embedding call; an expired question lookup recalls nothing.
    #[serde(default = "default_embedding_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            base_url: default_base_url(),
            request_timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-004".to_string()
}

fn default_embedding_timeout_secs() -> u64 {
    15
}

/// Personal memory store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_memory_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_recall_k")]
    pub recall_k: usize,
    #[serde(default = "default_min_score")]
    pub min_score: f32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: default_memory_enabled(),
            path: None,
            recall_k: default_recall_k(),
            min_score: default_min_score(),
        }
    }
}

fn default_memory_enabled() -> bool {
    true
}

/// Default number of memories injected into a prompt.
fn default_recall_k() -> usize {
    3
}

/// Default similarity a memory must exceed to be injected.
fn default_min_score() -> f32 {
    0.6
}

/// Prompt assembly settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default = "default_context_chars")]
    pub context_chars: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            context_chars: default_context_chars(),
        }
    }
}

/// Default page-context prefix length in characters.
fn default_context_chars() -> usize {
    8000
}

/// Overlay display settings. Carried for the UI; unused by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_bg_color")]
    pub bg_color: String,
    #[serde(default = "default_text_color")]
    pub text_color: String,
    #[serde(default = "default_transparency")]
    pub transparency: f32,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            bg_color: default_bg_color(),
            text_color: default_text_color(),
            transparency: default_transparency(),
            window_width: default_window_width(),
            window_height: default_window_height(),
        }
    }
}

fn default_bg_color() -> String {
    "#282a36".to_string()
}

fn default_text_color() -> String {
    "#f8f8f2".to_string()
}

fn default_transparency() -> f32 {
    0.95
}

fn default_window_width() -> u32 {
    300
}

fn default_window_height() -> u32 {
    200
}
