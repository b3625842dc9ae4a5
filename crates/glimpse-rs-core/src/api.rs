//! Helpers shared by the remote embedding and generation clients.

use crate::error::GlimpseCoreError;
use reqwest::Response;
use serde_json::Value;

/// Raw error bodies longer than this are cut before being shown to the user.
const MAX_ERROR_BODY_CHARS: usize = 100;

/// `{base_url}/models/{model}:{method}`.
pub(crate) fn model_url(base_url: &str, model: &str, method: &str) -> String {
    format!("{}/models/{model}:{method}", base_url.trim_end_matches('/'))
}

/// Convert a non-success response into a `Network` error.
pub(crate) async fn response_to_error(response: Response) -> GlimpseCoreError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    GlimpseCoreError::Network {
        status,
        message: error_message(&body),
    }
}

/// `error.message` when the body is JSON, otherwise a truncated copy of the body.
pub(crate) fn error_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => value
            .pointer("/error/message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        Err(_) => {
            let truncated: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            format!("{truncated}...")
        }
    }
}
