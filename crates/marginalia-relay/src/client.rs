// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for OpenAI-compatible chat completion APIs.
//!
//! Provides [`OpenAiCompatClient`] which handles request construction,
//! authentication, and transient error retry. The streamed body is handed
//! back undecoded; the relay forwards it line by line.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use marginalia_config::model::CompletionConfig;
use marginalia_core::{
    AdapterType, ByteStream, ChatMessage, CompletionProvider, MarginaliaError, PluginAdapter,
    Role,
};
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::{debug, warn};

use crate::types::{ApiErrorResponse, CompletionRequest};

/// HTTP client for the completion endpoint.
///
/// Retries once on transient errors (429, 500, 503, 529) before any byte of
/// the body has been read.
#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    system_prompt: Option<String>,
    max_retries: u32,
    retry_delay: Duration,
}

impl OpenAiCompatClient {
    /// Builds a client from configuration. Fails when no API key is set.
    pub fn new(config: &CompletionConfig) -> Result<Self, MarginaliaError> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                MarginaliaError::Config(
                    "completion.api_key is not set (or MARGINALIA_COMPLETION_API_KEY)".into(),
                )
            })?;

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| MarginaliaError::Config(format!("invalid API key header value: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MarginaliaError::UpstreamCompletion {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            system_prompt: config.system_prompt.clone(),
            max_retries: 1,
            retry_delay: Duration::from_secs(1),
        })
    }

    /// Overrides the pause before a retry.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Prepends the configured system prompt unless the conversation has one.
    fn prepare_messages(&self, messages: &[ChatMessage]) -> Vec<ChatMessage> {
        match &self.system_prompt {
            Some(prompt) if !messages.iter().any(|m| m.role == Role::System) => {
                let mut out = Vec::with_capacity(messages.len() + 1);
                out.push(ChatMessage::system(prompt.clone()));
                out.extend_from_slice(messages);
                out
            }
            _ => messages.to_vec(),
        }
    }
}

#[async_trait]
impl PluginAdapter for OpenAiCompatClient {
    fn name(&self) -> &str {
        "openai-compat"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Completion
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatClient {
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<ByteStream, MarginaliaError> {
        let messages = self.prepare_messages(messages);
        let body = CompletionRequest {
            model: &self.model,
            messages: &messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream: true,
        };

        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, "retrying completion request after transient error");
                tokio::time::sleep(self.retry_delay).await;
            }

            let response = self
                .client
                .post(&self.url)
                .json(&body)
                .send()
                .await
                .map_err(|e| MarginaliaError::UpstreamCompletion {
                    message: format!("HTTP request failed: {e}"),
                    source: Some(Box::new(e)),
                })?;

            let status = response.status();
            debug!(%status, attempt, model = %self.model, "completion response received");

            if status.is_success() {
                let stream = response.bytes_stream().map(|chunk| {
                    chunk.map_err(|e| MarginaliaError::UpstreamCompletion {
                        message: format!("completion stream interrupted: {e}"),
                        source: Some(Box::new(e)),
                    })
                });
                return Ok(Box::pin(stream));
            }

            let text = response.text().await.unwrap_or_default();
            if is_transient_error(status) && attempt < self.max_retries {
                warn!(%status, body = %text, "transient error, will retry");
                last_error = Some(MarginaliaError::UpstreamCompletion {
                    message: format!("API returned {status}: {text}"),
                    source: None,
                });
                continue;
            }

            let message = match serde_json::from_str::<ApiErrorResponse>(&text) {
                Ok(api_err) => format!("completion API error {status}: {}", api_err.error.describe()),
                Err(_) => format!("API returned {status}: {text}"),
            };
            return Err(MarginaliaError::UpstreamCompletion {
                message,
                source: None,
            });
        }

        Err(last_error.unwrap_or_else(|| MarginaliaError::UpstreamCompletion {
            message: "completion request failed after retries".into(),
            source: None,
        }))
    }
}

/// Returns true for HTTP status codes that indicate transient errors worth retrying.
fn is_transient_error(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 503 | 529)
}
