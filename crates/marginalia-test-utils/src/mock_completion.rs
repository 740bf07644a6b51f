// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock streaming completion provider.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use marginalia_core::{
    AdapterType, ByteStream, ChatMessage, CompletionProvider, MarginaliaError, PluginAdapter,
};

#[derive(Debug, Clone)]
enum Script {
    Chunks(Vec<Bytes>),
    FailOnStart(String),
    FailMidStream(Vec<Bytes>, String),
}

/// Sets the flag when the response stream is dropped.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// A completion provider that replays a fixed response body.
///
/// Every request is recorded so tests can inspect the conversation that was
/// actually sent upstream.
#[derive(Debug, Clone)]
pub struct MockCompletion {
    script: Script,
    chunk_delay: Option<Duration>,
    requests: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
    stream_dropped: Arc<AtomicBool>,
}

/// One `data:` line carrying an assistant delta.
pub fn delta_line(content: &str) -> String {
    let payload = serde_json::json!({
        "choices": [{ "index": 0, "delta": { "content": content } }]
    });
    format!("data: {payload}\n\n")
}

impl MockCompletion {
    fn from_script(script: Script) -> Self {
        Self {
            script,
            chunk_delay: None,
            requests: Arc::new(Mutex::new(Vec::new())),
            stream_dropped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replays the given raw chunks verbatim.
    pub fn with_chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_script(Script::Chunks(
            chunks.into_iter().map(|c| Bytes::from(c.into())).collect(),
        ))
    }

    /// One delta line per piece of text, then `data: [DONE]`.
    pub fn with_deltas(pieces: &[&str]) -> Self {
        let mut chunks: Vec<String> = pieces.iter().map(|p| delta_line(p)).collect();
        chunks.push("data: [DONE]\n\n".to_string());
        Self::with_chunks(chunks)
    }

    /// The request itself fails before any byte is produced.
    pub fn failing(message: &str) -> Self {
        Self::from_script(Script::FailOnStart(message.to_string()))
    }

    /// Emits `chunks`, then the stream yields an error.
    pub fn failing_after<I, S>(chunks: I, message: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_script(Script::FailMidStream(
            chunks.into_iter().map(|c| Bytes::from(c.into())).collect(),
            message.to_string(),
        ))
    }

    /// Sleeps before each chunk.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Conversations received, in call order.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    /// Whether a response stream handed out by this provider has been dropped.
    pub fn stream_dropped(&self) -> bool {
        self.stream_dropped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PluginAdapter for MockCompletion {
    fn name(&self) -> &str {
        "mock-completion"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Completion
    }
}

#[async_trait]
impl CompletionProvider for MockCompletion {
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<ByteStream, MarginaliaError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }

        let (chunks, tail) = match &self.script {
            Script::FailOnStart(message) => {
                return Err(MarginaliaError::UpstreamCompletion {
                    message: message.clone(),
                    source: None,
                });
            }
            Script::Chunks(chunks) => (chunks.clone(), None),
            Script::FailMidStream(chunks, message) => (chunks.clone(), Some(message.clone())),
        };

        let mut items: Vec<Result<Bytes, MarginaliaError>> = chunks.into_iter().map(Ok).collect();
        if let Some(message) = tail {
            items.push(Err(MarginaliaError::UpstreamCompletion {
                message,
                source: None,
            }));
        }

        let delay = self.chunk_delay;
        let guard = DropFlag(Arc::clone(&self.stream_dropped));
        let stream = futures::stream::iter(items)
            .then(move |item| async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                item
            })
            .map(move |item| {
                let _alive = &guard;
                item
            });
        Ok(Box::pin(stream))
    }
}
