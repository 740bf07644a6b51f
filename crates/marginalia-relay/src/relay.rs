// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The chat relay: tool augmentation followed by a streamed completion.
//!
//! Each turn runs in its own task. The task writes [`RelayFrame`]s into a
//! bounded channel read by the HTTP response. When the client goes away
//! the channel closes, the task returns, and the upstream byte stream is
//! dropped, which aborts the completion request.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use marginalia_config::model::RelayConfig;
use marginalia_core::{BackendCredential, ChatMessage, CompletionProvider, MarginaliaError, Role};
use marginalia_tools::{Analyzer, ToolCall, ToolExecutor, ToolName, ToolResult, format_context};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::filter::LineFilter;

/// Shown to the user in place of a reply when the completion call fails.
pub const APOLOGY: &str = "抱歉，AI 服务暂时不可用，请稍后再试。";

/// One chat turn as received from the client.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub messages: Vec<ChatMessage>,
    pub use_tools: bool,
    pub credential: Option<BackendCredential>,
}

/// A unit written to the client stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayFrame {
    /// Which tool is running. Empty clears the indicator.
    Status(String),
    /// Upstream bytes after line filtering.
    Upstream(Bytes),
    /// Synthetic assistant delta carrying an apology.
    Apology(String),
    /// Terminal error event.
    Error(String),
}

impl RelayFrame {
    /// Server-sent-event bytes for this frame.
    pub fn encode(&self) -> Bytes {
        match self {
            Self::Upstream(bytes) => bytes.clone(),
            Self::Status(status) => event(&json!({ "type": "mcp_status", "status": status })),
            Self::Apology(text) => event(&json!({
                "choices": [{
                    "index": 0,
                    "delta": { "role": "assistant", "content": text },
                }]
            })),
            Self::Error(message) => event(&json!({ "type": "error", "error": message })),
        }
    }
}

fn event(payload: &serde_json::Value) -> Bytes {
    Bytes::from(format!("data: {payload}\n\n"))
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// The upstream stream ended normally.
    Completed,
    /// The completion call failed; the client received an error event.
    Failed(String),
    /// The client disconnected or the server is shutting down.
    Cancelled,
}

/// A running turn.
#[derive(Debug)]
pub struct RelayHandle {
    pub frames: mpsc::Receiver<RelayFrame>,
    pub task: JoinHandle<RelayOutcome>,
}

/// Drives chat turns. Cheap to clone.
#[derive(Clone)]
pub struct ChatRelay {
    inner: Arc<Inner>,
}

struct Inner {
    analyzer: Arc<Analyzer>,
    executor: Arc<ToolExecutor>,
    completion: Arc<dyn CompletionProvider>,
    tools_enabled: bool,
    status_pacing: Duration,
    sentinel: String,
    channel_capacity: usize,
}

/// The client is gone or the turn was cancelled.
struct Disconnected;

impl ChatRelay {
    /// `tools_enabled = false` relays every turn as-is, whatever the turn asks for.
    pub fn new(
        analyzer: Arc<Analyzer>,
        executor: Arc<ToolExecutor>,
        completion: Arc<dyn CompletionProvider>,
        config: &RelayConfig,
        tools_enabled: bool,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                analyzer,
                executor,
                completion,
                tools_enabled,
                status_pacing: Duration::from_millis(config.status_pacing_ms),
                sentinel: config.keepalive_sentinel.clone(),
                channel_capacity: config.channel_capacity.max(1),
            }),
        }
    }

    pub fn executor(&self) -> &Arc<ToolExecutor> {
        &self.inner.executor
    }

    pub fn completion(&self) -> &Arc<dyn CompletionProvider> {
        &self.inner.completion
    }

    /// Spawns the turn and returns its frame receiver.
    pub fn start(&self, turn: ChatTurn, cancel: CancellationToken) -> RelayHandle {
        let (tx, rx) = mpsc::channel(self.inner.channel_capacity);
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let outcome = inner.run(turn, &tx, &cancel).await;
            match &outcome {
                RelayOutcome::Completed => debug!("chat turn completed"),
                RelayOutcome::Failed(reason) => warn!(%reason, "chat turn failed"),
                RelayOutcome::Cancelled => info!("chat turn cancelled"),
            }
            outcome
        });
        RelayHandle { frames: rx, task }
    }
}

impl Inner {
    async fn run(
        &self,
        turn: ChatTurn,
        tx: &mpsc::Sender<RelayFrame>,
        cancel: &CancellationToken,
    ) -> RelayOutcome {
        let mut messages = turn.messages;

        if self.tools_enabled && turn.use_tools {
            match &turn.credential {
                Some(credential) => {
                    if self.augment(&mut messages, credential, tx, cancel).await.is_err() {
                        return RelayOutcome::Cancelled;
                    }
                }
                None => debug!("no backend credential, skipping tool augmentation"),
            }
        }
        if cancel.is_cancelled() {
            return RelayOutcome::Cancelled;
        }

        let started = tokio::select! {
            _ = cancel.cancelled() => return RelayOutcome::Cancelled,
            _ = tx.closed() => return RelayOutcome::Cancelled,
            started = self.completion.stream_chat(&messages) => started,
        };
        let mut upstream = match started {
            Ok(stream) => stream,
            Err(e) => return fail(tx, e).await,
        };

        let mut filter = LineFilter::new(&self.sentinel);
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return RelayOutcome::Cancelled,
                _ = tx.closed() => return RelayOutcome::Cancelled,
                next = upstream.next() => next,
            };
            match next {
                Some(Ok(chunk)) => {
                    let out = filter.push(&chunk);
                    if !out.is_empty() && tx.send(RelayFrame::Upstream(out)).await.is_err() {
                        return RelayOutcome::Cancelled;
                    }
                }
                Some(Err(e)) => return fail(tx, e).await,
                None => break,
            }
        }

        let rest = filter.finish();
        if !rest.is_empty() && tx.send(RelayFrame::Upstream(rest)).await.is_err() {
            return RelayOutcome::Cancelled;
        }
        debug!(
            saw_done = filter.saw_done(),
            sentinels_dropped = filter.dropped(),
            "upstream stream ended"
        );
        RelayOutcome::Completed
    }

    /// Runs the analyzer's tool calls and appends the context block to the
    /// last user message.
    async fn augment(
        &self,
        messages: &mut [ChatMessage],
        credential: &BackendCredential,
        tx: &mpsc::Sender<RelayFrame>,
        cancel: &CancellationToken,
    ) -> Result<(), Disconnected> {
        let Some(last) = messages.last_mut().filter(|m| m.role == Role::User) else {
            return Ok(());
        };
        let calls = self.analyzer.analyze(&last.content);
        if calls.is_empty() {
            return Ok(());
        }
        info!(tools = calls.len(), "augmenting question with reading notes");

        let mut results: Vec<ToolResult> = Vec::with_capacity(calls.len());
        for call in &calls {
            self.status(tx, running_label(call), cancel).await?;
            // Dropping the call abandons its in-flight backend requests.
            let executed = tokio::select! {
                _ = cancel.cancelled() => return Err(Disconnected),
                _ = tx.closed() => return Err(Disconnected),
                executed = self.executor.execute(call, credential) => executed,
            };
            match executed {
                Ok(result) => {
                    let done = format!("{} 完成，找到 {} 条结果", call.name, result.count);
                    self.status(tx, done, cancel).await?;
                    results.push(result);
                }
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "tool call failed, skipping");
                    self.status(tx, format!("{} 未能完成", call.name), cancel).await?;
                }
            }
        }
        send(tx, RelayFrame::Status(String::new())).await?;

        let context = format_context(&results);
        if !context.is_empty() {
            last.content.push_str(&context);
        }
        Ok(())
    }

    async fn status(
        &self,
        tx: &mpsc::Sender<RelayFrame>,
        status: String,
        cancel: &CancellationToken,
    ) -> Result<(), Disconnected> {
        send(tx, RelayFrame::Status(status)).await?;
        if !self.status_pacing.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(Disconnected),
                _ = tokio::time::sleep(self.status_pacing) => {}
            }
        }
        Ok(())
    }
}

async fn send(tx: &mpsc::Sender<RelayFrame>, frame: RelayFrame) -> Result<(), Disconnected> {
    tx.send(frame).await.map_err(|_| Disconnected)
}

/// Reports a completion failure to the client, then ends the turn.
async fn fail(tx: &mpsc::Sender<RelayFrame>, error: MarginaliaError) -> RelayOutcome {
    let message = error.to_string();
    if send(tx, RelayFrame::Apology(APOLOGY.to_string())).await.is_err()
        || send(tx, RelayFrame::Error(message.clone())).await.is_err()
    {
        return RelayOutcome::Cancelled;
    }
    RelayOutcome::Failed(message)
}

fn running_label(call: &ToolCall) -> String {
    let keyword = call
        .arguments
        .get("keyword")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    match call.name.parse::<ToolName>() {
        Ok(ToolName::GetBookshelf) => "正在查看你的书架".to_string(),
        Ok(ToolName::SearchBooks) => format!("正在搜索书籍：{keyword}"),
        Ok(ToolName::GetBookNotes) => "正在读取读书笔记".to_string(),
        Ok(ToolName::SearchNotes) => format!("正在搜索笔记：{keyword}"),
        Err(_) => format!("正在调用 {}", call.name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_frame_encoding() {
        let bytes = RelayFrame::Status("正在查看你的书架".into()).encode();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.starts_with("data: "));
        assert!(text.ends_with("\n\n"));
        let payload: serde_json::Value =
            serde_json::from_str(text.trim_start_matches("data: ").trim()).unwrap();
        assert_eq!(payload["type"], "mcp_status");
        assert_eq!(payload["status"], "正在查看你的书架");
    }

    #[test]
    fn apology_is_an_assistant_delta() {
        let bytes = RelayFrame::Apology(APOLOGY.into()).encode();
        let text = std::str::from_utf8(&bytes).unwrap();
        let payload: serde_json::Value =
            serde_json::from_str(text.trim_start_matches("data: ").trim()).unwrap();
        assert_eq!(payload["choices"][0]["delta"]["role"], "assistant");
        assert_eq!(payload["choices"][0]["delta"]["content"], APOLOGY);
    }

    #[test]
    fn upstream_bytes_are_untouched() {
        let raw = Bytes::from_static(b"data: {\"x\":1}\n\n");
        assert_eq!(RelayFrame::Upstream(raw.clone()).encode(), raw);
    }

    #[test]
    fn running_labels_name_the_keyword() {
        assert_eq!(running_label(&ToolCall::search_notes("反思")), "正在搜索笔记：反思");
        assert_eq!(running_label(&ToolCall::get_bookshelf()), "正在查看你的书架");
    }
}
