// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Completion adapter trait for the upstream chat completion API.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;

use crate::error::MarginaliaError;
use crate::traits::adapter::PluginAdapter;
use crate::types::ChatMessage;

/// Raw response body of a streaming completion, chunked as received.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, MarginaliaError>> + Send>>;

/// Adapter for an OpenAI-compatible streaming chat completion endpoint.
///
/// The body is returned undecoded so the relay can forward it byte for byte.
/// Dropping the stream must abort the underlying HTTP request.
#[async_trait]
pub trait CompletionProvider: PluginAdapter {
    /// Starts a streaming completion for the given conversation.
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<ByteStream, MarginaliaError>;
}
