// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Streaming chat relay for marginalia.
//!
//! [`ChatRelay`] augments the last user message with reading-note context,
//! then streams an OpenAI-compatible completion back to the client,
//! removing the upstream keep-alive line on the way.

pub mod client;
pub mod filter;
pub mod relay;
pub mod types;

pub use client::OpenAiCompatClient;
pub use filter::LineFilter;
pub use relay::{APOLOGY, ChatRelay, ChatTurn, RelayFrame, RelayHandle, RelayOutcome};
