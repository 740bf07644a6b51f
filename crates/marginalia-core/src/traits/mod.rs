// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! Every seam that talks to something outside the process (quota storage,
//! the reading-notes backend, the chat completion API) is a trait extending
//! [`PluginAdapter`], so tests can swap in mocks.

pub mod adapter;
pub mod backend;
pub mod completion;
pub mod quota;

pub use adapter::PluginAdapter;
pub use backend::BookBackend;
pub use completion::{ByteStream, CompletionProvider};
pub use quota::{IncrementOutcome, QuotaStore};
