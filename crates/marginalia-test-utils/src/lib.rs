// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for marginalia.
//!
//! Provides mock adapters for fast, deterministic tests without a running
//! backend or completion API.
//!
//! # Components
//!
//! - [`MockBackend`] - In-memory bookshelf with injectable failures and latency
//! - [`MockCompletion`] - Scripted streaming completion that records its input

pub mod mock_backend;
pub mod mock_completion;

pub use mock_backend::MockBackend;
pub use mock_completion::{MockCompletion, delta_line};
