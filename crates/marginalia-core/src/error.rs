// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for marginalia.

use thiserror::Error;

/// The primary error type used across all marginalia crates.
#[derive(Debug, Error)]
pub enum MarginaliaError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Quota store errors (database connection, query failure).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The subject has used every unit of today's allowance.
    #[error("daily quota exceeded for {subject} (limit {limit})")]
    QuotaExceeded { subject: String, limit: u32 },

    /// The reading-notes backend returned a non-success response or was unreachable.
    #[error("backend error: {message}")]
    Backend {
        message: String,
        status: Option<u16>,
    },

    /// A tool call named a tool that is not in the catalog.
    #[error("unsupported tool: {0}")]
    UnsupportedTool(String),

    /// A tool call was missing a required argument or carried a malformed one.
    #[error("invalid arguments for {tool}: {message}")]
    InvalidToolArguments { tool: String, message: String },

    /// The chat completion API failed or returned a non-success status.
    #[error("completion error: {message}")]
    UpstreamCompletion {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MarginaliaError {
    /// Shorthand for a backend error without an HTTP status.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            status: None,
        }
    }
}
