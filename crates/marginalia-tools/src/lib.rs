// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool augmentation for marginalia chat turns.
//!
//! A question flows through three stages:
//! - [`Analyzer`] picks tool calls from trigger phrases and extracted keywords
//! - [`ToolExecutor`] runs them against the reading-notes backend
//! - [`format_context`] renders the results for the completion model
//!
//! [`HttpBackend`] is the production [`marginalia_core::BookBackend`].

pub mod analyzer;
pub mod backend;
pub mod catalog;
pub mod executor;
pub mod formatter;
pub mod matching;
pub mod triggers;

pub use analyzer::{Analyzer, Intent, Keywords};
pub use backend::HttpBackend;
pub use catalog::{ParamSpec, ParamType, ToolCall, ToolCatalog, ToolDefinition, ToolName};
pub use executor::{SourceTag, ToolContent, ToolExecutor, ToolResult};
pub use formatter::format_context;
pub use triggers::TriggerTable;
