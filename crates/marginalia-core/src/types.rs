// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the quota, tool, relay, and gateway crates.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    QuotaStore,
    Backend,
    Completion,
}

/// Membership level that determines the daily chat allowance.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum MembershipTier {
    #[default]
    Free,
    Plus,
    Pro,
}

/// Daily ceiling for a tier.
///
/// At the HTTP boundary `Unbounded` is rendered as `-1` for both `limit` and
/// `remaining`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DailyLimit {
    Bounded(u32),
    Unbounded,
}

impl DailyLimit {
    /// Value used by the wire format, where `-1` means unlimited.
    pub fn as_wire(self) -> i64 {
        match self {
            DailyLimit::Bounded(n) => i64::from(n),
            DailyLimit::Unbounded => -1,
        }
    }

    /// The ceiling passed to quota stores (`None` = no ceiling).
    pub fn ceiling(self) -> Option<u32> {
        match self {
            DailyLimit::Bounded(n) => Some(n),
            DailyLimit::Unbounded => None,
        }
    }

    pub fn is_unbounded(self) -> bool {
        matches!(self, DailyLimit::Unbounded)
    }
}

/// Opaque bearer token forwarded to the reading-notes backend.
///
/// Never inspected or validated here; the backend owns authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct BackendCredential(String);

impl BackendCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for BackendCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BackendCredential")
            .field(&"[redacted]")
            .finish()
    }
}

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One entry in an ordered conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// A book on the user's shelf, as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub book_id: String,
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    /// Number of highlighted passages.
    #[serde(default, alias = "bookmarkCount", alias = "markCount")]
    pub highlight_count: u32,
    /// Number of free-form thoughts.
    #[serde(default, alias = "reviewCount")]
    pub note_count: u32,
    #[serde(default)]
    pub cover: Option<String>,
}

/// A single highlight and/or thought attached to a book.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    #[serde(default)]
    pub note_id: Option<String>,
    #[serde(default)]
    pub book_id: String,
    #[serde(default)]
    pub book_title: Option<String>,
    #[serde(default, alias = "chapterTitle")]
    pub chapter: Option<String>,
    /// The highlighted passage.
    #[serde(default, alias = "markText")]
    pub excerpt: Option<String>,
    /// The reader's own words.
    #[serde(default, alias = "review", alias = "content")]
    pub thought: Option<String>,
    /// Unix seconds.
    #[serde(default, alias = "createTime")]
    pub created_at: Option<i64>,
}

impl Note {
    /// All searchable text of the note joined by newlines.
    pub fn full_text(&self) -> String {
        [
            self.excerpt.as_deref(),
            self.thought.as_deref(),
            self.chapter.as_deref(),
            self.book_title.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join("\n")
    }
}

/// Every note of one book, with the name the backend resolved for it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookNotes {
    #[serde(default)]
    pub book_name: Option<String>,
    #[serde(default)]
    pub notes: Vec<Note>,
}
