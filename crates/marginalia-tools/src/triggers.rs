// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Versioned trigger phrase tables used by the question analyzer.
//!
//! The built-in table is compiled in from `triggers.toml`; deployments can
//! replace it wholesale with `tools.triggers_file`.

use std::path::Path;

use marginalia_core::MarginaliaError;
use serde::Deserialize;
use tracing::debug;

const BUILTIN: &str = include_str!("triggers.toml");

/// Highest table format this build understands.
pub const SUPPORTED_VERSION: u32 = 1;

/// Phrase tables, normalized to lowercase on load.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerTable {
    pub version: u32,
    pub bookshelf: Vec<String>,
    pub find_book: Vec<String>,
    pub insight: Vec<String>,
    #[serde(default)]
    pub stop_words: Vec<String>,
    #[serde(default)]
    pub stop_phrases: Vec<String>,
}

impl TriggerTable {
    /// The table shipped with the binary.
    pub fn builtin() -> Result<Self, MarginaliaError> {
        Self::parse(BUILTIN)
    }

    /// Parse and normalize a table from TOML.
    pub fn parse(toml_content: &str) -> Result<Self, MarginaliaError> {
        let table: TriggerTable = toml::from_str(toml_content)
            .map_err(|e| MarginaliaError::Config(format!("invalid trigger table: {e}")))?;
        if table.version == 0 || table.version > SUPPORTED_VERSION {
            return Err(MarginaliaError::Config(format!(
                "trigger table version {} is not supported (max {SUPPORTED_VERSION})",
                table.version
            )));
        }
        Ok(table.normalized())
    }

    /// Load a table from a file.
    pub fn load(path: &Path) -> Result<Self, MarginaliaError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MarginaliaError::Config(format!(
                "cannot read trigger table {}: {e}",
                path.display()
            ))
        })?;
        let table = Self::parse(&content)?;
        debug!(path = %path.display(), version = table.version, "trigger table loaded");
        Ok(table)
    }

    fn normalized(mut self) -> Self {
        for list in [
            &mut self.bookshelf,
            &mut self.find_book,
            &mut self.insight,
            &mut self.stop_words,
            &mut self.stop_phrases,
        ] {
            for phrase in list.iter_mut() {
                *phrase = phrase.trim().to_lowercase();
            }
            list.retain(|p| !p.is_empty());
        }
        // Longest first so "书架上" wins over "书".
        self.stop_phrases
            .sort_by_key(|p| std::cmp::Reverse(p.chars().count()));
        self
    }

    pub fn is_stop_word(&self, token: &str) -> bool {
        let lower = token.to_lowercase();
        self.stop_words.iter().any(|w| *w == lower)
    }
}

/// True when `lowered` contains any phrase in `phrases`.
pub(crate) fn contains_any(lowered: &str, phrases: &[String]) -> bool {
    phrases.iter().any(|p| lowered.contains(p.as_str()))
}
