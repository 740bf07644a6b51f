// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Heuristic question analysis.
//!
//! Turns a free-text question into an ordered list of [`Intent`]s using
//! keyword extraction and trigger phrase tables. Pure and deterministic:
//! no network, no clock, no randomness.

use marginalia_config::model::ToolsConfig;
use marginalia_core::MarginaliaError;
use std::path::Path;

use crate::catalog::ToolCall;
use crate::triggers::{TriggerTable, contains_any};

/// Opening and closing marks that delimit a book title.
const TITLE_QUOTES: &[(char, char)] = &[('《', '》'), ('“', '”'), ('「', '」'), ('"', '"')];

/// Characters that end a keyword segment besides whitespace.
const SEGMENT_BREAKS: &[char] = &[
    '，', '。', '！', '？', '、', '；', '：', '（', '）', '【', '】', '…', '—', '·', '～', '‘',
    '’', '『', '』',
];

/// What the question asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// List the whole shelf.
    Bookshelf,
    /// Find books matching a keyword.
    FindBooks(String),
    /// Search highlights and thoughts for a keyword.
    SearchNotes(String),
}

impl Intent {
    pub fn to_tool_call(&self) -> ToolCall {
        match self {
            Intent::Bookshelf => ToolCall::get_bookshelf(),
            Intent::FindBooks(keyword) => ToolCall::search_books(keyword),
            Intent::SearchNotes(keyword) => ToolCall::search_notes(keyword),
        }
    }
}

/// Keywords pulled out of a question.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keywords {
    /// In first-seen order, without duplicates.
    pub terms: Vec<String>,
    /// Whether any term came from a quoted title.
    pub has_quoted_title: bool,
}

/// Heuristic question classifier.
#[derive(Debug, Clone)]
pub struct Analyzer {
    table: TriggerTable,
    max_keywords: Option<usize>,
}

impl Analyzer {
    pub fn new(table: TriggerTable) -> Self {
        Self {
            table,
            max_keywords: None,
        }
    }

    /// Cap the number of keywords turned into tool calls.
    pub fn with_max_keywords(mut self, max_keywords: Option<usize>) -> Self {
        self.max_keywords = max_keywords;
        self
    }

    /// Analyzer over the built-in trigger table.
    pub fn builtin() -> Result<Self, MarginaliaError> {
        Ok(Self::new(TriggerTable::builtin()?))
    }

    /// Analyzer honoring `tools.triggers_file` and `tools.max_keywords`.
    pub fn from_config(config: &ToolsConfig) -> Result<Self, MarginaliaError> {
        let table = match &config.triggers_file {
            Some(path) => TriggerTable::load(Path::new(path))?,
            None => TriggerTable::builtin()?,
        };
        Ok(Self::new(table).with_max_keywords(config.max_keywords))
    }

    /// Ordered tool calls for a question.
    pub fn analyze(&self, question: &str) -> Vec<ToolCall> {
        self.intents(question)
            .iter()
            .map(Intent::to_tool_call)
            .collect()
    }

    /// Ordered intents for a question.
    ///
    /// Rules fire independently: bookshelf, then book search, then note
    /// search. When none fires but keywords exist, every keyword is searched
    /// in notes and books and the shelf is listed as well.
    pub fn intents(&self, question: &str) -> Vec<Intent> {
        let question = question.trim();
        if question.is_empty() {
            return Vec::new();
        }

        let lowered = question.to_lowercase();
        let mut keywords = self.extract_keywords(question);
        if let Some(max) = self.max_keywords {
            keywords.terms.truncate(max);
        }
        let terms = &keywords.terms;

        let mut intents = Vec::new();

        if contains_any(&lowered, &self.table.bookshelf) {
            intents.push(Intent::Bookshelf);
        }

        let wants_book =
            keywords.has_quoted_title || contains_any(&lowered, &self.table.find_book);
        if !terms.is_empty() && wants_book {
            intents.extend(terms.iter().cloned().map(Intent::FindBooks));
        }

        if !terms.is_empty() && contains_any(&lowered, &self.table.insight) {
            intents.extend(terms.iter().cloned().map(Intent::SearchNotes));
        }

        if intents.is_empty() && !terms.is_empty() {
            intents.extend(terms.iter().cloned().map(Intent::SearchNotes));
            intents.extend(terms.iter().cloned().map(Intent::FindBooks));
            intents.push(Intent::Bookshelf);
        }

        intents
    }

    /// Quoted titles first, then the remaining segments with stop words removed.
    pub fn extract_keywords(&self, question: &str) -> Keywords {
        let (quoted, remainder) = split_quoted(question);
        let has_quoted_title = !quoted.is_empty();

        let mut terms: Vec<String> = Vec::new();
        let mut push = |term: String| {
            if !term.is_empty() && !terms.contains(&term) {
                terms.push(term);
            }
        };

        for title in quoted {
            push(title);
        }

        for segment in remainder
            .split(|c: char| {
                c.is_whitespace()
                    || (c.is_ascii_punctuation() && c != '\'' && c != '-')
                    || SEGMENT_BREAKS.contains(&c)
            })
            .filter(|s| !s.is_empty())
        {
            if segment.is_ascii() {
                let token = segment.trim_matches(|c| c == '\'' || c == '-');
                if !token.is_empty() && !self.table.is_stop_word(token) {
                    push(token.to_string());
                }
            } else {
                for piece in split_on_stop_phrases(segment, &self.table.stop_phrases) {
                    push(piece);
                }
            }
        }

        Keywords {
            terms,
            has_quoted_title,
        }
    }
}

/// Pull out text between title quotes. Returns the titles and the text with
/// each quoted span replaced by a space.
fn split_quoted(text: &str) -> (Vec<String>, String) {
    let mut titles = Vec::new();
    let mut remainder = String::with_capacity(text.len());
    let mut rest = text;

    while let Some((start, open, close)) = next_open_quote(rest) {
        remainder.push_str(&rest[..start]);
        let after_open = &rest[start + open.len_utf8()..];
        match after_open.find(close) {
            Some(end) => {
                let title = after_open[..end].trim();
                if !title.is_empty() {
                    titles.push(title.to_string());
                }
                remainder.push(' ');
                rest = &after_open[end + close.len_utf8()..];
            }
            None => {
                // Unbalanced: keep the text, drop the stray mark.
                remainder.push(' ');
                rest = after_open;
            }
        }
    }
    remainder.push_str(rest);
    (titles, remainder)
}

fn next_open_quote(text: &str) -> Option<(usize, char, char)> {
    text.char_indices().find_map(|(i, c)| {
        TITLE_QUOTES
            .iter()
            .find(|(open, _)| *open == c)
            .map(|(open, close)| (i, *open, *close))
    })
}

/// Split a CJK segment wherever a stop phrase occurs. `stop_phrases` must be
/// sorted longest first.
fn split_on_stop_phrases(segment: &str, stop_phrases: &[String]) -> Vec<String> {
    let lowered = segment.to_lowercase();
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut rest = lowered.as_str();

    while let Some(c) = rest.chars().next() {
        if let Some(stop) = stop_phrases.iter().find(|p| rest.starts_with(p.as_str())) {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
            }
            rest = &rest[stop.len()..];
        } else {
            current.push(c);
            rest = &rest[c.len_utf8()..];
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}
