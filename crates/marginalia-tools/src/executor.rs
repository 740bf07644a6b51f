// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool execution against the reading-notes backend.
//!
//! Each [`ToolCall`] is dispatched by name, its arguments are validated
//! against the catalog, and the backend payload is normalized into a
//! [`ToolResult`]. Library-wide note searches fan out one request per book,
//! bounded in concurrency and by an aggregate deadline; books that fail or
//! run past the deadline are reported as warnings instead of failing the call.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use marginalia_config::model::ToolsConfig;
use marginalia_core::{BackendCredential, Book, BookBackend, MarginaliaError, Note};
use serde::Serialize;
use serde_json::{Map, Value};
use strum::Display;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::catalog::{ToolCall, ToolCatalog, ToolDefinition, ToolName};
use crate::matching::{book_matches, note_matches};

/// Which tool produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceTag {
    Bookshelf,
    BookSearch,
    BookNotes,
    NoteSearch,
}

/// Payload of a tool result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolContent {
    Books { books: Vec<Book> },
    Notes {
        book_name: Option<String>,
        notes: Vec<Note>,
    },
}

/// Uniform envelope returned by every tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub content: ToolContent,
    pub source: SourceTag,
    pub count: usize,
    /// Keyword the result was searched for, if any.
    pub query: Option<String>,
    /// Per-book failures tolerated while building the result.
    pub warnings: Vec<String>,
}

impl ToolResult {
    fn books(source: SourceTag, books: Vec<Book>, query: Option<String>) -> Self {
        Self {
            count: books.len(),
            content: ToolContent::Books { books },
            source,
            query,
            warnings: Vec::new(),
        }
    }

    fn notes(
        source: SourceTag,
        book_name: Option<String>,
        notes: Vec<Note>,
        query: Option<String>,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            count: notes.len(),
            content: ToolContent::Notes { book_name, notes },
            source,
            query,
            warnings,
        }
    }
}

/// Runs tool calls on behalf of one caller credential.
pub struct ToolExecutor {
    backend: Arc<dyn BookBackend>,
    catalog: ToolCatalog,
    fanout_concurrency: usize,
    fanout_timeout: Duration,
}

impl ToolExecutor {
    pub fn new(backend: Arc<dyn BookBackend>, config: &ToolsConfig) -> Self {
        Self {
            backend,
            catalog: ToolCatalog::new(),
            fanout_concurrency: config.fanout_concurrency.max(1),
            fanout_timeout: Duration::from_secs(config.fanout_timeout_secs),
        }
    }

    /// The backend the tools read from.
    pub fn backend(&self) -> &Arc<dyn BookBackend> {
        &self.backend
    }

    /// Execute one tool call.
    pub async fn execute(
        &self,
        call: &ToolCall,
        credential: &BackendCredential,
    ) -> Result<ToolResult, MarginaliaError> {
        let def = self
            .catalog
            .lookup(&call.name)
            .ok_or_else(|| MarginaliaError::UnsupportedTool(call.name.clone()))?;
        let name = def.name;
        check_required(def, &call.arguments)?;
        debug!(tool = %name, "executing tool");

        match name {
            ToolName::GetBookshelf => self.get_bookshelf(credential).await,
            ToolName::SearchBooks => {
                let keyword = string_arg(name, &call.arguments, "keyword")?.unwrap_or_default();
                self.search_books(credential, &keyword).await
            }
            ToolName::GetBookNotes => {
                let book_id = string_arg(name, &call.arguments, "bookId")?.unwrap_or_default();
                let book_name = string_arg(name, &call.arguments, "bookName")?;
                self.get_book_notes(credential, &book_id, book_name).await
            }
            ToolName::SearchNotes => {
                let keyword = string_arg(name, &call.arguments, "keyword")?.unwrap_or_default();
                let book_id = string_arg(name, &call.arguments, "bookId")?;
                self.search_notes(credential, &keyword, book_id.as_deref())
                    .await
            }
        }
    }

    async fn get_bookshelf(
        &self,
        credential: &BackendCredential,
    ) -> Result<ToolResult, MarginaliaError> {
        let books = self.backend.list_books(credential).await?;
        Ok(ToolResult::books(SourceTag::Bookshelf, books, None))
    }

    async fn search_books(
        &self,
        credential: &BackendCredential,
        keyword: &str,
    ) -> Result<ToolResult, MarginaliaError> {
        let books: Vec<Book> = self
            .backend
            .list_books(credential)
            .await?
            .into_iter()
            .filter(|b| book_matches(b, keyword))
            .collect();
        Ok(ToolResult::books(
            SourceTag::BookSearch,
            books,
            Some(keyword.to_string()),
        ))
    }

    async fn get_book_notes(
        &self,
        credential: &BackendCredential,
        book_id: &str,
        book_name: Option<String>,
    ) -> Result<ToolResult, MarginaliaError> {
        let fetched = self.backend.book_notes(credential, book_id).await?;
        let name = fetched.book_name.or(book_name);
        let notes = with_book_title(fetched.notes, name.as_deref());
        Ok(ToolResult::notes(
            SourceTag::BookNotes,
            name,
            notes,
            None,
            Vec::new(),
        ))
    }

    async fn search_notes(
        &self,
        credential: &BackendCredential,
        keyword: &str,
        book_id: Option<&str>,
    ) -> Result<ToolResult, MarginaliaError> {
        let (book_name, notes, warnings) = match book_id {
            Some(id) => {
                let fetched = self.backend.book_notes(credential, id).await?;
                let notes = with_book_title(fetched.notes, fetched.book_name.as_deref());
                (fetched.book_name, notes, Vec::new())
            }
            None => {
                let (notes, warnings) = self.fan_out_notes(credential).await?;
                (None, notes, warnings)
            }
        };

        let matched: Vec<Note> = notes
            .into_iter()
            .filter(|n| note_matches(n, keyword))
            .collect();
        Ok(ToolResult::notes(
            SourceTag::NoteSearch,
            book_name,
            matched,
            Some(keyword.to_string()),
            warnings,
        ))
    }

    /// Every note on the shelf, fetched with bounded concurrency.
    ///
    /// Results keep shelf order. Fetching stops at the deadline; books not
    /// yet fetched by then are reported in the warnings.
    async fn fan_out_notes(
        &self,
        credential: &BackendCredential,
    ) -> Result<(Vec<Note>, Vec<String>), MarginaliaError> {
        let books = self.backend.list_books(credential).await?;
        let total = books.len();
        let deadline = Instant::now() + self.fanout_timeout;

        let backend = &self.backend;
        let mut fetches = futures::stream::iter(books.into_iter().map(|book| async move {
            let result = backend.book_notes(credential, &book.book_id).await;
            (book, result)
        }))
        .buffered(self.fanout_concurrency);

        let mut notes = Vec::new();
        let mut warnings = Vec::new();
        let mut done = 0usize;
        let mut fetched_ok = 0usize;

        loop {
            match tokio::time::timeout_at(deadline, fetches.next()).await {
                Ok(Some((book, Ok(fetched)))) => {
                    done += 1;
                    fetched_ok += 1;
                    let title = fetched.book_name.as_deref().unwrap_or(&book.title);
                    notes.extend(with_book_title(fetched.notes, Some(title)));
                }
                Ok(Some((book, Err(e)))) => {
                    done += 1;
                    warn!(book_id = %book.book_id, error = %e, "note fetch failed, skipping book");
                    warnings.push(format!("《{}》: {e}", book.title));
                }
                Ok(None) => break,
                Err(_) => {
                    let skipped = total - done;
                    warn!(skipped, timeout = ?self.fanout_timeout, "note search deadline reached");
                    warnings.push(format!(
                        "deadline of {:?} reached, {skipped} book(s) not searched",
                        self.fanout_timeout
                    ));
                    break;
                }
            }
        }

        info!(
            books = total,
            fetched = fetched_ok,
            notes = notes.len(),
            "library-wide note fetch finished"
        );
        Ok((notes, warnings))
    }
}

fn check_required(
    def: &ToolDefinition,
    arguments: &Map<String, Value>,
) -> Result<(), MarginaliaError> {
    for param in def.params.iter().filter(|p| p.required) {
        if string_arg(def.name, arguments, param.name)?.is_none() {
            return Err(MarginaliaError::InvalidToolArguments {
                tool: def.name.to_string(),
                message: format!("missing required argument `{}`", param.name),
            });
        }
    }
    Ok(())
}

/// Reads an optional string argument; a present non-string value is an error.
fn string_arg(
    tool: ToolName,
    arguments: &Map<String, Value>,
    key: &str,
) -> Result<Option<String>, MarginaliaError> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(other) => Err(MarginaliaError::InvalidToolArguments {
            tool: tool.to_string(),
            message: format!("argument `{key}` must be a string, got {other}"),
        }),
    }
}

/// Fill in the book title on notes that lack one.
fn with_book_title(mut notes: Vec<Note>, title: Option<&str>) -> Vec<Note> {
    if let Some(title) = title {
        for note in notes.iter_mut().filter(|n| n.book_title.is_none()) {
            note.book_title = Some(title.to_string());
        }
    }
    notes
}
