// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock reading-notes backend.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use marginalia_core::{
    AdapterType, BackendCredential, Book, BookBackend, BookNotes, MarginaliaError, Note,
    PluginAdapter,
};

/// An in-memory bookshelf.
///
/// Clones share call counters, so a clone handed to the code under test can
/// be inspected afterwards through the original.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    books: Vec<Book>,
    notes: HashMap<String, Vec<Note>>,
    failing_books: HashSet<String>,
    shelf_fails: bool,
    notes_delay: Option<Duration>,
    list_calls: Arc<AtomicUsize>,
    notes_calls: Arc<AtomicUsize>,
}

fn book(id: &str, title: &str, author: &str, highlights: u32, thoughts: u32) -> Book {
    Book {
        book_id: id.to_string(),
        title: title.to_string(),
        author: Some(author.to_string()),
        highlight_count: highlights,
        note_count: thoughts,
        cover: None,
    }
}

fn note(book_id: &str, excerpt: &str, thought: Option<&str>) -> Note {
    Note {
        book_id: book_id.to_string(),
        excerpt: Some(excerpt.to_string()),
        thought: thought.map(str::to_string),
        ..Note::default()
    }
}

impl MockBackend {
    /// An empty shelf.
    pub fn new() -> Self {
        Self::default()
    }

    /// Three books with a handful of notes:
    ///
    /// - `b1` 原则: two notes, one mentioning 反思
    /// - `b2` 微习惯: one note about 习惯
    /// - `b3` 掌控习惯: one note about 习惯
    pub fn library() -> Self {
        Self::new()
            .with_book(
                book("b1", "原则", "瑞·达利欧", 12, 3),
                vec![
                    note("b1", "痛苦+反思=进步", Some("要直面问题")),
                    note("b1", "极度求真，极度透明", None),
                ],
            )
            .with_book(
                book("b2", "微习惯", "斯蒂芬·盖斯", 4, 1),
                vec![note("b2", "小到不可能失败的习惯", None)],
            )
            .with_book(
                book("b3", "掌控习惯", "詹姆斯·克利尔", 8, 2),
                vec![note("b3", "习惯是自我提升的复利", Some("每天进步一点"))],
            )
    }

    pub fn with_book(mut self, book: Book, notes: Vec<Note>) -> Self {
        self.notes.insert(book.book_id.clone(), notes);
        self.books.push(book);
        self
    }

    /// Notes for `book_id` fail with a backend error.
    pub fn failing_book(mut self, book_id: &str) -> Self {
        self.failing_books.insert(book_id.to_string());
        self
    }

    /// The book list itself fails.
    pub fn failing_shelf(mut self) -> Self {
        self.shelf_fails = true;
        self
    }

    /// Every notes fetch sleeps this long first.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.notes_delay = Some(delay);
        self
    }

    pub fn book_list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn notes_calls(&self) -> usize {
        self.notes_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PluginAdapter for MockBackend {
    fn name(&self) -> &str {
        "mock-backend"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Backend
    }
}

#[async_trait]
impl BookBackend for MockBackend {
    async fn list_books(
        &self,
        _credential: &BackendCredential,
    ) -> Result<Vec<Book>, MarginaliaError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.shelf_fails {
            return Err(MarginaliaError::Backend {
                message: "shelf unavailable".into(),
                status: Some(503),
            });
        }
        Ok(self.books.clone())
    }

    async fn book_notes(
        &self,
        _credential: &BackendCredential,
        book_id: &str,
    ) -> Result<BookNotes, MarginaliaError> {
        self.notes_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.notes_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_books.contains(book_id) {
            return Err(MarginaliaError::backend(format!("notes for {book_id} unavailable")));
        }
        let book_name = self
            .books
            .iter()
            .find(|b| b.book_id == book_id)
            .map(|b| b.title.clone());
        Ok(BookNotes {
            book_name,
            notes: self.notes.get(book_id).cloned().unwrap_or_default(),
        })
    }
}
