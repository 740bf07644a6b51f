// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backend adapter trait for the remote reading-notes service.

use async_trait::async_trait;

use crate::error::MarginaliaError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{BackendCredential, Book, BookNotes};

/// Read-only access to a user's bookshelf and notes.
///
/// Implementations forward the caller's credential verbatim and map any
/// non-success response to [`MarginaliaError::Backend`].
#[async_trait]
pub trait BookBackend: PluginAdapter {
    /// Fetches the full bookshelf.
    async fn list_books(&self, credential: &BackendCredential)
    -> Result<Vec<Book>, MarginaliaError>;

    /// Fetches every highlight and thought for one book.
    async fn book_notes(
        &self,
        credential: &BackendCredential,
        book_id: &str,
    ) -> Result<BookNotes, MarginaliaError>;
}
