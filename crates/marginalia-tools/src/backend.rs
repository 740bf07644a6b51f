// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the reading-notes backend.
//!
//! The backend wraps every payload in `{success | code, data, message}`.
//! The caller's bearer credential is forwarded verbatim.

use std::time::Duration;

use async_trait::async_trait;
use marginalia_config::model::BackendConfig;
use marginalia_core::{
    AdapterType, BackendCredential, BookBackend, Book, BookNotes, MarginaliaError, Note,
    PluginAdapter,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// Response envelope shared by every backend endpoint.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn is_success(&self) -> bool {
        let code_ok = matches!(self.code, None | Some(0) | Some(200));
        self.success.unwrap_or(true) && code_ok
    }
}

/// The book list is either bare or wrapped in `{books: [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BooksData {
    List(Vec<Book>),
    Wrapped { books: Vec<Book> },
}

/// Notes are either bare or wrapped with the resolved book name.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NotesData {
    List(Vec<Note>),
    Wrapped(BookNotes),
}

/// [`BookBackend`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    books_path: String,
    notes_path: String,
    timeout: Duration,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, MarginaliaError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MarginaliaError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            books_path: config.books_path.clone(),
            notes_path: config.notes_path.clone(),
            timeout,
        })
    }

    fn books_url(&self) -> String {
        format!("{}{}", self.base_url, self.books_path)
    }

    fn notes_url(&self, book_id: &str) -> String {
        format!(
            "{}{}",
            self.base_url,
            self.notes_path.replace("{book_id}", book_id)
        )
    }

    async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        credential: &BackendCredential,
    ) -> Result<T, MarginaliaError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(credential.as_str())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MarginaliaError::Timeout {
                        duration: self.timeout,
                    }
                } else {
                    MarginaliaError::backend(format!("request to backend failed: {e}"))
                }
            })?;

        let status = response.status();
        debug!(%url, %status, "backend response received");

        let body = response
            .text()
            .await
            .map_err(|e| MarginaliaError::backend(format!("failed to read backend body: {e}")))?;

        let envelope: Option<Envelope<T>> = serde_json::from_str(&body).ok();

        if !status.is_success() {
            let message = envelope
                .and_then(|e| e.message)
                .unwrap_or_else(|| format!("backend returned {status}"));
            warn!(%url, %status, %message, "backend request failed");
            return Err(MarginaliaError::Backend {
                message,
                status: Some(status.as_u16()),
            });
        }

        let envelope = envelope.ok_or_else(|| {
            MarginaliaError::backend(format!("malformed backend response from {url}"))
        })?;

        if !envelope.is_success() {
            let message = envelope
                .message
                .unwrap_or_else(|| "backend reported failure".to_string());
            warn!(%url, %message, "backend reported failure");
            return Err(MarginaliaError::Backend {
                message,
                status: Some(status.as_u16()),
            });
        }

        envelope
            .data
            .ok_or_else(|| MarginaliaError::backend(format!("backend response from {url} has no data")))
    }
}

#[async_trait]
impl PluginAdapter for HttpBackend {
    fn name(&self) -> &str {
        "http-backend"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Backend
    }
}

#[async_trait]
impl BookBackend for HttpBackend {
    async fn list_books(
        &self,
        credential: &BackendCredential,
    ) -> Result<Vec<Book>, MarginaliaError> {
        let data: BooksData = self.get(&self.books_url(), credential).await?;
        Ok(match data {
            BooksData::List(books) | BooksData::Wrapped { books } => books,
        })
    }

    async fn book_notes(
        &self,
        credential: &BackendCredential,
        book_id: &str,
    ) -> Result<BookNotes, MarginaliaError> {
        let data: NotesData = self.get(&self.notes_url(book_id), credential).await?;
        let mut notes = match data {
            NotesData::List(notes) => BookNotes {
                book_name: None,
                notes,
            },
            NotesData::Wrapped(notes) => notes,
        };
        for note in &mut notes.notes {
            if note.book_id.is_empty() {
                note.book_id = book_id.to_string();
            }
        }
        Ok(notes)
    }
}
