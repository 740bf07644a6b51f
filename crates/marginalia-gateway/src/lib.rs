// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for marginalia.
//!
//! Exposes the daily quota, the tool catalog and analyzer, and the streamed
//! chat relay over axum. Bearer tokens are passed through to the
//! reading-notes backend untouched.

pub mod auth;
pub mod handlers;
pub mod server;
pub mod sse;

pub use auth::OptionalCredential;
pub use handlers::{ApiError, QuotaResponse};
pub use server::{AppState, build_router, start_server};
pub use sse::ChatRequest;
