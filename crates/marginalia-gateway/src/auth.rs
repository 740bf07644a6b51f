// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Caller credential extraction.
//!
//! The gateway never validates tokens. `Authorization: Bearer <token>` is
//! taken as-is and forwarded to the reading-notes backend, which owns
//! authentication. A missing or empty token marks the caller anonymous.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use marginalia_core::BackendCredential;

/// The caller's bearer token, if any.
#[derive(Debug, Clone)]
pub struct OptionalCredential(pub Option<BackendCredential>);

impl<S> FromRequestParts<S> for OptionalCredential
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token);
        Ok(Self(token.map(BackendCredential::new)))
    }
}

/// Token of a `Bearer` authorization value. The scheme is case-insensitive.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
