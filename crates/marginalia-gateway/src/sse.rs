// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Streamed chat for POST /api/chat.
//!
//! The response body is a `text/event-stream` made of two kinds of frames:
//!
//! ```text
//! data: {"type":"mcp_status","status":"正在搜索笔记：反思"}
//!
//! data: {"choices":[{"delta":{"content":"..."}}]}
//! ```
//!
//! Status frames come from the relay; delta frames are the completion API's
//! own bytes. A failed completion ends with `{"type":"error"}`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::stream;
use marginalia_core::{ChatMessage, MarginaliaError};
use marginalia_quota::{QuotaReservation, QuotaService};
use marginalia_relay::{ChatTurn, RelayOutcome};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::auth::OptionalCredential;
use crate::handlers::{ApiError, subject_of};
use crate::server::AppState;

/// Request body for POST /api/chat.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default = "default_use_tools")]
    pub use_tools: bool,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub member_type: Option<String>,
}

fn default_use_tools() -> bool {
    true
}

/// POST /api/chat
///
/// Identified callers (credential and `userId`) have one unit reserved
/// before the turn starts. The unit is kept when the turn completes and
/// handed back when it fails or is cancelled.
pub async fn post_chat(
    State(state): State<AppState>,
    OptionalCredential(credential): OptionalCredential,
    Json(body): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    if body.messages.is_empty() {
        return Err(ApiError::bad_request("messages must not be empty"));
    }

    let subject = match (&credential, body.user_id.as_deref()) {
        (Some(_), Some(_)) => Some(subject_of(
            body.user_id.as_deref(),
            body.member_type.as_deref(),
        )?),
        _ => None,
    };
    let reservation = match subject {
        Some((user_id, tier)) if state.charge_quota => {
            match state.quota.reserve(&user_id, tier).await {
                Ok(reservation) => Some(reservation),
                Err(MarginaliaError::QuotaExceeded { .. }) => {
                    let snapshot = state.quota.get_quota(&user_id, tier).await?;
                    info!(subject = %user_id, used = snapshot.used, "chat refused, quota exhausted");
                    return Err(ApiError::quota_exceeded(&snapshot));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Some((user_id, tier)) => {
            let snapshot = state.quota.get_quota(&user_id, tier).await?;
            if !snapshot.can_use {
                info!(subject = %user_id, used = snapshot.used, "chat refused, quota exhausted");
                return Err(ApiError::quota_exceeded(&snapshot));
            }
            None
        }
        None => None,
    };

    let turn_id = Uuid::new_v4();
    let span = info_span!("chat_turn", %turn_id);
    let turn = ChatTurn {
        messages: body.messages,
        use_tools: body.use_tools,
        credential,
    };
    let handle = {
        let _entered = span.enter();
        info!(messages = turn.messages.len(), use_tools = turn.use_tools, "chat turn started");
        state.relay.start(turn, state.shutdown.child_token())
    };

    tokio::spawn(settle(handle.task, state.quota.clone(), reservation).instrument(span));

    let frames = stream::unfold(handle.frames, |mut rx| async move {
        let frame = rx.recv().await?;
        Some((Ok::<Bytes, Infallible>(frame.encode()), rx))
    });

    let mut response = (StatusCode::OK, Body::from_stream(frames)).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    if let Ok(value) = HeaderValue::from_str(&turn_id.to_string()) {
        headers.insert("x-turn-id", value);
    }
    Ok(response)
}

/// Waits for the turn, keeping the reserved unit only if it completed.
async fn settle(
    task: JoinHandle<RelayOutcome>,
    quota: Arc<QuotaService>,
    reservation: Option<QuotaReservation>,
) {
    let outcome = match task.await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(error = %e, "chat turn task ended abnormally");
            RelayOutcome::Failed(e.to_string())
        }
    };
    let Some(reservation) = reservation else {
        return;
    };
    if outcome == RelayOutcome::Completed {
        debug!(subject = %reservation.subject, used = reservation.snapshot.used, "turn charged");
        return;
    }
    if let Err(e) = quota.release(&reservation).await {
        warn!(subject = %reservation.subject, error = %e, "failed to release quota unit");
    }
}
