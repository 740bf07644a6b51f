// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway REST API.
//!
//! Handles GET /health, the quota endpoints, and the tool catalog and
//! analysis endpoints. The streamed chat endpoint lives in [`crate::sse`].

use std::str::FromStr;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use marginalia_core::{AdapterType, HealthStatus, MarginaliaError, MembershipTier, PluginAdapter};
use marginalia_quota::QuotaSnapshot;
use marginalia_tools::ToolCall;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, warn};

use crate::auth::OptionalCredential;
use crate::server::AppState;

/// Wire form of a [`QuotaSnapshot`]. `-1` means unlimited.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuotaResponse {
    pub used: u32,
    pub limit: i64,
    pub remaining: i64,
    pub member_type: MembershipTier,
    pub can_use: bool,
    /// RFC 3339.
    pub reset_time: String,
}

impl From<&QuotaSnapshot> for QuotaResponse {
    fn from(snapshot: &QuotaSnapshot) -> Self {
        Self {
            used: snapshot.used,
            limit: snapshot.limit.as_wire(),
            remaining: snapshot.remaining().as_wire(),
            member_type: snapshot.tier,
            can_use: snapshot.can_use,
            reset_time: snapshot.reset_time.to_rfc3339(),
        }
    }
}

/// Query string of GET /api/quota.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaQuery {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub member_type: Option<String>,
}

/// Request body for POST /api/quota/consume.
pub type ConsumeRequest = QuotaQuery;

/// Request body for POST /api/tools/analyze.
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub question: String,
}

/// Response body for POST /api/tools/analyze.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub keywords: Vec<String>,
    pub has_quoted_title: bool,
    pub tool_calls: Vec<ToolCall>,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub quota_store: String,
    pub adapters: Vec<AdapterHealth>,
}

/// One adapter's identity and health in GET /health.
#[derive(Debug, Serialize)]
pub struct AdapterHealth {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AdapterType,
    pub version: String,
    pub status: String,
}

impl AdapterHealth {
    fn healthy(&self) -> bool {
        self.status == "healthy"
    }
}

async fn adapter_health<A: PluginAdapter + ?Sized>(adapter: &A) -> AdapterHealth {
    let status = match adapter.health_check().await {
        Ok(HealthStatus::Healthy) => "healthy".to_string(),
        Ok(HealthStatus::Degraded(reason)) => format!("degraded: {reason}"),
        Ok(HealthStatus::Unhealthy(reason)) => format!("unhealthy: {reason}"),
        Err(e) => {
            warn!(adapter = adapter.name(), error = %e, "health check failed");
            format!("unhealthy: {e}")
        }
    };
    AdapterHealth {
        name: adapter.name().to_string(),
        kind: adapter.adapter_type(),
        version: adapter.version().to_string(),
        status,
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota: Option<QuotaResponse>,
}

/// A handler failure rendered as JSON.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorResponse {
                error: message.into(),
                code: None,
                quota: None,
            },
        }
    }

    /// 429 with the caller's current allowance.
    pub fn quota_exceeded(snapshot: &QuotaSnapshot) -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: ErrorResponse {
                error: "今日对话次数已用完，请明天再来".to_string(),
                code: Some("QUOTA_EXCEEDED"),
                quota: Some(QuotaResponse::from(snapshot)),
            },
        }
    }
}

impl From<MarginaliaError> for ApiError {
    fn from(err: MarginaliaError) -> Self {
        let status = match &err {
            MarginaliaError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            MarginaliaError::UnsupportedTool(_) | MarginaliaError::InvalidToolArguments { .. } => {
                StatusCode::BAD_REQUEST
            }
            MarginaliaError::Backend { .. } | MarginaliaError::UpstreamCompletion { .. } => {
                StatusCode::BAD_GATEWAY
            }
            MarginaliaError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            MarginaliaError::Storage { .. } => StatusCode::SERVICE_UNAVAILABLE,
            MarginaliaError::Config(_) | MarginaliaError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            error!(error = %err, "request failed");
        }
        Self {
            status,
            body: ErrorResponse {
                error: err.to_string(),
                code: None,
                quota: None,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Subject and tier of an identified caller.
pub(crate) fn subject_of(
    user_id: Option<&str>,
    member_type: Option<&str>,
) -> Result<(String, MembershipTier), ApiError> {
    let user_id = user_id
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::bad_request("userId is required"))?;
    let tier = match member_type.map(str::trim).filter(|m| !m.is_empty()) {
        Some(raw) => MembershipTier::from_str(raw)
            .map_err(|_| ApiError::bad_request(format!("unknown memberType: {raw}")))?,
        None => MembershipTier::Free,
    };
    Ok((user_id.to_string(), tier))
}

/// GET /health
pub async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let quota_store = adapter_health(state.quota.store().as_ref()).await;
    let adapters = vec![
        adapter_health(state.relay.executor().backend().as_ref()).await,
        adapter_health(state.relay.completion().as_ref()).await,
    ];
    let status = if quota_store.healthy() && adapters.iter().all(AdapterHealth::healthy) {
        "ok"
    } else {
        "degraded"
    };
    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        quota_store: quota_store.status.clone(),
        adapters: std::iter::once(quota_store).chain(adapters).collect(),
    })
}

/// GET /api/quota?userId=&memberType=
///
/// Anonymous callers get the FREE default allowance without a store lookup.
pub async fn get_quota(
    State(state): State<AppState>,
    OptionalCredential(credential): OptionalCredential,
    Query(query): Query<QuotaQuery>,
) -> Result<Json<QuotaResponse>, ApiError> {
    if credential.is_none() {
        return Ok(Json(QuotaResponse::from(&state.quota.default_allowance())));
    }
    let (subject, tier) = subject_of(query.user_id.as_deref(), query.member_type.as_deref())?;
    let snapshot = state.quota.get_quota(&subject, tier).await?;
    Ok(Json(QuotaResponse::from(&snapshot)))
}

/// POST /api/quota/consume
///
/// Anonymous callers are answered with the default allowance and nothing
/// is recorded.
pub async fn post_consume(
    State(state): State<AppState>,
    OptionalCredential(credential): OptionalCredential,
    Json(body): Json<ConsumeRequest>,
) -> Result<Json<QuotaResponse>, ApiError> {
    if credential.is_none() {
        return Ok(Json(QuotaResponse::from(&state.quota.default_allowance())));
    }
    let (subject, tier) = subject_of(body.user_id.as_deref(), body.member_type.as_deref())?;
    match state.quota.consume_quota(&subject, tier).await {
        Ok(snapshot) => Ok(Json(QuotaResponse::from(&snapshot))),
        Err(MarginaliaError::QuotaExceeded { .. }) => {
            let snapshot = state.quota.get_quota(&subject, tier).await?;
            Err(ApiError::quota_exceeded(&snapshot))
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /api/tools
pub async fn get_tools(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::json!({ "tools": state.catalog.to_json() }))
}

/// POST /api/tools/analyze
pub async fn post_analyze(
    State(state): State<AppState>,
    Json(body): Json<AnalyzeRequest>,
) -> Json<AnalyzeResponse> {
    let keywords = state.analyzer.extract_keywords(&body.question);
    Json(AnalyzeResponse {
        keywords: keywords.terms,
        has_quoted_title: keywords.has_quoted_title,
        tool_calls: state.analyzer.analyze(&body.question),
    })
}
