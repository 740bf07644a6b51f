// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;
use std::time::Instant;

use axum::http::{HeaderValue, Method, header};
use axum::{
    Router,
    routing::{get, post},
};
use marginalia_config::MarginaliaConfig;
use marginalia_config::model::ServerConfig;
use marginalia_core::{BookBackend, CompletionProvider, MarginaliaError};
use marginalia_quota::QuotaService;
use marginalia_relay::{ChatRelay, OpenAiCompatClient};
use marginalia_tools::{Analyzer, HttpBackend, ToolCatalog, ToolExecutor};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{handlers, sse};

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct AppState {
    pub quota: Arc<QuotaService>,
    pub relay: ChatRelay,
    pub analyzer: Arc<Analyzer>,
    pub catalog: ToolCatalog,
    /// Consume one quota unit after each completed chat turn.
    pub charge_quota: bool,
    /// Cancelled on server shutdown; every chat turn runs under a child token.
    pub shutdown: CancellationToken,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        quota: Arc<QuotaService>,
        relay: ChatRelay,
        analyzer: Arc<Analyzer>,
        charge_quota: bool,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            quota,
            relay,
            analyzer,
            catalog: ToolCatalog::new(),
            charge_quota,
            shutdown,
            started_at: Instant::now(),
        }
    }

    /// Wire the production adapters: the configured quota store, the HTTP
    /// backend, and the OpenAI-compatible completion client.
    pub async fn from_config(
        config: &MarginaliaConfig,
        shutdown: CancellationToken,
    ) -> Result<Self, MarginaliaError> {
        let quota = Arc::new(marginalia_quota::from_config(&config.quota).await?);
        let analyzer = Arc::new(Analyzer::from_config(&config.tools)?);
        let backend: Arc<dyn BookBackend> = Arc::new(HttpBackend::new(&config.backend)?);
        let executor = Arc::new(ToolExecutor::new(backend, &config.tools));
        let client = OpenAiCompatClient::new(&config.completion)?;
        let model = client.model().to_string();
        let completion: Arc<dyn CompletionProvider> = Arc::new(client);
        let relay = ChatRelay::new(
            Arc::clone(&analyzer),
            executor,
            completion,
            &config.relay,
            config.tools.enabled,
        );
        info!(
            quota_store = ?config.quota.store,
            tools_enabled = config.tools.enabled,
            %model,
            "gateway state initialized"
        );
        Ok(Self::new(
            quota,
            relay,
            analyzer,
            config.relay.charge_quota,
            shutdown,
        ))
    }
}

/// Build the application router.
///
/// Routes:
/// - GET /health
/// - GET /api/quota
/// - POST /api/quota/consume
/// - GET /api/tools
/// - POST /api/tools/analyze
/// - POST /api/chat (streamed)
pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .route("/api/quota", get(handlers::get_quota))
        .route("/api/quota/consume", post(handlers::post_consume))
        .route("/api/tools", get(handlers::get_tools))
        .route("/api/tools/analyze", post(handlers::post_analyze))
        .route("/api/chat", post(sse::post_chat))
        .with_state(state)
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
}

/// Any origin when the list is empty, otherwise exactly the listed ones.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(%origin, error = %e, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Bind and serve until the state's shutdown token is cancelled.
pub async fn start_server(config: &ServerConfig, state: AppState) -> Result<(), MarginaliaError> {
    let shutdown = state.shutdown.clone();
    let app = build_router(state, &config.allowed_origins);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| MarginaliaError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;

    info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| MarginaliaError::Internal(format!("gateway server error: {e}")))?;

    info!("gateway stopped");
    Ok(())
}

