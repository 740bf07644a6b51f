// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Router-level tests driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use marginalia_config::model::{QuotaConfig, RelayConfig, ToolsConfig};
use marginalia_core::MembershipTier;
use marginalia_gateway::{AppState, build_router};
use marginalia_quota::{MemoryQuotaStore, QuotaService, UtcClock};
use marginalia_relay::ChatRelay;
use marginalia_test_utils::{MockBackend, MockCompletion};
use marginalia_tools::{Analyzer, ToolExecutor};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

struct Harness {
    router: Router,
    quota: Arc<QuotaService>,
    completion: MockCompletion,
}

fn harness_with(completion: MockCompletion, free_daily_limit: u32) -> Harness {
    let quota_config = QuotaConfig {
        free_daily_limit,
        ..QuotaConfig::default()
    };
    let quota = Arc::new(QuotaService::new(
        &quota_config,
        Arc::new(MemoryQuotaStore::new()),
        Arc::new(UtcClock),
    ));
    let analyzer = Arc::new(Analyzer::builtin().unwrap());
    let executor = Arc::new(ToolExecutor::new(
        Arc::new(MockBackend::library()),
        &ToolsConfig::default(),
    ));
    let relay_config = RelayConfig {
        status_pacing_ms: 0,
        ..RelayConfig::default()
    };
    let relay = ChatRelay::new(
        Arc::clone(&analyzer),
        executor,
        Arc::new(completion.clone()),
        &relay_config,
        true,
    );
    let state = AppState::new(
        Arc::clone(&quota),
        relay,
        analyzer,
        true,
        CancellationToken::new(),
    );
    Harness {
        router: build_router(state, &[]),
        quota,
        completion,
    }
}

fn harness() -> Harness {
    harness_with(MockCompletion::with_deltas(&["好的"]), 2)
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(t) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {t}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn post(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(t) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {t}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

async fn send_json(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(router, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

async fn wait_for_usage(quota: &QuotaService, subject: &str, expected: u32) -> u32 {
    let mut used = 0;
    for _ in 0..100 {
        used = quota.get_quota(subject, MembershipTier::Free).await.unwrap().used;
        if used == expected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    used
}

#[tokio::test]
async fn health_reports_ok() {
    let h = harness();
    let (status, body) = send_json(&h.router, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["quotaStore"], "healthy");

    let adapters = body["adapters"].as_array().unwrap();
    let kinds: Vec<&str> = adapters.iter().map(|a| a["type"].as_str().unwrap()).collect();
    assert_eq!(kinds, ["QuotaStore", "Backend", "Completion"]);
    assert_eq!(adapters[0]["name"], "memory");
    assert_eq!(adapters[1]["name"], "mock-backend");
    assert_eq!(adapters[2]["version"], "0.1.0");
    assert!(adapters.iter().all(|a| a["status"] == "healthy"));
}

#[tokio::test]
async fn anonymous_quota_is_default_allowance() {
    let h = harness();
    let (status, body) = send_json(&h.router, get("/api/quota", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["used"], 0);
    assert_eq!(body["limit"], 2);
    assert_eq!(body["remaining"], 2);
    assert_eq!(body["memberType"], "FREE");
    assert_eq!(body["canUse"], true);
    assert!(body["resetTime"].as_str().unwrap().ends_with("+00:00"));
}

#[tokio::test]
async fn pro_quota_is_unlimited() {
    let h = harness();
    let (status, body) = send_json(
        &h.router,
        get("/api/quota?userId=u1&memberType=PRO", Some("tok")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["limit"], -1);
    assert_eq!(body["remaining"], -1);
}

#[tokio::test]
async fn member_type_is_case_insensitive_and_unknown_is_rejected() {
    let h = harness();
    let (status, body) = send_json(
        &h.router,
        get("/api/quota?userId=u1&memberType=pro", Some("tok")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["memberType"], "PRO");

    let (status, body) = send_json(
        &h.router,
        get("/api/quota?userId=u1&memberType=GOLD", Some("tok")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("unknown memberType"));
}

#[tokio::test]
async fn identified_quota_requires_user_id() {
    let h = harness();
    let (status, body) = send_json(&h.router, get("/api/quota", Some("tok"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("userId"));
}

#[tokio::test]
async fn consume_until_exhausted_returns_429() {
    let h = harness();
    let consume = || post("/api/quota/consume", Some("tok"), json!({"userId": "u1"}));

    let (status, body) = send_json(&h.router, consume()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["used"], 1);
    assert_eq!(body["remaining"], 1);

    let (status, _) = send_json(&h.router, consume()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send_json(&h.router, consume()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "QUOTA_EXCEEDED");
    assert_eq!(body["quota"]["used"], 2);
    assert_eq!(body["quota"]["canUse"], false);
}

#[tokio::test]
async fn anonymous_consume_records_nothing() {
    let h = harness();
    let (status, body) = send_json(
        &h.router,
        post("/api/quota/consume", None, json!({"userId": "u1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["used"], 0);
    assert_eq!(h.quota.get_quota("u1", MembershipTier::Free).await.unwrap().used, 0);
}

#[tokio::test]
async fn tool_catalog_lists_four_tools() {
    let h = harness();
    let (status, body) = send_json(&h.router, get("/api/tools", None)).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names.len(), 4);
    assert!(names.contains(&"search_notes"));
}

#[tokio::test]
async fn analyze_returns_keywords_and_calls() {
    let h = harness();
    let (status, body) = send_json(
        &h.router,
        post("/api/tools/analyze", None, json!({"question": "我书架上有什么书"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["toolCalls"][0]["name"], "get_bookshelf");
}

#[tokio::test]
async fn chat_streams_status_then_completion_and_charges() {
    let h = harness();
    let response = h
        .router
        .clone()
        .oneshot(post(
            "/api/chat",
            Some("reader-token"),
            json!({
                "messages": [{"role": "user", "content": "我书架上有什么书"}],
                "userId": "u1",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
    assert!(response.headers().contains_key("x-turn-id"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    let status_at = text.find("\"type\":\"mcp_status\"").unwrap();
    let delta_at = text.find("好的").unwrap();
    assert!(status_at < delta_at);
    assert!(text.contains("\"status\":\"\""));
    assert!(text.ends_with("data: [DONE]\n\n"));

    let sent = &h.completion.requests()[0];
    assert!(sent[0].content.contains("【我的书架】"));
    assert_eq!(wait_for_usage(&h.quota, "u1", 1).await, 1);
}

#[tokio::test]
async fn chat_refused_when_quota_exhausted() {
    let h = harness();
    for _ in 0..2 {
        h.quota.consume_quota("u1", MembershipTier::Free).await.unwrap();
    }
    let (status, body) = send_json(
        &h.router,
        post(
            "/api/chat",
            Some("tok"),
            json!({"messages": [{"role": "user", "content": "hi"}], "userId": "u1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "QUOTA_EXCEEDED");
    assert_eq!(h.completion.call_count(), 0);
}

#[tokio::test]
async fn failed_completion_is_not_charged() {
    let h = harness_with(MockCompletion::failing("API returned 500"), 2);
    let (status, body) = send(
        &h.router,
        post(
            "/api/chat",
            Some("tok"),
            json!({"messages": [{"role": "user", "content": "hi"}], "userId": "u1", "useTools": false}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("\"type\":\"error\""));

    assert_eq!(wait_for_usage(&h.quota, "u1", 0).await, 0);
}

#[tokio::test]
async fn concurrent_chats_cannot_overshoot_the_last_unit() {
    let completion =
        MockCompletion::with_deltas(&["慢", "慢", "来"]).with_chunk_delay(Duration::from_millis(20));
    let h = harness_with(completion, 2);
    h.quota.consume_quota("u1", MembershipTier::Free).await.unwrap();

    let chat = || {
        post(
            "/api/chat",
            Some("tok"),
            json!({"messages": [{"role": "user", "content": "hi"}], "userId": "u1", "useTools": false}),
        )
    };
    let (first, second) = tokio::join!(send(&h.router, chat()), send(&h.router, chat()));

    let mut statuses = [first.0.as_u16(), second.0.as_u16()];
    statuses.sort_unstable();
    assert_eq!(statuses, [200, 429]);
    assert_eq!(h.completion.call_count(), 1);
    assert_eq!(wait_for_usage(&h.quota, "u1", 2).await, 2);
}

#[tokio::test]
async fn empty_chat_is_rejected() {
    let h = harness();
    let (status, _) = send_json(&h.router, post("/api/chat", None, json!({"messages": []}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn configured_cors_origin_is_echoed() {
    let h = harness();
    let state_router = {
        // Rebuild with an explicit origin list.
        let relay_config = RelayConfig::default();
        let analyzer = Arc::new(Analyzer::builtin().unwrap());
        let relay = ChatRelay::new(
            Arc::clone(&analyzer),
            Arc::new(ToolExecutor::new(
                Arc::new(MockBackend::library()),
                &ToolsConfig::default(),
            )),
            Arc::new(MockCompletion::with_deltas(&[])),
            &relay_config,
            true,
        );
        let state = AppState::new(h.quota.clone(), relay, analyzer, true, CancellationToken::new());
        build_router(state, &["https://notes.example.com".to_string()])
    };
    let request = Request::builder()
        .uri("/health")
        .header(header::ORIGIN, "https://notes.example.com")
        .body(Body::empty())
        .unwrap();
    let response = state_router.oneshot(request).await.unwrap();
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://notes.example.com"
    );
}
