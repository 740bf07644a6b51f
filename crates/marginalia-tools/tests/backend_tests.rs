// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP backend tests against a wiremock server.

use std::sync::Arc;

use marginalia_config::model::{BackendConfig, ToolsConfig};
use marginalia_core::{BackendCredential, BookBackend, MarginaliaError};
use marginalia_tools::{HttpBackend, ToolCall, ToolExecutor, format_context};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend(server: &MockServer) -> HttpBackend {
    HttpBackend::new(&BackendConfig {
        base_url: server.uri(),
        ..BackendConfig::default()
    })
    .unwrap()
}

fn credential() -> BackendCredential {
    BackendCredential::new("reader-token")
}

async fn mount_books(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/books"))
        .and(header("authorization", "Bearer reader-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": [
                {"bookId": "b1", "title": "原则", "author": "瑞·达利欧", "bookmarkCount": 5, "reviewCount": 2},
                {"bookId": "b2", "title": "活着", "author": "余华", "markCount": 1}
            ]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn list_books_forwards_bearer_and_unwraps_envelope() {
    let server = MockServer::start().await;
    mount_books(&server).await;

    let books = backend(&server).list_books(&credential()).await.unwrap();
    assert_eq!(books.len(), 2);
    assert_eq!(books[0].highlight_count, 5);
    assert_eq!(books[1].highlight_count, 1);
}

#[tokio::test]
async fn wrapped_notes_are_unwrapped_and_tagged_with_book() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/books/b1/notes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {
                "bookName": "原则",
                "notes": [
                    {"markText": "痛苦+反思=进步", "chapterTitle": "第一章", "createTime": 1700000000},
                    {"review": "直面问题"}
                ]
            }
        })))
        .mount(&server)
        .await;

    let notes = backend(&server)
        .book_notes(&credential(), "b1")
        .await
        .unwrap();
    assert_eq!(notes.book_name.as_deref(), Some("原则"));
    assert_eq!(notes.notes.len(), 2);
    assert!(notes.notes.iter().all(|n| n.book_id == "b1"));
    assert_eq!(notes.notes[0].excerpt.as_deref(), Some("痛苦+反思=进步"));
    assert_eq!(notes.notes[1].thought.as_deref(), Some("直面问题"));
}

#[tokio::test]
async fn envelope_failure_becomes_backend_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/books"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "token expired"
        })))
        .mount(&server)
        .await;

    let err = backend(&server).list_books(&credential()).await.unwrap_err();
    match err {
        MarginaliaError::Backend { message, .. } => assert_eq!(message, "token expired"),
        other => panic!("expected backend error, got {other:?}"),
    }
}

#[tokio::test]
async fn http_status_failure_carries_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/books"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .mount(&server)
        .await;

    let err = backend(&server).list_books(&credential()).await.unwrap_err();
    assert!(matches!(err, MarginaliaError::Backend { status: Some(401), .. }));
}

#[tokio::test]
async fn library_search_survives_one_failing_book() {
    let server = MockServer::start().await;
    mount_books(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/books/b1/notes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": [{"markText": "痛苦+反思=进步"}, {"markText": "极度透明"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/books/b2/notes"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let executor = ToolExecutor::new(Arc::new(backend(&server)), &ToolsConfig::default());
    let result = executor
        .execute(&ToolCall::search_notes("反思"), &credential())
        .await
        .unwrap();

    assert_eq!(result.count, 1);
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("活着"));

    let context = format_context(&[result]);
    assert!(context.contains("痛苦+反思=进步"));
    assert!(context.contains("共 1 条笔记"));
}
