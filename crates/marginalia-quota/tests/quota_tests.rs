// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for quota persistence and concurrency.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use marginalia_config::model::{QuotaBackend, QuotaConfig};
use marginalia_core::{MarginaliaError, MembershipTier, PluginAdapter};
use marginalia_quota::{ManualClock, QuotaService, SqliteQuotaStore};

fn config(free: u32) -> QuotaConfig {
    QuotaConfig {
        free_daily_limit: free,
        ..QuotaConfig::default()
    }
}

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 7, 1, 9, 30, 0).unwrap(),
    ))
}

#[tokio::test]
async fn sqlite_usage_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("quota.db");

    {
        let store = Arc::new(SqliteQuotaStore::open(&path).await.unwrap());
        let service = QuotaService::new(&config(3), store, clock());
        service.consume_quota("u1", MembershipTier::Free).await.unwrap();
        service.consume_quota("u1", MembershipTier::Free).await.unwrap();
    }

    let store = Arc::new(SqliteQuotaStore::open(&path).await.unwrap());
    let service = QuotaService::new(&config(3), store, clock());
    let snap = service.get_quota("u1", MembershipTier::Free).await.unwrap();
    assert_eq!(snap.used, 2);

    service.consume_quota("u1", MembershipTier::Free).await.unwrap();
    let err = service
        .consume_quota("u1", MembershipTier::Free)
        .await
        .unwrap_err();
    assert!(matches!(err, MarginaliaError::QuotaExceeded { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sqlite_consumers_stop_at_ceiling() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteQuotaStore::open(dir.path().join("q.db")).await.unwrap());
    let service = Arc::new(QuotaService::new(&config(10), store, clock()));

    let results = futures::future::join_all((0..40).map(|_| {
        let service = Arc::clone(&service);
        async move { service.consume_quota("u1", MembershipTier::Free).await }
    }))
    .await;

    let granted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(granted, 10);
    let snap = service.get_quota("u1", MembershipTier::Free).await.unwrap();
    assert_eq!(snap.used, 10);
    assert!(!snap.can_use);
}

#[tokio::test]
async fn from_config_builds_selected_store() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = QuotaConfig {
        store: QuotaBackend::Sqlite,
        database_path: dir.path().join("quota.db").display().to_string(),
        ..QuotaConfig::default()
    };
    let service = marginalia_quota::from_config(&cfg).await.unwrap();
    assert_eq!(service.store().name(), "sqlite");

    let memory = marginalia_quota::from_config(&QuotaConfig::default())
        .await
        .unwrap();
    assert_eq!(memory.store().name(), "memory");
}
