// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed quota store.
//!
//! One row per `(subject, day)`. Check-and-increment is a single conditional
//! upsert inside a transaction on the tokio-rusqlite background thread.
//! The schema lives in `migrations/` and is applied with refinery on open.

use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use marginalia_core::{
    AdapterType, HealthStatus, IncrementOutcome, MarginaliaError, PluginAdapter, QuotaStore,
};
use rusqlite::params;
use tracing::debug;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;
";

/// Convert a tokio-rusqlite error into MarginaliaError::Storage.
fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> MarginaliaError {
    MarginaliaError::Storage {
        source: Box::new(e),
    }
}

fn day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

/// Durable quota counters.
pub struct SqliteQuotaStore {
    conn: tokio_rusqlite::Connection,
}

impl SqliteQuotaStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, MarginaliaError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| MarginaliaError::Storage {
                source: Box::new(e),
            })?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| MarginaliaError::Storage {
                source: Box::new(e),
            })?;
        let store = Self::init(conn).await?;
        debug!(path = %path.display(), "quota database opened");
        Ok(store)
    }

    /// A private in-memory database.
    pub async fn open_in_memory() -> Result<Self, MarginaliaError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(|e| MarginaliaError::Storage {
                source: Box::new(e),
            })?;
        Self::init(conn).await
    }

    async fn init(conn: tokio_rusqlite::Connection) -> Result<Self, MarginaliaError> {
        conn.call(|conn| -> Result<(), rusqlite::Error> { conn.execute_batch(PRAGMAS) })
            .await
            .map_err(map_tr_err)?;

        let applied = conn
            .call(|conn| -> Result<usize, refinery::Error> {
                let report = embedded::migrations::runner().run(conn)?;
                Ok(report.applied_migrations().len())
            })
            .await
            .map_err(|e| MarginaliaError::Storage {
                source: Box::new(e),
            })?;
        if applied > 0 {
            debug!(applied, "quota migrations applied");
        }
        Ok(Self { conn })
    }
}

#[async_trait]
impl PluginAdapter for SqliteQuotaStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::QuotaStore
    }

    async fn health_check(&self) -> Result<HealthStatus, MarginaliaError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl QuotaStore for SqliteQuotaStore {
    async fn usage(&self, subject: &str, day: NaiveDate) -> Result<u32, MarginaliaError> {
        let subject = subject.to_string();
        let day = day_key(day);
        self.conn
            .call(move |conn| -> Result<u32, rusqlite::Error> {
                let used = conn
                    .query_row(
                        "SELECT used FROM quota_usage WHERE subject = ?1 AND day = ?2",
                        params![subject, day],
                        |row| row.get(0),
                    )
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(0),
                        other => Err(other),
                    })?;
                Ok(used)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn try_increment(
        &self,
        subject: &str,
        day: NaiveDate,
        ceiling: Option<u32>,
    ) -> Result<IncrementOutcome, MarginaliaError> {
        let subject = subject.to_string();
        let day = day_key(day);
        self.conn
            .call(move |conn| -> Result<IncrementOutcome, rusqlite::Error> {
                let tx = conn.transaction()?;

                let changed = if ceiling == Some(0) {
                    0
                } else {
                    tx.execute(
                        "INSERT INTO quota_usage (subject, day, used) VALUES (?1, ?2, 1)
                         ON CONFLICT(subject, day) DO UPDATE
                         SET used = used + 1,
                             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                         WHERE ?3 IS NULL OR quota_usage.used < ?3",
                        params![subject, day, ceiling],
                    )?
                };

                let used: u32 = tx
                    .query_row(
                        "SELECT used FROM quota_usage WHERE subject = ?1 AND day = ?2",
                        params![subject, day],
                        |row| row.get(0),
                    )
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(0),
                        other => Err(other),
                    })?;
                tx.commit()?;

                Ok(if changed == 0 {
                    IncrementOutcome::AtCeiling(used)
                } else {
                    IncrementOutcome::Incremented(used)
                })
            })
            .await
            .map_err(map_tr_err)
    }

    async fn release(&self, subject: &str, day: NaiveDate) -> Result<u32, MarginaliaError> {
        let subject = subject.to_string();
        let day = day_key(day);
        self.conn
            .call(move |conn| -> Result<u32, rusqlite::Error> {
                let used = conn
                    .query_row(
                        "UPDATE quota_usage
                         SET used = used - 1,
                             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                         WHERE subject = ?1 AND day = ?2 AND used > 0
                         RETURNING used",
                        params![subject, day],
                        |row| row.get(0),
                    )
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(0),
                        other => Err(other),
                    })?;
                Ok(used)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn purge_before(&self, day: NaiveDate) -> Result<u64, MarginaliaError> {
        let day = day_key(day);
        self.conn
            .call(move |conn| -> Result<u64, rusqlite::Error> {
                let removed = conn.execute("DELETE FROM quota_usage WHERE day < ?1", params![day])?;
                Ok(removed as u64)
            })
            .await
            .map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
    }

    #[tokio::test]
    async fn conditional_upsert_respects_ceiling() {
        let store = SqliteQuotaStore::open_in_memory().await.unwrap();
        for expected in 1..=3 {
            assert_eq!(
                store.try_increment("u1", day(1), Some(3)).await.unwrap(),
                IncrementOutcome::Incremented(expected)
            );
        }
        assert_eq!(
            store.try_increment("u1", day(1), Some(3)).await.unwrap(),
            IncrementOutcome::AtCeiling(3)
        );
        assert_eq!(store.usage("u1", day(1)).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn unbounded_keeps_counting() {
        let store = SqliteQuotaStore::open_in_memory().await.unwrap();
        for _ in 0..25 {
            store.try_increment("pro", day(1), None).await.unwrap();
        }
        assert_eq!(store.usage("pro", day(1)).await.unwrap(), 25);
    }

    #[tokio::test]
    async fn zero_ceiling_is_rejected_without_a_row() {
        let store = SqliteQuotaStore::open_in_memory().await.unwrap();
        assert_eq!(
            store.try_increment("u1", day(1), Some(0)).await.unwrap(),
            IncrementOutcome::AtCeiling(0)
        );
        assert_eq!(store.purge_before(day(30)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn purge_removes_old_days() {
        let store = SqliteQuotaStore::open_in_memory().await.unwrap();
        store.try_increment("u1", day(1), None).await.unwrap();
        store.try_increment("u1", day(2), None).await.unwrap();
        assert_eq!(store.purge_before(day(2)).await.unwrap(), 1);
        assert_eq!(store.usage("u1", day(1)).await.unwrap(), 0);
        assert_eq!(store.usage("u1", day(2)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn release_gives_back_one_unit() {
        let store = SqliteQuotaStore::open_in_memory().await.unwrap();
        store.try_increment("u1", day(1), Some(1)).await.unwrap();
        assert_eq!(store.release("u1", day(1)).await.unwrap(), 0);
        assert_eq!(store.release("u1", day(1)).await.unwrap(), 0);
        assert_eq!(store.release("nobody", day(1)).await.unwrap(), 0);
        assert_eq!(
            store.try_increment("u1", day(1), Some(1)).await.unwrap(),
            IncrementOutcome::Incremented(1)
        );
    }

    #[tokio::test]
    async fn reopening_does_not_reapply_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quota.db");
        {
            let store = SqliteQuotaStore::open(&path).await.unwrap();
            store.try_increment("u1", day(1), None).await.unwrap();
        }
        let store = SqliteQuotaStore::open(&path).await.unwrap();
        assert_eq!(store.usage("u1", day(1)).await.unwrap(), 1);
        let versions: i64 = store
            .conn
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row("SELECT COUNT(*) FROM refinery_schema_history", [], |row| {
                    row.get(0)
                })
            })
            .await
            .unwrap();
        assert_eq!(versions, 2);
    }

    #[tokio::test]
    async fn health_check_is_healthy() {
        let store = SqliteQuotaStore::open_in_memory().await.unwrap();
        assert_eq!(store.health_check().await.unwrap(), HealthStatus::Healthy);
    }
}
