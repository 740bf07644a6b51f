// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Daily chat quota for marginalia.
//!
//! This crate provides:
//! - **Stores**: [`MemoryQuotaStore`] (process-local) and [`SqliteQuotaStore`]
//!   (durable), both with atomic check-and-increment
//! - **Clocks**: UTC or local day boundaries, plus a manual clock for tests
//! - **Service**: tier-to-ceiling mapping, 80% warnings, and snapshots

pub mod clock;
pub mod memory;
pub mod service;
pub mod sqlite;

use std::sync::Arc;

use marginalia_config::model::{QuotaBackend, QuotaConfig};
use marginalia_core::{MarginaliaError, QuotaStore};

pub use clock::{Clock, LocalClock, ManualClock, UtcClock, clock_for};
pub use memory::MemoryQuotaStore;
pub use service::{QuotaReservation, QuotaService, QuotaSnapshot};
pub use sqlite::SqliteQuotaStore;

/// Open the store selected by `quota.store`.
pub async fn open_store(config: &QuotaConfig) -> Result<Arc<dyn QuotaStore>, MarginaliaError> {
    match config.store {
        QuotaBackend::Memory => Ok(Arc::new(MemoryQuotaStore::new())),
        QuotaBackend::Sqlite => Ok(Arc::new(
            SqliteQuotaStore::open(&config.database_path).await?,
        )),
    }
}

/// Build a [`QuotaService`] from configuration.
pub async fn from_config(config: &QuotaConfig) -> Result<QuotaService, MarginaliaError> {
    let store = open_store(config).await?;
    let clock: Arc<dyn Clock> = Arc::from(clock_for(config.day_boundary));
    Ok(QuotaService::new(config, store, clock))
}
