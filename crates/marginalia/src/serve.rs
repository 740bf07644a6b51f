// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `marginalia serve` command implementation.
//!
//! Wires the quota store, reading-notes backend, completion client, and
//! chat relay into the gateway, then serves until SIGINT/SIGTERM. A
//! background task drops quota counters from past days.

use std::sync::Arc;
use std::time::Duration;

use marginalia_config::MarginaliaConfig;
use marginalia_core::MarginaliaError;
use marginalia_gateway::{AppState, start_server};
use marginalia_quota::QuotaService;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::shutdown;

/// Quota days kept before purging. Today is never purged.
const QUOTA_RETAIN_DAYS: u64 = 7;

const PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Runs the `marginalia serve` command.
pub async fn run_serve(config: MarginaliaConfig) -> Result<(), MarginaliaError> {
    info!(
        host = %config.server.host,
        port = config.server.port,
        "starting marginalia serve"
    );

    let cancel = shutdown::install_signal_handler();
    let state = AppState::from_config(&config, cancel.clone()).await?;

    {
        let quota = Arc::clone(&state.quota);
        let purge_cancel = cancel.clone();
        tokio::spawn(async move {
            purge_task(quota, purge_cancel).await;
        });
    }

    start_server(&config.server, state).await?;

    // Wake the background tasks if the server stopped for another reason.
    cancel.cancel();
    info!("marginalia serve shutdown complete");
    Ok(())
}

/// Hourly purge of stale quota records until cancelled.
async fn purge_task(quota: Arc<QuotaService>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(PURGE_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                match quota.purge_stale(QUOTA_RETAIN_DAYS).await {
                    Ok(removed) => debug!(removed, "quota purge pass finished"),
                    Err(e) => warn!(error = %e, "quota purge failed (non-fatal)"),
                }
            }
            _ = cancel.cancelled() => {
                info!("quota purge task shutting down");
                break;
            }
        }
    }
}

/// Initializes the tracing subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "marginalia={log_level},marginalia_gateway={log_level},marginalia_relay={log_level},\
             marginalia_tools={log_level},marginalia_quota={log_level},tower_http=info,warn"
        ))
    });

    // A second init (tests) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use marginalia_config::model::QuotaConfig;
    use marginalia_core::MembershipTier;
    use marginalia_quota::{MemoryQuotaStore, UtcClock};

    #[tokio::test(start_paused = true)]
    async fn purge_task_stops_on_cancel() {
        let quota = Arc::new(QuotaService::new(
            &QuotaConfig::default(),
            Arc::new(MemoryQuotaStore::new()),
            Arc::new(UtcClock),
        ));
        quota.consume_quota("u1", MembershipTier::Free).await.unwrap();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(purge_task(Arc::clone(&quota), cancel.clone()));
        tokio::time::sleep(PURGE_INTERVAL * 2).await;
        cancel.cancel();
        task.await.unwrap();

        // Today's counter survives every pass.
        let snapshot = quota.get_quota("u1", MembershipTier::Free).await.unwrap();
        assert_eq!(snapshot.used, 1);
    }
}
