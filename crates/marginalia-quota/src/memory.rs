// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process quota store. Counters are lost on restart.

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use marginalia_core::{
    AdapterType, IncrementOutcome, MarginaliaError, PluginAdapter, QuotaStore,
};

/// Quota counters held in a sharded concurrent map.
///
/// Check-and-increment runs under the shard lock of the key, so concurrent
/// consumers of the same subject are serialized.
#[derive(Debug, Default)]
pub struct MemoryQuotaStore {
    counts: DashMap<(String, NaiveDate), u32>,
}

impl MemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self, subject: &str, day: NaiveDate) -> u32 {
        self.counts
            .get(&(subject.to_string(), day))
            .map(|v| *v)
            .unwrap_or(0)
    }
}

#[async_trait]
impl PluginAdapter for MemoryQuotaStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::QuotaStore
    }
}

#[async_trait]
impl QuotaStore for MemoryQuotaStore {
    async fn usage(&self, subject: &str, day: NaiveDate) -> Result<u32, MarginaliaError> {
        Ok(self.current(subject, day))
    }

    async fn try_increment(
        &self,
        subject: &str,
        day: NaiveDate,
        ceiling: Option<u32>,
    ) -> Result<IncrementOutcome, MarginaliaError> {
        if ceiling == Some(0) {
            return Ok(IncrementOutcome::AtCeiling(self.current(subject, day)));
        }

        let mut used = self.counts.entry((subject.to_string(), day)).or_insert(0);
        if let Some(ceiling) = ceiling
            && *used >= ceiling
        {
            return Ok(IncrementOutcome::AtCeiling(*used));
        }
        *used += 1;
        Ok(IncrementOutcome::Incremented(*used))
    }

    async fn release(&self, subject: &str, day: NaiveDate) -> Result<u32, MarginaliaError> {
        let key = (subject.to_string(), day);
        let Some(mut used) = self.counts.get_mut(&key) else {
            return Ok(0);
        };
        *used = used.saturating_sub(1);
        Ok(*used)
    }

    async fn purge_before(&self, day: NaiveDate) -> Result<u64, MarginaliaError> {
        // Counted inside `retain`: keys for today keep arriving meanwhile.
        let mut removed = 0u64;
        self.counts.retain(|(_, d), _| {
            let keep = *d >= day;
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}
