// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Quota store trait: per-subject, per-day usage counters.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::MarginaliaError;
use crate::traits::adapter::PluginAdapter;

/// Result of a check-and-increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementOutcome {
    /// The counter was below the ceiling and now holds this value.
    Incremented(u32),
    /// The ceiling was already reached; the counter is unchanged at this value.
    AtCeiling(u32),
}

/// Storage for daily usage counters keyed by `(subject, day)`.
///
/// `try_increment` must be atomic: two concurrent callers can never both
/// observe room under the ceiling and push the counter past it.
#[async_trait]
pub trait QuotaStore: PluginAdapter {
    /// Current count for the subject on `day` (0 when no record exists).
    async fn usage(&self, subject: &str, day: NaiveDate) -> Result<u32, MarginaliaError>;

    /// Increments the counter unless it already equals `ceiling`.
    ///
    /// `None` means no ceiling.
    async fn try_increment(
        &self,
        subject: &str,
        day: NaiveDate,
        ceiling: Option<u32>,
    ) -> Result<IncrementOutcome, MarginaliaError>;

    /// Gives back one unit taken by `try_increment`. Never goes below zero.
    ///
    /// Returns the count after the release.
    async fn release(&self, subject: &str, day: NaiveDate) -> Result<u32, MarginaliaError>;

    /// Removes records older than `day`. Returns the number removed.
    async fn purge_before(&self, day: NaiveDate) -> Result<u64, MarginaliaError>;
}
