// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tier-aware quota queries and consumption.
//!
//! The service maps a membership tier to its daily ceiling, asks the clock
//! which day it is, and delegates the atomic check-and-increment to the
//! configured [`QuotaStore`]. It warns at 80% of a ceiling and returns
//! [`MarginaliaError::QuotaExceeded`] once the ceiling is reached.

use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, Utc};
use marginalia_config::model::QuotaConfig;
use marginalia_core::{
    DailyLimit, IncrementOutcome, MarginaliaError, MembershipTier, QuotaStore,
};
use tracing::{debug, info, warn};

use crate::clock::Clock;

/// A point-in-time view of one subject's allowance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaSnapshot {
    pub used: u32,
    pub limit: DailyLimit,
    pub tier: MembershipTier,
    pub can_use: bool,
    /// Start of the next quota day.
    pub reset_time: DateTime<Utc>,
}

impl QuotaSnapshot {
    fn new(used: u32, limit: DailyLimit, tier: MembershipTier, reset_time: DateTime<Utc>) -> Self {
        let can_use = match limit {
            DailyLimit::Unbounded => true,
            DailyLimit::Bounded(n) => used < n,
        };
        Self {
            used,
            limit,
            tier,
            can_use,
            reset_time,
        }
    }

    /// Units left today. `Unbounded` for tiers without a ceiling.
    pub fn remaining(&self) -> DailyLimit {
        match self.limit {
            DailyLimit::Unbounded => DailyLimit::Unbounded,
            DailyLimit::Bounded(n) => DailyLimit::Bounded(n.saturating_sub(self.used)),
        }
    }
}

/// One unit taken ahead of a chat turn.
///
/// Remembers the quota day it was taken on, so a release after midnight
/// returns the unit to the right counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaReservation {
    pub subject: String,
    pub tier: MembershipTier,
    pub day: NaiveDate,
    /// The allowance right after the unit was taken.
    pub snapshot: QuotaSnapshot,
}

/// Daily quota accounting over a pluggable store.
pub struct QuotaService {
    store: Arc<dyn QuotaStore>,
    clock: Arc<dyn Clock>,
    free_daily_limit: u32,
    plus_daily_limit: u32,
}

impl QuotaService {
    pub fn new(config: &QuotaConfig, store: Arc<dyn QuotaStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            free_daily_limit: config.free_daily_limit,
            plus_daily_limit: config.plus_daily_limit,
        }
    }

    /// The underlying store (for health reporting).
    pub fn store(&self) -> &Arc<dyn QuotaStore> {
        &self.store
    }

    /// Daily ceiling for a tier. PRO is never limited.
    pub fn limit_for(&self, tier: MembershipTier) -> DailyLimit {
        match tier {
            MembershipTier::Free => DailyLimit::Bounded(self.free_daily_limit),
            MembershipTier::Plus => DailyLimit::Bounded(self.plus_daily_limit),
            MembershipTier::Pro => DailyLimit::Unbounded,
        }
    }

    /// The full FREE allowance, for callers that cannot be identified.
    ///
    /// Does not touch the store.
    pub fn default_allowance(&self) -> QuotaSnapshot {
        let tier = MembershipTier::Free;
        QuotaSnapshot::new(0, self.limit_for(tier), tier, self.clock.next_reset())
    }

    /// Today's usage for `subject`. Absent records read as zero.
    pub async fn get_quota(
        &self,
        subject: &str,
        tier: MembershipTier,
    ) -> Result<QuotaSnapshot, MarginaliaError> {
        let used = self.store.usage(subject, self.clock.today()).await?;
        Ok(QuotaSnapshot::new(
            used,
            self.limit_for(tier),
            tier,
            self.clock.next_reset(),
        ))
    }

    /// Consume one unit of today's allowance.
    ///
    /// Fails with [`MarginaliaError::QuotaExceeded`], leaving the counter
    /// untouched, when the ceiling has been reached.
    pub async fn consume_quota(
        &self,
        subject: &str,
        tier: MembershipTier,
    ) -> Result<QuotaSnapshot, MarginaliaError> {
        self.consume_on(subject, tier, self.clock.today()).await
    }

    /// Take one unit now, to be kept or handed back with [`Self::release`].
    ///
    /// Same ceiling rules as [`Self::consume_quota`].
    pub async fn reserve(
        &self,
        subject: &str,
        tier: MembershipTier,
    ) -> Result<QuotaReservation, MarginaliaError> {
        let day = self.clock.today();
        let snapshot = self.consume_on(subject, tier, day).await?;
        Ok(QuotaReservation {
            subject: subject.to_string(),
            tier,
            day,
            snapshot,
        })
    }

    /// Hand back a reserved unit.
    pub async fn release(&self, reservation: &QuotaReservation) -> Result<u32, MarginaliaError> {
        let used = self
            .store
            .release(&reservation.subject, reservation.day)
            .await?;
        debug!(subject = %reservation.subject, used, day = %reservation.day, "quota unit released");
        Ok(used)
    }

    async fn consume_on(
        &self,
        subject: &str,
        tier: MembershipTier,
        day: NaiveDate,
    ) -> Result<QuotaSnapshot, MarginaliaError> {
        let limit = self.limit_for(tier);

        match self.store.try_increment(subject, day, limit.ceiling()).await? {
            IncrementOutcome::Incremented(used) => {
                if let DailyLimit::Bounded(ceiling) = limit
                    && ceiling > 0
                    && u64::from(used) * 5 >= u64::from(ceiling) * 4
                {
                    warn!(subject, used, ceiling, %tier, "approaching daily quota (80%+)");
                } else {
                    debug!(subject, used, %tier, "quota consumed");
                }
                Ok(QuotaSnapshot::new(used, limit, tier, self.clock.next_reset()))
            }
            IncrementOutcome::AtCeiling(used) => {
                info!(subject, used, %tier, "daily quota exhausted");
                Err(MarginaliaError::QuotaExceeded {
                    subject: subject.to_string(),
                    limit: limit.ceiling().unwrap_or(used),
                })
            }
        }
    }

    /// Drop counters older than `retain_days` days before today.
    pub async fn purge_stale(&self, retain_days: u64) -> Result<u64, MarginaliaError> {
        let today = self.clock.today();
        let cutoff = today.checked_sub_days(Days::new(retain_days)).unwrap_or(today);
        let removed = self.store.purge_before(cutoff).await?;
        if removed > 0 {
            info!(removed, %cutoff, "purged stale quota records");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::clock::ManualClock;
    use crate::memory::MemoryQuotaStore;

    fn service_with_clock(free: u32, clock: Arc<ManualClock>) -> QuotaService {
        let config = QuotaConfig {
            free_daily_limit: free,
            plus_daily_limit: 20,
            ..QuotaConfig::default()
        };
        QuotaService::new(&config, Arc::new(MemoryQuotaStore::new()), clock)
    }

    fn noon(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, day, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn fresh_subject_has_full_allowance() {
        let service = service_with_clock(10, Arc::new(ManualClock::new(noon(1))));
        let snap = service.get_quota("u1", MembershipTier::Free).await.unwrap();
        assert_eq!(snap.used, 0);
        assert_eq!(snap.limit, DailyLimit::Bounded(10));
        assert_eq!(snap.remaining(), DailyLimit::Bounded(10));
        assert!(snap.can_use);
        assert_eq!(snap.reset_time, Utc.with_ymd_and_hms(2026, 6, 2, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn consume_until_exhausted_then_reject_without_mutation() {
        let service = service_with_clock(2, Arc::new(ManualClock::new(noon(1))));

        let first = service.consume_quota("u1", MembershipTier::Free).await.unwrap();
        assert_eq!(first.used, 1);
        let second = service.consume_quota("u1", MembershipTier::Free).await.unwrap();
        assert_eq!(second.used, 2);
        assert!(!second.can_use);
        assert_eq!(second.remaining(), DailyLimit::Bounded(0));

        let err = service
            .consume_quota("u1", MembershipTier::Free)
            .await
            .unwrap_err();
        assert!(matches!(err, MarginaliaError::QuotaExceeded { limit: 2, .. }));

        let after = service.get_quota("u1", MembershipTier::Free).await.unwrap();
        assert_eq!(after.used, 2);
    }

    #[tokio::test]
    async fn pro_is_unbounded() {
        let service = service_with_clock(1, Arc::new(ManualClock::new(noon(1))));
        for _ in 0..30 {
            service.consume_quota("vip", MembershipTier::Pro).await.unwrap();
        }
        let snap = service.get_quota("vip", MembershipTier::Pro).await.unwrap();
        assert_eq!(snap.used, 30);
        assert_eq!(snap.limit.as_wire(), -1);
        assert_eq!(snap.remaining().as_wire(), -1);
        assert!(snap.can_use);
    }

    #[tokio::test]
    async fn plus_uses_its_own_ceiling() {
        let service = service_with_clock(1, Arc::new(ManualClock::new(noon(1))));
        assert_eq!(service.limit_for(MembershipTier::Plus), DailyLimit::Bounded(20));
    }

    #[tokio::test]
    async fn new_day_starts_from_zero() {
        let clock = Arc::new(ManualClock::new(noon(1)));
        let service = service_with_clock(1, Arc::clone(&clock));
        service.consume_quota("u1", MembershipTier::Free).await.unwrap();
        assert!(service.consume_quota("u1", MembershipTier::Free).await.is_err());

        clock.set(noon(2));
        let snap = service.consume_quota("u1", MembershipTier::Free).await.unwrap();
        assert_eq!(snap.used, 1);
    }

    #[tokio::test]
    async fn default_allowance_does_not_touch_store() {
        let service = service_with_clock(10, Arc::new(ManualClock::new(noon(1))));
        let snap = service.default_allowance();
        assert_eq!(snap.used, 0);
        assert_eq!(snap.tier, MembershipTier::Free);
        assert_eq!(snap.limit, DailyLimit::Bounded(10));
    }

    #[tokio::test]
    async fn purge_keeps_recent_days() {
        let clock = Arc::new(ManualClock::new(noon(1)));
        let service = service_with_clock(10, Arc::clone(&clock));
        service.consume_quota("u1", MembershipTier::Free).await.unwrap();

        clock.set(noon(5));
        service.consume_quota("u1", MembershipTier::Free).await.unwrap();

        assert_eq!(service.purge_stale(2).await.unwrap(), 1);
        assert_eq!(service.get_quota("u1", MembershipTier::Free).await.unwrap().used, 1);
    }

    #[tokio::test]
    async fn reservation_released_after_midnight_returns_to_its_day() {
        let clock = Arc::new(ManualClock::new(noon(1)));
        let service = service_with_clock(1, Arc::clone(&clock));

        let reservation = service.reserve("u1", MembershipTier::Free).await.unwrap();
        assert_eq!(reservation.snapshot.used, 1);
        assert!(service.reserve("u1", MembershipTier::Free).await.is_err());

        clock.set(noon(2));
        service.consume_quota("u1", MembershipTier::Free).await.unwrap();
        assert_eq!(service.release(&reservation).await.unwrap(), 0);
        assert_eq!(service.get_quota("u1", MembershipTier::Free).await.unwrap().used, 1);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn warns_near_ceiling() {
        let service = service_with_clock(5, Arc::new(ManualClock::new(noon(1))));
        for _ in 0..4 {
            service.consume_quota("u1", MembershipTier::Free).await.unwrap();
        }
        assert!(logs_contain("approaching daily quota"));
    }
}
