// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Day-boundary clocks for quota accounting.

use std::sync::Mutex;

use chrono::{DateTime, Days, Local, NaiveDate, TimeZone, Utc};
use marginalia_config::model::DayBoundary;

/// Decides which calendar day a request belongs to and when that day ends.
pub trait Clock: Send + Sync + 'static {
    /// The quota day for "now".
    fn today(&self) -> NaiveDate;

    /// Instant at which the next quota day starts.
    fn next_reset(&self) -> DateTime<Utc>;
}

/// Days roll over at midnight UTC.
#[derive(Debug, Default, Clone, Copy)]
pub struct UtcClock;

impl Clock for UtcClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }

    fn next_reset(&self) -> DateTime<Utc> {
        next_midnight_utc(self.today())
    }
}

/// Days roll over at midnight in the server's local timezone.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn next_reset(&self) -> DateTime<Utc> {
        let tomorrow = self.today().checked_add_days(Days::new(1));
        tomorrow
            .and_then(|day| day.and_hms_opt(0, 0, 0))
            // A DST gap can skip local midnight; take the earliest valid instant.
            .and_then(|midnight| Local.from_local_datetime(&midnight).earliest())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| next_midnight_utc(Utc::now().date_naive()))
    }
}

/// A manually driven clock.
///
/// Starts at a fixed instant and only moves when [`ManualClock::set`] is called.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    fn next_reset(&self) -> DateTime<Utc> {
        next_midnight_utc(self.today())
    }
}

/// Build the clock selected by `quota.day_boundary`.
pub fn clock_for(boundary: DayBoundary) -> Box<dyn Clock> {
    match boundary {
        DayBoundary::Utc => Box::new(UtcClock),
        DayBoundary::Local => Box::new(LocalClock),
    }
}

fn next_midnight_utc(day: NaiveDate) -> DateTime<Utc> {
    let next = day.checked_add_days(Days::new(1)).unwrap_or(day);
    next.and_time(chrono::NaiveTime::MIN).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_reports_utc_day_and_next_midnight() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 14, 23, 59, 0).unwrap());
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2026, 3, 14).unwrap());
        assert_eq!(
            clock.next_reset(),
            Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap()
        );

        clock.set(Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 1).unwrap());
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2026, 3, 15).unwrap());
    }

    #[test]
    fn utc_reset_is_in_the_future() {
        let clock = UtcClock;
        assert!(clock.next_reset() > Utc::now());
    }

    #[test]
    fn local_reset_is_within_a_day() {
        let reset = LocalClock.next_reset();
        let now = Utc::now();
        assert!(reset > now);
        assert!(reset - now <= chrono::Duration::hours(26));
    }
}
