//! Jittered due-date computation.

use chrono::{DateTime, Duration, Months, Utc};
use rand::Rng;
use rand::rngs::OsRng;

/// Default cadence: 5 months...
pub const DEFAULT_BASE_MONTHS: u32 = 5;
/// ...plus 14 days.
pub const DEFAULT_BASE_DAYS: u32 = 14;
/// Jitter days are drawn from `0..DEFAULT_JITTER_DAYS`.
pub const DEFAULT_JITTER_DAYS: u32 = 30;

/// A random offset added on top of the base interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Jitter {
    pub days: u32,
    pub hours: u32,
    pub minutes: u32,
}

impl Jitter {
    /// Draws uniform days in `0..max_days`, hours in `0..24` and minutes in `0..60`.
    pub fn sample<R: Rng + ?Sized>(rng: &mut R, max_days: u32) -> Self {
        Self {
            days: if max_days == 0 {
                0
            } else {
                rng.gen_range(0..max_days)
            },
            hours: rng.gen_range(0..24),
            minutes: rng.gen_range(0..60),
        }
    }

    pub fn as_duration(&self) -> Duration {
        Duration::days(i64::from(self.days))
            + Duration::hours(i64::from(self.hours))
            + Duration::minutes(i64::from(self.minutes))
    }
}

/// Computes when an object is next due for verification.
///
/// `next = now + base_months + base_days + jitter`. The jitter spreads objects
/// deposited together across a window so they do not all come due at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitteredScheduler {
    base_months: u32,
    base_days: u32,
    jitter_days: u32,
}

impl Default for JitteredScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_MONTHS, DEFAULT_BASE_DAYS, DEFAULT_JITTER_DAYS)
    }
}

impl JitteredScheduler {
    pub fn new(base_months: u32, base_days: u32, jitter_days: u32) -> Self {
        Self {
            base_months,
            base_days,
            jitter_days,
        }
    }

    /// `now` plus the base interval, without jitter.
    ///
    /// Month addition clamps to the last day of a shorter month.
    pub fn base(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_months(Months::new(self.base_months))
            .and_then(|t| t.checked_add_signed(Duration::days(i64::from(self.base_days))))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Upper bound of the jitter window (exclusive of one minute).
    pub fn max_jitter(&self) -> Jitter {
        Jitter {
            days: self.jitter_days.saturating_sub(1),
            hours: 23,
            minutes: 59,
        }
    }

    /// Next due date drawing jitter from the operating system's CSPRNG.
    pub fn next_due_date(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.next_due_date_with(now, &mut OsRng)
    }

    /// Next due date drawing jitter from `rng`.
    pub fn next_due_date_with<R: Rng + ?Sized>(&self, now: DateTime<Utc>, rng: &mut R) -> DateTime<Utc> {
        let jitter = Jitter::sample(rng, self.jitter_days);
        self.next_due_date_at(now, jitter)
    }

    /// Next due date for an explicit jitter.
    pub fn next_due_date_at(&self, now: DateTime<Utc>, jitter: Jitter) -> DateTime<Utc> {
        self.base(now)
            .checked_add_signed(jitter.as_duration())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_base_interval() {
        let scheduler = JitteredScheduler::default();
        assert_eq!(scheduler.base(at(2024, 1, 10)), at(2024, 6, 24));
        // Aug 31 + 5 months clamps to Jan 31, then + 14 days
        assert_eq!(scheduler.base(at(2024, 8, 31)), at(2025, 2, 14));
    }

    #[test]
    fn test_explicit_jitter() {
        let scheduler = JitteredScheduler::default();
        let now = at(2024, 1, 10);
        let jitter = Jitter {
            days: 3,
            hours: 4,
            minutes: 5,
        };
        let expected = scheduler.base(now)
            + Duration::days(3)
            + Duration::hours(4)
            + Duration::minutes(5);
        assert_eq!(scheduler.next_due_date_at(now, jitter), expected);
    }

    #[test]
    fn test_seeded_rng_is_reproducible() {
        let scheduler = JitteredScheduler::default();
        let now = at(2024, 3, 1);
        let a = scheduler.next_due_date_with(now, &mut StdRng::seed_from_u64(7));
        let b = scheduler.next_due_date_with(now, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    #[test]
    fn test_due_date_within_window() {
        let scheduler = JitteredScheduler::default();
        let now = at(2024, 5, 20);
        let lower = scheduler.base(now);
        let upper = scheduler.next_due_date_at(now, scheduler.max_jitter());
        assert_eq!(
            upper - lower,
            Duration::days(29) + Duration::hours(23) + Duration::minutes(59)
        );

        for _ in 0..500 {
            let due = scheduler.next_due_date(now);
            assert!(due >= lower && due <= upper, "{due} outside [{lower}, {upper}]");
            assert!(due > now);
        }
    }

    #[test]
    fn test_jitter_spreads_simultaneous_deposits() {
        let scheduler = JitteredScheduler::default();
        let now = at(2024, 5, 20);
        let distinct: std::collections::HashSet<_> =
            (0..100).map(|_| scheduler.next_due_date(now)).collect();
        assert!(distinct.len() > 50);
    }

    #[test]
    fn test_zero_jitter_days() {
        let scheduler = JitteredScheduler::new(0, 1, 0);
        let now = at(2024, 1, 1);
        let due = scheduler.next_due_date(now);
        assert!(due >= now + Duration::days(1));
        assert!(due < now + Duration::days(2));
    }
}
