//! Retention window and feed ordering checks.
//!
//! An entry is current when it was published on or after the cutoff, which
//! is `now` minus a fixed number of calendar months. The remote feed is
//! requested newest first, so the driver stops at the first entry that falls
//! outside the window. [`FeedOrder`] verifies that assumption as entries go by.

use chrono::{DateTime, Months, Utc};

/// Retention window used when none is configured.
pub const DEFAULT_RETENTION_MONTHS: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CutoffPolicy {
    cutoff: DateTime<Utc>,
}

impl CutoffPolicy {
    /// Window covering the `months` calendar months before `now`.
    ///
    /// Month arithmetic clamps to the end of shorter months
    /// (31 August minus 6 months is 28 or 29 February).
    pub fn months_before(now: DateTime<Utc>, months: u32) -> Self {
        let cutoff = now
            .checked_sub_months(Months::new(months))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self { cutoff }
    }

    #[cfg(test)]
    pub fn at(cutoff: DateTime<Utc>) -> Self {
        Self { cutoff }
    }

    pub fn cutoff(&self) -> DateTime<Utc> {
        self.cutoff
    }

    /// `true` when `published_at` is in `[cutoff, +inf)`.
    pub fn is_within_window(&self, published_at: DateTime<Utc>) -> bool {
        published_at >= self.cutoff
    }
}

/// Tracks the publish time of the previous entry across all pages of a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedOrder {
    previous: Option<DateTime<Utc>>,
}

impl FeedOrder {
    /// Record `published_at`. Returns the previous timestamp as the error when
    /// this entry is newer than it. Equal timestamps are accepted.
    pub fn observe(&mut self, published_at: DateTime<Utc>) -> Result<(), DateTime<Utc>> {
        if let Some(previous) = self.previous
            && published_at > previous
        {
            return Err(previous);
        }
        self.previous = Some(published_at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_months_before_uses_calendar_months() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        let policy = CutoffPolicy::months_before(now, DEFAULT_RETENTION_MONTHS);
        assert_eq!(
            policy.cutoff(),
            Utc.with_ymd_and_hms(2026, 4, 16, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_months_before_clamps_short_month() {
        let now = Utc.with_ymd_and_hms(2026, 8, 31, 0, 0, 0).unwrap();
        let policy = CutoffPolicy::months_before(now, 6);
        assert_eq!(
            policy.cutoff(),
            Utc.with_ymd_and_hms(2026, 2, 28, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_window_is_inclusive_at_cutoff() {
        let cutoff = Utc.with_ymd_and_hms(2026, 4, 16, 0, 0, 0).unwrap();
        let policy = CutoffPolicy::at(cutoff);
        assert!(policy.is_within_window(cutoff));
        assert!(policy.is_within_window(cutoff + Duration::days(90)));
        assert!(!policy.is_within_window(cutoff - Duration::seconds(1)));
    }

    #[test]
    fn test_feed_order_accepts_non_increasing() {
        let t = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
        let mut order = FeedOrder::default();
        assert!(order.observe(t).is_ok());
        assert!(order.observe(t).is_ok());
        assert!(order.observe(t - Duration::days(3)).is_ok());
    }

    #[test]
    fn test_feed_order_rejects_newer_entry() {
        let t = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
        let mut order = FeedOrder::default();
        order.observe(t).unwrap();
        assert_eq!(order.observe(t + Duration::hours(1)), Err(t));
    }
}
