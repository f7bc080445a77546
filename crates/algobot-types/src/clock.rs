//! Wall-clock access in the program's configured time zone.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

/// Source of "now" for date-dependent behavior.
pub trait Clock: Send + Sync {
    /// Current instant in the configured zone.
    fn now(&self) -> DateTime<Tz>;

    /// Current calendar date in the configured zone.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// The real system clock, viewed through a fixed time zone.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }
}

/// A clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    at: DateTime<Tz>,
}

impl FixedClock {
    pub fn new(at: DateTime<Tz>) -> Self {
        Self { at }
    }

    /// Noon UTC on `date`.
    pub fn on(date: NaiveDate) -> Self {
        let naive = date.and_hms_opt(12, 0, 0).unwrap_or_default();
        Self {
            at: Tz::UTC.from_utc_datetime(&naive),
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Tz> {
        self.at
    }
}
