//! Weekly recurring wall-clock triggers.

use std::fmt;

use chrono::{DateTime, Datelike, Days, NaiveTime, TimeZone, Weekday};
use chrono_tz::Tz;

const WORKDAYS: [Weekday; 5] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
];

/// Fires at `time` on each of `days`, in whatever zone the caller evaluates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklyTrigger {
    days: Vec<Weekday>,
    time: NaiveTime,
}

impl WeeklyTrigger {
    pub fn new(days: &[Weekday], hour: u32, minute: u32) -> anyhow::Result<Self> {
        anyhow::ensure!(!days.is_empty(), "a weekly trigger needs at least one day");
        let time = NaiveTime::from_hms_opt(hour, minute, 0)
            .ok_or_else(|| anyhow::anyhow!("invalid trigger time {hour:02}:{minute:02}"))?;

        let mut days = days.to_vec();
        days.sort_by_key(|d| d.num_days_from_monday());
        days.dedup();
        Ok(Self { days, time })
    }

    /// Monday through Friday at `hour:minute`.
    pub fn workdays(hour: u32, minute: u32) -> anyhow::Result<Self> {
        Self::new(&WORKDAYS, hour, minute)
    }

    pub fn days(&self) -> &[Weekday] {
        &self.days
    }

    pub fn time(&self) -> NaiveTime {
        self.time
    }

    /// The first firing instant strictly after `after`.
    ///
    /// Local times skipped by a DST gap do not fire that day; repeated local
    /// times fire once, at the earlier instant.
    pub fn next_after(&self, after: DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = after.timezone();
        let start = after.date_naive();
        for offset in 0..=7 {
            let date = start.checked_add_days(Days::new(offset))?;
            if !self.days.contains(&date.weekday()) {
                continue;
            }
            let Some(candidate) = tz.from_local_datetime(&date.and_time(self.time)).earliest()
            else {
                continue;
            };
            if candidate > after {
                return Some(candidate);
            }
        }
        None
    }
}

impl fmt::Display for WeeklyTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.time.format("%H:%M"))?;
        if self.days == WORKDAYS {
            return write!(f, "Mon-Fri");
        }
        let names: Vec<String> = self.days.iter().map(|d| d.to_string()).collect();
        write!(f, "{}", names.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::New_York;

    fn at(tz: Tz, y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Tz> {
        tz.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_rejects_empty_days() {
        assert!(WeeklyTrigger::new(&[], 9, 0).is_err());
    }

    #[test]
    fn test_rejects_bad_time() {
        assert!(WeeklyTrigger::new(&[Weekday::Mon], 24, 0).is_err());
    }

    #[test]
    fn test_same_day_later() {
        // 2024-01-10 is a Wednesday.
        let trigger = WeeklyTrigger::workdays(13, 0).unwrap();
        let next = trigger.next_after(at(Tz::UTC, 2024, 1, 10, 9, 0)).unwrap();
        assert_eq!(next, at(Tz::UTC, 2024, 1, 10, 13, 0));
    }

    #[test]
    fn test_strictly_after_current_instant() {
        let trigger = WeeklyTrigger::workdays(13, 0).unwrap();
        let now = at(Tz::UTC, 2024, 1, 10, 13, 0);
        assert_eq!(
            trigger.next_after(now).unwrap(),
            at(Tz::UTC, 2024, 1, 11, 13, 0)
        );
    }

    #[test]
    fn test_skips_weekend() {
        // Friday afternoon → Monday.
        let trigger = WeeklyTrigger::workdays(9, 45).unwrap();
        let next = trigger.next_after(at(Tz::UTC, 2024, 1, 12, 10, 0)).unwrap();
        assert_eq!(next, at(Tz::UTC, 2024, 1, 15, 9, 45));
    }

    #[test]
    fn test_weekly_wraps_full_week() {
        let trigger = WeeklyTrigger::new(&[Weekday::Mon], 0, 0).unwrap();
        // Monday 00:00 exactly → next Monday.
        let next = trigger.next_after(at(Tz::UTC, 2024, 1, 15, 0, 0)).unwrap();
        assert_eq!(next, at(Tz::UTC, 2024, 1, 22, 0, 0));
    }

    #[test]
    fn test_evaluated_in_zone() {
        let trigger = WeeklyTrigger::new(&[Weekday::Mon], 9, 30).unwrap();
        let now = at(New_York, 2024, 1, 15, 8, 0);
        let next = trigger.next_after(now).unwrap();
        assert_eq!(next, at(New_York, 2024, 1, 15, 9, 30));
        assert_eq!(next.naive_utc().to_string(), "2024-01-15 14:30:00");
    }

    #[test]
    fn test_dst_gap_skips_day() {
        // 2024-03-10 02:30 does not exist in New York.
        let trigger = WeeklyTrigger::new(&[Weekday::Sun], 2, 30).unwrap();
        let next = trigger.next_after(at(New_York, 2024, 3, 9, 12, 0)).unwrap();
        assert_eq!(next, at(New_York, 2024, 3, 17, 2, 30));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            WeeklyTrigger::workdays(9, 45).unwrap().to_string(),
            "09:45 Mon-Fri"
        );
        assert_eq!(
            WeeklyTrigger::new(&[Weekday::Wed, Weekday::Mon], 0, 0)
                .unwrap()
                .to_string(),
            "00:00 Mon,Wed"
        );
    }
}
