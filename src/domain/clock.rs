// Civil-day query windows and display formatting in a fixed IANA timezone
use crate::domain::series::TimeWindow;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

pub const DEFAULT_TIMEZONE: &str = "Europe/Berlin";

const DISPLAY_FORMAT: &str = "%d.%m.%Y, %H:%M:%S";

#[derive(Debug, thiserror::Error)]
#[error("unknown timezone: {0}")]
pub struct UnknownTimezone(String);

/// Clock pinned to one civil timezone, independent of the host's locale
#[derive(Debug, Clone, Copy)]
pub struct CivilClock {
    tz: Tz,
}

impl CivilClock {
    pub fn new(name: &str) -> Result<Self, UnknownTimezone> {
        let tz: Tz = name
            .parse()
            .map_err(|_| UnknownTimezone(name.to_string()))?;
        Ok(Self { tz })
    }

    /// The civil day containing `now`, as `[start_of_day, start_of_next_day)` in UTC
    pub fn day_window(&self, now: DateTime<Utc>) -> TimeWindow {
        let today = now.with_timezone(&self.tz).date_naive();
        let tomorrow = today.succ_opt().unwrap_or(NaiveDate::MAX);

        TimeWindow {
            start: self.start_of_day(today),
            end: self.start_of_day(tomorrow),
        }
    }

    /// Human-readable local time for a unix timestamp
    pub fn format(&self, timestamp: i64) -> String {
        match DateTime::from_timestamp(timestamp, 0) {
            Some(dt) => dt.with_timezone(&self.tz).format(DISPLAY_FORMAT).to_string(),
            None => timestamp.to_string(),
        }
    }

    fn start_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        let midnight = date.and_time(NaiveTime::MIN);
        self.first_valid_local(midnight)
            .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
    }

    // Midnight can fall into a DST gap in some zones; take the first instant after it.
    fn first_valid_local(&self, local: NaiveDateTime) -> Option<DateTime<Utc>> {
        (0..=180)
            .map(|minutes| local + Duration::minutes(minutes))
            .find_map(|t| self.tz.from_local_datetime(&t).earliest())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn berlin() -> CivilClock {
        CivilClock::new(DEFAULT_TIMEZONE).unwrap()
    }

    #[test]
    fn test_berlin_summer_day() {
        let window = berlin().day_window(utc("2025-07-20T10:00:00Z"));

        assert_eq!(window.start, utc("2025-07-19T22:00:00Z"));
        assert_eq!(window.end, utc("2025-07-20T22:00:00Z"));
    }

    #[test]
    fn test_berlin_winter_day() {
        let window = berlin().day_window(utc("2025-01-15T12:00:00Z"));

        assert_eq!(window.start, utc("2025-01-14T23:00:00Z"));
        assert_eq!(window.end, utc("2025-01-15T23:00:00Z"));
    }

    #[test]
    fn test_window_follows_civil_date_not_utc_date() {
        // 01:30 local on the 20th, still the 19th in UTC
        let window = berlin().day_window(utc("2025-07-19T23:30:00Z"));

        assert_eq!(window.start, utc("2025-07-19T22:00:00Z"));
    }

    #[test]
    fn test_spring_forward_day_is_23_hours() {
        let window = berlin().day_window(utc("2025-03-30T12:00:00Z"));

        assert_eq!(window.start, utc("2025-03-29T23:00:00Z"));
        assert_eq!(window.end, utc("2025-03-30T22:00:00Z"));
        assert_eq!(window.end - window.start, Duration::hours(23));
    }

    #[test]
    fn test_fall_back_day_is_25_hours() {
        let window = berlin().day_window(utc("2025-10-26T12:00:00Z"));

        assert_eq!(window.start, utc("2025-10-25T22:00:00Z"));
        assert_eq!(window.end, utc("2025-10-26T23:00:00Z"));
        assert_eq!(window.end - window.start, Duration::hours(25));
    }

    #[test]
    fn test_midnight_in_dst_gap_starts_at_first_valid_instant() {
        // Chile skips 00:00-01:00 local on 2024-09-08
        let clock = CivilClock::new("America/Santiago").unwrap();
        let window = clock.day_window(utc("2024-09-08T12:00:00Z"));

        assert_eq!(window.start, utc("2024-09-08T04:00:00Z"));
        assert_eq!(window.end, utc("2024-09-09T03:00:00Z"));
    }

    #[test]
    fn test_format_local_time() {
        assert_eq!(berlin().format(1752962400), "20.07.2025, 00:00:00");
        assert_eq!(berlin().format(1753014896), "20.07.2025, 14:34:56");
    }

    #[test]
    fn test_unknown_timezone() {
        assert!(CivilClock::new("Mars/Olympus_Mons").is_err());
    }
}
