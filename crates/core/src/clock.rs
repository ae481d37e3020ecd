//! The single conversion boundary between instants and the clinic's civil time.
//!
//! Business rules (weekday, lunch, "today") are only meaningful in local wall
//! clock time, so every instant entering the scheduling code is converted here
//! and nowhere else.

use std::sync::Mutex;

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        match self.now.lock() {
            Ok(mut current) => *current = now,
            Err(poisoned) => *poisoned.into_inner() = now,
        }
    }

    pub fn advance(&self, by: Duration) {
        let next = self.now() + by;
        self.set(next);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(current) => *current,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CivilClock {
    zone: Tz,
}

impl CivilClock {
    pub fn new(zone: Tz) -> Self {
        Self { zone }
    }

    pub fn parse(name: &str) -> Result<Self, String> {
        name.trim()
            .parse::<Tz>()
            .map(Self::new)
            .map_err(|error| format!("unknown time zone `{name}`: {error}"))
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }

    pub fn local(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.with_timezone(&self.zone).naive_local()
    }

    pub fn today(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.local(instant).date()
    }

    /// Instant of a local wall-clock time. Times falling in a DST gap are
    /// moved forward to the first valid local minute.
    pub fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        let mut candidate = local;
        for _ in 0..180 {
            match self.zone.from_local_datetime(&candidate) {
                LocalResult::Single(value) | LocalResult::Ambiguous(value, _) => {
                    return value.with_timezone(&Utc);
                }
                LocalResult::None => candidate += Duration::minutes(1),
            }
        }
        Utc.from_utc_datetime(&local)
    }

    /// `[local midnight, next local midnight)` of `date`, as instants.
    pub fn day_bounds(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.to_utc(date.and_time(NaiveTime::MIN));
        let next = date.succ_opt().unwrap_or(date);
        let end = self.to_utc(next.and_time(NaiveTime::MIN));
        (start, end)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, NaiveDate, Utc, Weekday, Datelike};

    use super::{CivilClock, Clock, FixedClock};

    fn instant(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    #[test]
    fn late_utc_evening_is_already_next_local_day() {
        let clock = CivilClock::parse("Europe/Madrid").expect("zone");
        // 23:30 UTC on a Sunday is 01:30 Monday in Madrid (CEST, +02:00).
        let now = instant("2026-07-19T23:30:00Z");

        let today = clock.today(now);
        assert_eq!(today, NaiveDate::from_ymd_opt(2026, 7, 20).expect("date"));
        assert_eq!(today.weekday(), Weekday::Mon);
    }

    #[test]
    fn day_bounds_follow_local_midnight() {
        let clock = CivilClock::parse("America/Mexico_City").expect("zone");
        let (start, end) = clock.day_bounds(NaiveDate::from_ymd_opt(2026, 2, 12).expect("date"));

        assert_eq!(start, instant("2026-02-12T06:00:00Z"));
        assert_eq!(end, instant("2026-02-13T06:00:00Z"));
    }

    #[test]
    fn unknown_zone_is_rejected() {
        let error = CivilClock::parse("Mars/Olympus").expect_err("zone must be unknown");
        assert!(error.contains("Mars/Olympus"));
    }

    #[test]
    fn fixed_clock_advances() {
        let clock = FixedClock::new(instant("2026-02-12T10:00:00Z"));
        clock.advance(chrono::Duration::seconds(90));
        assert_eq!(clock.now(), instant("2026-02-12T10:01:30Z"));
    }
}
