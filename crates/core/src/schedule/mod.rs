//! Wall-clock scheduling primitives.
//!
//! Everything in this module works on naive local times in the clinic's civil
//! zone. Conversion from instants happens once, in [`crate::clock::CivilClock`].

pub mod availability;
pub mod hours;

use chrono::{Duration, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

pub use availability::{available_slots, nearest_slots, SlotQuery, DEFAULT_SLOT_GRANULARITY_MINUTES};
pub use hours::{BusinessHours, DaySchedule};

/// Half-open `[start, end)` range of local wall-clock time within one day.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    /// Range of `minutes` starting at `start`; `None` when it would cross midnight.
    pub fn starting_at(start: NaiveTime, minutes: u32) -> Option<Self> {
        if minutes == 0 {
            return None;
        }
        let (end, overflow) = start.overflowing_add_signed(Duration::minutes(i64::from(minutes)));
        if overflow != 0 {
            return None;
        }
        Self::new(start, end)
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && self.end > other.start
    }

    pub fn contains_range(&self, other: &TimeRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

pub fn minutes_of_day(time: NaiveTime) -> u32 {
    time.num_seconds_from_midnight() / 60
}

pub fn time_from_minutes(minutes: u32) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0)
}

/// Parses `HH:MM` as used in configuration files and the store.
pub fn parse_clock_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}

pub fn format_clock_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;

    use super::{minutes_of_day, parse_clock_time, time_from_minutes, TimeRange};

    fn hm(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time")
    }

    #[test]
    fn half_open_ranges_touching_at_boundary_do_not_overlap() {
        let morning = TimeRange::new(hm(12, 40), hm(13, 0)).expect("range");
        let lunch = TimeRange::new(hm(13, 0), hm(15, 0)).expect("range");

        assert!(!morning.overlaps(&lunch));
        assert!(!lunch.overlaps(&morning));

        let late = TimeRange::starting_at(hm(12, 50), 20).expect("range");
        assert!(late.overlaps(&lunch));
    }

    #[test]
    fn starting_at_rejects_ranges_past_midnight() {
        assert!(TimeRange::starting_at(hm(23, 50), 20).is_none());
        assert!(TimeRange::starting_at(hm(9, 0), 0).is_none());
        assert_eq!(
            TimeRange::starting_at(hm(9, 0), 45).map(|range| range.end),
            Some(hm(9, 45))
        );
    }

    #[test]
    fn minute_helpers_agree() {
        assert_eq!(minutes_of_day(hm(18, 30)), 1_110);
        assert_eq!(time_from_minutes(1_110), Some(hm(18, 30)));
        assert_eq!(parse_clock_time(" 09:05 "), Some(hm(9, 5)));
        assert_eq!(parse_clock_time("9h"), None);
    }
}
