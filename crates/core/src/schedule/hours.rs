use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use super::TimeRange;

/// Opening window of a single day, optionally split by a lunch break.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySchedule {
    pub open: NaiveTime,
    pub close: NaiveTime,
    pub lunch: Option<TimeRange>,
}

impl DaySchedule {
    pub fn open_intervals(&self) -> Vec<TimeRange> {
        let Some(day) = TimeRange::new(self.open, self.close) else {
            return Vec::new();
        };

        match self.lunch {
            Some(lunch) if day.overlaps(&lunch) => [
                TimeRange::new(day.start, lunch.start.min(day.end)),
                TimeRange::new(lunch.end.max(day.start), day.end),
            ]
            .into_iter()
            .flatten()
            .collect(),
            _ => vec![day],
        }
    }
}

/// Static weekly opening rules of the clinic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessHours {
    pub weekday: DaySchedule,
    pub saturday: Option<DaySchedule>,
    pub sunday: Option<DaySchedule>,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            weekday: DaySchedule {
                open: hm(9, 0),
                close: hm(18, 30),
                lunch: TimeRange::new(hm(13, 0), hm(15, 0)),
            },
            saturday: Some(DaySchedule { open: hm(9, 0), close: hm(13, 0), lunch: None }),
            sunday: None,
        }
    }
}

impl BusinessHours {
    pub fn schedule_for(&self, date: NaiveDate) -> Option<&DaySchedule> {
        match date.weekday() {
            Weekday::Sat => self.saturday.as_ref(),
            Weekday::Sun => self.sunday.as_ref(),
            _ => Some(&self.weekday),
        }
    }

    /// Ordered open ranges for `date`, lunch excluded. Empty when closed.
    pub fn open_intervals(&self, date: NaiveDate) -> Vec<TimeRange> {
        self.schedule_for(date).map(DaySchedule::open_intervals).unwrap_or_default()
    }

    pub fn lunch_break(&self, date: NaiveDate) -> Option<TimeRange> {
        self.schedule_for(date).and_then(|schedule| schedule.lunch)
    }

    pub fn is_open_on(&self, date: NaiveDate) -> bool {
        !self.open_intervals(date).is_empty()
    }

    pub fn validate(&self) -> Result<(), String> {
        let days = [("weekday", Some(&self.weekday)), ("saturday", self.saturday.as_ref()), ("sunday", self.sunday.as_ref())];
        for (label, schedule) in days {
            let Some(schedule) = schedule else { continue };
            if schedule.open >= schedule.close {
                return Err(format!("{label} opening time must be before closing time"));
            }
            if let Some(lunch) = schedule.lunch {
                if lunch.start <= schedule.open || lunch.end >= schedule.close {
                    return Err(format!("{label} lunch break must fall strictly inside opening hours"));
                }
            }
        }
        Ok(())
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};

    use super::{BusinessHours, DaySchedule};
    use crate::schedule::TimeRange;

    fn hm(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time")
    }

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    #[test]
    fn weekday_splits_around_lunch() {
        let hours = BusinessHours::default();
        let intervals = hours.open_intervals(date("2026-07-20"));

        assert_eq!(
            intervals,
            vec![
                TimeRange::new(hm(9, 0), hm(13, 0)).expect("morning"),
                TimeRange::new(hm(15, 0), hm(18, 30)).expect("afternoon"),
            ]
        );
        assert_eq!(
            hours.lunch_break(date("2026-07-20")),
            TimeRange::new(hm(13, 0), hm(15, 0))
        );
    }

    #[test]
    fn saturday_is_short_and_sunday_is_closed() {
        let hours = BusinessHours::default();

        assert_eq!(
            hours.open_intervals(date("2026-07-25")),
            vec![TimeRange::new(hm(9, 0), hm(13, 0)).expect("saturday")]
        );
        assert!(hours.open_intervals(date("2026-07-26")).is_empty());
        assert!(!hours.is_open_on(date("2026-07-26")));
    }

    #[test]
    fn validation_rejects_lunch_outside_opening_hours() {
        let mut hours = BusinessHours::default();
        hours.weekday = DaySchedule {
            open: hm(9, 0),
            close: hm(12, 0),
            lunch: TimeRange::new(hm(13, 0), hm(15, 0)),
        };

        let error = hours.validate().expect_err("lunch after close must fail");
        assert!(error.contains("weekday lunch break"));
        assert!(BusinessHours::default().validate().is_ok());
    }
}
