use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveTime};

use super::{minutes_of_day, time_from_minutes, BusinessHours, TimeRange};

pub const DEFAULT_SLOT_GRANULARITY_MINUTES: u32 = 15;

/// Everything the calculator needs for one day. The caller gathers the data;
/// the calculation itself performs no I/O.
#[derive(Clone, Debug)]
pub struct SlotQuery<'a> {
    pub date: NaiveDate,
    pub duration_minutes: u32,
    pub hours: &'a BusinessHours,
    pub blocked: bool,
    pub appointments: &'a [TimeRange],
    pub busy: &'a [TimeRange],
    pub granularity_minutes: u32,
}

impl<'a> SlotQuery<'a> {
    pub fn new(date: NaiveDate, duration_minutes: u32, hours: &'a BusinessHours) -> Self {
        Self {
            date,
            duration_minutes,
            hours,
            blocked: false,
            appointments: &[],
            busy: &[],
            granularity_minutes: DEFAULT_SLOT_GRANULARITY_MINUTES,
        }
    }
}

/// Free start times for `query.date`, chronological and without duplicates.
///
/// A candidate survives when `[start, start + duration)` sits entirely inside
/// one open interval and overlaps no appointment and no busy interval.
pub fn available_slots(query: &SlotQuery<'_>) -> Vec<NaiveTime> {
    if query.blocked || query.duration_minutes == 0 || query.granularity_minutes == 0 {
        return Vec::new();
    }

    let mut slots = BTreeSet::new();
    for interval in query.hours.open_intervals(query.date) {
        let close = minutes_of_day(interval.end);
        let mut cursor = minutes_of_day(interval.start);

        while cursor.checked_add(query.duration_minutes).is_some_and(|end| end <= close) {
            if let Some(candidate) = time_from_minutes(cursor)
                .and_then(|start| TimeRange::starting_at(start, query.duration_minutes))
            {
                let taken = query
                    .appointments
                    .iter()
                    .chain(query.busy.iter())
                    .any(|other| candidate.overlaps(other));
                if !taken && interval.contains_range(&candidate) {
                    slots.insert(candidate.start);
                }
            }
            cursor += query.granularity_minutes;
        }
    }

    slots.into_iter().collect()
}

/// Up to `limit` slots closest to `wanted`, returned in chronological order.
pub fn nearest_slots(slots: &[NaiveTime], wanted: NaiveTime, limit: usize) -> Vec<NaiveTime> {
    let wanted = i64::from(minutes_of_day(wanted));
    let mut ranked = slots.to_vec();
    ranked.sort_by_key(|slot| ((i64::from(minutes_of_day(*slot)) - wanted).abs(), *slot));
    ranked.truncate(limit);
    ranked.sort();
    ranked
}
