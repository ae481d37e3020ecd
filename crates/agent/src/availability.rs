use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use tracing::{debug, warn};

use clinibook_core::errors::TurnError;
use clinibook_core::schedule::{available_slots, BusinessHours, SlotQuery};
use clinibook_db::repositories::{AppointmentRepository, BlockedDateRepository};
use clinibook_gateway::BusyTimeSource;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DayAvailability {
    Blocked,
    Closed,
    Open(Vec<NaiveTime>),
}

impl DayAvailability {
    pub fn slots(&self) -> &[NaiveTime] {
        match self {
            Self::Open(slots) => slots,
            Self::Blocked | Self::Closed => &[],
        }
    }

    /// Drops start times at or before `time`; used for the current civil day.
    pub fn starting_after(self, time: NaiveTime) -> Self {
        match self {
            Self::Open(slots) => Self::Open(slots.into_iter().filter(|slot| *slot > time).collect()),
            other => other,
        }
    }
}

/// Gathers appointments, blocked dates and external busy time for a day and
/// feeds them to the slot calculator. Any failure to read the external
/// calendar is an error, never an empty busy list.
pub struct AvailabilityService {
    appointments: Arc<dyn AppointmentRepository>,
    blocked: Arc<dyn BlockedDateRepository>,
    busy: Arc<dyn BusyTimeSource>,
    hours: BusinessHours,
    granularity_minutes: u32,
}

impl AvailabilityService {
    pub fn new(
        appointments: Arc<dyn AppointmentRepository>,
        blocked: Arc<dyn BlockedDateRepository>,
        busy: Arc<dyn BusyTimeSource>,
        hours: BusinessHours,
        granularity_minutes: u32,
    ) -> Self {
        Self { appointments, blocked, busy, hours, granularity_minutes }
    }

    pub fn hours(&self) -> &BusinessHours {
        &self.hours
    }

    pub async fn is_blocked(&self, date: NaiveDate) -> Result<bool, TurnError> {
        self.blocked.is_blocked(date).await.map_err(|error| TurnError::Storage(error.to_string()))
    }

    pub async fn day(&self, date: NaiveDate, duration_minutes: u32) -> Result<DayAvailability, TurnError> {
        let blocked = self.blocked.is_blocked(date).await.map_err(|error| TurnError::Storage(error.to_string()))?;
        if blocked {
            return Ok(DayAvailability::Blocked);
        }
        if !self.hours.is_open_on(date) {
            return Ok(DayAvailability::Closed);
        }

        let appointments = self
            .appointments
            .list_active_for_date(date)
            .await
            .map_err(|error| TurnError::Storage(error.to_string()))?
            .iter()
            .filter_map(|appointment| appointment.time_range())
            .collect::<Vec<_>>();

        let busy = self.busy.busy_intervals(date).await.map_err(|error| {
            warn!(event_name = "availability.busy_source_failed", %date, error = %error);
            TurnError::Transport(error.to_string())
        })?;

        let query = SlotQuery {
            date,
            duration_minutes,
            hours: &self.hours,
            blocked: false,
            appointments: &appointments,
            busy: &busy,
            granularity_minutes: self.granularity_minutes,
        };
        let slots = available_slots(&query);
        debug!(event_name = "availability.computed", %date, duration_minutes, slots = slots.len());
        Ok(DayAvailability::Open(slots))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, NaiveTime};

    use clinibook_core::domain::appointment::NewAppointment;
    use clinibook_core::domain::session::PhoneNumber;
    use clinibook_core::errors::TurnError;
    use clinibook_core::schedule::{BusinessHours, TimeRange};
    use clinibook_db::repositories::{
        AppointmentRepository, BlockedDateRepository, InMemoryAppointmentRepository,
        InMemoryBlockedDateRepository,
    };
    use clinibook_gateway::StaticBusyTimeSource;

    use super::{AvailabilityService, DayAvailability};

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).expect("time")
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, 20).expect("date")
    }

    fn service(
        blocked: &InMemoryBlockedDateRepository,
        appointments: Arc<InMemoryAppointmentRepository>,
        busy: StaticBusyTimeSource,
    ) -> AvailabilityService {
        AvailabilityService::new(appointments, Arc::new(blocked.clone()), Arc::new(busy), BusinessHours::default(), 15)
    }

    #[tokio::test]
    async fn appointments_and_busy_time_are_both_excluded() {
        let blocked = InMemoryBlockedDateRepository::default();
        let appointments = Arc::new(InMemoryAppointmentRepository::with_blocked_dates(&blocked));
        appointments
            .book(NewAppointment {
                patient_name: "Ana".to_owned(),
                patient_phone: PhoneNumber("+34600111222".to_owned()),
                treatment: "revision".to_owned(),
                date: monday(),
                start_time: time(9, 0),
                duration_minutes: 20,
                requested_at: chrono::Utc::now(),
            })
            .await
            .expect("book");
        let busy = StaticBusyTimeSource::default()
            .with_busy(monday(), vec![TimeRange::new(time(10, 0), time(11, 0)).expect("range")]);

        let day = service(&blocked, appointments, busy).day(monday(), 20).await.expect("availability");
        let slots = day.slots();

        assert!(!slots.contains(&time(9, 0)));
        assert!(slots.contains(&time(9, 30)));
        assert!(!slots.contains(&time(10, 30)));
        assert!(slots.contains(&time(12, 40)));
        assert!(!slots.contains(&time(12, 45)));
        assert!(slots.contains(&time(15, 0)));
    }

    #[tokio::test]
    async fn blocked_and_closed_days_short_circuit() {
        let blocked = InMemoryBlockedDateRepository::default();
        blocked.block(monday(), "festivo").await.expect("block");
        let appointments = Arc::new(InMemoryAppointmentRepository::with_blocked_dates(&blocked));
        let service = service(&blocked, appointments, StaticBusyTimeSource::failing("unused"));

        assert_eq!(service.day(monday(), 20).await.expect("blocked"), DayAvailability::Blocked);
        let sunday = NaiveDate::from_ymd_opt(2026, 7, 19).expect("date");
        assert_eq!(service.day(sunday, 20).await.expect("closed"), DayAvailability::Closed);
    }

    #[test]
    fn elapsed_start_times_are_dropped() {
        let day = DayAvailability::Open(vec![time(9, 0), time(12, 0), time(12, 15), time(16, 0)]);

        assert_eq!(day.starting_after(time(12, 0)).slots(), &[time(12, 15), time(16, 0)]);
        assert_eq!(DayAvailability::Closed.starting_after(time(8, 0)), DayAvailability::Closed);
    }

    #[tokio::test]
    async fn calendar_failure_fails_closed() {
        let blocked = InMemoryBlockedDateRepository::default();
        let appointments = Arc::new(InMemoryAppointmentRepository::with_blocked_dates(&blocked));
        let service = service(&blocked, appointments, StaticBusyTimeSource::failing("timeout"));

        let error = service.day(monday(), 20).await.expect_err("fail closed");
        assert!(matches!(error, TurnError::Transport(_)));
    }
}
