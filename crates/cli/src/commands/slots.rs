use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use clinibook_agent::{AvailabilityService, DayAvailability};
use clinibook_core::clock::CivilClock;
use clinibook_core::dates::DateResolver;
use clinibook_core::errors::TurnError;
use clinibook_db::repositories::{SqlAppointmentRepository, SqlBlockedDateRepository};
use clinibook_gateway::{BusyTimeSource, HttpCalendarClient, NoopBusyTimeSource};
use serde_json::json;

use crate::commands::{
    load_config, parse_iso_date, with_database, CommandResult, Failure, EXIT_CONFIG, EXIT_INVALID_INPUT,
    EXIT_OPERATION,
};

/// Lists the free start times for an appointment of `minutes` on `date`.
/// `date` is `YYYY-MM-DD` or a phrase like "mañana" or "el lunes".
pub fn run(date: &str, minutes: u32) -> CommandResult {
    match free_slots(date, minutes) {
        Ok((date, availability)) => {
            let (state, slots) = match &availability {
                DayAvailability::Blocked => ("blocked", Vec::new()),
                DayAvailability::Closed => ("closed", Vec::new()),
                DayAvailability::Open(slots) => {
                    ("open", slots.iter().map(|slot| slot.format("%H:%M").to_string()).collect())
                }
            };
            let message = format!("{} free start times on {date}", slots.len());
            let data = json!({ "date": date.to_string(), "minutes": minutes, "day": state, "slots": slots });
            CommandResult::success_with("slots", message, Some(data))
        }
        Err(failure) => CommandResult::from_failure("slots", failure),
    }
}

fn free_slots(raw_date: &str, minutes: u32) -> Result<(NaiveDate, DayAvailability), Failure> {
    if minutes == 0 {
        return Err(("invalid_input", "duration must be at least one minute".to_string(), EXIT_INVALID_INPUT));
    }
    let config = load_config()?;
    let civil = config
        .clinic
        .civil_clock()
        .map_err(|error| ("config_validation", error.to_string(), EXIT_CONFIG))?;
    let date = resolve_date(raw_date, &civil)?;

    let busy: Arc<dyn BusyTimeSource> = if config.calendar.enabled {
        let client = HttpCalendarClient::from_config(&config.calendar, civil)
            .map_err(|error| ("calendar", error.to_string(), EXIT_CONFIG))?;
        Arc::new(client)
    } else {
        Arc::new(NoopBusyTimeSource)
    };
    let hours = config.clinic.hours.clone();
    let granularity = config.scheduling.slot_granularity_minutes;

    let availability = with_database(&config.database, |pool| async move {
        let service = AvailabilityService::new(
            Arc::new(SqlAppointmentRepository::new(pool.clone())),
            Arc::new(SqlBlockedDateRepository::new(pool)),
            busy,
            hours,
            granularity,
        );
        service.day(date, minutes).await.map_err(|error| match error {
            TurnError::Transport(detail) => ("calendar", detail, EXIT_OPERATION),
            other => ("storage", other.to_string(), EXIT_OPERATION),
        })
    })?;
    Ok((date, availability))
}

fn resolve_date(raw: &str, civil: &CivilClock) -> Result<NaiveDate, Failure> {
    parse_iso_date(raw).or_else(|failure| {
        DateResolver::new().resolve(raw, civil.today(Utc::now())).date().ok_or(failure)
    })
}
