use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::session::PhoneNumber;
use crate::errors::DomainError;
use crate::schedule::TimeRange;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AppointmentId(pub i64);

impl std::fmt::Display for AppointmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "scheduled" => Some(Self::Scheduled),
            "cancelled" => Some(Self::Cancelled),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// Whether the appointment still occupies its slot.
    pub fn holds_slot(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub patient_name: String,
    pub patient_phone: PhoneNumber,
    pub treatment: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: u32,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    pub fn time_range(&self) -> Option<TimeRange> {
        TimeRange::starting_at(self.start_time, self.duration_minutes)
    }

    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        matches!(
            (self.status, next),
            (AppointmentStatus::Scheduled, AppointmentStatus::Cancelled)
                | (AppointmentStatus::Scheduled, AppointmentStatus::Completed)
        )
    }

    pub fn transition_to(&mut self, next: AppointmentStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }
        Err(DomainError::InvalidAppointmentTransition { from: self.status, to: next })
    }
}

/// Booking request as handed to the appointment store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAppointment {
    pub patient_name: String,
    pub patient_phone: PhoneNumber,
    pub treatment: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: u32,
    /// Turn instant; stored as the appointment's creation time.
    pub requested_at: DateTime<Utc>,
}

impl NewAppointment {
    pub fn time_range(&self) -> Result<TimeRange, DomainError> {
        TimeRange::starting_at(self.start_time, self.duration_minutes).ok_or_else(|| {
            DomainError::InvariantViolation(format!(
                "appointment at {} for {} minutes does not fit in one day",
                self.start_time.format("%H:%M"),
                self.duration_minutes
            ))
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    /// Another live appointment starts at exactly the same time.
    SlotTaken,
    /// Another live appointment overlaps the requested range.
    Overlapping,
    DateBlocked,
}

impl ConflictReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SlotTaken => "slot_taken",
            Self::Overlapping => "overlapping",
            Self::DateBlocked => "date_blocked",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingOutcome {
    Booked(AppointmentId),
    Conflict(ConflictReason),
}

impl BookingOutcome {
    pub fn appointment_id(&self) -> Option<AppointmentId> {
        match self {
            Self::Booked(id) => Some(*id),
            Self::Conflict(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedDate {
    pub date: NaiveDate,
    pub reason: String,
}
