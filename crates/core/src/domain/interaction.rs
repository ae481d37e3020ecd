use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::session::PhoneNumber;

/// How a turn ended, as recorded in the interaction log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionOutcome {
    Replied,
    Booked,
    BookingConflict,
    Cancelled,
    HandedOff,
    Suppressed,
    TransportFailure,
    StorageFailure,
    SessionReset,
    DispatchFailed,
}

impl InteractionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Replied => "replied",
            Self::Booked => "booked",
            Self::BookingConflict => "booking_conflict",
            Self::Cancelled => "cancelled",
            Self::HandedOff => "handed_off",
            Self::Suppressed => "suppressed",
            Self::TransportFailure => "transport_failure",
            Self::StorageFailure => "storage_failure",
            Self::SessionReset => "session_reset",
            Self::DispatchFailed => "dispatch_failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "replied" => Some(Self::Replied),
            "booked" => Some(Self::Booked),
            "booking_conflict" => Some(Self::BookingConflict),
            "cancelled" => Some(Self::Cancelled),
            "handed_off" => Some(Self::HandedOff),
            "suppressed" => Some(Self::Suppressed),
            "transport_failure" => Some(Self::TransportFailure),
            "storage_failure" => Some(Self::StorageFailure),
            "session_reset" => Some(Self::SessionReset),
            "dispatch_failed" => Some(Self::DispatchFailed),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInteraction {
    pub phone: PhoneNumber,
    pub user_message: String,
    pub bot_response: String,
    pub outcome: InteractionOutcome,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionLog {
    pub id: i64,
    pub phone: PhoneNumber,
    pub user_message: String,
    pub bot_response: String,
    pub outcome: InteractionOutcome,
    pub created_at: DateTime<Utc>,
}

/// A human operator owns the conversation while this record exists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handoff {
    pub phone: PhoneNumber,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}
