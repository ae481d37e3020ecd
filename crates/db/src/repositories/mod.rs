use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use thiserror::Error;

use clinibook_core::domain::appointment::{
    Appointment, AppointmentId, BlockedDate, BookingOutcome, NewAppointment,
};
use clinibook_core::domain::interaction::{Handoff, InteractionLog, NewInteraction};
use clinibook_core::domain::session::{ConversationSession, PhoneNumber};

pub mod appointment;
pub mod blocked_date;
pub mod handoff;
pub mod interaction_log;
pub mod lock;
pub mod memory;
pub mod message_buffer;
pub mod session;

pub use appointment::SqlAppointmentRepository;
pub use blocked_date::SqlBlockedDateRepository;
pub use handoff::SqlHandoffRepository;
pub use interaction_log::SqlInteractionLogRepository;
pub use lock::{LockLease, SqlConversationLockRepository};
pub use memory::{
    InMemoryAppointmentRepository, InMemoryBlockedDateRepository, InMemoryConversationLockRepository,
    InMemoryHandoffRepository, InMemoryInteractionLogRepository, InMemoryMessageBufferRepository,
    InMemorySessionRepository,
};
pub use message_buffer::SqlMessageBufferRepository;
pub use session::SqlSessionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    /// Reserves the slot in one atomic statement. Losing a race is a
    /// `Conflict`, never an error.
    async fn book(&self, request: NewAppointment) -> Result<BookingOutcome, RepositoryError>;
    async fn cancel(&self, id: AppointmentId) -> Result<bool, RepositoryError>;
    async fn complete(&self, id: AppointmentId) -> Result<bool, RepositoryError>;
    async fn find_by_id(&self, id: AppointmentId) -> Result<Option<Appointment>, RepositoryError>;
    async fn list_active_for_date(&self, date: NaiveDate) -> Result<Vec<Appointment>, RepositoryError>;
    async fn list_for_phone(&self, phone: &PhoneNumber) -> Result<Vec<Appointment>, RepositoryError>;
}

#[async_trait]
pub trait BlockedDateRepository: Send + Sync {
    /// Returns `false` when the date was already blocked; the reason is updated.
    async fn block(&self, date: NaiveDate, reason: &str) -> Result<bool, RepositoryError>;
    async fn unblock(&self, date: NaiveDate) -> Result<bool, RepositoryError>;
    async fn is_blocked(&self, date: NaiveDate) -> Result<bool, RepositoryError>;
    async fn list(&self, from: Option<NaiveDate>) -> Result<Vec<BlockedDate>, RepositoryError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// `Decode` errors mean the stored snapshot is unreadable.
    async fn load(&self, phone: &PhoneNumber) -> Result<Option<ConversationSession>, RepositoryError>;
    async fn save(&self, session: &ConversationSession) -> Result<(), RepositoryError>;
    async fn delete(&self, phone: &PhoneNumber) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait HandoffRepository: Send + Sync {
    async fn set(&self, phone: &PhoneNumber, reason: &str, at: DateTime<Utc>) -> Result<(), RepositoryError>;
    async fn clear(&self, phone: &PhoneNumber) -> Result<bool, RepositoryError>;
    async fn find(&self, phone: &PhoneNumber) -> Result<Option<Handoff>, RepositoryError>;
    async fn list(&self) -> Result<Vec<Handoff>, RepositoryError>;
}

#[async_trait]
pub trait ConversationLockRepository: Send + Sync {
    /// Takes the per-phone lock, reclaiming it when the current holder is at
    /// least `stale_after` old. `None` means someone else holds it.
    async fn try_acquire(
        &self,
        phone: &PhoneNumber,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> Result<Option<LockLease>, RepositoryError>;

    /// Releases only if `lease` is still the holder.
    async fn release(&self, lease: &LockLease) -> Result<bool, RepositoryError>;
}

/// How long drained fragments are remembered for spotting redeliveries.
pub const DELIVERY_MEMORY_MS: i64 = 24 * 60 * 60 * 1_000;

#[async_trait]
pub trait MessageBufferRepository: Send + Sync {
    /// Buffers a fragment. A delivery already seen for `phone` with the same
    /// provider `sent_at` and text is ignored and yields `false`, whether or
    /// not it was drained since. Fragments without `sent_at` are never
    /// considered duplicates.
    async fn push(
        &self,
        phone: &PhoneNumber,
        fragment: &str,
        received_at: DateTime<Utc>,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<bool, RepositoryError>;

    /// Whether `phone` has pending text and its newest fragment is at least
    /// `quiet` old.
    async fn is_quiet(&self, phone: &PhoneNumber, now: DateTime<Utc>, quiet: Duration) -> Result<bool, RepositoryError>;

    /// Takes every pending fragment for `phone`, joined in arrival order,
    /// once the newest one is at least `quiet` old.
    async fn drain_if_quiet(
        &self,
        phone: &PhoneNumber,
        now: DateTime<Utc>,
        quiet: Duration,
    ) -> Result<Option<String>, RepositoryError>;

    async fn pending(&self, phone: &PhoneNumber) -> Result<usize, RepositoryError>;
}

#[async_trait]
pub trait InteractionLogRepository: Send + Sync {
    async fn append(&self, entry: NewInteraction) -> Result<i64, RepositoryError>;
    async fn list_for_phone(&self, phone: &PhoneNumber, limit: u32) -> Result<Vec<InteractionLog>, RepositoryError>;
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_date(column: &str, value: String) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(&value, DATE_FORMAT).map_err(|error| {
        RepositoryError::Decode(format!("invalid date in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_time(column: &str, value: String) -> Result<NaiveTime, RepositoryError> {
    NaiveTime::parse_from_str(&value, TIME_FORMAT).map_err(|error| {
        RepositoryError::Decode(format!("invalid time in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const TIME_FORMAT: &str = "%H:%M";

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub(crate) fn format_time(time: NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}
