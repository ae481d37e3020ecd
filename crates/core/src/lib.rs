pub mod audit;
pub mod clock;
pub mod config;
pub mod dates;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod schedule;

pub use chrono;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use clock::{CivilClock, Clock, FixedClock, SystemClock};
pub use dates::{DateResolution, DateResolver};
pub use domain::appointment::{
    Appointment, AppointmentId, AppointmentStatus, BlockedDate, BookingOutcome, ConflictReason,
    NewAppointment,
};
pub use domain::interaction::{Handoff, InteractionLog, InteractionOutcome, NewInteraction};
pub use domain::session::{ConversationSession, PhoneNumber, SessionFacts};
pub use domain::treatment::{Treatment, TreatmentCatalog};
pub use errors::{ApplicationError, DomainError, InterfaceError, InterfaceErrorKind, Recovery, TurnError};
pub use flows::{BookingFlow, ConversationStep, FlowAction, FlowEngine, FlowEvent};
pub use schedule::{available_slots, BusinessHours, SlotQuery, TimeRange};
