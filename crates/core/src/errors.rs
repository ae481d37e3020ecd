use thiserror::Error;

use crate::{domain::appointment::AppointmentStatus, flows::FlowTransitionError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid appointment transition from {from:?} to {to:?}")]
    InvalidAppointmentTransition { from: AppointmentStatus, to: AppointmentStatus },
    #[error("invalid phone number `{0}`")]
    InvalidPhoneNumber(String),
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterfaceErrorKind {
    BadRequest,
    Unauthorized,
    Unavailable,
    Internal,
}

/// Error returned across the HTTP edge. `detail` is for logs; callers see
/// [`InterfaceError::user_message`] unless the request itself was at fault.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{kind:?} [{correlation_id}]: {detail}")]
pub struct InterfaceError {
    pub kind: InterfaceErrorKind,
    pub detail: String,
    pub correlation_id: String,
}

impl InterfaceError {
    pub fn new(kind: InterfaceErrorKind, detail: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self { kind, detail: detail.into(), correlation_id: correlation_id.into() }
    }

    pub fn user_message(&self) -> &str {
        match self.kind {
            InterfaceErrorKind::BadRequest => self.detail.as_str(),
            InterfaceErrorKind::Unauthorized => "message signature could not be verified",
            InterfaceErrorKind::Unavailable => "clinic systems are busy; the message will be retried",
            InterfaceErrorKind::Internal => "unexpected server error",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let kind = match &self {
            Self::Domain(_) => InterfaceErrorKind::BadRequest,
            Self::Persistence(_) | Self::Integration(_) => InterfaceErrorKind::Unavailable,
            Self::Configuration(_) => InterfaceErrorKind::Internal,
        };
        InterfaceError::new(kind, self.to_string(), correlation_id)
    }
}

/// Failure classes a conversation turn can hit. Each class has one recovery
/// strategy so the orchestrator never has to inspect messages.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TurnError {
    #[error("invalid answer: {0}")]
    Validation(String),
    #[error("slot no longer available: {0}")]
    Conflict(String),
    #[error("external service unreachable: {0}")]
    Transport(String),
    #[error("store unavailable: {0}")]
    Storage(String),
    #[error("stored session is unreadable: {0}")]
    CorruptSession(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recovery {
    AskUser,
    RetrySilently,
    Escalate,
    Reset,
}

impl TurnError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Conflict(_) => "conflict",
            Self::Transport(_) => "transport",
            Self::Storage(_) => "storage",
            Self::CorruptSession(_) => "corrupt_session",
        }
    }

    pub fn recovery(&self) -> Recovery {
        match self {
            Self::Validation(_) | Self::Conflict(_) => Recovery::AskUser,
            Self::Transport(_) | Self::Storage(_) => Recovery::RetrySilently,
            Self::CorruptSession(_) => Recovery::Reset,
        }
    }

    /// Like [`TurnError::recovery`], but repeated invalid answers hand the
    /// conversation to a human once `limit` is reached.
    pub fn recovery_after(&self, failed_attempts: u32, limit: u32) -> Recovery {
        match self {
            Self::Validation(_) if limit > 0 && failed_attempts >= limit => Recovery::Escalate,
            _ => self.recovery(),
        }
    }
}

impl From<TurnError> for ApplicationError {
    fn from(value: TurnError) -> Self {
        match value {
            TurnError::Validation(message) | TurnError::Conflict(message) => {
                Self::Domain(DomainError::InvariantViolation(message))
            }
            TurnError::Transport(message) => Self::Integration(message),
            TurnError::Storage(message) | TurnError::CorruptSession(message) => {
                Self::Persistence(message)
            }
        }
    }
}
