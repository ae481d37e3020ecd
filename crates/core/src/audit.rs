//! Audit trail for conversation turns.
//!
//! Events are built from the [`AuditContext`] of the turn that produced them,
//! so every event carries the phone and correlation id of that turn.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::session::PhoneNumber;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Flow,
    Booking,
    Handoff,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flow => "flow",
            Self::Booking => "booking",
            Self::Handoff => "handoff",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub phone: Option<PhoneNumber>,
    pub correlation_id: String,
    pub actor: String,
}

impl AuditContext {
    pub fn new(phone: Option<PhoneNumber>, correlation_id: impl Into<String>, actor: impl Into<String>) -> Self {
        Self { phone, correlation_id: correlation_id.into(), actor: actor.into() }
    }

    pub fn event(&self, name: &str, category: AuditCategory, outcome: AuditOutcome) -> AuditEvent {
        AuditEvent {
            name: name.to_owned(),
            category,
            outcome,
            phone: self.phone.clone(),
            correlation_id: self.correlation_id.clone(),
            actor: self.actor.clone(),
            metadata: BTreeMap::new(),
            at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Dotted name such as `booking.committed`.
    pub name: String,
    pub category: AuditCategory,
    pub outcome: AuditOutcome,
    pub phone: Option<PhoneNumber>,
    pub correlation_id: String,
    pub actor: String,
    pub metadata: BTreeMap<String, String>,
    pub at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn with_metadata(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_owned(), value.to_string());
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

/// Keeps events in memory for assertions.
#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    recorded: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.events().into_iter().map(|event| event.name).collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner).push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::{AuditCategory, AuditContext, AuditOutcome, AuditSink, InMemoryAuditSink};
    use crate::domain::session::PhoneNumber;

    #[test]
    fn events_inherit_the_turn_context() {
        let sink = InMemoryAuditSink::default();
        let turn = AuditContext::new(Some(PhoneNumber("+34600111222".to_owned())), "turn-123", "orchestrator");

        sink.emit(
            turn.event("booking.committed", AuditCategory::Booking, AuditOutcome::Success)
                .with_metadata("date", "2026-07-20")
                .with_metadata("duration_minutes", 45),
        );

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].correlation_id, "turn-123");
        assert_eq!(events[0].phone.as_ref().map(PhoneNumber::as_str), Some("+34600111222"));
        assert_eq!(events[0].metadata.get("duration_minutes").map(String::as_str), Some("45"));
        assert_eq!(sink.names(), ["booking.committed"]);
    }
}
