use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::appointment::AppointmentId;
use crate::errors::DomainError;
use crate::flows::ConversationStep;

/// Phone number in `+<digits>` form. It is the conversation key everywhere.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PhoneNumber(pub String);

impl PhoneNumber {
    /// Strips formatting (spaces, dashes, dots, parentheses) and a `whatsapp:`
    /// style prefix. Numbers must carry 6 to 15 digits.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        let without_scheme = trimmed.rsplit(':').next().unwrap_or(trimmed);
        let digits = without_scheme
            .chars()
            .filter(|ch| !matches!(ch, ' ' | '-' | '.' | '(' | ')' | '+'))
            .collect::<String>();

        let valid = (6..=15).contains(&digits.len()) && digits.chars().all(|ch| ch.is_ascii_digit());
        if !valid {
            return Err(DomainError::InvalidPhoneNumber(raw.to_owned()));
        }
        Ok(Self(format!("+{digits}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Log-safe form keeping only the last four digits.
    pub fn masked(&self) -> String {
        let visible = self.0.len().saturating_sub(4);
        format!("***{}", &self.0[visible..])
    }
}

impl std::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SessionFacts {
    pub name: Option<String>,
    pub treatment: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub offered_slots: Vec<NaiveTime>,
    pub appointment_id: Option<AppointmentId>,
}

impl SessionFacts {
    /// Drops everything tied to a specific day.
    pub fn clear_schedule(&mut self) {
        self.date = None;
        self.time = None;
        self.offered_slots.clear();
    }
}

/// Per-phone snapshot of the booking conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSession {
    pub phone: PhoneNumber,
    pub step: ConversationStep,
    pub facts: SessionFacts,
    pub failed_attempts: u32,
    pub updated_at: DateTime<Utc>,
}

impl ConversationSession {
    pub fn new(phone: PhoneNumber, now: DateTime<Utc>) -> Self {
        Self {
            phone,
            step: ConversationStep::Greeting,
            facts: SessionFacts::default(),
            failed_attempts: 0,
            updated_at: now,
        }
    }

    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.step = ConversationStep::Greeting;
        self.facts = SessionFacts::default();
        self.failed_attempts = 0;
        self.updated_at = now;
    }

    pub fn record_failure(&mut self) -> u32 {
        self.failed_attempts = self.failed_attempts.saturating_add(1);
        self.failed_attempts
    }

    pub fn clear_failures(&mut self) {
        self.failed_attempts = 0;
    }
}
