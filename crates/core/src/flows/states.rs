use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStep {
    #[default]
    Greeting,
    CollectingName,
    CollectingTreatment,
    CollectingDate,
    CollectingTime,
    ConfirmPending,
    Booked,
    HumanHandoff,
}

impl ConversationStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::CollectingName => "collecting_name",
            Self::CollectingTreatment => "collecting_treatment",
            Self::CollectingDate => "collecting_date",
            Self::CollectingTime => "collecting_time",
            Self::ConfirmPending => "confirm_pending",
            Self::Booked => "booked",
            Self::HumanHandoff => "human_handoff",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "greeting" => Some(Self::Greeting),
            "collecting_name" => Some(Self::CollectingName),
            "collecting_treatment" => Some(Self::CollectingTreatment),
            "collecting_date" => Some(Self::CollectingDate),
            "collecting_time" => Some(Self::CollectingTime),
            "confirm_pending" => Some(Self::ConfirmPending),
            "booked" => Some(Self::Booked),
            "human_handoff" => Some(Self::HumanHandoff),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEvent {
    ConversationStarted,
    NameProvided,
    TreatmentSelected,
    DateAccepted,
    TimeAccepted,
    BookingConfirmed,
    BookingDeclined,
    SlotLost,
    AnotherBookingRequested,
    BookingCancelled,
    StaleFactsDetected,
    HandoffRequested,
    RestartRequested,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowContext {
    pub missing_facts: Vec<String>,
}

impl FlowContext {
    pub fn missing(fact: impl Into<String>) -> Self {
        Self { missing_facts: vec![fact.into()] }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    PromptForName,
    PromptForTreatment,
    PromptForDate,
    OfferSlots,
    RequestConfirmation,
    CommitBooking,
    AnnounceBooking,
    CancelAppointment,
    NotifyHandoff,
    ResetFacts,
}

impl FlowAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PromptForName => "prompt_for_name",
            Self::PromptForTreatment => "prompt_for_treatment",
            Self::PromptForDate => "prompt_for_date",
            Self::OfferSlots => "offer_slots",
            Self::RequestConfirmation => "request_confirmation",
            Self::CommitBooking => "commit_booking",
            Self::AnnounceBooking => "announce_booking",
            Self::CancelAppointment => "cancel_appointment",
            Self::NotifyHandoff => "notify_handoff",
            Self::ResetFacts => "reset_facts",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: ConversationStep,
    pub to: ConversationStep,
    pub event: FlowEvent,
    pub actions: Vec<FlowAction>,
}
