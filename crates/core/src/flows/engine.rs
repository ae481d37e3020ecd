use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::flows::states::{ConversationStep, FlowAction, FlowContext, FlowEvent, TransitionOutcome};

pub trait FlowDefinition {
    fn name(&self) -> &'static str;
    fn initial_state(&self) -> ConversationStep;
    fn transition(
        &self,
        current: &ConversationStep,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// Appointment booking conversation, from greeting to a committed slot.
#[derive(Clone, Debug, Default)]
pub struct BookingFlow;

impl FlowDefinition for BookingFlow {
    fn name(&self) -> &'static str {
        "booking"
    }

    fn initial_state(&self) -> ConversationStep {
        ConversationStep::Greeting
    }

    fn transition(
        &self,
        current: &ConversationStep,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_booking(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn flow_name(&self) -> &'static str {
        self.flow.name()
    }

    pub fn initial_state(&self) -> ConversationStep {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &ConversationStep,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &ConversationStep,
        event: &FlowEvent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    audit
                        .event("flow.transition_applied", AuditCategory::Flow, AuditOutcome::Success)
                        .with_metadata("flow", self.flow_name())
                        .with_metadata("from", outcome.from.as_str())
                        .with_metadata("to", outcome.to.as_str())
                        .with_metadata("event", format!("{:?}", outcome.event))
                        .with_metadata(
                            "actions",
                            outcome.actions.iter().map(FlowAction::as_str).collect::<Vec<_>>().join(","),
                        ),
                );
            }
            Err(error) => {
                sink.emit(
                    audit
                        .event("flow.transition_rejected", AuditCategory::Flow, AuditOutcome::Rejected)
                        .with_metadata("flow", self.flow_name())
                        .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<BookingFlow> {
    fn default() -> Self {
        Self::new(BookingFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("missing required facts before leaving {state:?}: {missing_facts:?}")]
    MissingRequiredFacts { state: ConversationStep, missing_facts: Vec<String> },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: ConversationStep, event: FlowEvent },
}

fn transition_booking(
    current: &ConversationStep,
    event: &FlowEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use ConversationStep::{
        Booked, CollectingDate, CollectingName, CollectingTime, CollectingTreatment,
        ConfirmPending, Greeting, HumanHandoff,
    };
    use FlowAction::{
        AnnounceBooking, CancelAppointment, CommitBooking, NotifyHandoff, OfferSlots,
        PromptForDate, PromptForName, PromptForTreatment, RequestConfirmation, ResetFacts,
    };
    use FlowEvent::{
        AnotherBookingRequested, BookingCancelled, BookingConfirmed, BookingDeclined,
        ConversationStarted, DateAccepted, HandoffRequested, NameProvided, RestartRequested,
        SlotLost, StaleFactsDetected, TimeAccepted, TreatmentSelected,
    };

    let requires_facts = matches!(
        (current, event),
        (CollectingName, NameProvided)
            | (CollectingTreatment, TreatmentSelected)
            | (CollectingDate | CollectingTime | ConfirmPending, DateAccepted)
            | (CollectingTime, TimeAccepted)
    );
    if requires_facts && !context.missing_facts.is_empty() {
        return Err(FlowTransitionError::MissingRequiredFacts {
            state: *current,
            missing_facts: context.missing_facts.clone(),
        });
    }

    let (to, actions) = match (current, event) {
        (_, RestartRequested) => (Greeting, vec![ResetFacts]),
        (HumanHandoff, _) => {
            return Err(FlowTransitionError::InvalidTransition { state: *current, event: event.clone() })
        }
        (_, HandoffRequested) => (HumanHandoff, vec![NotifyHandoff]),
        (Greeting, ConversationStarted) => (CollectingName, vec![PromptForName]),
        (CollectingName, NameProvided) => (CollectingTreatment, vec![PromptForTreatment]),
        (CollectingTreatment, TreatmentSelected) => (CollectingDate, vec![PromptForDate]),
        (CollectingDate | CollectingTime | ConfirmPending, DateAccepted) => {
            (CollectingTime, vec![OfferSlots])
        }
        (CollectingTime, TimeAccepted) => (ConfirmPending, vec![RequestConfirmation]),
        (ConfirmPending, BookingConfirmed) => (Booked, vec![CommitBooking, AnnounceBooking]),
        (ConfirmPending, BookingDeclined) => (CollectingDate, vec![PromptForDate]),
        (ConfirmPending, SlotLost) => (CollectingTime, vec![OfferSlots]),
        (CollectingTime | ConfirmPending, StaleFactsDetected) => (CollectingDate, vec![PromptForDate]),
        (Booked, AnotherBookingRequested) => (CollectingDate, vec![PromptForDate]),
        (Booked, BookingCancelled) => (CollectingDate, vec![CancelAppointment, PromptForDate]),
        _ => {
            return Err(FlowTransitionError::InvalidTransition { state: *current, event: event.clone() })
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: event.clone(), actions })
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::domain::session::PhoneNumber;
    use crate::flows::engine::{BookingFlow, FlowDefinition, FlowEngine, FlowTransitionError};
    use crate::flows::states::{ConversationStep, FlowAction, FlowContext, FlowEvent};

    #[test]
    fn booking_flow_happy_path() {
        let engine = FlowEngine::new(BookingFlow);
        let context = FlowContext::default();
        let mut state = engine.initial_state();

        for event in [
            FlowEvent::ConversationStarted,
            FlowEvent::NameProvided,
            FlowEvent::TreatmentSelected,
            FlowEvent::DateAccepted,
            FlowEvent::TimeAccepted,
        ] {
            state = engine.apply(&state, &event, &context).expect("main path transition").to;
        }
        assert_eq!(state, ConversationStep::ConfirmPending);

        let booked = engine
            .apply(&state, &FlowEvent::BookingConfirmed, &context)
            .expect("confirm -> booked");
        assert_eq!(booked.to, ConversationStep::Booked);
        assert_eq!(booked.actions, vec![FlowAction::CommitBooking, FlowAction::AnnounceBooking]);

        let again = engine
            .apply(&booked.to, &FlowEvent::AnotherBookingRequested, &context)
            .expect("booked loops back");
        assert_eq!(again.to, ConversationStep::CollectingDate);
    }

    #[test]
    fn lost_slot_returns_to_time_selection() {
        let engine = FlowEngine::default();
        let outcome = engine
            .apply(&ConversationStep::ConfirmPending, &FlowEvent::SlotLost, &FlowContext::default())
            .expect("conflict handling");

        assert_eq!(outcome.to, ConversationStep::CollectingTime);
        assert_eq!(outcome.actions, vec![FlowAction::OfferSlots]);
    }

    #[test]
    fn handoff_is_reachable_from_every_automated_step() {
        let engine = FlowEngine::default();
        for step in [
            ConversationStep::Greeting,
            ConversationStep::CollectingName,
            ConversationStep::CollectingTreatment,
            ConversationStep::CollectingDate,
            ConversationStep::CollectingTime,
            ConversationStep::ConfirmPending,
            ConversationStep::Booked,
        ] {
            let outcome = engine
                .apply(&step, &FlowEvent::HandoffRequested, &FlowContext::default())
                .expect("handoff transition");
            assert_eq!(outcome.to, ConversationStep::HumanHandoff);
        }
    }

    #[test]
    fn handoff_only_leaves_through_restart() {
        let engine = FlowEngine::default();
        let error = engine
            .apply(&ConversationStep::HumanHandoff, &FlowEvent::NameProvided, &FlowContext::default())
            .expect_err("handoff is sticky");
        assert!(matches!(error, FlowTransitionError::InvalidTransition { .. }));

        let restart = engine
            .apply(&ConversationStep::HumanHandoff, &FlowEvent::RestartRequested, &FlowContext::default())
            .expect("restart resumes automation");
        assert_eq!(restart.to, ConversationStep::Greeting);
        assert_eq!(restart.actions, vec![FlowAction::ResetFacts]);
    }

    #[test]
    fn missing_fact_keeps_step() {
        let engine = FlowEngine::default();
        let error = engine
            .apply(
                &ConversationStep::CollectingDate,
                &FlowEvent::DateAccepted,
                &FlowContext::missing("date"),
            )
            .expect_err("date is required");

        assert_eq!(
            error,
            FlowTransitionError::MissingRequiredFacts {
                state: ConversationStep::CollectingDate,
                missing_facts: vec!["date".to_owned()],
            }
        );
    }

    #[test]
    fn cannot_skip_ahead_to_confirmation() {
        let engine = FlowEngine::default();
        let error = engine
            .apply(&ConversationStep::CollectingName, &FlowEvent::BookingConfirmed, &FlowContext::default())
            .expect_err("cannot confirm before collecting facts");

        assert!(matches!(
            error,
            FlowTransitionError::InvalidTransition {
                state: ConversationStep::CollectingName,
                event: FlowEvent::BookingConfirmed
            }
        ));
        assert_eq!(BookingFlow.name(), "booking");
    }

    #[test]
    fn flow_transition_emits_audit_event() {
        let engine = FlowEngine::default();
        let sink = InMemoryAuditSink::default();

        let outcome = engine
            .apply_with_audit(
                &ConversationStep::CollectingTime,
                &FlowEvent::StaleFactsDetected,
                &FlowContext::default(),
                &sink,
                &AuditContext::new(Some(PhoneNumber("+34600111222".to_owned())), "turn-42", "orchestrator"),
            )
            .expect("stale facts rewind");
        assert_eq!(outcome.to, ConversationStep::CollectingDate);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].correlation_id, "turn-42");
        assert_eq!(events[0].name, "flow.transition_applied");
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("collecting_date"));
        assert_eq!(events[0].metadata.get("actions").map(String::as_str), Some("prompt_for_date"));
    }
}
