use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clinibook_core::clock::CivilClock;
use tracing::debug;

use clinibook_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use clinibook_core::dates::{DateResolution, DateResolver};
use clinibook_core::domain::appointment::{AppointmentId, BookingOutcome, ConflictReason, NewAppointment};
use clinibook_core::domain::interaction::InteractionOutcome;
use clinibook_core::domain::session::ConversationSession;
use clinibook_core::domain::treatment::{Treatment, TreatmentCatalog};
use clinibook_core::errors::{Recovery, TurnError};
use clinibook_core::flows::{BookingFlow, ConversationStep, FlowContext, FlowEngine, FlowEvent};
use clinibook_core::schedule::{format_clock_time, nearest_slots};
use clinibook_db::repositories::AppointmentRepository;

use crate::availability::{AvailabilityService, DayAvailability};
use crate::classifier::{capitalize_words, Classification, TurnClassifier, TurnIntent};
use crate::guardrails::{GuardrailDecision, GuardrailPolicy, HandoffTrigger};
use crate::replies;

/// Per-turn inputs that do not belong to the session.
#[derive(Clone, Debug)]
pub struct TurnContext {
    pub correlation_id: String,
    pub now: DateTime<Utc>,
    /// The clinic's civil date at `now`.
    pub today: NaiveDate,
    /// The clinic's wall-clock time at `now`.
    pub local_time: NaiveTime,
}

impl TurnContext {
    pub fn new(correlation_id: impl Into<String>, now: DateTime<Utc>, civil: &CivilClock) -> Self {
        let local = civil.local(now);
        Self { correlation_id: correlation_id.into(), now, today: local.date(), local_time: local.time() }
    }
}

#[derive(Clone, Debug)]
pub struct TurnResult {
    pub session: ConversationSession,
    pub reply: String,
    pub outcome: InteractionOutcome,
    pub booking: Option<AppointmentId>,
    pub handoff: Option<HandoffTrigger>,
}

impl TurnResult {
    pub fn booking_committed(&self) -> bool {
        self.booking.is_some()
    }
}

#[derive(Clone, Debug)]
pub struct OrchestratorSettings {
    pub clinic_name: String,
    pub max_offered_slots: usize,
}

enum Step {
    /// Moved to a new step; the same text may carry its fact too.
    Chain,
    Stop,
    Invalid { reason: &'static str, prompt: String },
}

struct Turn<'a> {
    session: ConversationSession,
    text: &'a str,
    classification: Classification,
    notices: Vec<String>,
    reply: String,
    outcome: InteractionOutcome,
    booking: Option<AppointmentId>,
    handoff: Option<HandoffTrigger>,
    audit: AuditContext,
}

/// Drives one conversation turn: takes the loaded session by value and hands
/// back the next session, the reply and the log outcome. Storage and
/// transport failures come back as errors; everything the patient can fix is
/// answered inside the turn.
pub struct Orchestrator {
    engine: FlowEngine<BookingFlow>,
    classifier: Arc<dyn TurnClassifier>,
    availability: AvailabilityService,
    appointments: Arc<dyn AppointmentRepository>,
    catalog: TreatmentCatalog,
    resolver: DateResolver,
    guardrails: GuardrailPolicy,
    audit: Arc<dyn AuditSink>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        classifier: Arc<dyn TurnClassifier>,
        availability: AvailabilityService,
        appointments: Arc<dyn AppointmentRepository>,
        catalog: TreatmentCatalog,
        guardrails: GuardrailPolicy,
        audit: Arc<dyn AuditSink>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            engine: FlowEngine::default(),
            classifier,
            availability,
            appointments,
            catalog,
            resolver: DateResolver::new(),
            guardrails,
            audit,
            settings,
        }
    }

    pub async fn handle_turn(
        &self,
        session: ConversationSession,
        text: &str,
        context: &TurnContext,
    ) -> Result<TurnResult, TurnError> {
        let classification = self
            .classifier
            .classify(text, session.step)
            .await
            .map_err(|error| TurnError::Transport(error.to_string()))?;
        debug!(
            event_name = "turn.classified",
            correlation_id = %context.correlation_id,
            step = session.step.as_str(),
            intent = classification.intent.as_str(),
        );

        let audit = AuditContext::new(Some(session.phone.clone()), context.correlation_id.clone(), "orchestrator");
        let mut turn = Turn {
            session,
            text,
            classification,
            notices: Vec::new(),
            reply: String::new(),
            outcome: InteractionOutcome::Replied,
            booking: None,
            handoff: None,
            audit,
        };

        self.run(&mut turn, context).await?;

        turn.session.updated_at = context.now;
        let mut reply = turn.notices;
        if !turn.reply.is_empty() {
            reply.push(turn.reply);
        }
        Ok(TurnResult {
            session: turn.session,
            reply: reply.join(" "),
            outcome: turn.outcome,
            booking: turn.booking,
            handoff: turn.handoff,
        })
    }

    async fn run(&self, turn: &mut Turn<'_>, context: &TurnContext) -> Result<(), TurnError> {
        // Reaching the orchestrator in handoff means the operator released the
        // conversation.
        if turn.session.step == ConversationStep::HumanHandoff {
            self.restart(turn, context)?;
        }

        if let GuardrailDecision::Handoff { trigger, user_message } =
            self.guardrails.evaluate(turn.classification.intent)
        {
            return self.hand_off(turn, trigger, user_message);
        }

        let mut fresh = true;
        if turn.classification.intent == TurnIntent::Restart && turn.session.step != ConversationStep::Greeting {
            self.restart(turn, context)?;
            fresh = false;
        } else if self.revalidate(turn, context).await? {
            fresh = false;
        }

        // Each pass either stops or moves the flow forward, so the bound is
        // never reached in practice.
        for _ in 0..8 {
            let step = match turn.session.step {
                ConversationStep::Greeting => self.greeting(turn)?,
                ConversationStep::CollectingName => self.collecting_name(turn, fresh)?,
                ConversationStep::CollectingTreatment => self.collecting_treatment(turn, fresh)?,
                ConversationStep::CollectingDate => self.collecting_date(turn, context, fresh).await?,
                ConversationStep::CollectingTime => self.collecting_time(turn, context, fresh).await?,
                ConversationStep::ConfirmPending => self.confirm_pending(turn, context, fresh).await?,
                ConversationStep::Booked => self.booked(turn, context, fresh).await?,
                ConversationStep::HumanHandoff => Step::Stop,
            };

            match step {
                Step::Chain => fresh = false,
                Step::Stop => break,
                Step::Invalid { reason, prompt } => {
                    self.invalid_answer(turn, reason, prompt)?;
                    break;
                }
            }
        }
        Ok(())
    }

    fn transition(&self, turn: &mut Turn<'_>, event: FlowEvent) -> Result<(), TurnError> {
        let context = missing_facts(&turn.session, &event);
        let outcome = self
            .engine
            .apply_with_audit(&turn.session.step, &event, &context, self.audit.as_ref(), &turn.audit)
            .map_err(|error| TurnError::CorruptSession(error.to_string()))?;
        if outcome.to != outcome.from {
            turn.session.clear_failures();
        }
        turn.session.step = outcome.to;
        Ok(())
    }

    fn restart(&self, turn: &mut Turn<'_>, context: &TurnContext) -> Result<(), TurnError> {
        self.transition(turn, FlowEvent::RestartRequested)?;
        turn.session.reset(context.now);
        Ok(())
    }

    fn hand_off(&self, turn: &mut Turn<'_>, trigger: HandoffTrigger, message: String) -> Result<(), TurnError> {
        self.transition(turn, FlowEvent::HandoffRequested)?;
        self.audit.emit(
            turn.audit
                .event("handoff.requested", AuditCategory::Handoff, AuditOutcome::Success)
                .with_metadata("reason", trigger.reason_code()),
        );
        turn.reply = message;
        turn.outcome = InteractionOutcome::HandedOff;
        turn.handoff = Some(trigger);
        Ok(())
    }

    fn invalid_answer(&self, turn: &mut Turn<'_>, reason: &'static str, prompt: String) -> Result<(), TurnError> {
        let failed = turn.session.record_failure();
        let error = TurnError::Validation(reason.to_owned());
        self.audit.emit(
            turn.audit
                .event("turn.answer_rejected", AuditCategory::Flow, AuditOutcome::Rejected)
                .with_metadata("step", turn.session.step.as_str())
                .with_metadata("reason", reason)
                .with_metadata("failed_attempts", failed.to_string()),
        );

        if error.recovery_after(failed, self.guardrails.max_failed_attempts) == Recovery::Escalate {
            if let GuardrailDecision::Handoff { trigger, user_message } =
                self.guardrails.handoff(HandoffTrigger::RepeatedFailures)
            {
                return self.hand_off(turn, trigger, user_message);
            }
        }
        turn.reply = prompt;
        Ok(())
    }

    /// Drops a chosen date that has since passed or been blocked.
    async fn revalidate(&self, turn: &mut Turn<'_>, context: &TurnContext) -> Result<bool, TurnError> {
        if !matches!(turn.session.step, ConversationStep::CollectingTime | ConversationStep::ConfirmPending) {
            return Ok(false);
        }
        let facts = &turn.session.facts;
        let stale = match facts.date {
            Some(date) if date < context.today => true,
            Some(date) if date == context.today && facts.time.is_some_and(|time| time <= context.local_time) => true,
            Some(date) => self.availability.is_blocked(date).await?,
            None => true,
        };
        if !stale {
            return Ok(false);
        }

        debug!(event_name = "turn.stale_facts", correlation_id = %context.correlation_id);
        turn.session.facts.clear_schedule();
        self.transition(turn, FlowEvent::StaleFactsDetected)?;
        turn.notices.push(replies::stale_date());
        Ok(true)
    }

    fn greeting(&self, turn: &mut Turn<'_>) -> Result<Step, TurnError> {
        self.transition(turn, FlowEvent::ConversationStarted)?;
        turn.notices.push(replies::welcome_intro(&self.settings.clinic_name));
        turn.reply = replies::ask_name();
        Ok(Step::Chain)
    }

    fn collecting_name(&self, turn: &mut Turn<'_>, fresh: bool) -> Result<Step, TurnError> {
        let facts = &turn.classification.facts;
        let bare_reply = fresh
            && matches!(turn.classification.intent, TurnIntent::Unknown)
            && facts.treatment.is_none()
            && facts.time.is_none();
        let candidate = facts
            .name
            .clone()
            .or_else(|| bare_reply.then(|| turn.text.trim().to_owned()))
            .filter(|name| valid_name(name));

        let Some(name) = candidate else {
            return Ok(if fresh {
                Step::Invalid { reason: "name_missing", prompt: replies::ask_name() }
            } else {
                Step::Stop
            });
        };

        let name = capitalize_words(&name);
        turn.session.facts.name = Some(name.clone());
        self.transition(turn, FlowEvent::NameProvided)?;
        turn.reply = replies::ask_treatment(&name, &self.catalog.labels());
        Ok(Step::Chain)
    }

    fn collecting_treatment(&self, turn: &mut Turn<'_>, fresh: bool) -> Result<Step, TurnError> {
        let treatment = turn
            .classification
            .facts
            .treatment
            .as_deref()
            .and_then(|key| self.catalog.find(key))
            .cloned();

        let Some(treatment) = treatment else {
            return Ok(if fresh {
                Step::Invalid {
                    reason: "treatment_unknown",
                    prompt: replies::unknown_treatment(&self.catalog.labels()),
                }
            } else {
                Step::Stop
            });
        };

        turn.session.facts.treatment = Some(treatment.key.clone());
        self.transition(turn, FlowEvent::TreatmentSelected)?;
        turn.reply = replies::ask_date(&treatment.label);
        Ok(Step::Chain)
    }

    async fn collecting_date(
        &self,
        turn: &mut Turn<'_>,
        context: &TurnContext,
        fresh: bool,
    ) -> Result<Step, TurnError> {
        match self.resolver.resolve(turn.text, context.today) {
            DateResolution::Resolved(date) => self.accept_date(turn, context, date).await,
            DateResolution::Unresolved if fresh => {
                Ok(Step::Invalid { reason: "date_unresolved", prompt: replies::date_unclear() })
            }
            DateResolution::Unresolved => Ok(Step::Stop),
        }
    }

    async fn accept_date(&self, turn: &mut Turn<'_>, context: &TurnContext, date: NaiveDate) -> Result<Step, TurnError> {
        if date < context.today {
            return Ok(Step::Invalid { reason: "date_in_past", prompt: replies::date_in_past() });
        }
        let treatment = self.chosen_treatment(turn)?;

        let slots = match self.day(date, treatment.duration_minutes, context).await? {
            DayAvailability::Blocked => {
                return Ok(Step::Invalid { reason: "date_blocked", prompt: replies::date_blocked(date) })
            }
            DayAvailability::Closed => {
                return Ok(Step::Invalid { reason: "date_closed", prompt: replies::date_closed(date) })
            }
            DayAvailability::Open(slots) if slots.is_empty() => {
                return Ok(Step::Invalid { reason: "date_full", prompt: replies::date_full(date) })
            }
            DayAvailability::Open(slots) => slots,
        };

        let offered = spread(&slots, self.settings.max_offered_slots);
        turn.session.facts.date = Some(date);
        turn.session.facts.time = None;
        turn.session.facts.offered_slots = offered.clone();
        self.transition(turn, FlowEvent::DateAccepted)?;
        turn.reply = replies::offer_slots(date, &offered);
        Ok(Step::Chain)
    }

    async fn collecting_time(
        &self,
        turn: &mut Turn<'_>,
        context: &TurnContext,
        fresh: bool,
    ) -> Result<Step, TurnError> {
        if fresh {
            if let DateResolution::Resolved(date) = self.resolver.resolve(turn.text, context.today) {
                if Some(date) != turn.session.facts.date {
                    return self.accept_date(turn, context, date).await;
                }
            }
        }

        let Some(wanted) = turn.classification.facts.time else {
            return Ok(if fresh {
                Step::Invalid { reason: "time_missing", prompt: replies::ask_time(&turn.session.facts.offered_slots) }
            } else {
                Step::Stop
            });
        };
        let (date, treatment) = (self.chosen_date(turn)?, self.chosen_treatment(turn)?);

        let slots = self.day(date, treatment.duration_minutes, context).await?.slots().to_vec();
        if slots.contains(&wanted) {
            turn.session.facts.time = Some(wanted);
            self.transition(turn, FlowEvent::TimeAccepted)?;
            turn.reply = replies::confirm(&treatment.label, date, wanted);
            return Ok(Step::Stop);
        }
        if slots.is_empty() {
            turn.session.facts.clear_schedule();
            self.transition(turn, FlowEvent::StaleFactsDetected)?;
            turn.reply = replies::day_filled_up();
            return Ok(Step::Stop);
        }

        let alternatives = nearest_slots(&slots, wanted, self.settings.max_offered_slots.max(1));
        turn.session.facts.offered_slots = alternatives.clone();
        Ok(Step::Invalid { reason: "time_unavailable", prompt: replies::time_unavailable(wanted, &alternatives) })
    }

    async fn confirm_pending(
        &self,
        turn: &mut Turn<'_>,
        context: &TurnContext,
        fresh: bool,
    ) -> Result<Step, TurnError> {
        match turn.classification.intent {
            TurnIntent::Affirm => self.commit(turn, context).await,
            TurnIntent::Deny => {
                turn.session.facts.clear_schedule();
                self.transition(turn, FlowEvent::BookingDeclined)?;
                turn.reply = replies::declined();
                Ok(Step::Chain)
            }
            _ => match self.resolver.resolve(turn.text, context.today) {
                DateResolution::Resolved(date) => self.accept_date(turn, context, date).await,
                DateResolution::Unresolved if fresh => {
                    Ok(Step::Invalid { reason: "confirmation_unclear", prompt: replies::confirm_again() })
                }
                DateResolution::Unresolved => Ok(Step::Stop),
            },
        }
    }

    /// Books the confirmed slot after a fresh availability check. A failed
    /// calendar read propagates, so nothing is booked blind.
    async fn commit(&self, turn: &mut Turn<'_>, context: &TurnContext) -> Result<Step, TurnError> {
        let date = self.chosen_date(turn)?;
        let treatment = self.chosen_treatment(turn)?;
        let (Some(time), Some(name)) = (turn.session.facts.time, turn.session.facts.name.clone()) else {
            return Err(TurnError::CorruptSession("confirmation without time or name".to_owned()));
        };

        let slots = match self.day(date, treatment.duration_minutes, context).await? {
            DayAvailability::Open(slots) => slots,
            DayAvailability::Blocked | DayAvailability::Closed => return self.rewind_to_date(turn, replies::stale_date()),
        };
        if !slots.contains(&time) {
            return self.slot_lost(turn, time, slots);
        }

        let request = NewAppointment {
            patient_name: name,
            patient_phone: turn.session.phone.clone(),
            treatment: treatment.key.clone(),
            date,
            start_time: time,
            duration_minutes: treatment.duration_minutes,
            requested_at: context.now,
        };
        let outcome = self
            .appointments
            .book(request)
            .await
            .map_err(|error| TurnError::Storage(error.to_string()))?;

        match outcome {
            BookingOutcome::Booked(id) => {
                turn.session.facts.appointment_id = Some(id);
                self.transition(turn, FlowEvent::BookingConfirmed)?;
                self.audit.emit(
                    turn.audit
                        .event("booking.committed", AuditCategory::Booking, AuditOutcome::Success)
                        .with_metadata("appointment_id", id.to_string())
                        .with_metadata("date", date.to_string())
                        .with_metadata("start_time", format_clock_time(time))
                        .with_metadata("treatment", treatment.key.clone()),
                );
                turn.reply = replies::booked(&treatment.label, date, time);
                turn.outcome = InteractionOutcome::Booked;
                turn.booking = Some(id);
                Ok(Step::Stop)
            }
            BookingOutcome::Conflict(reason) => {
                let error = TurnError::Conflict(reason.as_str().to_owned());
                self.audit.emit(
                    turn.audit
                        .event("booking.conflict", AuditCategory::Booking, AuditOutcome::Rejected)
                        .with_metadata("reason", reason.as_str())
                        .with_metadata("recovery", format!("{:?}", error.recovery())),
                );
                if reason == ConflictReason::DateBlocked {
                    return self.rewind_to_date(turn, replies::stale_date());
                }
                let slots = self.day(date, treatment.duration_minutes, context).await?.slots().to_vec();
                self.slot_lost(turn, time, slots)
            }
        }
    }

    fn slot_lost(&self, turn: &mut Turn<'_>, wanted: NaiveTime, slots: Vec<NaiveTime>) -> Result<Step, TurnError> {
        turn.outcome = InteractionOutcome::BookingConflict;
        let alternatives = nearest_slots(&slots, wanted, self.settings.max_offered_slots.max(1));
        if alternatives.is_empty() {
            return self.rewind_to_date(turn, replies::day_filled_up());
        }
        turn.session.facts.time = None;
        turn.session.facts.offered_slots = alternatives.clone();
        self.transition(turn, FlowEvent::SlotLost)?;
        turn.reply = replies::slot_lost(&alternatives);
        Ok(Step::Stop)
    }

    fn rewind_to_date(&self, turn: &mut Turn<'_>, reply: String) -> Result<Step, TurnError> {
        turn.session.facts.clear_schedule();
        self.transition(turn, FlowEvent::StaleFactsDetected)?;
        turn.reply = reply;
        Ok(Step::Stop)
    }

    async fn booked(&self, turn: &mut Turn<'_>, context: &TurnContext, fresh: bool) -> Result<Step, TurnError> {
        if !fresh {
            return Ok(Step::Stop);
        }
        match turn.classification.intent {
            TurnIntent::CancelBooking => self.cancel_booking(turn).await,
            TurnIntent::NewBooking => self.another_booking(turn),
            _ if self.resolver.resolve(turn.text, context.today) != DateResolution::Unresolved => {
                self.another_booking(turn)
            }
            _ => {
                turn.reply = replies::booked_summary();
                Ok(Step::Stop)
            }
        }
    }

    fn another_booking(&self, turn: &mut Turn<'_>) -> Result<Step, TurnError> {
        turn.session.facts.clear_schedule();
        self.transition(turn, FlowEvent::AnotherBookingRequested)?;
        turn.reply = replies::new_booking();
        Ok(Step::Chain)
    }

    async fn cancel_booking(&self, turn: &mut Turn<'_>) -> Result<Step, TurnError> {
        let storage = |error: clinibook_db::RepositoryError| TurnError::Storage(error.to_string());
        let Some(id) = turn.session.facts.appointment_id else {
            turn.reply = replies::nothing_to_cancel();
            return Ok(Step::Stop);
        };
        let Some(appointment) = self.appointments.find_by_id(id).await.map_err(storage)? else {
            turn.reply = replies::nothing_to_cancel();
            return Ok(Step::Stop);
        };
        if !self.appointments.cancel(id).await.map_err(storage)? {
            turn.reply = replies::nothing_to_cancel();
            return Ok(Step::Stop);
        }

        turn.session.facts.clear_schedule();
        turn.session.facts.appointment_id = None;
        self.transition(turn, FlowEvent::BookingCancelled)?;
        self.audit.emit(
            turn.audit
                .event("booking.cancelled", AuditCategory::Booking, AuditOutcome::Success)
                .with_metadata("appointment_id", id.to_string()),
        );
        turn.reply = replies::cancelled(appointment.date, appointment.start_time);
        turn.outcome = InteractionOutcome::Cancelled;
        Ok(Step::Stop)
    }

    /// Availability as the patient can still use it: today's elapsed start
    /// times are gone.
    async fn day(&self, date: NaiveDate, minutes: u32, context: &TurnContext) -> Result<DayAvailability, TurnError> {
        let day = self.availability.day(date, minutes).await?;
        Ok(if date == context.today { day.starting_after(context.local_time) } else { day })
    }

    fn chosen_treatment(&self, turn: &Turn<'_>) -> Result<Treatment, TurnError> {
        turn.session
            .facts
            .treatment
            .as_deref()
            .and_then(|key| self.catalog.find(key))
            .cloned()
            .ok_or_else(|| TurnError::CorruptSession("no known treatment in session facts".to_owned()))
    }

    fn chosen_date(&self, turn: &Turn<'_>) -> Result<NaiveDate, TurnError> {
        turn.session
            .facts
            .date
            .ok_or_else(|| TurnError::CorruptSession("no date in session facts".to_owned()))
    }
}

/// The fact an advancing event claims to have collected, if it is absent.
fn missing_facts(session: &ConversationSession, event: &FlowEvent) -> FlowContext {
    let facts = &session.facts;
    let missing = match event {
        FlowEvent::NameProvided if facts.name.is_none() => Some("name"),
        FlowEvent::TreatmentSelected if facts.treatment.is_none() => Some("treatment"),
        FlowEvent::DateAccepted if facts.date.is_none() => Some("date"),
        FlowEvent::TimeAccepted if facts.time.is_none() => Some("time"),
        _ => None,
    };
    missing.map(FlowContext::missing).unwrap_or_default()
}

/// 2 to 60 letters and spaces.
fn valid_name(name: &str) -> bool {
    let trimmed = name.trim();
    let letters = trimmed.chars().filter(|ch| ch.is_alphabetic()).count();
    letters >= 2
        && trimmed.chars().count() <= 60
        && trimmed.split_whitespace().count() <= 4
        && trimmed.chars().all(|ch| ch.is_alphabetic() || ch == ' ')
}

/// Up to `limit` slots spread evenly over the day, in order.
fn spread(slots: &[NaiveTime], limit: usize) -> Vec<NaiveTime> {
    if limit == 0 || slots.len() <= limit {
        return slots.to_vec();
    }
    (0..limit).map(|index| slots[index * slots.len() / limit]).collect()
}
