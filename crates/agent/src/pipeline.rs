use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use clinibook_core::clock::{CivilClock, Clock};
use clinibook_core::config::{AppConfig, SchedulingConfig};
use clinibook_core::domain::interaction::{InteractionOutcome, NewInteraction};
use clinibook_core::domain::session::{ConversationSession, PhoneNumber};
use clinibook_core::errors::{ApplicationError, TurnError};
use clinibook_db::repositories::{
    ConversationLockRepository, HandoffRepository, InteractionLogRepository, LockLease, RepositoryError,
    SessionRepository,
};
use clinibook_gateway::MessageGateway;

use crate::debounce::{Debouncer, Submission};
use crate::orchestrator::{Orchestrator, TurnContext, TurnResult};
use crate::replies;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub phone: PhoneNumber,
    pub text: String,
    pub received_at: DateTime<Utc>,
    /// Provider send time; a redelivery repeats it.
    pub sent_at: Option<DateTime<Utc>>,
}

/// What happened to one delivered message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboundStatus {
    /// A turn ran; the outcome is in the interaction log.
    Processed(InteractionOutcome),
    /// A later fragment from the same phone will carry this one.
    Buffered,
    /// A human owns the conversation.
    Suppressed,
    /// The conversation stayed locked; the text waits in the buffer for the
    /// lock holder or the next delivery.
    Deferred,
    /// A redelivery of a message already accepted.
    Duplicate,
}

impl InboundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processed(_) => "processed",
            Self::Buffered => "buffered",
            Self::Suppressed => "suppressed",
            Self::Deferred => "deferred",
            Self::Duplicate => "duplicate",
        }
    }

    pub fn outcome(&self) -> Option<InteractionOutcome> {
        match self {
            Self::Processed(outcome) => Some(*outcome),
            _ => None,
        }
    }
}

const MAX_SWEEPS: usize = 4;
const MAX_LOCK_STALE_SECS: u64 = 86_400;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineSettings {
    pub lock_stale_after: chrono::Duration,
    pub lock_wait: Duration,
    pub lock_poll: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &SchedulingConfig) -> Self {
        Self {
            lock_stale_after: i64::try_from(config.lock_stale_secs.min(MAX_LOCK_STALE_SECS))
                .ok()
                .and_then(chrono::Duration::try_seconds)
                .unwrap_or_else(|| chrono::Duration::days(1)),
            lock_wait: Duration::from_millis(config.lock_wait_ms),
            lock_poll: Duration::from_millis(config.lock_poll_ms.max(1)),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default().scheduling)
    }
}

pub struct PipelineStores {
    pub sessions: Arc<dyn SessionRepository>,
    pub handoffs: Arc<dyn HandoffRepository>,
    pub locks: Arc<dyn ConversationLockRepository>,
    pub log: Arc<dyn InteractionLogRepository>,
}

/// Inbound message handling end to end: debounce, per-phone lock, handoff
/// check, the orchestrated turn, dispatch, persistence and logging.
pub struct TurnPipeline {
    debouncer: Debouncer,
    stores: PipelineStores,
    gateway: Arc<dyn MessageGateway>,
    orchestrator: Orchestrator,
    clock: Arc<dyn Clock>,
    civil: CivilClock,
    settings: PipelineSettings,
}

struct Reply {
    text: String,
    outcome: InteractionOutcome,
}

impl TurnPipeline {
    pub fn new(
        debouncer: Debouncer,
        stores: PipelineStores,
        gateway: Arc<dyn MessageGateway>,
        orchestrator: Orchestrator,
        clock: Arc<dyn Clock>,
        civil: CivilClock,
        settings: PipelineSettings,
    ) -> Self {
        Self { debouncer, stores, gateway, orchestrator, clock, civil, settings }
    }

    pub async fn handle(&self, message: InboundMessage) -> Result<InboundStatus, ApplicationError> {
        let correlation_id = Uuid::new_v4().to_string();
        let phone = message.phone;

        let submission = self
            .debouncer
            .submit(&phone, &message.text, message.received_at, message.sent_at)
            .await
            .map_err(persistence)?;
        match submission {
            Submission::Duplicate => {
                info!(event_name = "pipeline.duplicate", correlation_id = %correlation_id, phone = %phone.masked());
                return Ok(InboundStatus::Duplicate);
            }
            Submission::Superseded => {
                debug!(event_name = "pipeline.buffered", correlation_id = %correlation_id, phone = %phone.masked());
                return Ok(InboundStatus::Buffered);
            }
            Submission::Quiet => {}
        }

        let status = self.run_buffered(&phone, &correlation_id).await?;
        if matches!(status, InboundStatus::Processed(_)) {
            self.sweep(&phone, &correlation_id).await;
        }
        Ok(status)
    }

    /// Runs a turn for text already waiting in the buffer, such as text
    /// whose delivery was deferred.
    pub async fn resume(&self, phone: &PhoneNumber) -> Result<InboundStatus, ApplicationError> {
        let correlation_id = Uuid::new_v4().to_string();
        if !self.debouncer.is_quiet(phone).await.map_err(persistence)? {
            return Ok(InboundStatus::Buffered);
        }
        self.run_buffered(phone, &correlation_id).await
    }

    /// Takes the lock, then the buffered text. Nothing leaves the buffer
    /// unless a turn will run on it.
    async fn run_buffered(&self, phone: &PhoneNumber, correlation_id: &str) -> Result<InboundStatus, ApplicationError> {
        let Some(lease) = self.acquire(phone).await? else {
            warn!(
                event_name = "pipeline.deferred",
                correlation_id = %correlation_id,
                phone = %phone.masked(),
                "conversation lock still held; text stays buffered"
            );
            return Ok(InboundStatus::Deferred);
        };
        if lease.reclaimed {
            warn!(event_name = "pipeline.lock_reclaimed", correlation_id = %correlation_id, phone = %phone.masked());
        }

        let status = match self.debouncer.drain(phone).await {
            Ok(Some(text)) => self.locked_turn(phone, &text, correlation_id).await,
            Ok(None) => Ok(InboundStatus::Buffered),
            Err(error) => Err(persistence(error)),
        };

        match self.stores.locks.release(&lease).await {
            Ok(true) => {}
            Ok(false) => warn!(event_name = "pipeline.lock_lost", correlation_id = %correlation_id),
            Err(error) => error!(event_name = "pipeline.lock_release_failed", correlation_id = %correlation_id, error = %error),
        }
        status
    }

    /// Picks up text deferred by other deliveries while this one held the
    /// lock.
    async fn sweep(&self, phone: &PhoneNumber, correlation_id: &str) {
        for _ in 0..MAX_SWEEPS {
            match self.resume(phone).await {
                Ok(InboundStatus::Processed(outcome)) => {
                    info!(
                        event_name = "pipeline.deferred_text_answered",
                        correlation_id = %correlation_id,
                        outcome = outcome.as_str(),
                    );
                }
                Ok(_) => break,
                Err(error) => {
                    warn!(event_name = "pipeline.sweep_failed", correlation_id = %correlation_id, error = %error);
                    break;
                }
            }
        }
    }

    async fn acquire(&self, phone: &PhoneNumber) -> Result<Option<LockLease>, ApplicationError> {
        let deadline = tokio::time::Instant::now() + self.settings.lock_wait;
        loop {
            let lease = self
                .stores
                .locks
                .try_acquire(phone, self.clock.now(), self.settings.lock_stale_after)
                .await
                .map_err(persistence)?;
            if lease.is_some() {
                return Ok(lease);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.settings.lock_poll).await;
        }
    }

    async fn locked_turn(
        &self,
        phone: &PhoneNumber,
        text: &str,
        correlation_id: &str,
    ) -> Result<InboundStatus, ApplicationError> {
        let now = self.clock.now();

        match self.stores.handoffs.find(phone).await {
            Ok(Some(handoff)) => {
                info!(
                    event_name = "pipeline.suppressed",
                    correlation_id = %correlation_id,
                    phone = %phone.masked(),
                    reason = %handoff.reason,
                );
                self.record(phone, text, "", InteractionOutcome::Suppressed, now).await;
                return Ok(InboundStatus::Suppressed);
            }
            Ok(None) => {}
            Err(error) => return Ok(self.storage_failure(phone, text, correlation_id, &error.to_string()).await),
        }

        let (session, reset) = match self.stores.sessions.load(phone).await {
            Ok(Some(session)) => (session, false),
            Ok(None) => (ConversationSession::new(phone.clone(), now), false),
            Err(RepositoryError::Decode(detail)) => {
                warn!(event_name = "pipeline.session_reset", correlation_id = %correlation_id, detail = %detail);
                (ConversationSession::new(phone.clone(), now), true)
            }
            Err(error) => return Ok(self.storage_failure(phone, text, correlation_id, &error.to_string()).await),
        };

        let context = TurnContext::new(correlation_id, now, &self.civil);
        let turn = match self.orchestrator.handle_turn(session, text, &context).await {
            Err(TurnError::CorruptSession(detail)) if !reset => {
                warn!(event_name = "pipeline.session_reset", correlation_id = %correlation_id, detail = %detail);
                let fresh = ConversationSession::new(phone.clone(), now);
                self.orchestrator.handle_turn(fresh, text, &context).await.map(|turn| (turn, true))
            }
            other => other.map(|turn| (turn, reset)),
        };

        let mut result = match turn {
            Ok((mut result, was_reset)) => {
                if was_reset {
                    result.reply = format!("{} {}", replies::session_reset(), result.reply);
                    if result.outcome == InteractionOutcome::Replied {
                        result.outcome = InteractionOutcome::SessionReset;
                    }
                }
                result
            }
            Err(TurnError::Transport(detail)) => {
                warn!(event_name = "pipeline.transport_failure", correlation_id = %correlation_id, detail = %detail);
                let reply = Reply { text: replies::transport_apology(), outcome: InteractionOutcome::TransportFailure };
                return Ok(self.apologise(phone, text, reply, now).await);
            }
            Err(error) => return Ok(self.storage_failure(phone, text, correlation_id, &error.to_string()).await),
        };

        if let Some(trigger) = result.handoff {
            if let Err(error) = self.stores.handoffs.set(phone, trigger.reason_code(), now).await {
                error!(event_name = "pipeline.handoff_not_recorded", correlation_id = %correlation_id, error = %error);
            }
        }

        if let Err(error) = self.gateway.send(phone, &result.reply).await {
            warn!(event_name = "pipeline.dispatch_failed", correlation_id = %correlation_id, error = %error);
            // A committed booking must not be forgotten even if the patient
            // never saw the confirmation.
            if result.booking_committed() {
                self.save(&result, correlation_id).await;
            }
            result.outcome = InteractionOutcome::DispatchFailed;
            self.record(phone, text, &result.reply, result.outcome, now).await;
            return Ok(InboundStatus::Processed(result.outcome));
        }

        if !self.save(&result, correlation_id).await {
            result.outcome = InteractionOutcome::StorageFailure;
        }
        info!(
            event_name = "pipeline.turn_completed",
            correlation_id = %correlation_id,
            phone = %phone.masked(),
            step = result.session.step.as_str(),
            outcome = result.outcome.as_str(),
        );
        self.record(phone, text, &result.reply, result.outcome, now).await;
        Ok(InboundStatus::Processed(result.outcome))
    }

    async fn save(&self, result: &TurnResult, correlation_id: &str) -> bool {
        match self.stores.sessions.save(&result.session).await {
            Ok(()) => true,
            Err(error) => {
                error!(event_name = "pipeline.session_not_saved", correlation_id = %correlation_id, error = %error);
                false
            }
        }
    }

    async fn storage_failure(
        &self,
        phone: &PhoneNumber,
        text: &str,
        correlation_id: &str,
        detail: &str,
    ) -> InboundStatus {
        error!(event_name = "pipeline.storage_failure", correlation_id = %correlation_id, detail = %detail);
        let reply = Reply { text: replies::storage_apology(), outcome: InteractionOutcome::StorageFailure };
        self.apologise(phone, text, reply, self.clock.now()).await
    }

    /// Tells the patient the turn failed. The session is left as it was.
    async fn apologise(&self, phone: &PhoneNumber, text: &str, reply: Reply, now: DateTime<Utc>) -> InboundStatus {
        if let Err(error) = self.gateway.send(phone, &reply.text).await {
            warn!(event_name = "pipeline.apology_not_sent", error = %error);
        }
        self.record(phone, text, &reply.text, reply.outcome, now).await;
        InboundStatus::Processed(reply.outcome)
    }

    async fn record(
        &self,
        phone: &PhoneNumber,
        user_message: &str,
        bot_response: &str,
        outcome: InteractionOutcome,
        now: DateTime<Utc>,
    ) {
        let entry = NewInteraction {
            phone: phone.clone(),
            user_message: user_message.to_owned(),
            bot_response: bot_response.to_owned(),
            outcome,
            created_at: now,
        };
        if let Err(error) = self.stores.log.append(entry).await {
            warn!(event_name = "pipeline.log_append_failed", error = %error);
        }
    }
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::PipelineSettings;
    use clinibook_core::config::AppConfig;

    #[test]
    fn oversized_lease_is_capped_at_a_day() {
        let mut scheduling = AppConfig::default().scheduling;
        scheduling.lock_stale_secs = u64::MAX;

        let settings = PipelineSettings::from_config(&scheduling);

        assert_eq!(settings.lock_stale_after, chrono::Duration::days(1));
    }
}
