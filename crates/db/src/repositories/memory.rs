use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tokio::sync::RwLock;

use clinibook_core::domain::appointment::{
    Appointment, AppointmentId, AppointmentStatus, BlockedDate, BookingOutcome, ConflictReason,
    NewAppointment,
};
use clinibook_core::domain::interaction::{Handoff, InteractionLog, NewInteraction};
use clinibook_core::domain::session::{ConversationSession, PhoneNumber};

use super::{
    AppointmentRepository, BlockedDateRepository, ConversationLockRepository, HandoffRepository,
    InteractionLogRepository, LockLease, MessageBufferRepository, RepositoryError,
    SessionRepository, DELIVERY_MEMORY_MS,
};
use super::message_buffer::{is_quiet_at, join_fragments};

#[derive(Clone, Default)]
pub struct InMemoryBlockedDateRepository {
    dates: Arc<RwLock<BTreeMap<NaiveDate, String>>>,
}

#[async_trait::async_trait]
impl BlockedDateRepository for InMemoryBlockedDateRepository {
    async fn block(&self, date: NaiveDate, reason: &str) -> Result<bool, RepositoryError> {
        let mut dates = self.dates.write().await;
        Ok(dates.insert(date, reason.trim().to_owned()).is_none())
    }

    async fn unblock(&self, date: NaiveDate) -> Result<bool, RepositoryError> {
        Ok(self.dates.write().await.remove(&date).is_some())
    }

    async fn is_blocked(&self, date: NaiveDate) -> Result<bool, RepositoryError> {
        Ok(self.dates.read().await.contains_key(&date))
    }

    async fn list(&self, from: Option<NaiveDate>) -> Result<Vec<BlockedDate>, RepositoryError> {
        let dates = self.dates.read().await;
        Ok(dates
            .iter()
            .filter(|(date, _)| from.map_or(true, |from| **date >= from))
            .map(|(date, reason)| BlockedDate { date: *date, reason: reason.clone() })
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryAppointmentRepository {
    appointments: RwLock<Vec<Appointment>>,
    blocked: InMemoryBlockedDateRepository,
}

impl InMemoryAppointmentRepository {
    /// Shares the blocked-date set so bookings honour it.
    pub fn with_blocked_dates(blocked: &InMemoryBlockedDateRepository) -> Self {
        Self { appointments: RwLock::default(), blocked: blocked.clone() }
    }
}

#[async_trait::async_trait]
impl AppointmentRepository for InMemoryAppointmentRepository {
    async fn book(&self, request: NewAppointment) -> Result<BookingOutcome, RepositoryError> {
        let range = request
            .time_range()
            .map_err(|error| RepositoryError::InvalidInput(error.to_string()))?;
        let mut appointments = self.appointments.write().await;

        if self.blocked.is_blocked(request.date).await? {
            return Ok(BookingOutcome::Conflict(ConflictReason::DateBlocked));
        }
        let live = appointments
            .iter()
            .filter(|existing| existing.date == request.date && existing.status.holds_slot());
        let mut reason = None;
        for existing in live {
            if existing.start_time == range.start {
                reason = Some(ConflictReason::SlotTaken);
                break;
            }
            if existing.time_range().is_some_and(|taken| taken.overlaps(&range)) {
                reason = Some(ConflictReason::Overlapping);
            }
        }
        if let Some(reason) = reason {
            return Ok(BookingOutcome::Conflict(reason));
        }

        let id = AppointmentId(appointments.iter().map(|existing| existing.id.0).max().unwrap_or(0) + 1);
        appointments.push(Appointment {
            id,
            patient_name: request.patient_name,
            patient_phone: request.patient_phone,
            treatment: request.treatment,
            date: request.date,
            start_time: range.start,
            duration_minutes: request.duration_minutes,
            status: AppointmentStatus::Scheduled,
            created_at: request.requested_at,
        });
        Ok(BookingOutcome::Booked(id))
    }

    async fn cancel(&self, id: AppointmentId) -> Result<bool, RepositoryError> {
        let mut appointments = self.appointments.write().await;
        Ok(appointments
            .iter_mut()
            .find(|existing| existing.id == id)
            .is_some_and(|existing| existing.transition_to(AppointmentStatus::Cancelled).is_ok()))
    }

    async fn complete(&self, id: AppointmentId) -> Result<bool, RepositoryError> {
        let mut appointments = self.appointments.write().await;
        Ok(appointments
            .iter_mut()
            .find(|existing| existing.id == id)
            .is_some_and(|existing| existing.transition_to(AppointmentStatus::Completed).is_ok()))
    }

    async fn find_by_id(&self, id: AppointmentId) -> Result<Option<Appointment>, RepositoryError> {
        let appointments = self.appointments.read().await;
        Ok(appointments.iter().find(|existing| existing.id == id).cloned())
    }

    async fn list_active_for_date(&self, date: NaiveDate) -> Result<Vec<Appointment>, RepositoryError> {
        let appointments = self.appointments.read().await;
        let mut active = appointments
            .iter()
            .filter(|existing| existing.date == date && existing.status.holds_slot())
            .cloned()
            .collect::<Vec<_>>();
        active.sort_by_key(|existing| existing.start_time);
        Ok(active)
    }

    async fn list_for_phone(&self, phone: &PhoneNumber) -> Result<Vec<Appointment>, RepositoryError> {
        let appointments = self.appointments.read().await;
        let mut owned = appointments
            .iter()
            .filter(|existing| &existing.patient_phone == phone)
            .cloned()
            .collect::<Vec<_>>();
        owned.sort_by_key(|existing| (existing.date, existing.start_time));
        Ok(owned)
    }
}

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<PhoneNumber, ConversationSession>>,
}

#[async_trait::async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn load(&self, phone: &PhoneNumber) -> Result<Option<ConversationSession>, RepositoryError> {
        Ok(self.sessions.read().await.get(phone).cloned())
    }

    async fn save(&self, session: &ConversationSession) -> Result<(), RepositoryError> {
        self.sessions.write().await.insert(session.phone.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, phone: &PhoneNumber) -> Result<bool, RepositoryError> {
        Ok(self.sessions.write().await.remove(phone).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryHandoffRepository {
    handoffs: RwLock<HashMap<PhoneNumber, Handoff>>,
}

#[async_trait::async_trait]
impl HandoffRepository for InMemoryHandoffRepository {
    async fn set(&self, phone: &PhoneNumber, reason: &str, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        let mut handoffs = self.handoffs.write().await;
        handoffs
            .entry(phone.clone())
            .and_modify(|existing| existing.reason = reason.to_owned())
            .or_insert_with(|| Handoff { phone: phone.clone(), reason: reason.to_owned(), created_at: at });
        Ok(())
    }

    async fn clear(&self, phone: &PhoneNumber) -> Result<bool, RepositoryError> {
        Ok(self.handoffs.write().await.remove(phone).is_some())
    }

    async fn find(&self, phone: &PhoneNumber) -> Result<Option<Handoff>, RepositoryError> {
        Ok(self.handoffs.read().await.get(phone).cloned())
    }

    async fn list(&self) -> Result<Vec<Handoff>, RepositoryError> {
        let mut handoffs = self.handoffs.read().await.values().cloned().collect::<Vec<_>>();
        handoffs.sort_by_key(|handoff| handoff.created_at);
        Ok(handoffs)
    }
}

#[derive(Default)]
pub struct InMemoryConversationLockRepository {
    holders: RwLock<HashMap<PhoneNumber, (String, i64)>>,
}

#[async_trait::async_trait]
impl ConversationLockRepository for InMemoryConversationLockRepository {
    async fn try_acquire(
        &self,
        phone: &PhoneNumber,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> Result<Option<LockLease>, RepositoryError> {
        let mut holders = self.holders.write().await;
        let now_ms = now.timestamp_millis();
        let reclaimed = match holders.get(phone) {
            Some((_, acquired_ms)) if *acquired_ms > now_ms - stale_after.num_milliseconds() => {
                return Ok(None);
            }
            Some(_) => true,
            None => false,
        };

        let token = uuid::Uuid::new_v4().to_string();
        holders.insert(phone.clone(), (token.clone(), now_ms));
        Ok(Some(LockLease { phone: phone.clone(), token, reclaimed }))
    }

    async fn release(&self, lease: &LockLease) -> Result<bool, RepositoryError> {
        let mut holders = self.holders.write().await;
        if holders.get(&lease.phone).is_some_and(|(token, _)| token == &lease.token) {
            holders.remove(&lease.phone);
            return Ok(true);
        }
        Ok(false)
    }
}

#[derive(Clone, Debug)]
struct BufferedFragment {
    id: i64,
    phone: PhoneNumber,
    text: String,
    received_at_ms: i64,
    sent_at_ms: Option<i64>,
    consumed_at_ms: Option<i64>,
}

#[derive(Default)]
pub struct InMemoryMessageBufferRepository {
    fragments: RwLock<Vec<BufferedFragment>>,
}

impl InMemoryMessageBufferRepository {
    fn newest_pending(fragments: &[BufferedFragment], phone: &PhoneNumber) -> Option<i64> {
        fragments
            .iter()
            .filter(|fragment| &fragment.phone == phone && fragment.consumed_at_ms.is_none())
            .map(|fragment| fragment.received_at_ms)
            .max()
    }
}

#[async_trait::async_trait]
impl MessageBufferRepository for InMemoryMessageBufferRepository {
    async fn push(
        &self,
        phone: &PhoneNumber,
        fragment: &str,
        received_at: DateTime<Utc>,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<bool, RepositoryError> {
        let mut fragments = self.fragments.write().await;
        let sent_at_ms = sent_at.map(|at| at.timestamp_millis());
        let seen = sent_at_ms.is_some()
            && fragments.iter().any(|existing| {
                &existing.phone == phone && existing.sent_at_ms == sent_at_ms && existing.text == fragment
            });
        if seen {
            return Ok(false);
        }

        let id = fragments.iter().map(|existing| existing.id).max().unwrap_or(0) + 1;
        fragments.push(BufferedFragment {
            id,
            phone: phone.clone(),
            text: fragment.to_owned(),
            received_at_ms: received_at.timestamp_millis(),
            sent_at_ms,
            consumed_at_ms: None,
        });
        Ok(true)
    }

    async fn is_quiet(&self, phone: &PhoneNumber, now: DateTime<Utc>, quiet: Duration) -> Result<bool, RepositoryError> {
        let fragments = self.fragments.read().await;
        Ok(Self::newest_pending(&fragments, phone).is_some_and(|newest_ms| is_quiet_at(newest_ms, now, quiet)))
    }

    async fn drain_if_quiet(
        &self,
        phone: &PhoneNumber,
        now: DateTime<Utc>,
        quiet: Duration,
    ) -> Result<Option<String>, RepositoryError> {
        let mut fragments = self.fragments.write().await;
        let Some(newest_ms) = Self::newest_pending(&fragments, phone) else {
            return Ok(None);
        };
        if !is_quiet_at(newest_ms, now, quiet) {
            return Ok(None);
        }

        let now_ms = now.timestamp_millis();
        let mut drained = Vec::new();
        for fragment in fragments.iter_mut() {
            if &fragment.phone == phone && fragment.consumed_at_ms.is_none() {
                fragment.consumed_at_ms = Some(now_ms);
                drained.push((fragment.id, fragment.text.clone()));
            }
        }
        fragments.retain(|fragment| {
            &fragment.phone != phone
                || fragment.consumed_at_ms.map_or(true, |consumed| consumed >= now_ms - DELIVERY_MEMORY_MS)
        });

        drained.sort_by_key(|(id, _)| *id);
        Ok(Some(join_fragments(drained.into_iter().map(|(_, text)| text))))
    }

    async fn pending(&self, phone: &PhoneNumber) -> Result<usize, RepositoryError> {
        let fragments = self.fragments.read().await;
        Ok(fragments.iter().filter(|fragment| &fragment.phone == phone && fragment.consumed_at_ms.is_none()).count())
    }
}

#[derive(Default)]
pub struct InMemoryInteractionLogRepository {
    entries: RwLock<Vec<InteractionLog>>,
}

impl InMemoryInteractionLogRepository {
    pub async fn all(&self) -> Vec<InteractionLog> {
        self.entries.read().await.clone()
    }
}

#[async_trait::async_trait]
impl InteractionLogRepository for InMemoryInteractionLogRepository {
    async fn append(&self, entry: NewInteraction) -> Result<i64, RepositoryError> {
        let mut entries = self.entries.write().await;
        let id = i64::try_from(entries.len()).unwrap_or(i64::MAX) + 1;
        entries.push(InteractionLog {
            id,
            phone: entry.phone,
            user_message: entry.user_message,
            bot_response: entry.bot_response,
            outcome: entry.outcome,
            created_at: entry.created_at,
        });
        Ok(id)
    }

    async fn list_for_phone(&self, phone: &PhoneNumber, limit: u32) -> Result<Vec<InteractionLog>, RepositoryError> {
        let entries = self.entries.read().await;
        let matching = entries.iter().filter(|entry| &entry.phone == phone).cloned().collect::<Vec<_>>();
        let skip = matching.len().saturating_sub(limit as usize);
        Ok(matching.into_iter().skip(skip).collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc};

    use clinibook_core::domain::appointment::{BookingOutcome, ConflictReason, NewAppointment};
    use clinibook_core::domain::session::PhoneNumber;

    use super::{
        InMemoryAppointmentRepository, InMemoryBlockedDateRepository,
        InMemoryConversationLockRepository, InMemoryMessageBufferRepository,
    };
    use crate::repositories::{
        AppointmentRepository, BlockedDateRepository, ConversationLockRepository,
        MessageBufferRepository,
    };

    fn request(hour: u32, minute: u32) -> NewAppointment {
        NewAppointment {
            patient_name: "Ana".to_owned(),
            patient_phone: PhoneNumber("+34600111222".to_owned()),
            treatment: "revision".to_owned(),
            date: NaiveDate::from_ymd_opt(2026, 7, 21).expect("date"),
            start_time: NaiveTime::from_hms_opt(hour, minute, 0).expect("time"),
            duration_minutes: 30,
            requested_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn in_memory_bookings_follow_the_same_conflict_rules() {
        let blocked = InMemoryBlockedDateRepository::default();
        let repo = InMemoryAppointmentRepository::with_blocked_dates(&blocked);

        let first = repo.book(request(10, 0)).await.expect("book");
        assert!(matches!(first, BookingOutcome::Booked(_)));
        assert_eq!(
            repo.book(request(10, 0)).await.expect("same slot"),
            BookingOutcome::Conflict(ConflictReason::SlotTaken)
        );
        assert_eq!(
            repo.book(request(10, 15)).await.expect("overlap"),
            BookingOutcome::Conflict(ConflictReason::Overlapping)
        );

        let id = first.appointment_id().expect("id");
        assert!(repo.cancel(id).await.expect("cancel"));
        assert!(!repo.cancel(id).await.expect("cancel twice"));

        blocked.block(request(9, 0).date, "inventario").await.expect("block");
        assert_eq!(
            repo.book(request(10, 0)).await.expect("blocked"),
            BookingOutcome::Conflict(ConflictReason::DateBlocked)
        );
    }

    #[tokio::test]
    async fn in_memory_lock_reclaims_after_stale_window() {
        let repo = InMemoryConversationLockRepository::default();
        let phone = PhoneNumber("+34600111222".to_owned());
        let now = Utc.with_ymd_and_hms(2026, 7, 20, 9, 0, 0).single().expect("instant");

        let first = repo.try_acquire(&phone, now, Duration::seconds(30)).await.expect("acquire");
        let first = first.expect("free");
        assert!(repo
            .try_acquire(&phone, now + Duration::seconds(10), Duration::seconds(30))
            .await
            .expect("contended")
            .is_none());
        let second = repo
            .try_acquire(&phone, now + Duration::seconds(30), Duration::seconds(30))
            .await
            .expect("reclaim")
            .expect("stale");
        assert!(second.reclaimed);
        assert!(!repo.release(&first).await.expect("old lease"));
        assert!(repo.release(&second).await.expect("release"));
    }

    #[tokio::test]
    async fn in_memory_buffer_keeps_other_phones_untouched() {
        let repo = InMemoryMessageBufferRepository::default();
        let ana = PhoneNumber("+34600111222".to_owned());
        let luis = PhoneNumber("+34600333444".to_owned());
        let at = Utc.with_ymd_and_hms(2026, 7, 20, 9, 0, 0).single().expect("instant");

        repo.push(&ana, "hola", at, None).await.expect("push");
        repo.push(&luis, "buenas", at, None).await.expect("push");
        repo.push(&ana, "  ", at, None).await.expect("push");
        repo.push(&ana, "soy Ana", at, Some(at)).await.expect("push");

        let drained = repo
            .drain_if_quiet(&ana, at + Duration::seconds(2), Duration::seconds(1))
            .await
            .expect("drain");
        assert_eq!(drained.as_deref(), Some("hola soy Ana"));
        assert_eq!(repo.pending(&luis).await.expect("pending"), 1);
        assert_eq!(repo.pending(&ana).await.expect("pending"), 0);
        assert!(!repo.push(&ana, "soy Ana", at + Duration::seconds(3), Some(at)).await.expect("redelivery"));
    }
}
