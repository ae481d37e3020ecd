use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use clinibook_core::clock::Clock;
use clinibook_core::domain::session::PhoneNumber;
use clinibook_db::repositories::{MessageBufferRepository, RepositoryError};

/// What a delivery found after waiting out the quiet window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Submission {
    /// The same delivery was buffered before; nothing new to do.
    Duplicate,
    /// A newer fragment arrived; its delivery owns the turn.
    Superseded,
    /// This delivery's fragment is the newest and the window has passed.
    Quiet,
}

/// Merges rapid fragments from one phone into a single turn.
///
/// Every delivery buffers its fragment and waits out the quiet window. Only
/// the delivery whose fragment was the newest finds the buffer quiet. The
/// text itself is taken with [`Debouncer::drain`], under the conversation
/// lock, so text left behind by a deferred turn keeps its place.
pub struct Debouncer {
    buffer: Arc<dyn MessageBufferRepository>,
    clock: Arc<dyn Clock>,
    window: Duration,
}

impl Debouncer {
    pub fn new(buffer: Arc<dyn MessageBufferRepository>, clock: Arc<dyn Clock>, window: Duration) -> Self {
        Self { buffer, clock, window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub async fn submit(
        &self,
        phone: &PhoneNumber,
        fragment: &str,
        received_at: DateTime<Utc>,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<Submission, RepositoryError> {
        if !self.buffer.push(phone, fragment, received_at, sent_at).await? {
            return Ok(Submission::Duplicate);
        }
        if !self.window.is_zero() {
            tokio::time::sleep(self.window).await;
        }
        Ok(if self.is_quiet(phone).await? { Submission::Quiet } else { Submission::Superseded })
    }

    pub async fn is_quiet(&self, phone: &PhoneNumber) -> Result<bool, RepositoryError> {
        self.buffer.is_quiet(phone, self.clock.now(), self.quiet()).await
    }

    /// Takes the merged text if the buffer is still quiet.
    pub async fn drain(&self, phone: &PhoneNumber) -> Result<Option<String>, RepositoryError> {
        self.buffer.drain_if_quiet(phone, self.clock.now(), self.quiet()).await
    }

    fn quiet(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.window).unwrap_or(chrono::Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use clinibook_core::clock::{Clock, SystemClock};
    use clinibook_core::domain::session::PhoneNumber;
    use clinibook_db::repositories::{InMemoryMessageBufferRepository, MessageBufferRepository};

    use super::{Debouncer, Submission};

    #[tokio::test]
    async fn fragments_300ms_apart_become_one_turn() {
        let buffer = Arc::new(InMemoryMessageBufferRepository::default());
        let debouncer =
            Arc::new(Debouncer::new(buffer.clone(), Arc::new(SystemClock), Duration::from_millis(1_000)));
        let phone = PhoneNumber("+34600111222".to_owned());

        let first = {
            let debouncer = Arc::clone(&debouncer);
            let phone = phone.clone();
            tokio::spawn(async move { debouncer.submit(&phone, "hola", SystemClock.now(), None).await })
        };
        tokio::time::sleep(Duration::from_millis(300)).await;
        let second = {
            let debouncer = Arc::clone(&debouncer);
            let phone = phone.clone();
            tokio::spawn(async move { debouncer.submit(&phone, "quiero una cita", SystemClock.now(), None).await })
        };

        let first = first.await.expect("join").expect("submit");
        let second = second.await.expect("join").expect("submit");

        assert_eq!(first, Submission::Superseded);
        assert_eq!(second, Submission::Quiet);
        assert_eq!(debouncer.drain(&phone).await.expect("drain").as_deref(), Some("hola quiero una cita"));
        assert_eq!(buffer.pending(&phone).await.expect("pending"), 0);
    }

    #[tokio::test]
    async fn zero_window_passes_single_messages_straight_through() {
        let buffer = Arc::new(InMemoryMessageBufferRepository::default());
        let debouncer = Debouncer::new(buffer, Arc::new(SystemClock), Duration::ZERO);
        let phone = PhoneNumber("+34600111222".to_owned());

        let submission = debouncer.submit(&phone, "hola", SystemClock.now(), None).await.expect("submit");
        assert_eq!(submission, Submission::Quiet);
        assert_eq!(debouncer.drain(&phone).await.expect("drain").as_deref(), Some("hola"));
    }

    #[tokio::test]
    async fn redelivery_is_reported_without_waiting() {
        let buffer = Arc::new(InMemoryMessageBufferRepository::default());
        let debouncer = Debouncer::new(buffer, Arc::new(SystemClock), Duration::from_secs(60));
        let phone = PhoneNumber("+34600111222".to_owned());
        let sent = SystemClock.now();

        assert!(debouncer.buffer.push(&phone, "Ana", sent, Some(sent)).await.expect("push"));
        let retry = tokio::time::timeout(
            Duration::from_secs(1),
            debouncer.submit(&phone, "Ana", SystemClock.now(), Some(sent)),
        )
        .await
        .expect("duplicates return at once")
        .expect("submit");

        assert_eq!(retry, Submission::Duplicate);
    }
}
