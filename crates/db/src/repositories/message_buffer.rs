use chrono::{DateTime, Duration, Utc};
use sqlx::Row;

use clinibook_core::domain::session::PhoneNumber;

use super::{MessageBufferRepository, RepositoryError, DELIVERY_MEMORY_MS};
use crate::DbPool;

pub struct SqlMessageBufferRepository {
    pool: DbPool,
}

impl SqlMessageBufferRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MessageBufferRepository for SqlMessageBufferRepository {
    async fn push(
        &self,
        phone: &PhoneNumber,
        fragment: &str,
        received_at: DateTime<Utc>,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO message_buffer (phone, fragment, received_at_ms, sent_at_ms)
             VALUES (?, ?, ?, ?)
             ON CONFLICT DO NOTHING",
        )
        .bind(phone.as_str())
        .bind(fragment)
        .bind(received_at.timestamp_millis())
        .bind(sent_at.map(|at| at.timestamp_millis()))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn is_quiet(&self, phone: &PhoneNumber, now: DateTime<Utc>, quiet: Duration) -> Result<bool, RepositoryError> {
        Ok(self.newest_pending(phone).await?.is_some_and(|(_, newest_ms)| is_quiet_at(newest_ms, now, quiet)))
    }

    async fn drain_if_quiet(
        &self,
        phone: &PhoneNumber,
        now: DateTime<Utc>,
        quiet: Duration,
    ) -> Result<Option<String>, RepositoryError> {
        let Some((max_id, newest_ms)) = self.newest_pending(phone).await? else {
            return Ok(None);
        };
        if !is_quiet_at(newest_ms, now, quiet) {
            return Ok(None);
        }

        // Bounded by `max_id` so a fragment landing now stays for the next turn.
        let mut drained = sqlx::query(
            "UPDATE message_buffer SET consumed_at_ms = ?
             WHERE phone = ? AND id <= ? AND consumed_at_ms IS NULL
             RETURNING id, fragment",
        )
        .bind(now.timestamp_millis())
        .bind(phone.as_str())
        .bind(max_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| Ok((row.try_get::<i64, _>("id")?, row.try_get::<String, _>("fragment")?)))
        .collect::<Result<Vec<_>, sqlx::Error>>()?;

        sqlx::query("DELETE FROM message_buffer WHERE phone = ? AND consumed_at_ms < ?")
            .bind(phone.as_str())
            .bind(now.timestamp_millis() - DELIVERY_MEMORY_MS)
            .execute(&self.pool)
            .await?;

        if drained.is_empty() {
            return Ok(None);
        }
        drained.sort_by_key(|(id, _)| *id);
        Ok(Some(join_fragments(drained.into_iter().map(|(_, fragment)| fragment))))
    }

    async fn pending(&self, phone: &PhoneNumber) -> Result<usize, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM message_buffer WHERE phone = ? AND consumed_at_ms IS NULL")
                .bind(phone.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

impl SqlMessageBufferRepository {
    /// `(max id, newest received_at_ms)` over the pending fragments.
    async fn newest_pending(&self, phone: &PhoneNumber) -> Result<Option<(i64, i64)>, RepositoryError> {
        let row = sqlx::query(
            "SELECT MAX(id) AS max_id, MAX(received_at_ms) AS newest_ms
             FROM message_buffer WHERE phone = ? AND consumed_at_ms IS NULL",
        )
        .bind(phone.as_str())
        .fetch_one(&self.pool)
        .await?;

        let max_id = row.try_get::<Option<i64>, _>("max_id")?;
        let newest_ms = row.try_get::<Option<i64>, _>("newest_ms")?;
        Ok(max_id.zip(newest_ms))
    }
}

pub(crate) fn is_quiet_at(newest_ms: i64, now: DateTime<Utc>, quiet: Duration) -> bool {
    newest_ms <= now.timestamp_millis() - quiet.num_milliseconds()
}

pub(crate) fn join_fragments(fragments: impl Iterator<Item = String>) -> String {
    fragments
        .map(|fragment| fragment.trim().to_owned())
        .filter(|fragment| !fragment.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use clinibook_core::domain::session::PhoneNumber;

    use super::SqlMessageBufferRepository;
    use crate::repositories::test_support::setup_pool;
    use crate::repositories::MessageBufferRepository;

    #[tokio::test]
    async fn fragments_drain_together_once_the_sender_goes_quiet() {
        let pool = setup_pool().await;
        let repo = SqlMessageBufferRepository::new(pool.clone());
        let phone = PhoneNumber("+34600111222".to_owned());
        let start = Utc.with_ymd_and_hms(2026, 7, 20, 9, 0, 0).single().expect("instant");
        let quiet = Duration::milliseconds(1_000);

        repo.push(&phone, "hola", start, None).await.expect("push");
        repo.push(&phone, "quiero cita", start + Duration::milliseconds(300), None).await.expect("push");
        repo.push(&phone, "para limpieza", start + Duration::milliseconds(600), None).await.expect("push");

        let early = repo
            .drain_if_quiet(&phone, start + Duration::milliseconds(900), quiet)
            .await
            .expect("drain early");
        assert!(early.is_none());
        assert_eq!(repo.pending(&phone).await.expect("pending"), 3);

        let drained = repo
            .drain_if_quiet(&phone, start + Duration::milliseconds(1_600), quiet)
            .await
            .expect("drain");
        assert_eq!(drained.as_deref(), Some("hola quiero cita para limpieza"));
        assert_eq!(repo.pending(&phone).await.expect("pending"), 0);

        let again = repo
            .drain_if_quiet(&phone, start + Duration::milliseconds(5_000), quiet)
            .await
            .expect("drain empty");
        assert!(again.is_none());
        pool.close().await;
    }

    #[tokio::test]
    async fn redelivered_fragment_is_ignored_before_and_after_draining() {
        let pool = setup_pool().await;
        let repo = SqlMessageBufferRepository::new(pool.clone());
        let phone = PhoneNumber("+34600111222".to_owned());
        let sent = Utc.with_ymd_and_hms(2026, 7, 20, 8, 59, 59).single().expect("instant");
        let start = sent + Duration::seconds(1);
        let quiet = Duration::milliseconds(1_000);

        assert!(repo.push(&phone, "Ana", start, Some(sent)).await.expect("push"));
        assert!(!repo.push(&phone, "Ana", start + Duration::milliseconds(200), Some(sent)).await.expect("retry"));
        assert!(!repo.is_quiet(&phone, start + Duration::milliseconds(500), quiet).await.expect("quiet"));
        assert!(repo.is_quiet(&phone, start + Duration::milliseconds(1_000), quiet).await.expect("quiet"));

        let drained = repo.drain_if_quiet(&phone, start + Duration::seconds(2), quiet).await.expect("drain");
        assert_eq!(drained.as_deref(), Some("Ana"));

        assert!(!repo.push(&phone, "Ana", start + Duration::seconds(30), Some(sent)).await.expect("late retry"));
        assert_eq!(repo.pending(&phone).await.expect("pending"), 0);
        assert!(repo.push(&phone, "Ana", start + Duration::seconds(31), None).await.expect("unstamped"));
        pool.close().await;
    }
}
