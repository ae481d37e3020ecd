use chrono::{DateTime, Duration, Utc};

use clinibook_core::domain::session::PhoneNumber;

use super::{ConversationLockRepository, RepositoryError};
use crate::DbPool;

/// Proof of holding the per-phone conversation lock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockLease {
    pub phone: PhoneNumber,
    pub token: String,
    /// The previous holder had gone stale and was evicted.
    pub reclaimed: bool,
}

pub struct SqlConversationLockRepository {
    pool: DbPool,
}

impl SqlConversationLockRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ConversationLockRepository for SqlConversationLockRepository {
    async fn try_acquire(
        &self,
        phone: &PhoneNumber,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> Result<Option<LockLease>, RepositoryError> {
        let token = uuid::Uuid::new_v4().to_string();
        let now_ms = now.timestamp_millis();
        let cutoff_ms = now_ms - stale_after.num_milliseconds();

        // Evicting a stale holder and inserting run in one write
        // transaction, so `reclaimed` names the lease this call replaced.
        let mut tx = self.pool.begin().await?;
        let evicted: Option<String> = sqlx::query_scalar(
            "DELETE FROM conversation_lock WHERE phone = ? AND acquired_at_ms <= ? RETURNING token",
        )
        .bind(phone.as_str())
        .bind(cutoff_ms)
        .fetch_optional(&mut *tx)
        .await?;

        let result = sqlx::query(
            "INSERT INTO conversation_lock (phone, token, acquired_at_ms) VALUES (?, ?, ?)
             ON CONFLICT(phone) DO NOTHING",
        )
        .bind(phone.as_str())
        .bind(&token)
        .bind(now_ms)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(LockLease { phone: phone.clone(), token, reclaimed: evicted.is_some() }))
    }

    async fn release(&self, lease: &LockLease) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM conversation_lock WHERE phone = ? AND token = ?")
            .bind(lease.phone.as_str())
            .bind(&lease.token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
