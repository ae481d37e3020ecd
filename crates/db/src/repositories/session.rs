use sqlx::{sqlite::SqliteRow, Row};

use clinibook_core::domain::session::{ConversationSession, PhoneNumber, SessionFacts};
use clinibook_core::flows::ConversationStep;

use super::{parse_timestamp, parse_u32, RepositoryError, SessionRepository};
use crate::DbPool;

pub struct SqlSessionRepository {
    pool: DbPool,
}

impl SqlSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SessionRepository for SqlSessionRepository {
    async fn load(&self, phone: &PhoneNumber) -> Result<Option<ConversationSession>, RepositoryError> {
        let row = sqlx::query(
            "SELECT phone, step, facts_json, failed_attempts, updated_at
             FROM conversation_session WHERE phone = ?",
        )
        .bind(phone.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(session_from_row).transpose()
    }

    async fn save(&self, session: &ConversationSession) -> Result<(), RepositoryError> {
        let facts_json = serde_json::to_string(&session.facts).map_err(|error| {
            RepositoryError::InvalidInput(format!("session facts are not serialisable: {error}"))
        })?;

        sqlx::query(
            "INSERT INTO conversation_session (phone, step, facts_json, failed_attempts, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(phone) DO UPDATE SET
                step = excluded.step,
                facts_json = excluded.facts_json,
                failed_attempts = excluded.failed_attempts,
                updated_at = excluded.updated_at",
        )
        .bind(session.phone.as_str())
        .bind(session.step.as_str())
        .bind(facts_json)
        .bind(i64::from(session.failed_attempts))
        .bind(session.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, phone: &PhoneNumber) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM conversation_session WHERE phone = ?")
            .bind(phone.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn session_from_row(row: SqliteRow) -> Result<ConversationSession, RepositoryError> {
    let step_raw = row.try_get::<String, _>("step")?;
    let step = ConversationStep::parse(&step_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown conversation step `{step_raw}`")))?;
    let facts_raw = row.try_get::<String, _>("facts_json")?;
    let facts = serde_json::from_str::<SessionFacts>(&facts_raw)
        .map_err(|error| RepositoryError::Decode(format!("unreadable session facts: {error}")))?;

    Ok(ConversationSession {
        phone: PhoneNumber(row.try_get("phone")?),
        step,
        facts,
        failed_attempts: parse_u32("failed_attempts", row.try_get("failed_attempts")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
