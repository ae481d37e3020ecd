use sqlx::{sqlite::SqliteRow, Row};

use clinibook_core::domain::interaction::{InteractionLog, InteractionOutcome, NewInteraction};
use clinibook_core::domain::session::PhoneNumber;

use super::{parse_timestamp, InteractionLogRepository, RepositoryError};
use crate::DbPool;

pub struct SqlInteractionLogRepository {
    pool: DbPool,
}

impl SqlInteractionLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl InteractionLogRepository for SqlInteractionLogRepository {
    async fn append(&self, entry: NewInteraction) -> Result<i64, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO interaction_log (phone, user_message, bot_response, outcome, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(entry.phone.as_str())
        .bind(&entry.user_message)
        .bind(&entry.bot_response)
        .bind(entry.outcome.as_str())
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn list_for_phone(&self, phone: &PhoneNumber, limit: u32) -> Result<Vec<InteractionLog>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, phone, user_message, bot_response, outcome, created_at
             FROM interaction_log
             WHERE phone = ?
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(phone.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut entries = rows.into_iter().map(interaction_from_row).collect::<Result<Vec<_>, _>>()?;
        entries.reverse();
        Ok(entries)
    }
}

fn interaction_from_row(row: SqliteRow) -> Result<InteractionLog, RepositoryError> {
    let outcome_raw = row.try_get::<String, _>("outcome")?;
    let outcome = InteractionOutcome::parse(&outcome_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown interaction outcome `{outcome_raw}`")))?;

    Ok(InteractionLog {
        id: row.try_get("id")?,
        phone: PhoneNumber(row.try_get("phone")?),
        user_message: row.try_get("user_message")?,
        bot_response: row.try_get("bot_response")?,
        outcome,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
