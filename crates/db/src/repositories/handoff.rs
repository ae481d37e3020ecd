use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use clinibook_core::domain::interaction::Handoff;
use clinibook_core::domain::session::PhoneNumber;

use super::{parse_timestamp, HandoffRepository, RepositoryError};
use crate::DbPool;

pub struct SqlHandoffRepository {
    pool: DbPool,
}

impl SqlHandoffRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl HandoffRepository for SqlHandoffRepository {
    async fn set(&self, phone: &PhoneNumber, reason: &str, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO handoff (phone, reason, created_at) VALUES (?, ?, ?)
             ON CONFLICT(phone) DO UPDATE SET reason = excluded.reason",
        )
        .bind(phone.as_str())
        .bind(reason)
        .bind(at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear(&self, phone: &PhoneNumber) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM handoff WHERE phone = ?")
            .bind(phone.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find(&self, phone: &PhoneNumber) -> Result<Option<Handoff>, RepositoryError> {
        let row = sqlx::query("SELECT phone, reason, created_at FROM handoff WHERE phone = ?")
            .bind(phone.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(handoff_from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<Handoff>, RepositoryError> {
        let rows = sqlx::query("SELECT phone, reason, created_at FROM handoff ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(handoff_from_row).collect()
    }
}

fn handoff_from_row(row: SqliteRow) -> Result<Handoff, RepositoryError> {
    Ok(Handoff {
        phone: PhoneNumber(row.try_get("phone")?),
        reason: row.try_get("reason")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
