use chrono::{NaiveDate, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use clinibook_core::domain::appointment::BlockedDate;

use super::{format_date, parse_date, BlockedDateRepository, RepositoryError};
use crate::DbPool;

pub struct SqlBlockedDateRepository {
    pool: DbPool,
}

impl SqlBlockedDateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl BlockedDateRepository for SqlBlockedDateRepository {
    async fn block(&self, date: NaiveDate, reason: &str) -> Result<bool, RepositoryError> {
        let key = format_date(date);
        let existed: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blocked_date WHERE date = ?")
            .bind(&key)
            .fetch_one(&self.pool)
            .await?;

        sqlx::query(
            "INSERT INTO blocked_date (date, reason, created_at) VALUES (?, ?, ?)
             ON CONFLICT(date) DO UPDATE SET reason = excluded.reason",
        )
        .bind(&key)
        .bind(reason.trim())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(existed == 0)
    }

    async fn unblock(&self, date: NaiveDate) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM blocked_date WHERE date = ?")
            .bind(format_date(date))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn is_blocked(&self, date: NaiveDate) -> Result<bool, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blocked_date WHERE date = ?")
            .bind(format_date(date))
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn list(&self, from: Option<NaiveDate>) -> Result<Vec<BlockedDate>, RepositoryError> {
        // ISO dates sort lexically, so the text comparison is chronological.
        let rows = sqlx::query(
            "SELECT date, reason FROM blocked_date
             WHERE ?1 IS NULL OR date >= ?1
             ORDER BY date ASC",
        )
        .bind(from.map(format_date))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(blocked_date_from_row).collect()
    }
}

fn blocked_date_from_row(row: SqliteRow) -> Result<BlockedDate, RepositoryError> {
    Ok(BlockedDate { date: parse_date("date", row.try_get("date")?)?, reason: row.try_get("reason")? })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::SqlBlockedDateRepository;
    use crate::repositories::test_support::setup_pool;
    use crate::repositories::BlockedDateRepository;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 12, d).expect("date")
    }

    #[tokio::test]
    async fn block_is_idempotent_and_updates_reason() {
        let pool = setup_pool().await;
        let repo = SqlBlockedDateRepository::new(pool.clone());

        assert!(repo.block(day(24), "Nochebuena").await.expect("block"));
        assert!(!repo.block(day(24), "Cierre").await.expect("block again"));

        let listed = repo.list(None).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].reason, "Cierre");
        assert!(repo.is_blocked(day(24)).await.expect("check"));
        pool.close().await;
    }

    #[tokio::test]
    async fn list_filters_from_date_and_unblock_removes() {
        let pool = setup_pool().await;
        let repo = SqlBlockedDateRepository::new(pool.clone());
        for d in [8, 24, 31] {
            repo.block(day(d), "festivo").await.expect("block");
        }

        let upcoming = repo.list(Some(day(24))).await.expect("list");
        assert_eq!(upcoming.iter().map(|b| b.date).collect::<Vec<_>>(), vec![day(24), day(31)]);

        assert!(repo.unblock(day(24)).await.expect("unblock"));
        assert!(!repo.unblock(day(24)).await.expect("unblock twice"));
        assert!(!repo.is_blocked(day(24)).await.expect("check"));
        pool.close().await;
    }
}
