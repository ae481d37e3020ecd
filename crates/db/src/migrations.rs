use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Migrations already applied to `pool`, by version.
pub async fn applied_versions(pool: &DbPool) -> Result<Vec<i64>, sqlx::Error> {
    let exists: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;
    if exists == 0 {
        return Ok(Vec::new());
    }

    sqlx::query_scalar("SELECT version FROM _sqlx_migrations WHERE success = 1 ORDER BY version")
        .fetch_all(pool)
        .await
}

pub fn known_versions() -> Vec<i64> {
    MIGRATOR
        .iter()
        .filter(|migration| migration.migration_type.is_up_migration())
        .map(|migration| migration.version)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{applied_versions, known_versions, run_pending, MIGRATOR};
    use crate::{connect_with_settings, DbPool};

    const SCHEMA: &[&str] = &[
        "appointment",
        "blocked_date",
        "conversation_session",
        "handoff",
        "conversation_lock",
        "message_buffer",
        "interaction_log",
        "idx_appointment_live_slot",
        "idx_appointment_date_status",
        "idx_appointment_patient_phone",
        "idx_message_buffer_phone",
        "idx_message_buffer_delivery",
        "idx_interaction_log_phone",
    ];

    async fn fresh_pool() -> DbPool {
        connect_with_settings("sqlite::memory:", 1, 30).await.expect("in-memory pool")
    }

    /// `(name, type, sql)` of every clinibook table and index, sorted.
    async fn schema_objects(pool: &DbPool) -> Vec<(String, String, String)> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT name, type, IFNULL(sql, '') FROM sqlite_master \
             WHERE type IN ('table', 'index') ORDER BY name",
        )
        .fetch_all(pool)
        .await
        .expect("sqlite_master");
        rows.into_iter().filter(|(name, _, _)| SCHEMA.contains(&name.as_str())).collect()
    }

    #[tokio::test]
    async fn fresh_database_gets_every_table_and_index() {
        let pool = fresh_pool().await;
        assert!(applied_versions(&pool).await.expect("versions before").is_empty());

        run_pending(&pool).await.expect("migrate");

        let objects = schema_objects(&pool).await;
        for expected in SCHEMA {
            assert!(objects.iter().any(|(name, _, _)| name == expected), "`{expected}` was not created");
        }
        assert_eq!(applied_versions(&pool).await.expect("versions after"), known_versions());
    }

    #[tokio::test]
    async fn one_live_appointment_per_slot_is_enforced_by_index() {
        let pool = fresh_pool().await;
        run_pending(&pool).await.expect("migrate");

        let (sql,): (String,) = sqlx::query_as(
            "SELECT sql FROM sqlite_master WHERE type = 'index' AND name = 'idx_appointment_live_slot'",
        )
        .fetch_one(&pool)
        .await
        .expect("index definition");

        assert!(sql.contains("UNIQUE"));
        assert!(sql.contains("status != 'cancelled'"));
    }

    #[tokio::test]
    async fn rolling_back_and_reapplying_restores_the_same_schema() {
        let pool = fresh_pool().await;
        run_pending(&pool).await.expect("migrate");
        let before = schema_objects(&pool).await;

        MIGRATOR.undo(&pool, 0).await.expect("undo");
        assert!(schema_objects(&pool).await.is_empty());

        run_pending(&pool).await.expect("migrate again");
        assert_eq!(schema_objects(&pool).await, before);
    }

    #[tokio::test]
    async fn rerunning_is_a_no_op() {
        let pool = fresh_pool().await;
        run_pending(&pool).await.expect("migrate");
        run_pending(&pool).await.expect("second run");

        assert_eq!(applied_versions(&pool).await.expect("versions").len(), known_versions().len());
    }
}
