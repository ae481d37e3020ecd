use std::sync::Arc;
use std::time::Duration;

use clinibook_agent::{
    AvailabilityService, Debouncer, GuardrailPolicy, KeywordClassifier, Orchestrator, OrchestratorSettings,
    PipelineSettings, PipelineStores, TracingAuditSink, TurnPipeline,
};
use clinibook_core::clock::SystemClock;
use clinibook_core::config::{AppConfig, ConfigError};
use clinibook_core::domain::treatment::TreatmentCatalog;
use clinibook_db::repositories::{
    SqlAppointmentRepository, SqlBlockedDateRepository, SqlConversationLockRepository, SqlHandoffRepository,
    SqlInteractionLogRepository, SqlMessageBufferRepository, SqlSessionRepository,
};
use clinibook_db::{connect_with_settings, migrations, DbPool};
use clinibook_gateway::{
    BusyTimeSource, HttpCalendarClient, HttpMessageGateway, MessageGateway, NoopBusyTimeSource, NoopMessageGateway,
    TransportError,
};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub pipeline: Arc<TurnPipeline>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("adapter setup failed: {0}")]
    Adapter(#[from] TransportError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", correlation_id = "bootstrap", "starting application bootstrap");

    let db_pool =
        connect_with_settings(&config.database.url, config.database.max_connections, config.database.timeout_secs)
            .await
            .map_err(BootstrapError::DatabaseConnect)?;
    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.database_ready", correlation_id = "bootstrap", "database migrated");

    let gateway: Arc<dyn MessageGateway> = if config.messaging.enabled {
        Arc::new(HttpMessageGateway::from_config(&config.messaging)?)
    } else {
        Arc::new(NoopMessageGateway)
    };
    let pipeline = build_pipeline(&config, db_pool.clone(), gateway)?;

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        clinic = %config.clinic.name,
        timezone = %config.clinic.timezone,
        calendar = config.calendar.enabled,
        messaging = config.messaging.enabled,
        "application bootstrap complete"
    );
    Ok(Application { config, db_pool, pipeline: Arc::new(pipeline) })
}

/// Wires the SQLite stores and adapters into a turn pipeline.
pub fn build_pipeline(
    config: &AppConfig,
    db_pool: DbPool,
    gateway: Arc<dyn MessageGateway>,
) -> Result<TurnPipeline, BootstrapError> {
    let civil = config.clinic.civil_clock()?;
    let clock = Arc::new(SystemClock);

    let busy: Arc<dyn BusyTimeSource> = if config.calendar.enabled {
        Arc::new(HttpCalendarClient::from_config(&config.calendar, civil)?)
    } else {
        Arc::new(NoopBusyTimeSource)
    };
    let appointments = Arc::new(SqlAppointmentRepository::new(db_pool.clone()));
    let catalog = TreatmentCatalog::default();

    let availability = AvailabilityService::new(
        appointments.clone(),
        Arc::new(SqlBlockedDateRepository::new(db_pool.clone())),
        busy,
        config.clinic.hours.clone(),
        config.scheduling.slot_granularity_minutes,
    );
    let orchestrator = Orchestrator::new(
        Arc::new(KeywordClassifier::new(catalog.clone())),
        availability,
        appointments,
        catalog,
        GuardrailPolicy::new(config.scheduling.max_failed_attempts),
        Arc::new(TracingAuditSink),
        OrchestratorSettings {
            clinic_name: config.clinic.name.clone(),
            max_offered_slots: config.scheduling.max_offered_slots,
        },
    );
    let debouncer = Debouncer::new(
        Arc::new(SqlMessageBufferRepository::new(db_pool.clone())),
        clock.clone(),
        Duration::from_millis(config.scheduling.debounce_ms),
    );
    let stores = PipelineStores {
        sessions: Arc::new(SqlSessionRepository::new(db_pool.clone())),
        handoffs: Arc::new(SqlHandoffRepository::new(db_pool.clone())),
        locks: Arc::new(SqlConversationLockRepository::new(db_pool.clone())),
        log: Arc::new(SqlInteractionLogRepository::new(db_pool)),
    };

    Ok(TurnPipeline::new(
        debouncer,
        stores,
        gateway,
        orchestrator,
        clock,
        civil,
        PipelineSettings::from_config(&config.scheduling),
    ))
}

#[cfg(test)]
mod tests {
    use clinibook_core::config::{AppConfig, ConfigOverrides, LoadOptions};

    use crate::bootstrap::{bootstrap_with_config, Application, BootstrapError};

    fn memory_options() -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:?cache=shared".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
        bootstrap_with_config(AppConfig::load(options)?).await
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations() {
        let app = bootstrap(memory_options()).await.expect("bootstrap with defaults");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('appointment', 'blocked_date', 'conversation_session', 'handoff')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("table count");
        assert_eq!(table_count, 4);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn enabled_calendar_without_credentials_fails_fast() {
        let mut options = memory_options();
        options.overrides.calendar_enabled = Some(true);

        let error = bootstrap(options).await.err().expect("calendar credentials are required");
        assert!(error.to_string().contains("calendar"));
    }
}
