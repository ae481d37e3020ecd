pub mod blocked;
pub mod config;
pub mod doctor;
pub mod handoff;
pub mod log;
pub mod migrate;
pub mod slots;

use std::future::Future;

use chrono::NaiveDate;
use clinibook_core::config::{AppConfig, DatabaseConfig, LoadOptions};
use clinibook_core::domain::session::PhoneNumber;
use clinibook_db::{connect_with_settings, migrations, DbPool};
use serde::Serialize;
use serde_json::Value;

/// `(error_class, message, exit_code)`
pub(crate) type Failure = (&'static str, String, u8);

pub(crate) const EXIT_CONFIG: u8 = 2;
pub(crate) const EXIT_RUNTIME: u8 = 3;
pub(crate) const EXIT_DB_CONNECT: u8 = 4;
pub(crate) const EXIT_MIGRATION: u8 = 5;
pub(crate) const EXIT_INVALID_INPUT: u8 = 6;
pub(crate) const EXIT_OPERATION: u8 = 7;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with(command, message, None)
    }

    pub fn success_with(command: &str, message: impl Into<String>, data: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(command: &str, error_class: &str, message: impl Into<String>, exit_code: u8) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub(crate) fn from_failure(command: &str, (error_class, message, exit_code): Failure) -> Self {
        Self::failure(command, error_class, message, exit_code)
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

pub(crate) fn load_config() -> Result<AppConfig, Failure> {
    AppConfig::load(LoadOptions::default())
        .map_err(|error| ("config_validation", format!("configuration issue: {error}"), EXIT_CONFIG))
}

pub(crate) fn parse_iso_date(raw: &str) -> Result<NaiveDate, Failure> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ("invalid_input", format!("`{raw}` is not a YYYY-MM-DD date"), EXIT_INVALID_INPUT))
}

pub(crate) fn parse_phone(raw: &str) -> Result<PhoneNumber, Failure> {
    PhoneNumber::parse(raw).map_err(|error| ("invalid_input", error.to_string(), EXIT_INVALID_INPUT))
}

/// Runs `task` on a migrated pool inside a single-threaded runtime.
pub(crate) fn with_database<T, F, Fut>(database: &DatabaseConfig, task: F) -> Result<T, Failure>
where
    F: FnOnce(DbPool) -> Fut,
    Fut: Future<Output = Result<T, Failure>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        ("runtime_init", format!("failed to initialize async runtime: {error}"), EXIT_RUNTIME)
    })?;

    runtime.block_on(async {
        let pool = connect_with_settings(&database.url, database.max_connections, database.timeout_secs)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DB_CONNECT))?;
        migrations::run_pending(&pool).await.map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;
        let result = task(pool.clone()).await;
        pool.close().await;
        result
    })
}

pub(crate) fn storage(error: impl std::fmt::Display) -> Failure {
    ("storage", error.to_string(), EXIT_OPERATION)
}
