use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use clinibook_core::config::{AppConfig, DEFAULT_CONFIG_FILES};
use secrecy::SecretString;
use serde::Serialize;
use serde_json::json;
use toml::Value;

use crate::commands::{load_config, CommandResult};

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

/// Effective configuration with the layer each value came from. Secrets are
/// reported only as set or unset.
pub fn run() -> CommandResult {
    let config = match load_config() {
        Ok(config) => config,
        Err(failure) => return CommandResult::from_failure("config", failure),
    };

    let file_path = detect_config_path();
    let file_doc = file_path.as_deref().and_then(load_config_file_doc);
    let entries = effective_values(&config)
        .into_iter()
        .map(|(key, value)| {
            let source = field_source(key, file_doc.as_ref(), file_path.as_deref());
            ConfigEntry { key, value, source }
        })
        .collect::<Vec<_>>();

    CommandResult::success_with(
        "config",
        "effective config (source precedence: env > file > default)",
        Some(json!({ "entries": entries })),
    )
}

fn effective_values(config: &AppConfig) -> Vec<(&'static str, String)> {
    let scheduling = &config.scheduling;
    vec![
        ("database.url", config.database.url.clone()),
        ("database.max_connections", config.database.max_connections.to_string()),
        ("database.timeout_secs", config.database.timeout_secs.to_string()),
        ("clinic.name", config.clinic.name.clone()),
        ("clinic.timezone", config.clinic.timezone.clone()),
        ("scheduling.slot_granularity_minutes", scheduling.slot_granularity_minutes.to_string()),
        ("scheduling.debounce_ms", scheduling.debounce_ms.to_string()),
        ("scheduling.lock_stale_secs", scheduling.lock_stale_secs.to_string()),
        ("scheduling.lock_wait_ms", scheduling.lock_wait_ms.to_string()),
        ("scheduling.max_failed_attempts", scheduling.max_failed_attempts.to_string()),
        ("scheduling.max_offered_slots", scheduling.max_offered_slots.to_string()),
        ("calendar.enabled", config.calendar.enabled.to_string()),
        ("calendar.base_url", unset_or(config.calendar.base_url.as_deref())),
        ("calendar.calendar_id", unset_or(config.calendar.calendar_id.as_deref())),
        ("calendar.api_key", redact(config.calendar.api_key.as_ref())),
        ("messaging.enabled", config.messaging.enabled.to_string()),
        ("messaging.base_url", unset_or(config.messaging.base_url.as_deref())),
        ("messaging.api_token", redact(config.messaging.api_token.as_ref())),
        ("messaging.webhook_secret", redact(config.messaging.webhook_secret.as_ref())),
        ("server.bind_address", config.server.bind_address.clone()),
        ("server.port", config.server.port.to_string()),
        ("server.graceful_shutdown_secs", config.server.graceful_shutdown_secs.to_string()),
        ("logging.level", config.logging.level.clone()),
        ("logging.format", format!("{:?}", config.logging.format).to_lowercase()),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    DEFAULT_CONFIG_FILES.iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: &Path) -> Option<Value> {
    fs::read_to_string(path).ok()?.parse::<Value>().ok()
}

/// `database.url` is read from `CLINIBOOK_DATABASE_URL`, and so on.
fn env_keys(key_path: &str) -> Vec<String> {
    match key_path {
        "calendar.calendar_id" => vec!["CLINIBOOK_CALENDAR_ID".to_string()],
        "logging.level" => vec!["CLINIBOOK_LOGGING_LEVEL".to_string(), "CLINIBOOK_LOG_LEVEL".to_string()],
        "logging.format" => vec!["CLINIBOOK_LOGGING_FORMAT".to_string(), "CLINIBOOK_LOG_FORMAT".to_string()],
        _ => vec![format!("CLINIBOOK_{}", key_path.replace('.', "_").to_uppercase())],
    }
}

fn field_source(key_path: &str, file_doc: Option<&Value>, file_path: Option<&Path>) -> String {
    if let Some(env_key) = env_keys(key_path).into_iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = file_doc {
        if contains_path(doc, key_path) {
            let file_path =
                file_path.map(|path| path.display().to_string()).unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn unset_or(value: Option<&str>) -> String {
    value.unwrap_or("<unset>").to_string()
}

fn redact(secret: Option<&SecretString>) -> String {
    if secret.is_some() { "<redacted>" } else { "<unset>" }.to_string()
}
