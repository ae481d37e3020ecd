use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::CivilClock;
use crate::schedule::{parse_clock_time, BusinessHours, DaySchedule, TimeRange};

pub const DEFAULT_CONFIG_FILES: [&str; 2] = ["clinibook.toml", "config/clinibook.toml"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub clinic: ClinicConfig,
    pub scheduling: SchedulingConfig,
    pub calendar: CalendarConfig,
    pub messaging: MessagingConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ClinicConfig {
    pub name: String,
    pub timezone: String,
    pub hours: BusinessHours,
}

#[derive(Clone, Debug)]
pub struct SchedulingConfig {
    pub slot_granularity_minutes: u32,
    pub debounce_ms: u64,
    pub lock_stale_secs: u64,
    pub lock_wait_ms: u64,
    pub lock_poll_ms: u64,
    pub max_failed_attempts: u32,
    pub max_offered_slots: usize,
}

#[derive(Clone, Debug)]
pub struct CalendarConfig {
    pub enabled: bool,
    pub base_url: Option<String>,
    pub calendar_id: Option<String>,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct MessagingConfig {
    pub enabled: bool,
    pub base_url: Option<String>,
    pub api_token: Option<SecretString>,
    pub webhook_secret: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub timezone: Option<String>,
    pub server_port: Option<u16>,
    pub debounce_ms: Option<u64>,
    pub calendar_enabled: Option<bool>,
    pub messaging_enabled: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading `{path}` failed: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("`{path}` is not valid TOML: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("config file `{0}` does not exist")]
    MissingConfigFile(PathBuf),
    #[error("`${{{var}}}` is referenced in the config file but not set")]
    MissingEnvInterpolation { var: String },
    #[error("`${{` without a closing `}}` in the config file")]
    UnterminatedInterpolation,
    #[error("`{key}` has an unusable value `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://clinibook.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            clinic: ClinicConfig {
                name: "Clínica Dental".to_string(),
                timezone: "Europe/Madrid".to_string(),
                hours: BusinessHours::default(),
            },
            scheduling: SchedulingConfig {
                slot_granularity_minutes: 15,
                debounce_ms: 1_000,
                lock_stale_secs: 30,
                lock_wait_ms: 5_000,
                lock_poll_ms: 100,
                max_failed_attempts: 3,
                max_offered_slots: 6,
            },
            calendar: CalendarConfig {
                enabled: false,
                base_url: None,
                calendar_id: None,
                api_key: None,
                timeout_secs: 10,
            },
            messaging: MessagingConfig {
                enabled: false,
                base_url: None,
                api_token: None,
                webhook_secret: None,
                timeout_secs: 10,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl ClinicConfig {
    pub fn civil_clock(&self) -> Result<CivilClock, ConfigError> {
        CivilClock::parse(&self.timezone)
            .map_err(|error| ConfigError::Validation(format!("clinic.timezone: {error}")))
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        let ConfigPatch { database, clinic, scheduling, calendar, messaging, server, logging } = patch;

        if let Some(section) = database {
            take(&mut self.database.url, section.url);
            take(&mut self.database.max_connections, section.max_connections);
            take(&mut self.database.timeout_secs, section.timeout_secs);
        }
        if let Some(section) = clinic {
            self.clinic.hours = section.apply_hours(&self.clinic.hours)?;
            take(&mut self.clinic.name, section.name);
            take(&mut self.clinic.timezone, section.timezone);
        }
        if let Some(section) = scheduling {
            let target = &mut self.scheduling;
            take(&mut target.slot_granularity_minutes, section.slot_granularity_minutes);
            take(&mut target.debounce_ms, section.debounce_ms);
            take(&mut target.lock_stale_secs, section.lock_stale_secs);
            take(&mut target.lock_wait_ms, section.lock_wait_ms);
            take(&mut target.lock_poll_ms, section.lock_poll_ms);
            take(&mut target.max_failed_attempts, section.max_failed_attempts);
            take(&mut target.max_offered_slots, section.max_offered_slots);
        }
        if let Some(section) = calendar {
            let target = &mut self.calendar;
            take(&mut target.enabled, section.enabled);
            take_some(&mut target.base_url, section.base_url);
            take_some(&mut target.calendar_id, section.calendar_id);
            take_some(&mut target.api_key, section.api_key.map(SecretString::from));
            take(&mut target.timeout_secs, section.timeout_secs);
        }
        if let Some(section) = messaging {
            let target = &mut self.messaging;
            take(&mut target.enabled, section.enabled);
            take_some(&mut target.base_url, section.base_url);
            take_some(&mut target.api_token, section.api_token.map(SecretString::from));
            take_some(&mut target.webhook_secret, section.webhook_secret.map(SecretString::from));
            take(&mut target.timeout_secs, section.timeout_secs);
        }
        if let Some(section) = server {
            take(&mut self.server.bind_address, section.bind_address);
            take(&mut self.server.port, section.port);
            take(&mut self.server.graceful_shutdown_secs, section.graceful_shutdown_secs);
        }
        if let Some(section) = logging {
            take(&mut self.logging.level, section.level);
            take(&mut self.logging.format, section.format);
        }
        Ok(())
    }

    /// `CLINIBOOK_<SECTION>_<FIELD>`, plus `CLINIBOOK_CALENDAR_ID` and the
    /// short `CLINIBOOK_LOG_LEVEL` / `CLINIBOOK_LOG_FORMAT` aliases.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        take(&mut self.database.url, env_text("DATABASE_URL"));
        take(&mut self.database.max_connections, env_parsed("DATABASE_MAX_CONNECTIONS")?);
        take(&mut self.database.timeout_secs, env_parsed("DATABASE_TIMEOUT_SECS")?);

        take(&mut self.clinic.name, env_text("CLINIC_NAME"));
        take(&mut self.clinic.timezone, env_text("CLINIC_TIMEZONE"));

        let scheduling = &mut self.scheduling;
        take(&mut scheduling.slot_granularity_minutes, env_parsed("SCHEDULING_SLOT_GRANULARITY_MINUTES")?);
        take(&mut scheduling.debounce_ms, env_parsed("SCHEDULING_DEBOUNCE_MS")?);
        take(&mut scheduling.lock_stale_secs, env_parsed("SCHEDULING_LOCK_STALE_SECS")?);
        take(&mut scheduling.lock_wait_ms, env_parsed("SCHEDULING_LOCK_WAIT_MS")?);
        take(&mut scheduling.lock_poll_ms, env_parsed("SCHEDULING_LOCK_POLL_MS")?);
        take(&mut scheduling.max_failed_attempts, env_parsed("SCHEDULING_MAX_FAILED_ATTEMPTS")?);
        take(&mut scheduling.max_offered_slots, env_parsed("SCHEDULING_MAX_OFFERED_SLOTS")?);

        let calendar = &mut self.calendar;
        take(&mut calendar.enabled, env_parsed("CALENDAR_ENABLED")?);
        take_some(&mut calendar.base_url, env_text("CALENDAR_BASE_URL"));
        take_some(&mut calendar.calendar_id, env_text("CALENDAR_ID"));
        take_some(&mut calendar.api_key, env_text("CALENDAR_API_KEY").map(SecretString::from));
        take(&mut calendar.timeout_secs, env_parsed("CALENDAR_TIMEOUT_SECS")?);

        let messaging = &mut self.messaging;
        take(&mut messaging.enabled, env_parsed("MESSAGING_ENABLED")?);
        take_some(&mut messaging.base_url, env_text("MESSAGING_BASE_URL"));
        take_some(&mut messaging.api_token, env_text("MESSAGING_API_TOKEN").map(SecretString::from));
        take_some(&mut messaging.webhook_secret, env_text("MESSAGING_WEBHOOK_SECRET").map(SecretString::from));
        take(&mut messaging.timeout_secs, env_parsed("MESSAGING_TIMEOUT_SECS")?);

        take(&mut self.server.bind_address, env_text("SERVER_BIND_ADDRESS"));
        take(&mut self.server.port, env_parsed("SERVER_PORT")?);
        take(&mut self.server.graceful_shutdown_secs, env_parsed("SERVER_GRACEFUL_SHUTDOWN_SECS")?);

        take(&mut self.logging.level, env_text("LOGGING_LEVEL").or_else(|| env_text("LOG_LEVEL")));
        if let Some(format) = env_text("LOGGING_FORMAT").or_else(|| env_text("LOG_FORMAT")) {
            self.logging.format = format.parse()?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        take(&mut self.database.url, overrides.database_url);
        take(&mut self.logging.level, overrides.log_level);
        take(&mut self.clinic.timezone, overrides.timezone);
        take(&mut self.server.port, overrides.server_port);
        take(&mut self.scheduling.debounce_ms, overrides.debounce_ms);
        take(&mut self.calendar.enabled, overrides.calendar_enabled);
        take(&mut self.messaging.enabled, overrides.messaging_enabled);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_clinic(&self.clinic)?;
        validate_scheduling(&self.scheduling)?;
        validate_calendar(&self.calendar)?;
        validate_messaging(&self.messaging)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    DEFAULT_CONFIG_FILES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_clinic(clinic: &ClinicConfig) -> Result<(), ConfigError> {
    clinic.civil_clock()?;
    clinic
        .hours
        .validate()
        .map_err(|message| ConfigError::Validation(format!("clinic hours: {message}")))
}

const MAX_LOCK_STALE_SECS: u64 = 86_400;

fn validate_scheduling(scheduling: &SchedulingConfig) -> Result<(), ConfigError> {
    if scheduling.slot_granularity_minutes == 0 || scheduling.slot_granularity_minutes > 120 {
        return Err(ConfigError::Validation(
            "scheduling.slot_granularity_minutes must be in range 1..=120".to_string(),
        ));
    }
    if scheduling.debounce_ms > 60_000 {
        return Err(ConfigError::Validation(
            "scheduling.debounce_ms must not exceed 60000".to_string(),
        ));
    }
    if scheduling.lock_stale_secs == 0 || scheduling.lock_stale_secs > MAX_LOCK_STALE_SECS {
        return Err(ConfigError::Validation(format!(
            "scheduling.lock_stale_secs must be in range 1..={MAX_LOCK_STALE_SECS}"
        )));
    }
    if scheduling.lock_poll_ms == 0 {
        return Err(ConfigError::Validation(
            "scheduling.lock_poll_ms must be greater than zero".to_string(),
        ));
    }
    if scheduling.max_offered_slots == 0 {
        return Err(ConfigError::Validation(
            "scheduling.max_offered_slots must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_calendar(calendar: &CalendarConfig) -> Result<(), ConfigError> {
    if !calendar.enabled {
        return Ok(());
    }

    validate_http_url("calendar.base_url", calendar.base_url.as_deref())?;
    let missing_id = calendar.calendar_id.as_ref().map(|id| id.trim().is_empty()).unwrap_or(true);
    if missing_id {
        return Err(ConfigError::Validation(
            "calendar.calendar_id is required when calendar.enabled is true".to_string(),
        ));
    }
    if missing_secret(calendar.api_key.as_ref()) {
        return Err(ConfigError::Validation(
            "calendar.api_key is required when calendar.enabled is true".to_string(),
        ));
    }
    if calendar.timeout_secs == 0 || calendar.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "calendar.timeout_secs must be in range 1..=120".to_string(),
        ));
    }
    Ok(())
}

fn validate_messaging(messaging: &MessagingConfig) -> Result<(), ConfigError> {
    if let Some(secret) = &messaging.webhook_secret {
        if secret.expose_secret().trim().len() < 16 {
            return Err(ConfigError::Validation(
                "messaging.webhook_secret must be at least 16 characters".to_string(),
            ));
        }
    }

    if !messaging.enabled {
        return Ok(());
    }

    validate_http_url("messaging.base_url", messaging.base_url.as_deref())?;
    if missing_secret(messaging.api_token.as_ref()) {
        return Err(ConfigError::Validation(
            "messaging.api_token is required when messaging.enabled is true".to_string(),
        ));
    }
    if messaging.timeout_secs == 0 || messaging.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "messaging.timeout_secs must be in range 1..=120".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_http_url(key: &str, value: Option<&str>) -> Result<(), ConfigError> {
    match value.map(str::trim) {
        Some(url) if url.starts_with("http://") || url.starts_with("https://") => Ok(()),
        Some(_) => Err(ConfigError::Validation(format!("{key} must start with http:// or https://"))),
        None => Err(ConfigError::Validation(format!("{key} is required when the section is enabled"))),
    }
}

fn missing_secret(secret: Option<&SecretString>) -> bool {
    secret.map(|value| value.expose_secret().trim().is_empty()).unwrap_or(true)
}

fn take<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn take_some<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

const ENV_PREFIX: &str = "CLINIBOOK_";

/// Blank variables count as unset.
fn env_text(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}{name}")).ok().filter(|value| !value.trim().is_empty())
}

fn env_parsed<T: FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    env_text(name)
        .map(|value| {
            value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
                key: format!("{ENV_PREFIX}{name}"),
                value,
            })
        })
        .transpose()
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    clinic: Option<ClinicPatch>,
    scheduling: Option<SchedulingPatch>,
    calendar: Option<CalendarPatch>,
    messaging: Option<MessagingPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

/// Opening hours are written as `"HH:MM"` strings. An empty string closes
/// the day (Saturday and Sunday) or removes the lunch break.
#[derive(Debug, Default, Deserialize)]
struct ClinicPatch {
    name: Option<String>,
    timezone: Option<String>,
    weekday_open: Option<String>,
    weekday_close: Option<String>,
    lunch_start: Option<String>,
    lunch_end: Option<String>,
    saturday_open: Option<String>,
    saturday_close: Option<String>,
    sunday_open: Option<String>,
    sunday_close: Option<String>,
}

impl ClinicPatch {
    fn apply_hours(&self, current: &BusinessHours) -> Result<BusinessHours, ConfigError> {
        let mut hours = current.clone();

        if let Some(open) = &self.weekday_open {
            hours.weekday.open = clock_field("clinic.weekday_open", open)?;
        }
        if let Some(close) = &self.weekday_close {
            hours.weekday.close = clock_field("clinic.weekday_close", close)?;
        }
        match (&self.lunch_start, &self.lunch_end) {
            (Some(start), _) | (_, Some(start)) if start.trim().is_empty() => {
                hours.weekday.lunch = None;
            }
            (Some(start), Some(end)) => {
                let start = clock_field("clinic.lunch_start", start)?;
                let end = clock_field("clinic.lunch_end", end)?;
                hours.weekday.lunch = Some(TimeRange::new(start, end).ok_or_else(|| {
                    ConfigError::Validation("clinic.lunch_start must be before clinic.lunch_end".to_string())
                })?);
            }
            (None, None) => {}
            _ => {
                return Err(ConfigError::Validation(
                    "clinic.lunch_start and clinic.lunch_end must be set together".to_string(),
                ))
            }
        }

        if let Some(saturday) =
            optional_day("clinic.saturday", self.saturday_open.as_deref(), self.saturday_close.as_deref())?
        {
            hours.saturday = saturday;
        }
        if let Some(sunday) =
            optional_day("clinic.sunday", self.sunday_open.as_deref(), self.sunday_close.as_deref())?
        {
            hours.sunday = sunday;
        }

        Ok(hours)
    }
}

fn clock_field(key: &str, value: &str) -> Result<chrono::NaiveTime, ConfigError> {
    parse_clock_time(value)
        .ok_or_else(|| ConfigError::Validation(format!("{key} must be formatted as HH:MM, got `{value}`")))
}

/// `Some(None)` closes the day, `Some(Some(_))` opens it, `None` leaves it.
fn optional_day(
    key: &str,
    open: Option<&str>,
    close: Option<&str>,
) -> Result<Option<Option<DaySchedule>>, ConfigError> {
    match (open.map(str::trim), close.map(str::trim)) {
        (None, None) => Ok(None),
        (Some(""), _) | (_, Some("")) => Ok(Some(None)),
        (Some(open), Some(close)) => Ok(Some(Some(DaySchedule {
            open: clock_field(&format!("{key}_open"), open)?,
            close: clock_field(&format!("{key}_close"), close)?,
            lunch: None,
        }))),
        _ => Err(ConfigError::Validation(format!("{key}_open and {key}_close must be set together"))),
    }
}

#[derive(Debug, Default, Deserialize)]
struct SchedulingPatch {
    slot_granularity_minutes: Option<u32>,
    debounce_ms: Option<u64>,
    lock_stale_secs: Option<u64>,
    lock_wait_ms: Option<u64>,
    lock_poll_ms: Option<u64>,
    max_failed_attempts: Option<u32>,
    max_offered_slots: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct CalendarPatch {
    enabled: Option<bool>,
    base_url: Option<String>,
    calendar_id: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct MessagingPatch {
    enabled: Option<bool>,
    base_url: Option<String>,
    api_token: Option<String>,
    webhook_secret: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
