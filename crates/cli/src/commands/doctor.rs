use clinibook_core::config::AppConfig;
use clinibook_db::{connect_with_settings, ping};
use clinibook_gateway::{HttpCalendarClient, HttpMessageGateway};
use serde::Serialize;

use crate::commands::load_config;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn from_result(name: &'static str, result: Result<String, String>) -> Self {
        match result {
            Ok(details) => Self { name, status: CheckStatus::Pass, details },
            Err(details) => Self { name, status: CheckStatus::Fail, details },
        }
    }

    fn skipped(name: &'static str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: "skipped because configuration did not load".to_string() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    command: &'static str,
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

/// Returns the exit code (0 healthy, 1 otherwise) and the rendered report.
pub fn run(json_output: bool) -> (u8, String) {
    let report = build_report();
    let exit_code = u8::from(report.overall_status != CheckStatus::Pass);

    let output = if json_output {
        serde_json::to_string(&report).unwrap_or_else(|error| {
            format!(
                "{{\"command\":\"doctor\",\"overall_status\":\"fail\",\"summary\":\"{}\"}}",
                error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
            )
        })
    } else {
        render_human(&report)
    };
    (exit_code, output)
}

fn build_report() -> DoctorReport {
    let checks = match load_config() {
        Ok(config) => vec![
            DoctorCheck::from_result(
                "config_validation",
                Ok(format!("{} in {}", config.clinic.name, config.clinic.timezone)),
            ),
            DoctorCheck::from_result("calendar_readiness", calendar(&config)),
            DoctorCheck::from_result("messaging_readiness", messaging(&config)),
            DoctorCheck::from_result("database_connectivity", database(&config)),
        ],
        Err((_, message, _)) => vec![
            DoctorCheck::from_result("config_validation", Err(message)),
            DoctorCheck::skipped("calendar_readiness"),
            DoctorCheck::skipped("messaging_readiness"),
            DoctorCheck::skipped("database_connectivity"),
        ],
    };

    let failed = checks.iter().filter(|check| check.status == CheckStatus::Fail).count();
    let (overall_status, summary) = match failed {
        0 => (CheckStatus::Pass, "doctor: all readiness checks passed".to_string()),
        n => (CheckStatus::Fail, format!("doctor: {n} readiness check(s) failed")),
    };
    DoctorReport { command: "doctor", overall_status, summary, checks }
}

fn calendar(config: &AppConfig) -> Result<String, String> {
    if !config.calendar.enabled {
        return Ok("external calendar disabled; only clinic appointments block slots".to_string());
    }
    let civil = config.clinic.civil_clock().map_err(|error| error.to_string())?;
    HttpCalendarClient::from_config(&config.calendar, civil).map_err(|error| error.to_string())?;
    Ok("calendar client configured".to_string())
}

fn messaging(config: &AppConfig) -> Result<String, String> {
    let webhook = if config.messaging.webhook_secret.is_some() { "signed" } else { "unsigned" };
    if !config.messaging.enabled {
        return Ok(format!("outbound messaging disabled; webhook {webhook}"));
    }
    HttpMessageGateway::from_config(&config.messaging).map_err(|error| error.to_string())?;
    Ok(format!("message gateway configured; webhook {webhook}"))
}

fn database(config: &AppConfig) -> Result<String, String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| format!("failed to initialize async runtime: {error}"))?;
    let database = &config.database;

    runtime.block_on(async {
        let pool = connect_with_settings(&database.url, database.max_connections, database.timeout_secs)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;
        let answered = ping(&pool).await.map_err(|error| format!("database did not answer: {error}"));
        pool.close().await;
        answered.map(|()| format!("connected using `{}`", database.url))
    })
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];
    lines.extend(report.checks.iter().map(|check| {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        format!("- [{marker}] {}: {}", check.name, check.details)
    }));
    lines.join("\n")
}
