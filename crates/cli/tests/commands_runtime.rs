use std::env;
use std::sync::{Mutex, OnceLock};

use chrono::Utc;
use clinibook_cli::commands::{blocked, config, doctor, handoff, log, migrate, slots};
use clinibook_core::domain::interaction::{InteractionOutcome, NewInteraction};
use clinibook_core::domain::session::PhoneNumber;
use clinibook_db::repositories::{InteractionLogRepository, SqlInteractionLogRepository};
use clinibook_db::{connect_with_settings, migrations};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_default_config() {
    with_env(&[("CLINIBOOK_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["data"]["applied"], payload["data"]["known"]);
    });
}

#[test]
fn migrate_reports_config_failure_for_unknown_timezone() {
    with_env(&[("CLINIBOOK_DATABASE_URL", "sqlite::memory:"), ("CLINIBOOK_CLINIC_TIMEZONE", "Mars/Olympus")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn blocked_dates_can_be_added_listed_and_removed() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("clinic.db").display());

    with_env(&[("CLINIBOOK_DATABASE_URL", &url)], || {
        let added = blocked::add("2026-08-15", "festivo");
        assert_eq!(added.exit_code, 0, "{}", added.output);
        let again = parse_payload(&blocked::add("2026-08-15", "asunción").output);
        assert!(again["message"].as_str().unwrap_or_default().contains("already blocked"));

        let listed = parse_payload(&blocked::list(None).output);
        assert_eq!(listed["data"]["blocked"][0]["date"], "2026-08-15");
        assert_eq!(listed["data"]["blocked"][0]["reason"], "asunción");

        let later = parse_payload(&blocked::list(Some("2026-09-01")).output);
        assert_eq!(later["data"]["blocked"].as_array().map(Vec::len), Some(0));

        let removed = parse_payload(&blocked::remove("2026-08-15").output);
        assert_eq!(removed["status"], "ok");
        let listed = parse_payload(&blocked::list(None).output);
        assert_eq!(listed["data"]["blocked"].as_array().map(Vec::len), Some(0));
    });
}

#[test]
fn blocked_add_rejects_malformed_dates() {
    with_env(&[("CLINIBOOK_DATABASE_URL", "sqlite::memory:")], || {
        let result = blocked::add("15/08/2026", "festivo");
        assert_eq!(result.exit_code, 6);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "invalid_input");
    });
}

#[test]
fn slots_lists_open_times_and_honours_blocked_days() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("clinic.db").display());

    with_env(&[("CLINIBOOK_DATABASE_URL", &url)], || {
        // 2026-07-20 is a Monday.
        let open = slots::run("2026-07-20", 30);
        assert_eq!(open.exit_code, 0, "{}", open.output);
        let payload = parse_payload(&open.output);
        assert_eq!(payload["data"]["day"], "open");
        assert_eq!(payload["data"]["slots"][0], "09:00");
        let times = payload["data"]["slots"].as_array().cloned().unwrap_or_default();
        assert!(!times.iter().any(|time| time == "13:00"), "lunch break must not be offered");
        assert!(times.iter().any(|time| time == "18:00"));
        assert!(!times.iter().any(|time| time == "18:15"), "30 minutes from 18:15 runs past closing");

        let sunday = parse_payload(&slots::run("2026-07-19", 30).output);
        assert_eq!(sunday["data"]["day"], "closed");

        assert_eq!(blocked::add("2026-07-20", "formación").exit_code, 0);
        let blocked = parse_payload(&slots::run("2026-07-20", 30).output);
        assert_eq!(blocked["data"]["day"], "blocked");
        assert_eq!(blocked["data"]["slots"].as_array().map(Vec::len), Some(0));
    });
}

#[test]
fn slots_rejects_zero_length_and_unknown_dates() {
    with_env(&[("CLINIBOOK_DATABASE_URL", "sqlite::memory:")], || {
        assert_eq!(slots::run("2026-07-20", 0).exit_code, 6);

        let unknown = slots::run("algún día", 30);
        assert_eq!(unknown.exit_code, 6);
        assert_eq!(parse_payload(&unknown.output)["error_class"], "invalid_input");
    });
}

#[test]
fn handoff_can_be_set_listed_and_cleared() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("clinic.db").display());

    with_env(&[("CLINIBOOK_DATABASE_URL", &url)], || {
        let set = handoff::set("+34 600 111 222", None);
        assert_eq!(set.exit_code, 0, "{}", set.output);

        let listed = parse_payload(&handoff::list().output);
        assert_eq!(listed["data"]["handoffs"][0]["reason"], handoff::OPERATOR_REASON);
        let masked = listed["data"]["handoffs"][0]["phone"].as_str().unwrap_or_default().to_owned();
        assert!(!masked.contains("600111"), "phone must be masked: {masked}");

        let cleared = parse_payload(&handoff::clear("+34600111222").output);
        assert!(cleared["message"].as_str().unwrap_or_default().contains("back with the assistant"));
        let cleared_again = parse_payload(&handoff::clear("+34600111222").output);
        assert!(cleared_again["message"].as_str().unwrap_or_default().contains("had no handoff"));
    });
}

#[test]
fn handoff_rejects_invalid_phone_numbers() {
    with_env(&[("CLINIBOOK_DATABASE_URL", "sqlite::memory:")], || {
        let result = handoff::set("call me maybe", Some("queja"));
        assert_eq!(result.exit_code, 6);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_input");
    });
}

#[test]
fn log_shows_recent_turns_oldest_first() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("clinic.db").display());
    seed_log(&url, &[("hola", InteractionOutcome::Replied), ("sí", InteractionOutcome::Booked)]);

    with_env(&[("CLINIBOOK_DATABASE_URL", &url)], || {
        let result = log::show("+34600111222", 20);
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(&result.output);
        let turns = payload["data"]["turns"].as_array().cloned().unwrap_or_default();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0]["user"], "hola");
        assert_eq!(turns[1]["outcome"], "booked");
        assert!(!payload["data"]["phone"].as_str().unwrap_or_default().contains("600111"));

        let latest = parse_payload(&log::show("+34600111222", 1).output);
        assert_eq!(latest["data"]["turns"][0]["user"], "sí");
    });
}

#[test]
fn log_rejects_out_of_range_limits() {
    with_env(&[("CLINIBOOK_DATABASE_URL", "sqlite::memory:")], || {
        assert_eq!(log::show("+34600111222", 0).exit_code, 6);
        assert_eq!(log::show("+34600111222", log::MAX_ENTRIES + 1).exit_code, 6);
        assert_eq!(log::show("not a phone", 5).exit_code, 6);
    });
}

#[test]
fn doctor_passes_with_default_adapters() {
    with_env(&[("CLINIBOOK_DATABASE_URL", "sqlite::memory:")], || {
        let (exit_code, output) = doctor::run(true);
        assert_eq!(exit_code, 0, "{output}");

        let payload = parse_payload(&output);
        assert_eq!(payload["overall_status"], "pass");
        assert_eq!(payload["checks"].as_array().map(Vec::len), Some(4));
    });
}

#[test]
fn doctor_fails_when_messaging_lacks_credentials() {
    with_env(&[("CLINIBOOK_DATABASE_URL", "sqlite::memory:"), ("CLINIBOOK_MESSAGING_ENABLED", "true")], || {
        let (exit_code, output) = doctor::run(false);
        assert_eq!(exit_code, 1);
        assert!(output.starts_with("doctor:"), "{output}");
        assert!(output.contains("- [fail] config_validation") || output.contains("- [fail] messaging_readiness"));
    });
}

#[test]
fn config_attributes_env_overrides_and_redacts_secrets() {
    with_env(
        &[
            ("CLINIBOOK_DATABASE_URL", "sqlite::memory:"),
            ("CLINIBOOK_MESSAGING_WEBHOOK_SECRET", "a-long-enough-webhook-secret"),
        ],
        || {
            let result = config::run();
            assert_eq!(result.exit_code, 0);
            assert!(!result.output.contains("a-long-enough-webhook-secret"));

            let payload = parse_payload(&result.output);
            let entries = payload["data"]["entries"].as_array().cloned().unwrap_or_default();
            let entry = |key: &str| entries.iter().find(|entry| entry["key"] == key).cloned().unwrap_or_default();

            assert_eq!(entry("database.url")["source"], "env (CLINIBOOK_DATABASE_URL)");
            assert_eq!(entry("messaging.webhook_secret")["value"], "<redacted>");
            assert_eq!(entry("clinic.timezone")["value"], "Europe/Madrid");
            assert_eq!(entry("clinic.timezone")["source"], "default");
        },
    );
}

fn seed_log(url: &str, turns: &[(&str, InteractionOutcome)]) {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().expect("runtime");
    runtime.block_on(async {
        let pool = connect_with_settings(url, 1, 5).await.expect("pool");
        migrations::run_pending(&pool).await.expect("migrate");
        let repo = SqlInteractionLogRepository::new(pool.clone());
        for (text, outcome) in turns {
            repo.append(NewInteraction {
                phone: PhoneNumber("+34600111222".to_owned()),
                user_message: (*text).to_owned(),
                bot_response: "ok".to_owned(),
                outcome: *outcome,
                created_at: Utc::now(),
            })
            .await
            .expect("append");
        }
        pool.close().await;
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys: Vec<String> = env::vars().map(|(key, _)| key).filter(|key| key.starts_with("CLINIBOOK_")).collect();
    let previous_values: Vec<(String, Option<String>)> =
        keys.iter().map(|key| (key.clone(), env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, _) in vars {
        env::remove_var(key);
    }
    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        }
    }
}
