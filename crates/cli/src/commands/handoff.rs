use chrono::Utc;
use clinibook_db::repositories::{HandoffRepository, SqlHandoffRepository};
use serde_json::json;

use crate::commands::{load_config, parse_phone, storage, with_database, CommandResult};

pub const OPERATOR_REASON: &str = "operator_request";

/// Hands the conversation to staff; the assistant stays silent until cleared.
pub fn set(phone: &str, reason: Option<&str>) -> CommandResult {
    let reason = reason.map(str::trim).filter(|reason| !reason.is_empty()).unwrap_or(OPERATOR_REASON);
    let result = parse_phone(phone).and_then(|phone| {
        let config = load_config()?;
        let masked = phone.masked();
        with_database(&config.database, |pool| async move {
            SqlHandoffRepository::new(pool).set(&phone, reason, Utc::now()).await.map_err(storage)
        })
        .map(|()| masked)
    });

    match result {
        Ok(masked) => CommandResult::success("handoff.set", format!("{masked} handed to staff ({reason})")),
        Err(failure) => CommandResult::from_failure("handoff.set", failure),
    }
}

pub fn clear(phone: &str) -> CommandResult {
    let result = parse_phone(phone).and_then(|phone| {
        let config = load_config()?;
        let masked = phone.masked();
        with_database(&config.database, |pool| async move {
            SqlHandoffRepository::new(pool).clear(&phone).await.map_err(storage)
        })
        .map(|cleared| (masked, cleared))
    });

    match result {
        Ok((masked, true)) => {
            CommandResult::success("handoff.clear", format!("{masked} is back with the assistant"))
        }
        Ok((masked, false)) => CommandResult::success("handoff.clear", format!("{masked} had no handoff")),
        Err(failure) => CommandResult::from_failure("handoff.clear", failure),
    }
}

pub fn list() -> CommandResult {
    let result = load_config().and_then(|config| {
        with_database(&config.database, |pool| async move {
            SqlHandoffRepository::new(pool).list().await.map_err(storage)
        })
    });

    match result {
        Ok(handoffs) => {
            let entries = handoffs
                .iter()
                .map(|handoff| {
                    json!({
                        "phone": handoff.phone.masked(),
                        "reason": handoff.reason,
                        "since": handoff.created_at.to_rfc3339(),
                    })
                })
                .collect::<Vec<_>>();
            let message = format!("{} conversations with staff", entries.len());
            CommandResult::success_with("handoff.list", message, Some(json!({ "handoffs": entries })))
        }
        Err(failure) => CommandResult::from_failure("handoff.list", failure),
    }
}
