use clinibook_db::repositories::{BlockedDateRepository, SqlBlockedDateRepository};
use serde_json::json;

use crate::commands::{load_config, parse_iso_date, storage, with_database, CommandResult, Failure};

pub fn add(date: &str, reason: &str) -> CommandResult {
    let result = parse_iso_date(date).and_then(|date| {
        let config = load_config()?;
        with_database(&config.database, |pool| async move {
            SqlBlockedDateRepository::new(pool).block(date, reason.trim()).await.map_err(storage)
        })
        .map(|created| (date, created))
    });

    match result {
        Ok((date, true)) => CommandResult::success("blocked.add", format!("{date} is now blocked")),
        Ok((date, false)) => {
            CommandResult::success("blocked.add", format!("{date} was already blocked; reason updated"))
        }
        Err(failure) => CommandResult::from_failure("blocked.add", failure),
    }
}

pub fn remove(date: &str) -> CommandResult {
    let result = parse_iso_date(date).and_then(|date| {
        let config = load_config()?;
        with_database(&config.database, |pool| async move {
            SqlBlockedDateRepository::new(pool).unblock(date).await.map_err(storage)
        })
        .map(|removed| (date, removed))
    });

    match result {
        Ok((date, true)) => CommandResult::success("blocked.remove", format!("{date} is open again")),
        Ok((date, false)) => CommandResult::success("blocked.remove", format!("{date} was not blocked")),
        Err(failure) => CommandResult::from_failure("blocked.remove", failure),
    }
}

pub fn list(from: Option<&str>) -> CommandResult {
    match list_entries(from) {
        Ok(entries) => {
            let message = format!("{} blocked dates", entries.len());
            CommandResult::success_with("blocked.list", message, Some(json!({ "blocked": entries })))
        }
        Err(failure) => CommandResult::from_failure("blocked.list", failure),
    }
}

fn list_entries(from: Option<&str>) -> Result<Vec<serde_json::Value>, Failure> {
    let from = from.map(parse_iso_date).transpose()?;
    let config = load_config()?;
    let blocked = with_database(&config.database, |pool| async move {
        SqlBlockedDateRepository::new(pool).list(from).await.map_err(storage)
    })?;
    Ok(blocked
        .into_iter()
        .map(|entry| json!({ "date": entry.date.to_string(), "reason": entry.reason }))
        .collect())
}
