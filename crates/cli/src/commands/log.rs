use clinibook_db::repositories::{InteractionLogRepository, SqlInteractionLogRepository};
use serde_json::json;

use crate::commands::{load_config, parse_phone, storage, with_database, CommandResult, EXIT_INVALID_INPUT};

pub const MAX_ENTRIES: u32 = 500;

/// Most recent turns for one phone, oldest first.
pub fn show(phone: &str, limit: u32) -> CommandResult {
    if limit == 0 || limit > MAX_ENTRIES {
        return CommandResult::from_failure(
            "log.show",
            ("invalid_input", format!("limit must be between 1 and {MAX_ENTRIES}"), EXIT_INVALID_INPUT),
        );
    }

    let result = parse_phone(phone).and_then(|phone| {
        let config = load_config()?;
        let masked = phone.masked();
        with_database(&config.database, |pool| async move {
            SqlInteractionLogRepository::new(pool).list_for_phone(&phone, limit).await.map_err(storage)
        })
        .map(|entries| (masked, entries))
    });

    match result {
        Ok((masked, entries)) => {
            let turns = entries
                .iter()
                .map(|entry| {
                    json!({
                        "at": entry.created_at.to_rfc3339(),
                        "user": entry.user_message,
                        "bot": entry.bot_response,
                        "outcome": entry.outcome.as_str(),
                    })
                })
                .collect::<Vec<_>>();
            let message = format!("{} turns for {masked}", turns.len());
            CommandResult::success_with("log.show", message, Some(json!({ "phone": masked, "turns": turns })))
        }
        Err(failure) => CommandResult::from_failure("log.show", failure),
    }
}
