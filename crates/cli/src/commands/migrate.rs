use clinibook_db::migrations;
use serde_json::json;

use crate::commands::{load_config, storage, with_database, CommandResult};

pub fn run() -> CommandResult {
    let result = load_config().and_then(|config| {
        with_database(&config.database, |pool| async move {
            migrations::applied_versions(&pool).await.map_err(storage)
        })
    });

    match result {
        Ok(applied) => {
            let message = format!("schema at version {}", applied.last().copied().unwrap_or_default());
            let data = json!({ "applied": applied, "known": migrations::known_versions() });
            CommandResult::success_with("migrate", message, Some(data))
        }
        Err(failure) => CommandResult::from_failure("migrate", failure),
    }
}
