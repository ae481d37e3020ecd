use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use clinibook_db::repositories::{HandoffRepository, SqlHandoffRepository};
use clinibook_db::{ping, DbPool};
use serde::Serialize;
use tracing::warn;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    Degraded,
}

/// Body of `GET /health`. `open_handoffs` counts conversations waiting on
/// staff and is absent when the database cannot be read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: Readiness,
    pub database: Readiness,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_handoffs: Option<usize>,
    pub checked_at: DateTime<Utc>,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthReport>) {
    let checked_at = Utc::now();
    if let Err(error) = ping(&state.db_pool).await {
        warn!(event_name = "system.health.database_unreachable", error = %error);
        let report = HealthReport {
            status: Readiness::Degraded,
            database: Readiness::Degraded,
            detail: Some(format!("database query failed: {error}")),
            open_handoffs: None,
            checked_at,
        };
        return (StatusCode::SERVICE_UNAVAILABLE, Json(report));
    }

    let open_handoffs = match SqlHandoffRepository::new(state.db_pool.clone()).list().await {
        Ok(handoffs) => Some(handoffs.len()),
        Err(error) => {
            warn!(event_name = "system.health.handoffs_unreadable", error = %error);
            None
        }
    };
    let report =
        HealthReport { status: Readiness::Ready, database: Readiness::Ready, detail: None, open_handoffs, checked_at };
    (StatusCode::OK, Json(report))
}
