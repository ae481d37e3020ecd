use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, error, warn};
use uuid::Uuid;

use clinibook_agent::{InboundMessage, TurnPipeline};
use clinibook_core::domain::session::PhoneNumber;
use clinibook_core::errors::{InterfaceError, InterfaceErrorKind};

pub const SIGNATURE_HEADER: &str = "x-clinibook-signature";

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct WebhookState {
    pipeline: Arc<TurnPipeline>,
    secret: Option<SecretString>,
}

impl WebhookState {
    pub fn new(pipeline: Arc<TurnPipeline>, secret: Option<SecretString>) -> Self {
        Self { pipeline, secret }
    }
}

#[derive(Debug, Deserialize)]
pub struct InboundPayload {
    pub phone: String,
    pub text: String,
    /// Provider-side send time. Identifies redeliveries; debouncing uses the
    /// server's receipt time.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    pub correlation_id: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookError {
    pub error: String,
    pub correlation_id: String,
}

type Rejection = (StatusCode, Json<WebhookError>);

pub fn router(state: WebhookState) -> Router {
    Router::new().route("/webhook/messages", post(receive_message)).with_state(state)
}

pub async fn receive_message(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, Rejection> {
    let received_at = Utc::now();
    let correlation_id = Uuid::new_v4().to_string();

    if let Some(secret) = &state.secret {
        let signature = headers.get(SIGNATURE_HEADER).and_then(|value| value.to_str().ok());
        if !signature_matches(secret, &body, signature) {
            warn!(event_name = "webhook.signature_rejected", correlation_id = %correlation_id);
            return Err(reject(InterfaceError::new(
                InterfaceErrorKind::Unauthorized,
                "missing or invalid signature",
                correlation_id,
            )));
        }
    }

    let payload = serde_json::from_slice::<InboundPayload>(&body).map_err(|error| {
        bad_request(format!("malformed payload: {error}"), &correlation_id)
    })?;
    let phone = PhoneNumber::parse(&payload.phone)
        .map_err(|error| bad_request(error.to_string(), &correlation_id))?;
    if let Some(sent_at) = payload.timestamp {
        debug!(
            event_name = "webhook.received",
            correlation_id = %correlation_id,
            delivery_lag_ms = (received_at - sent_at).num_milliseconds(),
        );
    }
    if payload.text.trim().is_empty() {
        return Err(bad_request("text must not be empty".to_owned(), &correlation_id));
    }

    let message = InboundMessage { phone, text: payload.text, received_at, sent_at: payload.timestamp };
    match state.pipeline.handle(message).await {
        Ok(status) => Ok(Json(WebhookResponse {
            status: status.as_str().to_owned(),
            outcome: status.outcome().map(|outcome| outcome.as_str().to_owned()),
            correlation_id,
        })),
        Err(failure) => {
            error!(event_name = "webhook.pipeline_failed", correlation_id = %correlation_id, error = %failure);
            Err(reject(failure.into_interface(correlation_id)))
        }
    }
}

/// Constant-time check of `sha256=<hex>` over the raw body.
pub fn signature_matches(secret: &SecretString, body: &[u8], header: Option<&str>) -> bool {
    let Some(provided) = header.and_then(|value| value.trim().strip_prefix("sha256=")) else {
        return false;
    };
    let Ok(provided) = hex::decode(provided) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.expose_secret().as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&provided).is_ok()
}

fn bad_request(message: String, correlation_id: &str) -> Rejection {
    reject(InterfaceError::new(InterfaceErrorKind::BadRequest, message, correlation_id))
}

fn reject(error: InterfaceError) -> Rejection {
    let status = match error.kind {
        InterfaceErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        InterfaceErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        InterfaceErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = WebhookError { error: error.user_message().to_owned(), correlation_id: error.correlation_id };
    (status, Json(body))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use clinibook_core::config::AppConfig;
    use clinibook_core::domain::session::PhoneNumber;
    use clinibook_core::flows::ConversationStep;
    use clinibook_db::repositories::{SessionRepository, SqlSessionRepository};
    use clinibook_db::{connect_with_settings, migrations, DbPool};
    use clinibook_gateway::RecordingMessageGateway;
    use hmac::Mac;
    use secrecy::SecretString;
    use tower::ServiceExt;

    use super::{router, signature_matches, HmacSha256, WebhookResponse, WebhookState, SIGNATURE_HEADER};
    use crate::bootstrap::build_pipeline;

    const SECRET: &str = "a-long-enough-webhook-secret";

    async fn setup(secret: Option<&str>) -> (axum::Router, DbPool, Arc<RecordingMessageGateway>) {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool");
        migrations::run_pending(&pool).await.expect("migrations");

        let mut config = AppConfig::default();
        config.scheduling.debounce_ms = 0;
        let gateway = Arc::new(RecordingMessageGateway::default());
        let pipeline = build_pipeline(&config, pool.clone(), gateway.clone()).expect("pipeline");
        let state = WebhookState::new(Arc::new(pipeline), secret.map(|value| SecretString::from(value.to_owned())));
        (router(state), pool, gateway)
    }

    fn sign(secret: &str, body: &[u8]) -> Option<String> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
        mac.update(body);
        Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
    }

    fn request(body: &str, signature: Option<String>) -> Request<Body> {
        let mut builder =
            Request::builder().method("POST").uri("/webhook/messages").header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        builder.body(Body::from(body.to_owned())).expect("request")
    }

    #[tokio::test]
    async fn signed_message_runs_a_turn() {
        let (app, pool, gateway) = setup(Some(SECRET)).await;
        let body = r#"{"phone":"+34 600 111 222","text":"hola"}"#;

        let response = app
            .oneshot(request(body, sign(SECRET, body.as_bytes())))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let payload: WebhookResponse = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(payload.status, "processed");
        assert_eq!(payload.outcome.as_deref(), Some("replied"));

        let phone = PhoneNumber("+34600111222".to_owned());
        let session = SqlSessionRepository::new(pool).load(&phone).await.expect("load").expect("session");
        assert_eq!(session.step, ConversationStep::CollectingName);
        assert_eq!(gateway.texts_for(&phone).await.len(), 1);
    }

    #[tokio::test]
    async fn bad_signature_is_unauthorized() {
        let (app, _pool, gateway) = setup(Some(SECRET)).await;
        let body = r#"{"phone":"+34600111222","text":"hola"}"#;

        let response = app
            .clone()
            .oneshot(request(body, sign("another-secret-entirely", body.as_bytes())))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app.oneshot(request(body, None)).await.expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(gateway.sent().await.is_empty());
    }

    #[tokio::test]
    async fn redelivered_message_is_acknowledged_once() {
        let (app, _pool, gateway) = setup(None).await;
        let body = r#"{"phone":"+34600111222","text":"hola","timestamp":"2026-07-20T07:59:58Z"}"#;

        let first = app.clone().oneshot(request(body, None)).await.expect("response");
        let retry = app.oneshot(request(body, None)).await.expect("response");

        assert_eq!(first.status(), StatusCode::OK);
        let bytes = to_bytes(retry.into_body(), usize::MAX).await.expect("body");
        let payload: WebhookResponse = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(payload.status, "duplicate");
        assert_eq!(gateway.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn invalid_phone_is_a_bad_request() {
        let (app, _pool, _gateway) = setup(None).await;

        let response = app.oneshot(request(r#"{"phone":"call me","text":"hola"}"#, None)).await.expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn signatures_cover_the_exact_body() {
        let secret = SecretString::from(SECRET.to_owned());
        let signature = sign(SECRET, b"{}").expect("signature");

        assert!(signature_matches(&secret, b"{}", Some(&signature)));
        assert!(!signature_matches(&secret, b"{ }", Some(&signature)));
        assert!(!signature_matches(&secret, b"{}", Some("sha256=zz")));
        assert!(!signature_matches(&secret, b"{}", None));
    }
}
