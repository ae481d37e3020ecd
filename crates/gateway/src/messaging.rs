use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use clinibook_core::config::MessagingConfig;
use clinibook_core::domain::session::PhoneNumber;

use crate::error::TransportError;

const SERVICE: &str = "messaging";

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct DeliveryReceipt {
    /// Identifier assigned by the gateway, when it returns one.
    pub message_id: Option<String>,
}

#[async_trait]
pub trait MessageGateway: Send + Sync {
    async fn send(&self, phone: &PhoneNumber, text: &str) -> Result<DeliveryReceipt, TransportError>;
}

/// Drops every message. Used when outbound messaging is disabled.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMessageGateway;

#[async_trait]
impl MessageGateway for NoopMessageGateway {
    async fn send(&self, phone: &PhoneNumber, _text: &str) -> Result<DeliveryReceipt, TransportError> {
        debug!(event_name = "messaging.noop", phone = %phone.masked());
        Ok(DeliveryReceipt::default())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMessage {
    pub phone: PhoneNumber,
    pub text: String,
}

/// Keeps what would have been sent; can be told to fail or to stall.
#[derive(Debug, Default)]
pub struct RecordingMessageGateway {
    sent: Mutex<Vec<SentMessage>>,
    fail: Mutex<bool>,
    delay: Mutex<Duration>,
}

impl RecordingMessageGateway {
    pub async fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn texts_for(&self, phone: &PhoneNumber) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|message| &message.phone == phone)
            .map(|message| message.text.clone())
            .collect()
    }

    pub async fn set_failing(&self, failing: bool) {
        *self.fail.lock().await = failing;
    }

    /// Holds every send for `delay` before recording it.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.lock().await = delay;
    }
}

#[async_trait]
impl MessageGateway for RecordingMessageGateway {
    async fn send(&self, phone: &PhoneNumber, text: &str) -> Result<DeliveryReceipt, TransportError> {
        if *self.fail.lock().await {
            return Err(TransportError::Request { service: SERVICE, detail: "recording gateway set to fail".to_owned() });
        }
        let delay = *self.delay.lock().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut sent = self.sent.lock().await;
        sent.push(SentMessage { phone: phone.clone(), text: text.to_owned() });
        Ok(DeliveryReceipt { message_id: Some(format!("rec-{}", sent.len())) })
    }
}

#[derive(Debug, Serialize)]
struct OutboundMessage<'a> {
    to: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize, Default)]
struct OutboundAck {
    #[serde(default, alias = "id")]
    message_id: Option<String>,
}

/// Posts replies to a chat gateway's send endpoint.
#[derive(Clone, Debug)]
pub struct HttpMessageGateway {
    client: reqwest::Client,
    endpoint: String,
    api_token: SecretString,
}

impl HttpMessageGateway {
    pub fn new(endpoint: &str, api_token: SecretString, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| TransportError::request(SERVICE, error))?;
        Ok(Self { client, endpoint: endpoint.trim().to_owned(), api_token })
    }

    pub fn from_config(config: &MessagingConfig) -> Result<Self, TransportError> {
        let endpoint = config
            .base_url
            .as_deref()
            .ok_or_else(|| TransportError::NotConfigured("messaging.base_url is not set".to_owned()))?;
        let token = config
            .api_token
            .clone()
            .ok_or_else(|| TransportError::NotConfigured("messaging.api_token is not set".to_owned()))?;
        Self::new(endpoint, token, Duration::from_secs(config.timeout_secs))
    }
}

#[async_trait]
impl MessageGateway for HttpMessageGateway {
    async fn send(&self, phone: &PhoneNumber, text: &str) -> Result<DeliveryReceipt, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_token.expose_secret())
            .json(&OutboundMessage { to: phone.as_str(), text })
            .send()
            .await
            .map_err(|error| TransportError::request(SERVICE, error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(event_name = "messaging.send.failed", phone = %phone.masked(), status = status.as_u16());
            return Err(TransportError::Status { service: SERVICE, status: status.as_u16(), body });
        }

        // Gateways differ in what they acknowledge with; an empty body is fine.
        let body = response.text().await.map_err(|error| TransportError::request(SERVICE, error))?;
        let ack = if body.trim().is_empty() {
            OutboundAck::default()
        } else {
            serde_json::from_str::<OutboundAck>(&body).unwrap_or_default()
        };
        debug!(event_name = "messaging.send.ok", phone = %phone.masked());
        Ok(DeliveryReceipt { message_id: ack.message_id })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use secrecy::SecretString;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use clinibook_core::domain::session::PhoneNumber;

    use super::{HttpMessageGateway, MessageGateway, RecordingMessageGateway};
    use crate::error::TransportError;

    fn phone() -> PhoneNumber {
        PhoneNumber("+34600111222".to_owned())
    }

    #[tokio::test]
    async fn posts_recipient_and_text_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("authorization", "Bearer gateway-token"))
            .and(body_json(serde_json::json!({ "to": "+34600111222", "text": "Hola Ana" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "wamid.1" })))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = HttpMessageGateway::new(
            &format!("{}/messages", server.uri()),
            SecretString::from("gateway-token"),
            Duration::from_secs(2),
        )
        .expect("gateway");
        let receipt = gateway.send(&phone(), "Hola Ana").await.expect("send");
        assert_eq!(receipt.message_id.as_deref(), Some("wamid.1"));
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let gateway =
            HttpMessageGateway::new(&server.uri(), SecretString::from("t"), Duration::from_secs(2)).expect("gateway");
        let error = gateway.send(&phone(), "Hola").await.expect_err("must fail");
        assert!(matches!(error, TransportError::Status { status: 502, .. }));
    }

    #[tokio::test]
    async fn recording_gateway_keeps_messages_until_told_to_fail() {
        let gateway = RecordingMessageGateway::default();
        gateway.send(&phone(), "uno").await.expect("send");
        gateway.set_failing(true).await;
        assert!(gateway.send(&phone(), "dos").await.is_err());

        assert_eq!(gateway.texts_for(&phone()).await, vec!["uno".to_owned()]);
    }
}
