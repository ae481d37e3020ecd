use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport is not configured: {0}")]
    NotConfigured(String),
    #[error("request to {service} failed: {detail}")]
    Request { service: &'static str, detail: String },
    #[error("{service} answered with status {status}: {body}")]
    Status { service: &'static str, status: u16, body: String },
    #[error("{service} returned an unreadable payload: {detail}")]
    Malformed { service: &'static str, detail: String },
}

impl TransportError {
    pub(crate) fn request(service: &'static str, error: reqwest::Error) -> Self {
        let detail = if error.is_timeout() { format!("timed out: {error}") } else { error.to_string() };
        Self::Request { service, detail }
    }
}
