use tracing::{info, warn};

use clinibook_core::audit::{AuditEvent, AuditOutcome, AuditSink};

/// Writes audit events to the structured log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let phone = event.phone.as_ref().map(|phone| phone.masked()).unwrap_or_default();
        let metadata = event
            .metadata
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(" ");

        match event.outcome {
            AuditOutcome::Failed => warn!(
                event_name = %event.name,
                category = event.category.as_str(),
                outcome = event.outcome.as_str(),
                correlation_id = %event.correlation_id,
                actor = %event.actor,
                phone = %phone,
                metadata = %metadata,
                "audit"
            ),
            AuditOutcome::Success | AuditOutcome::Rejected => info!(
                event_name = %event.name,
                category = event.category.as_str(),
                outcome = event.outcome.as_str(),
                correlation_id = %event.correlation_id,
                actor = %event.actor,
                phone = %phone,
                metadata = %metadata,
                "audit"
            ),
        }
    }
}
