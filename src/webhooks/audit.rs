//! Audit trail for webhook deliveries.
//!
//! The handler reports every delivery outcome to a [`WebhookAuditLogger`].
//! Plug in your own backend (database table, SIEM, ...) for compliance, or use
//! [`TracingAuditLogger`] to get the trail in the application logs.

use async_trait::async_trait;
use std::fmt;

/// Audit event types for webhook deliveries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookAuditEvent {
    /// Delivery authenticated and parsed.
    Received {
        gateway: String,
        event_id: String,
        event_type: String,
        delivery_id: String,
    },
    /// Delivery refused before processing.
    Rejected { gateway: String, reason: String },
    /// Event already processed, acknowledged without running processors.
    Duplicate {
        gateway: String,
        event_id: String,
        delivery_id: String,
    },
    /// All processors succeeded or were skipped.
    Processed {
        gateway: String,
        event_id: String,
        event_type: String,
        processors: usize,
    },
    /// At least one processor failed, or retries are exhausted.
    Failed {
        gateway: String,
        event_id: String,
        event_type: String,
        error: String,
    },
}

impl WebhookAuditEvent {
    /// Event kind as a string for structured logging.
    pub fn event_kind(&self) -> &'static str {
        match self {
            Self::Received { .. } => "webhook_received",
            Self::Rejected { .. } => "webhook_rejected",
            Self::Duplicate { .. } => "webhook_duplicate",
            Self::Processed { .. } => "webhook_processed",
            Self::Failed { .. } => "webhook_failed",
        }
    }
}

impl fmt::Display for WebhookAuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received { gateway, event_id, event_type, delivery_id } => {
                write!(f, "Webhook received: gateway={}, event={}, type={}, delivery={}", gateway, event_id, event_type, delivery_id)
            }
            Self::Rejected { gateway, reason } => {
                write!(f, "Webhook rejected: gateway={}, reason={}", gateway, reason)
            }
            Self::Duplicate { gateway, event_id, delivery_id } => {
                write!(f, "Webhook duplicate: gateway={}, event={}, delivery={}", gateway, event_id, delivery_id)
            }
            Self::Processed { gateway, event_id, event_type, processors } => {
                write!(f, "Webhook processed: gateway={}, event={}, type={}, processors={}", gateway, event_id, event_type, processors)
            }
            Self::Failed { gateway, event_id, event_type, error } => {
                write!(f, "Webhook failed: gateway={}, event={}, type={}, error={}", gateway, event_id, event_type, error)
            }
        }
    }
}

/// Trait for audit logging backends.
///
/// Implementations should handle their own failures (e.g. log to stderr);
/// auditing never changes the outcome of a delivery.
#[async_trait]
pub trait WebhookAuditLogger: Send + Sync {
    async fn log(&self, event: WebhookAuditEvent);
}

/// Audit logger that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpAuditLogger;

#[async_trait]
impl WebhookAuditLogger for NoOpAuditLogger {
    async fn log(&self, _event: WebhookAuditEvent) {}
}

/// Logs audit events with `tracing` at INFO level, target `payhook::audit`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLogger;

#[async_trait]
impl WebhookAuditLogger for TracingAuditLogger {
    async fn log(&self, event: WebhookAuditEvent) {
        tracing::info!(
            target: "payhook::audit",
            event_kind = event.event_kind(),
            "{}", event
        );
    }
}
