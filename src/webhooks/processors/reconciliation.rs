use async_trait::async_trait;
use std::sync::Arc;

use super::transaction_id;
use crate::error::{GatewayError, ProcessorError};
use crate::events::DomainEventKind;
use crate::gateway::{PaymentGateway, TransactionStatus};
use crate::webhooks::payload::WebhookPayload;
use crate::webhooks::processor::{EventTypeMatcher, WebhookProcessor};

const DEFAULT_RECONCILIATION_PRIORITY: u8 = 10;

/// Re-reads the transaction from the gateway and fails when the gateway
/// disagrees with the webhook.
///
/// Runs late (priority 10) so domain processors are not held up by the
/// extra gateway round trip. Deliveries from other gateways and events
/// without a transaction id are skipped. Gateways that cannot look up
/// transactions are trusted.
pub struct ReconciliationProcessor {
    gateway: Arc<dyn PaymentGateway>,
    matcher: EventTypeMatcher,
    priority: u8,
}

impl ReconciliationProcessor {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            gateway,
            matcher: EventTypeMatcher::new(["payment.*", "charge.*"]),
            priority: DEFAULT_RECONCILIATION_PRIORITY,
        }
    }

    pub fn with_event_types(mut self, matcher: EventTypeMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }
}

/// Status the gateway should report after a webhook of this kind.
fn expected_status(kind: DomainEventKind) -> Option<TransactionStatus> {
    match kind {
        DomainEventKind::PaymentCompleted => Some(TransactionStatus::Completed),
        DomainEventKind::PaymentFailed => Some(TransactionStatus::Failed),
        DomainEventKind::PaymentRefunded => Some(TransactionStatus::Refunded),
        _ => None,
    }
}

#[async_trait]
impl WebhookProcessor for ReconciliationProcessor {
    fn name(&self) -> &str {
        "reconciliation"
    }

    fn supports(&self, event_type: &str) -> bool {
        self.matcher.matches(event_type)
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    async fn validate(&self, payload: &WebhookPayload) -> bool {
        payload.gateway() == self.gateway.name() && transaction_id(payload).is_some()
    }

    async fn process(&self, payload: &WebhookPayload) -> Result<bool, ProcessorError> {
        let Some(expected) =
            DomainEventKind::from_webhook_event(payload.event_type()).and_then(expected_status)
        else {
            return Ok(true);
        };
        let transaction_id = transaction_id(payload)
            .ok_or_else(|| ProcessorError::invalid_data("missing transaction id"))?;

        let transaction = match self.gateway.get_transaction(transaction_id).await {
            Ok(transaction) => transaction,
            Err(GatewayError::UnsupportedOperation { .. }) => {
                tracing::debug!(
                    target: "payhook::webhooks",
                    gateway = self.gateway.name(),
                    "Gateway cannot look up transactions, skipping reconciliation"
                );
                return Ok(true);
            }
            Err(err) => return Err(err.into()),
        };

        if transaction.status != expected {
            return Err(ProcessorError::failed(format!(
                "transaction {} is {} at the gateway, webhook reported {}",
                transaction_id,
                transaction.status.as_str(),
                expected.as_str()
            )));
        }
        Ok(true)
    }
}
