use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::transaction_id;
use crate::error::ProcessorError;
use crate::events::{DomainEvent, DomainEventKind, EventDispatcher};
use crate::webhooks::payload::WebhookPayload;
use crate::webhooks::processor::{MAX_PRIORITY, WebhookProcessor};

/// Turns payment webhooks into payment domain events.
///
/// Supports every event type that [`DomainEventKind::from_webhook_event`]
/// maps to a payment kind (`payment.completed`, `payment.paid`,
/// `charge.refunded`, ...). The event data must carry a transaction id
/// (`transaction_id`, `payment_id` or `id`) and an `amount` in minor units.
/// Events missing either fail with [`ProcessorError::InvalidData`] so the
/// delivery is retried instead of publishing a zero amount.
pub struct PaymentWebhookProcessor {
    dispatcher: Arc<EventDispatcher>,
    default_currency: String,
}

#[derive(Debug, Deserialize)]
struct PaymentData {
    amount: Option<i64>,
    currency: Option<String>,
    method: Option<String>,
    status: Option<String>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

impl PaymentWebhookProcessor {
    pub fn new(dispatcher: Arc<EventDispatcher>) -> Self {
        Self {
            dispatcher,
            default_currency: "BRL".to_string(),
        }
    }

    /// Currency used when the event does not name one (default: BRL).
    pub fn with_default_currency(mut self, currency: impl Into<String>) -> Self {
        self.default_currency = currency.into();
        self
    }
}

#[async_trait]
impl WebhookProcessor for PaymentWebhookProcessor {
    fn name(&self) -> &str {
        "payment"
    }

    fn supports(&self, event_type: &str) -> bool {
        DomainEventKind::from_webhook_event(event_type).is_some_and(|kind| kind.is_payment())
    }

    fn priority(&self) -> u8 {
        MAX_PRIORITY
    }

    async fn process(&self, payload: &WebhookPayload) -> Result<bool, ProcessorError> {
        let Some(kind) = DomainEventKind::from_webhook_event(payload.event_type()) else {
            return Ok(false);
        };
        let transaction_id = transaction_id(payload)
            .ok_or_else(|| ProcessorError::invalid_data("missing transaction id"))?
            .to_string();
        let data: PaymentData = payload.data_as()?;
        let amount = data
            .amount
            .ok_or_else(|| ProcessorError::invalid_data("missing amount"))?;

        let mut event = DomainEvent::new(
            kind,
            transaction_id,
            amount,
            data.currency.unwrap_or_else(|| self.default_currency.clone()),
        )
        .with_metadata("gateway", payload.gateway())
        .with_metadata("webhook_event_id", payload.event_id())
        .with_metadata_map(data.metadata);
        if let Some(tag) = data.method.or(data.status) {
            event = event.with_tag(tag);
        }

        tracing::debug!(
            target: "payhook::webhooks",
            processor = self.name(),
            event = %event,
            "Publishing payment event"
        );
        self.dispatcher.dispatch(&event)?;
        Ok(true)
    }
}
