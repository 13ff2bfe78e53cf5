use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::ProcessorError;
use crate::events::{DomainEvent, DomainEventKind, EventDispatcher};
use crate::webhooks::payload::WebhookPayload;
use crate::webhooks::processor::{MAX_PRIORITY, WebhookProcessor};

/// Turns subscription webhooks into subscription domain events.
///
/// The published event's `transaction_id` is the subscription id and its
/// tag is the plan, when the gateway sends one. Lifecycle events often carry
/// no amount (a cancellation moves no money), so a missing `amount` is 0.
pub struct SubscriptionWebhookProcessor {
    dispatcher: Arc<EventDispatcher>,
    default_currency: String,
}

#[derive(Debug, Deserialize)]
struct SubscriptionData {
    #[serde(alias = "id")]
    subscription_id: String,
    #[serde(default)]
    amount: i64,
    currency: Option<String>,
    plan_id: Option<String>,
    customer_id: Option<String>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

impl SubscriptionWebhookProcessor {
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
impl WebhookProcessor for SubscriptionWebhookProcessor {
    fn name(&self) -> &str {
        "subscription"
    }

    fn supports(&self, event_type: &str) -> bool {
        DomainEventKind::from_webhook_event(event_type).is_some_and(|kind| !kind.is_payment())
    }

    fn priority(&self) -> u8 {
        MAX_PRIORITY
    }

    async fn process(&self, payload: &WebhookPayload) -> Result<bool, ProcessorError> {
        let Some(kind) = DomainEventKind::from_webhook_event(payload.event_type()) else {
            return Ok(false);
        };
        let data: SubscriptionData = payload.data_as()?;
        if data.subscription_id.is_empty() {
            return Err(ProcessorError::invalid_data("empty subscription id"));
        }

        let currency = data
            .currency
            .filter(|currency| !currency.is_empty())
            .unwrap_or_else(|| self.default_currency.clone());
        let mut event = DomainEvent::new(kind, data.subscription_id, data.amount, currency)
            .with_metadata("gateway", payload.gateway())
            .with_metadata("webhook_event_id", payload.event_id())
            .with_metadata_map(data.metadata);
        if let Some(customer_id) = data.customer_id {
            event = event.with_metadata("customer_id", customer_id);
        }
        if let Some(plan_id) = data.plan_id {
            event = event.with_tag(plan_id);
        }

        tracing::debug!(
            target: "payhook::webhooks",
            processor = self.name(),
            event = %event,
            "Publishing subscription event"
        );
        self.dispatcher.dispatch(&event)?;
        Ok(true)
    }
}
