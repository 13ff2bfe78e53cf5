//! Domain events published by webhook processors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Kind of domain event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainEventKind {
    PaymentCreated,
    PaymentCompleted,
    PaymentFailed,
    PaymentRefunded,
    SubscriptionCreated,
    SubscriptionCancelled,
}

impl DomainEventKind {
    /// Name listeners subscribe to.
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::PaymentCreated => "payment.created",
            Self::PaymentCompleted => "payment.completed",
            Self::PaymentFailed => "payment.failed",
            Self::PaymentRefunded => "payment.refunded",
            Self::SubscriptionCreated => "subscription.created",
            Self::SubscriptionCancelled => "subscription.cancelled",
        }
    }

    /// Map a gateway webhook event type to a domain event kind.
    ///
    /// Gateways disagree on spelling, so a few common aliases are accepted.
    #[must_use]
    pub fn from_webhook_event(event_type: &str) -> Option<Self> {
        match event_type.to_ascii_lowercase().as_str() {
            "payment.created" | "payment.pending" | "charge.created" => Some(Self::PaymentCreated),
            "payment.completed" | "payment.paid" | "payment.confirmed" | "payment.received"
            | "charge.succeeded" => Some(Self::PaymentCompleted),
            "payment.failed" | "payment.declined" | "charge.failed" => Some(Self::PaymentFailed),
            "payment.refunded" | "charge.refunded" => Some(Self::PaymentRefunded),
            "subscription.created" | "subscription.activated" => Some(Self::SubscriptionCreated),
            "subscription.cancelled" | "subscription.canceled" | "subscription.deleted" => {
                Some(Self::SubscriptionCancelled)
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn is_payment(&self) -> bool {
        matches!(
            self,
            Self::PaymentCreated | Self::PaymentCompleted | Self::PaymentFailed | Self::PaymentRefunded
        )
    }
}

impl fmt::Display for DomainEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_name())
    }
}

/// A payment-level event, decoupled from the webhook that caused it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub kind: DomainEventKind,
    /// Transaction (or subscription) the event is about.
    pub transaction_id: String,
    /// Amount in minor currency units (cents, centavos).
    pub amount: i64,
    /// ISO 4217 code, e.g. "BRL".
    pub currency: String,
    /// Payment method or status tag, e.g. "pix" or "chargeback".
    pub tag: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(
        kind: DomainEventKind,
        transaction_id: impl Into<String>,
        amount: i64,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            transaction_id: transaction_id.into(),
            amount,
            currency: currency.into(),
            tag: None,
            metadata: Map::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_metadata_map(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata.extend(metadata);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn event_name(&self) -> &'static str {
        self.kind.event_name()
    }
}

impl fmt::Display for DomainEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: transaction={}, amount={} {}",
            self.kind, self.transaction_id, self.amount, self.currency
        )
    }
}
