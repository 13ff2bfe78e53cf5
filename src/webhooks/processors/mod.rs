//! Processors shipped with the crate.
//!
//! [`PaymentWebhookProcessor`] and [`SubscriptionWebhookProcessor`] translate
//! gateway events into [`DomainEvent`](crate::events::DomainEvent)s.
//! [`ReconciliationProcessor`] double-checks payment events against the
//! gateway's own view of the transaction.

mod payment;
mod reconciliation;
mod subscription;

pub use payment::PaymentWebhookProcessor;
pub use reconciliation::ReconciliationProcessor;
pub use subscription::SubscriptionWebhookProcessor;

use super::payload::WebhookPayload;

/// Transaction id of a payment event, under the usual field names.
fn transaction_id(payload: &WebhookPayload) -> Option<&str> {
    ["transaction_id", "payment_id", "id"]
        .into_iter()
        .find_map(|key| payload.data_str(key))
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
pub(crate) fn test_payload(event_type: &str, data: serde_json::Value) -> WebhookPayload {
    use super::headers::WebhookHeaders;
    use super::payload::PayloadFormat;

    let body = serde_json::json!({ "id": "evt_test", "type": event_type, "data": data });
    WebhookPayload::parse(
        "acme",
        body.to_string(),
        &WebhookHeaders::new(),
        &PayloadFormat::default(),
    )
    .unwrap()
}
