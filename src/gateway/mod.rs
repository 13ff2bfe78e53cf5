//! Payment gateway facade.
//!
//! [`PaymentGateway`] lists every operation the toolkit exposes across
//! gateways. Adapters implement the operations their backend offers; the rest
//! keep the default body and fail with
//! [`GatewayError::UnsupportedOperation`].
//!
//! The HTTP adapters themselves live outside this crate. Webhook processors
//! only use the facade to read back state, e.g. to reconcile a transaction
//! after a notification.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::GatewayError;

/// How a payment is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Pix,
    Card,
    Boleto,
    Wallet,
    Transfer,
}

impl PaymentMethod {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pix => "pix",
            Self::Card => "card",
            Self::Boleto => "boleto",
            Self::Wallet => "wallet",
            Self::Transfer => "transfer",
        }
    }
}

/// Normalized transaction state across gateways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
    Cancelled,
}

impl TransactionStatus {
    /// Convert from a gateway status string.
    ///
    /// Unknown statuses map to `Pending` so they are never mistaken for a
    /// settled payment.
    #[must_use]
    pub fn from_gateway(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "completed" | "paid" | "confirmed" | "received" | "succeeded" | "approved" => {
                Self::Completed
            }
            "failed" | "declined" | "rejected" | "expired" => Self::Failed,
            "refunded" | "chargeback" | "partially_refunded" => Self::Refunded,
            "cancelled" | "canceled" | "voided" => Self::Cancelled,
            _ => Self::Pending,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Request to charge a customer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Amount in minor currency units.
    pub amount: i64,
    pub currency: String,
    pub description: Option<String>,
    pub customer_id: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// A transaction as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub status: TransactionStatus,
    pub method: PaymentMethod,
    pub amount: i64,
    pub currency: String,
}

/// Request to start a recurring charge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub customer_id: String,
    pub plan_id: String,
    pub amount: i64,
    pub currency: String,
}

/// A subscription as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub customer_id: String,
    pub plan_id: String,
    pub active: bool,
}

/// Operations offered by payment gateways.
///
/// Every method has a default body that fails with
/// [`GatewayError::UnsupportedOperation`], so an adapter only implements what
/// its backend supports and callers get a named error for the rest.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Gateway identity, e.g. "asaas".
    fn name(&self) -> &str;

    async fn create_pix_payment(&self, _request: &PaymentRequest) -> Result<Transaction, GatewayError> {
        Err(GatewayError::unsupported(self.name(), "create_pix_payment"))
    }

    async fn create_card_payment(&self, _request: &PaymentRequest) -> Result<Transaction, GatewayError> {
        Err(GatewayError::unsupported(self.name(), "create_card_payment"))
    }

    async fn create_boleto_payment(&self, _request: &PaymentRequest) -> Result<Transaction, GatewayError> {
        Err(GatewayError::unsupported(self.name(), "create_boleto_payment"))
    }

    /// Refund a transaction, fully when `amount` is `None`.
    async fn refund(&self, _transaction_id: &str, _amount: Option<i64>) -> Result<Transaction, GatewayError> {
        Err(GatewayError::unsupported(self.name(), "refund"))
    }

    async fn create_subscription(&self, _request: &SubscriptionRequest) -> Result<Subscription, GatewayError> {
        Err(GatewayError::unsupported(self.name(), "create_subscription"))
    }

    async fn cancel_subscription(&self, _subscription_id: &str) -> Result<Subscription, GatewayError> {
        Err(GatewayError::unsupported(self.name(), "cancel_subscription"))
    }

    async fn get_transaction(&self, _transaction_id: &str) -> Result<Transaction, GatewayError> {
        Err(GatewayError::unsupported(self.name(), "get_transaction"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Gateway that only supports PIX.
    struct PixOnly;

    #[async_trait]
    impl PaymentGateway for PixOnly {
        fn name(&self) -> &str {
            "pix-only"
        }

        async fn create_pix_payment(&self, request: &PaymentRequest) -> Result<Transaction, GatewayError> {
            Ok(Transaction {
                id: "tx_pix_1".to_string(),
                status: TransactionStatus::Pending,
                method: PaymentMethod::Pix,
                amount: request.amount,
                currency: request.currency.clone(),
            })
        }
    }

    #[tokio::test]
    async fn test_supported_operation() {
        let request = PaymentRequest {
            amount: 2500,
            currency: "BRL".to_string(),
            ..Default::default()
        };
        let tx = PixOnly.create_pix_payment(&request).await.unwrap();
        assert_eq!(tx.method, PaymentMethod::Pix);
        assert_eq!(tx.amount, 2500);
    }

    #[tokio::test]
    async fn test_unsupported_operations_are_named() {
        let gateway: Box<dyn PaymentGateway> = Box::new(PixOnly);

        let err = gateway.create_boleto_payment(&PaymentRequest::default()).await.unwrap_err();
        assert_eq!(err, GatewayError::unsupported("pix-only", "create_boleto_payment"));

        let err = gateway.refund("tx_1", None).await.unwrap_err();
        assert_eq!(err, GatewayError::unsupported("pix-only", "refund"));

        let err = gateway.cancel_subscription("sub_1").await.unwrap_err();
        assert_eq!(err, GatewayError::unsupported("pix-only", "cancel_subscription"));
    }

    #[test]
    fn test_status_from_gateway() {
        assert_eq!(TransactionStatus::from_gateway("PAID"), TransactionStatus::Completed);
        assert_eq!(TransactionStatus::from_gateway("declined"), TransactionStatus::Failed);
        assert_eq!(TransactionStatus::from_gateway("chargeback"), TransactionStatus::Refunded);
        assert_eq!(TransactionStatus::from_gateway("canceled"), TransactionStatus::Cancelled);
        assert_eq!(TransactionStatus::from_gateway("awaiting_risk"), TransactionStatus::Pending);
        assert_eq!(TransactionStatus::Completed.as_str(), "completed");
        assert_eq!(PaymentMethod::Boleto.as_str(), "boleto");
    }
}
