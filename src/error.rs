use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::time::Duration;

/// Errors that end a webhook delivery before (or instead of) processing.
///
/// Processor failures are not represented here: they are aggregated into the
/// [`WebhookReport`](crate::webhooks::WebhookReport) instead of aborting the
/// pipeline.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Unknown gateway: {0}")]
    UnknownGateway(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Malformed payload: {0}")]
    MalformedPayload(#[from] ParseError),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Webhook processing timed out after {0:?}")]
    Timeout(Duration),
}

impl WebhookError {
    pub fn unknown_gateway(gateway: impl Into<String>) -> Self {
        Self::UnknownGateway(gateway.into())
    }

    pub fn storage_unavailable(msg: impl Into<String>) -> Self {
        Self::StorageUnavailable(msg.into())
    }

    /// Whether the gateway should redeliver the webhook.
    ///
    /// Authentication and parsing failures are permanent: the same bytes will
    /// fail the same way on every retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_) | Self::Timeout(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownGateway(_) => StatusCode::NOT_FOUND,
            Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            Self::StorageUnavailable(_) | Self::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Returns a message suitable for the response body.
    ///
    /// Client errors are returned as-is. Server errors hide their details,
    /// which are logged instead (CWE-209).
    fn safe_message(&self) -> String {
        match self {
            Self::UnknownGateway(_) | Self::InvalidSignature | Self::MalformedPayload(_) => {
                self.to_string()
            }
            Self::StorageUnavailable(_) => "Service unavailable".to_string(),
            Self::Timeout(_) => "Webhook processing timed out".to_string(),
        }
    }
}

/// Body returned to the gateway when a delivery is rejected.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_id: String,
    pub retryable: bool,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_id = uuid::Uuid::new_v4().to_string();

        if status.is_server_error() {
            tracing::error!(
                target: "payhook::webhooks",
                status = status.as_u16(),
                error_id = %error_id,
                error = %self,
                "Webhook delivery failed"
            );
        } else {
            tracing::warn!(
                target: "payhook::webhooks",
                status = status.as_u16(),
                error_id = %error_id,
                error = %self,
                "Webhook delivery rejected"
            );
        }

        let body = Json(ErrorResponse {
            error: self.safe_message(),
            error_id,
            retryable: self.is_retryable(),
        });

        (status, body).into_response()
    }
}

/// Failure to turn raw webhook bytes into a [`WebhookPayload`](crate::webhooks::WebhookPayload).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("body is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("body must be a JSON object")]
    NotAnObject,

    #[error("missing required field '{0}'")]
    MissingField(String),

    #[error("field '{0}' must be a JSON object")]
    InvalidData(String),
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        ParseError::InvalidJson(err.to_string())
    }
}

/// Errors reported by a [`WebhookStorage`](crate::webhooks::WebhookStorage) backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// A record for this event already exists. Used as the idempotency gate.
    #[error("Webhook record already exists: {event_id}")]
    AlreadyExists { event_id: String },

    #[error("Webhook record not found: {event_id}")]
    NotFound { event_id: String },

    /// The backend could not be reached or failed mid-operation.
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

impl From<StorageError> for WebhookError {
    fn from(err: StorageError) -> Self {
        WebhookError::StorageUnavailable(err.to_string())
    }
}

/// Failure raised by a single webhook processor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessorError {
    #[error("invalid event data: {0}")]
    InvalidData(String),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("{0}")]
    Failed(String),
}

impl ProcessorError {
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

impl From<serde_json::Error> for ProcessorError {
    fn from(err: serde_json::Error) -> Self {
        ProcessorError::InvalidData(err.to_string())
    }
}

/// Error returned by an [`EventDispatcher`](crate::events::EventDispatcher) listener.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("listener failed: {0}")]
pub struct ListenerError(pub String);

impl ListenerError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Errors from the payment gateway facade.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The configured gateway does not implement this operation.
    #[error("Gateway '{gateway}' does not support operation '{operation}'")]
    UnsupportedOperation { gateway: String, operation: String },

    #[error("Transaction not found: {transaction_id}")]
    TransactionNotFound { transaction_id: String },

    #[error("Gateway request failed: {0}")]
    Request(String),
}

impl GatewayError {
    pub fn unsupported(gateway: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            gateway: gateway.into(),
            operation: operation.into(),
        }
    }
}

/// Invalid configuration detected by [`ConfigBuilder::build`](crate::ConfigBuilder::build).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Unknown signature scheme: {0}")]
    UnknownScheme(String),
}

impl ConfigError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Result type alias for the webhook pipeline.
pub type Result<T, E = WebhookError> = std::result::Result<T, E>;
