//! Webhook ingestion pipeline.
//!
//! A delivery flows through [`WebhookHandler::handle`]:
//!
//! 1. the gateway's [`SignatureValidator`] authenticates the raw bytes,
//! 2. [`WebhookPayload::parse`] extracts the event type, ids and data,
//! 3. [`WebhookStorage::create`] acts as the idempotency gate,
//! 4. the [`ProcessorRegistry`] picks the processors, highest priority first,
//! 5. the final status is stored and a [`WebhookReport`] is returned.
//!
//! Both [`WebhookReport`] and [`WebhookError`](crate::WebhookError)
//! implement axum's `IntoResponse`, so a route can return them directly.

pub mod audit;
pub mod gateways;
pub mod handler;
pub mod headers;
pub mod payload;
pub mod processor;
pub mod processors;
pub mod registry;
pub mod storage;
pub mod verification;

pub use audit::{NoOpAuditLogger, TracingAuditLogger, WebhookAuditEvent, WebhookAuditLogger};
pub use gateways::{GatewayEndpoint, GatewayRegistry};
pub use handler::{HandlerOptions, HandlerState, WebhookHandler, WebhookReport};
pub use headers::WebhookHeaders;
pub use payload::{PayloadFormat, WebhookPayload};
pub use processor::{
    DEFAULT_PRIORITY, EventTypeMatcher, MAX_PRIORITY, ProcessorOutcome, ProcessorResult,
    WebhookProcessor,
};
pub use processors::{PaymentWebhookProcessor, ReconciliationProcessor, SubscriptionWebhookProcessor};
pub use registry::ProcessorRegistry;
pub use storage::{InMemoryWebhookStorage, RecordStatus, WebhookRecord, WebhookStorage};
pub use verification::{
    DEFAULT_TIMESTAMP_TOLERANCE_SECONDS, HmacAlgorithm, HmacValidator, NoVerification,
    SignatureEncoding, SignatureScheme, SignatureValidator, StaticTokenValidator,
    TimestampedHmacValidator,
};
