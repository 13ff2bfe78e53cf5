//! payhook - webhook ingestion for payment gateway integrations
//!
//! Payment gateways notify you asynchronously: a PIX transfer settles, a card
//! charge is refunded, a subscription is cancelled. payhook turns those raw
//! HTTP deliveries into verified, deduplicated, ordered reactions.
//!
//! # Features
//!
//! - **Verification**: HMAC (SHA-256/512, hex/base64), timestamped and
//!   static-token signatures, checked in constant time
//! - **Idempotency**: an atomic record store gate, so retried deliveries run
//!   side effects once
//! - **Processors**: prioritized, independent reactions per event type
//! - **Domain events**: an explicit in-process bus for payment events
//! - **axum**: reports and errors convert into responses
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use payhook::events::EventDispatcher;
//! use payhook::webhooks::{
//!     GatewayRegistry, InMemoryWebhookStorage, PaymentWebhookProcessor, ProcessorRegistry,
//!     WebhookHandler, WebhookHeaders,
//! };
//! use payhook::ConfigBuilder;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigBuilder::new().from_env().build()?;
//!     payhook::init_tracing_with_config(&config);
//!
//!     let dispatcher = Arc::new(EventDispatcher::new());
//!     let processors = ProcessorRegistry::new()
//!         .with(PaymentWebhookProcessor::new(Arc::clone(&dispatcher)));
//!
//!     let handler = WebhookHandler::new(
//!         GatewayRegistry::from_config(&config)?,
//!         processors,
//!         InMemoryWebhookStorage::new(),
//!     )
//!     .with_options((&config.webhooks).into());
//!
//!     let headers = WebhookHeaders::new().with("x-webhook-signature", "...");
//!     let report = handler.handle("asaas", br#"{"id":"evt_1","type":"payment.completed"}"#.to_vec(), &headers).await?;
//!     println!("{}", report.status_code());
//!     Ok(())
//! }
//! ```

mod config;
mod error;
pub mod events;
pub mod gateway;
pub mod utils;
pub mod webhooks;

// Re-exports for public API
pub use config::{Config, ConfigBuilder, GatewayConfig, LoggingConfig, WebhookConfig};
pub use error::{
    ConfigError, ErrorResponse, GatewayError, ListenerError, ParseError, ProcessorError, Result,
    StorageError, WebhookError,
};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging with sensible defaults
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "payhook=debug")
/// - `PAYHOOK_LOG_JSON`: Set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("PAYHOOK_LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Initialize tracing from [`LoggingConfig`]
///
/// `RUST_LOG` still wins when set, so a single module can be turned up
/// without touching the configuration.
pub fn init_tracing_with_config(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
