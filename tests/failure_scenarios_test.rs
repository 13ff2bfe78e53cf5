use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use secrecy::ExposeSecret;
use serde_json::json;
use std::sync::Arc;

use payhook::events::EventDispatcher;
use payhook::webhooks::{
    GatewayRegistry, HandlerOptions, InMemoryWebhookStorage, PaymentWebhookProcessor,
    ProcessorRegistry, SignatureScheme, StaticTokenValidator, TimestampedHmacValidator,
    WebhookHandler, WebhookHeaders,
};
use payhook::{ConfigBuilder, ConfigError, GatewayConfig, ParseError, WebhookError};

#[test]
fn test_error_status_codes() {
    let cases = [
        (WebhookError::InvalidSignature, StatusCode::UNAUTHORIZED),
        (
            WebhookError::MalformedPayload(ParseError::NotAnObject),
            StatusCode::BAD_REQUEST,
        ),
        (WebhookError::unknown_gateway("nope"), StatusCode::NOT_FOUND),
        (
            WebhookError::storage_unavailable("down"),
            StatusCode::SERVICE_UNAVAILABLE,
        ),
        (
            WebhookError::Timeout(std::time::Duration::from_secs(1)),
            StatusCode::SERVICE_UNAVAILABLE,
        ),
    ];

    for (error, status) in cases {
        assert_eq!(error.status_code(), status);
        assert_eq!(error.into_response().status(), status);
    }
}

#[test]
fn test_config_validation_failures() {
    let result = ConfigBuilder::new().with_log_level("verbose").build();
    assert!(result.unwrap_err().to_string().contains("Invalid log level"));

    let result = ConfigBuilder::new().with_max_attempts(0).build();
    assert!(matches!(result, Err(ConfigError::Invalid(_))));

    let result = ConfigBuilder::new()
        .with_gateway(GatewayConfig::new("  ", SignatureScheme::StaticToken, "tok"))
        .build();
    assert!(result.is_err());
}

/// Everything that reads process environment lives in this one test.
#[test]
fn test_config_from_env() {
    unsafe {
        std::env::set_var("PAYHOOK_WEBHOOK_MAX_ATTEMPTS", "7");
        std::env::set_var("PAYHOOK_WEBHOOK_TIMEOUT_SECONDS", "12");
        std::env::set_var("WEBHOOK_TIMESTAMP_TOLERANCE_SECONDS", "90");
        std::env::set_var("PAYHOOK_GATEWAY_ASAAS_SECRET", "tok_asaas");
        std::env::set_var("PAYHOOK_GATEWAY_ASAAS_SCHEME", "static_token");
        std::env::set_var("PAYHOOK_GATEWAY_ASAAS_HEADER", "asaas-access-token");
        std::env::set_var("PAYHOOK_GATEWAY_STRIPE_SECRET", "whsec_stripe");
        std::env::set_var("PAYHOOK_GATEWAY_STRIPE_SCHEME", "timestamped");
    }

    let config = ConfigBuilder::new().from_env().build();

    unsafe {
        for key in [
            "PAYHOOK_WEBHOOK_MAX_ATTEMPTS",
            "PAYHOOK_WEBHOOK_TIMEOUT_SECONDS",
            "WEBHOOK_TIMESTAMP_TOLERANCE_SECONDS",
            "PAYHOOK_GATEWAY_ASAAS_SECRET",
            "PAYHOOK_GATEWAY_ASAAS_SCHEME",
            "PAYHOOK_GATEWAY_ASAAS_HEADER",
            "PAYHOOK_GATEWAY_STRIPE_SECRET",
            "PAYHOOK_GATEWAY_STRIPE_SCHEME",
        ] {
            std::env::remove_var(key);
        }
    }

    let config = config.unwrap();
    assert_eq!(config.webhooks.max_attempts, 7);
    assert_eq!(config.webhooks.timeout_seconds, Some(12));
    assert_eq!(config.webhooks.timestamp_tolerance_seconds, 90);

    let asaas = config.gateways.iter().find(|g| g.name == "asaas").unwrap();
    assert_eq!(asaas.scheme, SignatureScheme::StaticToken);
    assert_eq!(asaas.secret.expose_secret(), "tok_asaas");

    let options = HandlerOptions::from(&config.webhooks);
    assert_eq!(options.max_attempts, 7);

    let registry = GatewayRegistry::from_config(&config).unwrap();
    assert_eq!(registry.names(), ["asaas", "stripe"]);
    assert_eq!(
        registry.get("asaas").unwrap().format().signature_header,
        "asaas-access-token"
    );
    assert!(registry.get("asaas").unwrap().verify(b"{}", "tok_asaas"));

    let stripe = registry.get("stripe").unwrap();
    let header = TimestampedHmacValidator::new().sign(
        b"{}",
        b"whsec_stripe",
        chrono::Utc::now().timestamp() - 60,
    );
    assert!(stripe.verify(b"{}", &header));
    let stale = TimestampedHmacValidator::new().sign(
        b"{}",
        b"whsec_stripe",
        chrono::Utc::now().timestamp() - 120,
    );
    assert!(!stripe.verify(b"{}", &stale));
}

#[tokio::test]
async fn test_http_responses_from_configured_handler() {
    let config = ConfigBuilder::new()
        .with_gateway(
            GatewayConfig::new("asaas", SignatureScheme::StaticToken, "tok_asaas")
                .with_signature_header("asaas-access-token"),
        )
        .build()
        .unwrap();

    let dispatcher = Arc::new(EventDispatcher::new());
    let handler = WebhookHandler::new(
        GatewayRegistry::from_config(&config).unwrap(),
        ProcessorRegistry::new().with(PaymentWebhookProcessor::new(Arc::clone(&dispatcher))),
        InMemoryWebhookStorage::new(),
    )
    .with_options((&config.webhooks).into());

    let body = json!({
        "id": "evt_http",
        "type": "payment.completed",
        "data": { "transaction_id": "tx_9", "amount": 4200, "currency": "BRL" }
    })
    .to_string();

    let mut headers = HeaderMap::new();
    headers.insert("asaas-access-token", "tok_asaas".parse().unwrap());

    let response = handler.respond("asaas", &headers, body.clone()).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = handler.respond("asaas", &headers, "not json").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    headers.insert("asaas-access-token", "tok_guess".parse().unwrap());
    let response = handler.respond("asaas", &headers, body).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_failing_listener_requests_redelivery() {
    let dispatcher = Arc::new(EventDispatcher::new());
    dispatcher.add_listener("payment.completed", |_event| {
        Err(payhook::ListenerError::new("ledger closed"))
    });

    let handler = WebhookHandler::new(
        GatewayRegistry::new().with(payhook::webhooks::GatewayEndpoint::new(
            "asaas",
            StaticTokenValidator,
            "tok",
        )),
        ProcessorRegistry::new().with(PaymentWebhookProcessor::new(dispatcher)),
        InMemoryWebhookStorage::new(),
    );

    let body = r#"{"id":"evt_2","type":"payment.completed","data":{"id":"tx_2","amount":10}}"#;
    let headers = WebhookHeaders::new().with("x-webhook-signature", "tok");
    let report = handler.handle("asaas", body, &headers).await.unwrap();

    assert!(!report.overall_success);
    assert_eq!(report.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        report.processor_results[0].failure_reason(),
        Some("listener failed: ledger closed")
    );
}

#[tokio::test]
async fn test_payment_without_amount_is_not_acknowledged() {
    let dispatcher = Arc::new(EventDispatcher::new());
    let published = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = Arc::clone(&published);
    dispatcher.add_listener("payment.completed", move |_event| {
        counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    });

    let storage = InMemoryWebhookStorage::new();
    let handler = WebhookHandler::new(
        GatewayRegistry::new().with(payhook::webhooks::GatewayEndpoint::new(
            "asaas",
            StaticTokenValidator,
            "tok",
        )),
        ProcessorRegistry::new().with(PaymentWebhookProcessor::new(dispatcher)),
        storage.clone(),
    );

    let body = r#"{"id":"evt_3","type":"payment.completed","data":{"transaction_id":"tx_3"}}"#;
    let headers = WebhookHeaders::new().with("x-webhook-signature", "tok");
    let report = handler.handle("asaas", body, &headers).await.unwrap();

    assert!(!report.overall_success);
    assert_eq!(report.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        report.processor_results[0].failure_reason(),
        Some("invalid event data: missing amount")
    );
    assert_eq!(published.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(storage.records().await[0].status, payhook::webhooks::RecordStatus::Failed);
}
