use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use payhook::events::{DomainEvent, EventDispatcher};
use payhook::webhooks::{
    GatewayEndpoint, GatewayRegistry, HmacValidator, InMemoryWebhookStorage, ProcessorOutcome,
    ProcessorRegistry, RecordStatus, SubscriptionWebhookProcessor, WebhookHandler, WebhookHeaders,
    WebhookPayload, WebhookProcessor, WebhookRecord, WebhookStorage,
};
use payhook::{ProcessorError, StorageError, WebhookError};

const SECRET: &str = "whsec_pipeline";

/// Processor that records each invocation in a shared log.
struct RecordingProcessor {
    name: &'static str,
    priority: u8,
    fail_with: Option<&'static str>,
    log: Arc<Mutex<Vec<String>>>,
}

impl RecordingProcessor {
    fn new(name: &'static str, priority: u8, log: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name,
            priority,
            fail_with: None,
            log: Arc::clone(log),
        }
    }

    fn failing(mut self, reason: &'static str) -> Self {
        self.fail_with = Some(reason);
        self
    }
}

#[async_trait]
impl WebhookProcessor for RecordingProcessor {
    fn name(&self) -> &str {
        self.name
    }

    fn supports(&self, event_type: &str) -> bool {
        event_type.starts_with("payment.")
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    async fn process(&self, payload: &WebhookPayload) -> Result<bool, ProcessorError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.name, payload.event_id()));
        match self.fail_with {
            Some(reason) => Err(ProcessorError::failed(reason)),
            None => Ok(true),
        }
    }
}

/// Storage that counts every call before delegating to the in-memory store.
#[derive(Default)]
struct CountingStorage {
    inner: InMemoryWebhookStorage,
    calls: AtomicUsize,
}

impl CountingStorage {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebhookStorage for CountingStorage {
    async fn find_by_event_id(&self, event_id: &str) -> Result<Option<WebhookRecord>, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_event_id(event_id).await
    }

    async fn create(&self, event_id: &str) -> Result<WebhookRecord, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.create(event_id).await
    }

    async fn update_status(
        &self,
        event_id: &str,
        status: RecordStatus,
        error: Option<&str>,
    ) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.update_status(event_id, status, error).await
    }
}

/// Storage whose backend is down.
struct UnavailableStorage;

#[async_trait]
impl WebhookStorage for UnavailableStorage {
    async fn find_by_event_id(&self, _event_id: &str) -> Result<Option<WebhookRecord>, StorageError> {
        Err(StorageError::Unavailable("connection refused".to_string()))
    }

    async fn create(&self, _event_id: &str) -> Result<WebhookRecord, StorageError> {
        Err(StorageError::Unavailable("connection refused".to_string()))
    }

    async fn update_status(
        &self,
        _event_id: &str,
        _status: RecordStatus,
        _error: Option<&str>,
    ) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("connection refused".to_string()))
    }
}

fn gateways() -> GatewayRegistry {
    GatewayRegistry::new().with(GatewayEndpoint::new("acme", HmacValidator::sha256_hex(), SECRET))
}

fn delivery(event_id: &str, event_type: &str, delivery_id: &str) -> (Vec<u8>, WebhookHeaders) {
    let body = json!({
        "id": event_id,
        "type": event_type,
        "data": { "id": "sub_42", "transaction_id": "tx_1", "amount": 1000 }
    })
    .to_string()
    .into_bytes();
    let headers = WebhookHeaders::new()
        .with("x-webhook-signature", HmacValidator::sha256_hex().sign(&body, SECRET.as_bytes()))
        .with("x-webhook-delivery", delivery_id);
    (body, headers)
}

#[tokio::test]
async fn test_identical_deliveries_run_processors_once() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let processors = ProcessorRegistry::new().with(RecordingProcessor::new("ledger", 50, &log));
    let handler = WebhookHandler::new(gateways(), processors, InMemoryWebhookStorage::new());

    let (body, headers) = delivery("evt_1", "payment.completed", "dlv_1");
    let first = handler.handle("acme", body.clone(), &headers).await.unwrap();
    assert!(first.overall_success);
    assert!(!first.duplicate);

    // Redelivery with a new delivery id, same event
    let (body, headers) = delivery("evt_1", "payment.completed", "dlv_2");
    let second = handler.handle("acme", body, &headers).await.unwrap();
    assert!(second.duplicate);
    assert_eq!(second.status, RecordStatus::Processed);
    assert_eq!(second.delivery_id, "dlv_2");
    assert!(second.processor_results.is_empty());
    assert!(second.is_acknowledged());

    assert_eq!(*log.lock().unwrap(), ["ledger:evt_1"]);
}

#[tokio::test]
async fn test_concurrent_duplicates_create_one_record() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let processors = ProcessorRegistry::new().with(RecordingProcessor::new("ledger", 50, &log));
    let storage = InMemoryWebhookStorage::new();
    let handler = Arc::new(WebhookHandler::new(gateways(), processors, storage.clone()));

    let mut tasks = Vec::new();
    for n in 0..8 {
        let handler = Arc::clone(&handler);
        tasks.push(tokio::spawn(async move {
            let (body, headers) = delivery("evt_race", "payment.completed", &format!("dlv_{n}"));
            handler.handle("acme", body, &headers).await
        }));
    }
    for task in tasks {
        assert!(task.await.unwrap().unwrap().is_acknowledged());
    }

    assert_eq!(storage.len().await, 1);
    let record = storage.find_by_event_id("evt_race").await.unwrap().unwrap();
    assert_eq!(record.status, RecordStatus::Processed);
}

#[tokio::test]
async fn test_higher_priority_runs_first() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let processors = ProcessorRegistry::new()
        .with(RecordingProcessor::new("low", 50, &log))
        .with(RecordingProcessor::new("high", 90, &log));
    let handler = WebhookHandler::new(gateways(), processors, InMemoryWebhookStorage::new());

    let (body, headers) = delivery("evt_1", "payment.completed", "dlv_1");
    let report = handler.handle("acme", body, &headers).await.unwrap();

    assert_eq!(*log.lock().unwrap(), ["high:evt_1", "low:evt_1"]);
    let order: Vec<&str> = report
        .processor_results
        .iter()
        .map(|result| result.processor.as_str())
        .collect();
    assert_eq!(order, ["high", "low"]);
}

#[tokio::test]
async fn test_partial_failure_runs_every_processor() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let processors = ProcessorRegistry::new()
        .with(RecordingProcessor::new("p1", 90, &log).failing("ledger unavailable"))
        .with(RecordingProcessor::new("p2", 50, &log));
    let storage = InMemoryWebhookStorage::new();
    let handler = WebhookHandler::new(gateways(), processors, storage.clone());

    let (body, headers) = delivery("evt_1", "payment.completed", "dlv_1");
    let report = handler.handle("acme", body, &headers).await.unwrap();

    assert_eq!(*log.lock().unwrap(), ["p1:evt_1", "p2:evt_1"]);
    assert_eq!(report.status, RecordStatus::Failed);
    assert!(!report.overall_success);
    assert_eq!(
        report.processor_results[0].outcome,
        ProcessorOutcome::Failed {
            reason: "ledger unavailable".to_string()
        }
    );
    assert_eq!(report.processor_results[1].outcome, ProcessorOutcome::Succeeded);

    let record = storage.find_by_event_id("evt_1").await.unwrap().unwrap();
    assert_eq!(record.status, RecordStatus::Failed);
    assert_eq!(record.last_error.as_deref(), Some("p1: ledger unavailable"));

    // The gateway redelivers; both processors run again
    let (body, headers) = delivery("evt_1", "payment.completed", "dlv_2");
    handler.handle("acme", body, &headers).await.unwrap();
    assert_eq!(log.lock().unwrap().len(), 4);
    let record = storage.find_by_event_id("evt_1").await.unwrap().unwrap();
    assert_eq!(record.attempt_count, 2);
}

#[tokio::test]
async fn test_forged_signature_never_touches_storage() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let processors = ProcessorRegistry::new().with(RecordingProcessor::new("ledger", 50, &log));
    let handler = WebhookHandler::new(gateways(), processors, CountingStorage::default());

    let (body, _) = delivery("evt_1", "payment.completed", "dlv_1");
    let forged = WebhookHeaders::new().with(
        "x-webhook-signature",
        HmacValidator::sha256_hex().sign(&body, b"attacker-secret"),
    );
    let err = handler.handle("acme", body.clone(), &forged).await.unwrap_err();
    assert!(matches!(err, WebhookError::InvalidSignature));

    let err = handler.handle("acme", body, &WebhookHeaders::new()).await.unwrap_err();
    assert!(matches!(err, WebhookError::InvalidSignature));

    assert_eq!(handler.storage().calls(), 0);
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_tampered_body_is_rejected() {
    let handler = WebhookHandler::new(gateways(), ProcessorRegistry::new(), CountingStorage::default());

    let (body, headers) = delivery("evt_1", "payment.completed", "dlv_1");
    let tampered = String::from_utf8(body).unwrap().replace("1000", "9000");
    let err = handler.handle("acme", tampered, &headers).await.unwrap_err();

    assert!(matches!(err, WebhookError::InvalidSignature));
    assert_eq!(handler.storage().calls(), 0);
}

#[tokio::test]
async fn test_subscription_cancelled_scenario() {
    let dispatcher = Arc::new(EventDispatcher::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    dispatcher.add_listener("subscription.cancelled", move |event: &DomainEvent| {
        sink.lock().unwrap().push(event.clone());
        Ok(())
    });

    let processors =
        ProcessorRegistry::new().with(SubscriptionWebhookProcessor::new(Arc::clone(&dispatcher)));
    let storage = CountingStorage::default();
    let handler = WebhookHandler::new(gateways(), processors, storage);

    let (body, headers) = delivery("evt_1", "subscription.cancelled", "dlv_1");
    let report = handler.handle("acme", body, &headers).await.unwrap();

    assert!(report.overall_success);
    assert_eq!(report.status, RecordStatus::Processed);
    assert_eq!(report.processor_results.len(), 1);
    assert_eq!(report.processor_results[0].processor, "subscription");
    assert_eq!(report.processor_results[0].priority, 100);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].event_name(), "subscription.cancelled");
    assert_eq!(seen[0].transaction_id, "sub_42");

    // create, update to Processing, update to Processed
    assert_eq!(handler.storage().calls(), 3);
    let record = handler.storage().inner.find_by_event_id("evt_1").await.unwrap().unwrap();
    assert_eq!(record.status, RecordStatus::Processed);
    assert_eq!(record.attempt_count, 1);
}

#[tokio::test]
async fn test_storage_unavailable_is_transient() {
    let handler = WebhookHandler::new(gateways(), ProcessorRegistry::new(), UnavailableStorage);

    let (body, headers) = delivery("evt_1", "payment.completed", "dlv_1");
    let err = handler.handle("acme", body, &headers).await.unwrap_err();

    assert!(matches!(err, WebhookError::StorageUnavailable(_)));
    assert!(err.is_retryable());
    assert_eq!(err.status_code().as_u16(), 503);
}

#[tokio::test]
async fn test_shared_storage_behind_arc_dyn() {
    let storage: Arc<dyn WebhookStorage> = Arc::new(InMemoryWebhookStorage::new());
    let handler = WebhookHandler::new(gateways(), ProcessorRegistry::new(), Arc::clone(&storage));

    let (body, headers) = delivery("evt_1", "invoice.created", "dlv_1");
    let report = handler.handle("acme", body, &headers).await.unwrap();

    assert!(report.overall_success);
    assert!(storage.find_by_event_id("evt_1").await.unwrap().is_some());
    assert_eq!(storage.cleanup_older_than(Duration::from_secs(60)).await.unwrap(), 0);
}
