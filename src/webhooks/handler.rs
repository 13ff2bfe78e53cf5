//! The webhook pipeline: authenticate, parse, deduplicate, process, report.

use axum::{
    Json,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::audit::{NoOpAuditLogger, WebhookAuditEvent, WebhookAuditLogger};
use super::gateways::GatewayRegistry;
use super::headers::WebhookHeaders;
use super::payload::WebhookPayload;
use super::processor::{MAX_PRIORITY, ProcessorOutcome, ProcessorResult, WebhookProcessor};
use super::registry::ProcessorRegistry;
use super::storage::{RecordStatus, WebhookRecord, WebhookStorage};
use crate::config::WebhookConfig;
use crate::error::{Result, StorageError, WebhookError};

/// Stage of a delivery inside [`WebhookHandler`]. Logged as the `state` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerState {
    Received,
    Authenticating,
    Parsing,
    Deduping,
    Processing,
    Processed,
    Failed,
}

impl HandlerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Authenticating => "authenticating",
            Self::Parsing => "parsing",
            Self::Deduping => "deduping",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for HandlerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Knobs for [`WebhookHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerOptions {
    /// A `Failed` event that already started this many attempts is
    /// acknowledged without running processors again.
    pub max_attempts: u32,
    /// Deadline applied by [`WebhookHandler::handle`]. `None` runs unbounded.
    pub deadline: Option<Duration>,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            deadline: None,
        }
    }
}

impl From<&WebhookConfig> for HandlerOptions {
    fn from(config: &WebhookConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            deadline: config.timeout(),
        }
    }
}

/// Outcome of one delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookReport {
    pub event_id: String,
    pub event_type: String,
    pub delivery_id: String,
    /// `Processed` or `Failed`.
    pub status: RecordStatus,
    pub overall_success: bool,
    /// Results in execution order.
    pub processor_results: Vec<ProcessorResult>,
    /// The event had already been processed; nothing ran.
    pub duplicate: bool,
    /// The event failed and will not be retried any more.
    pub retries_exhausted: bool,
}

impl WebhookReport {
    /// HTTP status to answer the gateway with.
    ///
    /// A failed delivery answers 500 so the gateway redelivers it, unless
    /// retries are exhausted, in which case it is acknowledged with 200.
    pub fn status_code(&self) -> StatusCode {
        if self.overall_success || self.retries_exhausted {
            StatusCode::OK
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    /// Whether the gateway should consider the delivery done.
    pub fn is_acknowledged(&self) -> bool {
        self.status_code().is_success()
    }

    /// Results of the processors that failed.
    pub fn failures(&self) -> impl Iterator<Item = &ProcessorResult> {
        self.processor_results
            .iter()
            .filter(|result| result.outcome.is_failure())
    }

    fn without_processing(payload: &WebhookPayload, status: RecordStatus) -> Self {
        Self {
            event_id: payload.event_id().to_string(),
            event_type: payload.event_type().to_string(),
            delivery_id: payload.delivery_id().to_string(),
            status,
            overall_success: status == RecordStatus::Processed,
            processor_results: Vec::new(),
            duplicate: false,
            retries_exhausted: false,
        }
    }
}

impl IntoResponse for WebhookReport {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

/// Verifies, deduplicates and processes webhook deliveries.
///
/// One handler serves every gateway. Share it by `Arc`; each delivery is an
/// independent call to [`handle`](Self::handle).
///
/// # Example
///
/// ```rust,ignore
/// let handler = WebhookHandler::new(gateways, processors, InMemoryWebhookStorage::new())
///     .with_audit_logger(TracingAuditLogger);
///
/// let report = handler.handle("asaas", body, &headers).await?;
/// assert!(report.is_acknowledged());
/// ```
pub struct WebhookHandler<S> {
    gateways: GatewayRegistry,
    processors: ProcessorRegistry,
    storage: S,
    audit: Arc<dyn WebhookAuditLogger>,
    options: HandlerOptions,
}

impl<S: WebhookStorage> WebhookHandler<S> {
    pub fn new(gateways: GatewayRegistry, processors: ProcessorRegistry, storage: S) -> Self {
        Self {
            gateways,
            processors,
            storage,
            audit: Arc::new(NoOpAuditLogger),
            options: HandlerOptions::default(),
        }
    }

    pub fn with_audit_logger(mut self, logger: impl WebhookAuditLogger + 'static) -> Self {
        self.audit = Arc::new(logger);
        self
    }

    pub fn with_options(mut self, options: HandlerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.options.max_attempts = max_attempts;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.options.deadline = Some(deadline);
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn processors(&self) -> &ProcessorRegistry {
        &self.processors
    }

    pub fn gateways(&self) -> &GatewayRegistry {
        &self.gateways
    }

    pub fn options(&self) -> HandlerOptions {
        self.options
    }

    /// Handle one delivery from `gateway`.
    ///
    /// Applies the configured deadline, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`WebhookError`] when the delivery is rejected before
    /// processing or storage fails. Processor failures are not errors: they
    /// are reported in the returned [`WebhookReport`].
    pub async fn handle(
        &self,
        gateway: &str,
        raw_body: impl Into<Vec<u8>>,
        headers: &WebhookHeaders,
    ) -> Result<WebhookReport> {
        let raw_body = raw_body.into();
        match self.options.deadline {
            Some(deadline) => self.handle_with_deadline(gateway, raw_body, headers, deadline).await,
            None => self.run(gateway, raw_body, headers).await,
        }
    }

    /// Like [`handle`](Self::handle), failing with [`WebhookError::Timeout`]
    /// when the whole delivery takes longer than `deadline`.
    ///
    /// A timed-out delivery may leave its record in `Processing`; the next
    /// redelivery retries it.
    pub async fn handle_with_deadline(
        &self,
        gateway: &str,
        raw_body: impl Into<Vec<u8>>,
        headers: &WebhookHeaders,
        deadline: Duration,
    ) -> Result<WebhookReport> {
        let raw_body = raw_body.into();
        match tokio::time::timeout(deadline, self.run(gateway, raw_body, headers)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    target: "payhook::webhooks",
                    gateway,
                    deadline_ms = deadline.as_millis() as u64,
                    "Webhook delivery timed out"
                );
                self.audit
                    .log(WebhookAuditEvent::Rejected {
                        gateway: gateway.to_string(),
                        reason: "timed out".to_string(),
                    })
                    .await;
                Err(WebhookError::Timeout(deadline))
            }
        }
    }

    /// Handle a delivery straight from an axum route.
    ///
    /// ```rust,ignore
    /// async fn webhook(
    ///     State(handler): State<Arc<WebhookHandler<InMemoryWebhookStorage>>>,
    ///     Path(gateway): Path<String>,
    ///     headers: HeaderMap,
    ///     body: Bytes,
    /// ) -> Response {
    ///     handler.respond(&gateway, &headers, body).await
    /// }
    /// ```
    pub async fn respond(
        &self,
        gateway: &str,
        headers: &HeaderMap,
        raw_body: impl Into<Vec<u8>>,
    ) -> Response {
        let headers = WebhookHeaders::from(headers);
        match self.handle(gateway, raw_body, &headers).await {
            Ok(report) => report.into_response(),
            Err(err) => err.into_response(),
        }
    }

    async fn run(
        &self,
        gateway: &str,
        raw_body: Vec<u8>,
        headers: &WebhookHeaders,
    ) -> Result<WebhookReport> {
        enter(HandlerState::Received, gateway, None);

        // Authenticating: nothing below may touch storage until this passes
        enter(HandlerState::Authenticating, gateway, None);
        let Some(endpoint) = self.gateways.get(gateway) else {
            self.reject(gateway, "unknown gateway").await;
            return Err(WebhookError::unknown_gateway(gateway));
        };

        let signature = headers
            .get(&endpoint.format().signature_header)
            .map(str::trim)
            .filter(|value| !value.is_empty());
        let Some(signature) = signature else {
            self.reject(gateway, "missing signature header").await;
            return Err(WebhookError::InvalidSignature);
        };
        if !endpoint.verify(&raw_body, signature) {
            self.reject(gateway, "invalid signature").await;
            return Err(WebhookError::InvalidSignature);
        }

        enter(HandlerState::Parsing, gateway, None);
        let payload = match WebhookPayload::parse(gateway, raw_body, headers, endpoint.format()) {
            Ok(payload) => payload,
            Err(err) => {
                self.reject(gateway, &err.to_string()).await;
                return Err(err.into());
            }
        };

        self.audit
            .log(WebhookAuditEvent::Received {
                gateway: gateway.to_string(),
                event_id: payload.event_id().to_string(),
                event_type: payload.event_type().to_string(),
                delivery_id: payload.delivery_id().to_string(),
            })
            .await;

        enter(HandlerState::Deduping, gateway, Some(&payload));
        let previous = match self.dedupe(&payload).await? {
            Dedupe::Fresh => None,
            Dedupe::Retry(record) => Some(record),
            Dedupe::Done(report) => return Ok(report),
        };
        // Local estimate; `finish` prefers the stored count on failure
        let attempt = previous.map_or(0, |record| record.attempt_count).saturating_add(1);

        enter(HandlerState::Processing, gateway, Some(&payload));
        self.storage
            .update_status(payload.event_id(), RecordStatus::Processing, None)
            .await?;

        let processors = self.processors.resolve(payload.event_type());
        if processors.is_empty() {
            tracing::debug!(
                target: "payhook::webhooks",
                gateway,
                event_type = payload.event_type(),
                "No processor supports this event type"
            );
        }

        let mut results = Vec::with_capacity(processors.len());
        for processor in processors {
            let outcome = run_processor(processor.as_ref(), &payload).await;
            results.push(ProcessorResult {
                processor: processor.name().to_string(),
                priority: processor.priority().min(MAX_PRIORITY),
                outcome,
            });
        }

        self.finish(payload, results, attempt).await
    }

    /// Pass the idempotency gate.
    async fn dedupe(&self, payload: &WebhookPayload) -> Result<Dedupe> {
        let event_id = payload.event_id();
        match self.storage.create(event_id).await {
            Ok(_) => return Ok(Dedupe::Fresh),
            Err(StorageError::AlreadyExists { .. }) => {}
            Err(err) => return Err(err.into()),
        }

        let Some(record) = self.storage.find_by_event_id(event_id).await? else {
            // Deleted between create and find, e.g. by retention cleanup
            return Err(WebhookError::storage_unavailable(format!(
                "record for {event_id} disappeared during deduplication"
            )));
        };

        if record.status == RecordStatus::Processed {
            tracing::info!(
                target: "payhook::webhooks",
                gateway = payload.gateway(),
                event_id,
                delivery_id = payload.delivery_id(),
                "Duplicate webhook, already processed"
            );
            self.audit
                .log(WebhookAuditEvent::Duplicate {
                    gateway: payload.gateway().to_string(),
                    event_id: event_id.to_string(),
                    delivery_id: payload.delivery_id().to_string(),
                })
                .await;

            let mut report = WebhookReport::without_processing(payload, RecordStatus::Processed);
            report.duplicate = true;
            return Ok(Dedupe::Done(report));
        }

        if record.status == RecordStatus::Failed && record.attempt_count >= self.options.max_attempts {
            tracing::warn!(
                target: "payhook::webhooks",
                gateway = payload.gateway(),
                event_id,
                attempts = record.attempt_count,
                "Webhook retries exhausted, acknowledging without processing"
            );
            self.audit
                .log(WebhookAuditEvent::Failed {
                    gateway: payload.gateway().to_string(),
                    event_id: event_id.to_string(),
                    event_type: payload.event_type().to_string(),
                    error: record.last_error.clone().unwrap_or_else(|| "retries exhausted".to_string()),
                })
                .await;

            let mut report = WebhookReport::without_processing(payload, RecordStatus::Failed);
            report.retries_exhausted = true;
            return Ok(Dedupe::Done(report));
        }

        tracing::debug!(
            target: "payhook::webhooks",
            gateway = payload.gateway(),
            event_id,
            status = %record.status,
            attempts = record.attempt_count,
            "Retrying unfinished webhook"
        );
        Ok(Dedupe::Retry(record))
    }

    /// Persist the final status and build the report.
    async fn finish(
        &self,
        payload: WebhookPayload,
        results: Vec<ProcessorResult>,
        attempt: u32,
    ) -> Result<WebhookReport> {
        let failures: Vec<String> = results
            .iter()
            .filter_map(|result| {
                result
                    .failure_reason()
                    .map(|reason| format!("{}: {}", result.processor, reason))
            })
            .collect();

        let mut report = WebhookReport::without_processing(&payload, RecordStatus::Processed);
        report.processor_results = results;

        if failures.is_empty() {
            self.storage
                .update_status(payload.event_id(), RecordStatus::Processed, None)
                .await?;
            enter(HandlerState::Processed, payload.gateway(), Some(&payload));

            tracing::info!(
                target: "payhook::webhooks",
                gateway = payload.gateway(),
                event_id = payload.event_id(),
                event_type = payload.event_type(),
                processors = report.processor_results.len(),
                "Webhook processed"
            );
            self.audit
                .log(WebhookAuditEvent::Processed {
                    gateway: payload.gateway().to_string(),
                    event_id: payload.event_id().to_string(),
                    event_type: payload.event_type().to_string(),
                    processors: report.processor_results.len(),
                })
                .await;
            return Ok(report);
        }

        let error = failures.join("; ");
        self.storage
            .update_status(payload.event_id(), RecordStatus::Failed, Some(&error))
            .await?;
        enter(HandlerState::Failed, payload.gateway(), Some(&payload));

        // Concurrent redeliveries each bump the stored count, so it can be
        // ahead of the count read during deduplication.
        let attempt = match self.storage.find_by_event_id(payload.event_id()).await {
            Ok(Some(record)) => record.attempt_count.max(attempt),
            Ok(None) => attempt,
            Err(err) => {
                tracing::debug!(
                    target: "payhook::webhooks",
                    event_id = payload.event_id(),
                    error = %err,
                    "Could not re-read attempt count"
                );
                attempt
            }
        };

        report.status = RecordStatus::Failed;
        report.overall_success = false;
        report.retries_exhausted = attempt >= self.options.max_attempts;

        tracing::warn!(
            target: "payhook::webhooks",
            gateway = payload.gateway(),
            event_id = payload.event_id(),
            event_type = payload.event_type(),
            attempt,
            retries_exhausted = report.retries_exhausted,
            error = %error,
            "Webhook processing failed"
        );
        self.audit
            .log(WebhookAuditEvent::Failed {
                gateway: payload.gateway().to_string(),
                event_id: payload.event_id().to_string(),
                event_type: payload.event_type().to_string(),
                error,
            })
            .await;
        Ok(report)
    }

    async fn reject(&self, gateway: &str, reason: &str) {
        tracing::warn!(target: "payhook::webhooks", gateway, reason, "Webhook rejected");
        self.audit
            .log(WebhookAuditEvent::Rejected {
                gateway: gateway.to_string(),
                reason: reason.to_string(),
            })
            .await;
    }
}

impl<S> fmt::Debug for WebhookHandler<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookHandler")
            .field("gateways", &self.gateways.names())
            .field("processors", &self.processors)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

enum Dedupe {
    /// First sight of the event.
    Fresh,
    /// Seen before but not finished; process again.
    Retry(WebhookRecord),
    /// Nothing to run.
    Done(WebhookReport),
}

fn enter(state: HandlerState, gateway: &str, payload: Option<&WebhookPayload>) {
    match payload {
        Some(payload) => tracing::trace!(
            target: "payhook::webhooks",
            state = %state,
            gateway,
            event_id = payload.event_id(),
            event_type = payload.event_type(),
            "Webhook state"
        ),
        None => tracing::trace!(target: "payhook::webhooks", state = %state, gateway, "Webhook state"),
    }
}

async fn run_processor(processor: &dyn WebhookProcessor, payload: &WebhookPayload) -> ProcessorOutcome {
    if !processor.validate(payload).await {
        tracing::debug!(
            target: "payhook::webhooks",
            processor = processor.name(),
            event_id = payload.event_id(),
            "Processor skipped, validation returned false"
        );
        return ProcessorOutcome::Skipped;
    }

    match processor.process(payload).await {
        Ok(true) => ProcessorOutcome::Succeeded,
        Ok(false) => ProcessorOutcome::Failed {
            reason: "processor reported failure".to_string(),
        },
        Err(err) => {
            tracing::debug!(
                target: "payhook::webhooks",
                processor = processor.name(),
                event_id = payload.event_id(),
                error = %err,
                "Processor failed"
            );
            ProcessorOutcome::Failed {
                reason: err.to_string(),
            }
        }
    }
}
