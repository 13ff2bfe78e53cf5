use async_trait::async_trait;
use serde::Serialize;

use super::payload::WebhookPayload;
use crate::error::ProcessorError;

/// Highest priority a processor may declare. Larger values are clamped.
pub const MAX_PRIORITY: u8 = 100;

/// Priority used when a processor does not declare one.
pub const DEFAULT_PRIORITY: u8 = 50;

/// Domain-specific reaction to a webhook event.
///
/// Processors are stateless singletons registered once at startup. They must
/// not depend on each other's side effects: a failing processor does not stop
/// the ones after it.
///
/// # Example
///
/// ```rust,ignore
/// use payhook::webhooks::{WebhookPayload, WebhookProcessor};
///
/// struct LedgerProcessor {
///     ledger: Ledger,
/// }
///
/// #[async_trait]
/// impl WebhookProcessor for LedgerProcessor {
///     fn name(&self) -> &str {
///         "ledger"
///     }
///
///     fn supports(&self, event_type: &str) -> bool {
///         event_type == "payment.completed"
///     }
///
///     async fn process(&self, payload: &WebhookPayload) -> Result<bool, ProcessorError> {
///         self.ledger.credit(payload.data_as()?).await?;
///         Ok(true)
///     }
/// }
/// ```
#[async_trait]
pub trait WebhookProcessor: Send + Sync {
    /// Name used in logs and in the per-processor results.
    fn name(&self) -> &str;

    /// Whether this processor reacts to `event_type`.
    fn supports(&self, event_type: &str) -> bool;

    /// Execution priority, 0 to 100. Higher runs first.
    fn priority(&self) -> u8 {
        DEFAULT_PRIORITY
    }

    /// Cheap precondition checked before [`process`](Self::process).
    ///
    /// Returning `false` skips the processor without counting as a failure.
    async fn validate(&self, _payload: &WebhookPayload) -> bool {
        true
    }

    /// React to the event. `Ok(false)` and `Err(_)` both count as failures.
    async fn process(&self, payload: &WebhookPayload) -> Result<bool, ProcessorError>;
}

/// What happened to one processor during a delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessorOutcome {
    Succeeded,
    /// `validate` returned false.
    Skipped,
    Failed { reason: String },
}

impl ProcessorOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Per-processor entry of a [`WebhookReport`](super::WebhookReport).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessorResult {
    pub processor: String,
    pub priority: u8,
    #[serde(flatten)]
    pub outcome: ProcessorOutcome,
}

impl ProcessorResult {
    pub fn failure_reason(&self) -> Option<&str> {
        match &self.outcome {
            ProcessorOutcome::Failed { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Declarative event-type matching for processors.
///
/// Patterns are exact names (`payment.completed`), namespace wildcards
/// (`payment.*`, matching `payment.completed` but not `payment` itself) or `*`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventTypeMatcher {
    patterns: Vec<String>,
}

impl EventTypeMatcher {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    /// Matches every event type.
    pub fn any() -> Self {
        Self::new(["*"])
    }

    pub fn matches(&self, event_type: &str) -> bool {
        self.patterns.iter().any(|pattern| {
            if pattern == "*" {
                return true;
            }
            match pattern.strip_suffix(".*") {
                Some(namespace) => event_type
                    .strip_prefix(namespace)
                    .is_some_and(|rest| rest.starts_with('.') && rest.len() > 1),
                None => pattern == event_type,
            }
        })
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}
