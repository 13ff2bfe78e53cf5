//! Processor registry for mapping event types to processors
//!
//! The registry owns the list of processors and decides which of them apply
//! to an event and in what order they run.

use std::sync::Arc;

use super::processor::{MAX_PRIORITY, WebhookProcessor};

struct RegisteredProcessor {
    processor: Arc<dyn WebhookProcessor>,
    priority: u8,
}

/// Ordered set of webhook processors.
///
/// Processors are registered once at startup. [`resolve`](Self::resolve) is
/// pure: for the same registrations and event type it always returns the same
/// processors in the same order (descending priority, ties in registration
/// order).
#[derive(Default)]
pub struct ProcessorRegistry {
    entries: Vec<RegisteredProcessor>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor.
    ///
    /// Priorities above 100 are clamped to 100.
    pub fn register(&mut self, processor: impl WebhookProcessor + 'static) -> &mut Self {
        self.register_arc(Arc::new(processor))
    }

    /// Register a processor that is shared with other components.
    pub fn register_arc(&mut self, processor: Arc<dyn WebhookProcessor>) -> &mut Self {
        let declared = processor.priority();
        if declared > MAX_PRIORITY {
            tracing::warn!(
                target: "payhook::webhooks",
                processor = processor.name(),
                priority = declared,
                "Processor priority above {}, clamping",
                MAX_PRIORITY
            );
        }

        tracing::debug!(
            target: "payhook::webhooks",
            processor = processor.name(),
            priority = declared.min(MAX_PRIORITY),
            "Registered webhook processor"
        );

        self.entries.push(RegisteredProcessor {
            priority: declared.min(MAX_PRIORITY),
            processor,
        });
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, processor: impl WebhookProcessor + 'static) -> Self {
        self.register(processor);
        self
    }

    /// Processors supporting `event_type`, highest priority first.
    pub fn resolve(&self, event_type: &str) -> Vec<Arc<dyn WebhookProcessor>> {
        let mut matching: Vec<&RegisteredProcessor> = self
            .entries
            .iter()
            .filter(|entry| entry.processor.supports(event_type))
            .collect();

        // sort_by is stable, so equal priorities keep registration order
        matching.sort_by(|a, b| b.priority.cmp(&a.priority));

        matching
            .into_iter()
            .map(|entry| Arc::clone(&entry.processor))
            .collect()
    }

    /// Effective (clamped) priority of a registered processor, by name.
    pub fn priority_of(&self, name: &str) -> Option<u8> {
        self.entries
            .iter()
            .find(|entry| entry.processor.name() == name)
            .map(|entry| entry.priority)
    }

    /// Names of all registered processors, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|entry| entry.processor.name())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("processors", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessorError;
    use crate::webhooks::WebhookPayload;
    use async_trait::async_trait;

    struct Named {
        name: &'static str,
        priority: u8,
        event_type: &'static str,
    }

    #[async_trait]
    impl WebhookProcessor for Named {
        fn name(&self) -> &str {
            self.name
        }

        fn supports(&self, event_type: &str) -> bool {
            self.event_type == "*" || self.event_type == event_type
        }

        fn priority(&self) -> u8 {
            self.priority
        }

        async fn process(&self, _payload: &WebhookPayload) -> Result<bool, ProcessorError> {
            Ok(true)
        }
    }

    fn named(name: &'static str, priority: u8, event_type: &'static str) -> Named {
        Named {
            name,
            priority,
            event_type,
        }
    }

    fn resolved_names(registry: &ProcessorRegistry, event_type: &str) -> Vec<String> {
        registry
            .resolve(event_type)
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    #[test]
    fn test_resolve_orders_by_priority_descending() {
        let registry = ProcessorRegistry::new()
            .with(named("low", 10, "payment.completed"))
            .with(named("high", 90, "payment.completed"))
            .with(named("mid", 50, "payment.completed"));

        assert_eq!(resolved_names(&registry, "payment.completed"), ["high", "mid", "low"]);
    }

    #[test]
    fn test_resolve_ties_keep_registration_order() {
        let registry = ProcessorRegistry::new()
            .with(named("first", 50, "*"))
            .with(named("second", 50, "*"))
            .with(named("urgent", 100, "*"))
            .with(named("third", 50, "*"));

        assert_eq!(
            resolved_names(&registry, "payment.completed"),
            ["urgent", "first", "second", "third"]
        );
    }

    #[test]
    fn test_resolve_filters_unsupported() {
        let registry = ProcessorRegistry::new()
            .with(named("payments", 50, "payment.completed"))
            .with(named("subscriptions", 50, "subscription.cancelled"));

        assert_eq!(resolved_names(&registry, "subscription.cancelled"), ["subscriptions"]);
        assert!(registry.resolve("transfer.completed").is_empty());
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let registry = ProcessorRegistry::new()
            .with(named("a", 20, "*"))
            .with(named("b", 80, "*"))
            .with(named("c", 20, "*"));

        let first = resolved_names(&registry, "x");
        for _ in 0..10 {
            assert_eq!(resolved_names(&registry, "x"), first);
        }
    }

    #[test]
    fn test_priority_is_clamped() {
        let registry = ProcessorRegistry::new()
            .with(named("max", 100, "*"))
            .with(named("overflow", 250, "*"));

        assert_eq!(registry.priority_of("overflow"), Some(100));
        // Clamped to the same priority, so registration order decides
        assert_eq!(resolved_names(&registry, "x"), ["max", "overflow"]);
    }

    #[test]
    fn test_len_and_names() {
        let mut registry = ProcessorRegistry::new();
        assert!(registry.is_empty());

        registry
            .register(named("a", 1, "*"))
            .register(named("b", 2, "*"));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), ["a", "b"]);
        assert_eq!(registry.priority_of("missing"), None);
    }
}
