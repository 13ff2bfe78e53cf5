//! Gateways allowed to deliver webhooks, with their verification material.

use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::Arc;

use super::payload::PayloadFormat;
use super::verification::SignatureValidator;
use crate::config::{Config, validate_gateways};
use crate::error::ConfigError;

/// One gateway: how its deliveries are authenticated and laid out.
pub struct GatewayEndpoint {
    name: String,
    validator: Arc<dyn SignatureValidator>,
    secret: SecretString,
    format: PayloadFormat,
}

impl GatewayEndpoint {
    pub fn new(
        name: impl Into<String>,
        validator: impl SignatureValidator + 'static,
        secret: impl Into<String>,
    ) -> Self {
        Self::from_shared(name, Arc::new(validator), SecretString::from(secret.into()))
    }

    /// Build an endpoint around a validator shared with other endpoints.
    pub fn from_shared(
        name: impl Into<String>,
        validator: Arc<dyn SignatureValidator>,
        secret: SecretString,
    ) -> Self {
        Self {
            name: name.into(),
            validator,
            secret,
            format: PayloadFormat::default(),
        }
    }

    pub fn with_format(mut self, format: PayloadFormat) -> Self {
        self.format = format;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> &PayloadFormat {
        &self.format
    }

    /// Name of the signature scheme, for logs.
    pub fn validator_name(&self) -> &'static str {
        self.validator.name()
    }

    /// Check `signature_header` against the exact bytes received.
    pub fn verify(&self, raw_body: &[u8], signature_header: &str) -> bool {
        self.validator
            .verify(raw_body, signature_header, self.secret.expose_secret().as_bytes())
    }
}

impl std::fmt::Debug for GatewayEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayEndpoint")
            .field("name", &self.name)
            .field("validator", &self.validator.name())
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

/// Lookup of gateway endpoints by gateway id.
#[derive(Debug, Default)]
pub struct GatewayRegistry {
    endpoints: HashMap<String, GatewayEndpoint>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build endpoints for every configured gateway.
    ///
    /// # Errors
    ///
    /// Returns an error on empty or duplicate names or missing secrets.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        validate_gateways(&config.gateways)?;

        let tolerance = config.webhooks.timestamp_tolerance_seconds;
        let mut registry = Self::new();
        for gateway in &config.gateways {
            let endpoint = GatewayEndpoint::from_shared(
                gateway.name.clone(),
                gateway.scheme.validator(tolerance),
                SecretString::from(gateway.secret.expose_secret().to_string()),
            )
            .with_format(gateway.payload_format());

            tracing::debug!(
                target: "payhook::webhooks",
                gateway = %gateway.name,
                scheme = gateway.scheme.as_str(),
                "Configured webhook gateway"
            );
            registry.register(endpoint);
        }
        Ok(registry)
    }

    /// Register an endpoint, replacing any endpoint with the same name.
    pub fn register(&mut self, endpoint: GatewayEndpoint) -> &mut Self {
        if self.endpoints.contains_key(endpoint.name()) {
            tracing::warn!(
                target: "payhook::webhooks",
                gateway = endpoint.name(),
                "Replacing webhook gateway registration"
            );
        }
        self.endpoints.insert(endpoint.name.clone(), endpoint);
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, endpoint: GatewayEndpoint) -> Self {
        self.register(endpoint);
        self
    }

    pub fn get(&self, name: &str) -> Option<&GatewayEndpoint> {
        self.endpoints.get(name)
    }

    /// Registered gateway names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.endpoints.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
