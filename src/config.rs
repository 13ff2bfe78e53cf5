use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

use crate::error::ConfigError;
use crate::utils::{gateway_names_from_env, get_env_with_prefix};
use crate::webhooks::payload::PayloadFormat;
use crate::webhooks::verification::{DEFAULT_TIMESTAMP_TOLERANCE_SECONDS, SignatureScheme};

/// Main configuration for the webhook pipeline
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub webhooks: WebhookConfig,
    #[serde(default)]
    pub gateways: Vec<GatewayConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_json")]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookConfig {
    /// Failed deliveries of one event are retried up to this many times
    /// before being acknowledged as permanently failed (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Deadline for a whole delivery, unset for none
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    /// Accepted clock skew for timestamped signatures (default: 300)
    #[serde(default = "default_timestamp_tolerance")]
    pub timestamp_tolerance_seconds: u64,
}

/// One gateway allowed to deliver webhooks.
///
/// The secret is never serialized and is redacted in `Debug` output.
#[derive(Debug, Deserialize, Serialize)]
pub struct GatewayConfig {
    pub name: String,
    #[serde(default = "default_scheme")]
    pub scheme: SignatureScheme,
    #[serde(deserialize_with = "deserialize_secret", skip_serializing)]
    pub secret: SecretString,
    /// Overrides `payload.signature_header` when set
    #[serde(default)]
    pub signature_header: Option<String>,
    #[serde(default)]
    pub payload: PayloadFormat,
}

impl GatewayConfig {
    pub fn new(name: impl Into<String>, scheme: SignatureScheme, secret: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scheme,
            secret: SecretString::from(secret.into()),
            signature_header: None,
            payload: PayloadFormat::default(),
        }
    }

    pub fn with_signature_header(mut self, header: impl Into<String>) -> Self {
        self.signature_header = Some(header.into());
        self
    }

    pub fn with_payload(mut self, payload: PayloadFormat) -> Self {
        self.payload = payload;
        self
    }

    /// Payload format with the signature header override applied.
    pub fn payload_format(&self) -> PayloadFormat {
        match &self.signature_header {
            Some(header) => self.payload.clone().with_signature_header(header.clone()),
            None => self.payload.clone(),
        }
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: default_json(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            timeout_seconds: None,
            timestamp_tolerance_seconds: default_timestamp_tolerance(),
        }
    }
}

impl WebhookConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_json() -> bool {
    false
}

fn default_max_attempts() -> u32 {
    5
}

fn default_timestamp_tolerance() -> u64 {
    DEFAULT_TIMESTAMP_TOLERANCE_SECONDS
}

fn default_scheme() -> SignatureScheme {
    SignatureScheme::HmacSha256Hex
}

/// Builder for Config with environment variable support
#[must_use = "builder does nothing until you call build()"]
pub struct ConfigBuilder {
    config: Config,
    env_error: Option<ConfigError>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            env_error: None,
        }
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn with_json_logging(mut self, enabled: bool) -> Self {
        self.config.logging.json = enabled;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.config.webhooks.max_attempts = max_attempts;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.webhooks.timeout_seconds = Some(timeout.as_secs());
        self
    }

    pub fn with_timestamp_tolerance_seconds(mut self, seconds: u64) -> Self {
        self.config.webhooks.timestamp_tolerance_seconds = seconds;
        self
    }

    /// Add a gateway. A later gateway with the same name replaces it.
    pub fn with_gateway(mut self, gateway: GatewayConfig) -> Self {
        self.config.gateways.retain(|existing| existing.name != gateway.name);
        self.config.gateways.push(gateway);
        self
    }

    /// Load configuration from environment variables with PAYHOOK_ prefix
    ///
    /// Gateways are declared with `PAYHOOK_GATEWAY_<NAME>_SECRET`, plus the
    /// optional `PAYHOOK_GATEWAY_<NAME>_SCHEME` (default `hmac_sha256_hex`)
    /// and `PAYHOOK_GATEWAY_<NAME>_HEADER`.
    pub fn from_env(mut self) -> Self {
        if let Some(level) = get_env_with_prefix("LOG_LEVEL") {
            self.config.logging.level = level;
        }
        if let Some(json) = get_env_with_prefix("LOG_JSON") {
            self.config.logging.json = json.parse().unwrap_or(false);
        }
        if let Some(max_attempts) = get_env_with_prefix("WEBHOOK_MAX_ATTEMPTS") {
            if let Ok(n) = max_attempts.parse() {
                self.config.webhooks.max_attempts = n;
            }
        }
        if let Some(timeout) = get_env_with_prefix("WEBHOOK_TIMEOUT_SECONDS") {
            if let Ok(secs) = timeout.parse() {
                self.config.webhooks.timeout_seconds = Some(secs);
            }
        }
        if let Some(tolerance) = get_env_with_prefix("WEBHOOK_TIMESTAMP_TOLERANCE_SECONDS") {
            if let Ok(secs) = tolerance.parse() {
                self.config.webhooks.timestamp_tolerance_seconds = secs;
            }
        }

        for name in gateway_names_from_env() {
            let key = format!("PAYHOOK_GATEWAY_{}", name.to_uppercase());
            let Ok(secret) = std::env::var(format!("{key}_SECRET")) else {
                continue;
            };

            let scheme = match std::env::var(format!("{key}_SCHEME")) {
                Ok(raw) => match raw.parse::<SignatureScheme>() {
                    Ok(scheme) => scheme,
                    Err(e) => {
                        // Reported by build()
                        self.env_error.get_or_insert(e);
                        continue;
                    }
                },
                Err(_) => default_scheme(),
            };

            let mut gateway = GatewayConfig::new(name, scheme, secret);
            if let Ok(header) = std::env::var(format!("{key}_HEADER")) {
                gateway = gateway.with_signature_header(header);
            }
            self = self.with_gateway(gateway);
        }

        self
    }

    /// Build the configuration, validating all settings
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration is invalid:
    /// - Invalid log level
    /// - `max_attempts` or the timeout set to 0
    /// - Unknown signature scheme in the environment
    /// - Empty or duplicate gateway names
    /// - Empty secret for a gateway that verifies signatures
    pub fn build(self) -> Result<Config, ConfigError> {
        if let Some(err) = self.env_error {
            return Err(err);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::invalid(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.config.logging.level,
                valid_log_levels.join(", ")
            )));
        }

        if self.config.webhooks.max_attempts == 0 {
            return Err(ConfigError::invalid("Webhook max_attempts must be greater than 0"));
        }

        if self.config.webhooks.timeout_seconds == Some(0) {
            return Err(ConfigError::invalid(
                "Webhook timeout must be greater than 0 when set",
            ));
        }

        validate_gateways(&self.config.gateways)?;

        Ok(self.config)
    }
}

/// Gateway checks shared by the builder and [`GatewayRegistry::from_config`](crate::webhooks::GatewayRegistry::from_config).
pub(crate) fn validate_gateways(gateways: &[GatewayConfig]) -> Result<(), ConfigError> {
    let mut seen = std::collections::HashSet::new();
    for gateway in gateways {
        if gateway.name.trim().is_empty() {
            return Err(ConfigError::invalid("Gateway name must not be empty"));
        }
        if !seen.insert(gateway.name.as_str()) {
            return Err(ConfigError::invalid(format!(
                "Duplicate gateway: {}",
                gateway.name
            )));
        }
        if gateway.scheme != SignatureScheme::None && gateway.secret.expose_secret().is_empty() {
            return Err(ConfigError::invalid(format!(
                "Gateway {} has an empty secret",
                gateway.name
            )));
        }
    }
    Ok(())
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
