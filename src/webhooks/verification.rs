use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha512};
use std::str::FromStr;
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::error::ConfigError;

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Default replay window for timestamped signatures, in seconds.
pub const DEFAULT_TIMESTAMP_TOLERANCE_SECONDS: u64 = 300;

/// Verifies that a webhook body was signed with the gateway's shared secret.
///
/// Different gateways use different header formats and digest algorithms, so
/// each gateway gets its own strategy. The strategy is chosen from the gateway
/// identity by the caller, never from anything inside the payload.
///
/// Implementations must never panic or error on hostile input: a malformed
/// header is simply an unauthenticated request.
///
/// # Example
///
/// ```rust
/// use payhook::webhooks::{HmacValidator, SignatureValidator};
///
/// let validator = HmacValidator::sha256_hex();
/// let body = br#"{"type":"payment.completed","id":"evt_1"}"#;
/// let header = validator.sign(body, b"whsec_secret");
///
/// assert!(validator.verify(body, &header, b"whsec_secret"));
/// assert!(!validator.verify(body, &header, b"another_secret"));
/// ```
pub trait SignatureValidator: Send + Sync {
    /// Returns `true` only if `signature_header` authenticates `raw_body` under `secret`.
    fn verify(&self, raw_body: &[u8], signature_header: &str, secret: &[u8]) -> bool;

    /// Short identifier used in logs.
    fn name(&self) -> &'static str;
}

/// Digest used for the HMAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HmacAlgorithm {
    Sha256,
    Sha512,
}

/// How the signature bytes are written in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureEncoding {
    Hex,
    Base64,
}

/// Compute an HMAC over the concatenation of `parts`.
fn compute_mac(algorithm: HmacAlgorithm, secret: &[u8], parts: &[&[u8]]) -> Option<Vec<u8>> {
    match algorithm {
        HmacAlgorithm::Sha256 => {
            let mut mac = HmacSha256::new_from_slice(secret).ok()?;
            for part in parts {
                mac.update(part);
            }
            Some(mac.finalize().into_bytes().to_vec())
        }
        HmacAlgorithm::Sha512 => {
            let mut mac = HmacSha512::new_from_slice(secret).ok()?;
            for part in parts {
                mac.update(part);
            }
            Some(mac.finalize().into_bytes().to_vec())
        }
    }
}

/// Constant-time comparison to prevent timing attacks
///
/// Uses the `subtle` crate, whose optimization barriers keep LLVM from
/// turning the comparison back into an early-exit loop.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.ct_eq(b).into()
}

/// Decode a hex signature in the lowercase form [`hex::encode`] produces.
///
/// Uppercase digits are rejected: a case flip must not decode to the same MAC.
fn decode_lower_hex(value: &str) -> Option<Vec<u8>> {
    if !value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return None;
    }
    hex::decode(value).ok()
}

/// HMAC verifier for gateways that sign the raw body directly.
///
/// # Signature Formats
///
/// - **Hex encoded**: `a1b2c3d4...` (most common)
/// - **Hex with prefix**: `sha256=a1b2c3d4...`
/// - **Base64 encoded**: `oWvD1A==...`
///
/// # Example
///
/// ```rust
/// use payhook::webhooks::HmacValidator;
///
/// // For hex-encoded signatures
/// let validator = HmacValidator::sha256_hex();
///
/// // For signatures with a "sha256=" prefix
/// let validator = HmacValidator::sha256_hex().with_prefix("sha256=");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HmacValidator {
    algorithm: HmacAlgorithm,
    encoding: SignatureEncoding,
    /// Optional prefix to strip from signatures (e.g., "sha256=")
    prefix: Option<String>,
}

impl HmacValidator {
    pub fn new(algorithm: HmacAlgorithm, encoding: SignatureEncoding) -> Self {
        Self {
            algorithm,
            encoding,
            prefix: None,
        }
    }

    /// HMAC-SHA256, hex encoded.
    pub fn sha256_hex() -> Self {
        Self::new(HmacAlgorithm::Sha256, SignatureEncoding::Hex)
    }

    /// HMAC-SHA256, base64 encoded.
    pub fn sha256_base64() -> Self {
        Self::new(HmacAlgorithm::Sha256, SignatureEncoding::Base64)
    }

    /// HMAC-SHA512, hex encoded.
    pub fn sha512_hex() -> Self {
        Self::new(HmacAlgorithm::Sha512, SignatureEncoding::Hex)
    }

    /// Strip `prefix` from incoming signatures before decoding.
    ///
    /// Signatures that arrive without the prefix are still accepted.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn algorithm(&self) -> HmacAlgorithm {
        self.algorithm
    }

    pub fn encoding(&self) -> SignatureEncoding {
        self.encoding
    }

    /// Produce the header value a gateway would send for `raw_body`.
    pub fn sign(&self, raw_body: &[u8], secret: &[u8]) -> String {
        let mac = compute_mac(self.algorithm, secret, &[raw_body]).unwrap_or_default();
        let encoded = match self.encoding {
            SignatureEncoding::Hex => hex::encode(mac),
            SignatureEncoding::Base64 => base64::engine::general_purpose::STANDARD.encode(mac),
        };
        match &self.prefix {
            Some(prefix) => format!("{prefix}{encoded}"),
            None => encoded,
        }
    }

    /// Decode the provided signature from hex or base64
    fn decode_signature(&self, signature: &str) -> Option<Vec<u8>> {
        let signature = signature.trim();
        let sig = match self.prefix {
            Some(ref prefix) => signature.strip_prefix(prefix.as_str()).unwrap_or(signature),
            None => signature,
        };

        match self.encoding {
            SignatureEncoding::Hex => decode_lower_hex(sig),
            SignatureEncoding::Base64 => base64::engine::general_purpose::STANDARD.decode(sig).ok(),
        }
    }
}

impl SignatureValidator for HmacValidator {
    fn verify(&self, raw_body: &[u8], signature_header: &str, secret: &[u8]) -> bool {
        let provided = match self.decode_signature(signature_header) {
            Some(bytes) => bytes,
            None => {
                tracing::debug!(target: "payhook::webhooks", "Failed to decode webhook signature");
                return false;
            }
        };

        let Some(expected) = compute_mac(self.algorithm, secret, &[raw_body]) else {
            return false;
        };

        let is_valid = constant_time_compare(&expected, &provided);
        if !is_valid {
            tracing::debug!(target: "payhook::webhooks", "Webhook signature verification failed");
        }
        is_valid
    }

    fn name(&self) -> &'static str {
        match (self.algorithm, self.encoding) {
            (HmacAlgorithm::Sha256, SignatureEncoding::Hex) => "hmac-sha256-hex",
            (HmacAlgorithm::Sha256, SignatureEncoding::Base64) => "hmac-sha256-base64",
            (HmacAlgorithm::Sha512, SignatureEncoding::Hex) => "hmac-sha512-hex",
            (HmacAlgorithm::Sha512, SignatureEncoding::Base64) => "hmac-sha512-base64",
        }
    }
}

/// Verifier for `t=<unix>,v1=<hex>` signature headers.
///
/// The signed message is `"<t>.<raw body>"` (HMAC-SHA256). Headers whose
/// timestamp falls outside the tolerance window are rejected to limit replay.
/// Several `v1` entries may be present while a gateway rotates secrets; any
/// match is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampedHmacValidator {
    tolerance_seconds: u64,
}

impl Default for TimestampedHmacValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Parsed `t=...,v1=...` header parts.
struct TimestampedHeader {
    timestamp: i64,
    signatures: Vec<Vec<u8>>,
}

impl TimestampedHmacValidator {
    pub fn new() -> Self {
        Self {
            tolerance_seconds: DEFAULT_TIMESTAMP_TOLERANCE_SECONDS,
        }
    }

    pub fn with_tolerance_seconds(mut self, seconds: u64) -> Self {
        self.tolerance_seconds = seconds;
        self
    }

    pub fn tolerance_seconds(&self) -> u64 {
        self.tolerance_seconds
    }

    /// Produce a header for `raw_body` signed at `timestamp`.
    pub fn sign(&self, raw_body: &[u8], secret: &[u8], timestamp: i64) -> String {
        let t = timestamp.to_string();
        let mac = compute_mac(HmacAlgorithm::Sha256, secret, &[t.as_bytes(), b".", raw_body])
            .unwrap_or_default();
        format!("t={},v1={}", t, hex::encode(mac))
    }

    /// Verify against an explicit clock reading (unix seconds).
    pub fn verify_at(&self, raw_body: &[u8], signature_header: &str, secret: &[u8], now: i64) -> bool {
        let Some(header) = parse_timestamped_header(signature_header) else {
            tracing::debug!(target: "payhook::webhooks", "Malformed timestamped signature header");
            return false;
        };

        let age = now.saturating_sub(header.timestamp).unsigned_abs();
        if age > self.tolerance_seconds {
            tracing::debug!(
                target: "payhook::webhooks",
                age_seconds = age,
                "Webhook timestamp outside tolerance window"
            );
            return false;
        }

        let t = header.timestamp.to_string();
        let Some(expected) =
            compute_mac(HmacAlgorithm::Sha256, secret, &[t.as_bytes(), b".", raw_body])
        else {
            return false;
        };

        header
            .signatures
            .iter()
            .any(|provided| constant_time_compare(&expected, provided))
    }
}

impl SignatureValidator for TimestampedHmacValidator {
    fn verify(&self, raw_body: &[u8], signature_header: &str, secret: &[u8]) -> bool {
        self.verify_at(raw_body, signature_header, secret, chrono::Utc::now().timestamp())
    }

    fn name(&self) -> &'static str {
        "timestamped-hmac-sha256"
    }
}

/// Parse a `t=...,v1=...` header. Unknown keys (other scheme versions) are ignored.
fn parse_timestamped_header(header: &str) -> Option<TimestampedHeader> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let (key, value) = part.split_once('=')?;
        match key.trim() {
            "t" => timestamp = Some(value.trim().parse::<i64>().ok()?),
            "v1" => signatures.push(decode_lower_hex(value.trim())?),
            _ => {}
        }
    }

    if signatures.is_empty() {
        return None;
    }

    Some(TimestampedHeader {
        timestamp: timestamp?,
        signatures,
    })
}

/// Verifier for gateways that authenticate by echoing a shared access token
/// in a header instead of signing the body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaticTokenValidator;

impl SignatureValidator for StaticTokenValidator {
    fn verify(&self, _raw_body: &[u8], signature_header: &str, secret: &[u8]) -> bool {
        let token = signature_header.trim();
        !token.is_empty() && constant_time_compare(token.as_bytes(), secret)
    }

    fn name(&self) -> &'static str {
        "static-token"
    }
}

/// No-op verifier that accepts all webhooks
///
/// **WARNING:** This verifier accepts ALL webhooks without verification.
/// Only use it for local development or gateways that cannot sign their
/// notifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoVerification;

impl SignatureValidator for NoVerification {
    fn verify(&self, _raw_body: &[u8], _signature_header: &str, _secret: &[u8]) -> bool {
        tracing::warn!(
            target: "payhook::webhooks",
            "NoVerification webhook validator used - webhook accepted without verification"
        );
        true
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Configurable name for each shipped validator, used by gateway configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureScheme {
    HmacSha256Hex,
    /// Hex HMAC-SHA256 sent as `sha256=<hex>`.
    HmacSha256Prefixed,
    HmacSha256Base64,
    HmacSha512Hex,
    Timestamped,
    StaticToken,
    None,
}

impl SignatureScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HmacSha256Hex => "hmac_sha256_hex",
            Self::HmacSha256Prefixed => "hmac_sha256_prefixed",
            Self::HmacSha256Base64 => "hmac_sha256_base64",
            Self::HmacSha512Hex => "hmac_sha512_hex",
            Self::Timestamped => "timestamped",
            Self::StaticToken => "static_token",
            Self::None => "none",
        }
    }

    /// Build the validator for this scheme.
    pub fn validator(&self, timestamp_tolerance_seconds: u64) -> Arc<dyn SignatureValidator> {
        match self {
            Self::HmacSha256Hex => Arc::new(HmacValidator::sha256_hex()),
            Self::HmacSha256Prefixed => Arc::new(HmacValidator::sha256_hex().with_prefix("sha256=")),
            Self::HmacSha256Base64 => Arc::new(HmacValidator::sha256_base64()),
            Self::HmacSha512Hex => Arc::new(HmacValidator::sha512_hex()),
            Self::Timestamped => Arc::new(
                TimestampedHmacValidator::new().with_tolerance_seconds(timestamp_tolerance_seconds),
            ),
            Self::StaticToken => Arc::new(StaticTokenValidator),
            Self::None => Arc::new(NoVerification),
        }
    }
}

impl FromStr for SignatureScheme {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hmac_sha256_hex" | "hmac_sha256" => Ok(Self::HmacSha256Hex),
            "hmac_sha256_prefixed" => Ok(Self::HmacSha256Prefixed),
            "hmac_sha256_base64" => Ok(Self::HmacSha256Base64),
            "hmac_sha512_hex" | "hmac_sha512" => Ok(Self::HmacSha512Hex),
            "timestamped" => Ok(Self::Timestamped),
            "static_token" | "token" => Ok(Self::StaticToken),
            "none" => Ok(Self::None),
            other => Err(ConfigError::UnknownScheme(other.to_string())),
        }
    }
}
