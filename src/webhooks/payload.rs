//! Parsed representation of one inbound webhook delivery.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::headers::WebhookHeaders;
use crate::error::ParseError;

/// Where a gateway puts the fields the pipeline needs.
///
/// Field names may be dotted paths into nested objects (`event.id`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadFormat {
    /// Header carrying the signature.
    #[serde(default = "default_signature_header")]
    pub signature_header: String,
    /// Header carrying the per-attempt delivery id.
    #[serde(default = "default_delivery_id_header")]
    pub delivery_id_header: String,
    #[serde(default = "default_event_type_field")]
    pub event_type_field: String,
    #[serde(default = "default_event_id_field")]
    pub event_id_field: String,
    #[serde(default = "default_data_field")]
    pub data_field: String,
}

impl Default for PayloadFormat {
    fn default() -> Self {
        Self {
            signature_header: default_signature_header(),
            delivery_id_header: default_delivery_id_header(),
            event_type_field: default_event_type_field(),
            event_id_field: default_event_id_field(),
            data_field: default_data_field(),
        }
    }
}

fn default_signature_header() -> String {
    "x-webhook-signature".to_string()
}

fn default_delivery_id_header() -> String {
    "x-webhook-delivery".to_string()
}

fn default_event_type_field() -> String {
    "type".to_string()
}

fn default_event_id_field() -> String {
    "id".to_string()
}

fn default_data_field() -> String {
    "data".to_string()
}

impl PayloadFormat {
    pub fn with_signature_header(mut self, header: impl Into<String>) -> Self {
        self.signature_header = header.into();
        self
    }

    pub fn with_delivery_id_header(mut self, header: impl Into<String>) -> Self {
        self.delivery_id_header = header.into();
        self
    }

    pub fn with_event_type_field(mut self, field: impl Into<String>) -> Self {
        self.event_type_field = field.into();
        self
    }

    pub fn with_event_id_field(mut self, field: impl Into<String>) -> Self {
        self.event_id_field = field.into();
        self
    }

    pub fn with_data_field(mut self, field: impl Into<String>) -> Self {
        self.data_field = field.into();
        self
    }
}

/// One inbound webhook notification.
///
/// Immutable once parsed. The raw body is kept byte-for-byte because
/// signatures are defined over the exact bytes received.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookPayload {
    gateway: String,
    event_type: String,
    event_id: String,
    delivery_id: String,
    raw_body: Vec<u8>,
    signature_header: String,
    received_at: DateTime<Utc>,
    data: Map<String, Value>,
}

impl WebhookPayload {
    /// Parse a delivery.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] if the body is not a JSON object, if the event
    /// type or id is missing, or if the data field is present but not an object.
    pub fn parse(
        gateway: &str,
        raw_body: impl Into<Vec<u8>>,
        headers: &WebhookHeaders,
        format: &PayloadFormat,
    ) -> Result<Self, ParseError> {
        let raw_body = raw_body.into();

        let mut body = match serde_json::from_slice::<Value>(&raw_body)? {
            Value::Object(map) => map,
            _ => return Err(ParseError::NotAnObject),
        };

        let event_type = lookup(&body, &format.event_type_field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ParseError::MissingField(format.event_type_field.clone()))?
            .to_string();

        let event_id = lookup(&body, &format.event_id_field)
            .and_then(id_to_string)
            .ok_or_else(|| ParseError::MissingField(format.event_id_field.clone()))?;

        let data = match take(&mut body, &format.data_field) {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => return Err(ParseError::InvalidData(format.data_field.clone())),
        };

        let delivery_id = headers
            .get(&format.delivery_id_header)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .unwrap_or_else(|| event_id.clone());

        let signature_header = headers
            .get(&format.signature_header)
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            gateway: gateway.to_string(),
            event_type,
            event_id,
            delivery_id,
            raw_body,
            signature_header,
            received_at: Utc::now(),
            data,
        })
    }

    pub fn gateway(&self) -> &str {
        &self.gateway
    }

    /// Dot-namespaced event type, e.g. `payment.completed`.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Id of the logical event, stable across retries.
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    /// Id of this delivery attempt. Falls back to the event id when the
    /// gateway does not send one.
    pub fn delivery_id(&self) -> &str {
        &self.delivery_id
    }

    pub fn raw_body(&self) -> &[u8] {
        &self.raw_body
    }

    pub fn signature_header(&self) -> &str {
        &self.signature_header
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Gateway-specific event body.
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn data_field(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// Deserialize the event body into a processor-specific type.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.data.clone()))
    }
}

/// Follow a dotted path through nested objects.
fn lookup<'a>(body: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = body.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Remove the value at a dotted path, so the data map is moved rather than cloned.
fn take(body: &mut Map<String, Value>, path: &str) -> Option<Value> {
    match path.rsplit_once('.') {
        None => body.remove(path),
        Some((parent, leaf)) => {
            let mut current = body;
            for segment in parent.split('.') {
                current = current.get_mut(segment)?.as_object_mut()?;
            }
            current.remove(leaf)
        }
    }
}

/// Event ids may arrive as strings or numbers.
fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
