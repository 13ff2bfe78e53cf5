use axum::http::HeaderMap;
use std::collections::HashMap;

/// Case-insensitive header map handed over by the transport layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookHeaders {
    inner: HashMap<String, String>,
}

impl WebhookHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, replacing any previous value for the same name.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.inner
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn with(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for WebhookHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

impl From<HashMap<String, String>> for WebhookHeaders {
    fn from(map: HashMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

/// Headers whose values are not valid UTF-8 are dropped.
impl From<&HeaderMap> for WebhookHeaders {
    fn from(map: &HeaderMap) -> Self {
        map.iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let headers = WebhookHeaders::new().with("X-Signature", "abc");
        assert_eq!(headers.get("x-signature"), Some("abc"));
        assert_eq!(headers.get("X-SIGNATURE"), Some("abc"));
        assert!(headers.contains("x-Signature"));
        assert_eq!(headers.get("x-other"), None);
    }

    #[test]
    fn test_insert_replaces() {
        let mut headers = WebhookHeaders::new();
        headers.insert("X-Delivery", "1");
        headers.insert("x-delivery", "2");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("X-Delivery"), Some("2"));
    }

    #[test]
    fn test_from_hash_map() {
        let mut map = HashMap::new();
        map.insert("Content-Type".to_string(), "application/json".to_string());
        let headers = WebhookHeaders::from(map);
        assert_eq!(headers.get("content-type"), Some("application/json"));
    }

    #[test]
    fn test_from_header_map_skips_non_utf8() {
        let mut map = HeaderMap::new();
        map.insert("x-signature", HeaderValue::from_static("abc"));
        map.insert("x-binary", HeaderValue::from_bytes(&[0xff, 0xfe]).unwrap());

        let headers = WebhookHeaders::from(&map);
        assert_eq!(headers.get("X-Signature"), Some("abc"));
        assert!(!headers.contains("x-binary"));
    }
}
