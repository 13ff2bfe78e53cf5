//! Durable record of webhook deliveries.
//!
//! The storage backend is the only shared mutable resource in the pipeline.
//! Its [`create`](WebhookStorage::create) operation is the idempotency gate
//! and must be atomic across concurrent callers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::StorageError;

/// Lifecycle of a webhook record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    Received,
    Processing,
    Processed,
    Failed,
}

impl RecordStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "RECEIVED",
            Self::Processing => "PROCESSING",
            Self::Processed => "PROCESSED",
            Self::Failed => "FAILED",
        }
    }

    /// Processed and Failed end a delivery attempt.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::Failed)
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted state of one logical webhook event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookRecord {
    pub event_id: String,
    pub status: RecordStatus,
    pub first_seen_at: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
    /// Number of times processing started for this event.
    pub attempt_count: u32,
    pub last_error: Option<String>,
}

impl WebhookRecord {
    /// A freshly received record.
    #[must_use]
    pub fn new(event_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            event_id: event_id.into(),
            status: RecordStatus::Received,
            first_seen_at: now,
            last_attempt_at: now,
            attempt_count: 0,
            last_error: None,
        }
    }

    /// Apply a status transition.
    ///
    /// Entering `Processing` counts as a new attempt. `Failed` stores the
    /// error, `Processed` clears it.
    pub fn transition(&mut self, status: RecordStatus, error: Option<&str>, now: DateTime<Utc>) {
        match status {
            RecordStatus::Processing => {
                self.attempt_count = self.attempt_count.saturating_add(1);
                self.last_attempt_at = now;
            }
            RecordStatus::Failed => {
                self.last_error = error.map(String::from);
            }
            RecordStatus::Processed => {
                self.last_error = None;
            }
            RecordStatus::Received => {}
        }
        self.status = status;
    }
}

/// Trait for persisting webhook records.
///
/// Implement this on top of your database. The in-memory implementation is
/// suitable for tests and single-process deployments.
///
/// # Important: `create` must be atomic
///
/// Two near-simultaneous deliveries of the same event race on `create`.
/// Exactly one must succeed; the other must observe
/// [`StorageError::AlreadyExists`]. Use a unique-constrained insert, never a
/// read followed by a write:
///
/// ```sql
/// INSERT INTO webhook_records (event_id, status, first_seen_at, last_attempt_at, attempt_count)
/// VALUES ($1, 'RECEIVED', NOW(), NOW(), 0)
/// ON CONFLICT (event_id) DO NOTHING
/// RETURNING event_id
/// ```
///
/// If no row is returned, the record already existed.
#[async_trait]
pub trait WebhookStorage: Send + Sync {
    /// Look up the record for an event.
    async fn find_by_event_id(&self, event_id: &str) -> Result<Option<WebhookRecord>, StorageError>;

    /// Create a `Received` record, failing with `AlreadyExists` if one is present.
    async fn create(&self, event_id: &str) -> Result<WebhookRecord, StorageError>;

    /// Move a record to `status`, see [`WebhookRecord::transition`].
    async fn update_status(
        &self,
        event_id: &str,
        status: RecordStatus,
        error: Option<&str>,
    ) -> Result<(), StorageError>;

    /// Delete terminal records whose last attempt is older than `max_age`.
    ///
    /// The pipeline never calls this; scheduling retention is up to the
    /// application. Default: no-op.
    async fn cleanup_older_than(&self, _max_age: Duration) -> Result<usize, StorageError> {
        Ok(0)
    }
}

#[async_trait]
impl<S: WebhookStorage + ?Sized> WebhookStorage for Arc<S> {
    async fn find_by_event_id(&self, event_id: &str) -> Result<Option<WebhookRecord>, StorageError> {
        (**self).find_by_event_id(event_id).await
    }

    async fn create(&self, event_id: &str) -> Result<WebhookRecord, StorageError> {
        (**self).create(event_id).await
    }

    async fn update_status(
        &self,
        event_id: &str,
        status: RecordStatus,
        error: Option<&str>,
    ) -> Result<(), StorageError> {
        (**self).update_status(event_id, status, error).await
    }

    async fn cleanup_older_than(&self, max_age: Duration) -> Result<usize, StorageError> {
        (**self).cleanup_older_than(max_age).await
    }
}

/// In-memory webhook storage.
///
/// Wraps data in `Arc` for cheap cloning; clones share the same records.
#[derive(Debug, Default, Clone)]
pub struct InMemoryWebhookStorage {
    records: Arc<RwLock<HashMap<String, WebhookRecord>>>,
}

impl InMemoryWebhookStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records.
    pub async fn records(&self) -> Vec<WebhookRecord> {
        self.records.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl WebhookStorage for InMemoryWebhookStorage {
    async fn find_by_event_id(&self, event_id: &str) -> Result<Option<WebhookRecord>, StorageError> {
        Ok(self.records.read().await.get(event_id).cloned())
    }

    async fn create(&self, event_id: &str) -> Result<WebhookRecord, StorageError> {
        // Check and insert under one write lock
        let mut records = self.records.write().await;
        if records.contains_key(event_id) {
            return Err(StorageError::AlreadyExists {
                event_id: event_id.to_string(),
            });
        }

        let record = WebhookRecord::new(event_id, Utc::now());
        records.insert(event_id.to_string(), record.clone());
        Ok(record)
    }

    async fn update_status(
        &self,
        event_id: &str,
        status: RecordStatus,
        error: Option<&str>,
    ) -> Result<(), StorageError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(event_id)
            .ok_or_else(|| StorageError::NotFound {
                event_id: event_id.to_string(),
            })?;
        record.transition(status, error, Utc::now());
        Ok(())
    }

    async fn cleanup_older_than(&self, max_age: Duration) -> Result<usize, StorageError> {
        let max_age = chrono::Duration::from_std(max_age)
            .map_err(|e| StorageError::Unavailable(format!("invalid retention period: {e}")))?;
        let cutoff = Utc::now() - max_age;

        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| !(record.status.is_terminal() && record.last_attempt_at < cutoff));
        let removed = before - records.len();

        if removed > 0 {
            tracing::debug!(target: "payhook::webhooks", removed, "Cleaned up old webhook records");
        }
        Ok(removed)
    }
}
