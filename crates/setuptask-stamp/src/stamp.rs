//! Stamp record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted record that a named task has completed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamp {
    /// Name of the task this stamp belongs to
    pub task: String,
    /// Content hash stored when the task completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Free-form metadata attached by the caller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// When the task last completed
    pub created_at: DateTime<Utc>,
}

impl Stamp {
    /// Create a stamp completed now
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            hash: None,
            metadata: None,
            created_at: Utc::now(),
        }
    }

    /// Stamp completed now with the given hash and metadata
    pub(crate) fn record(
        task: &str,
        hash: Option<&str>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        let mut stamp = Self::new(task);
        if let Some(hash) = hash {
            stamp = stamp.with_hash(hash);
        }
        if let Some(metadata) = metadata {
            stamp = stamp.with_metadata(metadata);
        }
        stamp
    }

    /// Set the stored hash
    #[must_use]
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    /// Set metadata
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Stored hash, if any
    #[must_use]
    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    /// Check whether the stored hash equals `hash`
    #[must_use]
    pub fn hash_matches(&self, hash: &str) -> bool {
        self.hash.as_deref() == Some(hash)
    }
}
