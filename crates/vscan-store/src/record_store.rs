//! Record store abstraction.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;

use vscan_models::{VideoId, VideoRecord};

use crate::error::{StoreError, StoreResult};

/// Partial update keyed by dotted field path (`face_stage.status`).
///
/// Only the named paths change; everything else in the record is left
/// as stored. Setting a path replaces the value there wholesale.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldUpdates {
    fields: BTreeMap<String, serde_json::Value>,
}

impl FieldUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `path` to the serialized form of `value`.
    pub fn set<T: Serialize>(mut self, path: impl Into<String>, value: T) -> StoreResult<Self> {
        self.fields.insert(path.into(), serde_json::to_value(value)?);
        Ok(self)
    }

    /// Set `path` to an already-serialized JSON value.
    pub fn set_json(mut self, path: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(path.into(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get(&self, path: &str) -> Option<&serde_json::Value> {
        self.fields.get(path)
    }
}

/// Split a dotted path into segments. Segments must be non-empty
/// identifiers (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn split_path(path: &str) -> StoreResult<Vec<&str>> {
    let segments: Vec<&str> = path.split('.').collect();
    let valid = segments.iter().all(|s| {
        let mut chars = s.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    });
    if !valid {
        return Err(StoreError::invalid_field_path(path));
    }
    Ok(segments)
}

/// Key-value persistence for video records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new record. Fails with `AlreadyExists` on an ID collision.
    async fn create(&self, record: &VideoRecord) -> StoreResult<VideoId>;

    async fn get(&self, id: &VideoId) -> StoreResult<Option<VideoRecord>>;

    /// Apply a partial update. Fails with `NotFound` for an unknown ID.
    async fn update(&self, id: &VideoId, updates: FieldUpdates) -> StoreResult<()>;

    async fn list_all(&self) -> StoreResult<Vec<VideoRecord>>;

    /// Remove a record. Deleting an unknown ID is not an error.
    async fn delete(&self, id: &VideoId) -> StoreResult<()>;

    /// Backend name for logs.
    fn backend(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vscan_models::StageStatus;

    #[test]
    fn test_field_updates_serialize_values() {
        let updates = FieldUpdates::new()
            .set("face_stage.status", StageStatus::Processing)
            .unwrap()
            .set_json("error", serde_json::Value::Null);

        assert_eq!(updates.len(), 2);
        assert_eq!(updates.get("face_stage.status"), Some(&json!("processing")));
        assert_eq!(updates.paths().collect::<Vec<_>>(), vec!["error", "face_stage.status"]);
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("face_stage.status").unwrap(), vec!["face_stage", "status"]);
        assert_eq!(split_path("status").unwrap(), vec!["status"]);
        assert!(split_path("").is_err());
        assert!(split_path("face_stage..status").is_err());
        assert!(split_path("9lives").is_err());
        assert!(split_path("a-b").is_err());
    }
}
