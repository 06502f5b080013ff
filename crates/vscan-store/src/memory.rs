//! In-memory record store.
//!
//! Records are kept as JSON documents so that dotted-path updates behave
//! the same way they do against Firestore.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use vscan_models::{VideoId, VideoRecord};

use crate::error::{StoreError, StoreResult};
use crate::record_store::{split_path, FieldUpdates, RecordStore};

/// Process-local [`RecordStore`]. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<VideoId, serde_json::Value>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

fn set_path(doc: &mut serde_json::Value, segments: &[&str], value: serde_json::Value) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if !doc.is_object() {
        *doc = serde_json::Value::Object(Default::default());
    }
    let serde_json::Value::Object(map) = doc else {
        return;
    };
    if rest.is_empty() {
        map.insert(head.to_string(), value);
    } else {
        let child = map
            .entry(head.to_string())
            .or_insert_with(|| serde_json::Value::Object(Default::default()));
        set_path(child, rest, value);
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create(&self, record: &VideoRecord) -> StoreResult<VideoId> {
        let doc = serde_json::to_value(record)?;
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id.to_string()));
        }
        records.insert(record.id.clone(), doc);
        debug!(video_id = %record.id, "Created record");
        Ok(record.id.clone())
    }

    async fn get(&self, id: &VideoId) -> StoreResult<Option<VideoRecord>> {
        let records = self.records.read().await;
        match records.get(id) {
            Some(doc) => Ok(Some(serde_json::from_value(doc.clone())?)),
            None => Ok(None),
        }
    }

    async fn update(&self, id: &VideoId, updates: FieldUpdates) -> StoreResult<()> {
        // Validate every path before touching the record.
        let parsed = updates
            .iter()
            .map(|(path, value)| split_path(path).map(|segments| (segments, value)))
            .collect::<StoreResult<Vec<_>>>()?;

        let mut records = self.records.write().await;
        let doc = records
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(id.as_str()))?;
        for (segments, value) in parsed {
            set_path(doc, &segments, value.clone());
        }
        Ok(())
    }

    async fn list_all(&self) -> StoreResult<Vec<VideoRecord>> {
        let records = self.records.read().await;
        records
            .values()
            .map(|doc| serde_json::from_value(doc.clone()).map_err(StoreError::from))
            .collect()
    }

    async fn delete(&self, id: &VideoId) -> StoreResult<()> {
        self.records.write().await.remove(id);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vscan_models::{fields, OverallStatus, StageKind, StageResult, StageStatus};

    fn record(id: &str) -> VideoRecord {
        VideoRecord::new(VideoId::from(id), "/uploads/a.mp4", "a.mp4", 42)
    }

    #[tokio::test]
    async fn test_create_get_roundtrip() {
        let store = MemoryRecordStore::new();
        let original = record("v1");
        let id = store.create(&original).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), Some(original));
        assert!(store.get(&VideoId::from("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates() {
        let store = MemoryRecordStore::new();
        store.create(&record("v1")).await.unwrap();
        let err = store.create(&record("v1")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_dotted_update_touches_only_named_fields() {
        let store = MemoryRecordStore::new();
        let id = store.create(&record("v1")).await.unwrap();

        let updates = FieldUpdates::new()
            .set(fields::STATUS, OverallStatus::Processing)
            .unwrap()
            .set(StageKind::Face.status_field(), StageStatus::Processing)
            .unwrap();
        store.update(&id, updates).await.unwrap();

        let loaded = store.get(&id).await.unwrap().unwrap();
        assert_eq!(loaded.status, OverallStatus::Processing);
        assert_eq!(loaded.face_stage.status, StageStatus::Processing);
        assert_eq!(loaded.speech_stage.status, StageStatus::Queued);
        assert_eq!(loaded.filename, "a.mp4");
    }

    #[tokio::test]
    async fn test_whole_field_update_replaces_stage() {
        let store = MemoryRecordStore::new();
        let id = store.create(&record("v1")).await.unwrap();

        let failed: StageResult<vscan_models::FaceOutcome> =
            StageResult::failed("decoder exploded", Some(Utc::now()));
        store
            .update(&id, FieldUpdates::new().set(fields::FACE_STAGE, &failed).unwrap())
            .await
            .unwrap();

        let loaded = store.get(&id).await.unwrap().unwrap();
        assert_eq!(loaded.face_stage.status, StageStatus::Failed);
        assert_eq!(loaded.face_stage.error.as_deref(), Some("decoder exploded"));
        assert!(loaded.face_stage.outcome.is_none());
    }

    #[tokio::test]
    async fn test_update_missing_record_is_not_found() {
        let store = MemoryRecordStore::new();
        let updates = FieldUpdates::new().set(fields::STATUS, OverallStatus::Failed).unwrap();
        let err = store.update(&VideoId::from("nope"), updates).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_invalid_path_leaves_record_untouched() {
        let store = MemoryRecordStore::new();
        let id = store.create(&record("v1")).await.unwrap();
        let updates = FieldUpdates::new()
            .set(fields::STATUS, OverallStatus::Failed)
            .unwrap()
            .set_json("bad..path", serde_json::json!(1));
        assert!(matches!(
            store.update(&id, updates).await,
            Err(StoreError::InvalidFieldPath(_))
        ));
        assert_eq!(store.get(&id).await.unwrap().unwrap().status, OverallStatus::Uploaded);
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let store = MemoryRecordStore::new();
        store.create(&record("v1")).await.unwrap();
        store.create(&record("v2")).await.unwrap();
        assert_eq!(store.list_all().await.unwrap().len(), 2);

        store.delete(&VideoId::from("v1")).await.unwrap();
        store.delete(&VideoId::from("v1")).await.unwrap();
        assert_eq!(store.len().await, 1);
    }
}
