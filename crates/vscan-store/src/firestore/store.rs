//! [`RecordStore`] backed by a Firestore collection.

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use vscan_models::{VideoId, VideoRecord};

use super::client::FirestoreClient;
use super::types::{insert_at_path, json_to_fields, json_to_value, Document};
use crate::error::{StoreError, StoreResult};
use crate::record_store::{split_path, FieldUpdates, RecordStore};

const LIST_PAGE_SIZE: u32 = 300;

/// Video records stored one document per video, keyed by video ID.
#[derive(Clone)]
pub struct FirestoreRecordStore {
    client: FirestoreClient,
    collection: String,
}

impl FirestoreRecordStore {
    pub fn new(client: FirestoreClient) -> Self {
        let collection = client.config().collection.clone();
        Self { client, collection }
    }

    pub async fn from_env() -> StoreResult<Self> {
        let client = FirestoreClient::from_env().await?;
        info!(collection = %client.config().collection, "Firestore record store ready");
        Ok(Self::new(client))
    }

    fn decode(doc: &Document) -> StoreResult<VideoRecord> {
        Ok(serde_json::from_value(doc.to_json())?)
    }
}

#[async_trait]
impl RecordStore for FirestoreRecordStore {
    async fn create(&self, record: &VideoRecord) -> StoreResult<VideoId> {
        let serde_json::Value::Object(map) = serde_json::to_value(record)? else {
            return Err(StoreError::Serialization(serde::ser::Error::custom(
                "record did not serialize to an object",
            )));
        };
        self.client
            .create_document(&self.collection, record.id.as_str(), json_to_fields(&map))
            .await?;
        debug!(video_id = %record.id, "Created Firestore record");
        Ok(record.id.clone())
    }

    async fn get(&self, id: &VideoId) -> StoreResult<Option<VideoRecord>> {
        match self.client.get_document(&self.collection, id.as_str()).await? {
            Some(doc) => Ok(Some(Self::decode(&doc)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, id: &VideoId, updates: FieldUpdates) -> StoreResult<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let mut fields = HashMap::new();
        let mut mask = Vec::with_capacity(updates.len());
        for (path, value) in updates.iter() {
            let segments = split_path(path)?;
            insert_at_path(&mut fields, &segments, json_to_value(value));
            mask.push(path.to_string());
        }

        self.client
            .update_document(&self.collection, id.as_str(), fields, &mask)
            .await?;
        Ok(())
    }

    async fn list_all(&self) -> StoreResult<Vec<VideoRecord>> {
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .client
                .list_documents(&self.collection, Some(LIST_PAGE_SIZE), page_token.as_deref())
                .await?;

            for doc in page.documents.unwrap_or_default() {
                match Self::decode(&doc) {
                    Ok(record) => records.push(record),
                    Err(e) => warn!(
                        document = doc.id().unwrap_or("?"),
                        "Skipping undecodable record: {}",
                        e
                    ),
                }
            }

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(records)
    }

    async fn delete(&self, id: &VideoId) -> StoreResult<()> {
        self.client.delete_document(&self.collection, id.as_str()).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "firestore"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::{FirestoreConfig, RetryConfig, TokenSource};
    use serde_json::json;
    use vscan_models::{fields, OverallStatus, StageKind, StageStatus};
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOCS: &str = "/v1/projects/test-project/databases/(default)/documents";

    fn store(server: &MockServer) -> FirestoreRecordStore {
        let config = FirestoreConfig {
            retry: RetryConfig {
                max_retries: 2,
                base_delay_ms: 1,
                max_delay_ms: 5,
            },
            ..FirestoreConfig::new("test-project")
        };
        let client =
            FirestoreClient::with_endpoint(config, &server.uri(), TokenSource::Static("owner".into()))
                .unwrap();
        FirestoreRecordStore::new(client)
    }

    fn stored_doc(id: &str, status: &str) -> serde_json::Value {
        json!({
            "name": format!("projects/test-project/databases/(default)/documents/videos/{}", id),
            "fields": {
                "id": { "stringValue": id },
                "source_path": { "stringValue": "/uploads/a.mp4" },
                "filename": { "stringValue": "a.mp4" },
                "size_bytes": { "integerValue": "42" },
                "uploaded_at": { "stringValue": "2024-05-01T12:00:00Z" },
                "status": { "stringValue": status },
                "face_stage": { "mapValue": { "fields": { "status": { "stringValue": "completed" },
                    "outcome": { "mapValue": { "fields": {
                        "total_frames": { "integerValue": "90" },
                        "sampled_frame_count": { "integerValue": "3" },
                        "faces_detected": { "integerValue": "3" },
                        "frames_directory": { "stringValue": "/work/frames/v1" },
                        "frames_persisted": { "integerValue": "2" },
                        "crops_persisted": { "integerValue": "3" }
                    } } } } } },
                "speech_stage": { "mapValue": { "fields": {
                    "status": { "stringValue": "failed" },
                    "error": { "stringValue": "no audio stream" }
                } } },
                "frame_interval": { "integerValue": "30" },
                "updated_at": { "stringValue": "2024-05-01T12:01:00Z" }
            }
        })
    }

    #[tokio::test]
    async fn test_get_decodes_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{}/videos/v1", DOCS)))
            .and(header("authorization", "Bearer owner"))
            .respond_with(ResponseTemplate::new(200).set_body_json(stored_doc("v1", "partial_success")))
            .mount(&server)
            .await;

        let record = store(&server).get(&VideoId::from("v1")).await.unwrap().unwrap();
        assert_eq!(record.status, OverallStatus::PartialSuccess);
        assert_eq!(record.face_stage.outcome().map(|o| o.faces_detected), Some(3));
        assert_eq!(record.speech_stage.status, StageStatus::Failed);
        assert_eq!(record.speech_stage.error.as_deref(), Some("no audio stream"));
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(store(&server).get(&VideoId::from("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_sends_dotted_mask_and_nested_fields() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path(format!("{}/videos/v1", DOCS)))
            .and(query_param("currentDocument.exists", "true"))
            .and(body_json(json!({
                "fields": {
                    "status": { "stringValue": "processing" },
                    "face_stage": { "mapValue": { "fields": {
                        "status": { "stringValue": "processing" }
                    } } }
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let updates = FieldUpdates::new()
            .set(fields::STATUS, OverallStatus::Processing)
            .unwrap()
            .set(StageKind::Face.status_field(), StageStatus::Processing)
            .unwrap();
        store(&server).update(&VideoId::from("v1"), updates).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let query = requests[0].url.query().unwrap_or_default().to_string();
        assert!(query.contains("updateMask.fieldPaths=status"));
        assert!(query.contains("updateMask.fieldPaths=face_stage.status"));
    }

    #[tokio::test]
    async fn test_update_missing_document_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let updates = FieldUpdates::new().set(fields::STATUS, OverallStatus::Failed).unwrap();
        let err = store(&server)
            .update(&VideoId::from("v1"), updates)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_create_conflict_is_already_exists() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{}/videos", DOCS)))
            .and(query_param("documentId", "v1"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let record = VideoRecord::new(VideoId::from("v1"), "/uploads/a.mp4", "a.mp4", 1);
        let err = store(&server).create(&record).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(stored_doc("v1", "completed")))
            .mount(&server)
            .await;

        let record = store(&server).get(&VideoId::from("v1")).await.unwrap().unwrap();
        assert_eq!(record.status, OverallStatus::Completed);
    }

    #[tokio::test]
    async fn test_list_follows_page_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{}/videos", DOCS)))
            .and(query_param("pageToken", "next"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [stored_doc("v2", "failed")]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/videos", DOCS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [stored_doc("v1", "completed")],
                "nextPageToken": "next"
            })))
            .mount(&server)
            .await;

        let records = store(&server).list_all().await.unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["v1", "v2"]);
    }
}
