//! Job types for the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vscan_models::{JobId, ProcessMode, VideoId};

/// Run the pipeline for one uploaded video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessVideoJob {
    pub job_id: JobId,
    pub video_id: VideoId,
    /// Path of the saved upload
    pub file_path: String,
    #[serde(default)]
    pub mode: ProcessMode,
    pub created_at: DateTime<Utc>,
}

impl ProcessVideoJob {
    pub fn new(video_id: VideoId, file_path: impl Into<String>) -> Self {
        Self {
            job_id: JobId::new(),
            video_id,
            file_path: file_path.into(),
            mode: ProcessMode::Full,
            created_at: Utc::now(),
        }
    }

    /// Run only the speech stage.
    pub fn speech_only(mut self) -> Self {
        self.mode = ProcessMode::SpeechOnly;
        self
    }

    /// Generate idempotency key for deduplication.
    ///
    /// One pending job per video and mode.
    pub fn idempotency_key(&self) -> String {
        format!("process:{}:{}", self.video_id, self.mode)
    }
}

/// Generic job wrapper for queue storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueJob {
    ProcessVideo(ProcessVideoJob),
}

impl QueueJob {
    pub fn job_id(&self) -> &JobId {
        match self {
            QueueJob::ProcessVideo(j) => &j.job_id,
        }
    }

    pub fn video_id(&self) -> &VideoId {
        match self {
            QueueJob::ProcessVideo(j) => &j.video_id,
        }
    }

    pub fn idempotency_key(&self) -> String {
        match self {
            QueueJob::ProcessVideo(j) => j.idempotency_key(),
        }
    }
}

impl From<ProcessVideoJob> for QueueJob {
    fn from(job: ProcessVideoJob) -> Self {
        QueueJob::ProcessVideo(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_job_serde_roundtrip() {
        let job = ProcessVideoJob::new(VideoId::from("v1"), "/uploads/v1.mp4").speech_only();
        let wrapper = QueueJob::from(job.clone());

        let json = serde_json::to_value(&wrapper).unwrap();
        assert_eq!(json["type"], "process_video");
        assert_eq!(json["mode"], "speech_only");

        let decoded: QueueJob = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, QueueJob::ProcessVideo(job));
    }

    #[test]
    fn test_missing_mode_defaults_to_full() {
        let decoded: QueueJob = serde_json::from_str(
            r#"{"type":"process_video","job_id":"j1","video_id":"v1",
                "file_path":"/a.mp4","created_at":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        let QueueJob::ProcessVideo(job) = decoded;
        assert_eq!(job.mode, ProcessMode::Full);
    }

    #[test]
    fn test_idempotency_key_separates_modes() {
        let full = ProcessVideoJob::new(VideoId::from("v1"), "/a.mp4");
        let speech = full.clone().speech_only();
        assert_eq!(full.idempotency_key(), "process:v1:full");
        assert_ne!(full.idempotency_key(), speech.idempotency_key());
    }
}
