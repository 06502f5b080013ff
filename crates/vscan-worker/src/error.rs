//! Worker error types.

use thiserror::Error;
use vscan_models::VideoId;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// Bad input, rejected before any stage starts.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Video not found: {0}")]
    NotFound(VideoId),

    /// A stage failed; recorded in that stage and never escapes the run.
    #[error("{0}")]
    Stage(String),

    /// The run itself could not proceed (store unreachable, bad state).
    #[error("Orchestration failed: {0}")]
    Orchestration(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] vscan_store::StoreError),

    #[error("Media error: {0}")]
    Media(#[from] vscan_media::MediaError),

    #[error("ML service error: {0}")]
    Ml(#[from] vscan_ml_client::MlError),

    #[error("Queue error: {0}")]
    Queue(#[from] vscan_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn stage(msg: impl Into<String>) -> Self {
        Self::Stage(msg.into())
    }

    pub fn orchestration(msg: impl Into<String>) -> Self {
        Self::Orchestration(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Message stored in a failed stage: the underlying error text.
    pub fn stage_message(&self) -> String {
        match self {
            WorkerError::Stage(msg) => msg.clone(),
            WorkerError::Media(e) => e.to_string(),
            other => other.to_string(),
        }
    }

    /// Whether the executor should leave the job for redelivery.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Store(e) => e.is_retryable(),
            WorkerError::Ml(e) => e.is_retryable(),
            WorkerError::Queue(vscan_queue::QueueError::Redis(_)) => true,
            WorkerError::Io(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vscan_media::MediaError;

    #[test]
    fn test_stage_message_keeps_media_text() {
        let err = WorkerError::from(MediaError::NoAudio("clip.mp4".to_string()));
        assert_eq!(err.stage_message(), MediaError::NoAudio("clip.mp4".to_string()).to_string());
        assert_eq!(WorkerError::stage("boom").stage_message(), "boom");
    }

    #[test]
    fn test_validation_is_not_retryable() {
        assert!(!WorkerError::validation("bad").is_retryable());
        assert!(!WorkerError::NotFound(VideoId::from("v1")).is_retryable());
    }
}
