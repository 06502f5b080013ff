//! Video record models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::face::{FaceOutcome, DEFAULT_FRAME_INTERVAL};
use crate::speech::SpeechOutcome;
use crate::stage::{StageKind, StageResult, StageStatus};

/// Unique identifier for an uploaded video.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    /// Generate a new random video ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id can name on-disk artifacts: 1 to
    /// [`MAX_VIDEO_ID_LEN`] ASCII letters, digits, `-` or `_`.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= MAX_VIDEO_ID_LEN
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    }
}

/// Longest caller-assigned video id.
pub const MAX_VIDEO_ID_LEN: usize = 128;

fn validate_video_id(id: &VideoId) -> Result<(), ValidationError> {
    if id.is_valid() {
        return Ok(());
    }
    let mut error = ValidationError::new("video_id");
    error.message = Some("video id must be 1-128 letters, digits, '-' or '_'".into());
    Err(error)
}

impl Default for VideoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VideoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VideoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Overall processing status, derived from the two stage statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    /// Record created, no run started yet
    #[default]
    Uploaded,
    /// A pipeline run is in progress
    Processing,
    /// Both stages completed
    Completed,
    /// Exactly one stage completed
    PartialSuccess,
    /// Both stages failed, or the run itself failed
    Failed,
}

impl OverallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverallStatus::Uploaded => "uploaded",
            OverallStatus::Processing => "processing",
            OverallStatus::Completed => "completed",
            OverallStatus::PartialSuccess => "partial_success",
            OverallStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OverallStatus::Completed | OverallStatus::PartialSuccess | OverallStatus::Failed
        )
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Video record stored in the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoRecord {
    /// Unique video ID
    pub id: VideoId,

    /// Path of the saved upload
    pub source_path: String,

    /// Original file name
    pub filename: String,

    /// Upload size in bytes
    #[serde(default)]
    pub size_bytes: u64,

    /// Upload timestamp
    pub uploaded_at: DateTime<Utc>,

    /// Aggregated status
    #[serde(default)]
    pub status: OverallStatus,

    /// Face extraction stage
    #[serde(default)]
    pub face_stage: StageResult<FaceOutcome>,

    /// Speech transcription stage
    #[serde(default)]
    pub speech_stage: StageResult<SpeechOutcome>,

    /// Sampling interval for the face stage
    #[serde(default = "default_frame_interval")]
    pub frame_interval: u32,

    /// When the overall status became terminal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Orchestration error (not attributable to a stage)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Last update timestamp
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_frame_interval() -> u32 {
    DEFAULT_FRAME_INTERVAL
}

impl VideoRecord {
    /// Create a freshly uploaded record with both stages queued.
    pub fn new(
        id: VideoId,
        source_path: impl Into<String>,
        filename: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            source_path: source_path.into(),
            filename: filename.into(),
            size_bytes,
            uploaded_at: now,
            status: OverallStatus::Uploaded,
            face_stage: StageResult::queued(),
            speech_stage: StageResult::queued(),
            frame_interval: DEFAULT_FRAME_INTERVAL,
            finished_at: None,
            error: None,
            updated_at: now,
        }
    }

    /// Set the sampling interval.
    pub fn with_frame_interval(mut self, interval: u32) -> Self {
        self.frame_interval = interval;
        self
    }

    pub fn stage_status(&self, stage: StageKind) -> StageStatus {
        match stage {
            StageKind::Face => self.face_stage.status,
            StageKind::Speech => self.speech_stage.status,
        }
    }

    pub fn summary(&self) -> VideoSummary {
        VideoSummary {
            id: self.id.clone(),
            filename: self.filename.clone(),
            status: self.status,
            uploaded_at: self.uploaded_at,
        }
    }
}

/// Listing entry for a video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VideoSummary {
    pub id: VideoId,
    pub filename: String,
    pub status: OverallStatus,
    pub uploaded_at: DateTime<Utc>,
}

/// Input for submitting a saved upload to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct SubmitVideoRequest {
    /// Caller-assigned ID; generated when absent
    #[serde(default)]
    #[validate(custom(function = "validate_video_id"))]
    pub video_id: Option<VideoId>,

    /// Path of the saved upload
    #[validate(length(min = 1, message = "file path is required"))]
    pub file_path: String,

    /// Original file name; defaults to the path's file name
    #[serde(default)]
    #[validate(length(max = 255))]
    pub filename: Option<String>,

    /// Sampling interval override
    #[serde(default)]
    #[validate(range(min = 1, message = "frame interval must be at least 1"))]
    pub frame_interval: Option<u32>,
}

impl SubmitVideoRequest {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            video_id: None,
            file_path: file_path.into(),
            filename: None,
            frame_interval: None,
        }
    }

    pub fn with_video_id(mut self, id: VideoId) -> Self {
        self.video_id = Some(id);
        self
    }

    pub fn with_frame_interval(mut self, interval: u32) -> Self {
        self.frame_interval = Some(interval);
        self
    }
}
