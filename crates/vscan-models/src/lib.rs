//! Shared data models for the vscan ingest pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Video records and their overall status
//! - Per-stage results for face extraction and speech transcription
//! - Confidence scoring and pitch/emotion labels
//! - Dotted field paths used for partial record updates

pub mod confidence;
pub mod face;
pub mod fields;
pub mod job;
pub mod speech;
pub mod stage;
pub mod video;

// Re-export common types
pub use confidence::{overall_log_prob, to_percentage, ConfidenceQuality};
pub use face::{FaceOutcome, DEFAULT_FRAME_INTERVAL};
pub use job::{JobId, ProcessMode};
pub use speech::{EmotionLabel, PitchAnalysis, SpeechOutcome, TranscriptionSegment};
pub use stage::{aggregate_status, StageKind, StageResult, StageStatus};
pub use video::{
    OverallStatus, SubmitVideoRequest, VideoId, VideoRecord, VideoSummary, MAX_VIDEO_ID_LEN,
};
