//! Face extraction stage outcome.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default sampling interval: inspect every 30th frame.
pub const DEFAULT_FRAME_INTERVAL: u32 = 30;

/// Payload of a completed face stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FaceOutcome {
    /// Frames decoded from the source (whole stream, not just sampled ones)
    pub total_frames: u64,

    /// Frames actually handed to the detector
    pub sampled_frame_count: u64,

    /// Sum of per-frame box counts; the same person seen in two frames
    /// counts twice
    pub faces_detected: u64,

    /// Directory holding `frame_*.jpg` and `face_*.jpg` artifacts
    pub frames_directory: String,

    #[serde(default)]
    pub frames_persisted: u64,

    #[serde(default)]
    pub crops_persisted: u64,
}
