//! Record field names used in dotted-path partial updates.

pub const STATUS: &str = "status";
pub const FACE_STAGE: &str = "face_stage";
pub const SPEECH_STAGE: &str = "speech_stage";
pub const FRAME_INTERVAL: &str = "frame_interval";
pub const FINISHED_AT: &str = "finished_at";
pub const ERROR: &str = "error";
pub const UPDATED_AT: &str = "updated_at";

/// Field inside a `StageResult`.
pub const STAGE_STATUS: &str = "status";
pub const STAGE_STARTED_AT: &str = "started_at";

/// Join field names into a dotted path.
pub fn path(segments: &[&str]) -> String {
    segments.join(".")
}
