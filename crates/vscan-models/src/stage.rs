//! Per-stage processing state.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::fields;
use crate::video::OverallStatus;

/// Status of a single analysis stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Waiting for a pipeline run
    #[default]
    Queued,
    /// Stage is running
    Processing,
    /// Stage finished and produced an outcome
    Completed,
    /// Stage failed; the error is recorded on the result
    Failed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Queued => "queued",
            StageStatus::Processing => "processing",
            StageStatus::Completed => "completed",
            StageStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Completed | StageStatus::Failed)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The two analysis stages applied to every video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Face,
    Speech,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Face => "face",
            StageKind::Speech => "speech",
        }
    }

    /// Record field holding this stage's result.
    pub fn field(&self) -> &'static str {
        match self {
            StageKind::Face => fields::FACE_STAGE,
            StageKind::Speech => fields::SPEECH_STAGE,
        }
    }

    /// Dotted path to this stage's status.
    pub fn status_field(&self) -> String {
        fields::path(&[self.field(), fields::STAGE_STATUS])
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of one stage for one video.
///
/// `outcome` is present iff the stage completed and `error` iff it failed.
/// Construct through the associated functions to keep that true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StageResult<T> {
    pub status: StageStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    // No `default` here: serde would then require `T: Default`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<T>,
}

impl<T> Default for StageResult<T> {
    fn default() -> Self {
        Self::queued()
    }
}

impl<T> StageResult<T> {
    pub fn queued() -> Self {
        Self {
            status: StageStatus::Queued,
            started_at: None,
            completed_at: None,
            failed_at: None,
            error: None,
            outcome: None,
        }
    }

    pub fn processing(started_at: DateTime<Utc>) -> Self {
        Self {
            status: StageStatus::Processing,
            started_at: Some(started_at),
            ..Self::queued()
        }
    }

    pub fn completed(outcome: T, started_at: Option<DateTime<Utc>>) -> Self {
        Self {
            status: StageStatus::Completed,
            started_at,
            completed_at: Some(Utc::now()),
            outcome: Some(outcome),
            ..Self::queued()
        }
    }

    pub fn failed(error: impl Into<String>, started_at: Option<DateTime<Utc>>) -> Self {
        Self {
            status: StageStatus::Failed,
            started_at,
            failed_at: Some(Utc::now()),
            error: Some(error.into()),
            ..Self::queued()
        }
    }

    /// Outcome, only when the stage completed.
    pub fn outcome(&self) -> Option<&T> {
        match self.status {
            StageStatus::Completed => self.outcome.as_ref(),
            _ => None,
        }
    }

    /// Check the payload/status pairing.
    pub fn is_consistent(&self) -> bool {
        match self.status {
            StageStatus::Queued | StageStatus::Processing => {
                self.outcome.is_none()
                    && self.error.is_none()
                    && self.completed_at.is_none()
                    && self.failed_at.is_none()
            }
            StageStatus::Completed => {
                self.outcome.is_some() && self.error.is_none() && self.completed_at.is_some()
            }
            StageStatus::Failed => {
                self.outcome.is_none() && self.error.is_some() && self.failed_at.is_some()
            }
        }
    }
}

/// Aggregate two stage statuses into an overall status.
///
/// Returns `None` while either stage is still queued or running; the
/// pipeline only aggregates after both stages have been persisted.
pub fn aggregate_status(face: StageStatus, speech: StageStatus) -> Option<OverallStatus> {
    use StageStatus::*;

    match (face, speech) {
        (Completed, Completed) => Some(OverallStatus::Completed),
        (Failed, Failed) => Some(OverallStatus::Failed),
        (Completed, Failed) | (Failed, Completed) => Some(OverallStatus::PartialSuccess),
        (Queued | Processing, _) | (_, Queued | Processing) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_truth_table() {
        use StageStatus::*;
        assert_eq!(aggregate_status(Completed, Completed), Some(OverallStatus::Completed));
        assert_eq!(aggregate_status(Failed, Failed), Some(OverallStatus::Failed));
        assert_eq!(
            aggregate_status(Completed, Failed),
            Some(OverallStatus::PartialSuccess)
        );
        assert_eq!(
            aggregate_status(Failed, Completed),
            Some(OverallStatus::PartialSuccess)
        );
    }

    #[test]
    fn test_aggregate_non_terminal() {
        use StageStatus::*;
        assert_eq!(aggregate_status(Processing, Completed), None);
        assert_eq!(aggregate_status(Failed, Queued), None);
    }

    #[test]
    fn test_stage_result_constructors_are_consistent() {
        let started = Utc::now();
        assert!(StageResult::<u32>::queued().is_consistent());
        assert!(StageResult::<u32>::processing(started).is_consistent());
        assert!(StageResult::completed(7u32, Some(started)).is_consistent());
        assert!(StageResult::<u32>::failed("boom", Some(started)).is_consistent());
    }

    #[test]
    fn test_outcome_only_when_completed() {
        let done = StageResult::completed(3u32, None);
        assert_eq!(done.outcome(), Some(&3));

        let mut bogus = StageResult::<u32>::queued();
        bogus.outcome = Some(1);
        assert_eq!(bogus.outcome(), None);
        assert!(!bogus.is_consistent());
    }

    #[test]
    fn test_stage_result_serialization_omits_empty() {
        let json = serde_json::to_value(StageResult::<u32>::queued()).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "queued" }));

        let failed = serde_json::to_value(StageResult::<u32>::failed("no audio", None)).unwrap();
        assert_eq!(failed["status"], "failed");
        assert_eq!(failed["error"], "no audio");
        assert!(failed.get("outcome").is_none());
    }

    #[test]
    fn test_stage_without_outcome_deserializes_for_non_default_payload() {
        use crate::face::FaceOutcome;

        let queued: StageResult<FaceOutcome> =
            serde_json::from_value(serde_json::json!({ "status": "queued" })).unwrap();
        assert_eq!(queued, StageResult::queued());

        let failed: StageResult<FaceOutcome> = serde_json::from_value(serde_json::json!({
            "status": "failed",
            "error": "decode failed"
        }))
        .unwrap();
        assert_eq!(failed.outcome, None);
        assert_eq!(failed.error.as_deref(), Some("decode failed"));
    }

    #[test]
    fn test_status_field_paths() {
        assert_eq!(StageKind::Face.status_field(), "face_stage.status");
        assert_eq!(StageKind::Speech.status_field(), "speech_stage.status");
    }
}
