//! Speech-to-text seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use vscan_models::TranscriptionSegment;

use crate::error::MediaResult;

/// Segment as reported by a transcription engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    /// Average token log-probability; engines that do not report one use 0
    #[serde(default)]
    pub avg_logprob: f64,
}

impl RawSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>, avg_logprob: f64) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            avg_logprob,
        }
    }

    /// Score and normalize into a stored segment. Reversed timestamps are
    /// collapsed onto the start time.
    pub fn into_segment(self) -> TranscriptionSegment {
        let end = self.end.max(self.start);
        TranscriptionSegment::new(self.start, end, &self.text, self.avg_logprob)
    }
}

/// Engine output for one waveform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub segments: Vec<RawSegment>,
    pub language: Option<String>,
}

/// Transcription engine.
#[async_trait]
pub trait Transcriber: Send + Sync {
    fn name(&self) -> &str;

    /// Transcribe a 16kHz mono WAV file into ordered segments.
    async fn transcribe(&self, audio_path: &Path) -> MediaResult<Transcript>;
}

/// Builds a transcriber. Loading may be slow (model weights, warm-up
/// requests), so callers keep the result around.
#[async_trait]
pub trait TranscriberLoader: Send + Sync {
    async fn load(&self) -> MediaResult<Arc<dyn Transcriber>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_segment_scores_and_trims() {
        let segment = RawSegment::new(1.0, 2.0, "  hi there ", -0.5).into_segment();
        assert_eq!(segment.text, "hi there");
        assert_eq!(segment.confidence_percent, 80.0);
    }

    #[test]
    fn test_into_segment_fixes_reversed_times() {
        let segment = RawSegment::new(3.0, 2.5, "x", 0.0).into_segment();
        assert_eq!(segment.start_seconds, 3.0);
        assert_eq!(segment.end_seconds, 3.0);
    }

    #[test]
    fn test_missing_logprob_defaults_to_zero() {
        let raw: RawSegment =
            serde_json::from_str(r#"{"start":0.0,"end":1.0,"text":"a"}"#).unwrap();
        assert_eq!(raw.avg_logprob, 0.0);
    }
}
