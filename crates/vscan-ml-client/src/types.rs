//! ML service request/response types.

use serde::{Deserialize, Serialize};
use vscan_media::{BoundingBox, RawSegment, Transcript};

/// One detected face, in pixels of the submitted image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub score: Option<f64>,
}

impl From<&FaceBox> for BoundingBox {
    fn from(f: &FaceBox) -> Self {
        BoundingBox::new(f.x, f.y, f.width, f.height)
    }
}

/// Response from the face detection endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectFacesResponse {
    #[serde(default)]
    pub faces: Vec<FaceBox>,
}

/// Segment in a `verbose_json` transcription response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionSegmentDto {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default)]
    pub avg_logprob: f64,
}

/// `verbose_json` transcription response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptionResponse {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub segments: Vec<TranscriptionSegmentDto>,
}

impl From<TranscriptionResponse> for Transcript {
    fn from(r: TranscriptionResponse) -> Self {
        Transcript {
            segments: r
                .segments
                .into_iter()
                .map(|s| RawSegment::new(s.start, s.end, s.text, s.avg_logprob))
                .collect(),
            language: r.language.filter(|l| !l.is_empty()),
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: Option<String>,
}
