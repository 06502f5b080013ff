//! Speech transcription stage outcome, segments and pitch analysis.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::confidence::{overall_log_prob, round_to, to_percentage, ConfidenceQuality};

/// One time-aligned piece of transcribed speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TranscriptionSegment {
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub text: String,
    /// Average token log-probability reported by the engine
    pub raw_log_prob: f64,
    pub confidence_percent: f64,

    /// Mean voiced pitch inside this segment's time range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch_hz: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion_label: Option<EmotionLabel>,
}

impl TranscriptionSegment {
    /// Build a segment, trimming the text and scoring the log-probability.
    pub fn new(start_seconds: f64, end_seconds: f64, text: &str, raw_log_prob: f64) -> Self {
        Self {
            start_seconds,
            end_seconds,
            text: text.trim().to_string(),
            raw_log_prob,
            confidence_percent: to_percentage(raw_log_prob),
            pitch_hz: None,
            emotion_label: None,
        }
    }

    /// `[1.00s - 2.50s]: text`
    pub fn formatted(&self) -> String {
        format!(
            "[{:.2}s - {:.2}s]: {}",
            self.start_seconds, self.end_seconds, self.text
        )
    }

    pub fn duration(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }
}

/// Payload of a completed speech stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SpeechOutcome {
    pub audio_path: String,
    pub segments: Vec<TranscriptionSegment>,
    pub total_segments: u64,
    pub total_duration_seconds: f64,
    pub overall_log_prob: f64,
    pub overall_confidence_percent: f64,
    pub overall_confidence_quality: ConfidenceQuality,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(default)]
    pub formatted_transcript: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<PitchAnalysis>,
}

impl SpeechOutcome {
    /// Summarize an ordered segment list.
    pub fn from_segments(
        audio_path: impl Into<String>,
        segments: Vec<TranscriptionSegment>,
        language: Option<String>,
    ) -> Self {
        let log_probs: Vec<f64> = segments.iter().map(|s| s.raw_log_prob).collect();
        let overall = overall_log_prob(&log_probs);
        let total_duration_seconds = segments.last().map(|s| s.end_seconds).unwrap_or(0.0);
        let formatted_transcript = segments.iter().map(TranscriptionSegment::formatted).collect();

        Self {
            audio_path: audio_path.into(),
            total_segments: segments.len() as u64,
            segments,
            total_duration_seconds,
            overall_log_prob: overall,
            overall_confidence_percent: to_percentage(overall),
            overall_confidence_quality: ConfidenceQuality::from_log_prob(overall),
            language,
            formatted_transcript,
            transcript_path: None,
            pitch: None,
        }
    }

    /// Human-readable summary block.
    pub fn summary(&self) -> String {
        if self.formatted_transcript.is_empty() {
            return "No transcription available".to_string();
        }

        let (average_pitch, emotion) = match &self.pitch {
            Some(p) => (p.mean_hz, p.emotion_label().to_string()),
            None => (0.0, "Unknown".to_string()),
        };

        format!(
            "Speech Transcription Results\n\
             ============================\n\
             Total Segments: {}\n\
             Language: {}\n\
             Average Pitch: {} Hz\n\
             Estimated Emotion: {}\n\
             Overall Confidence: {}% ({})\n\
             \n\
             Transcription:\n{}\n",
            self.total_segments,
            self.language.as_deref().unwrap_or("Unknown"),
            average_pitch,
            emotion,
            self.overall_confidence_percent,
            self.overall_confidence_quality,
            self.formatted_transcript.join("\n"),
        )
    }
}

/// Coarse emotional label derived from mean pitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum EmotionLabel {
    #[serde(rename = "Calm / Deep Voice")]
    CalmDeep,
    #[serde(rename = "Neutral / Confident")]
    NeutralConfident,
    #[serde(rename = "Animated / Engaged")]
    AnimatedEngaged,
    #[serde(rename = "Excited / High-pitched / Nervous")]
    ExcitedHighPitched,
}

impl EmotionLabel {
    /// Classify a mean pitch in Hz.
    pub fn from_mean_hz(mean_hz: f64) -> Self {
        if mean_hz < 140.0 {
            EmotionLabel::CalmDeep
        } else if mean_hz < 200.0 {
            EmotionLabel::NeutralConfident
        } else if mean_hz < 250.0 {
            EmotionLabel::AnimatedEngaged
        } else {
            EmotionLabel::ExcitedHighPitched
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::CalmDeep => "Calm / Deep Voice",
            EmotionLabel::NeutralConfident => "Neutral / Confident",
            EmotionLabel::AnimatedEngaged => "Animated / Engaged",
            EmotionLabel::ExcitedHighPitched => "Excited / High-pitched / Nervous",
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Aggregate pitch statistics over voiced samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PitchAnalysis {
    pub mean_hz: f64,
    pub min_hz: f64,
    pub max_hz: f64,
    pub std_dev_hz: f64,
    pub voiced_samples: u64,

    /// None when no voice was detected or the analysis failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<EmotionLabel>,

    pub summary: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PitchAnalysis {
    pub const NO_VOICE_LABEL: &'static str = "Unknown - No voice detected";
    pub const ERROR_LABEL: &'static str = "Error in analysis";

    /// Sentinel for a waveform without voiced samples.
    pub fn no_voice() -> Self {
        Self {
            mean_hz: 0.0,
            min_hz: 0.0,
            max_hz: 0.0,
            std_dev_hz: 0.0,
            voiced_samples: 0,
            emotion: None,
            summary: "No voiced segments detected".to_string(),
            error: None,
        }
    }

    /// Degraded result carrying the failure message.
    pub fn from_error(message: impl fmt::Display) -> Self {
        let message = message.to_string();
        Self {
            summary: format!("Error: {}", message),
            error: Some(message),
            ..Self::no_voice()
        }
    }

    /// Compute statistics over a pitch contour. Samples at or below zero
    /// are unvoiced and ignored.
    pub fn from_contour(contour_hz: &[f64]) -> Self {
        let voiced: Vec<f64> = contour_hz
            .iter()
            .copied()
            .filter(|hz| *hz > 0.0 && hz.is_finite())
            .collect();

        if voiced.is_empty() {
            return Self::no_voice();
        }

        let n = voiced.len() as f64;
        let mean = voiced.iter().sum::<f64>() / n;
        let min = voiced.iter().copied().fold(f64::INFINITY, f64::min);
        let max = voiced.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let variance = voiced.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let emotion = EmotionLabel::from_mean_hz(mean);

        Self {
            mean_hz: round_to(mean, 2),
            min_hz: round_to(min, 2),
            max_hz: round_to(max, 2),
            std_dev_hz: round_to(variance.sqrt(), 2),
            voiced_samples: voiced.len() as u64,
            emotion: Some(emotion),
            summary: format!("Average pitch: {:.2} Hz - {}", mean, emotion),
            error: None,
        }
    }

    pub fn is_voiced(&self) -> bool {
        self.voiced_samples > 0
    }

    /// Emotion label text, including the sentinel labels.
    pub fn emotion_label(&self) -> &str {
        match (&self.emotion, &self.error) {
            (Some(emotion), _) => emotion.as_str(),
            (None, Some(_)) => Self::ERROR_LABEL,
            (None, None) => Self::NO_VOICE_LABEL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emotion_thresholds() {
        assert_eq!(EmotionLabel::from_mean_hz(90.0), EmotionLabel::CalmDeep);
        assert_eq!(EmotionLabel::from_mean_hz(139.99), EmotionLabel::CalmDeep);
        assert_eq!(EmotionLabel::from_mean_hz(140.0), EmotionLabel::NeutralConfident);
        assert_eq!(EmotionLabel::from_mean_hz(200.0), EmotionLabel::AnimatedEngaged);
        assert_eq!(EmotionLabel::from_mean_hz(250.0), EmotionLabel::ExcitedHighPitched);
        assert_eq!(EmotionLabel::from_mean_hz(400.0), EmotionLabel::ExcitedHighPitched);
    }

    #[test]
    fn test_pitch_from_unvoiced_contour() {
        let analysis = PitchAnalysis::from_contour(&[0.0, 0.0, -1.0]);
        assert_eq!(analysis, PitchAnalysis::no_voice());
        assert!(!analysis.is_voiced());
        assert_eq!(analysis.emotion_label(), "Unknown - No voice detected");
        assert_eq!(analysis.mean_hz, 0.0);
        assert_eq!(analysis.std_dev_hz, 0.0);
    }

    #[test]
    fn test_pitch_statistics() {
        let analysis = PitchAnalysis::from_contour(&[0.0, 100.0, 0.0, 200.0, 300.0]);
        assert_eq!(analysis.voiced_samples, 3);
        assert_eq!(analysis.mean_hz, 200.0);
        assert_eq!(analysis.min_hz, 100.0);
        assert_eq!(analysis.max_hz, 300.0);
        // population std of [100, 200, 300]
        assert_eq!(analysis.std_dev_hz, 81.65);
        assert_eq!(analysis.emotion, Some(EmotionLabel::AnimatedEngaged));
        assert_eq!(analysis.summary, "Average pitch: 200.00 Hz - Animated / Engaged");
    }

    #[test]
    fn test_pitch_error_result() {
        let analysis = PitchAnalysis::from_error("decoder exploded");
        assert_eq!(analysis.emotion_label(), "Error in analysis");
        assert_eq!(analysis.summary, "Error: decoder exploded");
        assert_eq!(analysis.max_hz, 0.0);
    }

    #[test]
    fn test_speech_outcome_from_segments() {
        let segments = vec![
            TranscriptionSegment::new(0.0, 1.5, " hello ", -0.05),
            TranscriptionSegment::new(1.5, 3.0, "there", -0.4),
            TranscriptionSegment::new(3.0, 4.25, "friend", -0.9),
        ];
        let outcome = SpeechOutcome::from_segments("/tmp/a.wav", segments, Some("en".into()));

        assert_eq!(outcome.total_segments, 3);
        assert_eq!(outcome.total_duration_seconds, 4.25);
        assert_eq!(outcome.overall_confidence_quality, ConfidenceQuality::Fair);
        assert_eq!(outcome.overall_confidence_percent, 82.0);
        assert_eq!(outcome.segments[0].text, "hello");
        assert_eq!(outcome.segments[0].confidence_percent, 98.0);
        assert_eq!(outcome.formatted_transcript[2], "[3.00s - 4.25s]: friend");
    }

    #[test]
    fn test_speech_outcome_empty() {
        let outcome = SpeechOutcome::from_segments("/tmp/a.wav", Vec::new(), None);
        assert_eq!(outcome.total_duration_seconds, 0.0);
        assert_eq!(outcome.overall_log_prob, 0.0);
        assert_eq!(outcome.overall_confidence_percent, 100.0);
        assert_eq!(outcome.overall_confidence_quality, ConfidenceQuality::Excellent);
        assert_eq!(outcome.summary(), "No transcription available");
    }

    #[test]
    fn test_summary_mentions_language_and_emotion() {
        let mut outcome = SpeechOutcome::from_segments(
            "/tmp/a.wav",
            vec![TranscriptionSegment::new(0.0, 1.0, "hi", -0.2)],
            Some("fr".into()),
        );
        outcome.pitch = Some(PitchAnalysis::from_contour(&[120.0, 130.0]));

        let summary = outcome.summary();
        assert!(summary.contains("Language: fr"));
        assert!(summary.contains("Calm / Deep Voice"));
        assert!(summary.contains("[0.00s - 1.00s]: hi"));
    }
}
