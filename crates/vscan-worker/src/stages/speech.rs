//! Speech stage: extract audio, transcribe, score, tag pitch.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};
use vscan_media::{AudioExtractor, PitchAnalyzer, PitchReport, RawSegment, Transcript};
use vscan_models::{PitchAnalysis, SpeechOutcome, VideoId};

use crate::error::WorkerResult;
use crate::paths::{ignore_missing, WorkPaths};
use crate::transcriber::LazyTranscriber;

pub struct SpeechStage {
    extractor: Arc<dyn AudioExtractor>,
    transcriber: Arc<LazyTranscriber>,
    pitch: PitchAnalyzer,
    paths: WorkPaths,
    keep_audio: bool,
}

impl SpeechStage {
    pub fn new(
        extractor: Arc<dyn AudioExtractor>,
        transcriber: Arc<LazyTranscriber>,
        paths: WorkPaths,
    ) -> Self {
        Self {
            extractor,
            transcriber,
            pitch: PitchAnalyzer::default(),
            paths,
            keep_audio: true,
        }
    }

    pub fn with_pitch(mut self, pitch: PitchAnalyzer) -> Self {
        self.pitch = pitch;
        self
    }

    /// Delete the extracted WAV once the stage is done.
    pub fn with_keep_audio(mut self, keep_audio: bool) -> Self {
        self.keep_audio = keep_audio;
        self
    }

    pub fn transcriber(&self) -> &LazyTranscriber {
        &self.transcriber
    }

    pub async fn run(&self, video_id: &VideoId, video: &Path) -> WorkerResult<SpeechOutcome> {
        let audio_path = self.paths.audio_path(video_id)?;
        let audio_path = self.extractor.extract(video, &audio_path).await?;

        let result = self.analyze(video_id, &audio_path).await;

        if !self.keep_audio {
            if let Err(e) = ignore_missing(tokio::fs::remove_file(&audio_path).await) {
                warn!(path = %audio_path.display(), "Failed to remove audio: {}", e);
            }
        }

        result
    }

    async fn analyze(&self, video_id: &VideoId, audio_path: &Path) -> WorkerResult<SpeechOutcome> {
        let Transcript { segments, language } = self.transcriber.transcribe(audio_path).await?;
        let mut segments: Vec<_> = segments.into_iter().map(RawSegment::into_segment).collect();
        debug!(segments = segments.len(), "Transcription finished");

        let report = self.pitch_report(audio_path).await;
        report.tag_segments(&mut segments);

        let mut outcome =
            SpeechOutcome::from_segments(audio_path.display().to_string(), segments, language);
        outcome.pitch = Some(report.analysis);

        let transcript_path = self.paths.transcript_path(video_id)?;
        if let Some(parent) = transcript_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut text = outcome.formatted_transcript.join("\n");
        text.push('\n');
        tokio::fs::write(&transcript_path, text).await?;
        outcome.transcript_path = Some(transcript_path.display().to_string());

        Ok(outcome)
    }

    /// Never fails; a crashed analysis degrades like any other pitch error.
    async fn pitch_report(&self, audio_path: &Path) -> PitchReport {
        let analyzer = self.pitch.clone();
        let path = audio_path.to_path_buf();
        tokio::task::spawn_blocking(move || analyzer.analyze_file_lossy(&path))
            .await
            .unwrap_or_else(|e| PitchReport {
                contour: Vec::new(),
                analysis: PitchAnalysis::from_error(e),
            })
    }
}
