//! Pipeline orchestration.
//!
//! A run moves the record through `processing`, runs the face stage and
//! then the speech stage, persisting each stage result as soon as it is
//! known, and finally aggregates the two stage statuses into the overall
//! status. Stage failures are recorded in the stage and never stop the
//! sibling stage. Anything that prevents the run itself from finishing
//! (store errors, a vanished record) marks the whole record failed.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, Instrument};
use vscan_models::{
    aggregate_status, fields, OverallStatus, ProcessMode, StageKind, StageResult, VideoId,
    VideoRecord,
};
use vscan_queue::ProcessVideoJob;
use vscan_store::{FieldUpdates, RecordStore};

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::stages::{FaceStage, SpeechStage};

pub struct ProcessingPipeline {
    store: Arc<dyn RecordStore>,
    face: FaceStage,
    speech: SpeechStage,
}

impl ProcessingPipeline {
    pub fn new(store: Arc<dyn RecordStore>, face: FaceStage, speech: SpeechStage) -> Self {
        Self { store, face, speech }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn speech_stage(&self) -> &SpeechStage {
        &self.speech
    }

    /// Run a queued job in its requested mode.
    pub async fn execute(&self, job: &ProcessVideoJob) -> WorkerResult<OverallStatus> {
        let video = Path::new(&job.file_path);
        match job.mode {
            ProcessMode::Full => self.run(&job.video_id, video).await,
            ProcessMode::SpeechOnly => self.run_speech_only(&job.video_id, video).await,
        }
    }

    /// Full run: face stage, then speech stage, then aggregation.
    ///
    /// Returns the persisted overall status. An `Err` means the run could
    /// not be orchestrated; the record has been marked failed if the store
    /// allowed it.
    pub async fn run(&self, video_id: &VideoId, video: &Path) -> WorkerResult<OverallStatus> {
        let logger = JobLogger::new(video_id, ProcessMode::Full.as_str());
        let started = Instant::now();

        let result = self
            .run_full(video_id, video, &logger)
            .instrument(logger.create_span())
            .await;
        self.finish(video_id, result, &logger, ProcessMode::Full, started).await
    }

    /// Re-run only the speech stage and re-aggregate with the stored face stage.
    pub async fn run_speech_only(
        &self,
        video_id: &VideoId,
        video: &Path,
    ) -> WorkerResult<OverallStatus> {
        let logger = JobLogger::new(video_id, ProcessMode::SpeechOnly.as_str());
        let started = Instant::now();

        let result = self
            .run_speech(video_id, video, &logger)
            .instrument(logger.create_span())
            .await;
        self.finish(video_id, result, &logger, ProcessMode::SpeechOnly, started)
            .await
    }

    async fn run_full(
        &self,
        video_id: &VideoId,
        video: &Path,
        logger: &JobLogger,
    ) -> WorkerResult<OverallStatus> {
        let record = self.load(video_id).await?;
        logger.log_start(&format!(
            "{} (frame interval {})",
            video.display(),
            record.frame_interval
        ));

        let now = Utc::now();
        let processing = FieldUpdates::new()
            .set(fields::STATUS, OverallStatus::Processing)?
            .set(fields::FACE_STAGE, StageResult::<()>::processing(now))?
            .set(fields::SPEECH_STAGE, StageResult::<()>::processing(now))?
            .set_json(fields::FINISHED_AT, serde_json::Value::Null)
            .set_json(fields::ERROR, serde_json::Value::Null)
            .set(fields::UPDATED_AT, now)?;
        self.store.update(video_id, processing).await?;

        let face_started = Utc::now();
        let clock = Instant::now();
        let face = match self.face.run(video_id, video, record.frame_interval).await {
            Ok(outcome) => {
                logger.log_progress(&format!(
                    "face stage completed: {} faces in {} sampled frames",
                    outcome.faces_detected, outcome.sampled_frame_count
                ));
                StageResult::completed(outcome, Some(face_started))
            }
            Err(e) => {
                logger.log_warning(&format!("face stage failed: {}", e));
                StageResult::failed(e.stage_message(), Some(face_started))
            }
        };
        metrics::record_stage(StageKind::Face, face.status, clock.elapsed());
        self.persist_stage(video_id, StageKind::Face, &face).await?;

        self.speech_step(video_id, video, logger).await?;

        self.aggregate(video_id).await
    }

    async fn run_speech(
        &self,
        video_id: &VideoId,
        video: &Path,
        logger: &JobLogger,
    ) -> WorkerResult<OverallStatus> {
        let record = self.load(video_id).await?;
        if !record.face_stage.status.is_terminal() {
            return Err(WorkerError::validation(format!(
                "face stage is {}; speech-only runs need a finished face stage",
                record.face_stage.status
            )));
        }
        logger.log_start(&video.display().to_string());

        let now = Utc::now();
        let processing = FieldUpdates::new()
            .set(fields::STATUS, OverallStatus::Processing)?
            .set(fields::SPEECH_STAGE, StageResult::<()>::processing(now))?
            .set_json(fields::FINISHED_AT, serde_json::Value::Null)
            .set_json(fields::ERROR, serde_json::Value::Null)
            .set(fields::UPDATED_AT, now)?;
        self.store.update(video_id, processing).await?;

        self.speech_step(video_id, video, logger).await?;

        self.aggregate(video_id).await
    }

    async fn speech_step(
        &self,
        video_id: &VideoId,
        video: &Path,
        logger: &JobLogger,
    ) -> WorkerResult<()> {
        let started = Utc::now();
        let clock = Instant::now();
        let speech = match self.speech.run(video_id, video).await {
            Ok(outcome) => {
                logger.log_progress(&format!(
                    "speech stage completed: {} segments, {}% confidence",
                    outcome.total_segments, outcome.overall_confidence_percent
                ));
                StageResult::completed(outcome, Some(started))
            }
            Err(e) => {
                logger.log_warning(&format!("speech stage failed: {}", e));
                StageResult::failed(e.stage_message(), Some(started))
            }
        };
        metrics::record_stage(StageKind::Speech, speech.status, clock.elapsed());
        self.persist_stage(video_id, StageKind::Speech, &speech).await
    }

    async fn load(&self, video_id: &VideoId) -> WorkerResult<VideoRecord> {
        self.store
            .get(video_id)
            .await?
            .ok_or_else(|| WorkerError::NotFound(video_id.clone()))
    }

    async fn persist_stage<T: Serialize>(
        &self,
        video_id: &VideoId,
        stage: StageKind,
        result: &StageResult<T>,
    ) -> WorkerResult<()> {
        let updates = FieldUpdates::new()
            .set(stage.field(), result)?
            .set(fields::UPDATED_AT, Utc::now())?;
        self.store.update(video_id, updates).await?;
        Ok(())
    }

    /// Aggregate from what is stored, not from what this run computed.
    async fn aggregate(&self, video_id: &VideoId) -> WorkerResult<OverallStatus> {
        let record = self.load(video_id).await?;
        let face = record.stage_status(StageKind::Face);
        let speech = record.stage_status(StageKind::Speech);

        let status = aggregate_status(face, speech).ok_or_else(|| {
            WorkerError::orchestration(format!(
                "cannot aggregate non-terminal stages (face {}, speech {})",
                face, speech
            ))
        })?;

        let now = Utc::now();
        let updates = FieldUpdates::new()
            .set(fields::STATUS, status)?
            .set(fields::FINISHED_AT, now)?
            .set(fields::UPDATED_AT, now)?;
        self.store.update(video_id, updates).await?;
        Ok(status)
    }

    async fn finish(
        &self,
        video_id: &VideoId,
        result: WorkerResult<OverallStatus>,
        logger: &JobLogger,
        mode: ProcessMode,
        started: Instant,
    ) -> WorkerResult<OverallStatus> {
        match result {
            Ok(status) => {
                logger.log_completion(&format!("overall status {}", status));
                metrics::record_run(mode.as_str(), status, started.elapsed());
                Ok(status)
            }
            Err(e) => {
                logger.log_error(&e.to_string());
                metrics::record_run(mode.as_str(), OverallStatus::Failed, started.elapsed());
                self.mark_failed(video_id, &e).await;
                Err(e)
            }
        }
    }

    /// Best effort: the store may be the thing that failed. Rejected runs
    /// never touched the record and leave it alone.
    async fn mark_failed(&self, video_id: &VideoId, cause: &WorkerError) {
        if matches!(cause, WorkerError::NotFound(_) | WorkerError::Validation(_)) {
            return;
        }
        if let Err(e) = self.record_failure(video_id, cause).await {
            error!(video_id = %video_id, "Failed to mark run as failed: {}", e);
        }
    }

    /// Stages the aborted run left queued or processing are failed with the
    /// run's error so pollers see a terminal state.
    async fn record_failure(&self, video_id: &VideoId, cause: &WorkerError) -> WorkerResult<()> {
        let now = Utc::now();
        let message = format!("run aborted: {}", cause);
        let mut updates = FieldUpdates::new()
            .set(fields::STATUS, OverallStatus::Failed)?
            .set(fields::ERROR, cause.to_string())?
            .set(fields::FINISHED_AT, now)?
            .set(fields::UPDATED_AT, now)?;

        if let Ok(Some(record)) = self.store.get(video_id).await {
            for (stage, status, started_at) in [
                (StageKind::Face, record.face_stage.status, record.face_stage.started_at),
                (StageKind::Speech, record.speech_stage.status, record.speech_stage.started_at),
            ] {
                if !status.is_terminal() {
                    updates =
                        updates.set(stage.field(), StageResult::<()>::failed(&message, started_at))?;
                }
            }
        }

        self.store.update(video_id, updates).await?;
        Ok(())
    }
}
