//! Caller-facing video operations.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use validator::Validate;
use vscan_models::{
    fields, FaceOutcome, OverallStatus, SpeechOutcome, StageResult, StageStatus,
    SubmitVideoRequest, VideoId, VideoRecord, VideoSummary,
};
use vscan_queue::ProcessVideoJob;
use vscan_store::{FieldUpdates, RecordStore, StoreError};

use crate::error::{WorkerError, WorkerResult};
use crate::paths::WorkPaths;
use crate::runner::TaskRunner;

/// What a client sees when polling one stage.
///
/// A run that aborts fails every stage it left unfinished, so `Pending`
/// only shows while a run is scheduled or executing.
#[derive(Debug, Clone, PartialEq)]
pub enum StagePoll<T> {
    /// Queued or processing; no outcome yet.
    Pending(StageStatus),
    Completed(T),
    /// The stage's error message, verbatim.
    Failed(String),
}

impl<T> From<StageResult<T>> for StagePoll<T> {
    fn from(stage: StageResult<T>) -> Self {
        match stage.status {
            StageStatus::Queued | StageStatus::Processing => StagePoll::Pending(stage.status),
            StageStatus::Completed => match stage.outcome {
                Some(outcome) => StagePoll::Completed(outcome),
                None => StagePoll::Failed("stage completed without an outcome".to_string()),
            },
            StageStatus::Failed => StagePoll::Failed(stage.error.unwrap_or_default()),
        }
    }
}

pub struct VideoService {
    store: Arc<dyn RecordStore>,
    runner: Arc<dyn TaskRunner>,
    paths: WorkPaths,
    default_frame_interval: u32,
}

impl VideoService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        runner: Arc<dyn TaskRunner>,
        paths: WorkPaths,
        default_frame_interval: u32,
    ) -> Self {
        Self {
            store,
            runner,
            paths,
            default_frame_interval,
        }
    }

    /// Register a saved upload and schedule a full run.
    pub async fn submit(&self, request: SubmitVideoRequest) -> WorkerResult<VideoId> {
        request
            .validate()
            .map_err(|e| WorkerError::validation(e.to_string()))?;

        let path = Path::new(&request.file_path);
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|_| WorkerError::validation(format!("file not found: {}", path.display())))?;
        if !metadata.is_file() {
            return Err(WorkerError::validation(format!(
                "not a regular file: {}",
                path.display()
            )));
        }

        let id = request.video_id.clone().unwrap_or_default();
        let filename = request.filename.clone().unwrap_or_else(|| {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| request.file_path.clone())
        });
        let interval = request.frame_interval.unwrap_or(self.default_frame_interval);

        let record = VideoRecord::new(id.clone(), &request.file_path, filename, metadata.len())
            .with_frame_interval(interval);
        self.store.create(&record).await.map_err(|e| match e {
            StoreError::AlreadyExists(_) => {
                WorkerError::validation(format!("video {} already exists", id))
            }
            other => other.into(),
        })?;

        info!(video_id = %id, path = %path.display(), interval, "Video submitted");
        self.schedule(&id, ProcessVideoJob::new(id.clone(), &request.file_path))
            .await?;
        Ok(id)
    }

    pub async fn get_status(&self, id: &VideoId) -> WorkerResult<VideoRecord> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| WorkerError::NotFound(id.clone()))
    }

    pub async fn get_face_outcome(&self, id: &VideoId) -> WorkerResult<StagePoll<FaceOutcome>> {
        Ok(self.get_status(id).await?.face_stage.into())
    }

    pub async fn get_speech_outcome(&self, id: &VideoId) -> WorkerResult<StagePoll<SpeechOutcome>> {
        Ok(self.get_status(id).await?.speech_stage.into())
    }

    /// All videos, newest upload first.
    pub async fn list_videos(&self) -> WorkerResult<Vec<VideoSummary>> {
        let mut summaries: Vec<VideoSummary> = self
            .store
            .list_all()
            .await?
            .iter()
            .map(VideoRecord::summary)
            .collect();
        summaries.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(summaries)
    }

    /// Reset both stages and schedule a new full run, optionally with a
    /// different sampling interval.
    pub async fn reprocess(&self, id: &VideoId, frame_interval: Option<u32>) -> WorkerResult<()> {
        let record = self.get_status(id).await?;
        ensure_idle(&record)?;

        let interval = frame_interval.unwrap_or(record.frame_interval);
        if interval == 0 {
            return Err(WorkerError::validation("frame interval must be at least 1"));
        }

        let updates = FieldUpdates::new()
            .set(fields::STATUS, OverallStatus::Uploaded)?
            .set(fields::FACE_STAGE, StageResult::<()>::queued())?
            .set(fields::SPEECH_STAGE, StageResult::<()>::queued())?
            .set(fields::FRAME_INTERVAL, interval)?
            .set_json(fields::FINISHED_AT, serde_json::Value::Null)
            .set_json(fields::ERROR, serde_json::Value::Null)
            .set(fields::UPDATED_AT, Utc::now())?;
        self.store.update(id, updates).await?;

        info!(video_id = %id, interval, "Reprocess requested");
        self.schedule(id, ProcessVideoJob::new(id.clone(), &record.source_path))
            .await
    }

    /// Schedule a speech-only run against a finished video.
    pub async fn retranscribe(&self, id: &VideoId) -> WorkerResult<()> {
        let record = self.get_status(id).await?;
        if !record.status.is_terminal() || !record.face_stage.status.is_terminal() {
            return Err(WorkerError::validation(format!(
                "video {} has no finished run to retranscribe (status {})",
                id, record.status
            )));
        }

        info!(video_id = %id, "Retranscribe requested");
        self.runner
            .enqueue(ProcessVideoJob::new(id.clone(), &record.source_path).speech_only())
            .await
    }

    /// Remove the record and every artifact written for it.
    pub async fn delete(&self, id: &VideoId) -> WorkerResult<()> {
        let record = self.get_status(id).await?;
        ensure_idle(&record)?;

        self.paths.remove_artifacts(id).await?;
        self.store.delete(id).await?;
        info!(video_id = %id, "Video deleted");
        Ok(())
    }

    /// Text block summarizing the transcription.
    pub async fn transcription_summary(&self, id: &VideoId) -> WorkerResult<String> {
        let record = self.get_status(id).await?;
        Ok(match record.speech_stage.outcome() {
            Some(outcome) => outcome.summary(),
            None => "No transcription available".to_string(),
        })
    }

    /// Enqueue, marking the record failed if the runner refuses the job.
    async fn schedule(&self, id: &VideoId, job: ProcessVideoJob) -> WorkerResult<()> {
        let Err(e) = self.runner.enqueue(job).await else {
            return Ok(());
        };

        warn!(video_id = %id, runner = self.runner.name(), "Could not schedule run: {}", e);
        let updates = FieldUpdates::new()
            .set(fields::STATUS, OverallStatus::Failed)?
            .set(fields::ERROR, format!("could not schedule processing: {}", e))?
            .set(fields::UPDATED_AT, Utc::now())?;
        if let Err(store_err) = self.store.update(id, updates).await {
            warn!(video_id = %id, "Failed to record scheduling failure: {}", store_err);
        }
        Err(e)
    }
}

/// Uploaded and processing records both have a run in flight or scheduled.
fn ensure_idle(record: &VideoRecord) -> WorkerResult<()> {
    if !record.status.is_terminal() {
        return Err(WorkerError::validation(format!(
            "video {} has a run in progress (status {})",
            record.id, record.status
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::MockTaskRunner;
    use vscan_models::ProcessMode;
    use vscan_store::MemoryRecordStore;

    fn service(runner: MockTaskRunner, dir: &Path) -> (VideoService, Arc<MemoryRecordStore>) {
        let store = Arc::new(MemoryRecordStore::new());
        let service = VideoService::new(store.clone(), Arc::new(runner), WorkPaths::new(dir), 30);
        (service, store)
    }

    fn upload(dir: &Path) -> String {
        let path = dir.join("clip.mp4");
        std::fs::write(&path, b"not really a video").unwrap();
        path.display().to_string()
    }

    #[tokio::test]
    async fn test_submit_creates_record_and_enqueues() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockTaskRunner::new();
        runner
            .expect_enqueue()
            .withf(|job| job.mode == ProcessMode::Full && job.video_id.as_str() == "v1")
            .times(1)
            .returning(|_| Ok(()));
        let (service, _) = service(runner, dir.path());

        let request = SubmitVideoRequest::new(upload(dir.path()))
            .with_video_id(VideoId::from("v1"))
            .with_frame_interval(10);
        let id = service.submit(request).await.unwrap();

        let record = service.get_status(&id).await.unwrap();
        assert_eq!(record.status, OverallStatus::Uploaded);
        assert_eq!(record.filename, "clip.mp4");
        assert_eq!(record.frame_interval, 10);
        assert_eq!(record.size_bytes, 18);
        assert_eq!(
            service.get_face_outcome(&id).await.unwrap(),
            StagePoll::Pending(StageStatus::Queued)
        );
    }

    #[tokio::test]
    async fn test_submit_rejects_missing_file_and_zero_interval() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockTaskRunner::new();
        runner.expect_enqueue().never();
        let (service, store) = service(runner, dir.path());

        let missing = service
            .submit(SubmitVideoRequest::new("/definitely/not/here.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(missing, WorkerError::Validation(_)));

        let zero = service
            .submit(SubmitVideoRequest::new(upload(dir.path())).with_frame_interval(0))
            .await
            .unwrap_err();
        assert!(matches!(zero, WorkerError::Validation(_)));

        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_runner_refusal_marks_record_failed() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockTaskRunner::new();
        runner
            .expect_enqueue()
            .returning(|_| Err(WorkerError::orchestration("queue down")));
        runner.expect_name().return_const("mock");
        let (service, _) = service(runner, dir.path());

        let request = SubmitVideoRequest::new(upload(dir.path())).with_video_id(VideoId::from("v1"));
        assert!(service.submit(request).await.is_err());

        let record = service.get_status(&VideoId::from("v1")).await.unwrap();
        assert_eq!(record.status, OverallStatus::Failed);
        assert!(record.error.unwrap().contains("queue down"));
    }

    #[tokio::test]
    async fn test_poll_failed_stage_returns_error_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let (service, store) = service(MockTaskRunner::new(), dir.path());

        let mut record = VideoRecord::new(VideoId::from("v1"), "/a.mp4", "a.mp4", 1);
        record.status = OverallStatus::PartialSuccess;
        record.speech_stage = StageResult::failed("No audio stream in /a.mp4", None);
        store.create(&record).await.unwrap();

        assert_eq!(
            service.get_speech_outcome(&record.id).await.unwrap(),
            StagePoll::Failed("No audio stream in /a.mp4".to_string())
        );
        assert_eq!(
            service.transcription_summary(&record.id).await.unwrap(),
            "No transcription available"
        );
    }

    #[tokio::test]
    async fn test_reprocess_resets_stages() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockTaskRunner::new();
        runner
            .expect_enqueue()
            .withf(|job| job.mode == ProcessMode::Full && job.file_path == "/a.mp4")
            .times(1)
            .returning(|_| Ok(()));
        let (service, store) = service(runner, dir.path());

        let mut record = VideoRecord::new(VideoId::from("v1"), "/a.mp4", "a.mp4", 1);
        record.status = OverallStatus::Failed;
        record.error = Some("store unreachable".to_string());
        record.face_stage = StageResult::failed("decode error", None);
        store.create(&record).await.unwrap();

        service.reprocess(&record.id, Some(5)).await.unwrap();

        let record = service.get_status(&record.id).await.unwrap();
        assert_eq!(record.status, OverallStatus::Uploaded);
        assert_eq!(record.face_stage.status, StageStatus::Queued);
        assert_eq!(record.frame_interval, 5);
        assert_eq!(record.error, None);
    }

    #[tokio::test]
    async fn test_retranscribe_requires_finished_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockTaskRunner::new();
        runner
            .expect_enqueue()
            .withf(|job| job.mode == ProcessMode::SpeechOnly)
            .times(1)
            .returning(|_| Ok(()));
        let (service, store) = service(runner, dir.path());

        let pending = VideoRecord::new(VideoId::from("pending"), "/a.mp4", "a.mp4", 1);
        store.create(&pending).await.unwrap();
        assert!(matches!(
            service.retranscribe(&pending.id).await,
            Err(WorkerError::Validation(_))
        ));

        let mut done = VideoRecord::new(VideoId::from("done"), "/b.mp4", "b.mp4", 1);
        done.status = OverallStatus::Completed;
        done.face_stage = StageResult::completed(
            FaceOutcome {
                total_frames: 1,
                sampled_frame_count: 1,
                faces_detected: 0,
                frames_directory: "/tmp".to_string(),
                frames_persisted: 0,
                crops_persisted: 0,
            },
            None,
        );
        store.create(&done).await.unwrap();
        service.retranscribe(&done.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_removes_record_and_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let (service, store) = service(MockTaskRunner::new(), dir.path());
        let paths = WorkPaths::new(dir.path());

        let mut record = VideoRecord::new(VideoId::from("v1"), "/a.mp4", "a.mp4", 1);
        record.status = OverallStatus::Completed;
        store.create(&record).await.unwrap();
        let frames = paths.frames_dir(&record.id).unwrap();
        let transcript = paths.transcript_path(&record.id).unwrap();
        std::fs::create_dir_all(&frames).unwrap();
        std::fs::create_dir_all(transcript.parent().unwrap()).unwrap();
        std::fs::write(&transcript, "[0.00s - 1.00s]: hi\n").unwrap();

        service.delete(&record.id).await.unwrap();

        assert!(!frames.exists());
        assert!(!transcript.exists());
        assert!(matches!(
            service.get_status(&record.id).await,
            Err(WorkerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_scheduled_run_blocks_reprocess_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockTaskRunner::new();
        runner.expect_enqueue().times(1).returning(|_| Ok(()));
        let (service, store) = service(runner, dir.path());

        let request = SubmitVideoRequest::new(upload(dir.path())).with_video_id(VideoId::from("v1"));
        let id = service.submit(request).await.unwrap();

        assert!(matches!(
            service.reprocess(&id, None).await,
            Err(WorkerError::Validation(_))
        ));
        assert!(matches!(
            service.delete(&id).await,
            Err(WorkerError::Validation(_))
        ));

        let record = service.get_status(&id).await.unwrap();
        assert_eq!(record.status, OverallStatus::Uploaded);
        assert_eq!(record.face_stage.status, StageStatus::Queued);

        let mut running = VideoRecord::new(VideoId::from("v2"), "/b.mp4", "b.mp4", 1);
        running.status = OverallStatus::Processing;
        store.create(&running).await.unwrap();
        assert!(matches!(
            service.delete(&running.id).await,
            Err(WorkerError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_rejects_path_like_video_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockTaskRunner::new();
        runner.expect_enqueue().never();
        let (service, store) = service(runner, dir.path());

        for id in ["", "..", "../other"] {
            let request =
                SubmitVideoRequest::new(upload(dir.path())).with_video_id(VideoId::from(id));
            assert!(matches!(
                service.submit(request).await,
                Err(WorkerError::Validation(_))
            ));
        }
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_list_videos_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let (service, store) = service(MockTaskRunner::new(), dir.path());

        let mut older = VideoRecord::new(VideoId::from("old"), "/a.mp4", "a.mp4", 1);
        older.uploaded_at = Utc::now() - chrono::Duration::hours(1);
        let newer = VideoRecord::new(VideoId::from("new"), "/b.mp4", "b.mp4", 1);
        store.create(&older).await.unwrap();
        store.create(&newer).await.unwrap();

        let ids: Vec<String> = service
            .list_videos()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id.to_string())
            .collect();
        assert_eq!(ids, vec!["new", "old"]);
    }
}
