//! Builds the pipeline and its collaborators from configuration.

use std::sync::Arc;

use tracing::{info, warn};
use vscan_media::{check_ffmpeg, check_ffprobe, FfmpegAudioExtractor, FfmpegRunner, TranscriberLoader};
use vscan_ml_client::{MlClient, RemoteTranscriberLoader};
use vscan_store::{FirestoreRecordStore, MemoryRecordStore, RecordStore};

use crate::config::{DetectorKind, StoreBackend, TranscriberKind, WorkerConfig};
use crate::error::{WorkerError, WorkerResult};
use crate::paths::WorkPaths;
use crate::pipeline::ProcessingPipeline;
use crate::runner::TaskRunner;
use crate::service::VideoService;
use crate::stages::{DetectorFactory, FaceStage, FfmpegFrames, RemoteDetectors, SpeechStage};
use crate::transcriber::LazyTranscriber;

/// Everything a worker process shares between jobs.
pub struct WorkerContext {
    pub config: WorkerConfig,
    pub store: Arc<dyn RecordStore>,
    pub pipeline: Arc<ProcessingPipeline>,
    pub paths: WorkPaths,
}

impl WorkerContext {
    pub async fn from_config(config: WorkerConfig) -> WorkerResult<Self> {
        for check in [check_ffmpeg, check_ffprobe] {
            if let Err(e) = check() {
                warn!("{}", e);
            }
        }

        let store = build_store(config.store_backend).await?;
        let paths = WorkPaths::new(&config.work_dir);
        tokio::fs::create_dir_all(paths.root()).await?;

        let ml_client = if config.face_detector == DetectorKind::Remote
            || config.transcriber == TranscriberKind::Remote
        {
            Some(MlClient::from_env()?)
        } else {
            None
        };

        let face = FaceStage::new(
            Arc::new(FfmpegFrames),
            build_detectors(config.face_detector, ml_client.as_ref())?,
            paths.clone(),
        );

        let transcriber = Arc::new(LazyTranscriber::new(build_loader(&config, ml_client.as_ref())?));
        let extractor = FfmpegAudioExtractor::new(
            FfmpegRunner::new().with_timeout(config.ffmpeg_timeout.as_secs()),
        );
        let speech = SpeechStage::new(Arc::new(extractor), transcriber, paths.clone())
            .with_keep_audio(config.keep_audio);

        info!(
            store = store.backend(),
            detector = ?config.face_detector,
            transcriber = ?config.transcriber,
            work_dir = %paths.root().display(),
            "Worker context ready"
        );

        Ok(Self {
            pipeline: Arc::new(ProcessingPipeline::new(Arc::clone(&store), face, speech)),
            store,
            paths,
            config,
        })
    }

    pub fn service(&self, runner: Arc<dyn TaskRunner>) -> VideoService {
        VideoService::new(
            Arc::clone(&self.store),
            runner,
            self.paths.clone(),
            self.config.frame_interval,
        )
    }
}

/// No implicit fallback: a Firestore setup error stops startup.
async fn build_store(backend: StoreBackend) -> WorkerResult<Arc<dyn RecordStore>> {
    Ok(match backend {
        StoreBackend::Firestore => Arc::new(FirestoreRecordStore::from_env().await?),
        StoreBackend::Memory => Arc::new(MemoryRecordStore::new()),
    })
}

fn build_detectors(
    kind: DetectorKind,
    ml_client: Option<&MlClient>,
) -> WorkerResult<Arc<dyn DetectorFactory>> {
    match kind {
        DetectorKind::Remote => {
            let client = ml_client
                .cloned()
                .ok_or_else(|| WorkerError::config_error("remote detector needs ML_SERVICE_URL"))?;
            Ok(Arc::new(RemoteDetectors::new(client)))
        }
        #[cfg(feature = "opencv")]
        DetectorKind::YuNet => Ok(Arc::new(crate::stages::YuNetDetectors)),
        #[cfg(not(feature = "opencv"))]
        DetectorKind::YuNet => Err(WorkerError::config_error(
            "FACE_DETECTOR=yunet needs a build with the `opencv` feature",
        )),
    }
}

fn build_loader(
    config: &WorkerConfig,
    ml_client: Option<&MlClient>,
) -> WorkerResult<Arc<dyn TranscriberLoader>> {
    match config.transcriber {
        TranscriberKind::Remote => {
            let client = ml_client
                .cloned()
                .ok_or_else(|| WorkerError::config_error("remote transcriber needs ML_SERVICE_URL"))?;
            Ok(Arc::new(RemoteTranscriberLoader::new(client)))
        }
        #[cfg(feature = "whisper")]
        TranscriberKind::Whisper => {
            let model_path = config
                .whisper_model_path
                .clone()
                .ok_or_else(|| WorkerError::config_error("WHISPER_MODEL_PATH is not set"))?;
            Ok(Arc::new(vscan_media::whisper::WhisperLoader {
                model_path,
                language: std::env::var("TRANSCRIBE_LANGUAGE").ok().filter(|l| !l.is_empty()),
            }))
        }
        #[cfg(not(feature = "whisper"))]
        TranscriberKind::Whisper => Err(WorkerError::config_error(
            "TRANSCRIBER=whisper needs a build with the `whisper` feature",
        )),
    }
}
