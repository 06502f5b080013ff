//! Face stage: sample frames, detect faces, persist frames and crops.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use vscan_media::{
    probe_video, FaceDetector, FaceExtractor, FfmpegFrameSource, FrameSampler, FrameSource,
    MediaResult,
};
use vscan_ml_client::{MlClient, RemoteFaceDetector};
use vscan_models::{FaceOutcome, VideoId};

use crate::error::{WorkerError, WorkerResult};
use crate::paths::WorkPaths;

/// Opens a decoded frame stream for a video.
#[async_trait]
pub trait FrameSourceFactory: Send + Sync {
    async fn open(&self, video: &Path) -> MediaResult<Box<dyn FrameSource>>;
}

/// Probes the video with ffprobe, then decodes through an ffmpeg pipe.
#[derive(Debug, Clone, Default)]
pub struct FfmpegFrames;

#[async_trait]
impl FrameSourceFactory for FfmpegFrames {
    async fn open(&self, video: &Path) -> MediaResult<Box<dyn FrameSource>> {
        let info = probe_video(video).await?;
        let (width, height) = info.display_dimensions();
        debug!(
            width,
            height,
            rotation = info.rotation,
            frames = info.estimated_frames(),
            "Opening frame source"
        );
        Ok(Box::new(FfmpegFrameSource::open(video, width, height)?))
    }
}

/// Decodes through OpenCV `VideoCapture`.
#[cfg(feature = "opencv")]
#[derive(Debug, Clone, Default)]
pub struct OpenCvFrames;

#[cfg(feature = "opencv")]
#[async_trait]
impl FrameSourceFactory for OpenCvFrames {
    async fn open(&self, video: &Path) -> MediaResult<Box<dyn FrameSource>> {
        Ok(Box::new(vscan_media::cv::OpenCvFrameSource::open(video)?))
    }
}

/// Builds one detector per run; detectors hold per-run mutable state.
pub trait DetectorFactory: Send + Sync {
    fn create(&self) -> MediaResult<Box<dyn FaceDetector>>;
}

impl<F> DetectorFactory for F
where
    F: Fn() -> MediaResult<Box<dyn FaceDetector>> + Send + Sync,
{
    fn create(&self) -> MediaResult<Box<dyn FaceDetector>> {
        self()
    }
}

/// Detectors backed by the ML service. `create` must run inside the runtime.
#[derive(Clone)]
pub struct RemoteDetectors {
    client: MlClient,
}

impl RemoteDetectors {
    pub fn new(client: MlClient) -> Self {
        Self { client }
    }
}

impl DetectorFactory for RemoteDetectors {
    fn create(&self) -> MediaResult<Box<dyn FaceDetector>> {
        Ok(Box::new(RemoteFaceDetector::new(self.client.clone())?))
    }
}

#[cfg(feature = "opencv")]
#[derive(Debug, Clone, Default)]
pub struct YuNetDetectors;

#[cfg(feature = "opencv")]
impl DetectorFactory for YuNetDetectors {
    fn create(&self) -> MediaResult<Box<dyn FaceDetector>> {
        Ok(Box::new(vscan_media::cv::YuNetDetector::from_default_paths()?))
    }
}

pub struct FaceStage {
    sources: Arc<dyn FrameSourceFactory>,
    detectors: Arc<dyn DetectorFactory>,
    paths: WorkPaths,
}

impl FaceStage {
    pub fn new(
        sources: Arc<dyn FrameSourceFactory>,
        detectors: Arc<dyn DetectorFactory>,
        paths: WorkPaths,
    ) -> Self {
        Self {
            sources,
            detectors,
            paths,
        }
    }

    /// Run detection over every `interval`-th frame of `video`.
    ///
    /// The decode/detect loop runs on a blocking thread.
    pub async fn run(
        &self,
        video_id: &VideoId,
        video: &Path,
        interval: u32,
    ) -> WorkerResult<FaceOutcome> {
        let source = self.sources.open(video).await?;
        let mut sampler = FrameSampler::new(source, interval)?;
        let mut detector = self.detectors.create()?;
        let extractor = FaceExtractor::new(self.paths.frames_dir(video_id)?);

        let stats = tokio::task::spawn_blocking(move || extractor.run(&mut sampler, detector.as_mut()))
            .await
            .map_err(|e| WorkerError::stage(format!("face extraction task failed: {}", e)))??;

        Ok(FaceOutcome {
            total_frames: stats.total_frames,
            sampled_frame_count: stats.sampled_frames,
            faces_detected: stats.faces_detected,
            frames_directory: stats.output_dir.display().to_string(),
            frames_persisted: stats.frames_persisted,
            crops_persisted: stats.crops_persisted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use vscan_media::{BoundingBox, MediaError, MemoryFrameSource};

    struct Fixed(Vec<RgbImage>);

    #[async_trait]
    impl FrameSourceFactory for Fixed {
        async fn open(&self, _video: &Path) -> MediaResult<Box<dyn FrameSource>> {
            Ok(Box::new(MemoryFrameSource::new(self.0.clone())))
        }
    }

    struct OneFace;

    impl FaceDetector for OneFace {
        fn name(&self) -> &str {
            "one"
        }

        fn detect(&mut self, _frame: &RgbImage) -> MediaResult<Vec<BoundingBox>> {
            Ok(vec![BoundingBox::new(2.0, 2.0, 4.0, 4.0)])
        }
    }

    fn stage(frames: usize, dir: &Path) -> FaceStage {
        let source = Fixed(vec![RgbImage::new(16, 16); frames]);
        let detectors = || -> MediaResult<Box<dyn FaceDetector>> { Ok(Box::new(OneFace)) };
        FaceStage::new(Arc::new(source), Arc::new(detectors), WorkPaths::new(dir))
    }

    #[tokio::test]
    async fn test_outcome_counts() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = stage(10, dir.path())
            .run(&VideoId::from("v1"), Path::new("/in.mp4"), 5)
            .await
            .unwrap();

        assert_eq!(outcome.total_frames, 10);
        assert_eq!(outcome.sampled_frame_count, 2);
        assert_eq!(outcome.faces_detected, 2);
        assert_eq!(outcome.crops_persisted, 2);
        assert!(outcome.frames_directory.ends_with("frames/v1"));
    }

    #[tokio::test]
    async fn test_zero_interval_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = stage(3, dir.path())
            .run(&VideoId::from("v1"), Path::new("/in.mp4"), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Media(MediaError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_detector_creation_failure_fails_stage() {
        let dir = tempfile::tempdir().unwrap();
        let detectors =
            || -> MediaResult<Box<dyn FaceDetector>> { Err(MediaError::model_not_found("yunet.onnx")) };
        let stage = FaceStage::new(
            Arc::new(Fixed(vec![RgbImage::new(4, 4)])),
            Arc::new(detectors),
            WorkPaths::new(dir.path()),
        );

        let err = stage
            .run(&VideoId::from("v1"), Path::new("/in.mp4"), 1)
            .await
            .unwrap_err();
        assert!(err.stage_message().contains("yunet.onnx"));
    }
}
