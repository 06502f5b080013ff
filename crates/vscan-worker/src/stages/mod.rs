//! The two analysis stages of a pipeline run.

pub mod face;
pub mod speech;

pub use face::{DetectorFactory, FaceStage, FfmpegFrames, FrameSourceFactory, RemoteDetectors};
pub use speech::SpeechStage;

#[cfg(feature = "opencv")]
pub use face::{OpenCvFrames, YuNetDetectors};
