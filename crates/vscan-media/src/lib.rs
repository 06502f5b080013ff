//! Media processing for the vscan pipeline.
//!
//! This crate provides:
//! - FFmpeg/FFprobe wrappers
//! - Fixed-interval frame sampling over pluggable frame sources
//! - Face crop geometry and on-disk face extraction
//! - Audio extraction and WAV loading
//! - Autocorrelation pitch analysis with emotion tagging
//! - The transcription engine seam

pub mod audio;
pub mod command;
pub mod error;
pub mod extract;
pub mod face;
pub mod frames;
pub mod pitch;
pub mod probe;
pub mod transcribe;

#[cfg(feature = "opencv")]
pub mod cv;

#[cfg(feature = "whisper")]
pub mod whisper;

pub use audio::{load_wav_mono, AudioExtractor, FfmpegAudioExtractor, SAMPLE_RATE};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use extract::{FaceExtractionStats, FaceExtractor};
pub use face::{BoundingBox, CropRect, FaceDetector, CROP_MARGIN_PX};
pub use frames::{FfmpegFrameSource, Frame, FrameSampler, FrameSource, MemoryFrameSource};
pub use pitch::{PitchAnalyzer, PitchConfig, PitchReport, PitchSample};
pub use probe::{probe_video, VideoInfo};
pub use transcribe::{RawSegment, Transcriber, TranscriberLoader, Transcript};
