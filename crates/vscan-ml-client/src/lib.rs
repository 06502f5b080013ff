//! Client for the ML inference service.
//!
//! The service exposes face detection over JPEG frames and an
//! OpenAI-compatible `verbose_json` transcription endpoint. This crate
//! wraps both as the media crate's `FaceDetector` and `Transcriber`.

pub mod client;
pub mod detector;
pub mod error;
pub mod transcriber;
pub mod types;

pub use client::{MlClient, MlClientConfig};
pub use detector::RemoteFaceDetector;
pub use error::{MlError, MlResult};
pub use transcriber::{RemoteTranscriber, RemoteTranscriberLoader};
pub use types::{DetectFacesResponse, FaceBox, TranscriptionResponse};
