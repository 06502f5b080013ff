//! vscan processing worker.
//!
//! This crate provides:
//! - The face and speech stages and the pipeline that orchestrates them
//! - The caller-facing [`VideoService`]
//! - In-process and Redis Streams task runners
//! - The Redis job executor used by the `vscan-worker` binary

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod paths;
pub mod pipeline;
pub mod runner;
pub mod service;
pub mod stages;
pub mod transcriber;

pub use config::{DetectorKind, RunnerKind, StoreBackend, TranscriberKind, WorkerConfig};
pub use context::WorkerContext;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use paths::WorkPaths;
pub use pipeline::ProcessingPipeline;
pub use runner::{LocalTaskRunner, QueueTaskRunner, TaskRunner};
pub use service::{StagePoll, VideoService};
pub use stages::{DetectorFactory, FaceStage, FrameSourceFactory, SpeechStage};
pub use transcriber::LazyTranscriber;
