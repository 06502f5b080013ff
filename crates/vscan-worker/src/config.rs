//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use vscan_models::DEFAULT_FRAME_INTERVAL;

use crate::error::{WorkerError, WorkerResult};

/// Record store implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(Self::Firestore),
            "memory" => Ok(Self::Memory),
            other => Err(WorkerError::config_error(format!(
                "STORE_BACKEND must be 'firestore' or 'memory', got '{}'",
                other
            ))),
        }
    }
}

/// Where pipeline jobs run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerKind {
    /// In-process tokio tasks
    Local,
    /// Redis Streams consumer group
    Redis,
}

impl FromStr for RunnerKind {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "redis" => Ok(Self::Redis),
            other => Err(WorkerError::config_error(format!(
                "TASK_RUNNER must be 'local' or 'redis', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorKind {
    /// ML service over HTTP
    Remote,
    /// OpenCV YuNet, needs the `opencv` feature
    YuNet,
}

impl FromStr for DetectorKind {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remote" => Ok(Self::Remote),
            "yunet" => Ok(Self::YuNet),
            other => Err(WorkerError::config_error(format!(
                "FACE_DETECTOR must be 'remote' or 'yunet', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriberKind {
    /// ML service over HTTP
    Remote,
    /// whisper.cpp, needs the `whisper` feature
    Whisper,
}

impl FromStr for TranscriberKind {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remote" => Ok(Self::Remote),
            "whisper" => Ok(Self::Whisper),
            other => Err(WorkerError::config_error(format!(
                "TRANSCRIBER must be 'remote' or 'whisper', got '{}'",
                other
            ))),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub store_backend: StoreBackend,
    pub task_runner: RunnerKind,
    /// Default sampling interval for new uploads
    pub frame_interval: u32,
    /// Root for frames, audio and transcripts
    pub work_dir: PathBuf,
    /// Maximum concurrent pipeline runs
    pub max_concurrent_jobs: usize,
    pub face_detector: DetectorKind,
    pub transcriber: TranscriberKind,
    pub whisper_model_path: Option<PathBuf>,
    /// Timeout for each ffmpeg invocation
    pub ffmpeg_timeout: Duration,
    /// Keep the extracted WAV after the speech stage
    pub keep_audio: bool,
    /// How often the executor scans for orphaned pending jobs
    pub claim_interval: Duration,
    /// Minimum idle time before a pending job can be claimed
    pub claim_min_idle: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            store_backend: StoreBackend::Memory,
            task_runner: RunnerKind::Local,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            work_dir: PathBuf::from("/tmp/vscan"),
            max_concurrent_jobs: 2,
            face_detector: DetectorKind::Remote,
            transcriber: TranscriberKind::Remote,
            whisper_model_path: None,
            ffmpeg_timeout: Duration::from_secs(600),
            keep_audio: true,
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(900),
            shutdown_timeout: Duration::from_secs(60),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

/// Enum-valued keys fail loudly on unknown values instead of falling back.
fn env_choice<T: FromStr<Err = WorkerError>>(key: &str, default: T) -> WorkerResult<T> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value.parse(),
        _ => Ok(default),
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        let defaults = Self::default();

        let config = Self {
            store_backend: env_choice("STORE_BACKEND", defaults.store_backend)?,
            task_runner: env_choice("TASK_RUNNER", defaults.task_runner)?,
            frame_interval: env_parse("FRAME_INTERVAL").unwrap_or(defaults.frame_interval),
            work_dir: std::env::var("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            max_concurrent_jobs: env_parse("MAX_CONCURRENT_JOBS")
                .unwrap_or(defaults.max_concurrent_jobs),
            face_detector: env_choice("FACE_DETECTOR", defaults.face_detector)?,
            transcriber: env_choice("TRANSCRIBER", defaults.transcriber)?,
            whisper_model_path: std::env::var("WHISPER_MODEL_PATH")
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            ffmpeg_timeout: env_parse("FFMPEG_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.ffmpeg_timeout),
            keep_audio: env_parse("KEEP_AUDIO").unwrap_or(defaults.keep_audio),
            claim_interval: env_parse("WORKER_CLAIM_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.claim_interval),
            claim_min_idle: env_parse("WORKER_CLAIM_MIN_IDLE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.claim_min_idle),
            shutdown_timeout: env_parse("WORKER_SHUTDOWN_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> WorkerResult<()> {
        if self.frame_interval == 0 {
            return Err(WorkerError::config_error("FRAME_INTERVAL must be at least 1"));
        }
        if self.max_concurrent_jobs == 0 {
            return Err(WorkerError::config_error("MAX_CONCURRENT_JOBS must be at least 1"));
        }
        if self.transcriber == TranscriberKind::Whisper && self.whisper_model_path.is_none() {
            return Err(WorkerError::config_error(
                "TRANSCRIBER=whisper requires WHISPER_MODEL_PATH",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: &[&str] = &[
        "STORE_BACKEND",
        "TASK_RUNNER",
        "FRAME_INTERVAL",
        "WORK_DIR",
        "MAX_CONCURRENT_JOBS",
        "TRANSCRIBER",
        "WHISPER_MODEL_PATH",
        "KEEP_AUDIO",
    ];

    fn clear_env() {
        for key in KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_without_env() {
        clear_env();
        let config = WorkerConfig::from_env().unwrap();
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.task_runner, RunnerKind::Local);
        assert_eq!(config.frame_interval, 30);
        assert!(config.keep_audio);
    }

    #[test]
    #[serial]
    fn test_reads_env() {
        clear_env();
        std::env::set_var("STORE_BACKEND", "Firestore");
        std::env::set_var("TASK_RUNNER", "redis");
        std::env::set_var("FRAME_INTERVAL", "15");
        std::env::set_var("WORK_DIR", "/data/vscan");
        std::env::set_var("KEEP_AUDIO", "false");
        let config = WorkerConfig::from_env().unwrap();
        clear_env();

        assert_eq!(config.store_backend, StoreBackend::Firestore);
        assert_eq!(config.task_runner, RunnerKind::Redis);
        assert_eq!(config.frame_interval, 15);
        assert_eq!(config.work_dir, PathBuf::from("/data/vscan"));
        assert!(!config.keep_audio);
    }

    #[test]
    #[serial]
    fn test_unknown_backend_is_rejected() {
        clear_env();
        std::env::set_var("STORE_BACKEND", "postgres");
        let result = WorkerConfig::from_env();
        clear_env();
        assert!(matches!(result, Err(WorkerError::Config(_))));
    }

    #[test]
    #[serial]
    fn test_zero_interval_is_rejected() {
        clear_env();
        std::env::set_var("FRAME_INTERVAL", "0");
        let result = WorkerConfig::from_env();
        clear_env();
        assert!(result.is_err());
    }

    #[test]
    fn test_whisper_requires_model_path() {
        let config = WorkerConfig {
            transcriber: TranscriberKind::Whisper,
            ..WorkerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
