//! ML service HTTP client.

use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use tracing::{debug, warn};

use crate::error::{MlError, MlResult};
use crate::types::{DetectFacesResponse, HealthResponse, TranscriptionResponse};

/// Configuration for the ML client.
#[derive(Debug, Clone)]
pub struct MlClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
    /// Model name sent with transcription requests
    pub transcribe_model: String,
    /// Language hint for transcription; auto-detect when unset
    pub language: Option<String>,
}

impl Default for MlClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            // Long recordings take a while to transcribe.
            timeout: Duration::from_secs(300),
            max_retries: 2,
            transcribe_model: "whisper-1".to_string(),
            language: None,
        }
    }
}

impl MlClientConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("ML_SERVICE_URL").unwrap_or(defaults.base_url),
            timeout: std::env::var("ML_SERVICE_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_retries: std::env::var("ML_SERVICE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            transcribe_model: std::env::var("ML_TRANSCRIBE_MODEL")
                .unwrap_or(defaults.transcribe_model),
            language: std::env::var("TRANSCRIBE_LANGUAGE")
                .ok()
                .filter(|l| !l.is_empty()),
        }
    }
}

/// Client for the ML inference service.
#[derive(Clone)]
pub struct MlClient {
    http: Client,
    config: MlClientConfig,
}

impl MlClient {
    pub fn new(config: MlClientConfig) -> MlResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(MlError::Network)?;

        Ok(Self { http, config })
    }

    pub fn from_env() -> MlResult<Self> {
        Self::new(MlClientConfig::from_env())
    }

    pub fn config(&self) -> &MlClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Check if the ML service is healthy.
    pub async fn health_check(&self) -> MlResult<bool> {
        let url = self.url("/health");

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                let health: HealthResponse = response.json().await?;
                Ok(health.status == "healthy" || health.status == "ok")
            }
            Ok(response) => {
                warn!("ML service health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("ML service health check error: {}", e);
                Ok(false)
            }
        }
    }

    /// Detect faces in a JPEG-encoded image.
    pub async fn detect_faces(&self, jpeg: Vec<u8>) -> MlResult<DetectFacesResponse> {
        let url = self.url("/v1/faces/detect");
        let jpeg = &jpeg;

        let response = self
            .with_retry(|| async {
                let part = Part::bytes(jpeg.clone())
                    .file_name("frame.jpg")
                    .mime_str("image/jpeg")?;
                let form = Form::new().part("image", part);
                let response = self.http.post(&url).multipart(form).send().await?;
                Self::check(response).await
            })
            .await?;

        Ok(response.json().await?)
    }

    /// Transcribe a WAV file. Requests segment-level `verbose_json` output.
    pub async fn transcribe(&self, audio_path: &Path) -> MlResult<TranscriptionResponse> {
        let url = self.url("/v1/audio/transcriptions");
        let audio = tokio::fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.wav".to_string());
        debug!(path = %audio_path.display(), bytes = audio.len(), "Sending transcription request");

        let (audio, file_name) = (&audio, &file_name);
        let response = self
            .with_retry(|| async {
                let part = Part::bytes(audio.clone())
                    .file_name(file_name.clone())
                    .mime_str("audio/wav")?;
                let mut form = Form::new()
                    .part("file", part)
                    .text("model", self.config.transcribe_model.clone())
                    .text("response_format", "verbose_json")
                    .text("timestamp_granularities[]", "segment");
                if let Some(language) = &self.config.language {
                    form = form.text("language", language.clone());
                }
                let response = self.http.post(&url).multipart(form).send().await?;
                Self::check(response).await
            })
            .await?;

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            MlError::InvalidResponse(format!(
                "transcription response: {} (body prefix: {})",
                e,
                &body[..body.len().min(200)]
            ))
        })
    }

    async fn check(response: Response) -> MlResult<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(MlError::from_status(status, body))
    }

    async fn with_retry<F, Fut, T>(&self, operation: F) -> MlResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = MlResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        "ML request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| MlError::RequestFailed("retries exhausted".to_string())))
    }
}
