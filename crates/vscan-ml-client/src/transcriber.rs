//! Transcription through the ML service.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use vscan_media::{MediaError, MediaResult, Transcriber, TranscriberLoader, Transcript};

use crate::client::MlClient;

/// [`Transcriber`] backed by the ML service's `verbose_json` endpoint.
#[derive(Clone)]
pub struct RemoteTranscriber {
    client: MlClient,
}

impl RemoteTranscriber {
    pub fn new(client: MlClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transcriber for RemoteTranscriber {
    fn name(&self) -> &str {
        "remote"
    }

    async fn transcribe(&self, audio_path: &Path) -> MediaResult<Transcript> {
        if !audio_path.exists() {
            return Err(MediaError::FileNotFound(audio_path.to_path_buf()));
        }
        let response = self
            .client
            .transcribe(audio_path)
            .await
            .map_err(|e| MediaError::transcription_failed(e.to_string()))?;
        Ok(response.into())
    }
}

/// Builds a [`RemoteTranscriber`] after confirming the service answers.
pub struct RemoteTranscriberLoader {
    client: MlClient,
}

impl RemoteTranscriberLoader {
    pub fn new(client: MlClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TranscriberLoader for RemoteTranscriberLoader {
    async fn load(&self) -> MediaResult<Arc<dyn Transcriber>> {
        let healthy = self
            .client
            .health_check()
            .await
            .map_err(|e| MediaError::transcription_failed(e.to_string()))?;
        if !healthy {
            warn!(url = %self.client.config().base_url, "ML service health check failed");
            return Err(MediaError::transcription_failed(format!(
                "ML service at {} is not healthy",
                self.client.config().base_url
            )));
        }
        info!(url = %self.client.config().base_url, "Remote transcriber ready");
        Ok(Arc::new(RemoteTranscriber::new(self.client.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MlClientConfig;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> MlClient {
        MlClient::new(MlClientConfig {
            base_url: server.uri(),
            max_retries: 0,
            ..MlClientConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_loader_fails_when_unhealthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = RemoteTranscriberLoader::new(client(&server)).load().await;
        assert!(matches!(result, Err(MediaError::TranscriptionFailed(_))));
    }

    #[tokio::test]
    async fn test_transcript_segments_are_converted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "healthy" })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "language": "english",
                "segments": [
                    { "start": 0.0, "end": 2.0, "text": " Hi.", "avg_logprob": -0.05 },
                    { "start": 2.0, "end": 4.0, "text": " Bye.", "avg_logprob": -0.9 }
                ]
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("a.wav");
        std::fs::write(&audio, b"RIFF").unwrap();

        let transcriber = RemoteTranscriberLoader::new(client(&server)).load().await.unwrap();
        let transcript = transcriber.transcribe(&audio).await.unwrap();
        assert_eq!(transcript.language.as_deref(), Some("english"));
        assert_eq!(transcript.segments.len(), 2);
        assert_eq!(transcript.segments[0].avg_logprob, -0.05);
    }

    #[tokio::test]
    async fn test_missing_audio_is_file_not_found() {
        let server = MockServer::start().await;
        let err = RemoteTranscriber::new(client(&server))
            .transcribe(Path::new("/no/audio.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
