//! Face detection through the ML service.

use std::io::Cursor;

use image::{ImageOutputFormat, RgbImage};
use tokio::runtime::Handle;
use tracing::debug;
use vscan_media::{BoundingBox, FaceDetector, MediaError, MediaResult};

use crate::client::MlClient;
use crate::error::MlResult;

const JPEG_QUALITY: u8 = 90;

/// [`FaceDetector`] that posts each frame to the ML service.
///
/// `detect` blocks the calling thread on the async client, so it must run
/// on a blocking thread (`spawn_blocking`) of the runtime captured at
/// construction.
pub struct RemoteFaceDetector {
    client: MlClient,
    runtime: Handle,
}

impl RemoteFaceDetector {
    /// Must be called from within a Tokio runtime.
    pub fn new(client: MlClient) -> MediaResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| MediaError::internal(format!("no Tokio runtime: {}", e)))?;
        Ok(Self { client, runtime })
    }

    pub fn encode_jpeg(frame: &RgbImage) -> MlResult<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        frame.write_to(&mut buf, ImageOutputFormat::Jpeg(JPEG_QUALITY))?;
        Ok(buf.into_inner())
    }
}

impl FaceDetector for RemoteFaceDetector {
    fn name(&self) -> &str {
        "remote"
    }

    fn detect(&mut self, frame: &RgbImage) -> MediaResult<Vec<BoundingBox>> {
        let jpeg = Self::encode_jpeg(frame).map_err(|e| MediaError::detection_failed(e.to_string()))?;
        let response = self
            .runtime
            .block_on(self.client.detect_faces(jpeg))
            .map_err(|e| MediaError::detection_failed(e.to_string()))?;

        debug!(faces = response.faces.len(), "Remote face detection");
        Ok(response.faces.iter().map(BoundingBox::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MlClientConfig;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn detector(server: &MockServer) -> RemoteFaceDetector {
        let client = MlClient::new(MlClientConfig {
            base_url: server.uri(),
            max_retries: 0,
            ..MlClientConfig::default()
        })
        .unwrap();
        RemoteFaceDetector::new(client).unwrap()
    }

    #[test]
    fn test_encode_jpeg_has_magic() {
        let jpeg = RemoteFaceDetector::encode_jpeg(&RgbImage::new(8, 8)).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_detect_from_blocking_thread() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/faces/detect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "faces": [{ "x": 1.0, "y": 2.0, "width": 3.0, "height": 4.0 }]
            })))
            .mount(&server)
            .await;

        let mut detector = detector(&server);
        let boxes = tokio::task::spawn_blocking(move || detector.detect(&RgbImage::new(16, 16)))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(boxes, vec![BoundingBox::new(1.0, 2.0, 3.0, 4.0)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_service_error_is_detection_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut detector = detector(&server);
        let err = tokio::task::spawn_blocking(move || detector.detect(&RgbImage::new(4, 4)))
            .await
            .unwrap()
            .unwrap_err();

        assert!(matches!(err, MediaError::DetectionFailed(_)));
    }
}
