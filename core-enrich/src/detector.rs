//! # HTTP Object Detector
//!
//! [`ObjectDetector`] backed by a remote inference endpoint.
//!
//! The image bytes are POSTed as `application/octet-stream` to
//! `<endpoint>?imgsz=<size>&conf=<confidence>`; the endpoint answers with a
//! JSON array of detections:
//!
//! ```json
//! [{"class_id": 39, "class_name": "bottle", "confidence": 0.87, "xyxy": [10, 20, 110, 220]}]
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let detector = HttpDetector::from_settings(http_client, &config.detector)?;
//! let detections = detector.detect(Path::new("data/raw/images/ch/ch_1_2025-06-01.jpg")).await?;
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use bridge_traits::{Detection, ObjectDetector};
use bytes::Bytes;
use core_runtime::config::DetectorSettings;
use tracing::debug;

use crate::error::{EnrichError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct HttpDetector {
    http_client: Arc<dyn HttpClient>,
    endpoint: String,
    image_size: u32,
    confidence: f32,
}

impl HttpDetector {
    pub fn new(http_client: Arc<dyn HttpClient>, endpoint: impl Into<String>) -> Self {
        let defaults = DetectorSettings::default();
        Self {
            http_client,
            endpoint: endpoint.into(),
            image_size: defaults.image_size,
            confidence: defaults.confidence,
        }
    }

    /// Build from configuration; fails when no endpoint is configured.
    pub fn from_settings(http_client: Arc<dyn HttpClient>, settings: &DetectorSettings) -> Result<Self> {
        let endpoint = settings
            .endpoint
            .clone()
            .ok_or_else(|| EnrichError::Config("No detector endpoint configured".to_string()))?;

        Ok(Self {
            http_client,
            endpoint,
            image_size: settings.image_size,
            confidence: settings.confidence,
        })
    }

    fn request_url(&self) -> String {
        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        format!(
            "{}{}imgsz={}&conf={}",
            self.endpoint, separator, self.image_size, self.confidence
        )
    }
}

#[async_trait]
impl ObjectDetector for HttpDetector {
    async fn detect(&self, image: &Path) -> BridgeResult<Vec<Detection>> {
        let data = tokio::fs::read(image).await?;

        let request = HttpRequest::new(HttpMethod::Post, self.request_url())
            .header("Content-Type", "application/octet-stream")
            .header("Accept", "application/json")
            .body(Bytes::from(data))
            .timeout(REQUEST_TIMEOUT);

        let response = self.http_client.execute(request).await?;

        if !response.is_success() {
            let message = String::from_utf8_lossy(&response.body).to_string();
            return Err(match response.status {
                429 => BridgeError::RateLimited {
                    retry_after_secs: response
                        .header("Retry-After")
                        .and_then(|v| v.trim().parse().ok())
                        .unwrap_or(1),
                },
                status if response.is_server_error() => {
                    BridgeError::OperationFailed(format!("Detector returned {}: {}", status, message))
                }
                status => BridgeError::Rejected { status, message },
            });
        }

        let detections: Vec<Detection> = response.json()?;
        let kept: Vec<Detection> = detections
            .into_iter()
            .filter(|d| d.confidence >= self.confidence)
            .collect();

        debug!(image = %image.display(), detections = kept.len(), "Detection finished");
        Ok(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::http::HttpResponse;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn image_file() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ch_1_2025-06-01.jpg");
        std::fs::write(&path, b"fake image bytes").unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn test_detect_posts_image_and_filters_low_confidence() {
        let (_dir, path) = image_file();
        let mut mock_http = MockHttpClient::new();

        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(req.method, HttpMethod::Post);
            assert_eq!(req.url, "http://detector:8000/predict?imgsz=640&conf=0.35");
            assert_eq!(req.body.as_deref(), Some(&b"fake image bytes"[..]));
            Ok(response(
                200,
                r#"[
                    {"class_id": 39, "class_name": "bottle", "confidence": 0.87, "xyxy": [10, 20, 110, 220]},
                    {"class_id": 0, "class_name": "person", "confidence": 0.12, "xyxy": [0, 0, 5, 5]}
                ]"#,
            ))
        });

        let detector = HttpDetector::new(Arc::new(mock_http), "http://detector:8000/predict");
        let detections = detector.detect(&path).await.unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_name, "bottle");
        assert_eq!(detections[0].bbox, [10.0, 20.0, 110.0, 220.0]);
    }

    #[tokio::test]
    async fn test_detect_maps_error_statuses() {
        let (_dir, path) = image_file();
        let mut mock_http = MockHttpClient::new();
        let mut statuses = vec![503u16, 400].into_iter();

        mock_http
            .expect_execute()
            .times(2)
            .returning(move |_| Ok(response(statuses.next().unwrap(), "nope")));

        let detector = HttpDetector::new(Arc::new(mock_http), "http://detector/predict");

        assert!(matches!(
            detector.detect(&path).await,
            Err(BridgeError::OperationFailed(_))
        ));
        assert!(matches!(
            detector.detect(&path).await,
            Err(BridgeError::Rejected { status: 400, .. })
        ));
    }

    #[tokio::test]
    async fn test_detect_rejects_malformed_body() {
        let (_dir, path) = image_file();
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .returning(|_| Ok(response(200, "{\"not\":\"a list\"}")));

        let detector = HttpDetector::new(Arc::new(mock_http), "http://detector/predict");
        assert!(matches!(
            detector.detect(&path).await,
            Err(BridgeError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_from_settings_requires_endpoint() {
        let settings = DetectorSettings::default();
        assert!(HttpDetector::from_settings(Arc::new(MockHttpClient::new()), &settings).is_err());

        let settings = settings.with_endpoint("http://detector/predict?model=yolov8n");
        let detector =
            HttpDetector::from_settings(Arc::new(MockHttpClient::new()), &settings).unwrap();
        assert_eq!(
            detector.request_url(),
            "http://detector/predict?model=yolov8n&imgsz=640&conf=0.35"
        );
    }
}
