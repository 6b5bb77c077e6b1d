use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use medlens_types::ObjectDetection;
use serde::Deserialize;
use tracing::debug;

use super::Detector;
use crate::{Error, Result};

/// Detection service reached over HTTP.
///
/// `POST {url}` with the raw image as the body; the service answers
/// `{"detections": [{"class": "bottle", "confidence": 0.87}, ...]}`.
pub struct HttpDetector {
    client: reqwest::Client,
    url: String,
}

#[derive(Deserialize)]
struct DetectResponse {
    detections: Vec<ObjectDetection>,
}

impl HttpDetector {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn detect(&self, image: &Path) -> Result<Vec<ObjectDetection>> {
        let failed = |reason: String| Error::Detection {
            path: image.to_path_buf(),
            reason,
        };

        let bytes = tokio::fs::read(image).await?;
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, content_type(image))
            .body(bytes)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(failed(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let parsed: DetectResponse = response.json().await.map_err(|e| failed(e.to_string()))?;
        if let Some(bad) = parsed
            .detections
            .iter()
            .find(|d| !(0.0..=1.0).contains(&d.confidence))
        {
            return Err(failed(format!(
                "confidence {} for {} is outside [0, 1]",
                bad.confidence, bad.object_class
            )));
        }

        debug!("{}: {} detections", image.display(), parsed.detections.len());
        Ok(parsed.detections)
    }
}

fn content_type(image: &Path) -> &'static str {
    match image
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        _ => "image/jpeg",
    }
}
