//! Client for the external emotion classification service.
//!
//! Classification is best-effort: any transport, timeout, or service error
//! collapses into a deterministic neutral fallback so callers never need
//! their own error handling for a single classification.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Emotion categories reported by the classification service.
pub const EMOTION_CATEGORIES: [&str; 7] = [
    "happy", "sad", "angry", "fear", "surprise", "disgust", "neutral",
];

/// Request timeout for a single classification call.
const ANALYZE_TIMEOUT: Duration = Duration::from_secs(30);

/// Request timeout for health and model-info probes.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-category scores and derived fields, passed through from the service
/// unchanged. `error` is set only on the fallback result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionAnalysis {
    pub emotions: BTreeMap<String, f64>,
    pub dominant_emotion: String,
    pub confidence: f64,
    pub face_detected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug)]
pub enum MlError {
    Io(std::io::Error),
    Http(reqwest::Error),
    Api(String),
}

impl From<std::io::Error> for MlError {
    fn from(e: std::io::Error) -> Self {
        MlError::Io(e)
    }
}

impl From<reqwest::Error> for MlError {
    fn from(e: reqwest::Error) -> Self {
        MlError::Http(e)
    }
}

impl std::fmt::Display for MlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MlError::Io(e) => write!(f, "I/O error: {}", e),
            MlError::Http(e) => write!(f, "HTTP error: {}", e),
            MlError::Api(s) => write!(f, "ML service error: {}", s),
        }
    }
}

impl std::error::Error for MlError {}

#[derive(Clone)]
pub struct MlClient {
    base_url: String,
    reliability_threshold: f64,
    http: Client,
}

impl MlClient {
    pub fn new(base_url: &str, reliability_threshold: f64) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            reliability_threshold,
            http: Client::new(),
        }
    }

    /// Classify a single still image. Never fails: on any error the neutral
    /// fallback is returned with the error description attached.
    pub async fn analyze(&self, image_path: &Path) -> EmotionAnalysis {
        match self.request_analyze(image_path).await {
            Ok(analysis) => analysis,
            Err(e) => {
                let description = format!("{}: {}", image_path.display(), e);
                eprintln!("[ml] Analyze failed: {}", description);
                fallback_result(description)
            }
        }
    }

    async fn request_analyze(&self, image_path: &Path) -> Result<EmotionAnalysis, MlError> {
        let bytes = tokio::fs::read(image_path).await?;

        let file_name = image_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "frame.jpg".to_string());
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("image/jpeg")?;
        let form = reqwest::multipart::Form::new().part("image", part);

        let resp = self
            .http
            .post(format!("{}/api/analyze", self.base_url))
            .multipart(form)
            .timeout(ANALYZE_TIMEOUT)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(MlError::Api(format!("{}: {}", status, text)));
        }

        Ok(resp.json().await?)
    }

    /// Classify a batch of images concurrently. Output order matches input
    /// order; element failures fall back individually.
    pub async fn analyze_batch(&self, image_paths: &[PathBuf]) -> Vec<EmotionAnalysis> {
        futures::future::join_all(image_paths.iter().map(|p| self.analyze(p))).await
    }

    /// True iff the classification service answers its health endpoint.
    pub async fn health_check(&self) -> bool {
        let resp = self
            .http
            .get(format!("{}/health", self.base_url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;

        match resp {
            Ok(r) => r.status().is_success(),
            Err(e) => {
                eprintln!("[ml] Service is not available: {}", e);
                false
            }
        }
    }

    /// Model metadata reported by the service, or `None` when unavailable.
    pub async fn model_info(&self) -> Option<serde_json::Value> {
        let resp = self
            .http
            .get(format!("{}/api/model/info", self.base_url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;

        match resp {
            Ok(r) if r.status().is_success() => r.json().await.ok(),
            Ok(r) => {
                eprintln!("[ml] Failed to get model info: {}", r.status());
                None
            }
            Err(e) => {
                eprintln!("[ml] Failed to get model info: {}", e);
                None
            }
        }
    }

    /// True iff the confidence clears the configured reliability threshold.
    pub fn is_reliable(&self, confidence: f64) -> bool {
        confidence > self.reliability_threshold
    }
}

/// The deterministic result used when classification fails: all categories
/// zero except neutral, zero confidence, no face.
pub fn fallback_result(error: String) -> EmotionAnalysis {
    let mut emotions = BTreeMap::new();
    for category in EMOTION_CATEGORIES {
        emotions.insert(category.to_string(), 0.0);
    }
    emotions.insert("neutral".to_string(), 1.0);

    EmotionAnalysis {
        emotions,
        dominant_emotion: "neutral".to_string(),
        confidence: 0.0,
        face_detected: false,
        error: Some(error),
    }
}

/// Canonical display casing for a category label ("happy" -> "Happy").
/// The label's meaning is unchanged.
pub fn format_label(label: &str) -> String {
    let lower = label.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => lower,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_is_neutral_with_zero_confidence() {
        let result = fallback_result("connection refused".to_string());

        assert_eq!(result.dominant_emotion, "neutral");
        assert_eq!(result.confidence, 0.0);
        assert!(!result.face_detected);
        assert_eq!(result.emotions.len(), EMOTION_CATEGORIES.len());
        assert_eq!(result.emotions["neutral"], 1.0);
        for category in EMOTION_CATEGORIES.iter().filter(|c| **c != "neutral") {
            assert_eq!(result.emotions[*category], 0.0);
        }

        let sum: f64 = result.emotions.values().sum();
        assert!((sum - 1.0).abs() < 0.01);
        assert_eq!(result.error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn reliability_gate_is_strict() {
        let client = MlClient::new("http://localhost:8000", 0.5);
        assert!(!client.is_reliable(0.0));
        assert!(!client.is_reliable(0.5));
        assert!(client.is_reliable(0.51));
        assert!(client.is_reliable(1.0));
    }

    #[test]
    fn format_label_canonicalizes_casing() {
        assert_eq!(format_label("happy"), "Happy");
        assert_eq!(format_label("HAPPY"), "Happy");
        assert_eq!(format_label("Surprise"), "Surprise");
        assert_eq!(format_label(""), "");
    }

    #[tokio::test]
    async fn unreadable_image_falls_back_with_description() {
        let client = MlClient::new("http://127.0.0.1:9", 0.5);
        let result = client.analyze(Path::new("/nonexistent/unreadable.jpg")).await;

        assert_eq!(result.dominant_emotion, "neutral");
        assert_eq!(result.confidence, 0.0);
        assert!(!result.face_detected);
        let error = result.error.expect("fallback carries an error description");
        assert!(error.contains("unreadable.jpg"));
    }

    #[tokio::test]
    async fn batch_preserves_input_order() {
        let client = MlClient::new("http://127.0.0.1:9", 0.5);
        let paths = vec![
            PathBuf::from("/nonexistent/first.jpg"),
            PathBuf::from("/nonexistent/second.jpg"),
            PathBuf::from("/nonexistent/third.jpg"),
        ];

        let results = client.analyze_batch(&paths).await;

        assert_eq!(results.len(), 3);
        for (result, path) in results.iter().zip(&paths) {
            let error = result.error.as_deref().expect("each element falls back");
            assert!(error.contains(path.to_str().unwrap()));
        }
    }
}
