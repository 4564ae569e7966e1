//! Emotion ingestion pipeline: decode (video only), classify each frame,
//! attach camera metadata, and gate low-confidence results.
//!
//! The pipeline never persists anything itself; callers hand accepted
//! records to the persistence layer.

use std::collections::BTreeMap;
use std::path::Path;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ml::{self, EmotionAnalysis, MlClient};
use crate::video::{ExtractOptions, VideoError, VideoService};

/// Frames sampled per second of video during ingestion.
const VIDEO_FRAME_RATE: f64 = 1.0;

/// Upper bound on frames classified from a single video.
const VIDEO_MAX_FRAMES: u32 = 30;

/// Sum tolerance for a fully populated score mapping.
const SCORE_SUM_TOLERANCE: f64 = 0.01;

/// A classification outcome tied to a camera and a source frame. Immutable
/// once persisted; the persistence layer only appends and reads.
#[derive(Debug, Clone, Serialize)]
pub struct EmotionRecord {
    pub camera_id: i64,
    pub timestamp: DateTime<Utc>,
    pub emotions: BTreeMap<String, f64>,
    pub dominant_emotion: String,
    pub confidence: f64,
    pub face_detected: bool,
    pub frame_url: String,
}

/// Result of stream-frame ingestion. `Skipped` is a quality gate, not an
/// error: the frame was classified but is too uncertain to keep.
#[derive(Debug)]
pub enum IngestOutcome {
    Accepted(EmotionRecord),
    Skipped { reason: String },
}

#[derive(Debug)]
pub enum IngestError {
    /// The payload is not a decodable base64 image.
    InvalidImage(String),
    Io(std::io::Error),
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::InvalidImage(msg) => write!(f, "invalid image payload: {}", msg),
            IngestError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for IngestError {}

#[derive(Clone)]
pub struct EmotionPipeline {
    ml: MlClient,
    video: VideoService,
}

impl EmotionPipeline {
    pub fn new(ml: MlClient, video: VideoService) -> Self {
        Self { ml, video }
    }

    /// Classify one still image and wrap it into a record. Classification
    /// failures are absorbed by the client's fallback, so this never fails.
    pub async fn ingest_image(&self, image_path: &Path, camera_id: i64) -> EmotionRecord {
        let analysis = self.ml.analyze(image_path).await;
        let record = build_record(analysis, camera_id, image_path);
        println!(
            "[emotion] Camera {}: {} ({:.2})",
            camera_id, record.dominant_emotion, record.confidence
        );
        record
    }

    /// Extract frames from a video and classify them sequentially, in
    /// extraction order. Extraction failure aborts the whole call;
    /// per-frame classification failures do not.
    pub async fn ingest_video(
        &self,
        video_path: &Path,
        camera_id: i64,
    ) -> Result<Vec<EmotionRecord>, VideoError> {
        let opts = ExtractOptions {
            frame_rate: VIDEO_FRAME_RATE,
            max_frames: VIDEO_MAX_FRAMES,
            start_time: 0.0,
        };
        let frames = self.video.extract_frames(video_path, &opts).await?;

        let mut records = Vec::with_capacity(frames.len());
        for frame in &frames {
            records.push(self.ingest_image(frame, camera_id).await);
        }
        Ok(records)
    }

    /// Decode a base64 stream chunk, classify it, and gate on reliability.
    /// Unreliable classifications come back as `Skipped` and must not be
    /// persisted by the caller.
    pub async fn ingest_stream_frame(
        &self,
        encoded: &str,
        camera_id: i64,
    ) -> Result<IngestOutcome, IngestError> {
        let payload = strip_data_uri(encoded);
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| IngestError::InvalidImage(e.to_string()))?;

        let frame_path = self
            .video
            .save_frame(&bytes, "stream", "jpg")
            .await
            .map_err(|e| match e {
                VideoError::Io(io) => IngestError::Io(io),
                VideoError::Tool(msg) => {
                    IngestError::Io(std::io::Error::other(msg))
                }
            })?;

        let record = self.ingest_image(&frame_path, camera_id).await;
        if !self.ml.is_reliable(record.confidence) {
            return Ok(IngestOutcome::Skipped {
                reason: format!("Skipped: low confidence ({:.2})", record.confidence),
            });
        }
        Ok(IngestOutcome::Accepted(record))
    }
}

fn build_record(analysis: EmotionAnalysis, camera_id: i64, image_path: &Path) -> EmotionRecord {
    // A populated score map that does not sum to ~1 is a malformed service
    // response; treat it like a classification failure.
    let analysis = if !analysis.emotions.is_empty() && !validate_scores(&analysis.emotions) {
        eprintln!(
            "[emotion] Rejecting malformed score mapping for {}",
            image_path.display()
        );
        ml::fallback_result("invalid emotion scores".to_string())
    } else {
        analysis
    };

    // Some service builds omit the dominant field; derive it from the map.
    let dominant = if analysis.dominant_emotion.is_empty() {
        dominant_emotion(&analysis.emotions).0
    } else {
        analysis.dominant_emotion
    };

    EmotionRecord {
        camera_id,
        timestamp: Utc::now(),
        dominant_emotion: ml::format_label(&dominant),
        emotions: analysis.emotions,
        confidence: analysis.confidence,
        face_detected: analysis.face_detected,
        frame_url: image_path.to_string_lossy().into_owned(),
    }
}

/// Strip a leading `data:<mime>;base64,` prefix, if present.
fn strip_data_uri(data: &str) -> &str {
    if let Some(rest) = data.strip_prefix("data:") {
        if let Some((_, payload)) = rest.split_once(";base64,") {
            return payload;
        }
    }
    data
}

/// The category with the highest score, with its score as confidence.
pub fn dominant_emotion(scores: &BTreeMap<String, f64>) -> (String, f64) {
    let mut best = ("neutral".to_string(), 0.0);
    for (emotion, value) in scores {
        if *value > best.1 {
            best = (emotion.clone(), *value);
        }
    }
    best
}

/// A fully populated score mapping must sum to 1.0 within tolerance.
pub fn validate_scores(scores: &BTreeMap<String, f64>) -> bool {
    let sum: f64 = scores.values().sum();
    (sum - 1.0).abs() < SCORE_SUM_TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn unreachable_pipeline(root: &Path) -> EmotionPipeline {
        EmotionPipeline::new(MlClient::new("http://127.0.0.1:9", 0.5), VideoService::new(root))
    }

    fn temp_root(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("emotion_pipe_{}_{}", tag, rand::random::<u64>()))
    }

    #[test]
    fn data_uri_prefix_is_stripped() {
        assert_eq!(strip_data_uri("data:image/jpeg;base64,aGVsbG8="), "aGVsbG8=");
        assert_eq!(strip_data_uri("data:image/png;base64,YQ=="), "YQ==");
        assert_eq!(strip_data_uri("aGVsbG8="), "aGVsbG8=");
    }

    #[test]
    fn dominant_emotion_picks_highest_score() {
        let mut scores = BTreeMap::new();
        scores.insert("happy".to_string(), 0.7);
        scores.insert("sad".to_string(), 0.2);
        scores.insert("neutral".to_string(), 0.1);

        assert_eq!(dominant_emotion(&scores), ("happy".to_string(), 0.7));
        assert_eq!(dominant_emotion(&BTreeMap::new()), ("neutral".to_string(), 0.0));
    }

    #[test]
    fn score_sum_is_validated_within_tolerance() {
        let mut scores = BTreeMap::new();
        scores.insert("happy".to_string(), 0.62);
        scores.insert("neutral".to_string(), 0.38);
        assert!(validate_scores(&scores));

        scores.insert("sad".to_string(), 0.5);
        assert!(!validate_scores(&scores));
    }

    #[test]
    fn malformed_scores_are_replaced_by_fallback() {
        let mut emotions = BTreeMap::new();
        emotions.insert("happy".to_string(), 0.9);
        emotions.insert("sad".to_string(), 0.9);
        let analysis = EmotionAnalysis {
            emotions,
            dominant_emotion: "happy".to_string(),
            confidence: 0.9,
            face_detected: true,
            error: None,
        };

        let record = build_record(analysis, 7, Path::new("frame.jpg"));

        assert_eq!(record.dominant_emotion, "Neutral");
        assert_eq!(record.confidence, 0.0);
        assert!(!record.face_detected);
        assert!(validate_scores(&record.emotions));
    }

    #[test]
    fn dominant_label_is_normalized() {
        let mut emotions = BTreeMap::new();
        emotions.insert("surprise".to_string(), 1.0);
        let analysis = EmotionAnalysis {
            emotions,
            dominant_emotion: "surprise".to_string(),
            confidence: 0.8,
            face_detected: true,
            error: None,
        };

        let record = build_record(analysis, 3, Path::new("frames/frame_1.jpg"));

        assert_eq!(record.dominant_emotion, "Surprise");
        assert_eq!(record.camera_id, 3);
        assert_eq!(record.frame_url, "frames/frame_1.jpg");
    }

    #[test]
    fn missing_dominant_is_derived_from_scores() {
        let mut emotions = BTreeMap::new();
        emotions.insert("fear".to_string(), 0.75);
        emotions.insert("neutral".to_string(), 0.25);
        let analysis = EmotionAnalysis {
            emotions,
            dominant_emotion: String::new(),
            confidence: 0.75,
            face_detected: true,
            error: None,
        };

        let record = build_record(analysis, 1, Path::new("frame.jpg"));

        assert_eq!(record.dominant_emotion, "Fear");
    }

    #[tokio::test]
    async fn extraction_failure_aborts_video_ingestion() {
        let root = temp_root("abort");
        let pipeline = unreachable_pipeline(&root);

        let result = pipeline
            .ingest_video(Path::new("/nonexistent/clip.mp4"), 2)
            .await;

        assert!(result.is_err());
        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn invalid_base64_is_a_validation_error() {
        let root = temp_root("b64");
        let pipeline = unreachable_pipeline(&root);

        let result = pipeline.ingest_stream_frame("not-base64!!!", 1).await;

        assert!(matches!(result, Err(IngestError::InvalidImage(_))));
    }

    #[tokio::test]
    async fn unreliable_stream_frame_is_skipped() {
        let root = temp_root("skip");
        let pipeline = unreachable_pipeline(&root);

        // Classification falls back (service unreachable) with confidence 0,
        // which never clears the gate.
        let outcome = pipeline
            .ingest_stream_frame("data:image/jpeg;base64,/9j/4AA=", 5)
            .await
            .unwrap();

        match outcome {
            IngestOutcome::Skipped { reason } => assert!(reason.contains("low confidence")),
            IngestOutcome::Accepted(_) => panic!("fallback confidence must not be accepted"),
        }

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }
}
