//! Frame extraction and video file management.
//!
//! Decoding is delegated to ffmpeg/ffprobe subprocesses. Each extraction
//! job writes into its own uniquely named directory under the frames root,
//! so concurrent extractions of the same source never collide.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use tokio::process::Command;

use crate::constants::{DEFAULT_FRAME_CLEANUP_INTERVAL_SECS, DEFAULT_FRAME_MAX_AGE_SECS};

/// Sampling options for [`VideoService::extract_frames`].
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Frames sampled per second of video.
    pub frame_rate: f64,
    /// Upper bound on produced frames.
    pub max_frames: u32,
    /// Seek offset in seconds before sampling starts.
    pub start_time: f64,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            frame_rate: 1.0,
            max_frames: 100,
            start_time: 0.0,
        }
    }
}

/// Container and stream metadata reported by ffprobe.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    pub duration_secs: Option<f64>,
    pub size_bytes: Option<u64>,
    pub bitrate: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
}

#[derive(Debug)]
pub enum VideoError {
    Io(std::io::Error),
    /// The media tool failed; carries its message verbatim.
    Tool(String),
}

impl From<std::io::Error> for VideoError {
    fn from(e: std::io::Error) -> Self {
        VideoError::Io(e)
    }
}

impl std::fmt::Display for VideoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoError::Io(e) => write!(f, "I/O error: {}", e),
            VideoError::Tool(msg) => write!(f, "media tool error: {}", msg),
        }
    }
}

impl std::error::Error for VideoError {}

#[derive(Clone)]
pub struct VideoService {
    frames_dir: PathBuf,
    videos_dir: PathBuf,
}

impl VideoService {
    pub fn new(upload_dir: &Path) -> Self {
        Self {
            frames_dir: upload_dir.join("frames"),
            videos_dir: upload_dir.join("videos"),
        }
    }

    pub fn frames_dir(&self) -> &Path {
        &self.frames_dir
    }

    /// Sample still frames from a video into a fresh per-job directory.
    /// Returns the produced file paths ordered by frame index, which equals
    /// temporal order in the source.
    pub async fn extract_frames(
        &self,
        video_path: &Path,
        opts: &ExtractOptions,
    ) -> Result<Vec<PathBuf>, VideoError> {
        let stem = video_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());
        let out_dir = self
            .frames_dir
            .join(format!("{}_{}", stem, Utc::now().timestamp_micros()));
        tokio::fs::create_dir_all(&out_dir).await?;

        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-loglevel", "error", "-nostdin"]);
        if opts.start_time > 0.0 {
            cmd.args(["-ss", &opts.start_time.to_string()]);
        }
        cmd.arg("-i")
            .arg(video_path)
            .args(["-an", "-sn"])
            .args(["-vf", &format!("fps={}", opts.frame_rate)])
            .args(["-frames:v", &opts.max_frames.to_string()])
            .args(["-q:v", "2"])
            .arg("-y")
            .arg(out_dir.join("frame_%d.jpg"));

        let output = cmd
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VideoError::Tool(stderr.trim().to_string()));
        }

        let frames = collect_frames(&out_dir).await?;
        println!(
            "[video] Extracted {} frames from {} into {}",
            frames.len(),
            video_path.display(),
            out_dir.display()
        );
        Ok(frames)
    }

    /// Seek to `timestamp_secs` and decode exactly one frame.
    pub async fn extract_single_frame(
        &self,
        video_path: &Path,
        timestamp_secs: f64,
    ) -> Result<PathBuf, VideoError> {
        tokio::fs::create_dir_all(&self.frames_dir).await?;
        let out_path = self
            .frames_dir
            .join(format!("frame_{}.jpg", Utc::now().timestamp_micros()));

        let output = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-nostdin"])
            .args(["-ss", &timestamp_secs.to_string()])
            .arg("-i")
            .arg(video_path)
            .args(["-an", "-sn"])
            .args(["-frames:v", "1"])
            .args(["-q:v", "2"])
            .arg("-y")
            .arg(&out_path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VideoError::Tool(stderr.trim().to_string()));
        }

        println!(
            "[video] Frame extracted at {}s: {}",
            timestamp_secs,
            out_path.display()
        );
        Ok(out_path)
    }

    /// Probe container and video-stream metadata.
    pub async fn metadata(&self, video_path: &Path) -> Result<VideoMetadata, VideoError> {
        let output = Command::new("ffprobe")
            .args(["-v", "error"])
            .args(["-select_streams", "v:0"])
            .args([
                "-show_entries",
                "format=duration,size,bit_rate:stream=width,height,r_frame_rate",
            ])
            .args(["-of", "json"])
            .arg(video_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VideoError::Tool(stderr.trim().to_string()));
        }

        let probe: ProbeOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| VideoError::Tool(format!("unparseable ffprobe output: {}", e)))?;
        Ok(probe_to_metadata(probe))
    }

    /// Persist an uploaded video under the videos directory. The filename is
    /// reduced to its final path component.
    pub async fn save_video(&self, data: &[u8], filename: &str) -> Result<PathBuf, VideoError> {
        tokio::fs::create_dir_all(&self.videos_dir).await?;

        let name = Path::new(filename)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("video_{}.mp4", Utc::now().timestamp_millis()));
        let out_path = self.videos_dir.join(name);
        tokio::fs::write(&out_path, data).await?;

        println!("[video] Video saved: {}", out_path.display());
        Ok(out_path)
    }

    /// Persist a single image (an upload or a decoded stream chunk) under
    /// the frames directory with a unique name.
    pub async fn save_frame(&self, data: &[u8], prefix: &str, ext: &str) -> Result<PathBuf, VideoError> {
        tokio::fs::create_dir_all(&self.frames_dir).await?;

        let out_path = self.frames_dir.join(format!(
            "{}_{}_{:08x}.{}",
            prefix,
            Utc::now().timestamp_millis(),
            rand::random::<u32>(),
            ext
        ));
        tokio::fs::write(&out_path, data).await?;
        Ok(out_path)
    }

    /// Delete frame files older than `max_age` from the frames root and its
    /// per-job subdirectories. Per-file failures are logged and the sweep
    /// continues. Returns the number of deleted files.
    pub async fn cleanup_old_frames(&self, max_age: Duration) -> usize {
        let mut entries = match tokio::fs::read_dir(&self.frames_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    eprintln!("[cleanup] Cannot read {}: {}", self.frames_dir.display(), e);
                }
                return 0;
            }
        };

        let mut deleted = 0;
        let mut job_dirs = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.is_dir() {
                job_dirs.push(path);
            } else {
                deleted += sweep_file(&path, max_age).await;
            }
        }

        for dir in job_dirs {
            deleted += sweep_dir(&dir, max_age).await;
            // Only succeeds once the job directory has been emptied.
            let _ = tokio::fs::remove_dir(&dir).await;
        }

        deleted
    }
}

/// Periodic maintenance task reaping aged frame files.
pub async fn run_cleanup_worker(video: VideoService) {
    let max_age = Duration::from_secs(frame_max_age_secs());
    let every = Duration::from_secs(frame_cleanup_interval_secs());
    let mut interval = tokio::time::interval(every);

    println!(
        "[cleanup] Worker starting ({}s interval, {}s max age)",
        every.as_secs(),
        max_age.as_secs()
    );

    loop {
        interval.tick().await;
        let deleted = video.cleanup_old_frames(max_age).await;
        if deleted > 0 {
            println!("[cleanup] Deleted {} old frame files", deleted);
        }
    }
}

async fn sweep_dir(dir: &Path, max_age: Duration) -> usize {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("[cleanup] Cannot read {}: {}", dir.display(), e);
            return 0;
        }
    };

    let mut deleted = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if !path.is_dir() {
            deleted += sweep_file(&path, max_age).await;
        }
    }
    deleted
}

async fn sweep_file(path: &Path, max_age: Duration) -> usize {
    let old = tokio::fs::metadata(path)
        .await
        .ok()
        .and_then(|m| m.modified().ok())
        .and_then(|m| m.elapsed().ok())
        .map(|age| age > max_age)
        .unwrap_or(false);
    if !old {
        return 0;
    }

    match tokio::fs::remove_file(path).await {
        Ok(()) => 1,
        Err(e) => {
            eprintln!("[cleanup] Failed to delete {}: {}", path.display(), e);
            0
        }
    }
}

/// Collect `frame_<n>.jpg` files from an extraction directory, ordered by
/// frame index (numeric, so `frame_2` sorts before `frame_10`).
async fn collect_frames(dir: &Path) -> Result<Vec<PathBuf>, VideoError> {
    let mut frames: Vec<(u32, PathBuf)> = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if let Some(index) = frame_index(&path) {
            frames.push((index, path));
        }
    }
    frames.sort_by_key(|(index, _)| *index);
    Ok(frames.into_iter().map(|(_, path)| path).collect())
}

fn frame_index(path: &Path) -> Option<u32> {
    path.file_name()?
        .to_str()?
        .strip_prefix("frame_")?
        .strip_suffix(".jpg")?
        .parse()
        .ok()
}

/// Evaluate a frame-rate expression like "30000/1001" as a rational pair.
/// Plain numbers are accepted; zero denominators and garbage are not.
pub fn parse_frame_rate(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            Some(num / den)
        }
        None => raw.parse().ok(),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: ProbeFormat,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

// ffprobe reports format numbers as strings.
#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
}

fn probe_to_metadata(probe: ProbeOutput) -> VideoMetadata {
    let stream = probe
        .streams
        .into_iter()
        .find(|s| s.width.is_some())
        .unwrap_or_default();

    VideoMetadata {
        duration_secs: probe.format.duration.and_then(|v| v.parse().ok()),
        size_bytes: probe.format.size.and_then(|v| v.parse().ok()),
        bitrate: probe.format.bit_rate.and_then(|v| v.parse().ok()),
        width: stream.width,
        height: stream.height,
        fps: stream.r_frame_rate.as_deref().and_then(parse_frame_rate),
    }
}

fn frame_max_age_secs() -> u64 {
    std::env::var("FRAME_MAX_AGE_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_FRAME_MAX_AGE_SECS)
}

fn frame_cleanup_interval_secs() -> u64 {
    std::env::var("FRAME_CLEANUP_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_FRAME_CLEANUP_INTERVAL_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("emotion_api_{}_{}", tag, rand::random::<u64>()))
    }

    #[test]
    fn frame_rate_rational_is_parsed_not_evaluated() {
        let fps = parse_frame_rate("30000/1001").unwrap();
        assert!((fps - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("30"), Some(30.0));
        assert_eq!(parse_frame_rate(" 25/1 "), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("1/0"), None);
        assert_eq!(parse_frame_rate("process.exit()"), None);
    }

    #[test]
    fn frame_index_parses_numbered_frames_only() {
        assert_eq!(frame_index(Path::new("/tmp/out/frame_7.jpg")), Some(7));
        assert_eq!(frame_index(Path::new("frame_10.jpg")), Some(10));
        assert_eq!(frame_index(Path::new("frame_x.jpg")), None);
        assert_eq!(frame_index(Path::new("thumb_1.jpg")), None);
        assert_eq!(frame_index(Path::new("frame_1.png")), None);
    }

    #[test]
    fn probe_output_converts_to_metadata() {
        let raw = r#"{
            "streams": [{"width": 640, "height": 480, "r_frame_rate": "30000/1001"}],
            "format": {"duration": "45.300000", "size": "1048576", "bit_rate": "185000"}
        }"#;
        let probe: ProbeOutput = serde_json::from_str(raw).unwrap();
        let meta = probe_to_metadata(probe);

        assert_eq!(meta.duration_secs, Some(45.3));
        assert_eq!(meta.size_bytes, Some(1_048_576));
        assert_eq!(meta.bitrate, Some(185_000));
        assert_eq!(meta.width, Some(640));
        assert_eq!(meta.height, Some(480));
        assert!((meta.fps.unwrap() - 29.97).abs() < 0.01);
    }

    #[tokio::test]
    async fn collected_frames_are_in_numeric_order() {
        let dir = temp_root("order");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        for i in [3u32, 12, 1, 2, 10] {
            tokio::fs::write(dir.join(format!("frame_{}.jpg", i)), b"jpg")
                .await
                .unwrap();
        }
        tokio::fs::write(dir.join("notes.txt"), b"ignored").await.unwrap();

        let frames = collect_frames(&dir).await.unwrap();
        let indices: Vec<u32> = frames.iter().filter_map(|p| frame_index(p)).collect();
        assert_eq!(indices, vec![1, 2, 3, 10, 12]);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn cleanup_sweeps_root_and_job_directories() {
        let root = temp_root("cleanup");
        let video = VideoService::new(&root);
        let job_dir = video.frames_dir().join("clip_1700000000000000");
        tokio::fs::create_dir_all(&job_dir).await.unwrap();
        tokio::fs::write(video.frames_dir().join("stream_1.jpg"), b"a")
            .await
            .unwrap();
        tokio::fs::write(job_dir.join("frame_1.jpg"), b"b").await.unwrap();

        // Everything just written is older than a zero threshold.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let deleted = video.cleanup_old_frames(Duration::ZERO).await;

        assert_eq!(deleted, 2);
        assert!(!job_dir.exists());
        assert!(!video.frames_dir().join("stream_1.jpg").exists());

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }

    #[tokio::test]
    async fn cleanup_keeps_fresh_files() {
        let root = temp_root("fresh");
        let video = VideoService::new(&root);
        tokio::fs::create_dir_all(video.frames_dir()).await.unwrap();
        tokio::fs::write(video.frames_dir().join("stream_2.jpg"), b"a")
            .await
            .unwrap();

        let deleted = video.cleanup_old_frames(Duration::from_secs(3600)).await;

        assert_eq!(deleted, 0);
        assert!(video.frames_dir().join("stream_2.jpg").exists());

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }

    // These hold whether or not ffmpeg is installed: a missing input fails
    // the tool, and a missing tool fails the spawn.
    #[tokio::test]
    async fn extraction_errors_propagate() {
        let root = temp_root("err");
        let video = VideoService::new(&root);
        let missing = Path::new("/nonexistent/clip.mp4");

        let opts = ExtractOptions::default();
        assert!(video.extract_frames(missing, &opts).await.is_err());
        assert!(video.extract_single_frame(missing, 1.0).await.is_err());
        assert!(video.metadata(missing).await.is_err());

        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn save_video_strips_path_components() {
        let root = temp_root("save");
        let video = VideoService::new(&root);

        let path = video.save_video(b"mp4", "../../evil.mp4").await.unwrap();

        assert_eq!(path.file_name().unwrap(), "evil.mp4");
        assert!(path.starts_with(&root));
        assert!(path.exists());

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }
}
