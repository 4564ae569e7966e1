//! Application constants

/// Root directory for uploaded media (frames and videos)
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";

/// Maximum request body size (50 MB, matches the ingestion surface limit)
pub const MAX_UPLOAD_SIZE: usize = 50 * 1024 * 1024;

/// Default endpoint of the external classification service
pub const DEFAULT_ML_SERVICE_URL: &str = "http://localhost:8000";

/// Confidence cutoff below which classifications are skipped, unless overridden
pub const DEFAULT_RELIABILITY_THRESHOLD: f64 = 0.5;

/// Default page size for the emotion history endpoint
pub const DEFAULT_HISTORY_LIMIT: i64 = 100;

/// Maximum page size for the emotion history endpoint
pub const MAX_HISTORY_LIMIT: i64 = 1000;

/// Frame files older than this are reaped by the cleanup worker (24 hours)
pub const DEFAULT_FRAME_MAX_AGE_SECS: u64 = 24 * 60 * 60;

/// Interval between cleanup sweeps (1 hour)
pub const DEFAULT_FRAME_CLEANUP_INTERVAL_SECS: u64 = 60 * 60;
