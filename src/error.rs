/// Error types for the thumbnail pipeline
///
/// Every per-item failure is local: a failed load marks one slot as
/// `Failed` and the grid shows a placeholder. Nothing here is fatal to the
/// pipeline as a whole.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// A decoder response that cannot be trusted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The decoder returned nothing at all
    #[error("decoder returned no result")]
    Empty,

    /// The response is shorter than the 8-byte header
    #[error("response too short for header: {len} bytes")]
    Truncated { len: usize },

    /// Width or height in the header is zero
    #[error("invalid dimensions {width}x{height}")]
    ZeroDimension { width: u32, height: u32 },

    /// `width * height * 4` does not fit in memory arithmetic
    #[error("dimensions {width}x{height} overflow the pixel buffer size")]
    Overflow { width: u32, height: u32 },

    /// Fewer payload bytes than the header promises
    #[error("payload too short: expected {expected} bytes, got {actual}")]
    PayloadTooShort { expected: usize, actual: usize },

    /// The decoder did not answer within the configured timeout
    #[error("decode timed out after {millis} ms")]
    TimedOut { millis: u64 },

    /// The decoder call panicked or its task was aborted
    #[error("decoder task failed: {0}")]
    Aborted(String),
}

/// Why a slot ended up `Failed`
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// Raw bytes could not be read (I/O failure, access revoked mid-flight)
    #[error("source unavailable: {0}")]
    SourceUnavailable(Arc<io::Error>),

    /// The decoder produced nothing usable
    #[error("decode rejected: {0}")]
    DecodeRejected(#[from] DecodeError),

    /// Decoded fine, but the image alone exceeds the whole cache budget
    #[error("image of {cost} bytes does not fit a {capacity}-byte cache")]
    TooLargeToCache { cost: usize, capacity: usize },
}

impl From<io::Error> for LoadError {
    fn from(err: io::Error) -> Self {
        LoadError::SourceUnavailable(Arc::new(err))
    }
}

impl LoadError {
    /// Source access was withdrawn by the host
    pub fn access_denied() -> Self {
        io::Error::new(io::ErrorKind::PermissionDenied, "media access not granted").into()
    }
}

/// Invalid input to the sample-size planner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("target size must be positive")]
    ZeroTarget,
}

/// Configuration that cannot be used
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read configuration {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Gallery enumeration failure
#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("media access not granted")]
    AccessDenied,

    #[error("gallery root does not exist: {}", .0.display())]
    MissingRoot(PathBuf),
}

/// The scheduler could not be constructed
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("no tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
