/// Pipeline configuration
///
/// Loaded once at startup and treated as immutable afterwards. The cache
/// capacity in particular is computed exactly once from the memory available
/// to the process and never changes for the lifetime of the cache.
///
/// The whole configuration round-trips through JSON so a host can ship a
/// tuned file alongside the binary.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default share of available memory given to the cache (1/8th)
pub const DEFAULT_MEMORY_FRACTION_DIVISOR: u64 = 8;

/// The cache never gets less than this, however little memory is reported
pub const DEFAULT_MIN_CAPACITY_BYTES: u64 = 16 * 1024 * 1024;

/// Concurrency ceiling for decode work
pub const DEFAULT_WORKERS: usize = 4;

/// Top-level configuration
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub cache: CacheConfig,
    pub scheduler: SchedulerConfig,
    pub gallery: GalleryConfig,
}

/// Memory budget for decoded thumbnails
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Capacity is `available_memory / memory_fraction_divisor`
    pub memory_fraction_divisor: u64,
    /// Floor applied after the fraction
    pub min_capacity_bytes: u64,
    /// Fixed capacity; skips memory detection entirely
    pub capacity_bytes: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_fraction_divisor: DEFAULT_MEMORY_FRACTION_DIVISOR,
            min_capacity_bytes: DEFAULT_MIN_CAPACITY_BYTES,
            capacity_bytes: None,
        }
    }
}

impl CacheConfig {
    /// Capacity for a process that has `available` bytes of memory to spend.
    ///
    /// `None` means the host could not tell; the floor is used.
    pub fn capacity_for(&self, available: Option<u64>) -> u64 {
        if let Some(fixed) = self.capacity_bytes {
            return fixed;
        }
        let divisor = self.memory_fraction_divisor.max(1);
        let share = available.map(|bytes| bytes / divisor).unwrap_or(0);
        share.max(self.min_capacity_bytes)
    }

    /// Capacity computed from the memory detected on this machine
    pub fn resolve_capacity(&self) -> u64 {
        let available = if self.capacity_bytes.is_some() {
            None
        } else {
            detect_available_memory()
        };
        self.capacity_for(available)
    }
}

/// Decode worker pool settings
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum number of decode tasks running at once
    pub workers: usize,
    /// A decode running longer than this fails its slot. The decode itself
    /// keeps its worker until it returns, and its result is still cached.
    pub decode_timeout_ms: Option<u64>,
    /// Ask the decoder to scale straight to the target size
    pub pass_target_dimensions: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            decode_timeout_ms: None,
            pass_target_dimensions: false,
        }
    }
}

impl SchedulerConfig {
    pub fn decode_timeout(&self) -> Option<Duration> {
        self.decode_timeout_ms.map(Duration::from_millis)
    }
}

/// Directory gallery settings
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GalleryConfig {
    /// Lowercase file extensions considered images
    pub extensions: Vec<String>,
    pub follow_links: bool,
    /// Read image headers during the scan so the planner can skip probing
    pub probe_dimensions: bool,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        let extensions = ["jpg", "jpeg", "png", "gif", "bmp", "webp", "tif", "tiff"];
        Self {
            extensions: extensions.iter().map(|ext| ext.to_string()).collect(),
            follow_links: true,
            probe_dimensions: false,
        }
    }
}

impl PipelineConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert to a JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse from a JSON string and validate
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a JSON configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.workers == 0 {
            return Err(ConfigError::Invalid("scheduler.workers must be at least 1".into()));
        }
        if self.cache.memory_fraction_divisor == 0 {
            return Err(ConfigError::Invalid(
                "cache.memory_fraction_divisor must be at least 1".into(),
            ));
        }
        if self.cache.capacity_bytes == Some(0) {
            return Err(ConfigError::Invalid("cache.capacity_bytes must be positive".into()));
        }
        if self.scheduler.decode_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "scheduler.decode_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Memory the process could still allocate, when the platform reports it
#[cfg(target_os = "linux")]
pub fn detect_available_memory() -> Option<u64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    parse_mem_available(&meminfo)
}

#[cfg(not(target_os = "linux"))]
pub fn detect_available_memory() -> Option<u64> {
    None
}

/// Extract `MemAvailable` (reported in kB) as bytes
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_mem_available(meminfo: &str) -> Option<u64> {
    meminfo
        .lines()
        .find_map(|line| line.strip_prefix("MemAvailable:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse::<u64>().ok())
        .and_then(|kb| kb.checked_mul(1024))
}
