use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Main configuration for the sketch-video pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Frame extraction settings
    pub extraction: ExtractionConfig,

    /// Per-frame filtering settings
    pub filtering: FilterConfig,

    /// Video encoder settings
    pub encoder: EncoderConfig,

    /// Temporary working directory settings
    pub workspace: WorkspaceConfig,

    /// One-shot processing settings
    pub process: ProcessConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.extraction.validate()?;
        self.filtering.validate()?;
        self.encoder.validate()?;
        self.process.validate()?;
        Ok(())
    }
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn validate_quality(key: &str, quality: u8) -> Result<()> {
    if quality == 0 || quality > 100 {
        return Err(invalid(key, quality).into());
    }
    Ok(())
}

fn validate_weight(key: &str, weight: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&weight) {
        return Err(invalid(key, weight).into());
    }
    Ok(())
}

/// Caps a configured worker count by the number of available CPUs
pub fn effective_concurrency(limit: usize) -> usize {
    limit.min(num_cpus::get()).max(1)
}

/// Frame extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Maximum number of concurrent frame grabs
    pub max_concurrency: usize,

    /// JPEG quality of extracted stills (1-100)
    pub jpeg_quality: u8,

    /// Report progress after every N successful frames
    pub progress_every: usize,

    /// Share of the overall progress bar owned by extraction
    pub progress_weight: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            jpeg_quality: 85,
            progress_every: 3,
            progress_weight: 0.3,
        }
    }
}

impl ExtractionConfig {
    fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(invalid("extraction.max_concurrency", self.max_concurrency).into());
        }
        if self.progress_every == 0 {
            return Err(invalid("extraction.progress_every", self.progress_every).into());
        }
        validate_quality("extraction.jpeg_quality", self.jpeg_quality)?;
        validate_weight("extraction.progress_weight", self.progress_weight)
    }
}

/// Per-frame filter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Maximum number of frames filtered at once (CPU bound, keep low)
    pub max_concurrency: usize,

    /// JPEG quality of filtered frames, deliberately lossy
    pub jpeg_quality: u8,

    /// Report progress after every N processed frames
    pub progress_every: usize,

    /// Share of the overall progress bar owned by filtering
    pub progress_weight: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 2,
            jpeg_quality: 30,
            progress_every: 3,
            progress_weight: 0.8,
        }
    }
}

impl FilterConfig {
    fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(invalid("filtering.max_concurrency", self.max_concurrency).into());
        }
        if self.progress_every == 0 {
            return Err(invalid("filtering.progress_every", self.progress_every).into());
        }
        validate_quality("filtering.jpeg_quality", self.jpeg_quality)?;
        validate_weight("filtering.progress_weight", self.progress_weight)
    }
}

/// Video encoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Target bitrate in bits per second
    pub bitrate: u32,

    /// Seconds between forced key frames
    pub key_frame_interval_secs: u32,

    /// Timeout for a single input/output buffer dequeue
    pub dequeue_timeout_ms: u64,

    /// Consecutive polls without progress before the pump gives up.
    ///
    /// An idle poll lasts at least `dequeue_timeout_ms` even when the backend
    /// returns early, so the pump waits about `max_idle_polls * dequeue_timeout_ms`.
    pub max_idle_polls: u32,

    /// Save the first filtered frame as a still when encoding fails
    pub still_fallback: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            bitrate: 1_500_000,
            key_frame_interval_secs: 2,
            dequeue_timeout_ms: 10,
            max_idle_polls: 1000,
            still_fallback: true,
        }
    }
}

impl EncoderConfig {
    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }

    /// Wall time without encoder progress after which the pump stalls
    pub fn stall_after(&self) -> Duration {
        self.dequeue_timeout() * self.max_idle_polls
    }

    fn validate(&self) -> Result<()> {
        if self.bitrate == 0 {
            return Err(invalid("encoder.bitrate", self.bitrate).into());
        }
        if self.key_frame_interval_secs == 0 {
            return Err(invalid("encoder.key_frame_interval_secs", self.key_frame_interval_secs).into());
        }
        if self.max_idle_polls == 0 {
            return Err(invalid("encoder.max_idle_polls", self.max_idle_polls).into());
        }
        Ok(())
    }
}

/// Temporary working directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Directory that holds per-invocation working directories
    pub temp_root: PathBuf,

    /// Age after which a leftover working directory counts as abandoned
    pub stale_after_secs: u64,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            temp_root: std::env::temp_dir(),
            stale_after_secs: 900,
        }
    }
}

impl WorkspaceConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

/// One-shot processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Sampling rate used when processing a whole video in one call
    pub target_fps: f64,

    /// Longest output side in pixels
    pub max_dimension: u32,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            target_fps: 3.0,
            max_dimension: 240,
        }
    }
}

impl ProcessConfig {
    fn validate(&self) -> Result<()> {
        if !(self.target_fps > 0.0) {
            return Err(invalid("process.target_fps", self.target_fps).into());
        }
        if self.max_dimension < 2 {
            return Err(invalid("process.max_dimension", self.max_dimension).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.extraction.max_concurrency, 4);
        assert_eq!(config.filtering.max_concurrency, 2);
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test_config.toml");

        let mut original_config = Config::default();
        original_config.encoder.bitrate = 800_000;

        original_config.save_to_file(&file_path).unwrap();
        let loaded_config = Config::from_file(&file_path).unwrap();

        assert_eq!(loaded_config.encoder.bitrate, 800_000);
        assert_eq!(loaded_config.filtering.jpeg_quality, original_config.filtering.jpeg_quality);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("partial.toml");
        std::fs::write(&file_path, "[process]\ntarget_fps = 5.0\n").unwrap();

        let config = Config::from_file(&file_path).unwrap();
        assert_eq!(config.process.target_fps, 5.0);
        assert_eq!(config.process.max_dimension, 240);
        assert_eq!(config.extraction.jpeg_quality, 85);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.extraction.max_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.filtering.jpeg_quality = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.process.target_fps = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_effective_concurrency_never_zero() {
        assert!(effective_concurrency(4) >= 1);
        assert!(effective_concurrency(4) <= 4);
        assert_eq!(effective_concurrency(0), 1);
    }
}
