//! Configuration management for the acquisition engine
//!
//! Runtime parameters load from a JSON file in the per-user config
//! directory, enabling bench-side tuning without recompilation. Every field
//! carries a default matching the validated reference setup, and any load
//! failure falls back to those defaults rather than erroring.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Smallest accepted averaging window.
pub const WINDOW_MIN: u32 = 1;
/// Largest accepted averaging window.
pub const WINDOW_MAX: u32 = 100;

/// Complete engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
}

/// Serial link parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Default device path used when no device was selected explicitly
    pub port: String,
    /// Line speed in baud
    pub baud_rate: u32,
    /// Bounded read timeout so stop requests are observed promptly
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port().to_string(),
            baud_rate: 115_200,
            read_timeout_ms: 100,
        }
    }
}

#[cfg(windows)]
fn default_port() -> &'static str {
    "COM3"
}

#[cfg(not(windows))]
fn default_port() -> &'static str {
    "/dev/ttyUSB0"
}

/// Streaming loop parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Raw samples averaged into one measurement point (1-100)
    pub window_size: u32,
    /// Idle sleep between polls when no bytes are waiting
    pub poll_interval_ms: u64,
    /// Pause after an absorbed read/parse fault before the next poll
    pub error_backoff_ms: u64,
    /// Upper bound on one read so a burst cannot balloon memory
    pub max_chunk_bytes: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            window_size: 25,
            poll_interval_ms: 10,
            error_backoff_ms: 100,
            max_chunk_bytes: 1024,
        }
    }
}

/// Guided calibration parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Capture duration of one guided calibration step
    pub step_sample_ms: u64,
    /// Capture duration of an ad-hoc raw sample request
    pub adhoc_sample_ms: u64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            step_sample_ms: 3_000,
            adhoc_sample_ms: 2_000,
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    ///
    /// # Arguments
    /// * `path` - Path to the JSON config file
    ///
    /// # Returns
    /// The parsed configuration, or the defaults if the file is missing or
    /// does not parse.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::info!(
                    "[Config] No config file at {:?} ({}). Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the per-user config directory.
    pub fn load() -> Self {
        Self::load_from_file(Self::default_path())
    }

    /// Platform-scoped path of the engine config file.
    pub fn default_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        base.join("mevem").join("config.json")
    }
}
