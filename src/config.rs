//! Logger settings loaded with Figment.
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. a TOML file (`sr810.toml` unless another path is given; a missing file is skipped)
//! 3. environment variables prefixed with `SR810_`
//!
//! Command-line flags are applied on top by the binary.
//!
//! ```text
//! SR810_ADDRESS=GPIB0::9::INSTR
//! SR810_POLL_INTERVAL=500ms
//! SR810_LIVE_WINDOW=50
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::acquisition::{AcquisitionConfig, DEFAULT_LIVE_WINDOW, DEFAULT_POLL_INTERVAL};
use crate::data::{CsvTraceWriter, DEFAULT_FILE_PREFIX};
use crate::error::{DaqError, DaqResult};
use crate::instrument::{Sensitivity, TimeConstant, DEFAULT_GPIB_ADDRESS};

/// Config file read when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "sr810.toml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "SR810_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Everything the logger needs to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// VISA resource string of the lock-in.
    pub address: String,
    /// Pause between polls, e.g. `"1s"` or `"250ms"`.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Samples in the live view.
    pub live_window: usize,
    /// Where day folders are created.
    pub output_dir: PathBuf,
    /// Prefix of trace files and day folders.
    pub file_prefix: String,
    /// Render SVG charts next to the log output.
    pub plot: bool,
    /// Default log level when `RUST_LOG` is unset.
    pub log_level: String,
    /// Sensitivity index applied at startup.
    pub sensitivity: Option<i64>,
    /// Time constant index applied at startup.
    pub time_constant: Option<i64>,
    /// Excitation amplitude applied at startup, volts.
    pub excitation_volts: Option<f64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            address: DEFAULT_GPIB_ADDRESS.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            live_window: DEFAULT_LIVE_WINDOW,
            output_dir: PathBuf::from("."),
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            plot: true,
            log_level: "info".to_string(),
            sensitivity: None,
            time_constant: None,
            excitation_volts: None,
        }
    }
}

impl Settings {
    /// Load and validate settings.
    ///
    /// `path` replaces [`DEFAULT_CONFIG_FILE`]. A file that does not exist
    /// contributes nothing.
    pub fn load(path: Option<&Path>) -> DaqResult<Self> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        let settings: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Check ranges that serde cannot express.
    pub fn validate(&self) -> DaqResult<()> {
        if self.address.trim().is_empty() {
            return Err(DaqError::Configuration("address must not be empty".into()));
        }
        if self.live_window == 0 {
            return Err(DaqError::Configuration(
                "live_window must be at least 1".into(),
            ));
        }
        if self.file_prefix.is_empty() || self.file_prefix.contains(['/', '\\']) {
            return Err(DaqError::Configuration(format!(
                "Invalid file_prefix '{}'",
                self.file_prefix
            )));
        }
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            )));
        }
        if let Some(index) = self.sensitivity {
            Sensitivity::new(index)?;
        }
        if let Some(index) = self.time_constant {
            TimeConstant::new(index)?;
        }
        if let Some(volts) = self.excitation_volts {
            if !volts.is_finite() || volts < 0.0 {
                return Err(DaqError::Configuration(format!(
                    "Invalid excitation_volts {volts}"
                )));
            }
        }
        Ok(())
    }

    /// Loop timing for [`crate::acquisition::Acquisition`].
    pub fn acquisition(&self) -> AcquisitionConfig {
        AcquisitionConfig {
            poll_interval: self.poll_interval,
            live_window: self.live_window,
        }
    }

    /// Trace writer for the configured directory and prefix.
    pub fn writer(&self) -> CsvTraceWriter {
        CsvTraceWriter::new(&self.output_dir, &self.file_prefix)
    }
}
