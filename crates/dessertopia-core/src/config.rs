//! Configuration management for the archive
//!
//! Handles loading and validation of `archive.toml`. Every field has a
//! default; a missing file yields the defaults, a malformed one is an error.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::catalog::Lang;
use crate::error::ConfigError;
use crate::logging::{LogConfig, LogLevel};

/// File name used under the data directory for persisted progress.
pub const STATE_FILE_NAME: &str = "archive_state.json";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output
    #[default]
    Pretty,
    /// JSON lines
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown log format: {s}. Expected one of: pretty, json")),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ArchiveConfig {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Phase unlock gate
    #[serde(default)]
    pub unlock: UnlockConfig,

    /// Narrative sequence timing and overlay generation
    #[serde(default)]
    pub sequence: SequenceConfig,

    /// Shock-stage audio synthesis
    #[serde(default)]
    pub audio: AudioConfig,

    /// Persisted progress location
    #[serde(default)]
    pub storage: StorageConfig,
}

// =============================================================================
// Sections
// =============================================================================

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Optional log file (append mode)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Display language
    #[serde(default)]
    pub lang: Lang,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Pretty,
            log_file: None,
            lang: Lang::Ko,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Unlock gate configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnlockConfig {
    /// Ticks of dwell required to unlock the next phase
    #[serde(default = "default_dwell_required")]
    pub dwell_required: u32,

    /// Dwell tick interval in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl Default for UnlockConfig {
    fn default() -> Self {
        Self {
            dwell_required: default_dwell_required(),
            tick_ms: default_tick_ms(),
        }
    }
}

fn default_dwell_required() -> u32 {
    5
}

fn default_tick_ms() -> u64 {
    1_000
}

/// Narrative sequence configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SequenceConfig {
    /// Overlay spawn tick interval in milliseconds
    #[serde(default = "default_spawn_interval_ms")]
    pub spawn_interval_ms: u64,

    /// Maximum overlay items retained after a tick
    #[serde(default = "default_overlay_cap")]
    pub overlay_cap: usize,

    /// Exclusive upper bound of the random part of a batch
    #[serde(default = "default_batch_random_span")]
    pub batch_random_span: u32,

    /// Extra items per elapsed second of shock
    #[serde(default = "default_batch_growth_per_sec")]
    pub batch_growth_per_sec: u32,

    /// Ceiling of the elapsed-time part of a batch
    #[serde(default = "default_batch_growth_cap")]
    pub batch_growth_cap: u32,

    /// Minimum delay between noise bursts (inclusive)
    #[serde(default = "default_noise_min_ms")]
    pub noise_min_ms: u64,

    /// Maximum delay between noise bursts (exclusive)
    #[serde(default = "default_noise_max_ms")]
    pub noise_max_ms: u64,

    /// Delay before the narrative continue action appears
    #[serde(default = "default_narrative_delay_ms")]
    pub narrative_delay_ms: u64,

    /// Delay before the epilogue reboot action appears
    #[serde(default = "default_epilogue_delay_ms")]
    pub epilogue_delay_ms: u64,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            spawn_interval_ms: default_spawn_interval_ms(),
            overlay_cap: default_overlay_cap(),
            batch_random_span: default_batch_random_span(),
            batch_growth_per_sec: default_batch_growth_per_sec(),
            batch_growth_cap: default_batch_growth_cap(),
            noise_min_ms: default_noise_min_ms(),
            noise_max_ms: default_noise_max_ms(),
            narrative_delay_ms: default_narrative_delay_ms(),
            epilogue_delay_ms: default_epilogue_delay_ms(),
        }
    }
}

fn default_spawn_interval_ms() -> u64 {
    30
}

fn default_overlay_cap() -> usize {
    500
}

fn default_batch_random_span() -> u32 {
    6
}

fn default_batch_growth_per_sec() -> u32 {
    2
}

fn default_batch_growth_cap() -> u32 {
    25
}

fn default_noise_min_ms() -> u64 {
    10
}

fn default_noise_max_ms() -> u64 {
    60
}

fn default_narrative_delay_ms() -> u64 {
    10_000
}

fn default_epilogue_delay_ms() -> u64 {
    6_000
}

/// Audio synthesis configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AudioConfig {
    /// Disable to run the shock stage silently
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Sawtooth drone frequency
    #[serde(default = "default_drone_hz")]
    pub drone_hz: f64,

    #[serde(default = "default_drone_gain")]
    pub drone_gain: f64,

    #[serde(default = "default_noise_gain")]
    pub noise_gain: f64,

    /// Length of one noise burst
    #[serde(default = "default_burst_ms")]
    pub burst_ms: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_rate: default_sample_rate(),
            drone_hz: default_drone_hz(),
            drone_gain: default_drone_gain(),
            noise_gain: default_noise_gain(),
            burst_ms: default_burst_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_sample_rate() -> u32 {
    44_100
}

fn default_drone_hz() -> f64 {
    15.0
}

fn default_drone_gain() -> f64 {
    0.2
}

fn default_noise_gain() -> f64 {
    0.1
}

fn default_burst_ms() -> u32 {
    50
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct StorageConfig {
    /// State file path; defaults under the platform data directory
    #[serde(default)]
    pub state_path: Option<PathBuf>,
}

impl StorageConfig {
    /// Configured path, or `<data_dir>/dessertopia/archive_state.json`.
    #[must_use]
    pub fn resolved_state_path(&self) -> PathBuf {
        if let Some(path) = &self.state_path {
            return path.clone();
        }
        dirs::data_dir().map_or_else(
            || PathBuf::from(STATE_FILE_NAME),
            |dir| dir.join("dessertopia").join(STATE_FILE_NAME),
        )
    }
}

// =============================================================================
// Loading + validation
// =============================================================================

impl ArchiveConfig {
    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&raw)?;
        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Load from `path` when given and present; defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) if path.exists() => Self::load_from(path),
            Some(path) => {
                tracing::debug!(path = %path.display(), "Config file absent, using defaults");
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse and validate TOML text.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.general.log_level.parse::<LogLevel>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "general.log_level: unknown level {}",
                self.general.log_level
            )));
        }
        if self.unlock.dwell_required == 0 {
            return invalid("unlock.dwell_required must be greater than zero");
        }
        if self.unlock.tick_ms == 0 {
            return invalid("unlock.tick_ms must be greater than zero");
        }

        let seq = &self.sequence;
        if seq.spawn_interval_ms == 0 {
            return invalid("sequence.spawn_interval_ms must be greater than zero");
        }
        if seq.overlay_cap == 0 {
            return invalid("sequence.overlay_cap must be greater than zero");
        }
        if seq.batch_random_span == 0 {
            return invalid("sequence.batch_random_span must be greater than zero");
        }
        if seq.noise_min_ms == 0 {
            return invalid("sequence.noise_min_ms must be greater than zero");
        }
        if seq.noise_min_ms >= seq.noise_max_ms {
            return invalid("sequence.noise_min_ms must be below sequence.noise_max_ms");
        }

        let audio = &self.audio;
        if audio.sample_rate == 0 {
            return invalid("audio.sample_rate must be greater than zero");
        }
        if audio.burst_ms == 0 {
            return invalid("audio.burst_ms must be greater than zero");
        }
        if audio.drone_hz.is_nan() || audio.drone_hz <= 0.0 {
            return invalid("audio.drone_hz must be greater than zero");
        }
        for (name, gain) in [("drone_gain", audio.drone_gain), ("noise_gain", audio.noise_gain)] {
            if !(0.0..=1.0).contains(&gain) {
                return Err(ConfigError::Invalid(format!(
                    "audio.{name} must be within 0.0..=1.0"
                )));
            }
        }
        Ok(())
    }

    /// Logging settings derived from `[general]`.
    #[must_use]
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.general.log_level.clone(),
            format: self.general.log_format,
            file: self.general.log_file.clone(),
        }
    }
}
