//! Configuration loading and per-store options.
//!
//! Configuration is merged from three layers: built-in defaults, an optional
//! `pulsedb.toml`, and `PULSEDB_*` environment variables (nested keys split
//! on `__`, e.g. `PULSEDB_STORAGE__GROWTH_DAYS=60`).

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::record::Precision;

/// Default file extension for storage files.
pub const DEFAULT_EXTENSION: &str = ".mts";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    /// Storage engine settings.
    pub storage: StorageConfig,
    /// Logging settings consumed by binaries.
    pub logging: LoggingConfig,
}

/// Storage engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one sub-directory per device serial.
    pub data_dir: PathBuf,
    /// Extension appended to storage file names, including the dot.
    pub extension: String,
    /// Per-store options applied to every file opened through this config.
    #[serde(flatten)]
    pub options: StoreOptions,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            extension: DEFAULT_EXTENSION.to_string(),
            options: StoreOptions::default(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Options fixed per opened store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Fixed-point scaling of the energy/cost fields. Must match the value
    /// the file was created with.
    pub precision: Precision,
    /// Days of capacity added on creation and on every extension.
    pub growth_days: u32,
    /// Whether sentinel-valued slots with a quality score may be
    /// overwritten. Off by default; see [`crate::SlotRecord::is_valid`].
    pub overwrite_allowed: bool,
    /// Pause between attempts to take the exclusive write lock.
    pub lock_retry_interval_ms: u64,
    /// Total time to keep retrying the write lock before giving up.
    pub lock_timeout_ms: u64,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            precision: Precision::default(),
            growth_days: 30,
            overwrite_allowed: false,
            lock_retry_interval_ms: 1_000,
            lock_timeout_ms: 10_000,
        }
    }
}

impl StoreOptions {
    /// Rejects option combinations the engine cannot run with.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.growth_days == 0 {
            return Err(crate::Error::InvalidConfig(
                "growth_days must be at least 1".to_string(),
            ));
        }
        if self.lock_retry_interval_ms == 0 {
            return Err(crate::Error::InvalidConfig(
                "lock_retry_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.lock_timeout_ms < self.lock_retry_interval_ms {
            return Err(crate::Error::InvalidConfig(
                "lock_timeout_ms must not be shorter than lock_retry_interval_ms".to_string(),
            ));
        }
        Ok(())
    }
}

impl PulseConfig {
    /// Loads configuration from defaults, an optional TOML file, and
    /// `PULSEDB_*` environment overrides.
    ///
    /// When `path` is `None`, `pulsedb.toml` in the working directory is
    /// used if present.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] when a layer fails to parse or merge
    /// and [`crate::Error::InvalidConfig`] when a merged value is rejected.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let toml_path = path.unwrap_or_else(|| Path::new("pulsedb.toml"));
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(toml_path))
            .merge(Env::prefixed("PULSEDB_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the merged configuration.
    pub fn validate(&self) -> Result<()> {
        if !self.storage.extension.starts_with('.') {
            return Err(crate::Error::InvalidConfig(format!(
                "extension must start with a dot, got {:?}",
                self.storage.extension
            )));
        }
        self.storage.options.validate()
    }
}
