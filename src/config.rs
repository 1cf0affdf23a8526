//! CLI configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via FLOWSTEAD_CONFIG or --config)
//! 3. Environment variables

use flowstead_core::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// flowstead configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Engine behavior.
    pub engine: EngineConfig,
}

impl Config {
    /// Loads configuration from `path` (when given), then applies
    /// environment variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Like [`Config::load`], with overrides read from `lookup`. The merged
    /// result is validated.
    pub fn load_with(
        path: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from `lookup`, keyed by environment variable name.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        self.storage.apply_overrides(&lookup);

        if let Some(v) = lookup("FLOWSTEAD_STRICT").as_deref().and_then(parse_bool) {
            self.engine.strict = v;
        }
        if let Some(v) = lookup("FLOWSTEAD_HALT_ON_ACTION_FAILURE")
            .as_deref()
            .and_then(parse_bool)
        {
            self.engine.halt_on_action_failure = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mb = self.storage.wal_segment_size_mb;
        if mb == 0 || mb > MAX_WAL_SEGMENT_SIZE_MB {
            return Err(ConfigError::ValidationError(format!(
                "storage.wal_segment_size_mb must be between 1 and {}, got {}",
                MAX_WAL_SEGMENT_SIZE_MB, mb
            )));
        }
        if let FsyncPolicy::EveryN(0) = self.storage.fsync_policy {
            return Err(ConfigError::ValidationError(
                "storage.fsync_policy every_n needs N >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Largest accepted WAL segment size.
pub const MAX_WAL_SEGMENT_SIZE_MB: u64 = 4096;

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory; tenant logs live under `<data_dir>/tenants/`.
    pub data_dir: PathBuf,
    /// WAL segment size in megabytes.
    pub wal_segment_size_mb: u64,
    /// Fsync policy.
    pub fsync_policy: FsyncPolicy,
    /// Compact a tenant store after this many log entries; 0 disables.
    pub compact_every: u64,
}

/// Fsync policy for WAL writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsyncPolicy {
    /// Fsync after every write (safest, slowest).
    EveryWrite,
    /// Fsync after N writes.
    EveryN(u32),
    /// Never fsync, rely on OS (fastest, least safe).
    Never,
}

impl From<FsyncPolicy> for flowstead_wal::FsyncPolicy {
    fn from(policy: FsyncPolicy) -> Self {
        match policy {
            FsyncPolicy::EveryWrite => flowstead_wal::FsyncPolicy::EveryWrite,
            FsyncPolicy::EveryN(n) => flowstead_wal::FsyncPolicy::EveryN(n),
            FsyncPolicy::Never => flowstead_wal::FsyncPolicy::Never,
        }
    }
}

impl FsyncPolicy {
    /// Parses `every_write`, `never` or `every_n:N`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "every_write" | "everywrite" => Some(FsyncPolicy::EveryWrite),
            "never" => Some(FsyncPolicy::Never),
            s => s
                .strip_prefix("every_n:")
                .and_then(|n| n.parse().ok())
                .map(FsyncPolicy::EveryN),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            wal_segment_size_mb: 16,
            fsync_policy: FsyncPolicy::EveryWrite,
            compact_every: 1000,
        }
    }
}

impl StorageConfig {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("FLOWSTEAD_DATA") {
            self.data_dir = PathBuf::from(dir);
        }

        if let Some(size) = lookup("FLOWSTEAD_WAL_SEGMENT_SIZE_MB") {
            match size.parse::<u64>() {
                Ok(mb) if mb > 0 => self.wal_segment_size_mb = mb,
                _ => tracing::warn!("ignoring FLOWSTEAD_WAL_SEGMENT_SIZE_MB={}", size),
            }
        }

        if let Some(policy) = lookup("FLOWSTEAD_FSYNC_POLICY") {
            match FsyncPolicy::parse(&policy) {
                Some(p) => self.fsync_policy = p,
                None => tracing::warn!("ignoring FLOWSTEAD_FSYNC_POLICY={}", policy),
            }
        }

        if let Some(every) = lookup("FLOWSTEAD_COMPACT_EVERY") {
            match every.parse::<u64>() {
                Ok(n) => self.compact_every = n,
                Err(_) => tracing::warn!("ignoring FLOWSTEAD_COMPACT_EVERY={}", every),
            }
        }
    }

    /// Returns the WAL segment size in bytes.
    pub fn wal_segment_size(&self) -> u64 {
        self.wal_segment_size_mb.saturating_mul(1024 * 1024)
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
