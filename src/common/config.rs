//! Configuration management for fairround
//!
//! TOML file, then `FAIRROUND_*` environment overrides, then validation.

use crate::errors::{ConfigurationError, FairroundResult};
use crate::math::Fraction;
use crate::randomness::Durability;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FairroundConfig {
    pub game: GameDefaults,
    pub oracle: OracleConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Parameters used when a game is created without explicit values
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameDefaults {
    pub win_rate: Fraction,
    pub max_odd: Fraction,
}

impl Default for GameDefaults {
    fn default() -> Self {
        Self {
            win_rate: Fraction::new(95, 100).unwrap_or(Fraction::one()),
            max_odd: Fraction::from_integer(10),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// Re-submissions allowed after transport failures
    pub request_retries: u32,
    pub durability: Durability,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            poll_interval_ms: 250,
            request_retries: 3,
            durability: Durability::Confirmed,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Rocksdb,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_directory: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            data_directory: "./DB/fairround".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "fairround=info".to_string(),
        }
    }
}

/// Configuration loader with environment variable support
#[derive(Default)]
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> FairroundResult<FairroundConfig> {
        let mut config = match self.config_path {
            Some(ref path) => self.load_from_file(path)?,
            None => FairroundConfig::default(),
        };

        self.apply_env_overrides(&mut config)?;
        self.validate(&config)?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> FairroundResult<FairroundConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)).into())
    }

    fn apply_env_overrides(&self, config: &mut FairroundConfig) -> FairroundResult<()> {
        if let Ok(timeout) = env::var("FAIRROUND_ORACLE_TIMEOUT_MS") {
            config.oracle.timeout_ms = parse_env("FAIRROUND_ORACLE_TIMEOUT_MS", timeout, "Invalid timeout value")?;
        }
        if let Ok(interval) = env::var("FAIRROUND_ORACLE_POLL_MS") {
            config.oracle.poll_interval_ms = parse_env("FAIRROUND_ORACLE_POLL_MS", interval, "Invalid poll interval")?;
        }
        if let Ok(level) = env::var("FAIRROUND_ORACLE_DURABILITY") {
            config.oracle.durability = parse_env("FAIRROUND_ORACLE_DURABILITY", level, "Unknown durability level")?;
        }
        if let Ok(data_dir) = env::var("FAIRROUND_DATA_DIR") {
            config.storage.data_directory = data_dir;
            config.storage.backend = StorageBackend::Rocksdb;
        }
        if let Ok(filter) = env::var("FAIRROUND_LOG") {
            config.logging.filter = filter;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self, config: &FairroundConfig) -> FairroundResult<()> {
        if config.oracle.timeout_ms == 0 {
            return Err(invalid("oracle.timeout_ms", "0", "Timeout cannot be zero"));
        }

        if config.oracle.poll_interval_ms == 0 || config.oracle.poll_interval_ms >= config.oracle.timeout_ms {
            return Err(invalid(
                "oracle.poll_interval_ms",
                &config.oracle.poll_interval_ms.to_string(),
                "Poll interval must be non-zero and shorter than the timeout",
            ));
        }

        validate_win_rate(config.game.win_rate)?;
        validate_max_odd(config.game.max_odd)?;

        if config.storage.backend == StorageBackend::Rocksdb && config.storage.data_directory.is_empty() {
            return Err(ConfigurationError::MissingRequired("storage.data_directory".to_string()).into());
        }

        Ok(())
    }

    pub fn save(&self, config: &FairroundConfig, path: &str) -> FairroundResult<()> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to write to {}: {}", path, e)).into())
    }
}

fn parse_env<T: std::str::FromStr>(field: &str, value: String, reason: &str) -> FairroundResult<T> {
    value.parse().map_err(|_| {
        ConfigurationError::InvalidValue {
            field: field.to_string(),
            value,
            reason: reason.to_string(),
        }
        .into()
    })
}

fn invalid(field: &str, value: &str, reason: &str) -> crate::errors::FairroundError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

/// Exclusive bound on each lowest-terms component of a win rate. Derivation
/// multiplies the numerator by `2^32` and the denominator by up to `2^32`,
/// both in `u64`.
pub const WIN_RATE_COMPONENT_LIMIT: u64 = crate::crash::CRASH_SCALE;

/// `0 < win_rate <= 1`, with both terms below `2^32` once reduced.
pub fn validate_win_rate(win_rate: Fraction) -> Result<(), ConfigurationError> {
    let reduced = win_rate.reduced();
    if win_rate.is_zero()
        || win_rate > Fraction::one()
        || reduced.numerator() >= WIN_RATE_COMPONENT_LIMIT
        || reduced.denominator() >= WIN_RATE_COMPONENT_LIMIT
    {
        return Err(ConfigurationError::InvalidWinRate(win_rate.to_string()));
    }
    Ok(())
}

/// `max_odd > 1`
pub fn validate_max_odd(max_odd: Fraction) -> Result<(), ConfigurationError> {
    if max_odd <= Fraction::one() {
        return Err(ConfigurationError::InvalidMaxOdd(max_odd.to_string()));
    }
    Ok(())
}
