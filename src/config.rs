//! Configuration management with validation, presets and TOML loading
//!
//! Everything under [`GameConfig`] is fixed once a game is constructed.

use crate::errors::{ConfigurationError, PoolResult};
use crate::games::types::{Address, Amount};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Referral code passed to the lending pool on every sweep
pub const DEFAULT_REFERRAL_CODE: u16 = 155;

/// Complete configuration for one game
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub game: GameConfig,
    pub collaborators: CollaboratorConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Immutable game parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Number of segments; also the index of the last segment
    pub segment_count: u64,
    pub segment_length_secs: u64,
    /// Fixed contribution per segment
    pub segment_payment: u64,
    /// Whole percent, 0..=100
    pub early_withdrawal_fee: u8,
    #[serde(default = "default_referral_code")]
    pub referral_code: u16,
    /// Unix seconds; construction time when absent
    #[serde(default)]
    pub first_segment_start: Option<u64>,
}

fn default_referral_code() -> u16 {
    DEFAULT_REFERRAL_CODE
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            segment_count: 6,
            segment_length_secs: 7 * 24 * 60 * 60,
            segment_payment: 10_000_000,
            early_withdrawal_fee: 10,
            referral_code: DEFAULT_REFERRAL_CODE,
            first_segment_start: None,
        }
    }
}

impl GameConfig {
    pub fn segment_payment(&self) -> Amount {
        Amount::from(self.segment_payment)
    }

    pub fn segment_length(&self) -> Duration {
        Duration::from_secs(self.segment_length_secs)
    }

    /// Wall-clock length of the whole game, payment windows plus the final waiting segment
    pub fn game_duration(&self) -> Duration {
        Duration::from_secs(
            self.segment_length_secs
                .saturating_mul(self.segment_count.saturating_add(1)),
        )
    }
}

/// Identities of the pool itself and of its collaborators
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollaboratorConfig {
    /// Address the game holds funds under
    pub pool_address: Address,
    /// Receives the interest when nobody wins
    pub owner: Address,
    /// Payment token
    pub asset: Address,
    pub lending_pool: Address,
    pub data_provider: Address,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            pool_address: Address::from("ghostpool"),
            owner: Address::from("owner"),
            asset: Address::from("dai"),
            lending_pool: Address::from("lending-pool"),
            data_provider: Address::from("data-provider"),
        }
    }
}

/// Snapshot persistence settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub snapshot_path: Option<String>,
    pub pretty: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            pretty: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// Emit log lines as JSON
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(ConfigurationError::InvalidValue {
                field: "logging.level".to_string(),
                value: s.to_string(),
                reason: "Expected one of error, warn, info, debug, trace".to_string(),
            }),
        }
    }
}

impl PoolConfig {
    /// Six weekly segments, 10% early withdrawal fee
    pub fn weekly() -> Self {
        Self::default()
    }

    /// Short segments and small payments for local runs and tests
    pub fn testing() -> Self {
        Self {
            game: GameConfig {
                segment_count: 6,
                segment_length_secs: 60,
                segment_payment: 10,
                early_withdrawal_fee: 10,
                referral_code: DEFAULT_REFERRAL_CODE,
                first_segment_start: Some(0),
            },
            logging: LoggingConfig {
                level: LogLevel::Debug,
                json: false,
            },
            ..Default::default()
        }
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let game = &self.game;
        if game.segment_count == 0 {
            return Err(invalid("game.segment_count", "0", "Segment count must be > 0"));
        }
        if game.segment_length_secs == 0 {
            return Err(invalid("game.segment_length_secs", "0", "Segment length must be > 0"));
        }
        if game.segment_payment == 0 {
            return Err(invalid("game.segment_payment", "0", "Segment payment must be > 0"));
        }
        if game.early_withdrawal_fee > 100 {
            return Err(invalid(
                "game.early_withdrawal_fee",
                &game.early_withdrawal_fee.to_string(),
                "Fee is a percentage between 0 and 100",
            ));
        }

        let c = &self.collaborators;
        for (field, address) in [
            ("collaborators.pool_address", &c.pool_address),
            ("collaborators.owner", &c.owner),
            ("collaborators.asset", &c.asset),
            ("collaborators.lending_pool", &c.lending_pool),
            ("collaborators.data_provider", &c.data_provider),
        ] {
            if address.is_empty() {
                return Err(ConfigurationError::MissingRequired(field.to_string()));
            }
        }
        if c.pool_address == c.owner {
            return Err(ConfigurationError::ValidationFailed(
                "The pool cannot be its own owner".to_string(),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Configuration loader with environment variable support
#[derive(Debug, Default)]
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

    /// Load from file (or defaults), apply environment overrides, then validate
    pub fn load(&self) -> PoolResult<PoolConfig> {
        let mut config = match self.config_path {
            Some(ref path) => Self::load_from_file(path)?,
            None => PoolConfig::default(),
        };

        Self::apply_env_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_file(path: &str) -> PoolResult<PoolConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)).into())
    }

    fn apply_env_overrides(config: &mut PoolConfig) -> PoolResult<()> {
        if let Some(count) = env_parse("GHOSTPOOL_SEGMENT_COUNT")? {
            config.game.segment_count = count;
        }
        if let Some(length) = env_parse("GHOSTPOOL_SEGMENT_LENGTH")? {
            config.game.segment_length_secs = length;
        }
        if let Some(payment) = env_parse("GHOSTPOOL_SEGMENT_PAYMENT")? {
            config.game.segment_payment = payment;
        }
        if let Some(fee) = env_parse("GHOSTPOOL_EARLY_WITHDRAWAL_FEE")? {
            config.game.early_withdrawal_fee = fee;
        }
        if let Ok(path) = env::var("GHOSTPOOL_SNAPSHOT_PATH") {
            config.storage.snapshot_path = Some(path);
        }
        if let Some(level) = env_parse("GHOSTPOOL_LOG_LEVEL")? {
            config.logging.level = level;
        }
        Ok(())
    }

    pub fn save(&self, config: &PoolConfig, path: &str) -> PoolResult<()> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to write to {}: {}", path, e)).into())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigurationError> {
    match env::var(key) {
        Ok(value) => value.parse().map(Some).map_err(|_| ConfigurationError::InvalidValue {
            field: key.to_string(),
            reason: "Could not parse value".to_string(),
            value,
        }),
        Err(_) => Ok(None),
    }
}

/// Write a default configuration file
pub fn generate_sample_config(path: &str) -> PoolResult<()> {
    ConfigLoader::new().save(&PoolConfig::default(), path)
}
