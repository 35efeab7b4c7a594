//! # Node Configuration
//!
//! Defaults, then `HUB_*` environment variables, then command-line flags.
//! The application settings (`HUB_INVARIANT_LEVEL`, `HUB_MIN_GAS_PRICE`,
//! `HUB_KEEP_RECENT`) are read by [`AppConfig::from_env`].

use hub_03_protocol::{AppConfig, ConfigError as AppConfigError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    App(#[from] AppConfigError),

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}

/// Complete node configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub chain_id: String,
    /// Genesis document to start from. A development genesis is generated
    /// when absent.
    pub genesis_path: Option<PathBuf>,
    /// Validators in a generated development genesis.
    pub dev_validators: u8,
    pub block_interval_ms: u64,
    /// Blocks to produce before stopping. Zero runs until Ctrl+C.
    pub blocks: u64,
    /// Where to write the exported state on shutdown.
    pub export_path: Option<PathBuf>,
    pub zero_height: bool,
    /// Fallback filter when `RUST_LOG` is unset.
    pub log_level: String,
    pub app: AppConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            chain_id: "hub-devnet".into(),
            genesis_path: None,
            dev_validators: 1,
            block_interval_ms: 1_000,
            blocks: 0,
            export_path: None,
            zero_height: false,
            log_level: "info".into(),
            app: AppConfig::default(),
        }
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value })
}

impl NodeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self {
            app: AppConfig::from_env()?,
            ..Self::default()
        };
        if let Ok(val) = std::env::var("HUB_CHAIN_ID") {
            config.chain_id = val;
        }
        if let Ok(val) = std::env::var("HUB_GENESIS") {
            config.genesis_path = Some(PathBuf::from(val));
        }
        if let Ok(val) = std::env::var("HUB_DEV_VALIDATORS") {
            config.dev_validators = parse("dev_validators", val)?;
        }
        if let Ok(val) = std::env::var("HUB_BLOCK_INTERVAL_MS") {
            config.block_interval_ms = parse("block_interval_ms", val)?;
        }
        if let Ok(val) = std::env::var("HUB_BLOCKS") {
            config.blocks = parse("blocks", val)?;
        }
        if let Ok(val) = std::env::var("HUB_EXPORT") {
            config.export_path = Some(PathBuf::from(val));
        }
        if let Ok(val) = std::env::var("HUB_ZERO_HEIGHT") {
            config.zero_height = parse("zero_height", val)?;
        }
        if let Ok(val) = std::env::var("HUB_LOG") {
            config.log_level = val;
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.app.validate()?;
        if self.chain_id.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "chain_id",
                value: self.chain_id.clone(),
            });
        }
        if self.genesis_path.is_none() && self.dev_validators == 0 {
            return Err(ConfigError::InvalidValue {
                key: "dev_validators",
                value: "0".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = NodeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.blocks, 0);
        assert!(!config.zero_height);
    }

    #[test]
    fn test_generated_genesis_needs_a_validator() {
        let config = NodeConfig {
            dev_validators: 0,
            ..NodeConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { key: "dev_validators", .. })
        ));
    }

    #[test]
    fn test_parse_reports_key() {
        let err = parse::<u64>("blocks", "many".into()).unwrap_err();
        assert_eq!(err.to_string(), "invalid value \"many\" for blocks");
    }
}
