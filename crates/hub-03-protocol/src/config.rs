//! # Application Configuration
//!
//! Node-local settings of the application layer. None of them may change
//! the outcome of block execution on a correctly configured node: the
//! minimum gas price only gates mempool admission, and the invariant level
//! only decides what happens once a replica is already broken.

use hub_01_store::DEFAULT_KEEP_RECENT;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// What to do when the end-of-block invariant pass finds a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvariantLevel {
    /// Stop block processing with a fatal error.
    #[default]
    Halt,
    /// Log at `error` level and keep going.
    Warn,
    /// Skip the pass entirely.
    Off,
}

impl fmt::Display for InvariantLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Halt => "halt",
            Self::Warn => "warn",
            Self::Off => "off",
        })
    }
}

impl FromStr for InvariantLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "halt" => Ok(Self::Halt),
            "warn" => Ok(Self::Warn),
            "off" => Ok(Self::Off),
            other => Err(ConfigError::InvalidValue {
                key: "invariant_level",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}

/// Fewest committed versions a node may retain. The store prunes on commit
/// before the new height is published to queries, so the previously
/// published version must survive one prune.
pub const MIN_KEEP_RECENT: u64 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub invariant_level: InvariantLevel,
    /// Node-local floor on the gas price for mempool admission, on top of
    /// the chain's `auth` parameter.
    pub min_gas_price: u128,
    /// Committed versions retained for queries.
    pub keep_recent: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            invariant_level: InvariantLevel::Halt,
            min_gas_price: 0,
            keep_recent: DEFAULT_KEEP_RECENT,
        }
    }
}

impl AppConfig {
    /// Defaults overridden by `HUB_INVARIANT_LEVEL`, `HUB_MIN_GAS_PRICE` and
    /// `HUB_KEEP_RECENT`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(val) = std::env::var("HUB_INVARIANT_LEVEL") {
            config.invariant_level = val.parse()?;
        }
        if let Ok(val) = std::env::var("HUB_MIN_GAS_PRICE") {
            config.min_gas_price = val.parse().map_err(|_| ConfigError::InvalidValue {
                key: "min_gas_price",
                value: val.clone(),
            })?;
        }
        if let Ok(val) = std::env::var("HUB_KEEP_RECENT") {
            config.keep_recent = val.parse().map_err(|_| ConfigError::InvalidValue {
                key: "keep_recent",
                value: val.clone(),
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.keep_recent < MIN_KEEP_RECENT {
            return Err(ConfigError::InvalidValue {
                key: "keep_recent",
                value: self.keep_recent.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invariant_level_parsing() {
        assert_eq!("HALT".parse::<InvariantLevel>().unwrap(), InvariantLevel::Halt);
        assert_eq!("warn".parse::<InvariantLevel>().unwrap(), InvariantLevel::Warn);
        assert_eq!("off".parse::<InvariantLevel>().unwrap(), InvariantLevel::Off);
        assert!("sometimes".parse::<InvariantLevel>().is_err());
        assert_eq!(InvariantLevel::Warn.to_string(), "warn");
    }

    #[test]
    fn test_default_config_halts() {
        let config = AppConfig::default();
        assert_eq!(config.invariant_level, InvariantLevel::Halt);
        assert_eq!(config.keep_recent, DEFAULT_KEEP_RECENT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_keep_recent_must_outlive_one_prune() {
        let config = AppConfig {
            keep_recent: 1,
            ..AppConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                key: "keep_recent",
                value: "1".into(),
            })
        );
        let config = AppConfig {
            keep_recent: MIN_KEEP_RECENT,
            ..AppConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
