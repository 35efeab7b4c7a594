//! # Development Genesis Builder
//!
//! Produces a genesis document for a local chain: funded accounts with
//! deterministic keys and one signed create-validator gentx per validator.
//! The same seed always yields the same document, so separate runs can
//! compare exports byte for byte.

use ed25519_dalek::SigningKey;
use hub_02_modules::staking::{Commission, Description, MsgCreateValidator, POWER_REDUCTION};
use hub_02_modules::{Msg, StdFee, StdTx};
use hub_03_protocol::{GenesisAccount, GenesisState};
use shared_types::{Address, Coin, Coins, Dec, PubKey};
use thiserror::Error;

/// Gas granted to each gentx.
const GENTX_GAS: u64 = 200_000;

#[derive(Debug, Error)]
pub enum GenesisError {
    #[error("invalid genesis configuration: {0}")]
    InvalidConfig(String),

    #[error("gentx encoding failed: {0}")]
    Encoding(String),
}

#[derive(Debug, Clone)]
pub struct GenesisConfig {
    pub chain_id: String,
    pub validators: u8,
    /// Bond-denom balance of every account.
    pub balance: u128,
    /// Part of the balance each validator bonds in its gentx.
    pub self_bond: u128,
    pub bond_denom: String,
    /// Protocol version the chain starts under.
    pub genesis_version: u64,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            chain_id: "hub-devnet".into(),
            validators: 1,
            balance: 1_000 * POWER_REDUCTION,
            self_bond: 100 * POWER_REDUCTION,
            bond_denom: "stake".into(),
            genesis_version: 0,
        }
    }
}

impl GenesisConfig {
    pub fn validate(&self) -> Result<(), GenesisError> {
        if self.validators == 0 {
            return Err(GenesisError::InvalidConfig("at least one validator is required".into()));
        }
        if self.self_bond < POWER_REDUCTION {
            return Err(GenesisError::InvalidConfig(format!(
                "self bond {} carries no voting power (minimum {POWER_REDUCTION})",
                self.self_bond
            )));
        }
        if self.self_bond > self.balance {
            return Err(GenesisError::InvalidConfig("self bond exceeds balance".into()));
        }
        Ok(())
    }
}

/// Key of development validator `index`.
pub fn dev_key(index: u8) -> SigningKey {
    SigningKey::from_bytes(&[index.wrapping_add(1); 32])
}

pub fn dev_address(index: u8) -> Address {
    PubKey(dev_key(index).verifying_key().to_bytes()).address()
}

pub struct GenesisBuilder {
    config: GenesisConfig,
}

impl GenesisBuilder {
    pub fn new(config: GenesisConfig) -> Self {
        Self { config }
    }

    pub fn build(&self) -> Result<GenesisState, GenesisError> {
        self.config.validate()?;
        let c = &self.config;
        let mut genesis = GenesisState::default();
        genesis.stake.params.bond_denom = c.bond_denom.clone();
        genesis.upgrade.genesis_version.upgrade_config.definition.version = c.genesis_version;
        genesis.upgrade.genesis_version.upgrade_config.definition.software = format!("hubd/v{}", c.genesis_version);

        for index in 0..c.validators {
            genesis.accounts.push(GenesisAccount {
                address: dev_address(index),
                coins: Coins::single(c.bond_denom.as_str(), c.balance),
                account_number: u64::from(index),
                sequence: 0,
            });
            genesis.gentxs.push(self.gentx(index)?);
        }
        // Every genesis token starts out loose; the gentxs bond part of it.
        genesis.stake.pool.loose_tokens = c.balance * u128::from(c.validators);
        Ok(genesis)
    }

    fn gentx(&self, index: u8) -> Result<StdTx, GenesisError> {
        let key = dev_key(index);
        let pub_key = PubKey(key.verifying_key().to_bytes());
        let msg = MsgCreateValidator {
            description: Description {
                moniker: format!("validator-{index}"),
                ..Default::default()
            },
            commission: Commission {
                rate: Dec::percent(10),
                max_rate: Dec::percent(20),
                max_change_rate: Dec::percent(1),
                update_height: 0,
            },
            operator: pub_key.address(),
            pub_key,
            delegation: Coin::new(self.config.bond_denom.as_str(), self.config.self_bond),
        };
        let mut tx = StdTx::new(vec![Msg::CreateValidator(msg)], StdFee::new(Coins::default(), GENTX_GAS), "");
        // Gentxs are signed before account numbers exist.
        tx.sign(&key, &self.config.chain_id, 0, 0);
        tx.validate_basic().map_err(|e| GenesisError::Encoding(e.to_string()))?;
        Ok(tx)
    }
}
