//! Staking entities, parameters and messages.

use super::CODESPACE;
use crate::params::ParamSet;
use crate::types::msg::require_address;
use crate::types::{MsgBasic, DEFAULT_BOND_DENOM};
use serde::{Deserialize, Serialize};
use shared_types::{Address, Coin, Dec, Height, PubKey, TxError, ValidatorUpdate};

/// Tokens per unit of consensus voting power.
pub const POWER_REDUCTION: u128 = 1_000_000;

pub fn tokens_to_power(tokens: u128) -> u64 {
    u64::try_from(tokens / POWER_REDUCTION).unwrap_or(u64::MAX)
}

pub fn power_to_tokens(power: u64) -> u128 {
    u128::from(power) * POWER_REDUCTION
}

pub(crate) const CODE_INVALID_VALIDATOR: u32 = 101;
pub(crate) const CODE_VALIDATOR_EXISTS: u32 = 102;
pub(crate) const CODE_NO_VALIDATOR: u32 = 103;
pub(crate) const CODE_BAD_DENOM: u32 = 104;
pub(crate) const CODE_NO_DELEGATION: u32 = 105;
pub(crate) const CODE_INSUFFICIENT_SHARES: u32 = 106;
pub(crate) const CODE_UNBONDING_EXISTS: u32 = 107;
pub(crate) const CODE_REDELEGATION_EXISTS: u32 = 108;
pub(crate) const CODE_BAD_COMMISSION: u32 = 109;
pub(crate) const CODE_NOT_JAILED: u32 = 110;
pub(crate) const CODE_SELF_REDELEGATION: u32 = 111;
pub(crate) const CODE_VALIDATOR_SLASHED_OUT: u32 = 112;

// =============================================================================
// ENTITIES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BondStatus {
    Unbonded,
    Unbonding,
    Bonded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Description {
    pub moniker: String,
    #[serde(default)]
    pub identity: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub details: String,
}

impl Description {
    pub fn validate(&self) -> Result<(), TxError> {
        if self.moniker.trim().is_empty() {
            return Err(TxError::module(CODESPACE, CODE_INVALID_VALIDATOR, "moniker is required"));
        }
        let limits = [
            (&self.moniker, 70, "moniker"),
            (&self.identity, 3000, "identity"),
            (&self.website, 140, "website"),
            (&self.details, 280, "details"),
        ];
        for (value, max, field) in limits {
            if value.len() > max {
                return Err(TxError::module(
                    CODESPACE,
                    CODE_INVALID_VALIDATOR,
                    format!("{field} longer than {max} bytes"),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Commission {
    pub rate: Dec,
    pub max_rate: Dec,
    pub max_change_rate: Dec,
    pub update_height: Height,
}

impl Commission {
    pub fn validate(&self) -> Result<(), TxError> {
        let bad = |msg: &str| Err(TxError::module(CODESPACE, CODE_BAD_COMMISSION, msg));
        if self.max_rate > Dec::one() {
            return bad("max rate above 1");
        }
        if self.rate > self.max_rate {
            return bad("rate above max rate");
        }
        if self.max_change_rate > self.max_rate {
            return bad("max change rate above max rate");
        }
        Ok(())
    }

    /// Checks a rate change against the bounds fixed at creation.
    pub fn validate_change(&self, new_rate: Dec) -> Result<(), TxError> {
        let delta = if new_rate >= self.rate {
            new_rate.saturating_sub(self.rate)
        } else {
            self.rate.saturating_sub(new_rate)
        };
        if new_rate > self.max_rate {
            return Err(TxError::module(CODESPACE, CODE_BAD_COMMISSION, "rate above max rate"));
        }
        if delta > self.max_change_rate {
            return Err(TxError::module(CODESPACE, CODE_BAD_COMMISSION, "rate change above max change rate"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub operator: Address,
    pub cons_pubkey: PubKey,
    pub jailed: bool,
    pub status: BondStatus,
    pub tokens: u128,
    pub delegator_shares: Dec,
    pub description: Description,
    pub bond_height: Height,
    pub unbonding_height: Height,
    /// Height at which an unbonding validator becomes unbonded.
    pub unbonding_min_height: Height,
    pub commission: Commission,
}

impl Validator {
    pub fn new(operator: Address, cons_pubkey: PubKey, description: Description, commission: Commission) -> Self {
        Self {
            operator,
            cons_pubkey,
            jailed: false,
            status: BondStatus::Unbonded,
            tokens: 0,
            delegator_shares: Dec::zero(),
            description,
            bond_height: 0,
            unbonding_height: 0,
            unbonding_min_height: 0,
            commission,
        }
    }

    pub fn cons_address(&self) -> Address {
        self.cons_pubkey.address()
    }

    pub fn is_bonded(&self) -> bool {
        self.status == BondStatus::Bonded
    }

    /// Power this validator would have if it were in the active set.
    pub fn potential_power(&self) -> u64 {
        tokens_to_power(self.tokens)
    }

    pub fn power(&self) -> u64 {
        if self.is_bonded() {
            self.potential_power()
        } else {
            0
        }
    }

    /// Shares minted for `amount` new tokens. `None` once every token has
    /// been slashed away while shares remain.
    pub fn shares_for_tokens(&self, amount: u128) -> Option<Dec> {
        if self.delegator_shares.is_zero() {
            return Some(Dec::from_int(amount));
        }
        if self.tokens == 0 {
            return None;
        }
        Some(
            self.delegator_shares
                .mul_ratio(Dec::from_int(amount), Dec::from_int(self.tokens)),
        )
    }

    pub fn tokens_for_shares(&self, shares: Dec) -> Dec {
        Dec::from_int(self.tokens).mul_ratio(shares, self.delegator_shares)
    }

    pub fn abci_update(&self) -> ValidatorUpdate {
        ValidatorUpdate {
            pub_key: self.cons_pubkey,
            power: self.power(),
        }
    }

    pub fn abci_update_zero(&self) -> ValidatorUpdate {
        ValidatorUpdate {
            pub_key: self.cons_pubkey,
            power: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    pub delegator: Address,
    pub validator: Address,
    pub shares: Dec,
    pub height: Height,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbondingDelegation {
    pub delegator: Address,
    pub validator: Address,
    pub creation_height: Height,
    pub min_height: Height,
    pub initial_balance: u128,
    pub balance: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redelegation {
    pub delegator: Address,
    pub src: Address,
    pub dst: Address,
    pub creation_height: Height,
    pub min_height: Height,
    pub initial_balance: u128,
    pub balance: u128,
    pub shares_src: Dec,
    pub shares_dst: Dec,
}

/// Bond-denom supply split by bonding state. Loose tokens are everything
/// not backing a bonded validator: account balances, unbonded validators,
/// unbonding delegations, collected fees and distribution pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Pool {
    pub loose_tokens: u128,
    pub bonded_tokens: u128,
}

impl Pool {
    pub fn total_supply(&self) -> u128 {
        self.loose_tokens + self.bonded_tokens
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingParams {
    /// Blocks between unbonding start and payout.
    pub unbonding_period: u64,
    pub max_validators: u16,
    pub bond_denom: String,
}

impl Default for StakingParams {
    fn default() -> Self {
        Self {
            unbonding_period: 1_000,
            max_validators: 100,
            bond_denom: DEFAULT_BOND_DENOM.to_string(),
        }
    }
}

impl ParamSet for StakingParams {
    const SUBSPACE: &'static str = "stake";

    fn validate(&self) -> Result<(), String> {
        if self.max_validators == 0 {
            return Err("max_validators must be positive".into());
        }
        if self.bond_denom.is_empty() {
            return Err("bond_denom must be set".into());
        }
        Ok(())
    }
}

// =============================================================================
// MESSAGES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgCreateValidator {
    pub description: Description,
    pub commission: Commission,
    pub operator: Address,
    pub pub_key: PubKey,
    pub delegation: Coin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgEditValidator {
    pub operator: Address,
    pub description: Option<Description>,
    pub commission_rate: Option<Dec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgDelegate {
    pub delegator: Address,
    pub validator: Address,
    pub amount: Coin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgBeginUnbonding {
    pub delegator: Address,
    pub validator: Address,
    pub shares: Dec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgBeginRedelegate {
    pub delegator: Address,
    pub src: Address,
    pub dst: Address,
    pub shares: Dec,
}

fn positive_coin(coin: &Coin) -> Result<(), TxError> {
    if coin.amount == 0 {
        return Err(TxError::InvalidCoins("amount must be positive".into()));
    }
    shared_types::Coins::from(coin.clone())
        .validate()
        .map_err(TxError::InvalidCoins)
}

fn positive_shares(shares: Dec) -> Result<(), TxError> {
    if shares.is_zero() {
        return Err(TxError::module(CODESPACE, CODE_INSUFFICIENT_SHARES, "shares must be positive"));
    }
    Ok(())
}

impl MsgBasic for MsgCreateValidator {
    fn route(&self) -> &'static str {
        super::ROUTE
    }

    fn msg_type(&self) -> &'static str {
        "create_validator"
    }

    fn signers(&self) -> Vec<Address> {
        vec![self.operator]
    }

    fn validate_basic(&self) -> Result<(), TxError> {
        require_address(&self.operator, "operator")?;
        self.description.validate()?;
        self.commission.validate()?;
        positive_coin(&self.delegation)
    }
}

impl MsgBasic for MsgEditValidator {
    fn route(&self) -> &'static str {
        super::ROUTE
    }

    fn msg_type(&self) -> &'static str {
        "edit_validator"
    }

    fn signers(&self) -> Vec<Address> {
        vec![self.operator]
    }

    fn validate_basic(&self) -> Result<(), TxError> {
        require_address(&self.operator, "operator")?;
        if let Some(description) = &self.description {
            description.validate()?;
        }
        if self.description.is_none() && self.commission_rate.is_none() {
            return Err(TxError::InvalidMsg("nothing to edit".into()));
        }
        Ok(())
    }
}

impl MsgBasic for MsgDelegate {
    fn route(&self) -> &'static str {
        super::ROUTE
    }

    fn msg_type(&self) -> &'static str {
        "delegate"
    }

    fn signers(&self) -> Vec<Address> {
        vec![self.delegator]
    }

    fn validate_basic(&self) -> Result<(), TxError> {
        require_address(&self.delegator, "delegator")?;
        require_address(&self.validator, "validator")?;
        positive_coin(&self.amount)
    }
}

impl MsgBasic for MsgBeginUnbonding {
    fn route(&self) -> &'static str {
        super::ROUTE
    }

    fn msg_type(&self) -> &'static str {
        "begin_unbonding"
    }

    fn signers(&self) -> Vec<Address> {
        vec![self.delegator]
    }

    fn validate_basic(&self) -> Result<(), TxError> {
        require_address(&self.delegator, "delegator")?;
        require_address(&self.validator, "validator")?;
        positive_shares(self.shares)
    }
}

impl MsgBasic for MsgBeginRedelegate {
    fn route(&self) -> &'static str {
        super::ROUTE
    }

    fn msg_type(&self) -> &'static str {
        "begin_redelegate"
    }

    fn signers(&self) -> Vec<Address> {
        vec![self.delegator]
    }

    fn validate_basic(&self) -> Result<(), TxError> {
        require_address(&self.delegator, "delegator")?;
        require_address(&self.src, "source validator")?;
        require_address(&self.dst, "destination validator")?;
        if self.src == self.dst {
            return Err(TxError::module(CODESPACE, CODE_SELF_REDELEGATION, "cannot redelegate to the same validator"));
        }
        positive_shares(self.shares)
    }
}
