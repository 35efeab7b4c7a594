//! Distribution records, parameters and messages.

use super::{CODESPACE, ROUTE};
use crate::params::ParamSet;
use crate::types::msg::require_address;
use crate::types::MsgBasic;
use serde::{Deserialize, Serialize};
use shared_types::{Address, Dec, DecCoins, Height, TxError};

pub(crate) const CODE_NO_DIST_INFO: u32 = 103;
pub(crate) const CODE_NO_VALIDATOR: u32 = 104;

/// An accumulator of `weight × blocks`, brought forward lazily.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TotalAccum {
    pub update_height: Height,
    pub accum: Dec,
}

impl TotalAccum {
    pub fn new(height: Height) -> Self {
        Self {
            update_height: height,
            accum: Dec::zero(),
        }
    }

    /// Adds `weight` for every block since the last update.
    pub fn update(&mut self, height: Height, weight: Dec) {
        let blocks = height.saturating_sub(self.update_height);
        self.accum += weight.mul_int(u128::from(blocks));
        self.update_height = height;
    }
}

/// Global distribution state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FeePool {
    /// Sum of bonded power over blocks not yet claimed by any validator.
    pub total_val_accum: TotalAccum,
    /// Rewards owed to validators, claimed in proportion to their accum.
    pub val_pool: DecCoins,
    pub community_pool: DecCoins,
}

/// Per-validator distribution state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorDistInfo {
    pub operator: Address,
    pub fee_pool_withdrawal_height: Height,
    /// Sum of delegator shares over blocks not yet claimed by any delegator.
    pub del_accum: TotalAccum,
    pub del_pool: DecCoins,
    pub val_commission: DecCoins,
}

impl ValidatorDistInfo {
    pub fn new(operator: Address, height: Height) -> Self {
        Self {
            operator,
            fee_pool_withdrawal_height: height,
            del_accum: TotalAccum::new(height),
            del_pool: DecCoins::empty(),
            val_commission: DecCoins::empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationDistInfo {
    pub delegator: Address,
    pub validator: Address,
    pub del_pool_withdrawal_height: Height,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatorWithdrawInfo {
    pub delegator: Address,
    pub withdraw_addr: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistrParams {
    pub community_tax: Dec,
    pub base_proposer_reward: Dec,
    pub bonus_proposer_reward: Dec,
}

impl Default for DistrParams {
    fn default() -> Self {
        Self {
            community_tax: Dec::percent(2),
            base_proposer_reward: Dec::percent(1),
            bonus_proposer_reward: Dec::percent(4),
        }
    }
}

impl ParamSet for DistrParams {
    const SUBSPACE: &'static str = "distr";

    fn validate(&self) -> Result<(), String> {
        let total = self.community_tax + self.base_proposer_reward + self.bonus_proposer_reward;
        if total > Dec::one() {
            return Err(format!("community tax plus proposer rewards is {total}, above 1"));
        }
        Ok(())
    }
}

// =============================================================================
// MESSAGES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSetWithdrawAddress {
    pub delegator: Address,
    pub withdraw_addr: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgWithdrawDelegatorReward {
    pub delegator: Address,
    pub validator: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgWithdrawDelegatorRewardsAll {
    pub delegator: Address,
}

/// Withdraws the operator's self-delegation reward and its commission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgWithdrawValidatorRewardsAll {
    pub validator: Address,
}

impl MsgBasic for MsgSetWithdrawAddress {
    fn route(&self) -> &'static str {
        ROUTE
    }

    fn msg_type(&self) -> &'static str {
        "set_withdraw_address"
    }

    fn signers(&self) -> Vec<Address> {
        vec![self.delegator]
    }

    fn validate_basic(&self) -> Result<(), TxError> {
        require_address(&self.delegator, "delegator")?;
        require_address(&self.withdraw_addr, "withdraw address")
    }
}

impl MsgBasic for MsgWithdrawDelegatorReward {
    fn route(&self) -> &'static str {
        ROUTE
    }

    fn msg_type(&self) -> &'static str {
        "withdraw_delegation_reward"
    }

    fn signers(&self) -> Vec<Address> {
        vec![self.delegator]
    }

    fn validate_basic(&self) -> Result<(), TxError> {
        require_address(&self.delegator, "delegator")?;
        require_address(&self.validator, "validator")
    }
}

impl MsgBasic for MsgWithdrawDelegatorRewardsAll {
    fn route(&self) -> &'static str {
        ROUTE
    }

    fn msg_type(&self) -> &'static str {
        "withdraw_delegation_rewards_all"
    }

    fn signers(&self) -> Vec<Address> {
        vec![self.delegator]
    }

    fn validate_basic(&self) -> Result<(), TxError> {
        require_address(&self.delegator, "delegator")
    }
}

impl MsgBasic for MsgWithdrawValidatorRewardsAll {
    fn route(&self) -> &'static str {
        ROUTE
    }

    fn msg_type(&self) -> &'static str {
        "withdraw_validator_rewards_all"
    }

    fn signers(&self) -> Vec<Address> {
        vec![self.validator]
    }

    fn validate_basic(&self) -> Result<(), TxError> {
        require_address(&self.validator, "validator")
    }
}

pub(crate) fn no_dist_info(what: impl std::fmt::Display) -> TxError {
    TxError::module(CODESPACE, CODE_NO_DIST_INFO, format!("no distribution info for {what}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_accum_update() {
        let mut accum = TotalAccum::new(10);
        accum.update(15, Dec::from_int(3));
        assert_eq!(accum.accum, Dec::from_int(15));
        assert_eq!(accum.update_height, 15);
        accum.update(15, Dec::from_int(100));
        assert_eq!(accum.accum, Dec::from_int(15));
    }

    #[test]
    fn test_params_bound() {
        let mut params = DistrParams::default();
        assert!(params.validate().is_ok());
        params.community_tax = Dec::percent(96);
        assert!(params.validate().is_err());
    }
}
