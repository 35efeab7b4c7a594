use super::{CODESPACE, ROUTE};
use crate::params::ParamSet;
use crate::types::msg::require_address;
use crate::types::MsgBasic;
use serde::{Deserialize, Serialize};
use shared_types::{Address, Dec, Height, TxError};

pub(crate) const CODE_NO_VALIDATOR: u32 = 101;
pub(crate) const CODE_MISSING_SELF_DELEGATION: u32 = 102;
pub(crate) const CODE_JAIL_PERIOD_NOT_OVER: u32 = 103;
pub(crate) const CODE_NO_SIGNING_INFO: u32 = 104;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ValidatorSigningInfo {
    /// Height at which the validator first bonded.
    pub start_height: Height,
    /// Position in the missed-block window, incremented every block.
    pub index_offset: u64,
    /// The validator may unjail from this height on.
    pub jailed_until: Height,
    pub missed_blocks_counter: u64,
}

/// A continuous bonded stretch of one validator. Double-sign slashes inside
/// one period are capped at the largest single fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashingPeriod {
    pub validator: Address,
    pub start_height: Height,
    /// Zero while the period is open.
    pub end_height: Height,
    pub slashed_so_far: Dec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashingParams {
    /// Evidence older than this many blocks is ignored.
    pub max_evidence_age: u64,
    pub signed_blocks_window: u64,
    pub min_signed_per_window: Dec,
    pub downtime_jail_duration: u64,
    pub double_sign_jail_duration: u64,
    pub slash_fraction_double_sign: Dec,
    pub slash_fraction_downtime: Dec,
}

impl Default for SlashingParams {
    fn default() -> Self {
        Self {
            max_evidence_age: 100_000,
            signed_blocks_window: 100,
            min_signed_per_window: Dec::percent(50),
            downtime_jail_duration: 100,
            double_sign_jail_duration: 1_000_000,
            slash_fraction_double_sign: Dec::percent(5),
            slash_fraction_downtime: Dec::percent(1),
        }
    }
}

impl SlashingParams {
    /// Misses tolerated inside one window.
    pub fn max_missed_blocks(&self) -> u64 {
        let must_sign = Dec::from_int(u128::from(self.signed_blocks_window))
            .mul(self.min_signed_per_window)
            .truncate();
        self.signed_blocks_window
            .saturating_sub(u64::try_from(must_sign).unwrap_or(u64::MAX))
    }
}

impl ParamSet for SlashingParams {
    const SUBSPACE: &'static str = "slashing";

    fn validate(&self) -> Result<(), String> {
        if self.signed_blocks_window == 0 {
            return Err("signed_blocks_window must be positive".into());
        }
        for (name, value) in [
            ("min_signed_per_window", self.min_signed_per_window),
            ("slash_fraction_double_sign", self.slash_fraction_double_sign),
            ("slash_fraction_downtime", self.slash_fraction_downtime),
        ] {
            if value > Dec::one() {
                return Err(format!("{name} above 1"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgUnjail {
    /// Operator address of the jailed validator.
    pub validator: Address,
}

impl MsgBasic for MsgUnjail {
    fn route(&self) -> &'static str {
        ROUTE
    }

    fn msg_type(&self) -> &'static str {
        "unjail"
    }

    fn signers(&self) -> Vec<Address> {
        vec![self.validator]
    }

    fn validate_basic(&self) -> Result<(), TxError> {
        require_address(&self.validator, "validator")
    }
}

pub(crate) fn err(code: u32, msg: impl Into<String>) -> TxError {
    TxError::module(CODESPACE, code, msg)
}
