use super::{CODESPACE, ROUTE};
use crate::params::ParamSet;
use crate::types::msg::require_address;
use crate::types::MsgBasic;
use serde::{Deserialize, Serialize};
use shared_types::{Address, Dec, ProtocolDefinition, TxError};

pub(crate) const CODE_NO_UPGRADE_IN_PROGRESS: u32 = 100;
pub(crate) const CODE_WRONG_VERSION: u32 = 101;
pub(crate) const CODE_NOT_BONDED: u32 = 102;
pub(crate) const CODE_DUPLICATE_SIGNAL: u32 = 103;

/// A protocol version scheduled by a passed software-upgrade proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UpgradeConfig {
    pub proposal_id: u64,
    pub definition: ProtocolDefinition,
}

/// One entry of the version history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AppVersion {
    pub upgrade_config: UpgradeConfig,
    pub success: bool,
}

impl AppVersion {
    pub fn new(upgrade_config: UpgradeConfig, success: bool) -> Self {
        Self {
            upgrade_config,
            success,
        }
    }

    pub fn version(&self) -> u64 {
        self.upgrade_config.definition.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeParams {
    /// Share of bonded power that must signal before the switch height.
    pub threshold: Dec,
}

impl Default for UpgradeParams {
    fn default() -> Self {
        Self {
            threshold: Dec::percent(80),
        }
    }
}

impl ParamSet for UpgradeParams {
    const SUBSPACE: &'static str = "upgrade";

    fn validate(&self) -> Result<(), String> {
        if self.threshold.is_zero() || self.threshold > Dec::one() {
            return Err("threshold must be in (0, 1]".into());
        }
        Ok(())
    }
}

/// Answer of the `info` query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeInfo {
    pub current_version: u64,
    pub last_failed_version: Option<u64>,
    pub upgrade_in_progress: Option<UpgradeConfig>,
}

/// Result of the end-block tally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeOutcome {
    /// No upgrade reached its switch height this block.
    Pending,
    /// Enough power signalled; the definition governs from the next block.
    Switched(ProtocolDefinition),
    Failed(ProtocolDefinition),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgUpgradeSignal {
    /// Operator address of a bonded validator.
    pub validator: Address,
    pub version: u64,
}

impl MsgBasic for MsgUpgradeSignal {
    fn route(&self) -> &'static str {
        ROUTE
    }

    fn msg_type(&self) -> &'static str {
        "upgrade-signal"
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
