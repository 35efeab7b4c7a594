use super::{CODESPACE, ROUTE};
use crate::params::ParamSet;
use crate::staking::POWER_REDUCTION;
use crate::types::msg::require_address;
use crate::types::{MsgBasic, DEFAULT_BOND_DENOM};
use serde::{Deserialize, Serialize};
use shared_types::{Address, Coins, Dec, Height, ProtocolDefinition, TxError};

pub(crate) const CODE_UNKNOWN_PROPOSAL: u32 = 100;
pub(crate) const CODE_INACTIVE_PROPOSAL: u32 = 101;
pub(crate) const CODE_INVALID_CONTENT: u32 = 102;
pub(crate) const CODE_NOT_A_VOTER: u32 = 103;
pub(crate) const CODE_NOT_PROFILER: u32 = 104;
pub(crate) const CODE_UPGRADE_CONFLICT: u32 = 105;
pub(crate) const CODE_INVALID_TITLE: u32 = 106;

const MAX_TITLE_LEN: usize = 140;
const MAX_DESCRIPTION_LEN: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    DepositPeriod,
    VotingPeriod,
    Passed,
    Rejected,
}

impl ProposalStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Passed | Self::Rejected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteOption {
    Yes,
    Abstain,
    No,
    NoWithVeto,
}

/// One field of one parameter subspace. `value` is the JSON text of the new
/// field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamChange {
    pub subspace: String,
    pub key: String,
    pub value: String,
}

impl ParamChange {
    pub fn json_value(&self) -> Result<serde_json::Value, TxError> {
        serde_json::from_str(&self.value).map_err(|e| {
            TxError::module(
                CODESPACE,
                CODE_INVALID_CONTENT,
                format!("{}/{} is not valid JSON: {e}", self.subspace, self.key),
            )
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalContent {
    Text,
    ParameterChange(Vec<ParamChange>),
    /// Schedules the given protocol; only profilers may propose it.
    SoftwareUpgrade(ProtocolDefinition),
}

impl ProposalContent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::ParameterChange(_) => "parameter_change",
            Self::SoftwareUpgrade(_) => "software_upgrade",
        }
    }
}

/// Bonded power cast per option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TallyResult {
    pub yes: u64,
    pub abstain: u64,
    pub no: u64,
    pub no_with_veto: u64,
}

impl TallyResult {
    pub fn total(&self) -> u64 {
        self.yes + self.abstain + self.no + self.no_with_veto
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub content: ProposalContent,
    pub proposer: Address,
    pub status: ProposalStatus,
    pub tally_result: TallyResult,
    pub submit_height: Height,
    pub deposit_end_height: Height,
    pub total_deposit: Coins,
    pub voting_start_height: Height,
    pub voting_end_height: Height,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub proposal_id: u64,
    pub depositor: Address,
    pub amount: Coins,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub proposal_id: u64,
    /// Operator address of a bonded validator.
    pub voter: Address,
    pub option: VoteOption,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovParams {
    pub min_deposit: Coins,
    /// Blocks a proposal may wait for its minimum deposit.
    pub max_deposit_period: u64,
    /// Blocks between activation and tally.
    pub voting_period: u64,
    /// Share of bonded power that must vote.
    pub participation: Dec,
    /// Share of non-abstaining power that must vote yes.
    pub threshold: Dec,
    /// Share of voting power whose veto rejects and burns deposits.
    pub veto: Dec,
}

impl Default for GovParams {
    fn default() -> Self {
        Self {
            min_deposit: Coins::single(DEFAULT_BOND_DENOM, 10 * POWER_REDUCTION),
            max_deposit_period: 100,
            voting_period: 100,
            participation: Dec::from_ratio(667, 1000),
            threshold: Dec::percent(50),
            veto: Dec::from_ratio(334, 1000),
        }
    }
}

impl ParamSet for GovParams {
    const SUBSPACE: &'static str = "gov";

    fn validate(&self) -> Result<(), String> {
        self.min_deposit.validate()?;
        if self.max_deposit_period == 0 || self.voting_period == 0 {
            return Err("deposit and voting periods must be positive".into());
        }
        for (name, value) in [
            ("participation", self.participation),
            ("threshold", self.threshold),
            ("veto", self.veto),
        ] {
            if value.is_zero() || value > Dec::one() {
                return Err(format!("{name} must be in (0, 1]"));
            }
        }
        Ok(())
    }
}

// =============================================================================
// MESSAGES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSubmitProposal {
    pub title: String,
    pub description: String,
    pub content: ProposalContent,
    pub proposer: Address,
    pub initial_deposit: Coins,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgDeposit {
    pub proposal_id: u64,
    pub depositor: Address,
    pub amount: Coins,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgVote {
    pub proposal_id: u64,
    pub voter: Address,
    pub option: VoteOption,
}

impl MsgBasic for MsgSubmitProposal {
    fn route(&self) -> &'static str {
        ROUTE
    }

    fn msg_type(&self) -> &'static str {
        "submit-proposal"
    }

    fn signers(&self) -> Vec<Address> {
        vec![self.proposer]
    }

    fn validate_basic(&self) -> Result<(), TxError> {
        require_address(&self.proposer, "proposer")?;
        if self.title.trim().is_empty() || self.title.len() > MAX_TITLE_LEN {
            return Err(err(CODE_INVALID_TITLE, format!("title must be 1-{MAX_TITLE_LEN} bytes")));
        }
        if self.description.len() > MAX_DESCRIPTION_LEN {
            return Err(err(
                CODE_INVALID_TITLE,
                format!("description exceeds {MAX_DESCRIPTION_LEN} bytes"),
            ));
        }
        self.initial_deposit.validate().map_err(TxError::InvalidCoins)?;
        match &self.content {
            ProposalContent::Text => Ok(()),
            ProposalContent::ParameterChange(changes) => {
                if changes.is_empty() {
                    return Err(err(CODE_INVALID_CONTENT, "parameter change lists no parameters"));
                }
                for change in changes {
                    change.json_value()?;
                }
                Ok(())
            }
            ProposalContent::SoftwareUpgrade(def) => {
                if def.version == 0 || def.software.trim().is_empty() {
                    return Err(err(CODE_INVALID_CONTENT, "software upgrade needs a version and a software locator"));
                }
                Ok(())
            }
        }
    }
}

impl MsgBasic for MsgDeposit {
    fn route(&self) -> &'static str {
        ROUTE
    }

    fn msg_type(&self) -> &'static str {
        "deposit"
    }

    fn signers(&self) -> Vec<Address> {
        vec![self.depositor]
    }

    fn validate_basic(&self) -> Result<(), TxError> {
        require_address(&self.depositor, "depositor")?;
        if self.amount.is_empty() {
            return Err(TxError::InvalidCoins("deposit is empty".into()));
        }
        self.amount.validate().map_err(TxError::InvalidCoins)
    }
}

impl MsgBasic for MsgVote {
    fn route(&self) -> &'static str {
        ROUTE
    }

    fn msg_type(&self) -> &'static str {
        "vote"
    }

    fn signers(&self) -> Vec<Address> {
        vec![self.voter]
    }

    fn validate_basic(&self) -> Result<(), TxError> {
        require_address(&self.voter, "voter")
    }
}

pub(crate) fn err(code: u32, msg: impl Into<String>) -> TxError {
    TxError::module(CODESPACE, code, msg)
}
