//! The closed set of messages a transaction may carry.

use crate::{bank, distribution, gov, guardian, record, service, slashing, staking, upgrade};
use serde::{Deserialize, Serialize};
use shared_types::{Address, TxError};

/// Stateless facts every message exposes.
pub trait MsgBasic {
    /// Route the message is dispatched on.
    fn route(&self) -> &'static str;

    /// Value of the `action` tag.
    fn msg_type(&self) -> &'static str;

    /// Accounts that must sign, in order.
    fn signers(&self) -> Vec<Address>;

    fn validate_basic(&self) -> Result<(), TxError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Msg {
    Send(bank::MsgSend),
    CreateValidator(staking::MsgCreateValidator),
    EditValidator(staking::MsgEditValidator),
    Delegate(staking::MsgDelegate),
    BeginUnbonding(staking::MsgBeginUnbonding),
    BeginRedelegate(staking::MsgBeginRedelegate),
    Unjail(slashing::MsgUnjail),
    SetWithdrawAddress(distribution::MsgSetWithdrawAddress),
    WithdrawDelegatorReward(distribution::MsgWithdrawDelegatorReward),
    WithdrawDelegatorRewardsAll(distribution::MsgWithdrawDelegatorRewardsAll),
    WithdrawValidatorRewardsAll(distribution::MsgWithdrawValidatorRewardsAll),
    SubmitProposal(gov::MsgSubmitProposal),
    Deposit(gov::MsgDeposit),
    Vote(gov::MsgVote),
    SvcDefine(service::MsgSvcDefine),
    SvcBind(service::MsgSvcBind),
    SvcUnbind(service::MsgSvcUnbind),
    SvcCall(service::MsgSvcCall),
    SvcRespond(service::MsgSvcRespond),
    AddProfiler(guardian::MsgAddProfiler),
    DeleteProfiler(guardian::MsgDeleteProfiler),
    AddTrustee(guardian::MsgAddTrustee),
    DeleteTrustee(guardian::MsgDeleteTrustee),
    UpgradeSignal(upgrade::MsgUpgradeSignal),
    SubmitRecord(record::MsgSubmitRecord),
}

impl Msg {
    fn basic(&self) -> &dyn MsgBasic {
        match self {
            Msg::Send(m) => m,
            Msg::CreateValidator(m) => m,
            Msg::EditValidator(m) => m,
            Msg::Delegate(m) => m,
            Msg::BeginUnbonding(m) => m,
            Msg::BeginRedelegate(m) => m,
            Msg::Unjail(m) => m,
            Msg::SetWithdrawAddress(m) => m,
            Msg::WithdrawDelegatorReward(m) => m,
            Msg::WithdrawDelegatorRewardsAll(m) => m,
            Msg::WithdrawValidatorRewardsAll(m) => m,
            Msg::SubmitProposal(m) => m,
            Msg::Deposit(m) => m,
            Msg::Vote(m) => m,
            Msg::SvcDefine(m) => m,
            Msg::SvcBind(m) => m,
            Msg::SvcUnbind(m) => m,
            Msg::SvcCall(m) => m,
            Msg::SvcRespond(m) => m,
            Msg::AddProfiler(m) => m,
            Msg::DeleteProfiler(m) => m,
            Msg::AddTrustee(m) => m,
            Msg::DeleteTrustee(m) => m,
            Msg::UpgradeSignal(m) => m,
            Msg::SubmitRecord(m) => m,
        }
    }

    pub fn route(&self) -> &'static str {
        self.basic().route()
    }

    pub fn msg_type(&self) -> &'static str {
        self.basic().msg_type()
    }

    pub fn signers(&self) -> Vec<Address> {
        self.basic().signers()
    }

    pub fn validate_basic(&self) -> Result<(), TxError> {
        self.basic().validate_basic()
    }
}

/// Rejects an empty (all-zero) address field.
pub(crate) fn require_address(addr: &Address, field: &str) -> Result<(), TxError> {
    if addr.is_empty() {
        Err(TxError::InvalidMsg(format!("{field} address is empty")))
    } else {
        Ok(())
    }
}
