//! # Block Lifecycle Messages
//!
//! Requests the consensus engine issues to the application and the responses
//! it reads back. Only the fields the application consumes are modelled.

use crate::entities::{BlockHeader, Evidence, Height, ValidatorUpdate, VoteInfo};
use crate::tags::Tags;
use serde::{Deserialize, Serialize};

/// Result code of a successful transaction.
pub const CODE_OK: u32 = 0;

#[derive(Debug, Clone, Default)]
pub struct RequestInitChain {
    pub chain_id: String,
    /// Genesis time, unix seconds.
    pub time: u64,
    /// Validator set the consensus engine was configured with. Empty means
    /// the application decides.
    pub validators: Vec<ValidatorUpdate>,
    pub app_state_bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseInitChain {
    pub validators: Vec<ValidatorUpdate>,
}

#[derive(Debug, Clone, Default)]
pub struct RequestBeginBlock {
    pub header: BlockHeader,
    pub last_commit_votes: Vec<VoteInfo>,
    pub byzantine_validators: Vec<Evidence>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseBeginBlock {
    pub tags: Tags,
}

/// Outcome of `check_tx` or `deliver_tx`. A non-zero `code` is a
/// transaction-scoped failure described by `codespace` and `log`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseTx {
    pub code: u32,
    pub codespace: String,
    pub log: String,
    pub data: Vec<u8>,
    pub gas_wanted: u64,
    pub gas_used: u64,
    pub tags: Tags,
}

impl ResponseTx {
    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RequestEndBlock {
    pub height: Height,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseEndBlock {
    pub validator_updates: Vec<ValidatorUpdate>,
    pub tags: Tags,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseCommit {
    pub height: Height,
    pub app_hash: [u8; 32],
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseInfo {
    pub last_block_height: Height,
    pub last_block_app_hash: [u8; 32],
    pub app_version: u64,
}

#[derive(Debug, Clone, Default)]
pub struct RequestQuery {
    pub path: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseQuery {
    pub code: u32,
    pub codespace: String,
    pub log: String,
    pub value: Vec<u8>,
    /// Height of the committed state the answer was read from.
    pub height: Height,
}
