//! # Error Types
//!
//! Two disjoint severities.
//!
//! - [`FatalError`]: any condition that would make replicas diverge if handled
//!   differently. Block processing stops.
//! - [`TxError`]: rejection of one transaction. The block continues and the
//!   failure is reported as a result code.
//!
//! Keeper code returns [`HubError`], the union of both, so a business-rule
//! rejection and a corrupted store can flow through the same `?` chain
//! without ever being confused for one another.

use thiserror::Error;

/// Codespace of errors raised outside any module.
pub const ROOT_CODESPACE: &str = "sdk";

/// Process-halting conditions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalError {
    #[error("duplicate route registered: {0}")]
    DuplicateRoute(String),

    #[error("duplicate query route registered: {0}")]
    DuplicateQueryRoute(String),

    #[error("keeper {module} depends on {dependency}, which is not part of the keeper set")]
    MissingKeeperDependency { module: String, dependency: String },

    #[error("protocol requires keeper {0}, which was not constructed")]
    MissingKeeper(String),

    #[error("store key {0} is not mounted")]
    UnmountedStore(String),

    #[error("invariant {name} broken: {detail}")]
    InvariantBroken { name: String, detail: String },

    #[error("fee pool validator balance is not zero after settlement: {0}")]
    NonZeroFeePool(String),

    #[error("validator set mismatch at genesis: {0}")]
    ValidatorSetMismatch(String),

    #[error("malformed genesis: {0}")]
    MalformedGenesis(String),

    #[error("genesis transaction rejected: {0}")]
    GenesisTxFailed(String),

    #[error("store corruption: {0}")]
    StoreCorruption(String),

    #[error("unknown protocol version {0}")]
    UnknownProtocolVersion(u64),

    #[error("protocol version {0} registered twice")]
    DuplicateProtocolVersion(u64),

    #[error("lifecycle call out of order: {0}")]
    Lifecycle(String),

    #[error("invalid application config: {0}")]
    InvalidConfig(String),

    #[error("internal operation failed: {0}")]
    Internal(String),
}

/// Transaction-scoped rejections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxError {
    #[error("tx decode error: {0}")]
    TxDecode(String),

    #[error("invalid sequence: expected {expected}, got {got}")]
    InvalidSequence { expected: u64, got: u64 },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("unknown route: {0}")]
    UnknownRoute(String),

    #[error("unknown request: {0}")]
    UnknownRequest(String),

    #[error("unknown address: {0}")]
    UnknownAddress(String),

    #[error("invalid pubkey: {0}")]
    InvalidPubKey(String),

    #[error("invalid coins: {0}")]
    InvalidCoins(String),

    #[error("out of gas: limit {limit}, used {used}")]
    OutOfGas { limit: u64, used: u64 },

    #[error("memo too large: {len} characters, max {max}")]
    MemoTooLarge { len: usize, max: usize },

    #[error("insufficient fee: {0}")]
    InsufficientFee(String),

    #[error("invalid message: {0}")]
    InvalidMsg(String),

    #[error("tx too large: {size} bytes, max {max}")]
    TxTooLarge { size: usize, max: u64 },

    /// Business-rule rejection from a module handler.
    #[error("{message}")]
    Module {
        codespace: &'static str,
        code: u32,
        message: String,
    },
}

impl TxError {
    pub fn module(codespace: &'static str, code: u32, message: impl Into<String>) -> Self {
        Self::Module {
            codespace,
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            Self::TxDecode(_) => 2,
            Self::InvalidSequence { .. } => 3,
            Self::Unauthorized(_) => 4,
            Self::InsufficientFunds(_) => 5,
            Self::UnknownRoute(_) => 6,
            Self::UnknownRequest(_) => 7,
            Self::UnknownAddress(_) => 9,
            Self::InvalidPubKey(_) => 8,
            Self::InvalidCoins(_) => 10,
            Self::OutOfGas { .. } => 12,
            Self::MemoTooLarge { .. } => 13,
            Self::InsufficientFee(_) => 14,
            Self::InvalidMsg(_) => 15,
            Self::TxTooLarge { .. } => 16,
            Self::Module { code, .. } => *code,
        }
    }

    pub fn codespace(&self) -> &'static str {
        match self {
            Self::Module { codespace, .. } => codespace,
            _ => ROOT_CODESPACE,
        }
    }
}

/// Union of both severities for keeper and handler code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    #[error(transparent)]
    Fatal(#[from] FatalError),

    #[error(transparent)]
    Tx(#[from] TxError),
}

impl HubError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Escalates to fatal. Used where no transaction exists to absorb a
    /// rejection: hooks, genesis import, begin/end blockers.
    pub fn into_fatal(self) -> FatalError {
        match self {
            Self::Fatal(err) => err,
            Self::Tx(err) => FatalError::Internal(err.to_string()),
        }
    }
}

pub type HubResult<T> = Result<T, HubError>;
