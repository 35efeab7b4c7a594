//! Capabilities and envelopes shared by every module.

pub mod handler;
pub mod hooks;
pub mod msg;
pub mod tx;

pub use handler::{
    from_json_bytes, to_json_bytes, AnteHandler, AnteOutcome, FeePreprocessHandler,
    FeeRefundHandler, Handler, HandlerResult, Querier,
};
pub use hooks::StakingHooks;
pub use msg::{Msg, MsgBasic};
pub use tx::{sign_bytes, StdFee, StdSignature, StdTx};

/// Staking and fee denomination used when no genesis overrides it.
pub const DEFAULT_BOND_DENOM: &str = "stake";

/// Builds `prefix || part || part ...` store keys.
pub fn prefixed_key(prefix: &[u8], parts: &[&[u8]]) -> Vec<u8> {
    let mut key = prefix.to_vec();
    for part in parts {
        key.extend_from_slice(part);
    }
    key
}
