//! Handler, querier and interceptor capabilities.

use super::msg::Msg;
use super::tx::StdTx;
use hub_01_store::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared_types::{Coins, FatalError, HubResult, Tags, TxError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerResult {
    pub data: Vec<u8>,
    pub tags: Tags,
}

impl HandlerResult {
    pub fn with_tags(tags: Tags) -> Self {
        Self {
            data: Vec::new(),
            tags,
        }
    }
}

/// Executes the messages of one route.
pub trait Handler: Send + Sync {
    fn handle(&self, ctx: &mut Context<'_>, msg: &Msg) -> HubResult<HandlerResult>;
}

/// Serves `custom/<route>/<path..>` queries against committed state.
pub trait Querier: Send + Sync {
    fn query(&self, ctx: &Context<'_>, path: &[&str], data: &[u8]) -> HubResult<Vec<u8>>;
}

/// Mempool admission check. Advisory only, never run during block execution.
pub trait FeePreprocessHandler: Send + Sync {
    fn preprocess(&self, ctx: &Context<'_>, tx: &StdTx) -> HubResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnteOutcome {
    pub gas_wanted: u64,
}

/// Authentication and fee deduction before the routed handler.
pub trait AnteHandler: Send + Sync {
    fn ante(&self, ctx: &mut Context<'_>, tx: &StdTx, tx_len: usize) -> HubResult<AnteOutcome>;
}

/// Returns the unused part of the fee after the routed handler ran.
pub trait FeeRefundHandler: Send + Sync {
    fn refund(&self, ctx: &mut Context<'_>, tx: &StdTx) -> HubResult<Coins>;
}

pub fn to_json_bytes<T: Serialize>(value: &T) -> HubResult<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| FatalError::Internal(format!("query response encoding: {e}")).into())
}

pub fn from_json_bytes<T: DeserializeOwned>(data: &[u8]) -> Result<T, TxError> {
    serde_json::from_slice(data).map_err(|e| TxError::UnknownRequest(format!("bad query data: {e}")))
}
