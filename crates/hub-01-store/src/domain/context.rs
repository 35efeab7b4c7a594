//! # Request Context
//!
//! Everything a keeper call may touch: the writable view, the block header,
//! the execution mode and the gas meter. Contexts are created per lifecycle
//! call and per transaction and dropped at its end.

use super::errors::StoreError;
use super::gas::{
    GasMeter, DELETE_COST, ITER_NEXT_COST, READ_COST_FLAT, READ_COST_PER_BYTE, WRITE_COST_FLAT,
    WRITE_COST_PER_BYTE,
};
use super::keys::StoreKey;
use super::view::StoreView;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared_types::{Address, BlockHeader, Height};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    InitChain,
    /// Mempool admission against the check state.
    Check,
    Deliver,
    /// Read-only access to committed state.
    Query,
}

pub struct Context<'a> {
    view: &'a mut StoreView,
    header: BlockHeader,
    mode: ExecMode,
    gas: GasMeter,
}

impl<'a> Context<'a> {
    pub fn new(view: &'a mut StoreView, header: BlockHeader, mode: ExecMode) -> Self {
        Self {
            view,
            header,
            mode,
            gas: GasMeter::infinite(),
        }
    }

    pub fn with_gas_meter(mut self, gas: GasMeter) -> Self {
        self.gas = gas;
        self
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn block_height(&self) -> Height {
        self.header.height
    }

    pub fn block_time(&self) -> u64 {
        self.header.time
    }

    pub fn chain_id(&self) -> &str {
        &self.header.chain_id
    }

    pub fn proposer(&self) -> Address {
        self.header.proposer
    }

    pub fn mode(&self) -> ExecMode {
        self.mode
    }

    pub fn is_check_tx(&self) -> bool {
        self.mode == ExecMode::Check
    }

    pub fn gas_meter(&self) -> &GasMeter {
        &self.gas
    }

    pub fn view(&self) -> &StoreView {
        self.view
    }

    // =========================================================================
    // RAW ACCESS
    // =========================================================================

    pub fn get(&self, key: StoreKey, k: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let value = self.view.get(key, k)?;
        let len = value.as_ref().map_or(0, Vec::len) as u64;
        self.gas.consume(READ_COST_FLAT + READ_COST_PER_BYTE * len);
        Ok(value)
    }

    pub fn has(&self, key: StoreKey, k: &[u8]) -> Result<bool, StoreError> {
        self.gas.consume(READ_COST_FLAT);
        Ok(self.view.get(key, k)?.is_some())
    }

    pub fn set(&mut self, key: StoreKey, k: Vec<u8>, v: Vec<u8>) -> Result<(), StoreError> {
        self.gas
            .consume(WRITE_COST_FLAT + WRITE_COST_PER_BYTE * (k.len() + v.len()) as u64);
        self.view.set(key, k, v)
    }

    pub fn delete(&mut self, key: StoreKey, k: &[u8]) -> Result<(), StoreError> {
        self.gas.consume(DELETE_COST);
        self.view.delete(key, k)
    }

    pub fn iter_prefix(
        &self,
        key: StoreKey,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let entries = self.view.prefix(key, prefix, false)?;
        self.gas.consume(ITER_NEXT_COST * entries.len() as u64);
        Ok(entries)
    }

    /// Same as [`Context::iter_prefix`], descending key order.
    pub fn reverse_iter_prefix(
        &self,
        key: StoreKey,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let entries = self.view.prefix(key, prefix, true)?;
        self.gas.consume(ITER_NEXT_COST * entries.len() as u64);
        Ok(entries)
    }

    // =========================================================================
    // TYPED ACCESS (bincode)
    // =========================================================================

    pub fn get_obj<T: DeserializeOwned>(
        &self,
        key: StoreKey,
        k: &[u8],
    ) -> Result<Option<T>, StoreError> {
        match self.get(key, k)? {
            Some(bytes) => decode(key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    pub fn set_obj<T: Serialize>(
        &mut self,
        key: StoreKey,
        k: Vec<u8>,
        value: &T,
    ) -> Result<(), StoreError> {
        let bytes = bincode::serialize(value).map_err(|e| StoreError::Codec {
            store: key.name(),
            reason: e.to_string(),
        })?;
        self.set(key, k, bytes)
    }

    pub fn iter_prefix_obj<T: DeserializeOwned>(
        &self,
        key: StoreKey,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, T)>, StoreError> {
        self.iter_prefix(key, prefix)?
            .into_iter()
            .map(|(k, v)| decode(key, &v).map(|obj| (k, obj)))
            .collect()
    }

    pub fn reverse_iter_prefix_obj<T: DeserializeOwned>(
        &self,
        key: StoreKey,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, T)>, StoreError> {
        self.reverse_iter_prefix(key, prefix)?
            .into_iter()
            .map(|(k, v)| decode(key, &v).map(|obj| (k, obj)))
            .collect()
    }

    // =========================================================================
    // BRANCHING
    // =========================================================================

    pub fn branch(&mut self) {
        self.view.branch();
    }

    pub fn write_branch(&mut self) {
        self.view.write_branch();
    }

    pub fn discard_branch(&mut self) {
        self.view.discard_branch();
    }
}

fn decode<T: DeserializeOwned>(key: StoreKey, bytes: &[u8]) -> Result<T, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Codec {
        store: key.name(),
        reason: e.to_string(),
    })
}
