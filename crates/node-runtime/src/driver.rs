//! # Development Driver
//!
//! Plays the consensus engine for a single local node: keeps the validator
//! set the application hands back, reports every validator as having signed
//! the previous block, and proposes blocks from a FIFO mempool.

use hub_03_protocol::{AppConfig, HubApp, QueryHandle};
use shared_types::{
    Address, BlockHeader, FatalError, PubKey, RequestBeginBlock, RequestEndBlock, RequestInitChain, ResponseTx,
    Tags, ValidatorUpdate, VoteInfo,
};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Seconds between consecutive block times.
const BLOCK_TIME_STEP: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSummary {
    pub height: u64,
    pub app_hash: [u8; 32],
    pub txs: usize,
    pub failed_txs: usize,
    pub validator_updates: usize,
    pub app_version: u64,
    pub begin_tags: Tags,
    pub end_tags: Tags,
}

pub struct DevChain {
    app: HubApp,
    chain_id: String,
    time: u64,
    validators: BTreeMap<PubKey, u64>,
    /// Votes of the set that signed the previous block.
    last_votes: Vec<VoteInfo>,
    mempool: Vec<Vec<u8>>,
}

impl DevChain {
    /// Runs InitChain and takes the validator set the application returns.
    pub fn init(config: &AppConfig, chain_id: &str, genesis: Vec<u8>, time: u64) -> Result<Self, FatalError> {
        let mut app = HubApp::new(config)?;
        let res = app.init_chain(&RequestInitChain {
            chain_id: chain_id.to_string(),
            time,
            validators: Vec::new(),
            app_state_bytes: genesis,
        })?;
        let mut chain = Self {
            app,
            chain_id: chain_id.to_string(),
            time,
            validators: BTreeMap::new(),
            last_votes: Vec::new(),
            mempool: Vec::new(),
        };
        chain.apply_updates(&res.validators);
        info!("[driver] chain {} starts with {} validators", chain_id, chain.validators.len());
        Ok(chain)
    }

    pub fn app(&self) -> &HubApp {
        &self.app
    }

    pub fn query_handle(&self) -> QueryHandle {
        self.app.query_handle()
    }

    pub fn validators(&self) -> &BTreeMap<PubKey, u64> {
        &self.validators
    }

    pub fn height(&self) -> u64 {
        self.app.last_block_height()
    }

    pub fn pending_txs(&self) -> usize {
        self.mempool.len()
    }

    /// Mempool admission. Only transactions that pass `check_tx` are kept.
    pub fn submit(&mut self, tx: Vec<u8>) -> Result<ResponseTx, FatalError> {
        let res = self.app.check_tx(&tx)?;
        if res.is_ok() {
            self.mempool.push(tx);
        } else {
            debug!("[driver] mempool rejected tx: {}", res.log);
        }
        Ok(res)
    }

    fn apply_updates(&mut self, updates: &[ValidatorUpdate]) {
        for update in updates {
            if update.power == 0 {
                self.validators.remove(&update.pub_key);
            } else {
                self.validators.insert(update.pub_key, update.power);
            }
        }
    }

    /// The highest-power validator proposes; ties go to the lowest key.
    fn proposer(&self) -> Address {
        self.validators
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(key, _)| key.address())
            .unwrap_or_default()
    }

    /// Proposes, executes and commits one block holding every pending tx.
    pub fn produce_block(&mut self) -> Result<(BlockSummary, Vec<ResponseTx>), FatalError> {
        let height = self.height() + 1;
        self.time += BLOCK_TIME_STEP;
        let header = BlockHeader {
            chain_id: self.chain_id.clone(),
            height,
            time: self.time,
            proposer: self.proposer(),
        };

        let begin = self.app.begin_block(&RequestBeginBlock {
            header,
            last_commit_votes: std::mem::take(&mut self.last_votes),
            byzantine_validators: Vec::new(),
        })?;

        let txs = std::mem::take(&mut self.mempool);
        let mut results = Vec::with_capacity(txs.len());
        for tx in &txs {
            results.push(self.app.deliver_tx(tx)?);
        }

        let end = self.app.end_block(&RequestEndBlock { height })?;
        let commit = self.app.commit()?;
        let validator_updates = end.validator_updates.len();

        // The set that signs this block is the one in force before the updates.
        self.last_votes = self
            .validators
            .iter()
            .map(|(key, power)| VoteInfo {
                validator: key.address(),
                power: *power,
                signed_last_block: true,
            })
            .collect();
        self.apply_updates(&end.validator_updates);

        let summary = BlockSummary {
            height: commit.height,
            app_hash: commit.app_hash,
            txs: txs.len(),
            failed_txs: results.iter().filter(|r| !r.is_ok()).count(),
            validator_updates,
            app_version: self.app.info().app_version,
            begin_tags: begin.tags,
            end_tags: end.tags,
        };
        Ok((summary, results))
    }

    pub fn export(&self, zero_height: bool) -> Result<(Vec<u8>, Vec<ValidatorUpdate>), FatalError> {
        self.app.export_app_state_and_validators(zero_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genesis::{dev_address, GenesisBuilder, GenesisConfig};
    use hub_02_modules::bank::MsgSend;
    use hub_02_modules::{Msg, StdFee, StdTx};
    use shared_types::Coins;

    const CHAIN: &str = "driver-test";

    fn chain(validators: u8) -> DevChain {
        let genesis = GenesisBuilder::new(GenesisConfig {
            chain_id: CHAIN.into(),
            validators,
            ..Default::default()
        })
        .build()
        .unwrap()
        .to_canonical_bytes()
        .unwrap();
        DevChain::init(&AppConfig::default(), CHAIN, genesis, 1_700_000_000).unwrap()
    }

    #[test]
    fn test_gentx_validators_become_the_set() {
        let chain = chain(3);
        assert_eq!(chain.validators().len(), 3);
        assert!(chain.validators().values().all(|p| *p == 100));
    }

    #[test]
    fn test_blocks_advance_height_and_hash() {
        let mut chain = chain(1);
        let (first, _) = chain.produce_block().unwrap();
        let (second, _) = chain.produce_block().unwrap();
        assert_eq!(first.height, 1);
        assert_eq!(second.height, 2);
        assert_ne!(first.app_hash, second.app_hash);
        assert_eq!(second.app_version, 0);
    }

    #[test]
    fn test_mempool_tx_is_delivered() {
        let mut chain = chain(2);
        let sender = crate::genesis::dev_key(0);
        let mut tx = StdTx::new(
            vec![Msg::Send(MsgSend {
                from: dev_address(0),
                to: dev_address(1),
                amount: Coins::single("stake", 1_000),
            })],
            StdFee::new(Coins::single("stake", 200_000), 200_000),
            "",
        );
        tx.sign(&sender, CHAIN, 0, 1);
        let admitted = chain.submit(tx.encode().unwrap()).unwrap();
        assert!(admitted.is_ok(), "{}", admitted.log);
        assert_eq!(chain.pending_txs(), 1);

        let (summary, results) = chain.produce_block().unwrap();
        assert_eq!(summary.txs, 1);
        assert_eq!(summary.failed_txs, 0, "{}", results[0].log);
        assert_eq!(chain.pending_txs(), 0);
    }
}
