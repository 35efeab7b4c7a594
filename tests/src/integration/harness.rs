//! # Integration Harness
//!
//! Genesis fixtures and transaction helpers shared by the scenarios. Chains
//! are driven through [`DevChain`], which calls the lifecycle entry points in
//! the order a consensus engine does and feeds back the validator set.

use hub_02_modules::auth::BaseAccount;
use hub_02_modules::guardian::{AccountType, Profiler};
use hub_02_modules::staking::{Commission, Description, MsgCreateValidator, POWER_REDUCTION};
use hub_02_modules::{Msg, StdFee, StdTx};
use hub_03_protocol::{AppConfig, GenesisState};
use node_runtime::genesis::{dev_address, dev_key, GenesisBuilder, GenesisConfig};
use node_runtime::{BlockSummary, DevChain};
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared_types::{Address, Coin, Coins, Dec, PubKey, RequestQuery, ResponseQuery, ResponseTx, CODE_OK};

pub const CHAIN_ID: &str = "hub-itest";
pub const GENESIS_TIME: u64 = 1_700_000_000;
pub const DENOM: &str = "stake";

/// Gas granted to every test transaction; the fee pays one unit per gas.
pub const TX_GAS: u64 = 200_000;

// =============================================================================
// GENESIS
// =============================================================================

/// `validators` funded development validators, each bonded through a gentx.
pub fn genesis(validators: u8) -> GenesisState {
    GenesisBuilder::new(GenesisConfig {
        chain_id: CHAIN_ID.into(),
        validators,
        ..Default::default()
    })
    .build()
    .expect("development genesis")
}

/// Like [`genesis`], with validator 0 registered as a profiler and a short
/// voting period so upgrade proposals settle within a few blocks.
pub fn governed_genesis(validators: u8, voting_period: u64) -> GenesisState {
    let mut genesis = genesis(validators);
    genesis.gov.params.voting_period = voting_period;
    genesis.guardian.profilers.push(Profiler {
        name: "dev-profiler".into(),
        addr: dev_address(0),
        added_by: dev_address(0),
        account_type: AccountType::Genesis,
    });
    genesis
}

pub fn start(genesis: &GenesisState) -> DevChain {
    start_from_bytes(genesis.to_canonical_bytes().expect("canonical genesis"))
}

pub fn start_from_bytes(bytes: Vec<u8>) -> DevChain {
    DevChain::init(&AppConfig::default(), CHAIN_ID, bytes, GENESIS_TIME).expect("InitChain")
}

// =============================================================================
// TRANSACTIONS
// =============================================================================

/// A development key with its account number and next sequence tracked
/// locally, the way a wallet would.
pub struct Signer {
    index: u8,
    account_number: u64,
    sequence: u64,
}

impl Signer {
    /// Development validator `index`; its gentx already used sequence 0.
    pub fn validator(index: u8) -> Self {
        Self {
            index,
            account_number: u64::from(index),
            sequence: 1,
        }
    }

    /// Funded development account `index` that has never signed.
    pub fn fresh(index: u8) -> Self {
        Self {
            index,
            account_number: u64::from(index),
            sequence: 0,
        }
    }

    /// Continues from the sequence the chain reports.
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn address(&self) -> Address {
        dev_address(self.index)
    }

    pub fn pub_key(&self) -> PubKey {
        PubKey(dev_key(self.index).verifying_key().to_bytes())
    }

    pub fn sign(&mut self, msgs: Vec<Msg>) -> Vec<u8> {
        let fee = StdFee::new(Coins::single(DENOM, u128::from(TX_GAS)), TX_GAS);
        let mut tx = StdTx::new(msgs, fee, "");
        tx.sign(&dev_key(self.index), CHAIN_ID, self.account_number, self.sequence);
        self.sequence += 1;
        tx.encode().expect("encode tx")
    }
}

pub fn send(from: &Signer, to: Address, amount: u128) -> Msg {
    Msg::Send(hub_02_modules::bank::MsgSend {
        from: from.address(),
        to,
        amount: Coins::single(DENOM, amount),
    })
}

pub fn create_validator(signer: &Signer, self_bond: u128) -> Msg {
    let pub_key = signer.pub_key();
    Msg::CreateValidator(MsgCreateValidator {
        description: Description {
            moniker: format!("late-{}", signer.index),
            ..Default::default()
        },
        commission: Commission {
            rate: Dec::percent(5),
            max_rate: Dec::percent(10),
            max_change_rate: Dec::percent(1),
            update_height: 0,
        },
        operator: pub_key.address(),
        pub_key,
        delegation: Coin::new(DENOM, self_bond),
    })
}

/// Queues `tx`, failing the test if the mempool refuses it.
pub fn submit(chain: &mut DevChain, tx: Vec<u8>) {
    let res = chain.submit(tx).expect("check_tx");
    assert!(res.is_ok(), "check_tx rejected: {}", res.log);
}

/// Produces `n` blocks and returns the last one.
pub fn produce(chain: &mut DevChain, n: u64) -> (BlockSummary, Vec<ResponseTx>) {
    assert!(n > 0);
    let mut last = chain.produce_block().expect("block");
    for _ in 1..n {
        last = chain.produce_block().expect("block");
    }
    last
}

/// Produces blocks until the last committed height is `height`.
pub fn produce_until(chain: &mut DevChain, height: u64) -> BlockSummary {
    assert!(chain.height() < height, "already at height {}", chain.height());
    produce(chain, height - chain.height()).0
}

// =============================================================================
// QUERIES
// =============================================================================

pub fn query(chain: &DevChain, path: &str, data: &impl Serialize) -> ResponseQuery {
    chain.query_handle().query(&RequestQuery {
        path: path.into(),
        data: serde_json::to_vec(data).expect("query data"),
    })
}

/// A query that must succeed, decoded from JSON.
pub fn query_json<T: DeserializeOwned>(chain: &DevChain, path: &str, data: &impl Serialize) -> T {
    let res = query(chain, path, data);
    assert_eq!(res.code, CODE_OK, "{path}: {}", res.log);
    serde_json::from_slice(&res.value).expect("query value")
}

pub fn account(chain: &DevChain, address: Address) -> Option<BaseAccount> {
    query_json(chain, "custom/acc/account", &address)
}

pub fn balance(chain: &DevChain, address: Address) -> u128 {
    account(chain, address).map(|a| a.coins.amount_of(DENOM)).unwrap_or_default()
}

/// One unit of voting power in bond-denom tokens.
pub const fn power(units: u128) -> u128 {
    units * POWER_REDUCTION
}
