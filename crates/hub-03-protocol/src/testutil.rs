//! Fixtures shared by the unit tests of this crate.

use crate::keepers::KeeperSet;
use ed25519_dalek::SigningKey;
use hub_01_store::{Context, ExecMode, StoreView};
use hub_02_modules::bank::MsgSend;
use hub_02_modules::{Msg, StdFee, StdTx};
use shared_types::{Address, BlockHeader, Coins, PubKey};

pub const CHAIN_ID: &str = "test-chain";

pub fn header(height: u64) -> BlockHeader {
    BlockHeader {
        chain_id: CHAIN_ID.into(),
        height,
        time: 1_700_000_000 + height * 5,
        proposer: Default::default(),
    }
}

pub fn key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

pub fn address_of(key: &SigningKey) -> Address {
    PubKey(key.verifying_key().to_bytes()).address()
}

/// An account holding `stake` whose key the test controls.
pub struct Funded {
    pub key: SigningKey,
    pub addr: Address,
    pub account_number: u64,
}

impl Funded {
    pub fn new(view: &mut StoreView, keepers: &KeeperSet, seed: u8, amount: u128) -> Self {
        let key = key(seed);
        let addr = address_of(&key);
        let mut ctx = Context::new(view, header(0), ExecMode::InitChain);
        keepers
            .bank()
            .unwrap()
            .add_coins(&mut ctx, &addr, &Coins::single("stake", amount))
            .unwrap();
        let account_number = keepers
            .accounts()
            .unwrap()
            .get_account(&ctx, &addr)
            .unwrap()
            .unwrap()
            .account_number;
        Self {
            key,
            addr,
            account_number,
        }
    }
}

/// Encoded bank send signed by `from`.
pub fn signed_send(from: &Funded, to: Address, amount: u128, fee: u128, gas: u64, sequence: u64) -> Vec<u8> {
    let mut tx = StdTx::new(
        vec![Msg::Send(MsgSend {
            from: from.addr,
            to,
            amount: Coins::single("stake", amount),
        })],
        StdFee::new(Coins::single("stake", fee), gas),
        "",
    );
    tx.sign(&from.key, CHAIN_ID, from.account_number, sequence);
    tx.encode().unwrap()
}
