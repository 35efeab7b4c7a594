//! # Block Lifecycle
//!
//! InitChain, the fixed stage order inside a block, rejected transactions
//! inside a committed block and replica determinism.

#[cfg(test)]
mod tests {
    use crate::integration::harness::*;
    use hub_03_protocol::{AppConfig, GenesisAccount, GenesisState, HubApp};
    use node_runtime::genesis::dev_address;
    use shared_types::{Address, Coins, FatalError, RequestInitChain, ValidatorUpdate, CODE_OK};

    // =============================================================================
    // INIT CHAIN
    // =============================================================================

    #[test]
    fn test_genesis_accounts_are_numbered_in_declared_order() {
        let holder = |byte: u8, number: u64| GenesisAccount {
            address: Address([byte; 20]),
            coins: Coins::single(DENOM, 1_000),
            account_number: number,
            sequence: 0,
        };
        let mut genesis = GenesisState {
            accounts: vec![holder(0xA1, 2), holder(0xB2, 0), holder(0xC3, 1)],
            ..Default::default()
        };
        genesis.stake.pool.loose_tokens = 3_000;

        let mut chain = start(&genesis);
        produce(&mut chain, 1);

        let number = |byte: u8| {
            account(&chain, Address([byte; 20]))
                .expect("imported account")
                .account_number
        };
        assert_eq!(number(0xB2), 0);
        assert_eq!(number(0xC3), 1);
        assert_eq!(number(0xA1), 2);
    }

    #[test]
    fn test_consensus_validator_set_must_match_genesis() {
        let genesis = genesis(1);
        let request = |validators| RequestInitChain {
            chain_id: CHAIN_ID.into(),
            time: GENESIS_TIME,
            validators,
            app_state_bytes: genesis.to_canonical_bytes().unwrap(),
        };

        let mut app = HubApp::new(&AppConfig::default()).unwrap();
        let wrong = vec![ValidatorUpdate {
            pub_key: Signer::validator(1).pub_key(),
            power: 100,
        }];
        assert!(matches!(
            app.init_chain(&request(wrong)),
            Err(FatalError::ValidatorSetMismatch(_))
        ));

        let mut app = HubApp::new(&AppConfig::default()).unwrap();
        let right = vec![ValidatorUpdate {
            pub_key: Signer::validator(0).pub_key(),
            power: 100,
        }];
        let res = app.init_chain(&request(right.clone())).unwrap();
        assert_eq!(res.validators, right);
    }

    #[test]
    fn test_malformed_genesis_halts_init_chain() {
        let mut app = HubApp::new(&AppConfig::default()).unwrap();
        let err = app
            .init_chain(&RequestInitChain {
                chain_id: CHAIN_ID.into(),
                time: GENESIS_TIME,
                validators: Vec::new(),
                app_state_bytes: b"{\"accounts\": 7}".to_vec(),
            })
            .unwrap_err();
        assert!(matches!(err, FatalError::MalformedGenesis(_)));
    }

    // =============================================================================
    // BLOCK STAGES
    // =============================================================================

    #[test]
    fn test_begin_block_tags_follow_stage_order() {
        let mut chain = start(&genesis(2));
        let mut alice = Signer::validator(0);
        // Block 1 collects a fee that block 2 distributes.
        submit(&mut chain, alice.sign(vec![send(&alice, dev_address(1), 10)]));
        produce(&mut chain, 1);

        let (block, _) = produce(&mut chain, 1);
        let keys: Vec<&str> = block.begin_tags.iter().map(|t| t.key.as_str()).collect();
        let position = |key: &str| {
            keys.iter()
                .position(|k| *k == key)
                .unwrap_or_else(|| panic!("no {key} tag in {keys:?}"))
        };
        assert!(position("mint-coin") < position("reward"));
        assert!(position("reward") < position("community-pool"));
    }

    #[test]
    fn test_rejected_tx_does_not_stop_the_block() {
        let mut chain = start(&genesis(2));
        let mut alice = Signer::validator(0);
        let mut bob = Signer::validator(1);
        produce(&mut chain, 1);
        let before = balance(&chain, dev_address(1));

        // Passes the mempool: message handlers only run on delivery.
        submit(&mut chain, alice.sign(vec![send(&alice, dev_address(1), power(1_000_000))]));
        submit(&mut chain, bob.sign(vec![send(&bob, dev_address(0), 5)]));
        let (block, results) = produce(&mut chain, 1);

        assert_eq!(block.txs, 2);
        assert_eq!(block.failed_txs, 1);
        assert_ne!(results[0].code, CODE_OK);
        assert_eq!(results[1].code, CODE_OK, "{}", results[1].log);
        // Bob paid the transfer and at most the full fee; Alice's payment never arrived.
        let spent = before - balance(&chain, dev_address(1));
        assert!(spent > 5 && spent <= u128::from(TX_GAS) + 5, "spent {spent}");
    }

    #[test]
    fn test_replicas_agree_on_every_app_hash() {
        let genesis = genesis(2);
        let mut replicas = [start(&genesis), start(&genesis)];
        let mut hashes: [Vec<[u8; 32]>; 2] = [Vec::new(), Vec::new()];

        for (replica, out) in replicas.iter_mut().zip(hashes.iter_mut()) {
            let mut alice = Signer::validator(0);
            submit(replica, alice.sign(vec![send(&alice, dev_address(1), 1_234)]));
            for _ in 0..3 {
                out.push(replica.produce_block().unwrap().0.app_hash);
            }
        }
        assert_eq!(hashes[0], hashes[1]);
        assert_eq!(replicas[0].app().info(), replicas[1].app().info());
    }

    #[test]
    fn test_mempool_admission_rejects_bad_sequence() {
        let mut chain = start(&genesis(1));
        // The gentx consumed sequence 0.
        let mut stale = Signer::fresh(0);
        let res = chain.submit(stale.sign(vec![send(&stale, dev_address(0), 1)])).unwrap();
        assert!(!res.is_ok());
        assert_eq!(chain.pending_txs(), 0);
    }
}
