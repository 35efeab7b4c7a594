//! # Zero-Height Export
//!
//! A running chain exported with the zero-height transform must start a new
//! chain holding the same balances and stake, with every height-bearing field
//! rebased. Exporting never changes the exporting chain.

#[cfg(test)]
mod tests {
    use crate::integration::harness::*;
    use hub_02_modules::staking::{
        BondStatus, Delegation, MsgBeginRedelegate, MsgBeginUnbonding, Redelegation, UnbondingDelegation, Validator,
    };
    use hub_02_modules::Msg;
    use hub_03_protocol::GenesisState;
    use node_runtime::genesis::dev_address;
    use node_runtime::DevChain;
    use shared_types::{Address, Coins, Dec};
    use std::collections::BTreeMap;

    /// Three validators after a few blocks of fee-paying traffic, so the
    /// distribution pools hold unclaimed rewards.
    fn busy_chain() -> DevChain {
        let mut chain = start(&genesis(3));
        let mut signers = [Signer::validator(0), Signer::validator(1), Signer::validator(2)];
        for round in 0..3u8 {
            for signer in signers.iter_mut() {
                let to = dev_address((round + 1) % 3);
                let msg = send(signer, to, 1_000 + u128::from(round));
                let tx = signer.sign(vec![msg]);
                submit(&mut chain, tx);
            }
            produce(&mut chain, 2);
        }
        chain
    }

    /// Height of the block carrying the unbonding traffic in
    /// [`unbonding_chain`].
    const UNBOND_HEIGHT: u64 = 1;

    /// Three validators with stake in motion: validator 0 unbonds part of its
    /// self-bond and moves another part to validator 1, and validator 2
    /// unbonds all but one token, which drops it out of the set.
    fn unbonding_chain() -> DevChain {
        let mut chain = start(&genesis(3));
        let mut alice = Signer::validator(0);
        let mut carol = Signer::validator(2);

        let msgs = vec![
            Msg::BeginUnbonding(MsgBeginUnbonding {
                delegator: alice.address(),
                validator: alice.address(),
                shares: Dec::from_int(power(5)),
            }),
            Msg::BeginRedelegate(MsgBeginRedelegate {
                delegator: alice.address(),
                src: alice.address(),
                dst: dev_address(1),
                shares: Dec::from_int(power(7)),
            }),
        ];
        submit(&mut chain, alice.sign(msgs));
        let msg = Msg::BeginUnbonding(MsgBeginUnbonding {
            delegator: carol.address(),
            validator: carol.address(),
            shares: Dec::from_int(power(100) - 1),
        });
        submit(&mut chain, carol.sign(vec![msg]));

        let (block, results) = produce(&mut chain, 1);
        assert_eq!(block.height, UNBOND_HEIGHT);
        assert!(results.iter().all(|r| r.is_ok()), "{:?}", results);
        produce(&mut chain, 2);
        chain
    }

    fn balances(state: &GenesisState) -> BTreeMap<Address, Coins> {
        state
            .accounts
            .iter()
            .map(|a| (a.address, a.coins.clone()))
            .collect()
    }

    /// Who has how much at stake, ignoring heights.
    fn stake(state: &GenesisState) -> (Vec<(Address, u128, String)>, Vec<(Address, Address, String)>) {
        let validators = state
            .stake
            .validators
            .iter()
            .map(|v: &Validator| (v.operator, v.tokens, v.delegator_shares.to_string()))
            .collect();
        let bonds = state
            .stake
            .bonds
            .iter()
            .map(|d: &Delegation| (d.delegator, d.validator, d.shares.to_string()))
            .collect();
        (validators, bonds)
    }

    #[test]
    fn test_zero_height_export_rebases_heights_and_settles_rewards() {
        let chain = busy_chain();
        let (bytes, validators) = chain.export(true).unwrap();
        let state = GenesisState::from_bytes(&bytes).unwrap();

        assert_eq!(validators.len(), 3);
        assert!(state.stake.validators.iter().all(|v| v.bond_height == 0));
        assert!(state.stake.bonds.iter().all(|d| d.height == 0));
        assert!(state.distr.fee_pool.val_pool.is_zero());
        assert!(state
            .distr
            .validator_dist_infos
            .iter()
            .all(|vdi| vdi.fee_pool_withdrawal_height == 0 && vdi.del_pool.is_zero()));
        assert!(state
            .slashing
            .signing_infos
            .iter()
            .all(|entry| entry.info.start_height == 0));
        assert!(state.gentxs.is_empty());
    }

    #[test]
    fn test_zero_height_export_round_trips_balances_and_stake() {
        let chain = busy_chain();
        let (exported, exported_validators) = chain.export(true).unwrap();
        let first = GenesisState::from_bytes(&exported).unwrap();

        let mut restarted = start_from_bytes(exported);
        assert_eq!(restarted.height(), 0);
        assert_eq!(restarted.validators(), chain.validators());
        assert_eq!(restarted.validators().len(), exported_validators.len());

        let (again, _) = restarted.export(false).unwrap();
        let second = GenesisState::from_bytes(&again).unwrap();
        assert_eq!(balances(&first), balances(&second));
        assert_eq!(stake(&first), stake(&second));
        assert_eq!(first.stake.pool, second.stake.pool);

        // The imported state is a working chain.
        let sequence = account(&chain, dev_address(0)).unwrap().sequence;
        let mut alice = Signer::validator(0).with_sequence(sequence);
        produce(&mut restarted, 1);
        submit(&mut restarted, alice.sign(vec![send(&alice, dev_address(1), 7)]));
        let (block, results) = produce(&mut restarted, 1);
        assert_eq!(block.failed_txs, 0, "{}", results[0].log);
    }

    #[test]
    fn test_zero_height_export_rebases_stake_in_motion() {
        let chain = unbonding_chain();
        let height = chain.height();
        let (exported, _) = chain.export(true).unwrap();
        let state = GenesisState::from_bytes(&exported).unwrap();
        let matures = UNBOND_HEIGHT + state.stake.params.unbonding_period - height;

        let ubds: Vec<(Address, u64, u64)> = state
            .stake
            .unbonding_delegations
            .iter()
            .map(|u: &UnbondingDelegation| (u.validator, u.creation_height, u.min_height))
            .collect();
        assert_eq!(ubds.len(), 2);
        assert!(ubds.contains(&(dev_address(0), 0, matures)));
        assert!(ubds.contains(&(dev_address(2), 0, matures)));

        let reds: Vec<(Address, Address, u64, u64)> = state
            .stake
            .redelegations
            .iter()
            .map(|r: &Redelegation| (r.src, r.dst, r.creation_height, r.min_height))
            .collect();
        assert_eq!(reds, [(dev_address(0), dev_address(1), 0, matures)]);

        assert!(state.stake.validators.iter().all(|v| v.bond_height == 0 && v.unbonding_height == 0));
        let leaving = state
            .stake
            .validators
            .iter()
            .find(|v| v.operator == dev_address(2))
            .expect("validator 2 still holds one token");
        assert_eq!(leaving.status, BondStatus::Unbonding);
        assert_eq!(leaving.unbonding_min_height, matures);

        // The restarted chain carries the same entries, still maturing.
        let mut restarted = start_from_bytes(exported);
        assert_eq!(restarted.validators().len(), 2);
        produce(&mut restarted, 1);
        let ubds: Vec<UnbondingDelegation> = query_json(&restarted, "custom/stake/unbonding-delegations", &());
        assert_eq!(ubds, state.stake.unbonding_delegations);
        let reds: Vec<Redelegation> = query_json(&restarted, "custom/stake/redelegations", &());
        assert_eq!(reds, state.stake.redelegations);
    }

    #[test]
    fn test_export_leaves_the_chain_untouched() {
        let mut exported = busy_chain();
        let mut untouched = busy_chain();
        let height = exported.height();

        exported.export(true).unwrap();
        exported.export(false).unwrap();
        assert_eq!(exported.height(), height);

        let a = produce(&mut exported, 1).0.app_hash;
        let b = produce(&mut untouched, 1).0.app_hash;
        assert_eq!(a, b);
    }

    #[test]
    fn test_plain_exports_are_byte_identical() {
        let chain = busy_chain();
        let (a, _) = chain.export(false).unwrap();
        let (b, _) = chain.export(false).unwrap();
        assert_eq!(a, b);
    }
}
