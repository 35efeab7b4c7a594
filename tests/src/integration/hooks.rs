//! # Staking Observers
//!
//! Distribution and slashing watch validator lifecycle events through one
//! composite hook. These scenarios create a validator after genesis and check
//! that both observers recorded it.

#[cfg(test)]
mod tests {
    use crate::integration::harness::*;
    use hub_02_modules::distribution::ValidatorDistInfo;
    use hub_02_modules::slashing::ValidatorSigningInfo;
    use shared_types::Address;

    #[test]
    fn test_distribution_observes_before_slashing_in_every_version() {
        let chain = start(&genesis(1));
        let engine = chain.app().engine();
        for version in engine.versions() {
            let protocol = engine.get(version).unwrap();
            assert_eq!(protocol.keepers().hook_members(), ["distribution", "slashing"]);
        }
    }

    #[test]
    fn test_validator_created_after_genesis_reaches_both_observers() {
        let mut genesis = genesis(2);
        // Account 1 stays funded but never bonds at genesis.
        genesis.gentxs.truncate(1);
        let mut chain = start(&genesis);
        assert_eq!(chain.validators().len(), 1);

        let mut late = Signer::fresh(1);
        let operator = late.address();
        submit(&mut chain, late.sign(vec![create_validator(&late, power(50))]));
        let (block, results) = produce(&mut chain, 1);
        assert_eq!(block.failed_txs, 0, "{}", results[0].log);
        assert_eq!(block.validator_updates, 1);
        assert_eq!(chain.validators().get(&late.pub_key()), Some(&50));

        let dist: Option<ValidatorDistInfo> = query_json(&chain, "custom/distr/validator_dist_info", &operator);
        assert_eq!(dist.expect("distribution record").operator, operator);

        let cons: Address = late.pub_key().address();
        let signing: Option<ValidatorSigningInfo> = query_json(&chain, "custom/slashing/signing-info", &cons);
        assert_eq!(signing.expect("signing info").start_height, 1);
    }
}
