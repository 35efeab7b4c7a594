//! # Protocol Switch
//!
//! A software-upgrade proposal passes governance, validators signal, and at
//! the switch height the engine moves from version 0 to version 1 without a
//! restart. Version 1 mounts the record module and serves distribution
//! queries under a new route.

#[cfg(test)]
mod tests {
    use crate::integration::harness::*;
    use hub_02_modules::gov::{MsgSubmitProposal, MsgVote, Proposal, ProposalContent, ProposalStatus, VoteOption};
    use hub_02_modules::record::{record_id, MsgSubmitRecord, Record};
    use hub_02_modules::upgrade::{AppVersion, MsgUpgradeSignal, UpgradeInfo};
    use hub_02_modules::Msg;
    use node_runtime::DevChain;
    use shared_types::tags::keys;
    use shared_types::{Coins, ProtocolDefinition, CODE_OK};

    const VOTING_PERIOD: u64 = 3;
    const SWITCH_HEIGHT: u64 = 8;

    fn propose(proposer: &Signer) -> Msg {
        Msg::SubmitProposal(MsgSubmitProposal {
            title: "Upgrade to v1".into(),
            description: "Adds on-chain records".into(),
            content: ProposalContent::SoftwareUpgrade(ProtocolDefinition::new(1, "hubd/v1", SWITCH_HEIGHT)),
            proposer: proposer.address(),
            initial_deposit: Coins::single(DENOM, power(10)),
        })
    }

    fn vote_yes(voter: &Signer) -> Msg {
        Msg::Vote(MsgVote {
            proposal_id: 1,
            voter: voter.address(),
            option: VoteOption::Yes,
        })
    }

    fn signal(validator: &Signer) -> Msg {
        Msg::UpgradeSignal(MsgUpgradeSignal {
            validator: validator.address(),
            version: 1,
        })
    }

    fn record(submitter: &Signer) -> Msg {
        Msg::SubmitRecord(MsgSubmitRecord {
            submitter: submitter.address(),
            description: "audit log".into(),
            data_hash: "ab".repeat(32),
            data_size: 4_096,
        })
    }

    /// Two equal validators; the upgrade to v1 is scheduled for
    /// [`SWITCH_HEIGHT`] once block 4 commits. `signalling` lists the
    /// validators that signal readiness in block 5.
    fn scheduled_upgrade(signalling: &[u8]) -> (DevChain, [Signer; 2]) {
        let mut chain = start(&governed_genesis(2, VOTING_PERIOD));
        let mut signers = [Signer::validator(0), Signer::validator(1)];

        let msg = propose(&signers[0]);
        let tx = signers[0].sign(vec![msg]);
        submit(&mut chain, tx);
        let (_, results) = produce(&mut chain, 1);
        assert_eq!(results[0].code, CODE_OK, "{}", results[0].log);

        for signer in signers.iter_mut() {
            let msg = vote_yes(signer);
            let tx = signer.sign(vec![msg]);
            submit(&mut chain, tx);
        }
        produce_until(&mut chain, 1 + VOTING_PERIOD);

        let info: UpgradeInfo = query_json(&chain, "custom/upgrade/info", &());
        let scheduled = info.upgrade_in_progress.expect("upgrade scheduled by the passed proposal");
        assert_eq!(scheduled.definition.height, SWITCH_HEIGHT);

        for &index in signalling {
            let signer = &mut signers[usize::from(index)];
            let msg = signal(signer);
            let tx = signer.sign(vec![msg]);
            submit(&mut chain, tx);
        }
        produce(&mut chain, 1);
        (chain, signers)
    }

    #[test]
    fn test_upgrade_switches_version_at_the_switch_height() {
        let (mut chain, _) = scheduled_upgrade(&[0, 1]);

        let before = produce_until(&mut chain, SWITCH_HEIGHT - 1);
        assert_eq!(before.app_version, 0);
        assert_eq!(chain.app().info().app_version, 0);

        let switch = produce_until(&mut chain, SWITCH_HEIGHT);
        assert_eq!(switch.end_tags.get(keys::UPGRADE_RESULT), Some("success"));
        assert_eq!(switch.app_version, 1);
        assert_eq!(chain.app().info().app_version, 1);

        let info: UpgradeInfo = query_json(&chain, "custom/upgrade/info", &());
        assert_eq!(info.current_version, 1);
        assert_eq!(info.upgrade_in_progress, None);
        let versions: Vec<AppVersion> = query_json(&chain, "custom/upgrade/versions", &());
        assert!(versions.iter().any(|v| v.version() == 1 && v.success));

        let definition: ProtocolDefinition = query_json(&chain, "app/version", &());
        assert_eq!(definition.version, 1);
        assert_eq!(definition.software, "hubd/v1");
    }

    #[test]
    fn test_new_version_changes_routes_and_keeps_old_state() {
        let (mut chain, mut signers) = scheduled_upgrade(&[0, 1]);
        assert_eq!(query(&chain, "custom/distr/fee_pool", &()).code, CODE_OK);
        assert_eq!(query(&chain, "custom/distribution/fee_pool", &()).code, 6);

        // Record transactions reach no handler before the switch.
        let msg = record(&signers[1]);
        let tx = signers[1].sign(vec![msg]);
        submit(&mut chain, tx);
        let (_, results) = produce(&mut chain, 1);
        assert_eq!(results[0].code, 6, "{}", results[0].log);
        assert_eq!(results[0].codespace, "sdk");

        produce_until(&mut chain, SWITCH_HEIGHT);
        assert_eq!(query(&chain, "custom/distr/fee_pool", &()).code, 6);
        assert_eq!(query(&chain, "custom/distribution/fee_pool", &()).code, CODE_OK);

        let msg = record(&signers[0]);
        let tx = signers[0].sign(vec![msg]);
        submit(&mut chain, tx);
        let (_, results) = produce(&mut chain, 1);
        assert_eq!(results[0].code, CODE_OK, "{}", results[0].log);

        let id = record_id(&signers[0].address(), &"ab".repeat(32));
        let stored: Option<Record> = query_json(&chain, "custom/record/record", &id);
        let stored = stored.expect("record committed under v1");
        assert_eq!(stored.submit_height, SWITCH_HEIGHT + 1);

        // State written under v0 is still served by v1.
        let proposal: Option<Proposal> = query_json(&chain, "custom/gov/proposal", &1u64);
        assert_eq!(proposal.expect("proposal 1").status, ProposalStatus::Passed);
        assert!(balance(&chain, signers[1].address()) > 0);
    }

    #[test]
    fn test_insufficient_signals_keep_the_current_version() {
        // Half the bonded power is short of the switch threshold.
        let (mut chain, _) = scheduled_upgrade(&[0]);

        let block = produce_until(&mut chain, SWITCH_HEIGHT);
        assert_eq!(block.end_tags.get(keys::UPGRADE_RESULT), Some("failure"));
        assert_eq!(block.app_version, 0);

        let info: UpgradeInfo = query_json(&chain, "custom/upgrade/info", &());
        assert_eq!(info.current_version, 0);
        assert_eq!(info.last_failed_version, Some(1));
        assert_eq!(info.upgrade_in_progress, None);
        assert_eq!(query(&chain, "custom/distr/fee_pool", &()).code, CODE_OK);

        produce(&mut chain, 1);
        assert_eq!(chain.app().info().app_version, 0);
    }

    #[test]
    fn test_only_profilers_may_propose_upgrades() {
        let mut chain = start(&governed_genesis(2, VOTING_PERIOD));
        let mut bob = Signer::validator(1);
        submit(&mut chain, bob.sign(vec![propose(&bob)]));
        let (block, results) = produce(&mut chain, 1);
        assert_eq!(block.failed_txs, 1);
        assert_eq!(results[0].codespace, "gov");

        let proposals: Vec<Proposal> = query_json(&chain, "custom/gov/proposals", &());
        assert!(proposals.is_empty());
    }
}
