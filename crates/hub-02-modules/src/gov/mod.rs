//! # Governance
//!
//! Text, parameter-change and software-upgrade proposals. A proposal waits
//! in its deposit period until the minimum deposit is reached, then bonded
//! validators vote for `voting_period` blocks, weighted by their last bonded
//! power. Passed proposals are executed at the end block of their tally.

pub mod keeper;
pub mod types;

pub use keeper::{deposit_holder, GovKeeper, STARTING_PROPOSAL_ID};
pub use types::*;

use crate::params::ParamSet;
use crate::types::{from_json_bytes, to_json_bytes, Handler, HandlerResult, Msg, Querier};
use hub_01_store::Context;
use serde::{Deserialize, Serialize};
use shared_types::tags::keys;
use shared_types::{HubResult, Tags, TxError};

pub const ROUTE: &str = "gov";
pub const CODESPACE: &str = "gov";

pub struct GovHandler {
    keeper: GovKeeper,
}

impl GovHandler {
    pub fn new(keeper: GovKeeper) -> Self {
        Self { keeper }
    }
}

impl Handler for GovHandler {
    fn handle(&self, ctx: &mut Context<'_>, msg: &Msg) -> HubResult<HandlerResult> {
        let k = &self.keeper;
        match msg {
            Msg::SubmitProposal(m) => {
                let id = k.submit_proposal(ctx, &m.title, &m.description, m.content.clone(), &m.proposer)?;
                let mut tags = Tags::new()
                    .with(keys::ACTION, msg.msg_type())
                    .with(keys::SENDER, m.proposer)
                    .with(keys::PROPOSAL_ID, id);
                if !m.initial_deposit.is_empty() && k.add_deposit(ctx, id, &m.proposer, &m.initial_deposit)? {
                    tags.push("voting-period-start", id);
                }
                Ok(HandlerResult {
                    data: id.to_be_bytes().to_vec(),
                    tags,
                })
            }
            Msg::Deposit(m) => {
                let mut tags = Tags::new()
                    .with(keys::ACTION, msg.msg_type())
                    .with(keys::SENDER, m.depositor)
                    .with(keys::PROPOSAL_ID, m.proposal_id);
                if k.add_deposit(ctx, m.proposal_id, &m.depositor, &m.amount)? {
                    tags.push("voting-period-start", m.proposal_id);
                }
                Ok(HandlerResult::with_tags(tags))
            }
            Msg::Vote(m) => {
                k.add_vote(ctx, m.proposal_id, &m.voter, m.option)?;
                Ok(HandlerResult::with_tags(
                    Tags::new()
                        .with(keys::ACTION, msg.msg_type())
                        .with(keys::VALIDATOR, m.voter)
                        .with(keys::PROPOSAL_ID, m.proposal_id),
                ))
            }
            other => Err(TxError::UnknownRequest(format!("unrecognized gov message {}", other.msg_type())).into()),
        }
    }
}

pub struct GovQuerier {
    keeper: GovKeeper,
}

impl GovQuerier {
    pub fn new(keeper: GovKeeper) -> Self {
        Self { keeper }
    }
}

impl Querier for GovQuerier {
    fn query(&self, ctx: &Context<'_>, path: &[&str], data: &[u8]) -> HubResult<Vec<u8>> {
        let k = &self.keeper;
        match path.first().copied() {
            Some("params") => to_json_bytes(&k.params(ctx)?),
            Some("proposals") => to_json_bytes(&k.proposals(ctx)?),
            Some("proposal") => to_json_bytes(&k.get_proposal(ctx, from_json_bytes(data)?)?),
            Some("deposits") => to_json_bytes(&k.deposits(ctx, from_json_bytes(data)?)?),
            Some("votes") => to_json_bytes(&k.votes(ctx, from_json_bytes(data)?)?),
            Some("tally") => to_json_bytes(&k.tally(ctx, from_json_bytes(data)?)?),
            _ => Err(TxError::UnknownRequest(format!("unknown gov query {}", path.join("/"))).into()),
        }
    }
}

// =============================================================================
// GENESIS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovGenesis {
    pub starting_proposal_id: u64,
    pub params: GovParams,
    #[serde(default)]
    pub proposals: Vec<Proposal>,
    #[serde(default)]
    pub deposits: Vec<Deposit>,
    #[serde(default)]
    pub votes: Vec<Vote>,
}

impl Default for GovGenesis {
    fn default() -> Self {
        Self {
            starting_proposal_id: STARTING_PROPOSAL_ID,
            params: GovParams::default(),
            proposals: Vec::new(),
            deposits: Vec::new(),
            votes: Vec::new(),
        }
    }
}

impl GovGenesis {
    pub fn validate(&self) -> Result<(), String> {
        self.params.validate()?;
        if self.starting_proposal_id < STARTING_PROPOSAL_ID {
            return Err(format!("starting proposal id must be at least {STARTING_PROPOSAL_ID}"));
        }
        if let Some(p) = self.proposals.iter().find(|p| p.id >= self.starting_proposal_id) {
            return Err(format!("proposal {} is not below the starting proposal id", p.id));
        }
        Ok(())
    }
}

pub fn init_genesis(ctx: &mut Context<'_>, keeper: &GovKeeper, data: &GovGenesis) -> HubResult<()> {
    keeper.set_next_proposal_id(ctx, data.starting_proposal_id)?;
    keeper.set_params(ctx, &data.params)?;
    for proposal in &data.proposals {
        keeper.set_proposal(ctx, proposal)?;
        keeper.requeue(ctx, proposal)?;
    }
    for deposit in &data.deposits {
        keeper.set_deposit(ctx, deposit)?;
    }
    for vote in &data.votes {
        keeper.set_vote(ctx, vote)?;
    }
    Ok(())
}

pub fn export_genesis(ctx: &Context<'_>, keeper: &GovKeeper) -> HubResult<GovGenesis> {
    Ok(GovGenesis {
        starting_proposal_id: keeper.next_proposal_id(ctx)?,
        params: keeper.params(ctx)?,
        proposals: keeper.proposals(ctx)?,
        deposits: keeper.all_deposits(ctx)?,
        votes: keeper.all_votes(ctx)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AccountKeeper;
    use crate::bank::BankKeeper;
    use crate::guardian::{AccountType, GuardianKeeper, Profiler};
    use crate::params::ParamsKeeper;
    use crate::staking::{StakingCore, UnwiredStaking, POWER_REDUCTION};
    use crate::testutil::{ctx_at, fresh_view};
    use crate::upgrade::ProtocolKeeper;
    use hub_01_store::catalog;
    use shared_types::{Address, Coins, HubError, ProtocolDefinition};

    const VAL_A: Address = Address([1; 20]);
    const VAL_B: Address = Address([2; 20]);
    const USER: Address = Address([9; 20]);

    struct Fixture {
        bank: BankKeeper,
        staking: StakingCore,
        guardian: GuardianKeeper,
        protocol: ProtocolKeeper,
        gov: GovKeeper,
    }

    fn fixture() -> Fixture {
        let params = ParamsKeeper::new(catalog::PARAMS).register::<GovParams>();
        let bank = BankKeeper::new(AccountKeeper::new(catalog::ACCOUNT));
        let staking = UnwiredStaking::new(catalog::STAKE, bank, params.subspace("stake")).core();
        let guardian = GuardianKeeper::new(catalog::GUARDIAN);
        let protocol = ProtocolKeeper::new(catalog::PROTOCOL);
        let gov = GovKeeper::new(catalog::GOV, params, bank, staking, guardian, protocol);
        Fixture {
            bank,
            staking,
            guardian,
            protocol,
            gov,
        }
    }

    fn min_deposit() -> Coins {
        Coins::single("stake", 10 * POWER_REDUCTION)
    }

    fn seed(f: &Fixture, ctx: &mut Context<'_>) {
        f.staking.set_last_power(ctx, &VAL_A, 10).unwrap();
        f.staking.set_last_power(ctx, &VAL_B, 10).unwrap();
        f.staking.set_last_total_power(ctx, 20).unwrap();
        for addr in [USER, VAL_A] {
            f.bank.add_coins(ctx, &addr, &min_deposit()).unwrap();
            f.staking.inflate(ctx, 10 * POWER_REDUCTION).unwrap();
        }
    }

    fn submit(handler: &GovHandler, ctx: &mut Context<'_>, proposer: Address, content: ProposalContent) -> HubResult<u64> {
        let res = handler.handle(
            ctx,
            &Msg::SubmitProposal(MsgSubmitProposal {
                title: "t".into(),
                description: "d".into(),
                content,
                proposer,
                initial_deposit: min_deposit(),
            }),
        )?;
        Ok(u64::from_be_bytes(res.data.try_into().unwrap()))
    }

    fn vote(handler: &GovHandler, ctx: &mut Context<'_>, id: u64, voter: Address, option: VoteOption) {
        handler
            .handle(ctx, &Msg::Vote(MsgVote { proposal_id: id, voter, option }))
            .unwrap();
    }

    #[test]
    fn test_parameter_change_passes_and_applies() {
        let f = fixture();
        let mut view = fresh_view();
        let handler = GovHandler::new(f.gov.clone());
        let id = {
            let mut ctx = ctx_at(&mut view, 1);
            seed(&f, &mut ctx);
            let id = submit(
                &handler,
                &mut ctx,
                USER,
                ProposalContent::ParameterChange(vec![ParamChange {
                    subspace: "gov".into(),
                    key: "voting_period".into(),
                    value: "5".into(),
                }]),
            )
            .unwrap();
            assert_eq!(id, STARTING_PROPOSAL_ID);
            assert_eq!(
                f.gov.get_proposal(&ctx, id).unwrap().unwrap().status,
                ProposalStatus::VotingPeriod
            );
            assert!(f.bank.get_coins(&ctx, &USER).unwrap().is_empty());
            vote(&handler, &mut ctx, id, VAL_A, VoteOption::Yes);
            vote(&handler, &mut ctx, id, VAL_B, VoteOption::Yes);
            let err = handler
                .handle(&mut ctx, &Msg::Vote(MsgVote { proposal_id: id, voter: USER, option: VoteOption::Yes }))
                .unwrap_err();
            assert!(matches!(err, HubError::Tx(TxError::Module { code: CODE_NOT_A_VOTER, .. })));
            id
        };

        let mut ctx = ctx_at(&mut view, 101);
        let tags = f.gov.end_blocker(&mut ctx).unwrap();
        assert_eq!(tags.get(keys::PROPOSAL_RESULT), Some("passed"));
        assert_eq!(f.gov.params(&ctx).unwrap().voting_period, 5);
        assert_eq!(f.gov.get_proposal(&ctx, id).unwrap().unwrap().tally_result.yes, 20);
        assert_eq!(f.bank.get_coins(&ctx, &USER).unwrap(), min_deposit());
    }

    #[test]
    fn test_veto_burns_deposits() {
        let f = fixture();
        let mut view = fresh_view();
        let handler = GovHandler::new(f.gov.clone());
        let mut ctx = ctx_at(&mut view, 1);
        seed(&f, &mut ctx);
        let loose_before = f.staking.pool(&ctx).unwrap().loose_tokens;
        let id = submit(&handler, &mut ctx, USER, ProposalContent::Text).unwrap();
        vote(&handler, &mut ctx, id, VAL_A, VoteOption::NoWithVeto);
        vote(&handler, &mut ctx, id, VAL_B, VoteOption::Yes);

        let mut ctx = ctx_at(&mut view, 101);
        let tags = f.gov.end_blocker(&mut ctx).unwrap();
        assert_eq!(tags.get(keys::PROPOSAL_RESULT), Some("vetoed"));
        assert!(f.bank.get_coins(&ctx, &deposit_holder()).unwrap().is_empty());
        assert_eq!(
            f.staking.pool(&ctx).unwrap().loose_tokens,
            loose_before - 10 * POWER_REDUCTION
        );
    }

    #[test]
    fn test_software_upgrade_requires_profiler_and_schedules() {
        let f = fixture();
        let mut view = fresh_view();
        let handler = GovHandler::new(f.gov.clone());
        let mut ctx = ctx_at(&mut view, 1);
        seed(&f, &mut ctx);
        let def = ProtocolDefinition::new(1, "hubd/v1", 500);

        let err = submit(&handler, &mut ctx, USER, ProposalContent::SoftwareUpgrade(def.clone())).unwrap_err();
        assert!(matches!(err, HubError::Tx(TxError::Module { code: CODE_NOT_PROFILER, .. })));

        f.guardian
            .set_profiler(
                &mut ctx,
                &Profiler {
                    name: "root".into(),
                    addr: VAL_A,
                    added_by: VAL_A,
                    account_type: AccountType::Genesis,
                },
            )
            .unwrap();
        let id = submit(&handler, &mut ctx, VAL_A, ProposalContent::SoftwareUpgrade(def.clone())).unwrap();
        vote(&handler, &mut ctx, id, VAL_A, VoteOption::Yes);
        vote(&handler, &mut ctx, id, VAL_B, VoteOption::Yes);

        let mut ctx = ctx_at(&mut view, 101);
        f.gov.end_blocker(&mut ctx).unwrap();
        let config = f.protocol.upgrade_config(&ctx).unwrap().unwrap();
        assert_eq!(config.proposal_id, id);
        assert_eq!(config.definition, def);
    }

    #[test]
    fn test_zero_height_refunds_open_proposals() {
        let f = fixture();
        let mut view = fresh_view();
        let handler = GovHandler::new(f.gov.clone());
        let mut ctx = ctx_at(&mut view, 1);
        seed(&f, &mut ctx);
        submit(&handler, &mut ctx, USER, ProposalContent::Text).unwrap();

        f.gov.prepare_for_zero_height(&mut ctx).unwrap();
        let exported = export_genesis(&ctx, &f.gov).unwrap();
        assert!(exported.proposals.is_empty());
        assert!(exported.deposits.is_empty());
        assert_eq!(exported.starting_proposal_id, STARTING_PROPOSAL_ID + 1);
        assert_eq!(f.bank.get_coins(&ctx, &USER).unwrap(), min_deposit());
        assert!(f.gov.end_blocker(&mut ctx).unwrap().is_empty());
    }
}
