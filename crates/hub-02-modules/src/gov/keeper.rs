//! # Governance Keeper
//!
//! ## Store layout (`gov`)
//!
//! | Prefix | Key | Value |
//! |--------|-----|-------|
//! | `0x00` | proposal id (BE) | [`Proposal`] |
//! | `0x01` | - | next proposal id |
//! | `0x10` | deposit end (BE) ++ id | inactive queue entry |
//! | `0x11` | voting end (BE) ++ id | active queue entry |
//! | `0x20` | id ++ depositor | [`Deposit`] |
//! | `0x21` | id ++ voter | [`Vote`] |
//!
//! Deposits are held by the `gov` module account until they are refunded or
//! burned.

use super::types::*;
use crate::bank::BankKeeper;
use crate::guardian::GuardianKeeper;
use crate::params::{ParamsKeeper, Subspace};
use crate::staking::StakingCore;
use crate::types::prefixed_key;
use crate::upgrade::{ProtocolKeeper, UpgradeConfig};
use hub_01_store::{Context, StoreKey};
use shared_types::tags::keys;
use shared_types::{Address, Coins, Dec, FatalError, Height, HubError, HubResult, Tags};
use tracing::{info, warn};

const PROPOSAL_PREFIX: &[u8] = &[0x00];
const NEXT_PROPOSAL_ID_KEY: &[u8] = &[0x01];
const INACTIVE_QUEUE_PREFIX: &[u8] = &[0x10];
const ACTIVE_QUEUE_PREFIX: &[u8] = &[0x11];
const DEPOSIT_PREFIX: &[u8] = &[0x20];
const VOTE_PREFIX: &[u8] = &[0x21];

pub const STARTING_PROPOSAL_ID: u64 = 1;

/// Account holding every pending deposit.
pub fn deposit_holder() -> Address {
    Address::for_module("gov")
}

fn queue_key(prefix: &[u8], height: Height, id: u64) -> Vec<u8> {
    prefixed_key(prefix, &[&height.to_be_bytes(), &id.to_be_bytes()])
}

#[derive(Clone)]
pub struct GovKeeper {
    key: StoreKey,
    params: Subspace,
    param_registry: ParamsKeeper,
    bank: BankKeeper,
    staking: StakingCore,
    guardian: GuardianKeeper,
    protocol: ProtocolKeeper,
}

impl GovKeeper {
    pub fn new(
        key: StoreKey,
        param_registry: ParamsKeeper,
        bank: BankKeeper,
        staking: StakingCore,
        guardian: GuardianKeeper,
        protocol: ProtocolKeeper,
    ) -> Self {
        Self {
            key,
            params: param_registry.subspace("gov"),
            param_registry,
            bank,
            staking,
            guardian,
            protocol,
        }
    }

    pub fn params(&self, ctx: &Context<'_>) -> HubResult<GovParams> {
        self.params.get(ctx)
    }

    pub fn set_params(&self, ctx: &mut Context<'_>, params: &GovParams) -> HubResult<()> {
        self.params.set(ctx, params)
    }

    // -------------------------------------------------------------------------
    // Proposals
    // -------------------------------------------------------------------------

    pub fn get_proposal(&self, ctx: &Context<'_>, id: u64) -> HubResult<Option<Proposal>> {
        Ok(ctx.get_obj(self.key, &prefixed_key(PROPOSAL_PREFIX, &[&id.to_be_bytes()]))?)
    }

    pub fn set_proposal(&self, ctx: &mut Context<'_>, proposal: &Proposal) -> HubResult<()> {
        ctx.set_obj(
            self.key,
            prefixed_key(PROPOSAL_PREFIX, &[&proposal.id.to_be_bytes()]),
            proposal,
        )?;
        Ok(())
    }

    pub fn proposals(&self, ctx: &Context<'_>) -> HubResult<Vec<Proposal>> {
        Ok(ctx
            .iter_prefix_obj(self.key, PROPOSAL_PREFIX)?
            .into_iter()
            .map(|(_, p)| p)
            .collect())
    }

    fn require_proposal(&self, ctx: &Context<'_>, id: u64) -> HubResult<Proposal> {
        self.get_proposal(ctx, id)?
            .ok_or_else(|| err(CODE_UNKNOWN_PROPOSAL, format!("proposal {id} does not exist")).into())
    }

    /// Removes the proposal with its queue entries and votes. Deposits must
    /// already be settled.
    fn delete_proposal(&self, ctx: &mut Context<'_>, proposal: &Proposal) -> HubResult<()> {
        ctx.delete(
            self.key,
            &queue_key(INACTIVE_QUEUE_PREFIX, proposal.deposit_end_height, proposal.id),
        )?;
        ctx.delete(
            self.key,
            &queue_key(ACTIVE_QUEUE_PREFIX, proposal.voting_end_height, proposal.id),
        )?;
        for (k, _) in ctx.iter_prefix(self.key, &prefixed_key(VOTE_PREFIX, &[&proposal.id.to_be_bytes()]))? {
            ctx.delete(self.key, &k)?;
        }
        ctx.delete(self.key, &prefixed_key(PROPOSAL_PREFIX, &[&proposal.id.to_be_bytes()]))?;
        Ok(())
    }

    pub fn next_proposal_id(&self, ctx: &Context<'_>) -> HubResult<u64> {
        Ok(ctx.get_obj(self.key, NEXT_PROPOSAL_ID_KEY)?.unwrap_or(STARTING_PROPOSAL_ID))
    }

    pub fn set_next_proposal_id(&self, ctx: &mut Context<'_>, id: u64) -> HubResult<()> {
        ctx.set_obj(self.key, NEXT_PROPOSAL_ID_KEY.to_vec(), &id)?;
        Ok(())
    }

    fn enqueue(&self, ctx: &mut Context<'_>, prefix: &[u8], height: Height, id: u64) -> HubResult<()> {
        ctx.set(self.key, queue_key(prefix, height, id), id.to_be_bytes().to_vec())?;
        Ok(())
    }

    /// Ids queued under `prefix` whose height is at or before `height`.
    fn due(&self, ctx: &Context<'_>, prefix: &[u8], height: Height) -> HubResult<Vec<u64>> {
        let mut ids = Vec::new();
        for (k, v) in ctx.iter_prefix(self.key, prefix)? {
            let at = k
                .get(prefix.len()..prefix.len() + 8)
                .and_then(|b| <[u8; 8]>::try_from(b).ok())
                .map(u64::from_be_bytes)
                .ok_or_else(|| FatalError::StoreCorruption("gov queue key".into()))?;
            if at > height {
                break;
            }
            let id = <[u8; 8]>::try_from(v.as_slice())
                .map(u64::from_be_bytes)
                .map_err(|_| FatalError::StoreCorruption("gov queue value".into()))?;
            ids.push(id);
        }
        Ok(ids)
    }

    /// Stateful checks of a new proposal's content.
    fn check_content(&self, ctx: &Context<'_>, proposer: &Address, content: &ProposalContent) -> HubResult<()> {
        match content {
            ProposalContent::Text => Ok(()),
            ProposalContent::ParameterChange(changes) => {
                for change in changes {
                    self.param_registry
                        .check_change(&change.subspace, &change.key, &change.json_value()?)?;
                }
                Ok(())
            }
            ProposalContent::SoftwareUpgrade(def) => {
                if !self.guardian.is_profiler(ctx, proposer)? {
                    return Err(err(CODE_NOT_PROFILER, "only profilers may propose software upgrades").into());
                }
                let current = self.protocol.current_version(ctx)?;
                if def.version != current + 1 {
                    return Err(err(
                        CODE_UPGRADE_CONFLICT,
                        format!("next version must be {}, got {}", current + 1, def.version),
                    )
                    .into());
                }
                if self.protocol.upgrade_config(ctx)?.is_some() {
                    return Err(err(CODE_UPGRADE_CONFLICT, "an upgrade is already scheduled").into());
                }
                if def.height <= ctx.block_height() {
                    return Err(err(CODE_UPGRADE_CONFLICT, "switch height must be in the future").into());
                }
                Ok(())
            }
        }
    }

    pub fn submit_proposal(
        &self,
        ctx: &mut Context<'_>,
        title: &str,
        description: &str,
        content: ProposalContent,
        proposer: &Address,
    ) -> HubResult<u64> {
        self.check_content(ctx, proposer, &content)?;
        let params = self.params(ctx)?;
        let height = ctx.block_height();
        let id = self.next_proposal_id(ctx)?;
        self.set_next_proposal_id(ctx, id + 1)?;

        let proposal = Proposal {
            id,
            title: title.to_string(),
            description: description.to_string(),
            content,
            proposer: *proposer,
            status: ProposalStatus::DepositPeriod,
            tally_result: TallyResult::default(),
            submit_height: height,
            deposit_end_height: height + params.max_deposit_period,
            total_deposit: Coins::empty(),
            voting_start_height: 0,
            voting_end_height: 0,
        };
        self.set_proposal(ctx, &proposal)?;
        self.enqueue(ctx, INACTIVE_QUEUE_PREFIX, proposal.deposit_end_height, id)?;
        info!("[gov] proposal {id} ({}) submitted by {proposer}", proposal.content.kind());
        Ok(id)
    }

    // -------------------------------------------------------------------------
    // Deposits
    // -------------------------------------------------------------------------

    fn deposit_key(id: u64, depositor: &Address) -> Vec<u8> {
        prefixed_key(DEPOSIT_PREFIX, &[&id.to_be_bytes(), depositor.as_bytes()])
    }

    pub fn get_deposit(&self, ctx: &Context<'_>, id: u64, depositor: &Address) -> HubResult<Option<Deposit>> {
        Ok(ctx.get_obj(self.key, &Self::deposit_key(id, depositor))?)
    }

    pub fn set_deposit(&self, ctx: &mut Context<'_>, deposit: &Deposit) -> HubResult<()> {
        ctx.set_obj(self.key, Self::deposit_key(deposit.proposal_id, &deposit.depositor), deposit)?;
        Ok(())
    }

    pub fn deposits(&self, ctx: &Context<'_>, id: u64) -> HubResult<Vec<Deposit>> {
        Ok(ctx
            .iter_prefix_obj(self.key, &prefixed_key(DEPOSIT_PREFIX, &[&id.to_be_bytes()]))?
            .into_iter()
            .map(|(_, d)| d)
            .collect())
    }

    pub fn all_deposits(&self, ctx: &Context<'_>) -> HubResult<Vec<Deposit>> {
        Ok(ctx
            .iter_prefix_obj(self.key, DEPOSIT_PREFIX)?
            .into_iter()
            .map(|(_, d)| d)
            .collect())
    }

    /// Escrows `amount` and returns true when the deposit opened the voting
    /// period.
    pub fn add_deposit(&self, ctx: &mut Context<'_>, id: u64, depositor: &Address, amount: &Coins) -> HubResult<bool> {
        let mut proposal = self.require_proposal(ctx, id)?;
        if proposal.status.is_finished() {
            return Err(err(CODE_INACTIVE_PROPOSAL, format!("proposal {id} is finished")).into());
        }
        self.bank.send_coins(ctx, depositor, &deposit_holder(), amount)?;

        let mut deposit = self.get_deposit(ctx, id, depositor)?.unwrap_or(Deposit {
            proposal_id: id,
            depositor: *depositor,
            amount: Coins::empty(),
        });
        deposit.amount = deposit.amount.plus(amount);
        self.set_deposit(ctx, &deposit)?;
        proposal.total_deposit = proposal.total_deposit.plus(amount);

        let min_deposit = self.params(ctx)?.min_deposit;
        let activated =
            proposal.status == ProposalStatus::DepositPeriod && proposal.total_deposit.is_all_gte(&min_deposit);
        if activated {
            self.activate_voting_period(ctx, &mut proposal)?;
        }
        self.set_proposal(ctx, &proposal)?;
        Ok(activated)
    }

    fn activate_voting_period(&self, ctx: &mut Context<'_>, proposal: &mut Proposal) -> HubResult<()> {
        let height = ctx.block_height();
        ctx.delete(
            self.key,
            &queue_key(INACTIVE_QUEUE_PREFIX, proposal.deposit_end_height, proposal.id),
        )?;
        proposal.status = ProposalStatus::VotingPeriod;
        proposal.voting_start_height = height;
        proposal.voting_end_height = height + self.params(ctx)?.voting_period;
        self.enqueue(ctx, ACTIVE_QUEUE_PREFIX, proposal.voting_end_height, proposal.id)?;
        info!("[gov] proposal {} entered its voting period", proposal.id);
        Ok(())
    }

    /// Returns every deposit of `id` to its depositor.
    pub fn refund_deposits(&self, ctx: &mut Context<'_>, id: u64) -> HubResult<()> {
        for deposit in self.deposits(ctx, id)? {
            self.bank
                .send_coins(ctx, &deposit_holder(), &deposit.depositor, &deposit.amount)?;
            ctx.delete(self.key, &Self::deposit_key(id, &deposit.depositor))?;
        }
        Ok(())
    }

    /// Destroys every deposit of `id`; the bond-denom part leaves the supply.
    pub fn burn_deposits(&self, ctx: &mut Context<'_>, id: u64) -> HubResult<()> {
        let bond_denom = self.staking.bond_denom(ctx)?;
        for deposit in self.deposits(ctx, id)? {
            self.bank.subtract_coins(ctx, &deposit_holder(), &deposit.amount)?;
            let burned = deposit.amount.amount_of(&bond_denom);
            if burned > 0 {
                self.staking.burn_loose(ctx, burned)?;
            }
            ctx.delete(self.key, &Self::deposit_key(id, &deposit.depositor))?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Votes
    // -------------------------------------------------------------------------

    pub fn votes(&self, ctx: &Context<'_>, id: u64) -> HubResult<Vec<Vote>> {
        Ok(ctx
            .iter_prefix_obj(self.key, &prefixed_key(VOTE_PREFIX, &[&id.to_be_bytes()]))?
            .into_iter()
            .map(|(_, v)| v)
            .collect())
    }

    pub fn all_votes(&self, ctx: &Context<'_>) -> HubResult<Vec<Vote>> {
        Ok(ctx
            .iter_prefix_obj(self.key, VOTE_PREFIX)?
            .into_iter()
            .map(|(_, v)| v)
            .collect())
    }

    pub fn set_vote(&self, ctx: &mut Context<'_>, vote: &Vote) -> HubResult<()> {
        ctx.set_obj(
            self.key,
            prefixed_key(VOTE_PREFIX, &[&vote.proposal_id.to_be_bytes(), vote.voter.as_bytes()]),
            vote,
        )?;
        Ok(())
    }

    /// Only operators of validators in the last bonded set may vote. A later
    /// vote replaces an earlier one.
    pub fn add_vote(&self, ctx: &mut Context<'_>, id: u64, voter: &Address, option: VoteOption) -> HubResult<()> {
        let proposal = self.require_proposal(ctx, id)?;
        if proposal.status != ProposalStatus::VotingPeriod {
            return Err(err(CODE_INACTIVE_PROPOSAL, format!("proposal {id} is not in its voting period")).into());
        }
        if self.staking.get_last_power(ctx, voter)?.is_none() {
            return Err(err(CODE_NOT_A_VOTER, format!("{voter} is not a bonded validator")).into());
        }
        self.set_vote(
            ctx,
            &Vote {
                proposal_id: id,
                voter: *voter,
                option,
            },
        )
    }

    /// Weighs each vote by the voter's last bonded power.
    pub fn tally(&self, ctx: &Context<'_>, id: u64) -> HubResult<TallyResult> {
        let mut result = TallyResult::default();
        for vote in self.votes(ctx, id)? {
            let Some(power) = self.staking.get_last_power(ctx, &vote.voter)? else {
                continue;
            };
            match vote.option {
                VoteOption::Yes => result.yes += power,
                VoteOption::Abstain => result.abstain += power,
                VoteOption::No => result.no += power,
                VoteOption::NoWithVeto => result.no_with_veto += power,
            }
        }
        Ok(result)
    }

    // -------------------------------------------------------------------------
    // End block
    // -------------------------------------------------------------------------

    pub fn end_blocker(&self, ctx: &mut Context<'_>) -> HubResult<Tags> {
        let height = ctx.block_height();
        let mut tags = Tags::new();

        for id in self.due(ctx, INACTIVE_QUEUE_PREFIX, height)? {
            let proposal = self.require_proposal(ctx, id)?;
            self.burn_deposits(ctx, id)?;
            self.delete_proposal(ctx, &proposal)?;
            info!("[gov] proposal {id} dropped, minimum deposit not reached");
            tags.push(keys::PROPOSAL_ID, id);
            tags.push(keys::PROPOSAL_RESULT, "dropped");
        }

        for id in self.due(ctx, ACTIVE_QUEUE_PREFIX, height)? {
            let mut proposal = self.require_proposal(ctx, id)?;
            ctx.delete(self.key, &queue_key(ACTIVE_QUEUE_PREFIX, proposal.voting_end_height, id))?;
            let tally = self.tally(ctx, id)?;
            let verdict = self.verdict(ctx, &tally)?;
            proposal.tally_result = tally;

            let result = match verdict {
                Verdict::Pass => match self.execute(ctx, &proposal)? {
                    Ok(()) => {
                        proposal.status = ProposalStatus::Passed;
                        self.refund_deposits(ctx, id)?;
                        "passed"
                    }
                    Err(e) => {
                        warn!("[gov] proposal {id} passed but failed to execute: {e}");
                        proposal.status = ProposalStatus::Rejected;
                        self.refund_deposits(ctx, id)?;
                        "execution-failed"
                    }
                },
                Verdict::Reject => {
                    proposal.status = ProposalStatus::Rejected;
                    self.refund_deposits(ctx, id)?;
                    "rejected"
                }
                Verdict::Veto => {
                    proposal.status = ProposalStatus::Rejected;
                    self.burn_deposits(ctx, id)?;
                    "vetoed"
                }
            };
            self.set_proposal(ctx, &proposal)?;
            info!("[gov] proposal {id} tallied: {result}");
            tags.push(keys::PROPOSAL_ID, id);
            tags.push(keys::PROPOSAL_RESULT, result);
        }
        Ok(tags)
    }

    fn verdict(&self, ctx: &Context<'_>, tally: &TallyResult) -> HubResult<Verdict> {
        let params = self.params(ctx)?;
        let total = u128::from(self.staking.last_total_power(ctx)?);
        let voted = u128::from(tally.total());
        if total == 0 || Dec::from_ratio(voted, total) < params.participation {
            return Ok(Verdict::Reject);
        }
        if Dec::from_ratio(u128::from(tally.no_with_veto), voted) > params.veto {
            return Ok(Verdict::Veto);
        }
        let non_abstain = voted - u128::from(tally.abstain);
        if non_abstain > 0 && Dec::from_ratio(u128::from(tally.yes), non_abstain) > params.threshold {
            Ok(Verdict::Pass)
        } else {
            Ok(Verdict::Reject)
        }
    }

    /// Applies a passed proposal inside a branch. A rejected execution leaves
    /// no writes behind and is reported in the inner result.
    fn execute(&self, ctx: &mut Context<'_>, proposal: &Proposal) -> HubResult<Result<(), HubError>> {
        ctx.branch();
        let applied = match &proposal.content {
            ProposalContent::Text => Ok(()),
            ProposalContent::ParameterChange(changes) => self.apply_param_changes(ctx, changes),
            ProposalContent::SoftwareUpgrade(def) => self.schedule_upgrade(ctx, proposal.id, def),
        };
        match applied {
            Ok(()) => {
                ctx.write_branch();
                Ok(Ok(()))
            }
            Err(e) if e.is_fatal() => {
                ctx.discard_branch();
                Err(e)
            }
            Err(e) => {
                ctx.discard_branch();
                Ok(Err(e))
            }
        }
    }

    fn apply_param_changes(&self, ctx: &mut Context<'_>, changes: &[ParamChange]) -> HubResult<()> {
        for change in changes {
            self.param_registry
                .apply_change(ctx, &change.subspace, &change.key, &change.json_value()?)?;
            info!("[gov] parameter {}/{} changed to {}", change.subspace, change.key, change.value);
        }
        Ok(())
    }

    fn schedule_upgrade(
        &self,
        ctx: &mut Context<'_>,
        proposal_id: u64,
        def: &shared_types::ProtocolDefinition,
    ) -> HubResult<()> {
        if self.protocol.upgrade_config(ctx)?.is_some() {
            return Err(err(CODE_UPGRADE_CONFLICT, "an upgrade is already scheduled").into());
        }
        if def.height <= ctx.block_height() {
            return Err(err(CODE_UPGRADE_CONFLICT, "switch height already passed").into());
        }
        self.protocol.set_upgrade_config(
            ctx,
            &UpgradeConfig {
                proposal_id,
                definition: def.clone(),
            },
        )?;
        info!("[gov] version {} scheduled for height {}", def.version, def.height);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Genesis support
    // -------------------------------------------------------------------------

    /// Restores queue entries for an imported proposal.
    pub(crate) fn requeue(&self, ctx: &mut Context<'_>, proposal: &Proposal) -> HubResult<()> {
        match proposal.status {
            ProposalStatus::DepositPeriod => {
                self.enqueue(ctx, INACTIVE_QUEUE_PREFIX, proposal.deposit_end_height, proposal.id)
            }
            ProposalStatus::VotingPeriod => {
                self.enqueue(ctx, ACTIVE_QUEUE_PREFIX, proposal.voting_end_height, proposal.id)
            }
            ProposalStatus::Passed | ProposalStatus::Rejected => Ok(()),
        }
    }

    /// Refunds unfinished proposals and drops every proposal.
    pub fn prepare_for_zero_height(&self, ctx: &mut Context<'_>) -> HubResult<()> {
        for proposal in self.proposals(ctx)? {
            if !proposal.status.is_finished() {
                self.refund_deposits(ctx, proposal.id)?;
            }
            self.delete_proposal(ctx, &proposal)?;
        }
        Ok(())
    }
}

enum Verdict {
    Pass,
    Reject,
    Veto,
}
