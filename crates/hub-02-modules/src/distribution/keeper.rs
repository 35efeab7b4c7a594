//! # Distribution Keeper
//!
//! Lazy reward accounting. Collected fees land in the global validator pool at
//! begin block; a validator claims its share of that pool in proportion to
//! `power × blocks` since its last claim, and a delegator claims from its
//! validator's delegator pool in proportion to `shares × blocks`.
//!
//! Every split is computed as one multiplication and one subtraction, so the
//! decimal holdings always add up to exactly what was allocated.
//!
//! ## Store layout (`distr`)
//!
//! | Prefix | Key | Value |
//! |--------|-----|-------|
//! | `0x00` | - | [`FeePool`] |
//! | `0x01` | operator | [`ValidatorDistInfo`] |
//! | `0x02` | delegator ++ validator | [`DelegationDistInfo`] |
//! | `0x03` | delegator | withdraw address |
//! | `0x04` | - | previous proposer (consensus address) |

use super::types::*;
use crate::auth::FeeKeeper;
use crate::bank::BankKeeper;
use crate::params::Subspace;
use crate::staking::StakingCore;
use crate::types::prefixed_key;
use hub_01_store::{Context, StoreKey};
use shared_types::tags::keys;
use shared_types::{Address, Coins, Dec, DecCoins, FatalError, HubResult, Tags, TxError, VoteInfo};
use tracing::{debug, warn};

const FEE_POOL_KEY: &[u8] = &[0x00];
const VDI_PREFIX: &[u8] = &[0x01];
const DDI_PREFIX: &[u8] = &[0x02];
const WITHDRAW_ADDR_PREFIX: &[u8] = &[0x03];
const PROPOSER_KEY: &[u8] = &[0x04];

fn pool_underflow(what: &str) -> FatalError {
    FatalError::InvariantBroken {
        name: "distribution-pools".into(),
        detail: format!("{what} would go negative"),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DistributionKeeper {
    key: StoreKey,
    params: Subspace,
    bank: BankKeeper,
    staking: StakingCore,
    fees: FeeKeeper,
}

impl DistributionKeeper {
    pub fn new(key: StoreKey, params: Subspace, bank: BankKeeper, staking: StakingCore, fees: FeeKeeper) -> Self {
        Self {
            key,
            params,
            bank,
            staking,
            fees,
        }
    }

    pub fn params(&self, ctx: &Context<'_>) -> HubResult<DistrParams> {
        self.params.get(ctx)
    }

    pub fn set_params(&self, ctx: &mut Context<'_>, params: &DistrParams) -> HubResult<()> {
        self.params.set(ctx, params)
    }

    // -------------------------------------------------------------------------
    // Records
    // -------------------------------------------------------------------------

    pub fn fee_pool(&self, ctx: &Context<'_>) -> HubResult<FeePool> {
        Ok(ctx.get_obj(self.key, FEE_POOL_KEY)?.unwrap_or_default())
    }

    pub fn set_fee_pool(&self, ctx: &mut Context<'_>, pool: &FeePool) -> HubResult<()> {
        ctx.set_obj(self.key, FEE_POOL_KEY.to_vec(), pool)?;
        Ok(())
    }

    pub fn get_vdi(&self, ctx: &Context<'_>, operator: &Address) -> HubResult<Option<ValidatorDistInfo>> {
        Ok(ctx.get_obj(self.key, &prefixed_key(VDI_PREFIX, &[operator.as_bytes()]))?)
    }

    pub fn set_vdi(&self, ctx: &mut Context<'_>, vdi: &ValidatorDistInfo) -> HubResult<()> {
        ctx.set_obj(self.key, prefixed_key(VDI_PREFIX, &[vdi.operator.as_bytes()]), vdi)?;
        Ok(())
    }

    fn delete_vdi(&self, ctx: &mut Context<'_>, operator: &Address) -> HubResult<()> {
        ctx.delete(self.key, &prefixed_key(VDI_PREFIX, &[operator.as_bytes()]))?;
        Ok(())
    }

    pub fn vdis(&self, ctx: &Context<'_>) -> HubResult<Vec<ValidatorDistInfo>> {
        Ok(ctx
            .iter_prefix_obj(self.key, VDI_PREFIX)?
            .into_iter()
            .map(|(_, v)| v)
            .collect())
    }

    pub fn get_ddi(
        &self,
        ctx: &Context<'_>,
        delegator: &Address,
        validator: &Address,
    ) -> HubResult<Option<DelegationDistInfo>> {
        Ok(ctx.get_obj(
            self.key,
            &prefixed_key(DDI_PREFIX, &[delegator.as_bytes(), validator.as_bytes()]),
        )?)
    }

    pub fn set_ddi(&self, ctx: &mut Context<'_>, ddi: &DelegationDistInfo) -> HubResult<()> {
        ctx.set_obj(
            self.key,
            prefixed_key(DDI_PREFIX, &[ddi.delegator.as_bytes(), ddi.validator.as_bytes()]),
            ddi,
        )?;
        Ok(())
    }

    pub(crate) fn delete_ddi(&self, ctx: &mut Context<'_>, delegator: &Address, validator: &Address) -> HubResult<()> {
        ctx.delete(
            self.key,
            &prefixed_key(DDI_PREFIX, &[delegator.as_bytes(), validator.as_bytes()]),
        )?;
        Ok(())
    }

    pub fn ddis(&self, ctx: &Context<'_>) -> HubResult<Vec<DelegationDistInfo>> {
        Ok(ctx
            .iter_prefix_obj(self.key, DDI_PREFIX)?
            .into_iter()
            .map(|(_, d)| d)
            .collect())
    }

    pub fn delegator_ddis(&self, ctx: &Context<'_>, delegator: &Address) -> HubResult<Vec<DelegationDistInfo>> {
        Ok(ctx
            .iter_prefix_obj(self.key, &prefixed_key(DDI_PREFIX, &[delegator.as_bytes()]))?
            .into_iter()
            .map(|(_, d)| d)
            .collect())
    }

    /// Where `delegator`'s rewards are paid; the delegator itself by default.
    pub fn withdraw_addr(&self, ctx: &Context<'_>, delegator: &Address) -> HubResult<Address> {
        Ok(ctx
            .get(self.key, &prefixed_key(WITHDRAW_ADDR_PREFIX, &[delegator.as_bytes()]))?
            .and_then(|bytes| Address::from_slice(&bytes))
            .unwrap_or(*delegator))
    }

    pub fn set_withdraw_addr(&self, ctx: &mut Context<'_>, delegator: &Address, addr: &Address) -> HubResult<()> {
        ctx.set(
            self.key,
            prefixed_key(WITHDRAW_ADDR_PREFIX, &[delegator.as_bytes()]),
            addr.as_bytes().to_vec(),
        )?;
        Ok(())
    }

    pub fn withdraw_infos(&self, ctx: &Context<'_>) -> HubResult<Vec<DelegatorWithdrawInfo>> {
        let mut out = Vec::new();
        for (key, value) in ctx.iter_prefix(self.key, WITHDRAW_ADDR_PREFIX)? {
            let (Some(delegator), Some(withdraw_addr)) =
                (key.get(1..).and_then(Address::from_slice), Address::from_slice(&value))
            else {
                return Err(FatalError::StoreCorruption("withdraw address entry".into()).into());
            };
            out.push(DelegatorWithdrawInfo { delegator, withdraw_addr });
        }
        Ok(out)
    }

    pub fn previous_proposer(&self, ctx: &Context<'_>) -> HubResult<Address> {
        Ok(ctx
            .get(self.key, PROPOSER_KEY)?
            .and_then(|bytes| Address::from_slice(&bytes))
            .unwrap_or_default())
    }

    pub fn set_previous_proposer(&self, ctx: &mut Context<'_>, cons: &Address) -> HubResult<()> {
        ctx.set(self.key, PROPOSER_KEY.to_vec(), cons.as_bytes().to_vec())?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Settlement
    // -------------------------------------------------------------------------

    /// Moves the validator's share of the global pool, accrued since its last
    /// claim at its last bonded power, into its commission and delegator pool.
    fn take_fee_pool_rewards(
        &self,
        ctx: &Context<'_>,
        fp: &mut FeePool,
        vdi: &mut ValidatorDistInfo,
        commission_rate: Dec,
        delegator_shares: Dec,
    ) -> HubResult<()> {
        let height = ctx.block_height();
        let total_power = self.staking.last_total_power(ctx)?;
        let power = self.staking.get_last_power(ctx, &vdi.operator)?.unwrap_or(0);

        fp.total_val_accum.update(height, Dec::from_int(u128::from(total_power)));
        vdi.del_accum.update(height, delegator_shares);

        let blocks = height.saturating_sub(vdi.fee_pool_withdrawal_height);
        vdi.fee_pool_withdrawal_height = height;
        let accum = Dec::from_int(u128::from(power)).mul_int(u128::from(blocks));
        if accum > fp.total_val_accum.accum {
            return Err(FatalError::InvariantBroken {
                name: "distribution-accum".into(),
                detail: format!(
                    "validator {} accum {accum} exceeds total {}",
                    vdi.operator, fp.total_val_accum.accum
                ),
            }
            .into());
        }
        if accum.is_zero() {
            return Ok(());
        }

        let withdrawal = fp.val_pool.mul_ratio(accum, fp.total_val_accum.accum);
        fp.val_pool = fp
            .val_pool
            .checked_minus(&withdrawal)
            .ok_or_else(|| pool_underflow("validator pool"))?;
        fp.total_val_accum.accum = fp
            .total_val_accum
            .accum
            .checked_sub(accum)
            .ok_or_else(|| pool_underflow("total validator accum"))?;

        let commission = withdrawal.mul_dec(commission_rate);
        let after_commission = withdrawal
            .checked_minus(&commission)
            .ok_or_else(|| pool_underflow("commission split"))?;
        vdi.val_commission = vdi.val_commission.plus(&commission);
        vdi.del_pool = vdi.del_pool.plus(&after_commission);
        Ok(())
    }

    fn require_vdi(&self, ctx: &Context<'_>, operator: &Address) -> HubResult<ValidatorDistInfo> {
        self.get_vdi(ctx, operator)?.ok_or_else(|| no_dist_info(operator).into())
    }

    /// Brings the validator's records forward to the current height.
    pub fn settle_validator(&self, ctx: &mut Context<'_>, operator: &Address) -> HubResult<()> {
        let validator = self.staking.get_validator(ctx, operator)?.ok_or_else(|| {
            TxError::module(super::CODESPACE, CODE_NO_VALIDATOR, format!("validator {operator} does not exist"))
        })?;
        let mut fp = self.fee_pool(ctx)?;
        let mut vdi = self.require_vdi(ctx, operator)?;
        self.take_fee_pool_rewards(ctx, &mut fp, &mut vdi, validator.commission.rate, validator.delegator_shares)?;
        self.set_fee_pool(ctx, &fp)?;
        self.set_vdi(ctx, &vdi)
    }

    /// Computes and removes the delegation's reward from its validator's pool.
    fn take_delegation_reward(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        validator: &Address,
    ) -> HubResult<DecCoins> {
        let height = ctx.block_height();
        let v = self.staking.get_validator(ctx, validator)?.ok_or_else(|| {
            TxError::module(super::CODESPACE, CODE_NO_VALIDATOR, format!("validator {validator} does not exist"))
        })?;
        let delegation = self
            .staking
            .get_delegation(ctx, delegator, validator)?
            .ok_or_else(|| no_dist_info(format!("delegation {delegator}/{validator}")))?;
        let mut ddi = self
            .get_ddi(ctx, delegator, validator)?
            .ok_or_else(|| no_dist_info(format!("delegation {delegator}/{validator}")))?;
        let mut fp = self.fee_pool(ctx)?;
        let mut vdi = self.require_vdi(ctx, validator)?;

        self.take_fee_pool_rewards(ctx, &mut fp, &mut vdi, v.commission.rate, v.delegator_shares)?;

        let blocks = height.saturating_sub(ddi.del_pool_withdrawal_height);
        ddi.del_pool_withdrawal_height = height;
        let accum = delegation.shares.mul_int(u128::from(blocks));
        if accum > vdi.del_accum.accum {
            return Err(FatalError::InvariantBroken {
                name: "distribution-accum".into(),
                detail: format!("delegation {delegator}/{validator} accum exceeds its validator's"),
            }
            .into());
        }
        let withdrawal = if accum.is_zero() {
            DecCoins::empty()
        } else {
            let w = vdi.del_pool.mul_ratio(accum, vdi.del_accum.accum);
            vdi.del_pool = vdi
                .del_pool
                .checked_minus(&w)
                .ok_or_else(|| pool_underflow("delegator pool"))?;
            vdi.del_accum.accum = vdi
                .del_accum
                .accum
                .checked_sub(accum)
                .ok_or_else(|| pool_underflow("delegator accum"))?;
            w
        };

        self.set_fee_pool(ctx, &fp)?;
        self.set_vdi(ctx, &vdi)?;
        self.set_ddi(ctx, &ddi)?;
        Ok(withdrawal)
    }

    /// Pays whole coins to the withdraw address; the fractional change goes
    /// to the community pool.
    fn pay_out(&self, ctx: &mut Context<'_>, delegator: &Address, amount: &DecCoins) -> HubResult<Coins> {
        let (coins, change) = amount.truncate_decimal();
        if !change.is_zero() {
            let mut fp = self.fee_pool(ctx)?;
            fp.community_pool = fp.community_pool.plus(&change);
            self.set_fee_pool(ctx, &fp)?;
        }
        if !coins.is_empty() {
            let to = self.withdraw_addr(ctx, delegator)?;
            self.bank.add_coins(ctx, &to, &coins)?;
        }
        Ok(coins)
    }

    pub fn withdraw_delegation_reward(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        validator: &Address,
    ) -> HubResult<Coins> {
        let reward = self.take_delegation_reward(ctx, delegator, validator)?;
        self.pay_out(ctx, delegator, &reward)
    }

    pub fn withdraw_delegation_rewards_all(&self, ctx: &mut Context<'_>, delegator: &Address) -> HubResult<Coins> {
        let mut total = DecCoins::empty();
        for ddi in self.delegator_ddis(ctx, delegator)? {
            total = total.plus(&self.take_delegation_reward(ctx, delegator, &ddi.validator)?);
        }
        self.pay_out(ctx, delegator, &total)
    }

    /// Self-delegation reward plus accumulated commission of `operator`.
    pub fn withdraw_validator_rewards_all(&self, ctx: &mut Context<'_>, operator: &Address) -> HubResult<Coins> {
        let mut total = DecCoins::empty();
        if self.get_ddi(ctx, operator, operator)?.is_some()
            && self.staking.get_delegation(ctx, operator, operator)?.is_some()
        {
            total = self.take_delegation_reward(ctx, operator, operator)?;
        }
        self.settle_validator(ctx, operator)?;
        let mut vdi = self.require_vdi(ctx, operator)?;
        total = total.plus(&vdi.val_commission);
        vdi.val_commission = DecCoins::empty();
        self.set_vdi(ctx, &vdi)?;
        self.pay_out(ctx, operator, &total)
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    pub(crate) fn on_validator_created(&self, ctx: &mut Context<'_>, operator: &Address) -> HubResult<()> {
        self.set_vdi(ctx, &ValidatorDistInfo::new(*operator, ctx.block_height()))
    }

    pub(crate) fn on_validator_modified(&self, ctx: &mut Context<'_>, operator: &Address) -> HubResult<()> {
        // Nothing has accrued at genesis.
        if ctx.block_height() == 0 {
            return Ok(());
        }
        self.withdraw_validator_rewards_all(ctx, operator)?;
        Ok(())
    }

    /// Pays the commission out and hands the unclaimed delegator pool to the
    /// community. The validator record is already gone.
    pub(crate) fn on_validator_removed(&self, ctx: &mut Context<'_>, operator: &Address) -> HubResult<()> {
        let Some(vdi) = self.get_vdi(ctx, operator)? else {
            return Ok(());
        };
        let mut fp = self.fee_pool(ctx)?;
        fp.community_pool = fp.community_pool.plus(&vdi.del_pool);
        self.set_fee_pool(ctx, &fp)?;
        self.pay_out(ctx, operator, &vdi.val_commission)?;
        self.delete_vdi(ctx, operator)
    }

    pub(crate) fn on_delegation_created(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        validator: &Address,
    ) -> HubResult<()> {
        // The validator's delegator accum must be current before shares change.
        if let Some(v) = self.staking.get_validator(ctx, validator)? {
            let mut vdi = self.require_vdi(ctx, validator)?;
            vdi.del_accum.update(ctx.block_height(), v.delegator_shares);
            self.set_vdi(ctx, &vdi)?;
        }
        self.set_ddi(
            ctx,
            &DelegationDistInfo {
                delegator: *delegator,
                validator: *validator,
                del_pool_withdrawal_height: ctx.block_height(),
            },
        )
    }

    // -------------------------------------------------------------------------
    // Begin block
    // -------------------------------------------------------------------------

    /// Splits the collected fees between the previous proposer, the community
    /// pool and the global validator pool.
    pub fn allocate_tokens(&self, ctx: &mut Context<'_>, proposer: &Address, precommit_fraction: Dec) -> HubResult<Tags> {
        let collected = self.fees.drain_collected_fees(ctx)?;
        if collected.is_empty() {
            return Ok(Tags::new());
        }
        let fees = DecCoins::from_coins(&collected);
        let params = self.params(ctx)?;
        let mut fp = self.fee_pool(ctx)?;

        let proposer_reward = match self.staking.validator_by_cons(ctx, proposer)? {
            Some(v) => {
                let multiplier = params.base_proposer_reward + params.bonus_proposer_reward.mul(precommit_fraction);
                let reward = fees.mul_dec(multiplier);
                let commission = reward.mul_dec(v.commission.rate);
                let remaining = reward
                    .checked_minus(&commission)
                    .ok_or_else(|| pool_underflow("proposer commission"))?;
                let mut vdi = self.require_vdi(ctx, &v.operator)?;
                vdi.val_commission = vdi.val_commission.plus(&commission);
                vdi.del_pool = vdi.del_pool.plus(&remaining);
                self.set_vdi(ctx, &vdi)?;
                reward
            }
            None => {
                warn!("[distr] previous proposer {proposer} is not a validator, no proposer reward");
                DecCoins::empty()
            }
        };

        let community = fees.mul_dec(params.community_tax);
        let to_validators = fees
            .checked_minus(&proposer_reward)
            .and_then(|rest| rest.checked_minus(&community))
            .ok_or_else(|| pool_underflow("fee allocation"))?;
        fp.community_pool = fp.community_pool.plus(&community);
        fp.val_pool = fp.val_pool.plus(&to_validators);
        self.set_fee_pool(ctx, &fp)?;

        debug!("[distr] allocated {collected} at height {}", ctx.block_height());
        Ok(Tags::new()
            .with(keys::REWARD, collected)
            .with(keys::COMMUNITY_POOL, community))
    }

    pub fn begin_blocker(&self, ctx: &mut Context<'_>, votes: &[VoteInfo]) -> HubResult<Tags> {
        let total: u64 = votes.iter().map(|v| v.power).sum();
        let signed: u64 = votes.iter().filter(|v| v.signed_last_block).map(|v| v.power).sum();
        let mut tags = Tags::new();
        if ctx.block_height() > 1 {
            let previous = self.previous_proposer(ctx)?;
            let fraction = Dec::from_ratio(u128::from(signed), u128::from(total));
            tags = self.allocate_tokens(ctx, &previous, fraction)?;
        }
        let proposer = ctx.proposer();
        self.set_previous_proposer(ctx, &proposer)?;
        Ok(tags)
    }

    // -------------------------------------------------------------------------
    // Zero-height
    // -------------------------------------------------------------------------

    /// Settles every reward so the exported pools hold no pending claims.
    pub fn prepare_for_zero_height(&self, ctx: &mut Context<'_>) -> HubResult<()> {
        for vdi in self.vdis(ctx)? {
            if self.staking.get_validator(ctx, &vdi.operator)?.is_some() {
                self.withdraw_validator_rewards_all(ctx, &vdi.operator)?;
            }
        }
        for ddi in self.ddis(ctx)? {
            self.withdraw_delegation_reward(ctx, &ddi.delegator, &ddi.validator)?;
        }

        let mut fp = self.fee_pool(ctx)?;
        for mut vdi in self.vdis(ctx)? {
            // Truncation leftovers no delegator can claim any more.
            fp.community_pool = fp.community_pool.plus(&vdi.del_pool);
            vdi.del_pool = DecCoins::empty();
            vdi.fee_pool_withdrawal_height = 0;
            vdi.del_accum = TotalAccum::new(0);
            self.set_vdi(ctx, &vdi)?;
        }
        for mut ddi in self.ddis(ctx)? {
            ddi.del_pool_withdrawal_height = 0;
            self.set_ddi(ctx, &ddi)?;
        }

        if !fp.val_pool.is_zero() || !fp.total_val_accum.accum.is_zero() {
            return Err(FatalError::NonZeroFeePool(format!(
                "validator pool {} with accum {}",
                fp.val_pool, fp.total_val_accum.accum
            ))
            .into());
        }
        fp.total_val_accum = TotalAccum::new(0);
        self.set_fee_pool(ctx, &fp)
    }
}
