//! # Staking Keeper
//!
//! ## Store layout (`stake`)
//!
//! | Prefix | Key | Value |
//! |--------|-----|-------|
//! | `0x00` | - | [`Pool`] |
//! | `0x11` | operator | last bonded power |
//! | `0x12` | - | last total power |
//! | `0x21` | operator | [`Validator`] |
//! | `0x22` | consensus address | operator |
//! | `0x23` | power (BE) ++ operator | - |
//! | `0x31` | delegator ++ validator | [`Delegation`] |
//! | `0x32` | delegator ++ validator | [`UnbondingDelegation`] |
//! | `0x34` | delegator ++ src ++ dst | [`Redelegation`] |
//! | `0x41..0x43` | maturity height (BE) ++ ids | - (maturity queues) |
//!
//! The power index only holds validators that are not jailed and have
//! tokens, so reverse iteration yields the candidate set directly.

use super::types::*;
use super::CODESPACE;
use crate::bank::BankKeeper;
use crate::params::Subspace;
use crate::types::{prefixed_key, StakingHooks};
use hub_01_store::{Context, StoreKey};
use shared_types::tags::keys;
use shared_types::{Address, Coins, Dec, FatalError, Height, HubResult, Tags, TxError, ValidatorUpdate};
use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::Arc;
use tracing::{debug, info, warn};

const POOL_KEY: &[u8] = &[0x00];
const LAST_POWER_PREFIX: &[u8] = &[0x11];
const LAST_TOTAL_POWER_KEY: &[u8] = &[0x12];
const VALIDATOR_PREFIX: &[u8] = &[0x21];
const VALIDATOR_BY_CONS_PREFIX: &[u8] = &[0x22];
const POWER_INDEX_PREFIX: &[u8] = &[0x23];
const DELEGATION_PREFIX: &[u8] = &[0x31];
const UNBONDING_PREFIX: &[u8] = &[0x32];
const REDELEGATION_PREFIX: &[u8] = &[0x34];
const VALIDATOR_QUEUE_PREFIX: &[u8] = &[0x41];
const UNBONDING_QUEUE_PREFIX: &[u8] = &[0x42];
const REDELEGATION_QUEUE_PREFIX: &[u8] = &[0x43];

fn address_at(key: &[u8], offset: usize) -> Result<Address, FatalError> {
    key.get(offset..offset + Address::LEN)
        .and_then(Address::from_slice)
        .ok_or_else(|| FatalError::StoreCorruption(format!("stake key too short: {}", hex::encode(key))))
}

fn height_at(key: &[u8]) -> Result<Height, FatalError> {
    key.get(1..9)
        .and_then(|b| <[u8; 8]>::try_from(b).ok())
        .map(u64::from_be_bytes)
        .ok_or_else(|| FatalError::StoreCorruption(format!("stake queue key malformed: {}", hex::encode(key))))
}

fn queue_key(prefix: &[u8], height: Height, ids: &[&Address]) -> Vec<u8> {
    let mut key = prefix.to_vec();
    key.extend_from_slice(&height.to_be_bytes());
    for id in ids {
        key.extend_from_slice(id.as_bytes());
    }
    key
}

fn err(code: u32, msg: impl Into<String>) -> TxError {
    TxError::module(CODESPACE, code, msg)
}

// =============================================================================
// PHASE ONE: THE CORE
// =============================================================================

/// Store access, pool accounting, slashing and jailing. Never fires hooks.
#[derive(Debug, Clone, Copy)]
pub struct StakingCore {
    key: StoreKey,
    bank: BankKeeper,
    params: Subspace,
}

impl StakingCore {
    pub fn params(&self, ctx: &Context<'_>) -> HubResult<StakingParams> {
        self.params.get(ctx)
    }

    pub fn set_params(&self, ctx: &mut Context<'_>, params: &StakingParams) -> HubResult<()> {
        self.params.set(ctx, params)
    }

    pub fn bond_denom(&self, ctx: &Context<'_>) -> HubResult<String> {
        Ok(self.params(ctx)?.bond_denom)
    }

    pub fn bank(&self) -> BankKeeper {
        self.bank
    }

    // -------------------------------------------------------------------------
    // Pool
    // -------------------------------------------------------------------------

    pub fn pool(&self, ctx: &Context<'_>) -> HubResult<Pool> {
        Ok(ctx.get_obj(self.key, POOL_KEY)?.unwrap_or_default())
    }

    pub fn set_pool(&self, ctx: &mut Context<'_>, pool: &Pool) -> HubResult<()> {
        ctx.set_obj(self.key, POOL_KEY.to_vec(), pool)?;
        Ok(())
    }

    /// Newly minted bond-denom tokens enter the loose supply.
    pub fn inflate(&self, ctx: &mut Context<'_>, amount: u128) -> HubResult<()> {
        let mut pool = self.pool(ctx)?;
        pool.loose_tokens += amount;
        self.set_pool(ctx, &pool)
    }

    /// Removes destroyed loose tokens from the supply.
    pub fn burn_loose(&self, ctx: &mut Context<'_>, amount: u128) -> HubResult<()> {
        let mut pool = self.pool(ctx)?;
        pool.loose_tokens = pool.loose_tokens.checked_sub(amount).ok_or_else(|| FatalError::InvariantBroken {
            name: "stake-pool".into(),
            detail: format!("burning {amount} exceeds loose supply {}", pool.loose_tokens),
        })?;
        self.set_pool(ctx, &pool)
    }

    fn move_pool(&self, ctx: &mut Context<'_>, amount: u128, to_bonded: bool) -> HubResult<()> {
        let mut pool = self.pool(ctx)?;
        let (from, to) = if to_bonded {
            (&mut pool.loose_tokens, &mut pool.bonded_tokens)
        } else {
            (&mut pool.bonded_tokens, &mut pool.loose_tokens)
        };
        *from = from.checked_sub(amount).ok_or_else(|| FatalError::InvariantBroken {
            name: "stake-pool".into(),
            detail: format!("cannot move {amount} tokens (to_bonded={to_bonded})"),
        })?;
        *to += amount;
        self.set_pool(ctx, &pool)
    }

    // -------------------------------------------------------------------------
    // Validators
    // -------------------------------------------------------------------------

    fn validator_key(operator: &Address) -> Vec<u8> {
        prefixed_key(VALIDATOR_PREFIX, &[operator.as_bytes()])
    }

    fn power_index_key(v: &Validator) -> Vec<u8> {
        let power = v.potential_power().to_be_bytes();
        prefixed_key(POWER_INDEX_PREFIX, &[&power, v.operator.as_bytes()])
    }

    pub fn get_validator(&self, ctx: &Context<'_>, operator: &Address) -> HubResult<Option<Validator>> {
        Ok(ctx.get_obj(self.key, &Self::validator_key(operator))?)
    }

    pub fn validator_by_cons(&self, ctx: &Context<'_>, cons: &Address) -> HubResult<Option<Validator>> {
        let operator = match ctx.get(self.key, &prefixed_key(VALIDATOR_BY_CONS_PREFIX, &[cons.as_bytes()]))? {
            Some(bytes) => Address::from_slice(&bytes)
                .ok_or_else(|| FatalError::StoreCorruption("consensus index entry".into()))?,
            None => return Ok(None),
        };
        self.get_validator(ctx, &operator)
    }

    pub fn validators(&self, ctx: &Context<'_>) -> HubResult<Vec<Validator>> {
        Ok(ctx
            .iter_prefix_obj(self.key, VALIDATOR_PREFIX)?
            .into_iter()
            .map(|(_, v)| v)
            .collect())
    }

    /// Writes `v` and keeps the consensus and power indexes in step.
    pub fn save_validator(&self, ctx: &mut Context<'_>, v: &Validator) -> HubResult<()> {
        if let Some(old) = self.get_validator(ctx, &v.operator)? {
            ctx.delete(self.key, &Self::power_index_key(&old))?;
        }
        ctx.set_obj(self.key, Self::validator_key(&v.operator), v)?;
        ctx.set(
            self.key,
            prefixed_key(VALIDATOR_BY_CONS_PREFIX, &[v.cons_address().as_bytes()]),
            v.operator.as_bytes().to_vec(),
        )?;
        if !v.jailed && v.tokens > 0 {
            ctx.set(self.key, Self::power_index_key(v), Vec::new())?;
        }
        Ok(())
    }

    fn delete_validator_record(&self, ctx: &mut Context<'_>, v: &Validator) -> HubResult<()> {
        if let Some(old) = self.get_validator(ctx, &v.operator)? {
            ctx.delete(self.key, &Self::power_index_key(&old))?;
        }
        ctx.delete(self.key, &Self::validator_key(&v.operator))?;
        ctx.delete(
            self.key,
            &prefixed_key(VALIDATOR_BY_CONS_PREFIX, &[v.cons_address().as_bytes()]),
        )?;
        Ok(())
    }

    /// Candidates for the active set, highest power first.
    fn power_ranked_operators(&self, ctx: &Context<'_>) -> HubResult<Vec<Address>> {
        ctx.reverse_iter_prefix(self.key, POWER_INDEX_PREFIX)?
            .into_iter()
            .map(|(k, _)| address_at(&k, 1 + 8).map_err(Into::into))
            .collect()
    }

    // -------------------------------------------------------------------------
    // Last bonded powers
    // -------------------------------------------------------------------------

    pub fn get_last_power(&self, ctx: &Context<'_>, operator: &Address) -> HubResult<Option<u64>> {
        Ok(ctx.get_obj(self.key, &prefixed_key(LAST_POWER_PREFIX, &[operator.as_bytes()]))?)
    }

    pub fn set_last_power(&self, ctx: &mut Context<'_>, operator: &Address, power: u64) -> HubResult<()> {
        ctx.set_obj(
            self.key,
            prefixed_key(LAST_POWER_PREFIX, &[operator.as_bytes()]),
            &power,
        )?;
        Ok(())
    }

    fn delete_last_power(&self, ctx: &mut Context<'_>, operator: &Address) -> HubResult<()> {
        ctx.delete(self.key, &prefixed_key(LAST_POWER_PREFIX, &[operator.as_bytes()]))?;
        Ok(())
    }

    /// `(operator, power)` of the set handed to consensus at the last end block.
    pub fn last_powers(&self, ctx: &Context<'_>) -> HubResult<Vec<(Address, u64)>> {
        ctx.iter_prefix_obj::<u64>(self.key, LAST_POWER_PREFIX)?
            .into_iter()
            .map(|(k, power)| -> HubResult<(Address, u64)> { Ok((address_at(&k, 1)?, power)) })
            .collect()
    }

    pub fn last_total_power(&self, ctx: &Context<'_>) -> HubResult<u64> {
        Ok(ctx.get_obj(self.key, LAST_TOTAL_POWER_KEY)?.unwrap_or(0))
    }

    pub fn set_last_total_power(&self, ctx: &mut Context<'_>, power: u64) -> HubResult<()> {
        ctx.set_obj(self.key, LAST_TOTAL_POWER_KEY.to_vec(), &power)?;
        Ok(())
    }

    pub fn bonded_validators(&self, ctx: &Context<'_>) -> HubResult<Vec<Validator>> {
        let mut out = Vec::new();
        for (operator, _) in self.last_powers(ctx)? {
            let v = self.get_validator(ctx, &operator)?.ok_or_else(|| {
                FatalError::StoreCorruption(format!("last power recorded for unknown validator {operator}"))
            })?;
            out.push(v);
        }
        Ok(out)
    }

    // -------------------------------------------------------------------------
    // Delegations
    // -------------------------------------------------------------------------

    fn delegation_key(delegator: &Address, validator: &Address) -> Vec<u8> {
        prefixed_key(DELEGATION_PREFIX, &[delegator.as_bytes(), validator.as_bytes()])
    }

    pub fn get_delegation(
        &self,
        ctx: &Context<'_>,
        delegator: &Address,
        validator: &Address,
    ) -> HubResult<Option<Delegation>> {
        Ok(ctx.get_obj(self.key, &Self::delegation_key(delegator, validator))?)
    }

    pub fn set_delegation(&self, ctx: &mut Context<'_>, d: &Delegation) -> HubResult<()> {
        ctx.set_obj(self.key, Self::delegation_key(&d.delegator, &d.validator), d)?;
        Ok(())
    }

    fn delete_delegation(&self, ctx: &mut Context<'_>, d: &Delegation) -> HubResult<()> {
        ctx.delete(self.key, &Self::delegation_key(&d.delegator, &d.validator))?;
        Ok(())
    }

    pub fn delegations(&self, ctx: &Context<'_>) -> HubResult<Vec<Delegation>> {
        Ok(ctx
            .iter_prefix_obj(self.key, DELEGATION_PREFIX)?
            .into_iter()
            .map(|(_, d)| d)
            .collect())
    }

    pub fn delegator_delegations(&self, ctx: &Context<'_>, delegator: &Address) -> HubResult<Vec<Delegation>> {
        Ok(ctx
            .iter_prefix_obj(self.key, &prefixed_key(DELEGATION_PREFIX, &[delegator.as_bytes()]))?
            .into_iter()
            .map(|(_, d)| d)
            .collect())
    }

    pub fn validator_delegations(&self, ctx: &Context<'_>, validator: &Address) -> HubResult<Vec<Delegation>> {
        Ok(self
            .delegations(ctx)?
            .into_iter()
            .filter(|d| d.validator == *validator)
            .collect())
    }

    // -------------------------------------------------------------------------
    // Unbonding delegations and redelegations
    // -------------------------------------------------------------------------

    pub fn get_unbonding_delegation(
        &self,
        ctx: &Context<'_>,
        delegator: &Address,
        validator: &Address,
    ) -> HubResult<Option<UnbondingDelegation>> {
        Ok(ctx.get_obj(
            self.key,
            &prefixed_key(UNBONDING_PREFIX, &[delegator.as_bytes(), validator.as_bytes()]),
        )?)
    }

    /// Stores `ubd` and enqueues it at its maturity height.
    pub fn set_unbonding_delegation(&self, ctx: &mut Context<'_>, ubd: &UnbondingDelegation) -> HubResult<()> {
        if let Some(old) = self.get_unbonding_delegation(ctx, &ubd.delegator, &ubd.validator)? {
            ctx.delete(
                self.key,
                &queue_key(UNBONDING_QUEUE_PREFIX, old.min_height, &[&old.delegator, &old.validator]),
            )?;
        }
        ctx.set_obj(
            self.key,
            prefixed_key(UNBONDING_PREFIX, &[ubd.delegator.as_bytes(), ubd.validator.as_bytes()]),
            ubd,
        )?;
        ctx.set(
            self.key,
            queue_key(UNBONDING_QUEUE_PREFIX, ubd.min_height, &[&ubd.delegator, &ubd.validator]),
            Vec::new(),
        )?;
        Ok(())
    }

    fn delete_unbonding_delegation(&self, ctx: &mut Context<'_>, ubd: &UnbondingDelegation) -> HubResult<()> {
        ctx.delete(
            self.key,
            &prefixed_key(UNBONDING_PREFIX, &[ubd.delegator.as_bytes(), ubd.validator.as_bytes()]),
        )?;
        ctx.delete(
            self.key,
            &queue_key(UNBONDING_QUEUE_PREFIX, ubd.min_height, &[&ubd.delegator, &ubd.validator]),
        )?;
        Ok(())
    }

    pub fn unbonding_delegations(&self, ctx: &Context<'_>) -> HubResult<Vec<UnbondingDelegation>> {
        Ok(ctx
            .iter_prefix_obj(self.key, UNBONDING_PREFIX)?
            .into_iter()
            .map(|(_, u)| u)
            .collect())
    }

    pub fn get_redelegation(
        &self,
        ctx: &Context<'_>,
        delegator: &Address,
        src: &Address,
        dst: &Address,
    ) -> HubResult<Option<Redelegation>> {
        Ok(ctx.get_obj(
            self.key,
            &prefixed_key(REDELEGATION_PREFIX, &[delegator.as_bytes(), src.as_bytes(), dst.as_bytes()]),
        )?)
    }

    pub fn set_redelegation(&self, ctx: &mut Context<'_>, red: &Redelegation) -> HubResult<()> {
        if let Some(old) = self.get_redelegation(ctx, &red.delegator, &red.src, &red.dst)? {
            ctx.delete(
                self.key,
                &queue_key(REDELEGATION_QUEUE_PREFIX, old.min_height, &[&old.delegator, &old.src, &old.dst]),
            )?;
        }
        ctx.set_obj(
            self.key,
            prefixed_key(
                REDELEGATION_PREFIX,
                &[red.delegator.as_bytes(), red.src.as_bytes(), red.dst.as_bytes()],
            ),
            red,
        )?;
        ctx.set(
            self.key,
            queue_key(REDELEGATION_QUEUE_PREFIX, red.min_height, &[&red.delegator, &red.src, &red.dst]),
            Vec::new(),
        )?;
        Ok(())
    }

    fn delete_redelegation(&self, ctx: &mut Context<'_>, red: &Redelegation) -> HubResult<()> {
        ctx.delete(
            self.key,
            &prefixed_key(
                REDELEGATION_PREFIX,
                &[red.delegator.as_bytes(), red.src.as_bytes(), red.dst.as_bytes()],
            ),
        )?;
        ctx.delete(
            self.key,
            &queue_key(REDELEGATION_QUEUE_PREFIX, red.min_height, &[&red.delegator, &red.src, &red.dst]),
        )?;
        Ok(())
    }

    pub fn redelegations(&self, ctx: &Context<'_>) -> HubResult<Vec<Redelegation>> {
        Ok(ctx
            .iter_prefix_obj(self.key, REDELEGATION_PREFIX)?
            .into_iter()
            .map(|(_, r)| r)
            .collect())
    }

    fn has_receiving_redelegation(&self, ctx: &Context<'_>, delegator: &Address, dst: &Address) -> HubResult<bool> {
        Ok(ctx
            .iter_prefix_obj::<Redelegation>(
                self.key,
                &prefixed_key(REDELEGATION_PREFIX, &[delegator.as_bytes()]),
            )?
            .iter()
            .any(|(_, r)| r.dst == *dst))
    }

    // -------------------------------------------------------------------------
    // Token movement
    // -------------------------------------------------------------------------

    /// Adds delegated tokens to `v` and returns the shares issued.
    /// The caller saves `v`.
    pub fn add_tokens(&self, ctx: &mut Context<'_>, v: &mut Validator, amount: u128) -> HubResult<Dec> {
        let shares = v.shares_for_tokens(amount).ok_or_else(|| {
            err(CODE_VALIDATOR_SLASHED_OUT, format!("validator {} has no tokens left", v.operator))
        })?;
        v.tokens += amount;
        v.delegator_shares += shares;
        if v.is_bonded() {
            self.move_pool(ctx, amount, true)?;
        }
        Ok(shares)
    }

    /// Burns `shares` of `v` and returns the tokens they were worth.
    /// The caller saves `v`.
    pub fn remove_shares(&self, ctx: &mut Context<'_>, v: &mut Validator, shares: Dec) -> HubResult<u128> {
        let tokens = if shares == v.delegator_shares {
            v.tokens
        } else {
            v.tokens_for_shares(shares).truncate().min(v.tokens)
        };
        v.delegator_shares = v.delegator_shares.checked_sub(shares).ok_or_else(|| {
            err(CODE_INSUFFICIENT_SHARES, format!("validator {} has fewer shares than {shares}", v.operator))
        })?;
        v.tokens -= tokens;
        if v.is_bonded() {
            self.move_pool(ctx, tokens, false)?;
        }
        Ok(tokens)
    }

    fn mark_bonded(&self, ctx: &mut Context<'_>, v: &mut Validator) -> HubResult<()> {
        if v.status == BondStatus::Unbonding {
            ctx.delete(
                self.key,
                &queue_key(VALIDATOR_QUEUE_PREFIX, v.unbonding_min_height, &[&v.operator]),
            )?;
        }
        self.move_pool(ctx, v.tokens, true)?;
        v.status = BondStatus::Bonded;
        v.bond_height = ctx.block_height();
        self.save_validator(ctx, v)
    }

    pub(crate) fn enqueue_unbonding_validator(&self, ctx: &mut Context<'_>, v: &Validator) -> HubResult<()> {
        ctx.set(
            self.key,
            queue_key(VALIDATOR_QUEUE_PREFIX, v.unbonding_min_height, &[&v.operator]),
            Vec::new(),
        )?;
        Ok(())
    }

    fn mark_unbonding(&self, ctx: &mut Context<'_>, v: &mut Validator, period: u64) -> HubResult<()> {
        self.move_pool(ctx, v.tokens, false)?;
        v.status = BondStatus::Unbonding;
        v.unbonding_height = ctx.block_height();
        v.unbonding_min_height = ctx.block_height() + period;
        ctx.set(
            self.key,
            queue_key(VALIDATOR_QUEUE_PREFIX, v.unbonding_min_height, &[&v.operator]),
            Vec::new(),
        )?;
        self.save_validator(ctx, v)
    }

    // -------------------------------------------------------------------------
    // Slashing capability
    // -------------------------------------------------------------------------

    /// Burns `fraction` of the stake the validator held at `infraction_height`
    /// (given as consensus `power`). Unbonding delegations created at or after
    /// the infraction are slashed first. Returns the tokens burned.
    pub fn slash(
        &self,
        ctx: &mut Context<'_>,
        cons: &Address,
        infraction_height: Height,
        power: u64,
        fraction: Dec,
    ) -> HubResult<u128> {
        let Some(mut v) = self.validator_by_cons(ctx, cons)? else {
            warn!("[staking] slash target {cons} no longer exists");
            return Ok(0);
        };
        let height = ctx.block_height();
        let target = Dec::from_int(power_to_tokens(power)).mul(fraction).truncate();
        let mut remaining = target;
        let mut burned = 0u128;

        if infraction_height < height {
            for mut ubd in self.unbonding_delegations(ctx)? {
                if ubd.validator != v.operator || ubd.creation_height < infraction_height || ubd.min_height <= height {
                    continue;
                }
                let cut = Dec::from_int(ubd.initial_balance).mul(fraction).truncate().min(ubd.balance);
                if cut == 0 {
                    continue;
                }
                ubd.balance -= cut;
                remaining = remaining.saturating_sub(cut);
                burned += cut;
                self.burn_loose(ctx, cut)?;
                self.set_unbonding_delegation(ctx, &ubd)?;
            }
        }

        let from_validator = remaining.min(v.tokens);
        v.tokens -= from_validator;
        burned += from_validator;
        let mut pool = self.pool(ctx)?;
        if v.is_bonded() {
            pool.bonded_tokens = pool.bonded_tokens.saturating_sub(from_validator);
        } else {
            pool.loose_tokens = pool.loose_tokens.saturating_sub(from_validator);
        }
        self.set_pool(ctx, &pool)?;
        self.save_validator(ctx, &v)?;

        info!(
            "[staking] slashed validator {} by {} tokens (fraction {fraction}, infraction height {infraction_height})",
            v.operator, burned
        );
        Ok(burned)
    }

    /// Removes the validator from the power index; the next end block drops
    /// it from the active set.
    pub fn jail(&self, ctx: &mut Context<'_>, cons: &Address) -> HubResult<()> {
        let Some(mut v) = self.validator_by_cons(ctx, cons)? else {
            return Ok(());
        };
        v.jailed = true;
        self.save_validator(ctx, &v)?;
        info!("[staking] jailed validator {}", v.operator);
        Ok(())
    }

    pub fn unjail(&self, ctx: &mut Context<'_>, cons: &Address) -> HubResult<()> {
        let mut v = self
            .validator_by_cons(ctx, cons)?
            .ok_or_else(|| err(CODE_NO_VALIDATOR, format!("no validator for {cons}")))?;
        if !v.jailed {
            return Err(err(CODE_NOT_JAILED, format!("validator {} is not jailed", v.operator)).into());
        }
        v.jailed = false;
        self.save_validator(ctx, &v)
    }

    // -------------------------------------------------------------------------
    // Zero-height reset
    // -------------------------------------------------------------------------

    /// Clears bond, unbonding and creation heights and rebases maturity
    /// heights to the blocks still remaining at `height`.
    pub fn reset_heights(&self, ctx: &mut Context<'_>, height: Height) -> HubResult<()> {
        let rebase = |h: Height| h.saturating_sub(height);

        for mut red in self.redelegations(ctx)? {
            self.delete_redelegation(ctx, &red)?;
            red.creation_height = 0;
            red.min_height = rebase(red.min_height);
            self.set_redelegation(ctx, &red)?;
        }
        for mut ubd in self.unbonding_delegations(ctx)? {
            self.delete_unbonding_delegation(ctx, &ubd)?;
            ubd.creation_height = 0;
            ubd.min_height = rebase(ubd.min_height);
            self.set_unbonding_delegation(ctx, &ubd)?;
        }
        for mut v in self.validators(ctx)? {
            if v.status == BondStatus::Unbonding {
                ctx.delete(
                    self.key,
                    &queue_key(VALIDATOR_QUEUE_PREFIX, v.unbonding_min_height, &[&v.operator]),
                )?;
                v.unbonding_min_height = rebase(v.unbonding_min_height);
                ctx.set(
                    self.key,
                    queue_key(VALIDATOR_QUEUE_PREFIX, v.unbonding_min_height, &[&v.operator]),
                    Vec::new(),
                )?;
            }
            v.bond_height = 0;
            v.unbonding_height = 0;
            v.commission.update_height = 0;
            self.save_validator(ctx, &v)?;
        }
        for mut d in self.delegations(ctx)? {
            d.height = 0;
            self.set_delegation(ctx, &d)?;
        }
        Ok(())
    }
}

// =============================================================================
// PHASE TWO: HOOK ATTACHMENT
// =============================================================================

/// A constructed staking keeper whose hooks are not attached yet.
///
/// Observers (distribution, slashing) are built from [`UnwiredStaking::core`];
/// the keeper handlers run on only exists after [`UnwiredStaking::attach_hooks`].
#[derive(Debug)]
pub struct UnwiredStaking {
    core: StakingCore,
}

impl UnwiredStaking {
    pub fn new(key: StoreKey, bank: BankKeeper, params: Subspace) -> Self {
        Self {
            core: StakingCore { key, bank, params },
        }
    }

    pub fn core(&self) -> StakingCore {
        self.core
    }

    pub fn attach_hooks(self, hooks: Arc<dyn StakingHooks>) -> StakingKeeper {
        StakingKeeper { core: self.core, hooks }
    }
}

/// The wired staking keeper.
#[derive(Clone)]
pub struct StakingKeeper {
    core: StakingCore,
    hooks: Arc<dyn StakingHooks>,
}

impl Deref for StakingKeeper {
    type Target = StakingCore;

    fn deref(&self) -> &StakingCore {
        &self.core
    }
}

impl StakingKeeper {
    pub fn core(&self) -> StakingCore {
        self.core
    }

    fn require_validator(&self, ctx: &Context<'_>, operator: &Address) -> HubResult<Validator> {
        self.get_validator(ctx, operator)?
            .ok_or_else(|| err(CODE_NO_VALIDATOR, format!("validator {operator} does not exist")).into())
    }

    fn require_bond_denom(&self, ctx: &Context<'_>, denom: &str) -> HubResult<String> {
        let bond_denom = self.bond_denom(ctx)?;
        if denom != bond_denom {
            return Err(err(CODE_BAD_DENOM, format!("expected {bond_denom}, got {denom}")).into());
        }
        Ok(bond_denom)
    }

    pub(crate) fn fire_validator_created(&self, ctx: &mut Context<'_>, operator: &Address) -> HubResult<()> {
        Ok(self.hooks.on_validator_created(ctx, operator)?)
    }

    pub(crate) fn fire_delegation_created(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        validator: &Address,
    ) -> HubResult<()> {
        Ok(self.hooks.on_delegation_created(ctx, delegator, validator)?)
    }

    pub fn create_validator(&self, ctx: &mut Context<'_>, msg: &MsgCreateValidator) -> HubResult<()> {
        if self.get_validator(ctx, &msg.operator)?.is_some() {
            return Err(err(CODE_VALIDATOR_EXISTS, format!("validator {} already exists", msg.operator)).into());
        }
        if self.validator_by_cons(ctx, &msg.pub_key.address())?.is_some() {
            return Err(err(CODE_VALIDATOR_EXISTS, "consensus key already in use").into());
        }
        self.require_bond_denom(ctx, &msg.delegation.denom)?;

        let mut commission = msg.commission;
        commission.update_height = ctx.block_height();
        let v = Validator::new(msg.operator, msg.pub_key, msg.description.clone(), commission);
        self.save_validator(ctx, &v)?;
        self.hooks.on_validator_created(ctx, &msg.operator)?;

        self.delegate(ctx, &msg.operator, &msg.operator, msg.delegation.amount, true)?;
        debug!("[staking] created validator {}", msg.operator);
        Ok(())
    }

    pub fn edit_validator(&self, ctx: &mut Context<'_>, msg: &MsgEditValidator) -> HubResult<()> {
        let mut v = self.require_validator(ctx, &msg.operator)?;
        if let Some(description) = &msg.description {
            v.description = description.clone();
        }
        if let Some(rate) = msg.commission_rate {
            v.commission.validate_change(rate)?;
            if v.commission.update_height == ctx.block_height() {
                return Err(err(CODE_BAD_COMMISSION, "commission already changed in this block").into());
            }
            // Rewards accrued under the old rate settle first.
            self.hooks.on_validator_modified(ctx, &msg.operator)?;
            v.commission.rate = rate;
            v.commission.update_height = ctx.block_height();
        }
        self.save_validator(ctx, &v)
    }

    /// Delegates `amount` bond-denom tokens, taking them from the delegator's
    /// account when `from_account` is set. Returns the shares issued.
    pub fn delegate(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        validator: &Address,
        amount: u128,
        from_account: bool,
    ) -> HubResult<Dec> {
        let mut v = self.require_validator(ctx, validator)?;
        let mut delegation = match self.get_delegation(ctx, delegator, validator)? {
            Some(existing) => {
                self.hooks.on_delegation_shares_modified(ctx, delegator, validator)?;
                existing
            }
            None => {
                self.hooks.on_delegation_created(ctx, delegator, validator)?;
                Delegation {
                    delegator: *delegator,
                    validator: *validator,
                    shares: Dec::zero(),
                    height: ctx.block_height(),
                }
            }
        };

        if from_account {
            let denom = self.bond_denom(ctx)?;
            self.bank.subtract_coins(ctx, delegator, &Coins::single(denom, amount))?;
        }
        let shares = self.add_tokens(ctx, &mut v, amount)?;
        self.save_validator(ctx, &v)?;

        delegation.shares += shares;
        delegation.height = ctx.block_height();
        self.set_delegation(ctx, &delegation)?;
        Ok(shares)
    }

    /// Removes `shares` from a delegation and returns the tokens released
    /// together with the validator state they were released from.
    fn unbond(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        validator: &Address,
        shares: Dec,
    ) -> HubResult<(u128, Validator)> {
        let mut delegation = self
            .get_delegation(ctx, delegator, validator)?
            .ok_or_else(|| err(CODE_NO_DELEGATION, format!("no delegation from {delegator} to {validator}")))?;
        if delegation.shares < shares {
            return Err(err(
                CODE_INSUFFICIENT_SHARES,
                format!("delegation holds {} shares, {shares} requested", delegation.shares),
            )
            .into());
        }
        let mut v = self.require_validator(ctx, validator)?;

        self.hooks.on_delegation_shares_modified(ctx, delegator, validator)?;
        delegation.shares = delegation.shares.saturating_sub(shares);
        if delegation.shares.is_zero() {
            self.hooks.on_delegation_removed(ctx, delegator, validator)?;
            self.delete_delegation(ctx, &delegation)?;
        } else {
            self.set_delegation(ctx, &delegation)?;
        }

        let tokens = self.remove_shares(ctx, &mut v, shares)?;
        if v.delegator_shares.is_zero() && v.status == BondStatus::Unbonded {
            self.remove_validator(ctx, &v)?;
        } else {
            self.save_validator(ctx, &v)?;
        }
        Ok((tokens, v))
    }

    fn remove_validator(&self, ctx: &mut Context<'_>, v: &Validator) -> HubResult<()> {
        self.delete_validator_record(ctx, v)?;
        self.hooks.on_validator_removed(ctx, &v.cons_address(), &v.operator)?;
        debug!("[staking] removed validator {}", v.operator);
        Ok(())
    }

    /// Returns the height at which the released tokens are paid out.
    pub fn begin_unbonding(&self, ctx: &mut Context<'_>, msg: &MsgBeginUnbonding) -> HubResult<Height> {
        if self
            .get_unbonding_delegation(ctx, &msg.delegator, &msg.validator)?
            .is_some()
        {
            return Err(err(CODE_UNBONDING_EXISTS, "an unbonding delegation is already in progress").into());
        }
        let height = ctx.block_height();
        let (tokens, v) = self.unbond(ctx, &msg.delegator, &msg.validator, msg.shares)?;
        let denom = self.bond_denom(ctx)?;

        let min_height = match v.status {
            BondStatus::Unbonded => {
                self.bank.add_coins(ctx, &msg.delegator, &Coins::single(denom, tokens))?;
                return Ok(height);
            }
            BondStatus::Unbonding => v.unbonding_min_height.max(height),
            BondStatus::Bonded => height + self.params(ctx)?.unbonding_period,
        };
        self.set_unbonding_delegation(
            ctx,
            &UnbondingDelegation {
                delegator: msg.delegator,
                validator: msg.validator,
                creation_height: height,
                min_height,
                initial_balance: tokens,
                balance: tokens,
            },
        )?;
        Ok(min_height)
    }

    pub fn begin_redelegation(&self, ctx: &mut Context<'_>, msg: &MsgBeginRedelegate) -> HubResult<Height> {
        self.require_validator(ctx, &msg.dst)?;
        if self
            .get_redelegation(ctx, &msg.delegator, &msg.src, &msg.dst)?
            .is_some()
        {
            return Err(err(CODE_REDELEGATION_EXISTS, "redelegation already in progress").into());
        }
        if self.has_receiving_redelegation(ctx, &msg.delegator, &msg.src)? {
            return Err(err(CODE_REDELEGATION_EXISTS, "source validator is still receiving a redelegation").into());
        }
        let height = ctx.block_height();
        let (tokens, src) = self.unbond(ctx, &msg.delegator, &msg.src, msg.shares)?;
        if tokens == 0 {
            return Err(err(CODE_INSUFFICIENT_SHARES, "redelegation amount rounds to zero").into());
        }
        let shares_dst = self.delegate(ctx, &msg.delegator, &msg.dst, tokens, false)?;

        let min_height = match src.status {
            BondStatus::Unbonded => return Ok(height),
            BondStatus::Unbonding => src.unbonding_min_height.max(height),
            BondStatus::Bonded => height + self.params(ctx)?.unbonding_period,
        };
        self.set_redelegation(
            ctx,
            &Redelegation {
                delegator: msg.delegator,
                src: msg.src,
                dst: msg.dst,
                creation_height: height,
                min_height,
                initial_balance: tokens,
                balance: tokens,
                shares_src: msg.shares,
                shares_dst,
            },
        )?;
        Ok(min_height)
    }

    // -------------------------------------------------------------------------
    // End block
    // -------------------------------------------------------------------------

    /// Recomputes the active set and returns the changes for consensus.
    ///
    /// Hooks observe the previous last power: they fire before it is updated.
    pub fn apply_and_return_validator_set_updates(&self, ctx: &mut Context<'_>) -> HubResult<Vec<ValidatorUpdate>> {
        let params = self.params(ctx)?;
        let mut previous: BTreeMap<Address, u64> = self.last_powers(ctx)?.into_iter().collect();
        let mut updates = Vec::new();
        let mut total_power = 0u64;
        let mut count = 0usize;

        for operator in self.power_ranked_operators(ctx)? {
            if count >= usize::from(params.max_validators) {
                break;
            }
            let mut v = self.require_validator(ctx, &operator)?;
            let power = v.potential_power();
            if power == 0 {
                break;
            }
            if !v.is_bonded() {
                self.hooks.on_validator_bonded(ctx, &v.cons_address(), &operator)?;
                self.mark_bonded(ctx, &mut v)?;
            }
            let old = previous.remove(&operator);
            if old != Some(power) {
                if old.is_some() {
                    self.hooks.on_validator_power_did_change(ctx, &v.cons_address(), &operator)?;
                }
                self.set_last_power(ctx, &operator, power)?;
                updates.push(v.abci_update());
            }
            total_power += power;
            count += 1;
        }

        for operator in previous.into_keys() {
            let mut v = self.require_validator(ctx, &operator)?;
            self.hooks.on_validator_begin_unbonding(ctx, &v.cons_address(), &operator)?;
            if v.is_bonded() {
                self.mark_unbonding(ctx, &mut v, params.unbonding_period)?;
            }
            self.delete_last_power(ctx, &operator)?;
            updates.push(v.abci_update_zero());
        }

        self.set_last_total_power(ctx, total_power)?;
        Ok(updates)
    }

    pub fn end_blocker(&self, ctx: &mut Context<'_>) -> HubResult<(Vec<ValidatorUpdate>, Tags)> {
        let updates = self.apply_and_return_validator_set_updates(ctx)?;
        let height = ctx.block_height();
        let denom = self.bond_denom(ctx)?;
        let mut tags = Tags::new();

        for (key, _) in ctx.iter_prefix(self.key, VALIDATOR_QUEUE_PREFIX)? {
            if height_at(&key)? > height {
                break;
            }
            ctx.delete(self.key, &key)?;
            let Some(mut v) = self.get_validator(ctx, &address_at(&key, 9)?)? else {
                continue;
            };
            if v.status != BondStatus::Unbonding {
                continue;
            }
            v.status = BondStatus::Unbonded;
            if v.delegator_shares.is_zero() {
                self.remove_validator(ctx, &v)?;
            } else {
                self.save_validator(ctx, &v)?;
            }
        }

        for (key, _) in ctx.iter_prefix(self.key, UNBONDING_QUEUE_PREFIX)? {
            if height_at(&key)? > height {
                break;
            }
            let (delegator, validator) = (address_at(&key, 9)?, address_at(&key, 29)?);
            let Some(ubd) = self.get_unbonding_delegation(ctx, &delegator, &validator)? else {
                ctx.delete(self.key, &key)?;
                continue;
            };
            self.bank
                .add_coins(ctx, &delegator, &Coins::single(denom.clone(), ubd.balance))?;
            self.delete_unbonding_delegation(ctx, &ubd)?;
            tags.push(keys::ACTION, "complete-unbonding");
            tags.push(keys::DELEGATOR, delegator);
            tags.push(keys::VALIDATOR, validator);
        }

        for (key, _) in ctx.iter_prefix(self.key, REDELEGATION_QUEUE_PREFIX)? {
            if height_at(&key)? > height {
                break;
            }
            let (delegator, src, dst) = (address_at(&key, 9)?, address_at(&key, 29)?, address_at(&key, 49)?);
            match self.get_redelegation(ctx, &delegator, &src, &dst)? {
                Some(red) => {
                    self.delete_redelegation(ctx, &red)?;
                    tags.push(keys::ACTION, "complete-redelegation");
                    tags.push(keys::DELEGATOR, delegator);
                    tags.push(keys::SRC_VALIDATOR, src);
                    tags.push(keys::DST_VALIDATOR, dst);
                }
                None => ctx.delete(self.key, &key)?,
            }
        }

        Ok((updates, tags))
    }
}
