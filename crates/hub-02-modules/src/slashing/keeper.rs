//! # Slashing Keeper
//!
//! Liveness tracking and double-sign punishment.
//!
//! ## Store layout (`slashing`)
//!
//! | Prefix | Key | Value |
//! |--------|-----|-------|
//! | `0x01` | consensus address | [`ValidatorSigningInfo`] |
//! | `0x02` | consensus address ++ index (BE) | `true` when the block was missed |
//! | `0x03` | consensus address ++ start height (BE) | [`SlashingPeriod`] |
//! | `0x04` | consensus address | consensus [`PubKey`] |

use super::types::*;
use crate::params::Subspace;
use crate::staking::StakingCore;
use crate::types::prefixed_key;
use hub_01_store::{Context, StoreKey};
use shared_types::tags::keys;
use shared_types::{Address, Dec, Evidence, FatalError, Height, HubResult, PubKey, Tags, VoteInfo};
use tracing::{info, warn};

const SIGNING_INFO_PREFIX: &[u8] = &[0x01];
const MISSED_BLOCK_PREFIX: &[u8] = &[0x02];
const SLASHING_PERIOD_PREFIX: &[u8] = &[0x03];
const PUBKEY_PREFIX: &[u8] = &[0x04];

/// Validator-set changes reach consensus one block after the end block that
/// made them.
const VALIDATOR_UPDATE_DELAY: u64 = 1;

#[derive(Debug, Clone, Copy)]
pub struct SlashingKeeper {
    key: StoreKey,
    params: Subspace,
    staking: StakingCore,
}

impl SlashingKeeper {
    pub fn new(key: StoreKey, params: Subspace, staking: StakingCore) -> Self {
        Self { key, params, staking }
    }

    pub fn params(&self, ctx: &Context<'_>) -> HubResult<SlashingParams> {
        self.params.get(ctx)
    }

    pub fn set_params(&self, ctx: &mut Context<'_>, params: &SlashingParams) -> HubResult<()> {
        self.params.set(ctx, params)
    }

    // -------------------------------------------------------------------------
    // Signing infos and the missed-block window
    // -------------------------------------------------------------------------

    pub fn signing_info(&self, ctx: &Context<'_>, cons: &Address) -> HubResult<Option<ValidatorSigningInfo>> {
        Ok(ctx.get_obj(self.key, &prefixed_key(SIGNING_INFO_PREFIX, &[cons.as_bytes()]))?)
    }

    pub fn set_signing_info(&self, ctx: &mut Context<'_>, cons: &Address, info: &ValidatorSigningInfo) -> HubResult<()> {
        ctx.set_obj(self.key, prefixed_key(SIGNING_INFO_PREFIX, &[cons.as_bytes()]), info)?;
        Ok(())
    }

    pub fn signing_infos(&self, ctx: &Context<'_>) -> HubResult<Vec<(Address, ValidatorSigningInfo)>> {
        ctx.iter_prefix_obj::<ValidatorSigningInfo>(self.key, SIGNING_INFO_PREFIX)?
            .into_iter()
            .map(|(k, info)| -> HubResult<(Address, ValidatorSigningInfo)> {
                let cons = k
                    .get(1..)
                    .and_then(Address::from_slice)
                    .ok_or_else(|| FatalError::StoreCorruption("signing info key".into()))?;
                Ok((cons, info))
            })
            .collect()
    }

    fn missed_key(cons: &Address, index: u64) -> Vec<u8> {
        prefixed_key(MISSED_BLOCK_PREFIX, &[cons.as_bytes(), &index.to_be_bytes()])
    }

    fn missed_bit(&self, ctx: &Context<'_>, cons: &Address, index: u64) -> HubResult<bool> {
        Ok(ctx.has(self.key, &Self::missed_key(cons, index))?)
    }

    pub fn set_missed_bit(&self, ctx: &mut Context<'_>, cons: &Address, index: u64, missed: bool) -> HubResult<()> {
        if missed {
            ctx.set(self.key, Self::missed_key(cons, index), vec![1])?;
        } else {
            ctx.delete(self.key, &Self::missed_key(cons, index))?;
        }
        Ok(())
    }

    /// Window indexes currently marked missed for `cons`.
    pub fn missed_indexes(&self, ctx: &Context<'_>, cons: &Address) -> HubResult<Vec<u64>> {
        ctx.iter_prefix(self.key, &prefixed_key(MISSED_BLOCK_PREFIX, &[cons.as_bytes()]))?
            .into_iter()
            .map(|(k, _)| -> HubResult<u64> {
                k.get(1 + Address::LEN..)
                    .and_then(|b| <[u8; 8]>::try_from(b).ok())
                    .map(u64::from_be_bytes)
                    .ok_or_else(|| FatalError::StoreCorruption("missed block key".into()).into())
            })
            .collect()
    }

    fn clear_missed_bits(&self, ctx: &mut Context<'_>, cons: &Address) -> HubResult<()> {
        for index in self.missed_indexes(ctx, cons)? {
            ctx.delete(self.key, &Self::missed_key(cons, index))?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Consensus keys
    // -------------------------------------------------------------------------

    pub fn add_pubkey(&self, ctx: &mut Context<'_>, pub_key: &PubKey) -> HubResult<()> {
        ctx.set_obj(self.key, prefixed_key(PUBKEY_PREFIX, &[pub_key.address().as_bytes()]), pub_key)?;
        Ok(())
    }

    pub fn pubkey(&self, ctx: &Context<'_>, cons: &Address) -> HubResult<Option<PubKey>> {
        Ok(ctx.get_obj(self.key, &prefixed_key(PUBKEY_PREFIX, &[cons.as_bytes()]))?)
    }

    fn delete_pubkey(&self, ctx: &mut Context<'_>, cons: &Address) -> HubResult<()> {
        ctx.delete(self.key, &prefixed_key(PUBKEY_PREFIX, &[cons.as_bytes()]))?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Slashing periods
    // -------------------------------------------------------------------------

    pub fn set_slashing_period(&self, ctx: &mut Context<'_>, period: &SlashingPeriod) -> HubResult<()> {
        ctx.set_obj(
            self.key,
            prefixed_key(
                SLASHING_PERIOD_PREFIX,
                &[period.validator.as_bytes(), &period.start_height.to_be_bytes()],
            ),
            period,
        )?;
        Ok(())
    }

    pub fn slashing_periods(&self, ctx: &Context<'_>) -> HubResult<Vec<SlashingPeriod>> {
        Ok(ctx
            .iter_prefix_obj(self.key, SLASHING_PERIOD_PREFIX)?
            .into_iter()
            .map(|(_, p)| p)
            .collect())
    }

    /// The latest period of `cons` that started at or before `height`.
    fn period_for_height(&self, ctx: &Context<'_>, cons: &Address, height: Height) -> HubResult<Option<SlashingPeriod>> {
        Ok(ctx
            .reverse_iter_prefix_obj::<SlashingPeriod>(
                self.key,
                &prefixed_key(SLASHING_PERIOD_PREFIX, &[cons.as_bytes()]),
            )?
            .into_iter()
            .map(|(_, p)| p)
            .find(|p| p.start_height <= height))
    }

    pub fn delete_slashing_periods(&self, ctx: &mut Context<'_>) -> HubResult<()> {
        for (k, _) in ctx.iter_prefix(self.key, SLASHING_PERIOD_PREFIX)? {
            ctx.delete(self.key, &k)?;
        }
        Ok(())
    }

    /// Raises the period's running total to `fraction` and returns how much
    /// of it has not been slashed yet.
    fn cap_by_slashing_period(
        &self,
        ctx: &mut Context<'_>,
        cons: &Address,
        infraction_height: Height,
        fraction: Dec,
    ) -> HubResult<Dec> {
        let mut period = match self.period_for_height(ctx, cons, infraction_height)? {
            Some(p) => p,
            None => SlashingPeriod {
                validator: *cons,
                start_height: infraction_height,
                end_height: 0,
                slashed_so_far: Dec::zero(),
            },
        };
        let total = if fraction > period.slashed_so_far {
            fraction
        } else {
            period.slashed_so_far
        };
        let revised = total.saturating_sub(period.slashed_so_far);
        period.slashed_so_far = total;
        self.set_slashing_period(ctx, &period)?;
        Ok(revised)
    }

    // -------------------------------------------------------------------------
    // Begin block
    // -------------------------------------------------------------------------

    pub fn begin_blocker(&self, ctx: &mut Context<'_>, votes: &[VoteInfo], evidence: &[Evidence]) -> HubResult<Tags> {
        let mut tags = Tags::new();
        for vote in votes {
            tags.extend(self.handle_validator_signature(ctx, &vote.validator, vote.power, vote.signed_last_block)?);
        }
        for ev in evidence {
            tags.extend(self.handle_double_sign(ctx, &ev.validator, ev.height, ev.power)?);
        }
        Ok(tags)
    }

    pub fn handle_validator_signature(
        &self,
        ctx: &mut Context<'_>,
        cons: &Address,
        power: u64,
        signed: bool,
    ) -> HubResult<Tags> {
        let height = ctx.block_height();
        let params = self.params(ctx)?;
        if self.pubkey(ctx, cons)?.is_none() {
            return Err(FatalError::StoreCorruption(format!("no consensus key recorded for {cons}")).into());
        }
        let mut info = self
            .signing_info(ctx, cons)?
            .ok_or_else(|| FatalError::StoreCorruption(format!("no signing info for {cons}")))?;

        let index = info.index_offset % params.signed_blocks_window;
        info.index_offset += 1;
        let previous = self.missed_bit(ctx, cons, index)?;
        let missed = !signed;
        if !previous && missed {
            self.set_missed_bit(ctx, cons, index, true)?;
            info.missed_blocks_counter += 1;
        } else if previous && !missed {
            self.set_missed_bit(ctx, cons, index, false)?;
            info.missed_blocks_counter = info.missed_blocks_counter.saturating_sub(1);
        }

        let mut tags = Tags::new();
        let min_height = info.start_height + params.signed_blocks_window;
        if height > min_height && info.missed_blocks_counter > params.max_missed_blocks() {
            if let Some(v) = self.staking.validator_by_cons(ctx, cons)? {
                if !v.jailed {
                    // Stake that signed the missed blocks was bonded one update earlier.
                    let distribution_height = height.saturating_sub(VALIDATOR_UPDATE_DELAY + 1);
                    info!(
                        "[slashing] validator {cons} missed {} blocks, slashing and jailing",
                        info.missed_blocks_counter
                    );
                    self.staking
                        .slash(ctx, cons, distribution_height, power, params.slash_fraction_downtime)?;
                    self.staking.jail(ctx, cons)?;
                    info.jailed_until = height + params.downtime_jail_duration;
                    info.missed_blocks_counter = 0;
                    info.index_offset = 0;
                    self.clear_missed_bits(ctx, cons)?;
                    tags.push(keys::SLASH_REASON, "missing_signature");
                    tags.push(keys::VALIDATOR, v.operator);
                    tags.push(keys::JAILED, cons);
                }
            }
        }
        self.set_signing_info(ctx, cons, &info)?;
        Ok(tags)
    }

    pub fn handle_double_sign(
        &self,
        ctx: &mut Context<'_>,
        cons: &Address,
        infraction_height: Height,
        power: u64,
    ) -> HubResult<Tags> {
        let height = ctx.block_height();
        let params = self.params(ctx)?;
        let age = height.saturating_sub(infraction_height);
        if age > params.max_evidence_age {
            warn!("[slashing] ignoring evidence against {cons} from height {infraction_height}, too old");
            return Ok(Tags::new());
        }
        let Some(v) = self.staking.validator_by_cons(ctx, cons)? else {
            warn!("[slashing] ignoring evidence against unknown validator {cons}");
            return Ok(Tags::new());
        };
        if v.status == crate::staking::BondStatus::Unbonded {
            return Ok(Tags::new());
        }

        let distribution_height = infraction_height.saturating_sub(VALIDATOR_UPDATE_DELAY);
        let fraction = self.cap_by_slashing_period(ctx, cons, distribution_height, params.slash_fraction_double_sign)?;
        info!("[slashing] double sign by {cons} at height {infraction_height}, slashing {fraction}");
        self.staking.slash(ctx, cons, distribution_height, power, fraction)?;
        if !v.jailed {
            self.staking.jail(ctx, cons)?;
        }
        let mut info = self
            .signing_info(ctx, cons)?
            .ok_or_else(|| FatalError::StoreCorruption(format!("no signing info for {cons}")))?;
        info.jailed_until = height + params.double_sign_jail_duration;
        self.set_signing_info(ctx, cons, &info)?;

        Ok(Tags::new()
            .with(keys::SLASH_REASON, "double_sign")
            .with(keys::VALIDATOR, v.operator)
            .with(keys::JAILED, cons))
    }

    // -------------------------------------------------------------------------
    // Unjail
    // -------------------------------------------------------------------------

    pub fn unjail(&self, ctx: &mut Context<'_>, operator: &Address) -> HubResult<()> {
        let v = self
            .staking
            .get_validator(ctx, operator)?
            .ok_or_else(|| err(CODE_NO_VALIDATOR, format!("validator {operator} does not exist")))?;
        if self.staking.get_delegation(ctx, operator, operator)?.is_none() {
            return Err(err(CODE_MISSING_SELF_DELEGATION, "validator has no self-delegation").into());
        }
        let cons = v.cons_address();
        let info = self
            .signing_info(ctx, &cons)?
            .ok_or_else(|| err(CODE_NO_SIGNING_INFO, format!("no signing info for {cons}")))?;
        if ctx.block_height() < info.jailed_until {
            return Err(err(
                CODE_JAIL_PERIOD_NOT_OVER,
                format!("jailed until height {}", info.jailed_until),
            )
            .into());
        }
        self.staking.unjail(ctx, &cons)
    }

    // -------------------------------------------------------------------------
    // Staking lifecycle
    // -------------------------------------------------------------------------

    pub(crate) fn on_validator_created(&self, ctx: &mut Context<'_>, operator: &Address) -> HubResult<()> {
        if let Some(v) = self.staking.get_validator(ctx, operator)? {
            self.add_pubkey(ctx, &v.cons_pubkey)?;
        }
        Ok(())
    }

    pub(crate) fn on_validator_removed(&self, ctx: &mut Context<'_>, cons: &Address) -> HubResult<()> {
        self.delete_pubkey(ctx, cons)
    }

    pub(crate) fn on_validator_bonded(&self, ctx: &mut Context<'_>, cons: &Address) -> HubResult<()> {
        let height = ctx.block_height();
        if self.signing_info(ctx, cons)?.is_none() {
            self.set_signing_info(
                ctx,
                cons,
                &ValidatorSigningInfo {
                    start_height: height,
                    ..Default::default()
                },
            )?;
        }
        self.set_slashing_period(
            ctx,
            &SlashingPeriod {
                validator: *cons,
                start_height: height,
                end_height: 0,
                slashed_so_far: Dec::zero(),
            },
        )
    }

    pub(crate) fn on_validator_begin_unbonding(&self, ctx: &mut Context<'_>, cons: &Address) -> HubResult<()> {
        let height = ctx.block_height();
        if let Some(mut period) = self.period_for_height(ctx, cons, height)? {
            period.end_height = height;
            self.set_slashing_period(ctx, &period)?;
        }
        Ok(())
    }

    /// Clears height references before a zero-height export.
    pub fn prepare_for_zero_height(&self, ctx: &mut Context<'_>) -> HubResult<()> {
        let height = ctx.block_height();
        self.delete_slashing_periods(ctx)?;
        for (cons, mut info) in self.signing_infos(ctx)? {
            info.start_height = 0;
            info.jailed_until = info.jailed_until.saturating_sub(height);
            self.set_signing_info(ctx, &cons, &info)?;
        }
        Ok(())
    }
}
