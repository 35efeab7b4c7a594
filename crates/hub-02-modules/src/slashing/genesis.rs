use super::keeper::SlashingKeeper;
use super::types::*;
use crate::params::ParamSet;
use crate::staking::Validator;
use hub_01_store::Context;
use serde::{Deserialize, Serialize};
use shared_types::{Address, HubResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningInfoEntry {
    pub address: Address,
    pub info: ValidatorSigningInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissedBlocksEntry {
    pub address: Address,
    /// Window indexes marked missed.
    pub missed: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SlashingGenesis {
    pub params: SlashingParams,
    #[serde(default)]
    pub signing_infos: Vec<SigningInfoEntry>,
    #[serde(default)]
    pub missed_blocks: Vec<MissedBlocksEntry>,
    #[serde(default)]
    pub slashing_periods: Vec<SlashingPeriod>,
}

impl SlashingGenesis {
    pub fn validate(&self) -> Result<(), String> {
        self.params.validate()
    }
}

/// Staking genesis must already be loaded: consensus keys are read from its
/// validators.
pub fn init_genesis(
    ctx: &mut Context<'_>,
    keeper: &SlashingKeeper,
    data: &SlashingGenesis,
    validators: &[Validator],
) -> HubResult<()> {
    for v in validators {
        keeper.add_pubkey(ctx, &v.cons_pubkey)?;
    }
    for entry in &data.signing_infos {
        keeper.set_signing_info(ctx, &entry.address, &entry.info)?;
    }
    for entry in &data.missed_blocks {
        for index in &entry.missed {
            keeper.set_missed_bit(ctx, &entry.address, *index, true)?;
        }
    }
    for period in &data.slashing_periods {
        keeper.set_slashing_period(ctx, period)?;
    }
    keeper.set_params(ctx, &data.params)
}

pub fn export_genesis(ctx: &Context<'_>, keeper: &SlashingKeeper) -> HubResult<SlashingGenesis> {
    let signing_infos = keeper.signing_infos(ctx)?;
    let mut missed_blocks = Vec::new();
    for (address, _) in &signing_infos {
        let missed = keeper.missed_indexes(ctx, address)?;
        if !missed.is_empty() {
            missed_blocks.push(MissedBlocksEntry {
                address: *address,
                missed,
            });
        }
    }
    Ok(SlashingGenesis {
        params: keeper.params(ctx)?,
        signing_infos: signing_infos
            .into_iter()
            .map(|(address, info)| SigningInfoEntry { address, info })
            .collect(),
        missed_blocks,
        slashing_periods: keeper.slashing_periods(ctx)?,
    })
}
