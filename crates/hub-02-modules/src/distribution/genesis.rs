use super::keeper::DistributionKeeper;
use super::types::*;
use crate::params::ParamSet;
use hub_01_store::Context;
use serde::{Deserialize, Serialize};
use shared_types::{Address, FatalError, HubResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DistrGenesis {
    pub fee_pool: FeePool,
    pub params: DistrParams,
    #[serde(default)]
    pub validator_dist_infos: Vec<ValidatorDistInfo>,
    #[serde(default)]
    pub delegation_dist_infos: Vec<DelegationDistInfo>,
    #[serde(default)]
    pub delegator_withdraw_infos: Vec<DelegatorWithdrawInfo>,
    #[serde(default)]
    pub previous_proposer: Address,
}

impl DistrGenesis {
    pub fn validate(&self) -> Result<(), String> {
        self.params.validate()
    }
}

/// Imports a settled distribution state. Unsettled pools are rejected: they
/// would refer to accumulators that no longer exist.
pub fn init_genesis(ctx: &mut Context<'_>, keeper: &DistributionKeeper, data: &DistrGenesis) -> HubResult<()> {
    if !data.fee_pool.val_pool.is_zero() {
        return Err(FatalError::MalformedGenesis(format!(
            "validator pool {} is not zero",
            data.fee_pool.val_pool
        ))
        .into());
    }
    keeper.set_fee_pool(ctx, &data.fee_pool)?;
    keeper.set_params(ctx, &data.params)?;
    for vdi in &data.validator_dist_infos {
        if !vdi.del_pool.is_zero() || !vdi.val_commission.is_zero() {
            return Err(FatalError::MalformedGenesis(format!(
                "validator {} carries delegator pool {} and commission {}",
                vdi.operator, vdi.del_pool, vdi.val_commission
            ))
            .into());
        }
        keeper.set_vdi(ctx, vdi)?;
    }
    for ddi in &data.delegation_dist_infos {
        keeper.set_ddi(ctx, ddi)?;
    }
    for info in &data.delegator_withdraw_infos {
        keeper.set_withdraw_addr(ctx, &info.delegator, &info.withdraw_addr)?;
    }
    keeper.set_previous_proposer(ctx, &data.previous_proposer)
}

pub fn export_genesis(ctx: &Context<'_>, keeper: &DistributionKeeper) -> HubResult<DistrGenesis> {
    Ok(DistrGenesis {
        fee_pool: keeper.fee_pool(ctx)?,
        params: keeper.params(ctx)?,
        validator_dist_infos: keeper.vdis(ctx)?,
        delegation_dist_infos: keeper.ddis(ctx)?,
        delegator_withdraw_infos: keeper.withdraw_infos(ctx)?,
        previous_proposer: keeper.previous_proposer(ctx)?,
    })
}
