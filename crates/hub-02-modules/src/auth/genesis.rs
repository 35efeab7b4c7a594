use super::fee::{AuthParams, FeeKeeper};
use hub_01_store::Context;
use serde::{Deserialize, Serialize};
use shared_types::{Coins, HubResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AuthGenesis {
    pub collected_fees: Coins,
    pub params: AuthParams,
}

impl AuthGenesis {
    pub fn validate(&self) -> Result<(), String> {
        use crate::params::ParamSet;
        self.params.validate()
    }
}

pub fn init_genesis(ctx: &mut Context<'_>, fees: &FeeKeeper, data: &AuthGenesis) -> HubResult<()> {
    fees.set_params(ctx, &data.params)?;
    fees.set_collected_fees(ctx, &data.collected_fees)
}

pub fn export_genesis(ctx: &Context<'_>, fees: &FeeKeeper) -> HubResult<AuthGenesis> {
    Ok(AuthGenesis {
        collected_fees: fees.collected_fees(ctx)?,
        params: fees.params(ctx)?,
    })
}
