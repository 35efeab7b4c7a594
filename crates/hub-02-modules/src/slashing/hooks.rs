use super::keeper::SlashingKeeper;
use crate::types::StakingHooks;
use hub_01_store::Context;
use shared_types::{Address, FatalError, HubError};

impl StakingHooks for SlashingKeeper {
    fn on_validator_created(&self, ctx: &mut Context<'_>, operator: &Address) -> Result<(), FatalError> {
        SlashingKeeper::on_validator_created(self, ctx, operator).map_err(HubError::into_fatal)
    }

    fn on_validator_removed(&self, ctx: &mut Context<'_>, cons: &Address, _operator: &Address) -> Result<(), FatalError> {
        SlashingKeeper::on_validator_removed(self, ctx, cons).map_err(HubError::into_fatal)
    }

    fn on_validator_bonded(&self, ctx: &mut Context<'_>, cons: &Address, _operator: &Address) -> Result<(), FatalError> {
        SlashingKeeper::on_validator_bonded(self, ctx, cons).map_err(HubError::into_fatal)
    }

    fn on_validator_begin_unbonding(
        &self,
        ctx: &mut Context<'_>,
        cons: &Address,
        _operator: &Address,
    ) -> Result<(), FatalError> {
        SlashingKeeper::on_validator_begin_unbonding(self, ctx, cons).map_err(HubError::into_fatal)
    }
}
