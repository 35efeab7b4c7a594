use super::keeper::DistributionKeeper;
use crate::types::StakingHooks;
use hub_01_store::Context;
use shared_types::{Address, FatalError, HubError};

impl StakingHooks for DistributionKeeper {
    fn on_validator_created(&self, ctx: &mut Context<'_>, operator: &Address) -> Result<(), FatalError> {
        DistributionKeeper::on_validator_created(self, ctx, operator).map_err(HubError::into_fatal)
    }

    fn on_validator_modified(&self, ctx: &mut Context<'_>, operator: &Address) -> Result<(), FatalError> {
        DistributionKeeper::on_validator_modified(self, ctx, operator).map_err(HubError::into_fatal)
    }

    fn on_validator_removed(&self, ctx: &mut Context<'_>, _cons: &Address, operator: &Address) -> Result<(), FatalError> {
        DistributionKeeper::on_validator_removed(self, ctx, operator).map_err(HubError::into_fatal)
    }

    fn on_validator_bonded(&self, ctx: &mut Context<'_>, _cons: &Address, operator: &Address) -> Result<(), FatalError> {
        DistributionKeeper::on_validator_modified(self, ctx, operator).map_err(HubError::into_fatal)
    }

    fn on_validator_power_did_change(
        &self,
        ctx: &mut Context<'_>,
        _cons: &Address,
        operator: &Address,
    ) -> Result<(), FatalError> {
        DistributionKeeper::on_validator_modified(self, ctx, operator).map_err(HubError::into_fatal)
    }

    fn on_validator_begin_unbonding(
        &self,
        ctx: &mut Context<'_>,
        _cons: &Address,
        operator: &Address,
    ) -> Result<(), FatalError> {
        DistributionKeeper::on_validator_modified(self, ctx, operator).map_err(HubError::into_fatal)
    }

    fn on_delegation_created(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        validator: &Address,
    ) -> Result<(), FatalError> {
        DistributionKeeper::on_delegation_created(self, ctx, delegator, validator).map_err(HubError::into_fatal)
    }

    fn on_delegation_shares_modified(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        validator: &Address,
    ) -> Result<(), FatalError> {
        self.withdraw_delegation_reward(ctx, delegator, validator)
            .map(drop)
            .map_err(HubError::into_fatal)
    }

    fn on_delegation_removed(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        validator: &Address,
    ) -> Result<(), FatalError> {
        self.delete_ddi(ctx, delegator, validator).map_err(HubError::into_fatal)
    }
}
