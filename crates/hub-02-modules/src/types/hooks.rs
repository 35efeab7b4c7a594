//! Staking lifecycle events observed by distribution and slashing.

use hub_01_store::Context;
use shared_types::{Address, FatalError};

/// Callbacks fired by the wired staking keeper.
///
/// Every event fires *before* the staking state it describes is persisted
/// where the observer needs the old value (last power, old shares), and after
/// otherwise. Errors are fatal: there is no transaction to absorb them.
pub trait StakingHooks: Send + Sync {
    fn on_validator_created(&self, _ctx: &mut Context<'_>, _operator: &Address) -> Result<(), FatalError> {
        Ok(())
    }

    fn on_validator_modified(&self, _ctx: &mut Context<'_>, _operator: &Address) -> Result<(), FatalError> {
        Ok(())
    }

    fn on_validator_removed(
        &self,
        _ctx: &mut Context<'_>,
        _cons: &Address,
        _operator: &Address,
    ) -> Result<(), FatalError> {
        Ok(())
    }

    fn on_validator_bonded(
        &self,
        _ctx: &mut Context<'_>,
        _cons: &Address,
        _operator: &Address,
    ) -> Result<(), FatalError> {
        Ok(())
    }

    fn on_validator_power_did_change(
        &self,
        _ctx: &mut Context<'_>,
        _cons: &Address,
        _operator: &Address,
    ) -> Result<(), FatalError> {
        Ok(())
    }

    fn on_validator_begin_unbonding(
        &self,
        _ctx: &mut Context<'_>,
        _cons: &Address,
        _operator: &Address,
    ) -> Result<(), FatalError> {
        Ok(())
    }

    fn on_delegation_created(
        &self,
        _ctx: &mut Context<'_>,
        _delegator: &Address,
        _validator: &Address,
    ) -> Result<(), FatalError> {
        Ok(())
    }

    fn on_delegation_shares_modified(
        &self,
        _ctx: &mut Context<'_>,
        _delegator: &Address,
        _validator: &Address,
    ) -> Result<(), FatalError> {
        Ok(())
    }

    fn on_delegation_removed(
        &self,
        _ctx: &mut Context<'_>,
        _delegator: &Address,
        _validator: &Address,
    ) -> Result<(), FatalError> {
        Ok(())
    }
}
