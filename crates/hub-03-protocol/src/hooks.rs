//! # Hook Composite
//!
//! The single hooks value the staking keeper is wired with. Every event fans
//! out to all members in registration order; a failing member does not stop
//! the ones after it, and the first failure is returned once all have run.
//!
//! Members are registered distribution first, slashing second, so reward
//! bookkeeping always settles before downtime tracking observes the same
//! validator transition.

use hub_01_store::Context;
use hub_02_modules::StakingHooks;
use shared_types::{Address, FatalError};
use std::sync::Arc;

#[derive(Default, Clone)]
pub struct StakingHooksComposite {
    members: Vec<(&'static str, Arc<dyn StakingHooks>)>,
}

impl StakingHooksComposite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &'static str, hooks: Arc<dyn StakingHooks>) -> Self {
        self.members.push((name, hooks));
        self
    }

    pub fn member_names(&self) -> Vec<&'static str> {
        self.members.iter().map(|(name, _)| *name).collect()
    }

    fn fan_out<F>(&self, ctx: &mut Context<'_>, event: &'static str, f: F) -> Result<(), FatalError>
    where
        F: Fn(&dyn StakingHooks, &mut Context<'_>) -> Result<(), FatalError>,
    {
        let mut first_err = None;
        for (name, member) in &self.members {
            if let Err(e) = f(member.as_ref(), &mut *ctx) {
                tracing::error!("[hooks] {} failed in {}: {}", name, event, e);
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl StakingHooks for StakingHooksComposite {
    fn on_validator_created(&self, ctx: &mut Context<'_>, operator: &Address) -> Result<(), FatalError> {
        self.fan_out(ctx, "on_validator_created", |h, ctx| h.on_validator_created(ctx, operator))
    }

    fn on_validator_modified(&self, ctx: &mut Context<'_>, operator: &Address) -> Result<(), FatalError> {
        self.fan_out(ctx, "on_validator_modified", |h, ctx| h.on_validator_modified(ctx, operator))
    }

    fn on_validator_removed(&self, ctx: &mut Context<'_>, cons: &Address, operator: &Address) -> Result<(), FatalError> {
        self.fan_out(ctx, "on_validator_removed", |h, ctx| {
            h.on_validator_removed(ctx, cons, operator)
        })
    }

    fn on_validator_bonded(&self, ctx: &mut Context<'_>, cons: &Address, operator: &Address) -> Result<(), FatalError> {
        self.fan_out(ctx, "on_validator_bonded", |h, ctx| {
            h.on_validator_bonded(ctx, cons, operator)
        })
    }

    fn on_validator_power_did_change(
        &self,
        ctx: &mut Context<'_>,
        cons: &Address,
        operator: &Address,
    ) -> Result<(), FatalError> {
        self.fan_out(ctx, "on_validator_power_did_change", |h, ctx| {
            h.on_validator_power_did_change(ctx, cons, operator)
        })
    }

    fn on_validator_begin_unbonding(
        &self,
        ctx: &mut Context<'_>,
        cons: &Address,
        operator: &Address,
    ) -> Result<(), FatalError> {
        self.fan_out(ctx, "on_validator_begin_unbonding", |h, ctx| {
            h.on_validator_begin_unbonding(ctx, cons, operator)
        })
    }

    fn on_delegation_created(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        validator: &Address,
    ) -> Result<(), FatalError> {
        self.fan_out(ctx, "on_delegation_created", |h, ctx| {
            h.on_delegation_created(ctx, delegator, validator)
        })
    }

    fn on_delegation_shares_modified(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        validator: &Address,
    ) -> Result<(), FatalError> {
        self.fan_out(ctx, "on_delegation_shares_modified", |h, ctx| {
            h.on_delegation_shares_modified(ctx, delegator, validator)
        })
    }

    fn on_delegation_removed(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        validator: &Address,
    ) -> Result<(), FatalError> {
        self.fan_out(ctx, "on_delegation_removed", |h, ctx| {
            h.on_delegation_removed(ctx, delegator, validator)
        })
    }
}
