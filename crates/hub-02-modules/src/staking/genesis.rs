//! Staking genesis import and export.

use super::keeper::{StakingCore, StakingKeeper};
use super::types::*;
use crate::params::ParamSet;
use hub_01_store::Context;
use serde::{Deserialize, Serialize};
use shared_types::{Address, HubResult, ValidatorUpdate};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastValidatorPower {
    pub operator: Address,
    pub power: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StakingGenesis {
    pub pool: Pool,
    pub params: StakingParams,
    #[serde(default)]
    pub last_total_power: u64,
    #[serde(default)]
    pub last_validator_powers: Vec<LastValidatorPower>,
    #[serde(default)]
    pub validators: Vec<Validator>,
    #[serde(default)]
    pub bonds: Vec<Delegation>,
    #[serde(default)]
    pub unbonding_delegations: Vec<UnbondingDelegation>,
    #[serde(default)]
    pub redelegations: Vec<Redelegation>,
    /// Set on export; an exported state carries its own active set.
    #[serde(default)]
    pub exported: bool,
}

impl StakingGenesis {
    pub fn validate(&self) -> Result<(), String> {
        self.params.validate()?;
        let mut operators = BTreeSet::new();
        let mut cons = BTreeSet::new();
        for v in &self.validators {
            if !operators.insert(v.operator) {
                return Err(format!("duplicate validator {}", v.operator));
            }
            if !cons.insert(v.cons_address()) {
                return Err(format!("duplicate consensus key for validator {}", v.operator));
            }
            if v.jailed && v.is_bonded() {
                return Err(format!("validator {} is bonded and jailed", v.operator));
            }
            if v.delegator_shares.is_zero() && !v.is_bonded() {
                return Err(format!("validator {} has no delegator shares", v.operator));
            }
            v.description.validate().map_err(|e| e.to_string())?;
        }
        for d in &self.bonds {
            if !operators.contains(&d.validator) {
                return Err(format!("delegation to unknown validator {}", d.validator));
            }
        }
        Ok(())
    }
}

/// Loads the staking state and returns the initial validator set.
pub fn init_genesis(
    ctx: &mut Context<'_>,
    keeper: &StakingKeeper,
    data: &StakingGenesis,
) -> HubResult<Vec<ValidatorUpdate>> {
    let fire_hooks = !data.exported;
    keeper.set_pool(ctx, &data.pool)?;
    keeper.set_params(ctx, &data.params)?;
    keeper.set_last_total_power(ctx, data.last_total_power)?;

    for v in &data.validators {
        keeper.save_validator(ctx, v)?;
        if fire_hooks {
            keeper.fire_validator_created(ctx, &v.operator)?;
        }
        if v.status == BondStatus::Unbonding {
            keeper.enqueue_unbonding_validator(ctx, v)?;
        }
    }
    for d in &data.bonds {
        if fire_hooks {
            keeper.fire_delegation_created(ctx, &d.delegator, &d.validator)?;
        }
        keeper.set_delegation(ctx, d)?;
    }
    for ubd in &data.unbonding_delegations {
        keeper.set_unbonding_delegation(ctx, ubd)?;
    }
    for red in &data.redelegations {
        keeper.set_redelegation(ctx, red)?;
    }

    if data.exported {
        let mut updates = Vec::with_capacity(data.last_validator_powers.len());
        for lv in &data.last_validator_powers {
            keeper.set_last_power(ctx, &lv.operator, lv.power)?;
            if let Some(v) = keeper.get_validator(ctx, &lv.operator)? {
                updates.push(ValidatorUpdate {
                    pub_key: v.cons_pubkey,
                    power: lv.power,
                });
            }
        }
        Ok(updates)
    } else {
        keeper.apply_and_return_validator_set_updates(ctx)
    }
}

pub fn export_genesis(ctx: &Context<'_>, keeper: &StakingCore) -> HubResult<StakingGenesis> {
    Ok(StakingGenesis {
        pool: keeper.pool(ctx)?,
        params: keeper.params(ctx)?,
        last_total_power: keeper.last_total_power(ctx)?,
        last_validator_powers: keeper
            .last_powers(ctx)?
            .into_iter()
            .map(|(operator, power)| LastValidatorPower { operator, power })
            .collect(),
        validators: keeper.validators(ctx)?,
        bonds: keeper.delegations(ctx)?,
        unbonding_delegations: keeper.unbonding_delegations(ctx)?,
        redelegations: keeper.redelegations(ctx)?,
        exported: true,
    })
}

/// Rewrites heights so the exported state can restart at height zero.
pub fn prepare_for_zero_height(ctx: &mut Context<'_>, keeper: &StakingCore) -> HubResult<()> {
    let height = ctx.block_height();
    keeper.reset_heights(ctx, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AccountKeeper;
    use crate::bank::BankKeeper;
    use crate::params::ParamsKeeper;
    use crate::staking::UnwiredStaking;
    use crate::testutil::{ctx_at, fresh_view};
    use hub_01_store::catalog;
    use shared_types::{Dec, PubKey};
    use std::sync::Arc;

    struct NoHooks;
    impl crate::types::StakingHooks for NoHooks {}

    fn keeper() -> StakingKeeper {
        let bank = BankKeeper::new(AccountKeeper::new(catalog::ACCOUNT));
        UnwiredStaking::new(catalog::STAKE, bank, ParamsKeeper::new(catalog::PARAMS).subspace("stake"))
            .attach_hooks(Arc::new(NoHooks))
    }

    fn genesis_validator(seed: u8, tokens: u128) -> Validator {
        let mut v = Validator::new(
            Address([seed; 20]),
            PubKey([seed; 32]),
            Description {
                moniker: format!("v{seed}"),
                ..Default::default()
            },
            Commission::default(),
        );
        v.tokens = tokens;
        v.delegator_shares = Dec::from_int(tokens);
        v
    }

    #[test]
    fn test_fresh_genesis_bonds_validators() {
        let keeper = keeper();
        let mut view = fresh_view();
        let mut ctx = ctx_at(&mut view, 0);
        let data = StakingGenesis {
            pool: Pool {
                loose_tokens: 3 * POWER_REDUCTION,
                bonded_tokens: 0,
            },
            validators: vec![genesis_validator(1, 2 * POWER_REDUCTION), genesis_validator(2, POWER_REDUCTION)],
            ..Default::default()
        };
        data.validate().unwrap();

        let updates = init_genesis(&mut ctx, &keeper, &data).unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(keeper.last_total_power(&ctx).unwrap(), 3);
        assert_eq!(keeper.pool(&ctx).unwrap().bonded_tokens, 3 * POWER_REDUCTION);

        let exported = export_genesis(&ctx, &keeper.core()).unwrap();
        assert!(exported.exported);
        assert_eq!(exported.last_validator_powers.len(), 2);
    }

    #[test]
    fn test_exported_genesis_reuses_last_powers() {
        let keeper = keeper();
        let mut view = fresh_view();
        let mut ctx = ctx_at(&mut view, 0);
        let mut v = genesis_validator(1, 4 * POWER_REDUCTION);
        v.status = BondStatus::Bonded;
        let data = StakingGenesis {
            pool: Pool {
                loose_tokens: 0,
                bonded_tokens: 4 * POWER_REDUCTION,
            },
            last_total_power: 4,
            last_validator_powers: vec![LastValidatorPower { operator: v.operator, power: 4 }],
            validators: vec![v.clone()],
            exported: true,
            ..Default::default()
        };
        let updates = init_genesis(&mut ctx, &keeper, &data).unwrap();
        assert_eq!(updates, vec![ValidatorUpdate { pub_key: v.cons_pubkey, power: 4 }]);
    }

    #[test]
    fn test_duplicate_validator_fails_validation() {
        let data = StakingGenesis {
            validators: vec![genesis_validator(1, 1), genesis_validator(1, 1)],
            ..Default::default()
        };
        assert!(data.validate().unwrap_err().contains("duplicate"));
    }
}
