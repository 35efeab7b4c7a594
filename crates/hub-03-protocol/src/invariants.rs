//! # Runtime Invariants
//!
//! Cross-module accounting checks run at the end of every block. A broken
//! invariant means this replica already diverged; the only safe reaction is
//! to stop before the block is committed.

use crate::config::InvariantLevel;
use crate::keepers::KeeperSet;
use hub_01_store::Context;
use shared_types::{Address, Dec, FatalError, HubError, HubResult};
use std::collections::BTreeMap;
use tracing::error;

/// `Ok(None)` when the invariant holds, `Ok(Some(detail))` when broken.
pub type Invariant = fn(&KeeperSet, &Context<'_>) -> HubResult<Option<String>>;

pub const INVARIANTS: [(&str, Invariant); 4] = [
    ("supply", supply),
    ("bonded", bonded),
    ("shares", shares),
    ("distribution", distribution),
];

/// First broken invariant as [`FatalError::InvariantBroken`].
pub fn check_all(keepers: &KeeperSet, ctx: &Context<'_>) -> Result<(), FatalError> {
    for (name, invariant) in INVARIANTS {
        if let Some(detail) = invariant(keepers, ctx).map_err(HubError::into_fatal)? {
            return Err(FatalError::InvariantBroken {
                name: name.to_string(),
                detail,
            });
        }
    }
    Ok(())
}

pub fn run(keepers: &KeeperSet, ctx: &Context<'_>, level: InvariantLevel) -> Result<(), FatalError> {
    match level {
        InvariantLevel::Off => Ok(()),
        InvariantLevel::Halt => check_all(keepers, ctx),
        InvariantLevel::Warn => {
            if let Err(e) = check_all(keepers, ctx) {
                error!("[invariants] height {}: {} (continuing, level=warn)", ctx.block_height(), e);
            }
            Ok(())
        }
    }
}

/// Everything the distribution module owes, in `denom`.
fn distribution_outstanding(keepers: &KeeperSet, ctx: &Context<'_>, denom: &str) -> HubResult<Dec> {
    let distr = keepers.distribution()?;
    let pool = distr.fee_pool(ctx)?;
    let mut total = pool.val_pool.amount_of(denom) + pool.community_pool.amount_of(denom);
    for vdi in distr.vdis(ctx)? {
        total += vdi.del_pool.amount_of(denom) + vdi.val_commission.amount_of(denom);
    }
    Ok(total)
}

/// Loose tokens equal every unbonded holding of the bond denom.
fn supply(keepers: &KeeperSet, ctx: &Context<'_>) -> HubResult<Option<String>> {
    let staking = keepers.staking()?;
    let denom = staking.bond_denom(ctx)?;
    let loose = staking.pool(ctx)?.loose_tokens;

    let accounts: u128 = keepers
        .accounts()?
        .accounts(ctx)?
        .iter()
        .map(|a| a.coins.amount_of(&denom))
        .sum();
    let unbonded_validators: u128 = staking
        .validators(ctx)?
        .iter()
        .filter(|v| !v.is_bonded())
        .map(|v| v.tokens)
        .sum();
    let unbonding: u128 = staking.unbonding_delegations(ctx)?.iter().map(|u| u.balance).sum();
    let fees = keepers.fees()?.collected_fees(ctx)?.amount_of(&denom);
    let distr = distribution_outstanding(keepers, ctx, &denom)?.truncate();

    let sum = accounts + unbonded_validators + unbonding + fees + distr;
    if sum == loose {
        return Ok(None);
    }
    Ok(Some(format!(
        "loose tokens {loose} but accounts {accounts} + unbonded validators {unbonded_validators} \
         + unbonding {unbonding} + fee collector {fees} + distribution {distr} = {sum}"
    )))
}

fn bonded(keepers: &KeeperSet, ctx: &Context<'_>) -> HubResult<Option<String>> {
    let staking = keepers.staking()?;
    let bonded = staking.pool(ctx)?.bonded_tokens;
    let sum: u128 = staking.bonded_validators(ctx)?.iter().map(|v| v.tokens).sum();
    Ok((sum != bonded).then(|| format!("pool bonded tokens {bonded}, bonded validators hold {sum}")))
}

fn shares(keepers: &KeeperSet, ctx: &Context<'_>) -> HubResult<Option<String>> {
    let staking = keepers.staking()?;
    let mut by_validator: BTreeMap<Address, Dec> = BTreeMap::new();
    for d in staking.delegations(ctx)? {
        *by_validator.entry(d.validator).or_default() += d.shares;
    }
    for v in staking.validators(ctx)? {
        let delegated = by_validator.get(&v.operator).copied().unwrap_or_default();
        if delegated != v.delegator_shares {
            return Ok(Some(format!(
                "validator {} issued {} shares, delegations hold {}",
                v.operator, v.delegator_shares, delegated
            )));
        }
    }
    Ok(None)
}

/// Decimal pools may split a coin but never create or lose a fraction.
fn distribution(keepers: &KeeperSet, ctx: &Context<'_>) -> HubResult<Option<String>> {
    let denom = keepers.staking()?.bond_denom(ctx)?;
    let total = distribution_outstanding(keepers, ctx, &denom)?;
    Ok((!total.is_integer()).then(|| format!("outstanding distribution balance {total}{denom} is fractional")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keepers::ModuleId;
    use crate::testutil::header;
    use hub_01_store::{catalog, CommitStore, ExecMode, InMemoryCommitStore, StoreView};
    use hub_02_modules::upgrade::ProtocolKeeper;
    use shared_types::Coins;

    fn setup() -> (KeeperSet, StoreView) {
        let keepers = KeeperSet::load(&ModuleId::ORDER, ProtocolKeeper::new(catalog::PROTOCOL)).unwrap();
        let store = InMemoryCommitStore::default();
        store.mount(&catalog::ALL);
        (keepers, store.begin())
    }

    fn fund(keepers: &KeeperSet, view: &mut StoreView, amount: u128, loose: u128) {
        let mut ctx = Context::new(view, header(1), ExecMode::Deliver);
        keepers
            .bank()
            .unwrap()
            .add_coins(&mut ctx, &Address([3; 20]), &Coins::single("stake", amount))
            .unwrap();
        let staking = keepers.staking().unwrap();
        let mut pool = staking.pool(&ctx).unwrap();
        pool.loose_tokens = loose;
        staking.set_pool(&mut ctx, &pool).unwrap();
    }

    #[test]
    fn test_balanced_state_passes() {
        let (keepers, mut view) = setup();
        fund(&keepers, &mut view, 500, 500);
        let ctx = Context::new(&mut view, header(1), ExecMode::Deliver);
        assert!(check_all(&keepers, &ctx).is_ok());
    }

    #[test]
    fn test_unbacked_supply_is_broken() {
        let (keepers, mut view) = setup();
        fund(&keepers, &mut view, 500, 499);
        let ctx = Context::new(&mut view, header(1), ExecMode::Deliver);
        match check_all(&keepers, &ctx) {
            Err(FatalError::InvariantBroken { name, .. }) => assert_eq!(name, "supply"),
            other => panic!("expected broken supply, got {other:?}"),
        }
        assert!(run(&keepers, &ctx, InvariantLevel::Warn).is_ok());
        assert!(run(&keepers, &ctx, InvariantLevel::Off).is_ok());
        assert!(run(&keepers, &ctx, InvariantLevel::Halt).is_err());
    }
}
