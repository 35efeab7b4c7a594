//! # Slashing
//!
//! Downtime detection over a sliding window of blocks, double-sign evidence
//! handling and the unjail message.

pub mod genesis;
mod hooks;
pub mod keeper;
pub mod types;

pub use genesis::SlashingGenesis;
pub use keeper::SlashingKeeper;
pub use types::*;

use crate::types::{from_json_bytes, to_json_bytes, Handler, HandlerResult, Msg, Querier};
use hub_01_store::Context;
use shared_types::tags::keys;
use shared_types::{Address, HubResult, Tags, TxError};

pub const ROUTE: &str = "slashing";
pub const CODESPACE: &str = "slashing";

pub struct SlashingHandler {
    keeper: SlashingKeeper,
}

impl SlashingHandler {
    pub fn new(keeper: SlashingKeeper) -> Self {
        Self { keeper }
    }
}

impl Handler for SlashingHandler {
    fn handle(&self, ctx: &mut Context<'_>, msg: &Msg) -> HubResult<HandlerResult> {
        match msg {
            Msg::Unjail(m) => {
                self.keeper.unjail(ctx, &m.validator)?;
                Ok(HandlerResult::with_tags(
                    Tags::new()
                        .with(keys::ACTION, msg.msg_type())
                        .with(keys::VALIDATOR, m.validator),
                ))
            }
            other => Err(TxError::UnknownRequest(format!(
                "unrecognized slashing message {}",
                other.msg_type()
            ))
            .into()),
        }
    }
}

pub struct SlashingQuerier {
    keeper: SlashingKeeper,
}

impl SlashingQuerier {
    pub fn new(keeper: SlashingKeeper) -> Self {
        Self { keeper }
    }
}

impl Querier for SlashingQuerier {
    fn query(&self, ctx: &Context<'_>, path: &[&str], data: &[u8]) -> HubResult<Vec<u8>> {
        match path.first().copied() {
            Some("params") => to_json_bytes(&self.keeper.params(ctx)?),
            Some("signing-info") => {
                let cons: Address = from_json_bytes(data)?;
                to_json_bytes(&self.keeper.signing_info(ctx, &cons)?)
            }
            _ => Err(TxError::UnknownRequest(format!("unknown slashing query {}", path.join("/"))).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AccountKeeper;
    use crate::bank::BankKeeper;
    use crate::params::ParamsKeeper;
    use crate::staking::{Commission, Description, MsgCreateValidator, StakingKeeper, UnwiredStaking, POWER_REDUCTION};
    use crate::testutil::{ctx_at, fresh_view};
    use hub_01_store::{catalog, StoreView};
    use shared_types::{Coin, Coins, Dec, PubKey};
    use std::sync::Arc;

    const OP: Address = Address([1; 20]);

    fn setup(view: &mut StoreView) -> (StakingKeeper, SlashingKeeper) {
        let params = ParamsKeeper::new(catalog::PARAMS);
        let bank = BankKeeper::new(AccountKeeper::new(catalog::ACCOUNT));
        let unwired = UnwiredStaking::new(catalog::STAKE, bank, params.subspace("stake"));
        let slashing = SlashingKeeper::new(catalog::SLASHING, params.subspace("slashing"), unwired.core());
        let staking = unwired.attach_hooks(Arc::new(slashing));

        let mut ctx = ctx_at(view, 1);
        slashing
            .set_params(
                &mut ctx,
                &SlashingParams {
                    signed_blocks_window: 10,
                    downtime_jail_duration: 10,
                    ..SlashingParams::default()
                },
            )
            .unwrap();
        bank.add_coins(&mut ctx, &OP, &Coins::single("stake", 10 * POWER_REDUCTION)).unwrap();
        staking.inflate(&mut ctx, 10 * POWER_REDUCTION).unwrap();
        staking
            .create_validator(
                &mut ctx,
                &MsgCreateValidator {
                    description: Description {
                        moniker: "v".into(),
                        ..Default::default()
                    },
                    commission: Commission::default(),
                    operator: OP,
                    pub_key: PubKey([1; 32]),
                    delegation: Coin::new("stake", 10 * POWER_REDUCTION),
                },
            )
            .unwrap();
        staking.end_blocker(&mut ctx).unwrap();
        (staking, slashing)
    }

    #[test]
    fn test_downtime_jails_after_window_and_unjail_waits() {
        let mut view = fresh_view();
        let (staking, slashing) = setup(&mut view);
        let cons = PubKey([1; 32]).address();

        for height in 2..=11 {
            let mut ctx = ctx_at(&mut view, height);
            let tags = slashing.handle_validator_signature(&mut ctx, &cons, 10, false).unwrap();
            assert!(tags.is_empty(), "jailed too early at height {height}");
        }
        {
            let mut ctx = ctx_at(&mut view, 12);
            let tags = slashing.handle_validator_signature(&mut ctx, &cons, 10, false).unwrap();
            assert_eq!(tags.get(keys::SLASH_REASON), Some("missing_signature"));
            let v = staking.get_validator(&ctx, &OP).unwrap().unwrap();
            assert!(v.jailed);
            assert_eq!(v.tokens, 10 * POWER_REDUCTION - POWER_REDUCTION / 10);
            assert!(slashing.missed_indexes(&ctx, &cons).unwrap().is_empty());
        }
        {
            let mut ctx = ctx_at(&mut view, 13);
            assert!(slashing.unjail(&mut ctx, &OP).is_err());
        }
        let mut ctx = ctx_at(&mut view, 22);
        slashing.unjail(&mut ctx, &OP).unwrap();
        assert!(!staking.get_validator(&ctx, &OP).unwrap().unwrap().jailed);
    }

    #[test]
    fn test_double_sign_is_capped_per_period() {
        let mut view = fresh_view();
        let (staking, slashing) = setup(&mut view);
        let cons = PubKey([1; 32]).address();
        let mut ctx = ctx_at(&mut view, 6);

        let tags = slashing.handle_double_sign(&mut ctx, &cons, 5, 10).unwrap();
        assert_eq!(tags.get(keys::SLASH_REASON), Some("double_sign"));
        let after_first = staking.get_validator(&ctx, &OP).unwrap().unwrap().tokens;
        assert_eq!(after_first, 10 * POWER_REDUCTION - POWER_REDUCTION / 2);

        slashing.handle_double_sign(&mut ctx, &cons, 5, 10).unwrap();
        assert_eq!(staking.get_validator(&ctx, &OP).unwrap().unwrap().tokens, after_first);
        let period = slashing.slashing_periods(&ctx).unwrap();
        assert_eq!(period[0].slashed_so_far, Dec::percent(5));
    }

    #[test]
    fn test_zero_height_rebases_jail_and_drops_periods() {
        let mut view = fresh_view();
        let (_staking, slashing) = setup(&mut view);
        let cons = PubKey([1; 32]).address();
        let mut ctx = ctx_at(&mut view, 6);
        slashing.handle_double_sign(&mut ctx, &cons, 5, 10).unwrap();
        let jailed_until = slashing.signing_info(&ctx, &cons).unwrap().unwrap().jailed_until;

        slashing.prepare_for_zero_height(&mut ctx).unwrap();
        let info = slashing.signing_info(&ctx, &cons).unwrap().unwrap();
        assert_eq!(info.start_height, 0);
        assert_eq!(info.jailed_until, jailed_until - 6);
        assert!(slashing.slashing_periods(&ctx).unwrap().is_empty());
    }
}
