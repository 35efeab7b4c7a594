//! Message handler and querier of the `stake` route.

use super::keeper::StakingKeeper;
use super::types::*;
use super::CODESPACE;
use crate::types::{from_json_bytes, to_json_bytes, Handler, HandlerResult, Msg, Querier};
use hub_01_store::Context;
use serde::{Deserialize, Serialize};
use shared_types::tags::keys;
use shared_types::{Address, HubResult, Tags, TxError};

pub struct StakingHandler {
    keeper: StakingKeeper,
}

impl StakingHandler {
    pub fn new(keeper: StakingKeeper) -> Self {
        Self { keeper }
    }
}

impl Handler for StakingHandler {
    fn handle(&self, ctx: &mut Context<'_>, msg: &Msg) -> HubResult<HandlerResult> {
        let k = &self.keeper;
        let tags = Tags::new().with(keys::ACTION, msg.msg_type());
        let tags = match msg {
            Msg::CreateValidator(m) => {
                k.create_validator(ctx, m)?;
                tags.with(keys::VALIDATOR, m.operator)
            }
            Msg::EditValidator(m) => {
                k.edit_validator(ctx, m)?;
                tags.with(keys::VALIDATOR, m.operator)
            }
            Msg::Delegate(m) => {
                let bond_denom = k.bond_denom(ctx)?;
                if m.amount.denom != bond_denom {
                    return Err(TxError::module(
                        CODESPACE,
                        CODE_BAD_DENOM,
                        format!("expected {bond_denom}, got {}", m.amount.denom),
                    )
                    .into());
                }
                let v = k
                    .get_validator(ctx, &m.validator)?
                    .ok_or_else(|| TxError::module(CODESPACE, CODE_NO_VALIDATOR, format!("validator {} does not exist", m.validator)))?;
                if v.jailed && v.operator != m.delegator {
                    return Err(TxError::module(CODESPACE, CODE_INVALID_VALIDATOR, "validator is jailed").into());
                }
                k.delegate(ctx, &m.delegator, &m.validator, m.amount.amount, true)?;
                tags.with(keys::DELEGATOR, m.delegator)
                    .with(keys::DST_VALIDATOR, m.validator)
            }
            Msg::BeginUnbonding(m) => {
                let end = k.begin_unbonding(ctx, m)?;
                tags.with(keys::DELEGATOR, m.delegator)
                    .with(keys::SRC_VALIDATOR, m.validator)
                    .with(keys::END_HEIGHT, end)
            }
            Msg::BeginRedelegate(m) => {
                let end = k.begin_redelegation(ctx, m)?;
                tags.with(keys::DELEGATOR, m.delegator)
                    .with(keys::SRC_VALIDATOR, m.src)
                    .with(keys::DST_VALIDATOR, m.dst)
                    .with(keys::END_HEIGHT, end)
            }
            other => {
                return Err(TxError::UnknownRequest(format!(
                    "unrecognized stake message {}",
                    other.msg_type()
                ))
                .into())
            }
        };
        Ok(HandlerResult::with_tags(tags))
    }
}

/// Body of the `delegation` query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationQuery {
    pub delegator: Address,
    pub validator: Address,
}

pub struct StakingQuerier {
    keeper: super::StakingCore,
}

impl StakingQuerier {
    pub fn new(keeper: super::StakingCore) -> Self {
        Self { keeper }
    }
}

impl Querier for StakingQuerier {
    fn query(&self, ctx: &Context<'_>, path: &[&str], data: &[u8]) -> HubResult<Vec<u8>> {
        let k = &self.keeper;
        match path.first().copied() {
            Some("validators") => to_json_bytes(&k.validators(ctx)?),
            Some("validator") => {
                let operator: Address = from_json_bytes(data)?;
                to_json_bytes(&k.get_validator(ctx, &operator)?)
            }
            Some("delegation") => {
                let q: DelegationQuery = from_json_bytes(data)?;
                to_json_bytes(&k.get_delegation(ctx, &q.delegator, &q.validator)?)
            }
            Some("delegations") => {
                let delegator: Address = from_json_bytes(data)?;
                to_json_bytes(&k.delegator_delegations(ctx, &delegator)?)
            }
            Some("unbonding-delegations") => to_json_bytes(&k.unbonding_delegations(ctx)?),
            Some("redelegations") => to_json_bytes(&k.redelegations(ctx)?),
            Some("pool") => to_json_bytes(&k.pool(ctx)?),
            Some("parameters") => to_json_bytes(&k.params(ctx)?),
            _ => Err(TxError::UnknownRequest(format!("unknown stake query {}", path.join("/"))).into()),
        }
    }
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
    use shared_types::{Coin, Coins, Dec, PubKey};
    use std::sync::Arc;

    struct NoHooks;
    impl crate::types::StakingHooks for NoHooks {}

    #[test]
    fn test_delegate_tags_and_query() {
        let bank = BankKeeper::new(AccountKeeper::new(catalog::ACCOUNT));
        let params = ParamsKeeper::new(catalog::PARAMS);
        let keeper = UnwiredStaking::new(catalog::STAKE, bank, params.subspace("stake"))
            .attach_hooks(Arc::new(NoHooks));
        let handler = StakingHandler::new(keeper.clone());
        let querier = StakingQuerier::new(keeper.core());

        let mut view = fresh_view();
        let mut ctx = ctx_at(&mut view, 3);
        let (op, del) = (Address([1; 20]), Address([2; 20]));
        bank.add_coins(&mut ctx, &op, &Coins::single("stake", 100)).unwrap();
        bank.add_coins(&mut ctx, &del, &Coins::single("stake", 50)).unwrap();
        keeper.inflate(&mut ctx, 150).unwrap();

        handler
            .handle(
                &mut ctx,
                &Msg::CreateValidator(MsgCreateValidator {
                    description: Description {
                        moniker: "one".into(),
                        ..Default::default()
                    },
                    commission: Commission::default(),
                    operator: op,
                    pub_key: PubKey([7; 32]),
                    delegation: Coin::new("stake", 100),
                }),
            )
            .unwrap();
        let res = handler
            .handle(
                &mut ctx,
                &Msg::Delegate(MsgDelegate {
                    delegator: del,
                    validator: op,
                    amount: Coin::new("stake", 50),
                }),
            )
            .unwrap();
        assert_eq!(res.tags.get(keys::ACTION), Some("delegate"));
        assert_eq!(res.tags.get(keys::DELEGATOR), Some(del.to_string().as_str()));

        let data = serde_json::to_vec(&DelegationQuery { delegator: del, validator: op }).unwrap();
        let bytes = querier.query(&ctx, &["delegation"], &data).unwrap();
        let d: Option<Delegation> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(d.unwrap().shares, Dec::from_int(50));

        let wrong_denom = handler.handle(
            &mut ctx,
            &Msg::Delegate(MsgDelegate {
                delegator: del,
                validator: op,
                amount: Coin::new("other", 1),
            }),
        );
        assert!(wrong_denom.is_err());
        assert!(querier.query(&ctx, &["nope"], &[]).is_err());
    }
}
