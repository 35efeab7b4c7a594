use super::keeper::DistributionKeeper;
use crate::types::{from_json_bytes, to_json_bytes, Handler, HandlerResult, Msg, Querier};
use hub_01_store::Context;
use serde::{Deserialize, Serialize};
use shared_types::tags::keys;
use shared_types::{Address, HubResult, Tags, TxError};

pub struct DistributionHandler {
    keeper: DistributionKeeper,
}

impl DistributionHandler {
    pub fn new(keeper: DistributionKeeper) -> Self {
        Self { keeper }
    }
}

impl Handler for DistributionHandler {
    fn handle(&self, ctx: &mut Context<'_>, msg: &Msg) -> HubResult<HandlerResult> {
        let k = &self.keeper;
        let tags = Tags::new().with(keys::ACTION, msg.msg_type());
        let tags = match msg {
            Msg::SetWithdrawAddress(m) => {
                k.set_withdraw_addr(ctx, &m.delegator, &m.withdraw_addr)?;
                tags.with(keys::DELEGATOR, m.delegator)
            }
            Msg::WithdrawDelegatorReward(m) => {
                let paid = k.withdraw_delegation_reward(ctx, &m.delegator, &m.validator)?;
                tags.with(keys::DELEGATOR, m.delegator)
                    .with(keys::SRC_VALIDATOR, m.validator)
                    .with(keys::REWARD, paid)
            }
            Msg::WithdrawDelegatorRewardsAll(m) => {
                let paid = k.withdraw_delegation_rewards_all(ctx, &m.delegator)?;
                tags.with(keys::DELEGATOR, m.delegator).with(keys::REWARD, paid)
            }
            Msg::WithdrawValidatorRewardsAll(m) => {
                let paid = k.withdraw_validator_rewards_all(ctx, &m.validator)?;
                tags.with(keys::VALIDATOR, m.validator).with(keys::REWARD, paid)
            }
            other => {
                return Err(TxError::UnknownRequest(format!(
                    "unrecognized distribution message {}",
                    other.msg_type()
                ))
                .into())
            }
        };
        Ok(HandlerResult::with_tags(tags))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationDistQuery {
    pub delegator: Address,
    pub validator: Address,
}

pub struct DistributionQuerier {
    keeper: DistributionKeeper,
}

impl DistributionQuerier {
    pub fn new(keeper: DistributionKeeper) -> Self {
        Self { keeper }
    }
}

impl Querier for DistributionQuerier {
    fn query(&self, ctx: &Context<'_>, path: &[&str], data: &[u8]) -> HubResult<Vec<u8>> {
        let k = &self.keeper;
        match path.first().copied() {
            Some("params") => to_json_bytes(&k.params(ctx)?),
            Some("fee_pool") => to_json_bytes(&k.fee_pool(ctx)?),
            Some("validator_dist_info") => {
                let operator: Address = from_json_bytes(data)?;
                to_json_bytes(&k.get_vdi(ctx, &operator)?)
            }
            Some("delegation_dist_info") => {
                let q: DelegationDistQuery = from_json_bytes(data)?;
                to_json_bytes(&k.get_ddi(ctx, &q.delegator, &q.validator)?)
            }
            Some("delegation_dist_infos") => {
                let delegator: Address = from_json_bytes(data)?;
                to_json_bytes(&k.delegator_ddis(ctx, &delegator)?)
            }
            Some("withdraw_addr") => {
                let delegator: Address = from_json_bytes(data)?;
                to_json_bytes(&k.withdraw_addr(ctx, &delegator)?)
            }
            _ => Err(TxError::UnknownRequest(format!("unknown distribution query {}", path.join("/"))).into()),
        }
    }
}
