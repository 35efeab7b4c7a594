//! # Service
//!
//! On-chain service market. Authors define services, providers bind to them
//! with a deposit and a price, consumers call a binding with an escrowed fee
//! and providers answer before the request expires. Unanswered requests are
//! refunded at the end block of their expiration height.

pub mod keeper;
pub mod types;

pub use keeper::{escrow_holder, ServiceKeeper};
pub use types::*;

use crate::params::ParamSet;
use crate::types::{from_json_bytes, to_json_bytes, Handler, HandlerResult, Msg, Querier};
use hub_01_store::Context;
use serde::{Deserialize, Serialize};
use shared_types::tags::keys;
use shared_types::{HubResult, Tags, TxError};

pub const ROUTE: &str = "service";
pub const CODESPACE: &str = "service";

pub struct ServiceHandler {
    keeper: ServiceKeeper,
}

impl ServiceHandler {
    pub fn new(keeper: ServiceKeeper) -> Self {
        Self { keeper }
    }
}

impl Handler for ServiceHandler {
    fn handle(&self, ctx: &mut Context<'_>, msg: &Msg) -> HubResult<HandlerResult> {
        let k = &self.keeper;
        let tags = Tags::new().with(keys::ACTION, msg.msg_type());
        let tags = match msg {
            Msg::SvcDefine(m) => {
                k.define(ctx, m)?;
                tags
            }
            Msg::SvcBind(m) => {
                k.bind(ctx, m)?;
                tags.with(keys::SENDER, m.provider)
            }
            Msg::SvcUnbind(m) => {
                k.unbind(ctx, m)?;
                tags.with(keys::SENDER, m.provider)
            }
            Msg::SvcCall(m) => {
                let id = k.call(ctx, m)?;
                tags.with(keys::SENDER, m.consumer)
                    .with(keys::RECIPIENT, m.provider)
                    .with(keys::REQUEST_ID, id)
            }
            Msg::SvcRespond(m) => {
                let request = k.respond(ctx, m)?;
                tags.with(keys::SENDER, m.provider)
                    .with(keys::RECIPIENT, request.consumer)
                    .with(keys::REQUEST_ID, request.id)
            }
            other => {
                return Err(TxError::UnknownRequest(format!(
                    "unrecognized service message {}",
                    other.msg_type()
                ))
                .into())
            }
        };
        Ok(HandlerResult::with_tags(tags))
    }
}

pub struct ServiceQuerier {
    keeper: ServiceKeeper,
}

impl ServiceQuerier {
    pub fn new(keeper: ServiceKeeper) -> Self {
        Self { keeper }
    }
}

impl Querier for ServiceQuerier {
    fn query(&self, ctx: &Context<'_>, path: &[&str], data: &[u8]) -> HubResult<Vec<u8>> {
        let k = &self.keeper;
        match path.first().copied() {
            Some("params") => to_json_bytes(&k.params(ctx)?),
            Some("definitions") => to_json_bytes(&k.definitions(ctx)?),
            Some("definition") => {
                let q: DefinitionQuery = from_json_bytes(data)?;
                to_json_bytes(&k.definition(ctx, &q.chain_id, &q.name)?)
            }
            Some("bindings") => to_json_bytes(&k.bindings(ctx)?),
            Some("binding") => {
                let q: BindingQuery = from_json_bytes(data)?;
                to_json_bytes(&k.binding(ctx, &q.def_chain_id, &q.def_name, &q.bind_chain_id, &q.provider)?)
            }
            Some("requests") => to_json_bytes(&k.active_requests(ctx)?),
            Some("response") => to_json_bytes(&k.response(ctx, from_json_bytes(data)?)?),
            _ => Err(TxError::UnknownRequest(format!("unknown service query {}", path.join("/"))).into()),
        }
    }
}

// =============================================================================
// GENESIS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServiceGenesis {
    pub params: ServiceParams,
    #[serde(default)]
    pub definitions: Vec<SvcDef>,
    #[serde(default)]
    pub bindings: Vec<SvcBinding>,
    #[serde(default)]
    pub requests: Vec<SvcRequest>,
    #[serde(default)]
    pub next_request_id: u64,
}

impl ServiceGenesis {
    pub fn validate(&self) -> Result<(), String> {
        self.params.validate()?;
        if let Some(r) = self.requests.iter().find(|r| r.id >= self.next_request_id) {
            return Err(format!("request {} is not below next_request_id", r.id));
        }
        Ok(())
    }
}

pub fn init_genesis(ctx: &mut Context<'_>, keeper: &ServiceKeeper, data: &ServiceGenesis) -> HubResult<()> {
    keeper.set_params(ctx, &data.params)?;
    for def in &data.definitions {
        keeper.set_definition(ctx, def)?;
    }
    for binding in &data.bindings {
        keeper.set_binding(ctx, binding)?;
    }
    for request in &data.requests {
        keeper.set_active_request(ctx, request)?;
    }
    keeper.set_next_request_id(ctx, data.next_request_id.max(1))
}

pub fn export_genesis(ctx: &Context<'_>, keeper: &ServiceKeeper) -> HubResult<ServiceGenesis> {
    Ok(ServiceGenesis {
        params: keeper.params(ctx)?,
        definitions: keeper.definitions(ctx)?,
        bindings: keeper.bindings(ctx)?,
        requests: keeper.active_requests(ctx)?,
        next_request_id: keeper.next_request_id(ctx)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AccountKeeper;
    use crate::bank::BankKeeper;
    use crate::params::ParamsKeeper;
    use crate::testutil::{ctx_at, fresh_view};
    use hub_01_store::catalog;
    use shared_types::{Address, Coins, HubError};

    const AUTHOR: Address = Address([1; 20]);
    const PROVIDER: Address = Address([2; 20]);
    const CONSUMER: Address = Address([3; 20]);

    fn setup(ctx: &mut Context<'_>) -> (BankKeeper, ServiceHandler, ServiceKeeper) {
        let bank = BankKeeper::new(AccountKeeper::new(catalog::ACCOUNT));
        let keeper = ServiceKeeper::new(
            catalog::SERVICE,
            ParamsKeeper::new(catalog::PARAMS).subspace("service"),
            bank,
        );
        bank.add_coins(ctx, &PROVIDER, &Coins::single("stake", 10_000)).unwrap();
        bank.add_coins(ctx, &CONSUMER, &Coins::single("stake", 100)).unwrap();
        let handler = ServiceHandler::new(keeper);
        handler
            .handle(
                ctx,
                &Msg::SvcDefine(MsgSvcDefine {
                    name: "price-feed".into(),
                    chain_id: "test-chain".into(),
                    description: "quotes".into(),
                    tags: vec![],
                    author: AUTHOR,
                    idl_content: "service Feed {}".into(),
                }),
            )
            .unwrap();
        (bank, handler, keeper)
    }

    fn bind_msg(deposit: u128) -> Msg {
        Msg::SvcBind(MsgSvcBind {
            def_name: "price-feed".into(),
            def_chain_id: "test-chain".into(),
            bind_chain_id: "test-chain".into(),
            provider: PROVIDER,
            binding_type: BindingType::Local,
            deposit: Coins::single("stake", deposit),
            prices: Coins::single("stake", 5),
            avg_rsp_time: 2,
        })
    }

    fn call_msg(timeout: u64) -> Msg {
        Msg::SvcCall(MsgSvcCall {
            def_name: "price-feed".into(),
            def_chain_id: "test-chain".into(),
            bind_chain_id: "test-chain".into(),
            provider: PROVIDER,
            consumer: CONSUMER,
            input: b"BTC".to_vec(),
            service_fee: Coins::single("stake", 5),
            timeout,
        })
    }

    #[test]
    fn test_bind_needs_deposit_multiple_and_call_pays_provider() {
        let mut view = fresh_view();
        let mut ctx = ctx_at(&mut view, 1);
        let (bank, handler, keeper) = setup(&mut ctx);

        let err = handler.handle(&mut ctx, &bind_msg(4_999)).unwrap_err();
        assert!(matches!(err, HubError::Tx(TxError::Module { code: CODE_LOW_DEPOSIT, .. })));
        handler.handle(&mut ctx, &bind_msg(5_000)).unwrap();

        let res = handler.handle(&mut ctx, &call_msg(10)).unwrap();
        assert_eq!(res.tags.get(keys::REQUEST_ID), Some("1"));
        assert_eq!(bank.get_coins(&ctx, &CONSUMER).unwrap().amount_of("stake"), 95);

        handler
            .handle(
                &mut ctx,
                &Msg::SvcRespond(MsgSvcRespond {
                    request_id: 1,
                    provider: PROVIDER,
                    output: b"42".to_vec(),
                    error_msg: String::new(),
                }),
            )
            .unwrap();
        assert_eq!(bank.get_coins(&ctx, &PROVIDER).unwrap().amount_of("stake"), 5_005);
        assert_eq!(keeper.response(&ctx, 1).unwrap().unwrap().output, b"42".to_vec());
        assert!(keeper.active_requests(&ctx).unwrap().is_empty());
    }

    #[test]
    fn test_expired_requests_are_refunded() {
        let mut view = fresh_view();
        let (bank, keeper) = {
            let mut ctx = ctx_at(&mut view, 1);
            let (bank, handler, keeper) = setup(&mut ctx);
            handler.handle(&mut ctx, &bind_msg(5_000)).unwrap();
            handler.handle(&mut ctx, &call_msg(3)).unwrap();
            assert!(handler.handle(&mut ctx, &call_msg(1_000)).is_err());
            let err = handler
                .handle(&mut ctx, &Msg::SvcUnbind(MsgSvcUnbind {
                    def_name: "price-feed".into(),
                    def_chain_id: "test-chain".into(),
                    bind_chain_id: "test-chain".into(),
                    provider: PROVIDER,
                }))
                .unwrap_err();
            assert!(matches!(err, HubError::Tx(TxError::Module { code: CODE_PENDING_REQUESTS, .. })));
            (bank, keeper)
        };
        {
            let mut ctx = ctx_at(&mut view, 3);
            assert!(keeper.end_blocker(&mut ctx).unwrap().is_empty());
        }
        let mut ctx = ctx_at(&mut view, 4);
        let tags = keeper.end_blocker(&mut ctx).unwrap();
        assert_eq!(tags.get(keys::REQUEST_ID), Some("1"));
        assert_eq!(bank.get_coins(&ctx, &CONSUMER).unwrap().amount_of("stake"), 100);
    }

    #[test]
    fn test_zero_height_refunds_and_export_has_no_requests() {
        let mut view = fresh_view();
        let mut ctx = ctx_at(&mut view, 1);
        let (bank, handler, keeper) = setup(&mut ctx);
        handler.handle(&mut ctx, &bind_msg(5_000)).unwrap();
        handler.handle(&mut ctx, &call_msg(0)).unwrap();

        keeper.prepare_for_zero_height(&mut ctx).unwrap();
        let exported = export_genesis(&ctx, &keeper).unwrap();
        assert!(exported.requests.is_empty());
        assert_eq!(exported.bindings.len(), 1);
        assert_eq!(exported.next_request_id, 2);
        assert_eq!(bank.get_coins(&ctx, &CONSUMER).unwrap().amount_of("stake"), 100);
    }
}
