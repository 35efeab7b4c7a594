//! # Wiring Errors
//!
//! Assembly mistakes are caught while a protocol is being built, long before
//! the first block: routes register once, keepers need their dependencies,
//! and a protocol needs every store it touches mounted.

#[cfg(test)]
mod tests {
    use hub_01_store::{catalog, Context, StoreKey};
    use hub_02_modules::upgrade::ProtocolKeeper;
    use hub_02_modules::{HandlerResult, Handler, Msg, Querier};
    use hub_03_protocol::protocol::{v0, v1};
    use hub_03_protocol::{AppConfig, InvariantLevel, KeeperSet, ModuleId, ProtocolEngine, QueryRouterBuilder, RouterBuilder};
    use shared_types::{FatalError, HubResult};
    use std::collections::BTreeSet;
    use std::sync::Arc;

    struct Noop;

    impl Handler for Noop {
        fn handle(&self, _ctx: &mut Context<'_>, _msg: &Msg) -> HubResult<HandlerResult> {
            Ok(HandlerResult::default())
        }
    }

    impl Querier for Noop {
        fn query(&self, _ctx: &Context<'_>, _path: &[&str], _data: &[u8]) -> HubResult<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_message_route_registers_once() {
        let err = RouterBuilder::new()
            .add_route("bank", Arc::new(Noop))
            .and_then(|b| b.add_route("staking", Arc::new(Noop)))
            .and_then(|b| b.add_route("bank", Arc::new(Noop)))
            .err();
        assert!(matches!(err, Some(FatalError::DuplicateRoute(name)) if name == "bank"));
    }

    #[test]
    fn test_query_route_registers_once() {
        let err = QueryRouterBuilder::new()
            .add_route("distr", Arc::new(Noop))
            .and_then(|b| b.add_route("distr", Arc::new(Noop)))
            .err();
        assert!(matches!(err, Some(FatalError::DuplicateQueryRoute(name)) if name == "distr"));
    }

    #[test]
    fn test_routes_keep_registration_order() {
        let router = RouterBuilder::new()
            .add_route("gov", Arc::new(Noop))
            .and_then(|b| b.add_route("bank", Arc::new(Noop)))
            .unwrap()
            .freeze();
        assert_eq!(router.names(), ["gov", "bank"]);
        assert!(router.route("staking").is_none());
    }

    #[test]
    fn test_keeper_without_its_dependency_is_fatal() {
        let modules = [
            ModuleId::Accounts,
            ModuleId::Params,
            ModuleId::Bank,
            ModuleId::Fees,
            ModuleId::Mint,
        ];
        let err = KeeperSet::load(&modules, ProtocolKeeper::new(catalog::PROTOCOL)).err();
        assert!(matches!(
            err,
            Some(FatalError::MissingKeeperDependency { module, dependency })
                if module == "mint" && dependency == "staking"
        ));
    }

    #[test]
    fn test_partial_keeper_set_reports_missing_keeper() {
        let keepers = KeeperSet::load(
            &[ModuleId::Accounts, ModuleId::Params, ModuleId::Bank],
            ProtocolKeeper::new(catalog::PROTOCOL),
        )
        .unwrap();
        assert!(keepers.bank().is_ok());
        assert!(matches!(keepers.staking(), Err(FatalError::MissingKeeper(_))));
        assert!(keepers.hook_members().is_empty());
    }

    #[test]
    fn test_protocol_needs_its_stores_mounted() {
        let without_record: BTreeSet<StoreKey> = catalog::ALL.iter().copied().filter(|k| *k != catalog::RECORD).collect();
        let mut engine = ProtocolEngine::new(Arc::new(without_record), InvariantLevel::Halt);
        let config = AppConfig::default();

        engine.add(v0::load(&config, engine.protocol_keeper()).unwrap()).unwrap();
        let err = engine.add(v1::load(&config, engine.protocol_keeper()).unwrap()).unwrap_err();
        assert!(matches!(err, FatalError::UnmountedStore(_)));
        assert_eq!(engine.versions(), [0]);
    }
}
