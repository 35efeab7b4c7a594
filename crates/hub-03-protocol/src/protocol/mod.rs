//! # Protocol
//!
//! One immutable bundle per software version: definition, keepers, frozen
//! routers, interceptor chain, lifecycle callbacks and the store keys it
//! expects mounted. Callbacks are optional; the engine skips absent ones.

pub mod v0;
pub mod v1;

use crate::config::AppConfig;
use crate::interceptors::InterceptorChain;
use crate::keepers::KeeperSet;
use crate::router::{QueryRouter, QueryRouterBuilder, Router, RouterBuilder};
use hub_01_store::{Context, StoreKey, StoreView};
use hub_02_modules::auth::{AccountQuerier, AuthAnteHandler, AuthFeePreprocessHandler, AuthFeeRefundHandler};
use hub_02_modules::bank::{self, BankHandler};
use hub_02_modules::distribution::{self, DistributionHandler};
use hub_02_modules::gov::{self, GovHandler, GovQuerier};
use hub_02_modules::guardian::{self, GuardianHandler, GuardianQuerier};
use hub_02_modules::params::ParamsQuerier;
use hub_02_modules::service::{self, ServiceHandler, ServiceQuerier};
use hub_02_modules::slashing::{self, SlashingHandler, SlashingQuerier};
use hub_02_modules::staking::{self, StakingHandler, StakingQuerier};
use hub_02_modules::upgrade::{self, UpgradeHandler, UpgradeOutcome, UpgradeQuerier};
use shared_types::{
    FatalError, HubError, HubResult, ProtocolDefinition, RequestBeginBlock, RequestEndBlock, RequestInitChain,
    ResponseInitChain, Tags, ValidatorUpdate,
};
use std::sync::Arc;

/// Imports genesis state. Takes the view rather than a context because
/// genesis transactions run through the full pipeline.
pub type InitChainer = fn(&Protocol, &mut StoreView, &RequestInitChain) -> Result<ResponseInitChain, FatalError>;

pub type BeginBlocker = fn(&KeeperSet, &mut Context<'_>, &RequestBeginBlock) -> Result<Tags, FatalError>;

pub type EndBlocker = fn(&KeeperSet, &mut Context<'_>, &RequestEndBlock) -> Result<EndBlockResult, FatalError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndBlockResult {
    pub validator_updates: Vec<ValidatorUpdate>,
    pub tags: Tags,
    pub upgrade: UpgradeOutcome,
}

pub struct Protocol {
    definition: ProtocolDefinition,
    keepers: KeeperSet,
    router: Router,
    query_router: QueryRouter,
    interceptors: InterceptorChain,
    init_chainer: Option<InitChainer>,
    begin_blocker: Option<BeginBlocker>,
    end_blocker: Option<EndBlocker>,
    store_keys: Vec<StoreKey>,
}

impl Protocol {
    pub fn new(
        definition: ProtocolDefinition,
        keepers: KeeperSet,
        router: Router,
        query_router: QueryRouter,
        interceptors: InterceptorChain,
    ) -> Self {
        let store_keys = keepers.store_keys();
        Self {
            definition,
            keepers,
            router,
            query_router,
            interceptors,
            init_chainer: None,
            begin_blocker: None,
            end_blocker: None,
            store_keys,
        }
    }

    pub fn with_init_chainer(mut self, f: InitChainer) -> Self {
        self.init_chainer = Some(f);
        self
    }

    pub fn with_begin_blocker(mut self, f: BeginBlocker) -> Self {
        self.begin_blocker = Some(f);
        self
    }

    pub fn with_end_blocker(mut self, f: EndBlocker) -> Self {
        self.end_blocker = Some(f);
        self
    }

    pub fn definition(&self) -> &ProtocolDefinition {
        &self.definition
    }

    pub fn version(&self) -> u64 {
        self.definition.version
    }

    pub fn keepers(&self) -> &KeeperSet {
        &self.keepers
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn query_router(&self) -> &QueryRouter {
        &self.query_router
    }

    pub fn interceptors(&self) -> &InterceptorChain {
        &self.interceptors
    }

    pub fn init_chainer(&self) -> Option<InitChainer> {
        self.init_chainer
    }

    pub fn begin_blocker(&self) -> Option<BeginBlocker> {
        self.begin_blocker
    }

    pub fn end_blocker(&self) -> Option<EndBlocker> {
        self.end_blocker
    }

    pub fn store_keys(&self) -> &[StoreKey] {
        &self.store_keys
    }
}

impl std::fmt::Debug for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Protocol")
            .field("definition", &self.definition)
            .field("routes", &self.router.names())
            .field("query_routes", &self.query_router.names())
            .finish()
    }
}

// =============================================================================
// SHARED ASSEMBLY
// =============================================================================

pub(crate) fn interceptors(keepers: &KeeperSet, config: &AppConfig) -> Result<InterceptorChain, FatalError> {
    let fees = keepers.fees()?;
    Ok(InterceptorChain::new(
        Arc::new(AuthFeePreprocessHandler::new(fees, config.min_gas_price)),
        Arc::new(AuthAnteHandler::new(keepers.accounts()?, fees)),
        Arc::new(AuthFeeRefundHandler::new(keepers.bank()?, fees)),
    ))
}

/// Message routes every version carries.
pub(crate) fn base_routes(keepers: &KeeperSet) -> Result<RouterBuilder, FatalError> {
    RouterBuilder::new()
        .add_route(bank::ROUTE, Arc::new(BankHandler::new(keepers.bank()?)))?
        .add_route(staking::ROUTE, Arc::new(StakingHandler::new(keepers.staking()?.clone())))?
        .add_route(distribution::ROUTE, Arc::new(DistributionHandler::new(keepers.distribution()?)))?
        .add_route(slashing::ROUTE, Arc::new(SlashingHandler::new(keepers.slashing()?)))?
        .add_route(gov::ROUTE, Arc::new(GovHandler::new(keepers.gov()?.clone())))?
        .add_route(service::ROUTE, Arc::new(ServiceHandler::new(keepers.service()?)))?
        .add_route(guardian::ROUTE, Arc::new(GuardianHandler::new(keepers.guardian()?)))?
        .add_route(upgrade::ROUTE, Arc::new(UpgradeHandler::new(keepers.upgrade()?)))
}

/// Query routes every version carries. Distribution is mounted per version.
pub(crate) fn base_query_routes(keepers: &KeeperSet) -> Result<QueryRouterBuilder, FatalError> {
    QueryRouterBuilder::new()
        .add_route(gov::ROUTE, Arc::new(GovQuerier::new(keepers.gov()?.clone())))?
        .add_route(staking::ROUTE, Arc::new(StakingQuerier::new(keepers.staking()?.core())))?
        .add_route(slashing::ROUTE, Arc::new(SlashingQuerier::new(keepers.slashing()?)))?
        .add_route(guardian::ROUTE, Arc::new(GuardianQuerier::new(keepers.guardian()?)))?
        .add_route(service::ROUTE, Arc::new(ServiceQuerier::new(keepers.service()?)))?
        .add_route(upgrade::ROUTE, Arc::new(UpgradeQuerier::new(keepers.upgrade()?)))?
        .add_route("params", Arc::new(ParamsQuerier::new(keepers.params()?.clone())))?
        .add_route("acc", Arc::new(AccountQuerier::new(keepers.accounts()?)))
}

fn fatal<T>(res: HubResult<T>) -> Result<T, FatalError> {
    res.map_err(HubError::into_fatal)
}

/// Mint, then distribution, then slashing. Tags follow stage order.
pub(crate) fn begin_blocker(
    keepers: &KeeperSet,
    ctx: &mut Context<'_>,
    req: &RequestBeginBlock,
) -> Result<Tags, FatalError> {
    let mint = fatal(keepers.mint()?.begin_blocker(ctx))?;
    let distr = fatal(keepers.distribution()?.begin_blocker(ctx, &req.last_commit_votes))?;
    let slashing = fatal(keepers.slashing()?.begin_blocker(
        ctx,
        &req.last_commit_votes,
        &req.byzantine_validators,
    ))?;
    Ok(mint.chain(distr).chain(slashing))
}

/// Gov, then staking, then service, then the upgrade tally.
pub(crate) fn end_blocker(
    keepers: &KeeperSet,
    ctx: &mut Context<'_>,
    _req: &RequestEndBlock,
) -> Result<EndBlockResult, FatalError> {
    let gov = fatal(keepers.gov()?.end_blocker(ctx))?;
    let (validator_updates, staking) = fatal(keepers.staking()?.end_blocker(ctx))?;
    let service = fatal(keepers.service()?.end_blocker(ctx))?;
    let (upgrade, upgrade_tags) = fatal(keepers.upgrade()?.end_blocker(ctx))?;
    Ok(EndBlockResult {
        validator_updates,
        tags: gov.chain(staking).chain(service).chain(upgrade_tags),
        upgrade,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::header;
    use hub_01_store::{catalog, CommitStore, ExecMode, InMemoryCommitStore};
    use hub_02_modules::upgrade::ProtocolKeeper;

    fn view() -> StoreView {
        let store = InMemoryCommitStore::default();
        store.mount(&catalog::ALL);
        store.begin()
    }

    #[test]
    fn test_version_zero_routes() {
        let protocol = v0::load(&AppConfig::default(), ProtocolKeeper::new(catalog::PROTOCOL)).unwrap();
        assert_eq!(protocol.version(), 0);
        assert!(protocol.router().route("record").is_none());
        assert!(protocol.query_router().route("distr").is_some());
        assert!(protocol.query_router().route("distribution").is_none());
        assert!(protocol.begin_blocker().is_some());
        assert!(!protocol.store_keys().contains(&catalog::RECORD));
    }

    #[test]
    fn test_version_one_adds_record_and_moves_distribution_queries() {
        let protocol = v1::load(&AppConfig::default(), ProtocolKeeper::new(catalog::PROTOCOL)).unwrap();
        assert_eq!(protocol.version(), 1);
        assert!(protocol.router().route("record").is_some());
        assert!(protocol.query_router().route("record").is_some());
        assert!(protocol.query_router().route("distr").is_none());
        assert!(protocol.query_router().route("distribution").is_some());
        assert!(protocol.store_keys().contains(&catalog::RECORD));
    }

    #[test]
    fn test_empty_block_produces_no_updates() {
        let protocol = v0::load(&AppConfig::default(), ProtocolKeeper::new(catalog::PROTOCOL)).unwrap();
        let mut view = view();
        let mut ctx = Context::new(&mut view, header(1), ExecMode::Deliver);
        let end = end_blocker(protocol.keepers(), &mut ctx, &RequestEndBlock { height: 1 }).unwrap();
        assert!(end.validator_updates.is_empty());
        assert_eq!(end.upgrade, UpgradeOutcome::Pending);
    }
}
