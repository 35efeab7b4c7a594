//! Protocol version 1. Adds the record module in place and serves
//! distribution queries under `distribution` instead of `distr`.

use super::{base_query_routes, base_routes, begin_blocker, end_blocker, interceptors, Protocol};
use crate::config::AppConfig;
use crate::genesis;
use crate::keepers::{KeeperSet, ModuleId};
use hub_02_modules::distribution::DistributionQuerier;
use hub_02_modules::record::{self, RecordHandler, RecordQuerier};
use hub_02_modules::upgrade::ProtocolKeeper;
use shared_types::{FatalError, ProtocolDefinition};
use std::sync::Arc;
use tracing::debug;

pub const VERSION: u64 = 1;
pub const SOFTWARE: &str = "hubd/v1";

pub const DISTRIBUTION_QUERY_ROUTE: &str = "distribution";

pub fn load(config: &AppConfig, protocol: ProtocolKeeper) -> Result<Protocol, FatalError> {
    let mut modules = super::v0::MODULES.to_vec();
    modules.push(ModuleId::Record);
    let keepers = KeeperSet::load(&modules, protocol)?;
    let records = keepers.record().ok_or_else(|| FatalError::MissingKeeper("record".into()))?;

    let router = base_routes(&keepers)?
        .add_route(record::ROUTE, Arc::new(RecordHandler::new(records)))?
        .freeze();
    let query_router = base_query_routes(&keepers)?
        .add_route(DISTRIBUTION_QUERY_ROUTE, Arc::new(DistributionQuerier::new(keepers.distribution()?)))?
        .add_route(record::ROUTE, Arc::new(RecordQuerier::new(records)))?
        .freeze();
    let interceptors = interceptors(&keepers, config)?;
    debug!("[protocol] v{} routes: {:?}", VERSION, router.names());

    Ok(Protocol::new(
        ProtocolDefinition::new(VERSION, SOFTWARE, 0),
        keepers,
        router,
        query_router,
        interceptors,
    )
    .with_init_chainer(genesis::init_chainer)
    .with_begin_blocker(begin_blocker)
    .with_end_blocker(end_blocker))
}
