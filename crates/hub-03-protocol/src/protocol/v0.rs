//! Protocol version 0: the genesis release. Every module except record.

use super::{base_query_routes, base_routes, begin_blocker, end_blocker, interceptors, Protocol};
use crate::config::AppConfig;
use crate::genesis;
use crate::keepers::{KeeperSet, ModuleId};
use hub_02_modules::distribution::{self, DistributionQuerier};
use hub_02_modules::upgrade::ProtocolKeeper;
use shared_types::{FatalError, ProtocolDefinition};
use std::sync::Arc;
use tracing::debug;

pub const VERSION: u64 = 0;
pub const SOFTWARE: &str = "hubd/v0";

pub const MODULES: [ModuleId; 12] = [
    ModuleId::Accounts,
    ModuleId::Guardian,
    ModuleId::Params,
    ModuleId::Bank,
    ModuleId::Fees,
    ModuleId::Staking,
    ModuleId::Mint,
    ModuleId::Distribution,
    ModuleId::Slashing,
    ModuleId::Gov,
    ModuleId::Service,
    ModuleId::Upgrade,
];

pub fn load(config: &AppConfig, protocol: ProtocolKeeper) -> Result<Protocol, FatalError> {
    let keepers = KeeperSet::load(&MODULES, protocol)?;
    let router = base_routes(&keepers)?.freeze();
    let query_router = base_query_routes(&keepers)?
        .add_route(distribution::ROUTE, Arc::new(DistributionQuerier::new(keepers.distribution()?)))?
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
