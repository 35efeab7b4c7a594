//! # Protocol Engine
//!
//! Holds every protocol version this software implements and dispatches the
//! block lifecycle to the active one.
//!
//! ```text
//!   catalog: { 0 → Protocol v0, 1 → Protocol v1, ... }
//!                       │
//!        activate(v) ───┘──→ current ──→ begin / deliver / end
//!                                 ↑
//!   end_block: upgrade tally ──→ pending ──commit──┘
//! ```
//!
//! A successful tally only stages the next protocol. The block that ran the
//! tally finishes under the old routers; the staged protocol takes over once
//! that block is committed. Store contents are never migrated.

use crate::config::{AppConfig, InvariantLevel};
use crate::genesis::GenesisState;
use crate::invariants;
use crate::protocol::{self, Protocol};
use hub_01_store::{catalog, Context, ExecMode, StoreKey, StoreView};
use hub_02_modules::upgrade::{ProtocolKeeper, UpgradeOutcome};
use shared_types::{
    BlockHeader, FatalError, HubError, RequestBeginBlock, RequestEndBlock, RequestInitChain, ResponseBeginBlock,
    ResponseEndBlock, ResponseInitChain, ResponseTx, Tags,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct ProtocolEngine {
    catalog: BTreeMap<u64, Arc<Protocol>>,
    current: Option<Arc<Protocol>>,
    pending: Option<Arc<Protocol>>,
    protocol_keeper: ProtocolKeeper,
    mounted: Arc<BTreeSet<StoreKey>>,
    invariant_level: InvariantLevel,
}

impl ProtocolEngine {
    pub fn new(mounted: Arc<BTreeSet<StoreKey>>, invariant_level: InvariantLevel) -> Self {
        Self {
            catalog: BTreeMap::new(),
            current: None,
            pending: None,
            protocol_keeper: ProtocolKeeper::new(catalog::PROTOCOL),
            mounted,
            invariant_level,
        }
    }

    /// An engine carrying every version this software ships.
    pub fn with_known_versions(config: &AppConfig, mounted: Arc<BTreeSet<StoreKey>>) -> Result<Self, FatalError> {
        let mut engine = Self::new(mounted, config.invariant_level);
        let keeper = engine.protocol_keeper;
        engine.add(protocol::v0::load(config, keeper)?)?;
        engine.add(protocol::v1::load(config, keeper)?)?;
        Ok(engine)
    }

    pub fn protocol_keeper(&self) -> ProtocolKeeper {
        self.protocol_keeper
    }

    /// Registers a protocol. Every store key it declares must be mounted.
    pub fn add(&mut self, protocol: Protocol) -> Result<(), FatalError> {
        let version = protocol.version();
        if self.catalog.contains_key(&version) {
            return Err(FatalError::DuplicateProtocolVersion(version));
        }
        if let Some(key) = protocol.store_keys().iter().find(|k| !self.mounted.contains(k)) {
            return Err(FatalError::UnmountedStore(key.name().to_string()));
        }
        info!(
            "[engine] registered protocol v{} ({}), {} routes, {} query routes",
            version,
            protocol.definition().software,
            protocol.router().names().len(),
            protocol.query_router().names().len()
        );
        self.catalog.insert(version, Arc::new(protocol));
        Ok(())
    }

    pub fn versions(&self) -> Vec<u64> {
        self.catalog.keys().copied().collect()
    }

    pub fn get(&self, version: u64) -> Result<Arc<Protocol>, FatalError> {
        self.catalog
            .get(&version)
            .cloned()
            .ok_or(FatalError::UnknownProtocolVersion(version))
    }

    pub fn activate(&mut self, version: u64) -> Result<Arc<Protocol>, FatalError> {
        let protocol = self.get(version)?;
        info!("[engine] protocol v{} active", version);
        self.current = Some(Arc::clone(&protocol));
        self.pending = None;
        Ok(protocol)
    }

    /// Activates whatever version the committed state says governs.
    pub fn activate_from_state(&mut self, view: &mut StoreView, header: BlockHeader) -> Result<Arc<Protocol>, FatalError> {
        let ctx = Context::new(view, header, ExecMode::Query);
        let version = self
            .protocol_keeper
            .current_version(&ctx)
            .map_err(HubError::into_fatal)?;
        self.activate(version)
    }

    pub fn current(&self) -> Result<&Arc<Protocol>, FatalError> {
        self.current
            .as_ref()
            .ok_or_else(|| FatalError::Lifecycle("no protocol is active".into()))
    }

    pub fn pending(&self) -> Option<&Arc<Protocol>> {
        self.pending.as_ref()
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Activates the genesis document's version, then runs its init chainer.
    pub fn init_chain(&mut self, view: &mut StoreView, req: &RequestInitChain) -> Result<ResponseInitChain, FatalError> {
        let version = GenesisState::from_bytes(&req.app_state_bytes)?.genesis_version();
        let protocol = self.activate(version)?;
        {
            let mut ctx = Context::new(view, genesis_header(req), ExecMode::InitChain);
            self.protocol_keeper
                .set_current_version(&mut ctx, version)
                .map_err(HubError::into_fatal)?;
        }
        match protocol.init_chainer() {
            Some(init) => init(&protocol, view, req),
            None => {
                debug!("[engine] protocol v{} has no init chainer", version);
                Ok(ResponseInitChain::default())
            }
        }
    }

    pub fn begin_block(&self, view: &mut StoreView, req: &RequestBeginBlock) -> Result<ResponseBeginBlock, FatalError> {
        let protocol = self.current()?;
        let Some(begin) = protocol.begin_blocker() else {
            return Ok(ResponseBeginBlock::default());
        };
        let mut ctx = Context::new(view, req.header.clone(), ExecMode::Deliver);
        let tags = begin(protocol.keepers(), &mut ctx, req)?;
        Ok(ResponseBeginBlock { tags })
    }

    pub fn deliver_tx(&self, view: &mut StoreView, header: &BlockHeader, tx: &[u8]) -> Result<ResponseTx, FatalError> {
        let protocol = self.current()?;
        protocol
            .interceptors()
            .run_tx(protocol.router(), view, header, ExecMode::Deliver, tx)
    }

    pub fn check_tx(&self, view: &mut StoreView, header: &BlockHeader, tx: &[u8]) -> Result<ResponseTx, FatalError> {
        let protocol = self.current()?;
        protocol
            .interceptors()
            .run_tx(protocol.router(), view, header, ExecMode::Check, tx)
    }

    /// Runs the end blocker and the invariant pass. A successful upgrade
    /// tally stages its protocol for [`ProtocolEngine::apply_pending`].
    pub fn end_block(
        &mut self,
        view: &mut StoreView,
        header: &BlockHeader,
        req: &RequestEndBlock,
    ) -> Result<ResponseEndBlock, FatalError> {
        let protocol = Arc::clone(self.current()?);
        let mut ctx = Context::new(view, header.clone(), ExecMode::Deliver);

        let (validator_updates, tags, outcome) = match protocol.end_blocker() {
            Some(end) => {
                let res = end(protocol.keepers(), &mut ctx, req)?;
                (res.validator_updates, res.tags, res.upgrade)
            }
            None => (Vec::new(), Tags::new(), UpgradeOutcome::Pending),
        };

        invariants::run(protocol.keepers(), &ctx, self.invariant_level).inspect_err(|e| {
            error!("[engine] halting at height {}: {}", header.height, e);
        })?;

        match outcome {
            UpgradeOutcome::Switched(definition) => {
                let next = self.get(definition.version).inspect_err(|_| {
                    error!(
                        "[engine] chain switched to v{} ({}), which this software does not implement",
                        definition.version, definition.software
                    );
                })?;
                info!(
                    "[engine] v{} -> v{} staged at height {}, effective next block",
                    protocol.version(),
                    definition.version,
                    header.height
                );
                self.pending = Some(next);
            }
            UpgradeOutcome::Failed(definition) => {
                info!("[engine] upgrade to v{} failed, staying on v{}", definition.version, protocol.version());
            }
            UpgradeOutcome::Pending => {}
        }

        Ok(ResponseEndBlock { validator_updates, tags })
    }

    /// Swaps in the staged protocol, if any. Called once the block that
    /// staged it is committed.
    pub fn apply_pending(&mut self) -> Option<Arc<Protocol>> {
        let next = self.pending.take()?;
        info!("[engine] protocol v{} ({}) now active", next.version(), next.definition().software);
        self.current = Some(Arc::clone(&next));
        Some(next)
    }
}

pub(crate) fn genesis_header(req: &RequestInitChain) -> BlockHeader {
    BlockHeader {
        chain_id: req.chain_id.clone(),
        height: 0,
        time: req.time,
        proposer: Default::default(),
    }
}
