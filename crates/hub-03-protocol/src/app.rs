//! # HubApp
//!
//! The consensus-facing application. The consensus engine drives the
//! mutating path from one thread, strictly in order:
//!
//! ```text
//! init_chain ─→ begin_block ─→ deliver_tx* ─→ end_block ─→ commit ─┐
//!                    ↑                                             │
//!                    └─────────────────────────────────────────────┘
//! ```
//!
//! An out-of-order call is a [`FatalError::Lifecycle`]. Queries go through a
//! [`QueryHandle`], which only ever reads the last committed snapshot and
//! the protocol published with it, so it can be cloned onto other threads.

use crate::config::AppConfig;
use crate::engine::{genesis_header, ProtocolEngine};
use crate::genesis;
use crate::protocol::Protocol;
use hub_01_store::{catalog, CommitStore, Context, ExecMode, InMemoryCommitStore, StoreView};
use hub_02_modules::to_json_bytes;
use parking_lot::RwLock;
use shared_types::{
    BlockHeader, FatalError, Height, HubError, HubResult, RequestBeginBlock, RequestEndBlock, RequestInitChain,
    RequestQuery, ResponseBeginBlock, ResponseCommit, ResponseEndBlock, ResponseInfo, ResponseInitChain,
    ResponseQuery, ResponseTx, TxError, ValidatorUpdate, ROOT_CODESPACE,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Result code of a query that hit a fatal condition.
pub const CODE_INTERNAL: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Fresh store, waiting for InitChain.
    Genesis,
    /// Between blocks.
    Idle,
    InBlock,
    Ended,
}

/// What queries are answered against.
#[derive(Debug, Clone)]
struct Published {
    protocol: Arc<Protocol>,
    header: BlockHeader,
}

pub struct HubApp {
    store: Arc<dyn CommitStore>,
    engine: ProtocolEngine,
    stage: Stage,
    /// Writable state of the block in progress. Opened by InitChain so the
    /// genesis writes land in the first commit.
    deliver: Option<StoreView>,
    /// Mempool state, reset to the committed state at every commit.
    check: StoreView,
    header: BlockHeader,
    txs_in_block: usize,
    published: Arc<RwLock<Option<Published>>>,
}

impl HubApp {
    /// A fresh in-memory chain carrying every known protocol version.
    pub fn new(config: &AppConfig) -> Result<Self, FatalError> {
        Self::with_store(config, Arc::new(InMemoryCommitStore::new(config.keep_recent)))
    }

    /// Mounts the whole store catalog on `store`. A store that already holds
    /// committed blocks resumes under the protocol version recorded in it.
    pub fn with_store(config: &AppConfig, store: Arc<dyn CommitStore>) -> Result<Self, FatalError> {
        config
            .validate()
            .map_err(|e| FatalError::InvalidConfig(e.to_string()))?;
        store.mount(&catalog::ALL);
        let mut app = Self {
            engine: ProtocolEngine::with_known_versions(config, store.mounted())?,
            stage: Stage::Genesis,
            deliver: None,
            check: store.begin(),
            header: BlockHeader::default(),
            txs_in_block: 0,
            published: Arc::new(RwLock::new(None)),
            store,
        };

        let latest = app.last_block_height();
        if latest > 0 {
            app.header = BlockHeader {
                height: latest,
                ..Default::default()
            };
            let protocol = app.engine.activate_from_state(&mut app.check, app.header.clone())?;
            info!("[app] resuming at height {} under protocol v{}", latest, protocol.version());
            app.stage = Stage::Idle;
            app.publish(protocol, app.header.clone());
        }
        Ok(app)
    }

    pub fn query_handle(&self) -> QueryHandle {
        QueryHandle {
            store: Arc::clone(&self.store),
            published: Arc::clone(&self.published),
        }
    }

    pub fn engine(&self) -> &ProtocolEngine {
        &self.engine
    }

    pub fn last_block_height(&self) -> Height {
        self.store.latest().version()
    }

    fn publish(&self, protocol: Arc<Protocol>, header: BlockHeader) {
        *self.published.write() = Some(Published { protocol, header });
    }

    fn expect_stage(&self, expected: Stage, call: &str) -> Result<(), FatalError> {
        if self.stage == expected {
            return Ok(());
        }
        Err(FatalError::Lifecycle(format!(
            "{call} called in stage {:?}, expected {:?}",
            self.stage, expected
        )))
    }

    // -------------------------------------------------------------------------
    // Consensus connection
    // -------------------------------------------------------------------------

    pub fn info(&self) -> ResponseInfo {
        let latest = self.store.latest();
        ResponseInfo {
            last_block_height: latest.version(),
            last_block_app_hash: latest.hash(),
            app_version: self.engine.current().map(|p| p.version()).unwrap_or_default(),
        }
    }

    pub fn init_chain(&mut self, req: &RequestInitChain) -> Result<ResponseInitChain, FatalError> {
        self.expect_stage(Stage::Genesis, "init_chain")?;
        let mut view = self.store.begin();
        let res = self.engine.init_chain(&mut view, req)?;
        let protocol = Arc::clone(self.engine.current()?);
        info!(
            "[app] chain {} initialised under protocol v{} with {} validators",
            req.chain_id,
            protocol.version(),
            res.validators.len()
        );

        self.header = genesis_header(req);
        self.check = view.clone();
        self.deliver = Some(view);
        self.stage = Stage::Idle;
        self.publish(protocol, self.header.clone());
        Ok(res)
    }

    pub fn begin_block(&mut self, req: &RequestBeginBlock) -> Result<ResponseBeginBlock, FatalError> {
        self.expect_stage(Stage::Idle, "begin_block")?;
        let expected = self.last_block_height() + 1;
        if req.header.height != expected {
            return Err(FatalError::Lifecycle(format!(
                "begin_block at height {}, expected {}",
                req.header.height, expected
            )));
        }
        let mut view = self.deliver.take().unwrap_or_else(|| self.store.begin());
        let res = self.engine.begin_block(&mut view, req)?;
        debug!("[app] began block {} ({} tags)", req.header.height, res.tags.len());

        self.header = req.header.clone();
        self.deliver = Some(view);
        self.txs_in_block = 0;
        self.stage = Stage::InBlock;
        Ok(res)
    }

    pub fn deliver_tx(&mut self, tx: &[u8]) -> Result<ResponseTx, FatalError> {
        self.expect_stage(Stage::InBlock, "deliver_tx")?;
        let view = self
            .deliver
            .as_mut()
            .ok_or_else(|| FatalError::Lifecycle("no block state open".into()))?;
        let res = self.engine.deliver_tx(view, &self.header, tx)?;
        self.txs_in_block += 1;
        if !res.is_ok() {
            debug!("[app] tx {} in block {} failed: {}", self.txs_in_block, self.header.height, res.log);
        }
        Ok(res)
    }

    /// Mempool admission against the last committed state plus earlier
    /// admitted transactions. Never touches block state.
    pub fn check_tx(&mut self, tx: &[u8]) -> Result<ResponseTx, FatalError> {
        if self.stage == Stage::Genesis {
            return Err(FatalError::Lifecycle("check_tx before init_chain".into()));
        }
        let header = BlockHeader {
            height: self.last_block_height() + 1,
            ..self.header.clone()
        };
        self.engine.check_tx(&mut self.check, &header, tx)
    }

    pub fn end_block(&mut self, req: &RequestEndBlock) -> Result<ResponseEndBlock, FatalError> {
        self.expect_stage(Stage::InBlock, "end_block")?;
        if req.height != self.header.height {
            return Err(FatalError::Lifecycle(format!(
                "end_block at height {}, block in progress is {}",
                req.height, self.header.height
            )));
        }
        let view = self
            .deliver
            .as_mut()
            .ok_or_else(|| FatalError::Lifecycle("no block state open".into()))?;
        let res = self.engine.end_block(view, &self.header, req)?;
        self.stage = Stage::Ended;
        Ok(res)
    }

    /// Persists the block, applies a staged protocol switch and republishes
    /// the query state.
    pub fn commit(&mut self) -> Result<ResponseCommit, FatalError> {
        self.expect_stage(Stage::Ended, "commit")?;
        let view = self
            .deliver
            .take()
            .ok_or_else(|| FatalError::Lifecycle("no block state open".into()))?;
        let id = self.store.commit(view)?;
        info!(
            "[app] committed block {} with {} txs, app hash {}",
            id.version,
            self.txs_in_block,
            hex::encode(id.hash)
        );

        self.engine.apply_pending();
        self.check = self.store.begin();
        self.stage = Stage::Idle;
        self.publish(Arc::clone(self.engine.current()?), self.header.clone());
        Ok(ResponseCommit {
            height: id.version,
            app_hash: id.hash,
        })
    }

    pub fn query(&self, req: &RequestQuery) -> ResponseQuery {
        self.query_handle().query(req)
    }

    /// Genesis bytes and validator set of the last committed state. Committed
    /// state is left untouched, zero-height transform included.
    pub fn export_app_state_and_validators(
        &self,
        for_zero_height: bool,
    ) -> Result<(Vec<u8>, Vec<ValidatorUpdate>), FatalError> {
        if matches!(self.stage, Stage::InBlock | Stage::Ended) {
            return Err(FatalError::Lifecycle("export while a block is in progress".into()));
        }
        let protocol = self.engine.current()?;
        // Before the first commit the genesis writes only live in the open view.
        let view = match &self.deliver {
            Some(view) => view.clone(),
            None => self.store.begin(),
        };
        genesis::export_app_state_and_validators(protocol, view, self.header.clone(), for_zero_height)
    }
}

// =============================================================================
// QUERIES
// =============================================================================

/// Read-only access for query threads.
#[derive(Clone)]
pub struct QueryHandle {
    store: Arc<dyn CommitStore>,
    published: Arc<RwLock<Option<Published>>>,
}

impl QueryHandle {
    /// Serves `custom/<module>/<path..>`, `store/<name>/key`,
    /// `store/<name>/subspace` and `app/version`.
    pub fn query(&self, req: &RequestQuery) -> ResponseQuery {
        let Some(published) = self.published.read().clone() else {
            return failure(&TxError::UnknownRequest("chain not initialised".into()).into(), 0);
        };
        let height = published.header.height;
        match self.serve(&published, req) {
            Ok(value) => ResponseQuery {
                value,
                height,
                ..Default::default()
            },
            Err(e) => failure(&e, height),
        }
    }

    fn serve(&self, published: &Published, req: &RequestQuery) -> HubResult<Vec<u8>> {
        let path: Vec<&str> = req.path.split('/').filter(|s| !s.is_empty()).collect();
        match path.as_slice() {
            ["app", "version"] => to_json_bytes(published.protocol.definition()),
            ["store", name, kind] => {
                let key = catalog::by_name(name)
                    .ok_or_else(|| TxError::UnknownRequest(format!("no store named {name}")))?;
                let snapshot = self.store.snapshot_at(published.header.height)?;
                match *kind {
                    "key" => Ok(snapshot.get(key, &req.data).cloned().unwrap_or_default()),
                    "subspace" => bincode::serialize(&snapshot.prefix(key, &req.data))
                        .map_err(|e| FatalError::Internal(format!("subspace encoding: {e}")).into()),
                    other => Err(TxError::UnknownRequest(format!("unknown store query {other}")).into()),
                }
            }
            ["custom", module, rest @ ..] => {
                let querier = published
                    .protocol
                    .query_router()
                    .route(module)
                    .ok_or_else(|| TxError::UnknownRoute(format!("no query route for {module}")))?;
                let snapshot = self.store.snapshot_at(published.header.height)?;
                let mut view = StoreView::new(snapshot, self.store.mounted());
                let ctx = Context::new(&mut view, published.header.clone(), ExecMode::Query);
                querier.query(&ctx, rest, &req.data)
            }
            _ => Err(TxError::UnknownRequest(format!("unknown query path {}", req.path)).into()),
        }
    }
}

fn failure(err: &HubError, height: Height) -> ResponseQuery {
    let (code, codespace) = match err {
        HubError::Tx(e) => (e.code(), e.codespace()),
        HubError::Fatal(e) => {
            error!("[app] query failed at height {}: {}", height, e);
            (CODE_INTERNAL, ROOT_CODESPACE)
        }
    };
    if code != CODE_INTERNAL {
        warn!("[app] query rejected: {}", err);
    }
    ResponseQuery {
        code,
        codespace: codespace.to_string(),
        log: err.to_string(),
        height,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genesis::{GenesisAccount, GenesisState};
    use crate::testutil::{address_of, header, key, CHAIN_ID};
    use hub_02_modules::auth::BaseAccount;
    use shared_types::Coins;

    fn genesis_bytes() -> Vec<u8> {
        let mut genesis = GenesisState::default();
        genesis.accounts.push(GenesisAccount {
            address: address_of(&key(1)),
            coins: Coins::single("stake", 1_000),
            account_number: 0,
            sequence: 0,
        });
        genesis.stake.pool.loose_tokens = 1_000;
        genesis.to_canonical_bytes().unwrap()
    }

    fn initialised() -> HubApp {
        let mut app = HubApp::new(&AppConfig::default()).unwrap();
        app.init_chain(&RequestInitChain {
            chain_id: CHAIN_ID.into(),
            time: header(0).time,
            app_state_bytes: genesis_bytes(),
            ..Default::default()
        })
        .unwrap();
        app
    }

    fn empty_block(app: &mut HubApp, height: u64) -> ResponseCommit {
        app.begin_block(&RequestBeginBlock {
            header: header(height),
            ..Default::default()
        })
        .unwrap();
        app.end_block(&RequestEndBlock { height }).unwrap();
        app.commit().unwrap()
    }

    #[test]
    fn test_out_of_order_calls_are_fatal() {
        let mut app = HubApp::new(&AppConfig::default()).unwrap();
        assert!(matches!(app.commit(), Err(FatalError::Lifecycle(_))));
        assert!(matches!(app.check_tx(&[]), Err(FatalError::Lifecycle(_))));

        let mut app = initialised();
        assert!(matches!(app.deliver_tx(&[]), Err(FatalError::Lifecycle(_))));
        let skipped = RequestBeginBlock {
            header: header(2),
            ..Default::default()
        };
        assert!(matches!(app.begin_block(&skipped), Err(FatalError::Lifecycle(_))));
    }

    #[test]
    fn test_genesis_writes_land_in_first_commit() {
        let mut app = initialised();
        let commit = empty_block(&mut app, 1);
        assert_eq!(commit.height, 1);
        assert_eq!(app.info().last_block_height, 1);
        assert_eq!(app.info().last_block_app_hash, commit.app_hash);

        let res = app.query(&RequestQuery {
            path: "custom/acc/account".into(),
            data: serde_json::to_vec(&address_of(&key(1))).unwrap(),
        });
        assert_eq!(res.code, 0, "{}", res.log);
        assert_eq!(res.height, 1);
        let account: Option<BaseAccount> = serde_json::from_slice(&res.value).unwrap();
        assert_eq!(account.unwrap().coins.amount_of("stake"), 1_000);
    }

    #[test]
    fn test_queries_see_only_committed_state() {
        let mut app = initialised();
        empty_block(&mut app, 1);
        let handle = app.query_handle();
        let before = handle.query(&RequestQuery {
            path: "store/main/subspace".into(),
            data: Vec::new(),
        });
        app.begin_block(&RequestBeginBlock {
            header: header(2),
            ..Default::default()
        })
        .unwrap();
        let during = handle.query(&RequestQuery {
            path: "app/version".into(),
            data: Vec::new(),
        });
        assert_eq!(before.height, 1);
        assert_eq!(during.height, 1);
        assert_eq!(during.code, 0);
    }

    #[test]
    fn test_previously_published_height_survives_the_next_commit() {
        let too_short = AppConfig {
            keep_recent: 1,
            ..AppConfig::default()
        };
        assert!(matches!(HubApp::new(&too_short), Err(FatalError::InvalidConfig(_))));

        let config = AppConfig {
            keep_recent: crate::config::MIN_KEEP_RECENT,
            ..AppConfig::default()
        };
        let mut app = HubApp::new(&config).unwrap();
        app.init_chain(&RequestInitChain {
            chain_id: CHAIN_ID.into(),
            time: header(0).time,
            app_state_bytes: genesis_bytes(),
            ..Default::default()
        })
        .unwrap();
        empty_block(&mut app, 1);
        for height in 2..=4 {
            empty_block(&mut app, height);
            assert!(app.store.snapshot_at(height - 1).is_ok());
            assert!(app.store.snapshot_at(height).is_ok());
        }
        assert!(app.store.snapshot_at(2).is_err());
    }

    #[test]
    fn test_unknown_query_paths() {
        let app = initialised();
        let res = app.query(&RequestQuery {
            path: "custom/nothing/here".into(),
            data: Vec::new(),
        });
        assert_eq!(res.code, TxError::UnknownRoute(String::new()).code());
        let res = app.query(&RequestQuery {
            path: "store/nowhere/key".into(),
            data: Vec::new(),
        });
        assert_eq!(res.code, TxError::UnknownRequest(String::new()).code());
    }
}
