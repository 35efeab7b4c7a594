use crate::domain::{CommitId, Snapshot, StoreError, StoreKey, StoreView};
use crate::ports::CommitStore;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// Versions retained when no explicit pruning window is configured.
pub const DEFAULT_KEEP_RECENT: u64 = 100;

struct Inner {
    mounted: Arc<BTreeSet<StoreKey>>,
    versions: BTreeMap<u64, Arc<Snapshot>>,
    latest: Arc<Snapshot>,
}

/// In-memory implementation of [`CommitStore`] retaining the most recent
/// `keep_recent` versions.
pub struct InMemoryCommitStore {
    inner: RwLock<Inner>,
    keep_recent: u64,
}

impl InMemoryCommitStore {
    pub fn new(keep_recent: u64) -> Self {
        let genesis = Arc::new(Snapshot::default());
        let mut versions = BTreeMap::new();
        versions.insert(0, Arc::clone(&genesis));
        Self {
            inner: RwLock::new(Inner {
                mounted: Arc::new(BTreeSet::new()),
                versions,
                latest: genesis,
            }),
            keep_recent: keep_recent.max(1),
        }
    }
}

impl Default for InMemoryCommitStore {
    fn default() -> Self {
        Self::new(DEFAULT_KEEP_RECENT)
    }
}

impl CommitStore for InMemoryCommitStore {
    fn mount(&self, keys: &[StoreKey]) {
        let mut inner = self.inner.write();
        let mut mounted = (*inner.mounted).clone();
        mounted.extend(keys.iter().copied());
        inner.mounted = Arc::new(mounted);
    }

    fn mounted(&self) -> Arc<BTreeSet<StoreKey>> {
        Arc::clone(&self.inner.read().mounted)
    }

    fn latest(&self) -> Arc<Snapshot> {
        Arc::clone(&self.inner.read().latest)
    }

    fn snapshot_at(&self, version: u64) -> Result<Arc<Snapshot>, StoreError> {
        self.inner
            .read()
            .versions
            .get(&version)
            .cloned()
            .ok_or(StoreError::VersionNotFound(version))
    }

    fn commit(&self, view: StoreView) -> Result<CommitId, StoreError> {
        let (base, writes) = view.into_parts();
        let mut inner = self.inner.write();
        if base.version() != inner.latest.version() {
            return Err(StoreError::StaleView {
                view: base.version(),
                latest: inner.latest.version(),
            });
        }
        let next = Arc::new(base.apply(writes));
        let id = next.commit_id();
        inner.versions.insert(id.version, Arc::clone(&next));
        inner.latest = next;

        let cutoff = id.version.saturating_sub(self.keep_recent);
        let before = inner.versions.len();
        inner.versions.retain(|v, _| *v > cutoff || *v == id.version);
        let pruned = before - inner.versions.len();
        if pruned > 0 {
            debug!("[store] pruned {} versions at or below {}", pruned, cutoff);
        }
        Ok(id)
    }
}
