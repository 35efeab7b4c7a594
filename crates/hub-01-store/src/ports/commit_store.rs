use crate::domain::{CommitId, Snapshot, StoreError, StoreKey, StoreView};
use std::collections::BTreeSet;
use std::sync::Arc;

/// The persistent versioned multi-store consumed by the application.
///
/// Implementations must make `latest` and `snapshot_at` callable from query
/// threads while the block path prepares the next commit.
pub trait CommitStore: Send + Sync {
    /// Registers sub-stores. Mounting an already mounted key is a no-op.
    fn mount(&self, keys: &[StoreKey]);

    fn mounted(&self) -> Arc<BTreeSet<StoreKey>>;

    fn latest(&self) -> Arc<Snapshot>;

    fn snapshot_at(&self, version: u64) -> Result<Arc<Snapshot>, StoreError>;

    /// Atomically applies every write in `view` as the next version.
    fn commit(&self, view: StoreView) -> Result<CommitId, StoreError>;

    /// A fresh writable view over the latest version.
    fn begin(&self) -> StoreView {
        StoreView::new(self.latest(), self.mounted())
    }

    fn is_mounted(&self, key: StoreKey) -> bool {
        self.mounted().contains(&key)
    }
}
