//! Immutable committed state.

use super::keys::StoreKey;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

pub type KvMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// Identity of a committed version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommitId {
    pub version: u64,
    pub hash: [u8; 32],
}

/// One committed version of every sub-store.
///
/// Sub-stores are shared between versions; a commit only copies the stores
/// it touched.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    version: u64,
    stores: BTreeMap<StoreKey, Arc<KvMap>>,
    hash: [u8; 32],
}

impl Snapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn hash(&self) -> [u8; 32] {
        self.hash
    }

    pub fn commit_id(&self) -> CommitId {
        CommitId {
            version: self.version,
            hash: self.hash,
        }
    }

    pub fn get(&self, key: StoreKey, k: &[u8]) -> Option<&Vec<u8>> {
        self.stores.get(&key).and_then(|s| s.get(k))
    }

    pub fn store(&self, key: StoreKey) -> Option<&KvMap> {
        self.stores.get(&key).map(Arc::as_ref)
    }

    /// Entries of `key` whose keys start with `prefix`, ascending.
    pub fn prefix(&self, key: StoreKey, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        match self.stores.get(&key) {
            Some(store) => store
                .range(prefix.to_vec()..)
                .take_while(|(k, _)| k.starts_with(prefix))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Applies `writes` and returns the next version.
    pub(crate) fn apply(
        &self,
        writes: BTreeMap<StoreKey, BTreeMap<Vec<u8>, Option<Vec<u8>>>>,
    ) -> Snapshot {
        let mut stores = self.stores.clone();
        for (key, changes) in writes {
            if changes.is_empty() {
                continue;
            }
            let store = Arc::make_mut(stores.entry(key).or_default());
            for (k, v) in changes {
                match v {
                    Some(v) => {
                        store.insert(k, v);
                    }
                    None => {
                        store.remove(&k);
                    }
                }
            }
        }
        stores.retain(|_, s| !s.is_empty());
        let hash = root_hash(&stores);
        Snapshot {
            version: self.version + 1,
            stores,
            hash,
        }
    }
}

/// SHA-256 over per-store digests in store-name order.
fn root_hash(stores: &BTreeMap<StoreKey, Arc<KvMap>>) -> [u8; 32] {
    let mut root = Sha256::new();
    for (key, store) in stores {
        let mut leaf = Sha256::new();
        for (k, v) in store.iter() {
            leaf.update((k.len() as u64).to_be_bytes());
            leaf.update(k);
            leaf.update((v.len() as u64).to_be_bytes());
            leaf.update(v);
        }
        root.update(key.name().as_bytes());
        root.update(leaf.finalize());
    }
    root.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::keys::catalog;

    fn writes(
        key: StoreKey,
        entries: &[(&[u8], Option<&[u8]>)],
    ) -> BTreeMap<StoreKey, BTreeMap<Vec<u8>, Option<Vec<u8>>>> {
        let mut out = BTreeMap::new();
        out.insert(
            key,
            entries
                .iter()
                .map(|(k, v)| (k.to_vec(), v.map(<[u8]>::to_vec)))
                .collect(),
        );
        out
    }

    #[test]
    fn test_apply_bumps_version_and_keeps_base() {
        let base = Snapshot::default();
        let next = base.apply(writes(catalog::ACCOUNT, &[(b"a", Some(b"1"))]));
        assert_eq!(next.version(), 1);
        assert_eq!(next.get(catalog::ACCOUNT, b"a"), Some(&b"1".to_vec()));
        assert!(base.get(catalog::ACCOUNT, b"a").is_none());
    }

    #[test]
    fn test_hash_depends_on_content_only() {
        let a = Snapshot::default().apply(writes(catalog::STAKE, &[(b"k", Some(b"v"))]));
        let b = Snapshot::default().apply(writes(catalog::STAKE, &[(b"k", Some(b"v"))]));
        let c = Snapshot::default().apply(writes(catalog::STAKE, &[(b"k", Some(b"w"))]));
        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn test_prefix_scan() {
        let snap = Snapshot::default().apply(writes(
            catalog::GOV,
            &[(b"\x01a", Some(b"1")), (b"\x01b", Some(b"2")), (b"\x02a", Some(b"3"))],
        ));
        let found = snap.prefix(catalog::GOV, b"\x01");
        assert_eq!(found.len(), 2);
        assert_eq!(found[1].0, b"\x01b".to_vec());
    }
}
