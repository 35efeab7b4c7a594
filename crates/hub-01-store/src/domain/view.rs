//! Writable, branchable view over a committed snapshot.

use super::errors::StoreError;
use super::keys::StoreKey;
use super::snapshot::Snapshot;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub(crate) type Writes = BTreeMap<StoreKey, BTreeMap<Vec<u8>, Option<Vec<u8>>>>;

/// Layers of pending writes over an immutable base snapshot.
///
/// The bottom layer holds the block's writes. [`StoreView::branch`] pushes a
/// layer for one transaction or stage; [`StoreView::write_branch`] folds it
/// into the layer below and [`StoreView::discard_branch`] drops it.
#[derive(Debug, Clone)]
pub struct StoreView {
    base: Arc<Snapshot>,
    mounted: Arc<BTreeSet<StoreKey>>,
    layers: Vec<Writes>,
}

impl StoreView {
    pub fn new(base: Arc<Snapshot>, mounted: Arc<BTreeSet<StoreKey>>) -> Self {
        Self {
            base,
            mounted,
            layers: vec![Writes::new()],
        }
    }

    pub fn base_version(&self) -> u64 {
        self.base.version()
    }

    pub fn is_mounted(&self, key: StoreKey) -> bool {
        self.mounted.contains(&key)
    }

    fn check(&self, key: StoreKey) -> Result<(), StoreError> {
        if self.mounted.contains(&key) {
            Ok(())
        } else {
            Err(StoreError::Unmounted(key.name()))
        }
    }

    pub fn get(&self, key: StoreKey, k: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.check(key)?;
        for layer in self.layers.iter().rev() {
            if let Some(entry) = layer.get(&key).and_then(|m| m.get(k)) {
                return Ok(entry.clone());
            }
        }
        Ok(self.base.get(key, k).cloned())
    }

    pub fn set(&mut self, key: StoreKey, k: Vec<u8>, v: Vec<u8>) -> Result<(), StoreError> {
        self.check(key)?;
        self.top().entry(key).or_default().insert(k, Some(v));
        Ok(())
    }

    pub fn delete(&mut self, key: StoreKey, k: &[u8]) -> Result<(), StoreError> {
        self.check(key)?;
        self.top().entry(key).or_default().insert(k.to_vec(), None);
        Ok(())
    }

    /// Entries whose keys start with `prefix`, merged across all layers.
    pub fn prefix(
        &self,
        key: StoreKey,
        prefix: &[u8],
        reverse: bool,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        self.check(key)?;
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.base.prefix(key, prefix).into_iter().collect();
        for layer in &self.layers {
            let Some(changes) = layer.get(&key) else {
                continue;
            };
            for (k, v) in changes
                .range(prefix.to_vec()..)
                .take_while(|(k, _)| k.starts_with(prefix))
            {
                match v {
                    Some(v) => {
                        merged.insert(k.clone(), v.clone());
                    }
                    None => {
                        merged.remove(k);
                    }
                }
            }
        }
        let mut out: Vec<(Vec<u8>, Vec<u8>)> = merged.into_iter().collect();
        if reverse {
            out.reverse();
        }
        Ok(out)
    }

    pub fn branch(&mut self) {
        self.layers.push(Writes::new());
    }

    /// Folds the top branch into the layer below. No-op on the block layer.
    pub fn write_branch(&mut self) {
        if self.layers.len() < 2 {
            return;
        }
        if let Some(top) = self.layers.pop() {
            let below = self.top();
            for (key, changes) in top {
                below.entry(key).or_default().extend(changes);
            }
        }
    }

    /// Drops the top branch. No-op on the block layer.
    pub fn discard_branch(&mut self) {
        if self.layers.len() > 1 {
            self.layers.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Flattens every layer into one write set for commit.
    pub(crate) fn into_parts(mut self) -> (Arc<Snapshot>, Writes) {
        while self.layers.len() > 1 {
            self.write_branch();
        }
        let writes = self.layers.pop().unwrap_or_default();
        (self.base, writes)
    }

    fn top(&mut self) -> &mut Writes {
        if self.layers.is_empty() {
            self.layers.push(Writes::new());
        }
        let last = self.layers.len() - 1;
        &mut self.layers[last]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::keys::catalog;

    fn view() -> StoreView {
        let mounted: BTreeSet<StoreKey> = [catalog::ACCOUNT, catalog::STAKE].into_iter().collect();
        StoreView::new(Arc::new(Snapshot::default()), Arc::new(mounted))
    }

    #[test]
    fn test_unmounted_key_is_rejected() {
        let mut v = view();
        assert_eq!(
            v.get(catalog::GOV, b"x"),
            Err(StoreError::Unmounted("gov"))
        );
        assert!(v.set(catalog::GOV, b"x".to_vec(), vec![]).is_err());
    }

    #[test]
    fn test_discarded_branch_leaves_no_trace() {
        let mut v = view();
        v.set(catalog::ACCOUNT, b"a".to_vec(), b"1".to_vec()).unwrap();
        v.branch();
        v.set(catalog::ACCOUNT, b"a".to_vec(), b"2".to_vec()).unwrap();
        v.delete(catalog::ACCOUNT, b"a").unwrap();
        assert_eq!(v.get(catalog::ACCOUNT, b"a").unwrap(), None);
        v.discard_branch();
        assert_eq!(v.get(catalog::ACCOUNT, b"a").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_written_branch_is_visible() {
        let mut v = view();
        v.branch();
        v.set(catalog::STAKE, b"k".to_vec(), b"v".to_vec()).unwrap();
        v.write_branch();
        assert_eq!(v.depth(), 1);
        assert_eq!(v.get(catalog::STAKE, b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_prefix_merges_layers_and_reverses() {
        let mut v = view();
        v.set(catalog::STAKE, b"\x21a".to_vec(), b"1".to_vec()).unwrap();
        v.set(catalog::STAKE, b"\x21b".to_vec(), b"2".to_vec()).unwrap();
        v.branch();
        v.set(catalog::STAKE, b"\x21c".to_vec(), b"3".to_vec()).unwrap();
        v.delete(catalog::STAKE, b"\x21a").unwrap();
        v.set(catalog::STAKE, b"\x22z".to_vec(), b"x".to_vec()).unwrap();

        let fwd = v.prefix(catalog::STAKE, b"\x21", false).unwrap();
        let keys: Vec<Vec<u8>> = fwd.into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"\x21b".to_vec(), b"\x21c".to_vec()]);

        let rev = v.prefix(catalog::STAKE, b"\x21", true).unwrap();
        assert_eq!(rev[0].0, b"\x21c".to_vec());
    }
}
