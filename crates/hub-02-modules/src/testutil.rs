//! Fixtures shared by the unit tests of this crate.

use hub_01_store::{catalog, CommitStore, Context, ExecMode, InMemoryCommitStore, StoreView};
use shared_types::BlockHeader;

/// A view with every catalog store mounted.
pub fn fresh_view() -> StoreView {
    let store = InMemoryCommitStore::default();
    store.mount(&catalog::ALL);
    store.begin()
}

pub fn header(height: u64) -> BlockHeader {
    BlockHeader {
        chain_id: "test-chain".into(),
        height,
        time: 1_700_000_000 + height * 5,
        proposer: Default::default(),
    }
}

pub fn ctx_at(view: &mut StoreView, height: u64) -> Context<'_> {
    Context::new(view, header(height), ExecMode::Deliver)
}
