//! Store domain: keys, snapshots, views, gas and the request context.

pub mod context;
pub mod errors;
pub mod gas;
pub mod keys;
pub mod snapshot;
pub mod view;

pub use context::{Context, ExecMode};
pub use errors::StoreError;
pub use gas::GasMeter;
pub use keys::{catalog, StoreKey};
pub use snapshot::{CommitId, KvMap, Snapshot};
pub use view::StoreView;
