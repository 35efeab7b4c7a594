//! # hub-01-store
//!
//! Versioned multi-store for the application layer.
//!
//! ## Role in System
//!
//! - **Store key catalog**: the named sub-stores a protocol mounts.
//! - **Block execution**: [`StoreView`] layers writes over the last committed
//!   [`Snapshot`]; transactions branch and either write back or discard.
//! - **Request scope**: [`Context`] carries the view, the block header, the
//!   execution mode and a gas meter into every keeper call.
//! - **Queries**: read-only views over an immutable committed snapshot, so
//!   the query path never observes in-flight block state.
//!
//! ```text
//!  CommitStore (port) ──latest()──→ Arc<Snapshot> ──→ StoreView ──→ Context
//!        ↑                                                 │
//!        └───────────────────commit(view)──────────────────┘
//! ```

pub mod adapters;
pub mod domain;
pub mod ports;

pub use adapters::*;
pub use domain::*;
pub use ports::*;
