//! Ports (hexagonal architecture) for the versioned store.

pub mod commit_store;

pub use commit_store::CommitStore;
