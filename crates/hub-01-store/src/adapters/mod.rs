//! Adapters implementing the store ports.

pub mod memory_store;

pub use memory_store::{InMemoryCommitStore, DEFAULT_KEEP_RECENT};
