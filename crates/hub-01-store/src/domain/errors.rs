use shared_types::{FatalError, HubError};
use thiserror::Error;

/// Store failures. All of them are fatal to block processing: a keeper
/// touching an unmounted key or reading undecodable bytes means the replica
/// can no longer be trusted to agree with its peers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store key {0} is not mounted")]
    Unmounted(&'static str),

    #[error("codec error in store {store}: {reason}")]
    Codec { store: &'static str, reason: String },

    #[error("version {0} is not retained")]
    VersionNotFound(u64),

    #[error("view based on version {view} cannot commit over version {latest}")]
    StaleView { view: u64, latest: u64 },
}

impl From<StoreError> for FatalError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unmounted(name) => FatalError::UnmountedStore(name.to_string()),
            other => FatalError::StoreCorruption(other.to_string()),
        }
    }
}

impl From<StoreError> for HubError {
    fn from(err: StoreError) -> Self {
        HubError::Fatal(err.into())
    }
}
