//! # Genesis Files
//!
//! Reading, writing and generating genesis documents. Files are always
//! written in canonical form, so a document that round-trips through disk
//! hashes the same as the one that was exported.

pub mod builder;

pub use builder::{dev_address, dev_key, GenesisBuilder, GenesisConfig, GenesisError};

use anyhow::{Context, Result};
use hub_03_protocol::GenesisState;
use std::path::Path;
use tracing::info;

/// Reads and parses a genesis file, returning it in canonical bytes.
pub fn read_genesis(path: &Path) -> Result<Vec<u8>> {
    let raw = std::fs::read(path).with_context(|| format!("reading genesis file {}", path.display()))?;
    let state = GenesisState::from_bytes(&raw).with_context(|| format!("parsing genesis file {}", path.display()))?;
    Ok(state.to_canonical_bytes()?)
}

pub fn write_genesis(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("writing genesis file {}", path.display()))?;
    info!("[genesis] wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}
