//! # Node Runtime
//!
//! Everything the `hubd` binary needs that is not part of the state machine:
//! configuration, logging, genesis files and a development driver standing
//! in for the consensus engine.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (defaults, `HUB_*` environment, CLI flags)
//! 2. Install the tracing subscriber
//! 3. Read the genesis file, or generate a development genesis
//! 4. InitChain, then produce blocks until the block budget or Ctrl+C
//! 5. Optionally export the state (zero-height or not)

pub mod config;
pub mod driver;
pub mod genesis;

pub use config::{ConfigError, NodeConfig};
pub use driver::{BlockSummary, DevChain};

use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Installs the global subscriber. `RUST_LOG` wins over `fallback`.
pub fn init_tracing(fallback: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(fallback))?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
