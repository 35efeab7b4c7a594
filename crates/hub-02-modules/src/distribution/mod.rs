//! # Distribution
//!
//! Fee and inflation rewards for validators, delegators and the community
//! pool. The keeper observes staking through [`crate::types::StakingHooks`]
//! so every change of power or shares is preceded by a settlement.

pub mod genesis;
pub mod handler;
mod hooks;
pub mod keeper;
pub mod types;

pub use genesis::DistrGenesis;
pub use handler::{DistributionHandler, DistributionQuerier};
pub use keeper::DistributionKeeper;
pub use types::*;

/// Route of the distribution handler in every protocol version.
pub const ROUTE: &str = "distr";
pub const CODESPACE: &str = "distr";
