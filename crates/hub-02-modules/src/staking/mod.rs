//! # Staking
//!
//! Validators, delegations, unbonding and redelegation, the bonded/loose
//! token pool and the validator-set delta handed to consensus.
//!
//! The keeper is built in two phases. [`StakingCore`] owns the `stake`
//! store and is what distribution, slashing, gov and upgrade read through.
//! [`UnwiredStaking::attach_hooks`] then yields the [`StakingKeeper`] that
//! fires lifecycle hooks; only the wired keeper can run message handlers and
//! the end blocker.

pub mod genesis;
pub mod handler;
pub mod keeper;
pub mod types;

pub use genesis::StakingGenesis;
pub use handler::{StakingHandler, StakingQuerier};
pub use keeper::{StakingCore, StakingKeeper, UnwiredStaking};
pub use types::*;

pub const ROUTE: &str = "stake";
pub const CODESPACE: &str = "stake";
