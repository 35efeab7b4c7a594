//! # hub-02-modules
//!
//! Keepers, messages, handlers and genesis import/export of every module the
//! protocol versions assemble.
//!
//! ## Modules
//!
//! | Module | Store keys | Route |
//! |--------|-----------|-------|
//! | auth (accounts, fees) | `acc`, `fee` | - |
//! | bank | via auth | `bank` |
//! | params | `params` | - |
//! | guardian | `guardian` | `guardian` |
//! | staking | `stake` | `stake` |
//! | mint | `mint` | - |
//! | distribution | `distr` | `distr` |
//! | slashing | `slashing` | `slashing` |
//! | gov | `gov` | `gov` |
//! | service | `service` | `service` |
//! | upgrade | `upgrade`, `protocol` | `upgrade` |
//! | record | `record` | `record` |
//!
//! Keepers are cheap `Clone` values holding their store keys and the keepers
//! they read through; no keeper touches another module's store key.

pub mod auth;
pub mod bank;
pub mod distribution;
pub mod gov;
pub mod guardian;
pub mod mint;
pub mod params;
pub mod record;
pub mod service;
pub mod slashing;
pub mod staking;
pub mod types;
pub mod upgrade;

pub use types::*;

#[cfg(test)]
pub(crate) mod testutil;
