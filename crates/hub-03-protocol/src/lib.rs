//! # hub-03-protocol
//!
//! The Protocol Engine: turns a set of modules into a running state machine
//! and swaps that state machine in place when the chain agrees to upgrade.
//!
//! ## Architecture
//!
//! ```text
//!  ┌──────────────────────────── HubApp ─────────────────────────────┐
//!  │ init_chain / begin_block / deliver_tx / end_block / commit      │
//!  │                              │                                  │
//!  │                       ProtocolEngine                            │
//!  │            ┌─────────────────┼──────────────────┐               │
//!  │       Protocol v0       Protocol v1           ...               │
//!  │   KeeperSet · Router · QueryRouter · InterceptorChain           │
//!  └─────────────────────────────────────────────────────────────────┘
//!                 QueryHandle ──→ last committed snapshot
//! ```
//!
//! ## Fatal vs transaction errors
//!
//! Every lifecycle entry point returns `Result<_, FatalError>`. A transaction
//! rejection is never an `Err`: it is encoded in the response code, and the
//! block carries on.

pub mod app;
pub mod config;
pub mod engine;
pub mod genesis;
pub mod hooks;
pub mod interceptors;
pub mod invariants;
pub mod keepers;
pub mod protocol;
pub mod router;

#[cfg(test)]
mod testutil;

pub use app::{HubApp, QueryHandle, CODE_INTERNAL};
pub use config::{AppConfig, ConfigError, InvariantLevel, MIN_KEEP_RECENT};
pub use engine::ProtocolEngine;
pub use genesis::{GenesisAccount, GenesisState};
pub use hooks::StakingHooksComposite;
pub use interceptors::InterceptorChain;
pub use keepers::{KeeperSet, ModuleId};
pub use protocol::{EndBlockResult, Protocol};
pub use router::{QueryRouter, QueryRouterBuilder, Router, RouterBuilder};
