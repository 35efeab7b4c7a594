//! # Shared Types Crate
//!
//! Domain primitives used by the store, the modules and the protocol engine.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every cross-crate type is defined here.
//! - **Two severities**: [`FatalError`] halts block processing, [`TxError`]
//!   only fails the transaction that raised it. They never share a channel.
//! - **Deterministic encodings**: coins, decimals and addresses have one
//!   canonical string form, so genesis documents hash identically everywhere.

pub mod abci;
pub mod coins;
pub mod dec;
pub mod entities;
pub mod errors;
pub mod tags;

pub use abci::*;
pub use coins::{Coin, Coins, DecCoin, DecCoins};
pub use dec::Dec;
pub use entities::*;
pub use errors::*;
pub use tags::{Tag, Tags};
