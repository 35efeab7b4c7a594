//! # Auth
//!
//! Accounts, the fee collector and the three transaction interceptors.

pub mod account;
pub mod ante;
pub mod fee;
pub mod genesis;

pub use account::{AccountKeeper, AccountQuerier, BaseAccount};
pub use ante::{AuthAnteHandler, AuthFeePreprocessHandler, AuthFeeRefundHandler};
pub use fee::{AuthParams, FeeKeeper};
pub use genesis::AuthGenesis;

pub const CODESPACE: &str = "auth";
