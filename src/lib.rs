//! GPv2 trading bot.
//!
//! Makes one randomised, slippage-bounded sell order out of the account's
//! token balances, submits it to the batch auction order book and waits
//! for it to settle. Library crate exposing all modules for use by
//! integration tests and the binary entry point.

pub mod config;
pub mod chain;
pub mod types;
pub mod random;
pub mod tokens;
pub mod api;
pub mod onchain;
pub mod signing;
pub mod engine;
