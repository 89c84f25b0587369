//! On-chain collaborators.
//!
//! `TokenLedger` covers ERC-20 reads and approvals, `SettlementEvents`
//! the settlement contract's `Trade` log filter. The JSON-RPC backed
//! implementations live in `rpc`.

pub mod rpc;

use anyhow::Result;
use async_trait::async_trait;
use ethers::types::{Address, Bytes, U256};

/// ERC-20 balance, allowance and approval primitives for the trader.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenLedger: Send + Sync {
    /// Address that owns the balances and signs orders.
    fn owner(&self) -> Address;

    async fn balance_of(&self, token: Address) -> Result<U256>;

    async fn allowance(&self, token: Address, spender: Address) -> Result<U256>;

    /// Send `approve(spender, amount)` and wait for it to be mined.
    async fn approve(&self, token: Address, spender: Address, amount: U256) -> Result<()>;
}

/// Handle for an installed log filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterId(pub U256);

/// Source of settlement `Trade` events for one owner.
///
/// A filter is opened, polled until the caller is done and then closed.
/// Callers must close every filter they open.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettlementEvents: Send + Sync {
    async fn open(&self, owner: Address) -> Result<FilterId>;

    /// Data payloads of `Trade` logs seen since the previous poll.
    async fn poll(&self, filter: FilterId) -> Result<Vec<Bytes>>;

    async fn close(&self, filter: FilterId) -> Result<()>;
}
