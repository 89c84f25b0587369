//! Batch-auction trading API.
//!
//! Defines the `TradingApi` trait (quotes, amount estimates, order
//! placement, execution status) and the `Probe` result used by every
//! read-only quote query. The HTTP implementation lives in `gpv2`.

pub mod gpv2;

use anyhow::Result;
use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use std::fmt;

use crate::types::{OrderKind, OrderUid, Quote, SignedOrder};

// ---------------------------------------------------------------------------
// Probe result
// ---------------------------------------------------------------------------

/// Outcome of a read-only quote query.
///
/// `Infeasible` is the normal "no route between these tokens" answer and
/// is expected for most pairs. `Error` is anything else (transport
/// failure, server error, unparsable body). Callers skip the candidate in
/// both cases but log them differently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    Feasible(T),
    Infeasible(String),
    Error(String),
}

impl<T> Probe<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Probe<U> {
        match self {
            Probe::Feasible(v) => Probe::Feasible(f(v)),
            Probe::Infeasible(reason) => Probe::Infeasible(reason),
            Probe::Error(message) => Probe::Error(message),
        }
    }
}

impl<T> fmt::Display for Probe<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Probe::Feasible(_) => write!(f, "feasible"),
            Probe::Infeasible(reason) => write!(f, "infeasible: {reason}"),
            Probe::Error(message) => write!(f, "error: {message}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Parameters of a quote request. `amount` is the sell amount before fee
/// for sell orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub sell_token: Address,
    pub buy_token: Address,
    pub amount: U256,
    pub kind: OrderKind,
    pub from: Address,
    pub app_data: H256,
    pub valid_to: u32,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Abstraction over the off-chain order book service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradingApi: Send + Sync {
    /// Fee and price quote for a full order.
    async fn quote(&self, request: &QuoteRequest) -> Probe<Quote>;

    /// Estimated counter-amount for trading `amount` of `sell_token`.
    async fn estimate_trade_amount(
        &self,
        sell_token: Address,
        buy_token: Address,
        amount: U256,
        kind: OrderKind,
    ) -> Probe<U256>;

    /// Submit a signed order. Returns the uid assigned by the service.
    async fn place_order(&self, order: &SignedOrder, from: Address) -> Result<OrderUid>;

    /// Executed sell amount of an order; zero while unsettled.
    async fn executed_sell_amount(&self, uid: &OrderUid) -> Result<U256>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
