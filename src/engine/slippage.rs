//! Slippage estimator.
//!
//! The order book has no spot-price endpoint, so slippage is approximated
//! by comparing the price of a small reference trade (1/100 of the size)
//! with the price of the full trade:
//!
//! ```text
//! fractionalPrice = fractionalProceeds / fractionalAmount
//! fullPrice       = fullProceeds / fullAmount
//! slippage (bps)  = fractionalPrice / fullPrice * 10000 - 10000
//! ```
//!
//! This is an approximation and is noisy on thin books: the reference
//! trade pays its own fee share, and quotes can move between the two
//! queries. It can even come out negative. Treat the number as a coarse
//! filter, not a measurement.

use ethers::types::{U256, U512};
use rust_decimal::Decimal;
use std::fmt;

use super::prober::PathProber;
use crate::api::Probe;
use crate::types::{Asset, OrderKind};

/// The reference trade is `full amount / REFERENCE_DIVISOR`.
pub const REFERENCE_DIVISOR: u64 = 100;

const BPS: u64 = 10_000;

/// A computed slippage value. Indeterminate estimates are `None` at the
/// call sites, never a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slippage {
    Bps(i64),
    /// Ratio too large to represent.
    Unbounded,
}

impl Slippage {
    /// Whether this slippage is at most `limit_bps`.
    pub fn within(&self, limit_bps: u32) -> bool {
        match self {
            Slippage::Bps(bps) => *bps <= i64::from(limit_bps),
            Slippage::Unbounded => false,
        }
    }

    /// Slippage in percent, `None` when unbounded.
    pub fn as_percent(&self) -> Option<Decimal> {
        match self {
            Slippage::Bps(bps) => Some(Decimal::new(*bps, 2)),
            Slippage::Unbounded => None,
        }
    }
}

impl fmt::Display for Slippage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_percent() {
            Some(percent) => write!(f, "{percent}%"),
            None => write!(f, "unbounded"),
        }
    }
}

/// Admission rule shared by both selection passes: an indeterminate
/// estimate rejects the candidate.
pub fn admissible(estimate: Option<Slippage>, limit_bps: u32) -> bool {
    estimate.map_or(false, |s| s.within(limit_bps))
}

/// Pure slippage formula, truncating toward zero.
///
/// `None` when either denominator term is zero (no meaningful price).
pub fn slippage_bps(
    fractional_proceeds: U256,
    fractional_amount: U256,
    full_proceeds: U256,
    full_amount: U256,
) -> Option<Slippage> {
    let denominator: U512 = fractional_amount.full_mul(full_proceeds);
    if denominator.is_zero() {
        return None;
    }

    let numerator = match fractional_proceeds
        .full_mul(full_amount)
        .checked_mul(U512::from(BPS))
    {
        Some(n) => n,
        None => return Some(Slippage::Unbounded),
    };

    let ratio = numerator / denominator;
    if ratio > U512::from(i64::MAX as u64) {
        return Some(Slippage::Unbounded);
    }
    Some(Slippage::Bps(ratio.low_u64() as i64 - BPS as i64))
}

/// Estimate the slippage of selling `full_amount` of `sell` for `buy`.
///
/// `full_proceeds` can be passed when a quote for the full amount is
/// already at hand; otherwise it is fetched. Any failed query yields
/// `None`.
pub async fn estimate_slippage(
    prober: &PathProber<'_>,
    sell: &Asset,
    buy: &Asset,
    full_amount: U256,
    full_proceeds: Option<U256>,
) -> Option<Slippage> {
    let fractional_amount = full_amount / U256::from(REFERENCE_DIVISOR);
    if fractional_amount.is_zero() {
        return None;
    }

    let full_proceeds = match full_proceeds {
        Some(p) => p,
        None => match prober.estimate(sell, buy, full_amount, OrderKind::Sell).await {
            Probe::Feasible(p) => p,
            other => {
                super::prober::log_skip(sell, buy, &other);
                return None;
            }
        },
    };

    let fractional_proceeds = match prober
        .estimate(sell, buy, fractional_amount, OrderKind::Sell)
        .await
    {
        Probe::Feasible(p) => p,
        other => {
            super::prober::log_skip(sell, buy, &other);
            return None;
        }
    };

    slippage_bps(fractional_proceeds, fractional_amount, full_proceeds, full_amount)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
