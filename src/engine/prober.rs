//! Path prober.
//!
//! Thin layer over the quote endpoints that stamps every request with the
//! trader, the application tag and a fresh `validTo`, and checks that a
//! pair can be traded in both directions.

use chrono::Utc;
use ethers::types::{Address, H256, U256};
use tracing::{debug, warn};

use crate::api::{Probe, QuoteRequest, TradingApi};
use crate::types::{Asset, OrderKind, Quote};

/// Seconds since the epoch, as used for `validTo`.
pub fn unix_now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

pub struct PathProber<'a> {
    api: &'a dyn TradingApi,
    owner: Address,
    app_data: H256,
    validity_secs: u32,
}

impl<'a> PathProber<'a> {
    pub fn new(api: &'a dyn TradingApi, owner: Address, app_data: H256, validity_secs: u32) -> Self {
        Self {
            api,
            owner,
            app_data,
            validity_secs,
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Sell-order quote for `amount` (before fee) of `sell`.
    pub async fn quote(&self, sell: &Asset, buy: &Asset, amount: U256) -> Probe<Quote> {
        let request = QuoteRequest {
            sell_token: sell.address,
            buy_token: buy.address,
            amount,
            kind: OrderKind::Sell,
            from: self.owner,
            app_data: self.app_data,
            valid_to: (unix_now() + u64::from(self.validity_secs)).min(u64::from(u32::MAX)) as u32,
        };
        self.api.quote(&request).await
    }

    /// Estimated proceeds of trading `amount` of `sell` into `buy`.
    pub async fn estimate(&self, sell: &Asset, buy: &Asset, amount: U256, kind: OrderKind) -> Probe<U256> {
        self.api
            .estimate_trade_amount(sell.address, buy.address, amount, kind)
            .await
    }

    /// Forward quote for `amount`, accepted only if the same amount is
    /// quotable in the reverse direction too. Keeps the bot from buying
    /// into a token it could never sell again.
    pub async fn probe_pair(&self, sell: &Asset, buy: &Asset, amount: U256) -> Probe<Quote> {
        let forward = self.quote(sell, buy, amount).await;
        let quote = match forward {
            Probe::Feasible(q) => q,
            other => return other,
        };

        match self.quote(buy, sell, amount).await {
            Probe::Feasible(_) => Probe::Feasible(quote),
            Probe::Infeasible(reason) => Probe::Infeasible(format!("no reverse path: {reason}")),
            Probe::Error(message) => Probe::Error(format!("reverse probe: {message}")),
        }
    }
}

/// Log why a candidate was skipped. Infeasible paths are routine and only
/// logged at debug; unexpected faults are warnings.
pub fn log_skip<T>(sell: &Asset, buy: &Asset, probe: &Probe<T>) {
    match probe {
        Probe::Feasible(_) => {}
        Probe::Infeasible(reason) => {
            debug!(sell = %sell, buy = %buy, reason = %reason, "No trade path");
        }
        Probe::Error(message) => {
            warn!(sell = %sell, buy = %buy, error = %message, "Quote probe failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
