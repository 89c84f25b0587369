//! Settlement waiter.
//!
//! After an order is placed, the settlement contract's `Trade` log for the
//! trader is watched until the order uid shows up in a payload or the
//! timeout elapses. Event delivery is not reliable, so a timeout is not
//! final: the order book's execution status decides.

use anyhow::{Context, Result};
use ethers::types::{Address, Bytes, U256};
use std::time::Duration;
use tokio::time::{sleep_until, timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::api::TradingApi;
use crate::onchain::{FilterId, SettlementEvents};
use crate::types::OrderUid;

/// Budget for removing the filter once the race is decided.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// A `Trade` log carrying the uid was seen before the timeout.
    SettledByEvent,
    /// No log was seen, but the order book reports an execution.
    SettledByStatus { executed_sell_amount: U256 },
    NotSettled,
}

impl SettlementOutcome {
    pub fn is_settled(&self) -> bool {
        !matches!(self, SettlementOutcome::NotSettled)
    }
}

/// Whether a log payload mentions the order. Plain substring match on the
/// hex encoding; the uid sits inside the ABI-encoded `bytes` field.
pub fn payload_mentions(data: &Bytes, uid: &OrderUid) -> bool {
    hex::encode(data.as_ref()).contains(&uid.hex_body())
}

pub struct SettlementWaiter<'a> {
    events: &'a dyn SettlementEvents,
    api: &'a dyn TradingApi,
    timeout: Duration,
    poll_interval: Duration,
    close_timeout: Duration,
}

impl<'a> SettlementWaiter<'a> {
    pub fn new(
        events: &'a dyn SettlementEvents,
        api: &'a dyn TradingApi,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            events,
            api,
            timeout,
            poll_interval,
            close_timeout: CLOSE_TIMEOUT,
        }
    }

    pub fn with_close_timeout(mut self, close_timeout: Duration) -> Self {
        self.close_timeout = close_timeout;
        self
    }

    /// Wait for `uid` (owned by `owner`) to settle.
    ///
    /// Errors only when the status fallback itself cannot be queried.
    pub async fn wait(&self, uid: &OrderUid, owner: Address) -> Result<SettlementOutcome> {
        info!(uid = %uid, timeout_secs = self.timeout.as_secs(), "Waiting for trade");

        if self.race_event(uid, owner).await {
            info!(uid = %uid, "Trade event received");
            return Ok(SettlementOutcome::SettledByEvent);
        }

        let executed_sell_amount = self
            .api
            .executed_sell_amount(uid)
            .await
            .with_context(|| format!("Failed to query execution status of {uid}"))?;

        if executed_sell_amount.is_zero() {
            warn!(uid = %uid, "Order not executed within timeout");
            Ok(SettlementOutcome::NotSettled)
        } else {
            info!(
                uid = %uid,
                executed_sell_amount = %executed_sell_amount,
                "Trade confirmed by order status"
            );
            Ok(SettlementOutcome::SettledByStatus {
                executed_sell_amount,
            })
        }
    }

    /// Race the log filter against the timeout. The deadline covers
    /// installing the filter too; removal gets its own small budget and
    /// happens on both outcomes.
    async fn race_event(&self, uid: &OrderUid, owner: Address) -> bool {
        let deadline = Instant::now() + self.timeout;

        let filter = match timeout_at(deadline, self.events.open(owner)).await {
            Ok(Ok(filter)) => filter,
            Ok(Err(e)) => {
                warn!(error = %e, "Could not install trade filter, relying on order status");
                sleep_until(deadline).await;
                return false;
            }
            Err(_) => {
                warn!("Installing trade filter timed out, relying on order status");
                return false;
            }
        };

        let seen = timeout_at(deadline, self.watch(filter, uid)).await.is_ok();

        match timeout(self.close_timeout, self.events.close(filter)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to remove trade filter"),
            Err(_) => warn!("Removing trade filter timed out"),
        }
        seen
    }

    /// Poll until a payload mentions `uid`. Never returns otherwise.
    async fn watch(&self, filter: FilterId, uid: &OrderUid) {
        loop {
            match self.events.poll(filter).await {
                Ok(logs) => {
                    if logs.iter().any(|data| payload_mentions(data, uid)) {
                        return;
                    }
                    if !logs.is_empty() {
                        debug!(count = logs.len(), "Trade logs for other orders");
                    }
                }
                Err(e) => debug!(error = %e, "Trade filter poll failed"),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
