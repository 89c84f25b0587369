//! Candidate selector.
//!
//! For every held token, scans a shuffled copy of the universe for the
//! first buy token that
//! 1. is quotable in both directions,
//! 2. costs a fee below the held balance, and
//! 3. has estimated slippage within `acceptable_slippage_bps`.
//!
//! Held tokens are processed concurrently; the buy tokens of one held
//! token are tried one after the other and the scan stops at the first
//! hit. If no held token finds a partner, every held token is instead
//! tried against the chain's wrapped native token with the looser
//! `max_slippage_bps` limit.

use ethers::types::U256;
use futures::future::join_all;
use tracing::{debug, info};

use super::prober::{log_skip, PathProber};
use super::slippage::{admissible, estimate_slippage};
use crate::api::Probe;
use crate::chain::ChainContext;
use crate::random::{shuffle, RandomSource};
use crate::types::{Asset, HeldAsset, TradeCandidate, TraderError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionConfig {
    /// Limit for the diversified first pass.
    pub acceptable_slippage_bps: u32,
    /// Limit for the native-token fallback pass.
    pub max_slippage_bps: u32,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            acceptable_slippage_bps: 100,
            max_slippage_bps: 1000,
        }
    }
}

// ---------------------------------------------------------------------------
// Selector
// ---------------------------------------------------------------------------

pub struct CandidateSelector<'a> {
    prober: &'a PathProber<'a>,
    ctx: &'a ChainContext,
    config: SelectionConfig,
}

impl<'a> CandidateSelector<'a> {
    pub fn new(prober: &'a PathProber<'a>, ctx: &'a ChainContext, config: SelectionConfig) -> Self {
        Self { prober, ctx, config }
    }

    /// Build the admissible (sell, buy) pairs. Never returns an empty list.
    pub async fn select(
        &self,
        universe: &[Asset],
        held: &[HeldAsset],
        rng: &mut dyn RandomSource,
    ) -> Result<Vec<TradeCandidate>, TraderError> {
        let held: Vec<&HeldAsset> = held.iter().filter(|h| !h.balance.is_zero()).collect();

        // Shuffle up front so the concurrent scans don't share the rng.
        let orders: Vec<Vec<Asset>> = held
            .iter()
            .map(|_| {
                let mut order = universe.to_vec();
                shuffle(&mut order, &mut *rng);
                order
            })
            .collect();

        let scans = held
            .iter()
            .zip(orders.iter())
            .map(|(h, order)| self.first_buy_token(h, order));
        let candidates: Vec<TradeCandidate> = join_all(scans).await.into_iter().flatten().collect();

        if !candidates.is_empty() {
            info!(count = candidates.len(), "Candidates with acceptable slippage");
            return Ok(candidates);
        }

        debug!("No tokens available with acceptable slippage, trying to buy native token next");
        let fallback = self.native_fallback(universe, &held).await;
        if fallback.is_empty() {
            return Err(TraderError::NoTradableBalance {
                network: self.ctx.chain.name().to_string(),
                account: self.prober.owner(),
            });
        }
        info!(count = fallback.len(), "Candidates via native token fallback");
        Ok(fallback)
    }

    /// First buy token in `order` that passes all checks for `held`.
    async fn first_buy_token(&self, held: &HeldAsset, order: &[Asset]) -> Option<TradeCandidate> {
        let sell = &held.asset;
        for buy in order {
            if buy.address == sell.address {
                continue;
            }

            let quote = match self.prober.probe_pair(sell, buy, held.balance).await {
                Probe::Feasible(q) => q,
                other => {
                    log_skip(sell, buy, &other);
                    continue;
                }
            };

            if quote.fee_amount >= held.balance {
                debug!(sell = %sell, buy = %buy, "Not enough balance to pay the fee");
                continue;
            }

            let slippage = estimate_slippage(
                self.prober,
                sell,
                buy,
                quote.sell_amount,
                Some(quote.buy_amount),
            )
            .await;
            match slippage {
                None => {
                    debug!(sell = %sell, buy = %buy, "Unable to estimate slippage");
                    continue;
                }
                Some(s) if !s.within(self.config.acceptable_slippage_bps) => {
                    debug!(sell = %sell, buy = %buy, slippage = %s, "Too much slippage");
                    continue;
                }
                Some(s) => {
                    debug!(sell = %sell, buy = %buy, slippage = %s, "Candidate accepted");
                }
            }

            return Some(candidate(held, buy, quote.sell_amount, quote.buy_amount, quote.fee_amount));
        }
        None
    }

    /// Second pass: everything held (except the native token) against the
    /// native token, with the loose limit.
    async fn native_fallback(&self, universe: &[Asset], held: &[&HeldAsset]) -> Vec<TradeCandidate> {
        let native = match universe.iter().find(|a| a.is(self.ctx.native_token)) {
            Some(n) => n,
            None => {
                debug!(native = ?self.ctx.native_token, "Wrapped native token is not in the token list");
                return Vec::new();
            }
        };

        let checks = held
            .iter()
            .filter(|h| !h.asset.is(self.ctx.native_token))
            .map(|h| self.check_native(h, native));
        join_all(checks).await.into_iter().flatten().collect()
    }

    async fn check_native(&self, held: &HeldAsset, native: &Asset) -> Option<TradeCandidate> {
        let sell = &held.asset;
        let quote = match self.prober.quote(sell, native, held.balance).await {
            Probe::Feasible(q) => q,
            other => {
                log_skip(sell, native, &other);
                return None;
            }
        };

        if quote.fee_amount >= held.balance {
            debug!(sell = %sell, buy = %native, "Not enough balance to pay the fee");
            return None;
        }

        let slippage = estimate_slippage(
            self.prober,
            sell,
            native,
            quote.sell_amount,
            Some(quote.buy_amount),
        )
        .await;
        if !admissible(slippage, self.config.max_slippage_bps) {
            let shown = slippage.map_or_else(|| "indeterminate".to_string(), |s| s.to_string());
            debug!(sell = %sell, buy = %native, slippage = %shown, "Too much slippage");
            return None;
        }

        Some(candidate(held, native, quote.sell_amount, quote.buy_amount, quote.fee_amount))
    }
}

fn candidate(
    held: &HeldAsset,
    buy: &Asset,
    sell_amount: U256,
    buy_amount: U256,
    fee_amount: U256,
) -> TradeCandidate {
    TradeCandidate {
        sell: held.asset.clone(),
        buy: buy.clone(),
        balance: held.balance,
        sell_amount,
        buy_amount,
        fee_amount,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
