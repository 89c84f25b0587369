//! Single trade run.
//!
//! scan balances → select candidates → pick one → approve → fresh quote
//! → build & sign → place → wait for settlement → report.
//!
//! Every fatal condition ends the run with an error; there is no retry
//! loop here.

use anyhow::{anyhow, Context, Result};
use ethers::signers::LocalWallet;
use ethers::types::{Address, U256};
use std::time::Duration;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use super::order_builder::{OrderBuilder, OrderParams};
use super::prober::PathProber;
use super::scanner::{read_balance, scan_balances};
use super::selector::{CandidateSelector, SelectionConfig};
use super::settlement::{SettlementOutcome, SettlementWaiter};
use crate::api::{Probe, TradingApi};
use crate::chain::ChainContext;
use crate::onchain::{SettlementEvents, TokenLedger};
use crate::random::{select, RandomSource};
use crate::signing::order_uid;
use crate::types::{Asset, OrderUid, SigningScheme, TradeCandidate, TraderError};

// ---------------------------------------------------------------------------
// Settings & report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeSettings {
    pub selection: SelectionConfig,
    pub order: OrderParams,
    pub settlement_timeout: Duration,
    pub event_poll_interval: Duration,
}

/// What a successful run did.
#[derive(Debug, Clone)]
pub struct TradeReport {
    pub run_id: Uuid,
    pub sell: Asset,
    pub buy: Asset,
    pub uid: OrderUid,
    pub scheme: SigningScheme,
    pub sell_amount: U256,
    pub buy_amount: U256,
    pub fee_amount: U256,
    pub outcome: SettlementOutcome,
    pub final_buy_balance: U256,
}

// ---------------------------------------------------------------------------
// Trader
// ---------------------------------------------------------------------------

pub struct Trader<'a> {
    ctx: &'a ChainContext,
    api: &'a dyn TradingApi,
    ledger: &'a dyn TokenLedger,
    events: &'a dyn SettlementEvents,
    wallet: &'a LocalWallet,
    settings: TradeSettings,
}

impl<'a> Trader<'a> {
    pub fn new(
        ctx: &'a ChainContext,
        api: &'a dyn TradingApi,
        ledger: &'a dyn TokenLedger,
        events: &'a dyn SettlementEvents,
        wallet: &'a LocalWallet,
        settings: TradeSettings,
    ) -> Self {
        Self {
            ctx,
            api,
            ledger,
            events,
            wallet,
            settings,
        }
    }

    /// Make one random trade out of the tokens in `universe`.
    pub async fn make_trade(&self, universe: &[Asset], rng: &mut dyn RandomSource) -> Result<TradeReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("trade", run_id = %run_id, network = %self.ctx.chain);
        self.run(run_id, universe, rng).instrument(span).await
    }

    async fn run(&self, run_id: Uuid, universe: &[Asset], rng: &mut dyn RandomSource) -> Result<TradeReport> {
        let owner = self.ledger.owner();
        info!(account = ?owner, tokens = universe.len(), "Using account");

        // -- Choose the pair ---------------------------------------------

        let held = scan_balances(self.ledger, universe).await;
        let prober = PathProber::new(
            self.api,
            owner,
            self.settings.order.app_data,
            self.settings.order.validity_secs,
        );
        let candidates = CandidateSelector::new(&prober, self.ctx, self.settings.selection)
            .select(universe, &held, rng)
            .await?;

        let TradeCandidate { sell, buy, .. } = select(&candidates, rng)
            .cloned()
            .ok_or_else(|| anyhow!("candidate list unexpectedly empty"))?;

        // Time has passed since the scan; read again.
        let balance = read_balance(self.ledger, sell.address).await?;
        info!(
            sell = %sell,
            buy = %buy,
            amount = %sell.format_amount(balance),
            "Selling"
        );

        self.ensure_allowance(&sell, balance).await?;

        // -- Final quote, order and signature ----------------------------

        let quote = match prober.quote(&sell, &buy, balance).await {
            Probe::Feasible(q) => q,
            other => {
                return Err(anyhow!("Final quote for {sell} -> {buy} failed: {other}"));
            }
        };

        let builder = OrderBuilder::new(self.ctx, self.settings.order);
        let order = builder.build(&sell, &buy, balance, &quote)?;
        let signed = builder.sign(order, self.wallet, rng)?;
        let order = &signed.order;
        let scheme = signed.signature.scheme;

        // -- Submit & settle ---------------------------------------------

        let expected_uid = order_uid(self.ctx, order, owner);
        let uid = self
            .api
            .place_order(&signed, owner)
            .await
            .context("Failed to place order")?;
        if uid != expected_uid {
            warn!(returned = %uid, computed = %expected_uid, "Order uid differs from local hash");
        }
        info!(
            uid = %uid,
            sell_amount = %sell.format_amount(order.sell_amount),
            fee = %sell.format_amount(order.fee_amount),
            min_buy_amount = %buy.format_amount(order.buy_amount),
            "Order placed"
        );

        let waiter = SettlementWaiter::new(
            self.events,
            self.api,
            self.settings.settlement_timeout,
            self.settings.event_poll_interval,
        );
        let outcome = waiter.wait(&uid, owner).await?;
        if !outcome.is_settled() {
            return Err(TraderError::SettlementTimeout { uid }.into());
        }

        let final_buy_balance = read_balance(self.ledger, buy.address).await?;
        info!(
            token = %buy,
            balance = %buy.format_amount(final_buy_balance),
            "Trade complete"
        );

        Ok(TradeReport {
            run_id,
            sell_amount: order.sell_amount,
            buy_amount: order.buy_amount,
            fee_amount: order.fee_amount,
            sell,
            buy,
            uid,
            scheme,
            outcome,
            final_buy_balance,
        })
    }

    /// Approve the vault relayer for an unlimited amount if the current
    /// allowance does not cover `amount`.
    async fn ensure_allowance(&self, token: &Asset, amount: U256) -> Result<()> {
        let spender: Address = self.ctx.vault_relayer;
        let allowance = self
            .ledger
            .allowance(token.address, spender)
            .await
            .with_context(|| format!("Failed to read allowance of {token}"))?;
        if allowance >= amount {
            return Ok(());
        }

        info!(token = %token, "Setting unlimited allowance for the vault relayer");
        self.ledger
            .approve(token.address, spender, U256::MAX)
            .await
            .with_context(|| format!("Failed to approve {token}"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
