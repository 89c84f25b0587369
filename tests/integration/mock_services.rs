//! In-memory order book and chain for integration testing.
//!
//! `MockOrderBook` implements `TradingApi` over a table of per-pair
//! pricing rules; `MockChain` implements both `TokenLedger` and
//! `SettlementEvents`. Everything is in-memory and controllable from
//! test code.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, U256};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use gpv2_trader::api::{Probe, QuoteRequest, TradingApi};
use gpv2_trader::chain::{Chain, ChainContext};
use gpv2_trader::onchain::{FilterId, SettlementEvents, TokenLedger};
use gpv2_trader::signing::order_uid;
use gpv2_trader::types::*;

pub const TEST_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

pub fn wallet() -> LocalWallet {
    TEST_KEY.parse().unwrap()
}

pub fn rinkeby() -> ChainContext {
    ChainContext::new(Chain::Rinkeby)
}

pub fn token(byte: u8, symbol: &str) -> Asset {
    Asset {
        address: Address::repeat_byte(byte),
        name: format!("{symbol} Token"),
        symbol: symbol.to_string(),
        decimals: 18,
        chain_id: 4,
    }
}

pub fn weth() -> Asset {
    Asset {
        address: Chain::Rinkeby.native_token(),
        name: "Wrapped Ether".to_string(),
        symbol: "WETH".to_string(),
        decimals: 18,
        chain_id: 4,
    }
}

// ---------------------------------------------------------------------------
// Order book
// ---------------------------------------------------------------------------

/// Pricing of one directed pair.
///
/// A quote for `amount` charges `fee` and returns
/// `(amount - fee) * num / den` (saturating), reduced by `impact_bps`. The estimate
/// endpoint prices at `num / den` without impact, so the estimated
/// slippage of the pair is roughly `impact_bps`.
#[derive(Debug, Clone, Copy)]
pub struct PairRule {
    pub fee: U256,
    pub num: U256,
    pub den: U256,
    pub impact_bps: u64,
}

impl PairRule {
    pub fn new(fee: u64, num: u64, den: u64) -> Self {
        Self {
            fee: U256::from(fee),
            num: U256::from(num),
            den: U256::from(den),
            impact_bps: 0,
        }
    }

    pub fn with_impact(mut self, impact_bps: u64) -> Self {
        self.impact_bps = impact_bps;
        self
    }

    fn price(&self, amount: U256) -> U256 {
        amount * self.num / self.den
    }
}

pub struct MockOrderBook {
    ctx: ChainContext,
    rules: HashMap<(Address, Address), PairRule>,
    placed: Arc<Mutex<Vec<SignedOrder>>>,
    executed: Arc<Mutex<U256>>,
    /// When set, placing an order emits a `Trade` log payload here.
    log_sink: Option<Arc<Mutex<Vec<Bytes>>>>,
    quote_calls: Arc<Mutex<usize>>,
}

impl MockOrderBook {
    pub fn new(ctx: ChainContext) -> Self {
        Self {
            ctx,
            rules: HashMap::new(),
            placed: Arc::new(Mutex::new(Vec::new())),
            executed: Arc::new(Mutex::new(U256::zero())),
            log_sink: None,
            quote_calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Price `sell -> buy` with `rule` and make the reverse direction
    /// quotable at a flat 1:1 with no fee.
    pub fn with_pair(mut self, sell: &Asset, buy: &Asset, rule: PairRule) -> Self {
        self.rules.insert((sell.address, buy.address), rule);
        self.rules
            .entry((buy.address, sell.address))
            .or_insert_with(|| PairRule::new(0, 1, 1));
        self
    }

    /// Only the forward direction is quotable.
    pub fn with_one_way(mut self, sell: &Asset, buy: &Asset, rule: PairRule) -> Self {
        self.rules.insert((sell.address, buy.address), rule);
        self
    }

    pub fn emitting_events_to(mut self, sink: Arc<Mutex<Vec<Bytes>>>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    pub fn set_executed(&self, amount: u64) {
        *self.executed.lock().unwrap() = U256::from(amount);
    }

    pub fn placed(&self) -> Vec<SignedOrder> {
        self.placed.lock().unwrap().clone()
    }

    pub fn quote_calls(&self) -> usize {
        *self.quote_calls.lock().unwrap()
    }

    fn rule(&self, sell: Address, buy: Address) -> Option<PairRule> {
        self.rules.get(&(sell, buy)).copied()
    }
}

#[async_trait]
impl TradingApi for MockOrderBook {
    async fn quote(&self, request: &QuoteRequest) -> Probe<Quote> {
        *self.quote_calls.lock().unwrap() += 1;
        let rule = match self.rule(request.sell_token, request.buy_token) {
            Some(rule) => rule,
            None => return Probe::Infeasible("NoLiquidity".into()),
        };
        // The fee is reported even when it eats the whole amount; callers
        // must compare it against their balance.
        let sell_amount = request.amount.saturating_sub(rule.fee);
        let buy_amount =
            rule.price(sell_amount) * U256::from(10_000 - rule.impact_bps) / U256::from(10_000u64);
        Probe::Feasible(Quote {
            sell_amount,
            buy_amount,
            fee_amount: rule.fee,
            valid_to: request.valid_to,
        })
    }

    async fn estimate_trade_amount(
        &self,
        sell_token: Address,
        buy_token: Address,
        amount: U256,
        _kind: OrderKind,
    ) -> Probe<U256> {
        match self.rule(sell_token, buy_token) {
            Some(rule) => Probe::Feasible(rule.price(amount)),
            None => Probe::Infeasible("NoLiquidity".into()),
        }
    }

    async fn place_order(&self, order: &SignedOrder, from: Address) -> Result<OrderUid> {
        let uid = order_uid(&self.ctx, &order.order, from);
        self.placed.lock().unwrap().push(order.clone());

        if let Some(sink) = &self.log_sink {
            // ABI-encoded Trade data: five words, then the uid bytes
            let mut data = vec![0u8; 32 * 7];
            data.extend_from_slice(&uid.0);
            data.extend_from_slice(&[0u8; 8]);
            sink.lock().unwrap().push(Bytes::from(data));
        }
        Ok(uid)
    }

    async fn executed_sell_amount(&self, uid: &OrderUid) -> Result<U256> {
        let known = self
            .placed
            .lock()
            .unwrap()
            .iter()
            .any(|o| order_uid(&self.ctx, &o.order, o.signature.signer) == *uid);
        if !known {
            return Err(anyhow!("order {uid} not found"));
        }
        Ok(*self.executed.lock().unwrap())
    }
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

pub struct MockChain {
    owner: Address,
    /// Each read pops the front value until only one is left.
    balances: Mutex<HashMap<Address, VecDeque<U256>>>,
    allowances: Mutex<HashMap<Address, U256>>,
    approvals: Mutex<Vec<(Address, Address, U256)>>,
    logs: Arc<Mutex<Vec<Bytes>>>,
    opened: Mutex<usize>,
    closed: Mutex<Vec<FilterId>>,
}

impl MockChain {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            balances: Mutex::new(HashMap::new()),
            allowances: Mutex::new(HashMap::new()),
            approvals: Mutex::new(Vec::new()),
            logs: Arc::new(Mutex::new(Vec::new())),
            opened: Mutex::new(0),
            closed: Mutex::new(Vec::new()),
        }
    }

    pub fn for_wallet(wallet: &LocalWallet) -> Self {
        Self::new(wallet.address())
    }

    pub fn with_balance(self, token: &Asset, amount: u64) -> Self {
        self.with_balances(token, &[amount])
    }

    /// Successive reads of `token` return `amounts` in order.
    pub fn with_balances(self, token: &Asset, amounts: &[u64]) -> Self {
        self.balances.lock().unwrap().insert(
            token.address,
            amounts.iter().map(|a| U256::from(*a)).collect(),
        );
        self
    }

    pub fn with_allowance(self, token: &Asset, amount: U256) -> Self {
        self.allowances.lock().unwrap().insert(token.address, amount);
        self
    }

    pub fn log_sink(&self) -> Arc<Mutex<Vec<Bytes>>> {
        self.logs.clone()
    }

    pub fn approvals(&self) -> Vec<(Address, Address, U256)> {
        self.approvals.lock().unwrap().clone()
    }

    pub fn filters_opened(&self) -> usize {
        *self.opened.lock().unwrap()
    }

    pub fn filters_closed(&self) -> usize {
        self.closed.lock().unwrap().len()
    }
}

#[async_trait]
impl TokenLedger for MockChain {
    fn owner(&self) -> Address {
        self.owner
    }

    async fn balance_of(&self, token: Address) -> Result<U256> {
        let mut balances = self.balances.lock().unwrap();
        let Some(queue) = balances.get_mut(&token) else {
            return Ok(U256::zero());
        };
        let value = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().copied()
        };
        Ok(value.unwrap_or_default())
    }

    async fn allowance(&self, token: Address, _spender: Address) -> Result<U256> {
        Ok(self
            .allowances
            .lock()
            .unwrap()
            .get(&token)
            .copied()
            .unwrap_or_default())
    }

    async fn approve(&self, token: Address, spender: Address, amount: U256) -> Result<()> {
        self.approvals.lock().unwrap().push((token, spender, amount));
        self.allowances.lock().unwrap().insert(token, amount);
        Ok(())
    }
}

#[async_trait]
impl SettlementEvents for MockChain {
    async fn open(&self, _owner: Address) -> Result<FilterId> {
        let mut opened = self.opened.lock().unwrap();
        *opened += 1;
        Ok(FilterId(U256::from(*opened)))
    }

    async fn poll(&self, _filter: FilterId) -> Result<Vec<Bytes>> {
        Ok(std::mem::take(&mut *self.logs.lock().unwrap()))
    }

    async fn close(&self, filter: FilterId) -> Result<()> {
        self.closed.lock().unwrap().push(filter);
        Ok(())
    }
}
