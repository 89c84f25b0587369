//! Order builder & signer.
//!
//! Turns the chosen pair and a fresh quote into a GPv2 sell order and
//! signs it with a randomly chosen ECDSA scheme. Nothing is submitted
//! here.

use ethers::signers::LocalWallet;
use ethers::types::{H256, U256, U512};
use tracing::info;

use super::prober::unix_now;
use crate::chain::ChainContext;
use crate::random::{select, RandomSource};
use crate::signing::sign_order;
use crate::types::{Asset, Order, OrderKind, Quote, SignedOrder, SigningScheme, TraderError};

const BPS: u64 = 10_000;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderParams {
    /// Buffer taken off the quoted buy amount (50 = 0.5 %).
    pub slippage_bps: u32,
    /// Seconds from signing until the order expires.
    pub validity_secs: u32,
    /// Application tag embedded in every order.
    pub app_data: H256,
}

impl OrderParams {
    pub fn new(app_data: H256) -> Self {
        Self {
            slippage_bps: 50,
            validity_secs: 900,
            app_data,
        }
    }
}

/// `floor(amount * (10000 - bps) / 10000)`.
pub fn apply_slippage(amount: U256, slippage_bps: u32) -> U256 {
    let keep = BPS.saturating_sub(u64::from(slippage_bps));
    let scaled = amount.full_mul(U256::from(keep)) / U512::from(BPS);
    // keep <= BPS, so the result never exceeds `amount`
    U256::try_from(scaled).unwrap_or(amount)
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct OrderBuilder<'a> {
    ctx: &'a ChainContext,
    params: OrderParams,
}

impl<'a> OrderBuilder<'a> {
    pub fn new(ctx: &'a ChainContext, params: OrderParams) -> Self {
        Self { ctx, params }
    }

    /// Build an order that sells the whole `balance` (fee included).
    /// Expiry is taken from the clock on every call.
    pub fn build(&self, sell: &Asset, buy: &Asset, balance: U256, quote: &Quote) -> Result<Order, TraderError> {
        self.build_at(sell, buy, balance, quote, unix_now())
    }

    /// Same as `build` with an explicit current time.
    pub fn build_at(
        &self,
        sell: &Asset,
        buy: &Asset,
        balance: U256,
        quote: &Quote,
        now: u64,
    ) -> Result<Order, TraderError> {
        if quote.fee_amount >= balance {
            return Err(TraderError::InsufficientBalanceForFee {
                token: sell.to_string(),
                balance,
                fee: quote.fee_amount,
            });
        }

        let valid_to = now.saturating_add(u64::from(self.params.validity_secs));
        let valid_to = u32::try_from(valid_to)
            .map_err(|_| TraderError::Config(format!("validTo {valid_to} out of range")))?;

        Ok(Order {
            sell_token: sell.address,
            buy_token: buy.address,
            receiver: None,
            sell_amount: balance - quote.fee_amount,
            buy_amount: apply_slippage(quote.buy_amount, self.params.slippage_bps),
            valid_to,
            app_data: self.params.app_data,
            fee_amount: quote.fee_amount,
            kind: OrderKind::Sell,
            partially_fillable: false,
        })
    }

    /// Sign with one of the two ECDSA schemes, picked uniformly.
    pub fn sign(
        &self,
        order: Order,
        wallet: &LocalWallet,
        rng: &mut dyn RandomSource,
    ) -> Result<SignedOrder, TraderError> {
        let scheme = *select(&SigningScheme::ECDSA, rng).unwrap_or(&SigningScheme::Eip712);
        let signature = sign_order(self.ctx, &order, wallet, scheme)?;
        info!(scheme = %scheme, "Signed order");
        Ok(SignedOrder { order, signature })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
