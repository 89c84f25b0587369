//! Shared types for the trading bot.
//!
//! These types form the data model used across all modules. Amounts are
//! always `U256` token atoms; floating point never touches a balance, fee
//! or quote.

use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Asset
// ---------------------------------------------------------------------------

/// A fungible token from the token list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Asset {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub chain_id: u64,
}

impl Asset {
    /// Render a raw token amount using the token's decimals.
    pub fn format_amount(&self, amount: U256) -> String {
        ethers::utils::format_units(amount, u32::from(self.decimals))
            .unwrap_or_else(|_| amount.to_string())
    }

    /// Addresses are compared, never names.
    pub fn is(&self, address: Address) -> bool {
        self.address == address
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.symbol.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} ({})", self.name, self.symbol)
        }
    }
}

/// An asset together with the trader's current balance of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeldAsset {
    pub asset: Asset,
    pub balance: U256,
}

// ---------------------------------------------------------------------------
// Candidate
// ---------------------------------------------------------------------------

/// A (sell, buy) pair that passed the fee and slippage checks.
///
/// Only lives for the duration of candidate selection; the amounts are
/// from the probe quote and are never reused for the final order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeCandidate {
    pub sell: Asset,
    pub buy: Asset,
    pub balance: U256,
    pub sell_amount: U256,
    pub buy_amount: U256,
    pub fee_amount: U256,
}

// ---------------------------------------------------------------------------
// Quote & Order
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Sell,
    Buy,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Sell => "sell",
            OrderKind::Buy => "buy",
        }
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Price quote for selling `sell_amount + fee_amount` of one token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    /// Sell amount after the fee has been taken out.
    pub sell_amount: U256,
    pub buy_amount: U256,
    pub fee_amount: U256,
    pub valid_to: u32,
}

/// A GPv2 order, ready to be hashed and signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub sell_token: Address,
    pub buy_token: Address,
    /// `None` means proceeds go to the owner.
    pub receiver: Option<Address>,
    pub sell_amount: U256,
    pub buy_amount: U256,
    pub valid_to: u32,
    pub app_data: H256,
    pub fee_amount: U256,
    pub kind: OrderKind,
    pub partially_fillable: bool,
}

// ---------------------------------------------------------------------------
// Signatures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigningScheme {
    Eip712,
    EthSign,
}

impl SigningScheme {
    pub const ECDSA: [SigningScheme; 2] = [SigningScheme::Eip712, SigningScheme::EthSign];

    pub fn as_str(&self) -> &'static str {
        match self {
            SigningScheme::Eip712 => "eip712",
            SigningScheme::EthSign => "ethsign",
        }
    }
}

impl fmt::Display for SigningScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 65-byte `r || s || v` ECDSA signature over an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSignature {
    pub signer: Address,
    pub scheme: SigningScheme,
    pub bytes: Vec<u8>,
}

impl OrderSignature {
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.bytes))
    }
}

/// An order together with its signature, as submitted to the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedOrder {
    pub order: Order,
    pub signature: OrderSignature,
}

// ---------------------------------------------------------------------------
// Order uid
// ---------------------------------------------------------------------------

/// Unique order identifier: `digest (32) || owner (20) || validTo (4)`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct OrderUid(pub Vec<u8>);

impl OrderUid {
    /// Lower-case hex without the `0x` prefix, as it appears inside log data.
    pub fn hex_body(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Display for OrderUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.hex_body())
    }
}

impl fmt::Debug for OrderUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OrderUid({self})")
    }
}

impl FromStr for OrderUid {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s.strip_prefix("0x").unwrap_or(s);
        hex::decode(body).map(OrderUid)
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Fatal conditions that end a run.
#[derive(Debug, thiserror::Error)]
pub enum TraderError {
    #[error("Unexpected network {0}")]
    UnsupportedChain(u64),

    #[error(
        "Account doesn't have sufficient balance in any of the provided tokens.\n\
         Fund the bot's {network} account ({account:?})."
    )]
    NoTradableBalance { network: String, account: Address },

    #[error("Account doesn't have enough balance to pay fee: {token} balance {balance}, fee {fee}")]
    InsufficientBalanceForFee { token: String, balance: U256, fee: U256 },

    #[error("Order {uid} wasn't traded within timeout")]
    SettlementTimeout { uid: OrderUid },

    #[error("Chain id mismatch: configured {configured}, node reports {reported}")]
    ChainMismatch { configured: u64, reported: u64 },

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
