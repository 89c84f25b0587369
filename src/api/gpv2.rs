//! GPv2 order book HTTP client.
//!
//! Endpoints used:
//! - `POST /api/v1/quote` fee and price quote for a sell order
//! - `GET  /api/v1/markets/{sell}-{buy}/{kind}/{amount}` amount estimate
//! - `POST /api/v1/orders` order placement, returns the uid
//! - `GET  /api/v1/orders/{uid}` order status incl. executed sell amount
//!
//! Amounts travel as decimal strings in both directions.

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{Probe, QuoteRequest, TradingApi};
use crate::types::{OrderKind, OrderUid, Quote, SignedOrder, TraderError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Error types the service returns when two tokens simply cannot be
/// traded against each other at this size.
const INFEASIBLE_ERRORS: &[&str] = &[
    "NoLiquidity",
    "UnsupportedToken",
    "NotFound",
    "SellAmountDoesNotCoverFee",
    "ZeroAmount",
    "UnsupportedBuyTokenDestination",
    "UnsupportedSellTokenSource",
];

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

mod decimal_u256 {
    use ethers::types::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(d)?;
        U256::from_dec_str(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuoteBody {
    sell_token: Address,
    buy_token: Address,
    from: Address,
    valid_to: u32,
    app_data: H256,
    partially_fillable: bool,
    kind: OrderKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    sell_amount_before_fee: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    buy_amount_after_fee: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    quote: QuotedOrder,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuotedOrder {
    #[serde(with = "decimal_u256")]
    sell_amount: U256,
    #[serde(with = "decimal_u256")]
    buy_amount: U256,
    #[serde(with = "decimal_u256")]
    fee_amount: U256,
    valid_to: u32,
}

#[derive(Debug, Deserialize)]
struct AmountEstimate {
    #[serde(with = "decimal_u256")]
    amount: U256,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderCreation {
    sell_token: Address,
    buy_token: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    receiver: Option<Address>,
    #[serde(with = "decimal_u256")]
    sell_amount: U256,
    #[serde(with = "decimal_u256")]
    buy_amount: U256,
    valid_to: u32,
    app_data: H256,
    #[serde(with = "decimal_u256")]
    fee_amount: U256,
    kind: OrderKind,
    partially_fillable: bool,
    sell_token_balance: &'static str,
    buy_token_balance: &'static str,
    signing_scheme: &'static str,
    signature: String,
    from: Address,
}

impl OrderCreation {
    fn new(signed: &SignedOrder, from: Address) -> Self {
        let order = &signed.order;
        Self {
            sell_token: order.sell_token,
            buy_token: order.buy_token,
            receiver: order.receiver,
            sell_amount: order.sell_amount,
            buy_amount: order.buy_amount,
            valid_to: order.valid_to,
            app_data: order.app_data,
            fee_amount: order.fee_amount,
            kind: order.kind,
            partially_fillable: order.partially_fillable,
            sell_token_balance: "erc20",
            buy_token_balance: "erc20",
            signing_scheme: signed.signature.scheme.as_str(),
            signature: signed.signature.to_hex(),
            from,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderStatus {
    #[serde(with = "decimal_u256")]
    executed_sell_amount: U256,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ApiErrorBody {
    #[serde(default)]
    error_type: String,
    #[serde(default)]
    description: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct Gpv2Client {
    http: Client,
    base_url: String,
}

impl Gpv2Client {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build GPv2 API HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Turn a response into a probe: success bodies are parsed, known
    /// "no route" errors become `Infeasible`, anything else `Error`.
    async fn probe_response<T>(resp: reqwest::Result<Response>) -> Probe<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let resp = match resp {
            Ok(r) => r,
            Err(e) => return Probe::Error(format!("request failed: {e}")),
        };

        let status = resp.status();
        if status.is_success() {
            return match resp.json::<T>().await {
                Ok(body) => Probe::Feasible(body),
                Err(e) => Probe::Error(format!("malformed response: {e}")),
            };
        }

        let text = resp.text().await.unwrap_or_default();
        classify_failure(status, &text)
    }

    async fn api_error(resp: Response) -> TraderError {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        let body: ApiErrorBody = serde_json::from_str(&text).unwrap_or_default();
        let message = if body.error_type.is_empty() {
            text
        } else {
            format!("{}: {}", body.error_type, body.description)
        };
        TraderError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

/// Classify a non-success response body.
fn classify_failure<T>(status: StatusCode, text: &str) -> Probe<T> {
    let body: ApiErrorBody = serde_json::from_str(text).unwrap_or_default();
    if INFEASIBLE_ERRORS.contains(&body.error_type.as_str()) || status == StatusCode::NOT_FOUND {
        let reason = if body.error_type.is_empty() {
            status.to_string()
        } else {
            body.error_type
        };
        return Probe::Infeasible(reason);
    }
    Probe::Error(format!("{status}: {text}"))
}

#[async_trait]
impl TradingApi for Gpv2Client {
    async fn quote(&self, request: &QuoteRequest) -> Probe<Quote> {
        let (sell_amount_before_fee, buy_amount_after_fee) = match request.kind {
            OrderKind::Sell => (Some(request.amount.to_string()), None),
            OrderKind::Buy => (None, Some(request.amount.to_string())),
        };
        let body = QuoteBody {
            sell_token: request.sell_token,
            buy_token: request.buy_token,
            from: request.from,
            valid_to: request.valid_to,
            app_data: request.app_data,
            partially_fillable: false,
            kind: request.kind,
            sell_amount_before_fee,
            buy_amount_after_fee,
        };

        let url = format!("{}/api/v1/quote", self.base_url);
        debug!(sell = ?request.sell_token, buy = ?request.buy_token, amount = %request.amount, "Requesting quote");
        let resp = self.http.post(&url).json(&body).send().await;

        Self::probe_response::<QuoteResponse>(resp).await.map(|r| Quote {
            sell_amount: r.quote.sell_amount,
            buy_amount: r.quote.buy_amount,
            fee_amount: r.quote.fee_amount,
            valid_to: r.quote.valid_to,
        })
    }

    async fn estimate_trade_amount(
        &self,
        sell_token: Address,
        buy_token: Address,
        amount: U256,
        kind: OrderKind,
    ) -> Probe<U256> {
        let url = format!(
            "{}/api/v1/markets/{:?}-{:?}/{}/{}",
            self.base_url, sell_token, buy_token, kind, amount
        );
        let resp = self.http.get(&url).send().await;
        Self::probe_response::<AmountEstimate>(resp).await.map(|r| r.amount)
    }

    async fn place_order(&self, order: &SignedOrder, from: Address) -> Result<OrderUid> {
        let url = format!("{}/api/v1/orders", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&OrderCreation::new(order, from))
            .send()
            .await
            .context("Order placement request failed")?;

        if !resp.status().is_success() {
            return Err(Self::api_error(resp).await.into());
        }

        let uid: String = resp.json().await.context("Failed to parse order uid")?;
        uid.parse::<OrderUid>()
            .with_context(|| format!("API returned an invalid order uid: {uid}"))
    }

    async fn executed_sell_amount(&self, uid: &OrderUid) -> Result<U256> {
        let url = format!("{}/api/v1/orders/{uid}", self.base_url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("Order status request failed")?;

        if !resp.status().is_success() {
            return Err(Self::api_error(resp).await.into());
        }

        let status: OrderStatus = resp.json().await.context("Failed to parse order status")?;
        Ok(status.executed_sell_amount)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
