//! Token list retrieval.
//!
//! Fetches a Uniswap-format token list and keeps the entries for the
//! active chain. The list is the candidate universe for both sides of
//! the trade.

use anyhow::{Context, Result};
use ethers::types::Address;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::types::Asset;

/// Entries stay raw so one bad token does not reject the whole list.
#[derive(Debug, Deserialize)]
struct TokenList {
    tokens: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenListEntry {
    address: Address,
    name: String,
    #[serde(default)]
    symbol: String,
    decimals: u8,
    chain_id: u64,
}

impl From<TokenListEntry> for Asset {
    fn from(entry: TokenListEntry) -> Self {
        Asset {
            address: entry.address,
            name: entry.name,
            symbol: entry.symbol,
            decimals: entry.decimals,
            chain_id: entry.chain_id,
        }
    }
}

/// Parse a token list document and keep the tokens on `chain_id`.
/// Malformed entries are logged and skipped.
pub fn parse_token_list(body: &str, chain_id: u64) -> Result<Vec<Asset>> {
    let list: TokenList =
        serde_json::from_str(body).context("Failed to parse token list")?;
    let total = list.tokens.len();

    let mut seen = HashSet::new();
    let mut tokens = Vec::new();
    for (index, raw) in list.tokens.into_iter().enumerate() {
        let entry = match serde_json::from_value::<TokenListEntry>(raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(index, error = %e, "Skipping malformed token list entry");
                continue;
            }
        };
        // Lists occasionally repeat an address under two names.
        if entry.chain_id == chain_id && seen.insert(entry.address) {
            tokens.push(Asset::from(entry));
        }
    }
    debug!(total, kept = tokens.len(), chain_id, "Token list filtered");
    Ok(tokens)
}

/// Download the token list at `url` and filter it to `chain_id`.
pub async fn fetch_token_list(http: &Client, url: &str, chain_id: u64) -> Result<Vec<Asset>> {
    let resp = http
        .get(url)
        .send()
        .await
        .with_context(|| format!("Token list request failed: {url}"))?;

    if !resp.status().is_success() {
        let status = resp.status();
        anyhow::bail!("Token list fetch error {status}: {url}");
    }

    let body = resp.text().await.context("Failed to read token list body")?;
    let tokens = parse_token_list(&body, chain_id)?;
    info!(count = tokens.len(), url, "Token list loaded");
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
