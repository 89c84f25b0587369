//! Balance scanner.
//!
//! Reads the trader's balance of every token in the universe concurrently
//! and keeps the ones that are non-zero. These are the possible sell
//! tokens.

use anyhow::{Context, Result};
use ethers::types::{Address, U256};
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::onchain::TokenLedger;
use crate::types::{Asset, HeldAsset};

/// Query all balances at once and return the assets that are held.
///
/// A token whose balance call fails (broken or non-ERC-20 list entry) is
/// logged and treated as not held.
pub async fn scan_balances(ledger: &dyn TokenLedger, universe: &[Asset]) -> Vec<HeldAsset> {
    let reads = universe.iter().map(|asset| async move {
        let balance = ledger.balance_of(asset.address).await;
        (asset, balance)
    });

    let mut held = Vec::new();
    for (asset, balance) in join_all(reads).await {
        match balance {
            Ok(balance) if balance.is_zero() => {}
            Ok(balance) => {
                debug!(token = %asset, balance = %asset.format_amount(balance), "Holding");
                held.push(HeldAsset {
                    asset: asset.clone(),
                    balance,
                });
            }
            Err(e) => {
                warn!(token = %asset, error = %e, "Balance read failed, skipping token");
            }
        }
    }

    info!(
        tokens = universe.len(),
        held = held.len(),
        "Balance scan complete"
    );
    held
}

/// Fresh single-token balance read.
pub async fn read_balance(ledger: &dyn TokenLedger, token: Address) -> Result<U256> {
    ledger
        .balance_of(token)
        .await
        .with_context(|| format!("Failed to read balance of {token:?}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
