//! gpv2-trader: make one random trade on the GPv2 batch auction.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! resolves the network, connects to the node and the order book, and
//! runs a single trade.

use anyhow::{Context, Result};
use clap::Parser;
use ethers::providers::Middleware;
use tracing::{error, info};

use gpv2_trader::api::gpv2::Gpv2Client;
use gpv2_trader::config::{AppConfig, Cli};
use gpv2_trader::engine::trader::Trader;
use gpv2_trader::onchain::rpc::{connect, verify_chain_id, Erc20Ledger, TradeLogFilter};
use gpv2_trader::random::SystemRandom;
use gpv2_trader::tokens::fetch_token_list;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    let mut cfg = AppConfig::load(&cli.config)?;
    cfg.apply_cli(&cli);

    init_logging();

    if let Err(e) = run(&cfg).await {
        error!(error = %format!("{e:#}"), "Trade failed");
        return Err(e);
    }
    Ok(())
}

async fn run(cfg: &AppConfig) -> Result<()> {
    // Fails on unknown networks before anything touches the network.
    let ctx = cfg.chain_context()?;
    let settings = cfg.trade_settings()?;
    info!(
        network = %ctx.chain,
        acceptable_slippage_bps = settings.selection.acceptable_slippage_bps,
        max_slippage_bps = settings.selection.max_slippage_bps,
        "gpv2-trader starting"
    );

    // -- Node ------------------------------------------------------------

    let rpc_url = cfg.rpc_url()?;
    let secret = cfg.wallet_secret()?;
    let client = connect(&rpc_url, &secret, ctx.chain_id())?;
    verify_chain_id(&client, ctx.chain_id()).await?;

    let ledger = Erc20Ledger::new(client.clone());
    let events = TradeLogFilter::new(client.inner().clone(), ctx.settlement);

    // -- Order book & tokens ---------------------------------------------

    let api = Gpv2Client::new(&cfg.api_url(&ctx))?;
    info!(api = %api.base_url(), "Using order book");

    let token_list_url = cfg.token_list_url(&ctx);
    let http = reqwest::Client::new();
    let universe = fetch_token_list(&http, &token_list_url, ctx.chain_id())
        .await
        .with_context(|| format!("Failed to load token list from {token_list_url}"))?;

    // -- Trade -----------------------------------------------------------

    let trader = Trader::new(&ctx, &api, &ledger, &events, client.signer(), settings);
    let report = trader.make_trade(&universe, &mut SystemRandom::new()).await?;

    info!(
        run_id = %report.run_id,
        uid = %report.uid,
        sell = %report.sell,
        buy = %report.buy,
        outcome = ?report.outcome,
        "Done"
    );
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("gpv2_trader=info"));

    let json_logging = std::env::var("GPV2_TRADER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
