//! Configuration loading from TOML, command-line overrides and
//! environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (RPC URL, private key or mnemonic) are referenced by env-var
//! name in the config and resolved at runtime.

use anyhow::{Context, Result};
use clap::Parser;
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::chain::ChainContext;
use crate::engine::order_builder::OrderParams;
use crate::engine::selector::SelectionConfig;
use crate::engine::trader::TradeSettings;
use crate::signing::app_data;
use crate::types::TraderError;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub network: NetworkConfig,
    #[serde(default)]
    pub trade: TradeConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    /// Informational; `chain_id` is what selects the deployment.
    #[serde(default)]
    pub name: Option<String>,
    pub chain_id: u64,
    #[serde(default = "default_rpc_url_env")]
    pub rpc_url_env: String,
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
    /// Consulted only when the private key variable is unset.
    #[serde(default = "default_mnemonic_env")]
    pub mnemonic_env: String,
}

/// Where the trader's signing key comes from.
#[derive(Debug, Clone)]
pub enum WalletSecret {
    PrivateKey(SecretString),
    /// BIP-39 phrase; the first account (index 0) is used.
    Mnemonic(SecretString),
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TradeConfig {
    pub acceptable_slippage_bps: u32,
    pub max_slippage_bps: u32,
    /// Buffer off the quoted buy amount.
    pub order_slippage_bps: u32,
    pub validity_secs: u32,
    pub settlement_timeout_secs: u64,
    pub event_poll_interval_ms: u64,
    /// Free-form tag, keccak256-hashed into every order's `appData`.
    pub app_data: String,
    pub token_list_url: Option<String>,
    pub api_url: Option<String>,
}

impl Default for TradeConfig {
    fn default() -> Self {
        Self {
            acceptable_slippage_bps: 100,
            max_slippage_bps: 1000,
            order_slippage_bps: 50,
            validity_secs: 900,
            settlement_timeout_secs: 300,
            event_poll_interval_ms: 2000,
            app_data: "GPv2 Trading Bot".to_string(),
            token_list_url: None,
            api_url: None,
        }
    }
}

fn default_rpc_url_env() -> String {
    "GPV2_RPC_URL".to_string()
}

fn default_private_key_env() -> String {
    "GPV2_PRIVATE_KEY".to_string()
}

fn default_mnemonic_env() -> String {
    "GPV2_MNEMONIC".to_string()
}

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

/// Make a single random trade on the GPv2 batch auction.
#[derive(Debug, Parser)]
#[command(name = "gpv2-trader", version, about)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "GPV2_TRADER_CONFIG", default_value = "config.toml")]
    pub config: String,

    /// Token list to pick tokens from (defaults to the chain's list).
    #[arg(long)]
    pub token_list_url: Option<String>,

    /// Order book API base URL (defaults to the chain's deployment).
    #[arg(long)]
    pub api_url: Option<String>,

    /// Slippage limit in bps for the diversified pass.
    #[arg(long)]
    pub acceptable_slippage_bps: Option<u32>,

    /// Slippage limit in bps for the native token fallback.
    #[arg(long)]
    pub max_slippage_bps: Option<u32>,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Command-line values win over the file.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(url) = &cli.token_list_url {
            self.trade.token_list_url = Some(url.clone());
        }
        if let Some(url) = &cli.api_url {
            self.trade.api_url = Some(url.clone());
        }
        if let Some(bps) = cli.acceptable_slippage_bps {
            self.trade.acceptable_slippage_bps = bps;
        }
        if let Some(bps) = cli.max_slippage_bps {
            self.trade.max_slippage_bps = bps;
        }
    }

    /// Resolve the configured chain. Fails for unsupported ids.
    pub fn chain_context(&self) -> Result<ChainContext, TraderError> {
        ChainContext::from_chain_id(self.network.chain_id)
    }

    pub fn token_list_url(&self, ctx: &ChainContext) -> String {
        self.trade
            .token_list_url
            .clone()
            .unwrap_or_else(|| ctx.chain.default_token_list().to_string())
    }

    pub fn api_url(&self, ctx: &ChainContext) -> String {
        self.trade
            .api_url
            .clone()
            .unwrap_or_else(|| ctx.chain.default_api_url())
    }

    pub fn trade_settings(&self) -> Result<TradeSettings, TraderError> {
        let t = &self.trade;
        if t.acceptable_slippage_bps > t.max_slippage_bps {
            return Err(TraderError::Config(format!(
                "acceptable_slippage_bps ({}) exceeds max_slippage_bps ({})",
                t.acceptable_slippage_bps, t.max_slippage_bps
            )));
        }
        if t.order_slippage_bps > 10_000 {
            return Err(TraderError::Config(format!(
                "order_slippage_bps ({}) above 100%",
                t.order_slippage_bps
            )));
        }

        Ok(TradeSettings {
            selection: SelectionConfig {
                acceptable_slippage_bps: t.acceptable_slippage_bps,
                max_slippage_bps: t.max_slippage_bps,
            },
            order: OrderParams {
                slippage_bps: t.order_slippage_bps,
                validity_secs: t.validity_secs,
                app_data: app_data(&t.app_data),
            },
            settlement_timeout: Duration::from_secs(t.settlement_timeout_secs),
            event_poll_interval: Duration::from_millis(t.event_poll_interval_ms),
        })
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    pub fn rpc_url(&self) -> Result<String> {
        Self::resolve_env(&self.network.rpc_url_env)
    }

    /// The private key when set, otherwise the mnemonic.
    pub fn wallet_secret(&self) -> Result<WalletSecret> {
        let non_empty = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        let network = &self.network;

        if let Some(key) = non_empty(&network.private_key_env) {
            return Ok(WalletSecret::PrivateKey(SecretString::new(key)));
        }
        if let Some(phrase) = non_empty(&network.mnemonic_env) {
            return Ok(WalletSecret::Mnemonic(SecretString::new(phrase)));
        }
        Err(TraderError::Config(format!(
            "no signing key: set {} or {}",
            network.private_key_env, network.mnemonic_env
        ))
        .into())
    }
}
