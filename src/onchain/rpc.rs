//! JSON-RPC implementations of the on-chain collaborators.

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::prelude::{abigen, Http, LocalWallet, Middleware, Provider, SignerMiddleware};
use ethers::providers::FilterKind;
use ethers::signers::coins_bip39::English;
use ethers::signers::{MnemonicBuilder, Signer};
use ethers::types::{Address, Bytes, Filter, Log, H256, U256, U64};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{debug, info};

use super::{FilterId, SettlementEvents, TokenLedger};
use crate::config::WalletSecret;
use crate::types::TraderError;

abigen!(
    Erc20,
    r#"[
        function balanceOf(address owner) external view returns (uint256)
        function allowance(address owner, address spender) external view returns (uint256)
        function approve(address spender, uint256 amount) external returns (bool)
    ]"#
);

/// `Trade(address indexed owner, address sellToken, address buyToken,
/// uint256 sellAmount, uint256 buyAmount, uint256 feeAmount, bytes orderUid)`
const TRADE_EVENT: &str = "Trade(address,address,address,uint256,uint256,uint256,bytes)";

pub type RpcClient = SignerMiddleware<Provider<Http>, LocalWallet>;

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Build the signing RPC client for the trader account.
pub fn connect(rpc_url: &str, secret: &WalletSecret, chain_id: u64) -> Result<Arc<RpcClient>> {
    let provider = Provider::<Http>::try_from(rpc_url)
        .with_context(|| format!("Invalid RPC URL: {rpc_url}"))?;
    let wallet = wallet_from_secret(secret)?.with_chain_id(chain_id);
    Ok(Arc::new(SignerMiddleware::new(provider, wallet)))
}

pub fn wallet_from_secret(secret: &WalletSecret) -> Result<LocalWallet> {
    match secret {
        WalletSecret::PrivateKey(key) => wallet_from_key(key),
        WalletSecret::Mnemonic(phrase) => {
            let wallet = wallet_from_mnemonic(phrase)?;
            info!(address = ?wallet.address(), "Signing with mnemonic account 0");
            Ok(wallet)
        }
    }
}

pub fn wallet_from_key(private_key: &SecretString) -> Result<LocalWallet> {
    let raw = private_key.expose_secret();
    raw.trim()
        .trim_start_matches("0x")
        .parse::<LocalWallet>()
        .map_err(|_| TraderError::Config("private key is not a valid secp256k1 key".into()).into())
}

/// First account (`m/44'/60'/0'/0/0`) of a BIP-39 phrase.
pub fn wallet_from_mnemonic(phrase: &SecretString) -> Result<LocalWallet> {
    let invalid = |_| TraderError::Config("mnemonic is not a valid BIP-39 phrase".into());
    MnemonicBuilder::<English>::default()
        .phrase(phrase.expose_secret().trim())
        .index(0u32)
        .map_err(invalid)?
        .build()
        .map_err(|e| invalid(e).into())
}

/// Fail if the node is on a different chain than the configuration says.
pub async fn verify_chain_id(client: &RpcClient, configured: u64) -> Result<()> {
    let reported = client
        .get_chainid()
        .await
        .context("Failed to query chain id")?
        .as_u64();
    if reported != configured {
        return Err(TraderError::ChainMismatch { configured, reported }.into());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ERC-20
// ---------------------------------------------------------------------------

pub struct Erc20Ledger {
    client: Arc<RpcClient>,
}

impl Erc20Ledger {
    pub fn new(client: Arc<RpcClient>) -> Self {
        Self { client }
    }

    fn token(&self, address: Address) -> Erc20<RpcClient> {
        Erc20::new(address, self.client.clone())
    }
}

#[async_trait]
impl TokenLedger for Erc20Ledger {
    fn owner(&self) -> Address {
        self.client.address()
    }

    async fn balance_of(&self, token: Address) -> Result<U256> {
        self.token(token)
            .balance_of(self.owner())
            .call()
            .await
            .with_context(|| format!("balanceOf failed for {token:?}"))
    }

    async fn allowance(&self, token: Address, spender: Address) -> Result<U256> {
        self.token(token)
            .allowance(self.owner(), spender)
            .call()
            .await
            .with_context(|| format!("allowance failed for {token:?}"))
    }

    async fn approve(&self, token: Address, spender: Address, amount: U256) -> Result<()> {
        let contract = self.token(token);
        let call = contract.approve(spender, amount);
        let pending = call
            .send()
            .await
            .with_context(|| format!("approve submission failed for {token:?}"))?;
        let tx_hash = *pending;
        debug!(tx = ?tx_hash, token = ?token, "Approval sent");

        let receipt = pending
            .await
            .context("approve transaction was dropped")?
            .context("approve transaction has no receipt")?;
        if receipt.status != Some(U64::from(1)) {
            anyhow::bail!("approve transaction {tx_hash:?} reverted");
        }
        info!(tx = ?tx_hash, token = ?token, "Allowance granted");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Trade events
// ---------------------------------------------------------------------------

/// `Trade` log filter on the settlement contract, installed on the node
/// with `eth_newFilter` and polled with `eth_getFilterChanges`.
pub struct TradeLogFilter {
    provider: Provider<Http>,
    settlement: Address,
}

impl TradeLogFilter {
    pub fn new(provider: Provider<Http>, settlement: Address) -> Self {
        Self { provider, settlement }
    }

    fn filter(&self, owner: Address) -> Filter {
        Filter::new()
            .address(self.settlement)
            .event(TRADE_EVENT)
            .topic1(owner_topic(owner))
    }
}

/// Left-pad an address into an indexed topic word.
fn owner_topic(owner: Address) -> H256 {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(owner.as_bytes());
    H256(word)
}

#[async_trait]
impl SettlementEvents for TradeLogFilter {
    async fn open(&self, owner: Address) -> Result<FilterId> {
        let filter = self.filter(owner);
        let id = self
            .provider
            .new_filter(FilterKind::Logs(&filter))
            .await
            .context("eth_newFilter failed")?;
        debug!(filter_id = %id, owner = ?owner, "Trade log filter installed");
        Ok(FilterId(id))
    }

    async fn poll(&self, filter: FilterId) -> Result<Vec<Bytes>> {
        let logs: Vec<Log> = self
            .provider
            .get_filter_changes(filter.0)
            .await
            .context("eth_getFilterChanges failed")?;
        Ok(logs.into_iter().map(|log| log.data).collect())
    }

    async fn close(&self, filter: FilterId) -> Result<()> {
        let removed = self
            .provider
            .uninstall_filter(filter.0)
            .await
            .context("eth_uninstallFilter failed")?;
        debug!(filter_id = %filter.0, removed, "Trade log filter removed");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_topic_is_left_padded() {
        let owner = Address::repeat_byte(0xab);
        let topic = owner_topic(owner);
        assert_eq!(&topic.as_bytes()[..12], &[0u8; 12]);
        assert_eq!(&topic.as_bytes()[12..], owner.as_bytes());
    }

    #[test]
    fn test_trade_filter_topics() {
        let provider = Provider::<Http>::try_from("http://localhost:8545").unwrap();
        let settlement = Address::repeat_byte(0x90);
        let f = TradeLogFilter::new(provider, settlement).filter(Address::repeat_byte(1));
        let topic0 = ethers::utils::keccak256(TRADE_EVENT.as_bytes());
        assert_eq!(
            f.topics[0],
            Some(ethers::types::ValueOrArray::Value(Some(H256(topic0))))
        );
        assert!(f.topics[1].is_some());
    }

    #[test]
    fn test_filter_install_request_is_log_filter_on_settlement() {
        let provider = Provider::<Http>::try_from("http://localhost:8545").unwrap();
        let settlement = Address::repeat_byte(0x90);
        let f = TradeLogFilter::new(provider, settlement).filter(Address::repeat_byte(1));
        match FilterKind::Logs(&f) {
            FilterKind::Logs(inner) => assert_eq!(
                inner.address,
                Some(ethers::types::ValueOrArray::Value(settlement))
            ),
            _ => panic!("expected a log filter"),
        }
    }

    #[test]
    fn test_wallet_from_key_accepts_prefix() {
        let key = SecretString::new(
            "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318".into(),
        );
        let wallet = wallet_from_key(&key).unwrap();
        assert_eq!(
            wallet.address(),
            "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23".parse::<Address>().unwrap()
        );
        assert!(wallet_from_key(&SecretString::new("nope".into())).is_err());
    }

    #[test]
    fn test_mnemonic_derives_first_account() {
        let phrase = SecretString::new("test test test test test test test test test test test junk".into());
        let wallet = wallet_from_secret(&WalletSecret::Mnemonic(phrase)).unwrap();
        assert_eq!(
            wallet.address(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse::<Address>().unwrap()
        );
        assert!(wallet_from_mnemonic(&SecretString::new("not a real phrase".into())).is_err());
    }
}
