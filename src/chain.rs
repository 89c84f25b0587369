//! Supported networks and their contract deployments.
//!
//! A `ChainContext` is resolved once at startup from the configured chain
//! id and then passed by reference to every component that needs an
//! address. Nothing in here is global.

use ethers::types::Address;
use std::fmt;

use crate::types::TraderError;

// ---------------------------------------------------------------------------
// Deployments
// ---------------------------------------------------------------------------

/// GPv2Settlement is deployed at the same address on every supported chain.
const SETTLEMENT: &str = "0x9008D19f58AAbD9eD0D60971565AA8510560ab41";

/// GPv2VaultRelayer, the spender that needs the sell-token allowance.
const VAULT_RELAYER: &str = "0xC92E8bdf79f0507f65a392b0ab4667716BFE0110";

const UNISWAP_EXAMPLE_LIST: &str =
    "https://raw.githubusercontent.com/Uniswap/token-lists/master/test/schema/bigexample.tokenlist.json";
const HONEYSWAP_LIST: &str = "https://tokens.honeyswap.org/";

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Chain {
    Mainnet,
    Rinkeby,
    Xdai,
}

impl Chain {
    /// Map a numeric chain id onto a supported chain.
    pub fn from_id(chain_id: u64) -> Result<Self, TraderError> {
        match chain_id {
            1 => Ok(Chain::Mainnet),
            4 => Ok(Chain::Rinkeby),
            100 => Ok(Chain::Xdai),
            other => Err(TraderError::UnsupportedChain(other)),
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            Chain::Mainnet => 1,
            Chain::Rinkeby => 4,
            Chain::Xdai => 100,
        }
    }

    /// Network name as used in the API host name.
    pub fn name(&self) -> &'static str {
        match self {
            Chain::Mainnet => "mainnet",
            Chain::Rinkeby => "rinkeby",
            Chain::Xdai => "xdai",
        }
    }

    pub fn default_token_list(&self) -> &'static str {
        match self {
            Chain::Mainnet | Chain::Rinkeby => UNISWAP_EXAMPLE_LIST,
            Chain::Xdai => HONEYSWAP_LIST,
        }
    }

    /// Wrapped form of the chain's base currency (WETH / WXDAI).
    pub fn native_token(&self) -> Address {
        let address = match self {
            Chain::Mainnet => "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2",
            Chain::Rinkeby => "0xc778417E063141139Fce010982780140Aa0cD5Ab",
            Chain::Xdai => "0xe91D153E0b41518A2Ce8Dd3D7944Fa863463a97d",
        };
        parse_address(address)
    }

    pub fn default_api_url(&self) -> String {
        format!("https://protocol-{}.dev.gnosisdev.com", self.name())
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.id())
    }
}

fn parse_address(s: &str) -> Address {
    // Only called with the literals above.
    s.parse().unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Immutable per-run network configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainContext {
    pub chain: Chain,
    pub settlement: Address,
    pub vault_relayer: Address,
    pub native_token: Address,
}

impl ChainContext {
    pub fn new(chain: Chain) -> Self {
        Self {
            chain,
            settlement: parse_address(SETTLEMENT),
            vault_relayer: parse_address(VAULT_RELAYER),
            native_token: chain.native_token(),
        }
    }

    /// Resolve from a configured chain id. Fails before any network traffic
    /// when the id is not supported.
    pub fn from_chain_id(chain_id: u64) -> Result<Self, TraderError> {
        Chain::from_id(chain_id).map(Self::new)
    }

    pub fn chain_id(&self) -> u64 {
        self.chain.id()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
