//! GPv2 order hashing and ECDSA signing.
//!
//! The order digest is the EIP-712 typed-data hash under the
//! "Gnosis Protocol" v2 domain of the settlement contract. `eip712`
//! signs that digest directly; `ethsign` signs it wrapped in the
//! `personal_sign` prefix. Both produce a 65-byte `r || s || v`
//! signature with `v` in {27, 28}.

use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, H256, U256};
use ethers::utils::{hash_message, keccak256};

use crate::chain::ChainContext;
use crate::types::{Order, OrderSignature, OrderUid, SigningScheme, TraderError};

const DOMAIN_TYPE: &[u8] =
    b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";
const DOMAIN_NAME: &[u8] = b"Gnosis Protocol";
const DOMAIN_VERSION: &[u8] = b"v2";

const ORDER_TYPE: &[u8] = b"Order(address sellToken,address buyToken,address receiver,uint256 sellAmount,uint256 buyAmount,uint32 validTo,bytes32 appData,uint256 feeAmount,string kind,bool partiallyFillable,string sellTokenBalance,string buyTokenBalance)";

/// Token balances are always plain ERC-20 transfers.
const BALANCE_ERC20: &[u8] = b"erc20";

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

fn address_word(address: Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

fn u256_word(value: U256) -> [u8; 32] {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    word
}

fn u64_word(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

/// EIP-712 domain separator for the settlement contract on this chain.
pub fn domain_separator(ctx: &ChainContext) -> H256 {
    let mut buf = Vec::with_capacity(32 * 5);
    buf.extend_from_slice(&keccak256(DOMAIN_TYPE));
    buf.extend_from_slice(&keccak256(DOMAIN_NAME));
    buf.extend_from_slice(&keccak256(DOMAIN_VERSION));
    buf.extend_from_slice(&u64_word(ctx.chain_id()));
    buf.extend_from_slice(&address_word(ctx.settlement));
    H256(keccak256(&buf))
}

/// `hashStruct(order)`.
pub fn order_struct_hash(order: &Order) -> H256 {
    let mut buf = Vec::with_capacity(32 * 13);
    buf.extend_from_slice(&keccak256(ORDER_TYPE));
    buf.extend_from_slice(&address_word(order.sell_token));
    buf.extend_from_slice(&address_word(order.buy_token));
    buf.extend_from_slice(&address_word(order.receiver.unwrap_or_else(Address::zero)));
    buf.extend_from_slice(&u256_word(order.sell_amount));
    buf.extend_from_slice(&u256_word(order.buy_amount));
    buf.extend_from_slice(&u64_word(u64::from(order.valid_to)));
    buf.extend_from_slice(order.app_data.as_bytes());
    buf.extend_from_slice(&u256_word(order.fee_amount));
    buf.extend_from_slice(&keccak256(order.kind.as_str().as_bytes()));
    buf.extend_from_slice(&u64_word(u64::from(order.partially_fillable)));
    buf.extend_from_slice(&keccak256(BALANCE_ERC20));
    buf.extend_from_slice(&keccak256(BALANCE_ERC20));
    H256(keccak256(&buf))
}

/// Typed-data digest `keccak256(0x1901 || domainSeparator || hashStruct(order))`.
pub fn order_digest(ctx: &ChainContext, order: &Order) -> H256 {
    let mut buf = Vec::with_capacity(2 + 32 + 32);
    buf.extend_from_slice(b"\x19\x01");
    buf.extend_from_slice(domain_separator(ctx).as_bytes());
    buf.extend_from_slice(order_struct_hash(order).as_bytes());
    H256(keccak256(&buf))
}

/// Order uid as the order book derives it: `digest || owner || validTo`.
pub fn order_uid(ctx: &ChainContext, order: &Order, owner: Address) -> OrderUid {
    let mut uid = Vec::with_capacity(56);
    uid.extend_from_slice(order_digest(ctx, order).as_bytes());
    uid.extend_from_slice(owner.as_bytes());
    uid.extend_from_slice(&order.valid_to.to_be_bytes());
    OrderUid(uid)
}

/// Application tag: keccak256 of a free-form identifier string.
pub fn app_data(tag: &str) -> H256 {
    H256(keccak256(tag.as_bytes()))
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

/// Hash that is actually signed for a given scheme.
pub fn signing_hash(ctx: &ChainContext, order: &Order, scheme: SigningScheme) -> H256 {
    let digest = order_digest(ctx, order);
    match scheme {
        SigningScheme::Eip712 => digest,
        SigningScheme::EthSign => hash_message(digest.as_bytes()),
    }
}

/// Sign `order` for the settlement contract in `ctx`.
pub fn sign_order(
    ctx: &ChainContext,
    order: &Order,
    wallet: &LocalWallet,
    scheme: SigningScheme,
) -> Result<OrderSignature, TraderError> {
    let hash = signing_hash(ctx, order, scheme);
    let signature = wallet
        .sign_hash(hash)
        .map_err(|e| TraderError::Signing(e.to_string()))?;
    Ok(OrderSignature {
        signer: wallet.address(),
        scheme,
        bytes: signature.to_vec(),
    })
}

/// Recover the signer of an order signature.
pub fn recover_signer(
    ctx: &ChainContext,
    order: &Order,
    signature: &OrderSignature,
) -> Result<Address, TraderError> {
    let sig = ethers::types::Signature::try_from(signature.bytes.as_slice())
        .map_err(|e| TraderError::Signing(e.to_string()))?;
    let hash = signing_hash(ctx, order, signature.scheme);
    sig.recover(hash)
        .map_err(|e| TraderError::Signing(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
