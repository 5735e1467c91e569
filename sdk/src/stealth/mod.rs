//! Deterministic stealth key tree seeded by a single wallet signature.
//!
//! ```text
//! signature ──HKDF──► spending root b ─────────────────────────┐
//!           └─HKDF──► viewing root ──HKDF(index 0)──► node v   │
//!                                                     │        ▼
//!          nonce, chain id ──HKDF(v, …)──► ephemeral e ──► E = eG ──► b + H(bE)
//! ```
//!
//! Nothing here is persisted. The same wallet, message, nonce and chain id always reproduce
//! the same key, which is what lets a recipient recover funds without stored state.

mod key_shape;
mod keys;
mod message;

pub use key_shape::{decode_private_key, KeyDecodeError, PrivateKey, RawKeyShape};
pub use keys::{
    address_of_point, ephemeral_private_key, spending_private_key, stealth_public_key, KeyTree,
    MetaAddress, StealthKey, VIEWING_NODE_INDEX,
};
pub use message::{DerivationMessage, DERIVATION_MESSAGE_PREFIX};

use orchestration_primitives::Address;

use crate::errors::SdkError;
use crate::signer::Signer;

/// Asks `signer` to sign `message` once and derives one stealth key per nonce.
pub async fn derive_stealth_keys<S: Signer>(
    nonces: &[u64],
    signer: &S,
    chain_id: u64,
    message: &DerivationMessage,
) -> Result<Vec<StealthKey>, SdkError> {
    let tree = key_tree(signer, message).await?;
    let keys = nonces
        .iter()
        .map(|nonce| tree.derive(*nonce, chain_id))
        .collect::<Result<Vec<_>, _>>()?;
    tracing::debug!(chain_id, count = keys.len(), "derived stealth keys");
    Ok(keys)
}

/// One entry per nonce of [`derive_stealth_addresses`]: what a sender needs to pay a stealth
/// address and announce it, without any private key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StealthAddressInfo {
    pub nonce: u64,
    pub address: Address,
    pub ephemeral_public_key: String,
}

pub async fn derive_stealth_addresses<S: Signer>(
    nonces: &[u64],
    signer: &S,
    chain_id: u64,
    message: &DerivationMessage,
) -> Result<Vec<StealthAddressInfo>, SdkError> {
    let keys = derive_stealth_keys(nonces, signer, chain_id, message).await?;
    Ok(keys
        .into_iter()
        .map(|key| StealthAddressInfo {
            nonce: key.nonce,
            address: key.address,
            ephemeral_public_key: key.ephemeral_public_key_hex(),
        })
        .collect())
}

/// Like [`derive_stealth_keys`], for callers that also need the public meta-address.
pub async fn key_tree<S: Signer>(
    signer: &S,
    message: &DerivationMessage,
) -> Result<KeyTree, SdkError> {
    if signer.address().is_none() {
        return Err(SdkError::Configuration(
            "no signer account is connected".to_string(),
        ));
    }
    let signature = signer
        .sign_message(message.as_bytes())
        .await
        .map_err(SdkError::Authentication)?;
    Ok(KeyTree::from_signature(&signature))
}
