use alloy::primitives::{eip191_hash_message, B256, U256};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use orchestration_primitives::Address;
use std::fmt;
use std::future::Future;
use thiserror::Error;

use crate::errors::DynError;
use crate::stealth::{address_of_point, decode_private_key, KeyDecodeError, PrivateKey, RawKeyShape};

#[cfg(test)]
use mockall::automock;

pub const SIGNATURE_LENGTH: usize = 65;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("the signature request was rejected: {0}")]
    Rejected(String),
    #[error("the signer backend failed")]
    Backend(#[source] DynError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("expected a {SIGNATURE_LENGTH} byte signature, got {0} bytes")]
    InvalidLength(usize),
    #[error("recovery id {0} is not one of 0, 1, 27 or 28")]
    InvalidRecoveryId(u8),
    #[error("signature does not recover to a public key")]
    Unrecoverable,
}

/// A recoverable secp256k1 signature in Ethereum's `r || s || v` layout.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    /// Always normalized to 27 or 28.
    pub v: u8,
}

impl Signature {
    /// Splits a 65 byte `r || s || v` signature. Wallets report `v` either as a raw recovery id
    /// (0/1) or in the legacy 27/28 form; both are accepted.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        if bytes.len() != SIGNATURE_LENGTH {
            return Err(SignatureError::InvalidLength(bytes.len()));
        }
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        let v = match bytes[64] {
            0 | 1 => bytes[64] + 27,
            27 | 28 => bytes[64],
            other => return Err(SignatureError::InvalidRecoveryId(other)),
        };
        Ok(Self { r, s, v })
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        let mut out = [0u8; SIGNATURE_LENGTH];
        out[..32].copy_from_slice(&self.r);
        out[32..64].copy_from_slice(&self.s);
        out[64] = self.v;
        out
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }

    /// Recovers the address that produced this signature over `digest`.
    pub fn recover_address(&self, digest: &B256) -> Result<Address, SignatureError> {
        let mut rs = [0u8; 64];
        rs[..32].copy_from_slice(&self.r);
        rs[32..].copy_from_slice(&self.s);
        let signature =
            EcdsaSignature::from_slice(&rs).map_err(|_| SignatureError::Unrecoverable)?;
        let recovery_id = self
            .v
            .checked_sub(27)
            .and_then(RecoveryId::from_byte)
            .ok_or(SignatureError::InvalidRecoveryId(self.v))?;
        let key = VerifyingKey::recover_from_prehash(digest.as_slice(), &signature, recovery_id)
            .map_err(|_| SignatureError::Unrecoverable)?;
        Ok(address_of(&key))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

impl From<Signature> for alloy::primitives::Signature {
    fn from(signature: Signature) -> Self {
        alloy::primitives::Signature::new(
            U256::from_be_bytes(signature.r),
            U256::from_be_bytes(signature.s),
            signature.v == 28,
        )
    }
}

/// EIP-191 `personal_sign` digest of `message`.
pub fn personal_message_digest(message: &[u8]) -> B256 {
    eip191_hash_message(message)
}

pub fn address_of(key: &VerifyingKey) -> Address {
    address_of_point(key.as_affine())
}

/// Anything that can produce Ethereum signatures on behalf of an account: a browser wallet
/// bridge, a remote signer, or a local key.
#[cfg_attr(test, automock)]
pub trait Signer: Send + Sync {
    /// The signing account, if one is connected.
    fn address(&self) -> Option<Address>;

    /// EIP-191 personal signature over `message`.
    fn sign_message(
        &self,
        message: &[u8],
    ) -> impl Future<Output = Result<Signature, SignerError>> + Send;

    /// Signature over an already computed digest, e.g. an EIP-712 hash or a transaction's
    /// signing hash.
    fn sign_hash(
        &self,
        digest: B256,
    ) -> impl Future<Output = Result<Signature, SignerError>> + Send;
}

/// Signs with an in-memory secp256k1 key.
#[derive(Clone)]
pub struct LocalSigner {
    key: SigningKey,
    address: Address,
}

impl LocalSigner {
    pub fn new(private_key: &PrivateKey) -> Result<Self, KeyDecodeError> {
        let key = SigningKey::from_slice(private_key.as_bytes())
            .map_err(|_| KeyDecodeError::OutOfRange)?;
        let address = address_of(key.verifying_key());
        Ok(Self { key, address })
    }

    pub fn from_raw(raw: RawKeyShape) -> Result<Self, KeyDecodeError> {
        Self::new(&decode_private_key(raw)?)
    }

    fn sign_digest(&self, digest: &B256) -> Result<Signature, SignerError> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(digest.as_slice())
            .map_err(|err| SignerError::Backend(Box::new(err)))?;
        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Ok(Signature {
            r,
            s,
            v: 27 + recovery_id.to_byte(),
        })
    }
}

impl fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl Signer for LocalSigner {
    fn address(&self) -> Option<Address> {
        Some(self.address)
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Signature, SignerError> {
        self.sign_digest(&personal_message_digest(message))
    }

    async fn sign_hash(&self, digest: B256) -> Result<Signature, SignerError> {
        self.sign_digest(&digest)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use hex_literal::hex;
    use orchestration_primitives::address;

    /// Well known development key (first hardhat/anvil account).
    pub(crate) const TEST_KEY: [u8; 32] =
        hex!("ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80");

    pub(crate) fn test_signer() -> LocalSigner {
        LocalSigner::from_raw(RawKeyShape::Bytes(TEST_KEY.to_vec())).unwrap()
    }

    #[test]
    fn test_local_signer_address() {
        assert_eq!(
            test_signer().address(),
            Some(address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266"))
        );
    }

    #[test]
    fn test_personal_digest_matches_eip191_layout() {
        let mut prefixed = b"\x19Ethereum Signed Message:\n5".to_vec();
        prefixed.extend_from_slice(b"hello");
        assert_eq!(personal_message_digest(b"hello"), alloy::primitives::keccak256(prefixed));
    }

    #[tokio::test]
    async fn test_personal_signature_recovers_to_signer() {
        let signer = test_signer();
        let message = b"hello orchestration";
        let signature = signer.sign_message(message).await.unwrap();

        let recovered = signature
            .recover_address(&personal_message_digest(message))
            .unwrap();
        assert_eq!(Some(recovered), signer.address());
        assert!(signature.v == 27 || signature.v == 28);
    }

    #[tokio::test]
    async fn test_signing_is_deterministic() {
        let signer = test_signer();
        let first = signer.sign_message(b"same").await.unwrap();
        let second = signer.sign_message(b"same").await.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_signature_bytes_roundtrip_normalizes_v() {
        let mut raw = [7u8; 65];
        raw[64] = 1;
        let signature = Signature::from_bytes(&raw).unwrap();
        assert_eq!(signature.v, 28);
        assert_eq!(&signature.to_bytes()[..64], &raw[..64]);
    }

    #[tokio::test]
    async fn test_alloy_signature_recovers_to_the_same_account() {
        let signer = test_signer();
        let digest = personal_message_digest(b"fund deposit");
        let signature = signer.sign_hash(digest).await.unwrap();

        let converted = alloy::primitives::Signature::from(signature);
        assert_eq!(converted.v(), signature.v == 28);
        assert_eq!(
            converted.recover_address_from_prehash(&digest).ok(),
            signer.address()
        );
    }

    #[test]
    fn test_signature_rejects_bad_input() {
        assert_matches!(
            Signature::from_bytes(&[0u8; 64]),
            Err(SignatureError::InvalidLength(64))
        );
        let mut raw = [0u8; 65];
        raw[64] = 5;
        assert_matches!(
            Signature::from_bytes(&raw),
            Err(SignatureError::InvalidRecoveryId(5))
        );
    }
}
