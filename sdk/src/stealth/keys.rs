use alloy::primitives::keccak256;
use hex_literal::hex;
use hkdf::Hkdf;
use k256::elliptic_curve::ops::Reduce;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::PrimeField;
use k256::{AffinePoint, FieldBytes, ProjectivePoint, Scalar, U256};
use orchestration_primitives::Address;
use sha3::Sha3_256;

use super::key_shape::{KeyDecodeError, PrivateKey};
use crate::signer::Signature;

pub trait ScalarExt: Sized {
    fn from_bytes(bytes: [u8; 32]) -> Option<Self>;
}

impl ScalarExt for Scalar {
    /// Returns nothing if the bytes are greater than the field size of Secp256k1.
    /// This will be very rare (probability around 1/2^224) with random bytes as the field size is
    /// 2^256 - 2^32 - 2^9 - 2^8 - 2^7 - 2^6 - 2^4 - 1
    fn from_bytes(bytes: [u8; 32]) -> Option<Self> {
        Scalar::from_repr(FieldBytes::from(bytes)).into_option()
    }
}

// The following salt is picked by hashing with sha256
// "orchestration-sdk stealth key tree 2024-09-02"
// Changing it changes every key tree ever derived.
const SALT: [u8; 32] = hex!("979dcb092dce656208f0293ec610090ab3bd1227ab0ab0e154ddb8c1cb0fabe4");

const SPENDING_ROOT_INFO: &[u8] = b"stealth/spending-root";
const VIEWING_ROOT_INFO: &[u8] = b"stealth/viewing-root";
const VIEWING_NODE_INFO: &[u8] = b"stealth/viewing-node";
const EPHEMERAL_INFO: &[u8] = b"stealth/ephemeral";

/// Only the first node below the viewing root is used today.
pub const VIEWING_NODE_INDEX: u32 = 0;

/// Expands `info` into a non-zero scalar.
/// If the output is zero or falls outside the field, a zero byte is appended to `info` and the
/// expansion repeated.
fn expand_scalar(hk: &Hkdf<Sha3_256>, info: &[u8]) -> Scalar {
    let mut info = info.to_vec();
    let mut scalar = Scalar::ZERO;
    while bool::from(scalar.is_zero()) {
        let mut okm = [0u8; 32];
        hk.expand(&info, &mut okm)
            .expect("32 bytes is a valid HKDF-SHA3-256 output length");
        scalar = Scalar::from_bytes(okm).unwrap_or(Scalar::ZERO);
        info.push(0);
    }
    scalar
}

/// Root of a stealth key tree. Lives only in memory; re-derive it from the wallet signature
/// whenever it is needed again.
pub struct KeyTree {
    spending_root: Scalar,
    viewing_root: Scalar,
}

impl KeyTree {
    /// Expands a wallet signature into the spending and viewing roots. Only `r || s` feed the
    /// expansion so the same signature reported with `v` as 0/1 or 27/28 yields the same tree.
    pub fn from_signature(signature: &Signature) -> Self {
        let mut ikm = [0u8; 64];
        ikm[..32].copy_from_slice(&signature.r);
        ikm[32..].copy_from_slice(&signature.s);

        let hk = Hkdf::<Sha3_256>::new(Some(&SALT), &ikm);
        Self {
            spending_root: expand_scalar(&hk, SPENDING_ROOT_INFO),
            viewing_root: expand_scalar(&hk, VIEWING_ROOT_INFO),
        }
    }

    pub fn viewing_node(&self, index: u32) -> Scalar {
        let hk = Hkdf::<Sha3_256>::new(Some(&SALT), &self.viewing_root.to_bytes());
        let mut info = VIEWING_NODE_INFO.to_vec();
        info.extend_from_slice(&index.to_be_bytes());
        expand_scalar(&hk, &info)
    }

    pub fn meta_address(&self) -> MetaAddress {
        MetaAddress {
            spending_public_key: (ProjectivePoint::GENERATOR * self.spending_root).to_affine(),
            viewing_public_key: (ProjectivePoint::GENERATOR
                * self.viewing_node(VIEWING_NODE_INDEX))
            .to_affine(),
        }
    }

    /// Derives the stealth key for one payment nonce on one chain.
    pub fn derive(&self, nonce: u64, chain_id: u64) -> Result<StealthKey, KeyDecodeError> {
        let viewing_node = self.viewing_node(VIEWING_NODE_INDEX);
        let ephemeral = ephemeral_private_key(&viewing_node, nonce, chain_id);
        let ephemeral_public_key = (ProjectivePoint::GENERATOR * ephemeral).to_affine();
        let spending = spending_private_key(&self.spending_root, &ephemeral_public_key);

        let private_key = PrivateKey::from_scalar(&spending)?;
        let address = address_of_point(&(ProjectivePoint::GENERATOR * spending).to_affine());

        Ok(StealthKey {
            nonce,
            chain_id,
            private_key,
            ephemeral_public_key,
            address,
        })
    }
}

/// `HKDF(viewing_node, "stealth/ephemeral" || nonce || chain_id)`.
pub fn ephemeral_private_key(viewing_node: &Scalar, nonce: u64, chain_id: u64) -> Scalar {
    let hk = Hkdf::<Sha3_256>::new(Some(&SALT), &viewing_node.to_bytes());
    let mut info = EPHEMERAL_INFO.to_vec();
    info.extend_from_slice(&nonce.to_be_bytes());
    info.extend_from_slice(&chain_id.to_be_bytes());
    expand_scalar(&hk, &info)
}

/// `b + keccak256(b * E) mod n`, where `b` is the spending root and `E` the ephemeral public key.
pub fn spending_private_key(spending_root: &Scalar, ephemeral_public_key: &AffinePoint) -> Scalar {
    let shared_secret = ProjectivePoint::from(*ephemeral_public_key) * spending_root;
    *spending_root + shared_secret_tweak(&shared_secret)
}

/// Sender side of the construction: `B + keccak256(e * B) * G`. Matches the public key of
/// [`spending_private_key`] for the same ephemeral key without knowing the spending root.
pub fn stealth_public_key(
    spending_public_key: &AffinePoint,
    ephemeral_private_key: &Scalar,
) -> AffinePoint {
    let spending_public_key = ProjectivePoint::from(*spending_public_key);
    let shared_secret = spending_public_key * ephemeral_private_key;
    (spending_public_key + ProjectivePoint::GENERATOR * shared_secret_tweak(&shared_secret))
        .to_affine()
}

fn shared_secret_tweak(shared_secret: &ProjectivePoint) -> Scalar {
    let encoded = shared_secret.to_affine().to_encoded_point(true);
    let hash = keccak256(encoded.as_bytes());
    <Scalar as Reduce<U256>>::reduce_bytes(&FieldBytes::from(hash.0))
}

pub fn address_of_point(point: &AffinePoint) -> Address {
    let encoded = point.to_encoded_point(false);
    Address::from_raw_public_key(&encoded.as_bytes()[1..])
}

/// Public half of a key tree, shareable with senders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaAddress {
    pub spending_public_key: AffinePoint,
    pub viewing_public_key: AffinePoint,
}

impl MetaAddress {
    /// `st:eth:0x<spending><viewing>` with both keys SEC1 compressed.
    pub fn encode(&self) -> String {
        let spending = self.spending_public_key.to_encoded_point(true);
        let viewing = self.viewing_public_key.to_encoded_point(true);
        format!(
            "st:eth:0x{}{}",
            hex::encode(spending.as_bytes()),
            hex::encode(viewing.as_bytes())
        )
    }
}

/// Key material for one stealth payment.
#[derive(Debug, Clone)]
pub struct StealthKey {
    pub nonce: u64,
    pub chain_id: u64,
    pub private_key: PrivateKey,
    /// Published alongside the payment so the recipient can find it again.
    pub ephemeral_public_key: AffinePoint,
    /// Owner of the predicted smart account, not a funding destination.
    pub address: Address,
}

impl StealthKey {
    pub fn ephemeral_public_key_hex(&self) -> String {
        format!(
            "0x{}",
            hex::encode(self.ephemeral_public_key.to_encoded_point(true).as_bytes())
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestration_primitives::address;
    use std::collections::HashSet;

    fn signature(seed: u8) -> Signature {
        Signature {
            r: [seed; 32],
            s: [seed.wrapping_add(1); 32],
            v: 27,
        }
    }

    #[test]
    fn test_same_inputs_give_same_key() {
        let first = KeyTree::from_signature(&signature(1)).derive(1, 8453).unwrap();
        let second = KeyTree::from_signature(&signature(1)).derive(1, 8453).unwrap();
        assert_eq!(first.private_key, second.private_key);
        assert_eq!(first.address, second.address);
    }

    #[test]
    fn test_derivation_matches_known_answer() {
        let key = KeyTree::from_signature(&Signature {
            r: [1; 32],
            s: [2; 32],
            v: 27,
        })
        .derive(1, 8453)
        .unwrap();

        assert_eq!(
            key.private_key.to_hex(),
            "0x73908c709b1d4e8b6af444ec62d8b51f4e89c6a8c21c5f6031219f95edbb9ca6"
        );
        assert_eq!(key.address, address!("bf4d71343eC6aCD3b006c5F609Cc5821d1C15282"));
        assert_eq!(
            key.ephemeral_public_key_hex(),
            "0x035347bc5b2165cf8feb173fa94d8a1ae0e5ed658b4d91ccf70d6eae361f5bce70"
        );
    }

    #[test]
    fn test_recovery_id_does_not_change_tree() {
        let mut other_v = signature(3);
        other_v.v = 28;
        let first = KeyTree::from_signature(&signature(3)).derive(5, 1).unwrap();
        let second = KeyTree::from_signature(&other_v).derive(5, 1).unwrap();
        assert_eq!(first.private_key, second.private_key);
    }

    #[test]
    fn test_nonce_chain_and_signature_all_matter() {
        let tree = KeyTree::from_signature(&signature(1));
        let base = tree.derive(1, 8453).unwrap();

        assert_ne!(base.private_key, tree.derive(2, 8453).unwrap().private_key);
        assert_ne!(base.private_key, tree.derive(1, 1).unwrap().private_key);
        assert_ne!(
            base.private_key,
            KeyTree::from_signature(&signature(2))
                .derive(1, 8453)
                .unwrap()
                .private_key
        );
    }

    #[test]
    fn test_sender_computes_the_same_stealth_address() {
        let tree = KeyTree::from_signature(&signature(9));
        let meta = tree.meta_address();
        let ephemeral = ephemeral_private_key(&tree.viewing_node(VIEWING_NODE_INDEX), 42, 10);

        let sender_view = stealth_public_key(&meta.spending_public_key, &ephemeral);
        let recipient_view = tree.derive(42, 10).unwrap();

        assert_eq!(address_of_point(&sender_view), recipient_view.address);
    }

    #[test]
    fn test_viewing_nodes_differ_per_index() {
        let tree = KeyTree::from_signature(&signature(4));
        assert_ne!(tree.viewing_node(0), tree.viewing_node(1));
        assert_ne!(tree.viewing_node(0), tree.viewing_root);
    }

    #[test]
    fn test_spending_keys_unique_across_sampled_nonces() {
        let tree = KeyTree::from_signature(&signature(5));
        let viewing_node = tree.viewing_node(VIEWING_NODE_INDEX);
        let spending_keys: HashSet<[u8; 32]> = (0..10_000u64)
            .map(|nonce| {
                let ephemeral = ephemeral_private_key(&viewing_node, nonce, 8453);
                let ephemeral_public_key = (ProjectivePoint::GENERATOR * ephemeral).to_affine();
                let spending = spending_private_key(&tree.spending_root, &ephemeral_public_key);
                let bytes: [u8; 32] = spending.to_bytes().into();
                bytes
            })
            .collect();
        assert_eq!(spending_keys.len(), 10_000);
    }

    #[test]
    fn test_meta_address_encoding() {
        let encoded = KeyTree::from_signature(&signature(6)).meta_address().encode();
        assert!(encoded.starts_with("st:eth:0x"));
        // two compressed keys of 33 bytes each
        assert_eq!(encoded.len(), "st:eth:0x".len() + 2 * 33 * 2);
    }
}
