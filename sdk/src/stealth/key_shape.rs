use k256::elliptic_curve::PrimeField;
use k256::{FieldBytes, Scalar};
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

const PRIVATE_KEY_LENGTH: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyDecodeError {
    #[error("expected {PRIVATE_KEY_LENGTH} key bytes, got {0}")]
    InvalidLength(usize),
    #[error("key is not valid hex")]
    InvalidHex,
    #[error("key is zero or not below the secp256k1 group order")]
    OutOfRange,
    #[error("wrapped key nests more than one level deep")]
    NestedTooDeep,
}

/// Raw private key material as it arrives from a wallet, a keystore export, or a derivation
/// step. [`decode_private_key`] is the single place that turns any of these into a
/// [`PrivateKey`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RawKeyShape {
    Bytes(Vec<u8>),
    HexString(String),
    /// An object carrying the key in a `privateKey` field.
    Wrapped { private_key: Box<RawKeyShape> },
}

/// A canonical 32 byte secp256k1 private key, guaranteed to be a valid non-zero scalar.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey([u8; PRIVATE_KEY_LENGTH]);

impl PrivateKey {
    pub fn as_bytes(&self) -> &[u8; PRIVATE_KEY_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub(crate) fn from_scalar(scalar: &Scalar) -> Result<Self, KeyDecodeError> {
        decode_private_key(RawKeyShape::Bytes(scalar.to_bytes().to_vec()))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

pub fn decode_private_key(raw: RawKeyShape) -> Result<PrivateKey, KeyDecodeError> {
    let bytes = match raw {
        RawKeyShape::Bytes(bytes) => bytes,
        RawKeyShape::HexString(text) => decode_hex(&text)?,
        RawKeyShape::Wrapped { private_key } => match *private_key {
            RawKeyShape::Bytes(bytes) => bytes,
            RawKeyShape::HexString(text) => decode_hex(&text)?,
            RawKeyShape::Wrapped { .. } => return Err(KeyDecodeError::NestedTooDeep),
        },
    };

    let bytes: [u8; PRIVATE_KEY_LENGTH] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| KeyDecodeError::InvalidLength(bytes.len()))?;
    let scalar: Option<Scalar> = Scalar::from_repr(FieldBytes::from(bytes)).into();
    match scalar {
        Some(scalar) if !bool::from(scalar.is_zero()) => Ok(PrivateKey(bytes)),
        _ => Err(KeyDecodeError::OutOfRange),
    }
}

fn decode_hex(text: &str) -> Result<Vec<u8>, KeyDecodeError> {
    let trimmed = text.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    hex::decode(digits).map_err(|_| KeyDecodeError::InvalidHex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const KEY_HEX: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn key_bytes() -> Vec<u8> {
        hex::decode(KEY_HEX).unwrap()
    }

    #[rstest]
    #[case::bytes(RawKeyShape::Bytes(key_bytes()))]
    #[case::hex(RawKeyShape::HexString(KEY_HEX.to_string()))]
    #[case::prefixed_hex(RawKeyShape::HexString(format!("0x{KEY_HEX}")))]
    #[case::wrapped_bytes(RawKeyShape::Wrapped { private_key: Box::new(RawKeyShape::Bytes(key_bytes())) })]
    #[case::wrapped_hex(RawKeyShape::Wrapped { private_key: Box::new(RawKeyShape::HexString(KEY_HEX.to_string())) })]
    fn test_all_shapes_decode_to_the_same_key(#[case] raw: RawKeyShape) {
        let key = decode_private_key(raw).unwrap();
        assert_eq!(key.as_bytes().as_slice(), key_bytes().as_slice());
    }

    #[rstest]
    #[case::short(RawKeyShape::Bytes(vec![1; 31]), KeyDecodeError::InvalidLength(31))]
    #[case::long(RawKeyShape::HexString("ab".repeat(33)), KeyDecodeError::InvalidLength(33))]
    #[case::not_hex(RawKeyShape::HexString("zz".repeat(32)), KeyDecodeError::InvalidHex)]
    #[case::zero(RawKeyShape::Bytes(vec![0; 32]), KeyDecodeError::OutOfRange)]
    #[case::above_order(RawKeyShape::Bytes(vec![0xff; 32]), KeyDecodeError::OutOfRange)]
    #[case::nested(
        RawKeyShape::Wrapped { private_key: Box::new(RawKeyShape::Wrapped { private_key: Box::new(RawKeyShape::Bytes(key_bytes())) }) },
        KeyDecodeError::NestedTooDeep
    )]
    fn test_uncoercible_shapes_fail(#[case] raw: RawKeyShape, #[case] expected: KeyDecodeError) {
        assert_eq!(decode_private_key(raw), Err(expected));
    }

    #[test]
    fn test_wrapped_shape_deserializes_from_json() {
        let json = format!(r#"{{"wrapped":{{"privateKey":{{"hexString":"0x{KEY_HEX}"}}}}}}"#);
        let raw: RawKeyShape = serde_json::from_str(&json).unwrap();
        assert!(decode_private_key(raw).is_ok());
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let key = decode_private_key(RawKeyShape::HexString(KEY_HEX.to_string())).unwrap();
        assert!(!format!("{key:?}").contains("ac0974"));
    }
}
