#![no_std]

extern crate alloc;

pub mod hash;

pub use alloy_primitives::{Address, address};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseHexError {
    #[error("invalid hex encoding")]
    InvalidHex,
    #[error("expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },
}

/// Decodes an optionally `0x` prefixed hex string into exactly `N` bytes.
pub fn decode_fixed_hex<const N: usize>(s: &str) -> Result<[u8; N], ParseHexError> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(stripped).map_err(|_| ParseHexError::InvalidHex)?;
    let got = bytes.len();
    bytes
        .try_into()
        .map_err(|_| ParseHexError::InvalidLength { expected: N, got })
}
