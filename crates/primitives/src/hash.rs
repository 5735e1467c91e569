use alloc::string::String;
use alloy_primitives::{B256, keccak256};
use core::fmt;
use core::marker::PhantomData;
use core::str::FromStr;
use derive_more::{AsRef, Deref, Into};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::ParseHexError;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deref, AsRef, Into)]
pub struct Hash32<T> {
    #[deref]
    #[as_ref]
    #[into]
    bytes: [u8; 32],
    #[into(skip)]
    _marker: PhantomData<T>,
}

impl<T> From<[u8; 32]> for Hash32<T> {
    fn from(bytes: [u8; 32]) -> Self {
        Self {
            bytes,
            _marker: PhantomData,
        }
    }
}

impl<T> From<B256> for Hash32<T> {
    fn from(word: B256) -> Self {
        Self::from(word.0)
    }
}

impl<T> From<Hash32<T>> for B256 {
    fn from(hash: Hash32<T>) -> Self {
        B256::new(hash.bytes)
    }
}

impl<T> Hash32<T> {
    /// keccak256 of `data`, the hash used for every commitment on EVM chains.
    pub fn keccak(data: impl AsRef<[u8]>) -> Self {
        Self::from(keccak256(data))
    }

    /// Converts the hash to a hexadecimal string representation, without `0x` prefix.
    pub fn as_hex(&self) -> String {
        hex::encode(self.as_ref())
    }

    pub fn to_prefixed_hex(&self) -> String {
        alloc::format!("0x{}", self.as_hex())
    }

    pub fn into_bytes(self) -> [u8; 32] {
        self.bytes
    }

    pub fn to_b256(&self) -> B256 {
        B256::new(self.bytes)
    }
}

impl<T> fmt::Display for Hash32<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.as_hex())
    }
}

impl<T> FromStr for Hash32<T> {
    type Err = ParseHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = crate::decode_fixed_hex::<32>(s)?;
        Ok(Self::from(bytes))
    }
}

impl<T> Serialize for Hash32<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_prefixed_hex())
    }
}

impl<'de, T> Deserialize<'de> for Hash32<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HashVisitor<T>(PhantomData<T>);

        impl<T> Visitor<'_> for HashVisitor<T> {
            type Value = Hash32<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a 32 byte hex string, optionally 0x prefixed")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(HashVisitor(PhantomData))
    }
}

// Marker types
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Request;
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Transaction;
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Authorization;
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Module;

/// Identifier of an orchestration request. The backend assigns the
/// authoritative value; clients derive a provisional one from a hash of the
/// funding intent and a random salt.
pub type RequestId = Hash32<Request>;

/// Hash of an EVM transaction.
pub type TransactionHash = Hash32<Transaction>;

/// Random 32 byte nonce of an EIP-3009 authorization. The token contract
/// rejects a nonce it has already seen for the same authorizer.
pub type AuthorizationNonce = Hash32<Authorization>;

/// keccak256 of the ABI encoded configuration of an account module.
pub type ModuleCommitment = Hash32<Module>;
