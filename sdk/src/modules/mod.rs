//! Account modules installed on the destination smart account, and their on-chain encoding.
//!
//! A module never receives its configuration on chain. It receives a single `uint256` holding
//! `keccak256(abi.encode(chainId, token, target))`, and whoever executes the module must know
//! the full configuration to match it against that commitment.

mod client;

pub use client::{ModuleInfo, ModuleValidation, ModulesClient};

use alloy::primitives::U256;
use alloy::sol_types::SolValue;
use orchestration_primitives::hash::ModuleCommitment;
use orchestration_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::SdkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleKind {
    /// Deposits into an ERC-4626 vault; `target` is the vault.
    Erc4626Vault,
    /// Supplies to an Aave v3 pool; `target` is the pool.
    AaveV3Supply,
    /// Forwards funds; `target` is the recipient and a missing token means the native asset.
    Transfer,
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModuleKind::Erc4626Vault => "ERC4626_VAULT",
            ModuleKind::AaveV3Supply => "AAVE_V3_SUPPLY",
            ModuleKind::Transfer => "TRANSFER",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleConfig {
    pub kind: ModuleKind,
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default)]
    pub token: Option<Address>,
    #[serde(default)]
    pub target: Option<Address>,
}

/// A module ready to be sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedModule {
    pub module_type: ModuleKind,
    /// `0x` prefixed, a single ABI word.
    pub encoded_data: String,
    pub commitment: ModuleCommitment,
}

impl ModuleConfig {
    pub fn new(kind: ModuleKind, chain_id: u64, token: Option<Address>, target: Address) -> Self {
        Self {
            kind,
            chain_id: Some(chain_id),
            token,
            target: Some(target),
        }
    }

    /// Checks the fields `kind` requires. Runs before anything touches the network.
    pub fn validate(&self) -> Result<(), SdkError> {
        let mut missing = Vec::new();
        if self.chain_id.is_none() {
            missing.push("chainId");
        }
        if self.target.is_none() {
            missing.push("target");
        }
        if self.kind != ModuleKind::Transfer && self.token.is_none() {
            missing.push("token");
        }
        if !missing.is_empty() {
            return Err(SdkError::Validation(format!(
                "{} module is missing {}",
                self.kind,
                missing.join(", ")
            )));
        }
        if self.target.is_some_and(|target| target.is_zero()) {
            return Err(SdkError::Validation(format!(
                "{} module target must not be the zero address",
                self.kind
            )));
        }
        Ok(())
    }

    /// `keccak256(abi.encode(uint256 chainId, address token, address target))`.
    pub fn commitment(&self) -> Result<ModuleCommitment, SdkError> {
        self.validate()?;
        let preimage = (
            U256::from(self.chain_id.unwrap_or_default()),
            self.token.unwrap_or(Address::ZERO),
            self.target.unwrap_or(Address::ZERO),
        )
            .abi_encode();
        Ok(ModuleCommitment::keccak(preimage))
    }

    /// The commitment re-encoded as a single `uint256`, which is what the module receives.
    pub fn encode(&self) -> Result<EncodedModule, SdkError> {
        let commitment = self.commitment()?;
        let word = U256::from_be_bytes(*commitment).abi_encode();
        Ok(EncodedModule {
            module_type: self.kind,
            encoded_data: format!("0x{}", hex::encode(word)),
            commitment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{b256, keccak256};
    use assert_matches::assert_matches;
    use rstest::rstest;

    const VAULT: Address = Address::new([0xaa; 20]);
    const USDC: Address = Address::new([0xbb; 20]);

    fn vault_config() -> ModuleConfig {
        ModuleConfig::new(ModuleKind::Erc4626Vault, 8453, Some(USDC), VAULT)
    }

    #[test]
    fn test_commitment_recomputed_independently_matches_encoding() {
        // Given
        let config = vault_config();

        // When
        let encoded = config.encode().unwrap();

        // Then
        let mut preimage = Vec::new();
        let mut chain_word = [0u8; 32];
        chain_word[24..].copy_from_slice(&8453u64.to_be_bytes());
        preimage.extend_from_slice(&chain_word);
        preimage.extend_from_slice(&[0u8; 12]);
        preimage.extend_from_slice(USDC.as_slice());
        preimage.extend_from_slice(&[0u8; 12]);
        preimage.extend_from_slice(VAULT.as_slice());
        let expected = keccak256(&preimage);

        assert_eq!(encoded.commitment.to_b256(), expected);
        assert_eq!(encoded.encoded_data, format!("0x{}", hex::encode(expected)));
    }

    #[test]
    fn test_commitment_matches_known_answer() {
        assert_eq!(
            vault_config().commitment().unwrap().to_b256(),
            b256!("63e0e79191f4bc4199f83ccbf5ae294c1eb7cf3ef56efaa5c8a6a09a6f4e2254")
        );
    }

    #[test]
    fn test_commitment_depends_on_every_field() {
        let base = vault_config().commitment().unwrap();
        let mut other_chain = vault_config();
        other_chain.chain_id = Some(1);
        let mut other_target = vault_config();
        other_target.target = Some(Address::new([0xcc; 20]));

        assert_ne!(base, other_chain.commitment().unwrap());
        assert_ne!(base, other_target.commitment().unwrap());
    }

    #[rstest]
    #[case::vault_without_token(ModuleConfig { kind: ModuleKind::Erc4626Vault, chain_id: Some(1), token: None, target: Some(VAULT) })]
    #[case::aave_without_chain(ModuleConfig { kind: ModuleKind::AaveV3Supply, chain_id: None, token: Some(USDC), target: Some(VAULT) })]
    #[case::transfer_without_recipient(ModuleConfig { kind: ModuleKind::Transfer, chain_id: Some(1), token: None, target: None })]
    #[case::zero_target(ModuleConfig { kind: ModuleKind::Transfer, chain_id: Some(1), token: None, target: Some(Address::ZERO) })]
    fn test_missing_fields_fail_validation(#[case] config: ModuleConfig) {
        assert_matches!(config.encode(), Err(SdkError::Validation(_)));
    }

    #[test]
    fn test_native_transfer_needs_no_token() {
        let config = ModuleConfig::new(ModuleKind::Transfer, 10, None, VAULT);
        assert!(config.encode().is_ok());
    }

    #[test]
    fn test_config_deserializes_from_camel_case() {
        let config: ModuleConfig = serde_json::from_str(&format!(
            r#"{{"kind":"ERC4626_VAULT","chainId":8453,"token":"{USDC}","target":"{VAULT}"}}"#
        ))
        .unwrap();
        assert_eq!(config, vault_config());
    }
}
