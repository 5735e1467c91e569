//! EIP-3009 `TransferWithAuthorization` signing.
//!
//! The signed payload authorizes anyone holding it to move `value` tokens from `from` to `to`
//! once, inside a time window. Signing costs no gas; whoever submits the authorization pays.

use alloy::primitives::{B256, U256};
use alloy::sol;
use alloy::sol_types::{eip712_domain, Eip712Domain, SolStruct};
use orchestration_primitives::hash::AuthorizationNonce;
use orchestration_primitives::Address;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::amount::TokenAmount;
use crate::clock::unix_now;
use crate::errors::SdkError;
use crate::signer::{Signature, SignatureError, Signer};

#[cfg(test)]
use mockall::automock;

/// Every EIP-3009 token the backend redeems (USDC and its bridged variants) uses domain version 2.
pub const AUTHORIZATION_DOMAIN_VERSION: &str = "2";

pub const DEFAULT_VALIDITY_WINDOW: Duration = Duration::from_secs(3600);

sol! {
    #[derive(Debug)]
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
}

/// Looks up the on-chain display name of a token, used as the EIP-712 domain name.
#[cfg_attr(test, automock)]
pub trait TokenInfoProvider: Send + Sync {
    fn token_name(
        &self,
        chain_id: u64,
        token: Address,
    ) -> impl Future<Output = Result<String, SdkError>> + Send;
}

/// The EIP-712 domain of a token as it travels with a signed authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationDomain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl AuthorizationDomain {
    pub fn for_token(name: impl Into<String>, chain_id: u64, token: Address) -> Self {
        Self {
            name: name.into(),
            version: AUTHORIZATION_DOMAIN_VERSION.to_string(),
            chain_id,
            verifying_contract: token,
        }
    }

    pub fn to_eip712(&self) -> Eip712Domain {
        eip712_domain! {
            name: self.name.clone(),
            version: self.version.clone(),
            chain_id: self.chain_id,
            verifying_contract: self.verifying_contract,
        }
    }

    pub fn separator(&self) -> B256 {
        self.to_eip712().separator()
    }
}

/// Validity bounds in unix seconds, both inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationWindow {
    pub valid_after: u64,
    pub valid_before: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStatus {
    Valid,
    NotYetValid,
    Expired,
}

impl AuthorizationWindow {
    /// Valid from the epoch until `now + validity`.
    pub fn starting_now(now: u64, validity: Duration) -> Self {
        Self {
            valid_after: 0,
            valid_before: now.saturating_add(validity.as_secs()),
        }
    }

    pub fn check(&self, now: u64) -> WindowStatus {
        if now < self.valid_after {
            WindowStatus::NotYetValid
        } else if now > self.valid_before {
            WindowStatus::Expired
        } else {
            WindowStatus::Valid
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferAuthorization {
    pub from: Address,
    pub to: Address,
    pub value: TokenAmount,
    #[serde(flatten)]
    pub window: AuthorizationWindow,
    pub nonce: AuthorizationNonce,
}

impl TransferAuthorization {
    pub fn to_typed_data(&self) -> TransferWithAuthorization {
        TransferWithAuthorization {
            from: self.from,
            to: self.to,
            value: U256::from(self.value.base_units()),
            validAfter: U256::from(self.window.valid_after),
            validBefore: U256::from(self.window.valid_before),
            nonce: self.nonce.to_b256(),
        }
    }

    /// The EIP-712 signing hash under `domain`, which is what the wallet signs.
    pub fn digest(&self, domain: &AuthorizationDomain) -> B256 {
        self.to_typed_data().eip712_signing_hash(&domain.to_eip712())
    }

    pub fn window_status(&self, now: u64) -> WindowStatus {
        self.window.check(now)
    }
}

/// A signed authorization together with the domain it was signed under, so any party can
/// verify it without further lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedAuthorization {
    #[serde(flatten)]
    pub authorization: TransferAuthorization,
    pub domain: AuthorizationDomain,
    pub v: u8,
    #[serde(with = "word_hex")]
    pub r: [u8; 32],
    #[serde(with = "word_hex")]
    pub s: [u8; 32],
}

impl SignedAuthorization {
    pub fn signature(&self) -> Signature {
        Signature {
            r: self.r,
            s: self.s,
            v: self.v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationParams {
    pub from: Address,
    pub to: Address,
    pub value: TokenAmount,
    pub token: Address,
    pub chain_id: u64,
}

pub async fn sign_transfer_authorization<S, P>(
    params: &AuthorizationParams,
    signer: &S,
    token_info: &P,
    validity: Duration,
) -> Result<SignedAuthorization, SdkError>
where
    S: Signer,
    P: TokenInfoProvider,
{
    let account = signer.address().ok_or_else(|| {
        SdkError::Configuration("no signer account is connected".to_string())
    })?;
    if account != params.from {
        return Err(SdkError::Configuration(format!(
            "signer account {account} cannot authorize transfers from {}",
            params.from
        )));
    }

    let mut nonce = [0u8; 32];
    OsRng.fill_bytes(&mut nonce);
    let authorization = TransferAuthorization {
        from: params.from,
        to: params.to,
        value: params.value,
        window: AuthorizationWindow::starting_now(unix_now()?, validity),
        nonce: AuthorizationNonce::from(nonce),
    };

    let name = token_info
        .token_name(params.chain_id, params.token)
        .await
        .inspect_err(|err| {
            tracing::warn!(token = %params.token, chain_id = params.chain_id, %err, "token name lookup failed");
        })?;
    let domain = AuthorizationDomain::for_token(name, params.chain_id, params.token);

    let signature = signer
        .sign_hash(authorization.digest(&domain))
        .await
        .map_err(SdkError::Authentication)?;

    tracing::debug!(
        from = %params.from,
        to = %params.to,
        value = %params.value,
        nonce = %authorization.nonce,
        valid_before = authorization.window.valid_before,
        "signed transfer authorization"
    );

    Ok(SignedAuthorization {
        authorization,
        domain,
        v: signature.v,
        r: signature.r,
        s: signature.s,
    })
}

/// Recovers the account that signed `signed` under its embedded domain.
pub fn recover_signer(signed: &SignedAuthorization) -> Result<Address, SignatureError> {
    signed
        .signature()
        .recover_address(&signed.authorization.digest(&signed.domain))
}

mod word_hex {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(word: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(word)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let text = String::deserialize(deserializer)?;
        orchestration_primitives::decode_fixed_hex::<32>(&text).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::tests::test_signer;
    use crate::signer::{MockSigner, SignerError};
    use alloy::primitives::{b256, keccak256};
    use assert_matches::assert_matches;
    use orchestration_primitives::address;
    use rstest::rstest;

    const BASE: u64 = 8453;
    const USDC: Address = address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");

    fn params(from: Address) -> AuthorizationParams {
        AuthorizationParams {
            from,
            to: Address::new([0x22; 20]),
            value: TokenAmount::new(1_000_000),
            token: USDC,
            chain_id: BASE,
        }
    }

    fn token_info(name: &'static str) -> MockTokenInfoProvider {
        let mut provider = MockTokenInfoProvider::new();
        provider
            .expect_token_name()
            .returning(move |_, _| Box::pin(async move { Ok(name.to_string()) }));
        provider
    }

    fn fixed_authorization() -> TransferAuthorization {
        TransferAuthorization {
            from: address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266"),
            to: Address::new([0x22; 20]),
            value: TokenAmount::new(1_000_000),
            window: AuthorizationWindow {
                valid_after: 0,
                valid_before: 1_700_000_000,
            },
            nonce: AuthorizationNonce::from([0x33; 32]),
        }
    }

    #[test]
    fn test_type_hash() {
        assert_eq!(
            fixed_authorization().to_typed_data().eip712_type_hash(),
            keccak256(
                "TransferWithAuthorization(address from,address to,uint256 value,\
                 uint256 validAfter,uint256 validBefore,bytes32 nonce)"
            )
        );
    }

    #[rstest]
    #[case::mainnet_usdc(
        AuthorizationDomain::for_token("USD Coin", 1, address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48")),
        b256!("06c37168a7db5138defc7866392bb87a741f9b3d104deb5094588ce041cae335")
    )]
    #[case::base_usdc(
        AuthorizationDomain::for_token("USD Coin", BASE, USDC),
        b256!("02fa7265e7c5d81118673727957699e4d68f74cd74b7db77da710fe8a2c7834f")
    )]
    fn test_domain_separator(#[case] domain: AuthorizationDomain, #[case] expected: B256) {
        assert_eq!(domain.separator(), expected);
    }

    #[test]
    fn test_signing_hash_matches_known_answer() {
        let domain = AuthorizationDomain::for_token("USD Coin", BASE, USDC);
        assert_eq!(
            fixed_authorization().digest(&domain),
            b256!("92e81fd0a8247b2446960f9f6f0c30f80b63ac54b6d2844b7c2dd1358c3d7d48")
        );
    }

    #[rstest]
    #[case::expired(AuthorizationWindow { valid_after: 0, valid_before: 999 }, WindowStatus::Expired)]
    #[case::not_yet_valid(AuthorizationWindow { valid_after: 2000, valid_before: 5000 }, WindowStatus::NotYetValid)]
    #[case::lower_bound_inclusive(AuthorizationWindow { valid_after: 1000, valid_before: 5000 }, WindowStatus::Valid)]
    #[case::upper_bound_inclusive(AuthorizationWindow { valid_after: 0, valid_before: 1000 }, WindowStatus::Valid)]
    fn test_window_check(#[case] window: AuthorizationWindow, #[case] expected: WindowStatus) {
        assert_eq!(window.check(1000), expected);
    }

    #[tokio::test]
    async fn test_signed_authorization_recovers_to_payer() {
        // Given
        let signer = test_signer();
        let from = signer.address().unwrap();

        // When
        let signed = sign_transfer_authorization(
            &params(from),
            &signer,
            &token_info("USD Coin"),
            DEFAULT_VALIDITY_WINDOW,
        )
        .await
        .unwrap();

        // Then
        assert_eq!(recover_signer(&signed).unwrap(), from);
        assert_eq!(signed.domain.name, "USD Coin");
        assert_eq!(signed.domain.version, "2");
        assert_eq!(signed.authorization.window.valid_after, 0);
        assert_matches!(
            signed.authorization.window_status(unix_now().unwrap()),
            WindowStatus::Valid
        );
        assert_eq!(
            signed.authorization.window_status(signed.authorization.window.valid_before + 1),
            WindowStatus::Expired
        );
    }

    #[tokio::test]
    async fn test_nonces_are_random() {
        let signer = test_signer();
        let from = signer.address().unwrap();
        let provider = token_info("USD Coin");

        let first = sign_transfer_authorization(&params(from), &signer, &provider, DEFAULT_VALIDITY_WINDOW)
            .await
            .unwrap();
        let second = sign_transfer_authorization(&params(from), &signer, &provider, DEFAULT_VALIDITY_WINDOW)
            .await
            .unwrap();
        assert_ne!(first.authorization.nonce, second.authorization.nonce);
    }

    #[tokio::test]
    async fn test_wrong_domain_name_does_not_verify() {
        let signer = test_signer();
        let from = signer.address().unwrap();
        let mut signed = sign_transfer_authorization(
            &params(from),
            &signer,
            &token_info("USD Coin"),
            DEFAULT_VALIDITY_WINDOW,
        )
        .await
        .unwrap();

        signed.domain.name = "USDC".to_string();
        assert_ne!(recover_signer(&signed).ok(), Some(from));
    }

    #[tokio::test]
    async fn test_missing_account_fails_before_any_lookup() {
        let mut signer = MockSigner::new();
        signer.expect_address().returning(|| None);
        let mut provider = MockTokenInfoProvider::new();
        provider.expect_token_name().never();

        let result = sign_transfer_authorization(
            &params(Address::new([1; 20])),
            &signer,
            &provider,
            DEFAULT_VALIDITY_WINDOW,
        )
        .await;
        assert_matches!(result, Err(SdkError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_token_name_failure_is_a_dependency_error() {
        let signer = test_signer();
        let mut provider = MockTokenInfoProvider::new();
        provider.expect_token_name().returning(|_, _| {
            Box::pin(async { Err(SdkError::dependency("eth_call", "connection refused")) })
        });

        let result = sign_transfer_authorization(
            &params(signer.address().unwrap()),
            &signer,
            &provider,
            DEFAULT_VALIDITY_WINDOW,
        )
        .await;
        assert_matches!(result, Err(SdkError::Dependency { .. }));
    }

    #[tokio::test]
    async fn test_undecodable_token_name_keeps_its_classification() {
        let signer = test_signer();
        let mut provider = MockTokenInfoProvider::new();
        provider.expect_token_name().returning(|_, _| {
            Box::pin(async { Err(SdkError::invalid_response("calling eth_call", "bad string offset")) })
        });

        let result = sign_transfer_authorization(
            &params(signer.address().unwrap()),
            &signer,
            &provider,
            DEFAULT_VALIDITY_WINDOW,
        )
        .await;
        assert_matches!(result, Err(error) if !error.is_transient());
    }

    #[tokio::test]
    async fn test_rejected_signature_is_an_authentication_error() {
        let from = Address::new([3; 20]);
        let mut signer = MockSigner::new();
        signer.expect_address().returning(move || Some(from));
        signer.expect_sign_hash().returning(|_| {
            Box::pin(async { Err(SignerError::Rejected("denied".to_string())) })
        });

        let result = sign_transfer_authorization(
            &params(from),
            &signer,
            &token_info("USD Coin"),
            DEFAULT_VALIDITY_WINDOW,
        )
        .await;
        assert_matches!(result, Err(SdkError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_wire_format_is_camel_case() {
        let signer = test_signer();
        let signed = sign_transfer_authorization(
            &params(signer.address().unwrap()),
            &signer,
            &token_info("USD Coin"),
            DEFAULT_VALIDITY_WINDOW,
        )
        .await
        .unwrap();

        let json = serde_json::to_value(&signed).unwrap();
        assert_eq!(json["value"], "1000000");
        assert_eq!(json["validAfter"], 0);
        assert!(json["r"].as_str().unwrap().starts_with("0x"));
        let contract: Address = json["domain"]["verifyingContract"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(contract, USDC);

        let decoded: SignedAuthorization = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, signed);
    }
}
