use alloy::primitives::{B256, U256};
use alloy::sol_types::SolValue;
use orchestration_primitives::hash::RequestId;
use orchestration_primitives::Address;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::amount::TokenAmount;
use crate::backend::{
    CreateOrchestrationRequest, CreateOrchestrationResponse, FundingIntent, OrchestrationBackend,
    TargetState,
};
use crate::clock::unix_millis;
use crate::errors::SdkError;

/// A created orchestration as the client sees it. Never changes after creation; the status
/// lives on the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestrationRequest {
    pub request_id: RequestId,
    pub source_chain_id: u64,
    pub destination_chain_id: u64,
    pub source_token_address: Address,
    pub source_token_amount: TokenAmount,
    pub destination_token_address: Address,
    pub destination_token_amount: TokenAmount,
    pub account_address_on_source_chain: Address,
    pub account_address_on_destination_chain: Address,
    pub source_chain_account_modules: Vec<Address>,
    pub destination_chain_account_modules: Vec<Address>,
}

/// Provisional id `keccak256(abi.encode(chainId, token, amount, unixMillis, salt))`.
///
/// Unique in practice thanks to the salt, but only the backend's id is authoritative.
pub fn compute_request_id(intent: &FundingIntent, unix_millis: u64, salt: [u8; 32]) -> RequestId {
    let preimage = (
        U256::from(intent.chain_id),
        intent.token_address,
        U256::from(intent.amount.base_units()),
        U256::from(unix_millis),
        B256::new(salt),
    )
        .abi_encode();
    RequestId::keccak(preimage)
}

/// Submits one funding intent and its target state. Sent exactly once: a failure is returned
/// as [`SdkError::Creation`] and the caller decides whether to try again.
pub async fn create_orchestration<B: OrchestrationBackend>(
    backend: &B,
    current_state: &FundingIntent,
    required_state: &TargetState,
    owner: Address,
    api_key: &str,
) -> Result<OrchestrationRequest, SdkError> {
    if api_key.trim().is_empty() {
        return Err(SdkError::Configuration("an API key is required".to_string()));
    }
    if owner.is_zero() {
        return Err(SdkError::Validation(
            "owner must not be the zero address".to_string(),
        ));
    }
    if current_state.amount.is_zero() {
        return Err(SdkError::Validation(
            "source token amount must be greater than zero".to_string(),
        ));
    }

    let mut salt = [0u8; 32];
    OsRng.fill_bytes(&mut salt);
    let client_request_id = compute_request_id(current_state, unix_millis()?, salt);

    let request = CreateOrchestrationRequest {
        current_state: vec![current_state.clone()],
        required_state_data: vec![required_state.clone()],
        user_address: owner,
        api_key: api_key.to_string(),
        request_id: client_request_id.clone(),
    };
    let response = backend
        .create_orchestration(request)
        .await
        .map_err(|err| SdkError::Creation(Box::new(err)))?;

    if response.request_id != client_request_id {
        tracing::debug!(
            client_request_id = %client_request_id,
            request_id = %response.request_id,
            "backend assigned its own request id"
        );
    }
    tracing::info!(
        request_id = %response.request_id,
        source_chain_id = response.source_chain_id,
        destination_chain_id = response.destination_chain_id,
        "orchestration created"
    );

    Ok(into_request(response, current_state, required_state))
}

fn into_request(
    response: CreateOrchestrationResponse,
    current_state: &FundingIntent,
    required_state: &TargetState,
) -> OrchestrationRequest {
    OrchestrationRequest {
        request_id: response.request_id,
        source_chain_id: response.source_chain_id,
        destination_chain_id: response.destination_chain_id,
        source_token_address: current_state.token_address,
        source_token_amount: current_state.amount,
        destination_token_address: required_state.token_address,
        destination_token_amount: required_state.amount.unwrap_or(current_state.amount),
        account_address_on_source_chain: response.account_address_on_source_chain,
        account_address_on_destination_chain: response.account_address_on_destination_chain,
        source_chain_account_modules: response.source_chain_account_modules,
        destination_chain_account_modules: response.destination_chain_account_modules,
    }
}
