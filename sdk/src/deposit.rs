//! Funding of the source-chain account the backend computed.

use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Bytes, Signature, TxKind, U256};
use alloy::sol_types::SolCall;
use orchestration_primitives::hash::TransactionHash;
use orchestration_primitives::Address;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::amount::TokenAmount;
use crate::authorization::{
    sign_transfer_authorization, AuthorizationParams, SignedAuthorization, TokenInfoProvider,
};
use crate::chain::{ChainClient, FeeEstimate, TransactionRequest, IERC20};
use crate::errors::SdkError;
use crate::signer::Signer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositRequest {
    pub from: Address,
    pub destination: Address,
    /// `None` moves the chain's native asset.
    pub token: Option<Address>,
    pub amount: TokenAmount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositReceipt {
    pub transaction_hash: TransactionHash,
    pub block_number: u64,
    pub gas_used: u128,
    pub explorer_url: Option<String>,
}

/// A deposit that did not complete. Carries the transaction hash when the transfer was already
/// broadcast, so callers can still track or report it.
#[derive(Debug, Error)]
#[error("deposit failed")]
pub struct DepositFailure {
    pub transaction_hash: Option<TransactionHash>,
    #[source]
    pub error: SdkError,
}

impl DepositFailure {
    fn before_send(error: SdkError) -> Self {
        Self {
            transaction_hash: None,
            error,
        }
    }
}

pub type DepositResult = Result<DepositReceipt, DepositFailure>;

/// `{explorer}/tx/{hash}`.
pub fn transaction_link(explorer: &Url, transaction_hash: &TransactionHash) -> String {
    format!(
        "{}/tx/{transaction_hash}",
        explorer.as_str().trim_end_matches('/')
    )
}

/// Sends `request.amount` to `request.destination` and waits for the transfer to be mined.
///
/// Native transfers carry the amount as value; ERC20 transfers call `transfer(address,uint256)`
/// on the token. The balance is checked before anything is sent. The transaction is signed by
/// `signer` and broadcast raw, so the node never holds the key.
pub async fn deposit_funds<C, S>(
    chain: &C,
    signer: &S,
    request: &DepositRequest,
    explorer: Option<&Url>,
) -> DepositResult
where
    C: ChainClient,
    S: Signer,
{
    let raw = prepare(chain, signer, request)
        .await
        .map_err(DepositFailure::before_send)?;

    let transaction_hash = chain.send_raw_transaction(raw).await.map_err(|error| {
        tracing::warn!(%error, chain_id = chain.chain_id(), "deposit transaction was not sent");
        DepositFailure::before_send(error)
    })?;
    tracing::info!(%transaction_hash, chain_id = chain.chain_id(), "deposit sent");

    let failure = |error: SdkError| {
        tracing::warn!(%error, %transaction_hash, "deposit did not complete");
        DepositFailure {
            transaction_hash: Some(transaction_hash.clone()),
            error,
        }
    };
    let receipt = chain
        .wait_for_receipt(transaction_hash.clone())
        .await
        .map_err(failure)?;
    if !receipt.success {
        return Err(failure(SdkError::Reverted {
            transaction_hash: transaction_hash.clone(),
        }));
    }

    Ok(DepositReceipt {
        explorer_url: explorer.map(|explorer| transaction_link(explorer, &transaction_hash)),
        transaction_hash,
        block_number: receipt.block_number,
        gas_used: receipt.gas_used,
    })
}

/// Validates, prices and signs the transfer, returning the EIP-2718 encoded envelope.
async fn prepare<C, S>(chain: &C, signer: &S, request: &DepositRequest) -> Result<Bytes, SdkError>
where
    C: ChainClient,
    S: Signer,
{
    if request.amount.is_zero() {
        return Err(SdkError::Validation(
            "deposit amount must be greater than zero".to_string(),
        ));
    }
    if request.destination.is_zero() {
        return Err(SdkError::Validation(
            "deposit destination must not be the zero address".to_string(),
        ));
    }
    match signer.address() {
        Some(account) if account == request.from => {}
        Some(account) => {
            return Err(SdkError::Configuration(format!(
                "signer account {account} cannot send deposits from {}",
                request.from
            )))
        }
        None => {
            return Err(SdkError::Configuration(
                "no signer account is connected".to_string(),
            ))
        }
    }

    let balance = chain.balance(request.from, request.token).await?;
    if balance < request.amount {
        return Err(SdkError::Validation(format!(
            "insufficient balance: {} holds {balance}, deposit needs {}",
            request.from, request.amount
        )));
    }
    let nonce = chain.transaction_count(request.from).await?;
    let transaction = transfer_request(request, nonce);
    let fees = chain.estimate_fees(transaction.clone()).await?;

    let unsigned = into_eip1559(chain.chain_id(), &transaction, nonce, fees);
    let signature: Signature = signer
        .sign_hash(unsigned.signature_hash())
        .await
        .map_err(SdkError::Authentication)?
        .into();
    let envelope = TxEnvelope::from(unsigned.into_signed(signature));
    tracing::debug!(
        transaction_hash = %envelope.tx_hash(),
        nonce,
        gas_limit = fees.gas_limit,
        "deposit transaction signed"
    );
    Ok(Bytes::from(envelope.encoded_2718()))
}

fn transfer_request(request: &DepositRequest, nonce: u64) -> TransactionRequest {
    match request.token {
        None => TransactionRequest {
            from: request.from,
            to: request.destination,
            value: request.amount,
            data: None,
            nonce: Some(nonce),
        },
        Some(token) => TransactionRequest {
            from: request.from,
            to: token,
            value: TokenAmount::ZERO,
            data: Some(
                IERC20::transferCall {
                    to: request.destination,
                    amount: U256::from(request.amount.base_units()),
                }
                .abi_encode(),
            ),
            nonce: Some(nonce),
        },
    }
}

fn into_eip1559(
    chain_id: u64,
    transaction: &TransactionRequest,
    nonce: u64,
    fees: FeeEstimate,
) -> TxEip1559 {
    TxEip1559 {
        chain_id,
        nonce,
        gas_limit: fees.gas_limit,
        max_fee_per_gas: fees.max_fee_per_gas,
        max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
        to: TxKind::Call(transaction.to),
        value: U256::from(transaction.value.base_units()),
        access_list: Default::default(),
        input: transaction.data.clone().map(Bytes::from).unwrap_or_default(),
    }
}

/// Signs an EIP-3009 authorization for the backend to redeem instead of sending a transaction.
pub async fn deposit_funds_gasless<S, P>(
    params: &AuthorizationParams,
    signer: &S,
    token_info: &P,
    validity: Duration,
) -> Result<SignedAuthorization, DepositFailure>
where
    S: Signer,
    P: TokenInfoProvider,
{
    if params.value.is_zero() {
        return Err(DepositFailure::before_send(SdkError::Validation(
            "deposit amount must be greater than zero".to_string(),
        )));
    }
    sign_transfer_authorization(params, signer, token_info, validity)
        .await
        .map_err(|error| {
            tracing::warn!(%error, from = %params.from, "gasless deposit was not signed");
            DepositFailure::before_send(error)
        })
}
