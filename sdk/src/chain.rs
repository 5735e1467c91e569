//! EVM chain access for funding transfers and token lookups, on an alloy [`RootProvider`].

use alloy::network::{Ethereum, TransactionBuilder};
use alloy::primitives::{Bytes, U256};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::client::RpcClient;
use alloy::rpc::types::TransactionRequest as RpcTransactionRequest;
use alloy::sol;
use alloy::sol_types::SolCall;
use alloy::transports::http::{reqwest, Http};
use alloy::transports::{RpcError, TransportError, TransportErrorKind};
use orchestration_primitives::hash::TransactionHash;
use orchestration_primitives::Address;
use std::future::Future;
use std::time::Duration;
use url::Url;

use crate::amount::TokenAmount;
use crate::authorization::TokenInfoProvider;
use crate::errors::SdkError;
use crate::retry::RetryPolicy;

#[cfg(test)]
use mockall::automock;

const CALL_METHOD: &str = "eth_call";
const SEND_RAW_TRANSACTION_METHOD: &str = "eth_sendRawTransaction";
const GET_TRANSACTION_RECEIPT_METHOD: &str = "eth_getTransactionReceipt";
const GET_BALANCE_METHOD: &str = "eth_getBalance";
const GET_TRANSACTION_COUNT_METHOD: &str = "eth_getTransactionCount";
const ESTIMATE_GAS_METHOD: &str = "eth_estimateGas";
const FEE_HISTORY_METHOD: &str = "eth_feeHistory";
const CHAIN_ID_METHOD: &str = "eth_chainId";

pub const DEFAULT_RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

sol! {
    interface IERC20 {
        function transfer(address to, uint256 amount) external returns (bool);
        function balanceOf(address owner) external view returns (uint256);
        function name() external view returns (string);
    }
}

/// A transfer before gas pricing and signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub from: Address,
    pub to: Address,
    pub value: TokenAmount,
    pub data: Option<Vec<u8>>,
    pub nonce: Option<u64>,
}

impl TransactionRequest {
    fn to_rpc(&self) -> RpcTransactionRequest {
        let mut request = RpcTransactionRequest::default()
            .with_from(self.from)
            .with_to(self.to)
            .with_value(U256::from(self.value.base_units()));
        if let Some(data) = &self.data {
            request = request.with_input(Bytes::copy_from_slice(data));
        }
        if let Some(nonce) = self.nonce {
            request = request.with_nonce(nonce);
        }
        request
    }
}

/// Gas limit and EIP-1559 prices for one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeEstimate {
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub transaction_hash: TransactionHash,
    pub block_number: u64,
    pub gas_used: u128,
    pub success: bool,
}

/// What the deposit executor needs from one EVM chain.
#[cfg_attr(test, automock)]
pub trait ChainClient: Send + Sync {
    fn chain_id(&self) -> u64;

    /// Native balance when `token` is `None`, ERC20 `balanceOf` otherwise.
    fn balance(
        &self,
        owner: Address,
        token: Option<Address>,
    ) -> impl Future<Output = Result<TokenAmount, SdkError>> + Send;

    fn transaction_count(&self, account: Address) -> impl Future<Output = Result<u64, SdkError>> + Send;

    fn estimate_fees(
        &self,
        transaction: TransactionRequest,
    ) -> impl Future<Output = Result<FeeEstimate, SdkError>> + Send;

    /// Broadcasts an already signed EIP-2718 envelope.
    fn send_raw_transaction(
        &self,
        raw: Bytes,
    ) -> impl Future<Output = Result<TransactionHash, SdkError>> + Send;

    /// Waits until the transaction is mined.
    fn wait_for_receipt(
        &self,
        hash: TransactionHash,
    ) -> impl Future<Output = Result<TransactionReceipt, SdkError>> + Send;
}

#[derive(Debug, Clone)]
pub struct JsonRpcChainClient {
    provider: RootProvider<Ethereum>,
    url: Url,
    chain_id: u64,
    retry: RetryPolicy,
    receipt_poll_interval: Duration,
    receipt_timeout: Duration,
}

impl JsonRpcChainClient {
    pub fn new(url: Url, chain_id: u64, retry: RetryPolicy) -> Result<Self, SdkError> {
        Self::with_timeout(url, chain_id, retry, DEFAULT_RPC_TIMEOUT)
    }

    pub fn with_timeout(
        url: Url,
        chain_id: u64,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self, SdkError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| SdkError::Configuration(format!("failed to build HTTP client: {err}")))?;
        let transport = Http::with_client(http_client, url.clone());
        let provider = RootProvider::<Ethereum>::new(RpcClient::new(transport, false));
        Ok(Self {
            provider,
            url,
            chain_id,
            retry,
            receipt_poll_interval: DEFAULT_RECEIPT_POLL_INTERVAL,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
        })
    }

    pub fn with_receipt_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.receipt_poll_interval = interval;
        self.receipt_timeout = timeout;
        self
    }

    /// Asks the node which chain it serves, to catch a misconfigured URL early.
    pub async fn verify_chain_id(&self) -> Result<(), SdkError> {
        let reported = self
            .retry
            .run(CHAIN_ID_METHOD, || async {
                self.provider
                    .get_chain_id()
                    .await
                    .map_err(|err| rpc_failure(CHAIN_ID_METHOD, err))
            })
            .await?;
        if reported != self.chain_id {
            tracing::error!(url = %self.url, expected = self.chain_id, got = reported, "chain id mismatch");
            return Err(SdkError::Configuration(format!(
                "RPC endpoint {} serves chain {reported}, expected {}",
                self.url, self.chain_id
            )));
        }
        Ok(())
    }

    /// An idempotent `eth_call`, retried per the configured policy.
    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Bytes, SdkError> {
        let request = RpcTransactionRequest::default()
            .with_to(to)
            .with_input(Bytes::from(data));
        self.retry
            .run(CALL_METHOD, || {
                let request = request.clone();
                async move {
                    self.provider
                        .call(request)
                        .await
                        .map_err(|err| rpc_failure(CALL_METHOD, err))
                }
            })
            .await
    }
}

impl ChainClient for JsonRpcChainClient {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn balance(&self, owner: Address, token: Option<Address>) -> Result<TokenAmount, SdkError> {
        let units = match token {
            None => {
                self.retry
                    .run(GET_BALANCE_METHOD, || async {
                        self.provider
                            .get_balance(owner)
                            .await
                            .map_err(|err| rpc_failure(GET_BALANCE_METHOD, err))
                    })
                    .await?
            }
            Some(token) => {
                let output = self
                    .call(token, IERC20::balanceOfCall { owner }.abi_encode())
                    .await?;
                IERC20::balanceOfCall::abi_decode_returns(&output)
                    .map_err(|err| SdkError::invalid_response("decoding balanceOf", err))?
            }
        };
        let units = u128::try_from(units).map_err(|_| {
            SdkError::invalid_response(
                format!("reading the balance of {owner}"),
                format!("balance {units} does not fit in 128 bits"),
            )
        })?;
        Ok(TokenAmount::new(units))
    }

    async fn transaction_count(&self, account: Address) -> Result<u64, SdkError> {
        self.retry
            .run(GET_TRANSACTION_COUNT_METHOD, || async {
                self.provider
                    .get_transaction_count(account)
                    .pending()
                    .await
                    .map_err(|err| rpc_failure(GET_TRANSACTION_COUNT_METHOD, err))
            })
            .await
    }

    async fn estimate_fees(&self, transaction: TransactionRequest) -> Result<FeeEstimate, SdkError> {
        let request = transaction.to_rpc();
        let gas_limit = self
            .retry
            .run(ESTIMATE_GAS_METHOD, || {
                let request = request.clone();
                async move {
                    self.provider
                        .estimate_gas(request)
                        .await
                        .map_err(|err| rpc_failure(ESTIMATE_GAS_METHOD, err))
                }
            })
            .await?;
        let fees = self
            .retry
            .run(FEE_HISTORY_METHOD, || async {
                self.provider
                    .estimate_eip1559_fees()
                    .await
                    .map_err(|err| rpc_failure(FEE_HISTORY_METHOD, err))
            })
            .await?;
        Ok(FeeEstimate {
            gas_limit,
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
        })
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<TransactionHash, SdkError> {
        let pending = self
            .provider
            .send_raw_transaction(&raw)
            .await
            .map_err(|err| rpc_failure(SEND_RAW_TRANSACTION_METHOD, err))?;
        Ok(TransactionHash::from(*pending.tx_hash()))
    }

    async fn wait_for_receipt(&self, hash: TransactionHash) -> Result<TransactionReceipt, SdkError> {
        let deadline = tokio::time::Instant::now() + self.receipt_timeout;
        loop {
            let receipt = self
                .retry
                .run(GET_TRANSACTION_RECEIPT_METHOD, || async {
                    self.provider
                        .get_transaction_receipt(hash.to_b256())
                        .await
                        .map_err(|err| rpc_failure(GET_TRANSACTION_RECEIPT_METHOD, err))
                })
                .await?;
            match receipt {
                Some(receipt) if receipt.block_number.is_some() => {
                    return Ok(TransactionReceipt {
                        transaction_hash: TransactionHash::from(receipt.transaction_hash),
                        block_number: receipt.block_number.unwrap_or_default(),
                        gas_used: u128::from(receipt.gas_used),
                        success: receipt.status(),
                    });
                }
                _ if tokio::time::Instant::now() >= deadline => {
                    return Err(SdkError::dependency(
                        format!("waiting for the receipt of {hash}"),
                        format!("not mined within {:?}", self.receipt_timeout),
                    ));
                }
                _ => {
                    tracing::debug!(%hash, "transaction not mined yet");
                    tokio::time::sleep(self.receipt_poll_interval).await;
                }
            }
        }
    }
}

impl TokenInfoProvider for JsonRpcChainClient {
    async fn token_name(&self, chain_id: u64, token: Address) -> Result<String, SdkError> {
        if chain_id != self.chain_id {
            return Err(SdkError::Configuration(format!(
                "RPC client for chain {} cannot look up tokens on chain {chain_id}",
                self.chain_id
            )));
        }
        let output = self.call(token, IERC20::nameCall {}.abi_encode()).await?;
        decode_token_name(&output)
            .map_err(|err| SdkError::invalid_response(format!("decoding the name of token {token}"), err))
    }
}

/// Decodes an ERC20 `name()` return. A few early tokens return `bytes32` instead of `string`.
pub(crate) fn decode_token_name(output: &[u8]) -> Result<String, alloy::sol_types::Error> {
    match IERC20::nameCall::abi_decode_returns(output) {
        Ok(name) => Ok(name),
        Err(err) if output.len() == 32 => {
            let text: Vec<u8> = output.iter().copied().take_while(|byte| *byte != 0).collect();
            String::from_utf8(text).map_err(|_| err)
        }
        Err(err) => Err(err),
    }
}

/// Only transport failures, 5xx and 429 are worth another attempt. Node errors and undecodable
/// answers repeat identically.
fn rpc_failure(method: &str, err: TransportError) -> SdkError {
    let context = format!("calling {method}");
    match &err {
        RpcError::Transport(TransportErrorKind::HttpError(http))
            if http.status < 500 && http.status != 429 =>
        {
            SdkError::invalid_response(context, err)
        }
        RpcError::Transport(_) => SdkError::dependency(context, err),
        _ => SdkError::invalid_response(context, err),
    }
}
