//! Wire contract of the orchestration backend and its HTTP implementation.

use orchestration_primitives::hash::{RequestId, TransactionHash};
use orchestration_primitives::Address;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use url::Url;

use crate::amount::TokenAmount;
use crate::authorization::SignedAuthorization;
use crate::errors::SdkError;
use crate::modules::EncodedModule;

#[cfg(test)]
use mockall::automock;

pub const CREATE_PATH: &str = "api/v1/orchestration/create";
pub const NOTIFY_DEPOSIT_PATH: &str = "api/v1/notifications/deposit";
pub const STATUS_PATH: &str = "api/v1/orchestration/status";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Funds as they sit on the source chain before the orchestration starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingIntent {
    pub chain_id: u64,
    pub token_address: Address,
    pub amount: TokenAmount,
}

/// What the user wants to hold on the destination chain once the orchestration completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetState {
    pub chain_id: u64,
    pub token_address: Address,
    /// Defaults to the funded amount for a one to one bridge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<TokenAmount>,
    pub modules: Vec<EncodedModule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrchestrationRequest {
    pub current_state: Vec<FundingIntent>,
    pub required_state_data: Vec<TargetState>,
    pub user_address: Address,
    pub api_key: String,
    pub request_id: RequestId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrchestrationResponse {
    pub request_id: RequestId,
    pub source_chain_id: u64,
    pub destination_chain_id: u64,
    pub account_address_on_source_chain: Address,
    pub account_address_on_destination_chain: Address,
    #[serde(default)]
    pub source_chain_account_modules: Vec<Address>,
    #[serde(default)]
    pub destination_chain_account_modules: Vec<Address>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum TransferType {
    Normal,
    Eip3009,
}

impl From<TransferType> for u8 {
    fn from(value: TransferType) -> Self {
        match value {
            TransferType::Normal => 0,
            TransferType::Eip3009 => 1,
        }
    }
}

impl TryFrom<u8> for TransferType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TransferType::Normal),
            1 => Ok(TransferType::Eip3009),
            other => Err(format!("unknown transfer type {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositNotification {
    pub request_id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<TransactionHash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    pub transfer_type: TransferType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signed_data: Option<SignedAuthorization>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAck {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Lifecycle of an orchestration as reported by the backend. `Completed` and `Failed` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrchestrationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl OrchestrationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrchestrationStatus::Completed | OrchestrationStatus::Failed
        )
    }
}

impl fmt::Display for OrchestrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            OrchestrationStatus::Pending => "PENDING",
            OrchestrationStatus::Processing => "PROCESSING",
            OrchestrationStatus::Completed => "COMPLETED",
            OrchestrationStatus::Failed => "FAILED",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub status: OrchestrationStatus,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusEnvelope {
    success: bool,
    #[serde(default)]
    data: Option<StatusSnapshot>,
    #[serde(default)]
    error: Option<String>,
}

/// The three calls of the orchestration state machine. None of them is retried by
/// implementations; callers decide.
#[cfg_attr(test, automock)]
pub trait OrchestrationBackend: Send + Sync {
    fn create_orchestration(
        &self,
        request: CreateOrchestrationRequest,
    ) -> impl Future<Output = Result<CreateOrchestrationResponse, SdkError>> + Send;

    fn notify_deposit(
        &self,
        notification: DepositNotification,
    ) -> impl Future<Output = Result<NotificationAck, SdkError>> + Send;

    fn orchestration_status(
        &self,
        request_id: RequestId,
    ) -> impl Future<Output = Result<StatusSnapshot, SdkError>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, SdkError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| SdkError::Configuration(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, SdkError> {
        join_path(&self.base_url, path)
    }
}

impl OrchestrationBackend for HttpBackend {
    async fn create_orchestration(
        &self,
        request: CreateOrchestrationRequest,
    ) -> Result<CreateOrchestrationResponse, SdkError> {
        let url = self.endpoint(CREATE_PATH)?;
        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|err| SdkError::dependency(format!("calling {CREATE_PATH}"), err))?;
        read_json(CREATE_PATH, response).await
    }

    async fn notify_deposit(
        &self,
        notification: DepositNotification,
    ) -> Result<NotificationAck, SdkError> {
        let url = self.endpoint(NOTIFY_DEPOSIT_PATH)?;
        let response = self
            .client
            .post(url)
            .json(&notification)
            .send()
            .await
            .map_err(|err| SdkError::dependency(format!("calling {NOTIFY_DEPOSIT_PATH}"), err))?;
        read_json(NOTIFY_DEPOSIT_PATH, response).await
    }

    async fn orchestration_status(&self, request_id: RequestId) -> Result<StatusSnapshot, SdkError> {
        let path = format!("{STATUS_PATH}/{request_id}");
        let url = self.endpoint(&path)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| SdkError::dependency(format!("calling {STATUS_PATH}"), err))?;
        let envelope: StatusEnvelope = read_json(STATUS_PATH, response).await?;
        match envelope {
            StatusEnvelope {
                success: true,
                data: Some(snapshot),
                ..
            } => Ok(snapshot),
            StatusEnvelope { error, .. } => Err(SdkError::Rejected {
                endpoint: STATUS_PATH.to_string(),
                message: error.unwrap_or_else(|| "status response carried no data".to_string()),
            }),
        }
    }
}

/// Appends `path` to `base` regardless of whether `base` ends in a slash.
pub(crate) fn join_path(base: &Url, path: &str) -> Result<Url, SdkError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| SdkError::Configuration(format!("{base} cannot be used as a base URL")))?
        .pop_if_empty()
        .extend(path.split('/').filter(|segment| !segment.is_empty()));
    Ok(url)
}

/// Turns a non 2xx answer into [`SdkError::UnexpectedStatus`] and decodes the body otherwise.
/// A body that does not decode is [`SdkError::InvalidResponse`], never worth a retry.
pub(crate) async fn read_json<T: DeserializeOwned>(
    endpoint: &str,
    response: Response,
) -> Result<T, SdkError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SdkError::UnexpectedStatus {
            endpoint: endpoint.to_string(),
            status,
            body,
        });
    }
    let body = response
        .bytes()
        .await
        .map_err(|err| SdkError::dependency(format!("reading the answer of {endpoint}"), err))?;
    serde_json::from_slice(&body).map_err(|err| {
        tracing::warn!(%endpoint, %err, "undecodable answer");
        SdkError::invalid_response(format!("decoding the answer of {endpoint}"), err)
    })
}
