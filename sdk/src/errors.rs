use http::StatusCode;
use orchestration_primitives::hash::{RequestId, TransactionHash};
use thiserror::Error;

use crate::signer::SignerError;
use crate::stealth::KeyDecodeError;

pub type DynError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum SdkError {
    /// Missing signer account, unsupported chain id and similar setup problems. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("signer did not produce a signature")]
    Authentication(#[source] SignerError),

    /// RPC node or backend unreachable, timed out, or overloaded.
    #[error("dependency failure while {context}")]
    Dependency {
        context: String,
        #[source]
        source: DynError,
    },

    /// An answer arrived but could not be decoded, or the node refused the call itself.
    /// Asking again yields the same answer.
    #[error("invalid answer while {context}")]
    InvalidResponse {
        context: String,
        #[source]
        source: DynError,
    },

    #[error("{endpoint} answered with status {status}: {body}")]
    UnexpectedStatus {
        endpoint: String,
        status: StatusCode,
        body: String,
    },

    #[error("{endpoint} rejected the request: {message}")]
    Rejected { endpoint: String, message: String },

    /// Computed before any network call where possible.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("key material could not be decoded")]
    KeyDecode(#[from] KeyDecodeError),

    #[error("transaction {transaction_hash} reverted")]
    Reverted { transaction_hash: TransactionHash },

    #[error("orchestration could not be created")]
    Creation(#[source] Box<SdkError>),

    #[error("orchestration {request_id} failed: {message}")]
    OrchestrationFailed {
        request_id: RequestId,
        message: String,
    },

    #[error("orchestration {request_id} did not reach a terminal status after {attempts} attempts")]
    Timeout {
        request_id: RequestId,
        attempts: u32,
    },

    #[error("polling of orchestration {request_id} was cancelled after {attempts} attempts")]
    Cancelled {
        request_id: RequestId,
        attempts: u32,
    },
}

impl SdkError {
    pub fn dependency(
        context: impl Into<String>,
        source: impl Into<DynError>,
    ) -> Self {
        SdkError::Dependency {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn invalid_response(
        context: impl Into<String>,
        source: impl Into<DynError>,
    ) -> Self {
        SdkError::InvalidResponse {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Whether repeating the same idempotent call could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SdkError::Dependency { .. } => true,
            SdkError::UnexpectedStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }

    /// Whether polling ended because the orchestration itself reached `FAILED`.
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, SdkError::OrchestrationFailed { .. })
    }
}
