//! The orchestration state machine as the client drives it:
//! create, fund, notify, then poll until the backend reports a final status.

mod notify;
mod poll;
mod request;

pub use notify::{notify_deposit, DepositEvidence};
pub use poll::{
    poll_orchestration_status, LoggingObserver, PollObserver, PollOptions, PollingConfig,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL,
};
pub use request::{compute_request_id, create_orchestration, OrchestrationRequest};

use orchestration_primitives::hash::RequestId;
use orchestration_primitives::Address;
use tokio_util::sync::CancellationToken;

use crate::backend::{
    FundingIntent, HttpBackend, NotificationAck, OrchestrationBackend, StatusSnapshot, TargetState,
};
use crate::config::SdkConfig;
use crate::errors::SdkError;

/// Bundles a backend with the settings read once at construction.
#[derive(Debug, Clone)]
pub struct OrchestrationClient<B> {
    backend: B,
    api_key: String,
    polling: PollingConfig,
}

impl OrchestrationClient<HttpBackend> {
    pub fn from_config(config: &SdkConfig) -> Result<Self, SdkError> {
        let backend = HttpBackend::new(config.backend_url.clone(), config.request_timeout())?;
        Ok(Self::new(backend, config.api_key()?.to_string(), config.polling))
    }
}

impl<B: OrchestrationBackend> OrchestrationClient<B> {
    pub fn new(backend: B, api_key: String, polling: PollingConfig) -> Self {
        Self {
            backend,
            api_key,
            polling,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub async fn create(
        &self,
        current_state: &FundingIntent,
        required_state: &TargetState,
        owner: Address,
    ) -> Result<OrchestrationRequest, SdkError> {
        create_orchestration(
            &self.backend,
            current_state,
            required_state,
            owner,
            &self.api_key,
        )
        .await
    }

    pub async fn notify(
        &self,
        request_id: &RequestId,
        evidence: DepositEvidence,
        block_number: Option<u64>,
    ) -> Result<NotificationAck, SdkError> {
        notify_deposit(&self.backend, request_id, evidence, block_number).await
    }

    pub async fn status(&self, request_id: &RequestId) -> Result<StatusSnapshot, SdkError> {
        self.backend.orchestration_status(request_id.clone()).await
    }

    /// Polls with the configured interval and attempt budget.
    pub async fn wait_for_completion<O: PollObserver + ?Sized>(
        &self,
        request_id: &RequestId,
        observer: &mut O,
        cancel: &CancellationToken,
    ) -> Result<StatusSnapshot, SdkError> {
        let options = self.polling.options_for(request_id.clone());
        poll_orchestration_status(&self.backend, &options, observer, cancel).await
    }
}
