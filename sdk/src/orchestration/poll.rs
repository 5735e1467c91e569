use orchestration_primitives::hash::RequestId;
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::backend::{OrchestrationBackend, OrchestrationStatus, StatusSnapshot};
use crate::errors::SdkError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOptions {
    pub request_id: RequestId,
    /// Fixed pause between fetches; there is no backoff.
    pub interval: Duration,
    /// Number of status fetches, not retries.
    pub max_attempts: u32,
}

impl PollOptions {
    pub fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// YAML shape of the polling defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub max_attempts: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: u64::try_from(DEFAULT_POLL_INTERVAL.as_millis()).unwrap_or(u64::MAX),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl PollingConfig {
    pub fn options_for(&self, request_id: RequestId) -> PollOptions {
        PollOptions {
            request_id,
            interval: Duration::from_millis(self.interval_ms),
            max_attempts: self.max_attempts,
        }
    }
}

/// Hooks invoked while polling, all on the polling task and in order.
pub trait PollObserver {
    fn on_status_update(&mut self, _snapshot: &StatusSnapshot) {}

    /// Called once, when the orchestration reaches `COMPLETED`.
    fn on_complete(&mut self, _snapshot: &StatusSnapshot) {}

    /// Called for every failed fetch and for a `FAILED` orchestration.
    fn on_error(&mut self, _error: &SdkError) {}
}

impl PollObserver for () {}

/// Logs every event with `tracing`.
#[derive(Debug, Default)]
pub struct LoggingObserver;

impl PollObserver for LoggingObserver {
    fn on_status_update(&mut self, snapshot: &StatusSnapshot) {
        tracing::info!(status = %snapshot.status, updated_at = %snapshot.updated_at, "orchestration status");
    }

    fn on_complete(&mut self, snapshot: &StatusSnapshot) {
        tracing::info!(updated_at = %snapshot.updated_at, "orchestration completed");
    }

    fn on_error(&mut self, error: &SdkError) {
        tracing::warn!(%error, "orchestration status error");
    }
}

/// Polls until the orchestration completes, fails, the attempt budget runs out, or `cancel`
/// fires.
///
/// Fetches are strictly sequential. A transient fetch error is reported to the observer and
/// counts as an attempt; any other fetch error ends polling.
pub async fn poll_orchestration_status<B, O>(
    backend: &B,
    options: &PollOptions,
    observer: &mut O,
    cancel: &CancellationToken,
) -> Result<StatusSnapshot, SdkError>
where
    B: OrchestrationBackend,
    O: PollObserver + ?Sized,
{
    let request_id = &options.request_id;
    let cancelled = |attempts| SdkError::Cancelled {
        request_id: request_id.clone(),
        attempts,
    };

    for attempt in 1..=options.max_attempts {
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(attempt - 1)),
            fetched = backend.orchestration_status(request_id.clone()) => fetched,
        };

        match fetched {
            Ok(snapshot) => {
                tracing::debug!(%request_id, attempt, status = %snapshot.status, "fetched orchestration status");
                observer.on_status_update(&snapshot);
                match snapshot.status {
                    OrchestrationStatus::Completed => {
                        observer.on_complete(&snapshot);
                        return Ok(snapshot);
                    }
                    OrchestrationStatus::Failed => {
                        let error = SdkError::OrchestrationFailed {
                            request_id: request_id.clone(),
                            message: snapshot
                                .error_message
                                .unwrap_or_else(|| "no reason given".to_string()),
                        };
                        observer.on_error(&error);
                        return Err(error);
                    }
                    OrchestrationStatus::Pending | OrchestrationStatus::Processing => {}
                }
            }
            Err(error) if error.is_transient() => {
                tracing::warn!(%request_id, attempt, %error, "status fetch failed, continuing");
                observer.on_error(&error);
            }
            Err(error) => {
                observer.on_error(&error);
                return Err(error);
            }
        }

        if attempt < options.max_attempts {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(attempt)),
                _ = tokio::time::sleep(options.interval) => {}
            }
        }
    }

    Err(SdkError::Timeout {
        request_id: request_id.clone(),
        attempts: options.max_attempts,
    })
}
