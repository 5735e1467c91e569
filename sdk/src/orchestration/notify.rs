use orchestration_primitives::hash::{RequestId, TransactionHash};

use crate::authorization::SignedAuthorization;
use crate::backend::{
    DepositNotification, NotificationAck, OrchestrationBackend, TransferType, NOTIFY_DEPOSIT_PATH,
};
use crate::errors::SdkError;

/// Proof that the source account was funded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepositEvidence {
    /// An on-chain transfer that has already been mined.
    Transaction(TransactionHash),
    /// An EIP-3009 authorization the backend redeems itself.
    Authorization(Box<SignedAuthorization>),
}

impl DepositEvidence {
    pub fn transfer_type(&self) -> TransferType {
        match self {
            DepositEvidence::Transaction(_) => TransferType::Normal,
            DepositEvidence::Authorization(_) => TransferType::Eip3009,
        }
    }

    fn into_notification(self, request_id: RequestId, block_number: Option<u64>) -> DepositNotification {
        let transfer_type = self.transfer_type();
        let (transaction_hash, signed_data) = match self {
            DepositEvidence::Transaction(hash) => (Some(hash), None),
            DepositEvidence::Authorization(signed) => (None, Some(*signed)),
        };
        DepositNotification {
            request_id,
            transaction_hash,
            block_number,
            transfer_type,
            signed_data,
        }
    }
}

/// Tells the backend the orchestration is funded. Sent once; the backend does not deduplicate
/// notifications, so errors are returned to the caller instead of retried.
pub async fn notify_deposit<B: OrchestrationBackend>(
    backend: &B,
    request_id: &RequestId,
    evidence: DepositEvidence,
    block_number: Option<u64>,
) -> Result<NotificationAck, SdkError> {
    let transfer_type = evidence.transfer_type();
    let notification = evidence.into_notification(request_id.clone(), block_number);
    let ack = backend.notify_deposit(notification).await?;
    if !ack.success {
        let message = ack
            .error
            .or(ack.message)
            .unwrap_or_else(|| "deposit notification was not accepted".to_string());
        tracing::warn!(%request_id, %message, "deposit notification rejected");
        return Err(SdkError::Rejected {
            endpoint: NOTIFY_DEPOSIT_PATH.to_string(),
            message,
        });
    }
    tracing::info!(%request_id, ?transfer_type, "deposit notified");
    Ok(ack)
}
