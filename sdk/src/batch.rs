use std::time::Duration;

use crate::authorization::{
    sign_transfer_authorization, AuthorizationParams, SignedAuthorization, TokenInfoProvider,
};
use crate::errors::SdkError;
use crate::signer::Signer;

/// Per-item results of [`authorize_batch`], in input order.
#[derive(Debug)]
pub struct BatchOutcome {
    pub results: Vec<Result<SignedAuthorization, SdkError>>,
}

impl BatchOutcome {
    pub fn signed(&self) -> impl Iterator<Item = &SignedAuthorization> {
        self.results.iter().filter_map(|result| result.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (usize, &SdkError)> {
        self.results
            .iter()
            .enumerate()
            .filter_map(|(index, result)| result.as_ref().err().map(|err| (index, err)))
    }

    pub fn all_signed(&self) -> bool {
        self.results.iter().all(Result::is_ok)
    }
}

/// Signs one authorization per item, one after the other, so a wallet sees a single prompt at
/// a time. A failed item does not stop the batch; the caller submits whatever was signed.
pub async fn authorize_batch<S, P>(
    items: &[AuthorizationParams],
    signer: &S,
    token_info: &P,
    validity: Duration,
) -> BatchOutcome
where
    S: Signer,
    P: TokenInfoProvider,
{
    let mut results = Vec::with_capacity(items.len());
    for (index, params) in items.iter().enumerate() {
        let result = sign_transfer_authorization(params, signer, token_info, validity).await;
        if let Err(error) = &result {
            tracing::warn!(index, %error, from = %params.from, "batch item was not signed");
        }
        results.push(result);
    }
    let outcome = BatchOutcome { results };
    tracing::info!(
        total = items.len(),
        signed = outcome.signed().count(),
        "batch authorization finished"
    );
    outcome
}
