//! The facilitator contract.
//!
//! A facilitator is a trusted third-party service that verifies and settles
//! stablecoin payment authorizations on behalf of a resource server. The
//! core never executes transfers itself; it delegates both checks and
//! settlement finality through this trait.
//!
//! Both operations are idempotent with respect to an authorization nonce on
//! the facilitator side: settling an already-settled nonce returns the prior
//! result rather than double-spending. Transport failures must be surfaced
//! through the associated `Error`, never swallowed.

use crate::proto::{SettleRequest, SettleResponse, VerifyRequest, VerifyResponse};

/// Transport-error classification for [`Facilitator`] implementations.
///
/// A call that ran out of its time budget is reported distinctly from other
/// transport failures, so callers can surface a dedicated timeout error
/// instead of a generic unavailability message.
pub trait FacilitatorError: std::error::Error {
    /// Returns `true` if the call failed by exceeding its time budget.
    fn is_timeout(&self) -> bool;
}

/// Verifies and settles x402 payments.
///
/// Implemented by `pay402-http`'s HTTP facilitator client; tests implement
/// it with in-memory fakes.
pub trait Facilitator: Send + Sync {
    /// Transport-level error type.
    type Error: FacilitatorError + Send + Sync + 'static;

    /// Checks a payment proof against requirements without moving funds.
    ///
    /// A definitive verdict (valid or invalid) arrives as `Ok`; only
    /// transport problems are `Err`.
    fn verify(
        &self,
        request: &VerifyRequest,
    ) -> impl Future<Output = Result<VerifyResponse, Self::Error>> + Send;

    /// Executes (or records for execution) a verified payment transfer.
    fn settle(
        &self,
        request: &SettleRequest,
    ) -> impl Future<Output = Result<SettleResponse, Self::Error>> + Send;
}

impl<T: Facilitator> Facilitator for std::sync::Arc<T> {
    type Error = T::Error;

    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, Self::Error> {
        (**self).verify(request).await
    }

    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, Self::Error> {
        (**self).settle(request).await
    }
}
