//! Error types for the server-side payment gate.

use pay402::proto::ErrorReason;

/// Reasons a request fails before or during facilitator verification.
///
/// Every variant becomes a fresh 402 challenge; none of them reaches the
/// protected handler.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum VerificationError {
    /// The request carried no payment proof.
    #[error("Payment-Signature header is required")]
    PaymentHeaderRequired,
    /// The proof was present but declined, locally or by the facilitator.
    #[error("payment declined: {}", .message.as_deref().unwrap_or(.reason.as_str()))]
    Declined {
        /// Machine-readable rejection reason, echoed to the client.
        reason: ErrorReason,
        /// Optional human-readable detail.
        message: Option<String>,
    },
    /// The facilitator could not be reached after bounded retries.
    #[error("facilitator unavailable for verification: {0}")]
    VerificationUnavailable(String),
    /// Every verify attempt ran out of its time budget.
    #[error("facilitator verification timed out")]
    Timeout,
}

impl VerificationError {
    /// Shorthand for a declined payment without extra detail.
    #[must_use]
    pub const fn declined(reason: ErrorReason) -> Self {
        Self::Declined {
            reason,
            message: None,
        }
    }
}

/// Failures after verification succeeded, during on-chain settlement.
///
/// The replay claim taken before settlement is deliberately kept on
/// failure; the same authorization cannot be re-presented.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SettlementError {
    /// The facilitator reported or suffered a settlement failure.
    #[error("settlement failed: {}", .message.as_deref().unwrap_or(.reason.as_str()))]
    SettlementFailed {
        /// Machine-readable failure reason.
        reason: ErrorReason,
        /// Optional human-readable detail.
        message: Option<String>,
    },
    /// The settlement call timed out.
    #[error("settlement timed out")]
    Timeout,
}

/// Top-level payment gate error, wrapping verification and settlement.
#[derive(Debug, thiserror::Error)]
pub enum PaygateError {
    /// Payment verification failed.
    #[error(transparent)]
    Verification(#[from] VerificationError),
    /// On-chain settlement failed.
    #[error(transparent)]
    Settlement(#[from] SettlementError),
}
