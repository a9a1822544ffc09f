//! Error types for the client payment session.

use pay402::proto::{ChallengeError, ProofCodecError};
use pay402::scheme::SchemeError;

/// Errors raised while a payment session handles a 402 challenge.
///
/// These surface through `reqwest_middleware::Error::Middleware`; any
/// response other than a second 402 is returned to the caller as the
/// session result rather than an error.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PaymentError {
    /// The 402 challenge could not be parsed or is logically inconsistent.
    #[error("malformed payment challenge: {0}")]
    Malformed(#[from] ChallengeError),
    /// No registered scheme client can satisfy any of the challenge's
    /// requirements.
    #[error("no registered payment scheme matches the challenge")]
    Unsupported,
    /// Producing the signed payment failed.
    #[error("payment signing failed: {0}")]
    SigningFailed(#[from] SchemeError),
    /// The signed proof could not be encoded into a header value.
    #[error("failed to encode payment proof: {0}")]
    ProofEncoding(#[from] ProofCodecError),
    /// The retried request was rejected with another 402.
    ///
    /// Payment is attempted exactly once per session; the seller's stated
    /// reason, if any, is carried along.
    #[error("payment was rejected after retry: {}", .reason.as_deref().unwrap_or("no reason given"))]
    RejectedAfterPayment {
        /// The seller's stated rejection reason, if present in the second
        /// challenge.
        reason: Option<String>,
    },
    /// A send timed out before a response arrived.
    #[error("request timed out during payment session")]
    Timeout,
    /// The request body cannot be cloned for the paid retry.
    ///
    /// Streaming bodies are not replayable; buffer the body before sending
    /// it through a payment session.
    #[error("request body is not cloneable, cannot retry with payment")]
    RequestNotCloneable,
}
