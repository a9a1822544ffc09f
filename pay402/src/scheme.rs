//! Payment candidate construction and selection.
//!
//! A scheme client inspects a 402 challenge and offers zero or more
//! [`PaymentCandidate`]s it could sign. When several candidates qualify
//! (e.g. the seller accepts multiple networks), a [`PaymentSelector`]
//! decides which one to pay.

use std::future::Future;
use std::pin::Pin;

use crate::amount::TokenAmount;
use crate::proto::{PaymentPayload, PaymentRequired};

/// Errors raised while producing a signed payment from a candidate.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SchemeError {
    /// Key material was absent or signing itself failed.
    #[error("signing failed: {0}")]
    SigningError(String),
    /// The signed payload could not be serialized.
    #[error("failed to serialize payment payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Deferred signing handle attached to a [`PaymentCandidate`].
///
/// Signing is deferred so that candidate enumeration and selection stay
/// cheap; only the selected candidate ever touches key material.
pub trait CandidateSigner: Send + Sync {
    /// Signs a payment satisfying the candidate's requirement.
    fn sign_payment(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<PaymentPayload, SchemeError>> + Send + '_>>;
}

/// One way a registered scheme client could satisfy a challenge.
#[allow(missing_debug_implementations)] // signer is a dyn trait object
pub struct PaymentCandidate {
    /// The network name the payment would execute on.
    pub network: String,
    /// Numeric chain reference, used as the deterministic tie-breaker.
    pub chain_reference: u64,
    /// The price in atomic units.
    pub amount: TokenAmount,
    /// Handle that produces the signed payment on demand.
    pub signer: Box<dyn CandidateSigner>,
}

/// Produces payment candidates from a 402 challenge.
///
/// Implementations filter the challenge's `accepts` down to requirements
/// they hold key material for; requirements on foreign networks or with
/// unknown schemes yield no candidate.
pub trait SchemeClient: Send + Sync {
    /// Returns every candidate this client could sign for the challenge.
    fn accept(&self, payment_required: &PaymentRequired) -> Vec<PaymentCandidate>;
}

/// Chooses one candidate among those that qualify.
pub trait PaymentSelector: Send + Sync {
    /// Selects a candidate, or `None` to decline all of them.
    fn select<'a>(&self, candidates: &'a [PaymentCandidate]) -> Option<&'a PaymentCandidate>;
}

/// Selects the first candidate in registration order.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstMatch;

impl PaymentSelector for FirstMatch {
    fn select<'a>(&self, candidates: &'a [PaymentCandidate]) -> Option<&'a PaymentCandidate> {
        candidates.first()
    }
}

/// Selects the cheapest candidate by atomic-unit price.
///
/// Ties are broken by the lowest chain reference so that selection is
/// deterministic across runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheapestFirst;

impl PaymentSelector for CheapestFirst {
    fn select<'a>(&self, candidates: &'a [PaymentCandidate]) -> Option<&'a PaymentCandidate> {
        candidates
            .iter()
            .min_by_key(|candidate| (candidate.amount, candidate.chain_reference))
    }
}
