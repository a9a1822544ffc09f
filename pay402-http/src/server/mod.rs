//! Server-side payment enforcement.
//!
//! A tower layer that gates routes behind x402 payments:
//!
//! 1. Requests without a `Payment-Signature` header receive a fresh 402
//!    challenge (new nonce and window per response, stateless).
//! 2. Proofs are checked locally first: terms, recipient, amount, network,
//!    and validity window. Failures cost zero facilitator calls.
//! 3. Surviving proofs are verified remotely, their nonce is claimed
//!    atomically against replays, and the payment is settled.
//! 4. Only then does the wrapped handler run, exactly once, with the
//!    settlement receipt attached as a `Payment-Response` header.

mod error;
mod facilitator_client;
mod layer;
mod paygate;

pub use error::{PaygateError, SettlementError, VerificationError};
pub use facilitator_client::{FacilitatorClient, FacilitatorClientError};
pub use layer::{PaygateLayer, PaygateService, X402Middleware};
pub use paygate::{Paygate, PriceTag, resolve_resource};
