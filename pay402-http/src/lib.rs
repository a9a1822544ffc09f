#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP transport for the [x402](https://www.x402.org) payment protocol.
//!
//! Two feature-gated halves share the wire types from `pay402`:
//!
//! - **`client`** - a `reqwest` middleware ([`client::X402Session`]) that
//!   answers `402 Payment Required` challenges by signing a payment and
//!   retrying the request exactly once.
//! - **`server`** - a `tower` layer ([`server::X402Middleware`]) that gates
//!   routes behind payment: it issues challenges, checks proofs locally,
//!   verifies and settles them through a facilitator, and rejects replays.

#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "server")]
pub mod server;

/// Request header carrying the base64-encoded payment proof.
pub const PAYMENT_SIGNATURE_HEADER: &str = "Payment-Signature";

/// Response header carrying the base64-encoded 402 challenge.
///
/// The same challenge is emitted in the response body as plain JSON; the
/// header exists for clients that cannot read 402 bodies.
pub const PAYMENT_REQUIRED_HEADER: &str = "Payment-Required";

/// Response header carrying the base64-encoded settlement receipt.
pub const PAYMENT_RESPONSE_HEADER: &str = "Payment-Response";
