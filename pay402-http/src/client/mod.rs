//! Reqwest middleware for automatic x402 payment handling.
//!
//! The [`X402Session`] middleware intercepts `402 Payment Required`
//! responses, signs a payment with a registered scheme client, and retries
//! the request exactly once with the proof attached.
//!
//! ## Registering scheme clients
//!
//! Payment signing is pluggable: register one scheme client per chain
//! family you hold keys for (`pay402-evm` provides `ExactEvmClient` for
//! EIP-155 chains). See [`X402Session::register`].
//!
//! ## Payment selection
//!
//! When a challenge offers several acceptable payments, a
//! [`PaymentSelector`](pay402::scheme::PaymentSelector) picks one. The
//! default is [`CheapestFirst`](pay402::scheme::CheapestFirst); see
//! [`X402Session::with_selector`] for custom policies.

mod error;
mod middleware;

pub use error::PaymentError;
pub use middleware::{X402Session, parse_payment_required};

use reqwest::{Client, ClientBuilder};
use reqwest_middleware as rqm;

/// Trait for adding x402 payment handling to reqwest clients.
///
/// Implemented on [`Client`] and [`ClientBuilder`].
pub trait ReqwestWithPayments<A, S> {
    /// Attaches the x402 session middleware to the client or builder.
    fn with_payments(self, session: X402Session<S>) -> ReqwestWithPaymentsBuilder<A, S>;
}

impl<S> ReqwestWithPayments<Self, S> for Client {
    fn with_payments(self, session: X402Session<S>) -> ReqwestWithPaymentsBuilder<Self, S> {
        ReqwestWithPaymentsBuilder {
            inner: self,
            session,
        }
    }
}

impl<S> ReqwestWithPayments<Self, S> for ClientBuilder {
    fn with_payments(self, session: X402Session<S>) -> ReqwestWithPaymentsBuilder<Self, S> {
        ReqwestWithPaymentsBuilder {
            inner: self,
            session,
        }
    }
}

/// Builder for creating a reqwest client with the x402 middleware attached.
#[allow(missing_debug_implementations)] // generic A may not implement Debug
pub struct ReqwestWithPaymentsBuilder<A, S> {
    inner: A,
    session: X402Session<S>,
}

/// Trait for building the final client from a [`ReqwestWithPaymentsBuilder`].
pub trait ReqwestWithPaymentsBuild {
    /// The type returned by [`build`](ReqwestWithPaymentsBuild::build).
    type BuildResult;
    /// The type returned by [`builder`](ReqwestWithPaymentsBuild::builder).
    type BuilderResult;

    /// Builds the client, consuming the builder.
    fn build(self) -> Self::BuildResult;

    /// Returns the underlying reqwest middleware builder.
    fn builder(self) -> Self::BuilderResult;
}

impl<S> ReqwestWithPaymentsBuild for ReqwestWithPaymentsBuilder<Client, S>
where
    X402Session<S>: rqm::Middleware,
{
    type BuildResult = rqm::ClientWithMiddleware;
    type BuilderResult = rqm::ClientBuilder;

    fn build(self) -> Self::BuildResult {
        self.builder().build()
    }

    fn builder(self) -> Self::BuilderResult {
        rqm::ClientBuilder::new(self.inner).with(self.session)
    }
}

impl<S> ReqwestWithPaymentsBuild for ReqwestWithPaymentsBuilder<ClientBuilder, S>
where
    X402Session<S>: rqm::Middleware,
{
    type BuildResult = Result<rqm::ClientWithMiddleware, reqwest::Error>;
    type BuilderResult = Result<rqm::ClientBuilder, reqwest::Error>;

    fn build(self) -> Self::BuildResult {
        let builder = self.builder()?;
        Ok(builder.build())
    }

    fn builder(self) -> Self::BuilderResult {
        let client = self.inner.build()?;
        Ok(rqm::ClientBuilder::new(client).with(self.session))
    }
}
