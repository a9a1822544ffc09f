//! Client-side x402 payment handling for reqwest.
//!
//! This module provides the [`X402Session`] middleware which orchestrates
//! scheme clients and payment selection for automatic 402 handling.

use std::sync::Arc;

use http::{Extensions, HeaderValue, StatusCode};
use pay402::proto::PaymentRequired;
use pay402::scheme::{CheapestFirst, PaymentCandidate, PaymentSelector, SchemeClient};
use reqwest::{Request, Response};
use reqwest_middleware as rqm;
#[cfg(feature = "telemetry")]
use tracing::{debug, info, instrument, trace};

use super::error::PaymentError;
use crate::{PAYMENT_REQUIRED_HEADER, PAYMENT_SIGNATURE_HEADER};

/// Reqwest middleware that pays 402 challenges automatically.
///
/// Each intercepted request runs a single-use payment session: send the
/// request unmodified, and if the origin answers 402, parse the challenge,
/// sign a payment with a registered scheme client, and retry exactly once
/// with the proof attached. Any second response, including another 402, is
/// never retried again.
#[allow(missing_debug_implementations)] // contains dyn trait objects
pub struct X402Session<TSelector> {
    schemes: SessionSchemes,
    selector: TSelector,
}

impl X402Session<CheapestFirst> {
    /// Creates a new session middleware with default settings.
    ///
    /// The default selector is [`CheapestFirst`]: the lowest atomic-unit
    /// price wins, ties broken by the lowest chain reference.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for X402Session<CheapestFirst> {
    fn default() -> Self {
        Self {
            schemes: SessionSchemes::default(),
            selector: CheapestFirst,
        }
    }
}

impl<TSelector> X402Session<TSelector> {
    /// Registers a scheme client for specific networks.
    ///
    /// Scheme clients handle the actual payment signing. Multiple clients
    /// may be registered; all of their candidates compete in selection.
    #[must_use]
    pub fn register<S>(mut self, scheme: S) -> Self
    where
        S: SchemeClient + 'static,
    {
        self.schemes.push(scheme);
        self
    }

    /// Sets a custom payment selector.
    pub fn with_selector<P: PaymentSelector + 'static>(self, selector: P) -> X402Session<P> {
        X402Session {
            selector,
            schemes: self.schemes,
        }
    }
}

impl<TSelector> X402Session<TSelector>
where
    TSelector: PaymentSelector,
{
    /// Signs a payment for the given challenge and returns the proof header
    /// value.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::Unsupported`] if no registered scheme can
    /// satisfy any requirement, or [`PaymentError::SigningFailed`] if the
    /// selected candidate fails to sign.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "x402.session.make_payment_header", skip_all, err)
    )]
    pub async fn make_payment_header(
        &self,
        payment_required: &PaymentRequired,
    ) -> Result<HeaderValue, PaymentError> {
        let candidates = self.schemes.candidates(payment_required);
        let selected = self
            .selector
            .select(&candidates)
            .ok_or(PaymentError::Unsupported)?;

        #[cfg(feature = "telemetry")]
        debug!(
            network = %selected.network,
            amount = %selected.amount,
            "selected payment candidate"
        );

        let payload = selected.signer.sign_payment().await?;
        let encoded = payload.encode_header()?;
        // Base64 output is always visible ASCII.
        Ok(HeaderValue::from_bytes(encoded.as_ref()).expect("base64 is a valid header value"))
    }
}

/// Internal collection of registered scheme clients.
#[derive(Default)]
#[allow(missing_debug_implementations)] // dyn trait objects do not implement Debug
struct SessionSchemes(Vec<Arc<dyn SchemeClient>>);

impl SessionSchemes {
    fn push<T: SchemeClient + 'static>(&mut self, client: T) {
        self.0.push(Arc::new(client));
    }

    /// Collects candidates from every registered scheme client.
    fn candidates(&self, payment_required: &PaymentRequired) -> Vec<PaymentCandidate> {
        let mut candidates = vec![];
        for client in &self.0 {
            candidates.extend(client.accept(payment_required));
        }
        candidates
    }
}

/// Runs the next middleware or HTTP client, mapping timeouts to
/// [`PaymentError::Timeout`].
#[cfg_attr(feature = "telemetry", instrument(name = "x402.session.next", skip_all))]
async fn run_next(
    next: rqm::Next<'_>,
    req: Request,
    extensions: &mut Extensions,
) -> rqm::Result<Response> {
    next.run(req, extensions).await.map_err(|err| match err {
        rqm::Error::Reqwest(e) if e.is_timeout() => {
            rqm::Error::Middleware(PaymentError::Timeout.into())
        }
        other => other,
    })
}

#[async_trait::async_trait]
impl<TSelector> rqm::Middleware for X402Session<TSelector>
where
    TSelector: PaymentSelector + Send + Sync + 'static,
{
    /// Handles a request, automatically paying a 402 response.
    ///
    /// 1. Clones the request upfront; a non-replayable body fails the
    ///    session before anything is sent.
    /// 2. Sends the original request unmodified.
    /// 3. On 402, parses the challenge, signs a payment, and resends the
    ///    clone with the `Payment-Signature` header, exactly once.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "x402.session.handle", skip_all, err)
    )]
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        let retry_req = req
            .try_clone()
            .ok_or(rqm::Error::Middleware(PaymentError::RequestNotCloneable.into()))?;

        let res = run_next(next.clone(), req, extensions).await?;

        if res.status() != StatusCode::PAYMENT_REQUIRED {
            #[cfg(feature = "telemetry")]
            trace!(status = ?res.status(), "no payment required");
            return Ok(res);
        }

        #[cfg(feature = "telemetry")]
        info!(url = %res.url(), "received 402 Payment Required, paying");

        let payment_required = parse_payment_required(res)
            .await
            .map_err(|e| rqm::Error::Middleware(e.into()))?;

        let header = self
            .make_payment_header(&payment_required)
            .await
            .map_err(|e| rqm::Error::Middleware(e.into()))?;

        let mut retry = retry_req;
        retry.headers_mut().insert(PAYMENT_SIGNATURE_HEADER, header);

        let paid_res = run_next(next, retry, extensions).await?;

        if paid_res.status() == StatusCode::PAYMENT_REQUIRED {
            let reason = parse_payment_required(paid_res)
                .await
                .ok()
                .and_then(|challenge| challenge.error);
            return Err(rqm::Error::Middleware(
                PaymentError::RejectedAfterPayment { reason }.into(),
            ));
        }

        Ok(paid_res)
    }
}

/// Parses a 402 response into a [`PaymentRequired`] challenge.
///
/// The JSON body is authoritative; the base64 `Payment-Required` header is
/// the fallback for bodyless responses.
///
/// # Errors
///
/// Returns [`PaymentError::Malformed`] if neither the body nor the header
/// yields a consistent challenge.
#[cfg_attr(
    feature = "telemetry",
    instrument(name = "x402.session.parse_payment_required", skip_all)
)]
pub async fn parse_payment_required(
    response: Response,
) -> Result<PaymentRequired, PaymentError> {
    let header_challenge = response
        .headers()
        .get(PAYMENT_REQUIRED_HEADER)
        .and_then(|h| pay402::encoding::Base64Bytes::from(h.as_bytes()).decode().ok());

    let body = response
        .bytes()
        .await
        .map_err(|e| {
            PaymentError::Malformed(pay402::proto::ChallengeError::MalformedChallenge(
                e.to_string(),
            ))
        })?;

    match PaymentRequired::parse(&body) {
        Ok(challenge) => Ok(challenge),
        Err(body_err) => {
            if let Some(bytes) = header_challenge
                && let Ok(challenge) = PaymentRequired::parse(&bytes)
            {
                #[cfg(feature = "telemetry")]
                debug!("challenge parsed from Payment-Required header");
                return Ok(challenge);
            }
            Err(PaymentError::Malformed(body_err))
        }
    }
}
