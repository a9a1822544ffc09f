//! Core payment gate logic for enforcing x402 payments.
//!
//! The [`Paygate`] struct handles the full payment lifecycle: challenge
//! issuance, local proof checks, replay claiming, facilitator verification
//! and settlement, and 402 response generation.

use alloy_primitives::Address;
use axum_core::body::Body;
use axum_core::extract::Request;
use axum_core::response::Response;
use http::{HeaderValue, StatusCode};
use pay402::amount::TokenAmount;
use pay402::encoding::Base64Bytes;
use pay402::facilitator::{Facilitator, FacilitatorError};
use pay402::networks::{NetworkConfig, NetworkRegistry};
use pay402::proto::{
    ErrorReason, PaymentPayload, PaymentRequired, PaymentRequirements, SettleResponse,
    VerifyRequest, VerifyResponse, X402Version1,
};
use pay402::replay::ReplayCache;
use pay402::timestamp::UnixTimestamp;
use rand::RngExt;
use rand::rng;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tower::Service;
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::Instrument;
#[cfg(feature = "telemetry")]
use tracing::instrument;

use super::error::{PaygateError, SettlementError, VerificationError};
use crate::{PAYMENT_REQUIRED_HEADER, PAYMENT_RESPONSE_HEADER, PAYMENT_SIGNATURE_HEADER};

/// One configured way to pay for the protected route.
///
/// The stable economic terms of a challenge: network, price, and recipient.
/// The per-challenge nonce and validity window are generated fresh for
/// every 402 the gate issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceTag {
    /// The network payment must execute on.
    pub network: String,
    /// The price in atomic units.
    pub amount: TokenAmount,
    /// The address payment must be sent to.
    pub recipient: Address,
    /// Human-readable description included in challenges.
    pub description: String,
}

impl PriceTag {
    /// Creates a price tag with an empty description.
    pub fn new(network: impl Into<String>, amount: TokenAmount, recipient: Address) -> Self {
        Self {
            network: network.into(),
            amount,
            recipient,
            description: String::new(),
        }
    }

    /// Sets the human-readable description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Checks whether an echoed requirement matches this tag's terms.
    ///
    /// Nonce and window are per-challenge and deliberately not compared;
    /// the authorization's own window is checked separately.
    fn matches(&self, accepted: &PaymentRequirements, config: &NetworkConfig) -> bool {
        accepted.network == self.network
            && accepted.recipient == self.recipient
            && accepted.amount == self.amount
            && accepted.asset == config.asset
    }
}

/// Payment gate enforcing x402 payments on a single route.
///
/// Built per request by [`PaygateService`](super::layer::PaygateService);
/// holds only shared state behind `Arc`s, so construction is cheap.
#[allow(missing_debug_implementations)]
pub struct Paygate<TFacilitator> {
    /// The facilitator used for verification and settlement.
    pub facilitator: TFacilitator,
    /// Networks this gate accepts payment on.
    pub registry: Arc<NetworkRegistry>,
    /// Consumed-nonce store shared across concurrent requests.
    pub replay: Arc<dyn ReplayCache>,
    /// Accepted payment terms, in registration order.
    pub accepts: Arc<Vec<PriceTag>>,
    /// Full URL of the protected resource, echoed in challenges.
    pub resource: String,
    /// Length of the validity window on freshly issued challenges.
    pub challenge_window: Duration,
}

/// Facilitator verify attempts before giving up.
const VERIFY_ATTEMPTS: u32 = 3;

/// Initial backoff between verify attempts; doubles per attempt.
const VERIFY_BACKOFF: Duration = Duration::from_millis(100);

impl<TFacilitator> Paygate<TFacilitator> {
    /// Calls the inner service with proper telemetry instrumentation.
    async fn call_inner<S>(mut inner: S, req: Request) -> Result<Response, Infallible>
    where
        S: Service<Request, Response = Response, Error = Infallible>,
        S::Future: Send,
    {
        #[cfg(feature = "telemetry")]
        {
            inner
                .call(req)
                .instrument(tracing::info_span!("inner"))
                .await
        }
        #[cfg(not(feature = "telemetry"))]
        {
            inner.call(req).await
        }
    }

    /// Issues a fresh challenge: one requirement per resolvable price tag,
    /// each with a new random nonce and a new validity window.
    ///
    /// Challenges are stateless; the gate does not remember what it issued.
    #[must_use]
    pub fn fresh_challenge(&self, error: Option<String>) -> PaymentRequired {
        let now = UnixTimestamp::now();
        let valid_before = now + self.challenge_window.as_secs();
        let accepts = self
            .accepts
            .iter()
            .filter_map(|tag| {
                let config = self.registry.by_name(&tag.network)?;
                let nonce: [u8; 32] = rng().random();
                Some(PaymentRequirements {
                    scheme: pay402::proto::EXACT_SCHEME.to_string(),
                    network: tag.network.clone(),
                    asset: config.asset,
                    recipient: tag.recipient,
                    amount: tag.amount,
                    resource: self.resource.clone(),
                    description: tag.description.clone(),
                    valid_after: now,
                    valid_before,
                    nonce: nonce.into(),
                })
            })
            .collect();
        PaymentRequired {
            x402_version: X402Version1,
            accepts,
            error,
        }
    }

    /// Builds the 402 response for a fresh challenge.
    ///
    /// The challenge is emitted twice: as the JSON body and base64-encoded
    /// in the `Payment-Required` header for bodyless clients.
    fn challenge_response(&self, error: Option<String>) -> Response {
        let challenge = self.fresh_challenge(error);
        let body = serde_json::to_vec(&challenge).expect("challenge serialization failed");
        let header = Base64Bytes::encode(&body);
        let header_value = HeaderValue::from_bytes(header.as_ref())
            .expect("base64 is a valid header value");

        Response::builder()
            .status(StatusCode::PAYMENT_REQUIRED)
            .header("Content-Type", "application/json")
            .header(PAYMENT_REQUIRED_HEADER, header_value)
            .body(Body::from(body))
            .expect("failed to construct 402 response")
    }
}

impl<TFacilitator> Paygate<TFacilitator>
where
    TFacilitator: Facilitator + Sync,
{
    /// Handles an incoming request, processing payment if required.
    ///
    /// Returns a fresh 402 challenge if payment is absent or declined;
    /// otherwise the response from the inner service, with the settlement
    /// receipt attached.
    ///
    /// # Errors
    ///
    /// This method is infallible (`Infallible` error type); every payment
    /// failure becomes a 402 response.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "x402.paygate.handle_request", skip_all)
    )]
    pub async fn handle_request<S>(
        &self,
        inner: S,
        req: Request,
    ) -> Result<Response, Infallible>
    where
        S: Service<Request, Response = Response, Error = Infallible>,
        S::Future: Send,
    {
        match self.handle_request_fallible(inner, req).await {
            Ok(response) => Ok(response),
            Err(err) => {
                #[cfg(feature = "telemetry")]
                tracing::debug!(error = %err, "payment rejected, issuing fresh challenge");
                Ok(self.challenge_response(Some(err.to_string())))
            }
        }
    }

    /// Handles an incoming request, returning payment failures as
    /// [`PaygateError`] instead of turning them into 402 responses.
    ///
    /// # Errors
    ///
    /// Returns [`PaygateError`] if payment processing fails at any stage.
    pub async fn handle_request_fallible<S>(
        &self,
        inner: S,
        req: Request,
    ) -> Result<Response, PaygateError>
    where
        S: Service<Request, Response = Response, Error = Infallible>,
        S::Future: Send,
    {
        let header = req
            .headers()
            .get(PAYMENT_SIGNATURE_HEADER)
            .ok_or(VerificationError::PaymentHeaderRequired)?;
        let proof =
            PaymentPayload::decode_header(header.as_bytes()).map_err(|e| {
                VerificationError::Declined {
                    reason: ErrorReason::InvalidFormat,
                    message: Some(e.to_string()),
                }
            })?;

        let verify_request = self.make_verify_request(proof)?;
        let authorization = &verify_request.payment_payload.payload.authorization;
        let network = verify_request.payment_payload.accepted.network.clone();
        let nonce = authorization.nonce;
        let valid_before = authorization.valid_before;

        // Cheap pre-check; the authoritative decision is the claim below.
        if self.replay.contains(&network, &nonce) {
            return Err(VerificationError::declined(ErrorReason::Replay).into());
        }

        let verdict = self.verify_with_retry(&verify_request).await?;
        if let VerifyResponse::Invalid { reason, message } = verdict {
            return Err(VerificationError::Declined { reason, message }.into());
        }

        // Claim happens-before settle. Of concurrent duplicates that all
        // passed the pre-check, exactly one claims; the rest are replays.
        if !self.replay.try_claim(&network, &nonce, valid_before) {
            return Err(VerificationError::declined(ErrorReason::Replay).into());
        }

        #[cfg(feature = "telemetry")]
        tracing::debug!(%network, "payment verified and claimed, settling");

        let settlement = self
            .facilitator
            .settle(&verify_request.into())
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SettlementError::Timeout
                } else {
                    SettlementError::SettlementFailed {
                        reason: ErrorReason::SettlementFailed,
                        message: Some(e.to_string()),
                    }
                }
            })?;

        // The claim is kept on failure: the authorization may have been
        // partially processed and must not be re-presented.
        if let SettleResponse::Error {
            reason, message, ..
        } = settlement
        {
            return Err(SettlementError::SettlementFailed { reason, message }.into());
        }

        let receipt = settlement_to_header(&settlement)?;

        let mut response = match Self::call_inner(inner, req).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
        response.headers_mut().insert(PAYMENT_RESPONSE_HEADER, receipt);
        Ok(response)
    }

    /// Verifies with bounded retry: transport failures, timeouts included,
    /// are retried with exponential backoff; a definitive verdict is
    /// returned immediately and never retried.
    async fn verify_with_retry(
        &self,
        request: &VerifyRequest,
    ) -> Result<VerifyResponse, VerificationError> {
        let mut delay = VERIFY_BACKOFF;
        let mut last_error: Option<<TFacilitator as Facilitator>::Error> = None;
        for attempt in 0..VERIFY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            match self.facilitator.verify(request).await {
                Ok(verdict) => return Ok(verdict),
                Err(err) => {
                    #[cfg(feature = "telemetry")]
                    tracing::warn!(attempt, error = %err, "facilitator verify attempt failed");
                    last_error = Some(err);
                }
            }
        }
        Err(match last_error {
            Some(err) if err.is_timeout() => VerificationError::Timeout,
            Some(err) => VerificationError::VerificationUnavailable(err.to_string()),
            None => VerificationError::VerificationUnavailable(
                "no verify attempt was made".to_string(),
            ),
        })
    }

    /// Runs every local check and assembles the facilitator verify request.
    ///
    /// No network I/O happens here; a proof that fails any of these checks
    /// is rejected with zero facilitator calls.
    fn make_verify_request(
        &self,
        proof: PaymentPayload,
    ) -> Result<VerifyRequest, VerificationError> {
        let accepted = &proof.accepted;
        accepted.validate().map_err(|e| VerificationError::Declined {
            reason: ErrorReason::InvalidFormat,
            message: Some(e.to_string()),
        })?;

        let config = self
            .registry
            .by_name(&accepted.network)
            .ok_or_else(|| VerificationError::declined(ErrorReason::UnsupportedNetwork))?;

        let tag = self
            .accepts
            .iter()
            .find(|tag| tag.matches(accepted, config))
            .ok_or_else(|| VerificationError::declined(ErrorReason::NoMatchingRequirement))?;

        let authorization = &proof.payload.authorization;
        if authorization.value < tag.amount {
            return Err(VerificationError::declined(ErrorReason::InvalidPaymentAmount));
        }
        if authorization.to != tag.recipient {
            return Err(VerificationError::declined(ErrorReason::RecipientMismatch));
        }

        let now = UnixTimestamp::now();
        if now < authorization.valid_after {
            return Err(VerificationError::declined(ErrorReason::InvalidPaymentEarly));
        }
        if !authorization.is_live_at(now) {
            return Err(VerificationError::declined(
                ErrorReason::InvalidPaymentExpired,
            ));
        }

        let payment_requirements = accepted.clone();
        Ok(VerifyRequest {
            x402_version: X402Version1,
            payment_payload: proof,
            payment_requirements,
        })
    }
}

/// Resolves the full URL of the protected resource.
///
/// Prefers an explicitly configured base URL; falls back to the request's
/// `Host` header, then `http://localhost`.
#[must_use]
pub fn resolve_resource(base_url: Option<&Url>, req: &Request) -> String {
    let mut url = base_url.cloned().unwrap_or_else(|| {
        let host = req
            .headers()
            .get("host")
            .and_then(|h| h.to_str().ok())
            .unwrap_or("localhost");
        let origin = format!("http://{host}");
        Url::parse(&origin).unwrap_or_else(|_| {
            Url::parse("http://localhost").expect("static URL parses")
        })
    });
    let request_uri = req.uri();
    url.set_path(request_uri.path());
    url.set_query(request_uri.query());
    url.to_string()
}

/// Converts a settlement receipt into a base64 header value.
fn settlement_to_header(settlement: &SettleResponse) -> Result<HeaderValue, PaygateError> {
    let json = serde_json::to_vec(settlement).map_err(|err| {
        PaygateError::Settlement(SettlementError::SettlementFailed {
            reason: ErrorReason::UnexpectedError,
            message: Some(err.to_string()),
        })
    })?;
    let header = Base64Bytes::encode(json);
    Ok(HeaderValue::from_bytes(header.as_ref()).expect("base64 is a valid header value"))
}
