//! Wire format types for x402 payment messages.
//!
//! This module defines the JSON shapes exchanged between buyers, sellers,
//! and facilitators:
//!
//! - [`PaymentRequired`] - the 402 challenge body listing acceptable payments
//! - [`PaymentRequirements`] - one acceptable way to pay for a resource
//! - [`PaymentPayload`] - the signed proof a client attaches on retry
//! - [`VerifyRequest`] / [`VerifyResponse`] - facilitator verification RPC
//! - [`SettleRequest`] / [`SettleResponse`] - facilitator settlement RPC
//!
//! All types serialize to JSON with camelCase field names. Amounts and
//! timestamps are stringified integers; addresses and nonces are 0x-prefixed
//! hex.

use alloy_primitives::{Address, B256, Bytes};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::amount::TokenAmount;
use crate::encoding::Base64Bytes;
use crate::timestamp::UnixTimestamp;

/// The only payment scheme this SDK speaks: an exact-amount transfer
/// authorization.
pub const EXACT_SCHEME: &str = "exact";

/// Version marker for x402 protocol version 1.
///
/// Serializes as the integer `1` and rejects any other value on
/// deserialization, so mismatched protocol revisions fail at parse time
/// rather than deep inside verification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct X402Version1;

impl Serialize for X402Version1 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(1)
    }
}

impl<'de> Deserialize<'de> for X402Version1 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let version = u8::deserialize(deserializer)?;
        if version == 1 {
            Ok(Self)
        } else {
            Err(serde::de::Error::custom(format!(
                "unsupported x402 version: {version}"
            )))
        }
    }
}

/// One acceptable way to pay for a resource.
///
/// Issued by the seller inside a 402 challenge. Immutable once issued; the
/// authorization window and the server nonce are fresh per challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// The payment scheme (always `"exact"`).
    pub scheme: String,
    /// The network name (e.g. `"base"`).
    pub network: String,
    /// The token contract address.
    pub asset: Address,
    /// The address payment must be sent to.
    pub recipient: Address,
    /// The price in atomic units.
    pub amount: TokenAmount,
    /// The resource URL being paid for.
    pub resource: String,
    /// Human-readable description of the resource.
    #[serde(default)]
    pub description: String,
    /// Earliest time a matching authorization may execute.
    pub valid_after: UnixTimestamp,
    /// Time at which this requirement expires (exclusive).
    pub valid_before: UnixTimestamp,
    /// Server-issued challenge nonce, fresh per 402 response.
    pub nonce: B256,
}

impl PaymentRequirements {
    /// Checks the internal consistency of a received requirement.
    ///
    /// # Errors
    ///
    /// Returns [`ChallengeError::InconsistentWindow`] if the validity window
    /// is empty or inverted, or [`ChallengeError::UnsupportedScheme`] for a
    /// scheme other than `"exact"`.
    pub fn validate(&self) -> Result<(), ChallengeError> {
        if self.scheme != EXACT_SCHEME {
            return Err(ChallengeError::UnsupportedScheme(self.scheme.clone()));
        }
        if self.valid_before <= self.valid_after {
            return Err(ChallengeError::InconsistentWindow {
                valid_after: self.valid_after,
                valid_before: self.valid_before,
            });
        }
        Ok(())
    }
}

/// HTTP 402 Payment Required challenge body.
///
/// Lists every payment the seller will accept for the requested resource.
/// Alternatives combine with OR semantics: the client satisfies exactly one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    /// Protocol version (always 1).
    pub x402_version: X402Version1,
    /// Acceptable payment methods.
    #[serde(default)]
    pub accepts: Vec<PaymentRequirements>,
    /// Optional error message explaining why a prior payment was declined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PaymentRequired {
    /// Parses and validates a challenge from raw JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ChallengeError::MalformedChallenge`] if the bytes are not a
    /// well-formed challenge, or a validation error if any requirement is
    /// logically inconsistent.
    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(name = "x402.challenge.parse", skip_all)
    )]
    pub fn parse(bytes: &[u8]) -> Result<Self, ChallengeError> {
        let challenge: Self = serde_json::from_slice(bytes)
            .map_err(|e| ChallengeError::MalformedChallenge(e.to_string()))?;
        for requirement in &challenge.accepts {
            requirement.validate()?;
        }
        #[cfg(feature = "telemetry")]
        tracing::debug!(accepts = challenge.accepts.len(), "challenge parsed");
        Ok(challenge)
    }
}

/// Errors raised while parsing or validating a 402 challenge.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ChallengeError {
    /// The challenge body is missing, truncated, or not the expected JSON shape.
    #[error("malformed 402 challenge: {0}")]
    MalformedChallenge(String),
    /// A requirement's validity window is empty or inverted.
    #[error("inconsistent validity window: validBefore {valid_before} <= validAfter {valid_after}")]
    InconsistentWindow {
        /// The requirement's `validAfter`.
        valid_after: UnixTimestamp,
        /// The requirement's `validBefore`.
        valid_before: UnixTimestamp,
    },
    /// The requirement names a scheme this SDK does not implement.
    #[error("unsupported payment scheme: {0}")]
    UnsupportedScheme(String),
}

/// EIP-712 structured data for an ERC-3009 transfer authorization.
///
/// Defines who may transfer tokens, to whom, how much, and during what time
/// window. The client constructs this to exactly mirror a requirement's
/// economic terms; the `nonce` is freshly random per authorization and is
/// the sole replay-prevention key.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip3009Authorization {
    /// The address authorizing the transfer (token owner).
    pub from: Address,
    /// The recipient address.
    pub to: Address,
    /// The amount to transfer, in atomic units.
    pub value: TokenAmount,
    /// The authorization is not valid before this timestamp (inclusive).
    pub valid_after: UnixTimestamp,
    /// The authorization expires at this timestamp (exclusive).
    pub valid_before: UnixTimestamp,
    /// A unique 32-byte random nonce.
    pub nonce: B256,
}

impl Eip3009Authorization {
    /// Returns `true` if `now` falls within the authorization's validity
    /// window.
    #[must_use]
    pub fn is_live_at(&self, now: UnixTimestamp) -> bool {
        now >= self.valid_after && now < self.valid_before
    }
}

/// A signed exact-amount payment: the authorization plus its signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactPayload {
    /// The EIP-712 signature over the authorization (65 bytes for an EOA).
    pub signature: Bytes,
    /// The structured authorization data that was signed.
    pub authorization: Eip3009Authorization,
}

/// The payment proof a client attaches when retrying a 402'd request.
///
/// Embeds the requirement the client chose to satisfy (`accepted`) so the
/// seller can match it against its own configuration without guessing, plus
/// the signed payload. Created once by the client, consumed once by the
/// seller, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    /// Protocol version (always 1).
    pub x402_version: X402Version1,
    /// The requirement this payment satisfies, echoed back verbatim.
    pub accepted: PaymentRequirements,
    /// The signed authorization.
    pub payload: ExactPayload,
}

impl PaymentPayload {
    /// Encodes the proof for transport in a single header value.
    ///
    /// # Errors
    ///
    /// Returns [`ProofCodecError::Serialize`] if JSON encoding fails.
    pub fn encode_header(&self) -> Result<Base64Bytes, ProofCodecError> {
        let json = serde_json::to_vec(self).map_err(ProofCodecError::Serialize)?;
        Ok(Base64Bytes::encode(json))
    }

    /// Decodes a proof from raw header bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ProofCodecError`] if the bytes are not base64 or the decoded
    /// JSON is not a well-formed proof.
    pub fn decode_header(header: &[u8]) -> Result<Self, ProofCodecError> {
        let raw = Base64Bytes::from(header)
            .decode()
            .map_err(ProofCodecError::Base64)?;
        serde_json::from_slice(&raw).map_err(ProofCodecError::Deserialize)
    }
}

/// Errors raised while encoding or decoding a payment proof header.
#[derive(Debug, thiserror::Error)]
pub enum ProofCodecError {
    /// The header value is not valid base64.
    #[error("payment header is not valid base64: {0}")]
    Base64(#[source] base64::DecodeError),
    /// The decoded bytes are not a well-formed proof.
    #[error("payment header is not a valid payment payload: {0}")]
    Deserialize(#[source] serde_json::Error),
    /// The proof could not be serialized.
    #[error("failed to serialize payment payload: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Request to verify a payment before settlement.
///
/// Pairs the client's proof with the requirement the seller expects it to
/// satisfy. The facilitator checks the signature, the economic terms, and
/// the payer's funds without moving any.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    /// Protocol version (always 1).
    pub x402_version: X402Version1,
    /// The client's signed proof.
    pub payment_payload: PaymentPayload,
    /// The seller-side requirement being enforced.
    pub payment_requirements: PaymentRequirements,
}

/// Request to settle a verified payment.
///
/// Structurally identical to [`VerifyRequest`] on the wire, but a distinct
/// type so a verify request cannot be passed where a settle request is
/// expected. Settlement is idempotent per authorization nonce on the
/// facilitator side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettleRequest(pub VerifyRequest);

impl From<VerifyRequest> for SettleRequest {
    fn from(request: VerifyRequest) -> Self {
        Self(request)
    }
}

/// Result of a facilitator verification.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum VerifyResponse {
    /// The proof matches the requirements and passes all checks.
    Valid {
        /// The address of the payer.
        payer: Address,
    },
    /// The proof was well-formed but failed verification.
    Invalid {
        /// Machine-readable reason verification failed.
        reason: ErrorReason,
        /// Optional human-readable description of the failure.
        message: Option<String>,
    },
}

impl VerifyResponse {
    /// Returns `true` if the verification succeeded.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponseWire {
    is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    payer: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invalid_reason: Option<ErrorReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invalid_message: Option<String>,
}

impl Serialize for VerifyResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            Self::Valid { payer } => VerifyResponseWire {
                is_valid: true,
                payer: Some(*payer),
                invalid_reason: None,
                invalid_message: None,
            },
            Self::Invalid { reason, message } => VerifyResponseWire {
                is_valid: false,
                payer: None,
                invalid_reason: Some(*reason),
                invalid_message: message.clone(),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for VerifyResponse {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = VerifyResponseWire::deserialize(deserializer)?;
        if wire.is_valid {
            let payer = wire
                .payer
                .ok_or_else(|| serde::de::Error::missing_field("payer"))?;
            Ok(Self::Valid { payer })
        } else {
            let reason = wire
                .invalid_reason
                .ok_or_else(|| serde::de::Error::missing_field("invalidReason"))?;
            Ok(Self::Invalid {
                reason,
                message: wire.invalid_message,
            })
        }
    }
}

/// Result of a facilitator settlement.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SettleResponse {
    /// Settlement succeeded.
    Success {
        /// The address that paid.
        payer: Address,
        /// Settlement reference issued by the facilitator
        /// (transaction hash or internal record id).
        transaction: String,
        /// The network where settlement occurred.
        network: String,
    },
    /// Settlement failed.
    Error {
        /// Machine-readable reason for failure.
        reason: ErrorReason,
        /// Optional human-readable description of the failure.
        message: Option<String>,
        /// The network where settlement was attempted.
        network: String,
    },
}

impl SettleResponse {
    /// Returns `true` if the settlement succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettleResponseWire {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_reason: Option<ErrorReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payer: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transaction: Option<String>,
    network: String,
}

impl Serialize for SettleResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            Self::Success {
                payer,
                transaction,
                network,
            } => SettleResponseWire {
                success: true,
                error_reason: None,
                error_message: None,
                payer: Some(*payer),
                transaction: Some(transaction.clone()),
                network: network.clone(),
            },
            Self::Error {
                reason,
                message,
                network,
            } => SettleResponseWire {
                success: false,
                error_reason: Some(*reason),
                error_message: message.clone(),
                payer: None,
                transaction: None,
                network: network.clone(),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SettleResponse {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = SettleResponseWire::deserialize(deserializer)?;
        if wire.success {
            let payer = wire
                .payer
                .ok_or_else(|| serde::de::Error::missing_field("payer"))?;
            let transaction = wire
                .transaction
                .ok_or_else(|| serde::de::Error::missing_field("transaction"))?;
            Ok(Self::Success {
                payer,
                transaction,
                network: wire.network,
            })
        } else {
            let reason = wire
                .error_reason
                .ok_or_else(|| serde::de::Error::missing_field("errorReason"))?;
            Ok(Self::Error {
                reason,
                message: wire.error_message,
                network: wire.network,
            })
        }
    }
}

/// Machine-readable reason codes for declined or failed payments.
///
/// Carried in 402 challenge bodies and facilitator responses so clients can
/// handle failures programmatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorReason {
    /// The proof header or payload format is invalid.
    InvalidFormat,
    /// The authorized value is below the required amount.
    InvalidPaymentAmount,
    /// The authorization is not yet valid.
    InvalidPaymentEarly,
    /// The authorization has expired.
    InvalidPaymentExpired,
    /// The recipient address does not match the requirement.
    RecipientMismatch,
    /// The token asset does not match the requirement.
    AssetMismatch,
    /// The network is not supported by this seller.
    UnsupportedNetwork,
    /// The echoed requirement matches none the seller offered.
    NoMatchingRequirement,
    /// The authorization nonce was already consumed.
    Replay,
    /// The signature does not verify against the authorization.
    InvalidSignature,
    /// The payer's on-chain balance cannot cover the payment.
    InsufficientFunds,
    /// The facilitator could not be reached for verification.
    VerificationUnavailable,
    /// Settlement was attempted and failed.
    SettlementFailed,
    /// An unexpected error occurred.
    UnexpectedError,
}

impl ErrorReason {
    /// Returns the wire-format string for this reason.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidFormat => "invalid_format",
            Self::InvalidPaymentAmount => "invalid_payment_amount",
            Self::InvalidPaymentEarly => "invalid_payment_early",
            Self::InvalidPaymentExpired => "invalid_payment_expired",
            Self::RecipientMismatch => "recipient_mismatch",
            Self::AssetMismatch => "asset_mismatch",
            Self::UnsupportedNetwork => "unsupported_network",
            Self::NoMatchingRequirement => "no_matching_requirement",
            Self::Replay => "replay",
            Self::InvalidSignature => "invalid_signature",
            Self::InsufficientFunds => "insufficient_funds",
            Self::VerificationUnavailable => "verification_unavailable",
            Self::SettlementFailed => "settlement_failed",
            Self::UnexpectedError => "unexpected_error",
        }
    }
}

impl std::fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, b256};

    fn requirement() -> PaymentRequirements {
        PaymentRequirements {
            scheme: EXACT_SCHEME.to_string(),
            network: "base".to_string(),
            asset: address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
            recipient: address!("0x0000000000000000000000000000000000000abc"),
            amount: TokenAmount::from(1_000_000u64),
            resource: "https://api.example.com/weather".to_string(),
            description: "weather data".to_string(),
            valid_after: UnixTimestamp::from_secs(1_700_000_000),
            valid_before: UnixTimestamp::from_secs(1_700_000_300),
            nonce: b256!("0x1111111111111111111111111111111111111111111111111111111111111111"),
        }
    }

    fn proof() -> PaymentPayload {
        let accepted = requirement();
        PaymentPayload {
            x402_version: X402Version1,
            payload: ExactPayload {
                signature: Bytes::from(vec![0x42u8; 65]),
                authorization: Eip3009Authorization {
                    from: address!("0x00000000000000000000000000000000000000f1"),
                    to: accepted.recipient,
                    value: accepted.amount,
                    valid_after: accepted.valid_after,
                    valid_before: accepted.valid_before,
                    nonce: b256!(
                        "0x2222222222222222222222222222222222222222222222222222222222222222"
                    ),
                },
            },
            accepted,
        }
    }

    #[test]
    fn challenge_round_trips_through_json() {
        let challenge = PaymentRequired {
            x402_version: X402Version1,
            accepts: vec![requirement()],
            error: None,
        };
        let json = serde_json::to_vec(&challenge).unwrap();
        let parsed = PaymentRequired::parse(&json).unwrap();
        assert_eq!(parsed.accepts, challenge.accepts);
    }

    #[test]
    fn challenge_uses_camel_case_field_names() {
        let json = serde_json::to_value(&requirement()).unwrap();
        for key in ["validAfter", "validBefore", "amount", "recipient", "nonce"] {
            assert!(json.get(key).is_some(), "missing field {key}");
        }
    }

    #[test]
    fn parse_rejects_inverted_window() {
        let mut req = requirement();
        req.valid_before = UnixTimestamp::from_secs(0);
        let challenge = PaymentRequired {
            x402_version: X402Version1,
            accepts: vec![req],
            error: None,
        };
        let json = serde_json::to_vec(&challenge).unwrap();
        assert!(matches!(
            PaymentRequired::parse(&json),
            Err(ChallengeError::InconsistentWindow { .. })
        ));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            PaymentRequired::parse(b"not json"),
            Err(ChallengeError::MalformedChallenge(_))
        ));
    }

    #[test]
    fn parse_rejects_unknown_version() {
        let json = br#"{"x402Version":3,"accepts":[]}"#;
        assert!(PaymentRequired::parse(json).is_err());
    }

    #[test]
    fn proof_header_round_trips_bit_for_bit() {
        let original = proof();
        let header = original.encode_header().unwrap();
        let decoded = PaymentPayload::decode_header(header.as_ref()).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(
            decoded.payload.signature, original.payload.signature,
            "signature bytes must survive the round trip unchanged"
        );
    }

    #[test]
    fn verify_response_wire_format() {
        let valid = VerifyResponse::Valid {
            payer: address!("0x00000000000000000000000000000000000000f1"),
        };
        let json = serde_json::to_value(&valid).unwrap();
        assert_eq!(json["isValid"], true);

        let invalid = VerifyResponse::Invalid {
            reason: ErrorReason::Replay,
            message: None,
        };
        let json = serde_json::to_value(&invalid).unwrap();
        assert_eq!(json["isValid"], false);
        assert_eq!(json["invalidReason"], "replay");

        let back: VerifyResponse = serde_json::from_value(json).unwrap();
        assert!(!back.is_valid());
    }

    #[test]
    fn settle_response_wire_format() {
        let success = SettleResponse::Success {
            payer: address!("0x00000000000000000000000000000000000000f1"),
            transaction: "0xdeadbeef".to_string(),
            network: "base".to_string(),
        };
        let json = serde_json::to_value(&success).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["transaction"], "0xdeadbeef");

        let back: SettleResponse = serde_json::from_value(json).unwrap();
        assert!(back.is_success());
    }
}
