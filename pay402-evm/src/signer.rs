//! Client-side payment signing for EVM chains.
//!
//! [`ExactEvmClient`] is a [`SchemeClient`] that turns 402 challenges into
//! signed ERC-3009 payments. Signing goes through the [`SignerLike`]
//! abstraction so both owned and `Arc`-shared signers work.

use alloy_primitives::{Address, FixedBytes, Signature, U256};
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{SolStruct, eip712_domain};
use rand::RngExt;
use rand::rng;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use pay402::networks::{NetworkConfig, NetworkRegistry};
use pay402::proto::{
    Eip3009Authorization, ExactPayload, PaymentPayload, PaymentRequired, PaymentRequirements,
    X402Version1,
};
use pay402::scheme::{CandidateSigner, PaymentCandidate, SchemeClient, SchemeError};

use crate::types::TransferWithAuthorization;

/// A trait that abstracts signing operations, allowing both owned signers
/// and `Arc`-wrapped signers.
///
/// Alloy's `Signer` trait is not implemented for `Arc<T>`, but callers often
/// share one signer across concurrent sessions.
pub trait SignerLike: Send + Sync {
    /// Returns the address of the signer.
    fn address(&self) -> Address;

    /// Signs the given 32-byte hash.
    fn sign_hash(
        &self,
        hash: &FixedBytes<32>,
    ) -> impl Future<Output = Result<Signature, alloy_signer::Error>> + Send;
}

impl SignerLike for PrivateKeySigner {
    fn address(&self) -> Address {
        Self::address(self)
    }

    async fn sign_hash(&self, hash: &FixedBytes<32>) -> Result<Signature, alloy_signer::Error> {
        alloy_signer::Signer::sign_hash(self, hash).await
    }
}

impl<T: SignerLike> SignerLike for Arc<T> {
    fn address(&self) -> Address {
        (**self).address()
    }

    async fn sign_hash(&self, hash: &FixedBytes<32>) -> Result<Signature, alloy_signer::Error> {
        (**self).sign_hash(hash).await
    }
}

/// Builds an authorization that mirrors a requirement's economic terms.
///
/// Value, recipient, and validity window are copied verbatim; the nonce is
/// freshly random per call and is the sole replay-prevention key.
#[must_use]
pub fn authorization_for<S: SignerLike>(
    signer: &S,
    requirements: &PaymentRequirements,
) -> Eip3009Authorization {
    let nonce: [u8; 32] = rng().random();
    Eip3009Authorization {
        from: signer.address(),
        to: requirements.recipient,
        value: requirements.amount,
        valid_after: requirements.valid_after,
        valid_before: requirements.valid_before,
        nonce: FixedBytes(nonce),
    }
}

/// Signs an [`Eip3009Authorization`] as EIP-712 typed data.
///
/// The domain is the token deployment (name, version, chain id, verifying
/// contract); the message values must match the authorization exactly, as
/// the facilitator reconstructs the struct from the authorization to verify
/// the signature.
///
/// # Errors
///
/// Returns [`SchemeError::SigningError`] if the authorization's `from` does
/// not match the signer's own address, or if signing fails.
#[cfg_attr(
    feature = "telemetry",
    tracing::instrument(
        name = "x402.evm.sign_authorization",
        skip_all,
        fields(network = config.name, chain_reference = config.chain_reference)
    )
)]
pub async fn sign_authorization<S: SignerLike>(
    signer: &S,
    config: &NetworkConfig,
    authorization: &Eip3009Authorization,
) -> Result<ExactPayload, SchemeError> {
    if authorization.from != signer.address() {
        return Err(SchemeError::SigningError(format!(
            "authorization from address {} does not match signer {}",
            authorization.from,
            signer.address()
        )));
    }

    let domain = eip712_domain! {
        name: config.eip712_name,
        version: config.eip712_version,
        chain_id: config.chain_reference,
        verifying_contract: config.asset,
    };

    let message = TransferWithAuthorization {
        from: authorization.from,
        to: authorization.to,
        value: authorization.value.into(),
        validAfter: U256::from(authorization.valid_after.as_secs()),
        validBefore: U256::from(authorization.valid_before.as_secs()),
        nonce: authorization.nonce,
    };

    let hash = message.eip712_signing_hash(&domain);
    let signature = signer
        .sign_hash(&hash)
        .await
        .map_err(|e| SchemeError::SigningError(format!("{e:?}")))?;

    Ok(ExactPayload {
        signature: signature.as_bytes().into(),
        authorization: *authorization,
    })
}

/// Scheme client that signs exact-amount EVM payments.
///
/// Accepts challenge requirements whose network is present in the injected
/// registry; everything else yields no candidate.
#[derive(Debug, Clone)]
pub struct ExactEvmClient<S> {
    signer: S,
    registry: Arc<NetworkRegistry>,
}

impl<S> ExactEvmClient<S> {
    /// Creates a new exact scheme client for the given signer and networks.
    pub fn new(signer: S, registry: NetworkRegistry) -> Self {
        Self {
            signer,
            registry: Arc::new(registry),
        }
    }
}

impl<S> SchemeClient for ExactEvmClient<S>
where
    S: SignerLike + Clone + 'static,
{
    fn accept(&self, payment_required: &PaymentRequired) -> Vec<PaymentCandidate> {
        payment_required
            .accepts
            .iter()
            .filter_map(|requirements| {
                requirements.validate().ok()?;
                let config = self.registry.by_name(&requirements.network)?;
                if requirements.asset != config.asset {
                    return None;
                }
                Some(PaymentCandidate {
                    network: requirements.network.clone(),
                    chain_reference: config.chain_reference,
                    amount: requirements.amount,
                    signer: Box::new(EvmCandidateSigner {
                        signer: self.signer.clone(),
                        config: *config,
                        requirements: requirements.clone(),
                    }),
                })
            })
            .collect()
    }
}

struct EvmCandidateSigner<S> {
    signer: S,
    config: NetworkConfig,
    requirements: PaymentRequirements,
}

impl<S> CandidateSigner for EvmCandidateSigner<S>
where
    S: SignerLike,
{
    fn sign_payment(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<PaymentPayload, SchemeError>> + Send + '_>> {
        Box::pin(async move {
            let authorization = authorization_for(&self.signer, &self.requirements);
            let payload = sign_authorization(&self.signer, &self.config, &authorization).await?;
            Ok(PaymentPayload {
                x402_version: X402Version1,
                accepted: self.requirements.clone(),
                payload,
            })
        })
    }
}

/// Parses a signer from a 0x-prefixed private key string.
///
/// # Errors
///
/// Returns [`SchemeError::SigningError`] if the key is not a valid secp256k1
/// private key. The key material itself never appears in the error.
pub fn signer_from_key(private_key: &str) -> Result<PrivateKeySigner, SchemeError> {
    private_key
        .parse::<PrivateKeySigner>()
        .map_err(|_| SchemeError::SigningError("invalid private key".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::networks::{BASE, BASE_NETWORKS};
    use pay402::amount::TokenAmount;
    use pay402::proto::EXACT_SCHEME;
    use pay402::timestamp::UnixTimestamp;
    use alloy_primitives::{address, b256};

    fn test_signer() -> PrivateKeySigner {
        PrivateKeySigner::from_bytes(&b256!(
            "0x0000000000000000000000000000000000000000000000000000000000000001"
        ))
        .unwrap()
    }

    fn requirement(network: &str, amount: u64) -> PaymentRequirements {
        let config = NetworkRegistry::from_networks(BASE_NETWORKS)
            .by_name(network)
            .copied()
            .unwrap();
        let now = UnixTimestamp::now();
        PaymentRequirements {
            scheme: EXACT_SCHEME.to_string(),
            network: network.to_string(),
            asset: config.asset,
            recipient: address!("0x0000000000000000000000000000000000000abc"),
            amount: TokenAmount::from(amount),
            resource: "https://api.example.com/data".to_string(),
            description: String::new(),
            valid_after: now,
            valid_before: now + 300,
            nonce: b256!("0x1111111111111111111111111111111111111111111111111111111111111111"),
        }
    }

    #[test]
    fn authorization_mirrors_requirement_terms() {
        let signer = test_signer();
        let req = requirement("base", 1_000_000);
        let auth = authorization_for(&signer, &req);
        assert_eq!(auth.from, signer.address());
        assert_eq!(auth.to, req.recipient);
        assert_eq!(auth.value, req.amount);
        assert!(auth.valid_after >= req.valid_after);
        assert!(auth.valid_before <= req.valid_before);
    }

    #[test]
    fn nonces_are_unique_per_authorization() {
        let signer = test_signer();
        let req = requirement("base", 1_000_000);
        let a = authorization_for(&signer, &req);
        let b = authorization_for(&signer, &req);
        assert_ne!(a.nonce, b.nonce);
    }

    #[tokio::test]
    async fn signature_recovers_to_signer_address() {
        let signer = test_signer();
        let req = requirement("base", 1_000_000);
        let auth = authorization_for(&signer, &req);
        let payload = sign_authorization(&signer, &BASE, &auth).await.unwrap();

        let domain = eip712_domain! {
            name: BASE.eip712_name,
            version: BASE.eip712_version,
            chain_id: BASE.chain_reference,
            verifying_contract: BASE.asset,
        };
        let message = TransferWithAuthorization {
            from: auth.from,
            to: auth.to,
            value: auth.value.into(),
            validAfter: U256::from(auth.valid_after.as_secs()),
            validBefore: U256::from(auth.valid_before.as_secs()),
            nonce: auth.nonce,
        };
        let hash = message.eip712_signing_hash(&domain);
        let signature = Signature::try_from(payload.signature.as_ref()).unwrap();
        let recovered = signature.recover_address_from_prehash(&hash).unwrap();
        assert_eq!(recovered, signer.address());
    }

    #[tokio::test]
    async fn signing_rejects_foreign_from_address() {
        let signer = test_signer();
        let req = requirement("base", 1_000_000);
        let mut auth = authorization_for(&signer, &req);
        auth.from = address!("0x00000000000000000000000000000000000000ff");
        let err = sign_authorization(&signer, &BASE, &auth).await;
        assert!(matches!(err, Err(SchemeError::SigningError(_))));
    }

    #[test]
    fn accept_skips_unknown_networks_and_foreign_assets() {
        let client = ExactEvmClient::new(
            test_signer(),
            NetworkRegistry::from_networks(BASE_NETWORKS),
        );

        let mut foreign_asset = requirement("base", 1_000_000);
        foreign_asset.asset = address!("0x00000000000000000000000000000000000000ee");
        let mut unknown_network = requirement("base", 1_000_000);
        unknown_network.network = "polygon".to_string();

        let challenge = PaymentRequired {
            x402_version: X402Version1,
            accepts: vec![
                requirement("base", 1_000_000),
                foreign_asset,
                unknown_network,
            ],
            error: None,
        };
        let candidates = client.accept(&challenge);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].network, "base");
        assert_eq!(candidates[0].chain_reference, 8453);
    }
}
