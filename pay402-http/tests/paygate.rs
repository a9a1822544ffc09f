//! End-to-end tests for the server-side payment gate.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256, address};
use rand::RngExt;
use rand::rng;
use axum_core::body::Body;
use axum_core::extract::Request;
use axum_core::response::Response;
use http::StatusCode;
use serde_json::json;
use tower::{Layer, ServiceExt, service_fn};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pay402::amount::TokenAmount;
use pay402::encoding::Base64Bytes;
use pay402::networks::NetworkRegistry;
use pay402::proto::{
    Eip3009Authorization, ExactPayload, PaymentPayload, PaymentRequired, PaymentRequirements,
    X402Version1,
};
use pay402::timestamp::UnixTimestamp;
use pay402_evm::BASE_NETWORKS;
use pay402_http::server::{FacilitatorClient, PaygateService, PriceTag, X402Middleware};
use pay402_http::{PAYMENT_REQUIRED_HEADER, PAYMENT_RESPONSE_HEADER, PAYMENT_SIGNATURE_HEADER};

const RECIPIENT: Address = address!("0x0000000000000000000000000000000000000abc");
const PAYER: Address = address!("0x00000000000000000000000000000000000000f1");
const PRICE: u64 = 10_000;

fn protected_service(facilitator_url: &str) -> PaygateService<Arc<FacilitatorClient>> {
    let middleware = X402Middleware::try_new(facilitator_url)
        .unwrap()
        .with_registry(NetworkRegistry::from_networks(BASE_NETWORKS));
    let layer = middleware.with_price_tag(
        PriceTag::new("base-sepolia", TokenAmount::from(PRICE), RECIPIENT)
            .with_description("premium data"),
    );
    layer.layer(service_fn(|_req: Request| async {
        Ok::<_, Infallible>(Response::new(Body::from("paid content")))
    }))
}

/// Same gate, but with a tight per-request budget on facilitator calls.
fn protected_service_with_timeout(
    facilitator_url: &str,
    timeout: Duration,
) -> PaygateService<Arc<FacilitatorClient>> {
    let client = FacilitatorClient::try_from(facilitator_url)
        .unwrap()
        .with_timeout(timeout);
    let middleware = X402Middleware::with_facilitator(Arc::new(client))
        .with_registry(NetworkRegistry::from_networks(BASE_NETWORKS));
    let layer = middleware.with_price_tag(PriceTag::new(
        "base-sepolia",
        TokenAmount::from(PRICE),
        RECIPIENT,
    ));
    layer.layer(service_fn(|_req: Request| async {
        Ok::<_, Infallible>(Response::new(Body::from("paid content")))
    }))
}

fn parse_challenge(response: &Response) -> PaymentRequired {
    let header = response
        .headers()
        .get(PAYMENT_REQUIRED_HEADER)
        .expect("402 must carry the challenge header");
    let bytes = Base64Bytes::from(header.as_bytes()).decode().unwrap();
    PaymentRequired::parse(&bytes).unwrap()
}

/// Builds a proof whose echoed requirement matches the configured price
/// tag and whose authorization carries the given value and window.
fn random_nonce() -> B256 {
    let bytes: [u8; 32] = rng().random();
    B256::from(bytes)
}

fn proof(value: u64, valid_after: UnixTimestamp, valid_before: UnixTimestamp) -> PaymentPayload {
    proof_with_nonce(value, valid_after, valid_before, random_nonce())
}

fn proof_with_nonce(
    value: u64,
    valid_after: UnixTimestamp,
    valid_before: UnixTimestamp,
    nonce: B256,
) -> PaymentPayload {
    let accepted = PaymentRequirements {
        scheme: "exact".to_string(),
        network: "base-sepolia".to_string(),
        asset: address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e"),
        recipient: RECIPIENT,
        amount: TokenAmount::from(PRICE),
        resource: "http://localhost/data".to_string(),
        description: "premium data".to_string(),
        valid_after,
        valid_before,
        nonce: random_nonce(),
    };
    PaymentPayload {
        x402_version: X402Version1,
        payload: ExactPayload {
            signature: vec![0x42u8; 65].into(),
            authorization: Eip3009Authorization {
                from: PAYER,
                to: accepted.recipient,
                value: TokenAmount::from(value),
                valid_after,
                valid_before,
                nonce,
            },
        },
        accepted,
    }
}

fn paid_request(payload: &PaymentPayload) -> Request {
    let header = payload.encode_header().unwrap();
    Request::builder()
        .uri("/data")
        .header(
            PAYMENT_SIGNATURE_HEADER,
            std::str::from_utf8(header.as_ref()).unwrap(),
        )
        .body(Body::empty())
        .unwrap()
}

async fn mount_happy_facilitator(server: &MockServer, expected_settles: u64) {
    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "isValid": true,
            "payer": PAYER,
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/settle"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "payer": PAYER,
            "transaction": "0xdeadbeef",
            "network": "base-sepolia",
        })))
        .expect(expected_settles)
        .mount(server)
        .await;
}

#[tokio::test]
async fn missing_payment_header_yields_fresh_challenges() {
    let facilitator = MockServer::start().await;
    let svc = protected_service(&facilitator.uri());

    let first = svc
        .clone()
        .oneshot(Request::builder().uri("/data").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::PAYMENT_REQUIRED);

    let challenge = parse_challenge(&first);
    assert_eq!(challenge.accepts.len(), 1);
    let requirement = &challenge.accepts[0];
    assert_eq!(requirement.network, "base-sepolia");
    assert_eq!(requirement.recipient, RECIPIENT);
    assert_eq!(requirement.amount, TokenAmount::from(PRICE));
    assert!(requirement.valid_before > requirement.valid_after);

    // Challenges are stateless: each 402 carries a brand new nonce.
    let second = svc
        .oneshot(Request::builder().uri("/data").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let second_challenge = parse_challenge(&second);
    assert_ne!(second_challenge.accepts[0].nonce, requirement.nonce);
}

#[tokio::test]
async fn under_priced_proof_rejected_without_facilitator_calls() {
    let facilitator = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&facilitator)
        .await;

    let svc = protected_service(&facilitator.uri());
    let now = UnixTimestamp::now();
    let payload = proof(PRICE - 1, now, now + 300);

    let response = svc.oneshot(paid_request(&payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let challenge = parse_challenge(&response);
    assert!(
        challenge
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("invalid_payment_amount")
    );
}

#[tokio::test]
async fn expired_proof_rejected_without_facilitator_calls() {
    let facilitator = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&facilitator)
        .await;

    let svc = protected_service(&facilitator.uri());
    let now = UnixTimestamp::now();
    let payload = proof(PRICE, now.saturating_sub(600), now.saturating_sub(300));

    let response = svc.oneshot(paid_request(&payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let challenge = parse_challenge(&response);
    assert!(
        challenge
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("invalid_payment_expired")
    );
}

#[tokio::test]
async fn wrong_recipient_proof_rejected_locally() {
    let facilitator = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&facilitator)
        .await;

    let svc = protected_service(&facilitator.uri());
    let now = UnixTimestamp::now();
    let mut payload = proof(PRICE, now, now + 300);
    payload.payload.authorization.to = address!("0x00000000000000000000000000000000000000ee");

    let response = svc.oneshot(paid_request(&payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let challenge = parse_challenge(&response);
    assert!(
        challenge
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("recipient_mismatch")
    );
}

#[tokio::test]
async fn valid_proof_settles_and_serves_with_receipt() {
    let facilitator = MockServer::start().await;
    mount_happy_facilitator(&facilitator, 1).await;

    let svc = protected_service(&facilitator.uri());
    let now = UnixTimestamp::now();
    let payload = proof(PRICE, now, now + 300);

    let response = svc.oneshot(paid_request(&payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(PAYMENT_RESPONSE_HEADER));
}

#[tokio::test]
async fn replayed_proof_rejected_after_settlement() {
    let facilitator = MockServer::start().await;
    mount_happy_facilitator(&facilitator, 1).await;

    let svc = protected_service(&facilitator.uri());
    let now = UnixTimestamp::now();
    let payload = proof(PRICE, now, now + 300);

    let first = svc.clone().oneshot(paid_request(&payload)).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = svc.oneshot(paid_request(&payload)).await.unwrap();
    assert_eq!(second.status(), StatusCode::PAYMENT_REQUIRED);
    let challenge = parse_challenge(&second);
    assert!(
        challenge
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("replay")
    );
}

#[tokio::test]
async fn transient_verify_errors_exhaust_three_attempts() {
    let facilitator = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(ResponseTemplate::new(500).set_body_string("backend down"))
        .expect(3)
        .mount(&facilitator)
        .await;
    Mock::given(method("POST"))
        .and(path("/settle"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&facilitator)
        .await;

    let svc = protected_service(&facilitator.uri());
    let now = UnixTimestamp::now();
    let payload = proof(PRICE, now, now + 300);

    let response = svc.oneshot(paid_request(&payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let challenge = parse_challenge(&response);
    assert!(
        challenge
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("facilitator unavailable")
    );
}

#[tokio::test]
async fn definitive_invalid_verdict_is_never_retried() {
    let facilitator = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "isValid": false,
            "invalidReason": "insufficient_funds",
        })))
        .expect(1)
        .mount(&facilitator)
        .await;
    Mock::given(method("POST"))
        .and(path("/settle"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&facilitator)
        .await;

    let svc = protected_service(&facilitator.uri());
    let now = UnixTimestamp::now();
    let payload = proof(PRICE, now, now + 300);

    let response = svc.oneshot(paid_request(&payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let challenge = parse_challenge(&response);
    assert!(
        challenge
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("insufficient_funds")
    );
}

#[tokio::test]
async fn verify_timeouts_surface_as_timeout_after_retries() {
    let facilitator = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"isValid": true, "payer": PAYER}))
                .set_delay(Duration::from_secs(2)),
        )
        .expect(3)
        .mount(&facilitator)
        .await;
    Mock::given(method("POST"))
        .and(path("/settle"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&facilitator)
        .await;

    let svc = protected_service_with_timeout(&facilitator.uri(), Duration::from_millis(50));
    let now = UnixTimestamp::now();
    let payload = proof(PRICE, now, now + 300);

    let response = svc.oneshot(paid_request(&payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let challenge = parse_challenge(&response);
    assert!(
        challenge
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("verification timed out")
    );
}

#[tokio::test]
async fn settle_timeout_surfaces_as_timeout_and_keeps_the_claim() {
    let facilitator = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "isValid": true,
            "payer": PAYER,
        })))
        .expect(1)
        .mount(&facilitator)
        .await;
    Mock::given(method("POST"))
        .and(path("/settle"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "success": true,
                    "payer": PAYER,
                    "transaction": "0xdeadbeef",
                    "network": "base-sepolia",
                }))
                .set_delay(Duration::from_secs(2)),
        )
        .expect(1)
        .mount(&facilitator)
        .await;

    let svc = protected_service_with_timeout(&facilitator.uri(), Duration::from_millis(50));
    let now = UnixTimestamp::now();
    let payload = proof(PRICE, now, now + 300);

    let response = svc.clone().oneshot(paid_request(&payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let challenge = parse_challenge(&response);
    assert!(
        challenge
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("settlement timed out")
    );

    // The claim taken before settlement is kept; re-presenting the same
    // authorization is a replay, with no further facilitator calls.
    let second = svc.oneshot(paid_request(&payload)).await.unwrap();
    assert_eq!(second.status(), StatusCode::PAYMENT_REQUIRED);
    let second_challenge = parse_challenge(&second);
    assert!(
        second_challenge
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("replay")
    );
}

#[tokio::test]
async fn concurrent_duplicate_proofs_settle_exactly_once() {
    let facilitator = MockServer::start().await;
    mount_happy_facilitator(&facilitator, 1).await;

    let svc = protected_service(&facilitator.uri());
    let now = UnixTimestamp::now();
    let nonce = random_nonce();
    let a = proof_with_nonce(PRICE, now, now + 300, nonce);
    let b = proof_with_nonce(PRICE, now, now + 300, nonce);

    let (first, second) = tokio::join!(
        svc.clone().oneshot(paid_request(&a)),
        svc.clone().oneshot(paid_request(&b)),
    );
    let mut statuses = [first.unwrap().status(), second.unwrap().status()];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::OK, StatusCode::PAYMENT_REQUIRED]);
}
