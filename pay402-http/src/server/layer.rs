//! Tower middleware for enforcing x402 payments on protected routes.
//!
//! [`X402Middleware`] holds the application-wide pieces (facilitator,
//! network registry, replay cache); [`PaygateLayer`] adds the per-route
//! pricing; [`PaygateService`] wraps the inner service and runs the
//! [`Paygate`] state machine on every request.
//!
//! Returns a `402 Payment Required` challenge whenever the request lacks a
//! valid, settleable payment; the wrapped handler runs only after
//! settlement succeeds.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum_core::extract::Request;
use axum_core::response::Response;
use pay402::facilitator::Facilitator;
use pay402::networks::NetworkRegistry;
use pay402::replay::{InMemoryReplayCache, ReplayCache};
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};
use url::Url;

use super::facilitator_client::FacilitatorClient;
use super::paygate::{Paygate, PriceTag, resolve_resource};

/// Length of the validity window on freshly issued challenges.
const DEFAULT_CHALLENGE_WINDOW: Duration = Duration::from_secs(300);

/// The main x402 middleware instance for enforcing payments on routes.
///
/// Create one per application, configure it with a network registry, and
/// derive per-route layers from it with [`X402Middleware::with_price_tag`].
/// All derived layers share the same replay cache.
pub struct X402Middleware<F> {
    facilitator: F,
    registry: Arc<NetworkRegistry>,
    replay: Arc<dyn ReplayCache>,
    base_url: Option<Arc<Url>>,
    challenge_window: Duration,
}

impl<F: Clone> Clone for X402Middleware<F> {
    fn clone(&self) -> Self {
        Self {
            facilitator: self.facilitator.clone(),
            registry: Arc::clone(&self.registry),
            replay: Arc::clone(&self.replay),
            base_url: self.base_url.clone(),
            challenge_window: self.challenge_window,
        }
    }
}

impl<F: std::fmt::Debug> std::fmt::Debug for X402Middleware<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X402Middleware")
            .field("facilitator", &self.facilitator)
            .field("registry", &self.registry)
            .field("base_url", &self.base_url)
            .field("challenge_window", &self.challenge_window)
            .finish_non_exhaustive()
    }
}

impl X402Middleware<Arc<FacilitatorClient>> {
    /// Creates a new middleware instance talking to the given facilitator.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn try_new(url: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let facilitator = FacilitatorClient::try_from(url)?;
        Ok(Self::with_facilitator(Arc::new(facilitator)))
    }

    /// Returns the configured facilitator URL.
    #[must_use]
    pub fn facilitator_url(&self) -> &Url {
        self.facilitator.base_url()
    }
}

impl TryFrom<&str> for X402Middleware<Arc<FacilitatorClient>> {
    type Error = Box<dyn std::error::Error>;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_new(value)
    }
}

impl<F> X402Middleware<F> {
    /// Creates a middleware instance around an existing facilitator.
    ///
    /// Useful for in-process facilitators and test fakes.
    pub fn with_facilitator(facilitator: F) -> Self {
        Self {
            facilitator,
            registry: Arc::new(NetworkRegistry::new()),
            replay: Arc::new(InMemoryReplayCache::new()),
            base_url: None,
            challenge_window: DEFAULT_CHALLENGE_WINDOW,
        }
    }

    /// Returns a reference to the underlying facilitator.
    pub const fn facilitator(&self) -> &F {
        &self.facilitator
    }
}

impl<F> X402Middleware<F>
where
    F: Clone,
{
    /// Sets the network registry used to resolve networks named in price
    /// tags and proofs.
    #[must_use]
    pub fn with_registry(&self, registry: NetworkRegistry) -> Self {
        let mut this = self.clone();
        this.registry = Arc::new(registry);
        this
    }

    /// Replaces the replay cache.
    ///
    /// By default every middleware instance owns a fresh
    /// [`InMemoryReplayCache`]; inject a shared cache to span multiple
    /// middleware instances.
    #[must_use]
    pub fn with_replay_cache(&self, replay: Arc<dyn ReplayCache>) -> Self {
        let mut this = self.clone();
        this.replay = replay;
        this
    }

    /// Sets the base URL used to construct resource URLs in challenges.
    ///
    /// If not set, the request's `Host` header is used.
    #[must_use]
    pub fn with_base_url(&self, base_url: Url) -> Self {
        let mut this = self.clone();
        this.base_url = Some(Arc::new(base_url));
        this
    }

    /// Sets how long freshly issued challenges remain valid.
    #[must_use]
    pub fn with_challenge_window(&self, window: Duration) -> Self {
        let mut this = self.clone();
        this.challenge_window = window;
        this
    }

    /// Sets the price tag for the protected route.
    ///
    /// Creates a layer builder that can be further configured with
    /// additional price tags before being applied to a route.
    #[must_use]
    pub fn with_price_tag(&self, price_tag: PriceTag) -> PaygateLayer<F> {
        PaygateLayer {
            facilitator: self.facilitator.clone(),
            registry: Arc::clone(&self.registry),
            replay: Arc::clone(&self.replay),
            base_url: self.base_url.clone(),
            challenge_window: self.challenge_window,
            accepts: vec![price_tag],
        }
    }
}

/// Per-route layer carrying the accepted payment terms.
#[derive(Clone)]
#[allow(missing_debug_implementations)] // replay cache is a dyn trait object
pub struct PaygateLayer<F> {
    facilitator: F,
    registry: Arc<NetworkRegistry>,
    replay: Arc<dyn ReplayCache>,
    base_url: Option<Arc<Url>>,
    challenge_window: Duration,
    accepts: Vec<PriceTag>,
}

impl<F> PaygateLayer<F> {
    /// Adds another payment option.
    ///
    /// Options combine with OR semantics; the client satisfies exactly one.
    #[must_use]
    pub fn with_price_tag(mut self, price_tag: PriceTag) -> Self {
        self.accepts.push(price_tag);
        self
    }
}

impl<S, F> Layer<S> for PaygateLayer<F>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
    F: Facilitator + Clone,
{
    type Service = PaygateService<F>;

    fn layer(&self, inner: S) -> Self::Service {
        PaygateService {
            facilitator: self.facilitator.clone(),
            registry: Arc::clone(&self.registry),
            replay: Arc::clone(&self.replay),
            base_url: self.base_url.clone(),
            challenge_window: self.challenge_window,
            accepts: Arc::new(self.accepts.clone()),
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

/// Tower service that enforces x402 payments on incoming requests.
#[derive(Clone)]
#[allow(missing_debug_implementations)] // boxed inner service has no Debug
pub struct PaygateService<F> {
    facilitator: F,
    registry: Arc<NetworkRegistry>,
    replay: Arc<dyn ReplayCache>,
    base_url: Option<Arc<Url>>,
    challenge_window: Duration,
    accepts: Arc<Vec<PriceTag>>,
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl<F> Service<Request> for PaygateService<F>
where
    F: Facilitator + Clone + Send + Sync + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    /// Delegates readiness polling to the wrapped inner service.
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    /// Runs the payment gate, forwarding to the wrapped service only after
    /// settlement succeeds.
    fn call(&mut self, req: Request) -> Self::Future {
        let facilitator = self.facilitator.clone();
        let registry = Arc::clone(&self.registry);
        let replay = Arc::clone(&self.replay);
        let base_url = self.base_url.clone();
        let challenge_window = self.challenge_window;
        let accepts = Arc::clone(&self.accepts);
        let inner = self.inner.clone();

        Box::pin(async move {
            let resource = resolve_resource(base_url.as_deref(), &req);
            let gate = Paygate {
                facilitator,
                registry,
                replay,
                accepts,
                resource,
                challenge_window,
            };
            gate.handle_request(inner, req).await
        })
    }
}
