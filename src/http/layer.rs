//! Rate limit middleware layer.

use axum::{
    extract::Request,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use std::{
    convert::Infallible,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::debug;

use crate::ratelimit::{Rate, RateLimiter, SlidingLogRateLimiter};
use crate::scheduler::CleanupScheduler;

/// Layer that rejects requests the wrapped limiter does not admit.
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<dyn RateLimiter<Request>>,
}

impl RateLimitLayer {
    pub fn new(limiter: Arc<dyn RateLimiter<Request>>) -> Self {
        Self { limiter }
    }

    /// A layer with its own sliding-log limiter shared by every caller.
    ///
    /// Meant for a single route through `MethodRouter::layer` or
    /// `Router::route_layer`; routes without the layer stay unlimited.
    pub fn per_route(rate: Rate, scheduler: Arc<dyn CleanupScheduler>) -> Self {
        debug!(%rate, "Creating per-route rate limiter");
        Self::new(SlidingLogRateLimiter::new(rate, scheduler))
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitMiddleware {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RateLimitMiddleware<S> {
    inner: S,
    limiter: Arc<dyn RateLimiter<Request>>,
}

impl<S> Service<Request> for RateLimitMiddleware<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let decision = self.limiter.accept(&req);

        if let Some(retry_after) = decision.retry_after_secs() {
            debug!(path = %req.uri().path(), retry_after, "Request rate limited");
            return Box::pin(async move { Ok(too_many_requests(retry_after)) });
        }

        // Swap in the clone so the instance polled ready is the one called.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(async move { inner.call(req).await })
    }
}

fn too_many_requests(retry_after: u64) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, retry_after.to_string())],
        format!("Rate limit exceeded. Try again in {} seconds", retry_after),
    )
        .into_response()
}

impl std::fmt::Debug for RateLimitLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitLayer").finish_non_exhaustive()
    }
}
