//! Sample HTTP server.

use axum::{extract::Request, middleware, routing::get, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::{RatekeeperError, Result};
use crate::http::{require_api_key, RateLimitLayer};
use crate::ratelimit::RateLimiter;

/// Build the sample router.
///
/// API key authentication runs before rate limiting, so the limiter always
/// sees the caller's [`ApiKey`](crate::http::ApiKey).
pub fn router(limiter: Arc<dyn RateLimiter<Request>>) -> Router {
    Router::new()
        .route("/sample", get(sample))
        .layer(RateLimitLayer::new(limiter))
        .layer(middleware::from_fn(require_api_key))
}

async fn sample() -> &'static str {
    "Hello world!"
}

/// HTTP server for the sample endpoint.
pub struct HttpServer {
    listener: TcpListener,
    limiter: Arc<dyn RateLimiter<Request>>,
}

impl HttpServer {
    /// Bind to `addr`; port 0 picks a free port.
    pub async fn bind(addr: SocketAddr, limiter: Arc<dyn RateLimiter<Request>>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, limiter })
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the process is killed.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Serve until `signal` resolves, then drain in-flight requests.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(addr = %self.local_addr()?, "Starting HTTP server");

        axum::serve(self.listener, router(self.limiter))
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                RatekeeperError::Io(e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{api_key_of, API_KEY_HEADER};
    use crate::ratelimit::builders::keyed_sliding_log_with;
    use crate::ratelimit::{ManualClock, Rate, DEFAULT_SWEEP_INTERVAL};
    use crate::scheduler::{ManualScheduler, TokioScheduler};
    use axum::{body::Body, http::StatusCode};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tower::ServiceExt;

    fn get_sample(key: Option<&str>) -> Request {
        let mut builder = Request::builder().uri("/sample");
        if let Some(key) = key {
            builder = builder.header(API_KEY_HEADER, key);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_limits_per_api_key() {
        let clock = Arc::new(ManualClock::new());
        let scheduler = Arc::new(ManualScheduler::new(clock.clone()));
        let rate = Rate::new(2, Duration::from_secs(60)).unwrap();
        let limiter = keyed_sliding_log_with(
            rate,
            clock.clone(),
            DEFAULT_SWEEP_INTERVAL,
            api_key_of,
            scheduler.clone(),
        );
        let app = router(limiter.clone());

        for _ in 0..2 {
            let response = app.clone().oneshot(get_sample(Some("alpha"))).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = app.clone().oneshot(get_sample(Some("alpha"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let response = app.clone().oneshot(get_sample(Some("beta"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(limiter.len(), 2);

        clock.advance(Duration::from_secs(60));
        scheduler.run_due();
        let response = app.oneshot(get_sample(Some("alpha"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_auth_runs_before_limiting() {
        let clock = Arc::new(ManualClock::new());
        let scheduler = Arc::new(ManualScheduler::new(clock.clone()));
        let rate = Rate::new(1, Duration::from_secs(60)).unwrap();
        let limiter = keyed_sliding_log_with(
            rate,
            clock,
            DEFAULT_SWEEP_INTERVAL,
            api_key_of,
            scheduler,
        );
        let app = router(limiter.clone());

        let response = app.oneshot(get_sample(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(limiter.is_empty());
    }

    #[tokio::test]
    async fn test_serve_with_shutdown() {
        let scheduler = Arc::new(TokioScheduler::current());
        let rate = Rate::new(10, Duration::from_secs(1)).unwrap();
        let limiter =
            crate::ratelimit::builders::keyed_sliding_log(rate, api_key_of, scheduler.clone());

        let server = HttpServer::bind("127.0.0.1:0".parse().unwrap(), limiter)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve_with_shutdown(async {
            let _ = rx.await;
        }));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = "GET /sample HTTP/1.1\r\n\
                       Host: localhost\r\n\
                       Api-Key: alpha\r\n\
                       Connection: close\r\n\r\n";
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("Hello world!"));

        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
        scheduler.shutdown();
    }
}
