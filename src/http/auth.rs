//! API key authentication.

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

/// Header carrying the caller's API key.
pub const API_KEY_HEADER: &str = "api-key";

/// API key of an authenticated request, stored as a request extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiKey(pub String);

/// Middleware that requires exactly one `Api-Key` header.
///
/// Requests without the header, with the header repeated, or with a value
/// that is not visible ASCII are answered with `403 Forbidden`. Otherwise
/// the key is inserted as an [`ApiKey`] extension for the layers and handlers
/// further in.
pub async fn require_api_key(mut request: Request, next: Next) -> Response {
    let key = {
        let mut values = request.headers().get_all(API_KEY_HEADER).iter();
        match (values.next(), values.next()) {
            (Some(value), None) => value.to_str().ok().map(str::to_owned),
            _ => None,
        }
    };

    match key {
        Some(key) => {
            request.extensions_mut().insert(ApiKey(key));
            next.run(request).await
        }
        None => {
            debug!(path = %request.uri().path(), "Rejected request without a single API key");
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

/// Key extractor that groups requests by their [`ApiKey`].
///
/// Requests that never went through [`require_api_key`] share the empty key.
pub fn api_key_of(request: &Request) -> String {
    request
        .extensions()
        .get::<ApiKey>()
        .map(|key| key.0.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Extension, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route(
                "/whoami",
                get(|Extension(key): Extension<ApiKey>| async move { key.0 }),
            )
            .layer(middleware::from_fn(require_api_key))
    }

    fn request(keys: &[&str]) -> Request {
        let mut builder = Request::builder().uri("/whoami");
        for key in keys {
            builder = builder.header(API_KEY_HEADER, *key);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_single_key_is_forwarded() {
        let response = app().oneshot(request(&["alpha"])).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"alpha");
    }

    #[tokio::test]
    async fn test_missing_key_is_forbidden() {
        let response = app().oneshot(request(&[])).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_repeated_key_is_forbidden() {
        let response = app().oneshot(request(&["alpha", "beta"])).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_api_key_of() {
        let mut req = request(&[]);
        assert_eq!(api_key_of(&req), "");

        req.extensions_mut().insert(ApiKey("alpha".to_string()));
        assert_eq!(api_key_of(&req), "alpha");
    }
}
