//! Server-side forwarding to the login and error pages.

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{
        Method, Request,
        header::{CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING},
    },
    response::Response,
};
use tower::ServiceExt;

use crate::error::{FormAuthError, Result};
use crate::exchange::Exchange;

/// Request extension on a forwarded request: the URI the client actually asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedRequest {
    pub original_uri: String,
}

/// Produces the response for a page without a client round trip.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn forward(&self, request: Request<Body>) -> Result<Response>;
}

/// Dispatches into an axum router.
///
/// The router must not itself be wrapped by the authenticator, or
/// forwarding to the login page would be authenticated again.
#[derive(Clone)]
pub struct RouterDispatcher {
    router: Router,
}

impl RouterDispatcher {
    pub fn new(router: Router) -> Self {
        Self { router }
    }
}

#[async_trait]
impl Dispatcher for RouterDispatcher {
    async fn forward(&self, request: Request<Body>) -> Result<Response> {
        // Router's error type is Infallible
        match self.router.clone().oneshot(request).await {
            Ok(response) => Ok(response),
            Err(never) => match never {},
        }
    }
}

/// Build the GET request that renders `path` for the client of `exchange`.
///
/// Headers are carried over except those describing the original body.
pub fn forward_request(exchange: &Exchange, path: &str) -> Result<Request<Body>> {
    let mut headers = exchange.request().headers().clone();
    headers.remove(CONTENT_LENGTH);
    headers.remove(CONTENT_TYPE);
    headers.remove(TRANSFER_ENCODING);

    let mut request = Request::builder()
        .method(Method::GET)
        .uri(path)
        .body(Body::empty())
        .map_err(|e| FormAuthError::Dispatch(format!("invalid forward target {path}: {e}")))?;
    *request.headers_mut() = headers;
    request.extensions_mut().insert(ForwardedRequest {
        original_uri: exchange.request_uri().to_string(),
    });
    Ok(request)
}
