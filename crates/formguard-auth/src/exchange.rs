//! The in-flight request being authenticated, plus response-side state.

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    http::{
        HeaderMap, HeaderValue, Method, Request, Uri,
        header::{CONTENT_TYPE, EXPECT, SET_COOKIE},
        uri::PathAndQuery,
    },
    response::Response,
};
use formguard_session::SessionId;
use futures::StreamExt;
use tracing::trace;

use crate::cookies::{RequestCookie, RequestCookies, parse_cookies};
use crate::error::{FormAuthError, Result};
use crate::locale::{RequestLocales, parse_accept_language};
use crate::principal::{AuthenticatedUser, Principal};
use crate::sso::SsoTicket;

/// Content type of HTML form submissions.
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Transport hook that writes an interim `100 Continue` to the client.
///
/// Transports that only acknowledge an `Expect: 100-continue` on request
/// insert a [`ContinueHandle`] extension. hyper acknowledges on the first
/// body read, so axum services usually leave it out.
pub trait Acknowledge: Send + Sync {
    fn send_continue(&self);
}

/// Request extension carrying the transport's [`Acknowledge`] hook.
#[derive(Clone)]
pub struct ContinueHandle(pub Arc<dyn Acknowledge>);

/// Query and form parameters of a request, parsed once and cached as an extension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParameters(Vec<(String, String)>);

impl RequestParameters {
    /// First value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn extend_from(&mut self, encoded: &[u8]) {
        self.0.extend(
            url::form_urlencoded::parse(encoded).map(|(k, v)| (k.into_owned(), v.into_owned())),
        );
    }
}

/// A request passing through the authenticator.
///
/// Besides the request itself it tracks whether the connection is secure,
/// the session the request belongs to, and headers that must be added to
/// whatever response is finally produced.
pub struct Exchange {
    request: Request<Body>,
    secure: bool,
    session_id: Option<SessionId>,
    session_cookie: Option<HeaderValue>,
    response_headers: HeaderMap,
}

impl Exchange {
    /// Wrap a request. The connection counts as secure for `https` URIs.
    pub fn new(request: Request<Body>) -> Self {
        let secure = request.uri().scheme_str() == Some("https");
        Self {
            request,
            secure,
            session_id: None,
            session_cookie: None,
            response_headers: HeaderMap::new(),
        }
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn request(&self) -> &Request<Body> {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request<Body> {
        &mut self.request
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    /// Request path as received (not decoded).
    pub fn request_uri(&self) -> &str {
        self.request.uri().path()
    }

    /// Request path with percent-escapes decoded.
    pub fn decoded_request_uri(&self) -> String {
        let raw = self.request_uri();
        urlencoding::decode(raw)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| raw.to_string())
    }

    pub fn query_string(&self) -> Option<&str> {
        self.request.uri().query()
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    pub fn set_session_id(&mut self, id: SessionId) {
        self.session_id = Some(id);
    }

    /// Set the session cookie to emit, replacing one set earlier in this exchange.
    pub fn set_session_cookie(&mut self, value: HeaderValue) {
        self.session_cookie = Some(value);
    }

    pub fn authenticated_user(&self) -> Option<&AuthenticatedUser> {
        self.request.extensions().get::<AuthenticatedUser>()
    }

    pub fn user_principal(&self) -> Option<&Principal> {
        self.authenticated_user().map(|u| &u.principal)
    }

    pub fn set_authenticated(&mut self, user: AuthenticatedUser) {
        self.request.extensions_mut().insert(user);
    }

    pub fn sso_ticket(&self) -> Option<&SsoTicket> {
        self.request.extensions().get::<SsoTicket>()
    }

    /// Cookies of the request (the replayed set, once a saved request is restored).
    pub fn cookies(&self) -> Vec<RequestCookie> {
        match self.request.extensions().get::<RequestCookies>() {
            Some(cookies) => cookies.0.clone(),
            None => parse_cookies(self.request.headers()),
        }
    }

    /// Locales of the request, most preferred first.
    pub fn locales(&self) -> Vec<String> {
        match self.request.extensions().get::<RequestLocales>() {
            Some(locales) => locales.0.clone(),
            None => parse_accept_language(self.request.headers()),
        }
    }

    /// Add a header to the eventual response.
    pub fn add_response_header(&mut self, name: axum::http::HeaderName, value: HeaderValue) {
        self.response_headers.append(name, value);
    }

    /// Take the pending response headers, session cookie included.
    pub fn take_response_headers(&mut self) -> HeaderMap {
        let mut headers = std::mem::take(&mut self.response_headers);
        if let Some(cookie) = self.session_cookie.take() {
            headers.append(SET_COOKIE, cookie);
        }
        headers
    }

    /// Split into the request and the pending response headers.
    pub fn into_parts(mut self) -> (Request<Body>, HeaderMap) {
        let headers = self.take_response_headers();
        (self.request, headers)
    }

    /// Acknowledge an `Expect: 100-continue` before the body is read.
    pub fn acknowledge_continue(&self) {
        let expects_continue = self
            .request
            .headers()
            .get(EXPECT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("100-continue"));
        if !expects_continue {
            return;
        }
        match self.request.extensions().get::<ContinueHandle>() {
            Some(handle) => handle.0.send_continue(),
            None => trace!("100-continue left to the HTTP stack"),
        }
    }

    /// Take the body, leaving an empty one in its place.
    pub fn take_body(&mut self) -> Body {
        std::mem::replace(self.request.body_mut(), Body::empty())
    }

    /// Read the whole body, failing once it grows past `limit` bytes.
    pub async fn read_body(&mut self, limit: usize) -> Result<Bytes> {
        let mut stream = self.take_body().into_data_stream();
        let mut buf = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FormAuthError::BodyRead(e.to_string()))?;
            if buf.len() + chunk.len() > limit {
                return Err(FormAuthError::BodyTooLarge { limit });
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(buf))
    }

    /// Read and discard whatever body is still attached.
    pub async fn drain_body(&mut self) -> Result<()> {
        let mut stream = self.take_body().into_data_stream();
        while let Some(chunk) = stream.next().await {
            chunk.map_err(|e| FormAuthError::BodyRead(e.to_string()))?;
        }
        Ok(())
    }

    /// Query and urlencoded-form parameters.
    ///
    /// A POSTed form body is consumed on first call; the result is cached.
    pub async fn parameters(&mut self, limit: usize) -> Result<RequestParameters> {
        if let Some(params) = self.request.extensions().get::<RequestParameters>() {
            return Ok(params.clone());
        }

        let mut params = RequestParameters::default();
        if let Some(query) = self.query_string() {
            params.extend_from(query.as_bytes());
        }

        let is_form = self
            .request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with(FORM_URLENCODED));
        if self.method() == Method::POST && is_form {
            let body = self.read_body(limit).await?;
            params.extend_from(&body);
        }

        self.request.extensions_mut().insert(params.clone());
        Ok(params)
    }

    /// Forget parsed parameters.
    pub fn clear_parameters(&mut self) {
        self.request.extensions_mut().remove::<RequestParameters>();
    }

    /// Replace the query string, keeping the path.
    pub fn set_query_string(&mut self, query: Option<&str>) -> Result<()> {
        let path = self.request_uri().to_string();
        let path_and_query = match query {
            Some(q) => format!("{path}?{q}"),
            None => path,
        };
        let mut parts = self.request.uri().clone().into_parts();
        parts.path_and_query = Some(
            path_and_query
                .parse::<PathAndQuery>()
                .map_err(|e| FormAuthError::InvalidRequest(format!("query string: {e}")))?,
        );
        *self.request.uri_mut() = Uri::from_parts(parts)
            .map_err(|e| FormAuthError::InvalidRequest(format!("uri: {e}")))?;
        Ok(())
    }
}

/// Append pending headers to a response.
pub fn apply_response_headers(mut response: Response, headers: HeaderMap) -> Response {
    let target = response.headers_mut();
    let mut last_name = None;
    for (name, value) in headers {
        // HeaderMap's owned iterator yields the name only on the first value
        if let Some(name) = name {
            last_name = Some(name);
        }
        if let Some(name) = &last_name {
            target.append(name.clone(), value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn exchange(builder: axum::http::request::Builder, body: &'static str) -> Exchange {
        Exchange::new(builder.body(Body::from(body)).unwrap())
    }

    #[tokio::test]
    async fn test_read_body_within_limit() {
        let mut ex = exchange(Request::builder().uri("/a"), "hello");
        let body = ex.read_body(5).await.unwrap();
        assert_eq!(&body[..], b"hello");
    }

    #[tokio::test]
    async fn test_read_body_over_limit_fails_closed() {
        let mut ex = exchange(Request::builder().uri("/a"), "hello world");
        let err = ex.read_body(5).await.unwrap_err();
        assert!(matches!(err, FormAuthError::BodyTooLarge { limit: 5 }));
    }

    #[tokio::test]
    async fn test_parameters_from_query_and_form() {
        let mut ex = exchange(
            Request::builder()
                .method(Method::POST)
                .uri("/login?from=query")
                .header(CONTENT_TYPE, FORM_URLENCODED),
            "j_username=alice&j_password=s%20ecret",
        );
        let params = ex.parameters(1024).await.unwrap();
        assert_eq!(params.get("from"), Some("query"));
        assert_eq!(params.get("j_username"), Some("alice"));
        assert_eq!(params.get("j_password"), Some("s ecret"));

        // Cached: body already consumed, same answer
        let again = ex.parameters(1024).await.unwrap();
        assert_eq!(again, params);

        ex.clear_parameters();
        assert!(ex.parameters(1024).await.unwrap().get("j_username").is_none());
    }

    #[tokio::test]
    async fn test_parameters_ignore_non_form_body() {
        let mut ex = exchange(
            Request::builder()
                .method(Method::POST)
                .uri("/upload")
                .header(CONTENT_TYPE, "application/json"),
            "{\"j_username\":\"x\"}",
        );
        assert!(ex.parameters(1024).await.unwrap().is_empty());
    }

    #[test]
    fn test_decoded_request_uri() {
        let ex = exchange(Request::builder().uri("/app/caf%C3%A9/j_security_check"), "");
        assert_eq!(ex.request_uri(), "/app/caf%C3%A9/j_security_check");
        assert_eq!(ex.decoded_request_uri(), "/app/café/j_security_check");
    }

    #[test]
    fn test_set_query_string() {
        let mut ex = exchange(Request::builder().uri("/app/page?old=1"), "");
        ex.set_query_string(Some("new=2&x=y")).unwrap();
        assert_eq!(ex.request().uri(), "/app/page?new=2&x=y");
        ex.set_query_string(None).unwrap();
        assert_eq!(ex.request().uri(), "/app/page");
    }

    #[test]
    fn test_https_uri_is_secure() {
        let ex = exchange(Request::builder().uri("https://example.com/x"), "");
        assert!(ex.is_secure());
        let ex = exchange(Request::builder().uri("/x"), "");
        assert!(!ex.is_secure());
    }

    #[test]
    fn test_session_cookie_replaces_previous() {
        let mut ex = exchange(Request::builder().uri("/x"), "");
        ex.set_session_cookie(HeaderValue::from_static("SID=first"));
        ex.set_session_cookie(HeaderValue::from_static("SID=second"));
        ex.add_response_header(
            axum::http::header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        );

        let headers = ex.take_response_headers();
        let cookies: Vec<_> = headers.get_all(SET_COOKIE).iter().collect();
        assert_eq!(cookies, vec!["SID=second"]);
        assert_eq!(headers.get(axum::http::header::CACHE_CONTROL).unwrap(), "no-store");
    }

    struct Counter(AtomicUsize);

    impl Acknowledge for Counter {
        fn send_continue(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_acknowledge_continue_only_when_expected() {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));

        let mut ex = exchange(Request::builder().uri("/x"), "");
        ex.request_mut()
            .extensions_mut()
            .insert(ContinueHandle(counter.clone()));
        ex.acknowledge_continue();
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);

        let mut ex = exchange(Request::builder().uri("/x").header(EXPECT, "100-continue"), "");
        ex.request_mut()
            .extensions_mut()
            .insert(ContinueHandle(counter.clone()));
        ex.acknowledge_continue();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_apply_response_headers_keeps_multiple_values() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("a=1"));
        headers.append(SET_COOKIE, HeaderValue::from_static("b=2"));

        let response = apply_response_headers(Response::new(Body::empty()), headers);
        assert_eq!(response.headers().get_all(SET_COOKIE).iter().count(), 2);
    }
}
