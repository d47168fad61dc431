//! Common test utilities for integration tests.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    Extension, Router,
    body::{Body, Bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
    response::Response,
    routing::{any, get},
};
use formguard_auth::{
    AuthSessions, AuthenticatedUser, FormAuthConfig, FormAuthState, FormLoginFlow, LoginConfig,
    MemoryRealm, RequestLocales, RouterDispatcher, SecurityConstraint, TransportGuarantee,
    protect,
};
use formguard_session::SessionConfig;
use tower::ServiceExt;

/// Echo of what the application saw, as JSON.
async fn echo(
    user: Option<Extension<AuthenticatedUser>>,
    locales: Option<Extension<RequestLocales>>,
    request: Request<Body>,
) -> axum::Json<serde_json::Value> {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();
    let headers: serde_json::Map<String, serde_json::Value> = parts
        .headers
        .keys()
        .map(|name| {
            let values: Vec<_> = parts
                .headers
                .get_all(name)
                .iter()
                .map(|v| serde_json::Value::from(v.to_str().unwrap_or("")))
                .collect();
            (name.to_string(), serde_json::Value::Array(values))
        })
        .collect();
    axum::Json(serde_json::json!({
        "method": parts.method.as_str(),
        "uri": parts.uri.to_string(),
        "user": user.map(|Extension(u)| u.principal.name().to_string()),
        "locales": locales.map(|Extension(l)| l.0).unwrap_or_default(),
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
    }))
}

/// Application routes, without the authenticator.
pub fn pages() -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/app/login.html", get(|| async { "login page" }))
        .route("/app/error.html", get(|| async { "error page" }))
        .route("/app/", get(|| async { "welcome" }))
        .route("/app/admin", get(|| async { "admin" }))
        .route("/app/echo", any(echo))
        .route("/secure/page", get(|| async { "secure" }))
}

/// Options for building a test app.
#[derive(Clone)]
pub struct TestOptions {
    pub config: FormAuthConfig,
    pub redirect_port: Option<u16>,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            config: FormAuthConfig::new("/app"),
            redirect_port: Some(8443),
        }
    }
}

/// An app behind the FORM authenticator, driven through `oneshot`.
pub struct TestApp {
    router: Router,
    pub sessions: AuthSessions,
    cookie: Option<String>,
    cookie_name: String,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_options(TestOptions::default())
    }

    pub fn with_options(options: TestOptions) -> Self {
        let mut realm = MemoryRealm::new()
            .with_user("alice", "wonderland", ["user", "admin"])
            .with_user("bob", "builder", ["user"])
            .with_constraint(SecurityConstraint::new(["/app/*"]).with_any_authenticated())
            .with_constraint(SecurityConstraint::new(["/app/admin"]).with_roles(["admin"]))
            .with_constraint(SecurityConstraint::new(["/app/login.html", "/app/error.html"]))
            .with_constraint(
                SecurityConstraint::new(["/secure/*"])
                    .with_transport(TransportGuarantee::Confidential),
            );
        if let Some(port) = options.redirect_port {
            realm = realm.with_redirect_port(port);
        }

        let cookie_name = options.config.session_cookie_name.clone();
        let sessions = AuthSessions::new(SessionConfig::default());
        let pages = pages();
        let flow = FormLoginFlow::new(
            options.config,
            Arc::new(realm),
            sessions.clone(),
            Arc::new(RouterDispatcher::new(pages.clone())),
        );
        let state = FormAuthState::new(flow, LoginConfig::new("/app/login.html", "/app/error.html"));
        let router = protect(pages, state);

        Self {
            router,
            sessions,
            cookie: None,
            cookie_name,
        }
    }

    /// Send a request, carrying and updating the session cookie.
    pub async fn send(&mut self, mut request: Request<Body>) -> Result<TestResponse> {
        if let Some(cookie) = &self.cookie {
            let merged = match request.headers().get(header::COOKIE) {
                Some(existing) => format!("{}; {}", existing.to_str()?, cookie),
                None => cookie.clone(),
            };
            request
                .headers_mut()
                .insert(header::COOKIE, merged.parse()?);
        }

        let response: Response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;

        for value in headers.get_all(header::SET_COOKIE) {
            let value = value.to_str()?;
            if let Some(pair) = value.split(';').next()
                && pair.starts_with(&format!("{}=", self.cookie_name))
            {
                self.cookie = Some(pair.to_string());
            }
        }

        Ok(TestResponse {
            status,
            headers,
            body,
        })
    }

    pub async fn get(&mut self, uri: &str) -> Result<TestResponse> {
        self.send(Request::builder().uri(uri).body(Body::empty())?)
            .await
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<TestResponse> {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/app/j_security_check")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!(
                "j_username={username}&j_password={password}"
            )))?;
        self.send(request).await
    }

    pub fn session_cookie(&self) -> Option<&str> {
        self.cookie.as_deref()
    }
}

/// A buffered response.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }
}
