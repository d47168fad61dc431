//! Serve command - runs the demo application behind the FORM login.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result, anyhow};
use axum::{
    Extension, Json, Router,
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, Method},
    middleware::{self, Next},
    response::{Html, Response},
    routing::{any, get},
};
use clap::Args;
use console::style;
use formguard_auth::{
    AuthSessions, AuthenticatedUser, FormAuthConfig, FormAuthState, FormLoginFlow, LoginConfig,
    MemoryRealm, RequestLocales, RouterDispatcher, SecurityConstraint, TransportGuarantee,
    protect,
};
use formguard_config::{AuthConfig, FormGuardConfig, TransportConfig};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::Context;

/// Arguments for the serve command.
///
/// CLI arguments override config file values.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind to (overrides config)
    #[arg(short, long)]
    pub bind: Option<String>,
}

/// Run the serve command.
pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    for warning in &loaded.warnings {
        warn!("{}", warning);
    }
    let config = loaded.config;
    let server = config.server();
    let auth = config.auth();

    let bind = args.bind.unwrap_or_else(|| server.bind.clone());
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("Invalid bind address '{bind}'"))?;

    let auth_config = form_auth_config(&config);
    let realm = build_realm(&config, &auth)?;
    if realm.user_count() == 0 {
        warn!("No [[users]] configured; nobody can log in");
    }

    let sessions = AuthSessions::new(session_config(&config));
    let cleanup = sessions.spawn_cleanup_task();

    let pages = demo_routes(&auth, &server.bind);
    let flow = FormLoginFlow::new(
        auth_config,
        Arc::new(realm),
        sessions,
        Arc::new(RouterDispatcher::new(pages.clone())),
    );
    let state = FormAuthState::new(flow, LoginConfig::new(&auth.login_page, &auth.error_page));

    let mut app = protect(pages, state);
    if server.request_logging {
        app = app.layer(middleware::from_fn(request_logging_middleware));
    }
    let app = app.layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(addr = %addr, context_path = %auth.context_path, "formguard listening");
    println!(
        "{} http://{}{}/",
        style("formguard listening on").green(),
        addr,
        auth.context_path
    );
    if ctx.verbose {
        println!("  login page: {}", auth.login_page);
        println!("  error page: {}", auth.error_page);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = cleanup {
        handle.abort();
    }
    info!("formguard stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Config mapping
// ─────────────────────────────────────────────────────────────────────────────

fn form_auth_config(config: &FormGuardConfig) -> FormAuthConfig {
    let server = config.server();
    let auth = config.auth();
    let session = config.session();

    FormAuthConfig::new(auth.context_path)
        .with_cache(auth.cache)
        .with_max_save_post_size(auth.max_save_post_size)
        .with_change_session_id_on_authentication(auth.change_session_id_on_authentication)
        .with_session_cookie_name(session.cookie_name)
        .with_secure_cookie(session.secure_cookie)
        .with_trust_forwarded_proto(server.trust_forwarded_proto)
}

fn session_config(config: &FormGuardConfig) -> formguard_session::SessionConfig {
    let session = config.session();
    let store = formguard_session::SessionConfig::new()
        .with_max_sessions(session.max_sessions)
        .with_cleanup_interval(Duration::from_secs(session.cleanup_interval_secs.max(1)));
    if session.ttl_secs == 0 {
        store.without_ttl()
    } else {
        store.with_ttl(Duration::from_secs(session.ttl_secs))
    }
}

/// Realm from `[[users]]` and `[[constraints]]`.
///
/// Without configured constraints the whole context requires a login,
/// `<context>/admin` requires the `admin` role and the login and error
/// pages stay public.
fn build_realm(config: &FormGuardConfig, auth: &AuthConfig) -> Result<MemoryRealm> {
    let mut realm = MemoryRealm::new();
    for user in &config.users {
        realm = realm.with_user(&user.username, &user.password, user.roles.iter().cloned());
    }
    if let Some(port) = config.server().redirect_port {
        realm = realm.with_redirect_port(port);
    }

    if config.constraints.is_empty() {
        let ctx = &auth.context_path;
        return Ok(realm
            .with_constraint(SecurityConstraint::new([format!("{ctx}/*")]).with_any_authenticated())
            .with_constraint(SecurityConstraint::new([format!("{ctx}/admin")]).with_roles(["admin"]))
            .with_constraint(SecurityConstraint::new([
                auth.login_page.clone(),
                auth.error_page.clone(),
            ])));
    }

    for c in &config.constraints {
        let methods = c
            .methods
            .iter()
            .map(|m| {
                Method::from_bytes(m.to_ascii_uppercase().as_bytes())
                    .map_err(|_| anyhow!("Invalid HTTP method '{m}' in constraint"))
            })
            .collect::<Result<Vec<_>>>()?;
        let transport = match c.transport {
            TransportConfig::None => TransportGuarantee::None,
            TransportConfig::Integral => TransportGuarantee::Integral,
            TransportConfig::Confidential => TransportGuarantee::Confidential,
        };
        let mut constraint = SecurityConstraint::new(c.url_patterns.iter().cloned())
            .with_methods(methods)
            .with_transport(transport);
        if let Some(roles) = &c.roles {
            constraint = constraint.with_roles(roles.iter().cloned());
        }
        realm = realm.with_constraint(constraint);
    }
    Ok(realm)
}

// ─────────────────────────────────────────────────────────────────────────────
// Demo application
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
struct DemoState {
    context_path: String,
    bind: String,
}

/// Application routes, served with and without the authenticator in front.
fn demo_routes(auth: &AuthConfig, bind: &str) -> Router {
    let ctx = &auth.context_path;
    let state = DemoState {
        context_path: ctx.clone(),
        bind: bind.to_string(),
    };
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route(&auth.login_page, get(login_page))
        .route(&auth.error_page, get(error_page))
        .route(&format!("{ctx}/"), get(welcome))
        .route(&format!("{ctx}/echo"), any(echo))
        .route(&format!("{ctx}/admin"), get(admin))
        .with_state(state)
}

async fn login_page(State(demo): State<DemoState>) -> Html<String> {
    Html(format!(
        r#"<!doctype html>
<html><head><title>Log in</title></head>
<body>
<h1>Log in</h1>
<form method="POST" action="{ctx}/j_security_check">
  <label>Username <input name="j_username" autofocus></label>
  <label>Password <input name="j_password" type="password"></label>
  <button type="submit">Log in</button>
</form>
</body></html>
"#,
        ctx = demo.context_path
    ))
}

async fn error_page(State(demo): State<DemoState>) -> Html<String> {
    Html(format!(
        r#"<!doctype html>
<html><head><title>Login failed</title></head>
<body>
<h1>Login failed</h1>
<p>Unknown user or wrong password. <a href="{ctx}/">Try again</a>.</p>
</body></html>
"#,
        ctx = demo.context_path
    ))
}

async fn welcome(
    State(demo): State<DemoState>,
    user: Option<Extension<AuthenticatedUser>>,
) -> Html<String> {
    let (name, roles, auth_type) = match &user {
        Some(Extension(user)) => (
            user.principal.name(),
            user.principal.roles().join(", "),
            user.auth_type.as_str(),
        ),
        None => ("guest", String::new(), "nothing"),
    };
    Html(format!(
        r#"<!doctype html>
<html><head><title>Welcome</title></head>
<body>
<h1>Welcome, {name}</h1>
<p>Roles: {roles}. Authenticated by {auth_type} on {bind}.</p>
<p><a href="{ctx}/echo?from=welcome">Echo</a> | <a href="{ctx}/admin">Admin</a></p>
</body></html>
"#,
        bind = demo.bind,
        ctx = demo.context_path,
    ))
}

async fn admin(user: Option<Extension<AuthenticatedUser>>) -> String {
    format!("Admin area for {}\n", principal_name(&user))
}

fn principal_name(user: &Option<Extension<AuthenticatedUser>>) -> &str {
    user.as_ref()
        .map(|Extension(user)| user.principal.name())
        .unwrap_or("guest")
}

/// Shows the request the application received, to make replays visible.
async fn echo(
    user: Option<Extension<AuthenticatedUser>>,
    locales: Option<Extension<RequestLocales>>,
    method: Method,
    request_headers: HeaderMap,
    request: Request<Body>,
) -> Json<serde_json::Value> {
    let uri = request.uri().to_string();
    let body: Bytes = axum::body::to_bytes(request.into_body(), 64 * 1024)
        .await
        .unwrap_or_default();
    let headers: serde_json::Map<String, serde_json::Value> = request_headers
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                serde_json::Value::from(value.to_str().unwrap_or("<binary>")),
            )
        })
        .collect();

    Json(serde_json::json!({
        "user": principal_name(&user),
        "method": method.as_str(),
        "uri": uri,
        "locales": locales.map(|Extension(l)| l.0).unwrap_or_default(),
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Request logging
// ─────────────────────────────────────────────────────────────────────────────

/// Log method, path, status and duration of every request.
async fn request_logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();
    if status.is_server_error() {
        tracing::error!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        tracing::warn!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request completed with client error"
        );
    } else {
        tracing::info!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request completed"
        );
    }
    response
}
