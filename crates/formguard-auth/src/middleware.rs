//! Axum middleware putting an application behind the FORM login.
//!
//! The authenticator has to run before routing: a restored request may
//! carry a different method than the redirected GET it replaces. Use
//! [`protect`] rather than `Router::layer`, which runs after routing.
//!
//! ```rust,ignore
//! let pages = Router::new().route("/app/", get(home));
//! let app = protect(pages, auth_state);
//! ```

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware::{Next, from_fn_with_state},
    response::{IntoResponse, Response},
};
use tower::Layer;
use tracing::{debug, trace};

use crate::config::LoginConfig;
use crate::constraint::SecurityConstraint;
use crate::error::Result;
use crate::exchange::{Exchange, apply_response_headers};
use crate::flow::{FormLoginFlow, Outcome};
use crate::realm::UserDataPermission;

/// State shared by the authenticator middleware.
#[derive(Clone)]
pub struct FormAuthState {
    flow: Arc<FormLoginFlow>,
    login: Arc<LoginConfig>,
}

impl FormAuthState {
    pub fn new(flow: FormLoginFlow, login: LoginConfig) -> Self {
        Self {
            flow: Arc::new(flow),
            login: Arc::new(login),
        }
    }

    pub fn flow(&self) -> &FormLoginFlow {
        &self.flow
    }

    pub fn login(&self) -> &LoginConfig {
        &self.login
    }
}

/// Put `router` behind the authenticator, which runs before `router` routes.
pub fn protect(router: Router, state: FormAuthState) -> Router {
    Router::new().fallback_service(from_fn_with_state(state, form_auth_middleware).layer(router))
}

/// FORM authentication middleware function.
///
/// Authenticates requests covered by an authorization constraint, and
/// hands the restored request to the application after a login.
pub async fn form_auth_middleware(
    State(state): State<FormAuthState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let mut exchange = state.flow.prepare(request).await;

    match guard(&state, &mut exchange).await {
        Ok(None) => {
            let (request, headers) = exchange.into_parts();
            apply_response_headers(next.run(request).await, headers)
        }
        Ok(Some(response)) => {
            let headers = exchange.take_response_headers();
            apply_response_headers(response, headers)
        }
        Err(e) => {
            let headers = exchange.take_response_headers();
            apply_response_headers(e.into_response(), headers)
        }
    }
}

/// `None` lets the request through; `Some` answers it.
async fn guard(state: &FormAuthState, exchange: &mut Exchange) -> Result<Option<Response>> {
    let flow = &state.flow;

    if flow.config().is_login_action(&exchange.decoded_request_uri()) {
        return Ok(respond(flow.authenticate(exchange, &state.login).await?));
    }

    let uri = exchange.request_uri().to_string();
    let method = exchange.method().clone();
    let constraints = flow.realm().find_security_constraints(&uri, &method).await;
    if constraints.is_empty() {
        trace!(uri, "Not subject to any constraint");
        return Ok(None);
    }

    if let UserDataPermission::Denied(response) =
        flow.realm().has_user_data_permission(exchange, &constraints)
    {
        return Ok(Some(response));
    }

    if !constraints
        .iter()
        .any(SecurityConstraint::requires_authentication)
    {
        return Ok(None);
    }

    if let Some(response) = respond(flow.authenticate(exchange, &state.login).await?) {
        return Ok(Some(response));
    }

    if !flow
        .realm()
        .has_resource_permission(exchange.user_principal(), &constraints)
    {
        debug!(
            uri,
            username = exchange.user_principal().map(|p| p.name()).unwrap_or(""),
            "Access to resource denied"
        );
        return Ok(Some(StatusCode::FORBIDDEN.into_response()));
    }

    Ok(None)
}

fn respond(outcome: Outcome) -> Option<Response> {
    match outcome {
        Outcome::Proceed => None,
        Outcome::Respond(response) => Some(response),
    }
}
