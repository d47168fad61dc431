//! The FORM login state machine.
//!
//! Every request reaching [`FormLoginFlow::authenticate`] lands in exactly one
//! of five branches, tried in order:
//!
//! 1. already authenticated (and not a login submission): proceed
//! 2. principal caching disabled: re-check the credentials kept in the session
//! 3. redirect back to a saved request after login: restore it and proceed
//! 4. anything else that is not a login submission: save it, show the login page
//! 5. login submission: verify credentials, redirect to the saved request
//!
//! A login submission always skips branch 1, so posting to
//! `j_security_check` while logged in authenticates again.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header::LOCATION},
    response::{IntoResponse, Response},
};
use formguard_session::SessionId;
use tracing::{debug, warn};

use crate::config::{FORM_PASSWORD, FORM_USERNAME, FormAuthConfig, LoginConfig};
use crate::cookies::{find_cookie, session_cookie};
use crate::dispatch::{Dispatcher, forward_request};
use crate::error::{FormAuthError, Result};
use crate::exchange::Exchange;
use crate::principal::{AuthType, AuthenticatedUser, Principal};
use crate::realm::{Realm, UserDataPermission};
use crate::saved_request::SavedRequestStore;
use crate::sso::{SingleSignOn, SsoTicket};
use crate::state::{AuthSessions, Credentials};

/// Header a TLS-terminating proxy sets to the client-facing scheme.
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Result of running the login flow on a request.
#[derive(Debug)]
pub enum Outcome {
    /// Let the (possibly restored) request through to the application.
    Proceed,
    /// The flow produced the response itself.
    Respond(Response),
}

impl Outcome {
    pub fn is_proceed(&self) -> bool {
        matches!(self, Outcome::Proceed)
    }
}

/// FORM authentication for one application.
pub struct FormLoginFlow {
    config: Arc<FormAuthConfig>,
    realm: Arc<dyn Realm>,
    sessions: AuthSessions,
    dispatcher: Arc<dyn Dispatcher>,
    sso: Option<Arc<dyn SingleSignOn>>,
    saved: SavedRequestStore,
}

impl FormLoginFlow {
    pub fn new(
        config: FormAuthConfig,
        realm: Arc<dyn Realm>,
        sessions: AuthSessions,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        let saved = SavedRequestStore::new(config.max_save_post_size);
        Self {
            config: Arc::new(config),
            realm,
            sessions,
            dispatcher,
            sso: None,
            saved,
        }
    }

    /// Associate sessions with an SSO registry when a request carries an SSO ticket.
    pub fn with_sso(mut self, sso: Arc<dyn SingleSignOn>) -> Self {
        self.sso = Some(sso);
        self
    }

    pub fn config(&self) -> &FormAuthConfig {
        &self.config
    }

    pub fn realm(&self) -> &Arc<dyn Realm> {
        &self.realm
    }

    pub fn sessions(&self) -> &AuthSessions {
        &self.sessions
    }

    pub fn saved_requests(&self) -> &SavedRequestStore {
        &self.saved
    }

    /// Wrap an incoming request, resolving its session and any cached principal.
    pub async fn prepare(&self, request: Request<Body>) -> Exchange {
        let secure = request.uri().scheme_str() == Some("https")
            || (self.config.trust_forwarded_proto
                && request
                    .headers()
                    .get(X_FORWARDED_PROTO)
                    .and_then(|v| v.to_str().ok())
                    .is_some_and(|v| v.eq_ignore_ascii_case("https")));
        let session_id = find_cookie(request.headers(), &self.config.session_cookie_name)
            .and_then(|value| value.parse::<SessionId>().ok());

        let mut exchange = Exchange::new(request).with_secure(secure);
        let Some(id) = session_id else {
            return exchange;
        };

        let cached = self
            .sessions
            .with_ref(&id, |state| {
                state
                    .principal()
                    .cloned()
                    .zip(state.auth_type())
            })
            .await;
        let Some(cached) = cached else {
            debug!(session_id = %id, "Session cookie names no live session");
            return exchange;
        };

        exchange.set_session_id(id);
        if self.config.cache
            && let Some((principal, auth_type)) = cached
        {
            exchange.set_authenticated(AuthenticatedUser {
                principal,
                auth_type,
                session_id: Some(id),
            });
        }
        exchange
    }

    /// Run the login flow.
    pub async fn authenticate(
        &self,
        exchange: &mut Exchange,
        login: &LoginConfig,
    ) -> Result<Outcome> {
        let decoded_uri = exchange.decoded_request_uri();
        let login_action = self.config.is_login_action(&decoded_uri);

        // Already authenticated?
        if !login_action && let Some(principal) = exchange.user_principal() {
            debug!(username = principal.name(), "Already authenticated");
            if exchange.sso_ticket().is_some() {
                self.ensure_session(exchange).await?;
            }
            return Ok(Outcome::Proceed);
        }

        // Re-authenticate from the session when principals are not cached
        if !self.config.cache && !login_action {
            let session_id = self.ensure_session(exchange).await?;
            let credentials = self
                .sessions
                .with_ref(&session_id, |state| state.credentials().cloned())
                .await
                .flatten();
            if let Some(credentials) = credentials {
                debug!(username = %credentials.username, "Reauthenticating");
                let principal = self
                    .realm
                    .authenticate(&credentials.username, &credentials.password)
                    .await;
                match principal {
                    Some(principal) => {
                        let request_uri = exchange.request_uri().to_string();
                        let matches_saved = self
                            .sessions
                            .update(&session_id, |state| {
                                state.set_form_principal(principal.clone());
                                state.matches(&request_uri)
                            })
                            .await?;
                        if !matches_saved {
                            self.register(exchange, session_id, principal).await?;
                            return Ok(Outcome::Proceed);
                        }
                        // Registered when the saved request is restored below
                    }
                    None => debug!("Reauthentication failed, proceed normally"),
                }
            }
        }

        // The redirect back to the original request after a successful login?
        if let Some(session_id) = exchange.session_id() {
            let request_uri = exchange.request_uri().to_string();
            let principal = self
                .sessions
                .with_ref(&session_id, |state| {
                    if state.matches(&request_uri) {
                        state.form_principal().cloned()
                    } else {
                        None
                    }
                })
                .await
                .flatten();

            if let Some(principal) = principal {
                self.register(exchange, session_id, principal).await?;
                self.associate_sso(exchange.sso_ticket().cloned(), session_id)
                    .await;

                if self.saved.restore(exchange, &self.sessions, &session_id).await? {
                    debug!(uri = %request_uri, "Proceed to restored request");
                    return Ok(Outcome::Proceed);
                }
                debug!(uri = %request_uri, "Restore of original request failed");
                return Ok(Outcome::Respond(StatusCode::BAD_REQUEST.into_response()));
            }
        }

        // Not a login submission: save the request and show the login page
        if !login_action {
            let session_id = self.ensure_session(exchange).await?;
            self.saved.save(exchange, &self.sessions, &session_id).await?;
            let response = self.forward_to_login_page(exchange, login).await?;
            return Ok(Outcome::Respond(response));
        }

        // Login submission
        let params = exchange.parameters(self.config.max_post_size).await?;
        let username = params.get(FORM_USERNAME).map(str::to_string);
        let password = params.get(FORM_PASSWORD).map(str::to_string);
        debug!(username = username.as_deref().unwrap_or(""), "Authenticating");

        let principal = match (&username, &password) {
            (Some(username), Some(password)) => self.realm.authenticate(username, password).await,
            _ => None,
        };
        let (Some(principal), Some(username), Some(password)) = (principal, username, password)
        else {
            debug!("Login failed, forwarding to error page");
            let response = self.forward_to_page(exchange, &login.error_page).await?;
            return Ok(Outcome::Respond(response));
        };
        debug!(username = %username, "Authentication successful");

        let session_id = self.ensure_session(exchange).await?;
        let cache = self.config.cache;
        self.sessions
            .update(&session_id, |state| {
                state.set_form_principal(principal.clone());
                if !cache {
                    state.set_credentials(Credentials::new(username, password));
                }
            })
            .await?;

        let target = match self.saved.redirect_target(&self.sessions, &session_id).await {
            Some(target) => target,
            None => {
                // Submitted directly, so nothing will be restored later
                self.register(exchange, session_id, principal).await?;
                self.associate_sso(exchange.sso_ticket().cloned(), session_id)
                    .await;
                self.config.context_root()
            }
        };
        debug!(location = %target, "Redirecting to original request");
        Ok(Outcome::Respond(redirect(&target)?))
    }

    /// The live session of `exchange`, creating one (and its cookie) if needed.
    pub async fn ensure_session(&self, exchange: &mut Exchange) -> Result<SessionId> {
        if let Some(id) = exchange.session_id()
            && self.sessions.contains(&id).await
        {
            return Ok(id);
        }
        let id = self.sessions.create().await;
        exchange.set_session_id(id);
        exchange.set_session_cookie(session_cookie(&self.config, &id)?);
        debug!(session_id = %id, "Created session");
        Ok(id)
    }

    /// Mark the request authenticated and, when caching, remember the principal.
    async fn register(
        &self,
        exchange: &mut Exchange,
        session_id: SessionId,
        principal: Principal,
    ) -> Result<()> {
        if self.config.cache {
            let cached = principal.clone();
            self.sessions
                .update(&session_id, |state| state.set_principal(cached, AuthType::Form))
                .await?;
        }
        debug!(username = principal.name(), session_id = %session_id, "Registered principal");
        exchange.set_authenticated(AuthenticatedUser {
            principal,
            auth_type: AuthType::Form,
            session_id: Some(session_id),
        });
        Ok(())
    }

    async fn associate_sso(&self, ticket: Option<SsoTicket>, session_id: SessionId) {
        if let (Some(sso), Some(ticket)) = (&self.sso, ticket) {
            sso.associate(&ticket.id, ticket.version, &session_id).await;
        }
    }

    async fn forward_to_login_page(
        &self,
        exchange: &mut Exchange,
        login: &LoginConfig,
    ) -> Result<Response> {
        if self.config.change_session_id_on_authentication
            && let Some(id) = exchange.session_id()
        {
            let new_id = self.sessions.change_id(&id).await?;
            exchange.set_session_id(new_id);
            exchange.set_session_cookie(session_cookie(&self.config, &new_id)?);
        }
        self.forward_to_page(exchange, &login.login_page).await
    }

    /// Render `page` in place of the current request.
    ///
    /// Dispatch failures are logged and answered with an empty 200.
    async fn forward_to_page(&self, exchange: &mut Exchange, page: &str) -> Result<Response> {
        if !exchange.is_secure() {
            let constraints = self
                .realm
                .find_security_constraints(page, &Method::GET)
                .await;
            if !constraints.is_empty()
                && let UserDataPermission::Denied(response) =
                    self.realm.has_user_data_permission(exchange, &constraints)
            {
                return Ok(response);
            }
        }

        let request = match forward_request(exchange, page) {
            Ok(request) => request,
            Err(e) => {
                warn!(page, error = %e, "Unexpected error forwarding to page");
                return Ok(StatusCode::OK.into_response());
            }
        };
        match self.dispatcher.forward(request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                warn!(page, error = %e, "Unexpected error forwarding to page");
                Ok(StatusCode::OK.into_response())
            }
        }
    }
}

fn redirect(location: &str) -> Result<Response> {
    Response::builder()
        .status(StatusCode::FOUND)
        .header(LOCATION, location)
        .body(Body::empty())
        .map_err(|e| FormAuthError::Internal(format!("redirect to {location}: {e}")))
}
