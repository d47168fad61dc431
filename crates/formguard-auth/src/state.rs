//! Per-session authentication state.

use std::fmt;

use formguard_session::SessionStore;

use crate::principal::{AuthType, Principal};
use crate::saved_request::SavedRequest;

/// Session store specialised to authentication state.
pub type AuthSessions = SessionStore<AuthState>;

/// Username and password kept in the session when principal caching is off.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .finish()
    }
}

/// Everything the login flow remembers about one session.
#[derive(Debug, Clone, Default)]
pub struct AuthState {
    saved_request: Option<SavedRequest>,
    form_principal: Option<Principal>,
    credentials: Option<Credentials>,
    principal: Option<Principal>,
    auth_type: Option<AuthType>,
}

impl AuthState {
    pub fn saved_request(&self) -> Option<&SavedRequest> {
        self.saved_request.as_ref()
    }

    /// Store the request to replay after login, replacing any earlier one.
    pub fn set_saved_request(&mut self, request: SavedRequest) {
        self.saved_request = Some(request);
    }

    /// Principal authenticated by a login submission, awaiting the redirect back.
    pub fn form_principal(&self) -> Option<&Principal> {
        self.form_principal.as_ref()
    }

    pub fn set_form_principal(&mut self, principal: Principal) {
        self.form_principal = Some(principal);
    }

    pub fn clear_form_principal(&mut self) -> Option<Principal> {
        self.form_principal.take()
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = Some(credentials);
    }

    /// Principal cached for the life of the session.
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn auth_type(&self) -> Option<AuthType> {
        self.auth_type
    }

    pub fn set_principal(&mut self, principal: Principal, auth_type: AuthType) {
        self.principal = Some(principal);
        self.auth_type = Some(auth_type);
    }

    /// Whether a resubmission to `request_uri` is the redirect back to the saved request.
    ///
    /// Requires both a saved request and a form principal.
    pub fn matches(&self, request_uri: &str) -> bool {
        match (&self.saved_request, &self.form_principal) {
            (Some(saved), Some(_)) => saved.request_uri == request_uri,
            _ => false,
        }
    }
}
