//! Authenticated identities.

use formguard_session::SessionId;
use serde::{Deserialize, Serialize};

/// A user identity returned by a realm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    name: String,
    #[serde(default)]
    roles: Vec<String>,
}

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roles: Vec::new(),
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// How a principal was authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthType {
    Form,
}

impl AuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::Form => "FORM",
        }
    }
}

/// Request extension marking a request as authenticated.
///
/// Handlers behind the authenticator extract it:
///
/// ```ignore
/// async fn whoami(Extension(user): Extension<AuthenticatedUser>) -> String {
///     user.principal.name().to_string()
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub principal: Principal,
    pub auth_type: AuthType,
    pub session_id: Option<SessionId>,
}
