//! Authenticator configuration.

/// Suffix of the login form's action URI.
pub const FORM_ACTION: &str = "/j_security_check";

/// Name of the username field of the login form.
pub const FORM_USERNAME: &str = "j_username";

/// Name of the password field of the login form.
pub const FORM_PASSWORD: &str = "j_password";

/// Default cap on the request body saved across the login detour (4 KB).
pub const DEFAULT_MAX_SAVE_POST_SIZE: usize = 4 * 1024;

/// Default cap on a login form body (2 MB).
pub const DEFAULT_MAX_POST_SIZE: usize = 2 * 1024 * 1024;

/// Default session cookie name.
pub const DEFAULT_SESSION_COOKIE: &str = "FGSESSIONID";

/// Login and error pages of one application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginConfig {
    /// Page shown to unauthenticated users.
    pub login_page: String,
    /// Page shown after a failed login.
    pub error_page: String,
}

impl LoginConfig {
    pub fn new(login_page: impl Into<String>, error_page: impl Into<String>) -> Self {
        Self {
            login_page: login_page.into(),
            error_page: error_page.into(),
        }
    }
}

/// FORM authenticator configuration.
#[derive(Debug, Clone)]
pub struct FormAuthConfig {
    /// Context path of the protected application (`""` or `/name`).
    pub context_path: String,

    /// Cache the authenticated principal in the session.
    ///
    /// When disabled, username and password are kept in the session and
    /// checked against the realm again on every request.
    pub cache: bool,

    /// Maximum body size saved while the user is sent to the login page.
    pub max_save_post_size: usize,

    /// Maximum size of a login form submission.
    pub max_post_size: usize,

    /// Rotate the session id before forwarding to the login page.
    pub change_session_id_on_authentication: bool,

    /// Name of the session cookie.
    pub session_cookie_name: String,

    /// Mark the session cookie `Secure`.
    pub secure_cookie: bool,

    /// Honor `X-Forwarded-Proto: https` when deciding whether a connection is secure.
    pub trust_forwarded_proto: bool,
}

impl Default for FormAuthConfig {
    fn default() -> Self {
        Self {
            context_path: String::new(),
            cache: true,
            max_save_post_size: DEFAULT_MAX_SAVE_POST_SIZE,
            max_post_size: DEFAULT_MAX_POST_SIZE,
            change_session_id_on_authentication: true,
            session_cookie_name: DEFAULT_SESSION_COOKIE.to_string(),
            secure_cookie: false,
            trust_forwarded_proto: false,
        }
    }
}

impl FormAuthConfig {
    /// Create a config for an application mounted at `context_path`.
    pub fn new(context_path: impl Into<String>) -> Self {
        Self {
            context_path: context_path.into(),
            ..Default::default()
        }
    }

    /// Enable or disable principal caching.
    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    /// Set the maximum saved body size.
    pub fn with_max_save_post_size(mut self, size: usize) -> Self {
        self.max_save_post_size = size;
        self
    }

    /// Set the maximum login form size.
    pub fn with_max_post_size(mut self, size: usize) -> Self {
        self.max_post_size = size;
        self
    }

    /// Enable or disable session id rotation.
    pub fn with_change_session_id_on_authentication(mut self, enabled: bool) -> Self {
        self.change_session_id_on_authentication = enabled;
        self
    }

    /// Set the session cookie name.
    pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.session_cookie_name = name.into();
        self
    }

    /// Mark session cookies `Secure`.
    pub fn with_secure_cookie(mut self, secure: bool) -> Self {
        self.secure_cookie = secure;
        self
    }

    /// Trust `X-Forwarded-Proto` from a fronting proxy.
    pub fn with_trust_forwarded_proto(mut self, trust: bool) -> Self {
        self.trust_forwarded_proto = trust;
        self
    }

    /// Whether a decoded request URI is the login form's submission.
    pub fn is_login_action(&self, decoded_uri: &str) -> bool {
        decoded_uri.starts_with(&self.context_path) && decoded_uri.ends_with(FORM_ACTION)
    }

    /// Where a direct login (no saved request) lands.
    pub fn context_root(&self) -> String {
        format!("{}/", self.context_path)
    }

    /// Path attribute for the session cookie.
    pub fn cookie_path(&self) -> &str {
        if self.context_path.is_empty() {
            "/"
        } else {
            &self.context_path
        }
    }
}
