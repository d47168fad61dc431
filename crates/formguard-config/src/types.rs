//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [server]                 # listener settings
//! [auth]                   # FORM login settings
//! [session]                # session store settings
//! [[users]]                # in-memory realm users
//! [[constraints]]          # security constraints
//! ```

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FormGuardConfig {
    /// Listener configuration.
    pub server: Option<ServerConfig>,

    /// FORM authentication configuration.
    pub auth: Option<AuthConfig>,

    /// Session store configuration.
    pub session: Option<SessionConfig>,

    /// Users of the in-memory realm.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<UserConfig>,

    /// Security constraints protecting URL patterns.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<ConstraintConfig>,
}

impl FormGuardConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections replace wholesale; user and constraint lists replace the
    /// existing lists only when the overlay defines any.
    pub fn merge(&mut self, other: FormGuardConfig) {
        if other.server.is_some() {
            self.server = other.server;
        }
        if other.auth.is_some() {
            self.auth = other.auth;
        }
        if other.session.is_some() {
            self.session = other.session;
        }
        if !other.users.is_empty() {
            self.users = other.users;
        }
        if !other.constraints.is_empty() {
            self.constraints = other.constraints;
        }
    }

    /// Server section, or defaults.
    pub fn server(&self) -> ServerConfig {
        self.server.clone().unwrap_or_default()
    }

    /// Auth section, or defaults.
    pub fn auth(&self) -> AuthConfig {
        self.auth.clone().unwrap_or_default()
    }

    /// Session section, or defaults.
    pub fn session(&self) -> SessionConfig {
        self.session.clone().unwrap_or_default()
    }

    /// Check values that parse fine but cannot work at runtime.
    pub fn validate(&self) -> Result<()> {
        let auth = self.auth();

        let ctx = &auth.context_path;
        if !ctx.is_empty() && (!ctx.starts_with('/') || ctx.ends_with('/')) {
            return Err(invalid(
                "auth.context_path",
                "must be empty or start with '/' and not end with '/'",
            ));
        }
        for (field, page) in [
            ("auth.login_page", &auth.login_page),
            ("auth.error_page", &auth.error_page),
        ] {
            if !page.starts_with('/') {
                return Err(invalid(field, "must start with '/'"));
            }
        }

        if self.session().cookie_name.is_empty() {
            return Err(invalid("session.cookie_name", "must not be empty"));
        }

        for (i, user) in self.users.iter().enumerate() {
            if user.username.is_empty() {
                return Err(invalid(&format!("users[{i}].username"), "must not be empty"));
            }
        }

        for (i, constraint) in self.constraints.iter().enumerate() {
            if constraint.url_patterns.is_empty() {
                return Err(invalid(
                    &format!("constraints[{i}].url_patterns"),
                    "at least one pattern is required",
                ));
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Listener configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind: String,
    /// HTTPS port that confidential constraints redirect to.
    pub redirect_port: Option<u16>,
    /// Treat `X-Forwarded-Proto: https` as a secure connection.
    pub trust_forwarded_proto: bool,
    /// Enable request logging.
    pub request_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            redirect_port: None,
            trust_forwarded_proto: false,
            request_logging: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Auth Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// FORM authentication section.
///
/// ```toml
/// [auth]
/// context_path = "/app"
/// login_page = "/app/login.html"
/// error_page = "/app/error.html"
/// cache = true
/// max_save_post_size = 4096
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Context path the protected application is mounted under.
    pub context_path: String,
    /// Path of the login page.
    pub login_page: String,
    /// Path of the login error page.
    pub error_page: String,
    /// Cache the authenticated principal in the session.
    ///
    /// When false, credentials are kept in the session and re-checked
    /// against the realm on every request.
    pub cache: bool,
    /// Maximum body size (bytes) saved while the user logs in.
    pub max_save_post_size: usize,
    /// Rotate the session id before showing the login page.
    pub change_session_id_on_authentication: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            context_path: "/app".to_string(),
            login_page: "/app/login.html".to_string(),
            error_page: "/app/error.html".to_string(),
            cache: true,
            max_save_post_size: 4096,
            change_session_id_on_authentication: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Session store section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum number of sessions to keep before eviction.
    pub max_sessions: usize,
    /// Idle timeout in seconds (0 disables expiry).
    pub ttl_secs: u64,
    /// Interval in seconds between cleanup runs.
    pub cleanup_interval_secs: u64,
    /// Name of the session cookie.
    pub cookie_name: String,
    /// Mark the session cookie `Secure`.
    pub secure_cookie: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 10_000,
            ttl_secs: 30 * 60,
            cleanup_interval_secs: 60,
            cookie_name: "FGSESSIONID".to_string(),
            secure_cookie: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Realm Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// A user of the in-memory realm.
///
/// ```toml
/// [[users]]
/// username = "alice"
/// password = "secret"
/// roles = ["user", "admin"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Transport guarantee required by a constraint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportConfig {
    #[default]
    None,
    Integral,
    Confidential,
}

/// A security constraint.
///
/// ```toml
/// [[constraints]]
/// url_patterns = ["/app/*"]
/// roles = ["*"]
///
/// [[constraints]]
/// url_patterns = ["/app/admin/*"]
/// methods = ["GET", "POST"]
/// roles = ["admin"]
/// transport = "confidential"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintConfig {
    /// URL patterns (exact, `/prefix/*`, `*.ext` or `/`).
    pub url_patterns: Vec<String>,
    /// HTTP methods covered (empty = all).
    pub methods: Vec<String>,
    /// Required transport guarantee.
    pub transport: TransportConfig,
    /// Roles allowed (`*` = any authenticated user, empty list = nobody).
    /// Absent means the constraint does not require authentication.
    pub roles: Option<Vec<String>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = FormGuardConfig::from_toml(
            r#"
[server]
bind = "0.0.0.0:9000"
redirect_port = 8443

[auth]
context_path = "/shop"
login_page = "/shop/login"
error_page = "/shop/login-failed"
cache = false

[session]
cookie_name = "SHOPSESSION"
ttl_secs = 600

[[users]]
username = "alice"
password = "wonderland"
roles = ["admin"]

[[constraints]]
url_patterns = ["/shop/*"]
roles = ["*"]
transport = "confidential"
"#,
        )
        .unwrap();

        let server = config.server();
        assert_eq!(server.bind, "0.0.0.0:9000");
        assert_eq!(server.redirect_port, Some(8443));

        let auth = config.auth();
        assert_eq!(auth.context_path, "/shop");
        assert!(!auth.cache);
        assert_eq!(auth.max_save_post_size, 4096);

        assert_eq!(config.session().cookie_name, "SHOPSESSION");
        assert_eq!(config.users[0].roles, vec!["admin"]);
        assert_eq!(
            config.constraints[0].transport,
            TransportConfig::Confidential
        );
        assert_eq!(config.constraints[0].roles, Some(vec!["*".to_string()]));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = FormGuardConfig::from_toml("").unwrap();
        assert_eq!(config.auth().login_page, "/app/login.html");
        assert_eq!(config.session().ttl_secs, 1800);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_merge_overlay_wins() {
        let mut base = FormGuardConfig::from_toml(
            r#"
[auth]
context_path = "/base"
login_page = "/base/login"
error_page = "/base/error"

[[users]]
username = "base-user"
password = "pw"
"#,
        )
        .unwrap();
        let overlay = FormGuardConfig::from_toml(
            r#"
[session]
cookie_name = "OVERLAY"
"#,
        )
        .unwrap();

        base.merge(overlay);

        assert_eq!(base.auth().context_path, "/base");
        assert_eq!(base.session().cookie_name, "OVERLAY");
        assert_eq!(base.users.len(), 1);
    }

    #[test]
    fn test_validate_rejects_relative_login_page() {
        let config = FormGuardConfig::from_toml(
            r#"
[auth]
login_page = "login.html"
"#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "auth.login_page"));
    }

    #[test]
    fn test_validate_rejects_trailing_slash_context() {
        let config = FormGuardConfig::from_toml(
            r#"
[auth]
context_path = "/app/"
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_constraint_without_patterns() {
        let config = FormGuardConfig::from_toml(
            r#"
[[constraints]]
roles = ["*"]
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_to_toml_round_trip_keeps_users() {
        let config = FormGuardConfig::from_toml(
            r#"
[[users]]
username = "bob"
password = "builder"
"#,
        )
        .unwrap();
        let text = config.to_toml().unwrap();
        let reparsed = FormGuardConfig::from_toml(&text).unwrap();
        assert_eq!(reparsed.users[0].username, "bob");
    }
}
