//! FORM-based login for axum services.
//!
//! This crate implements the servlet-style FORM authentication protocol:
//! an unauthenticated request is saved in the session, the client is shown
//! a login page, the `j_security_check` submission is verified against a
//! [`Realm`], and the client is redirected back to the original URI where
//! the saved request is replayed in place of the redirected GET.
//!
//! # Features
//!
//! - Saved-request replay (method, headers, cookies, locales, body)
//! - Optional principal caching, with per-request re-authentication when off
//! - Session id rotation before the login page is shown
//! - Security constraints with transport guarantees and role checks
//! - Single sign-on association
//!
//! # Example
//!
//! ```ignore
//! use formguard_auth::{
//!     AuthSessions, FormAuthConfig, FormAuthState, FormLoginFlow, LoginConfig, MemoryRealm,
//!     RouterDispatcher, SecurityConstraint, protect,
//! };
//!
//! let realm = MemoryRealm::new()
//!     .with_user("alice", "wonderland", ["user"])
//!     .with_constraint(SecurityConstraint::new(["/app/*"]).with_any_authenticated());
//! let flow = FormLoginFlow::new(
//!     FormAuthConfig::new("/app"),
//!     Arc::new(realm),
//!     AuthSessions::new(SessionConfig::default()),
//!     Arc::new(RouterDispatcher::new(pages.clone())),
//! );
//! let state = FormAuthState::new(flow, LoginConfig::new("/app/login.html", "/app/error.html"));
//! let app = protect(pages, state);
//! ```

pub mod config;
pub mod constraint;
pub mod cookies;
pub mod dispatch;
pub mod error;
pub mod exchange;
pub mod flow;
pub mod locale;
pub mod memory_realm;
pub mod middleware;
pub mod principal;
pub mod realm;
pub mod saved_request;
pub mod sso;
pub mod state;

pub use config::{FORM_ACTION, FORM_PASSWORD, FORM_USERNAME, FormAuthConfig, LoginConfig};
pub use constraint::{SecurityConstraint, TransportGuarantee};
pub use cookies::{RequestCookie, RequestCookies};
pub use dispatch::{Dispatcher, ForwardedRequest, RouterDispatcher};
pub use error::{ErrorResponse, FormAuthError, Result};
pub use exchange::{Acknowledge, ContinueHandle, Exchange, RequestParameters};
pub use flow::{FormLoginFlow, Outcome};
pub use locale::RequestLocales;
pub use memory_realm::MemoryRealm;
pub use middleware::{FormAuthState, form_auth_middleware, protect};
pub use principal::{AuthType, AuthenticatedUser, Principal};
pub use realm::{Realm, UserDataPermission};
pub use saved_request::{SavedHeaders, SavedRequest, SavedRequestStore};
pub use sso::{MemorySso, SingleSignOn, SsoTicket};
pub use state::{AuthSessions, AuthState, Credentials};
