//! Session store with LRU eviction and TTL support.
//!
//! This crate provides the in-memory session layer used by the FORM login
//! flow:
//! - opaque, randomly generated [`SessionId`]s
//! - LRU eviction to prevent unbounded memory growth
//! - Optional TTL for auto-expiring idle sessions
//! - Session id rotation for session-fixation protection
//!
//! The value stored per session is generic; the authenticator keeps a typed
//! authentication record there.
//!
//! # Example
//!
//! ```rust,ignore
//! use formguard_session::{SessionConfig, SessionStore};
//!
//! let config = SessionConfig::default()
//!     .with_max_sessions(1000)
//!     .with_ttl(Duration::from_secs(1800));
//!
//! let store: SessionStore<MyState> = SessionStore::new(config);
//! let id = store.create().await;
//! ```

mod config;
mod error;
mod id;
mod store;
mod ttl;

pub use config::SessionConfig;
pub use error::{Error, Result};
pub use id::SessionId;
pub use store::{SessionStore, StoreStats};
pub use ttl::TtlTracker;
