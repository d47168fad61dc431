//! Single sign-on association.
//!
//! An upstream SSO layer attaches an [`SsoTicket`] to the request; the login
//! flow then ties the local session to that ticket once the user is known.

use std::collections::HashMap;

use async_trait::async_trait;
use formguard_session::SessionId;
use tokio::sync::RwLock;
use tracing::debug;

/// Request extension carrying the single sign-on id for this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsoTicket {
    pub id: String,
    /// Ticket version; 0 when the SSO layer does not version tickets.
    pub version: u64,
}

impl SsoTicket {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: 0,
        }
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }
}

/// Associates local sessions with a single sign-on entry.
#[async_trait]
pub trait SingleSignOn: Send + Sync {
    async fn associate(&self, sso_id: &str, version: u64, session_id: &SessionId);
}

#[derive(Debug, Default)]
struct SsoEntry {
    version: u64,
    sessions: Vec<SessionId>,
}

/// In-process single sign-on registry.
#[derive(Debug, Default)]
pub struct MemorySso {
    entries: RwLock<HashMap<String, SsoEntry>>,
}

impl MemorySso {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions associated with `sso_id`, in association order.
    pub async fn sessions(&self, sso_id: &str) -> Vec<SessionId> {
        self.entries
            .read()
            .await
            .get(sso_id)
            .map(|e| e.sessions.clone())
            .unwrap_or_default()
    }

    /// Latest version seen for `sso_id`.
    pub async fn version(&self, sso_id: &str) -> Option<u64> {
        self.entries.read().await.get(sso_id).map(|e| e.version)
    }
}

#[async_trait]
impl SingleSignOn for MemorySso {
    async fn associate(&self, sso_id: &str, version: u64, session_id: &SessionId) {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(sso_id.to_string()).or_default();
        entry.version = entry.version.max(version);
        if !entry.sessions.contains(session_id) {
            entry.sessions.push(*session_id);
        }
        debug!(sso_id, version, session_id = %session_id, "Session associated with SSO entry");
    }
}
