//! Idle-timeout tracking for session expiration.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::id::SessionId;

/// Tracks last access times so idle sessions can be expired.
#[derive(Debug)]
pub struct TtlTracker {
    last_access: HashMap<SessionId, Instant>,

    /// Idle timeout (None means no expiration).
    ttl: Option<Duration>,
}

impl TtlTracker {
    /// Create a tracker with the given idle timeout.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            last_access: HashMap::new(),
            ttl,
        }
    }

    /// Record an access (resets the idle timer).
    pub fn touch(&mut self, id: &SessionId) {
        self.last_access.insert(*id, Instant::now());
    }

    /// Whether the session has been idle longer than the timeout.
    ///
    /// A session with no access record counts as expired when a timeout is set.
    pub fn is_expired(&self, id: &SessionId) -> bool {
        let Some(ttl) = self.ttl else {
            return false;
        };
        self.last_access
            .get(id)
            .is_none_or(|last| last.elapsed() > ttl)
    }

    /// Stop tracking a session.
    pub fn remove(&mut self, id: &SessionId) {
        self.last_access.remove(id);
    }

    /// Remove all expired entries and return their ids.
    pub fn drain_expired(&mut self) -> Vec<SessionId> {
        let Some(ttl) = self.ttl else {
            return Vec::new();
        };
        let now = Instant::now();
        let expired: Vec<SessionId> = self
            .last_access
            .iter()
            .filter(|(_, last)| now.duration_since(**last) > ttl)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            self.last_access.remove(id);
        }
        expired
    }

    /// Number of tracked sessions.
    pub fn len(&self) -> usize {
        self.last_access.len()
    }

    /// Check if there are no tracked sessions.
    pub fn is_empty(&self) -> bool {
        self.last_access.is_empty()
    }

    /// The configured idle timeout.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_no_ttl_never_expires() {
        let mut tracker = TtlTracker::new(None);
        let id = SessionId::new();
        tracker.touch(&id);

        assert!(!tracker.is_expired(&id));
        assert!(tracker.drain_expired().is_empty());
    }

    #[test]
    fn test_touch_resets_timer() {
        let mut tracker = TtlTracker::new(Some(Duration::from_millis(50)));
        let id = SessionId::new();
        tracker.touch(&id);

        thread::sleep(Duration::from_millis(30));
        tracker.touch(&id);
        thread::sleep(Duration::from_millis(30));

        assert!(!tracker.is_expired(&id));
    }

    #[test]
    fn test_drain_expired() {
        let mut tracker = TtlTracker::new(Some(Duration::from_millis(10)));
        let first = SessionId::new();
        let second = SessionId::new();
        tracker.touch(&first);
        tracker.touch(&second);

        thread::sleep(Duration::from_millis(20));

        let expired = tracker.drain_expired();
        assert_eq!(expired.len(), 2);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_untracked_session_is_expired() {
        let mut tracker = TtlTracker::new(Some(Duration::from_secs(60)));
        let id = SessionId::new();
        tracker.touch(&id);
        tracker.remove(&id);

        assert_eq!(tracker.len(), 0);
        assert!(tracker.is_expired(&id));
    }
}
