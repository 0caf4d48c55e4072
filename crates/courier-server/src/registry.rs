//! Connection registry: which transport currently serves each user.
//!
//! At most one binding per user. A new bind replaces the old one
//! (last writer wins) and hands the superseded handle back to the caller.

use std::sync::Arc;

use courier_core::{ConnectionId, UserId};
use dashmap::DashMap;

use crate::transport::FrameSink;

/// Shared handle type stored in the registry.
pub type SinkHandle = Arc<dyn FrameSink>;

/// Maps user ids to their current transport.
#[derive(Default)]
pub struct ConnectionRegistry {
    bindings: DashMap<UserId, SinkHandle>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handle` for `user`, returning the binding it replaced.
    pub fn bind(&self, user: UserId, handle: SinkHandle) -> Option<SinkHandle> {
        self.bindings.insert(user, handle)
    }

    /// Current handle for `user`.
    pub fn lookup(&self, user: &UserId) -> Option<SinkHandle> {
        self.bindings.get(user).map(|h| Arc::clone(h.value()))
    }

    /// Remove whatever is bound to `user`.
    pub fn unbind(&self, user: &UserId) {
        let _ = self.bindings.remove(user);
    }

    /// Remove the binding only if it is still `connection`.
    ///
    /// A stale teardown must not evict the connection that replaced it.
    pub fn unbind_if(&self, user: &UserId, connection: &ConnectionId) -> bool {
        self.bindings
            .remove_if(user, |_, handle| handle.id() == connection)
            .is_some()
    }

    /// Whether `user` has a live binding.
    pub fn is_online(&self, user: &UserId) -> bool {
        self.bindings.contains_key(user)
    }

    /// Number of bound users.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether no user is bound.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;

    #[test]
    fn bind_then_lookup() {
        let registry = ConnectionRegistry::new();
        let sink = RecordingSink::new();
        assert!(registry.bind("alice".into(), sink.clone()).is_none());

        let found = registry.lookup(&"alice".into()).unwrap();
        assert_eq!(found.id(), sink.id());
        assert!(registry.lookup(&"bob".into()).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn rebind_returns_superseded_handle() {
        let registry = ConnectionRegistry::new();
        let first = RecordingSink::new();
        let second = RecordingSink::new();
        let _ = registry.bind("alice".into(), first.clone());

        let old = registry.bind("alice".into(), second.clone()).unwrap();
        assert_eq!(old.id(), first.id());
        assert_eq!(registry.lookup(&"alice".into()).unwrap().id(), second.id());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unbind_absent_is_noop() {
        let registry = ConnectionRegistry::new();
        registry.unbind(&"ghost".into());
        assert!(registry.is_empty());
    }

    #[test]
    fn unbind_removes() {
        let registry = ConnectionRegistry::new();
        let _ = registry.bind("alice".into(), RecordingSink::new());
        registry.unbind(&"alice".into());
        assert!(!registry.is_online(&"alice".into()));
    }

    #[test]
    fn unbind_if_ignores_stale_connection() {
        let registry = ConnectionRegistry::new();
        let old = RecordingSink::new();
        let new = RecordingSink::new();
        let _ = registry.bind("alice".into(), old.clone());
        let _ = registry.bind("alice".into(), new.clone());

        assert!(!registry.unbind_if(&"alice".into(), old.id()));
        assert!(registry.is_online(&"alice".into()));

        assert!(registry.unbind_if(&"alice".into(), new.id()));
        assert!(!registry.is_online(&"alice".into()));
    }

    #[test]
    fn user_ids_are_case_sensitive() {
        let registry = ConnectionRegistry::new();
        let _ = registry.bind("alice".into(), RecordingSink::new());
        assert!(registry.lookup(&"Alice".into()).is_none());
    }
}
