//! Registry of currently open connections.
//!
//! Backed by a sharded [`DashMap`] so one connection registering or leaving
//! only locks its own shard. An entry exists exactly while that connection's
//! session loop is between register and deregister.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::connection::{ConnectionHandle, ConnectionId};

/// Thread-safe map of connection id to [`ConnectionHandle`].
///
/// Cloneable — all clones share the same map.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<ConnectionId, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unconditionally. A collision replaces the old entry.
    pub fn register(&self, id: ConnectionId, handle: ConnectionHandle) {
        if self.connections.insert(id, handle).is_some() {
            warn!(connection_id = %id, "Connection id collision, replaced existing entry");
        }
        debug!(connection_id = %id, active = self.connections.len(), "Connection registered");
    }

    /// Remove the entry if present. Returns whether anything was removed.
    pub fn deregister(&self, id: &ConnectionId) -> bool {
        self.connections.remove(id).is_some()
    }

    pub fn lookup(&self, id: &ConnectionId) -> Option<ConnectionHandle> {
        self.connections.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Snapshot of all active handles, in no particular order.
    pub fn handles(&self) -> Vec<ConnectionHandle> {
        self.connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}

/// Deregisters its connection when dropped.
///
/// Held by the session loop so the entry is removed on every exit path,
/// including a panicking or aborted session task.
pub struct Registration {
    registry: ConnectionRegistry,
    id: ConnectionId,
}

impl Registration {
    /// Register `handle` and return the guard that will remove it.
    pub fn new(registry: &ConnectionRegistry, handle: ConnectionHandle) -> Self {
        let id = handle.id();
        registry.register(id, handle);
        Self {
            registry: registry.clone(),
            id,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.registry.deregister(&self.id) {
            debug!(connection_id = %self.id, "Connection deregistered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn handle() -> ConnectionHandle {
        let (tx, _rx) = mpsc::channel(1);
        ConnectionHandle::new(ConnectionId::new(), tx)
    }

    #[test]
    fn test_register_lookup_deregister() {
        let registry = ConnectionRegistry::new();
        let h = handle();
        let id = h.id();

        assert!(!registry.contains(&id));
        registry.register(id, h);
        assert!(registry.contains(&id));
        assert_eq!(registry.lookup(&id).map(|h| h.id()), Some(id));
        assert_eq!(registry.len(), 1);

        assert!(registry.deregister(&id));
        assert!(!registry.contains(&id));
        assert!(registry.lookup(&id).is_none());
        assert!(!registry.deregister(&id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registration_guard_removes_on_drop() {
        let registry = ConnectionRegistry::new();
        let other = handle();
        registry.register(other.id(), other.clone());

        let guard = Registration::new(&registry, handle());
        let id = guard.id();
        assert!(registry.contains(&id));
        drop(guard);

        assert!(!registry.contains(&id));
        assert!(registry.contains(&other.id()));
    }

    #[test]
    fn test_concurrent_register_and_deregister() {
        let registry = ConnectionRegistry::new();
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let mut kept = Vec::new();
                    for i in 0..200 {
                        let h = handle();
                        let id = h.id();
                        registry.register(id, h);
                        if i % 2 == 0 {
                            assert!(registry.deregister(&id));
                        } else {
                            kept.push(id);
                        }
                    }
                    kept
                })
            })
            .collect();

        let kept: Vec<ConnectionId> = threads
            .into_iter()
            .flat_map(|t| t.join().unwrap())
            .collect();
        assert_eq!(registry.len(), kept.len());
        assert!(kept.iter().all(|id| registry.contains(id)));
    }
}
