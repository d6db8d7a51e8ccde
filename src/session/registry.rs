//! Connection to session bindings
//!
//! The only state shared between connection tasks. A session id may be bound
//! to at most one connection at a time.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::SessionError;

pub type ConnectionId = Uuid;

#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub session_id: String,
    pub candidate_email: Option<String>,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    connections: DashMap<ConnectionId, ActiveSession>,
    sessions: DashMap<String, ConnectionId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `connection` to `active.session_id`
    pub fn insert(&self, connection: ConnectionId, active: ActiveSession) -> Result<(), SessionError> {
        match self.sessions.entry(active.session_id.clone()) {
            Entry::Occupied(bound) if *bound.get() != connection => {
                return Err(SessionError::ActiveElsewhere(active.session_id));
            }
            Entry::Occupied(_) => {}
            Entry::Vacant(slot) => {
                slot.insert(connection);
            }
        }
        self.connections.insert(connection, active);
        Ok(())
    }

    pub fn lookup(&self, connection: ConnectionId) -> Option<ActiveSession> {
        self.connections.get(&connection).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, connection: ConnectionId) -> Option<ActiveSession> {
        let (_, active) = self.connections.remove(&connection)?;
        self.sessions
            .remove_if(&active.session_id, |_, bound| *bound == connection);
        Some(active)
    }

    pub fn is_session_active(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active(id: &str) -> ActiveSession {
        ActiveSession {
            session_id: id.into(),
            candidate_email: None,
            joined_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_lookup_remove() {
        let registry = SessionRegistry::new();
        let conn = Uuid::new_v4();

        registry.insert(conn, active("s1")).unwrap();
        assert!(registry.is_session_active("s1"));
        assert_eq!(registry.lookup(conn).unwrap().session_id, "s1");
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.remove(conn).unwrap().session_id, "s1");
        assert!(!registry.is_session_active("s1"));
        assert!(registry.lookup(conn).is_none());
        assert!(registry.remove(conn).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_session_bound_to_one_connection() {
        let registry = SessionRegistry::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        registry.insert(first, active("s1")).unwrap();
        assert_eq!(
            registry.insert(second, active("s1")),
            Err(SessionError::ActiveElsewhere("s1".into()))
        );

        // Rebinding on the same connection is fine
        assert!(registry.insert(first, active("s1")).is_ok());
        registry.remove(first);
        assert!(registry.insert(second, active("s1")).is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sessions_are_independent() {
        let registry = std::sync::Arc::new(SessionRegistry::new());
        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    let conn = Uuid::new_v4();
                    registry.insert(conn, active(&format!("s{}", i))).unwrap();
                    conn
                })
            })
            .collect();

        let mut connections = Vec::new();
        for task in tasks {
            connections.push(task.await.unwrap());
        }
        assert_eq!(registry.len(), 16);

        for conn in connections {
            registry.remove(conn);
        }
        assert!(registry.is_empty());
    }
}
