use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::websocket::OutboundMessage;

use super::types::{ConnectionError, ConnectionHandle, ConnectionLimits};

/// Result of registering a connection
pub struct Registration {
    pub handle: Arc<ConnectionHandle>,
    /// True when this was the user's first live connection (offline→online)
    pub came_online: bool,
}

/// Result of deregistering a connection
pub struct Deregistration {
    pub handle: Arc<ConnectionHandle>,
    /// True when this was the user's last live connection (online→offline)
    pub went_offline: bool,
}

/// Tracks all live connections and which user owns each of them.
///
/// Invariant: a user id appears in `user_index` iff it has at least one live
/// handle; removing the last handle removes the index entry. Register,
/// deregister and the snapshot operations serialize per user through the
/// index entry's shard lock, so racing calls never lose an update.
pub struct ConnectionRegistry {
    /// connection_id -> ConnectionHandle
    connections: DashMap<Uuid, Arc<ConnectionHandle>>,
    /// user_id -> Set<connection_id> (supports multiple tabs per user)
    user_index: DashMap<String, HashSet<Uuid>>,
    limits: ConnectionLimits,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::with_limits(ConnectionLimits::default())
    }

    pub fn with_limits(limits: ConnectionLimits) -> Self {
        Self {
            connections: DashMap::new(),
            user_index: DashMap::new(),
            limits,
        }
    }

    /// Register a new connection for `user_id`.
    pub fn register(
        &self,
        user_id: String,
        sender: mpsc::Sender<OutboundMessage>,
    ) -> Result<Registration, ConnectionError> {
        let total = self.connections.len();
        if total >= self.limits.max_connections {
            return Err(ConnectionError::TotalLimitExceeded {
                current: total,
                max: self.limits.max_connections,
            });
        }

        let handle = Arc::new(ConnectionHandle::new(user_id.clone(), sender));
        let conn_id = handle.id;

        // The entry guard is held across the limit check, the emptiness check
        // and the insert, so concurrent calls for the same user serialize.
        let came_online = {
            let mut user_conns = self.user_index.entry(user_id).or_default();
            if !user_conns.is_empty() && user_conns.len() >= self.limits.max_connections_per_user {
                return Err(ConnectionError::UserLimitExceeded {
                    user_id: handle.user_id.clone(),
                    current: user_conns.len(),
                    max: self.limits.max_connections_per_user,
                });
            }
            let was_empty = user_conns.is_empty();
            user_conns.insert(conn_id);
            was_empty
        };

        self.connections.insert(conn_id, handle.clone());

        tracing::info!(
            connection_id = %conn_id,
            user_id = %handle.user_id,
            came_online = came_online,
            "Connection registered"
        );

        Ok(Registration { handle, came_online })
    }

    /// Deregister a connection. Returns `None` when the connection was already
    /// removed (idempotent).
    pub fn deregister(&self, connection_id: Uuid) -> Option<Deregistration> {
        let (_, handle) = self.connections.remove(&connection_id)?;

        let went_offline = match self.user_index.entry(handle.user_id.clone()) {
            Entry::Occupied(mut occupied) => {
                occupied.get_mut().remove(&connection_id);
                if occupied.get().is_empty() {
                    occupied.remove();
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(_) => false,
        };

        tracing::info!(
            connection_id = %connection_id,
            user_id = %handle.user_id,
            went_offline = went_offline,
            "Connection deregistered"
        );

        Some(Deregistration { handle, went_offline })
    }

    /// All live connections for a user (point-in-time snapshot; the set may
    /// change concurrently after the call returns)
    pub fn lookup(&self, user_id: &str) -> Vec<Arc<ConnectionHandle>> {
        self.user_index
            .get(user_id)
            .map(|conn_ids| {
                conn_ids
                    .iter()
                    .filter_map(|id| self.connections.get(id).map(|h| h.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Current snapshot of online user ids
    pub fn online_user_ids(&self) -> Vec<String> {
        self.user_index.iter().map(|e| e.key().clone()).collect()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.user_index.contains_key(user_id)
    }

    /// All live connections across all users
    pub fn all_connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections.iter().map(|r| r.value().clone()).collect()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            total_connections: self.connections.len(),
            unique_users: self.user_index.len(),
        }
    }

    /// Find connections with no activity for longer than the timeout
    pub fn find_stale_connections(&self, timeout_secs: u64) -> Vec<Uuid> {
        let now = chrono::Utc::now();
        let timeout = chrono::Duration::seconds(timeout_secs as i64);

        self.connections
            .iter()
            .filter(|entry| now.signed_duration_since(entry.value().last_activity()) > timeout)
            .map(|entry| *entry.key())
            .collect()
    }

    /// Remove stale connections. Returns the removal count and the users whose
    /// last handle was reaped, so the caller can re-announce presence.
    pub fn cleanup_stale_connections(&self, timeout_secs: u64) -> CleanupOutcome {
        let stale = self.find_stale_connections(timeout_secs);
        let mut removed = 0;
        let mut went_offline = Vec::new();

        for conn_id in stale {
            tracing::info!(connection_id = %conn_id, "Removing stale connection due to timeout");
            if let Some(dereg) = self.deregister(conn_id) {
                removed += 1;
                if dereg.went_offline {
                    went_offline.push(dereg.handle.user_id.clone());
                }
            }
        }

        CleanupOutcome {
            removed,
            went_offline,
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a stale-connection sweep
pub struct CleanupOutcome {
    pub removed: usize,
    pub went_offline: Vec<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RegistryStats {
    pub total_connections: usize,
    pub unique_users: usize,
}
