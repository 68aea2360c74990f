//! Presence broadcaster: pushes the online-roster snapshot to every live
//! connection. Callers invoke `announce` only on registry transition edges
//! (first connect, last disconnect), never per handle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::metrics::PresenceMetrics;
use crate::registry::ConnectionRegistry;
use crate::router::send_to_connections;
use crate::websocket::{OutboundMessage, ServerMessage};

pub struct PresenceBroadcaster {
    registry: Arc<ConnectionRegistry>,
    broadcasts: AtomicU64,
}

impl PresenceBroadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            broadcasts: AtomicU64::new(0),
        }
    }

    /// Total broadcasts performed since startup
    pub fn broadcast_count(&self) -> u64 {
        self.broadcasts.load(Ordering::Relaxed)
    }

    /// Snapshot the online user ids and push them to every connection.
    /// Returns the number of connections the roster reached.
    #[tracing::instrument(name = "presence.announce", skip(self))]
    pub async fn announce(&self) -> usize {
        let user_ids = self.registry.online_user_ids();
        let connections = self.registry.all_connections();
        let online = user_ids.len();

        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        PresenceMetrics::record_broadcast();

        if connections.is_empty() {
            tracing::debug!(online_users = online, "No connections to announce to");
            return 0;
        }

        let message = ServerMessage::GetOnlineUsers { user_ids };
        let (delivered, failed) =
            send_to_connections(&connections, OutboundMessage::Raw(message)).await;

        tracing::debug!(
            online_users = online,
            delivered = delivered,
            failed = failed,
            "Announced online roster"
        );

        delivered
    }
}
