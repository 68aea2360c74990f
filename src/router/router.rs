use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;

use crate::metrics::MessageMetrics;
use crate::registry::{ConnectionHandle, ConnectionRegistry};
use crate::websocket::OutboundMessage;

use super::RoutableEvent;

/// Maximum number of concurrent sends per route call
const MAX_CONCURRENT_SENDS: usize = 100;

/// Result of one route call
#[derive(Debug, Clone, Serialize)]
pub struct RouteOutcome {
    /// Number of connections the event was delivered to
    pub delivered_to: usize,
    /// Number of connections that failed to receive
    pub failed: usize,
}

impl RouteOutcome {
    fn dropped() -> Self {
        Self {
            delivered_to: 0,
            failed: 0,
        }
    }
}

/// Routing counters
#[derive(Debug, Default)]
pub struct RouterStats {
    pub total_routed: AtomicU64,
    pub total_delivered: AtomicU64,
    pub total_failed: AtomicU64,
    /// Events dropped because the recipient had no live connection
    pub dropped_offline: AtomicU64,
}

impl RouterStats {
    pub fn snapshot(&self) -> RouterStatsSnapshot {
        RouterStatsSnapshot {
            total_routed: self.total_routed.load(Ordering::Relaxed),
            total_delivered: self.total_delivered.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            dropped_offline: self.dropped_offline.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RouterStatsSnapshot {
    pub total_routed: u64,
    pub total_delivered: u64,
    pub total_failed: u64,
    pub dropped_offline: u64,
}

/// Forwards routable events to the recipient's live connections.
///
/// Reads the registry, never mutates it; a dead handle is a soft failure left
/// for the owning connection lifecycle to clean up.
pub struct EventRouter {
    registry: Arc<ConnectionRegistry>,
    stats: RouterStats,
}

impl EventRouter {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            stats: RouterStats::default(),
        }
    }

    pub fn stats(&self) -> RouterStatsSnapshot {
        self.stats.snapshot()
    }

    /// Route an event to its receiver. An offline receiver is not an error:
    /// the event is dropped silently and the call completes normally. Send
    /// failures on individual handles are logged and skipped, never propagated.
    #[tracing::instrument(
        name = "router.route",
        skip(self, event),
        fields(kind = event.kind(), receiver_id = event.receiver_id())
    )]
    pub async fn route(&self, event: RoutableEvent) -> RouteOutcome {
        self.stats.total_routed.fetch_add(1, Ordering::Relaxed);
        MessageMetrics::record_routed(event.kind());

        let connections = self.registry.lookup(event.receiver_id());
        if connections.is_empty() {
            self.stats.dropped_offline.fetch_add(1, Ordering::Relaxed);
            MessageMetrics::record_dropped_offline();
            tracing::debug!("Recipient offline, event dropped");
            return RouteOutcome::dropped();
        }

        let kind = event.kind();
        let receiver_id = event.receiver_id().to_string();
        let message = event.into_server_message();
        let (delivered, failed) = send_to_connections(&connections, OutboundMessage::Raw(message)).await;

        self.stats
            .total_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.stats
            .total_failed
            .fetch_add(failed as u64, Ordering::Relaxed);
        MessageMetrics::record_delivered(delivered as u64);
        MessageMetrics::record_failed(failed as u64);

        tracing::debug!(
            kind = kind,
            receiver_id = %receiver_id,
            delivered = delivered,
            failed = failed,
            "Routed event"
        );

        RouteOutcome {
            delivered_to: delivered,
            failed,
        }
    }
}

/// Send one outbound message to a list of connections. Small fan-outs (the
/// common two-tab case) send sequentially; larger ones pre-serialize once and
/// send with bounded parallelism.
pub(crate) async fn send_to_connections(
    connections: &[Arc<ConnectionHandle>],
    message: OutboundMessage,
) -> (usize, usize) {
    if connections.is_empty() {
        return (0, 0);
    }

    if connections.len() <= 3 {
        let mut delivered = 0;
        let mut failed = 0;
        for conn in connections {
            match conn.send_preserialized(message.clone()).await {
                Ok(_) => delivered += 1,
                Err(_) => {
                    failed += 1;
                    tracing::debug!(
                        connection_id = %conn.id,
                        user_id = %conn.user_id,
                        "Send failed, connection likely closing"
                    );
                }
            }
        }
        return (delivered, failed);
    }

    // Serialize once and share across all handles
    let outbound = match &message {
        OutboundMessage::Raw(raw) => match OutboundMessage::preserialized(raw) {
            Ok(pre) => pre,
            Err(e) => {
                tracing::error!(error = %e, "Failed to pre-serialize message, sending raw");
                message.clone()
            }
        },
        OutboundMessage::Preserialized(_) => message.clone(),
    };

    let mut futures = FuturesUnordered::new();
    let mut delivered = 0;
    let mut failed = 0;
    let mut pending = 0;

    for conn in connections {
        let conn = conn.clone();
        let msg = outbound.clone();
        futures.push(async move { conn.send_preserialized(msg).await.is_ok() });
        pending += 1;

        while pending >= MAX_CONCURRENT_SENDS {
            match futures.next().await {
                Some(true) => delivered += 1,
                Some(false) => failed += 1,
                None => break,
            }
            pending -= 1;
        }
    }

    while let Some(ok) = futures.next().await {
        if ok {
            delivered += 1;
        } else {
            failed += 1;
        }
    }

    (delivered, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::ServerMessage;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn test_router() -> (Arc<ConnectionRegistry>, EventRouter) {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = EventRouter::new(registry.clone());
        (registry, router)
    }

    fn new_message(receiver: &str) -> RoutableEvent {
        RoutableEvent::NewMessage {
            sender_id: "alice".to_string(),
            receiver_id: receiver.to_string(),
            message: json!({"_id": "m1", "text": "hi"}),
        }
    }

    #[tokio::test]
    async fn test_offline_recipient_drops_silently() {
        let (_registry, router) = test_router();

        let outcome = router.route(new_message("bob")).await;
        assert_eq!(outcome.delivered_to, 0);
        assert_eq!(outcome.failed, 0);

        let stats = router.stats();
        assert_eq!(stats.total_routed, 1);
        assert_eq!(stats.dropped_offline, 1);
    }

    #[tokio::test]
    async fn test_two_tabs_each_delivered_once() {
        let (registry, router) = test_router();

        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        registry.register("bob".to_string(), tx1).unwrap();
        registry.register("bob".to_string(), tx2).unwrap();

        let outcome = router.route(new_message("bob")).await;
        assert_eq!(outcome.delivered_to, 2);
        assert_eq!(outcome.failed, 0);

        for rx in [&mut rx1, &mut rx2] {
            let msg = rx.try_recv().expect("each tab gets exactly one frame");
            assert!(matches!(
                msg,
                OutboundMessage::Raw(ServerMessage::NewMessage { .. })
            ));
            assert!(rx.try_recv().is_err());
        }
    }

    #[tokio::test]
    async fn test_dead_handle_is_soft_failure() {
        let (registry, router) = test_router();

        let (tx_dead, rx_dead) = mpsc::channel(8);
        let (tx_live, mut rx_live) = mpsc::channel(8);
        registry.register("bob".to_string(), tx_dead).unwrap();
        registry.register("bob".to_string(), tx_live).unwrap();
        drop(rx_dead); // connection died between lookup and send

        let outcome = router.route(new_message("bob")).await;
        assert_eq!(outcome.delivered_to, 1);
        assert_eq!(outcome.failed, 1);
        assert!(rx_live.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_typing_event_routes_sender_only() {
        let (registry, router) = test_router();

        let (tx, mut rx) = mpsc::channel(8);
        registry.register("bob".to_string(), tx).unwrap();

        router
            .route(RoutableEvent::TypingStarted {
                sender_id: "alice".to_string(),
                receiver_id: "bob".to_string(),
            })
            .await;

        match rx.try_recv().unwrap() {
            OutboundMessage::Raw(ServerMessage::UserTyping { sender_id }) => {
                assert_eq!(sender_id, "alice");
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_large_fanout_uses_preserialization() {
        let registry = Arc::new(ConnectionRegistry::with_limits(
            crate::registry::ConnectionLimits {
                max_connections: 100,
                max_connections_per_user: 100,
            },
        ));
        let router = EventRouter::new(registry.clone());

        let mut receivers = Vec::new();
        for _ in 0..10 {
            let (tx, rx) = mpsc::channel(8);
            registry.register("bob".to_string(), tx).unwrap();
            receivers.push(rx);
        }

        let outcome = router.route(new_message("bob")).await;
        assert_eq!(outcome.delivered_to, 10);

        for mut rx in receivers {
            assert!(matches!(
                rx.try_recv().unwrap(),
                OutboundMessage::Preserialized(_)
            ));
        }
    }
}
