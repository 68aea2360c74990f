use prometheus::{Encoder, TextEncoder};

use super::*;

/// Encode all registered metrics in the Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Routing counters
pub struct MessageMetrics;

impl MessageMetrics {
    pub fn record_routed(kind: &str) {
        EVENTS_ROUTED_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn record_delivered(count: u64) {
        EVENTS_DELIVERED_TOTAL.inc_by(count);
    }

    pub fn record_failed(count: u64) {
        EVENTS_FAILED_TOTAL.inc_by(count);
    }

    pub fn record_dropped_offline() {
        EVENTS_DROPPED_OFFLINE_TOTAL.inc();
    }
}

/// Inbound WebSocket message counters
pub struct WsMessageMetrics;

impl WsMessageMetrics {
    pub fn record_received(message_type: &str) {
        WS_MESSAGES_RECEIVED.with_label_values(&[message_type]).inc();
    }
}

/// Presence broadcast counters
pub struct PresenceMetrics;

impl PresenceMetrics {
    pub fn record_broadcast() {
        PRESENCE_BROADCASTS_TOTAL.inc();
    }
}

/// Heartbeat task counters
pub struct HeartbeatMetrics;

impl HeartbeatMetrics {
    pub fn record_duration_ms(ms: u64) {
        HEARTBEAT_DURATION_MS.observe(ms as f64);
    }

    pub fn record_timeouts(count: u64) {
        HEARTBEAT_TIMEOUTS.inc_by(count);
    }

    pub fn record_reaped(count: u64) {
        STALE_CONNECTIONS_REAPED.inc_by(count);
    }
}
