//! Prometheus metrics for the realtime service.
//!
//! Covers the three things operators ask about: how many connections and
//! users are live, how routing is doing (delivered / failed / dropped
//! offline), and heartbeat health.

mod helpers;

pub use helpers::{encode_metrics, HeartbeatMetrics, MessageMetrics, PresenceMetrics, WsMessageMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "chat";

lazy_static! {
    // Connection metrics

    /// Total number of active WebSocket connections
    pub static ref CONNECTIONS_TOTAL: IntGauge = register_int_gauge!(
        format!("{}_connections_total", METRIC_PREFIX),
        "Total number of active WebSocket connections"
    ).unwrap();

    /// Number of unique online users
    pub static ref USERS_ONLINE: IntGauge = register_int_gauge!(
        format!("{}_users_online", METRIC_PREFIX),
        "Number of unique online users"
    ).unwrap();

    /// WebSocket connections opened
    pub static ref WS_CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections opened"
    ).unwrap();

    /// WebSocket connections closed
    pub static ref WS_CONNECTIONS_CLOSED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_closed_total", METRIC_PREFIX),
        "Total WebSocket connections closed"
    ).unwrap();

    /// WebSocket connection duration
    pub static ref WS_CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_ws_connection_duration_seconds", METRIC_PREFIX),
        "WebSocket connection duration in seconds",
        vec![1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 600.0, 1800.0, 3600.0]
    ).unwrap();

    /// WebSocket messages received from clients, by type
    pub static ref WS_MESSAGES_RECEIVED: IntCounterVec = register_int_counter_vec!(
        format!("{}_ws_messages_received_total", METRIC_PREFIX),
        "Total WebSocket messages received from clients",
        &["type"]
    ).unwrap();

    // Routing metrics

    /// Events routed, by kind
    pub static ref EVENTS_ROUTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_events_routed_total", METRIC_PREFIX),
        "Total events handed to the router",
        &["kind"]
    ).unwrap();

    /// Deliveries to individual connections
    pub static ref EVENTS_DELIVERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_events_delivered_total", METRIC_PREFIX),
        "Total events successfully delivered to connections"
    ).unwrap();

    /// Per-connection delivery failures
    pub static ref EVENTS_FAILED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_events_failed_total", METRIC_PREFIX),
        "Total event delivery failures"
    ).unwrap();

    /// Events dropped because the recipient was offline
    pub static ref EVENTS_DROPPED_OFFLINE_TOTAL: IntCounter = register_int_counter!(
        format!("{}_events_dropped_offline_total", METRIC_PREFIX),
        "Total events dropped because the recipient had no live connection"
    ).unwrap();

    // Presence metrics

    /// Online-roster broadcasts
    pub static ref PRESENCE_BROADCASTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_presence_broadcasts_total", METRIC_PREFIX),
        "Total presence roster broadcasts"
    ).unwrap();

    // Heartbeat metrics

    /// Heartbeat round duration in milliseconds
    pub static ref HEARTBEAT_DURATION_MS: Histogram = register_histogram!(
        format!("{}_heartbeat_duration_ms", METRIC_PREFIX),
        "Heartbeat round duration in milliseconds",
        vec![10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    ).unwrap();

    /// Heartbeat send timeouts
    pub static ref HEARTBEAT_TIMEOUTS: IntCounter = register_int_counter!(
        format!("{}_heartbeat_timeouts_total", METRIC_PREFIX),
        "Total heartbeat send timeouts"
    ).unwrap();

    /// Stale connections reaped
    pub static ref STALE_CONNECTIONS_REAPED: IntCounter = register_int_counter!(
        format!("{}_stale_connections_reaped_total", METRIC_PREFIX),
        "Total stale connections removed by the cleanup task"
    ).unwrap();
}
