//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::router::RouterStatsSnapshot;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub connections: ConnectionHealthResponse,
}

#[derive(Debug, Serialize)]
pub struct ConnectionHealthResponse {
    pub total: usize,
    pub unique_users: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub connections: ConnectionStats,
    pub routing: RouterStatsSnapshot,
    pub presence_broadcasts: u64,
}

#[derive(Debug, Serialize)]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub unique_users: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry_stats = state.registry.stats();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        connections: ConnectionHealthResponse {
            total: registry_stats.total_connections,
            unique_users: registry_stats.unique_users,
        },
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let registry_stats = state.registry.stats();

    Json(StatsResponse {
        connections: ConnectionStats {
            total_connections: registry_stats.total_connections,
            unique_users: registry_stats.unique_users,
        },
        routing: state.router.stats(),
        presence_broadcasts: state.broadcaster.broadcast_count(),
    })
}
