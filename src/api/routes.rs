use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;

use super::events::{online_users, push_message, push_message_deleted};
use super::health::{health, stats};
use super::metrics::prometheus_metrics;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health & observability
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        // Event push endpoints, called by the message service after the
        // durable store has persisted
        .nest(
            "/api/v1",
            Router::new()
                .route("/events/message", post(push_message))
                .route("/events/message-deleted", post(push_message_deleted))
                .route("/online-users", get(online_users)),
        )
}
