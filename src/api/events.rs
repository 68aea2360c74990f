//! HTTP event push handlers.
//!
//! The durable message store calls these after its own write succeeds; the
//! payload arriving here is already persisted and is only forwarded.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::router::RoutableEvent;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessageRequest {
    pub sender_id: String,
    pub receiver_id: String,
    /// The persisted message document, forwarded verbatim to the recipient
    pub message: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessageDeletedRequest {
    pub message_id: String,
    pub receiver_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    pub success: bool,
    pub delivered_to: usize,
    pub failed: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUsersResponse {
    pub user_ids: Vec<String>,
}

fn require_non_empty(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// Push a persisted message to the recipient's live connections
#[tracing::instrument(
    name = "http.push_message",
    skip(state, request),
    fields(sender_id = %request.sender_id, receiver_id = %request.receiver_id)
)]
pub async fn push_message(
    State(state): State<AppState>,
    Json(request): Json<PushMessageRequest>,
) -> Result<Json<PushResponse>> {
    require_non_empty(&request.sender_id, "senderId")?;
    require_non_empty(&request.receiver_id, "receiverId")?;

    let outcome = state
        .router
        .route(RoutableEvent::NewMessage {
            sender_id: request.sender_id,
            receiver_id: request.receiver_id,
            message: request.message,
        })
        .await;

    // An offline recipient is not a failure: the message is already durable
    // and will be fetched through the read path.
    Ok(Json(PushResponse {
        success: true,
        delivered_to: outcome.delivered_to,
        failed: outcome.failed,
        timestamp: Utc::now(),
    }))
}

/// Notify the recipient that a message was deleted
#[tracing::instrument(
    name = "http.push_message_deleted",
    skip(state, request),
    fields(message_id = %request.message_id, receiver_id = %request.receiver_id)
)]
pub async fn push_message_deleted(
    State(state): State<AppState>,
    Json(request): Json<PushMessageDeletedRequest>,
) -> Result<Json<PushResponse>> {
    require_non_empty(&request.message_id, "messageId")?;
    require_non_empty(&request.receiver_id, "receiverId")?;

    let outcome = state
        .router
        .route(RoutableEvent::MessageDeleted {
            message_id: request.message_id,
            receiver_id: request.receiver_id,
        })
        .await;

    Ok(Json(PushResponse {
        success: true,
        delivered_to: outcome.delivered_to,
        failed: outcome.failed,
        timestamp: Utc::now(),
    }))
}

/// Current online roster snapshot
pub async fn online_users(State(state): State<AppState>) -> Json<OnlineUsersResponse> {
    Json(OnlineUsersResponse {
        user_ids: state.registry.online_user_ids(),
    })
}
