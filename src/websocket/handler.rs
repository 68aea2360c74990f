use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::metrics::{WsMessageMetrics, WS_CONNECTIONS_CLOSED, WS_CONNECTIONS_OPENED, WS_CONNECTION_DURATION};
use crate::registry::ConnectionHandle;
use crate::server::AppState;

use super::message::{ClientMessage, OutboundMessage, RelayError, ServerMessage};

const CHANNEL_BUFFER_SIZE: usize = 32;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsQuery {
    /// Handshake identity, socket.io-handshake style
    pub user_id: Option<String>,
    pub token: Option<String>,
}

/// WebSocket upgrade handler. A connection that cannot identify itself is
/// rejected here, before any registry mutation.
#[tracing::instrument(
    name = "ws.upgrade",
    skip(ws, state, query, headers),
    fields(has_user_id = query.user_id.is_some(), has_token = query.token.is_some())
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    let user_id = match resolve_identity(&state, &query, &headers) {
        Ok(id) => id,
        Err(response) => return response,
    };

    tracing::info!(user_id = %user_id, "WebSocket upgrade requested");

    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

/// Resolve the connection's user identity from handshake metadata.
///
/// With a JWT validator configured the token subject is authoritative and a
/// conflicting `userId` parameter is rejected. Without one the `userId`
/// parameter is trusted as-is (authentication happens upstream).
fn resolve_identity(
    state: &AppState,
    query: &WsQuery,
    headers: &HeaderMap,
) -> Result<String, Response> {
    match &state.jwt_validator {
        Some(validator) => {
            let token = extract_token(query, headers).ok_or_else(|| {
                (StatusCode::UNAUTHORIZED, "Missing authentication token").into_response()
            })?;

            let claims = validator.validate(&token).map_err(|e| {
                tracing::warn!(error = %e, "JWT validation failed");
                (StatusCode::UNAUTHORIZED, "Invalid token").into_response()
            })?;

            if let Some(ref claimed) = query.user_id {
                if *claimed != claims.sub {
                    tracing::warn!(
                        claimed = %claimed,
                        subject = %claims.sub,
                        "Handshake userId does not match token subject"
                    );
                    return Err(
                        (StatusCode::UNAUTHORIZED, "Handshake identity mismatch").into_response()
                    );
                }
            }

            Ok(claims.sub)
        }
        None => query.user_id.clone().ok_or_else(|| {
            (StatusCode::BAD_REQUEST, "Missing userId").into_response()
        }),
    }
}

/// Extract token from query parameter or Authorization header
fn extract_token(query: &WsQuery, headers: &HeaderMap) -> Option<String> {
    if let Some(ref token) = query.token {
        return Some(token.clone());
    }

    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    None
}

/// Handle an established WebSocket connection: register, relay inbound events
/// to the router, deregister on close. Failures on this connection never
/// surface beyond it.
#[tracing::instrument(
    name = "ws.connection",
    skip(socket, state),
    fields(user_id = %user_id)
)]
async fn handle_socket(socket: WebSocket, state: AppState, user_id: String) {
    let connection_start = std::time::Instant::now();

    // Channel for pushing messages to this connection
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(CHANNEL_BUFFER_SIZE);

    let registration = match state.registry.register(user_id.clone(), tx) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "Connection rejected");
            let (mut ws_sender, _) = socket.split();
            let error_msg = ServerMessage::error("CONNECTION_LIMIT", e.to_string());
            if let Ok(json) = serde_json::to_string(&error_msg) {
                let _ = ws_sender.send(Message::Text(json.into())).await;
            }
            let _ = ws_sender.close().await;
            return;
        }
    };
    let handle = registration.handle;
    let connection_id = handle.id;

    WS_CONNECTIONS_OPENED.inc();

    tracing::info!(
        connection_id = %connection_id,
        user_id = %user_id,
        "WebSocket connection established"
    );

    if registration.came_online {
        // First handle for this user: everyone learns the new roster
        state.broadcaster.announce().await;
    } else {
        // Additional tab: no roster change, only this connection needs it
        let _ = handle
            .send(ServerMessage::GetOnlineUsers {
                user_ids: state.registry.online_user_ids(),
            })
            .await;
    }

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Task for draining the channel into the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match msg.to_json() {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize message");
                    continue;
                }
            };

            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Task for relaying inbound frames
    let state_clone = state.clone();
    let handle_clone = handle.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_message(msg, &state_clone, &handle_clone).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
        }
        _ = recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
        }
    }

    // Deregistration must not be deferred: routing stops seeing this handle
    // the moment the transport closes.
    if let Some(dereg) = state.registry.deregister(connection_id) {
        if dereg.went_offline {
            state.broadcaster.announce().await;
        }
    }

    WS_CONNECTIONS_CLOSED.inc();
    let duration = connection_start.elapsed().as_secs_f64();
    WS_CONNECTION_DURATION.observe(duration);

    tracing::info!(
        connection_id = %connection_id,
        user_id = %user_id,
        duration_secs = duration,
        "WebSocket connection closed"
    );
}

/// Process a received WebSocket frame.
/// Returns false if the connection should be closed.
async fn process_message(msg: Message, state: &AppState, handle: &Arc<ConnectionHandle>) -> bool {
    match msg {
        Message::Text(text) => {
            handle.update_activity();

            let client_msg: ClientMessage = match serde_json::from_str(&text) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to parse client message");
                    let _ = handle
                        .send(ServerMessage::error("INVALID_MESSAGE", e.to_string()))
                        .await;
                    return true;
                }
            };

            handle_client_message(client_msg, state, handle).await
        }
        Message::Binary(_) => {
            let _ = handle
                .send(ServerMessage::error(
                    "UNSUPPORTED_FORMAT",
                    "Binary messages are not supported",
                ))
                .await;
            true
        }
        Message::Ping(_) => {
            handle.update_activity();
            true
        }
        Message::Pong(_) => {
            handle.update_activity();
            true
        }
        Message::Close(_) => {
            tracing::debug!(connection_id = %handle.id, "Received close frame");
            false
        }
    }
}

/// Relay a parsed client message to the router.
/// Returns false if the connection should be closed.
#[tracing::instrument(
    name = "ws.message",
    skip(msg, state, handle),
    fields(connection_id = %handle.id, user_id = %handle.user_id)
)]
async fn handle_client_message(
    msg: ClientMessage,
    state: &AppState,
    handle: &Arc<ConnectionHandle>,
) -> bool {
    let message_type = match &msg {
        ClientMessage::SendMessage { .. } => "sendMessage",
        ClientMessage::UserTyping { .. } => "userTyping",
        ClientMessage::StopTyping { .. } => "stopTyping",
        ClientMessage::Ping => "ping",
    };
    WsMessageMetrics::record_received(message_type);

    if matches!(msg, ClientMessage::Ping) {
        let _ = handle.send(ServerMessage::Pong).await;
        return true;
    }

    match msg.into_routable(&handle.user_id) {
        Ok(event) => {
            // Delivery is asynchronous from the sender's perspective; the
            // outcome is logged by the router and never reported back here.
            state.router.route(event).await;
            true
        }
        Err(RelayError::ForgedSender { claimed, identified }) => {
            tracing::warn!(
                connection_id = %handle.id,
                claimed = %claimed,
                identified = %identified,
                "Rejecting event with forged sender, closing connection"
            );
            let _ = handle
                .send(ServerMessage::error(
                    "FORGED_SENDER",
                    "Event sender does not match connection identity",
                ))
                .await;
            false
        }
        Err(RelayError::NotRoutable) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Claims;
    use crate::config::{JwtConfig, ServerConfig, Settings, WebSocketConfig};
    use jsonwebtoken::{encode, EncodingKey, Header};

    const TEST_SECRET: &str = "test-secret-key-for-testing";

    fn test_state(jwt_secret: Option<&str>) -> AppState {
        AppState::new(Settings {
            server: ServerConfig::default(),
            jwt: JwtConfig {
                secret: jwt_secret.map(str::to_string),
                issuer: None,
                audience: None,
            },
            websocket: WebSocketConfig::default(),
        })
    }

    fn query(user_id: Option<&str>, token: Option<&str>) -> WsQuery {
        WsQuery {
            user_id: user_id.map(str::to_string),
            token: token.map(str::to_string),
        }
    }

    fn token_for(sub: &str) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            exp: chrono::Utc::now().timestamp() + 3600,
            iat: chrono::Utc::now().timestamp(),
            extra: Default::default(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_unidentified_handshake_is_rejected_before_registration() {
        let state = test_state(None);

        let rejection = resolve_identity(&state, &query(None, None), &HeaderMap::new())
            .expect_err("handshake without userId must be rejected");
        assert_eq!(rejection.status(), StatusCode::BAD_REQUEST);

        // The rejection happens before any registry mutation: nothing to look
        // up, nothing to route to
        assert_eq!(state.registry.stats().total_connections, 0);
        assert!(state.registry.online_user_ids().is_empty());
    }

    #[test]
    fn test_trusted_user_id_without_validator() {
        let state = test_state(None);

        let identity =
            resolve_identity(&state, &query(Some("alice"), None), &HeaderMap::new()).unwrap();
        assert_eq!(identity, "alice");
    }

    #[test]
    fn test_missing_token_rejected_when_validator_configured() {
        let state = test_state(Some(TEST_SECRET));

        let rejection = resolve_identity(&state, &query(Some("alice"), None), &HeaderMap::new())
            .expect_err("userId alone is not enough once JWT is configured");
        assert_eq!(rejection.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(state.registry.stats().total_connections, 0);
    }

    #[test]
    fn test_user_id_conflicting_with_token_subject_rejected() {
        let state = test_state(Some(TEST_SECRET));
        let token = token_for("alice");

        let rejection = resolve_identity(
            &state,
            &query(Some("mallory"), Some(&token)),
            &HeaderMap::new(),
        )
        .expect_err("handshake userId must match the token subject");
        assert_eq!(rejection.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(state.registry.stats().total_connections, 0);
    }

    #[test]
    fn test_token_subject_is_the_identity() {
        let state = test_state(Some(TEST_SECRET));
        let token = token_for("alice");

        let identity =
            resolve_identity(&state, &query(None, Some(&token)), &HeaderMap::new()).unwrap();
        assert_eq!(identity, "alice");
    }

    #[test]
    fn test_bearer_header_token_accepted() {
        let state = test_state(Some(TEST_SECRET));
        let token = token_for("alice");

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            format!("Bearer {}", token).parse().unwrap(),
        );

        let identity = resolve_identity(&state, &query(None, None), &headers).unwrap();
        assert_eq!(identity, "alice");
    }
}
