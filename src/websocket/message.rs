use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::router::RoutableEvent;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    SendMessage {
        sender_id: String,
        receiver_id: String,
        /// The already-persisted message document, forwarded verbatim
        message: serde_json::Value,
    },
    #[serde(rename_all = "camelCase")]
    UserTyping {
        sender_id: String,
        receiver_id: String,
    },
    #[serde(rename_all = "camelCase")]
    StopTyping {
        sender_id: String,
        receiver_id: String,
    },
    Ping,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    NewMessage {
        #[serde(flatten)]
        message: serde_json::Value,
    },
    #[serde(rename_all = "camelCase")]
    MessageDeleted { message_id: String },
    #[serde(rename_all = "camelCase")]
    GetOnlineUsers { user_ids: Vec<String> },
    #[serde(rename_all = "camelCase")]
    UserTyping { sender_id: String },
    #[serde(rename_all = "camelCase")]
    StopTyping { sender_id: String },
    Heartbeat,
    Pong,
    Error { code: String, message: String },
}

impl ServerMessage {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Error raised while turning an inbound message into a routable event
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("claimed sender {claimed} does not match connection identity {identified}")]
    ForgedSender { claimed: String, identified: String },

    #[error("message type is not routable")]
    NotRoutable,
}

impl ClientMessage {
    /// Convert to a `RoutableEvent`, validating the claimed sender against the
    /// identity the connection established at handshake. A connection must
    /// never be able to forge a different sender.
    pub fn into_routable(self, identified: &str) -> Result<RoutableEvent, RelayError> {
        let claimed = match &self {
            Self::SendMessage { sender_id, .. }
            | Self::UserTyping { sender_id, .. }
            | Self::StopTyping { sender_id, .. } => sender_id.clone(),
            Self::Ping => return Err(RelayError::NotRoutable),
        };

        if claimed != identified {
            return Err(RelayError::ForgedSender {
                claimed,
                identified: identified.to_string(),
            });
        }

        Ok(match self {
            Self::SendMessage {
                sender_id,
                receiver_id,
                message,
            } => RoutableEvent::NewMessage {
                sender_id,
                receiver_id,
                message,
            },
            Self::UserTyping {
                sender_id,
                receiver_id,
            } => RoutableEvent::TypingStarted {
                sender_id,
                receiver_id,
            },
            Self::StopTyping {
                sender_id,
                receiver_id,
            } => RoutableEvent::TypingStopped {
                sender_id,
                receiver_id,
            },
            Self::Ping => unreachable!(),
        })
    }
}

/// Outbound payload for a connection's send channel. Fan-out paths serialize
/// once and share the result across handles.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    Raw(ServerMessage),
    Preserialized(Arc<str>),
}

impl OutboundMessage {
    pub fn preserialized(message: &ServerMessage) -> Result<Self, serde_json::Error> {
        Ok(Self::Preserialized(serde_json::to_string(message)?.into()))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Raw(message) => serde_json::to_string(message),
            Self::Preserialized(json) => Ok(json.to_string()),
        }
    }
}
