use crate::websocket::ServerMessage;

/// Event kinds the router forwards. Each carries an explicit receiver identity
/// used for the registry lookup; none are persisted here. `NewMessage` and
/// `MessageDeleted` arrive after the durable store has done its work;
/// the typing variants are fire-and-forget with no durability at all.
#[derive(Debug, Clone)]
pub enum RoutableEvent {
    NewMessage {
        sender_id: String,
        receiver_id: String,
        /// The persisted message document, forwarded verbatim
        message: serde_json::Value,
    },
    MessageDeleted {
        message_id: String,
        receiver_id: String,
    },
    TypingStarted {
        sender_id: String,
        receiver_id: String,
    },
    TypingStopped {
        sender_id: String,
        receiver_id: String,
    },
}

impl RoutableEvent {
    pub fn receiver_id(&self) -> &str {
        match self {
            Self::NewMessage { receiver_id, .. }
            | Self::MessageDeleted { receiver_id, .. }
            | Self::TypingStarted { receiver_id, .. }
            | Self::TypingStopped { receiver_id, .. } => receiver_id,
        }
    }

    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NewMessage { .. } => "new_message",
            Self::MessageDeleted { .. } => "message_deleted",
            Self::TypingStarted { .. } => "typing_started",
            Self::TypingStopped { .. } => "typing_stopped",
        }
    }

    /// The outbound frame delivered to the recipient
    pub fn into_server_message(self) -> ServerMessage {
        match self {
            Self::NewMessage { message, .. } => ServerMessage::NewMessage { message },
            Self::MessageDeleted { message_id, .. } => ServerMessage::MessageDeleted { message_id },
            Self::TypingStarted { sender_id, .. } => ServerMessage::UserTyping { sender_id },
            Self::TypingStopped { sender_id, .. } => ServerMessage::StopTyping { sender_id },
        }
    }
}
