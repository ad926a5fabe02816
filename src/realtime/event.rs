use serde::Serialize;

use crate::manager::ChatMessage;

/// Events pushed from the server to a connected client.
///
/// Serialized as an internally tagged object, e.g.
/// `{"type": "new_message", "chatId": 7, "message": {...}}`.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeEvent {
    NewMessage {
        #[serde(rename = "chatId")]
        chat_id: i64,
        message: ChatMessage,
    },
}

impl RealtimeEvent {
    pub fn new_message(chat_id: i64, message: ChatMessage) -> Self {
        RealtimeEvent::NewMessage { chat_id, message }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RealtimeEvent::NewMessage { .. } => "new_message",
        }
    }
}
