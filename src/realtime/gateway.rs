use tokio::sync::mpsc;
use tracing::{debug, error};

use super::event::RealtimeEvent;
use super::registry::{ConnectionHandle, ConnectionRegistry};
use crate::manager::session_manager::{self, SessionId, SessionManager};

/// Why a realtime handshake was refused. Each reason maps to its own close code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeRejection {
    MissingCredential,
    InvalidCredential,
    Internal,
}

impl HandshakeRejection {
    pub fn close_code(self) -> u16 {
        match self {
            HandshakeRejection::MissingCredential => 4001,
            HandshakeRejection::InvalidCredential => 4002,
            HandshakeRejection::Internal => 5000,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            HandshakeRejection::MissingCredential => "Authentication required",
            HandshakeRejection::InvalidCredential => "Invalid session",
            HandshakeRejection::Internal => "Server error",
        }
    }
}

/// Resolves the session token presented during the handshake to a user id.
pub async fn authenticate(
    pool: &sqlx::SqlitePool,
    token: Option<String>,
) -> Result<i64, HandshakeRejection> {
    let token = token
        .filter(|t| !t.is_empty())
        .ok_or(HandshakeRejection::MissingCredential)?;

    match SessionManager::new(pool).get_user(&SessionId(token)).await {
        Ok(user) => Ok(user.id),
        Err(session_manager::Error::DoesNotExist) => Err(HandshakeRejection::InvalidCredential),
        Err(session_manager::Error::DatabaseError(e)) => {
            error!(error = %e, "session lookup failed during websocket handshake");
            Err(HandshakeRejection::Internal)
        }
    }
}

/// The only path through which realtime events reach clients.
#[derive(Debug, Clone)]
pub struct Gateway {
    registry: ConnectionRegistry,
    outbound_buffer: usize,
}

impl Gateway {
    pub fn new(registry: ConnectionRegistry, outbound_buffer: usize) -> Self {
        Self {
            registry,
            outbound_buffer: outbound_buffer.max(1),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Opens an outbound queue for `user_id` and registers it, superseding any
    /// earlier connection of the same user.
    pub fn connect(&self, user_id: i64) -> (ConnectionHandle, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(self.outbound_buffer);
        let handle = ConnectionHandle::new(tx);
        if let Some(previous) = self.registry.register(user_id, handle.clone()) {
            debug!(
                user_id,
                superseded = %previous.id(),
                connection_id = %handle.id(),
                "realtime connection superseded"
            );
        }
        (handle, rx)
    }

    pub fn disconnect(&self, user_id: i64, handle: &ConnectionHandle) {
        if !self.registry.unregister(user_id, handle.id()) {
            debug!(
                user_id,
                connection_id = %handle.id(),
                "stale connection closed, newer registration kept"
            );
        }
    }

    /// Best-effort delivery of `event` to `user_id`.
    ///
    /// Never waits and never fails: an absent, closed or saturated connection
    /// simply drops the event. Clients catch up by re-fetching history.
    pub fn push(&self, user_id: i64, event: &RealtimeEvent) {
        let Some(handle) = self.registry.lookup(user_id) else {
            debug!(user_id, event = event.kind(), "push dropped, user not connected");
            return;
        };
        if !handle.is_open() {
            debug!(user_id, event = event.kind(), "push dropped, connection closing");
            return;
        }

        let frame = match serde_json::to_string(event) {
            Ok(frame) => frame,
            Err(e) => {
                error!(user_id, event = event.kind(), error = %e, "failed to serialize realtime event");
                return;
            }
        };

        if let Err(e) = handle.try_send(frame) {
            debug!(
                user_id,
                connection_id = %handle.id(),
                event = event.kind(),
                error = %e,
                "push dropped"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::ChatMessage;

    fn sample_event(chat_id: i64) -> RealtimeEvent {
        RealtimeEvent::new_message(
            chat_id,
            ChatMessage {
                id: 1,
                chat_id,
                sender_id: 2,
                sender_name: None,
                sender_role: None,
                body: "ping".into(),
                is_read: false,
                created_at: chrono::Utc::now().naive_utc(),
            },
        )
    }

    #[tokio::test]
    async fn push_reaches_connected_user() {
        let gateway = Gateway::new(ConnectionRegistry::new(), 8);
        let (_handle, mut rx) = gateway.connect(1);

        gateway.push(1, &sample_event(5));

        let frame = rx.recv().await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(json["type"], "new_message");
        assert_eq!(json["chatId"], 5);
    }

    #[tokio::test]
    async fn push_to_absent_user_is_silent() {
        let gateway = Gateway::new(ConnectionRegistry::new(), 8);
        let (_handle, mut rx) = gateway.connect(1);

        gateway.push(2, &sample_event(5));

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn push_after_reconnect_goes_to_newest_connection() {
        let gateway = Gateway::new(ConnectionRegistry::new(), 8);
        let (old, mut old_rx) = gateway.connect(1);
        let (_new, mut new_rx) = gateway.connect(1);

        // The superseded socket closing must not evict the new one.
        gateway.disconnect(1, &old);
        gateway.push(1, &sample_event(9));

        assert!(old_rx.try_recv().is_err());
        assert!(new_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn push_to_closed_or_full_connection_is_dropped() {
        let gateway = Gateway::new(ConnectionRegistry::new(), 1);
        let (_handle, mut rx) = gateway.connect(1);

        gateway.push(1, &sample_event(1));
        gateway.push(1, &sample_event(2));
        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());

        drop(rx);
        gateway.push(1, &sample_event(3));
    }

    #[sqlx::test(fixtures("users", "sessions"))]
    async fn handshake_authentication_outcomes(pool: sqlx::SqlitePool) {
        assert_eq!(
            authenticate(&pool, None).await,
            Err(HandshakeRejection::MissingCredential)
        );
        assert_eq!(
            authenticate(&pool, Some(String::new())).await,
            Err(HandshakeRejection::MissingCredential)
        );
        assert_eq!(
            authenticate(&pool, Some("nope".into())).await,
            Err(HandshakeRejection::InvalidCredential)
        );
        assert_eq!(
            authenticate(&pool, Some("staleSessionToken".into())).await,
            Err(HandshakeRejection::InvalidCredential)
        );
        assert_eq!(authenticate(&pool, Some("f15wQrWboFNBW".into())).await, Ok(1));
    }

    #[test]
    fn close_codes() {
        assert_eq!(HandshakeRejection::MissingCredential.close_code(), 4001);
        assert_eq!(HandshakeRejection::InvalidCredential.close_code(), 4002);
        assert_eq!(HandshakeRejection::Internal.close_code(), 5000);
    }
}
