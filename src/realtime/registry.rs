use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,
    #[error("outbound buffer full")]
    Full,
}

/// Sending half of one live realtime connection.
///
/// Frames handed to the handle are written to the socket by the connection's
/// own writer task; the handle never touches the socket itself.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    tx: mpsc::Sender<String>,
}

impl ConnectionHandle {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    pub fn try_send(&self, frame: String) -> Result<(), TransportError> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::Full,
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }
}

/// Maps a user id to at most one live connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<Mutex<HashMap<i64, ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<i64, ConnectionHandle>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `handle` for `user_id`, returning the superseded handle.
    ///
    /// The previous connection is not closed; it cleans up after itself when
    /// its own socket goes away.
    pub fn register(&self, user_id: i64, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        self.map().insert(user_id, handle)
    }

    /// Removes the registration for `user_id` only if it still belongs to
    /// `connection_id`. Returns whether anything was removed.
    pub fn unregister(&self, user_id: i64, connection_id: Uuid) -> bool {
        let mut map = self.map();
        match map.get(&user_id) {
            Some(current) if current.id() == connection_id => {
                map.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    pub fn lookup(&self, user_id: i64) -> Option<ConnectionHandle> {
        self.map().get(&user_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}
