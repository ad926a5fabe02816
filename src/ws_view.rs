use std::{borrow::Cow, fmt::Display, sync::Arc};

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use futures::{Sink, SinkExt, Stream, StreamExt};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::auth::session_id_from;
use crate::realtime::gateway::{authenticate, HandshakeRejection};
use crate::realtime::Gateway;
use crate::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Response {
    let token = session_id_from(&jar).map(|session_id| session_id.0);
    ws.on_upgrade(move |socket| handle_socket(socket, state, token))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, token: Option<String>) {
    let (sender, receiver) = socket.split();
    serve_connection(
        sender,
        receiver,
        state.pool.clone(),
        state.gateway.clone(),
        token,
    )
    .await;
}

async fn reject<W>(mut sender: W, rejection: HandshakeRejection)
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    let frame = CloseFrame {
        code: rejection.close_code(),
        reason: Cow::from(rejection.reason()),
    };
    if let Err(e) = sender.send(Message::Close(Some(frame))).await {
        debug!(error = %e, "failed to send close frame");
    }
}

/// Runs one realtime connection: authenticate, register, forward outbound
/// frames until either side goes away, then unregister.
async fn serve_connection<W, R, E>(
    mut sender: W,
    mut receiver: R,
    pool: SqlitePool,
    gateway: Gateway,
    token: Option<String>,
) where
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin,
{
    let user_id = match authenticate(&pool, token).await {
        Ok(user_id) => user_id,
        Err(rejection) => {
            warn!(
                close_code = rejection.close_code(),
                reason = rejection.reason(),
                "websocket handshake rejected"
            );
            reject(sender, rejection).await;
            return;
        }
    };

    let (handle, mut rx) = gateway.connect(user_id);
    info!(user_id, connection_id = %handle.id(), "realtime connection opened");

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    // Inbound frames carry nothing; the loop only watches for the peer going away.
    let recv = async {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    };

    tokio::select! {
        _ = &mut send_task => {}
        _ = recv => send_task.abort(),
    }

    gateway.disconnect(user_id, &handle);
    info!(user_id, connection_id = %handle.id(), "realtime connection closed");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::channel::mpsc;

    use super::*;
    use crate::realtime::{ConnectionRegistry, RealtimeEvent};

    type Inbound = mpsc::UnboundedSender<Result<Message, axum::Error>>;

    fn socket() -> (
        mpsc::UnboundedSender<Message>,
        mpsc::UnboundedReceiver<Message>,
        Inbound,
        mpsc::UnboundedReceiver<Result<Message, axum::Error>>,
    ) {
        let (out_tx, out_rx) = mpsc::unbounded();
        let (in_tx, in_rx) = mpsc::unbounded();
        (out_tx, out_rx, in_tx, in_rx)
    }

    async fn close_code_for(pool: SqlitePool, token: Option<&str>) -> u16 {
        let gateway = Gateway::new(ConnectionRegistry::new(), 8);
        let (out_tx, mut out_rx, _in_tx, in_rx) = socket();

        serve_connection(out_tx, in_rx, pool, gateway.clone(), token.map(String::from)).await;

        assert!(gateway.registry().is_empty());
        match out_rx.next().await {
            Some(Message::Close(Some(frame))) => frame.code,
            other => panic!("expected a close frame, got {other:?}"),
        }
    }

    #[sqlx::test(fixtures(path = "realtime/fixtures", scripts("users", "sessions")))]
    async fn rejected_handshakes_send_close_frames(pool: SqlitePool) {
        assert_eq!(close_code_for(pool.clone(), None).await, 4001);
        assert_eq!(close_code_for(pool.clone(), Some("nope")).await, 4002);
        assert_eq!(close_code_for(pool, Some("staleSessionToken")).await, 4002);
    }

    #[sqlx::test(fixtures(path = "realtime/fixtures", scripts("users", "sessions")))]
    async fn connection_forwards_pushes_and_unregisters_on_close(pool: SqlitePool) {
        let gateway = Gateway::new(ConnectionRegistry::new(), 8);
        let (out_tx, mut out_rx, in_tx, in_rx) = socket();

        let connection = tokio::spawn(serve_connection(
            out_tx,
            in_rx,
            pool,
            gateway.clone(),
            Some("f15wQrWboFNBW".to_string()),
        ));

        for _ in 0..100 {
            if gateway.registry().lookup(1).is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(gateway.registry().lookup(1).is_some());

        let event = RealtimeEvent::new_message(
            3,
            crate::manager::ChatMessage {
                id: 11,
                chat_id: 3,
                sender_id: 2,
                sender_name: None,
                sender_role: None,
                body: "hello".into(),
                is_read: false,
                created_at: chrono::Utc::now().naive_utc(),
            },
        );
        gateway.push(1, &event);

        match out_rx.next().await {
            Some(Message::Text(frame)) => {
                let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
                assert_eq!(json["type"], "new_message");
                assert_eq!(json["chatId"], 3);
            }
            other => panic!("expected a text frame, got {other:?}"),
        }

        in_tx.unbounded_send(Ok(Message::Close(None))).unwrap();
        connection.await.unwrap();
        assert!(gateway.registry().lookup(1).is_none());
    }
}
