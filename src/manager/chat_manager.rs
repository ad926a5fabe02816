use sqlx::{SqliteConnection, SqliteExecutor};
use tracing::info;

use super::{ChannelInfo, ChannelSummary, ChatChannel, ChatMessage, Role};
use crate::error::{AppError, AppResult};
use crate::realtime::{Gateway, RealtimeEvent};

const MESSAGE_COLUMNS: &str = r#"
SELECT m.id, m.chat_id, m.sender_id, u.name AS sender_name, u.role AS sender_role,
       m.body, m.is_read, m.created_at
FROM messages m
JOIN users u ON m.sender_id = u.id
"#;

pub(crate) async fn insert_message<'e>(
    executor: impl SqliteExecutor<'e>,
    chat_id: i64,
    sender_id: i64,
    body: &str,
) -> Result<i64, sqlx::Error> {
    Ok(
        sqlx::query("INSERT INTO messages (chat_id, sender_id, body) VALUES (?, ?, ?)")
            .bind(chat_id)
            .bind(sender_id)
            .bind(body)
            .execute(executor)
            .await?
            .last_insert_rowid(),
    )
}

pub(crate) async fn fetch_message<'e>(
    executor: impl SqliteExecutor<'e>,
    message_id: i64,
) -> Result<ChatMessage, sqlx::Error> {
    sqlx::query_as::<_, ChatMessage>(&format!("{MESSAGE_COLUMNS} WHERE m.id = ?"))
        .bind(message_id)
        .fetch_one(executor)
        .await
}

/// Returns the channel of `order_id`, creating it with the given participants
/// if the order has none yet. The flag is true when the channel was created.
pub(crate) async fn get_or_create_channel(
    conn: &mut SqliteConnection,
    order_id: i64,
    customer_id: i64,
    staff_id: i64,
) -> Result<(ChatChannel, bool), sqlx::Error> {
    let created = sqlx::query(
        r#"
INSERT INTO chats (order_id, customer_id, staff_id) VALUES (?, ?, ?)
ON CONFLICT(order_id) DO NOTHING
        "#,
    )
    .bind(order_id)
    .bind(customer_id)
    .bind(staff_id)
    .execute(&mut *conn)
    .await?
    .rows_affected()
        == 1;

    let channel = sqlx::query_as::<_, ChatChannel>(
        "SELECT id, order_id, customer_id, staff_id, created_at FROM chats WHERE order_id = ?",
    )
    .bind(order_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok((channel, created))
}

pub struct ChatManager<'a> {
    pool: &'a sqlx::SqlitePool,
    gateway: &'a Gateway,
}

impl<'a> ChatManager<'a> {
    pub fn new(pool: &'a sqlx::SqlitePool, gateway: &'a Gateway) -> Self {
        Self { pool, gateway }
    }
}

impl ChatManager<'_> {
    /// Loads a channel the requester takes part in. Unknown channels and
    /// channels of other users are indistinguishable to the caller.
    async fn participant_channel(&self, chat_id: i64, user_id: i64) -> AppResult<ChatChannel> {
        sqlx::query_as::<_, ChatChannel>(
            "SELECT id, order_id, customer_id, staff_id, created_at FROM chats WHERE id = ?",
        )
        .bind(chat_id)
        .fetch_optional(self.pool)
        .await?
        .filter(|channel| channel.is_participant(user_id))
        .ok_or(AppError::AccessDenied)
    }

    pub async fn list_channels_for_user(
        &self,
        user_id: i64,
        role: Role,
    ) -> AppResult<Vec<ChannelSummary>> {
        let (own_column, counterpart_column) = match role {
            Role::Staff => ("staff_id", "customer_id"),
            Role::Customer => ("customer_id", "staff_id"),
        };

        let query = format!(
            r#"
SELECT c.id AS chat_id,
       c.order_id,
       s.name AS service_name,
       o.created_at AS order_date,
       u.name AS counterpart_name,
       (SELECT m.body FROM messages m WHERE m.chat_id = c.id
        ORDER BY m.created_at DESC, m.id DESC LIMIT 1) AS last_message,
       (SELECT m.created_at FROM messages m WHERE m.chat_id = c.id
        ORDER BY m.created_at DESC, m.id DESC LIMIT 1) AS last_message_time,
       (SELECT COUNT(*) FROM messages m
        WHERE m.chat_id = c.id AND m.sender_id != ? AND m.is_read = 0) AS unread_count
FROM chats c
JOIN orders o ON c.order_id = o.id
JOIN services s ON o.service_id = s.id
JOIN users u ON u.id = c.{counterpart_column}
WHERE c.{own_column} = ?
ORDER BY c.created_at DESC, c.id DESC
            "#
        );

        Ok(sqlx::query_as::<_, ChannelSummary>(&query)
            .bind(user_id)
            .bind(user_id)
            .fetch_all(self.pool)
            .await?)
    }

    pub async fn get_channel_info(&self, chat_id: i64, requester_id: i64) -> AppResult<ChannelInfo> {
        sqlx::query_as::<_, ChannelInfo>(
            r#"
SELECT c.id, c.order_id, c.customer_id, c.staff_id, c.created_at,
       o.service_id, s.name AS service_name,
       cu.name AS customer_name, st.name AS staff_name
FROM chats c
JOIN orders o ON c.order_id = o.id
JOIN services s ON o.service_id = s.id
JOIN users cu ON c.customer_id = cu.id
JOIN users st ON c.staff_id = st.id
WHERE c.id = ? AND (c.customer_id = ? OR c.staff_id = ?)
            "#,
        )
        .bind(chat_id)
        .bind(requester_id)
        .bind(requester_id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(AppError::AccessDenied)
    }

    /// Full history, oldest first.
    pub async fn list_messages(&self, chat_id: i64, requester_id: i64) -> AppResult<Vec<ChatMessage>> {
        self.participant_channel(chat_id, requester_id).await?;

        Ok(sqlx::query_as::<_, ChatMessage>(&format!(
            "{MESSAGE_COLUMNS} WHERE m.chat_id = ? ORDER BY m.created_at ASC, m.id ASC"
        ))
        .bind(chat_id)
        .fetch_all(self.pool)
        .await?)
    }

    /// Stores a message and pushes it to both participants. The sender gets
    /// its own copy so other tabs and devices stay in sync.
    pub async fn send_message(&self, chat_id: i64, sender_id: i64, body: &str) -> AppResult<i64> {
        let body = body.trim();
        if body.is_empty() {
            return Err(AppError::Validation("Message must not be empty".to_string()));
        }

        let channel = self.participant_channel(chat_id, sender_id).await?;
        let mut tx = self.pool.begin().await?;
        let message_id = insert_message(&mut *tx, chat_id, sender_id, body).await?;
        let message = fetch_message(&mut *tx, message_id).await?;
        tx.commit().await?;
        info!(chat_id, sender_id, message_id, "chat message stored");

        let event = RealtimeEvent::new_message(chat_id, message);
        let counterpart = channel.counterpart_of(sender_id);
        self.gateway.push(counterpart, &event);
        if counterpart != sender_id {
            self.gateway.push(sender_id, &event);
        }

        Ok(message_id)
    }

    /// Marks every unread message from the other participant as read and
    /// returns how many changed.
    pub async fn mark_read(&self, chat_id: i64, requester_id: i64) -> AppResult<u64> {
        self.participant_channel(chat_id, requester_id).await?;

        let result = sqlx::query(
            "UPDATE messages SET is_read = 1 WHERE chat_id = ? AND sender_id != ? AND is_read = 0",
        )
        .bind(chat_id)
        .bind(requester_id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
