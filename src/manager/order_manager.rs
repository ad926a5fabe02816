use std::str::FromStr;

use tracing::info;

use super::chat_manager::{fetch_message, get_or_create_channel, insert_message};
use super::{CustomerOrder, Order, OrderStatus, StaffOrder};
use crate::error::{AppError, AppResult};
use crate::realtime::{Gateway, RealtimeEvent};

/// Which status changes staff may make.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusPolicy {
    /// Any status may follow any other.
    #[default]
    Permissive,
    /// pending -> in_progress | rejected, in_progress -> completed | rejected.
    /// A status may always be set again; completed and rejected orders
    /// accept nothing else.
    Strict,
}

impl StatusPolicy {
    pub fn allows(self, from: OrderStatus, to: OrderStatus) -> bool {
        use OrderStatus::*;

        match self {
            StatusPolicy::Permissive => true,
            StatusPolicy::Strict => {
                from == to
                    || matches!(
                        (from, to),
                        (Pending, InProgress)
                            | (Pending, Rejected)
                            | (InProgress, Completed)
                            | (InProgress, Rejected)
                    )
            }
        }
    }
}

impl FromStr for StatusPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permissive" => Ok(StatusPolicy::Permissive),
            "strict" => Ok(StatusPolicy::Strict),
            other => Err(format!("expected 'permissive' or 'strict', got '{other}'")),
        }
    }
}

pub struct NewOrder<'a> {
    pub service_id: i64,
    pub phone: &'a str,
    pub address: &'a str,
    pub description: &'a str,
}

/// What a status update did besides changing the status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub order_id: i64,
    pub status: OrderStatus,
    pub chat_id: Option<i64>,
    pub chat_created: bool,
    pub message_id: Option<i64>,
}

pub struct OrderManager<'a> {
    pool: &'a sqlx::SqlitePool,
    gateway: &'a Gateway,
    policy: StatusPolicy,
}

impl<'a> OrderManager<'a> {
    pub fn new(pool: &'a sqlx::SqlitePool, gateway: &'a Gateway) -> Self {
        Self {
            pool,
            gateway,
            policy: StatusPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: StatusPolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl OrderManager<'_> {
    pub async fn create_order(&self, customer_id: i64, order: NewOrder<'_>) -> AppResult<i64> {
        let phone = order.phone.trim();
        let address = order.address.trim();
        if phone.is_empty() || address.is_empty() {
            return Err(AppError::Validation(
                "Phone and address are required".to_string(),
            ));
        }

        let active: Option<bool> = sqlx::query_scalar("SELECT is_active FROM services WHERE id = ?")
            .bind(order.service_id)
            .fetch_optional(self.pool)
            .await?;
        if active != Some(true) {
            return Err(AppError::NotFound("service"));
        }

        let order_id = sqlx::query(
            r#"
INSERT INTO orders (user_id, service_id, user_phone, user_address, description, status)
VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(customer_id)
        .bind(order.service_id)
        .bind(phone)
        .bind(address)
        .bind(order.description.trim())
        .bind(OrderStatus::Pending)
        .execute(self.pool)
        .await?
        .last_insert_rowid();

        info!(order_id, customer_id, service_id = order.service_id, "order created");
        Ok(order_id)
    }

    pub async fn list_for_customer(&self, customer_id: i64) -> AppResult<Vec<CustomerOrder>> {
        Ok(sqlx::query_as::<_, CustomerOrder>(
            r#"
SELECT o.*, s.name AS service_name, s.price, c.id AS chat_id
FROM orders o
JOIN services s ON o.service_id = s.id
LEFT JOIN chats c ON o.id = c.order_id
WHERE o.user_id = ?
ORDER BY o.created_at DESC, o.id DESC
            "#,
        )
        .bind(customer_id)
        .fetch_all(self.pool)
        .await?)
    }

    pub async fn list_all(&self) -> AppResult<Vec<StaffOrder>> {
        Ok(sqlx::query_as::<_, StaffOrder>(
            r#"
SELECT o.*, u.name AS user_name, u.email, s.name AS service_name
FROM orders o
JOIN users u ON o.user_id = u.id
JOIN services s ON o.service_id = s.id
ORDER BY o.created_at DESC, o.id DESC
            "#,
        )
        .fetch_all(self.pool)
        .await?)
    }

    /// Moves an order to `status` on behalf of `staff_id`.
    ///
    /// Entering `in_progress` provisions the order's chat (the first staff
    /// member to do so becomes the customer's counterpart for good) and, when
    /// a note is given, posts it there as the staff member's message. The
    /// status change, the chat and the message commit together; the push to
    /// the customer happens only after the commit.
    pub async fn update_status(
        &self,
        order_id: i64,
        status: OrderStatus,
        note: Option<&str>,
        staff_id: i64,
    ) -> AppResult<StatusUpdate> {
        let note = note.map(str::trim).filter(|n| !n.is_empty());
        let mut tx = self.pool.begin().await?;

        // Write first: the transaction holds the write lock from its first
        // statement and never has to upgrade a read lock.
        let order = sqlx::query_as::<_, Order>(
            "UPDATE orders SET updated_at = CURRENT_TIMESTAMP WHERE id = ? RETURNING *",
        )
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("order"))?;

        if !self.policy.allows(order.status, status) {
            return Err(AppError::Validation(format!(
                "Cannot move order from {} to {}",
                order.status, status
            )));
        }

        sqlx::query(
            "UPDATE orders SET status = ?, staff_note = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(status)
        .bind(note)
        .bind(order_id)
        .execute(&mut *tx)
        .await?;

        let mut update = StatusUpdate {
            order_id,
            status,
            chat_id: None,
            chat_created: false,
            message_id: None,
        };
        let mut seeded = None;

        if status == OrderStatus::InProgress {
            let (channel, created) =
                get_or_create_channel(&mut *tx, order.id, order.user_id, staff_id).await?;
            update.chat_id = Some(channel.id);
            update.chat_created = created;

            if let Some(note) = note {
                let message_id = insert_message(&mut *tx, channel.id, staff_id, note).await?;
                let message = fetch_message(&mut *tx, message_id).await?;
                update.message_id = Some(message_id);
                seeded = Some((channel, message));
            }
        }

        tx.commit().await?;
        info!(
            order_id,
            from = %order.status,
            to = %status,
            staff_id,
            chat_id = ?update.chat_id,
            chat_created = update.chat_created,
            "order status updated"
        );

        if let Some((channel, message)) = seeded {
            self.gateway.push(
                channel.customer_id,
                &RealtimeEvent::new_message(channel.id, message),
            );
        }

        Ok(update)
    }
}
