use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::NaiveDateTime;

pub mod chat_manager;
pub mod login_manager;
pub mod order_manager;
pub mod service_manager;
pub mod session_manager;

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Staff,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
}

impl User {
    pub fn is_staff(&self) -> bool {
        self.role == Role::Staff
    }
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct ChatChannel {
    pub id: i64,
    pub order_id: i64,
    pub customer_id: i64,
    pub staff_id: i64,
    pub created_at: NaiveDateTime,
}

impl ChatChannel {
    pub fn is_participant(&self, user_id: i64) -> bool {
        self.customer_id == user_id || self.staff_id == user_id
    }

    /// The other participant, from the point of view of `user_id`.
    pub fn counterpart_of(&self, user_id: i64) -> i64 {
        if user_id == self.customer_id {
            self.staff_id
        } else {
            self.customer_id
        }
    }
}

/// A message joined with its sender's display data.
#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct ChatMessage {
    pub id: i64,
    pub chat_id: i64,
    pub sender_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_role: Option<Role>,
    #[serde(rename = "message")]
    pub body: String,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct ChannelSummary {
    pub chat_id: i64,
    pub order_id: i64,
    pub service_name: String,
    pub order_date: NaiveDateTime,
    pub counterpart_name: String,
    pub last_message: Option<String>,
    pub last_message_time: Option<NaiveDateTime>,
    pub unread_count: i64,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct ChannelInfo {
    pub id: i64,
    pub order_id: i64,
    pub customer_id: i64,
    pub staff_id: i64,
    pub created_at: NaiveDateTime,
    pub service_id: i64,
    pub service_name: String,
    pub customer_name: String,
    pub staff_name: String,
}

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    InProgress,
    Completed,
    Rejected,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::Completed => "completed",
            OrderStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub service_id: i64,
    pub user_phone: String,
    pub user_address: String,
    pub description: String,
    pub status: OrderStatus,
    pub staff_note: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// An order as its owner sees it.
#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct CustomerOrder {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub order: Order,
    pub service_name: String,
    pub price: f64,
    pub chat_id: Option<i64>,
}

/// An order as staff see it in the triage list.
#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct StaffOrder {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub order: Order,
    pub user_name: String,
    pub email: String,
    pub service_name: String,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}
