use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Form, Json};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{AuthUser, StaffUser};
use crate::error::AppError;
use crate::manager::{
    order_manager::{NewOrder, OrderManager},
    OrderStatus,
};
use crate::utils::{empty_string_as_none, i64_from_string};
use crate::AppState;

fn orders(state: &AppState) -> OrderManager<'_> {
    OrderManager::new(&state.pool, &state.gateway).with_policy(state.config.order_status_policy)
}

#[derive(Deserialize)]
pub struct CreateOrderForm {
    #[serde(deserialize_with = "i64_from_string")]
    service_id: i64,
    #[serde(default)]
    user_phone: String,
    #[serde(default)]
    user_address: String,
    #[serde(default)]
    description: String,
}

pub async fn create_order(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    WithRejection(Form(form), _): WithRejection<Form<CreateOrderForm>, AppError>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let order_id = orders(&state)
        .create_order(
            user.id,
            NewOrder {
                service_id: form.service_id,
                phone: &form.user_phone,
                address: &form.user_address,
                description: &form.description,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "message": "Order created", "order_id": order_id })),
    ))
}

pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>, AppError> {
    let orders = orders(&state).list_for_customer(user.id).await?;
    Ok(Json(json!({ "success": true, "orders": orders })))
}

pub async fn list_all_orders(
    State(state): State<Arc<AppState>>,
    StaffUser(_staff): StaffUser,
) -> Result<Json<Value>, AppError> {
    let orders = orders(&state).list_all().await?;
    Ok(Json(json!({ "success": true, "orders": orders })))
}

#[derive(Deserialize)]
pub struct UpdateStatusForm {
    #[serde(deserialize_with = "i64_from_string")]
    order_id: i64,
    status: OrderStatus,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    admin_notes: Option<String>,
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    StaffUser(staff): StaffUser,
    WithRejection(Form(form), _): WithRejection<Form<UpdateStatusForm>, AppError>,
) -> Result<Json<Value>, AppError> {
    let update = orders(&state)
        .update_status(
            form.order_id,
            form.status,
            form.admin_notes.as_deref(),
            staff.id,
        )
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Status updated",
        "status": update.status,
        "chat_id": update.chat_id,
        "chat_created": update.chat_created,
        "note_message_id": update.message_id,
    })))
}
