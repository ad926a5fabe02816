use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Query, State},
    Form, Json,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{AuthUser, PageUser};
use crate::error::AppError;
use crate::manager::chat_manager::ChatManager;
use crate::utils::i64_from_string;
use crate::AppState;

#[derive(Template)]
#[template(path = "chat.html")]
pub struct ChatTemplate {
    name: String,
    is_staff: bool,
}

pub async fn chat_page(PageUser(user): PageUser) -> ChatTemplate {
    ChatTemplate {
        is_staff: user.is_staff(),
        name: user.name,
    }
}

#[derive(Deserialize)]
pub struct ChatQuery {
    #[serde(rename = "chatId", deserialize_with = "i64_from_string")]
    chat_id: i64,
}

pub async fn list_chats(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>, AppError> {
    let chats = ChatManager::new(&state.pool, &state.gateway)
        .list_channels_for_user(user.id, user.role)
        .await?;
    Ok(Json(json!({ "success": true, "chats": chats })))
}

pub async fn chat_info(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    WithRejection(Query(query), _): WithRejection<Query<ChatQuery>, AppError>,
) -> Result<Json<Value>, AppError> {
    let chat = ChatManager::new(&state.pool, &state.gateway)
        .get_channel_info(query.chat_id, user.id)
        .await?;
    Ok(Json(json!({ "success": true, "chat": chat })))
}

pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    WithRejection(Query(query), _): WithRejection<Query<ChatQuery>, AppError>,
) -> Result<Json<Value>, AppError> {
    let messages = ChatManager::new(&state.pool, &state.gateway)
        .list_messages(query.chat_id, user.id)
        .await?;
    Ok(Json(json!({ "success": true, "messages": messages })))
}

#[derive(Deserialize)]
pub struct SendMessageForm {
    #[serde(deserialize_with = "i64_from_string")]
    chat_id: i64,
    #[serde(default)]
    message: String,
}

pub async fn send_message(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    WithRejection(Form(form), _): WithRejection<Form<SendMessageForm>, AppError>,
) -> Result<Json<Value>, AppError> {
    let message_id = ChatManager::new(&state.pool, &state.gateway)
        .send_message(form.chat_id, user.id, &form.message)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Message sent",
        "message_id": message_id,
    })))
}

#[derive(Deserialize)]
pub struct MarkReadRequest {
    #[serde(rename = "chatId", deserialize_with = "i64_from_string")]
    chat_id: i64,
}

pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    WithRejection(Json(req), _): WithRejection<Json<MarkReadRequest>, AppError>,
) -> Result<Json<Value>, AppError> {
    let updated = ChatManager::new(&state.pool, &state.gateway)
        .mark_read(req.chat_id, user.id)
        .await?;
    Ok(Json(json!({ "success": true, "updated": updated })))
}
