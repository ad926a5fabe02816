use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::StaffUser;
use crate::error::AppError;
use crate::manager::service_manager::{NewService, ServiceManager};
use crate::AppState;

pub async fn list_services(State(state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    let services = ServiceManager::new(&state.pool).list_active().await?;
    Ok(Json(json!({ "success": true, "services": services })))
}

pub async fn list_all_services(
    State(state): State<Arc<AppState>>,
    StaffUser(_staff): StaffUser,
) -> Result<Json<Value>, AppError> {
    let services = ServiceManager::new(&state.pool).list_all().await?;
    Ok(Json(json!({ "success": true, "services": services })))
}

fn default_active() -> bool {
    true
}

#[derive(Deserialize)]
pub struct CreateServiceRequest {
    name: String,
    description: String,
    price: f64,
    image_url: Option<String>,
    #[serde(default = "default_active")]
    is_active: bool,
}

pub async fn create_service(
    State(state): State<Arc<AppState>>,
    StaffUser(staff): StaffUser,
    WithRejection(Json(req), _): WithRejection<Json<CreateServiceRequest>, AppError>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let service_id = ServiceManager::new(&state.pool)
        .create(NewService {
            name: &req.name,
            description: &req.description,
            price: req.price,
            image_url: req.image_url.as_deref(),
            is_active: req.is_active,
        })
        .await?;

    tracing::info!(service_id, staff_id = staff.id, "service added to catalogue");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "message": "Service created", "serviceId": service_id })),
    ))
}

#[derive(Deserialize)]
pub struct ToggleRequest {
    is_active: bool,
}

pub async fn toggle_service(
    State(state): State<Arc<AppState>>,
    StaffUser(_staff): StaffUser,
    WithRejection(Path(id), _): WithRejection<Path<i64>, AppError>,
    WithRejection(Json(req), _): WithRejection<Json<ToggleRequest>, AppError>,
) -> Result<Json<Value>, AppError> {
    ServiceManager::new(&state.pool)
        .set_active(id, req.is_active)
        .await?;
    Ok(Json(json!({ "success": true, "message": "Status updated" })))
}

pub async fn delete_service(
    State(state): State<Arc<AppState>>,
    StaffUser(_staff): StaffUser,
    WithRejection(Path(id), _): WithRejection<Path<i64>, AppError>,
) -> Result<Json<Value>, AppError> {
    ServiceManager::new(&state.pool).delete(id).await?;
    Ok(Json(json!({ "success": true, "message": "Service deleted" })))
}
