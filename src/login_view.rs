use std::sync::Arc;

use askama::Template;
use axum::{extract::State, response::Redirect, Form, Json};
use axum_extra::extract::{cookie::CookieJar, WithRejection};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{removal_cookie, session_cookie, session_id_from, AuthUser};
use crate::error::AppError;
use crate::manager::{
    login_manager::{LoginManager, NewUser, ProfileUpdate},
    session_manager::SessionManager,
    User,
};
use crate::AppState;

#[derive(Template)]
#[template(path = "login_view/login.html")]
pub struct LoginTemplate {}

pub async fn login() -> LoginTemplate {
    LoginTemplate {}
}

#[derive(Deserialize)]
pub struct LoginForm {
    email: String,
    password: String,
}

async fn start_session(
    state: &AppState,
    jar: CookieJar,
    user: &User,
) -> Result<CookieJar, AppError> {
    let session_id = SessionManager::new(&state.pool)
        .generate_session_id_for(user, state.config.session_expiry_hours)
        .await?;
    Ok(jar.add(session_cookie(session_id, state.config.secure_cookies)))
}

pub async fn try_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    WithRejection(Form(credentials), _): WithRejection<Form<LoginForm>, AppError>,
) -> Result<(CookieJar, Redirect), AppError> {
    let LoginForm { email, password } = credentials;
    let user = LoginManager::new(&state.pool)
        .get_user(&email, &password)
        .await?;

    tracing::info!(user_id = user.id, "user logged in");
    let jar = start_session(&state, jar, &user).await?;
    Ok((jar, Redirect::to("/chat")))
}

#[derive(Deserialize)]
pub struct RegisterUserForm {
    name: String,
    phone: String,
    email: String,
    password: String,
}

pub async fn try_register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    WithRejection(Form(form), _): WithRejection<Form<RegisterUserForm>, AppError>,
) -> Result<(CookieJar, Redirect), AppError> {
    let user = LoginManager::new(&state.pool)
        .new_user(NewUser {
            name: &form.name,
            phone: &form.phone,
            email: &form.email,
            password: &form.password,
        })
        .await?;

    tracing::info!(user_id = user.id, "user registered");
    let jar = start_session(&state, jar, &user).await?;
    Ok((jar, Redirect::to("/chat")))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<Value>), AppError> {
    if let Some(session_id) = session_id_from(&jar) {
        SessionManager::new(&state.pool).revoke(&session_id).await?;
    }

    Ok((
        jar.remove(removal_cookie()),
        Json(json!({ "success": true, "message": "Logged out" })),
    ))
}

pub async fn profile(AuthUser(user): AuthUser) -> Json<Value> {
    Json(json!({ "success": true, "user": user }))
}

#[derive(Deserialize)]
pub struct ProfileRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    phone: String,
    #[serde(default)]
    email: String,
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    WithRejection(Json(req), _): WithRejection<Json<ProfileRequest>, AppError>,
) -> Result<Json<Value>, AppError> {
    let user = LoginManager::new(&state.pool)
        .update_profile(
            user.id,
            ProfileUpdate {
                name: &req.name,
                phone: &req.phone,
                email: &req.email,
            },
        )
        .await?;

    Ok(Json(json!({ "success": true, "message": "Profile updated", "user": user })))
}
