use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::error::AppError;
use crate::manager::{
    session_manager::{self, SessionId, SessionManager},
    User,
};
use crate::{AppState, SESSION_ID_KEY};

pub fn session_cookie(session_id: SessionId, secure: bool) -> Cookie<'static> {
    Cookie::build(SESSION_ID_KEY, session_id.0)
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path("/")
        .finish()
}

pub fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::named(SESSION_ID_KEY);
    cookie.set_path("/");
    cookie
}

pub fn session_id_from(jar: &CookieJar) -> Option<SessionId> {
    jar.get(SESSION_ID_KEY)
        .map(|cookie| cookie.value().to_owned())
        .filter(|value| !value.is_empty())
        .map(SessionId)
}

async fn resolve_user(parts: &Parts, state: &AppState) -> Result<User, AppError> {
    let jar = CookieJar::from_headers(&parts.headers);
    let session_id = session_id_from(&jar).ok_or(AppError::AuthenticationRequired)?;

    match SessionManager::new(&state.pool).get_user(&session_id).await {
        Ok(user) => Ok(user),
        Err(session_manager::Error::DoesNotExist) => Err(AppError::AuthenticationRequired),
        Err(session_manager::Error::DatabaseError(e)) => Err(AppError::Persistence(e)),
    }
}

/// Any signed-in user, for data routes.
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        resolve_user(parts, state).await.map(AuthUser)
    }
}

/// A signed-in staff member, for data routes.
pub struct StaffUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for StaffUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = resolve_user(parts, state).await?;
        if !user.is_staff() {
            return Err(AppError::AccessDenied);
        }
        Ok(StaffUser(user))
    }
}

/// A signed-in user for page routes; anyone else is sent to the login page.
pub struct PageUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for PageUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match resolve_user(parts, state).await {
            Ok(user) => Ok(PageUser(user)),
            Err(AppError::AuthenticationRequired) => Err(Redirect::to("/login").into_response()),
            Err(e) => Err(e.into_response()),
        }
    }
}
