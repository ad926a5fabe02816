use axum::{
    extract::rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::manager::login_manager;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("authentication required")]
    AuthenticationRequired,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("access denied")]
    AccessDenied,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<login_manager::Error> for AppError {
    fn from(err: login_manager::Error) -> Self {
        match err {
            login_manager::Error::EmailTaken => {
                AppError::Conflict("A user with this email already exists".to_string())
            }
            login_manager::Error::WrongCredentials => AppError::InvalidCredentials,
            login_manager::Error::InvalidRegistration(problems) => {
                AppError::Validation(problems.join(", "))
            }
            login_manager::Error::Hashing(msg) => AppError::Internal(msg),
            login_manager::Error::DatabaseError(e) => AppError::Persistence(e),
        }
    }
}

macro_rules! validation_from_rejection {
    ($($rejection:ty),*) => {
        $(
            impl From<$rejection> for AppError {
                fn from(rejection: $rejection) -> Self {
                    AppError::Validation(rejection.body_text())
                }
            }
        )*
    };
}

// Malformed requests on data routes answer with the JSON error body.
validation_from_rejection!(FormRejection, JsonRejection, PathRejection, QueryRejection);

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::AuthenticationRequired | AppError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            AppError::AccessDenied => StatusCode::FORBIDDEN,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Persistence(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::AuthenticationRequired => "Invalid or expired session".to_string(),
            AppError::InvalidCredentials => "Invalid email or password".to_string(),
            AppError::AccessDenied => "Access denied".to_string(),
            AppError::Validation(msg) | AppError::Conflict(msg) => msg.clone(),
            AppError::NotFound(what) => format!("{what} not found"),
            AppError::Persistence(_) | AppError::Config(_) | AppError::Internal(_) => {
                // Details stay in the server log.
                tracing::error!(error = %self, "request failed");
                "Internal server error".to_string()
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_map_to_500() {
        let err = AppError::Persistence(sqlx::Error::RowNotFound);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            AppError::Internal("boom".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn registration_errors_are_mapped() {
        let err: AppError = login_manager::Error::InvalidRegistration(vec!["a", "b"]).into();
        assert!(matches!(err, AppError::Validation(ref msg) if msg == "a, b"));
        let err: AppError = login_manager::Error::EmailTaken.into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        let err: AppError = login_manager::Error::WrongCredentials.into();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn client_errors_keep_their_status() {
        assert_eq!(AppError::AccessDenied.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::AuthenticationRequired.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Validation("empty".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::NotFound("order").status(), StatusCode::NOT_FOUND);
    }
}
