//! HTTP error type. Every variant renders as an HTML page.

use super::html::{self, Chrome};
use arsenal_core::ArsenalError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] ArsenalError),

    #[error("The page you asked for does not exist.")]
    NotFound,

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("Your form expired. Go back, reload the page and try again.")]
    Csrf,

    #[error("Too many attempts. Wait a minute and try again.")]
    RateLimited,

    #[error("{0}")]
    BadRequest(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Core(ArsenalError::NotFound { .. }) | Self::NotFound => StatusCode::NOT_FOUND,
            Self::Core(
                ArsenalError::DuplicateEmail
                | ArsenalError::DuplicateSerial
                | ArsenalError::LimitReached { .. },
            ) => StatusCode::CONFLICT,
            Self::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Forbidden(_) | Self::Csrf => StatusCode::FORBIDDEN,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Core(err) if !err.is_user_facing() => {
                error!(error = %err, "request failed");
                "Something went wrong on our side.".to_string()
            }
            other => other.to_string(),
        };
        let title = status.canonical_reason().unwrap_or("Error");
        let body = format!(
            r#"<p class="error">{}</p><p><a href="/">Back to start</a></p>"#,
            html::escape(&message)
        );
        html::page(status, title, Chrome::default(), &body)
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use arsenal_core::Tier;

    #[test]
    fn statuses() {
        assert_eq!(AppError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Csrf.status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            AppError::Core(ArsenalError::LimitReached {
                tier: Tier::Free,
                limit: 10
            })
            .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Core(ArsenalError::PasswordHash("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
