//! Request authentication.
//!
//! [`CurrentUser`] is the only place a session cookie is turned into a user.
//! Handlers that need a login take it as an argument; handlers that merely
//! adapt to one take [`MaybeUser`].

use super::AppState;
use super::cookies::{self, CookieOptions, SESSION_COOKIE};
use super::error::{AppError, AppResult};
use super::flash::Flash;
use super::html::Chrome;
use arsenal_core::{Permission, Session, User};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::convert::Infallible;
use tracing::warn;

/// The signed-in user and the session they arrived with.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub session: Session,
    pub cookies: CookieOptions,
}

impl CurrentUser {
    fn resolve(parts: &Parts, state: &AppState) -> AppResult<Option<Self>> {
        let Some(id) = cookies::get(&parts.headers, SESSION_COOKIE) else {
            return Ok(None);
        };
        let Some(session) = state.sessions.resolve(id)? else {
            return Ok(None);
        };
        match state.store.user(session.user)? {
            Some(user) => Ok(Some(Self {
                user,
                session,
                cookies: state.cookie_options(),
            })),
            None => {
                state.sessions.end(&session.id)?;
                Ok(None)
            }
        }
    }

    pub fn chrome(&self, flash: Option<Flash>) -> Chrome<'_> {
        Chrome::signed_in(&self.user, &self.session, self.cookies, flash)
    }

    /// Reject a form whose token does not belong to this session.
    pub fn verify_csrf(&self, submitted: &str) -> AppResult<()> {
        if self.session.csrf_matches(submitted) {
            Ok(())
        } else {
            warn!(user = %self.user.id, "csrf token mismatch");
            Err(AppError::Csrf)
        }
    }

    pub fn require(&self, permission: Permission) -> AppResult<()> {
        if self.user.has_permission(permission) {
            Ok(())
        } else {
            warn!(
                user = %self.user.id,
                permission = permission.as_str(),
                "permission denied"
            );
            Err(AppError::Forbidden("You do not have access to this page."))
        }
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Response> {
        match Self::resolve(parts, state) {
            Ok(Some(current)) => Ok(current),
            Ok(None) => Err(state.redirect_with("/login", Flash::info("Please log in to continue."))),
            Err(err) => Err(err.into_response()),
        }
    }
}

/// A signed-in user if there is one.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<CurrentUser>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Infallible> {
        // Storage failures degrade to anonymous here.
        match CurrentUser::resolve(parts, state) {
            Ok(current) => Ok(Self(current)),
            Err(err) => {
                warn!(error = %err, "session lookup failed");
                Ok(Self(None))
            }
        }
    }
}

/// A submitted form together with its CSRF token.
#[derive(Debug, Clone, Deserialize)]
pub struct Protected<T> {
    #[serde(default)]
    pub csrf: String,
    #[serde(flatten)]
    pub form: T,
}

/// A form with nothing but its CSRF token.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CsrfForm {
    #[serde(default)]
    pub csrf: String,
}
