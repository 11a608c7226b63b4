//! # HTTP Server
//!
//! axum router serving server-rendered HTML.
//!
//! ## Routes
//!
//! | Path | Purpose |
//! |------|---------|
//! | `/register`, `/login`, `/logout`, `/verify/{token}` | accounts |
//! | `/arsenal/...` | the signed-in user's firearms |
//! | `/profile/...` | account settings |
//! | `/billing/...` | subscription tier |
//! | `/admin/...` | users, feature flags, payments |
//! | `/health` | liveness probe (JSON) |
//!
//! State-changing requests are `POST` forms carrying the session's CSRF
//! token. Successful submissions redirect (303) with a flash message.

pub mod account;
pub mod admin;
pub mod auth;
pub mod billing;
pub mod cookies;
pub mod error;
pub mod flash;
pub mod html;
pub mod inventory;
pub mod mail;
pub mod profile;

use crate::config::ServerConfig;
use arsenal_core::{PaymentGateway, Session, SessionManager, Store, UserId};
use auth::MaybeUser;
use axum::extract::State;
use axum::http::header::{CONTENT_TYPE, SET_COOKIE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use cookies::{CookieOptions, FLASH_COOKIE, SESSION_COOKIE};
use error::AppResult;
use flash::{FLASH_MAX_AGE, Flash};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use mail::Mailer;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// How often expired sessions are swept.
pub const PURGE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub sessions: Arc<SessionManager>,
    pub config: Arc<ServerConfig>,
    pub mailer: Arc<dyn Mailer>,
    pub gateway: Arc<dyn PaymentGateway>,
    /// Login attempts, keyed by lowercased email.
    pub login_limiter: Arc<DefaultKeyedRateLimiter<String>>,
}

impl AppState {
    pub fn new(
        store: Arc<Store>,
        config: ServerConfig,
        mailer: Arc<dyn Mailer>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let sessions = Arc::new(SessionManager::new(
            store.clone(),
            config.session_ttl(),
            config.session_cache_size,
        ));
        let per_minute =
            NonZeroU32::new(config.login_attempts_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            store,
            sessions,
            config: Arc::new(config),
            mailer,
            gateway,
            login_limiter: Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute))),
        }
    }

    pub fn cookie_options(&self) -> CookieOptions {
        CookieOptions {
            secure: self.config.secure_cookies,
        }
    }

    /// 303 to `to`, carrying `flash` to the next page.
    pub fn redirect_with(&self, to: &str, flash: Flash) -> Response {
        let mut response = Redirect::to(to).into_response();
        response.headers_mut().append(
            SET_COOKIE,
            self.cookie_options()
                .set(FLASH_COOKIE, &flash.encode(), FLASH_MAX_AGE),
        );
        response
    }

    /// Start a session for `user` and return its cookie.
    pub fn start_session(&self, user: UserId) -> AppResult<HeaderValue> {
        let session = self.sessions.start(user)?;
        Ok(self.session_cookie(&session))
    }

    pub fn session_cookie(&self, session: &Session) -> HeaderValue {
        self.cookie_options().set(
            SESSION_COOKIE,
            &session.id,
            self.sessions.ttl().num_seconds(),
        )
    }

    /// Drop expired sessions, verification tokens and idle limiter state.
    pub fn purge_expired(&self) {
        match self.sessions.purge_expired() {
            Ok(0) => {}
            Ok(purged) => info!(purged, "expired sessions purged"),
            Err(err) => warn!(error = %err, "session purge failed"),
        }
        match self.store.purge_expired_verifications(Utc::now()) {
            Ok(0) => {}
            Ok(purged) => info!(purged, "expired verification tokens purged"),
            Err(err) => warn!(error = %err, "verification purge failed"),
        }
        self.login_limiter.retain_recent();
    }

    /// Whether a feature flag is on. Storage errors read as off.
    pub fn flag_enabled(&self, key: &str) -> bool {
        self.store.flag_enabled(key).unwrap_or_else(|err| {
            warn!(flag = key, error = %err, "flag lookup failed");
            false
        })
    }
}

/// Attach extra `Set-Cookie` headers to a response.
pub fn with_cookies(mut response: Response, cookies: impl IntoIterator<Item = HeaderValue>) -> Response {
    for cookie in cookies {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/static/app.css", get(stylesheet))
        .route("/register", get(account::register_page).post(account::register))
        .route("/login", get(account::login_page).post(account::login))
        .route("/logout", post(account::logout))
        .route("/verify/resend", post(account::resend_verification))
        .route("/verify/{token}", get(account::verify))
        .route("/arsenal", get(inventory::list).post(inventory::create))
        .route("/arsenal/new", get(inventory::new_page))
        .route("/arsenal/export", get(inventory::export))
        .route("/arsenal/{id}", get(inventory::show).post(inventory::update))
        .route("/arsenal/{id}/edit", get(inventory::edit_page))
        .route("/arsenal/{id}/delete", post(inventory::delete))
        .route("/profile", get(profile::show).post(profile::update))
        .route("/profile/password", post(profile::change_password))
        .route("/profile/delete", post(profile::delete_account))
        .route("/billing", get(billing::show))
        .route("/billing/subscribe", post(billing::subscribe))
        .route("/billing/cancel", post(billing::cancel))
        .route("/admin", get(admin::users))
        .route("/admin/users/{id}", get(admin::user_page).post(admin::update_user))
        .route("/admin/flags", get(admin::flags).post(admin::save_flag))
        .route("/admin/flags/{key}/toggle", post(admin::toggle_flag))
        .route("/admin/payments", get(admin::payments))
        .fallback(not_found)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

async fn home(MaybeUser(current): MaybeUser) -> Redirect {
    match current {
        Some(_) => Redirect::to("/arsenal"),
        None => Redirect::to("/login"),
    }
}

async fn health(State(state): State<AppState>) -> Response {
    match state.store.stats() {
        Ok(stats) => Json(serde_json::json!({
            "status": "ok",
            "users": stats.users,
            "firearms": stats.firearms,
        }))
        .into_response(),
        Err(err) => {
            warn!(error = %err, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "unavailable" })),
            )
                .into_response()
        }
    }
}

async fn not_found() -> error::AppError {
    error::AppError::NotFound
}

const STYLESHEET: &str = "\
body{font-family:system-ui,sans-serif;margin:0;color:#1d2327}
header{display:flex;gap:1rem;align-items:center;padding:.75rem 1.5rem;background:#2f3b2f;color:#fff}
header a{color:#fff;margin-right:1rem}
main{max-width:60rem;margin:1.5rem auto;padding:0 1rem}
.flash{padding:.75rem;border-radius:4px;margin-bottom:1rem}
.flash-success{background:#e3f4e1}.flash-info{background:#e2ecf8}.flash-error{background:#fbe3e1}
.field-error,.form-errors{color:#a12622}
label{display:block;margin:.5rem 0}
form.inline{display:inline}
table{border-collapse:collapse;width:100%}
th,td{text-align:left;padding:.4rem;border-bottom:1px solid #ddd}
";

async fn stylesheet() -> impl IntoResponse {
    ([(CONTENT_TYPE, "text/css; charset=utf-8")], STYLESHEET)
}

/// Serve until Ctrl+C or SIGTERM.
pub async fn serve(state: AppState) -> std::io::Result<()> {
    let bind = state.config.bind;
    spawn_purger(state.clone());

    let app = build_router(state);
    let listener = TcpListener::bind(bind).await?;
    info!(address = %bind, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

fn spawn_purger(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            state.purge_expired();
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        info!("received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("received terminate signal, shutting down");
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

