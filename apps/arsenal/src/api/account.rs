//! Registration, login, logout and email verification.

use super::auth::{CsrfForm, CurrentUser, MaybeUser};
use super::error::{AppError, AppResult};
use super::flash::{Flash, IncomingFlash};
use super::html::{self, Chrome};
use super::mail::verification_email;
use super::{AppState, with_cookies};
use arsenal_core::flags::REGISTRATION;
use arsenal_core::password::{hash_password, verify_password};
use arsenal_core::user::RegistrationForm;
use arsenal_core::{ArsenalError, FormErrors, NewUser, Role, User, Verification, token};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

/// Issue a fresh verification token for `user` and mail it.
pub(crate) fn issue_verification(state: &AppState, user: &User) -> AppResult<()> {
    let token = token::generate();
    state
        .store
        .insert_verification(&token, &Verification::for_user(user, Utc::now()))?;
    let email = verification_email(&state.config.public_url, &user.email, &token);
    if let Err(err) = state.mailer.send(email) {
        warn!(user = %user.id, error = %err, "verification email not sent");
    }
    Ok(())
}

// =============================================================================
// REGISTER
// =============================================================================

fn registration_open(state: &AppState) -> AppResult<()> {
    if state.flag_enabled(REGISTRATION) {
        Ok(())
    } else {
        Err(AppError::Forbidden("Registration is currently closed."))
    }
}

fn register_body(form: &RegistrationForm, errors: &FormErrors) -> String {
    format!(
        r#"{summary}<form method="post" action="/register">{email}{name}{password}{confirm}<button type="submit">Create account</button></form>
<p>Already registered? <a href="/login">Log in</a>.</p>"#,
        summary = html::error_summary(errors),
        email = html::input("email", "email", "Email", &form.email, errors),
        name = html::input("text", "display_name", "Display name", &form.display_name, errors),
        password = html::input("password", "password", "Password", "", errors),
        confirm = html::input("password", "confirm", "Confirm password", "", errors),
    )
}

pub async fn register_page(
    State(state): State<AppState>,
    MaybeUser(current): MaybeUser,
    IncomingFlash(flash): IncomingFlash,
) -> AppResult<Response> {
    registration_open(&state)?;
    if current.is_some() {
        return Ok(Redirect::to("/arsenal").into_response());
    }
    Ok(html::page(
        StatusCode::OK,
        "Create an account",
        Chrome::anonymous(state.cookie_options(), flash),
        &register_body(&RegistrationForm::default(), &FormErrors::new()),
    ))
}

pub async fn register(
    State(state): State<AppState>,
    Form(form): Form<RegistrationForm>,
) -> AppResult<Response> {
    registration_open(&state)?;

    let rerender = |errors: &FormErrors| {
        html::page(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Create an account",
            Chrome::anonymous(state.cookie_options(), None),
            &register_body(&form, errors),
        )
    };

    let valid = match form.validate() {
        Ok(valid) => valid,
        Err(errors) => return Ok(rerender(&errors)),
    };

    let created = state.store.create_user(NewUser {
        email: valid.email,
        display_name: valid.display_name,
        password_hash: hash_password(&valid.password)?,
        role: Role::Member,
        email_verified: false,
    });
    let user = match created {
        Ok(user) => user,
        Err(ArsenalError::DuplicateEmail) => {
            let mut errors = FormErrors::new();
            errors.add("email", "That email address is already registered");
            return Ok(rerender(&errors));
        }
        Err(err) => return Err(err.into()),
    };

    issue_verification(&state, &user)?;
    let cookie = state.start_session(user.id)?;
    info!(user = %user.id, "account registered");

    Ok(with_cookies(
        state.redirect_with(
            "/arsenal",
            Flash::success("Welcome! Check your email for a link to confirm your address."),
        ),
        [cookie],
    ))
}

// =============================================================================
// LOGIN / LOGOUT
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

fn login_body(email: &str, errors: &FormErrors) -> String {
    let failure = errors
        .get("login")
        .map(|message| format!(r#"<div class="form-errors">{}</div>"#, html::escape(message)))
        .unwrap_or_default();
    format!(
        r#"{failure}<form method="post" action="/login">{email}{password}<button type="submit">Log in</button></form>
<p>New here? <a href="/register">Create an account</a>.</p>"#,
        email = html::input("email", "email", "Email", email, errors),
        password = html::input("password", "password", "Password", "", errors),
    )
}

pub async fn login_page(
    State(state): State<AppState>,
    MaybeUser(current): MaybeUser,
    IncomingFlash(flash): IncomingFlash,
) -> Response {
    if current.is_some() {
        return Redirect::to("/arsenal").into_response();
    }
    html::page(
        StatusCode::OK,
        "Log in",
        Chrome::anonymous(state.cookie_options(), flash),
        &login_body("", &FormErrors::new()),
    )
}

pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> AppResult<Response> {
    let email = form.email.trim().to_lowercase();
    if state.login_limiter.check_key(&email).is_err() {
        warn!(email = %email, "login rate limited");
        return Err(AppError::RateLimited);
    }

    let user = state
        .store
        .user_by_email(&email)?
        .filter(|user| verify_password(&form.password, &user.password_hash));

    let Some(user) = user else {
        warn!(email = %email, "login failed");
        let mut errors = FormErrors::new();
        errors.add("login", "Invalid email or password.");
        return Ok(html::page(
            StatusCode::UNAUTHORIZED,
            "Log in",
            Chrome::anonymous(state.cookie_options(), None),
            &login_body(&form.email, &errors),
        ));
    };

    let cookie = state.start_session(user.id)?;
    info!(user = %user.id, "logged in");
    Ok(with_cookies(
        state.redirect_with(
            "/arsenal",
            Flash::success(format!("Welcome back, {}.", user.display_name)),
        ),
        [cookie],
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(form): Form<CsrfForm>,
) -> AppResult<Response> {
    current.verify_csrf(&form.csrf)?;
    state.sessions.end(&current.session.id)?;
    info!(user = %current.user.id, "logged out");
    Ok(with_cookies(
        state.redirect_with("/login", Flash::info("You have been logged out.")),
        [state.cookie_options().clear(super::cookies::SESSION_COOKIE)],
    ))
}

// =============================================================================
// VERIFICATION
// =============================================================================

const BAD_LINK: &str = "This confirmation link is invalid or has already been used.";

pub async fn verify(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> AppResult<Response> {
    if !token::looks_valid(&raw) {
        return Err(AppError::BadRequest(BAD_LINK.to_string()));
    }
    let Some(verification) = state.store.take_verification(&raw)? else {
        return Err(AppError::BadRequest(BAD_LINK.to_string()));
    };
    if verification.is_expired(Utc::now()) {
        return Err(AppError::BadRequest(
            "This confirmation link has expired. Request a new one from your profile.".to_string(),
        ));
    }

    let mut matched = false;
    let mut newly_verified = false;
    let confirmed = state.store.modify_user(verification.user, |user| {
        matched = user.email == verification.email;
        if matched && !user.email_verified {
            user.email_verified = true;
            newly_verified = true;
        }
        Ok(())
    });
    match confirmed {
        Ok(user) if matched => {
            if newly_verified {
                info!(user = %user.id, "email verified");
            }
        }
        Ok(_) | Err(ArsenalError::NotFound { .. }) => {
            return Err(AppError::BadRequest(BAD_LINK.to_string()));
        }
        Err(err) => return Err(err.into()),
    }
    Ok(state.redirect_with("/", Flash::success("Your email address is confirmed.")))
}

pub async fn resend_verification(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(form): Form<CsrfForm>,
) -> AppResult<Response> {
    current.verify_csrf(&form.csrf)?;
    if current.user.email_verified {
        return Ok(state.redirect_with(
            "/profile",
            Flash::info("Your email address is already confirmed."),
        ));
    }
    issue_verification(&state, &current.user)?;
    Ok(state.redirect_with(
        "/profile",
        Flash::success(format!("We sent a new confirmation link to {}.", current.user.email)),
    ))
}
