//! Account settings: details, password and deletion.

use super::account::issue_verification;
use super::auth::{CurrentUser, Protected};
use super::cookies::SESSION_COOKIE;
use super::error::AppResult;
use super::flash::{Flash, IncomingFlash};
use super::html;
use super::{AppState, with_cookies};
use arsenal_core::password::{hash_password, verify_password};
use arsenal_core::user::{PasswordForm, ProfileForm};
use arsenal_core::{ArsenalError, FormErrors};
use axum::Form;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteForm {
    #[serde(default)]
    pub confirm_password: String,
}

/// Which form on the page was submitted, with its values and errors.
#[derive(Clone, Copy)]
enum Submitted<'a> {
    None,
    Details(&'a ProfileForm, &'a FormErrors),
    Password(&'a FormErrors),
    Delete(&'a FormErrors),
}

fn render(current: &CurrentUser, flash: Option<Flash>, submitted: Submitted<'_>) -> Response {
    let user = &current.user;
    let csrf = &current.session.csrf_token;
    let empty = FormErrors::new();

    let current_details = ProfileForm {
        email: user.email.clone(),
        display_name: user.display_name.clone(),
    };
    let (details, details_errors) = match submitted {
        Submitted::Details(form, errors) => (form, errors),
        _ => (&current_details, &empty),
    };
    let password_errors = match submitted {
        Submitted::Password(errors) => errors,
        _ => &empty,
    };
    let delete_errors = match submitted {
        Submitted::Delete(errors) => errors,
        _ => &empty,
    };

    let verification = if user.email_verified {
        "<dd>Confirmed</dd>".to_string()
    } else {
        format!(
            "<dd>Not confirmed {}</dd>",
            html::post_button("/verify/resend", "Resend link", csrf, "link")
        )
    };
    let renewal = user
        .renews_at
        .map(|at| format!("<dt>Renews</dt><dd>{}</dd>", at.format("%Y-%m-%d")))
        .unwrap_or_default();

    let body = format!(
        r#"<dl><dt>Email</dt><dd>{email}</dd><dt>Status</dt>{verification}<dt>Plan</dt><dd>{tier} <a href="/billing">Change</a></dd>{renewal}<dt>Member since</dt><dd>{since}</dd></dl>
<h2>Details</h2>{details_summary}<form method="post" action="/profile">{csrf_field}{email_input}{name_input}<button type="submit">Save</button></form>
<h2>Password</h2>{password_summary}<form method="post" action="/profile/password">{csrf_field}{current_pw}{new_pw}{confirm_pw}<button type="submit">Change password</button></form>
<h2>Delete account</h2><p>This removes your arsenal permanently.</p><form method="post" action="/profile/delete">{csrf_field}{delete_pw}<button type="submit" class="danger">Delete my account</button></form>"#,
        email = html::escape(&user.email),
        tier = user.tier.label(),
        since = user.created_at.format("%Y-%m-%d"),
        details_summary = html::error_summary(details_errors),
        csrf_field = html::csrf_field(csrf),
        email_input = html::input("email", "email", "Email", &details.email, details_errors),
        name_input = html::input(
            "text",
            "display_name",
            "Display name",
            &details.display_name,
            details_errors
        ),
        password_summary = html::error_summary(password_errors),
        current_pw = html::input("password", "current", "Current password", "", password_errors),
        new_pw = html::input("password", "password", "New password", "", password_errors),
        confirm_pw = html::input("password", "confirm", "Confirm new password", "", password_errors),
        delete_pw = html::input("password", "confirm_password", "Password", "", delete_errors),
    );

    let status = match submitted {
        Submitted::None => StatusCode::OK,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    };
    html::page(status, "Profile", current.chrome(flash), &body)
}

pub async fn show(current: CurrentUser, IncomingFlash(flash): IncomingFlash) -> Response {
    render(&current, flash, Submitted::None)
}

pub async fn update(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(submitted): Form<Protected<ProfileForm>>,
) -> AppResult<Response> {
    current.verify_csrf(&submitted.csrf)?;
    let form = submitted.form;
    let (email, display_name) = match form.validate() {
        Ok(valid) => valid,
        Err(errors) => return Ok(render(&current, None, Submitted::Details(&form, &errors))),
    };

    let mut email_changed = false;
    let saved = state.store.modify_user(current.user.id, |user| {
        user.display_name = display_name;
        if user.email != email {
            user.email = email;
            user.email_verified = false;
            email_changed = true;
        }
        Ok(())
    });
    let user = match saved {
        Ok(user) => user,
        Err(ArsenalError::DuplicateEmail) => {
            let mut errors = FormErrors::new();
            errors.add("email", "That email address is already registered");
            return Ok(render(&current, None, Submitted::Details(&form, &errors)));
        }
        Err(err) => return Err(err.into()),
    };

    if email_changed {
        issue_verification(&state, &user)?;
        info!(user = %user.id, "email changed");
        return Ok(state.redirect_with(
            "/profile",
            Flash::success(format!("Saved. We sent a confirmation link to {}.", user.email)),
        ));
    }
    Ok(state.redirect_with("/profile", Flash::success("Your details were saved.")))
}

pub async fn change_password(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(submitted): Form<Protected<PasswordForm>>,
) -> AppResult<Response> {
    current.verify_csrf(&submitted.csrf)?;
    let form = submitted.form;
    if let Err(errors) = form.validate() {
        return Ok(render(&current, None, Submitted::Password(&errors)));
    }
    if !verify_password(&form.current, &current.user.password_hash) {
        let mut errors = FormErrors::new();
        errors.add("current", "Current password is incorrect");
        return Ok(render(&current, None, Submitted::Password(&errors)));
    }

    let password_hash = hash_password(&form.password)?;
    let user = state.store.modify_user(current.user.id, |user| {
        user.password_hash = password_hash;
        Ok(())
    })?;
    let ended = state
        .sessions
        .end_all_for(user.id, Some(current.session.id.as_str()))?;
    info!(user = %user.id, other_sessions_ended = ended, "password changed");

    Ok(state.redirect_with(
        "/profile",
        Flash::success("Password changed. Other devices have been signed out."),
    ))
}

pub async fn delete_account(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(submitted): Form<Protected<DeleteForm>>,
) -> AppResult<Response> {
    current.verify_csrf(&submitted.csrf)?;
    if !verify_password(&submitted.form.confirm_password, &current.user.password_hash) {
        let mut errors = FormErrors::new();
        errors.add("confirm_password", "Password is incorrect");
        return Ok(render(&current, None, Submitted::Delete(&errors)));
    }

    state.store.delete_user(current.user.id)?;
    state.sessions.end_all_for(current.user.id, None)?;
    info!(user = %current.user.id, "account deleted");

    Ok(with_cookies(
        state.redirect_with("/login", Flash::info("Your account has been deleted.")),
        [state.cookie_options().clear(SESSION_COOKIE)],
    ))
}
