//! # Admin Panel
//!
//! Users, permissions, feature flags and payments. Each page requires one
//! [`Permission`]; admins hold all of them.

use super::auth::{CsrfForm, CurrentUser, Protected};
use super::error::{AppError, AppResult};
use super::flash::{Flash, IncomingFlash};
use super::html;
use super::AppState;
use arsenal_core::flags::FlagForm;
use arsenal_core::listing::{DEFAULT_PER_PAGE, RawListQuery};
use arsenal_core::types::format_cents;
use arsenal_core::{
    FeatureFlag, FormErrors, ListParams, Page, Permission, Role, SortKey, User, UserId, UserSort,
};
use axum::Form;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use std::collections::BTreeSet;
use tracing::{info, warn};

const USERS: &str = "/admin";
const FLAGS: &str = "/admin/flags";
const PAYMENTS: &str = "/admin/payments";

/// Links to the admin pages `user` may open.
fn admin_nav(user: &User) -> String {
    let links: String = [
        (Permission::ManageUsers, USERS, "Users"),
        (Permission::ManageFlags, FLAGS, "Feature flags"),
        (Permission::ViewPayments, PAYMENTS, "Payments"),
    ]
    .iter()
    .filter(|(permission, _, _)| user.has_permission(*permission))
    .map(|(_, href, label)| format!(r#"<a href="{href}">{label}</a>"#))
    .collect::<Vec<_>>()
    .join(" · ");
    format!(r#"<nav class="admin">{links}</nav>"#)
}

// =============================================================================
// USERS
// =============================================================================

pub async fn users(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(raw): Query<RawListQuery>,
    IncomingFlash(flash): IncomingFlash,
) -> AppResult<Response> {
    if !current.user.has_permission(Permission::ManageUsers) {
        // Send holders of narrower permissions to a page they can use.
        if current.user.has_permission(Permission::ManageFlags) {
            return Ok(Redirect::to(FLAGS).into_response());
        }
        if current.user.has_permission(Permission::ViewPayments) {
            return Ok(Redirect::to(PAYMENTS).into_response());
        }
    }
    current.require(Permission::ManageUsers)?;

    let params = ListParams::<UserSort>::from(&raw);
    let page = params.apply(state.store.users()?);

    let headers: String = UserSort::all()
        .iter()
        .map(|key| html::sort_header(USERS, &params, *key))
        .collect();
    let rows: String = page
        .items
        .iter()
        .map(|u| {
            format!(
                r#"<tr><td><a href="/admin/users/{id}">{email}</a></td><td>{name}</td><td>{tier}</td><td>{joined}</td><td>{role}{unverified}</td></tr>"#,
                id = u.id,
                email = html::escape(&u.email),
                name = html::escape(&u.display_name),
                tier = u.tier.label(),
                joined = u.created_at.format("%Y-%m-%d"),
                role = u.role.as_str(),
                unverified = if u.email_verified { "" } else { " (unverified)" },
            )
        })
        .collect();

    let body = format!(
        "{nav}{search}<table><thead><tr>{headers}<th>Role</th></tr></thead><tbody>{rows}</tbody></table>{pagination}",
        nav = admin_nav(&current.user),
        search = html::search_form(USERS, &params),
        pagination = html::pagination(USERS, &params, &page),
    );
    Ok(html::page(StatusCode::OK, "Users", current.chrome(flash), &body))
}

fn load_user(state: &AppState, id: u64) -> AppResult<User> {
    state.store.user(UserId(id))?.ok_or(AppError::NotFound)
}

pub async fn user_page(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<u64>,
    IncomingFlash(flash): IncomingFlash,
) -> AppResult<Response> {
    current.require(Permission::ManageUsers)?;
    let target = load_user(&state, id)?;
    let firearms = state.store.count_firearms(target.id)?;
    let paid: u64 = state
        .store
        .payments_for(target.id)?
        .iter()
        .map(|p| p.amount_cents)
        .fold(0, u64::saturating_add);

    let roles = [
        (Role::Member.as_str(), "Member"),
        (Role::Admin.as_str(), "Admin"),
    ];
    let permissions: String = Permission::ALL
        .iter()
        .map(|p| {
            html::checkbox(
                "permission",
                p.as_str(),
                p.label(),
                target.permissions.contains(p),
            )
        })
        .collect();

    let body = format!(
        r#"{nav}<dl><dt>Email</dt><dd>{email}</dd><dt>Name</dt><dd>{name}</dd><dt>Verified</dt><dd>{verified}</dd><dt>Plan</dt><dd>{tier}</dd><dt>Firearms</dt><dd>{firearms}</dd><dt>Total paid</dt><dd>{paid}</dd><dt>Joined</dt><dd>{joined}</dd></dl>
<form method="post" action="/admin/users/{id}">{csrf}{role}<fieldset><legend>Permissions</legend>{permissions}</fieldset><button type="submit">Save access</button></form>"#,
        nav = admin_nav(&current.user),
        email = html::escape(&target.email),
        name = html::escape(&target.display_name),
        verified = if target.email_verified { "yes" } else { "no" },
        tier = target.tier.label(),
        paid = format_cents(paid),
        joined = target.created_at.format("%Y-%m-%d"),
        id = target.id,
        csrf = html::csrf_field(&current.session.csrf_token),
        role = html::select("role", "Role", &roles, target.role.as_str(), &FormErrors::new()),
    );
    Ok(html::page(
        StatusCode::OK,
        &target.email,
        current.chrome(flash),
        &body,
    ))
}

/// Role and permission checkboxes. Repeated `permission` fields need the
/// raw pair list.
struct AccessForm {
    csrf: String,
    role: Option<String>,
    permissions: Vec<String>,
}

impl AccessForm {
    fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut form = Self {
            csrf: String::new(),
            role: None,
            permissions: Vec::new(),
        };
        for (key, value) in pairs {
            match key.as_str() {
                "csrf" => form.csrf = value,
                "role" => form.role = Some(value),
                "permission" => form.permissions.push(value),
                _ => {}
            }
        }
        form
    }
}

pub async fn update_user(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<u64>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> AppResult<Response> {
    let form = AccessForm::from_pairs(pairs);
    current.verify_csrf(&form.csrf)?;
    current.require(Permission::ManageUsers)?;
    let target = load_user(&state, id)?;
    let back = format!("/admin/users/{}", target.id);

    let role = match form.role.as_deref() {
        None => target.role,
        Some(raw) => {
            Role::parse(raw).ok_or_else(|| AppError::BadRequest("Unknown role.".to_string()))?
        }
    };
    let permissions = form
        .permissions
        .iter()
        .map(|raw| {
            Permission::parse(raw)
                .ok_or_else(|| AppError::BadRequest(format!("Unknown permission {raw:?}.")))
        })
        .collect::<AppResult<BTreeSet<_>>>()?;

    if role != target.role && !current.user.is_admin() {
        warn!(user = %current.user.id, target = %target.id, "role change by non-admin refused");
        return Err(AppError::Forbidden("Only admins can change roles."));
    }
    if target.id == current.user.id && current.user.is_admin() && role != Role::Admin {
        return Ok(state.redirect_with(
            &back,
            Flash::error("You cannot remove your own admin role."),
        ));
    }

    let target = state.store.modify_user(target.id, |user| {
        user.role = role;
        user.permissions = permissions;
        Ok(())
    })?;
    info!(
        by = %current.user.id,
        user = %target.id,
        role = target.role.as_str(),
        permissions = ?target.permissions.iter().map(|p| p.as_str()).collect::<Vec<_>>(),
        "access updated"
    );
    Ok(state.redirect_with(&back, Flash::success(format!("Access for {} saved.", target.email))))
}

// =============================================================================
// FEATURE FLAGS
// =============================================================================

fn flags_page(
    current: &CurrentUser,
    flash: Option<Flash>,
    flags: &[FeatureFlag],
    form: &FlagForm,
    errors: &FormErrors,
) -> Response {
    let csrf = &current.session.csrf_token;
    let rows: String = flags
        .iter()
        .map(|flag| {
            let (state, label) = if flag.enabled {
                ("on", "Turn off")
            } else {
                ("off", "Turn on")
            };
            format!(
                "<tr><td><code>{key}</code></td><td>{description}</td><td>{state}</td><td>{updated}</td><td>{toggle}</td></tr>",
                key = html::escape(&flag.key),
                description = html::escape(&flag.description),
                updated = flag.updated_at.format("%Y-%m-%d %H:%M"),
                toggle = html::post_button(
                    &format!("/admin/flags/{}/toggle", flag.key),
                    label,
                    csrf,
                    ""
                ),
            )
        })
        .collect();

    let body = format!(
        r#"{nav}<table><thead><tr><th>Key</th><th>Description</th><th>State</th><th>Updated</th><th></th></tr></thead><tbody>{rows}</tbody></table>
<h2>Add or update a flag</h2>{summary}<form method="post" action="{FLAGS}">{csrf_field}{key}{description}{enabled}<button type="submit">Save flag</button></form>"#,
        nav = admin_nav(&current.user),
        summary = html::error_summary(errors),
        csrf_field = html::csrf_field(csrf),
        key = html::input("text", "key", "Key", &form.key, errors),
        description = html::input("text", "description", "Description", &form.description, errors),
        enabled = html::checkbox("enabled", "on", "Enabled", form.enabled.is_some()),
    );
    let status = if errors.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    html::page(status, "Feature flags", current.chrome(flash), &body)
}

pub async fn flags(
    State(state): State<AppState>,
    current: CurrentUser,
    IncomingFlash(flash): IncomingFlash,
) -> AppResult<Response> {
    current.require(Permission::ManageFlags)?;
    let flags = state.store.flags()?;
    Ok(flags_page(
        &current,
        flash,
        &flags,
        &FlagForm::default(),
        &FormErrors::new(),
    ))
}

pub async fn save_flag(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(submitted): Form<Protected<FlagForm>>,
) -> AppResult<Response> {
    current.verify_csrf(&submitted.csrf)?;
    current.require(Permission::ManageFlags)?;

    let flag = match submitted.form.validate() {
        Ok(flag) => flag,
        Err(errors) => {
            let flags = state.store.flags()?;
            return Ok(flags_page(&current, None, &flags, &submitted.form, &errors));
        }
    };
    state.store.put_flag(&flag)?;
    info!(by = %current.user.id, flag = %flag.key, enabled = flag.enabled, "flag saved");
    Ok(state.redirect_with(
        FLAGS,
        Flash::success(format!("Flag {} saved.", flag.key)),
    ))
}

pub async fn toggle_flag(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(key): Path<String>,
    Form(form): Form<CsrfForm>,
) -> AppResult<Response> {
    current.verify_csrf(&form.csrf)?;
    current.require(Permission::ManageFlags)?;

    let enabled = !state.store.flag_enabled(&key)?;
    let flag = state.store.set_flag_enabled(&key, enabled)?;
    info!(by = %current.user.id, flag = %flag.key, enabled, "flag toggled");
    let word = if flag.enabled { "on" } else { "off" };
    Ok(state.redirect_with(
        FLAGS,
        Flash::success(format!("Flag {} is now {word}.", flag.key)),
    ))
}

// =============================================================================
// PAYMENTS
// =============================================================================

pub async fn payments(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(raw): Query<RawListQuery>,
    IncomingFlash(flash): IncomingFlash,
) -> AppResult<Response> {
    current.require(Permission::ViewPayments)?;

    let all = state.store.payments()?;
    let revenue = all
        .iter()
        .map(|p| p.amount_cents)
        .fold(0, u64::saturating_add);
    let requested = raw
        .page
        .as_deref()
        .and_then(|p| p.trim().parse::<usize>().ok())
        .unwrap_or(1);
    let page = Page::paginate(all, requested, DEFAULT_PER_PAGE);

    let rows: String = page
        .items
        .iter()
        .map(|p| {
            format!(
                r#"<tr><td>{paid}</td><td><a href="/admin/users/{user}">{email}</a></td><td>{tier}</td><td>{amount}</td><td>{reference}</td></tr>"#,
                paid = p.paid_at.format("%Y-%m-%d %H:%M"),
                user = p.user,
                email = html::escape(&p.email),
                tier = p.tier.label(),
                amount = format_cents(p.amount_cents),
                reference = html::escape(&p.reference),
            )
        })
        .collect();

    let mut pager = String::new();
    if page.has_prev() {
        pager.push_str(&format!(r#"<a rel="prev" href="{PAYMENTS}?page={}">Previous</a>"#, page.page - 1));
    }
    pager.push_str(&format!("<span>Page {} of {}</span>", page.page, page.total_pages));
    if page.has_next() {
        pager.push_str(&format!(r#"<a rel="next" href="{PAYMENTS}?page={}">Next</a>"#, page.page + 1));
    }

    let body = format!(
        r#"{nav}<p>{count} payments, {revenue} in total.</p><table><thead><tr><th>Date</th><th>User</th><th>Plan</th><th>Amount</th><th>Reference</th></tr></thead><tbody>{rows}</tbody></table><nav class="pagination">{pager}</nav>"#,
        nav = admin_nav(&current.user),
        count = page.total,
        revenue = format_cents(revenue),
    );
    Ok(html::page(StatusCode::OK, "Payments", current.chrome(flash), &body))
}
