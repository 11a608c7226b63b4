//! The signed-in user's firearms.
//!
//! Every lookup is scoped to the current user, so another user's id is
//! indistinguishable from a missing one (404).

use super::auth::{CsrfForm, CurrentUser, Protected};
use super::error::{AppError, AppResult};
use super::flash::{Flash, IncomingFlash};
use super::html;
use super::AppState;
use arsenal_core::flags::EXPORT;
use arsenal_core::listing::RawListQuery;
use arsenal_core::{
    ArsenalError, Firearm, FirearmForm, FirearmId, FirearmKind, FirearmSort, FormErrors,
    ListParams, SortKey,
};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_DISPOSITION;
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use chrono::Utc;
use tracing::info;

const LIST: &str = "/arsenal";

/// Redirect away if the user may not add another firearm right now.
fn admission(state: &AppState, current: &CurrentUser) -> AppResult<Option<Response>> {
    let user = &current.user;
    if !user.email_verified {
        return Ok(Some(state.redirect_with(
            "/profile",
            Flash::error("Confirm your email address before adding firearms."),
        )));
    }
    let count = state.store.count_firearms(user.id)?;
    if !user.tier.allows(count) {
        return Ok(Some(state.redirect_with(
            "/billing",
            Flash::error(limit_message(user.tier, count)),
        )));
    }
    Ok(None)
}

fn limit_message(tier: arsenal_core::Tier, limit: usize) -> String {
    format!(
        "The {} plan holds {} firearms. Upgrade to add more.",
        tier.label(),
        tier.firearm_limit().unwrap_or(limit)
    )
}

fn firearm_form(action: &str, csrf: &str, form: &FirearmForm, errors: &FormErrors, submit: &str) -> String {
    let kinds: Vec<(&str, &str)> = FirearmKind::ALL
        .iter()
        .map(|k| (k.as_str(), k.label()))
        .collect();
    format!(
        r#"{summary}<form method="post" action="{action}">{csrf}{name}{manufacturer}{model}{caliber}{kind}{serial}{purchased}{price}{notes}<button type="submit">{submit}</button> <a href="{LIST}">Cancel</a></form>"#,
        summary = html::error_summary(errors),
        action = html::escape(action),
        csrf = html::csrf_field(csrf),
        name = html::input("text", "name", "Name", &form.name, errors),
        manufacturer = html::input("text", "manufacturer", "Manufacturer", &form.manufacturer, errors),
        model = html::input("text", "model", "Model", &form.model, errors),
        caliber = html::input("text", "caliber", "Caliber", &form.caliber, errors),
        kind = html::select("kind", "Type", &kinds, &form.kind, errors),
        serial = html::input("text", "serial_number", "Serial number", &form.serial_number, errors),
        purchased = html::input("date", "purchased_on", "Purchase date", &form.purchased_on, errors),
        price = html::input("text", "price", "Purchase price ($)", &form.price, errors),
        notes = html::textarea("notes", "Notes", &form.notes, errors),
        submit = html::escape(submit),
    )
}

fn load(state: &AppState, current: &CurrentUser, id: u64) -> AppResult<Firearm> {
    state
        .store
        .firearm(current.user.id, FirearmId(id))?
        .ok_or(AppError::NotFound)
}

// =============================================================================
// LIST
// =============================================================================

pub async fn list(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(raw): Query<RawListQuery>,
    IncomingFlash(flash): IncomingFlash,
) -> AppResult<Response> {
    let params = ListParams::<FirearmSort>::from(&raw);
    let firearms = state.store.firearms_for(current.user.id)?;
    let owned = firearms.len();
    let page = params.apply(firearms);

    let headers: String = FirearmSort::all()
        .iter()
        .map(|key| html::sort_header(LIST, &params, *key))
        .collect();
    let rows: String = page
        .items
        .iter()
        .map(|f| {
            format!(
                r#"<tr><td><a href="/arsenal/{id}">{name}</a></td><td>{manufacturer}</td><td>{caliber}</td><td>{kind}</td><td>{purchased}</td><td>{price}</td><td>{added}</td></tr>"#,
                id = f.id,
                name = html::escape(&f.name),
                manufacturer = html::escape(&f.manufacturer),
                caliber = html::escape(&f.caliber),
                kind = f.kind.label(),
                purchased = f.purchased_on.map(|d| d.to_string()).unwrap_or_default(),
                price = f.price_display().unwrap_or_default(),
                added = f.created_at.format("%Y-%m-%d"),
            )
        })
        .collect();

    let tier = current.user.tier;
    let usage = match tier.firearm_limit() {
        Some(limit) => format!("{owned} of {limit} firearms on the {} plan.", tier.label()),
        None => format!("{owned} firearms on the {} plan.", tier.label()),
    };
    let export = if state.flag_enabled(EXPORT) {
        r#" <a href="/arsenal/export">Export JSON</a>"#
    } else {
        ""
    };
    let table = if page.total == 0 {
        if params.search.is_some() {
            "<p>No firearms match your search.</p>".to_string()
        } else {
            "<p>Your arsenal is empty.</p>".to_string()
        }
    } else {
        format!(
            "<table><thead><tr>{headers}</tr></thead><tbody>{rows}</tbody></table>{}",
            html::pagination(LIST, &params, &page)
        )
    };

    let body = format!(
        r#"<p class="usage">{usage}</p><p><a href="/arsenal/new">Add firearm</a>{export}</p>{search}{table}"#,
        search = html::search_form(LIST, &params),
    );
    Ok(html::page(StatusCode::OK, "My arsenal", current.chrome(flash), &body))
}

// =============================================================================
// CREATE
// =============================================================================

pub async fn new_page(
    State(state): State<AppState>,
    current: CurrentUser,
    IncomingFlash(flash): IncomingFlash,
) -> AppResult<Response> {
    if let Some(redirect) = admission(&state, &current)? {
        return Ok(redirect);
    }
    let body = firearm_form(
        LIST,
        &current.session.csrf_token,
        &FirearmForm::default(),
        &FormErrors::new(),
        "Add firearm",
    );
    Ok(html::page(StatusCode::OK, "Add firearm", current.chrome(flash), &body))
}

pub async fn create(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(submitted): Form<Protected<FirearmForm>>,
) -> AppResult<Response> {
    current.verify_csrf(&submitted.csrf)?;
    if let Some(redirect) = admission(&state, &current)? {
        return Ok(redirect);
    }
    let form = submitted.form;
    let rerender = |errors: &FormErrors| {
        let body = firearm_form(LIST, &current.session.csrf_token, &form, errors, "Add firearm");
        html::page(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Add firearm",
            current.chrome(None),
            &body,
        )
    };

    let draft = match form.validate(Utc::now().date_naive()) {
        Ok(draft) => draft,
        Err(errors) => return Ok(rerender(&errors)),
    };

    match state.store.create_firearm(current.user.id, current.user.tier, draft) {
        Ok(firearm) => {
            info!(user = %current.user.id, firearm = %firearm.id, "firearm added");
            Ok(state.redirect_with(
                &format!("/arsenal/{}", firearm.id),
                Flash::success(format!("Added {}.", firearm.name)),
            ))
        }
        Err(ArsenalError::DuplicateSerial) => {
            let mut errors = FormErrors::new();
            errors.add("serial_number", "This serial number is already in your arsenal");
            Ok(rerender(&errors))
        }
        Err(ArsenalError::LimitReached { tier, limit }) => Ok(state.redirect_with(
            "/billing",
            Flash::error(limit_message(tier, limit)),
        )),
        Err(err) => Err(err.into()),
    }
}

// =============================================================================
// SHOW / EDIT / DELETE
// =============================================================================

pub async fn show(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<u64>,
    IncomingFlash(flash): IncomingFlash,
) -> AppResult<Response> {
    let firearm = load(&state, &current, id)?;
    let row = |label: &str, value: Option<String>| {
        value
            .map(|v| format!("<dt>{label}</dt><dd>{}</dd>", html::escape(&v)))
            .unwrap_or_default()
    };
    let details = [
        row("Manufacturer", Some(firearm.manufacturer.clone())),
        row("Model", firearm.model.clone()),
        row("Caliber", Some(firearm.caliber.clone())),
        row("Type", Some(firearm.kind.label().to_string())),
        row("Serial number", firearm.serial_number.clone()),
        row("Purchased", firearm.purchased_on.map(|d| d.to_string())),
        row("Price", firearm.price_display()),
        row("Notes", firearm.notes.clone()),
        row("Added", Some(firearm.created_at.format("%Y-%m-%d").to_string())),
    ]
    .concat();

    let body = format!(
        r#"<dl>{details}</dl><p><a href="/arsenal/{id}/edit">Edit</a> {delete} <a href="{LIST}">Back to list</a></p>"#,
        id = firearm.id,
        delete = html::post_button(
            &format!("/arsenal/{}/delete", firearm.id),
            "Delete",
            &current.session.csrf_token,
            "danger"
        ),
    );
    Ok(html::page(StatusCode::OK, &firearm.name, current.chrome(flash), &body))
}

pub async fn edit_page(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<u64>,
) -> AppResult<Response> {
    let firearm = load(&state, &current, id)?;
    let body = firearm_form(
        &format!("/arsenal/{}", firearm.id),
        &current.session.csrf_token,
        &FirearmForm::from_firearm(&firearm),
        &FormErrors::new(),
        "Save changes",
    );
    Ok(html::page(
        StatusCode::OK,
        &format!("Edit {}", firearm.name),
        current.chrome(None),
        &body,
    ))
}

pub async fn update(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<u64>,
    Form(submitted): Form<Protected<FirearmForm>>,
) -> AppResult<Response> {
    current.verify_csrf(&submitted.csrf)?;
    let existing = load(&state, &current, id)?;
    let form = submitted.form;
    let action = format!("/arsenal/{}", existing.id);
    let rerender = |errors: &FormErrors| {
        let body = firearm_form(&action, &current.session.csrf_token, &form, errors, "Save changes");
        html::page(
            StatusCode::UNPROCESSABLE_ENTITY,
            &format!("Edit {}", existing.name),
            current.chrome(None),
            &body,
        )
    };

    let draft = match form.validate(Utc::now().date_naive()) {
        Ok(draft) => draft,
        Err(errors) => return Ok(rerender(&errors)),
    };

    match state.store.update_firearm(current.user.id, existing.id, draft) {
        Ok(firearm) => {
            info!(user = %current.user.id, firearm = %firearm.id, "firearm updated");
            Ok(state.redirect_with(&action, Flash::success("Changes saved.")))
        }
        Err(ArsenalError::DuplicateSerial) => {
            let mut errors = FormErrors::new();
            errors.add("serial_number", "This serial number is already in your arsenal");
            Ok(rerender(&errors))
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn delete(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<u64>,
    Form(form): Form<CsrfForm>,
) -> AppResult<Response> {
    current.verify_csrf(&form.csrf)?;
    if !state.store.delete_firearm(current.user.id, FirearmId(id))? {
        return Err(AppError::NotFound);
    }
    info!(user = %current.user.id, firearm = id, "firearm deleted");
    Ok(state.redirect_with(LIST, Flash::success("Firearm removed.")))
}

// =============================================================================
// EXPORT
// =============================================================================

pub async fn export(State(state): State<AppState>, current: CurrentUser) -> AppResult<Response> {
    if !state.flag_enabled(EXPORT) {
        return Err(AppError::NotFound);
    }
    let firearms = state.store.firearms_for(current.user.id)?;
    let document = serde_json::json!({
        "exported_at": Utc::now(),
        "owner": current.user.email,
        "count": firearms.len(),
        "firearms": firearms,
    });
    Ok((
        [(CONTENT_DISPOSITION, "attachment; filename=\"arsenal.json\"")],
        Json(document),
    )
        .into_response())
}
