//! Subscription tiers and payment history.

use super::auth::{CsrfForm, CurrentUser, Protected};
use super::error::{AppError, AppResult};
use super::flash::{Flash, IncomingFlash};
use super::html;
use super::AppState;
use arsenal_core::flags::BILLING;
use arsenal_core::types::{BILLING_PERIOD_DAYS, format_cents};
use arsenal_core::{ArsenalError, ChargeRequest, Tier};
use axum::Form;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::{error, info, warn};

const BILLING_PAGE: &str = "/billing";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscribeForm {
    #[serde(default)]
    pub tier: String,
}

fn billing_enabled(state: &AppState) -> AppResult<()> {
    if state.flag_enabled(BILLING) {
        Ok(())
    } else {
        Err(AppError::NotFound)
    }
}

/// Refuse a move to `tier` if the arsenal would not fit.
fn check_fits(state: &AppState, current: &CurrentUser, tier: Tier) -> AppResult<Option<Response>> {
    let count = state.store.count_firearms(current.user.id)?;
    if tier.fits(count) {
        return Ok(None);
    }
    Ok(Some(state.redirect_with(
        BILLING_PAGE,
        Flash::error(format!(
            "You have {count} firearms but the {} plan holds {}. Remove some first.",
            tier.label(),
            tier.firearm_limit().unwrap_or(count)
        )),
    )))
}

fn plan_row(tier: Tier, current: &CurrentUser) -> String {
    let limit = tier
        .firearm_limit()
        .map(|l| format!("{l} firearms"))
        .unwrap_or_else(|| "Unlimited".to_string());
    let price = if tier.is_paid() {
        format!("{} / {BILLING_PERIOD_DAYS} days", format_cents(tier.price_cents()))
    } else {
        "Free".to_string()
    };
    let csrf = &current.session.csrf_token;
    let action = if tier == current.user.tier {
        "<strong>Current plan</strong>".to_string()
    } else if tier == Tier::Free {
        html::post_button("/billing/cancel", "Switch to Free", csrf, "")
    } else {
        format!(
            r#"<form method="post" action="/billing/subscribe" class="inline">{}<input type="hidden" name="tier" value="{}"><button type="submit">Choose {}</button></form>"#,
            html::csrf_field(csrf),
            tier.as_str(),
            tier.label()
        )
    };
    format!(
        "<tr><td>{}</td><td>{limit}</td><td>{price}</td><td>{action}</td></tr>",
        tier.label()
    )
}

pub async fn show(
    State(state): State<AppState>,
    current: CurrentUser,
    IncomingFlash(flash): IncomingFlash,
) -> AppResult<Response> {
    billing_enabled(&state)?;

    let plans: String = Tier::ALL.iter().map(|t| plan_row(*t, &current)).collect();
    let renewal = current
        .user
        .renews_at
        .map(|at| format!("<p>Your plan renews on {}.</p>", at.format("%Y-%m-%d")))
        .unwrap_or_default();

    let payments = state.store.payments_for(current.user.id)?;
    let history = if payments.is_empty() {
        "<p>No payments yet.</p>".to_string()
    } else {
        let rows: String = payments
            .iter()
            .map(|p| {
                format!(
                    "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                    p.paid_at.format("%Y-%m-%d"),
                    p.tier.label(),
                    format_cents(p.amount_cents),
                    html::escape(&p.reference)
                )
            })
            .collect();
        format!(
            "<table><thead><tr><th>Date</th><th>Plan</th><th>Amount</th><th>Reference</th></tr></thead><tbody>{rows}</tbody></table>"
        )
    };

    let body = format!(
        "{renewal}<table><thead><tr><th>Plan</th><th>Holds</th><th>Price</th><th></th></tr></thead><tbody>{plans}</tbody></table><h2>Payment history</h2>{history}"
    );
    Ok(html::page(StatusCode::OK, "Your plan", current.chrome(flash), &body))
}

pub async fn subscribe(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(submitted): Form<Protected<SubscribeForm>>,
) -> AppResult<Response> {
    current.verify_csrf(&submitted.csrf)?;
    billing_enabled(&state)?;

    let tier = Tier::parse(&submitted.form.tier)
        .ok_or_else(|| AppError::BadRequest("Unknown plan.".to_string()))?;
    if tier == current.user.tier {
        return Ok(state.redirect_with(
            BILLING_PAGE,
            Flash::info(format!("You are already on the {} plan.", tier.label())),
        ));
    }
    if !tier.is_paid() {
        return downgrade_to_free(&state, &current);
    }
    if let Some(refusal) = check_fits(&state, &current, tier)? {
        return Ok(refusal);
    }

    let amount_cents = tier.price_cents();
    let request = ChargeRequest {
        user: current.user.id,
        email: &current.user.email,
        tier,
        amount_cents,
    };
    let receipt = match state.gateway.charge(&request) {
        Ok(receipt) => receipt,
        Err(err) => {
            warn!(user = %current.user.id, tier = tier.as_str(), error = %err, "charge failed");
            return Ok(state.redirect_with(
                BILLING_PAGE,
                Flash::error(format!("Your payment did not go through: {err}.")),
            ));
        }
    };

    let renews_at = Utc::now() + Duration::days(BILLING_PERIOD_DAYS);
    let reference = receipt.reference;
    let changed = state.store.change_tier(
        current.user.id,
        tier,
        Some(renews_at),
        Some((amount_cents, reference.clone())),
    );
    match changed {
        Ok((_, payment)) => {
            if let Some(payment) = payment {
                info!(
                    user = %current.user.id,
                    payment = %payment.id,
                    amount_cents,
                    "payment recorded"
                );
            }
            Ok(state.redirect_with(
                BILLING_PAGE,
                Flash::success(format!("You are now on the {} plan.", tier.label())),
            ))
        }
        Err(err) => {
            // The gateway has taken the money but nothing was recorded.
            error!(
                user = %current.user.id,
                tier = tier.as_str(),
                reference = %reference,
                amount_cents,
                error = %err,
                "charge captured but plan change failed"
            );
            match err {
                ArsenalError::LimitReached { .. } => Ok(state.redirect_with(
                    BILLING_PAGE,
                    Flash::error(format!(
                        "Your arsenal no longer fits the {} plan, so payment {reference} was not applied. Contact support for a refund.",
                        tier.label()
                    )),
                )),
                other => Err(other.into()),
            }
        }
    }
}

fn downgrade_to_free(state: &AppState, current: &CurrentUser) -> AppResult<Response> {
    if let Some(refusal) = check_fits(state, current, Tier::Free)? {
        return Ok(refusal);
    }
    match state.store.change_tier(current.user.id, Tier::Free, None, None) {
        Ok(_) => Ok(state.redirect_with(
            BILLING_PAGE,
            Flash::success("Your subscription was cancelled. You are on the Free plan."),
        )),
        Err(ArsenalError::LimitReached { .. }) => check_fits(state, current, Tier::Free)?
            .ok_or_else(|| AppError::BadRequest("Your arsenal does not fit that plan.".to_string())),
        Err(err) => Err(err.into()),
    }
}

pub async fn cancel(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(form): Form<CsrfForm>,
) -> AppResult<Response> {
    current.verify_csrf(&form.csrf)?;
    billing_enabled(&state)?;
    if current.user.tier == Tier::Free {
        return Ok(state.redirect_with(BILLING_PAGE, Flash::info("You are already on the Free plan.")));
    }
    downgrade_to_free(&state, &current)
}
