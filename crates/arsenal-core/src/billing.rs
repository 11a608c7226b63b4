//! # Billing
//!
//! Payment records and the gateway seam used to charge for paid tiers.

use crate::types::{PaymentId, Tier, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A completed charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub user: UserId,
    /// Email at the time of payment; kept after the account is deleted.
    pub email: String,
    pub tier: Tier,
    pub amount_cents: u64,
    /// Gateway reference for the charge.
    pub reference: String,
    pub paid_at: DateTime<Utc>,
}

/// Charge request handed to a gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest<'a> {
    pub user: UserId,
    pub email: &'a str,
    pub tier: Tier,
    pub amount_cents: u64,
}

/// Gateway acknowledgement of a successful charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    pub reference: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("payment declined: {0}")]
    Declined(String),

    #[error("payment provider unavailable")]
    Unavailable,
}

/// Something that can take money.
pub trait PaymentGateway: Send + Sync {
    fn charge(&self, request: &ChargeRequest<'_>) -> Result<PaymentReceipt, GatewayError>;
}

/// Approves every charge without contacting anyone.
#[derive(Debug, Default)]
pub struct SandboxGateway;

impl PaymentGateway for SandboxGateway {
    fn charge(&self, request: &ChargeRequest<'_>) -> Result<PaymentReceipt, GatewayError> {
        let reference = format!("sandbox-{}", crate::token::generate());
        tracing::info!(
            user = %request.user,
            tier = request.tier.as_str(),
            amount_cents = request.amount_cents,
            %reference,
            "sandbox charge approved"
        );
        Ok(PaymentReceipt { reference })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_approves_with_unique_reference() {
        let request = ChargeRequest {
            user: UserId(3),
            email: "x@y.z",
            tier: Tier::Armory,
            amount_cents: Tier::Armory.price_cents(),
        };
        let a = SandboxGateway.charge(&request).unwrap();
        let b = SandboxGateway.charge(&request).unwrap();
        assert!(a.reference.starts_with("sandbox-"));
        assert_ne!(a, b);
    }
}
