//! # Core Types
//!
//! Identifiers, roles, permissions and subscription tiers.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Identifier of a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub u64);

/// Identifier of a firearm. Unique across all owners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FirearmId(pub u64);

/// Identifier of a recorded payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PaymentId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FirearmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// ROLES & PERMISSIONS
// =============================================================================

/// Account role. Admins hold every permission implicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Role {
    #[default]
    Member,
    Admin,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Admin => "admin",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "member" => Some(Self::Member),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// A grantable admin-panel capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Permission {
    /// Browse users, change roles and permissions.
    ManageUsers,
    /// Create and toggle feature flags.
    ManageFlags,
    /// See every recorded payment.
    ViewPayments,
}

impl Permission {
    pub const ALL: [Permission; 3] = [Self::ManageUsers, Self::ManageFlags, Self::ViewPayments];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ManageUsers => "manage-users",
            Self::ManageFlags => "manage-flags",
            Self::ViewPayments => "view-payments",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::ManageUsers => "Manage users",
            Self::ManageFlags => "Manage feature flags",
            Self::ViewPayments => "View payments",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s.trim())
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// SUBSCRIPTION TIERS
// =============================================================================

/// Length of one paid billing period, in days.
pub const BILLING_PERIOD_DAYS: i64 = 30;

/// Subscription tier. Bounds the size of a user's arsenal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Tier {
    #[default]
    Free,
    Marksman,
    Armory,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Self::Free, Self::Marksman, Self::Armory];

    /// Maximum number of firearms, `None` for unlimited.
    #[must_use]
    pub fn firearm_limit(self) -> Option<usize> {
        match self {
            Self::Free => Some(10),
            Self::Marksman => Some(100),
            Self::Armory => None,
        }
    }

    /// Price of one billing period in cents.
    #[must_use]
    pub fn price_cents(self) -> u64 {
        match self {
            Self::Free => 0,
            Self::Marksman => 499,
            Self::Armory => 1499,
        }
    }

    /// Whether an arsenal of `count` firearms may grow by one.
    #[must_use]
    pub fn allows(self, count: usize) -> bool {
        self.firearm_limit().is_none_or(|limit| count < limit)
    }

    /// Whether an arsenal of `count` firearms fits within this tier.
    #[must_use]
    pub fn fits(self, count: usize) -> bool {
        self.firearm_limit().is_none_or(|limit| count <= limit)
    }

    #[must_use]
    pub fn is_paid(self) -> bool {
        self.price_cents() > 0
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Marksman => "marksman",
            Self::Armory => "armory",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Free => "Free",
            Self::Marksman => "Marksman",
            Self::Armory => "Armory",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s.trim())
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// MONEY
// =============================================================================

/// Format integer cents as dollars, e.g. `1499` → `$14.99`.
#[must_use]
pub fn format_cents(cents: u64) -> String {
    format!("${}.{:02}", cents / 100, cents % 100)
}

// =============================================================================
// TESTS
// =============================================================================
