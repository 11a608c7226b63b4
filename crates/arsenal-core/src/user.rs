//! # Users
//!
//! Account records and the registration/profile forms that produce them.

use crate::listing::{Listable, SortKey};
use crate::types::{Permission, Role, Tier, UserId};
use crate::validate::{self, FormErrors};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// A user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Lowercased, unique.
    pub email: String,
    pub display_name: String,
    /// Argon2 PHC string.
    pub password_hash: String,
    pub role: Role,
    pub permissions: BTreeSet<Permission>,
    pub email_verified: bool,
    pub tier: Tier,
    /// End of the current paid period. `None` on the free tier.
    pub renews_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Admins hold every permission.
    #[must_use]
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.is_admin() || self.permissions.contains(&permission)
    }

    /// Whether the admin panel should be reachable at all.
    #[must_use]
    pub fn has_any_permission(&self) -> bool {
        self.is_admin() || !self.permissions.is_empty()
    }

    /// Permissions in effect, including those implied by the role.
    #[must_use]
    pub fn effective_permissions(&self) -> BTreeSet<Permission> {
        if self.is_admin() {
            Permission::ALL.into_iter().collect()
        } else {
            self.permissions.clone()
        }
    }
}

/// Everything needed to create an account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
    pub role: Role,
    pub email_verified: bool,
}

/// Hours an email verification link stays valid.
pub const VERIFICATION_TTL_HOURS: i64 = 48;

/// A pending email verification, keyed in storage by its token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub user: UserId,
    /// Address being verified. A token stops working if the account's
    /// email changes afterwards.
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

impl Verification {
    #[must_use]
    pub fn for_user(user: &User, now: DateTime<Utc>) -> Self {
        Self {
            user: user.id,
            email: user.email.clone(),
            expires_at: now + chrono::Duration::hours(VERIFICATION_TTL_HOURS),
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

// =============================================================================
// FORMS
// =============================================================================

/// Registration form as submitted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm: String,
}

/// A registration that passed validation. The password is still plain text.
#[derive(Debug, Clone)]
pub struct ValidRegistration {
    pub email: String,
    pub display_name: String,
    pub password: String,
}

impl RegistrationForm {
    pub fn validate(&self) -> Result<ValidRegistration, FormErrors> {
        let mut errors = FormErrors::new();
        let email = validate::email(&mut errors, "email", &self.email);
        validate::password(&mut errors, "password", &self.password);
        validate::confirmation(&mut errors, "confirm", &self.password, &self.confirm);

        let display_name = if self.display_name.trim().is_empty() {
            email.split('@').next().unwrap_or_default().to_string()
        } else {
            validate::required(
                &mut errors,
                "display_name",
                "Display name",
                &self.display_name,
                validate::DISPLAY_NAME_MAX,
            )
        };

        errors.into_result(ValidRegistration {
            email,
            display_name,
            password: self.password.clone(),
        })
    }
}

/// Profile details form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub display_name: String,
}

impl ProfileForm {
    /// Returns the normalised `(email, display_name)`.
    pub fn validate(&self) -> Result<(String, String), FormErrors> {
        let mut errors = FormErrors::new();
        let email = validate::email(&mut errors, "email", &self.email);
        let name = validate::required(
            &mut errors,
            "display_name",
            "Display name",
            &self.display_name,
            validate::DISPLAY_NAME_MAX,
        );
        errors.into_result((email, name))
    }
}

/// Password change form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PasswordForm {
    #[serde(default)]
    pub current: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm: String,
}

impl PasswordForm {
    /// Checks the new password only; the current password is verified
    /// against the stored hash by the caller.
    pub fn validate(&self) -> Result<(), FormErrors> {
        let mut errors = FormErrors::new();
        if self.current.is_empty() {
            errors.add("current", "Enter your current password");
        }
        validate::password(&mut errors, "password", &self.password);
        validate::confirmation(&mut errors, "confirm", &self.password, &self.confirm);
        errors.into_result(())
    }
}

// =============================================================================
// LISTING
// =============================================================================

/// Sortable columns of the admin user list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserSort {
    #[default]
    Joined,
    Email,
    Name,
    Tier,
}

impl SortKey for UserSort {
    fn all() -> &'static [Self] {
        &[Self::Email, Self::Name, Self::Tier, Self::Joined]
    }

    fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "joined" => Some(Self::Joined),
            "email" => Some(Self::Email),
            "name" => Some(Self::Name),
            "tier" => Some(Self::Tier),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Joined => "joined",
            Self::Email => "email",
            Self::Name => "name",
            Self::Tier => "tier",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Joined => "Joined",
            Self::Email => "Email",
            Self::Name => "Name",
            Self::Tier => "Plan",
        }
    }
}

impl Listable for User {
    type Sort = UserSort;

    fn compare(&self, other: &Self, key: UserSort) -> Ordering {
        match key {
            UserSort::Joined => self.created_at.cmp(&other.created_at),
            UserSort::Email => self.email.cmp(&other.email),
            UserSort::Name => self
                .display_name
                .to_lowercase()
                .cmp(&other.display_name.to_lowercase()),
            UserSort::Tier => self.tier.cmp(&other.tier),
        }
    }

    fn tie_break(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }

    fn matches(&self, needle: &str) -> bool {
        self.email.contains(needle) || self.display_name.to_lowercase().contains(needle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_display_name_defaults_to_local_part() {
        let form = RegistrationForm {
            email: "Sam.Rivera@Example.com".into(),
            display_name: "  ".into(),
            password: "hunter2hunter2".into(),
            confirm: "hunter2hunter2".into(),
        };
        let valid = form.validate().unwrap();
        assert_eq!(valid.email, "sam.rivera@example.com");
        assert_eq!(valid.display_name, "sam.rivera");
    }

    #[test]
    fn registration_reports_every_field() {
        let form = RegistrationForm {
            email: "nope".into(),
            display_name: String::new(),
            password: "short".into(),
            confirm: "other".into(),
        };
        let errors = form.validate().unwrap_err();
        assert!(errors.get("email").is_some());
        assert!(errors.get("password").is_some());
        assert!(errors.get("confirm").is_some());
    }

    #[test]
    fn admin_role_implies_permissions() {
        let user = User {
            id: UserId(1),
            email: "a@b.co".into(),
            display_name: "a".into(),
            password_hash: String::new(),
            role: Role::Admin,
            permissions: BTreeSet::new(),
            email_verified: true,
            tier: Tier::Free,
            renews_at: None,
            created_at: Utc::now(),
        };
        assert!(user.has_permission(Permission::ManageFlags));
        assert_eq!(user.effective_permissions().len(), Permission::ALL.len());
    }
}
