//! # Feature Flags
//!
//! Named on/off switches editable from the admin panel.

use crate::validate::FormErrors;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Open self-service registration.
pub const REGISTRATION: &str = "registration";
/// Subscription page and plan changes.
pub const BILLING: &str = "billing";
/// JSON export of a user's arsenal.
pub const EXPORT: &str = "export";

/// Flags the application reads, with their defaults and descriptions.
pub const WELL_KNOWN: [(&str, bool, &str); 3] = [
    (REGISTRATION, true, "Allow new accounts to sign up"),
    (BILLING, true, "Show plans and allow subscription changes"),
    (EXPORT, false, "Allow users to download their arsenal as JSON"),
];

pub const KEY_MAX: usize = 48;
pub const DESCRIPTION_MAX: usize = 200;

/// A feature flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlag {
    pub key: String,
    pub description: String,
    pub enabled: bool,
    pub updated_at: DateTime<Utc>,
}

impl FeatureFlag {
    #[must_use]
    pub fn new(key: impl Into<String>, description: impl Into<String>, enabled: bool) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            enabled,
            updated_at: Utc::now(),
        }
    }
}

/// Default state of a flag that has never been stored.
#[must_use]
pub fn default_for(key: &str) -> bool {
    WELL_KNOWN
        .iter()
        .find(|(k, _, _)| *k == key)
        .is_some_and(|(_, enabled, _)| *enabled)
}

/// Check the key format: lowercase ASCII letters, digits, `-` and `_`.
#[must_use]
pub fn valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= KEY_MAX
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
}

/// Admin form for creating or updating a flag.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlagForm {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub description: String,
    /// Checkbox: present when ticked.
    pub enabled: Option<String>,
}

impl FlagForm {
    pub fn validate(&self) -> Result<FeatureFlag, FormErrors> {
        let mut errors = FormErrors::new();
        let key = self.key.trim().to_string();
        if !valid_key(&key) {
            errors.add(
                "key",
                "Use 1-48 lowercase letters, digits, dashes or underscores",
            );
        }
        let description = self.description.trim().to_string();
        if description.chars().count() > DESCRIPTION_MAX {
            errors.add("description", "Description must be at most 200 characters");
        }
        errors.into_result(FeatureFlag::new(key, description, self.enabled.is_some()))
    }
}
