//! # Form Validation
//!
//! Field-level validation shared by every form. Validators never fail
//! fast: each one records a message against its field in [`FormErrors`] so
//! a form can be re-rendered with every problem at once.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

pub const EMAIL_MAX: usize = 254;
pub const PASSWORD_MIN: usize = 8;
pub const PASSWORD_MAX: usize = 128;
pub const DISPLAY_NAME_MAX: usize = 64;

/// Field name → message. Empty means the form is valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormErrors(BTreeMap<String, String>);

impl FormErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error. The first message for a field wins.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_insert_with(|| message.into());
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `Ok(value)` when no errors were recorded.
    pub fn into_result<T>(self, value: T) -> Result<T, FormErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

// =============================================================================
// FIELD VALIDATORS
// =============================================================================

/// Normalise and check an email address. Returns the lowercased form.
pub fn email(errors: &mut FormErrors, field: &str, raw: &str) -> String {
    let value = raw.trim().to_lowercase();
    if value.is_empty() {
        errors.add(field, "Email is required");
        return value;
    }
    let length = value.chars().count();
    if length < 3 || length > EMAIL_MAX {
        errors.add(field, "Email must be between 3 and 254 characters");
        return value;
    }
    let mut parts = value.split('@');
    let valid = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.chars().any(char::is_whitespace)
        }
        _ => false,
    };
    if !valid {
        errors.add(field, "Enter a valid email address");
    }
    value
}

/// Check a new password against the length policy.
pub fn password(errors: &mut FormErrors, field: &str, raw: &str) {
    let len = raw.chars().count();
    if len < PASSWORD_MIN {
        errors.add(field, format!("Password must be at least {PASSWORD_MIN} characters"));
    } else if len > PASSWORD_MAX {
        errors.add(field, format!("Password must be at most {PASSWORD_MAX} characters"));
    }
}

/// Check that a password confirmation matches.
pub fn confirmation(errors: &mut FormErrors, field: &str, password: &str, confirm: &str) {
    if password != confirm {
        errors.add(field, "Passwords do not match");
    }
}

/// A trimmed string that must be present and at most `max` characters.
pub fn required(errors: &mut FormErrors, field: &str, label: &str, raw: &str, max: usize) -> String {
    let value = raw.trim().to_string();
    if value.is_empty() {
        errors.add(field, format!("{label} is required"));
    } else if value.chars().count() > max {
        errors.add(field, format!("{label} must be at most {max} characters"));
    }
    value
}

/// A trimmed string that may be blank. Blank becomes `None`.
pub fn optional(
    errors: &mut FormErrors,
    field: &str,
    label: &str,
    raw: &str,
    max: usize,
) -> Option<String> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    if value.chars().count() > max {
        errors.add(field, format!("{label} must be at most {max} characters"));
    }
    Some(value.to_string())
}

/// An optional `YYYY-MM-DD` date that may not lie after `today`.
pub fn past_date(
    errors: &mut FormErrors,
    field: &str,
    raw: &str,
    today: NaiveDate,
) -> Option<NaiveDate> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        Ok(date) if date > today => {
            errors.add(field, "Date cannot be in the future");
            None
        }
        Ok(date) => Some(date),
        Err(_) => {
            errors.add(field, "Use the format YYYY-MM-DD");
            None
        }
    }
}

/// An optional dollar amount, converted to cents.
pub fn money(errors: &mut FormErrors, field: &str, raw: &str) -> Option<u64> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    let parsed = parse_cents(value);
    if parsed.is_none() {
        errors.add(field, "Enter an amount like 849.99");
    }
    parsed
}

/// Parse `"1234"`, `"1234.5"`, `"$1,234.56"` into cents without floating point.
#[must_use]
pub fn parse_cents(raw: &str) -> Option<u64> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',')
        .collect();
    let (whole, fraction) = match cleaned.split_once('.') {
        Some((w, f)) => (w, f),
        None => (cleaned.as_str(), ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit())
        || !fraction.chars().all(|c| c.is_ascii_digit())
        || fraction.len() > 2
    {
        return None;
    }
    let whole: u64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let fraction: u64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<u64>().ok()?.checked_mul(10)?,
        _ => fraction.parse().ok()?,
    };
    whole.checked_mul(100)?.checked_add(fraction)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn email_normalised_and_checked() {
        let mut errors = FormErrors::new();
        assert_eq!(email(&mut errors, "email", "  Jo@Example.COM "), "jo@example.com");
        assert!(errors.is_empty());

        for bad in ["", "jo", "jo@example", "@example.com", "a@b@c.com", "jo @x.com"] {
            let mut errors = FormErrors::new();
            email(&mut errors, "email", bad);
            assert!(errors.get("email").is_some(), "accepted {bad:?}");
        }
    }

    #[test]
    fn email_length_counts_characters() {
        let wide = format!("{}@example.com", "é".repeat(240));
        assert_eq!(wide.chars().count(), 252);
        assert!(wide.len() > EMAIL_MAX);
        let mut errors = FormErrors::new();
        email(&mut errors, "email", &wide);
        assert!(errors.is_empty());

        let long = format!("{}@example.com", "a".repeat(243));
        let mut errors = FormErrors::new();
        email(&mut errors, "email", &long);
        assert_eq!(errors.get("email"), Some("Email must be between 3 and 254 characters"));
    }

    #[test]
    fn first_error_per_field_wins() {
        let mut errors = FormErrors::new();
        errors.add("name", "first");
        errors.add("name", "second");
        assert_eq!(errors.get("name"), Some("first"));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn password_policy() {
        let mut errors = FormErrors::new();
        password(&mut errors, "password", "short");
        assert!(errors.get("password").is_some());

        let mut errors = FormErrors::new();
        password(&mut errors, "password", "long enough");
        confirmation(&mut errors, "confirm", "long enough", "long enougH");
        assert!(errors.get("password").is_none());
        assert!(errors.get("confirm").is_some());
    }

    #[test]
    fn cents_parsing() {
        assert_eq!(parse_cents("849.99"), Some(84_999));
        assert_eq!(parse_cents("$1,200"), Some(120_000));
        assert_eq!(parse_cents("12.5"), Some(1250));
        assert_eq!(parse_cents(".5"), Some(50));
        assert_eq!(parse_cents("12.345"), None);
        assert_eq!(parse_cents("-3"), None);
        assert_eq!(parse_cents("abc"), None);
        assert_eq!(parse_cents("."), None);
    }

    #[test]
    fn future_dates_rejected() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let mut errors = FormErrors::new();
        assert_eq!(
            past_date(&mut errors, "date", "2024-06-01", today),
            NaiveDate::from_ymd_opt(2024, 6, 1)
        );
        assert!(past_date(&mut errors, "date", "2024-06-02", today).is_none());
        assert!(errors.get("date").is_some());

        let mut errors = FormErrors::new();
        assert!(past_date(&mut errors, "date", "06/01/2024", today).is_none());
        assert_eq!(errors.get("date"), Some("Use the format YYYY-MM-DD"));
    }

    proptest! {
        #[test]
        fn whole_dollars_and_cents_parse_exactly(dollars in 0u64..10_000_000, cents in 0u64..100) {
            let text = format!("{dollars}.{cents:02}");
            prop_assert_eq!(parse_cents(&text), Some(dollars * 100 + cents));
        }
    }
}
