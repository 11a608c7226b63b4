//! # Firearms
//!
//! Inventory records, the form that edits them, and their list ordering.

use crate::listing::{Listable, SortKey};
use crate::types::{FirearmId, UserId, format_cents};
use crate::validate::{self, FormErrors};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub const NAME_MAX: usize = 100;
pub const CALIBER_MAX: usize = 50;
pub const SERIAL_MAX: usize = 64;
pub const NOTES_MAX: usize = 2000;

/// Broad category of a firearm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum FirearmKind {
    #[default]
    Handgun,
    Rifle,
    Shotgun,
    Other,
}

impl FirearmKind {
    pub const ALL: [FirearmKind; 4] = [Self::Handgun, Self::Rifle, Self::Shotgun, Self::Other];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Handgun => "handgun",
            Self::Rifle => "rifle",
            Self::Shotgun => "shotgun",
            Self::Other => "other",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Handgun => "Handgun",
            Self::Rifle => "Rifle",
            Self::Shotgun => "Shotgun",
            Self::Other => "Other",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s.trim().to_ascii_lowercase())
    }
}

/// One firearm in a user's arsenal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Firearm {
    pub id: FirearmId,
    pub owner: UserId,
    pub name: String,
    pub manufacturer: String,
    pub model: Option<String>,
    pub caliber: String,
    pub kind: FirearmKind,
    pub serial_number: Option<String>,
    pub purchased_on: Option<NaiveDate>,
    pub price_cents: Option<u64>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Firearm {
    #[must_use]
    pub fn price_display(&self) -> Option<String> {
        self.price_cents.map(format_cents)
    }

    /// Case-insensitive serial comparison.
    #[must_use]
    pub fn has_serial(&self, serial: &str) -> bool {
        self.serial_number
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case(serial))
    }

    /// Overwrite the editable fields from a validated draft.
    pub fn apply(&mut self, draft: FirearmDraft, now: DateTime<Utc>) {
        self.name = draft.name;
        self.manufacturer = draft.manufacturer;
        self.model = draft.model;
        self.caliber = draft.caliber;
        self.kind = draft.kind;
        self.serial_number = draft.serial_number;
        self.purchased_on = draft.purchased_on;
        self.price_cents = draft.price_cents;
        self.notes = draft.notes;
        self.updated_at = now;
    }
}

/// Validated editable fields of a firearm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirearmDraft {
    pub name: String,
    pub manufacturer: String,
    pub model: Option<String>,
    pub caliber: String,
    pub kind: FirearmKind,
    pub serial_number: Option<String>,
    pub purchased_on: Option<NaiveDate>,
    pub price_cents: Option<u64>,
    pub notes: Option<String>,
}

/// Firearm form as submitted. Also used to refill the form on re-render.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FirearmForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub caliber: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub serial_number: String,
    #[serde(default)]
    pub purchased_on: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub notes: String,
}

impl FirearmForm {
    /// Validate against `today` (purchase dates may not be later).
    pub fn validate(&self, today: NaiveDate) -> Result<FirearmDraft, FormErrors> {
        let mut errors = FormErrors::new();

        let name = validate::required(&mut errors, "name", "Name", &self.name, NAME_MAX);
        let manufacturer = validate::required(
            &mut errors,
            "manufacturer",
            "Manufacturer",
            &self.manufacturer,
            NAME_MAX,
        );
        let model = validate::optional(&mut errors, "model", "Model", &self.model, NAME_MAX);
        let caliber =
            validate::required(&mut errors, "caliber", "Caliber", &self.caliber, CALIBER_MAX);
        let kind = FirearmKind::parse(&self.kind).unwrap_or_else(|| {
            errors.add("kind", "Choose a type");
            FirearmKind::default()
        });
        let serial_number = validate::optional(
            &mut errors,
            "serial_number",
            "Serial number",
            &self.serial_number,
            SERIAL_MAX,
        );
        let purchased_on = validate::past_date(&mut errors, "purchased_on", &self.purchased_on, today);
        let price_cents = validate::money(&mut errors, "price", &self.price);
        let notes = validate::optional(&mut errors, "notes", "Notes", &self.notes, NOTES_MAX);

        errors.into_result(FirearmDraft {
            name,
            manufacturer,
            model,
            caliber,
            kind,
            serial_number,
            purchased_on,
            price_cents,
            notes,
        })
    }

    /// Pre-fill the edit form from a stored record.
    #[must_use]
    pub fn from_firearm(firearm: &Firearm) -> Self {
        Self {
            name: firearm.name.clone(),
            manufacturer: firearm.manufacturer.clone(),
            model: firearm.model.clone().unwrap_or_default(),
            caliber: firearm.caliber.clone(),
            kind: firearm.kind.as_str().to_string(),
            serial_number: firearm.serial_number.clone().unwrap_or_default(),
            purchased_on: firearm
                .purchased_on
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            price: firearm
                .price_cents
                .map(|c| format!("{}.{:02}", c / 100, c % 100))
                .unwrap_or_default(),
            notes: firearm.notes.clone().unwrap_or_default(),
        }
    }
}

// =============================================================================
// LISTING
// =============================================================================

/// Sortable columns of the arsenal list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FirearmSort {
    Name,
    Manufacturer,
    Caliber,
    Kind,
    Purchased,
    Price,
    #[default]
    Added,
}

impl SortKey for FirearmSort {
    fn all() -> &'static [Self] {
        &[
            Self::Name,
            Self::Manufacturer,
            Self::Caliber,
            Self::Kind,
            Self::Purchased,
            Self::Price,
            Self::Added,
        ]
    }

    fn parse(s: &str) -> Option<Self> {
        Self::all().iter().copied().find(|k| k.as_str() == s.trim())
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Manufacturer => "manufacturer",
            Self::Caliber => "caliber",
            Self::Kind => "kind",
            Self::Purchased => "purchased",
            Self::Price => "price",
            Self::Added => "added",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Name => "Name",
            Self::Manufacturer => "Manufacturer",
            Self::Caliber => "Caliber",
            Self::Kind => "Type",
            Self::Purchased => "Purchased",
            Self::Price => "Price",
            Self::Added => "Added",
        }
    }
}

fn cmp_lower(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

impl Listable for Firearm {
    type Sort = FirearmSort;

    fn compare(&self, other: &Self, key: FirearmSort) -> Ordering {
        match key {
            FirearmSort::Name => cmp_lower(&self.name, &other.name),
            FirearmSort::Manufacturer => cmp_lower(&self.manufacturer, &other.manufacturer),
            FirearmSort::Caliber => cmp_lower(&self.caliber, &other.caliber),
            FirearmSort::Kind => self.kind.cmp(&other.kind),
            // Unknown dates and prices sort first.
            FirearmSort::Purchased => self.purchased_on.cmp(&other.purchased_on),
            FirearmSort::Price => self.price_cents.cmp(&other.price_cents),
            FirearmSort::Added => self.created_at.cmp(&other.created_at),
        }
    }

    fn tie_break(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }

    fn matches(&self, needle: &str) -> bool {
        let fields = [
            Some(self.name.as_str()),
            Some(self.manufacturer.as_str()),
            self.model.as_deref(),
            Some(self.caliber.as_str()),
            self.serial_number.as_deref(),
        ];
        fields
            .into_iter()
            .flatten()
            .any(|f| f.to_lowercase().contains(needle))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::{ListParams, RawListQuery};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    fn form() -> FirearmForm {
        FirearmForm {
            name: " Range pistol ".into(),
            manufacturer: "Glock".into(),
            model: "19".into(),
            caliber: "9mm".into(),
            kind: "Handgun".into(),
            serial_number: "ABC123".into(),
            purchased_on: "2024-12-24".into(),
            price: "549.99".into(),
            notes: String::new(),
        }
    }

    fn firearm(id: u64, name: &str, price: Option<u64>) -> Firearm {
        let now = Utc::now();
        Firearm {
            id: FirearmId(id),
            owner: UserId(1),
            name: name.into(),
            manufacturer: "Maker".into(),
            model: None,
            caliber: ".22 LR".into(),
            kind: FirearmKind::Rifle,
            serial_number: None,
            purchased_on: None,
            price_cents: price,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn valid_form_produces_draft() {
        let draft = form().validate(today()).unwrap();
        assert_eq!(draft.name, "Range pistol");
        assert_eq!(draft.kind, FirearmKind::Handgun);
        assert_eq!(draft.price_cents, Some(54_999));
        assert_eq!(draft.notes, None);
    }

    #[test]
    fn invalid_form_reports_fields() {
        let mut bad = form();
        bad.name = String::new();
        bad.kind = "cannon".into();
        bad.price = "lots".into();
        bad.purchased_on = "2030-01-01".into();
        let errors = bad.validate(today()).unwrap_err();
        for field in ["name", "kind", "price", "purchased_on"] {
            assert!(errors.get(field).is_some(), "missing error for {field}");
        }
        assert!(errors.get("caliber").is_none());
    }

    #[test]
    fn edit_form_round_trips_record() {
        let mut record = firearm(7, "Old", None);
        record.apply(form().validate(today()).unwrap(), Utc::now());
        let refilled = FirearmForm::from_firearm(&record);
        assert_eq!(refilled.price, "549.99");
        assert_eq!(refilled.purchased_on, "2024-12-24");
        assert_eq!(refilled.validate(today()).unwrap().serial_number.as_deref(), Some("ABC123"));
    }

    #[test]
    fn serial_match_ignores_case() {
        let mut record = firearm(1, "A", None);
        record.serial_number = Some("abc123".into());
        assert!(record.has_serial("ABC123"));
        assert!(!record.has_serial("ABC124"));
    }

    #[test]
    fn price_sort_puts_unknown_first() {
        let raw = RawListQuery {
            sort: Some("price".into()),
            ..RawListQuery::default()
        };
        let params: ListParams<FirearmSort> = (&raw).into();
        let page = params.apply(vec![
            firearm(1, "a", Some(500)),
            firearm(2, "b", None),
            firearm(3, "c", Some(100)),
        ]);
        let ids: Vec<u64> = page.items.iter().map(|f| f.id.0).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }
}
