//! # Arsenal Core
//!
//! Domain model and persistence for the Arsenal inventory server.
//!
//! This crate has no knowledge of HTTP. It owns:
//! - Identifiers, roles, permissions and subscription tiers ([`types`])
//! - Users, firearms, feature flags and billing records
//! - Form validation that returns field-level errors ([`validate`])
//! - Filtering, sorting and pagination of lists ([`listing`])
//! - Password hashing and random tokens
//! - Sessions and the LRU cache that fronts them
//! - The redb-backed [`Store`]

pub mod billing;
pub mod cache;
pub mod error;
pub mod firearm;
pub mod flags;
pub mod listing;
pub mod password;
pub mod session;
pub mod storage;
pub mod token;
pub mod types;
pub mod user;
pub mod validate;

pub use billing::{
    ChargeRequest, GatewayError, Payment, PaymentGateway, PaymentReceipt, SandboxGateway,
};
pub use error::{ArsenalError, Result};
pub use firearm::{Firearm, FirearmDraft, FirearmForm, FirearmKind, FirearmSort};
pub use flags::FeatureFlag;
pub use listing::{ListParams, Listable, Page, SortDir, SortKey};
pub use session::{Session, SessionCache, SessionManager};
pub use storage::{Store, StoreStats};
pub use types::{FirearmId, PaymentId, Permission, Role, Tier, UserId};
pub use user::{NewUser, User, UserSort, Verification};
pub use validate::FormErrors;
