//! # Errors
//!
//! The single error type returned by core operations.

use crate::types::Tier;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = ArsenalError> = std::result::Result<T, E>;

/// Errors from core operations.
#[derive(Debug, Error)]
pub enum ArsenalError {
    #[error("database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("encoding error: {0}")]
    Encoding(#[from] postcard::Error),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    /// A record that should exist does not.
    #[error("{what} not found")]
    NotFound { what: &'static str },

    #[error("email address is already registered")]
    DuplicateEmail,

    #[error("serial number is already in your arsenal")]
    DuplicateSerial,

    /// The owner's tier does not allow another firearm.
    #[error("the {tier} plan holds at most {limit} firearms")]
    LimitReached { tier: Tier, limit: usize },
}

impl ArsenalError {
    pub(crate) fn not_found(what: &'static str) -> Self {
        Self::NotFound { what }
    }

    /// True for errors caused by the caller's input rather than the system.
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::DuplicateEmail
                | Self::DuplicateSerial
                | Self::LimitReached { .. }
        )
    }
}
