//! # Storage Module
//!
//! Persistent storage for accounts, inventories, sessions, flags and
//! payments using redb.
//!
//! Uses redb embedded database for:
//! - ACID transactions (every mutating operation is one write transaction)
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! Records are encoded with postcard.

mod redb_store;

pub use redb_store::{Store, StoreStats};
