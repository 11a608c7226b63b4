//! redb-backed store.
//!
//! Table layout:
//!
//! | table           | key                  | value               |
//! |-----------------|----------------------|---------------------|
//! | `meta`          | counter name         | next id             |
//! | `users`         | user id              | `User`              |
//! | `emails`        | lowercased email     | user id             |
//! | `firearms`      | (owner id, id)       | `Firearm`           |
//! | `sessions`      | session id           | `Session`           |
//! | `verifications` | token                | `Verification`      |
//! | `flags`         | flag key             | `FeatureFlag`       |
//! | `payments`      | payment id           | `Payment`           |

use crate::billing::Payment;
use crate::error::{ArsenalError, Result};
use crate::firearm::{Firearm, FirearmDraft};
use crate::flags::{self, FeatureFlag};
use crate::session::Session;
use crate::types::{FirearmId, PaymentId, Tier, UserId};
use crate::user::{NewUser, User, Verification};
use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

// =============================================================================
// TABLES
// =============================================================================

const META: TableDefinition<&str, u64> = TableDefinition::new("meta");
const USERS: TableDefinition<u64, &[u8]> = TableDefinition::new("users");
const EMAILS: TableDefinition<&str, u64> = TableDefinition::new("emails");
const FIREARMS: TableDefinition<(u64, u64), &[u8]> = TableDefinition::new("firearms");
const SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");
const VERIFICATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("verifications");
const FLAGS: TableDefinition<&str, &[u8]> = TableDefinition::new("flags");
const PAYMENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("payments");

const NEXT_USER: &str = "next_user_id";
const NEXT_FIREARM: &str = "next_firearm_id";
const NEXT_PAYMENT: &str = "next_payment_id";

// =============================================================================
// HELPERS
// =============================================================================

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(postcard::to_allocvec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(postcard::from_bytes(bytes)?)
}

/// Allocate the next id from a counter. Ids start at 1.
fn next_id(txn: &WriteTransaction, counter: &str) -> Result<u64> {
    let mut meta = txn.open_table(META)?;
    let current = meta.get(counter)?.map(|v| v.value()).unwrap_or(1);
    meta.insert(counter, current.saturating_add(1))?;
    Ok(current)
}

/// Decode every value of a string-keyed table, keeping those `keep` accepts.
fn string_keyed_where<T, R>(table: &R, keep: impl Fn(&T) -> bool) -> Result<Vec<(String, T)>>
where
    T: DeserializeOwned,
    R: ReadableTable<&'static str, &'static [u8]>,
{
    let mut found = Vec::new();
    for entry in table.iter()? {
        let (key, value) = entry?;
        let record: T = decode(value.value())?;
        if keep(&record) {
            found.push((key.value().to_string(), record));
        }
    }
    Ok(found)
}

fn firearm_range(owner: UserId) -> std::ops::RangeInclusive<(u64, u64)> {
    (owner.0, 0)..=(owner.0, u64::MAX)
}

/// Firearms of one owner inside a write transaction.
fn owned_firearms<R>(table: &R, owner: UserId) -> Result<Vec<Firearm>>
where
    R: ReadableTable<(u64, u64), &'static [u8]>,
{
    let mut firearms = Vec::new();
    for entry in table.range(firearm_range(owner))? {
        let (_, value) = entry?;
        firearms.push(decode(value.value())?);
    }
    Ok(firearms)
}

fn serial_taken(existing: &[Firearm], draft: &FirearmDraft, except: Option<FirearmId>) -> bool {
    draft.serial_number.as_deref().is_some_and(|serial| {
        existing
            .iter()
            .any(|f| Some(f.id) != except && f.has_serial(serial))
    })
}

// =============================================================================
// STORE
// =============================================================================

/// Row counts for status output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub users: usize,
    pub firearms: usize,
    pub sessions: usize,
    pub payments: usize,
    pub flags: usize,
}

/// Persistent store backed by a single redb file.
pub struct Store {
    db: Database,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Open the database at `path`, creating the file and tables if needed.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;
        let txn = db.begin_write()?;
        txn.open_table(META)?;
        txn.open_table(USERS)?;
        txn.open_table(EMAILS)?;
        txn.open_table(FIREARMS)?;
        txn.open_table(SESSIONS)?;
        txn.open_table(VERIFICATIONS)?;
        txn.open_table(FLAGS)?;
        txn.open_table(PAYMENTS)?;
        txn.commit()?;
        debug!(path = %path.display(), "store opened");
        Ok(Self { db })
    }

    // =========================================================================
    // USERS
    // =========================================================================

    /// Create an account. Fails with `DuplicateEmail` if the address is taken.
    pub fn create_user(&self, new: NewUser) -> Result<User> {
        let email = new.email.trim().to_lowercase();
        let txn = self.db.begin_write()?;
        let user = {
            let mut emails = txn.open_table(EMAILS)?;
            if emails.get(email.as_str())?.is_some() {
                return Err(ArsenalError::DuplicateEmail);
            }
            let id = next_id(&txn, NEXT_USER)?;
            let user = User {
                id: UserId(id),
                email,
                display_name: new.display_name,
                password_hash: new.password_hash,
                role: new.role,
                permissions: BTreeSet::new(),
                email_verified: new.email_verified,
                tier: Tier::Free,
                renews_at: None,
                created_at: Utc::now(),
            };
            emails.insert(user.email.as_str(), id)?;
            txn.open_table(USERS)?
                .insert(id, encode(&user)?.as_slice())?;
            user
        };
        txn.commit()?;
        info!(user = %user.id, email = %user.email, "user created");
        Ok(user)
    }

    pub fn user(&self, id: UserId) -> Result<Option<User>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(USERS)?;
        let user = match table.get(id.0)? {
            Some(value) => Some(decode(value.value())?),
            None => None,
        };
        Ok(user)
    }

    pub fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = email.trim().to_lowercase();
        let id = {
            let txn = self.db.begin_read()?;
            let table = txn.open_table(EMAILS)?;
            let id = table.get(email.as_str())?.map(|v| v.value());
            id
        };
        match id {
            Some(id) => self.user(UserId(id)),
            None => Ok(None),
        }
    }

    /// All users in id order.
    pub fn users(&self) -> Result<Vec<User>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(USERS)?;
        let mut users = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            users.push(decode(value.value())?);
        }
        Ok(users)
    }

    /// Re-read a user inside a write transaction, apply `change` and store
    /// the result, keeping the email index in step. Fields `change` leaves
    /// alone keep their latest committed values.
    pub fn modify_user<F>(&self, id: UserId, change: F) -> Result<User>
    where
        F: FnOnce(&mut User) -> Result<()>,
    {
        let txn = self.db.begin_write()?;
        let user = {
            let mut users = txn.open_table(USERS)?;
            let old: User = match users.get(id.0)? {
                Some(value) => decode(value.value())?,
                None => return Err(ArsenalError::not_found("user")),
            };
            let mut user = old.clone();
            change(&mut user)?;
            user.id = old.id;
            if old.email != user.email {
                let mut emails = txn.open_table(EMAILS)?;
                if emails.get(user.email.as_str())?.is_some() {
                    return Err(ArsenalError::DuplicateEmail);
                }
                emails.remove(old.email.as_str())?;
                emails.insert(user.email.as_str(), id.0)?;
            }
            users.insert(id.0, encode(&user)?.as_slice())?;
            user
        };
        txn.commit()?;
        Ok(user)
    }

    /// Delete an account with its inventory, sessions and pending
    /// verifications. Payment records are kept.
    pub fn delete_user(&self, id: UserId) -> Result<User> {
        let txn = self.db.begin_write()?;
        let user = {
            let mut users = txn.open_table(USERS)?;
            let user: User = match users.remove(id.0)? {
                Some(value) => decode(value.value())?,
                None => return Err(ArsenalError::not_found("user")),
            };
            txn.open_table(EMAILS)?.remove(user.email.as_str())?;

            let mut firearms = txn.open_table(FIREARMS)?;
            let keys = firearms
                .range(firearm_range(id))?
                .map(|entry| entry.map(|(key, _)| key.value()))
                .collect::<Result<Vec<_>, _>>()?;
            for key in keys {
                firearms.remove(key)?;
            }

            let mut sessions = txn.open_table(SESSIONS)?;
            for (key, _) in string_keyed_where(&sessions, |s: &Session| s.user == id)? {
                sessions.remove(key.as_str())?;
            }

            let mut verifications = txn.open_table(VERIFICATIONS)?;
            for (key, _) in string_keyed_where(&verifications, |v: &Verification| v.user == id)? {
                verifications.remove(key.as_str())?;
            }
            user
        };
        txn.commit()?;
        info!(user = %id, "user deleted");
        Ok(user)
    }

    // =========================================================================
    // FIREARMS
    // =========================================================================

    /// An owner's firearms in id order.
    pub fn firearms_for(&self, owner: UserId) -> Result<Vec<Firearm>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(FIREARMS)?;
        owned_firearms(&table, owner)
    }

    pub fn count_firearms(&self, owner: UserId) -> Result<usize> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(FIREARMS)?;
        let count = table.range(firearm_range(owner))?.count();
        Ok(count)
    }

    /// Look up a firearm. Another owner's id reads as absent.
    pub fn firearm(&self, owner: UserId, id: FirearmId) -> Result<Option<Firearm>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(FIREARMS)?;
        let firearm = match table.get((owner.0, id.0))? {
            Some(value) => Some(decode(value.value())?),
            None => None,
        };
        Ok(firearm)
    }

    /// Add a firearm, enforcing the tier limit and per-owner serial
    /// uniqueness inside the same transaction.
    pub fn create_firearm(&self, owner: UserId, tier: Tier, draft: FirearmDraft) -> Result<Firearm> {
        let txn = self.db.begin_write()?;
        let firearm = {
            let mut table = txn.open_table(FIREARMS)?;
            let existing = owned_firearms(&table, owner)?;
            if !tier.allows(existing.len()) {
                return Err(ArsenalError::LimitReached {
                    tier,
                    limit: tier.firearm_limit().unwrap_or(existing.len()),
                });
            }
            if serial_taken(&existing, &draft, None) {
                return Err(ArsenalError::DuplicateSerial);
            }

            let id = next_id(&txn, NEXT_FIREARM)?;
            let now = Utc::now();
            let firearm = Firearm {
                id: FirearmId(id),
                owner,
                name: draft.name,
                manufacturer: draft.manufacturer,
                model: draft.model,
                caliber: draft.caliber,
                kind: draft.kind,
                serial_number: draft.serial_number,
                purchased_on: draft.purchased_on,
                price_cents: draft.price_cents,
                notes: draft.notes,
                created_at: now,
                updated_at: now,
            };
            table.insert((owner.0, id), encode(&firearm)?.as_slice())?;
            firearm
        };
        txn.commit()?;
        debug!(owner = %owner, firearm = %firearm.id, "firearm added");
        Ok(firearm)
    }

    pub fn update_firearm(&self, owner: UserId, id: FirearmId, draft: FirearmDraft) -> Result<Firearm> {
        let txn = self.db.begin_write()?;
        let firearm = {
            let mut table = txn.open_table(FIREARMS)?;
            let existing = owned_firearms(&table, owner)?;
            let Some(mut firearm) = existing.iter().find(|f| f.id == id).cloned() else {
                return Err(ArsenalError::not_found("firearm"));
            };
            if serial_taken(&existing, &draft, Some(id)) {
                return Err(ArsenalError::DuplicateSerial);
            }
            firearm.apply(draft, Utc::now());
            table.insert((owner.0, id.0), encode(&firearm)?.as_slice())?;
            firearm
        };
        txn.commit()?;
        Ok(firearm)
    }

    /// Returns whether anything was deleted.
    pub fn delete_firearm(&self, owner: UserId, id: FirearmId) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = txn.open_table(FIREARMS)?.remove((owner.0, id.0))?.is_some();
        txn.commit()?;
        Ok(removed)
    }

    // =========================================================================
    // SESSIONS
    // =========================================================================

    pub fn insert_session(&self, session: &Session) -> Result<()> {
        let txn = self.db.begin_write()?;
        txn.open_table(SESSIONS)?
            .insert(session.id.as_str(), encode(session)?.as_slice())?;
        txn.commit()?;
        Ok(())
    }

    pub fn session(&self, id: &str) -> Result<Option<Session>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SESSIONS)?;
        let session = match table.get(id)? {
            Some(value) => Some(decode(value.value())?),
            None => None,
        };
        Ok(session)
    }

    pub fn delete_session(&self, id: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = txn.open_table(SESSIONS)?.remove(id)?.is_some();
        txn.commit()?;
        Ok(removed)
    }

    /// Delete every session of `user` except `keep`. Returns how many went.
    pub fn delete_sessions_for(&self, user: UserId, keep: Option<&str>) -> Result<usize> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(SESSIONS)?;
            let doomed = string_keyed_where(&table, |s: &Session| {
                s.user == user && Some(s.id.as_str()) != keep
            })?;
            for (key, _) in &doomed {
                table.remove(key.as_str())?;
            }
            doomed.len()
        };
        txn.commit()?;
        Ok(removed)
    }

    /// Delete sessions that expired before `now`.
    pub fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(SESSIONS)?;
            let expired = string_keyed_where(&table, |s: &Session| s.is_expired(now))?;
            for (key, _) in &expired {
                table.remove(key.as_str())?;
            }
            expired.len()
        };
        txn.commit()?;
        Ok(removed)
    }

    // =========================================================================
    // EMAIL VERIFICATION
    // =========================================================================

    pub fn insert_verification(&self, token: &str, verification: &Verification) -> Result<()> {
        let txn = self.db.begin_write()?;
        txn.open_table(VERIFICATIONS)?
            .insert(token, encode(verification)?.as_slice())?;
        txn.commit()?;
        Ok(())
    }

    /// Remove and return a verification. Tokens are single use.
    pub fn take_verification(&self, token: &str) -> Result<Option<Verification>> {
        let txn = self.db.begin_write()?;
        let verification = {
            let mut table = txn.open_table(VERIFICATIONS)?;
            let removed = table.remove(token)?;
            match removed {
                Some(value) => Some(decode(value.value())?),
                None => None,
            }
        };
        txn.commit()?;
        Ok(verification)
    }

    /// Delete verification tokens that expired before `now`.
    pub fn purge_expired_verifications(&self, now: DateTime<Utc>) -> Result<usize> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(VERIFICATIONS)?;
            let expired = string_keyed_where(&table, |v: &Verification| v.is_expired(now))?;
            for (key, _) in &expired {
                table.remove(key.as_str())?;
            }
            expired.len()
        };
        txn.commit()?;
        Ok(removed)
    }

    // =========================================================================
    // FEATURE FLAGS
    // =========================================================================

    /// Insert the well-known flags that are not stored yet.
    pub fn seed_default_flags(&self) -> Result<usize> {
        let txn = self.db.begin_write()?;
        let mut inserted = 0;
        {
            let mut table = txn.open_table(FLAGS)?;
            for (key, enabled, description) in flags::WELL_KNOWN {
                if table.get(key)?.is_none() {
                    let flag = FeatureFlag::new(key, description, enabled);
                    table.insert(key, encode(&flag)?.as_slice())?;
                    inserted += 1;
                }
            }
        }
        txn.commit()?;
        Ok(inserted)
    }

    pub fn put_flag(&self, flag: &FeatureFlag) -> Result<()> {
        let txn = self.db.begin_write()?;
        txn.open_table(FLAGS)?
            .insert(flag.key.as_str(), encode(flag)?.as_slice())?;
        txn.commit()?;
        info!(flag = %flag.key, enabled = flag.enabled, "feature flag saved");
        Ok(())
    }

    pub fn flag(&self, key: &str) -> Result<Option<FeatureFlag>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(FLAGS)?;
        let flag = match table.get(key)? {
            Some(value) => Some(decode(value.value())?),
            None => None,
        };
        Ok(flag)
    }

    /// All stored flags, ordered by key.
    pub fn flags(&self) -> Result<Vec<FeatureFlag>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(FLAGS)?;
        Ok(string_keyed_where(&table, |_: &FeatureFlag| true)?
            .into_iter()
            .map(|(_, flag)| flag)
            .collect())
    }

    /// Whether a flag is on. Unstored flags read as their well-known default.
    pub fn flag_enabled(&self, key: &str) -> Result<bool> {
        Ok(self
            .flag(key)?
            .map(|f| f.enabled)
            .unwrap_or_else(|| flags::default_for(key)))
    }

    /// Set a flag's state. Well-known flags are created on demand; any other
    /// missing key is `NotFound`.
    pub fn set_flag_enabled(&self, key: &str, enabled: bool) -> Result<FeatureFlag> {
        let mut flag = match self.flag(key)? {
            Some(flag) => flag,
            None => flags::WELL_KNOWN
                .iter()
                .find(|(k, _, _)| *k == key)
                .map(|(k, _, description)| FeatureFlag::new(*k, *description, enabled))
                .ok_or(ArsenalError::not_found("feature flag"))?,
        };
        flag.enabled = enabled;
        flag.updated_at = Utc::now();
        self.put_flag(&flag)?;
        Ok(flag)
    }

    // =========================================================================
    // BILLING
    // =========================================================================

    /// Move a user to `tier`, recording the payment that paid for it in the
    /// same transaction. Fails with `LimitReached` if the user's arsenal does
    /// not fit the new tier.
    pub fn change_tier(
        &self,
        user_id: UserId,
        tier: Tier,
        renews_at: Option<DateTime<Utc>>,
        payment: Option<(u64, String)>,
    ) -> Result<(User, Option<Payment>)> {
        let txn = self.db.begin_write()?;
        let result = {
            let mut users = txn.open_table(USERS)?;
            let mut user: User = match users.get(user_id.0)? {
                Some(value) => decode(value.value())?,
                None => return Err(ArsenalError::not_found("user")),
            };

            let count = {
                let firearms = txn.open_table(FIREARMS)?;
                firearms.range(firearm_range(user_id))?.count()
            };
            if !tier.fits(count) {
                return Err(ArsenalError::LimitReached {
                    tier,
                    limit: tier.firearm_limit().unwrap_or(count),
                });
            }

            let payment = match payment {
                Some((amount_cents, reference)) => {
                    let id = next_id(&txn, NEXT_PAYMENT)?;
                    let payment = Payment {
                        id: PaymentId(id),
                        user: user_id,
                        email: user.email.clone(),
                        tier,
                        amount_cents,
                        reference,
                        paid_at: Utc::now(),
                    };
                    txn.open_table(PAYMENTS)?
                        .insert(id, encode(&payment)?.as_slice())?;
                    Some(payment)
                }
                None => None,
            };

            user.tier = tier;
            user.renews_at = renews_at;
            users.insert(user_id.0, encode(&user)?.as_slice())?;
            (user, payment)
        };
        txn.commit()?;
        info!(user = %user_id, tier = tier.as_str(), "tier changed");
        Ok(result)
    }

    /// Every payment, newest first.
    pub fn payments(&self) -> Result<Vec<Payment>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(PAYMENTS)?;
        let mut payments = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            payments.push(decode::<Payment>(value.value())?);
        }
        payments.reverse();
        Ok(payments)
    }

    /// One user's payments, newest first.
    pub fn payments_for(&self, user: UserId) -> Result<Vec<Payment>> {
        Ok(self
            .payments()?
            .into_iter()
            .filter(|p| p.user == user)
            .collect())
    }

    // =========================================================================
    // STATUS
    // =========================================================================

    pub fn stats(&self) -> Result<StoreStats> {
        let txn = self.db.begin_read()?;
        Ok(StoreStats {
            users: txn.open_table(USERS)?.iter()?.count(),
            firearms: txn.open_table(FIREARMS)?.iter()?.count(),
            sessions: txn.open_table(SESSIONS)?.iter()?.count(),
            payments: txn.open_table(PAYMENTS)?.iter()?.count(),
            flags: txn.open_table(FLAGS)?.iter()?.count(),
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firearm::FirearmKind;
    use crate::types::Role;
    use tempfile::TempDir;

    fn store() -> (TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("arsenal.redb")).unwrap();
        (dir, store)
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.into(),
            display_name: "Test".into(),
            password_hash: "$argon2id$placeholder".into(),
            role: Role::Member,
            email_verified: false,
        }
    }

    fn draft(name: &str, serial: Option<&str>) -> FirearmDraft {
        FirearmDraft {
            name: name.into(),
            manufacturer: "Ruger".into(),
            model: Some("10/22".into()),
            caliber: ".22 LR".into(),
            kind: FirearmKind::Rifle,
            serial_number: serial.map(str::to_string),
            purchased_on: None,
            price_cents: Some(32_900),
            notes: None,
        }
    }

    #[test]
    fn user_ids_increment_and_email_is_unique() {
        let (_dir, store) = store();
        let a = store.create_user(new_user("A@Example.com")).unwrap();
        let b = store.create_user(new_user("b@example.com")).unwrap();
        assert_eq!(a.id, UserId(1));
        assert_eq!(b.id, UserId(2));
        assert_eq!(a.email, "a@example.com");

        let dup = store.create_user(new_user("a@EXAMPLE.com"));
        assert!(matches!(dup, Err(ArsenalError::DuplicateEmail)));

        let found = store.user_by_email(" a@example.COM ").unwrap().unwrap();
        assert_eq!(found.id, a.id);
    }

    #[test]
    fn email_change_moves_index() {
        let (_dir, store) = store();
        let a = store.create_user(new_user("a@example.com")).unwrap();
        store.create_user(new_user("b@example.com")).unwrap();

        let taken = store.modify_user(a.id, |user| {
            user.email = "b@example.com".into();
            Ok(())
        });
        assert!(matches!(taken, Err(ArsenalError::DuplicateEmail)));
        assert!(store.user_by_email("a@example.com").unwrap().is_some());

        store
            .modify_user(a.id, |user| {
                user.email = "c@example.com".into();
                Ok(())
            })
            .unwrap();
        assert!(store.user_by_email("a@example.com").unwrap().is_none());
        assert_eq!(store.user_by_email("c@example.com").unwrap().unwrap().id, a.id);
    }

    #[test]
    fn firearms_are_scoped_to_owner() {
        let (_dir, store) = store();
        let a = store.create_user(new_user("a@example.com")).unwrap();
        let b = store.create_user(new_user("b@example.com")).unwrap();

        let rifle = store.create_firearm(a.id, Tier::Free, draft("Rifle", None)).unwrap();
        store.create_firearm(b.id, Tier::Free, draft("Other", None)).unwrap();

        assert_eq!(store.firearms_for(a.id).unwrap().len(), 1);
        assert!(store.firearm(b.id, rifle.id).unwrap().is_none());
        assert!(!store.delete_firearm(b.id, rifle.id).unwrap());
        assert!(store.delete_firearm(a.id, rifle.id).unwrap());
        assert_eq!(store.count_firearms(a.id).unwrap(), 0);
    }

    #[test]
    fn tier_limit_enforced_on_create() {
        let (_dir, store) = store();
        let a = store.create_user(new_user("a@example.com")).unwrap();
        for i in 0..10 {
            store
                .create_firearm(a.id, Tier::Free, draft(&format!("#{i}"), None))
                .unwrap();
        }
        let over = store.create_firearm(a.id, Tier::Free, draft("one too many", None));
        assert!(matches!(over, Err(ArsenalError::LimitReached { limit: 10, .. })));
        assert!(store.create_firearm(a.id, Tier::Marksman, draft("ok", None)).is_ok());
    }

    #[test]
    fn serial_unique_per_owner_case_insensitive() {
        let (_dir, store) = store();
        let a = store.create_user(new_user("a@example.com")).unwrap();
        let b = store.create_user(new_user("b@example.com")).unwrap();

        let first = store.create_firearm(a.id, Tier::Free, draft("One", Some("SN-1"))).unwrap();
        let dup = store.create_firearm(a.id, Tier::Free, draft("Two", Some("sn-1")));
        assert!(matches!(dup, Err(ArsenalError::DuplicateSerial)));

        // Another owner may hold the same serial.
        assert!(store.create_firearm(b.id, Tier::Free, draft("Two", Some("SN-1"))).is_ok());

        // Re-saving a record with its own serial is fine.
        let updated = store
            .update_firearm(a.id, first.id, draft("One renamed", Some("SN-1")))
            .unwrap();
        assert_eq!(updated.name, "One renamed");
        assert!(updated.updated_at >= first.updated_at);
    }

    #[test]
    fn delete_user_cascades_but_keeps_payments() {
        let (_dir, store) = store();
        let a = store.create_user(new_user("a@example.com")).unwrap();
        store.create_firearm(a.id, Tier::Free, draft("Rifle", None)).unwrap();
        store.insert_session(&Session::new(a.id, chrono::Duration::hours(1))).unwrap();
        store
            .insert_verification("tok", &Verification::for_user(&a, Utc::now()))
            .unwrap();
        store
            .change_tier(a.id, Tier::Marksman, None, Some((499, "ref".into())))
            .unwrap();

        store.delete_user(a.id).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.users, 0);
        assert_eq!(stats.firearms, 0);
        assert_eq!(stats.sessions, 0);
        assert_eq!(stats.payments, 1);
        assert!(store.take_verification("tok").unwrap().is_none());
        assert!(store.user_by_email("a@example.com").unwrap().is_none());
    }

    #[test]
    fn verification_tokens_are_single_use() {
        let (_dir, store) = store();
        let a = store.create_user(new_user("a@example.com")).unwrap();
        store
            .insert_verification("tok", &Verification::for_user(&a, Utc::now()))
            .unwrap();
        assert!(store.take_verification("tok").unwrap().is_some());
        assert!(store.take_verification("tok").unwrap().is_none());
    }

    #[test]
    fn expired_verifications_purged() {
        let (_dir, store) = store();
        let a = store.create_user(new_user("a@example.com")).unwrap();
        let long_ago = Utc::now() - chrono::Duration::days(30);
        for i in 0..5 {
            store
                .insert_verification(&format!("old-{i}"), &Verification::for_user(&a, long_ago))
                .unwrap();
        }
        store
            .insert_verification("fresh", &Verification::for_user(&a, Utc::now()))
            .unwrap();

        assert_eq!(store.purge_expired_verifications(Utc::now()).unwrap(), 5);
        assert!(store.take_verification("old-0").unwrap().is_none());
        assert!(store.take_verification("fresh").unwrap().is_some());
    }

    #[test]
    fn modify_user_keeps_concurrent_tier_change() {
        let (_dir, store) = store();
        let a = store.create_user(new_user("a@example.com")).unwrap();
        store
            .change_tier(a.id, Tier::Armory, None, Some((1499, "r1".into())))
            .unwrap();

        // `a` is now stale; only the display name is written.
        let user = store
            .modify_user(a.id, |user| {
                user.display_name = "Renamed".into();
                Ok(())
            })
            .unwrap();
        assert_eq!(user.tier, Tier::Armory);
        assert_eq!(a.tier, Tier::Free);

        let stored = store.user(a.id).unwrap().unwrap();
        assert_eq!(stored.tier, Tier::Armory);
        assert_eq!(stored.display_name, "Renamed");
        assert_eq!(store.payments_for(a.id).unwrap().len(), 1);
    }

    #[test]
    fn modify_user_error_leaves_record_untouched() {
        let (_dir, store) = store();
        let a = store.create_user(new_user("a@example.com")).unwrap();
        let result = store.modify_user(a.id, |user| {
            user.display_name = "Half done".into();
            Err(ArsenalError::not_found("firearm"))
        });
        assert!(matches!(result, Err(ArsenalError::NotFound { .. })));
        assert_eq!(store.user(a.id).unwrap().unwrap().display_name, "Test");
        assert!(matches!(
            store.modify_user(UserId(999), |_| Ok(())),
            Err(ArsenalError::NotFound { .. })
        ));
    }

    #[test]
    fn downgrade_refused_when_arsenal_too_large() {
        let (_dir, store) = store();
        let a = store.create_user(new_user("a@example.com")).unwrap();
        for i in 0..11 {
            store
                .create_firearm(a.id, Tier::Marksman, draft(&format!("#{i}"), None))
                .unwrap();
        }
        let refused = store.change_tier(a.id, Tier::Free, None, None);
        assert!(matches!(refused, Err(ArsenalError::LimitReached { .. })));
        assert_eq!(store.user(a.id).unwrap().unwrap().tier, Tier::Free);

        let (user, payment) = store
            .change_tier(a.id, Tier::Armory, None, Some((1499, "r1".into())))
            .unwrap();
        assert_eq!(user.tier, Tier::Armory);
        assert_eq!(payment.map(|p| p.amount_cents), Some(1499));
        assert_eq!(store.payments_for(a.id).unwrap().len(), 1);
    }

    #[test]
    fn flags_default_and_toggle() {
        let (_dir, store) = store();
        assert!(store.flag_enabled(flags::REGISTRATION).unwrap());
        assert!(!store.flag_enabled(flags::EXPORT).unwrap());

        assert_eq!(store.seed_default_flags().unwrap(), 3);
        assert_eq!(store.seed_default_flags().unwrap(), 0);

        store.set_flag_enabled(flags::EXPORT, true).unwrap();
        assert!(store.flag_enabled(flags::EXPORT).unwrap());

        assert!(matches!(
            store.set_flag_enabled("unknown", true),
            Err(ArsenalError::NotFound { .. })
        ));
        let keys: Vec<String> = store.flags().unwrap().into_iter().map(|f| f.key).collect();
        assert_eq!(keys, vec!["billing", "export", "registration"]);
    }

    #[test]
    fn expired_sessions_purged() {
        let (_dir, store) = store();
        let a = store.create_user(new_user("a@example.com")).unwrap();
        let live = Session::new(a.id, chrono::Duration::hours(1));
        let dead = Session::new(a.id, chrono::Duration::hours(-1));
        store.insert_session(&live).unwrap();
        store.insert_session(&dead).unwrap();

        assert_eq!(store.purge_expired_sessions(Utc::now()).unwrap(), 1);
        assert!(store.session(&live.id).unwrap().is_some());
        assert!(store.session(&dead.id).unwrap().is_none());

        assert_eq!(store.delete_sessions_for(a.id, Some(live.id.as_str())).unwrap(), 0);
        assert_eq!(store.delete_sessions_for(a.id, None).unwrap(), 1);
    }
}
