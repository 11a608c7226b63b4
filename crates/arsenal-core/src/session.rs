//! # Sessions
//!
//! Login sessions persisted in the store and fronted by an LRU cache.
//!
//! A session id is an opaque random token carried in a cookie. Each session
//! also carries its own CSRF token, which every state-changing form must
//! echo back.

use crate::cache::LruCache;
use crate::error::Result;
use crate::storage::Store;
use crate::token;
use crate::types::UserId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// A logged-in browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user: UserId,
    pub csrf_token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// A fresh session for `user` lasting `ttl`.
    #[must_use]
    pub fn new(user: UserId, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: token::generate(),
            user,
            csrf_token: token::generate(),
            created_at: now,
            expires_at: now + ttl,
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Constant-time check of a submitted CSRF token.
    #[must_use]
    pub fn csrf_matches(&self, submitted: &str) -> bool {
        token::matches(&self.csrf_token, submitted)
    }
}

/// Session id → session.
pub type SessionCache = LruCache<String, Session>;

/// Starts, resolves and ends sessions.
#[derive(Debug)]
pub struct SessionManager {
    store: Arc<Store>,
    cache: Mutex<SessionCache>,
    ttl: Duration,
}

impl SessionManager {
    #[must_use]
    pub fn new(store: Arc<Store>, ttl: Duration, cache_size: usize) -> Self {
        Self {
            store,
            cache: Mutex::new(SessionCache::new(cache_size)),
            ttl,
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn cache(&self) -> MutexGuard<'_, SessionCache> {
        // A poisoned cache is still consistent.
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create and persist a session for `user`.
    pub fn start(&self, user: UserId) -> Result<Session> {
        let session = Session::new(user, self.ttl);
        self.store.insert_session(&session)?;
        self.cache().insert(session.id.clone(), session.clone());
        debug!(user = %user, "session started");
        Ok(session)
    }

    /// Find a live session by id. Expired sessions are deleted on sight.
    pub fn resolve(&self, id: &str) -> Result<Option<Session>> {
        if !token::looks_valid(id) {
            return Ok(None);
        }

        let cached = self.cache().get(&id.to_string());
        let session = match cached {
            Some(session) => Some(session),
            None => {
                let stored = self.store.session(id)?;
                if let Some(session) = &stored {
                    self.cache().insert(session.id.clone(), session.clone());
                }
                stored
            }
        };

        match session {
            Some(session) if session.is_expired(Utc::now()) => {
                self.end(id)?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// End one session.
    pub fn end(&self, id: &str) -> Result<()> {
        self.cache().remove(&id.to_string());
        self.store.delete_session(id)?;
        Ok(())
    }

    /// End every session of `user` except `keep`.
    pub fn end_all_for(&self, user: UserId, keep: Option<&str>) -> Result<usize> {
        self.cache()
            .retain(|id, s| s.user != user || Some(id.as_str()) == keep);
        self.store.delete_sessions_for(user, keep)
    }

    /// Drop expired sessions from the cache and the store.
    pub fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now();
        self.cache().retain(|_, s| !s.is_expired(now));
        self.store.purge_expired_sessions(now)
    }

    #[must_use]
    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.cache().stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use crate::user::NewUser;
    use tempfile::TempDir;

    fn manager(ttl: Duration) -> (TempDir, Arc<Store>, SessionManager, UserId) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(&dir.path().join("s.redb")).unwrap());
        let user = store
            .create_user(NewUser {
                email: "s@example.com".into(),
                display_name: "S".into(),
                password_hash: String::new(),
                role: Role::Member,
                email_verified: true,
            })
            .unwrap();
        let manager = SessionManager::new(store.clone(), ttl, 8);
        (dir, store, manager, user.id)
    }

    #[test]
    fn start_then_resolve_hits_cache() {
        let (_dir, _store, manager, user) = manager(Duration::hours(1));
        let session = manager.start(user).unwrap();

        let resolved = manager.resolve(&session.id).unwrap().unwrap();
        assert_eq!(resolved, session);
        assert_eq!(manager.cache_stats().hits, 1);
    }

    #[test]
    fn resolve_falls_back_to_store() {
        let (_dir, store, manager, user) = manager(Duration::hours(1));
        let session = Session::new(user, Duration::hours(1));
        store.insert_session(&session).unwrap();

        assert_eq!(manager.resolve(&session.id).unwrap(), Some(session));
    }

    #[test]
    fn expired_session_is_removed() {
        let (_dir, store, manager, user) = manager(Duration::seconds(-1));
        let session = manager.start(user).unwrap();

        assert!(manager.resolve(&session.id).unwrap().is_none());
        assert!(store.session(&session.id).unwrap().is_none());
    }

    #[test]
    fn malformed_ids_never_reach_storage() {
        let (_dir, _store, manager, _user) = manager(Duration::hours(1));
        assert!(manager.resolve("../../etc/passwd").unwrap().is_none());
        assert_eq!(manager.cache_stats().misses, 0);
    }

    #[test]
    fn end_all_keeps_current() {
        let (_dir, _store, manager, user) = manager(Duration::hours(1));
        let keep = manager.start(user).unwrap();
        let other = manager.start(user).unwrap();

        assert_eq!(manager.end_all_for(user, Some(keep.id.as_str())).unwrap(), 1);
        assert!(manager.resolve(&keep.id).unwrap().is_some());
        assert!(manager.resolve(&other.id).unwrap().is_none());
    }

    #[test]
    fn csrf_check() {
        let session = Session::new(UserId(1), Duration::hours(1));
        assert!(session.csrf_matches(&session.csrf_token.clone()));
        assert!(!session.csrf_matches("forged"));
    }
}
