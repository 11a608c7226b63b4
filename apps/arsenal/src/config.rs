//! Server configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_SESSION_TTL_HOURS: u32 = 72;
pub const DEFAULT_SESSION_CACHE: usize = 1024;
pub const DEFAULT_LOGIN_ATTEMPTS_PER_MINUTE: u32 = 5;

/// Runtime settings for `arsenal serve`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub db_path: PathBuf,
    pub session_ttl_hours: u32,
    pub session_cache_size: usize,
    /// Add `Secure` to cookies. Enable behind HTTPS.
    pub secure_cookies: bool,
    pub login_attempts_per_minute: u32,
    /// Absolute origin used in emailed links, e.g. `https://arsenal.example`.
    pub public_url: String,
}

impl ServerConfig {
    /// Defaults for a database at `db_path`.
    #[must_use]
    pub fn new(db_path: PathBuf) -> Self {
        let bind: SocketAddr = DEFAULT_BIND
            .parse()
            .unwrap_or(SocketAddr::from(([127, 0, 0, 1], 8080)));
        Self {
            bind,
            db_path,
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            session_cache_size: DEFAULT_SESSION_CACHE,
            secure_cookies: false,
            login_attempts_per_minute: DEFAULT_LOGIN_ATTEMPTS_PER_MINUTE,
            public_url: format!("http://{bind}"),
        }
    }

    #[must_use]
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.session_ttl_hours.max(1)))
    }
}
