//! Cookie header parsing and `Set-Cookie` construction.

use axum::http::{HeaderMap, HeaderValue, header::COOKIE};

pub const SESSION_COOKIE: &str = "arsenal_session";
pub const FLASH_COOKIE: &str = "arsenal_flash";

/// Value of the first cookie called `name` in the request headers.
pub fn get<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"'))
}

/// Attributes shared by every cookie the server sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct CookieOptions {
    pub secure: bool,
}

impl CookieOptions {
    /// `Set-Cookie` value for a cookie living `max_age_secs`.
    pub fn set(self, name: &str, value: &str, max_age_secs: i64) -> HeaderValue {
        let mut cookie = format!(
            "{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            max_age_secs.max(0)
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""))
    }

    /// `Set-Cookie` value that removes a cookie.
    pub fn clear(self, name: &str) -> HeaderValue {
        self.set(name, "", 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_cookie_among_many() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("a=1; arsenal_session=abc; b=2"));
        headers.append(COOKIE, HeaderValue::from_static("arsenal_flash=\"xyz\""));

        assert_eq!(get(&headers, SESSION_COOKIE), Some("abc"));
        assert_eq!(get(&headers, FLASH_COOKIE), Some("xyz"));
        assert_eq!(get(&headers, "missing"), None);
    }

    #[test]
    fn set_cookie_attributes() {
        let value = CookieOptions { secure: true }.set(SESSION_COOKIE, "abc", 60);
        let text = value.to_str().unwrap();
        assert!(text.starts_with("arsenal_session=abc;"));
        assert!(text.contains("HttpOnly"));
        assert!(text.contains("SameSite=Lax"));
        assert!(text.contains("Max-Age=60"));
        assert!(text.ends_with("; Secure"));

        let cleared = CookieOptions { secure: false }.clear(FLASH_COOKIE);
        assert!(cleared.to_str().unwrap().contains("Max-Age=0"));
    }
}
