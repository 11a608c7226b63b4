//! Outgoing email.
//!
//! Delivery sits behind the [`Mailer`] trait. The server ships with
//! [`LogMailer`], which writes messages to the log.

use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail transport failed: {0}")]
    Transport(String),
}

pub trait Mailer: Send + Sync {
    fn send(&self, email: Email) -> Result<(), MailError>;
}

#[derive(Debug, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, email: Email) -> Result<(), MailError> {
        info!(to = %email.to, subject = %email.subject, "email queued");
        debug!(body = %email.body, "email body");
        Ok(())
    }
}

/// The verification message for `token`.
pub fn verification_email(public_url: &str, to: &str, token: &str) -> Email {
    Email {
        to: to.to_string(),
        subject: "Confirm your email address".to_string(),
        body: format!(
            "Open this link within 48 hours to confirm your address:\n\n{}/verify/{}\n",
            public_url.trim_end_matches('/'),
            token
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_link() {
        let email = verification_email("http://localhost:8080/", "a@b.co", "tok");
        assert!(email.body.contains("http://localhost:8080/verify/tok"));
        assert_eq!(email.to, "a@b.co");
    }
}
