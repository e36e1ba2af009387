//! Newsletter confirmation tokens.
//!
//! `Plain` tokens are the email address in standard base64. Anyone can mint
//! one for any address, so they prove nothing; they exist because the links
//! already sent out have this shape. `Signed` tokens carry an expiry and an
//! HMAC-SHA256 tag over `email|expiry`:
//!
//! ```text
//! base64url(email) "." expiry_unix_secs "." hex(hmac)
//! ```

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use thiserror::Error;

use crate::validator::is_valid_email;

#[derive(Clone, PartialEq, Eq)]
pub enum TokenScheme {
    Plain,
    Signed { secret: String, ttl_secs: i64 },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature does not match")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("signing key rejected")]
    InvalidKey,
    #[error("token lifetime out of range")]
    LifetimeOutOfRange,
}

impl TokenScheme {
    pub fn issue(&self, email: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        match self {
            Self::Plain => Ok(STANDARD.encode(email)),
            Self::Signed { secret, ttl_secs } => {
                let expires = now
                    .timestamp()
                    .checked_add(*ttl_secs)
                    .ok_or(TokenError::LifetimeOutOfRange)?;
                let tag = sign(secret, email, expires)?;
                Ok(format!(
                    "{}.{}.{}",
                    URL_SAFE_NO_PAD.encode(email),
                    expires,
                    hex::encode(tag)
                ))
            }
        }
    }

    /// Returns the email address the token was issued for.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        match self {
            Self::Plain => {
                let bytes = STANDARD.decode(token).map_err(|_| TokenError::Malformed)?;
                let email = String::from_utf8(bytes).map_err(|_| TokenError::Malformed)?;
                if !is_valid_email(&email) {
                    return Err(TokenError::Malformed);
                }
                Ok(email)
            }
            Self::Signed { secret, .. } => {
                let mut parts = token.split('.');
                let (Some(encoded), Some(expires), Some(tag_hex), None) =
                    (parts.next(), parts.next(), parts.next(), parts.next())
                else {
                    return Err(TokenError::Malformed);
                };

                let email = URL_SAFE_NO_PAD
                    .decode(encoded)
                    .ok()
                    .and_then(|b| String::from_utf8(b).ok())
                    .ok_or(TokenError::Malformed)?;
                let expires: i64 = expires.parse().map_err(|_| TokenError::Malformed)?;
                let given = hex::decode(tag_hex).map_err(|_| TokenError::Malformed)?;

                let expected = sign(secret, &email, expires)?;
                if given.len() != expected.len() || !constant_time_eq(&expected, &given) {
                    return Err(TokenError::BadSignature);
                }
                if now.timestamp() > expires {
                    return Err(TokenError::Expired);
                }
                Ok(email)
            }
        }
    }
}

fn sign(secret: &str, email: &str, expires: i64) -> Result<Vec<u8>, TokenError> {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| TokenError::InvalidKey)?;
    mac.update(email.as_bytes());
    mac.update(b"|");
    mac.update(expires.to_string().as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

impl fmt::Debug for TokenScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => f.write_str("Plain"),
            Self::Signed { ttl_secs, .. } => f
                .debug_struct("Signed")
                .field("secret", &"***")
                .field("ttl_secs", ttl_secs)
                .finish(),
        }
    }
}
