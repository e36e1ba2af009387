//! Runtime configuration, resolved once from the environment at startup.

use crate::token::TokenScheme;
use anyhow::{Context, Result};
use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3146";
const DEFAULT_EMAIL_FROM: &str = "noreply@flightservice365.com";
const DEFAULT_EMAIL_TO: &str = "contact@flightservice365.com";
const DEFAULT_SITE_URL: &str = "https://flightservice365.com";
const DEFAULT_MAX_SUBMISSIONS: usize = 5;
const DEFAULT_WINDOW_SECS: i64 = 60 * 60;
const DEFAULT_MAX_IDENTITIES: usize = 10_000;
const DEFAULT_DISPATCH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_TOKEN_TTL_SECS: i64 = 48 * 60 * 60;
const MAX_WINDOW_SECS: i64 = 7 * 24 * 60 * 60;
const MAX_TOKEN_TTL_SECS: i64 = 90 * 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct FormsConfig {
    pub bind_addr: SocketAddr,
    pub email_from: String,
    pub email_to: String,
    /// Public site origin used to build newsletter confirmation links.
    pub site_url: String,
    pub transport: TransportConfig,
    pub rate_limit: RateLimitConfig,
    pub dispatch_timeout: Duration,
    pub token: TokenScheme,
}

/// Outbound mail transport. Exactly one is chosen at startup.
#[derive(Clone, PartialEq, Eq)]
pub enum TransportConfig {
    SendGrid { api_key: String },
    Relay { url: String, token: Option<String> },
    /// Development fallback: messages are written to the log.
    Log,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_submissions: usize,
    pub window_secs: i64,
    /// Map size above which fully expired identities are dropped.
    pub max_identities: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_submissions: DEFAULT_MAX_SUBMISSIONS,
            window_secs: DEFAULT_WINDOW_SECS,
            max_identities: DEFAULT_MAX_IDENTITIES,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.window_secs)
    }
}

impl Default for FormsConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3146)),
            email_from: DEFAULT_EMAIL_FROM.to_string(),
            email_to: DEFAULT_EMAIL_TO.to_string(),
            site_url: DEFAULT_SITE_URL.to_string(),
            transport: TransportConfig::Log,
            rate_limit: RateLimitConfig::default(),
            dispatch_timeout: Duration::from_secs(DEFAULT_DISPATCH_TIMEOUT_SECS),
            token: TokenScheme::Plain,
        }
    }
}

impl FormsConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = env_parse("BIND_ADDR", DEFAULT_BIND_ADDR.parse::<SocketAddr>()?)?;

        let site_url = env_nonempty("URL").unwrap_or_else(|| DEFAULT_SITE_URL.to_string());
        Url::parse(&site_url).with_context(|| format!("URL is not a valid URL: {}", site_url))?;

        let window_secs = bounded_secs(
            "RATE_LIMIT_WINDOW_SECS",
            env_parse("RATE_LIMIT_WINDOW_SECS", DEFAULT_WINDOW_SECS)?,
            MAX_WINDOW_SECS,
        )?;

        let token = match env_nonempty("NEWSLETTER_TOKEN_SECRET") {
            Some(secret) => TokenScheme::Signed {
                secret,
                ttl_secs: bounded_secs(
                    "NEWSLETTER_TOKEN_TTL_SECS",
                    env_parse("NEWSLETTER_TOKEN_TTL_SECS", DEFAULT_TOKEN_TTL_SECS)?,
                    MAX_TOKEN_TTL_SECS,
                )?,
            },
            None => TokenScheme::Plain,
        };

        Ok(Self {
            bind_addr,
            email_from: env_nonempty("EMAIL_FROM").unwrap_or_else(|| DEFAULT_EMAIL_FROM.to_string()),
            email_to: env_nonempty("EMAIL_TO").unwrap_or_else(|| DEFAULT_EMAIL_TO.to_string()),
            site_url: site_url.trim_end_matches('/').to_string(),
            transport: TransportConfig::from_env(),
            rate_limit: RateLimitConfig {
                max_submissions: env_parse("RATE_LIMIT_MAX", DEFAULT_MAX_SUBMISSIONS)?,
                window_secs,
                max_identities: DEFAULT_MAX_IDENTITIES,
            },
            dispatch_timeout: Duration::from_secs(env_parse(
                "DISPATCH_TIMEOUT_SECS",
                DEFAULT_DISPATCH_TIMEOUT_SECS,
            )?),
            token,
        })
    }
}

impl TransportConfig {
    /// SendGrid wins over the relay, which wins over the log transport.
    pub fn from_env() -> Self {
        if let Some(api_key) = env_nonempty("SENDGRID_API_KEY") {
            return Self::SendGrid { api_key };
        }
        if let Some(url) = env_nonempty("MAIL_RELAY_URL") {
            return Self::Relay {
                url,
                token: env_nonempty("MAIL_RELAY_TOKEN"),
            };
        }
        Self::Log
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SendGrid { .. } => "sendgrid",
            Self::Relay { .. } => "relay",
            Self::Log => "log",
        }
    }
}

// Keeps credentials out of startup logs.
impl fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SendGrid { .. } => f.debug_struct("SendGrid").field("api_key", &"***").finish(),
            Self::Relay { url, token } => f
                .debug_struct("Relay")
                .field("url", url)
                .field("token", &token.as_ref().map(|_| "***"))
                .finish(),
            Self::Log => f.write_str("Log"),
        }
    }
}

fn bounded_secs(key: &str, value: i64, max: i64) -> Result<i64> {
    if value <= 0 || value > max {
        anyhow::bail!("{} must be between 1 and {} seconds, got {}", key, max, value);
    }
    Ok(value)
}

fn env_nonempty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env_nonempty(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_published_limits() {
        let config = FormsConfig::default();
        assert_eq!(config.rate_limit.max_submissions, 5);
        assert_eq!(config.rate_limit.window(), chrono::Duration::hours(1));
        assert_eq!(config.transport, TransportConfig::Log);
        assert_eq!(config.email_to, "contact@flightservice365.com");
    }

    #[test]
    fn transport_debug_hides_credentials() {
        let sendgrid = TransportConfig::SendGrid {
            api_key: "SG.secret".to_string(),
        };
        let relay = TransportConfig::Relay {
            url: "https://relay.example.com/send".to_string(),
            token: Some("relay-secret".to_string()),
        };
        assert!(!format!("{:?}", sendgrid).contains("SG.secret"));
        let rendered = format!("{:?}", relay);
        assert!(rendered.contains("relay.example.com"));
        assert!(!rendered.contains("relay-secret"));
    }

    #[test]
    fn durations_are_bounded() {
        assert_eq!(bounded_secs("W", 3600, MAX_WINDOW_SECS).unwrap(), 3600);
        assert_eq!(
            bounded_secs("W", MAX_WINDOW_SECS, MAX_WINDOW_SECS).unwrap(),
            MAX_WINDOW_SECS
        );
        assert!(bounded_secs("W", 0, MAX_WINDOW_SECS).is_err());
        assert!(bounded_secs("W", -5, MAX_WINDOW_SECS).is_err());
        assert!(bounded_secs("TTL", i64::MAX, MAX_TOKEN_TTL_SECS).is_err());

        let err = bounded_secs("RATE_LIMIT_WINDOW_SECS", i64::MAX / 2, MAX_WINDOW_SECS)
            .unwrap_err()
            .to_string();
        assert!(err.contains("RATE_LIMIT_WINDOW_SECS"));
    }

    #[test]
    fn transport_names() {
        assert_eq!(TransportConfig::Log.name(), "log");
        assert_eq!(
            TransportConfig::SendGrid {
                api_key: String::new()
            }
            .name(),
            "sendgrid"
        );
    }
}
