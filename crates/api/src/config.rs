//! Runtime configuration, read from `WARDEN_*` environment variables.

use std::net::SocketAddr;

use chrono::Duration;
use thiserror::Error;
use tracing::warn;

use warden_auth::LocalKey;
use warden_observability::LogFormat;
use warden_session::CookieOptions;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

fn invalid(var: &'static str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        var,
        reason: reason.to_string(),
    }
}

#[derive(Clone)]
pub struct AuthConfig {
    pub bind_addr: SocketAddr,
    pub log_format: LogFormat,
    pub cookie: CookieOptions,
    pub cookie_block_key: Option<[u8; 32]>,
    pub session_lifetime: Duration,
    pub store_timeout: std::time::Duration,
    pub token_issuer: String,
    pub token_key: LocalKey,
    pub token_lifetime: Duration,
    pub min_username_length: usize,
    pub min_password_length: usize,
}

impl core::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("bind_addr", &self.bind_addr)
            .field("log_format", &self.log_format)
            .field("cookie", &self.cookie)
            .field("cookie_encrypted", &self.cookie_block_key.is_some())
            .field("session_lifetime", &self.session_lifetime)
            .field("store_timeout", &self.store_timeout)
            .field("token_issuer", &self.token_issuer)
            .field("token_lifetime", &self.token_lifetime)
            .field("min_username_length", &self.min_username_length)
            .field("min_password_length", &self.min_password_length)
            .finish_non_exhaustive()
    }
}

/// Development defaults. The token key is random per process.
impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_format: LogFormat::Json,
            cookie: CookieOptions {
                name: "warden_session".to_string(),
                domain: None,
                secure: true,
            },
            cookie_block_key: None,
            session_lifetime: Duration::hours(24),
            store_timeout: std::time::Duration::from_millis(2000),
            token_issuer: "warden".to_string(),
            token_key: LocalKey::generate(),
            token_lifetime: Duration::minutes(10),
            min_username_length: 4,
            min_password_length: 8,
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(v) = lookup("WARDEN_BIND_ADDR") {
            cfg.bind_addr = v.parse().map_err(|e| invalid("WARDEN_BIND_ADDR", e))?;
        }
        if let Some(v) = lookup("WARDEN_LOG_FORMAT") {
            cfg.log_format = v.parse().map_err(|e| invalid("WARDEN_LOG_FORMAT", e))?;
        }
        if let Some(v) = lookup("WARDEN_COOKIE_NAME") {
            if v.is_empty() || v.contains([';', '=', ' ']) {
                return Err(invalid("WARDEN_COOKIE_NAME", "not a valid cookie name"));
            }
            cfg.cookie.name = v;
        }
        cfg.cookie.domain = lookup("WARDEN_COOKIE_DOMAIN").filter(|d| !d.is_empty());

        if let Some(v) = lookup("WARDEN_COOKIE_SECURE") {
            cfg.cookie.secure = parse_bool("WARDEN_COOKIE_SECURE", &v)?;
        }
        if !cfg.cookie.secure {
            warn!("session cookie is not marked Secure; only acceptable in local development");
        }

        match lookup("WARDEN_COOKIE_BLOCK_KEY") {
            Some(v) => {
                let mut key = [0u8; 32];
                hex::decode_to_slice(v.trim(), &mut key).map_err(|e| invalid("WARDEN_COOKIE_BLOCK_KEY", e))?;
                cfg.cookie_block_key = Some(key);
            }
            None => warn!("WARDEN_COOKIE_BLOCK_KEY not set; session cookies are signed but not encrypted"),
        }

        if let Some(v) = lookup("WARDEN_SESSION_LIFETIME_SECS") {
            cfg.session_lifetime = Duration::seconds(parse_bounded("WARDEN_SESSION_LIFETIME_SECS", &v, MAX_SESSION_LIFETIME_SECS)?);
        }
        if let Some(v) = lookup("WARDEN_STORE_TIMEOUT_MS") {
            let ms = parse_bounded("WARDEN_STORE_TIMEOUT_MS", &v, MAX_STORE_TIMEOUT_MS)?;
            cfg.store_timeout = std::time::Duration::from_millis(ms as u64);
        }
        if let Some(v) = lookup("WARDEN_TOKEN_ISSUER") {
            cfg.token_issuer = v;
        }

        match lookup("WARDEN_TOKEN_LOCAL_KEY") {
            Some(v) => cfg.token_key = LocalKey::from_hex(&v).map_err(|e| invalid("WARDEN_TOKEN_LOCAL_KEY", e))?,
            None => warn!("WARDEN_TOKEN_LOCAL_KEY not set; using a random per-process key"),
        }

        if let Some(v) = lookup("WARDEN_TOKEN_LIFETIME_SECS") {
            cfg.token_lifetime = Duration::seconds(parse_bounded("WARDEN_TOKEN_LIFETIME_SECS", &v, MAX_TOKEN_LIFETIME_SECS)?);
        }
        if let Some(v) = lookup("WARDEN_MIN_USERNAME_LENGTH") {
            cfg.min_username_length = parse_bounded("WARDEN_MIN_USERNAME_LENGTH", &v, MAX_MIN_LENGTH)? as usize;
        }
        if let Some(v) = lookup("WARDEN_MIN_PASSWORD_LENGTH") {
            cfg.min_password_length = parse_bounded("WARDEN_MIN_PASSWORD_LENGTH", &v, MAX_MIN_LENGTH)? as usize;
        }

        Ok(cfg)
    }
}

fn parse_bool(var: &'static str, v: &str) -> Result<bool, ConfigError> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(invalid(var, format!("expected a boolean, got '{other}'"))),
    }
}

const MAX_SESSION_LIFETIME_SECS: i64 = 365 * 24 * 60 * 60;
const MAX_TOKEN_LIFETIME_SECS: i64 = 24 * 60 * 60;
const MAX_STORE_TIMEOUT_MS: i64 = 60_000;
const MAX_MIN_LENGTH: i64 = 1024;

/// `1..=max`.
fn parse_bounded(var: &'static str, v: &str, max: i64) -> Result<i64, ConfigError> {
    match v.trim().parse::<i64>() {
        Ok(n) if n > 0 && n <= max => Ok(n),
        Ok(n) if n <= 0 => Err(invalid(var, format!("must be positive, got {n}"))),
        Ok(n) => Err(invalid(var, format!("must be at most {max}, got {n}"))),
        Err(e) => Err(invalid(var, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = AuthConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.cookie.name, "warden_session");
        assert!(cfg.cookie.secure);
        assert_eq!(cfg.session_lifetime, Duration::seconds(86400));
        assert_eq!(cfg.token_lifetime, Duration::seconds(600));
        assert_eq!(cfg.min_password_length, 8);
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = AuthConfig::from_lookup(lookup(&[
            ("WARDEN_BIND_ADDR", "127.0.0.1:9000"),
            ("WARDEN_LOG_FORMAT", "pretty"),
            ("WARDEN_COOKIE_SECURE", "false"),
            ("WARDEN_COOKIE_DOMAIN", "example.com"),
            ("WARDEN_COOKIE_BLOCK_KEY", &"ab".repeat(32)),
            ("WARDEN_TOKEN_LIFETIME_SECS", "60"),
        ]))
        .unwrap();

        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(cfg.log_format, LogFormat::Pretty);
        assert!(!cfg.cookie.secure);
        assert_eq!(cfg.cookie.domain.as_deref(), Some("example.com"));
        assert_eq!(cfg.cookie_block_key, Some([0xab; 32]));
        assert_eq!(cfg.token_lifetime, Duration::seconds(60));
    }

    #[test]
    fn bad_values_name_the_variable() {
        let err = AuthConfig::from_lookup(lookup(&[("WARDEN_TOKEN_LOCAL_KEY", "zz")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "WARDEN_TOKEN_LOCAL_KEY", .. }));

        let err = AuthConfig::from_lookup(lookup(&[("WARDEN_STORE_TIMEOUT_MS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "WARDEN_STORE_TIMEOUT_MS", .. }));
    }

    #[test]
    fn oversized_lifetimes_are_rejected() {
        for var in ["WARDEN_SESSION_LIFETIME_SECS", "WARDEN_TOKEN_LIFETIME_SECS"] {
            for value in ["10000000000000", "9223372036854775807"] {
                let err = AuthConfig::from_lookup(lookup(&[(var, value)])).unwrap_err();
                assert!(matches!(err, ConfigError::Invalid { var: v, .. } if v == var), "{var}={value}");
            }
        }

        let cfg = AuthConfig::from_lookup(lookup(&[("WARDEN_SESSION_LIFETIME_SECS", "31536000")])).unwrap();
        assert_eq!(cfg.session_lifetime, Duration::days(365));
    }
}
