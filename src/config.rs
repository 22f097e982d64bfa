//! Application configuration parsed from environment variables.
//!
//! Every setting has a development default except the hosted identity
//! backend, which is selected only when both its URL and publishable key are
//! present. Parsing goes through a lookup function so tests can supply a map
//! instead of mutating the process environment.

use std::path::PathBuf;

use crate::identity::Credentials;
use crate::identity::supabase::{DEFAULT_REQUEST_TIMEOUT_SECS, SupabaseConfig};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_CONTENT_DIR: &str = "content";
pub const DEFAULT_PUBLIC_DIR: &str = "public";
pub const DEFAULT_SIGN_IN_PATH: &str = "/login";
pub const DEFAULT_APP_URL: &str = "http://localhost:3000";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("{present} is set but {missing} is not")]
    Incomplete { present: &'static str, missing: &'static str },
}

/// Which identity backend to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityConfig {
    Supabase(SupabaseConfig),
    /// Process-local accounts; development only.
    Memory { seed_admin: Option<Credentials> },
}

/// How the content gate fetches protected guides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuideSourceConfig {
    /// Call the protected endpoint logic in-process.
    Local,
    /// `GET {base_url}/api/guides/{slug}` over HTTP.
    Http { base_url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    pub content_dir: PathBuf,
    pub public_dir: PathBuf,
    /// Public origin without trailing slash.
    pub app_url: String,
    pub sign_in_path: String,
    pub cookie_secure: bool,
    pub identity: IdentityConfig,
    pub guide_source: GuideSourceConfig,
}

impl AppConfig {
    /// Build typed config from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error for unparsable values or a half-configured hosted
    /// identity backend.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build typed config from an arbitrary key lookup.
    ///
    /// Optional keys:
    /// - `PORT` (default 3000), `CONTENT_DIR`, `PUBLIC_DIR`, `SIGN_IN_PATH`
    /// - `APP_URL` (default `http://localhost:3000`)
    /// - `COOKIE_SECURE`: inferred from the `APP_URL` scheme when unset
    /// - `SUPABASE_URL` + `SUPABASE_PUBLISHABLE_KEY` (or `SUPABASE_ANON_KEY`)
    /// - `SUPABASE_SERVICE_ROLE_KEY`, `IDENTITY_REQUEST_TIMEOUT_SECS`
    /// - `ADMIN_EMAIL` + `ADMIN_PASSWORD`: seed account for the memory backend
    /// - `GUIDE_SOURCE`: `local` (default) or `http`
    ///
    /// # Errors
    ///
    /// See [`AppConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        let port = match get("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidValue { key: "PORT", value: raw })?,
            None => DEFAULT_PORT,
        };

        let app_url = get("APP_URL")
            .unwrap_or_else(|| DEFAULT_APP_URL.to_owned())
            .trim_end_matches('/')
            .to_owned();

        let cookie_secure = match get("COOKIE_SECURE") {
            Some(raw) => parse_bool(&raw).ok_or(ConfigError::InvalidValue { key: "COOKIE_SECURE", value: raw })?,
            None => app_url.starts_with("https://"),
        };

        let sign_in_path = get("SIGN_IN_PATH").unwrap_or_else(|| DEFAULT_SIGN_IN_PATH.to_owned());

        let identity = identity_config(&get, cookie_secure)?;

        let guide_source = match get("GUIDE_SOURCE").as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("local") => GuideSourceConfig::Local,
            Some("http") => GuideSourceConfig::Http { base_url: app_url.clone() },
            Some(other) => return Err(ConfigError::InvalidValue { key: "GUIDE_SOURCE", value: other.to_owned() }),
        };

        Ok(Self {
            port,
            content_dir: PathBuf::from(get("CONTENT_DIR").unwrap_or_else(|| DEFAULT_CONTENT_DIR.to_owned())),
            public_dir: PathBuf::from(get("PUBLIC_DIR").unwrap_or_else(|| DEFAULT_PUBLIC_DIR.to_owned())),
            app_url,
            sign_in_path,
            cookie_secure,
            identity,
            guide_source,
        })
    }
}

fn identity_config(get: &impl Fn(&str) -> Option<String>, cookie_secure: bool) -> Result<IdentityConfig, ConfigError> {
    let url = get("SUPABASE_URL");
    let key = get("SUPABASE_PUBLISHABLE_KEY").or_else(|| get("SUPABASE_ANON_KEY"));

    match (url, key) {
        (Some(url), Some(publishable_key)) => {
            let request_timeout_secs = match get("IDENTITY_REQUEST_TIMEOUT_SECS") {
                Some(raw) => raw
                    .parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .ok_or(ConfigError::InvalidValue { key: "IDENTITY_REQUEST_TIMEOUT_SECS", value: raw })?,
                None => DEFAULT_REQUEST_TIMEOUT_SECS,
            };
            Ok(IdentityConfig::Supabase(SupabaseConfig {
                url: url.trim_end_matches('/').to_owned(),
                publishable_key,
                service_role_key: get("SUPABASE_SERVICE_ROLE_KEY"),
                request_timeout_secs,
                cookie_secure,
            }))
        }
        (Some(_), None) => {
            Err(ConfigError::Incomplete { present: "SUPABASE_URL", missing: "SUPABASE_PUBLISHABLE_KEY" })
        }
        (None, Some(_)) => {
            Err(ConfigError::Incomplete { present: "SUPABASE_PUBLISHABLE_KEY", missing: "SUPABASE_URL" })
        }
        (None, None) => {
            let seed_admin = match (get("ADMIN_EMAIL"), get("ADMIN_PASSWORD")) {
                (Some(email), Some(password)) => Some(Credentials { email: email.to_ascii_lowercase(), password }),
                _ => None,
            };
            Ok(IdentityConfig::Memory { seed_admin })
        }
    }
}

/// Parse `1/true/yes/on` and `0/false/no/off`, case-insensitive and trimmed.
#[must_use]
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
