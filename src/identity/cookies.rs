//! Session cookie codec shared by identity backends.
//!
//! DESIGN
//! ======
//! The session lives in a single logical cookie named
//! `sb-<project-ref>-auth-token`. Its value is the JSON session encoded as
//! `base64-<base64url>`; values longer than [`MAX_CHUNK_SIZE`] are split into
//! `<key>.0`, `<key>.1`, ... chunk cookies. Plain JSON values written by older
//! clients are still accepted on read.
//!
//! Every write also expires chunk cookies that the new value no longer uses,
//! so a shrinking session never leaves a stale tail behind.

use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use time::Duration;

/// Largest cookie value written before chunking kicks in.
pub const MAX_CHUNK_SIZE: usize = 3180;

const BASE64_PREFIX: &str = "base64-";
const COOKIE_MAX_AGE_DAYS: i64 = 400;

/// Token pair persisted in the session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Access-token expiry as unix seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_owned()
}

impl StoredSession {
    #[must_use]
    pub fn new(access_token: String, refresh_token: String, expires_at: Option<i64>) -> Self {
        Self { access_token, refresh_token, expires_at, token_type: default_token_type() }
    }

    /// True when the access token expires within `margin_secs` of `now_unix`.
    /// Sessions without an expiry never count as expiring.
    #[must_use]
    pub fn expires_within(&self, now_unix: i64, margin_secs: i64) -> bool {
        self.expires_at
            .is_some_and(|exp| exp - margin_secs <= now_unix)
    }
}

/// Derive the cookie storage key from a project URL.
///
/// `https://abcd.supabase.co` becomes `sb-abcd-auth-token`.
#[must_use]
pub fn storage_key(project_url: &str) -> String {
    let without_scheme = project_url
        .split_once("://")
        .map_or(project_url, |(_, rest)| rest);
    let host = without_scheme.split(['/', ':']).next().unwrap_or_default();
    let project_ref = host.split('.').next().filter(|s| !s.is_empty()).unwrap_or("local");
    format!("sb-{project_ref}-auth-token")
}

// =============================================================================
// CODEC
// =============================================================================

/// Reads and writes the session cookie family for one storage key.
#[derive(Debug, Clone)]
pub struct SessionCookies {
    key: String,
    secure: bool,
}

impl SessionCookies {
    #[must_use]
    pub fn new(key: impl Into<String>, secure: bool) -> Self {
        Self { key: key.into(), secure }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether `name` belongs to this cookie family (bare key or a chunk).
    #[must_use]
    pub fn owns(&self, name: &str) -> bool {
        if name == self.key {
            return true;
        }
        name.strip_prefix(self.key.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
            .is_some_and(|idx| idx.parse::<usize>().is_ok())
    }

    /// Decode the stored session, if the cookies carry a readable one.
    #[must_use]
    pub fn read(&self, cookies: &[Cookie<'_>]) -> Option<StoredSession> {
        let raw = self.raw_value(cookies)?;
        decode(&raw)
    }

    /// Cookies that persist `session`, expiring chunks it no longer needs.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be serialized.
    pub fn write(&self, session: &StoredSession, existing: &[Cookie<'_>]) -> Result<Vec<Cookie<'static>>, serde_json::Error> {
        let value = encode(session)?;
        let chunks = split_chunks(&value, MAX_CHUNK_SIZE);

        let mut out = Vec::with_capacity(chunks.len() + 1);
        let mut written = Vec::with_capacity(chunks.len());
        if chunks.len() == 1 {
            written.push(self.key.clone());
            out.push(self.build(self.key.clone(), value.clone()));
        } else {
            for (idx, chunk) in chunks.iter().enumerate() {
                let name = format!("{}.{idx}", self.key);
                written.push(name.clone());
                out.push(self.build(name, (*chunk).to_owned()));
            }
        }

        for cookie in existing {
            let name = cookie.name();
            if self.owns(name) && !written.iter().any(|w| w == name) {
                out.push(self.expire(name.to_owned()));
            }
        }
        Ok(out)
    }

    /// Expire every cookie of this family present in `existing`.
    #[must_use]
    pub fn clear(&self, existing: &[Cookie<'_>]) -> Vec<Cookie<'static>> {
        existing
            .iter()
            .filter(|c| self.owns(c.name()))
            .map(|c| self.expire(c.name().to_owned()))
            .collect()
    }

    fn raw_value(&self, cookies: &[Cookie<'_>]) -> Option<String> {
        let find = |name: &str| {
            cookies
                .iter()
                .find(|c| c.name() == name && !c.value().is_empty())
                .map(|c| c.value().to_owned())
        };

        if let Some(value) = find(&self.key) {
            return Some(value);
        }

        let mut combined = String::new();
        for idx in 0.. {
            match find(&format!("{}.{idx}", self.key)) {
                Some(part) => combined.push_str(&part),
                None => break,
            }
        }
        (!combined.is_empty()).then_some(combined)
    }

    fn build(&self, name: String, value: String) -> Cookie<'static> {
        Cookie::build((name, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .max_age(Duration::days(COOKIE_MAX_AGE_DAYS))
            .build()
    }

    fn expire(&self, name: String) -> Cookie<'static> {
        Cookie::build((name, String::new()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .max_age(Duration::ZERO)
            .build()
    }
}

fn encode(session: &StoredSession) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(session)?;
    Ok(format!("{BASE64_PREFIX}{}", URL_SAFE_NO_PAD.encode(json)))
}

fn decode(raw: &str) -> Option<StoredSession> {
    let json = match raw.strip_prefix(BASE64_PREFIX) {
        Some(encoded) => {
            let bytes = URL_SAFE_NO_PAD.decode(encoded.trim_end_matches('=')).ok()?;
            String::from_utf8(bytes).ok()?
        }
        None => raw.to_owned(),
    };
    serde_json::from_str(&json).ok()
}

/// Split an ASCII value into pieces of at most `size` bytes.
fn split_chunks(value: &str, size: usize) -> Vec<&str> {
    if value.len() <= size {
        return vec![value];
    }
    let mut chunks = Vec::with_capacity(value.len() / size + 1);
    let mut rest = value;
    while !rest.is_empty() {
        let cut = rest.len().min(size);
        let (head, tail) = rest.split_at(cut);
        chunks.push(head);
        rest = tail;
    }
    chunks
}

#[cfg(test)]
#[path = "cookies_test.rs"]
mod tests;
