//! Hosted identity backend: Supabase GoTrue REST API.
//!
//! SYSTEM CONTEXT
//! ==============
//! Implements [`IdentityBackend`] against `{SUPABASE_URL}/auth/v1`. Session
//! tokens travel in the `sb-<ref>-auth-token` cookie family (see
//! [`super::cookies`]). Public calls authenticate with the publishable key;
//! admin calls (profile update, deletion) need the service-role key.
//!
//! TRADE-OFFS
//! ==========
//! Access tokens are refreshed eagerly when they expire within
//! [`REFRESH_MARGIN_SECS`], which costs an extra round trip near expiry but
//! keeps `GET /user` from failing on a token that dies mid-flight.

use std::time::Duration;

use reqwest::RequestBuilder;
use serde_json::{Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::cookies::{SessionCookies, StoredSession, storage_key};
use super::{CookieAccess, Credentials, IdentityBackend, IdentityError, Principal, ProfileUpdate, Role};

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const REFRESH_MARGIN_SECS: i64 = 10;

/// Hosted backend configuration loaded by [`crate::config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    /// Project URL without trailing slash.
    pub url: String,
    pub publishable_key: String,
    pub service_role_key: Option<String>,
    pub request_timeout_secs: u64,
    pub cookie_secure: bool,
}

pub struct SupabaseIdentity {
    http: reqwest::Client,
    config: SupabaseConfig,
    cookies: SessionCookies,
}

impl SupabaseIdentity {
    /// Build the backend and its HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: SupabaseConfig) -> Result<Self, IdentityError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| IdentityError::Misconfigured(format!("http client: {e}")))?;
        let cookies = SessionCookies::new(storage_key(&config.url), config.cookie_secure);
        Ok(Self { http, config, cookies })
    }

    /// Name of the session cookie this backend reads and writes.
    #[must_use]
    pub fn cookie_key(&self) -> &str {
        self.cookies.key()
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.config.url)
    }

    fn public(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.config.publishable_key)
    }

    fn admin(&self, req: RequestBuilder) -> Result<RequestBuilder, IdentityError> {
        let key = self
            .config
            .service_role_key
            .as_deref()
            .ok_or_else(|| IdentityError::Misconfigured("SUPABASE_SERVICE_ROLE_KEY not set".into()))?;
        Ok(req.header("apikey", key).bearer_auth(key))
    }

    async fn fetch_user(&self, access_token: &str) -> Result<Principal, IdentityError> {
        let resp = self
            .public(self.http.get(self.endpoint("user")))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport)?;
        let value = read_json(resp).await?;
        principal_from_user(&value)
    }

    async fn token_grant(&self, grant: &str, body: Value) -> Result<(StoredSession, Principal), IdentityError> {
        let resp = self
            .public(self.http.post(self.endpoint(&format!("token?grant_type={grant}"))))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let value = read_json(resp).await?;
        session_from_token_response(&value, OffsetDateTime::now_utc().unix_timestamp())
    }

    fn persist(&self, cookies: &dyn CookieAccess, session: &StoredSession) -> Result<(), IdentityError> {
        let out = self
            .cookies
            .write(session, &cookies.get_all())
            .map_err(|e| IdentityError::Unexpected(format!("session cookie encode: {e}")))?;
        cookies.set_all(out);
        Ok(())
    }

    fn forget(&self, cookies: &dyn CookieAccess) {
        let cleared = self.cookies.clear(&cookies.get_all());
        if !cleared.is_empty() {
            cookies.set_all(cleared);
        }
    }

    async fn refresh_stored(
        &self,
        cookies: &dyn CookieAccess,
        stored: &StoredSession,
    ) -> Result<StoredSession, IdentityError> {
        let result = self
            .token_grant("refresh_token", json!({ "refresh_token": stored.refresh_token }))
            .await;
        match result {
            Ok((session, _)) => {
                self.persist(cookies, &session)?;
                Ok(session)
            }
            Err(e) => {
                if e.is_no_session() {
                    self.forget(cookies);
                }
                Err(e)
            }
        }
    }

    async fn admin_user(&self, req: RequestBuilder) -> Result<Value, IdentityError> {
        let resp = self.admin(req)?.send().await.map_err(transport)?;
        read_json(resp).await.map_err(|e| match e {
            IdentityError::SessionMissing => IdentityError::Misconfigured("service role key rejected".into()),
            other => other,
        })
    }
}

#[async_trait::async_trait]
impl IdentityBackend for SupabaseIdentity {
    async fn current_principal(&self, cookies: &dyn CookieAccess) -> Result<Principal, IdentityError> {
        let Some(mut stored) = self.cookies.read(&cookies.get_all()) else {
            return Err(IdentityError::SessionMissing);
        };

        let now = OffsetDateTime::now_utc().unix_timestamp();
        if stored.expires_within(now, REFRESH_MARGIN_SECS) {
            stored = self.refresh_stored(cookies, &stored).await?;
        }

        self.fetch_user(&stored.access_token).await
    }

    async fn sign_in_with_credentials(
        &self,
        credentials: &Credentials,
        cookies: &dyn CookieAccess,
    ) -> Result<Principal, IdentityError> {
        let body = json!({ "email": credentials.email, "password": credentials.password });
        let (session, principal) = self.token_grant("password", body).await?;
        self.persist(cookies, &session)?;
        Ok(principal)
    }

    async fn refresh_session(&self, cookies: &dyn CookieAccess) -> Result<(), IdentityError> {
        let stored = self
            .cookies
            .read(&cookies.get_all())
            .ok_or(IdentityError::SessionMissing)?;
        self.refresh_stored(cookies, &stored).await.map(|_| ())
    }

    async fn sign_out(&self, cookies: &dyn CookieAccess) -> Result<(), IdentityError> {
        if let Some(stored) = self.cookies.read(&cookies.get_all()) {
            let result = self
                .public(self.http.post(self.endpoint("logout?scope=local")))
                .bearer_auth(&stored.access_token)
                .send()
                .await;
            match result {
                Ok(resp) if !resp.status().is_success() => {
                    tracing::debug!(status = %resp.status(), "remote sign-out rejected; clearing cookies anyway");
                }
                Err(e) => tracing::warn!(error = %e, "remote sign-out failed; clearing cookies anyway"),
                Ok(_) => {}
            }
        }
        self.forget(cookies);
        Ok(())
    }

    async fn register(&self, credentials: &Credentials) -> Result<Principal, IdentityError> {
        let resp = self
            .public(self.http.post(self.endpoint("signup")))
            .json(&json!({ "email": credentials.email, "password": credentials.password }))
            .send()
            .await
            .map_err(transport)?;
        let value = read_json(resp).await?;
        let user = value.get("user").filter(|u| u.is_object()).unwrap_or(&value);

        // With email confirmation on, signing up an existing address returns an
        // obfuscated user with no identities instead of an error.
        if user
            .get("identities")
            .and_then(Value::as_array)
            .is_some_and(Vec::is_empty)
        {
            return Err(IdentityError::AlreadyRegistered);
        }
        principal_from_user(user)
    }

    async fn update_profile(&self, id: &str, update: &ProfileUpdate) -> Result<Principal, IdentityError> {
        let mut body = serde_json::Map::new();
        if let Some(name) = &update.name {
            body.insert("user_metadata".into(), json!({ "name": name }));
        }
        if let Some(role) = update.role {
            body.insert("app_metadata".into(), json!({ "role": role.as_str() }));
        }
        let req = self
            .http
            .put(self.endpoint(&format!("admin/users/{id}")))
            .json(&Value::Object(body));
        let value = self.admin_user(req).await?;
        principal_from_user(&value)
    }

    async fn delete_principal(&self, id: &str) -> Result<(), IdentityError> {
        let req = self.http.delete(self.endpoint(&format!("admin/users/{id}")));
        self.admin_user(req).await.map(|_| ())
    }
}

// =============================================================================
// RESPONSE HANDLING
// =============================================================================

fn transport(e: reqwest::Error) -> IdentityError {
    IdentityError::Unavailable(e.to_string())
}

async fn read_json(resp: reqwest::Response) -> Result<Value, IdentityError> {
    let status = resp.status();
    let body = resp.text().await.map_err(transport)?;
    if !status.is_success() {
        return Err(classify_error(status.as_u16(), &body));
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).map_err(|e| IdentityError::Unexpected(format!("invalid json: {e}")))
}

/// Map a GoTrue error response onto the identity error taxonomy.
///
/// Newer servers send `error_code`; older ones send OAuth-style `error` /
/// `error_description`. Both are checked before falling back to the status.
pub(crate) fn classify_error(status: u16, body: &str) -> IdentityError {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let code = parsed
        .get("error_code")
        .or_else(|| parsed.get("error"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let message = ["msg", "message", "error_description"]
        .iter()
        .find_map(|k| parsed.get(*k).and_then(Value::as_str))
        .unwrap_or_default()
        .to_owned();
    let lowered = message.to_ascii_lowercase();

    match code {
        "refresh_token_not_found" | "refresh_token_already_used" => return IdentityError::InvalidRefreshToken,
        "session_not_found" | "session_expired" | "no_authorization" | "bad_jwt" => {
            return IdentityError::SessionMissing;
        }
        "invalid_credentials" => return IdentityError::InvalidCredentials,
        "user_already_exists" | "email_exists" => return IdentityError::AlreadyRegistered,
        "user_not_found" => return IdentityError::UserNotFound,
        _ => {}
    }

    if lowered.contains("invalid refresh token") {
        return IdentityError::InvalidRefreshToken;
    }
    if lowered.contains("auth session missing") {
        return IdentityError::SessionMissing;
    }
    if lowered.contains("invalid login credentials") {
        return IdentityError::InvalidCredentials;
    }
    if lowered.contains("already registered") {
        return IdentityError::AlreadyRegistered;
    }

    match status {
        400 if code == "invalid_grant" => IdentityError::InvalidCredentials,
        401 | 403 => IdentityError::SessionMissing,
        404 => IdentityError::UserNotFound,
        _ => IdentityError::Backend { status, message },
    }
}

/// Build a [`Principal`] from a GoTrue user object.
pub(crate) fn principal_from_user(user: &Value) -> Result<Principal, IdentityError> {
    let id = user
        .get("id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| IdentityError::Unexpected("user object without id".into()))?;
    let email = user.get("email").and_then(Value::as_str).unwrap_or_default();

    let metadata_str = |section: &str, key: &str| {
        user.get(section)
            .and_then(|m| m.get(key))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    let name = metadata_str("user_metadata", "name").map(str::to_owned);
    let role = metadata_str("app_metadata", "role")
        .and_then(Role::parse)
        .or_else(|| metadata_str("user_metadata", "role").and_then(Role::parse))
        .unwrap_or_default();
    let email_verified = ["email_confirmed_at", "confirmed_at"]
        .iter()
        .filter_map(|k| user.get(*k).and_then(Value::as_str))
        .find_map(|raw| OffsetDateTime::parse(raw, &Rfc3339).ok());

    Ok(Principal { id: id.to_owned(), email: email.to_owned(), name, role, email_verified })
}

/// Extract the session and principal from a token-grant response.
pub(crate) fn session_from_token_response(value: &Value, now_unix: i64) -> Result<(StoredSession, Principal), IdentityError> {
    let field = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| IdentityError::Unexpected(format!("token response without {key}")))
    };
    let access_token = field("access_token")?;
    let refresh_token = field("refresh_token")?;
    let expires_at = value
        .get("expires_at")
        .and_then(Value::as_i64)
        .or_else(|| {
            value
                .get("expires_in")
                .and_then(Value::as_i64)
                .map(|secs| now_unix + secs)
        });
    let user = value
        .get("user")
        .ok_or_else(|| IdentityError::Unexpected("token response without user".into()))?;

    Ok((StoredSession::new(access_token, refresh_token, expires_at), principal_from_user(user)?))
}

#[cfg(test)]
#[path = "supabase_test.rs"]
mod tests;
