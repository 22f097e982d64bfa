//! In-memory identity backend for local development and tests.
//!
//! Accounts, sessions, and refresh tokens live in process memory and vanish
//! on restart. Session cookies use the same codec as the hosted backend so
//! the resolver cannot tell the two apart.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Mutex;

use rand::Rng;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

use super::cookies::{SessionCookies, StoredSession};
use super::{CookieAccess, Credentials, IdentityBackend, IdentityError, Principal, ProfileUpdate, Role};

pub const DEFAULT_COOKIE_KEY: &str = "sb-local-auth-token";
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 3600;

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a cryptographically random 32-byte hex token.
#[must_use]
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes_to_hex(&bytes)
}

fn generate_salt() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes_to_hex(&bytes)
}

#[must_use]
pub(crate) fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    bytes_to_hex(&hasher.finalize())
}

struct Account {
    principal: Principal,
    salt: String,
    password_hash: String,
}

struct SessionRecord {
    user_id: String,
    expires_at: i64,
}

#[derive(Default)]
struct Store {
    /// Keyed by lowercase email.
    accounts: HashMap<String, Account>,
    /// Access token -> session.
    sessions: HashMap<String, SessionRecord>,
    /// Refresh token -> user id. Consumed on use.
    refresh_tokens: HashMap<String, String>,
}

impl Store {
    fn account_by_id(&self, id: &str) -> Option<&Account> {
        self.accounts.values().find(|a| a.principal.id == id)
    }

    fn account_by_id_mut(&mut self, id: &str) -> Option<&mut Account> {
        self.accounts.values_mut().find(|a| a.principal.id == id)
    }

    /// Issue a fresh session, dropping access-token records that have expired.
    fn issue(&mut self, user_id: &str, ttl_secs: i64) -> StoredSession {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.sessions.retain(|_, s| s.expires_at >= now);

        let access_token = generate_token();
        let refresh_token = generate_token();
        let expires_at = now + ttl_secs;
        self.sessions.insert(
            access_token.clone(),
            SessionRecord { user_id: user_id.to_owned(), expires_at },
        );
        self.refresh_tokens.insert(refresh_token.clone(), user_id.to_owned());
        StoredSession::new(access_token, refresh_token, Some(expires_at))
    }
}

pub struct MemoryIdentity {
    store: Mutex<Store>,
    cookies: SessionCookies,
    access_token_ttl_secs: i64,
}

impl MemoryIdentity {
    #[must_use]
    pub fn new(cookie_secure: bool) -> Self {
        Self::with_ttl(cookie_secure, DEFAULT_ACCESS_TOKEN_TTL_SECS)
    }

    /// Backend whose access tokens live `ttl_secs` seconds.
    #[must_use]
    pub fn with_ttl(cookie_secure: bool, ttl_secs: i64) -> Self {
        Self {
            store: Mutex::new(Store::default()),
            cookies: SessionCookies::new(DEFAULT_COOKIE_KEY, cookie_secure),
            access_token_ttl_secs: ttl_secs,
        }
    }

    /// Insert or overwrite an account with a fixed role, marking it verified.
    ///
    /// Used to seed the development admin account.
    pub fn seed(&self, credentials: &Credentials, name: Option<String>, role: Role) -> Principal {
        let mut store = self.lock();
        let salt = generate_salt();
        let password_hash = hash_password(&salt, &credentials.password);
        let id = store
            .accounts
            .get(&credentials.email)
            .map_or_else(|| Uuid::new_v4().to_string(), |a| a.principal.id.clone());
        let principal = Principal {
            id,
            email: credentials.email.clone(),
            name,
            role,
            email_verified: Some(OffsetDateTime::now_utc()),
        };
        store
            .accounts
            .insert(credentials.email.clone(), Account { principal: principal.clone(), salt, password_hash });
        principal
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Store> {
        self.store
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
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

    /// Exchange `stored` for a new session. The old refresh token is consumed
    /// and the old access token revoked.
    fn rotate(&self, stored: &StoredSession) -> Result<StoredSession, IdentityError> {
        let mut store = self.lock();
        let user_id = store
            .refresh_tokens
            .remove(&stored.refresh_token)
            .ok_or(IdentityError::InvalidRefreshToken)?;
        store.sessions.remove(&stored.access_token);
        if store.account_by_id(&user_id).is_none() {
            return Err(IdentityError::InvalidRefreshToken);
        }
        Ok(store.issue(&user_id, self.access_token_ttl_secs))
    }
}

#[async_trait::async_trait]
impl IdentityBackend for MemoryIdentity {
    async fn current_principal(&self, cookies: &dyn CookieAccess) -> Result<Principal, IdentityError> {
        let mut stored = self
            .cookies
            .read(&cookies.get_all())
            .ok_or(IdentityError::SessionMissing)?;

        let now = OffsetDateTime::now_utc().unix_timestamp();
        if stored.expires_within(now, 0) {
            match self.rotate(&stored) {
                Ok(session) => {
                    self.persist(cookies, &session)?;
                    stored = session;
                }
                Err(e) => {
                    self.forget(cookies);
                    return Err(e);
                }
            }
        }

        let store = self.lock();
        let record = store
            .sessions
            .get(&stored.access_token)
            .filter(|r| r.expires_at >= now)
            .ok_or(IdentityError::SessionMissing)?;
        store
            .account_by_id(&record.user_id)
            .map(|a| a.principal.clone())
            .ok_or(IdentityError::SessionMissing)
    }

    async fn sign_in_with_credentials(
        &self,
        credentials: &Credentials,
        cookies: &dyn CookieAccess,
    ) -> Result<Principal, IdentityError> {
        let (principal, session) = {
            let mut store = self.lock();
            let account = store
                .accounts
                .get(&credentials.email)
                .ok_or(IdentityError::InvalidCredentials)?;
            if hash_password(&account.salt, &credentials.password) != account.password_hash {
                return Err(IdentityError::InvalidCredentials);
            }
            let principal = account.principal.clone();
            let session = store.issue(&principal.id, self.access_token_ttl_secs);
            (principal, session)
        };
        self.persist(cookies, &session)?;
        Ok(principal)
    }

    async fn refresh_session(&self, cookies: &dyn CookieAccess) -> Result<(), IdentityError> {
        let stored = self
            .cookies
            .read(&cookies.get_all())
            .ok_or(IdentityError::SessionMissing)?;
        match self.rotate(&stored) {
            Ok(session) => self.persist(cookies, &session),
            Err(e) => {
                self.forget(cookies);
                Err(e)
            }
        }
    }

    async fn sign_out(&self, cookies: &dyn CookieAccess) -> Result<(), IdentityError> {
        if let Some(stored) = self.cookies.read(&cookies.get_all()) {
            let mut store = self.lock();
            store.sessions.remove(&stored.access_token);
            store.refresh_tokens.remove(&stored.refresh_token);
        }
        self.forget(cookies);
        Ok(())
    }

    async fn register(&self, credentials: &Credentials) -> Result<Principal, IdentityError> {
        let mut store = self.lock();
        if store.accounts.contains_key(&credentials.email) {
            return Err(IdentityError::AlreadyRegistered);
        }
        let salt = generate_salt();
        let password_hash = hash_password(&salt, &credentials.password);
        let principal = Principal {
            id: Uuid::new_v4().to_string(),
            email: credentials.email.clone(),
            name: None,
            role: Role::User,
            email_verified: None,
        };
        store
            .accounts
            .insert(credentials.email.clone(), Account { principal: principal.clone(), salt, password_hash });
        Ok(principal)
    }

    async fn update_profile(&self, id: &str, update: &ProfileUpdate) -> Result<Principal, IdentityError> {
        let mut store = self.lock();
        let account = store
            .account_by_id_mut(id)
            .ok_or(IdentityError::UserNotFound)?;
        if let Some(name) = &update.name {
            account.principal.name = Some(name.clone());
        }
        if let Some(role) = update.role {
            account.principal.role = role;
        }
        Ok(account.principal.clone())
    }

    async fn delete_principal(&self, id: &str) -> Result<(), IdentityError> {
        let mut store = self.lock();
        let before = store.accounts.len();
        store.accounts.retain(|_, a| a.principal.id != id);
        if store.accounts.len() == before {
            return Err(IdentityError::UserNotFound);
        }
        store.sessions.retain(|_, s| s.user_id != id);
        store.refresh_tokens.retain(|_, uid| uid != id);
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
