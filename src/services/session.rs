//! Session resolution: cookies in, authentication verdict out.
//!
//! ARCHITECTURE
//! ============
//! Every request gets one [`SessionScope`]: a snapshot of its cookies, a
//! write policy, a queue of outgoing cookie mutations, and a memo cell for
//! the verdict. The scope is passed explicitly through handler call chains,
//! so resolving twice within a request hits the identity backend once and
//! nothing is shared between concurrent requests.
//!
//! The [`SessionResolver`] never fails. Backend errors of every kind collapse
//! to [`Verdict::Anonymous`]; only unrecognized ones are logged as errors.
//!
//! TRADE-OFFS
//! ==========
//! The cookie-name heuristic in [`has_identity_cookie`] only saves a backend
//! round trip for visitors with no auth cookies. It is not a security check:
//! a forged cookie still goes to the backend and fails there.

use std::convert::Infallible;
use std::sync::{Mutex, MutexGuard, PoisonError};

use axum::extract::FromRequestParts;
use axum::http::header::COOKIE;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponseParts, ResponseParts};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use tokio::sync::OnceCell;

use crate::identity::{CookieAccess, Principal, SharedIdentity};

/// Substrings that mark a cookie as possibly carrying an identity session.
pub const IDENTITY_COOKIE_MARKERS: &[&str] = &["sb-", "supabase", "auth", "session"];

/// True when any cookie name looks like it could carry a session.
pub fn has_identity_cookie<'a>(names: impl IntoIterator<Item = &'a str>) -> bool {
    names
        .into_iter()
        .any(|name| IDENTITY_COOKIE_MARKERS.iter().any(|m| name.contains(m)))
}

// =============================================================================
// VERDICT
// =============================================================================

/// Authentication verdict for the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Anonymous,
    Authenticated(Principal),
}

impl Verdict {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    #[must_use]
    pub fn into_principal(self) -> Option<Principal> {
        match self {
            Self::Authenticated(p) => Some(p),
            Self::Anonymous => None,
        }
    }
}

// =============================================================================
// REQUEST SCOPE
// =============================================================================

/// Whether cookie mutations may reach the outgoing response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieWrites {
    Allowed,
    /// Writes are dropped silently (e.g. an internal sub-request whose
    /// response headers never reach the browser).
    Forbidden,
}

/// Per-request session state: cookies, write policy, and verdict memo.
pub struct SessionScope {
    jar: Mutex<CookieJar>,
    writes: CookieWrites,
    verdict: OnceCell<Verdict>,
}

impl SessionScope {
    #[must_use]
    pub fn new(jar: CookieJar, writes: CookieWrites) -> Self {
        Self { jar: Mutex::new(jar), writes, verdict: OnceCell::new() }
    }

    /// Scope over an explicit set of request cookies.
    ///
    /// The cookies are treated as inbound: they are visible to reads but are
    /// not echoed back as `Set-Cookie` headers.
    #[must_use]
    pub fn with_cookies(cookies: impl IntoIterator<Item = Cookie<'static>>, writes: CookieWrites) -> Self {
        let header = cookies
            .into_iter()
            .map(|c| c.stripped().to_string())
            .collect::<Vec<_>>()
            .join("; ");
        let mut headers = HeaderMap::new();
        if !header.is_empty()
            && let Ok(value) = HeaderValue::from_str(&header)
        {
            headers.insert(COOKIE, value);
        }
        Self::new(CookieJar::from_headers(&headers), writes)
    }

    /// Read-only copy of this scope's current cookies with a fresh verdict memo.
    #[must_use]
    pub fn fork_read_only(&self) -> Self {
        Self::with_cookies(self.get_all(), CookieWrites::Forbidden)
    }

    #[cfg(test)]
    #[must_use]
    pub fn writes(&self) -> CookieWrites {
        self.writes
    }

    /// Names of the non-empty cookies currently visible to the request.
    #[must_use]
    pub fn cookie_names(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|c| !c.value().is_empty())
            .map(|c| c.name().to_owned())
            .collect()
    }

    /// Verdict memoized for this scope, if already resolved.
    #[cfg(test)]
    #[must_use]
    pub fn cached_verdict(&self) -> Option<&Verdict> {
        self.verdict.get()
    }

    /// Consume the scope, yielding the jar whose delta holds every accepted
    /// cookie mutation.
    #[must_use]
    pub fn into_jar(self) -> CookieJar {
        self.jar
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> MutexGuard<'_, CookieJar> {
        self.jar.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CookieAccess for SessionScope {
    fn get_all(&self) -> Vec<Cookie<'static>> {
        self.lock()
            .iter()
            .filter(|c| !c.value().is_empty())
            .cloned()
            .collect()
    }

    fn set_all(&self, cookies: Vec<Cookie<'static>>) {
        if self.writes == CookieWrites::Forbidden {
            tracing::debug!(count = cookies.len(), "cookie writes ignored in read-only context");
            return;
        }
        let mut jar = self.lock();
        for cookie in cookies {
            *jar = std::mem::replace(&mut *jar, CookieJar::new()).add(cookie);
        }
    }
}

impl<S> FromRequestParts<S> for SessionScope
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::new(CookieJar::from_headers(&parts.headers), CookieWrites::Allowed))
    }
}

impl IntoResponseParts for SessionScope {
    type Error = Infallible;

    fn into_response_parts(self, res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        self.into_jar().into_response_parts(res)
    }
}

// =============================================================================
// RESOLVER
// =============================================================================

/// Turns a request's cookies into a [`Verdict`] without ever failing.
#[derive(Clone)]
pub struct SessionResolver {
    backend: SharedIdentity,
}

impl SessionResolver {
    #[must_use]
    pub fn new(backend: SharedIdentity) -> Self {
        Self { backend }
    }

    /// Resolve the verdict for `scope`, consulting the backend at most once
    /// per scope.
    pub async fn resolve(&self, scope: &SessionScope) -> Verdict {
        scope
            .verdict
            .get_or_init(|| self.resolve_uncached(scope))
            .await
            .clone()
    }

    async fn resolve_uncached(&self, scope: &SessionScope) -> Verdict {
        let names = scope.cookie_names();
        if !has_identity_cookie(names.iter().map(String::as_str)) {
            return Verdict::Anonymous;
        }

        match self.backend.current_principal(scope).await {
            Ok(principal) => Verdict::Authenticated(principal),
            Err(e) if e.is_no_session() => {
                tracing::debug!(reason = %e, "no active session");
                Verdict::Anonymous
            }
            Err(e) if e.is_unavailable() => {
                tracing::warn!(error = %e, "identity backend unavailable; treating caller as anonymous");
                Verdict::Anonymous
            }
            Err(e) => {
                tracing::error!(error = %e, "session resolution failed; treating caller as anonymous");
                Verdict::Anonymous
            }
        }
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
