//! Content gate: placeholder or real guide, depending on the session verdict.
//!
//! DESIGN
//! ======
//! The gate consumes an `authenticated` flag computed by the session
//! resolver; it never authenticates anyone itself. When the flag is false it
//! returns [`GateState::Locked`] without touching any [`GuideSource`]. When
//! true it issues exactly one fetch against the protected endpoint, which
//! re-checks the session on its own, so the flag is only a presentation hint.
//!
//! A fetch failure is terminal for the render: there is no retry.
//!
//! ARCHITECTURE
//! ============
//! [`GuideSource`] is the seam between the gate and the protected endpoint.
//! [`LocalGuideSource`] runs the endpoint logic in-process against a
//! read-only copy of the caller's cookies; [`HttpGuideSource`] calls the
//! endpoint over HTTP, forwarding the same cookies.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{StatusCode, header};

use crate::content::{ContentStore, normalize_slug};
use crate::identity::CookieAccess;
use crate::services::guides::{GuideError, GuidePayload, load_protected_guide};
use crate::services::session::{SessionResolver, SessionScope};

pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// STATE
// =============================================================================

/// Stand-in shown (obscured) to anonymous visitors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub title: String,
    pub description: String,
}

impl Default for Placeholder {
    fn default() -> Self {
        Self {
            title: "Installation Guide".into(),
            description: "Step-by-step guide to install the application".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    /// Anonymous caller. Terminal until the visitor signs in.
    Locked { placeholder: Placeholder, sign_in_href: String },
    Loading,
    /// Fetch failed. Terminal for this render.
    Error { message: String },
    Loaded(GuidePayload),
}

impl GateState {
    #[cfg(test)]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Loading)
    }

    /// Apply a fetch outcome. Only `Loading` moves; every other state is
    /// returned unchanged.
    #[must_use]
    pub fn complete(self, outcome: Result<GuidePayload, GuideError>) -> Self {
        match self {
            Self::Loading => match outcome {
                Ok(payload) => Self::Loaded(payload),
                Err(e) => {
                    e.log();
                    Self::Error { message: format!("Failed to load guide: {}", e.public_message()) }
                }
            },
            other => other,
        }
    }
}

// =============================================================================
// SOURCES
// =============================================================================

/// Channel through which the gate reaches the protected guide endpoint.
#[async_trait::async_trait]
pub trait GuideSource: Send + Sync {
    async fn fetch_guide(&self, slug: &str, scope: &SessionScope) -> Result<GuidePayload, GuideError>;
}

/// Runs the protected endpoint logic in-process.
pub struct LocalGuideSource {
    resolver: SessionResolver,
    content: Arc<ContentStore>,
}

impl LocalGuideSource {
    #[must_use]
    pub fn new(resolver: SessionResolver, content: Arc<ContentStore>) -> Self {
        Self { resolver, content }
    }
}

#[async_trait::async_trait]
impl GuideSource for LocalGuideSource {
    async fn fetch_guide(&self, slug: &str, scope: &SessionScope) -> Result<GuidePayload, GuideError> {
        // Sub-request semantics: the endpoint sees the caller's cookies but
        // cannot set any, and resolves the session on its own.
        let sub_scope = scope.fork_read_only();
        load_protected_guide(&self.resolver, &self.content, &sub_scope, slug).await
    }
}

/// Calls `GET {base_url}/api/guides/{slug}` with the caller's cookies.
pub struct HttpGuideSource {
    http: reqwest::Client,
    base_url: String,
}

impl HttpGuideSource {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_owned() })
    }

    fn url(&self, slug: &str) -> String {
        format!("{}/api/guides/{}", self.base_url, encode_path(&normalize_slug(slug)))
    }
}

#[async_trait::async_trait]
impl GuideSource for HttpGuideSource {
    async fn fetch_guide(&self, slug: &str, scope: &SessionScope) -> Result<GuidePayload, GuideError> {
        let cookie_header = scope
            .get_all()
            .iter()
            .map(|c| c.stripped().to_string())
            .collect::<Vec<_>>()
            .join("; ");

        let mut request = self.http.get(self.url(slug));
        if !cookie_header.is_empty() {
            request = request.header(header::COOKIE, cookie_header);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GuideError::BackendUnavailable(e.to_string()))?;

        match response.status() {
            StatusCode::OK => response
                .json::<GuidePayload>()
                .await
                .map_err(|e| GuideError::Unexpected(format!("guide payload decode: {e}"))),
            StatusCode::UNAUTHORIZED => Err(GuideError::Unauthenticated),
            StatusCode::NOT_FOUND => Err(GuideError::NotFound(normalize_slug(slug))),
            status => Err(GuideError::Unexpected(format!("guide endpoint returned {status}"))),
        }
    }
}

// =============================================================================
// GATE
// =============================================================================

pub struct ContentGate {
    source: Arc<dyn GuideSource>,
    sign_in_path: String,
}

impl ContentGate {
    #[must_use]
    pub fn new(source: Arc<dyn GuideSource>, sign_in_path: impl Into<String>) -> Self {
        Self { source, sign_in_path: sign_in_path.into() }
    }

    /// Sign-in link that returns the visitor to `return_to` afterwards.
    #[must_use]
    pub fn sign_in_href(&self, return_to: &str) -> String {
        sign_in_href(&self.sign_in_path, return_to)
    }

    /// Decide what the caller of `scope` sees for `slug`.
    ///
    /// `authenticated` must come from the session resolver for the same
    /// request.
    pub async fn decide(
        &self,
        slug: &str,
        authenticated: bool,
        placeholder: Placeholder,
        scope: &SessionScope,
    ) -> GateState {
        let slug = normalize_slug(slug);
        if !authenticated {
            tracing::debug!(%slug, "guide locked for anonymous caller");
            return GateState::Locked { placeholder, sign_in_href: self.sign_in_href(&format!("/{slug}")) };
        }

        let outcome = self.source.fetch_guide(&slug, scope).await;
        GateState::Loading.complete(outcome)
    }
}

/// `{path}?from={return_to}` with each path segment of `return_to` escaped.
#[must_use]
pub fn sign_in_href(path: &str, return_to: &str) -> String {
    format!("{path}?from={}", encode_path(return_to))
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
#[path = "gate_test.rs"]
mod tests;
