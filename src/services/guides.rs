//! Protected guide endpoint logic.
//!
//! SYSTEM CONTEXT
//! ==============
//! This is the security boundary for gated documentation. It re-checks the
//! caller's session on every call regardless of what any page-level gate
//! decided, and it is the only place guide bodies leave the content store.
//!
//! Failures map onto a fixed taxonomy ([`GuideError`]). Response bodies carry
//! a generic message only; details stay in the server log.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::content::{ContentStore, GuideDocument, normalize_slug};
use crate::services::session::{SessionResolver, SessionScope};

/// Success body of `GET /api/guides/{slug}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuidePayload {
    pub success: bool,
    pub title: String,
    pub description: String,
    pub body: String,
    pub images: Vec<String>,
}

impl From<&GuideDocument> for GuidePayload {
    fn from(doc: &GuideDocument) -> Self {
        Self {
            success: true,
            title: doc.title.clone(),
            description: doc.description.clone(),
            body: doc.body.clone(),
            images: doc.images.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GuideError {
    #[error("caller is not authenticated")]
    Unauthenticated,
    #[error("no guide for slug {0:?}")]
    NotFound(String),
    #[error("content backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl GuideError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BackendUnavailable(_) | Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show a client.
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "Unauthorized",
            Self::NotFound(_) => "Not found",
            Self::BackendUnavailable(_) | Self::Unexpected(_) => "Internal server error",
        }
    }

    /// Log at the level this failure deserves.
    pub fn log(&self) {
        match self {
            Self::Unauthenticated => {}
            Self::NotFound(slug) => tracing::debug!(%slug, "guide not found"),
            Self::BackendUnavailable(detail) => tracing::warn!(%detail, "guide backend unavailable"),
            Self::Unexpected(detail) => tracing::error!(%detail, "guide request failed"),
        }
    }
}

impl IntoResponse for GuideError {
    fn into_response(self) -> Response {
        self.log();
        let body = serde_json::json!({ "error": self.public_message() });
        (self.status(), Json(body)).into_response()
    }
}

/// Serve the guide at `slug` to the caller of `scope`.
///
/// # Errors
///
/// [`GuideError::Unauthenticated`] when the session resolves anonymous,
/// [`GuideError::NotFound`] when no guide has that exact slug.
pub async fn load_protected_guide(
    resolver: &SessionResolver,
    store: &ContentStore,
    scope: &SessionScope,
    slug: &str,
) -> Result<GuidePayload, GuideError> {
    if !resolver.resolve(scope).await.is_authenticated() {
        return Err(GuideError::Unauthenticated);
    }

    let slug = normalize_slug(slug);
    store
        .find_by_slug(&slug)
        .map(GuidePayload::from)
        .ok_or(GuideError::NotFound(slug))
}

#[cfg(test)]
#[path = "guides_test.rs"]
mod tests;
