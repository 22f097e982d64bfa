//! Guide routes: protected JSON endpoint, gated section pages, dashboard.
//!
//! SYSTEM CONTEXT
//! ==============
//! Section pages (`/android/...`, `/ios/...`) resolve the session once, hand
//! the verdict to the content gate, and render whichever state comes back.
//! The gate reaches guide bodies only through `GET /api/guides/{slug}` logic,
//! which resolves the session again on its own.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json, Redirect, Response};

use crate::render;
use crate::services::gate::{Placeholder, sign_in_href};
use crate::services::guides::load_protected_guide;
use crate::services::session::{SessionScope, Verdict};
use crate::state::AppState;

/// Top-level guide sections served as pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Android,
    Ios,
}

impl Section {
    #[must_use]
    pub fn slug(self) -> &'static str {
        match self {
            Self::Android => "android",
            Self::Ios => "ios",
        }
    }

    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::Android => "Android",
            Self::Ios => "iOS",
        }
    }
}

// =============================================================================
// PROTECTED API
// =============================================================================

/// `GET /api/guides/{*slug}`: guide content for authenticated callers only.
pub async fn get_guide(State(state): State<AppState>, scope: SessionScope, Path(slug): Path<String>) -> Response {
    let result = load_protected_guide(&state.resolver, &state.content, &scope, &slug).await;
    match result {
        Ok(payload) => (scope, Json(payload)).into_response(),
        Err(e) => (scope, e).into_response(),
    }
}

// =============================================================================
// PAGES
// =============================================================================

/// `GET /android`
pub async fn android_index(State(state): State<AppState>, scope: SessionScope) -> Response {
    section_page(&state, scope, Section::Android, "").await
}

/// `GET /android/{*slug}`
pub async fn android_page(State(state): State<AppState>, scope: SessionScope, Path(rest): Path<String>) -> Response {
    section_page(&state, scope, Section::Android, &rest).await
}

/// `GET /ios`
pub async fn ios_index(State(state): State<AppState>, scope: SessionScope) -> Response {
    section_page(&state, scope, Section::Ios, "").await
}

/// `GET /ios/{*slug}`
pub async fn ios_page(State(state): State<AppState>, scope: SessionScope, Path(rest): Path<String>) -> Response {
    section_page(&state, scope, Section::Ios, &rest).await
}

async fn section_page(state: &AppState, scope: SessionScope, section: Section, rest: &str) -> Response {
    let Some(doc) = state.content.resolve_page(section.slug(), rest) else {
        tracing::debug!(section = section.slug(), %rest, "guide page not found");
        return (StatusCode::NOT_FOUND, Html(render::not_found_page())).into_response();
    };

    let verdict = state.resolver.resolve(&scope).await;
    let gate_state = state
        .gate
        .decide(&doc.slug, verdict.is_authenticated(), Placeholder::default(), &scope)
        .await;

    let nav = state.content.section_docs(section.slug());
    let html = render::guide_page(section.title(), &nav, doc, &gate_state);
    (scope, Html(html)).into_response()
}

/// `GET /dashboard`: anonymous callers are sent to sign in.
pub async fn dashboard(State(state): State<AppState>, scope: SessionScope) -> Response {
    let verdict = state.resolver.resolve(&scope).await;
    match verdict {
        Verdict::Authenticated(principal) => (scope, Html(render::dashboard_page(&principal))).into_response(),
        Verdict::Anonymous => {
            let target = sign_in_href(&state.config.sign_in_path, "/dashboard");
            (scope, Redirect::to(&target)).into_response()
        }
    }
}

#[cfg(test)]
#[path = "guides_test.rs"]
mod tests;
