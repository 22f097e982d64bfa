//! Auth routes: credential sign-in, sign-out, registration, current user.

use axum::extract::{FromRef, FromRequestParts, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{Html, IntoResponse, Json, Response};

use crate::identity::Principal;
use crate::services::account::{self, ActionOutcome, RegisterForm, SignInForm};
use crate::services::session::SessionScope;
use crate::state::AppState;

const LOGIN_PAGE: &str = include_str!("../../templates/login.html");
const REGISTER_PAGE: &str = include_str!("../../templates/register.html");

// =============================================================================
// AUTH EXTRACTOR
// =============================================================================

/// Authenticated principal plus the request scope it was resolved in.
/// Use as a handler parameter to require authentication.
///
/// Handlers must return `scope` as a response part so refreshed session
/// cookies reach the client.
pub struct CurrentUser {
    pub principal: Principal,
    pub scope: SessionScope,
}

impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let scope = match SessionScope::from_request_parts(parts, state).await {
            Ok(scope) => scope,
            Err(never) => match never {},
        };
        let app_state = AppState::from_ref(state);
        let principal = app_state.resolver.resolve(&scope).await.into_principal();
        match principal {
            Some(principal) => Ok(Self { principal, scope }),
            None => Err((scope, (StatusCode::UNAUTHORIZED, "Not authenticated")).into_response()),
        }
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

/// `GET /login`: sign-in form.
pub async fn login_page() -> Html<&'static str> {
    Html(LOGIN_PAGE)
}

/// `GET /register`: registration form.
pub async fn register_page() -> Html<&'static str> {
    Html(REGISTER_PAGE)
}

/// `POST /api/auth/sign-in`: credentials in, session cookies out.
pub async fn sign_in(State(state): State<AppState>, scope: SessionScope, Json(form): Json<SignInForm>) -> Response {
    let result = account::sign_in(state.identity.as_ref(), &form, &scope).await;
    match result {
        Ok(principal) => (scope, Json(principal)).into_response(),
        Err(e) => (scope, e).into_response(),
    }
}

/// `POST /api/auth/sign-out`: end the session, clear cookies.
pub async fn sign_out(State(state): State<AppState>, scope: SessionScope) -> Response {
    let result = account::sign_out(state.identity.as_ref(), &scope).await;
    match result {
        Ok(()) => (scope, StatusCode::NO_CONTENT).into_response(),
        Err(e) => (scope, e).into_response(),
    }
}

/// `POST /api/auth/register`: `{status: success | exists | error}`.
pub async fn register(State(state): State<AppState>, Json(form): Json<RegisterForm>) -> Json<ActionOutcome> {
    Json(account::register(state.identity.as_ref(), &form).await.into())
}

/// `GET /api/auth/me`: return current user.
pub async fn me(user: CurrentUser) -> impl IntoResponse {
    (user.scope, Json(user.principal))
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
