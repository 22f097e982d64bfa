//! User account routes: profile updates and self-deletion.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use super::auth::CurrentUser;
use crate::identity::Role;
use crate::services::account::{self, AccountError, ActionOutcome, ActionStatus};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NameUpdate {
    /// Defaults to the caller.
    #[serde(default)]
    pub user_id: Option<String>,
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleUpdate {
    /// Defaults to the caller.
    #[serde(default)]
    pub user_id: Option<String>,
    pub role: Role,
}

fn outcome(user: CurrentUser, result: Result<impl Sized, AccountError>) -> Response {
    match result {
        Ok(_) => (user.scope, Json(ActionOutcome::from(ActionStatus::Success))).into_response(),
        Err(e) => {
            e.log();
            (e.status(), user.scope, Json(ActionOutcome::from(ActionStatus::Error))).into_response()
        }
    }
}

/// `PATCH /api/user/name`: rename yourself.
pub async fn update_name(State(state): State<AppState>, user: CurrentUser, Json(body): Json<NameUpdate>) -> Response {
    let target = body.user_id.as_deref().unwrap_or(&user.principal.id);
    let result = account::update_name(state.identity.as_ref(), &user.principal, target, &body.name).await;
    outcome(user, result)
}

/// `PATCH /api/user/role`: change a role (ADMIN only).
pub async fn update_role(State(state): State<AppState>, user: CurrentUser, Json(body): Json<RoleUpdate>) -> Response {
    let target = body.user_id.as_deref().unwrap_or(&user.principal.id);
    let result = account::update_role(state.identity.as_ref(), &user.principal, target, body.role).await;
    outcome(user, result)
}

/// `DELETE /api/user`: delete your own account.
pub async fn delete_user(State(state): State<AppState>, user: CurrentUser) -> Response {
    let result = account::delete_account(state.identity.as_ref(), &user.principal, &user.scope).await;
    match result {
        Ok(()) => (user.scope, (StatusCode::OK, "User deleted successfully!")).into_response(),
        Err(e) => {
            e.log();
            (StatusCode::INTERNAL_SERVER_ERROR, user.scope, "Internal server error").into_response()
        }
    }
}

#[cfg(test)]
#[path = "users_test.rs"]
mod tests;
