use std::sync::Arc;

use axum::body::to_bytes;
use axum::http::header::SET_COOKIE;

use super::*;
use crate::identity::memory::MemoryIdentity;
use crate::identity::{CookieAccess, Credentials, IdentityBackend, IdentityError, Principal, ProfileUpdate};
use crate::state::test_helpers::{
    ADMIN_EMAIL, ADMIN_PASSWORD, USER_EMAIL, USER_PASSWORD, sample_content, signed_in_scope, test_app_state, test_config,
};

/// Memory backend whose account deletion always fails.
struct UndeletableIdentity(MemoryIdentity);

#[async_trait::async_trait]
impl IdentityBackend for UndeletableIdentity {
    async fn current_principal(&self, cookies: &dyn CookieAccess) -> Result<Principal, IdentityError> {
        self.0.current_principal(cookies).await
    }

    async fn sign_in_with_credentials(
        &self,
        credentials: &Credentials,
        cookies: &dyn CookieAccess,
    ) -> Result<Principal, IdentityError> {
        self.0.sign_in_with_credentials(credentials, cookies).await
    }

    async fn refresh_session(&self, cookies: &dyn CookieAccess) -> Result<(), IdentityError> {
        self.0.refresh_session(cookies).await
    }

    async fn sign_out(&self, cookies: &dyn CookieAccess) -> Result<(), IdentityError> {
        self.0.sign_out(cookies).await
    }

    async fn register(&self, credentials: &Credentials) -> Result<Principal, IdentityError> {
        self.0.register(credentials).await
    }

    async fn update_profile(&self, id: &str, update: &ProfileUpdate) -> Result<Principal, IdentityError> {
        self.0.update_profile(id, update).await
    }

    async fn delete_principal(&self, _id: &str) -> Result<(), IdentityError> {
        Err(IdentityError::Unavailable("connection refused".into()))
    }
}

async fn current_user(state: &AppState, email: &str, password: &str) -> CurrentUser {
    let scope = signed_in_scope(state, email, password).await;
    let principal = state
        .resolver
        .resolve(&scope)
        .await
        .into_principal()
        .expect("test user should be signed in");
    CurrentUser { principal, scope }
}

async fn status_field(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    body["status"].as_str().unwrap_or_default().to_owned()
}

// =============================================================================
// update_name
// =============================================================================

#[tokio::test]
async fn rename_self_succeeds() {
    let state = test_app_state();
    let user = current_user(&state, USER_EMAIL, USER_PASSWORD).await;
    let body = NameUpdate { user_id: None, name: "  Renamed  ".into() };
    let response = update_name(State(state.clone()), user, Json(body)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(status_field(response).await, "success");

    let again = current_user(&state, USER_EMAIL, USER_PASSWORD).await;
    assert_eq!(again.principal.name.as_deref(), Some("Renamed"));
}

#[tokio::test]
async fn rename_rejects_short_name() {
    let state = test_app_state();
    let user = current_user(&state, USER_EMAIL, USER_PASSWORD).await;
    let response = update_name(State(state), user, Json(NameUpdate { user_id: None, name: "ab".into() })).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(status_field(response).await, "error");
}

#[tokio::test]
async fn rename_someone_else_is_forbidden() {
    let state = test_app_state();
    let admin = current_user(&state, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let user = current_user(&state, USER_EMAIL, USER_PASSWORD).await;
    let body = NameUpdate { user_id: Some(admin.principal.id.clone()), name: "Hijacked".into() };
    let response = update_name(State(state), user, Json(body)).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

// =============================================================================
// update_role
// =============================================================================

#[tokio::test]
async fn non_admin_cannot_change_roles() {
    let state = test_app_state();
    let user = current_user(&state, USER_EMAIL, USER_PASSWORD).await;
    let response = update_role(State(state), user, Json(RoleUpdate { user_id: None, role: Role::Admin })).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(status_field(response).await, "error");
}

#[tokio::test]
async fn admin_can_promote_another_user() {
    let state = test_app_state();
    let target = current_user(&state, USER_EMAIL, USER_PASSWORD).await.principal;
    let admin = current_user(&state, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let body = RoleUpdate { user_id: Some(target.id), role: Role::Admin };
    let response = update_role(State(state.clone()), admin, Json(body)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let promoted = current_user(&state, USER_EMAIL, USER_PASSWORD).await;
    assert_eq!(promoted.principal.role, Role::Admin);
}

#[test]
fn role_update_accepts_uppercase_role() {
    let body: RoleUpdate = serde_json::from_str(r#"{"userId":"u1","role":"ADMIN"}"#).unwrap();
    assert_eq!(body.user_id.as_deref(), Some("u1"));
    assert_eq!(body.role, Role::Admin);
}

// =============================================================================
// delete_user
// =============================================================================

#[tokio::test]
async fn delete_self_removes_account_and_clears_cookies() {
    let state = test_app_state();
    let user = current_user(&state, USER_EMAIL, USER_PASSWORD).await;
    let response = delete_user(State(state.clone()), user).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(SET_COOKIE));

    let credentials = Credentials { email: USER_EMAIL.into(), password: USER_PASSWORD.into() };
    let login = crate::state::test_helpers::anonymous_scope();
    let result = state.identity.sign_in_with_credentials(&credentials, &login).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn failed_delete_still_forwards_refreshed_cookies() {
    // Zero lifetime: every resolution rotates the session cookie.
    let memory = MemoryIdentity::with_ttl(false, 0);
    memory.seed(
        &Credentials { email: USER_EMAIL.into(), password: USER_PASSWORD.into() },
        None,
        Role::User,
    );
    let state = AppState::new(Arc::new(UndeletableIdentity(memory)), sample_content(), test_config());
    let user = current_user(&state, USER_EMAIL, USER_PASSWORD).await;

    let response = delete_user(State(state), user).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let cookies: Vec<_> = response.headers().get_all(SET_COOKIE).iter().collect();
    assert!(!cookies.is_empty(), "rotated session cookie must reach the client");
}
