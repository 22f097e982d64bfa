use super::*;
use crate::identity::memory::MemoryIdentity;
use crate::services::session::{CookieWrites, SessionScope};
use crate::state::test_helpers::{ADMIN_EMAIL, ADMIN_PASSWORD, USER_EMAIL, USER_PASSWORD, seeded_identity};

fn form(email: &str, password: &str, confirm: Option<&str>) -> RegisterForm {
    RegisterForm { email: email.into(), password: password.into(), confirm_password: confirm.map(Into::into) }
}

fn scope() -> SessionScope {
    SessionScope::with_cookies(Vec::new(), CookieWrites::Allowed)
}

async fn principal(identity: &MemoryIdentity, email: &str, password: &str) -> Principal {
    let form = SignInForm { email: email.into(), password: password.into() };
    sign_in(identity, &form, &scope()).await.unwrap()
}

// =============================================================================
// validation
// =============================================================================

#[test]
fn normalize_email_valid() {
    assert_eq!(normalize_email("  User@Example.COM "), Some("user@example.com".into()));
}

#[test]
fn normalize_email_invalid() {
    for raw in ["", "no-at-sign", "@example.com", "user@", "a@b@c", "us er@example.com"] {
        assert_eq!(normalize_email(raw), None, "expected rejection for {raw:?}");
    }
}

#[test]
fn registration_rules() {
    let creds = validate_registration(&form("A@Example.com", "secret1", Some("secret1"))).unwrap();
    assert_eq!(creds.email, "a@example.com");

    assert_eq!(validate_registration(&form("bad", "secret1", None)), Err(ValidationError::InvalidEmail));
    assert_eq!(validate_registration(&form("a@example.com", "12345", None)), Err(ValidationError::PasswordTooShort));
    assert_eq!(
        validate_registration(&form("a@example.com", "secret1", Some("secret2"))),
        Err(ValidationError::PasswordMismatch)
    );
}

#[test]
fn confirmation_optional() {
    assert!(validate_registration(&form("a@example.com", "secret1", None)).is_ok());
}

#[test]
fn name_length_bounds() {
    assert_eq!(validate_name("  Bob  "), Ok("Bob".into()));
    assert_eq!(validate_name("Al"), Err(ValidationError::NameLength));
    assert!(validate_name(&"x".repeat(32)).is_ok());
    assert_eq!(validate_name(&"x".repeat(33)), Err(ValidationError::NameLength));
}

#[test]
fn register_form_accepts_camel_case() {
    let parsed: RegisterForm =
        serde_json::from_str(r#"{"email":"a@example.com","password":"secret1","confirmPassword":"secret1"}"#).unwrap();
    assert_eq!(parsed.confirm_password.as_deref(), Some("secret1"));
}

#[test]
fn outcome_serializes_lowercase() {
    let json = serde_json::to_value(ActionOutcome::from(ActionStatus::Exists)).unwrap();
    assert_eq!(json, serde_json::json!({ "status": "exists" }));
}

// =============================================================================
// registration
// =============================================================================

#[tokio::test]
async fn register_then_register_again_reports_exists() {
    let identity = MemoryIdentity::new(false);
    let first = register(&identity, &form("user@example.com", "secret1", Some("secret1"))).await;
    assert_eq!(first, ActionStatus::Success);

    let second = register(&identity, &form("USER@example.com", "another1", None)).await;
    assert_eq!(second, ActionStatus::Exists);
}

#[tokio::test]
async fn register_invalid_form_is_error() {
    let identity = MemoryIdentity::new(false);
    assert_eq!(register(&identity, &form("user@example.com", "123", None)).await, ActionStatus::Error);
}

// =============================================================================
// sign-in / sign-out
// =============================================================================

#[tokio::test]
async fn sign_in_sets_cookies() {
    let identity = seeded_identity();
    let scope = scope();
    let form = SignInForm { email: USER_EMAIL.to_uppercase(), password: USER_PASSWORD.into() };

    let principal = sign_in(identity.as_ref(), &form, &scope).await.unwrap();
    assert_eq!(principal.email, USER_EMAIL);
    assert!(!scope.get_all().is_empty());
}

#[tokio::test]
async fn sign_in_wrong_password_is_invalid_credentials() {
    let identity = seeded_identity();
    let form = SignInForm { email: USER_EMAIL.into(), password: "wrong-password".into() };
    let err = sign_in(identity.as_ref(), &form, &scope()).await.unwrap_err();
    assert!(matches!(err, AccountError::InvalidCredentials));
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(err.public_message(), "Invalid credentials");
}

#[tokio::test]
async fn sign_in_malformed_email_is_invalid_credentials() {
    let identity = seeded_identity();
    let form = SignInForm { email: "nope".into(), password: USER_PASSWORD.into() };
    assert!(matches!(sign_in(identity.as_ref(), &form, &scope()).await, Err(AccountError::InvalidCredentials)));
}

#[tokio::test]
async fn sign_out_clears_session() {
    let identity = seeded_identity();
    let login = scope();
    let form = SignInForm { email: USER_EMAIL.into(), password: USER_PASSWORD.into() };
    sign_in(identity.as_ref(), &form, &login).await.unwrap();

    sign_out(identity.as_ref(), &login).await.unwrap();
    assert!(login.get_all().is_empty());
}

// =============================================================================
// profile
// =============================================================================

#[tokio::test]
async fn user_can_rename_self() {
    let identity = seeded_identity();
    let me = principal(&identity, USER_EMAIL, USER_PASSWORD).await;
    let updated = update_name(identity.as_ref(), &me, &me.id, "  Renamed ").await.unwrap();
    assert_eq!(updated.name.as_deref(), Some("Renamed"));
}

#[tokio::test]
async fn user_cannot_rename_someone_else() {
    let identity = seeded_identity();
    let me = principal(&identity, USER_EMAIL, USER_PASSWORD).await;
    let admin = principal(&identity, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let err = update_name(identity.as_ref(), &me, &admin.id, "Hacker").await.unwrap_err();
    assert!(matches!(err, AccountError::Forbidden));
}

#[tokio::test]
async fn rename_rejects_short_name() {
    let identity = seeded_identity();
    let me = principal(&identity, USER_EMAIL, USER_PASSWORD).await;
    let err = update_name(identity.as_ref(), &me, &me.id, "Al").await.unwrap_err();
    assert!(matches!(err, AccountError::Validation(ValidationError::NameLength)));
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn only_admin_changes_roles() {
    let identity = seeded_identity();
    let me = principal(&identity, USER_EMAIL, USER_PASSWORD).await;
    let admin = principal(&identity, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let err = update_role(identity.as_ref(), &me, &me.id, Role::Admin).await.unwrap_err();
    assert!(matches!(err, AccountError::Forbidden));

    let promoted = update_role(identity.as_ref(), &admin, &me.id, Role::Admin).await.unwrap();
    assert_eq!(promoted.role, Role::Admin);
}

#[tokio::test]
async fn role_change_for_unknown_user_is_backend_error() {
    let identity = seeded_identity();
    let admin = principal(&identity, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let err = update_role(identity.as_ref(), &admin, "missing-id", Role::User).await.unwrap_err();
    assert!(matches!(err, AccountError::Identity(IdentityError::UserNotFound)));
    assert_eq!(err.public_message(), "Internal server error");
}

// =============================================================================
// deletion
// =============================================================================

#[tokio::test]
async fn delete_account_removes_user_and_clears_cookies() {
    let identity = seeded_identity();
    let login = scope();
    let form = SignInForm { email: USER_EMAIL.into(), password: USER_PASSWORD.into() };
    let me = sign_in(identity.as_ref(), &form, &login).await.unwrap();

    delete_account(identity.as_ref(), &me, &login).await.unwrap();
    assert!(login.get_all().is_empty());

    let again = sign_in(identity.as_ref(), &form, &scope()).await;
    assert!(matches!(again, Err(AccountError::InvalidCredentials)));
}
