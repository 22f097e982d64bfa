//! Account operations: registration, sign-in/out, profile, deletion.
//!
//! Everything here delegates to the identity backend. This module owns only
//! form validation, authorization of profile changes, and the mapping of
//! backend failures to the coarse outcomes the UI understands.
//!
//! Role changes are admin-only: an ADMIN may set anyone's role, and nobody
//! may change their own role without it. This replaces the earlier
//! self-service rule, under which any user could set their own role.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::identity::{CookieAccess, Credentials, IdentityBackend, IdentityError, Principal, ProfileUpdate, Role};

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MIN_NAME_LEN: usize = 3;
pub const MAX_NAME_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid email address")]
    InvalidEmail,
    #[error("password must be at least 6 characters")]
    PasswordTooShort,
    #[error("passwords must match")]
    PasswordMismatch,
    #[error("name must be 3 to 32 characters")]
    NameLength,
}

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("not authenticated")]
    Unauthenticated,
    #[error("caller may not modify this account")]
    Forbidden,
    #[error(transparent)]
    Identity(IdentityError),
}

impl From<IdentityError> for AccountError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::InvalidCredentials => Self::InvalidCredentials,
            other => Self::Identity(other),
        }
    }
}

impl AccountError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials | Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Identity(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show a client.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(e) => e.to_string(),
            Self::InvalidCredentials => "Invalid credentials".into(),
            Self::Unauthenticated => "Not authenticated".into(),
            Self::Forbidden => "Forbidden".into(),
            Self::Identity(_) => "Internal server error".into(),
        }
    }

    /// Log at the level this failure deserves.
    pub fn log(&self) {
        match self {
            Self::Identity(e) if e.is_unavailable() => tracing::warn!(error = %e, "identity backend unavailable"),
            Self::Identity(e) => tracing::error!(error = %e, "account operation failed"),
            other => tracing::debug!(reason = %other, "account request rejected"),
        }
    }
}

impl IntoResponse for AccountError {
    fn into_response(self) -> Response {
        self.log();
        let body = serde_json::json!({ "error": self.public_message() });
        (self.status(), Json(body)).into_response()
    }
}

/// Coarse result reported to forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Success,
    Exists,
    Error,
}

/// `{ "status": "success" | "exists" | "error" }`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    pub status: ActionStatus,
}

impl From<ActionStatus> for ActionOutcome {
    fn from(status: ActionStatus) -> Self {
        Self { status }
    }
}

// =============================================================================
// FORMS
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterForm {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub confirm_password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignInForm {
    pub email: String,
    pub password: String,
}

/// Trimmed, lowercased email with exactly one `@` and non-empty parts.
#[must_use]
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_ascii_lowercase();
    let (local, domain) = normalized.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') || normalized.contains(char::is_whitespace) {
        return None;
    }
    Some(normalized)
}

/// Validate a registration form into backend credentials.
///
/// # Errors
///
/// Returns the first failing rule.
pub fn validate_registration(form: &RegisterForm) -> Result<Credentials, ValidationError> {
    let email = normalize_email(&form.email).ok_or(ValidationError::InvalidEmail)?;
    if form.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort);
    }
    if let Some(confirm) = &form.confirm_password
        && confirm != &form.password
    {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(Credentials { email, password: form.password.clone() })
}

/// Trimmed display name of 3 to 32 characters.
///
/// # Errors
///
/// Returns [`ValidationError::NameLength`] when out of range.
pub fn validate_name(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    let len = name.chars().count();
    if (MIN_NAME_LEN..=MAX_NAME_LEN).contains(&len) {
        Ok(name.to_owned())
    } else {
        Err(ValidationError::NameLength)
    }
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Create an account. Never fails; the outcome says what happened.
pub async fn register(identity: &dyn IdentityBackend, form: &RegisterForm) -> ActionStatus {
    let credentials = match validate_registration(form) {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!(reason = %e, "registration rejected");
            return ActionStatus::Error;
        }
    };

    match identity.register(&credentials).await {
        Ok(principal) => {
            tracing::info!(user_id = %principal.id, "account registered");
            ActionStatus::Success
        }
        Err(IdentityError::AlreadyRegistered) => ActionStatus::Exists,
        Err(e) if e.is_unavailable() => {
            tracing::warn!(error = %e, "registration failed: identity backend unavailable");
            ActionStatus::Error
        }
        Err(e) => {
            tracing::error!(error = %e, "registration failed");
            ActionStatus::Error
        }
    }
}

/// Sign in with email/password; session cookies are written through
/// `cookies` on success.
///
/// # Errors
///
/// [`AccountError::InvalidCredentials`] for a malformed form or rejected
/// credentials; [`AccountError::Identity`] for backend failures.
pub async fn sign_in(
    identity: &dyn IdentityBackend,
    form: &SignInForm,
    cookies: &dyn CookieAccess,
) -> Result<Principal, AccountError> {
    let email = normalize_email(&form.email).ok_or(AccountError::InvalidCredentials)?;
    if form.password.is_empty() {
        return Err(AccountError::InvalidCredentials);
    }
    let credentials = Credentials { email, password: form.password.clone() };
    let principal = identity.sign_in_with_credentials(&credentials, cookies).await?;
    tracing::info!(user_id = %principal.id, "signed in");
    Ok(principal)
}

/// End the caller's session and clear its cookies.
///
/// # Errors
///
/// Returns backend failures.
pub async fn sign_out(identity: &dyn IdentityBackend, cookies: &dyn CookieAccess) -> Result<(), AccountError> {
    identity.sign_out(cookies).await?;
    Ok(())
}

/// Rename `target_id`. Only the principal itself may do this.
///
/// # Errors
///
/// [`AccountError::Forbidden`] when `caller` is someone else, a validation
/// error for a bad name, or backend failures.
pub async fn update_name(
    identity: &dyn IdentityBackend,
    caller: &Principal,
    target_id: &str,
    name: &str,
) -> Result<Principal, AccountError> {
    if caller.id != target_id {
        return Err(AccountError::Forbidden);
    }
    let name = validate_name(name)?;
    let update = ProfileUpdate { name: Some(name), role: None };
    Ok(identity.update_profile(target_id, &update).await?)
}

/// Change the role of `target_id`. Requires an ADMIN caller.
///
/// # Errors
///
/// [`AccountError::Forbidden`] for non-admin callers, or backend failures.
pub async fn update_role(
    identity: &dyn IdentityBackend,
    caller: &Principal,
    target_id: &str,
    role: Role,
) -> Result<Principal, AccountError> {
    if caller.role != Role::Admin {
        return Err(AccountError::Forbidden);
    }
    let update = ProfileUpdate { name: None, role: Some(role) };
    let updated = identity.update_profile(target_id, &update).await?;
    tracing::info!(caller = %caller.id, target = %target_id, role = role.as_str(), "role updated");
    Ok(updated)
}

/// Delete the caller's own account and clear its session cookies.
///
/// # Errors
///
/// Returns backend failures from the deletion. Sign-out failures after a
/// successful deletion are logged only.
pub async fn delete_account(
    identity: &dyn IdentityBackend,
    caller: &Principal,
    cookies: &dyn CookieAccess,
) -> Result<(), AccountError> {
    identity.delete_principal(&caller.id).await?;
    tracing::info!(user_id = %caller.id, "account deleted");
    if let Err(e) = identity.sign_out(cookies).await {
        tracing::warn!(error = %e, "sign-out after account deletion failed");
    }
    Ok(())
}

#[cfg(test)]
#[path = "account_test.rs"]
mod tests;
