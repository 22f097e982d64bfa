//! Identity types: principal, credentials, and backend errors.
//!
//! Provider-neutral types shared by the hosted and in-memory backends.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by identity backend operations.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// No usable session accompanies the request.
    #[error("auth session missing")]
    SessionMissing,

    /// The refresh token is unknown, revoked, or already used.
    #[error("invalid refresh token")]
    InvalidRefreshToken,

    /// Email/password pair rejected.
    #[error("invalid login credentials")]
    InvalidCredentials,

    /// Registration attempted for an email that already has an account.
    #[error("user already registered")]
    AlreadyRegistered,

    /// Target principal does not exist.
    #[error("user not found")]
    UserNotFound,

    /// The operation needs configuration the backend was not given.
    #[error("identity backend misconfigured: {0}")]
    Misconfigured(String),

    /// The backend could not be reached.
    #[error("identity backend unavailable: {0}")]
    Unavailable(String),

    /// The backend answered with an error status we do not recognize.
    #[error("identity backend error: status {status}")]
    Backend { status: u16, message: String },

    /// The backend answered with a body we could not interpret.
    #[error("unexpected identity response: {0}")]
    Unexpected(String),
}

impl IdentityError {
    /// Recognized "caller simply has no session" categories.
    ///
    /// These are the normal unauthenticated path and are not logged as errors.
    #[must_use]
    pub fn is_no_session(&self) -> bool {
        matches!(self, Self::SessionMissing | Self::InvalidRefreshToken)
    }

    /// Transport-level failures (network, timeouts, 5xx).
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Backend { status: 500..=599, .. })
    }
}

// =============================================================================
// PRINCIPAL
// =============================================================================

/// Role assigned to a principal by the identity backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    #[default]
    User,
}

impl Role {
    /// Parse a role label. Case-insensitive; unknown labels yield `None`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Some(Self::Admin),
            "USER" => Some(Self::User),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::User => "USER",
        }
    }
}

/// The authenticated identity resolved for a request.
///
/// Owned by the identity backend; re-derived on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    /// Opaque backend identifier.
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub role: Role,
    /// When the email address was confirmed, if ever.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub email_verified: Option<OffsetDateTime>,
}

// =============================================================================
// INPUTS
// =============================================================================

/// Email/password pair. The email is expected to be normalized already.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Partial profile update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub role: Option<Role>,
}
