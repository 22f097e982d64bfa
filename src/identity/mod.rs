//! Identity: capability interface over the hosted identity provider.
//!
//! DESIGN
//! ======
//! The application never authenticates anyone itself. Everything it needs
//! from an identity provider is captured by [`IdentityBackend`], so the
//! hosted backend can be swapped for the in-memory one (development, tests)
//! or any other provider without touching the session resolver.
//!
//! Backends read and rewrite session cookies only through [`CookieAccess`].
//! The caller decides whether writes actually reach the outgoing response.

pub mod cookies;
pub mod memory;
pub mod supabase;
pub mod types;

use std::sync::Arc;

use axum_extra::extract::cookie::Cookie;

pub use types::{Credentials, IdentityError, Principal, ProfileUpdate, Role};

// =============================================================================
// COOKIE CONTRACT
// =============================================================================

/// Read/write view over the cookies of the current request.
pub trait CookieAccess: Send + Sync {
    /// Every cookie currently visible to the request.
    fn get_all(&self) -> Vec<Cookie<'static>>;

    /// Queue cookie mutations for the outgoing response.
    ///
    /// Implementations may drop writes when the execution context forbids
    /// setting cookies; backends must not treat that as a failure.
    fn set_all(&self, cookies: Vec<Cookie<'static>>);
}

// =============================================================================
// BACKEND
// =============================================================================

/// Operations the application relies on from an identity provider.
#[async_trait::async_trait]
pub trait IdentityBackend: Send + Sync {
    /// Resolve the principal bound to the request's session cookies,
    /// refreshing the session (and rewriting cookies) when needed.
    async fn current_principal(&self, cookies: &dyn CookieAccess) -> Result<Principal, IdentityError>;

    /// Authenticate with email/password and write the new session cookies.
    async fn sign_in_with_credentials(
        &self,
        credentials: &Credentials,
        cookies: &dyn CookieAccess,
    ) -> Result<Principal, IdentityError>;

    /// Exchange the stored refresh token for a new session.
    async fn refresh_session(&self, cookies: &dyn CookieAccess) -> Result<(), IdentityError>;

    /// End the session and clear its cookies.
    async fn sign_out(&self, cookies: &dyn CookieAccess) -> Result<(), IdentityError>;

    /// Create a new account.
    async fn register(&self, credentials: &Credentials) -> Result<Principal, IdentityError>;

    /// Apply a profile update to an existing principal.
    async fn update_profile(&self, id: &str, update: &ProfileUpdate) -> Result<Principal, IdentityError>;

    /// Permanently delete a principal.
    async fn delete_principal(&self, id: &str) -> Result<(), IdentityError>;
}

/// Shared handle stored in application state.
pub type SharedIdentity = Arc<dyn IdentityBackend>;
