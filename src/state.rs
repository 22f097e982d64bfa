//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! Everything in it is immutable after start-up or internally synchronized:
//! the identity backend handle, the session resolver, the content store, and
//! the content gate. Per-request state lives in
//! [`SessionScope`](crate::services::session::SessionScope), never here.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::content::ContentStore;
use crate::identity::SharedIdentity;
use crate::services::gate::{ContentGate, GuideSource, LocalGuideSource};
use crate::services::session::SessionResolver;

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped or Clone.
#[derive(Clone)]
pub struct AppState {
    pub identity: SharedIdentity,
    pub resolver: SessionResolver,
    pub content: Arc<ContentStore>,
    pub gate: Arc<ContentGate>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// State whose gate fetches guides through the in-process endpoint logic.
    #[must_use]
    pub fn new(identity: SharedIdentity, content: ContentStore, config: AppConfig) -> Self {
        let resolver = SessionResolver::new(identity.clone());
        let content = Arc::new(content);
        let source = Arc::new(LocalGuideSource::new(resolver.clone(), content.clone()));
        let gate = Arc::new(ContentGate::new(source, config.sign_in_path.clone()));
        Self { identity, resolver, content, gate, config: Arc::new(config) }
    }

    /// Replace the channel the gate fetches guides through.
    #[must_use]
    pub fn with_guide_source(mut self, source: Arc<dyn GuideSource>) -> Self {
        self.gate = Arc::new(ContentGate::new(source, self.config.sign_in_path.clone()));
        self
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
