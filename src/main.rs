mod config;
mod content;
mod identity;
mod render;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use config::{AppConfig, GuideSourceConfig, IdentityConfig};
use identity::memory::MemoryIdentity;
use identity::supabase::SupabaseIdentity;
use identity::{Role, SharedIdentity};
use services::gate::{DEFAULT_FETCH_TIMEOUT_SECS, HttpGuideSource};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = AppConfig::from_env().expect("invalid configuration");

    let identity: SharedIdentity = match &config.identity {
        IdentityConfig::Supabase(supabase) => {
            let backend = SupabaseIdentity::new(supabase.clone()).expect("identity backend init failed");
            tracing::info!(url = %supabase.url, cookie = backend.cookie_key(), "using hosted identity backend");
            Arc::new(backend)
        }
        IdentityConfig::Memory { seed_admin } => {
            tracing::warn!("identity backend not configured; using in-memory accounts (development only)");
            let memory = MemoryIdentity::new(config.cookie_secure);
            if let Some(admin) = seed_admin {
                let principal = memory.seed(admin, Some("Admin".into()), Role::Admin);
                tracing::info!(email = %principal.email, "seeded admin account");
            }
            Arc::new(memory)
        }
    };

    let content = content::ContentStore::load(&config.content_dir).expect("content load failed");

    let port = config.port;
    let guide_source = config.guide_source.clone();
    let mut state = state::AppState::new(identity, content, config);
    if let GuideSourceConfig::Http { base_url } = guide_source {
        let source = HttpGuideSource::new(&base_url, DEFAULT_FETCH_TIMEOUT_SECS).expect("guide source init failed");
        tracing::info!(%base_url, "content gate fetches guides over HTTP");
        state = state.with_guide_source(Arc::new(source));
    }

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "guidegate listening");
    axum::serve(listener, app).await.expect("server failed");
}
