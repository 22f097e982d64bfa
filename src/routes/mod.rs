//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! This module binds the JSON API, the server-rendered guide pages, and the
//! dashboard under a single Axum router. Anything unmatched falls through to
//! static files in `PUBLIC_DIR`, which is where the marketing site lives.

pub mod auth;
pub mod blog;
pub mod guides;
pub mod users;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{delete, get, patch, post};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Full application router with static fallback.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let public = ServeDir::new(&state.config.public_dir).append_index_html_on_directories(true);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/login", get(auth::login_page))
        .route("/register", get(auth::register_page))
        .route("/api/auth/sign-in", post(auth::sign_in))
        .route("/api/auth/sign-out", post(auth::sign_out))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/me", get(auth::me))
        .route("/api/guides/{*slug}", get(guides::get_guide))
        .route("/android", get(guides::android_index))
        .route("/android/{*slug}", get(guides::android_page))
        .route("/ios", get(guides::ios_index))
        .route("/ios/{*slug}", get(guides::ios_page))
        .route("/dashboard", get(guides::dashboard))
        .route("/api/blog", get(blog::list_posts))
        .route("/api/user/name", patch(users::update_name))
        .route("/api/user/role", patch(users::update_role))
        .route("/api/user", delete(users::delete_user))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .fallback_service(public)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
