//! Blog routes: published post summaries.

use axum::extract::State;
use axum::response::Json;

use crate::content::BlogPost;
use crate::state::AppState;

/// `GET /api/blog`: published posts, newest first.
pub async fn list_posts(State(state): State<AppState>) -> Json<Vec<BlogPost>> {
    Json(state.content.published_posts().into_iter().cloned().collect())
}

#[cfg(test)]
#[path = "blog_test.rs"]
mod tests;
