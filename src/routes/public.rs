use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Read-only browsing plus the account gateway. A request may carry a token; when it
/// does, the author and staff exemptions of the visibility rules apply.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // Liveness check for load balancers.
        .route("/health", get(|| async { "ok" }))
        .route("/auth/register", post(handlers::register_user))
        .route("/auth/login", post(handlers::login))
        // The feed is served at both the root and /posts.
        .route("/", get(handlers::list_posts))
        .route("/posts", get(handlers::list_posts))
        .route("/posts/{id}", get(handlers::get_post))
        .route("/posts/{id}/comments", get(handlers::get_comments))
        // 404 for unknown or unpublished categories.
        .route("/category/{slug}", get(handlers::category_posts))
        .route("/profile/{username}", get(handlers::get_profile))
        .route("/categories", get(handlers::list_categories))
        .route("/locations", get(handlers::list_locations))
}
