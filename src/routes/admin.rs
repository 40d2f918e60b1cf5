use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Admin Router Module
///
/// Moderation endpoints, nested under `/admin`. Each handler takes an `AuthUser` and
/// refuses non-staff callers with 403.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // Unfiltered listing, including drafts and scheduled posts.
        .route("/posts", get(handlers::admin_list_posts))
        .route("/categories", post(handlers::create_category))
        .route(
            "/categories/{slug}/status",
            put(handlers::set_category_status),
        )
        .route("/locations", post(handlers::create_location))
        .route("/locations/{id}/status", put(handlers::set_location_status))
}
