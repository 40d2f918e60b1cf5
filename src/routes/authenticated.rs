use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// Everything that writes. Ownership is decided in the handlers by the rule engine:
/// posts and comments by their author or staff, profiles by their owner only.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        .route("/me", get(handlers::get_me))
        .route("/profile/{username}", put(handlers::edit_profile))
        .route("/posts", post(handlers::create_post))
        .route(
            "/posts/{id}",
            put(handlers::update_post).delete(handlers::delete_post),
        )
        // Commenting requires the post to be visible to the caller.
        .route("/posts/{id}/comments", post(handlers::add_comment))
        .route(
            "/posts/{id}/comments/{comment_id}",
            put(handlers::edit_comment).delete(handlers::delete_comment),
        )
        // Image uploads go straight to object storage through a presigned URL.
        .route("/upload/presigned", post(handlers::get_presigned_url))
}
