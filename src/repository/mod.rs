use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::RepoError,
    models::{
        Category, Comment, CreateCategoryRequest, CreateLocationRequest, CreatePostRequest,
        Location, Post, UpdatePostRequest, UpdateProfileRequest, User,
    },
};

mod memory;
mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

pub type RepoResult<T> = Result<T, RepoError>;

/// PostScope
///
/// Which candidate posts a listing starts from. Visibility is *not* applied here; the
/// handlers run the candidates through `visibility::filter_visible_posts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostScope {
    All,
    Category(Uuid),
    Author(Uuid),
}

/// Repository
///
/// Persistence contract used by the handlers. Implementations return candidates and raw
/// records; they never decide who may see or change them.
///
/// Post listings are ordered by `pub_date` descending, comments by creation time
/// ascending. Lookup misses are `Ok(None)`/`Ok(false)`, never errors.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> RepoResult<Option<User>>;
    /// Fails with `RepoError::Duplicate` when the username is taken.
    async fn create_user(&self, user: User) -> RepoResult<User>;
    async fn update_user(&self, id: Uuid, req: UpdateProfileRequest) -> RepoResult<Option<User>>;

    // --- Categories & Locations (staff managed) ---
    async fn list_categories(&self) -> RepoResult<Vec<Category>>;
    async fn get_category_by_slug(&self, slug: &str) -> RepoResult<Option<Category>>;
    async fn create_category(&self, req: CreateCategoryRequest) -> RepoResult<Category>;
    async fn set_category_published(&self, slug: &str, is_published: bool) -> RepoResult<Option<Category>>;
    async fn list_locations(&self) -> RepoResult<Vec<Location>>;
    async fn create_location(&self, req: CreateLocationRequest) -> RepoResult<Location>;
    async fn set_location_published(&self, id: Uuid, is_published: bool) -> RepoResult<Option<Location>>;

    // --- Posts ---
    async fn list_posts(&self, scope: PostScope) -> RepoResult<Vec<Post>>;
    async fn get_post(&self, id: Uuid) -> RepoResult<Option<Post>>;
    /// Fails with `RepoError::MissingReference` naming an unknown author, category or
    /// location.
    async fn create_post(&self, req: CreatePostRequest, author_id: Uuid) -> RepoResult<Post>;
    async fn update_post(&self, id: Uuid, req: UpdatePostRequest) -> RepoResult<Option<Post>>;
    /// Deleting a post removes its comments.
    async fn delete_post(&self, id: Uuid) -> RepoResult<bool>;

    // --- Comments ---
    async fn list_comments(&self, post_id: Uuid) -> RepoResult<Vec<Comment>>;
    async fn get_comment(&self, id: i64) -> RepoResult<Option<Comment>>;
    async fn add_comment(&self, post_id: Uuid, author_id: Uuid, text: String) -> RepoResult<Comment>;
    async fn update_comment(&self, id: i64, text: String) -> RepoResult<Option<Comment>>;
    async fn delete_comment(&self, id: i64) -> RepoResult<bool>;
}

/// RepositoryState
///
/// The shared handle stored in `AppState`.
pub type RepositoryState = Arc<dyn Repository>;
