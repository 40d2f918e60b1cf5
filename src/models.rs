use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::sync::LazyLock;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::pagination::Page;

/// Upper bound shared by every title/name column.
pub const MAX_TITLE_LEN: usize = 256;

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// Canonical account record from the `users` table. The password hash never leaves
/// the server: it is skipped during serialization and absent from the API schema.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow, Default)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip)]
    pub password_hash: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub date_joined: DateTime<Utc>,
}

/// Category
///
/// Staff-managed grouping of posts. An unpublished category hides its posts from
/// everyone except their authors and staff.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Category {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    /// Unique URL identifier.
    pub slug: String,
    pub is_published: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// Location
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Location {
    pub id: Uuid,
    pub name: String,
    pub is_published: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// Post
///
/// A blog publication joined with its author, category and location.
///
/// `category_is_published` is `None` when the post has no category; the visibility
/// rules treat that as published. `location_name` is `None` when the location is
/// missing or unpublished.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub text: String,
    /// May lie in the future for scheduled publications.
    #[ts(type = "string")]
    pub pub_date: DateTime<Utc>,
    pub is_published: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,

    pub author_id: Uuid,
    pub author_username: String,

    pub category_id: Option<Uuid>,
    pub category_slug: Option<String>,
    pub category_title: Option<String>,
    pub category_is_published: Option<bool>,

    pub location_id: Option<Uuid>,
    pub location_name: Option<String>,

    // S3 key of the attached image.
    pub image: Option<String>,

    pub comment_count: i64,
}

/// Comment
///
/// A comment row joined with its author's username.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Comment {
    pub id: i64,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub text: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

// --- Request Payloads (Input Schemas) ---

/// RegisterUserRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct RegisterUserRequest {
    #[validate(
        length(min = 1, max = 150, message = "username must be between 1 and 150 characters"),
        regex(path = *USERNAME_RE, message = "username may only contain letters, digits and @/./+/-/_")
    )]
    pub username: String,
    #[validate(email(message = "email address is not valid"))]
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "passwords do not match"))]
    pub password_confirmation: String,
}

/// LoginRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// UpdateProfileRequest
///
/// Partial profile update; omitted fields keep their stored value.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct UpdateProfileRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(
        length(min = 1, max = 150, message = "username must be between 1 and 150 characters"),
        regex(path = *USERNAME_RE, message = "username may only contain letters, digits and @/./+/-/_")
    )]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(email(message = "email address is not valid"))]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

/// CreatePostRequest
///
/// `pub_date` defaults to the time of creation and `is_published` to true.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreatePostRequest {
    #[validate(
        length(max = 256, message = "title must be at most 256 characters"),
        custom(function = "not_blank")
    )]
    pub title: String,
    #[validate(custom(function = "not_blank"))]
    pub text: String,
    #[serde(default)]
    #[ts(type = "string | null")]
    pub pub_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_published: Option<bool>,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub location_id: Option<Uuid>,
    /// S3 key returned by the presigned upload flow.
    #[serde(default)]
    pub image_key: Option<String>,
}

/// UpdatePostRequest
///
/// Partial update for an existing post (PUT /posts/{id}). A post's location and
/// image are optional: `clear_location` / `clear_image` detach them and win over
/// `location_id` / `image_key` sent in the same request.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct UpdatePostRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(
        length(max = 256, message = "title must be at most 256 characters"),
        custom(function = "not_blank")
    )]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "not_blank"))]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(type = "string | null")]
    pub pub_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_published: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_key: Option<String>,
    #[serde(default)]
    pub clear_location: bool,
    #[serde(default)]
    pub clear_image: bool,
}

/// CommentRequest
///
/// Body for both creating and editing a comment.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CommentRequest {
    #[validate(custom(function = "not_blank"))]
    pub text: String,
}

/// CreateCategoryRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateCategoryRequest {
    #[validate(
        length(max = 256, message = "title must be at most 256 characters"),
        custom(function = "not_blank")
    )]
    pub title: String,
    pub description: String,
    #[validate(regex(
        path = *SLUG_RE,
        message = "slug may only contain latin letters, digits, hyphens and underscores"
    ))]
    pub slug: String,
    #[serde(default)]
    pub is_published: Option<bool>,
}

/// CreateLocationRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateLocationRequest {
    #[validate(
        length(max = 256, message = "name must be at most 256 characters"),
        custom(function = "not_blank")
    )]
    pub name: String,
    #[serde(default)]
    pub is_published: Option<bool>,
}

/// PresignedUrlRequest
///
/// Input payload for requesting a short-lived upload URL for a post image.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct PresignedUrlRequest {
    /// The original filename, used to derive the file extension.
    #[schema(example = "sunset.jpg")]
    pub filename: String,
    /// Must be an `image/*` MIME type.
    #[schema(example = "image/jpeg")]
    pub file_type: String,
}

/// StatusUpdate
///
/// Body of the staff publish/hide endpoints.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct StatusUpdate {
    pub is_published: bool,
}

// --- Output Schemas ---

/// PresignedUrlResponse
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct PresignedUrlResponse {
    /// The time-limited URL for the PUT request.
    pub upload_url: String,
    /// The object key to reference from `image_key`.
    pub resource_key: String,
}

/// UserProfile
///
/// Public view of a user.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_staff: bool,
    #[ts(type = "string")]
    pub date_joined: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            is_staff: user.is_staff || user.is_superuser,
            date_joined: user.date_joined,
        }
    }
}

/// TokenResponse
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    /// Lifetime in seconds.
    pub expires_in: i64,
    pub user: UserProfile,
}

/// PostDetail
///
/// A single post with its comments in chronological order.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PostDetail {
    pub post: Post,
    pub comments: Vec<Comment>,
}

/// ProfileResponse
///
/// A user's public profile with the page of their posts the viewer may see.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProfileResponse {
    pub profile: UserProfile,
    pub posts: Page<Post>,
}

// --- Validation ---

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.@+-]+$").expect("username pattern is valid"));

static SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("slug pattern is valid"));

/// Rejects values made only of whitespace.
fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be empty".into());
        return Err(err);
    }
    Ok(())
}
