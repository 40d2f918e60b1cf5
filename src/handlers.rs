use crate::{
    AppState,
    auth::{self, AuthUser},
    error::{AppError, AppResult, ErrorBody},
    models::{
        Category, Comment, CommentRequest, CreateCategoryRequest, CreateLocationRequest,
        CreatePostRequest, Location, LoginRequest, Post, PostDetail, PresignedUrlRequest,
        PresignedUrlResponse, ProfileResponse, RegisterUserRequest, StatusUpdate, TokenResponse,
        UpdatePostRequest, UpdateProfileRequest, User, UserProfile,
    },
    pagination::{Page, PageQuery, paginate},
    repository::PostScope,
    storage::{image_key_for, is_image_content_type},
    visibility::{
        AuthorizationError, MutationTarget, Viewer, authorize_mutation, authorize_self_edit,
        ensure_authorized, filter_visible_posts, is_visible,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

// --- Helpers ---

/// Loads a post and hides it (404) from viewers who may not see it.
async fn visible_post(state: &AppState, viewer: &Viewer, id: Uuid) -> AppResult<Post> {
    state
        .repo
        .get_post(id)
        .await?
        .filter(|post| is_visible(viewer, post, Utc::now()))
        .ok_or(AppError::NotFound("post"))
}

fn require_staff(user: &AuthUser) -> AppResult<()> {
    if user.is_privileged() {
        return Ok(());
    }
    tracing::warn!(user_id = %user.id, "staff-only endpoint refused");
    Err(AuthorizationError::StaffOnly.into())
}

fn deny(viewer: &Viewer, err: AuthorizationError) -> AppError {
    tracing::warn!(viewer = ?viewer.id(), reason = %err, "mutation refused");
    AppError::Forbidden(err)
}

/// Visible posts from `scope`, paginated with the configured page size.
async fn visible_page(
    state: &AppState,
    viewer: &Viewer,
    scope: PostScope,
    query: &PageQuery,
) -> AppResult<Page<Post>> {
    let candidates = state.repo.list_posts(scope).await?;
    let visible = filter_visible_posts(viewer, candidates, Utc::now());
    Ok(paginate(
        visible,
        query.page.as_deref(),
        state.config.posts_per_page,
    ))
}

// --- Accounts ---

/// register_user
///
/// [Public Route] Creates a regular (non-staff) account.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterUserRequest,
    responses(
        (status = 201, description = "Registered", body = UserProfile),
        (status = 409, description = "Username taken", body = ErrorBody),
        (status = 422, description = "Invalid input", body = ErrorBody)
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<RegisterUserRequest>,
) -> AppResult<(StatusCode, Json<UserProfile>)> {
    payload.validate()?;

    let user = User {
        id: Uuid::new_v4(),
        username: payload.username,
        email: payload.email,
        first_name: payload.first_name.unwrap_or_default(),
        last_name: payload.last_name.unwrap_or_default(),
        password_hash: auth::hash_password(&payload.password)?,
        is_staff: false,
        is_superuser: false,
        date_joined: Utc::now(),
    };

    let created = state.repo.create_user(user).await?;
    tracing::info!(user_id = %created.id, username = %created.username, "user registered");
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// login
///
/// [Public Route] Exchanges a username and password for a bearer token.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 401, description = "Bad credentials", body = ErrorBody)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let user = state
        .repo
        .get_user_by_username(&payload.username)
        .await?
        .filter(|user| auth::verify_password(&payload.password, &user.password_hash))
        .ok_or_else(|| {
            tracing::info!(username = %payload.username, "failed login");
            AppError::Unauthorized
        })?;

    let access_token = auth::issue_token(&state.config, user.id)?;
    Ok(Json(TokenResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.config.jwt_ttl_seconds,
        user: user.into(),
    }))
}

/// get_me
///
/// [Authenticated Route] The caller's own profile.
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Profile", body = UserProfile),
        (status = 401, description = "Not logged in", body = ErrorBody)
    )
)]
pub async fn get_me(user: AuthUser, State(state): State<AppState>) -> AppResult<Json<UserProfile>> {
    state
        .repo
        .get_user(user.id)
        .await?
        .map(|u| Json(u.into()))
        .ok_or(AppError::NotFound("user"))
}

/// get_profile
///
/// [Public Route] A user's profile and their posts. The owner sees every post of
/// theirs, scheduled and hidden ones included; other viewers only the visible ones.
#[utoipa::path(
    get,
    path = "/profile/{username}",
    params(("username" = String, Path, description = "Username"), PageQuery),
    responses(
        (status = 200, description = "Profile", body = ProfileResponse),
        (status = 404, description = "No such user", body = ErrorBody)
    )
)]
pub async fn get_profile(
    viewer: Viewer,
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<ProfileResponse>> {
    let user = state
        .repo
        .get_user_by_username(&username)
        .await?
        .ok_or(AppError::NotFound("user"))?;

    let posts = visible_page(&state, &viewer, PostScope::Author(user.id), &query).await?;
    Ok(Json(ProfileResponse {
        profile: user.into(),
        posts,
    }))
}

/// edit_profile
///
/// [Authenticated Route] Users may edit only their own profile; staff get no override.
#[utoipa::path(
    put,
    path = "/profile/{username}",
    params(("username" = String, Path, description = "Username")),
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated", body = UserProfile),
        (status = 403, description = "Not your profile", body = ErrorBody),
        (status = 404, description = "No such user", body = ErrorBody)
    )
)]
pub async fn edit_profile(
    user: AuthUser,
    State(state): State<AppState>,
    Path(username): Path<String>,
    Json(payload): Json<UpdateProfileRequest>,
) -> AppResult<Json<UserProfile>> {
    let viewer = user.viewer();
    let target = state
        .repo
        .get_user_by_username(&username)
        .await?
        .ok_or(AppError::NotFound("user"))?;

    if !authorize_self_edit(&viewer, &target) {
        return Err(deny(&viewer, AuthorizationError::NotSelf));
    }
    payload.validate()?;

    let updated = state
        .repo
        .update_user(target.id, payload)
        .await?
        .ok_or(AppError::NotFound("user"))?;
    tracing::info!(user_id = %updated.id, "profile updated");
    Ok(Json(updated.into()))
}

// --- Posts ---

/// list_posts
///
/// [Public Route] The feed: every post visible to the viewer, newest first.
#[utoipa::path(
    get,
    path = "/posts",
    params(PageQuery),
    responses((status = 200, description = "Visible posts", body = Page<Post>))
)]
pub async fn list_posts(
    viewer: Viewer,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Page<Post>>> {
    visible_page(&state, &viewer, PostScope::All, &query)
        .await
        .map(Json)
}

/// category_posts
///
/// [Public Route] Visible posts of a published category.
#[utoipa::path(
    get,
    path = "/category/{slug}",
    params(("slug" = String, Path, description = "Category slug"), PageQuery),
    responses(
        (status = 200, description = "Visible posts", body = Page<Post>),
        (status = 404, description = "Unknown or unpublished category", body = ErrorBody)
    )
)]
pub async fn category_posts(
    viewer: Viewer,
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Page<Post>>> {
    let category = state
        .repo
        .get_category_by_slug(&slug)
        .await?
        .filter(|c| c.is_published)
        .ok_or(AppError::NotFound("category"))?;

    visible_page(&state, &viewer, PostScope::Category(category.id), &query)
        .await
        .map(Json)
}

/// get_post
///
/// [Public Route] A single post with its comments, oldest comment first.
#[utoipa::path(
    get,
    path = "/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Found", body = PostDetail),
        (status = 404, description = "Missing or not visible", body = ErrorBody)
    )
)]
pub async fn get_post(
    viewer: Viewer,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PostDetail>> {
    let post = visible_post(&state, &viewer, id).await?;
    let comments = state.repo.list_comments(post.id).await?;
    Ok(Json(PostDetail { post, comments }))
}

/// create_post
///
/// [Authenticated Route] The caller becomes the author.
#[utoipa::path(
    post,
    path = "/posts",
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Created", body = Post),
        (status = 422, description = "Invalid input", body = ErrorBody)
    )
)]
pub async fn create_post(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreatePostRequest>,
) -> AppResult<(StatusCode, Json<Post>)> {
    payload.validate()?;
    let post = state.repo.create_post(payload, user.id).await?;
    tracing::info!(post_id = %post.id, author = %user.username, "post created");
    Ok((StatusCode::CREATED, Json(post)))
}

/// update_post
///
/// [Authenticated Route] Author or staff only.
#[utoipa::path(
    put,
    path = "/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    request_body = UpdatePostRequest,
    responses(
        (status = 200, description = "Updated", body = Post),
        (status = 403, description = "Not the author", body = ErrorBody),
        (status = 404, description = "Missing or not visible", body = ErrorBody)
    )
)]
pub async fn update_post(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePostRequest>,
) -> AppResult<Json<Post>> {
    let viewer = user.viewer();
    let post = visible_post(&state, &viewer, id).await?;
    if !authorize_mutation(&viewer, &post) {
        return Err(deny(&viewer, AuthorizationError::NotAuthorOrStaff));
    }
    payload.validate()?;

    let updated = state
        .repo
        .update_post(id, payload)
        .await?
        .ok_or(AppError::NotFound("post"))?;
    tracing::info!(post_id = %id, editor = %user.username, "post updated");
    Ok(Json(updated))
}

/// delete_post
///
/// [Authenticated Route] Author or staff only. Removes the post's comments too.
#[utoipa::path(
    delete,
    path = "/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the author", body = ErrorBody),
        (status = 404, description = "Missing or not visible", body = ErrorBody)
    )
)]
pub async fn delete_post(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let viewer = user.viewer();
    let post = visible_post(&state, &viewer, id).await?;
    if !authorize_mutation(&viewer, &post) {
        return Err(deny(&viewer, AuthorizationError::NotAuthorOrStaff));
    }

    if !state.repo.delete_post(id).await? {
        return Err(AppError::NotFound("post"));
    }
    tracing::info!(post_id = %id, editor = %user.username, "post deleted");
    Ok(StatusCode::NO_CONTENT)
}

// --- Comments ---

/// get_comments
///
/// [Public Route] Comments of a visible post in chronological order.
#[utoipa::path(
    get,
    path = "/posts/{id}/comments",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Comments", body = [Comment]),
        (status = 404, description = "Missing or not visible", body = ErrorBody)
    )
)]
pub async fn get_comments(
    viewer: Viewer,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Comment>>> {
    let post = visible_post(&state, &viewer, id).await?;
    Ok(Json(state.repo.list_comments(post.id).await?))
}

/// add_comment
///
/// [Authenticated Route] Any logged-in user may comment on a post they can see.
#[utoipa::path(
    post,
    path = "/posts/{id}/comments",
    params(("id" = Uuid, Path, description = "Post ID")),
    request_body = CommentRequest,
    responses(
        (status = 201, description = "Comment added", body = Comment),
        (status = 404, description = "Missing or not visible", body = ErrorBody)
    )
)]
pub async fn add_comment(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CommentRequest>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    let post = visible_post(&state, &user.viewer(), id).await?;
    payload.validate()?;

    let comment = state.repo.add_comment(post.id, user.id, payload.text).await?;
    tracing::info!(post_id = %post.id, comment_id = comment.id, "comment added");
    Ok((StatusCode::CREATED, Json(comment)))
}

/// Loads a comment that belongs to a post the viewer can see.
async fn comment_on_visible_post(
    state: &AppState,
    viewer: &Viewer,
    post_id: Uuid,
    comment_id: i64,
) -> AppResult<Comment> {
    let post = visible_post(state, viewer, post_id).await?;
    state
        .repo
        .get_comment(comment_id)
        .await?
        .filter(|c| c.post_id == post.id)
        .ok_or(AppError::NotFound("comment"))
}

/// edit_comment
///
/// [Authenticated Route] Comment author or staff only.
#[utoipa::path(
    put,
    path = "/posts/{id}/comments/{comment_id}",
    params(
        ("id" = Uuid, Path, description = "Post ID"),
        ("comment_id" = i64, Path, description = "Comment ID")
    ),
    request_body = CommentRequest,
    responses(
        (status = 200, description = "Updated", body = Comment),
        (status = 403, description = "Not the author", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn edit_comment(
    user: AuthUser,
    State(state): State<AppState>,
    Path((post_id, comment_id)): Path<(Uuid, i64)>,
    Json(payload): Json<CommentRequest>,
) -> AppResult<Json<Comment>> {
    let viewer = user.viewer();
    let comment = comment_on_visible_post(&state, &viewer, post_id, comment_id).await?;
    ensure_authorized(&viewer, MutationTarget::resource(&comment))
        .map_err(|e| deny(&viewer, e))?;
    payload.validate()?;

    let updated = state
        .repo
        .update_comment(comment.id, payload.text)
        .await?
        .ok_or(AppError::NotFound("comment"))?;
    tracing::info!(comment_id = updated.id, editor = %user.username, "comment updated");
    Ok(Json(updated))
}

/// delete_comment
///
/// [Authenticated Route] Comment author or staff only.
#[utoipa::path(
    delete,
    path = "/posts/{id}/comments/{comment_id}",
    params(
        ("id" = Uuid, Path, description = "Post ID"),
        ("comment_id" = i64, Path, description = "Comment ID")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the author", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn delete_comment(
    user: AuthUser,
    State(state): State<AppState>,
    Path((post_id, comment_id)): Path<(Uuid, i64)>,
) -> AppResult<StatusCode> {
    let viewer = user.viewer();
    let comment = comment_on_visible_post(&state, &viewer, post_id, comment_id).await?;
    ensure_authorized(&viewer, MutationTarget::resource(&comment))
        .map_err(|e| deny(&viewer, e))?;

    if !state.repo.delete_comment(comment.id).await? {
        return Err(AppError::NotFound("comment"));
    }
    tracing::info!(comment_id, editor = %user.username, "comment deleted");
    Ok(StatusCode::NO_CONTENT)
}

// --- Media ---

/// get_presigned_url
///
/// [Authenticated Route] Short-lived upload URL for a post image. The returned
/// `resource_key` goes into `image_key` when creating or editing a post.
#[utoipa::path(
    post,
    path = "/upload/presigned",
    request_body = PresignedUrlRequest,
    responses(
        (status = 200, description = "URL", body = PresignedUrlResponse),
        (status = 422, description = "Not an image", body = ErrorBody)
    )
)]
pub async fn get_presigned_url(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<PresignedUrlRequest>,
) -> AppResult<Json<PresignedUrlResponse>> {
    if !is_image_content_type(&payload.file_type) {
        return Err(AppError::Validation(format!(
            "only image uploads are accepted, got {:?}",
            payload.file_type
        )));
    }

    let object_key = image_key_for(&payload.filename);
    let upload_url = state
        .storage
        .presign_upload(&object_key, &payload.file_type)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    tracing::debug!(user_id = %user.id, key = %object_key, "presigned image upload");
    Ok(Json(PresignedUrlResponse {
        upload_url,
        resource_key: object_key,
    }))
}

// --- Catalogue ---

/// list_categories
///
/// [Public Route] Published categories.
#[utoipa::path(
    get,
    path = "/categories",
    responses((status = 200, description = "Categories", body = [Category]))
)]
pub async fn list_categories(State(state): State<AppState>) -> AppResult<Json<Vec<Category>>> {
    let mut categories = state.repo.list_categories().await?;
    categories.retain(|c| c.is_published);
    Ok(Json(categories))
}

/// list_locations
///
/// [Public Route] Published locations.
#[utoipa::path(
    get,
    path = "/locations",
    responses((status = 200, description = "Locations", body = [Location]))
)]
pub async fn list_locations(State(state): State<AppState>) -> AppResult<Json<Vec<Location>>> {
    let mut locations = state.repo.list_locations().await?;
    locations.retain(|l| l.is_published);
    Ok(Json(locations))
}

// --- Staff ---

/// admin_list_posts
///
/// [Admin Route] Every post regardless of publication state or date.
#[utoipa::path(
    get,
    path = "/admin/posts",
    params(PageQuery),
    responses(
        (status = 200, description = "All posts", body = Page<Post>),
        (status = 403, description = "Staff only", body = ErrorBody)
    )
)]
pub async fn admin_list_posts(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Page<Post>>> {
    require_staff(&user)?;
    let posts = state.repo.list_posts(PostScope::All).await?;
    Ok(Json(paginate(
        posts,
        query.page.as_deref(),
        state.config.posts_per_page,
    )))
}

/// create_category
#[utoipa::path(
    post,
    path = "/admin/categories",
    request_body = CreateCategoryRequest,
    responses(
        (status = 201, description = "Created", body = Category),
        (status = 403, description = "Staff only", body = ErrorBody),
        (status = 409, description = "Slug taken", body = ErrorBody)
    )
)]
pub async fn create_category(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateCategoryRequest>,
) -> AppResult<(StatusCode, Json<Category>)> {
    require_staff(&user)?;
    payload.validate()?;
    let category = state.repo.create_category(payload).await?;
    tracing::info!(slug = %category.slug, "category created");
    Ok((StatusCode::CREATED, Json(category)))
}

/// set_category_status
///
/// [Admin Route] Publishing or hiding a category changes which posts are visible.
#[utoipa::path(
    put,
    path = "/admin/categories/{slug}/status",
    params(("slug" = String, Path, description = "Category slug")),
    request_body = StatusUpdate,
    responses(
        (status = 200, description = "Updated", body = Category),
        (status = 403, description = "Staff only", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn set_category_status(
    user: AuthUser,
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(payload): Json<StatusUpdate>,
) -> AppResult<Json<Category>> {
    require_staff(&user)?;
    let category = state
        .repo
        .set_category_published(&slug, payload.is_published)
        .await?
        .ok_or(AppError::NotFound("category"))?;
    tracing::info!(slug = %slug, is_published = payload.is_published, "category status changed");
    Ok(Json(category))
}

/// create_location
#[utoipa::path(
    post,
    path = "/admin/locations",
    request_body = CreateLocationRequest,
    responses(
        (status = 201, description = "Created", body = Location),
        (status = 403, description = "Staff only", body = ErrorBody)
    )
)]
pub async fn create_location(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateLocationRequest>,
) -> AppResult<(StatusCode, Json<Location>)> {
    require_staff(&user)?;
    payload.validate()?;
    let location = state.repo.create_location(payload).await?;
    tracing::info!(location_id = %location.id, "location created");
    Ok((StatusCode::CREATED, Json(location)))
}

/// set_location_status
#[utoipa::path(
    put,
    path = "/admin/locations/{id}/status",
    params(("id" = Uuid, Path, description = "Location ID")),
    request_body = StatusUpdate,
    responses(
        (status = 200, description = "Updated", body = Location),
        (status = 403, description = "Staff only", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn set_location_status(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusUpdate>,
) -> AppResult<Json<Location>> {
    require_staff(&user)?;
    let location = state
        .repo
        .set_location_published(id, payload.is_published)
        .await?
        .ok_or(AppError::NotFound("location"))?;
    tracing::info!(location_id = %id, is_published = payload.is_published, "location status changed");
    Ok(Json(location))
}
