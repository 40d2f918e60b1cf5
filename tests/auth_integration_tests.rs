use axum::{
    extract::FromRequestParts,
    http::{Method, Request, StatusCode, Uri, header, request::Parts},
};
use blogicum::{
    AppError, AppState, InMemoryRepository, MockStorageService,
    auth::{AuthUser, Claims, issue_token},
    config::{AppConfig, Env},
    models::User,
    repository::Repository,
    visibility::Viewer,
};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use std::{sync::Arc, time::SystemTime};
use uuid::Uuid;

// --- Helper Functions ---

const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";

fn create_token(user_id: Uuid, secret: &str, exp_offset: i64) -> String {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;

    let claims = Claims {
        sub: user_id,
        iat: now as usize,
        exp: (now + exp_offset) as usize,
    };

    let key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), &claims, &key).unwrap()
}

fn test_user(is_staff: bool) -> User {
    User {
        id: Uuid::new_v4(),
        username: format!("user-{}", Uuid::new_v4().simple()),
        email: "reader@example.com".to_string(),
        is_staff,
        date_joined: Utc::now(),
        ..User::default()
    }
}

async fn create_app_state(env: Env, users: Vec<User>) -> AppState {
    let repo = InMemoryRepository::new();
    for user in users {
        repo.create_user(user).await.unwrap();
    }

    let config = AppConfig {
        env,
        jwt_secret: TEST_JWT_SECRET.to_string(),
        ..AppConfig::default()
    };

    AppState {
        repo: Arc::new(repo),
        storage: Arc::new(MockStorageService::new()),
        config,
    }
}

fn get_request_parts(method: Method, uri: Uri) -> Parts {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let (parts, _) = request.into_parts();
    parts
}

fn with_bearer(parts: &mut Parts, token: &str) {
    parts.headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    );
}

// --- AuthUser ---

#[tokio::test]
async fn test_auth_success_with_valid_jwt() {
    let user = test_user(false);
    let app_state = create_app_state(Env::Production, vec![user.clone()]).await;

    let mut parts = get_request_parts(Method::GET, "/me".parse().unwrap());
    with_bearer(&mut parts, &create_token(user.id, TEST_JWT_SECRET, 3600));

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();

    assert_eq!(auth_user.id, user.id);
    assert_eq!(auth_user.username, user.username);
    assert!(!auth_user.is_staff);
}

#[tokio::test]
async fn test_token_from_issue_token_is_accepted() {
    let user = test_user(true);
    let app_state = create_app_state(Env::Production, vec![user.clone()]).await;
    let token = issue_token(&app_state.config, user.id).unwrap();

    let mut parts = get_request_parts(Method::GET, "/me".parse().unwrap());
    with_bearer(&mut parts, &token);

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert!(auth_user.is_privileged());
}

#[tokio::test]
async fn test_auth_failure_with_missing_header() {
    let app_state = create_app_state(Env::Production, vec![]).await;
    let mut parts = get_request_parts(Method::GET, "/me".parse().unwrap());

    let err = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap_err();

    assert_eq!(err, AppError::Unauthorized);
    assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_failure_with_expired_jwt() {
    let user = test_user(false);
    let app_state = create_app_state(Env::Production, vec![user.clone()]).await;

    let mut parts = get_request_parts(Method::GET, "/me".parse().unwrap());
    with_bearer(&mut parts, &create_token(user.id, TEST_JWT_SECRET, -3600));

    let err = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap_err();
    assert_eq!(err, AppError::Unauthorized);
}

#[tokio::test]
async fn test_auth_failure_with_foreign_signature() {
    let user = test_user(false);
    let app_state = create_app_state(Env::Production, vec![user.clone()]).await;

    let mut parts = get_request_parts(Method::GET, "/me".parse().unwrap());
    with_bearer(&mut parts, &create_token(user.id, "someone-elses-secret", 3600));

    assert!(AuthUser::from_request_parts(&mut parts, &app_state).await.is_err());
}

#[tokio::test]
async fn test_auth_failure_for_deleted_account() {
    let app_state = create_app_state(Env::Production, vec![]).await;

    let mut parts = get_request_parts(Method::GET, "/me".parse().unwrap());
    with_bearer(&mut parts, &create_token(Uuid::new_v4(), TEST_JWT_SECRET, 3600));

    let err = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap_err();
    assert_eq!(err, AppError::Unauthorized);
}

#[tokio::test]
async fn test_auth_failure_with_non_bearer_scheme() {
    let app_state = create_app_state(Env::Production, vec![]).await;

    let mut parts = get_request_parts(Method::GET, "/me".parse().unwrap());
    parts.headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_static("Basic dXNlcjpwYXNz"),
    );

    assert!(AuthUser::from_request_parts(&mut parts, &app_state).await.is_err());
}

#[tokio::test]
async fn test_local_bypass_success() {
    let user = test_user(true);
    let app_state = create_app_state(Env::Local, vec![user.clone()]).await;

    let mut parts = get_request_parts(Method::GET, "/me".parse().unwrap());
    parts.headers.insert(
        header::HeaderName::from_static("x-user-id"),
        header::HeaderValue::from_str(&user.id.to_string()).unwrap(),
    );

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert_eq!(auth_user.id, user.id);
    assert!(auth_user.is_staff);
}

#[tokio::test]
async fn test_local_bypass_disabled_in_prod() {
    let user = test_user(false);
    let app_state = create_app_state(Env::Production, vec![user.clone()]).await;

    let mut parts = get_request_parts(Method::GET, "/me".parse().unwrap());
    parts.headers.insert(
        header::HeaderName::from_static("x-user-id"),
        header::HeaderValue::from_str(&user.id.to_string()).unwrap(),
    );

    let err = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
}

// --- Viewer ---

#[tokio::test]
async fn test_viewer_without_credentials_is_anonymous() {
    let app_state = create_app_state(Env::Production, vec![]).await;
    let mut parts = get_request_parts(Method::GET, "/posts".parse().unwrap());

    let viewer = Viewer::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert_eq!(viewer, Viewer::Anonymous);
}

#[tokio::test]
async fn test_viewer_carries_staff_flag() {
    let user = test_user(true);
    let app_state = create_app_state(Env::Production, vec![user.clone()]).await;

    let mut parts = get_request_parts(Method::GET, "/posts".parse().unwrap());
    with_bearer(&mut parts, &create_token(user.id, TEST_JWT_SECRET, 3600));

    let viewer = Viewer::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert_eq!(viewer.id(), Some(user.id));
    assert!(viewer.is_privileged());
}

#[tokio::test]
async fn test_viewer_with_bad_token_is_rejected() {
    let app_state = create_app_state(Env::Production, vec![]).await;

    let mut parts = get_request_parts(Method::GET, "/posts".parse().unwrap());
    with_bearer(&mut parts, "not-a-jwt");

    let err = Viewer::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap_err();
    assert_eq!(err, AppError::Unauthorized);
}
