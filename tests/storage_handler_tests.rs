use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use blogicum::{
    AppConfig, AppState, InMemoryRepository, create_router,
    config::Env,
    models::{PresignedUrlResponse, User},
    repository::Repository,
    storage::MockStorageService,
};
use chrono::Utc;
use std::sync::Arc;
use tower::util::ServiceExt;
use uuid::Uuid;

const UPLOADER_ID: Uuid = Uuid::from_u128(77);

async fn state(env: Env, storage: MockStorageService) -> AppState {
    let repo = InMemoryRepository::new();
    repo.create_user(User {
        id: UPLOADER_ID,
        username: "uploader".to_string(),
        date_joined: Utc::now(),
        ..User::default()
    })
    .await
    .unwrap();

    AppState {
        repo: Arc::new(repo),
        storage: Arc::new(storage),
        config: AppConfig {
            env,
            ..AppConfig::default()
        },
    }
}

fn upload_request(file_type: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/upload/presigned")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-user-id", UPLOADER_ID.to_string())
        .body(Body::from(
            serde_json::json!({ "filename": "holiday.webp", "file_type": file_type }).to_string(),
        ))
        .unwrap()
}

#[tokio::test]
async fn test_presigned_upload_with_local_bypass() {
    let app = create_router(state(Env::Local, MockStorageService::new()).await);

    let response = app.oneshot(upload_request("image/webp")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: PresignedUrlResponse = serde_json::from_slice(&bytes).unwrap();
    assert!(body.resource_key.starts_with("posts_images/"));
    assert!(body.resource_key.ends_with(".webp"));
    assert!(body.upload_url.contains(&body.resource_key));
}

#[tokio::test]
async fn test_presigned_upload_rejects_documents() {
    let app = create_router(state(Env::Local, MockStorageService::new()).await);
    let response = app.oneshot(upload_request("application/pdf")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_presigned_upload_storage_error_is_opaque() {
    let app = create_router(state(Env::Local, MockStorageService::new_failing()).await);

    let response = app.oneshot(upload_request("image/png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(!body.contains("mock storage"));
}

#[tokio::test]
async fn test_bypass_header_ignored_in_production() {
    let app = create_router(state(Env::Production, MockStorageService::new()).await);
    let response = app.oneshot(upload_request("image/png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
