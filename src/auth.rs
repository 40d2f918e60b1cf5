use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::AppError,
    models::User,
    repository::{Repository, RepositoryState},
    visibility::{Identity, Viewer},
};

/// Claims
///
/// Payload of the HS256 access tokens issued by `POST /auth/login`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user's id.
    pub sub: Uuid,
    /// Expiration time (seconds since the epoch).
    pub exp: usize,
    /// Issued at.
    pub iat: usize,
}

/// AuthUser
///
/// Resolved identity of an authenticated request. Using it as a handler argument makes
/// the route reject anonymous callers with 401.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

impl AuthUser {
    /// The viewer value handed to the visibility rules.
    pub fn viewer(&self) -> Viewer {
        Viewer::Authenticated(Identity {
            id: self.id,
            is_staff: self.is_staff,
            is_superuser: self.is_superuser,
        })
    }

    pub fn is_privileged(&self) -> bool {
        self.is_staff || self.is_superuser
    }
}

impl From<User> for AuthUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
        }
    }
}

/// resolve_user
///
/// Shared credential resolution for both extractors.
///
/// * `Ok(None)`: the request carries no credentials at all.
/// * `Ok(Some(user))`: a valid token (or, locally, a valid `x-user-id` header) naming a
///   user that still exists.
/// * `Err(Unauthorized)`: credentials were supplied but are unusable.
async fn resolve_user(
    parts: &Parts,
    repo: &RepositoryState,
    config: &AppConfig,
) -> Result<Option<User>, AppError> {
    // Development bypass; never honoured outside Env::Local.
    if config.env == Env::Local {
        let bypass = parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .and_then(|raw| Uuid::parse_str(raw).ok());
        if let Some(user_id) = bypass {
            if let Some(user) = repo.get_user(user_id).await? {
                return Ok(Some(user));
            }
        }
    }

    let Some(auth_header) = parts.headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let token = auth_header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    let claims = decode_token(config, token)?;

    // A valid token for a deleted account is still rejected.
    repo.get_user(claims.sub)
        .await?
        .map(Some)
        .ok_or(AppError::Unauthorized)
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        resolve_user(parts, &repo, &config)
            .await?
            .map(AuthUser::from)
            .ok_or(AppError::Unauthorized)
    }
}

/// Viewer extractor
///
/// Like [`AuthUser`] but lets anonymous requests through as `Viewer::Anonymous`. Bad
/// credentials are still rejected so a client never silently browses as a guest.
impl<S> FromRequestParts<S> for Viewer
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        Ok(resolve_user(parts, &repo, &config)
            .await?
            .map(|user| Viewer::from(&user))
            .unwrap_or_default())
    }
}

// --- Tokens ---

pub fn issue_token(config: &AppConfig, user_id: Uuid) -> Result<String, AppError> {
    let now = Utc::now().timestamp();
    let to_claim = |secs: Option<i64>| {
        secs.and_then(|secs| usize::try_from(secs).ok()).ok_or_else(|| {
            AppError::Internal(format!(
                "token lifetime out of range: {}",
                config.jwt_ttl_seconds
            ))
        })
    };
    let claims = Claims {
        sub: user_id,
        iat: to_claim(Some(now))?,
        exp: to_claim(now.checked_add(config.jwt_ttl_seconds))?,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("token encoding failed: {e}")))
}

pub fn decode_token(config: &AppConfig, token: &str) -> Result<Claims, AppError> {
    let mut validation = Validation::default();
    validation.validate_exp = true;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!("rejected token: {:?}", e.kind());
        AppError::Unauthorized
    })
}

// --- Passwords ---

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}

/// A malformed stored hash counts as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!("stored password hash is unreadable: {}", e);
            false
        }
    }
}

// --- Bootstrap ---

/// bootstrap_superuser
///
/// Creates a staff superuser account unless `username` is already taken. Returns the new
/// account, or `None` when nothing was created. An existing account is left as it is.
pub async fn bootstrap_superuser(
    repo: &dyn Repository,
    username: &str,
    password: &str,
    email: &str,
) -> Result<Option<User>, AppError> {
    if repo.get_user_by_username(username).await?.is_some() {
        tracing::debug!(%username, "superuser already present");
        return Ok(None);
    }

    let user = User {
        id: Uuid::new_v4(),
        username: username.to_string(),
        email: email.to_string(),
        password_hash: hash_password(password)?,
        is_staff: true,
        is_superuser: true,
        date_joined: Utc::now(),
        ..User::default()
    };
    let user = repo.create_user(user).await?;
    tracing::info!(username = %user.username, "superuser created");
    Ok(Some(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;

    #[test]
    fn hash_and_verify() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(verify_password("correct horse battery", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn token_roundtrip_and_wrong_secret() {
        let config = AppConfig::default();
        let user_id = Uuid::from_u128(42);
        let token = issue_token(&config, user_id).unwrap();
        assert_eq!(decode_token(&config, &token).unwrap().sub, user_id);

        let other = AppConfig {
            jwt_secret: "another-secret".to_string(),
            ..AppConfig::default()
        };
        assert!(matches!(decode_token(&other, &token), Err(AppError::Unauthorized)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let config = AppConfig {
            jwt_ttl_seconds: -3600,
            ..AppConfig::default()
        };
        let token = issue_token(&config, Uuid::from_u128(7)).unwrap();
        assert!(decode_token(&config, &token).is_err());
    }

    #[test]
    fn overflowing_lifetime_is_an_error() {
        let config = AppConfig {
            jwt_ttl_seconds: i64::MAX,
            ..AppConfig::default()
        };
        assert!(matches!(issue_token(&config, Uuid::from_u128(7)), Err(AppError::Internal(_))));

        let config = AppConfig {
            jwt_ttl_seconds: i64::MIN,
            ..AppConfig::default()
        };
        assert!(matches!(issue_token(&config, Uuid::from_u128(7)), Err(AppError::Internal(_))));
    }

    #[tokio::test]
    async fn bootstrap_creates_superuser_once() {
        let repo = InMemoryRepository::new();

        let created = bootstrap_superuser(&repo, "root", "bootstrap-pass", "root@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(created.is_staff);
        assert!(created.is_superuser);
        assert_eq!(created.email, "root@example.com");
        assert!(verify_password("bootstrap-pass", &created.password_hash));

        let again = bootstrap_superuser(&repo, "root", "other-pass", "")
            .await
            .unwrap();
        assert!(again.is_none());
        let stored = repo.get_user_by_username("root").await.unwrap().unwrap();
        assert_eq!(stored.id, created.id);
        assert!(verify_password("bootstrap-pass", &stored.password_hash));
    }

    #[tokio::test]
    async fn bootstrap_leaves_existing_regular_user_alone() {
        let repo = InMemoryRepository::new();
        let existing = repo
            .create_user(User {
                id: Uuid::new_v4(),
                username: "admin".to_string(),
                date_joined: Utc::now(),
                ..User::default()
            })
            .await
            .unwrap();

        let result = bootstrap_superuser(&repo, "admin", "bootstrap-pass", "")
            .await
            .unwrap();
        assert!(result.is_none());

        let stored = repo.get_user_by_username("admin").await.unwrap().unwrap();
        assert_eq!(stored.id, existing.id);
        assert!(!stored.is_staff);
        assert!(!stored.is_superuser);
    }
}
