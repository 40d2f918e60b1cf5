use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, query_builder::QueryBuilder};
use uuid::Uuid;

use super::{PostScope, RepoResult, Repository};
use crate::{
    error::RepoError,
    models::{
        Category, Comment, CreateCategoryRequest, CreateLocationRequest, CreatePostRequest,
        Location, Post, UpdatePostRequest, UpdateProfileRequest, User,
    },
};

/// Joined projection shared by every post query. Unpublished locations are reported
/// as a null name; the post itself stays untouched.
const POST_SELECT: &str = r#"
    SELECT
        p.id, p.title, p.text, p.pub_date, p.is_published, p.created_at,
        p.author_id, u.username AS author_username,
        p.category_id, c.slug AS category_slug, c.title AS category_title,
        c.is_published AS category_is_published,
        p.location_id, CASE WHEN l.is_published THEN l.name END AS location_name,
        p.image,
        (SELECT COUNT(*) FROM comments cm WHERE cm.post_id = p.id) AS comment_count
    FROM posts p
    JOIN users u ON u.id = p.author_id
    LEFT JOIN categories c ON c.id = p.category_id
    LEFT JOIN locations l ON l.id = p.location_id
"#;

const COMMENT_SELECT: &str = r#"
    SELECT cm.id, cm.post_id, cm.author_id, u.username AS author_username, cm.text, cm.created_at
    FROM comments cm
    JOIN users u ON u.id = cm.author_id
"#;

const USER_COLUMNS: &str = "id, username, email, first_name, last_name, password_hash, is_staff, is_superuser, date_joined";

/// Names the record a foreign key points at, from Postgres' default
/// `<table>_<column>_fkey` constraint names.
fn referenced_by(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("posts_author_id_fkey") | Some("comments_author_id_fkey") => "user",
        Some("posts_category_id_fkey") => "category",
        Some("posts_location_id_fkey") => "location",
        Some("comments_post_id_fkey") => "post",
        _ => "record",
    }
}

/// Maps constraint violations onto the domain-level variants.
fn classify(err: sqlx::Error, unique: &str) -> RepoError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return RepoError::Duplicate(unique.to_string());
        }
        if db.is_foreign_key_violation() {
            return RepoError::MissingReference(referenced_by(db.constraint()));
        }
    }
    RepoError::Database(err)
}

fn classify_post_error(err: sqlx::Error) -> RepoError {
    classify(err, "post")
}

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL. Queries are built at runtime with bound
/// parameters; the schema lives in `migrations/`.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    // --- Users ---

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_user(&self, user: User) -> RepoResult<User> {
        let sql = format!(
            "INSERT INTO users ({USER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(user.id)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.password_hash)
            .bind(user.is_staff)
            .bind(user.is_superuser)
            .bind(user.date_joined)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| classify(e, "username"))
    }

    /// Partial update; `COALESCE` keeps columns whose field is `None`.
    async fn update_user(&self, id: Uuid, req: UpdateProfileRequest) -> RepoResult<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users
            SET username = COALESCE($2, username),
                email = COALESCE($3, email),
                first_name = COALESCE($4, first_name),
                last_name = COALESCE($5, last_name)
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(req.username)
            .bind(req.email)
            .bind(req.first_name)
            .bind(req.last_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| classify(e, "username"))
    }

    // --- Categories & Locations ---

    async fn list_categories(&self) -> RepoResult<Vec<Category>> {
        Ok(sqlx::query_as::<_, Category>(
            "SELECT id, title, description, slug, is_published, created_at FROM categories ORDER BY title",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get_category_by_slug(&self, slug: &str) -> RepoResult<Option<Category>> {
        Ok(sqlx::query_as::<_, Category>(
            "SELECT id, title, description, slug, is_published, created_at FROM categories WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn create_category(&self, req: CreateCategoryRequest) -> RepoResult<Category> {
        sqlx::query_as::<_, Category>(
            r#"
            INSERT INTO categories (id, title, description, slug, is_published, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            RETURNING id, title, description, slug, is_published, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(req.title)
        .bind(req.description)
        .bind(req.slug)
        .bind(req.is_published.unwrap_or(true))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, "slug"))
    }

    async fn set_category_published(&self, slug: &str, is_published: bool) -> RepoResult<Option<Category>> {
        Ok(sqlx::query_as::<_, Category>(
            r#"
            UPDATE categories SET is_published = $2 WHERE slug = $1
            RETURNING id, title, description, slug, is_published, created_at
            "#,
        )
        .bind(slug)
        .bind(is_published)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_locations(&self) -> RepoResult<Vec<Location>> {
        Ok(sqlx::query_as::<_, Location>(
            "SELECT id, name, is_published, created_at FROM locations ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn create_location(&self, req: CreateLocationRequest) -> RepoResult<Location> {
        Ok(sqlx::query_as::<_, Location>(
            r#"
            INSERT INTO locations (id, name, is_published, created_at)
            VALUES ($1, $2, $3, NOW())
            RETURNING id, name, is_published, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(req.name)
        .bind(req.is_published.unwrap_or(true))
        .fetch_one(&self.pool)
        .await?)
    }

    async fn set_location_published(&self, id: Uuid, is_published: bool) -> RepoResult<Option<Location>> {
        Ok(sqlx::query_as::<_, Location>(
            r#"
            UPDATE locations SET is_published = $2 WHERE id = $1
            RETURNING id, name, is_published, created_at
            "#,
        )
        .bind(id)
        .bind(is_published)
        .fetch_optional(&self.pool)
        .await?)
    }

    // --- Posts ---

    async fn list_posts(&self, scope: PostScope) -> RepoResult<Vec<Post>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(POST_SELECT);

        match scope {
            PostScope::All => {}
            PostScope::Category(category_id) => {
                builder.push(" WHERE p.category_id = ");
                builder.push_bind(category_id);
            }
            PostScope::Author(author_id) => {
                builder.push(" WHERE p.author_id = ");
                builder.push_bind(author_id);
            }
        }

        builder.push(" ORDER BY p.pub_date DESC, p.created_at DESC");

        Ok(builder
            .build_query_as::<Post>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_post(&self, id: Uuid) -> RepoResult<Option<Post>> {
        let sql = format!("{POST_SELECT} WHERE p.id = $1");
        Ok(sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_post(&self, req: CreatePostRequest, author_id: Uuid) -> RepoResult<Post> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO posts (id, title, text, pub_date, is_published, created_at, author_id, category_id, location_id, image)
            VALUES ($1, $2, $3, $4, $5, NOW(), $6, $7, $8, $9)
            "#,
        )
        .bind(id)
        .bind(req.title)
        .bind(req.text)
        .bind(req.pub_date.unwrap_or_else(Utc::now))
        .bind(req.is_published.unwrap_or(true))
        .bind(author_id)
        .bind(req.category_id)
        .bind(req.location_id)
        .bind(req.image_key)
        .execute(&self.pool)
        .await
        .map_err(classify_post_error)?;

        self.get_post(id)
            .await?
            .ok_or(RepoError::Database(sqlx::Error::RowNotFound))
    }

    async fn update_post(&self, id: Uuid, req: UpdatePostRequest) -> RepoResult<Option<Post>> {
        let updated = sqlx::query(
            r#"
            UPDATE posts
            SET title = COALESCE($2, title),
                text = COALESCE($3, text),
                pub_date = COALESCE($4, pub_date),
                is_published = COALESCE($5, is_published),
                category_id = COALESCE($6, category_id),
                location_id = CASE WHEN $9 THEN NULL ELSE COALESCE($7, location_id) END,
                image = CASE WHEN $10 THEN NULL ELSE COALESCE($8, image) END
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(req.title)
        .bind(req.text)
        .bind(req.pub_date)
        .bind(req.is_published)
        .bind(req.category_id)
        .bind(req.location_id)
        .bind(req.image_key)
        .bind(req.clear_location)
        .bind(req.clear_image)
        .execute(&self.pool)
        .await
        .map_err(classify_post_error)?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_post(id).await
    }

    async fn delete_post(&self, id: Uuid) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // --- Comments ---

    async fn list_comments(&self, post_id: Uuid) -> RepoResult<Vec<Comment>> {
        let sql = format!("{COMMENT_SELECT} WHERE cm.post_id = $1 ORDER BY cm.created_at ASC, cm.id ASC");
        Ok(sqlx::query_as::<_, Comment>(&sql)
            .bind(post_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_comment(&self, id: i64) -> RepoResult<Option<Comment>> {
        let sql = format!("{COMMENT_SELECT} WHERE cm.id = $1");
        Ok(sqlx::query_as::<_, Comment>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Inserts and joins the author's username in one round trip.
    async fn add_comment(&self, post_id: Uuid, author_id: Uuid, text: String) -> RepoResult<Comment> {
        sqlx::query_as::<_, Comment>(
            r#"
            WITH inserted AS (
                INSERT INTO comments (post_id, author_id, text, created_at)
                VALUES ($1, $2, $3, NOW())
                RETURNING id, post_id, author_id, text, created_at
            )
            SELECT i.id, i.post_id, i.author_id, u.username AS author_username, i.text, i.created_at
            FROM inserted i JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(post_id)
        .bind(author_id)
        .bind(text)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, "comment"))
    }

    async fn update_comment(&self, id: i64, text: String) -> RepoResult<Option<Comment>> {
        let updated = sqlx::query("UPDATE comments SET text = $2 WHERE id = $1")
            .bind(id)
            .bind(text)
            .execute(&self.pool)
            .await?;
        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_comment(id).await
    }

    async fn delete_comment(&self, id: i64) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
