use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{PostScope, RepoResult, Repository};
use crate::{
    error::RepoError,
    models::{
        Category, Comment, CreateCategoryRequest, CreateLocationRequest, CreatePostRequest,
        Location, Post, UpdatePostRequest, UpdateProfileRequest, User,
    },
};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    categories: Vec<Category>,
    locations: Vec<Location>,
    // Stored without the joined columns; `hydrate_*` fills them on read.
    posts: Vec<Post>,
    comments: Vec<Comment>,
    next_comment_id: i64,
}

impl Tables {
    fn hydrate_post(&self, post: &Post) -> Post {
        let mut post = post.clone();
        post.author_username = self
            .users
            .iter()
            .find(|u| u.id == post.author_id)
            .map(|u| u.username.clone())
            .unwrap_or_default();

        let category = post
            .category_id
            .and_then(|id| self.categories.iter().find(|c| c.id == id));
        post.category_slug = category.map(|c| c.slug.clone());
        post.category_title = category.map(|c| c.title.clone());
        post.category_is_published = category.map(|c| c.is_published);

        post.location_name = post
            .location_id
            .and_then(|id| self.locations.iter().find(|l| l.id == id))
            .filter(|l| l.is_published)
            .map(|l| l.name.clone());

        post.comment_count = self.comments.iter().filter(|c| c.post_id == post.id).count() as i64;
        post
    }

    fn hydrate_comment(&self, comment: &Comment) -> Comment {
        let mut comment = comment.clone();
        comment.author_username = self
            .users
            .iter()
            .find(|u| u.id == comment.author_id)
            .map(|u| u.username.clone())
            .unwrap_or_default();
        comment
    }

    fn check_references(&self, category_id: Option<Uuid>, location_id: Option<Uuid>) -> RepoResult<()> {
        if let Some(id) = category_id {
            if !self.categories.iter().any(|c| c.id == id) {
                return Err(RepoError::MissingReference("category"));
            }
        }
        if let Some(id) = location_id {
            if !self.locations.iter().any(|l| l.id == id) {
                return Err(RepoError::MissingReference("location"));
            }
        }
        Ok(())
    }
}

/// InMemoryRepository
///
/// A `Repository` kept entirely in process memory. It mirrors the Postgres schema's
/// constraints (unique usernames and slugs, foreign keys, cascading deletes) so handler
/// tests exercise the same failure paths without a database.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    // --- Users ---

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.username == username).cloned())
    }

    async fn create_user(&self, user: User) -> RepoResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.iter().any(|u| u.username == user.username) {
            return Err(RepoError::Duplicate("username".to_string()));
        }
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn update_user(&self, id: Uuid, req: UpdateProfileRequest) -> RepoResult<Option<User>> {
        let mut tables = self.tables.write().await;
        if let Some(username) = &req.username {
            if tables.users.iter().any(|u| &u.username == username && u.id != id) {
                return Err(RepoError::Duplicate("username".to_string()));
            }
        }
        let Some(user) = tables.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(username) = req.username {
            user.username = username;
        }
        if let Some(email) = req.email {
            user.email = email;
        }
        if let Some(first_name) = req.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = req.last_name {
            user.last_name = last_name;
        }
        Ok(Some(user.clone()))
    }

    // --- Categories & Locations ---

    async fn list_categories(&self) -> RepoResult<Vec<Category>> {
        let tables = self.tables.read().await;
        let mut categories = tables.categories.clone();
        categories.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(categories)
    }

    async fn get_category_by_slug(&self, slug: &str) -> RepoResult<Option<Category>> {
        let tables = self.tables.read().await;
        Ok(tables.categories.iter().find(|c| c.slug == slug).cloned())
    }

    async fn create_category(&self, req: CreateCategoryRequest) -> RepoResult<Category> {
        let mut tables = self.tables.write().await;
        if tables.categories.iter().any(|c| c.slug == req.slug) {
            return Err(RepoError::Duplicate("slug".to_string()));
        }
        let category = Category {
            id: Uuid::new_v4(),
            title: req.title,
            description: req.description,
            slug: req.slug,
            is_published: req.is_published.unwrap_or(true),
            created_at: Utc::now(),
        };
        tables.categories.push(category.clone());
        Ok(category)
    }

    async fn set_category_published(&self, slug: &str, is_published: bool) -> RepoResult<Option<Category>> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .categories
            .iter_mut()
            .find(|c| c.slug == slug)
            .map(|c| {
                c.is_published = is_published;
                c.clone()
            }))
    }

    async fn list_locations(&self) -> RepoResult<Vec<Location>> {
        let tables = self.tables.read().await;
        let mut locations = tables.locations.clone();
        locations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(locations)
    }

    async fn create_location(&self, req: CreateLocationRequest) -> RepoResult<Location> {
        let mut tables = self.tables.write().await;
        let location = Location {
            id: Uuid::new_v4(),
            name: req.name,
            is_published: req.is_published.unwrap_or(true),
            created_at: Utc::now(),
        };
        tables.locations.push(location.clone());
        Ok(location)
    }

    async fn set_location_published(&self, id: Uuid, is_published: bool) -> RepoResult<Option<Location>> {
        let mut tables = self.tables.write().await;
        Ok(tables.locations.iter_mut().find(|l| l.id == id).map(|l| {
            l.is_published = is_published;
            l.clone()
        }))
    }

    // --- Posts ---

    async fn list_posts(&self, scope: PostScope) -> RepoResult<Vec<Post>> {
        let tables = self.tables.read().await;
        let mut posts: Vec<Post> = tables
            .posts
            .iter()
            .filter(|p| match scope {
                PostScope::All => true,
                PostScope::Category(id) => p.category_id == Some(id),
                PostScope::Author(id) => p.author_id == id,
            })
            .map(|p| tables.hydrate_post(p))
            .collect();
        posts.sort_by(|a, b| {
            b.pub_date
                .cmp(&a.pub_date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(posts)
    }

    async fn get_post(&self, id: Uuid) -> RepoResult<Option<Post>> {
        let tables = self.tables.read().await;
        Ok(tables
            .posts
            .iter()
            .find(|p| p.id == id)
            .map(|p| tables.hydrate_post(p)))
    }

    async fn create_post(&self, req: CreatePostRequest, author_id: Uuid) -> RepoResult<Post> {
        let mut tables = self.tables.write().await;
        if !tables.users.iter().any(|u| u.id == author_id) {
            return Err(RepoError::MissingReference("user"));
        }
        tables.check_references(req.category_id, req.location_id)?;

        let post = Post {
            id: Uuid::new_v4(),
            title: req.title,
            text: req.text,
            pub_date: req.pub_date.unwrap_or_else(Utc::now),
            is_published: req.is_published.unwrap_or(true),
            created_at: Utc::now(),
            author_id,
            category_id: req.category_id,
            location_id: req.location_id,
            image: req.image_key,
            ..Post::default()
        };
        tables.posts.push(post.clone());
        Ok(tables.hydrate_post(&post))
    }

    async fn update_post(&self, id: Uuid, req: UpdatePostRequest) -> RepoResult<Option<Post>> {
        let mut tables = self.tables.write().await;
        tables.check_references(req.category_id, req.location_id)?;

        let Some(post) = tables.posts.iter_mut().find(|p| p.id == id) else {
            return Ok(None);
        };
        if let Some(title) = req.title {
            post.title = title;
        }
        if let Some(text) = req.text {
            post.text = text;
        }
        if let Some(pub_date) = req.pub_date {
            post.pub_date = pub_date;
        }
        if let Some(is_published) = req.is_published {
            post.is_published = is_published;
        }
        if req.category_id.is_some() {
            post.category_id = req.category_id;
        }
        if req.clear_location {
            post.location_id = None;
        } else if req.location_id.is_some() {
            post.location_id = req.location_id;
        }
        if req.clear_image {
            post.image = None;
        } else if req.image_key.is_some() {
            post.image = req.image_key;
        }
        let post = post.clone();
        Ok(Some(tables.hydrate_post(&post)))
    }

    async fn delete_post(&self, id: Uuid) -> RepoResult<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.posts.len();
        tables.posts.retain(|p| p.id != id);
        let deleted = tables.posts.len() < before;
        if deleted {
            tables.comments.retain(|c| c.post_id != id);
        }
        Ok(deleted)
    }

    // --- Comments ---

    async fn list_comments(&self, post_id: Uuid) -> RepoResult<Vec<Comment>> {
        let tables = self.tables.read().await;
        let mut comments: Vec<Comment> = tables
            .comments
            .iter()
            .filter(|c| c.post_id == post_id)
            .map(|c| tables.hydrate_comment(c))
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(comments)
    }

    async fn get_comment(&self, id: i64) -> RepoResult<Option<Comment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .comments
            .iter()
            .find(|c| c.id == id)
            .map(|c| tables.hydrate_comment(c)))
    }

    async fn add_comment(&self, post_id: Uuid, author_id: Uuid, text: String) -> RepoResult<Comment> {
        let mut tables = self.tables.write().await;
        if !tables.posts.iter().any(|p| p.id == post_id) {
            return Err(RepoError::MissingReference("post"));
        }
        if !tables.users.iter().any(|u| u.id == author_id) {
            return Err(RepoError::MissingReference("user"));
        }
        tables.next_comment_id += 1;
        let comment = Comment {
            id: tables.next_comment_id,
            post_id,
            author_id,
            author_username: String::new(),
            text,
            created_at: Utc::now(),
        };
        tables.comments.push(comment.clone());
        Ok(tables.hydrate_comment(&comment))
    }

    async fn update_comment(&self, id: i64, text: String) -> RepoResult<Option<Comment>> {
        let mut tables = self.tables.write().await;
        let Some(comment) = tables.comments.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        comment.text = text;
        let comment = comment.clone();
        Ok(Some(tables.hydrate_comment(&comment)))
    }

    async fn delete_comment(&self, id: i64) -> RepoResult<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.comments.len();
        tables.comments.retain(|c| c.id != id);
        Ok(tables.comments.len() < before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user(name: &str) -> User {
        User {
            id: Uuid::new_v4(),
            username: name.to_string(),
            date_joined: Utc::now(),
            ..User::default()
        }
    }

    #[tokio::test]
    async fn usernames_are_unique() {
        let repo = InMemoryRepository::new();
        repo.create_user(user("gogol")).await.unwrap();
        let err = repo.create_user(user("gogol")).await.unwrap_err();
        assert!(matches!(err, RepoError::Duplicate(_)));
    }

    #[tokio::test]
    async fn posts_are_listed_newest_first_with_joined_columns() {
        let repo = InMemoryRepository::new();
        let author = repo.create_user(user("chekhov")).await.unwrap();
        let category = repo
            .create_category(CreateCategoryRequest {
                title: "Travel".to_string(),
                description: "Trips".to_string(),
                slug: "travel".to_string(),
                is_published: Some(false),
            })
            .await
            .unwrap();
        let hidden_place = repo
            .create_location(CreateLocationRequest {
                name: "Sakhalin".to_string(),
                is_published: Some(false),
            })
            .await
            .unwrap();

        let now = Utc::now();
        let old = repo
            .create_post(
                CreatePostRequest {
                    title: "old".to_string(),
                    text: "t".to_string(),
                    pub_date: Some(now - Duration::days(2)),
                    ..CreatePostRequest::default()
                },
                author.id,
            )
            .await
            .unwrap();
        let new = repo
            .create_post(
                CreatePostRequest {
                    title: "new".to_string(),
                    text: "t".to_string(),
                    pub_date: Some(now - Duration::days(1)),
                    category_id: Some(category.id),
                    location_id: Some(hidden_place.id),
                    ..CreatePostRequest::default()
                },
                author.id,
            )
            .await
            .unwrap();
        repo.add_comment(new.id, author.id, "first".to_string())
            .await
            .unwrap();

        let posts = repo.list_posts(PostScope::All).await.unwrap();
        assert_eq!(posts[0].id, new.id);
        assert_eq!(posts[1].id, old.id);
        assert_eq!(posts[0].author_username, "chekhov");
        assert_eq!(posts[0].category_is_published, Some(false));
        assert_eq!(posts[0].location_id, Some(hidden_place.id));
        assert_eq!(posts[0].location_name, None);
        assert_eq!(posts[0].comment_count, 1);
        assert_eq!(posts[1].category_is_published, None);

        let in_category = repo.list_posts(PostScope::Category(category.id)).await.unwrap();
        assert_eq!(in_category.len(), 1);
    }

    #[tokio::test]
    async fn unknown_category_is_a_missing_reference() {
        let repo = InMemoryRepository::new();
        let author = repo.create_user(user("bunin")).await.unwrap();
        let err = repo
            .create_post(
                CreatePostRequest {
                    title: "t".to_string(),
                    text: "t".to_string(),
                    category_id: Some(Uuid::new_v4()),
                    ..CreatePostRequest::default()
                },
                author.id,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::MissingReference("category")));

        let err = repo
            .create_post(
                CreatePostRequest {
                    title: "t".to_string(),
                    text: "t".to_string(),
                    ..CreatePostRequest::default()
                },
                Uuid::new_v4(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::MissingReference("user")));
    }

    #[tokio::test]
    async fn location_and_image_can_be_detached() {
        let repo = InMemoryRepository::new();
        let author = repo.create_user(user("lermontov")).await.unwrap();
        let place = repo
            .create_location(CreateLocationRequest {
                name: "Pyatigorsk".to_string(),
                is_published: Some(true),
            })
            .await
            .unwrap();
        let post = repo
            .create_post(
                CreatePostRequest {
                    title: "t".to_string(),
                    text: "t".to_string(),
                    location_id: Some(place.id),
                    image_key: Some("posts_images/a.png".to_string()),
                    ..CreatePostRequest::default()
                },
                author.id,
            )
            .await
            .unwrap();

        let kept = repo
            .update_post(post.id, UpdatePostRequest::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kept.location_id, Some(place.id));
        assert_eq!(kept.image.as_deref(), Some("posts_images/a.png"));

        let cleared = repo
            .update_post(
                post.id,
                UpdatePostRequest {
                    location_id: Some(place.id),
                    clear_location: true,
                    clear_image: true,
                    ..UpdatePostRequest::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cleared.location_id, None);
        assert_eq!(cleared.location_name, None);
        assert_eq!(cleared.image, None);
    }

    #[tokio::test]
    async fn deleting_a_post_removes_its_comments() {
        let repo = InMemoryRepository::new();
        let author = repo.create_user(user("pushkin")).await.unwrap();
        let post = repo
            .create_post(
                CreatePostRequest {
                    title: "t".to_string(),
                    text: "t".to_string(),
                    ..CreatePostRequest::default()
                },
                author.id,
            )
            .await
            .unwrap();
        let comment = repo
            .add_comment(post.id, author.id, "hi".to_string())
            .await
            .unwrap();

        assert!(repo.delete_post(post.id).await.unwrap());
        assert!(repo.get_comment(comment.id).await.unwrap().is_none());
        assert!(!repo.delete_post(post.id).await.unwrap());
    }
}
