use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Comment, Post, User};

/// Viewer
///
/// The identity making the current request. It is resolved once per request by the
/// `Viewer`/`AuthUser` extractors and handed explicitly to every rule below; nothing
/// in this module reads identity from ambient state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Viewer {
    #[default]
    Anonymous,
    Authenticated(Identity),
}

/// The authenticated part of a viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub is_staff: bool,
    pub is_superuser: bool,
}

impl Viewer {
    pub fn user(id: Uuid) -> Self {
        Viewer::Authenticated(Identity {
            id,
            is_staff: false,
            is_superuser: false,
        })
    }

    pub fn staff(id: Uuid) -> Self {
        Viewer::Authenticated(Identity {
            id,
            is_staff: true,
            is_superuser: false,
        })
    }

    pub fn id(&self) -> Option<Uuid> {
        match self {
            Viewer::Anonymous => None,
            Viewer::Authenticated(identity) => Some(identity.id),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Viewer::Authenticated(_))
    }

    /// Staff and superusers bypass visibility and ownership checks.
    pub fn is_privileged(&self) -> bool {
        match self {
            Viewer::Anonymous => false,
            Viewer::Authenticated(identity) => identity.is_staff || identity.is_superuser,
        }
    }

    fn is(&self, user_id: Uuid) -> bool {
        self.id() == Some(user_id)
    }
}

impl From<&User> for Viewer {
    fn from(user: &User) -> Self {
        Viewer::Authenticated(Identity {
            id: user.id,
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
        })
    }
}

/// A record with an owning author.
pub trait Authored {
    fn author_id(&self) -> Uuid;
}

/// A record whose visibility is decided by publication flags.
///
/// `category_is_published` is `None` when the record has no category.
pub trait Publication: Authored {
    fn is_published(&self) -> bool;
    fn pub_date(&self) -> DateTime<Utc>;
    fn category_is_published(&self) -> Option<bool>;
}

impl Authored for Post {
    fn author_id(&self) -> Uuid {
        self.author_id
    }
}

impl Publication for Post {
    fn is_published(&self) -> bool {
        self.is_published
    }

    fn pub_date(&self) -> DateTime<Utc> {
        self.pub_date
    }

    fn category_is_published(&self) -> Option<bool> {
        self.category_is_published
    }
}

impl Authored for Comment {
    fn author_id(&self) -> Uuid {
        self.author_id
    }
}

impl<T: Authored + ?Sized> Authored for &T {
    fn author_id(&self) -> Uuid {
        (**self).author_id()
    }
}

impl<T: Publication + ?Sized> Publication for &T {
    fn is_published(&self) -> bool {
        (**self).is_published()
    }

    fn pub_date(&self) -> DateTime<Utc> {
        (**self).pub_date()
    }

    fn category_is_published(&self) -> Option<bool> {
        (**self).category_is_published()
    }
}

/// is_visible
///
/// The visibility predicate for a single record. The publish date comparison is
/// inclusive: a post scheduled for exactly `now` is already public.
pub fn is_visible<P: Publication + ?Sized>(viewer: &Viewer, post: &P, now: DateTime<Utc>) -> bool {
    if viewer.is_privileged() || viewer.is(post.author_id()) {
        return true;
    }
    post.is_published()
        && post.pub_date() <= now
        && post.category_is_published().unwrap_or(true)
}

/// filter_visible_posts
///
/// Keeps the candidates the viewer may see, in their original order.
pub fn filter_visible_posts<P, I>(viewer: &Viewer, candidates: I, now: DateTime<Utc>) -> Vec<P>
where
    P: Publication,
    I: IntoIterator<Item = P>,
{
    candidates
        .into_iter()
        .filter(|post| is_visible(viewer, post, now))
        .collect()
}

/// authorize_mutation
///
/// Edit/delete gate for posts and comments.
pub fn authorize_mutation<R: Authored + ?Sized>(viewer: &Viewer, resource: &R) -> bool {
    viewer.is_privileged() || viewer.is(resource.author_id())
}

/// authorize_self_edit
///
/// Profile editing is strictly self-service; staff get no override here.
pub fn authorize_self_edit(viewer: &Viewer, target_user: &User) -> bool {
    viewer.is(target_user.id)
}

/// MutationTarget
///
/// What the caller intends to mutate. Callers pick the variant explicitly instead of
/// letting the rule engine guess from the record's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationTarget {
    UserSelfEdit { user_id: Uuid },
    AuthoredResource { author_id: Uuid },
}

impl MutationTarget {
    pub fn user(user: &User) -> Self {
        MutationTarget::UserSelfEdit { user_id: user.id }
    }

    pub fn resource<R: Authored + ?Sized>(resource: &R) -> Self {
        MutationTarget::AuthoredResource {
            author_id: resource.author_id(),
        }
    }
}

/// Raised when a mutation is attempted without permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    #[error("authentication is required for this action")]
    Anonymous,
    #[error("only the author or staff may change this resource")]
    NotAuthorOrStaff,
    #[error("users may only edit their own profile")]
    NotSelf,
    #[error("staff access required")]
    StaffOnly,
}

pub fn authorize(viewer: &Viewer, target: MutationTarget) -> bool {
    match target {
        MutationTarget::UserSelfEdit { user_id } => viewer.is(user_id),
        MutationTarget::AuthoredResource { author_id } => {
            viewer.is_privileged() || viewer.is(author_id)
        }
    }
}

/// ensure_authorized
///
/// Fail-closed wrapper around [`authorize`] for handlers that go on to mutate data.
pub fn ensure_authorized(viewer: &Viewer, target: MutationTarget) -> Result<(), AuthorizationError> {
    if authorize(viewer, target) {
        return Ok(());
    }
    if !viewer.is_authenticated() {
        return Err(AuthorizationError::Anonymous);
    }
    Err(match target {
        MutationTarget::UserSelfEdit { .. } => AuthorizationError::NotSelf,
        MutationTarget::AuthoredResource { .. } => AuthorizationError::NotAuthorOrStaff,
    })
}
