//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.
//! The system of record implements [`Store`], [`UserRepo`], [`FollowRepo`] and
//! [`PostRepo`]; a full-text engine implements [`SearchIndex`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::changes::ChangeSet;
use crate::error::Result;
use crate::models::{NewPost, NewUser, Post, PostId, SearchHits, User, UserId};
use crate::searchable::Document;

/// Transaction boundary of the system of record.
#[async_trait]
pub trait Store: Send + Sync {
    /// Opens a unit of work. Nothing it stages is visible to others until `commit`.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;

    /// Installs the hook run around every commit. Registration happens once,
    /// during store initialization; a second call is a `Conflict`.
    fn register_commit_hook(&self, hook: Arc<dyn CommitHook>) -> Result<()>;
}

/// Staged mutations inside one transaction.
///
/// Every mutation is recorded in [`UnitOfWork::pending`] so that commit hooks
/// can see what the transaction is about to make durable.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn insert_user(&mut self, user: NewUser) -> Result<User>;
    async fn get_user(&mut self, id: UserId) -> Result<Option<User>>;
    async fn update_user(&mut self, user: &User) -> Result<()>;
    /// Removes the user, their posts and every follow edge touching them.
    async fn delete_user(&mut self, id: UserId) -> Result<bool>;

    async fn insert_post(&mut self, post: NewPost) -> Result<Post>;
    async fn delete_post(&mut self, id: PostId) -> Result<bool>;

    async fn is_following(&mut self, follower: UserId, followed: UserId) -> Result<bool>;
    /// Atomic insert-if-absent. Returns whether an edge was created.
    async fn insert_follow(&mut self, follower: UserId, followed: UserId) -> Result<bool>;
    /// Returns whether an edge was removed.
    async fn delete_follow(&mut self, follower: UserId, followed: UserId) -> Result<bool>;

    /// New, modified and deleted rows staged so far.
    fn pending(&self) -> &ChangeSet;

    /// Runs the pre-commit hook, commits, then runs the post-commit hook.
    async fn commit(&mut self) -> Result<()>;
    async fn rollback(&mut self) -> Result<()>;
}

/// Observer of commit boundaries.
#[async_trait]
pub trait CommitHook: Send + Sync {
    /// Called while the transaction is still open. The returned snapshot is
    /// handed to `after_commit` if, and only if, the commit succeeds.
    fn before_commit(&self, pending: &ChangeSet) -> ChangeSet;

    async fn after_commit(&self, snapshot: ChangeSet);
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn get_user(&self, id: UserId) -> Result<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
}

#[async_trait]
pub trait FollowRepo: Send + Sync {
    async fn is_following(&self, follower: UserId, followed: UserId) -> Result<bool>;
    async fn follower_count(&self, user: UserId) -> Result<i64>;
    async fn following_count(&self, user: UserId) -> Result<i64>;
    /// Users following `user`, ordered by username.
    async fn list_followers(&self, user: UserId) -> Result<Vec<User>>;
    /// Users `user` follows, ordered by username.
    async fn list_following(&self, user: UserId) -> Result<Vec<User>>;
}

/// Post listings are always newest first, ties broken by the later id.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PostRepo: Send + Sync {
    /// Posts by `user` and by everyone `user` follows.
    async fn list_followed_posts(&self, user: UserId, limit: i64, offset: i64) -> Result<Vec<Post>>;
    async fn list_user_posts(&self, author: UserId, limit: i64, offset: i64) -> Result<Vec<Post>>;
    async fn list_posts(&self, limit: i64, offset: i64) -> Result<Vec<Post>>;

    /// Rows in the order of `ids`. Ids with no row are dropped.
    async fn get_posts_in_order(&self, ids: &[PostId]) -> Result<Vec<Post>>;

    /// Id-ordered scan for rebuilding derived data: posts with id > `after`.
    async fn scan_posts(&self, after: Option<PostId>, limit: i64) -> Result<Vec<Post>>;
}

/// The full system-of-record surface the services run against.
pub trait Repository: Store + UserRepo + FollowRepo + PostRepo {}

impl<T> Repository for T where T: Store + UserRepo + FollowRepo + PostRepo {}

/// External full-text index. Optional: services tolerate its absence.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Upserts the full document under `id`.
    async fn index(&self, collection: &str, id: i64, document: &Document) -> Result<()>;
    async fn delete(&self, collection: &str, id: i64) -> Result<()>;
    /// Ids ordered by relevance for the window `offset..offset + limit`.
    async fn search(&self, collection: &str, query: &str, offset: usize, limit: usize) -> Result<SearchHits>;
    /// Drops every document in `collection`.
    async fn clear(&self, collection: &str) -> Result<()>;
}
