//! # Microblog
//!
//! Entry point for the routing layer. Every write opens its own unit of work,
//! stages the mutation and commits; the search synchronizer runs as the
//! store's commit hook.

use std::sync::Arc;

use chrono::Utc;
use mb_core::error::{AppError, Result};
use mb_core::models::{NewPost, NewUser, Page, Post, PostId, ProfileUpdate, SearchResults, User, UserId};
use mb_core::traits::{PostRepo, Repository, SearchIndex, UnitOfWork};
use tracing::{info, instrument};

use crate::feed::FeedService;
use crate::graph::SocialGraph;
use crate::search::SearchService;
use crate::sync::SearchSynchronizer;

pub const DEFAULT_REINDEX_BATCH_SIZE: usize = 500;

pub struct Microblog {
    repo: Arc<dyn Repository>,
    posts: Arc<dyn PostRepo>,
    graph: SocialGraph,
    feed: FeedService,
    search: SearchService,
    sync: Arc<SearchSynchronizer>,
    reindex_batch_size: usize,
}

impl Microblog {
    /// Wires the services over `repo` and installs the synchronizer as its
    /// commit hook. Fails with `Conflict` if the store already has a hook.
    pub fn new<R>(repo: Arc<R>, index: Option<Arc<dyn SearchIndex>>) -> Result<Self>
    where
        R: Repository + 'static,
    {
        let sync = Arc::new(SearchSynchronizer::new(index.clone()));
        repo.register_commit_hook(sync.clone())?;
        info!(search = sync.is_enabled(), "microblog core ready");

        Ok(Self {
            graph: SocialGraph::new(repo.clone()),
            feed: FeedService::new(repo.clone()),
            search: SearchService::new(repo.clone(), index),
            posts: repo.clone(),
            repo,
            sync,
            reindex_batch_size: DEFAULT_REINDEX_BATCH_SIZE,
        })
    }

    pub fn with_reindex_batch_size(mut self, batch_size: usize) -> Self {
        self.reindex_batch_size = batch_size.max(1);
        self
    }

    pub fn search_enabled(&self) -> bool {
        self.sync.is_enabled()
    }

    // ── Users ───────────────────────────────────────────────────────────

    #[instrument(skip(self, user), fields(username = %user.username))]
    pub async fn register_user(&self, user: NewUser) -> Result<User> {
        let mut tx = self.repo.begin().await?;
        let user = tx.insert_user(user).await?;
        tx.commit().await?;
        info!(user = %user.id, "registered user");
        Ok(user)
    }

    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, id: UserId, update: ProfileUpdate) -> Result<User> {
        let mut tx = self.repo.begin().await?;
        let mut user = require_user(tx.as_mut(), id).await?;
        if update.apply(&mut user)? {
            tx.update_user(&user).await?;
        }
        tx.commit().await?;
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn touch_last_seen(&self, id: UserId) -> Result<()> {
        let mut tx = self.repo.begin().await?;
        let mut user = require_user(tx.as_mut(), id).await?;
        user.last_seen = Some(Utc::now());
        tx.update_user(&user).await?;
        tx.commit().await
    }

    /// Removes the user with their posts and follow edges. Returns whether the user existed.
    #[instrument(skip(self))]
    pub async fn delete_user(&self, id: UserId) -> Result<bool> {
        let mut tx = self.repo.begin().await?;
        let deleted = tx.delete_user(id).await?;
        tx.commit().await?;
        Ok(deleted)
    }

    pub async fn user(&self, id: UserId) -> Result<Option<User>> {
        self.repo.get_user(id).await
    }

    pub async fn user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.repo.get_user_by_username(username).await
    }

    // ── Posts ───────────────────────────────────────────────────────────

    #[instrument(skip(self, post), fields(author = %post.author_id))]
    pub async fn create_post(&self, post: NewPost) -> Result<Post> {
        let mut tx = self.repo.begin().await?;
        let post = tx.insert_post(post).await?;
        tx.commit().await?;
        Ok(post)
    }

    #[instrument(skip(self))]
    pub async fn delete_post(&self, id: PostId) -> Result<bool> {
        let mut tx = self.repo.begin().await?;
        let deleted = tx.delete_post(id).await?;
        tx.commit().await?;
        Ok(deleted)
    }

    // ── Social graph ────────────────────────────────────────────────────

    /// Idempotent. Returns whether a new edge was created.
    #[instrument(skip(self))]
    pub async fn follow(&self, follower: UserId, followed: UserId) -> Result<bool> {
        let mut tx = self.repo.begin().await?;
        require_user(tx.as_mut(), follower).await?;
        require_user(tx.as_mut(), followed).await?;
        let created = self.graph.follow(tx.as_mut(), follower, followed).await?;
        tx.commit().await?;
        Ok(created)
    }

    /// Idempotent. Returns whether an edge was removed.
    #[instrument(skip(self))]
    pub async fn unfollow(&self, follower: UserId, followed: UserId) -> Result<bool> {
        let mut tx = self.repo.begin().await?;
        require_user(tx.as_mut(), follower).await?;
        require_user(tx.as_mut(), followed).await?;
        let removed = self.graph.unfollow(tx.as_mut(), follower, followed).await?;
        tx.commit().await?;
        Ok(removed)
    }

    pub async fn is_following(&self, follower: UserId, followed: UserId) -> Result<bool> {
        self.graph.is_following(follower, followed).await
    }

    pub async fn follower_count(&self, user: UserId) -> Result<i64> {
        self.graph.follower_count(user).await
    }

    pub async fn following_count(&self, user: UserId) -> Result<i64> {
        self.graph.following_count(user).await
    }

    pub async fn followers(&self, user: UserId) -> Result<Vec<User>> {
        self.graph.followers(user).await
    }

    pub async fn following(&self, user: UserId) -> Result<Vec<User>> {
        self.graph.following(user).await
    }

    // ── Feeds ───────────────────────────────────────────────────────────

    #[instrument(skip(self))]
    pub async fn following_feed(&self, user: UserId, page: u32, per_page: u32) -> Result<Page<Post>> {
        self.feed.following_feed(user, page, per_page).await
    }

    #[instrument(skip(self))]
    pub async fn explore(&self, page: u32, per_page: u32) -> Result<Page<Post>> {
        self.feed.explore(page, per_page).await
    }

    #[instrument(skip(self))]
    pub async fn user_posts(&self, author: UserId, page: u32, per_page: u32) -> Result<Page<Post>> {
        self.feed.user_posts(author, page, per_page).await
    }

    // ── Search ──────────────────────────────────────────────────────────

    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, page: u32, per_page: u32) -> Result<SearchResults> {
        self.search.search(query, page, per_page).await
    }

    /// Re-submits every post to the index. Returns the number of posts indexed.
    #[instrument(skip(self))]
    pub async fn reindex(&self) -> Result<u64> {
        self.sync.reindex(self.posts.as_ref(), self.reindex_batch_size).await
    }
}

async fn require_user(tx: &mut dyn UnitOfWork, id: UserId) -> Result<User> {
    tx.get_user(id).await?.ok_or_else(|| AppError::not_found("User", id))
}
