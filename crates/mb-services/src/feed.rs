//! # Feed Query Engine
//!
//! Paginated post listings. Every listing is newest first with ties broken by
//! the later id, which keeps page boundaries stable across requests.

use std::sync::Arc;

use mb_core::error::Result;
use mb_core::models::{Page, PageRequest, Post, UserId};
use mb_core::traits::PostRepo;
use tracing::debug;

pub struct FeedService {
    posts: Arc<dyn PostRepo>,
}

impl FeedService {
    pub fn new(posts: Arc<dyn PostRepo>) -> Self {
        Self { posts }
    }

    /// Posts by `user` and everyone `user` follows. The user's own posts are
    /// always included, whatever the follow graph says.
    pub async fn following_feed(&self, user: UserId, page: u32, per_page: u32) -> Result<Page<Post>> {
        let request = PageRequest::new(page, per_page);
        let rows = self
            .posts
            .list_followed_posts(user, request.fetch_limit(), request.offset())
            .await?;
        debug!(user = %user, page = request.page, rows = rows.len(), "following feed");
        Ok(Page::from_window(rows, request))
    }

    /// Every post in the system.
    pub async fn explore(&self, page: u32, per_page: u32) -> Result<Page<Post>> {
        let request = PageRequest::new(page, per_page);
        let rows = self.posts.list_posts(request.fetch_limit(), request.offset()).await?;
        Ok(Page::from_window(rows, request))
    }

    /// One author's timeline.
    pub async fn user_posts(&self, author: UserId, page: u32, per_page: u32) -> Result<Page<Post>> {
        let request = PageRequest::new(page, per_page);
        let rows = self
            .posts
            .list_user_posts(author, request.fetch_limit(), request.offset())
            .await?;
        Ok(Page::from_window(rows, request))
    }
}
