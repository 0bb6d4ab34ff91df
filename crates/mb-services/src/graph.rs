//! # Social Graph
//!
//! Directed follow edges between users. Reads go straight to the repository;
//! mutations are staged in the caller's unit of work and never commit on their own.

use std::sync::Arc;

use mb_core::error::Result;
use mb_core::models::{User, UserId};
use mb_core::traits::{FollowRepo, UnitOfWork};
use tracing::debug;

pub struct SocialGraph {
    follows: Arc<dyn FollowRepo>,
}

impl SocialGraph {
    pub fn new(follows: Arc<dyn FollowRepo>) -> Self {
        Self { follows }
    }

    pub async fn is_following(&self, follower: UserId, followed: UserId) -> Result<bool> {
        self.follows.is_following(follower, followed).await
    }

    /// Returns whether a new edge was staged. Self-follows are ignored.
    pub async fn follow(&self, tx: &mut dyn UnitOfWork, follower: UserId, followed: UserId) -> Result<bool> {
        if follower == followed {
            debug!(user = %follower, "ignoring self-follow");
            return Ok(false);
        }
        tx.insert_follow(follower, followed).await
    }

    /// Returns whether an edge was staged for removal.
    pub async fn unfollow(&self, tx: &mut dyn UnitOfWork, follower: UserId, followed: UserId) -> Result<bool> {
        if follower == followed {
            return Ok(false);
        }
        tx.delete_follow(follower, followed).await
    }

    pub async fn follower_count(&self, user: UserId) -> Result<i64> {
        self.follows.follower_count(user).await
    }

    pub async fn following_count(&self, user: UserId) -> Result<i64> {
        self.follows.following_count(user).await
    }

    pub async fn followers(&self, user: UserId) -> Result<Vec<User>> {
        self.follows.list_followers(user).await
    }

    pub async fn following(&self, user: UserId) -> Result<Vec<User>> {
        self.follows.list_following(user).await
    }
}
