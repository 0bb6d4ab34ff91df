//! # SQLite unit of work
//!
//! Wraps one `sqlx` transaction and records every staged row in a `ChangeSet`.
//! Dropping it without `commit` rolls the transaction back.

use std::sync::Arc;

use async_trait::async_trait;
use mb_core::changes::ChangeSet;
use mb_core::error::{AppError, Result};
use mb_core::models::{NewPost, NewUser, Post, PostId, User, UserId};
use mb_core::searchable::Entity;
use mb_core::traits::{CommitHook, UnitOfWork};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use tracing::debug;

use crate::rows::{db_err, now, post_from_row, posts_from_rows, to_micros, user_from_row, POST_COLUMNS, USER_COLUMNS};

pub struct SqliteUnitOfWork {
    tx: Option<Transaction<'static, Sqlite>>,
    changes: ChangeSet,
    hook: Option<Arc<dyn CommitHook>>,
}

impl SqliteUnitOfWork {
    pub(crate) fn new(tx: Transaction<'static, Sqlite>, hook: Option<Arc<dyn CommitHook>>) -> Self {
        Self {
            tx: Some(tx),
            changes: ChangeSet::new(),
            hook,
        }
    }

    fn conn(&mut self) -> Result<&mut SqliteConnection> {
        match self.tx.as_mut() {
            Some(tx) => Ok(&mut **tx),
            None => Err(finished()),
        }
    }

    async fn fetch_post(&mut self, id: PostId) -> Result<Option<Post>> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.0)
            .fetch_optional(self.conn()?)
            .await
            .map_err(db_err)?;
        row.as_ref().map(post_from_row).transpose()
    }
}

fn finished() -> AppError {
    AppError::Internal("unit of work already committed or rolled back".into())
}

#[async_trait]
impl UnitOfWork for SqliteUnitOfWork {
    async fn insert_user(&mut self, new: NewUser) -> Result<User> {
        new.validate()?;
        let created_at = now()?;

        let id = sqlx::query("INSERT INTO users (username, email, created_at) VALUES (?, ?, ?)")
            .bind(&new.username)
            .bind(new.email.trim())
            .bind(to_micros(created_at))
            .execute(self.conn()?)
            .await
            .map_err(db_err)?
            .last_insert_rowid();

        let user = User {
            id: UserId(id),
            username: new.username,
            email: new.email.trim().to_string(),
            about_me: None,
            last_seen: None,
            created_at,
        };
        self.changes.record_insert(Entity::User(user.clone()));
        Ok(user)
    }

    async fn get_user(&mut self, id: UserId) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.0)
            .fetch_optional(self.conn()?)
            .await
            .map_err(db_err)?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn update_user(&mut self, user: &User) -> Result<()> {
        let updated = sqlx::query("UPDATE users SET username = ?, email = ?, about_me = ?, last_seen = ? WHERE id = ?")
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.about_me)
            .bind(user.last_seen.map(to_micros))
            .bind(user.id.0)
            .execute(self.conn()?)
            .await
            .map_err(db_err)?
            .rows_affected();

        if updated == 0 {
            return Err(AppError::not_found("User", user.id));
        }
        self.changes.record_update(Entity::User(user.clone()));
        Ok(())
    }

    /// Deletes the user's posts one by one so each shows up in the change-set.
    async fn delete_user(&mut self, id: UserId) -> Result<bool> {
        let Some(user) = self.get_user(id).await? else {
            return Ok(false);
        };

        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE author_id = ?");
        let rows = sqlx::query(&sql)
            .bind(id.0)
            .fetch_all(self.conn()?)
            .await
            .map_err(db_err)?;
        let posts = posts_from_rows(rows)?;

        sqlx::query("DELETE FROM follows WHERE follower_id = ? OR followed_id = ?")
            .bind(id.0)
            .bind(id.0)
            .execute(self.conn()?)
            .await
            .map_err(db_err)?;
        sqlx::query("DELETE FROM posts WHERE author_id = ?")
            .bind(id.0)
            .execute(self.conn()?)
            .await
            .map_err(db_err)?;
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id.0)
            .execute(self.conn()?)
            .await
            .map_err(db_err)?;

        debug!(user = %id, posts = posts.len(), "staged user deletion");
        for post in posts {
            self.changes.record_delete(Entity::Post(post));
        }
        self.changes.record_delete(Entity::User(user));
        Ok(true)
    }

    async fn insert_post(&mut self, new: NewPost) -> Result<Post> {
        new.validate()?;
        if self.get_user(new.author_id).await?.is_none() {
            return Err(AppError::not_found("User", new.author_id));
        }
        let created_at = now()?;

        let id = sqlx::query("INSERT INTO posts (author_id, body, created_at, language) VALUES (?, ?, ?, ?)")
            .bind(new.author_id.0)
            .bind(&new.body)
            .bind(to_micros(created_at))
            .bind(&new.language)
            .execute(self.conn()?)
            .await
            .map_err(db_err)?
            .last_insert_rowid();

        let post = Post {
            id: PostId(id),
            author_id: new.author_id,
            body: new.body,
            created_at,
            language: new.language,
        };
        self.changes.record_insert(Entity::Post(post.clone()));
        Ok(post)
    }

    async fn delete_post(&mut self, id: PostId) -> Result<bool> {
        let Some(post) = self.fetch_post(id).await? else {
            return Ok(false);
        };

        sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id.0)
            .execute(self.conn()?)
            .await
            .map_err(db_err)?;

        self.changes.record_delete(Entity::Post(post));
        Ok(true)
    }

    async fn is_following(&mut self, follower: UserId, followed: UserId) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM follows WHERE follower_id = ? AND followed_id = ?")
            .bind(follower.0)
            .bind(followed.0)
            .fetch_optional(self.conn()?)
            .await
            .map_err(db_err)?;
        Ok(row.is_some())
    }

    async fn insert_follow(&mut self, follower: UserId, followed: UserId) -> Result<bool> {
        let inserted = sqlx::query("INSERT OR IGNORE INTO follows (follower_id, followed_id) VALUES (?, ?)")
            .bind(follower.0)
            .bind(followed.0)
            .execute(self.conn()?)
            .await
            .map_err(db_err)?
            .rows_affected();
        Ok(inserted == 1)
    }

    async fn delete_follow(&mut self, follower: UserId, followed: UserId) -> Result<bool> {
        let removed = sqlx::query("DELETE FROM follows WHERE follower_id = ? AND followed_id = ?")
            .bind(follower.0)
            .bind(followed.0)
            .execute(self.conn()?)
            .await
            .map_err(db_err)?
            .rows_affected();
        Ok(removed == 1)
    }

    fn pending(&self) -> &ChangeSet {
        &self.changes
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or_else(finished)?;
        let changes = std::mem::take(&mut self.changes);

        // Snapshot while the transaction is still open; dropped if the commit fails.
        let pending = match &self.hook {
            Some(hook) if !changes.is_empty() => Some((hook.clone(), hook.before_commit(&changes))),
            _ => None,
        };

        tx.commit().await.map_err(db_err)?;
        debug!(changes = changes.len(), "committed unit of work");

        if let Some((hook, snapshot)) = pending {
            hook.after_commit(snapshot).await;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or_else(finished)?;
        self.changes.clear();
        tx.rollback().await.map_err(db_err)
    }
}
