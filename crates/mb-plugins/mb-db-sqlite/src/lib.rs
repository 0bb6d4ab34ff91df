//! # mb-db-sqlite Implementation
//!
//! This crate implements the data mapping between the SQLite relational model
//! and the `mb-core` domain models, plus the unit of work that feeds commit hooks.

mod rows;
mod uow;

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use mb_core::error::{AppError, Result};
use mb_core::models::{Post, PostId, User, UserId};
use mb_core::traits::{CommitHook, FollowRepo, PostRepo, Store, UnitOfWork, UserRepo};
use once_cell::sync::OnceCell;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use tracing::info;

use rows::{db_err, posts_from_rows, user_from_row, users_from_rows, POST_COLUMNS, USER_COLUMNS};

pub use uow::SqliteUnitOfWork;

const SCHEMA: &str = include_str!("schema.sql");

pub struct SqliteRepo {
    pool: SqlitePool,
    hook: OnceCell<Arc<dyn CommitHook>>,
}

impl SqliteRepo {
    pub async fn new(url: &str) -> Result<Self> {
        Self::with_max_connections(url, 5).await
    }

    /// Connects and applies the schema.
    ///
    /// An in-memory database lives only as long as its connection, so
    /// `:memory:` URLs get a single connection that is never recycled.
    pub async fn with_max_connections(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(db_err)?
            .create_if_missing(true)
            .foreign_keys(true);

        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options.connect_with(options).await.map_err(db_err)?;
        sqlx::raw_sql(SCHEMA).execute(&pool).await.map_err(db_err)?;
        info!(in_memory, "sqlite store ready");

        Ok(Self {
            pool,
            hook: OnceCell::new(),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Store for SqliteRepo {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await.map_err(db_err)?;
        Ok(Box::new(SqliteUnitOfWork::new(tx, self.hook.get().cloned())))
    }

    fn register_commit_hook(&self, hook: Arc<dyn CommitHook>) -> Result<()> {
        self.hook
            .set(hook)
            .map_err(|_| AppError::Conflict("commit hook already registered".into()))
    }
}

#[async_trait]
impl UserRepo for SqliteRepo {
    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?");
        let row = sqlx::query(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(user_from_row).transpose()
    }
}

#[async_trait]
impl FollowRepo for SqliteRepo {
    /// Point lookup on the (follower_id, followed_id) primary key.
    async fn is_following(&self, follower: UserId, followed: UserId) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM follows WHERE follower_id = ? AND followed_id = ?")
            .bind(follower.0)
            .bind(followed.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.is_some())
    }

    async fn follower_count(&self, user: UserId) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM follows WHERE followed_id = ?")
            .bind(user.0)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn following_count(&self, user: UserId) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM follows WHERE follower_id = ?")
            .bind(user.0)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn list_followers(&self, user: UserId) -> Result<Vec<User>> {
        let rows = sqlx::query(
            "SELECT u.id, u.username, u.email, u.about_me, u.last_seen, u.created_at \
             FROM users u JOIN follows f ON f.follower_id = u.id \
             WHERE f.followed_id = ? ORDER BY u.username",
        )
        .bind(user.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        users_from_rows(rows)
    }

    async fn list_following(&self, user: UserId) -> Result<Vec<User>> {
        let rows = sqlx::query(
            "SELECT u.id, u.username, u.email, u.about_me, u.last_seen, u.created_at \
             FROM users u JOIN follows f ON f.followed_id = u.id \
             WHERE f.follower_id = ? ORDER BY u.username",
        )
        .bind(user.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        users_from_rows(rows)
    }
}

#[async_trait]
impl PostRepo for SqliteRepo {
    /// The author filter is a set predicate, so a post can match at most once
    /// whatever the shape of the follow graph.
    async fn list_followed_posts(&self, user: UserId, limit: i64, offset: i64) -> Result<Vec<Post>> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts \
             WHERE author_id = ? OR author_id IN (SELECT followed_id FROM follows WHERE follower_id = ?) \
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        );
        let rows = sqlx::query(&sql)
            .bind(user.0)
            .bind(user.0)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        posts_from_rows(rows)
    }

    async fn list_user_posts(&self, author: UserId, limit: i64, offset: i64) -> Result<Vec<Post>> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE author_id = ? \
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        );
        let rows = sqlx::query(&sql)
            .bind(author.0)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        posts_from_rows(rows)
    }

    async fn list_posts(&self, limit: i64, offset: i64) -> Result<Vec<Post>> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?");
        let rows = sqlx::query(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        posts_from_rows(rows)
    }

    /// `id IN (...)` alone returns rows in storage order, so the caller's
    /// sequence is restored with `ORDER BY CASE id WHEN ... END`.
    async fn get_posts_in_order(&self, ids: &[PostId]) -> Result<Vec<Post>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {POST_COLUMNS} FROM posts WHERE id IN ("));
        let mut in_list = qb.separated(", ");
        for id in ids {
            in_list.push_bind(id.0);
        }
        qb.push(") ORDER BY CASE id");
        for (position, id) in ids.iter().enumerate() {
            qb.push(" WHEN ")
                .push_bind(id.0)
                .push(" THEN ")
                .push_bind(position as i64);
        }
        qb.push(" END");

        let rows = qb.build().fetch_all(&self.pool).await.map_err(db_err)?;
        posts_from_rows(rows)
    }

    async fn scan_posts(&self, after: Option<PostId>, limit: i64) -> Result<Vec<Post>> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id > ? ORDER BY id ASC LIMIT ?");
        let rows = sqlx::query(&sql)
            .bind(after.map_or(0, |id| id.0))
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        posts_from_rows(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mb_core::changes::ChangeSet;
    use mb_core::models::{NewPost, NewUser};
    use std::sync::Mutex;

    async fn repo() -> SqliteRepo {
        SqliteRepo::new("sqlite::memory:").await.unwrap()
    }

    async fn seed_user(repo: &SqliteRepo, name: &str) -> User {
        let mut tx = repo.begin().await.unwrap();
        let user = tx
            .insert_user(NewUser::new(name, format!("{name}@example.com")))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        user
    }

    #[derive(Default)]
    struct RecordingHook {
        seen: Mutex<Vec<ChangeSet>>,
        applied: Mutex<Vec<ChangeSet>>,
    }

    #[async_trait]
    impl CommitHook for RecordingHook {
        fn before_commit(&self, pending: &ChangeSet) -> ChangeSet {
            self.seen.lock().unwrap().push(pending.clone());
            pending.clone()
        }

        async fn after_commit(&self, snapshot: ChangeSet) {
            self.applied.lock().unwrap().push(snapshot);
        }
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let repo = repo().await;
        let oleg = seed_user(&repo, "oleg").await;

        let found = repo.get_user_by_username("oleg").await.unwrap().unwrap();
        assert_eq!(found, oleg);
        assert!(repo.get_user(UserId(999)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_is_conflict() {
        let repo = repo().await;
        seed_user(&repo, "oleg").await;

        let mut tx = repo.begin().await.unwrap();
        let err = tx
            .insert_user(NewUser::new("oleg", "other@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_follow_edges_are_unique() {
        let repo = repo().await;
        let a = seed_user(&repo, "a").await;
        let b = seed_user(&repo, "b").await;

        let mut tx = repo.begin().await.unwrap();
        assert!(tx.insert_follow(a.id, b.id).await.unwrap());
        assert!(!tx.insert_follow(a.id, b.id).await.unwrap());
        assert!(tx.is_following(a.id, b.id).await.unwrap());
        tx.commit().await.unwrap();

        assert!(repo.is_following(a.id, b.id).await.unwrap());
        assert!(!repo.is_following(b.id, a.id).await.unwrap());
        assert_eq!(repo.follower_count(b.id).await.unwrap(), 1);
        assert_eq!(repo.following_count(a.id).await.unwrap(), 1);
        assert_eq!(repo.list_followers(b.id).await.unwrap(), vec![a.clone()]);
        assert_eq!(repo.list_following(a.id).await.unwrap(), vec![b.clone()]);
    }

    #[tokio::test]
    async fn test_self_edge_is_ignored_by_storage() {
        let repo = repo().await;
        let a = seed_user(&repo, "a").await;

        let mut tx = repo.begin().await.unwrap();
        assert!(!tx.insert_follow(a.id, a.id).await.unwrap());
        tx.commit().await.unwrap();
        assert!(!repo.is_following(a.id, a.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_rollback_discards_staged_rows() {
        let repo = repo().await;
        let a = seed_user(&repo, "a").await;

        let mut tx = repo.begin().await.unwrap();
        tx.insert_post(NewPost::new(a.id, "never seen")).await.unwrap();
        assert_eq!(tx.pending().inserted().len(), 1);
        tx.rollback().await.unwrap();

        assert!(repo.list_posts(10, 0).await.unwrap().is_empty());
        assert!(tx.commit().await.is_err());
    }

    #[tokio::test]
    async fn test_posts_in_requested_order() {
        let repo = repo().await;
        let a = seed_user(&repo, "a").await;

        let mut tx = repo.begin().await.unwrap();
        let mut ids = Vec::new();
        for body in ["one", "two", "three"] {
            ids.push(tx.insert_post(NewPost::new(a.id, body)).await.unwrap().id);
        }
        tx.commit().await.unwrap();

        let wanted = vec![ids[2], PostId(404), ids[0], ids[1]];
        let bodies: Vec<String> = repo
            .get_posts_in_order(&wanted)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.body)
            .collect();
        assert_eq!(bodies, vec!["three", "one", "two"]);
        assert!(repo.get_posts_in_order(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scan_posts_pages_by_id() {
        let repo = repo().await;
        let a = seed_user(&repo, "a").await;

        let mut tx = repo.begin().await.unwrap();
        for i in 0..5 {
            tx.insert_post(NewPost::new(a.id, format!("post {i}"))).await.unwrap();
        }
        tx.commit().await.unwrap();

        let first = repo.scan_posts(None, 3).await.unwrap();
        assert_eq!(first.len(), 3);
        let rest = repo.scan_posts(Some(first[2].id), 3).await.unwrap();
        assert_eq!(rest.len(), 2);
        assert!(rest[0].id > first[2].id);
    }

    #[tokio::test]
    async fn test_commit_hook_sees_change_set_once() {
        let repo = repo().await;
        let hook = Arc::new(RecordingHook::default());
        repo.register_commit_hook(hook.clone()).unwrap();
        assert!(matches!(
            repo.register_commit_hook(hook.clone()),
            Err(AppError::Conflict(_))
        ));

        let a = seed_user(&repo, "a").await;
        let mut tx = repo.begin().await.unwrap();
        let post = tx.insert_post(NewPost::new(a.id, "hello")).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = repo.begin().await.unwrap();
        assert!(tx.delete_post(post.id).await.unwrap());
        tx.commit().await.unwrap();

        let applied = hook.applied.lock().unwrap();
        assert_eq!(applied.len(), 3);
        assert_eq!(applied[1].inserted().len(), 1);
        assert_eq!(applied[2].deleted().len(), 1);
        assert_eq!(hook.seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_hook_skipped_when_commit_has_no_rows() {
        let repo = repo().await;
        let hook = Arc::new(RecordingHook::default());
        repo.register_commit_hook(hook.clone()).unwrap();

        let mut tx = repo.begin().await.unwrap();
        tx.is_following(UserId(1), UserId(2)).await.unwrap();
        tx.commit().await.unwrap();

        assert!(hook.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_user_cascades() {
        let repo = repo().await;
        let a = seed_user(&repo, "a").await;
        let b = seed_user(&repo, "b").await;

        let mut tx = repo.begin().await.unwrap();
        tx.insert_post(NewPost::new(a.id, "first")).await.unwrap();
        tx.insert_post(NewPost::new(a.id, "second")).await.unwrap();
        tx.insert_follow(a.id, b.id).await.unwrap();
        tx.insert_follow(b.id, a.id).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = repo.begin().await.unwrap();
        assert!(tx.delete_user(a.id).await.unwrap());
        assert_eq!(tx.pending().deleted().len(), 3);
        tx.commit().await.unwrap();

        assert!(repo.get_user(a.id).await.unwrap().is_none());
        assert!(repo.list_posts(10, 0).await.unwrap().is_empty());
        assert_eq!(repo.follower_count(b.id).await.unwrap(), 0);
        assert_eq!(repo.following_count(b.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_post_for_unknown_author_is_not_found() {
        let repo = repo().await;
        let mut tx = repo.begin().await.unwrap();
        let err = tx.insert_post(NewPost::new(UserId(42), "orphan")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_, _)));
    }
}
