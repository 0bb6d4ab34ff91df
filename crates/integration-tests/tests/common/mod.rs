//! Shared fixtures: an in-memory SQLite store, optionally paired with the
//! in-memory search index.

#![allow(dead_code)]

use std::sync::Arc;

use mb_core::models::{NewPost, NewUser, Post, User};
use mb_core::traits::SearchIndex;
use mb_db_sqlite::SqliteRepo;
use mb_search_memory::MemoryIndex;
use mb_services::Microblog;

pub struct Harness {
    pub app: Microblog,
    pub repo: Arc<SqliteRepo>,
    pub index: Option<Arc<MemoryIndex>>,
}

pub async fn with_index() -> Harness {
    let repo = Arc::new(SqliteRepo::new("sqlite::memory:").await.unwrap());
    let index = Arc::new(MemoryIndex::new());
    let app = Microblog::new(repo.clone(), Some(index.clone() as Arc<dyn SearchIndex>)).unwrap();
    Harness {
        app,
        repo,
        index: Some(index),
    }
}

pub async fn without_index() -> Harness {
    let repo = Arc::new(SqliteRepo::new("sqlite::memory:").await.unwrap());
    let app = Microblog::new(repo.clone(), None).unwrap();
    Harness { app, repo, index: None }
}

impl Harness {
    pub async fn user(&self, name: &str) -> User {
        self.app
            .register_user(NewUser::new(name, format!("{name}@example.com")))
            .await
            .unwrap()
    }

    pub async fn post(&self, author: &User, body: &str) -> Post {
        self.app.create_post(NewPost::new(author.id, body)).await.unwrap()
    }
}

pub fn ids(posts: &[Post]) -> Vec<i64> {
    posts.iter().map(|p| p.id.0).collect()
}
