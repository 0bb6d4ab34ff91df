//! # Domain Models
//!
//! These structs represent the core entities of the microblog.
//! Ids are assigned by the system of record and grow with insertion order,
//! which is what feed ordering falls back to when timestamps tie.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

pub const MAX_USERNAME_LEN: usize = 64;
pub const MAX_EMAIL_LEN: usize = 120;
pub const MAX_ABOUT_ME_LEN: usize = 140;
pub const MAX_POST_LEN: usize = 140;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A registered account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Unique handle shown in feeds (e.g., "oleg")
    pub username: String,
    /// Unique contact address
    pub email: String,
    pub about_me: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Input for registering a user. The store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
}

impl NewUser {
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_username(&self.username)?;

        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(AppError::ValidationError(format!(
                "'{}' is not an email address",
                self.email
            )));
        }
        if email.chars().count() > MAX_EMAIL_LEN {
            return Err(AppError::ValidationError(format!(
                "email is longer than {MAX_EMAIL_LEN} characters"
            )));
        }
        Ok(())
    }
}

/// Partial profile edit; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    /// `Some("")` clears the field
    pub about_me: Option<String>,
}

impl ProfileUpdate {
    /// Applies the edit to `user`, returning whether anything changed.
    pub fn apply(&self, user: &mut User) -> Result<bool> {
        let mut changed = false;

        if let Some(username) = &self.username {
            validate_username(username)?;
            if *username != user.username {
                user.username = username.clone();
                changed = true;
            }
        }

        if let Some(about_me) = &self.about_me {
            if about_me.chars().count() > MAX_ABOUT_ME_LEN {
                return Err(AppError::ValidationError(format!(
                    "about me is longer than {MAX_ABOUT_ME_LEN} characters"
                )));
            }
            let about_me = (!about_me.is_empty()).then(|| about_me.clone());
            if about_me != user.about_me {
                user.about_me = about_me;
                changed = true;
            }
        }

        Ok(changed)
    }
}

fn validate_username(username: &str) -> Result<()> {
    if username.trim().is_empty() {
        return Err(AppError::ValidationError("username must not be empty".into()));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(AppError::ValidationError(format!(
            "username is longer than {MAX_USERNAME_LEN} characters"
        )));
    }
    Ok(())
}

/// The fundamental unit of conversation. Never updated after insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author_id: UserId,
    pub body: String,
    /// Assigned by the store at insertion, always UTC
    pub created_at: DateTime<Utc>,
    /// Detected language tag (e.g., "ru"), if the caller detected one
    pub language: Option<String>,
}

/// Input for publishing a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPost {
    pub author_id: UserId,
    pub body: String,
    pub language: Option<String>,
}

impl NewPost {
    pub fn new(author_id: UserId, body: impl Into<String>) -> Self {
        Self {
            author_id,
            body: body.into(),
            language: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.body.trim().is_empty() {
            return Err(AppError::ValidationError("post body must not be empty".into()));
        }
        if self.body.chars().count() > MAX_POST_LEN {
            return Err(AppError::ValidationError(format!(
                "post body is longer than {MAX_POST_LEN} characters"
            )));
        }
        Ok(())
    }
}

/// A 1-based page window. Out-of-range inputs are clamped rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }

    /// One extra row tells us whether a next page exists.
    pub fn fetch_limit(&self) -> i64 {
        i64::from(self.per_page) + 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> Page<T> {
    /// Builds a page from rows fetched with `request.fetch_limit()`.
    pub fn from_window(mut rows: Vec<T>, request: PageRequest) -> Self {
        let per_page = request.per_page as usize;
        let has_next = rows.len() > per_page;
        rows.truncate(per_page);

        Self {
            items: rows,
            page: request.page,
            per_page: request.per_page,
            has_next,
            has_prev: request.page > 1,
        }
    }

    pub fn next_page(&self) -> Option<u32> {
        self.has_next.then(|| self.page + 1)
    }

    pub fn prev_page(&self) -> Option<u32> {
        self.has_prev.then(|| self.page - 1)
    }
}

/// Posts matching a free-text query, in relevance order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub posts: Vec<Post>,
    /// Total matches reported by the index, independent of this page
    pub total: u64,
}

/// Ids returned by the index for one window, plus the total match count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHits {
    pub ids: Vec<i64>,
    pub total: u64,
}
