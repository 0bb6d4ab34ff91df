//! Mapping between SQLite rows and `mb-core` domain models.
//!
//! Timestamps are stored as INTEGER microseconds since the epoch so that
//! `ORDER BY created_at` compares numbers, not formatted text.

use chrono::{DateTime, Utc};
use mb_core::error::{AppError, Result};
use mb_core::models::{Post, PostId, User, UserId};
use sqlx::{sqlite::SqliteRow, Row};

pub(crate) const USER_COLUMNS: &str = "id, username, email, about_me, last_seen, created_at";
pub(crate) const POST_COLUMNS: &str = "id, author_id, body, created_at, language";

pub(crate) fn db_err(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return AppError::Conflict(db.message().to_string());
        }
        if db.is_foreign_key_violation() {
            return AppError::NotFound("referenced row".into(), db.message().to_string());
        }
        if db.is_check_violation() {
            return AppError::ValidationError(db.message().to_string());
        }
    }
    AppError::Internal(err.to_string())
}

pub(crate) fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

pub(crate) fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| AppError::Internal(format!("timestamp {micros} out of range")))
}

/// Current time at the precision the store keeps.
pub(crate) fn now() -> Result<DateTime<Utc>> {
    from_micros(to_micros(Utc::now()))
}

pub(crate) fn user_from_row(row: &SqliteRow) -> Result<User> {
    let last_seen: Option<i64> = row.try_get("last_seen").map_err(db_err)?;
    Ok(User {
        id: UserId(row.try_get("id").map_err(db_err)?),
        username: row.try_get("username").map_err(db_err)?,
        email: row.try_get("email").map_err(db_err)?,
        about_me: row.try_get("about_me").map_err(db_err)?,
        last_seen: last_seen.map(from_micros).transpose()?,
        created_at: from_micros(row.try_get("created_at").map_err(db_err)?)?,
    })
}

pub(crate) fn post_from_row(row: &SqliteRow) -> Result<Post> {
    Ok(Post {
        id: PostId(row.try_get("id").map_err(db_err)?),
        author_id: UserId(row.try_get("author_id").map_err(db_err)?),
        body: row.try_get("body").map_err(db_err)?,
        created_at: from_micros(row.try_get("created_at").map_err(db_err)?)?,
        language: row.try_get("language").map_err(db_err)?,
    })
}

pub(crate) fn users_from_rows(rows: Vec<SqliteRow>) -> Result<Vec<User>> {
    rows.iter().map(user_from_row).collect()
}

pub(crate) fn posts_from_rows(rows: Vec<SqliteRow>) -> Result<Vec<Post>> {
    rows.iter().map(post_from_row).collect()
}
