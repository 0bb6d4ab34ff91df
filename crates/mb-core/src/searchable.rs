//! # Searchable entities
//!
//! An entity kind opts into the search index by implementing [`Searchable`].
//! The synchronizer only ever sees entities through [`Entity::index_entry`],
//! which dispatches on the enum variant rather than inspecting types at runtime.

use std::collections::BTreeMap;

use crate::models::{Post, User};

/// Field name -> field value, as submitted to the index.
pub type Document = BTreeMap<String, String>;

pub trait Searchable {
    /// Index collection the entity kind lives in (e.g., "posts").
    fn collection_name() -> &'static str;

    /// Fields mirrored into the index. Every upsert re-submits all of them.
    fn searchable_fields() -> &'static [&'static str];

    fn search_id(&self) -> i64;

    fn field_value(&self, field: &str) -> Option<String>;

    fn document(&self) -> Document {
        Self::searchable_fields()
            .iter()
            .filter_map(|field| Some((field.to_string(), self.field_value(field)?)))
            .collect()
    }
}

impl Searchable for Post {
    fn collection_name() -> &'static str {
        "posts"
    }

    fn searchable_fields() -> &'static [&'static str] {
        &["body"]
    }

    fn search_id(&self) -> i64 {
        self.id.0
    }

    fn field_value(&self, field: &str) -> Option<String> {
        match field {
            "body" => Some(self.body.clone()),
            _ => None,
        }
    }
}

/// A row tracked by a unit of work.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    User(User),
    Post(Post),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKey {
    User(i64),
    Post(i64),
}

/// What the index needs to upsert or remove one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub collection: &'static str,
    pub id: i64,
    pub document: Document,
}

impl IndexEntry {
    pub fn of<T: Searchable>(entity: &T) -> Self {
        Self {
            collection: T::collection_name(),
            id: entity.search_id(),
            document: entity.document(),
        }
    }
}

impl Entity {
    pub fn key(&self) -> EntityKey {
        match self {
            Entity::User(user) => EntityKey::User(user.id.0),
            Entity::Post(post) => EntityKey::Post(post.id.0),
        }
    }

    /// `None` for kinds that are not mirrored into the index.
    pub fn index_entry(&self) -> Option<IndexEntry> {
        match self {
            Entity::Post(post) => Some(IndexEntry::of(post)),
            Entity::User(_) => None,
        }
    }

    pub fn is_searchable(&self) -> bool {
        matches!(self, Entity::Post(_))
    }
}

impl From<User> for Entity {
    fn from(user: User) -> Self {
        Entity::User(user)
    }
}

impl From<Post> for Entity {
    fn from(post: Post) -> Self {
        Entity::Post(post)
    }
}
