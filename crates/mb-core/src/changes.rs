//! # Change tracking
//!
//! Every unit of work records the rows it touched in a [`ChangeSet`].
//! The three sets stay disjoint no matter how calls are interleaved.

use crate::searchable::{Entity, EntityKey};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    inserted: Vec<Entity>,
    modified: Vec<Entity>,
    deleted: Vec<Entity>,
}

fn position(set: &[Entity], key: EntityKey) -> Option<usize> {
    set.iter().position(|e| e.key() == key)
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_insert(&mut self, entity: Entity) {
        match position(&self.inserted, entity.key()) {
            Some(i) => self.inserted[i] = entity,
            None => self.inserted.push(entity),
        }
    }

    /// An update to a row inserted in the same unit of work keeps it in `inserted`.
    pub fn record_update(&mut self, entity: Entity) {
        let key = entity.key();
        if let Some(i) = position(&self.inserted, key) {
            self.inserted[i] = entity;
        } else if let Some(i) = position(&self.modified, key) {
            self.modified[i] = entity;
        } else if position(&self.deleted, key).is_none() {
            self.modified.push(entity);
        }
    }

    /// A row inserted and deleted in the same unit of work never existed outside it.
    pub fn record_delete(&mut self, entity: Entity) {
        let key = entity.key();
        if let Some(i) = position(&self.inserted, key) {
            self.inserted.remove(i);
            return;
        }
        if let Some(i) = position(&self.modified, key) {
            self.modified.remove(i);
        }
        if position(&self.deleted, key).is_none() {
            self.deleted.push(entity);
        }
    }

    pub fn inserted(&self) -> &[Entity] {
        &self.inserted
    }

    pub fn modified(&self) -> &[Entity] {
        &self.modified
    }

    pub fn deleted(&self) -> &[Entity] {
        &self.deleted
    }

    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inserted.len() + self.modified.len() + self.deleted.len()
    }

    /// Copy restricted to entity kinds that are mirrored into the search index.
    pub fn searchable(&self) -> ChangeSet {
        let keep = |set: &[Entity]| -> Vec<Entity> {
            set.iter().filter(|e| e.is_searchable()).cloned().collect()
        };
        ChangeSet {
            inserted: keep(&self.inserted),
            modified: keep(&self.modified),
            deleted: keep(&self.deleted),
        }
    }

    pub fn clear(&mut self) {
        self.inserted.clear();
        self.modified.clear();
        self.deleted.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Post, PostId, User, UserId};

    fn post(id: i64, body: &str) -> Entity {
        Entity::Post(Post {
            id: PostId(id),
            author_id: UserId(1),
            body: body.into(),
            created_at: chrono::Utc::now(),
            language: None,
        })
    }

    fn user(id: i64) -> Entity {
        Entity::User(User {
            id: UserId(id),
            username: format!("user{id}"),
            email: format!("user{id}@example.com"),
            about_me: None,
            last_seen: None,
            created_at: chrono::Utc::now(),
        })
    }

    #[test]
    fn insert_then_delete_leaves_nothing() {
        let mut changes = ChangeSet::new();
        changes.record_insert(post(1, "draft"));
        changes.record_delete(post(1, "draft"));

        assert!(changes.is_empty());
    }

    #[test]
    fn update_then_delete_moves_to_deleted() {
        let mut changes = ChangeSet::new();
        changes.record_update(user(3));
        changes.record_delete(user(3));

        assert!(changes.modified().is_empty());
        assert_eq!(changes.deleted().len(), 1);
    }

    #[test]
    fn update_of_fresh_insert_stays_inserted_with_latest_state() {
        let mut changes = ChangeSet::new();
        let latest = post(2, "second");
        changes.record_insert(post(2, "first"));
        changes.record_update(latest.clone());

        assert!(changes.modified().is_empty());
        assert_eq!(changes.inserted(), &[latest][..]);
    }

    #[test]
    fn repeated_updates_collapse() {
        let mut changes = ChangeSet::new();
        changes.record_update(user(1));
        changes.record_update(user(1));
        changes.record_delete(post(9, "x"));
        changes.record_delete(post(9, "x"));

        assert_eq!(changes.modified().len(), 1);
        assert_eq!(changes.deleted().len(), 1);
        assert_eq!(changes.len(), 2);
    }

    #[test]
    fn searchable_drops_users() {
        let mut changes = ChangeSet::new();
        changes.record_insert(user(1));
        changes.record_insert(post(1, "hello"));
        changes.record_update(user(2));

        let searchable = changes.searchable();
        assert_eq!(searchable.inserted().len(), 1);
        assert!(searchable.modified().is_empty());
        assert_eq!(changes.len(), 3);
    }
}
