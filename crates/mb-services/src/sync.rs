//! # Search Index Synchronizer
//!
//! Mirrors committed writes of searchable entities into the search index.
//!
//! The store calls [`CommitHook::before_commit`] while the transaction is still
//! open, and hands the returned snapshot back to [`CommitHook::after_commit`]
//! once the commit succeeded. A crash between the two leaves the index stale
//! until the next [`SearchSynchronizer::reindex`].

use std::sync::Arc;

use async_trait::async_trait;
use mb_core::changes::ChangeSet;
use mb_core::error::Result;
use mb_core::models::Post;
use mb_core::searchable::{IndexEntry, Searchable};
use mb_core::traits::{CommitHook, PostRepo, SearchIndex};
use tracing::{debug, info, warn};

pub struct SearchSynchronizer {
    index: Option<Arc<dyn SearchIndex>>,
}

impl SearchSynchronizer {
    pub fn new(index: Option<Arc<dyn SearchIndex>>) -> Self {
        Self { index }
    }

    pub fn is_enabled(&self) -> bool {
        self.index.is_some()
    }

    pub async fn add_to_index(&self, entry: &IndexEntry) -> Result<()> {
        match &self.index {
            Some(index) => index.index(entry.collection, entry.id, &entry.document).await,
            None => Ok(()),
        }
    }

    pub async fn remove_from_index(&self, entry: &IndexEntry) -> Result<()> {
        match &self.index {
            Some(index) => index.delete(entry.collection, entry.id).await,
            None => Ok(()),
        }
    }

    /// Pushes one snapshot; returns how many index calls failed.
    async fn apply(&self, snapshot: ChangeSet) -> usize {
        let mut failures = 0;

        let upserts = snapshot.inserted().iter().chain(snapshot.modified());
        for entry in upserts.filter_map(|e| e.index_entry()) {
            if let Err(err) = self.add_to_index(&entry).await {
                warn!(collection = entry.collection, id = entry.id, %err, "failed to index entity");
                failures += 1;
            }
        }

        for entry in snapshot.deleted().iter().filter_map(|e| e.index_entry()) {
            if let Err(err) = self.remove_from_index(&entry).await {
                warn!(collection = entry.collection, id = entry.id, %err, "failed to remove entity from index");
                failures += 1;
            }
        }

        failures
    }

    /// Rebuilds the post collection from the system of record.
    ///
    /// Clears the collection first so that rows deleted while the index was
    /// unreachable disappear too. Returns the number of posts submitted.
    pub async fn reindex<R>(&self, posts: &R, batch_size: usize) -> Result<u64>
    where
        R: PostRepo + ?Sized,
    {
        let Some(index) = &self.index else {
            info!("search index not configured, skipping reindex");
            return Ok(0);
        };

        let collection = Post::collection_name();
        let batch_size = batch_size.max(1);
        index.clear(collection).await?;

        let mut after = None;
        let mut total = 0u64;
        loop {
            let batch = posts.scan_posts(after, batch_size as i64).await?;
            for post in &batch {
                index.index(collection, post.search_id(), &post.document()).await?;
            }
            total += batch.len() as u64;
            debug!(collection, submitted = total, "reindex batch");

            match batch.last() {
                Some(last) if batch.len() == batch_size => after = Some(last.id),
                _ => break,
            }
        }

        info!(collection, total, "reindex complete");
        Ok(total)
    }
}

#[async_trait]
impl CommitHook for SearchSynchronizer {
    fn before_commit(&self, pending: &ChangeSet) -> ChangeSet {
        if !self.is_enabled() {
            return ChangeSet::new();
        }
        pending.searchable()
    }

    async fn after_commit(&self, snapshot: ChangeSet) {
        if snapshot.is_empty() {
            return;
        }
        let ops = snapshot.len();
        let failures = self.apply(snapshot).await;
        if failures > 0 {
            warn!(ops, failures, "search index is behind the store until the next reindex");
        } else {
            debug!(ops, "search index synchronized");
        }
    }
}
