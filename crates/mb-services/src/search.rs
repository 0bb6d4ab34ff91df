//! # Search Query Adapter
//!
//! Asks the index for relevance-ordered ids, then rehydrates the rows from the
//! system of record in that same order.

use std::sync::Arc;

use mb_core::error::Result;
use mb_core::models::{PageRequest, Post, PostId, SearchResults};
use mb_core::searchable::Searchable;
use mb_core::traits::{PostRepo, SearchIndex};
use tracing::{debug, warn};

pub struct SearchService {
    posts: Arc<dyn PostRepo>,
    index: Option<Arc<dyn SearchIndex>>,
}

impl SearchService {
    pub fn new(posts: Arc<dyn PostRepo>, index: Option<Arc<dyn SearchIndex>>) -> Self {
        Self { posts, index }
    }

    /// Returns the matching posts of one page plus the total number of matches.
    ///
    /// An unconfigured or failing index yields an empty result, never an error.
    /// Ids the index still knows but the store no longer has are dropped.
    pub async fn search(&self, query: &str, page: u32, per_page: u32) -> Result<SearchResults> {
        let query = query.trim();
        let Some(index) = &self.index else {
            return Ok(SearchResults::default());
        };
        if query.is_empty() {
            return Ok(SearchResults::default());
        }

        let request = PageRequest::new(page, per_page);
        let hits = match index
            .search(
                Post::collection_name(),
                query,
                request.offset() as usize,
                request.per_page as usize,
            )
            .await
        {
            Ok(hits) => hits,
            Err(err) => {
                warn!(%err, "search index query failed");
                return Ok(SearchResults::default());
            }
        };

        if hits.total == 0 {
            return Ok(SearchResults::default());
        }
        if hits.ids.is_empty() {
            return Ok(SearchResults {
                posts: Vec::new(),
                total: hits.total,
            });
        }

        let ids: Vec<PostId> = hits.ids.iter().copied().map(PostId).collect();
        let posts = self.posts.get_posts_in_order(&ids).await?;
        if posts.len() < ids.len() {
            debug!(stale = ids.len() - posts.len(), "dropped index hits with no matching row");
        }

        Ok(SearchResults {
            posts,
            total: hits.total,
        })
    }
}
