//! # mb-search-memory
//!
//! In-process inverted index implementing [`SearchIndex`]. Suitable for
//! tests and single-node deployments; contents are lost on restart, so run a
//! reindex after startup.
//!
//! Scoring: every query term adds 2 to a document containing that exact
//! word, or 1 if the document only has a longer word starting with it.
//! Equal scores rank the higher id first.

mod tokenizer;

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use dashmap::DashMap;
use mb_core::error::Result;
use mb_core::models::SearchHits;
use mb_core::searchable::Document;
use mb_core::traits::SearchIndex;
use tracing::debug;

pub use tokenizer::{tokenize, tokenize_query};

#[derive(Default)]
struct Collection {
    postings: HashMap<String, HashSet<i64>>,
    terms: HashMap<i64, HashSet<String>>,
}

impl Collection {
    fn remove(&mut self, id: i64) {
        let Some(terms) = self.terms.remove(&id) else {
            return;
        };
        for term in terms {
            if let Some(ids) = self.postings.get_mut(&term) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.postings.remove(&term);
                }
            }
        }
    }

    fn insert(&mut self, id: i64, document: &Document) {
        self.remove(id);
        let terms: HashSet<String> = document.values().flat_map(|value| tokenize(value)).collect();
        for term in &terms {
            self.postings.entry(term.clone()).or_default().insert(id);
        }
        self.terms.insert(id, terms);
    }

    fn score(&self, query: &[String]) -> Vec<(i64, u32)> {
        let mut scores: HashMap<i64, u32> = HashMap::new();

        for wanted in query {
            let mut exact: HashSet<i64> = HashSet::new();
            let mut prefix: HashSet<i64> = HashSet::new();
            for (term, ids) in &self.postings {
                if term == wanted {
                    exact.extend(ids);
                } else if term.starts_with(wanted.as_str()) {
                    prefix.extend(ids);
                }
            }
            for id in &exact {
                *scores.entry(*id).or_default() += 2;
            }
            for id in prefix.difference(&exact) {
                *scores.entry(*id).or_default() += 1;
            }
        }

        let mut ranked: Vec<(i64, u32)> = scores.into_iter().collect();
        ranked.sort_unstable_by_key(|&(id, score)| (Reverse(score), Reverse(id)));
        ranked
    }
}

#[derive(Default)]
pub struct MemoryIndex {
    collections: DashMap<String, Collection>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents held for `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map_or(0, |c| c.terms.len())
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn index(&self, collection: &str, id: i64, document: &Document) -> Result<()> {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id, document);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: i64) -> Result<()> {
        if let Some(mut entries) = self.collections.get_mut(collection) {
            entries.remove(id);
        }
        Ok(())
    }

    async fn search(&self, collection: &str, query: &str, offset: usize, limit: usize) -> Result<SearchHits> {
        let terms = tokenize_query(query);
        if terms.is_empty() {
            return Ok(SearchHits::default());
        }
        let Some(entries) = self.collections.get(collection) else {
            return Ok(SearchHits::default());
        };

        let ranked = entries.score(&terms);
        let total = ranked.len() as u64;
        let ids = ranked.into_iter().skip(offset).take(limit).map(|(id, _)| id).collect();
        debug!(collection, query, total, "memory index search");

        Ok(SearchHits { ids, total })
    }

    async fn clear(&self, collection: &str) -> Result<()> {
        self.collections.remove(collection);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(body: &str) -> Document {
        Document::from([("body".to_string(), body.to_string())])
    }

    #[tokio::test]
    async fn finds_indexed_words() {
        let index = MemoryIndex::new();
        index.index("posts", 1, &doc("Learning Rust today")).await.unwrap();
        index.index("posts", 2, &doc("Python is fine too")).await.unwrap();

        let hits = index.search("posts", "rust", 0, 10).await.unwrap();
        assert_eq!(hits, SearchHits { ids: vec![1], total: 1 });
    }

    #[tokio::test]
    async fn exact_words_outrank_prefixes() {
        let index = MemoryIndex::new();
        index.index("posts", 1, &doc("rustacean meetup")).await.unwrap();
        index.index("posts", 2, &doc("rust meetup")).await.unwrap();
        index.index("posts", 3, &doc("nothing relevant")).await.unwrap();

        let hits = index.search("posts", "rust", 0, 10).await.unwrap();
        assert_eq!(hits.ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn more_matching_terms_rank_higher_and_ties_prefer_newer_ids() {
        let index = MemoryIndex::new();
        index.index("posts", 1, &doc("async rust")).await.unwrap();
        index.index("posts", 2, &doc("rust")).await.unwrap();
        index.index("posts", 3, &doc("rust")).await.unwrap();

        let hits = index.search("posts", "async rust", 0, 10).await.unwrap();
        assert_eq!(hits.ids, vec![1, 3, 2]);
    }

    #[tokio::test]
    async fn reindexing_replaces_old_terms() {
        let index = MemoryIndex::new();
        index.index("posts", 1, &doc("first draft")).await.unwrap();
        index.index("posts", 1, &doc("final version")).await.unwrap();

        assert_eq!(index.search("posts", "draft", 0, 10).await.unwrap().total, 0);
        assert_eq!(index.search("posts", "final", 0, 10).await.unwrap().ids, vec![1]);
        assert_eq!(index.len("posts"), 1);
    }

    #[tokio::test]
    async fn deleted_documents_disappear() {
        let index = MemoryIndex::new();
        index.index("posts", 1, &doc("hello world")).await.unwrap();
        index.delete("posts", 1).await.unwrap();
        index.delete("posts", 42).await.unwrap();

        assert_eq!(index.search("posts", "hello", 0, 10).await.unwrap(), SearchHits::default());
        assert!(index.is_empty("posts"));
    }

    #[tokio::test]
    async fn windows_results_but_reports_full_total() {
        let index = MemoryIndex::new();
        for id in 1..=5 {
            index.index("posts", id, &doc("same words")).await.unwrap();
        }

        let hits = index.search("posts", "same", 2, 2).await.unwrap();
        assert_eq!(hits.ids, vec![3, 2]);
        assert_eq!(hits.total, 5);
    }

    #[tokio::test]
    async fn one_letter_posts_are_findable() {
        let index = MemoryIndex::new();
        index.index("posts", 1, &doc("я")).await.unwrap();
        index.index("posts", 2, &doc("ясно")).await.unwrap();

        assert_eq!(index.search("posts", "я", 0, 10).await.unwrap().ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn collections_are_isolated() {
        let index = MemoryIndex::new();
        index.index("posts", 1, &doc("shared term")).await.unwrap();
        index.index("drafts", 1, &doc("shared term")).await.unwrap();
        index.clear("drafts").await.unwrap();

        assert_eq!(index.search("posts", "shared", 0, 10).await.unwrap().total, 1);
        assert_eq!(index.search("drafts", "shared", 0, 10).await.unwrap().total, 0);
        assert_eq!(index.search("missing", "shared", 0, 10).await.unwrap().total, 0);
    }
}
