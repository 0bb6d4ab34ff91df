//! # mb-search-elastic
//!
//! [`SearchIndex`] backed by an Elasticsearch cluster over its REST API.
//! Each collection maps to one index; documents are keyed by the entity id.
//! Document writes use `refresh=wait_for`.

mod query;

use std::time::Duration;

use async_trait::async_trait;
use mb_core::error::{AppError, Result};
use mb_core::models::SearchHits;
use mb_core::searchable::Document;
use mb_core::traits::SearchIndex;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use tracing::debug;

pub use query::{parse_hits, search_body};

#[derive(Debug, thiserror::Error)]
pub enum ElasticError {
    #[error("reqwest: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("invalid api key header")]
    InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("document id {0:?} is not numeric")]
    BadId(String),
    #[error("{method} {url} returned {status}")]
    Status {
        method: &'static str,
        url: String,
        status: StatusCode,
    },
}

impl From<ElasticError> for AppError {
    fn from(err: ElasticError) -> Self {
        AppError::SearchUnavailable(err.to_string())
    }
}

#[derive(Debug)]
pub struct ElasticIndex {
    base_url: String,
    client: reqwest::Client,
}

impl ElasticIndex {
    /// `api_key` is sent as `Authorization: ApiKey <key>` on every request.
    pub fn new(base_url: &str, api_key: Option<&str>, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let mut value = HeaderValue::from_str(&format!("ApiKey {key}")).map_err(ElasticError::from)?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(ElasticError::from)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn collection_url(&self, collection: &str) -> String {
        format!("{}/{collection}", self.base_url)
    }

    pub fn document_url(&self, collection: &str, id: i64) -> String {
        format!("{}/{collection}/_doc/{id}", self.base_url)
    }

    /// Document writes wait for the next refresh so a search issued right
    /// after the commit already sees them.
    pub fn document_write_url(&self, collection: &str, id: i64) -> String {
        format!("{}?refresh=wait_for", self.document_url(collection, id))
    }
}

/// The calls the adapter makes, with their policy for a missing target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Index,
    Delete,
    Search,
    Clear,
}

impl Op {
    fn method(self) -> &'static str {
        match self {
            Op::Index => "PUT",
            Op::Delete | Op::Clear => "DELETE",
            Op::Search => "POST",
        }
    }

    /// A 404 means the document or index is already gone, or was never created.
    fn tolerates_missing(self) -> bool {
        !matches!(self, Op::Index)
    }
}

/// `Ok(true)` for 2xx, `Ok(false)` for a tolerated 404, an error otherwise.
fn check(op: Op, url: &str, status: StatusCode) -> std::result::Result<bool, ElasticError> {
    if status.is_success() {
        return Ok(true);
    }
    if status == StatusCode::NOT_FOUND && op.tolerates_missing() {
        debug!(method = op.method(), url, "elasticsearch target missing");
        return Ok(false);
    }
    Err(ElasticError::Status {
        method: op.method(),
        url: url.to_string(),
        status,
    })
}

#[async_trait]
impl SearchIndex for ElasticIndex {
    async fn index(&self, collection: &str, id: i64, document: &Document) -> Result<()> {
        let url = self.document_write_url(collection, id);
        let response = self
            .client
            .put(&url)
            .json(document)
            .send()
            .await
            .map_err(ElasticError::from)?;
        check(Op::Index, &url, response.status())?;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: i64) -> Result<()> {
        let url = self.document_write_url(collection, id);
        let response = self.client.delete(&url).send().await.map_err(ElasticError::from)?;
        check(Op::Delete, &url, response.status())?;
        Ok(())
    }

    async fn search(&self, collection: &str, query: &str, offset: usize, limit: usize) -> Result<SearchHits> {
        let url = format!("{}/_search", self.collection_url(collection));
        let response = self
            .client
            .post(&url)
            .json(&search_body(query, offset, limit))
            .send()
            .await
            .map_err(ElasticError::from)?;

        if !check(Op::Search, &url, response.status())? {
            return Ok(SearchHits::default());
        }
        let body = response.bytes().await.map_err(ElasticError::from)?;
        Ok(parse_hits(&body)?)
    }

    async fn clear(&self, collection: &str) -> Result<()> {
        let url = self.collection_url(collection);
        let response = self.client.delete(&url).send().await.map_err(ElasticError::from)?;
        check(Op::Clear, &url, response.status())?;
        Ok(())
    }
}
