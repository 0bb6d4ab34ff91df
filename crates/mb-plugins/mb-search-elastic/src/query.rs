//! Request bodies and response shapes of the Elasticsearch search API.

use mb_core::models::SearchHits;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::ElasticError;

/// Full-text match over every indexed field, windowed by `from`/`size`.
pub fn search_body(query: &str, offset: usize, limit: usize) -> Value {
    json!({
        "query": {
            "multi_match": {
                "query": query,
                "fields": ["*"],
            }
        },
        "from": offset,
        "size": limit,
    })
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct Hits {
    total: Total,
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Total {
    value: u64,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
}

/// Ids in the order the cluster ranked them, plus the total match count.
pub fn parse_hits(body: &[u8]) -> Result<SearchHits, ElasticError> {
    let response: SearchResponse = serde_json::from_slice(body)?;
    let ids = response
        .hits
        .hits
        .into_iter()
        .map(|hit| hit.id.parse::<i64>().map_err(|_| ElasticError::BadId(hit.id)))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SearchHits {
        ids,
        total: response.hits.total.value,
    })
}
