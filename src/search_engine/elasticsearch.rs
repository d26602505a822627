//! Elasticsearch adapter.
//!
//! All requests are `POST <endpoint>/_search` with a JSON body. Filters are
//! `terms` clauses under `bool.filter` next to a `match_all` must-clause.
//! The document id is read from `_source.id` when present, otherwise from
//! the hit `_id`; the `id` source field is never stored as a field.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use tracing::{debug, error, info};

use super::{
    hit_to_document, json_response, parse_query_template, replace_placeholder, trim_endpoint,
    unify_fields, FieldFilter, SearchEngine, QUERY_PLACEHOLDER,
};
use crate::error::Result;
use crate::models::Document;

pub struct Elasticsearch {
    endpoint: String,
    client: reqwest::Client,
}

impl Elasticsearch {
    pub fn new(endpoint: &str) -> Self {
        let endpoint = trim_endpoint(endpoint);
        debug!(endpoint = %endpoint, "working on elasticsearch endpoint");
        Self {
            endpoint,
            client: reqwest::Client::new(),
        }
    }

    /// Query clause for the documents filter.
    pub fn filter_query(documents_filter: &[FieldFilter]) -> Value {
        let clauses: Vec<Value> = documents_filter
            .iter()
            .flat_map(|entry| entry.iter())
            .filter(|(_, values)| !values.is_empty())
            .map(|(field, values)| json!({ "terms": { field: values } }))
            .collect();
        if clauses.is_empty() {
            json!({ "match_all": {} })
        } else {
            json!({
                "bool": {
                    "must": { "match_all": {} },
                    "filter": clauses,
                }
            })
        }
    }
}

/// POST a body to `<endpoint>/_search` and decode the response.
pub(crate) async fn post_search(
    client: &reqwest::Client,
    engine: &str,
    endpoint: &str,
    payload: &Value,
) -> Result<Value> {
    let url = format!("{endpoint}/_search");
    debug!(engine, url = %url, payload = %payload, "search request");
    let response = match client.post(&url).json(payload).send().await {
        Ok(r) => r,
        Err(e) => {
            error!(engine, url = %url, error = %e, "query failed");
            return Err(e.into());
        }
    };
    json_response(response).await.inspect_err(|e| {
        error!(engine, url = %url, error = %e, "query failed");
    })
}

/// Convert `hits.hits` into documents (id from `_source.id`, else `_id`).
pub(crate) fn parse_hits(engine: &str, body: &Value) -> Vec<Document> {
    let empty = serde_json::Map::new();
    body.pointer("/hits/hits")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .filter_map(|hit| {
                    let source = hit.get("_source").and_then(Value::as_object).unwrap_or(&empty);
                    let id = source.get("id").or_else(|| hit.get("_id"));
                    hit_to_document(engine, id, source, &["id"])
                })
                .collect()
        })
        .unwrap_or_default()
}

/// `hits.total.value`, or a bare numeric `hits.total`.
pub(crate) fn parse_total(body: &Value) -> u64 {
    body.pointer("/hits/total/value")
        .or_else(|| body.pointer("/hits/total"))
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

#[async_trait]
impl SearchEngine for Elasticsearch {
    fn name(&self) -> &str {
        "elasticsearch"
    }

    fn unique_key(&self) -> &str {
        "_id"
    }

    async fn fetch_for_query_generation(
        &self,
        documents_filter: &[FieldFilter],
        number_of_docs: usize,
        doc_fields: &[String],
        start: usize,
    ) -> Result<Vec<Document>> {
        info!(size = number_of_docs, from = start, "fetching documents for query generation");
        let payload = json!({
            "size": number_of_docs,
            "query": Self::filter_query(documents_filter),
            "from": start,
            "_source": doc_fields,
        });
        self.search(payload).await
    }

    async fn fetch_for_evaluation(
        &self,
        query_template: &Path,
        doc_fields: &[String],
        keyword: &str,
    ) -> Result<Vec<Document>> {
        info!(template = %query_template.display(), "fetching documents for evaluation");
        let template = parse_query_template(query_template)?;
        let mut payload = replace_placeholder(&template, QUERY_PLACEHOLDER, keyword);
        payload["_source"] = json!(unify_fields(doc_fields, self.unique_key()));
        self.search(payload).await
    }

    async fn search(&self, payload: Value) -> Result<Vec<Document>> {
        let body = post_search(&self.client, self.name(), &self.endpoint, &payload).await?;
        let docs = parse_hits(self.name(), &body);
        info!(count = docs.len(), "fetched documents from the engine");
        Ok(docs)
    }

    async fn total_hits(&self) -> Result<u64> {
        let payload = json!({ "query": { "match_all": {} }, "size": 0, "track_total_hits": true });
        let body = post_search(&self.client, self.name(), &self.endpoint, &payload).await?;
        Ok(parse_total(&body))
    }
}
