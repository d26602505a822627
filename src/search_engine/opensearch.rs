//! OpenSearch adapter.
//!
//! Shares the Elasticsearch wire format; differences: the unique key is the
//! `id` source field, single-value filters use `term` instead of `terms`,
//! filters sit alone under `bool.filter`, and the projection always
//! includes `id`.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use tracing::{debug, info};

use super::elasticsearch::{parse_hits, parse_total, post_search};
use super::{
    parse_query_template, replace_placeholder, trim_endpoint, unify_fields, FieldFilter,
    SearchEngine, QUERY_PLACEHOLDER,
};
use crate::error::Result;
use crate::models::Document;

pub struct OpenSearch {
    endpoint: String,
    client: reqwest::Client,
}

impl OpenSearch {
    pub fn new(endpoint: &str) -> Self {
        let endpoint = trim_endpoint(endpoint);
        debug!(endpoint = %endpoint, "working on opensearch endpoint");
        Self {
            endpoint,
            client: reqwest::Client::new(),
        }
    }

    pub fn filter_query(documents_filter: &[FieldFilter]) -> Value {
        let clauses: Vec<Value> = documents_filter
            .iter()
            .flat_map(|entry| entry.iter())
            .filter_map(|(field, values)| match values.as_slice() {
                [] => None,
                [single] => Some(json!({ "term": { field: single } })),
                many => Some(json!({ "terms": { field: many } })),
            })
            .collect();
        if clauses.is_empty() {
            json!({ "match_all": {} })
        } else {
            json!({ "bool": { "filter": clauses } })
        }
    }
}

#[async_trait]
impl SearchEngine for OpenSearch {
    fn name(&self) -> &str {
        "opensearch"
    }

    fn unique_key(&self) -> &str {
        "id"
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
            "query": Self::filter_query(documents_filter),
            "_source": unify_fields(doc_fields, self.unique_key()),
            "from": start,
            "size": number_of_docs,
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
