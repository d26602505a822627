//! Apache Solr adapter.
//!
//! Queries go to `GET <endpoint>/select` as form parameters with `wt=json`.
//! The unique key is discovered once from `GET <endpoint>/schema/uniquekey`
//! when the adapter connects. Filter entries become repeated `fq` clauses:
//! `field:value` for one value, `field:(a OR b)` for several.
//!
//! Query templates are JSON objects of request parameters; the keyword is
//! Lucene-escaped before it replaces the placeholder.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use tracing::{debug, error, info};

use super::{
    hit_to_document, json_response, lucene_escape, parse_query_template, replace_placeholder,
    to_query_params, trim_endpoint, unify_fields, FieldFilter, SearchEngine, QUERY_PLACEHOLDER,
};
use crate::error::{Error, Result};
use crate::models::Document;

pub struct Solr {
    endpoint: String,
    client: reqwest::Client,
    unique_key: String,
}

impl Solr {
    /// Connect to a Solr collection and discover its unique key.
    pub async fn connect(endpoint: &str) -> Result<Self> {
        let endpoint = trim_endpoint(endpoint);
        let client = reqwest::Client::new();
        let url = format!("{endpoint}/schema/uniquekey");
        debug!(endpoint = %endpoint, "working on solr endpoint");

        let body = json_response(client.get(&url).send().await?).await?;
        let unique_key = body
            .get("uniqueKey")
            .and_then(Value::as_str)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::validation(format!("{url} returned no uniqueKey")))?
            .to_string();
        debug!(unique_key = %unique_key, "uniqueKey found");

        Ok(Self {
            endpoint,
            client,
            unique_key,
        })
    }

    /// Build `fq` clauses from the documents filter.
    pub fn filter_queries(documents_filter: &[FieldFilter]) -> Vec<String> {
        documents_filter
            .iter()
            .flat_map(|entry| entry.iter())
            .filter(|(_, values)| !values.is_empty())
            .map(|(field, values)| match values.as_slice() {
                [single] => format!("{field}:{single}"),
                many => format!("{field}:({})", many.join(" OR ")),
            })
            .collect()
    }

    async fn select(&self, mut payload: Value) -> Result<Value> {
        let url = format!("{}/select", self.endpoint);
        if let Some(map) = payload.as_object_mut() {
            map.insert("wt".to_string(), json!("json"));
        }
        let params = to_query_params(&payload);
        debug!(url = %url, params = ?params, "solr select");

        let response = self.client.get(&url).query(&params).send().await;
        let response = match response {
            Ok(r) => r,
            Err(e) => {
                error!(url = %url, error = %e, "solr query failed");
                return Err(e.into());
            }
        };
        json_response(response).await.inspect_err(|e| {
            error!(url = %url, error = %e, "solr query failed");
        })
    }
}

#[async_trait]
impl SearchEngine for Solr {
    fn name(&self) -> &str {
        "solr"
    }

    fn unique_key(&self) -> &str {
        &self.unique_key
    }

    async fn fetch_for_query_generation(
        &self,
        documents_filter: &[FieldFilter],
        number_of_docs: usize,
        doc_fields: &[String],
        start: usize,
    ) -> Result<Vec<Document>> {
        info!(rows = number_of_docs, start, "fetching documents for query generation");
        let mut payload = json!({
            "q": "*:*",
            "rows": number_of_docs,
            "start": start,
            "fl": unify_fields(doc_fields, &self.unique_key).join(","),
        });
        let fq = Self::filter_queries(documents_filter);
        if !fq.is_empty() {
            payload["fq"] = json!(fq);
        }
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
        let mut payload = replace_placeholder(&template, QUERY_PLACEHOLDER, &lucene_escape(keyword));
        payload["fl"] = json!(unify_fields(doc_fields, &self.unique_key).join(","));
        self.search(payload).await
    }

    async fn search(&self, payload: Value) -> Result<Vec<Document>> {
        let body = self.select(payload).await?;
        let hits = body
            .pointer("/response/docs")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let docs: Vec<Document> = hits
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|hit| {
                hit_to_document(
                    "solr",
                    hit.get(&self.unique_key),
                    hit,
                    &[self.unique_key.as_str()],
                )
            })
            .collect();
        info!(count = docs.len(), "fetched documents from the engine");
        Ok(docs)
    }

    async fn total_hits(&self) -> Result<u64> {
        let body = self.select(json!({ "q": "*:*", "rows": 0 })).await?;
        Ok(body
            .pointer("/response/numFound")
            .and_then(Value::as_u64)
            .unwrap_or(0))
    }
}
