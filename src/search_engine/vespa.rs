//! Vespa adapter.
//!
//! The schema name is the last path segment of the configured endpoint
//! (`http://host:8080/<schema>/`, `doc` when the path is empty); queries go
//! to the query API at `POST <host>/search/` with a 10 second timeout and
//! redirects disabled.
//!
//! Seed fetches build YQL from the filter:
//!
//! ```text
//! [{title: [Helicopter]}, {description: [BOGOTA, Colombia]}]
//!   → select * from doc where title contains "Helicopter"
//!       AND (description contains "BOGOTA" OR description contains "Colombia")
//! ```
//!
//! Evaluation sends the template file verbatim as YQL and binds the keyword
//! as the `kw` request parameter, so the template refers to it as `@kw`
//! (typically `userInput(@kw)`) and the keyword is never spliced into YQL.

use async_trait::async_trait;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{hit_to_document, json_response, FieldFilter, SearchEngine};
use crate::error::{Error, Result};
use crate::models::Document;

/// Timeout for every Vespa request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Schema used when the endpoint has no path.
pub const DEFAULT_SCHEMA: &str = "doc";

static FIELD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid field regex"));
static CTRL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x1F\x7F]").expect("valid control regex"));

pub struct Vespa {
    base: String,
    schema: String,
    client: reqwest::Client,
}

impl Vespa {
    pub fn new(endpoint: &str) -> Result<Self> {
        let mut url = reqwest::Url::parse(endpoint)
            .map_err(|e| Error::config(format!("invalid vespa endpoint '{endpoint}': {e}")))?;
        let mut segments: Vec<String> = url
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).map(String::from).collect())
            .unwrap_or_default();
        let schema = segments.pop().unwrap_or_else(|| DEFAULT_SCHEMA.to_string());
        url.set_path(&segments.join("/"));
        let base = url.as_str().trim_end_matches('/').to_string();

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        debug!(base = %base, schema = %schema, "working on vespa endpoint");
        Ok(Self {
            base,
            schema,
            client,
        })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    fn search_url(&self) -> String {
        format!("{}/search/", self.base)
    }

    /// `select <fields> from <schema> where <clause>`.
    ///
    /// Invalid field names are skipped with a warning; no valid fields selects `*`.
    pub fn build_yql(&self, select_fields: &[String], where_clause: &str) -> String {
        let valid: Vec<&str> = select_fields
            .iter()
            .map(String::as_str)
            .filter(|field| {
                let ok = FIELD_RE.is_match(field);
                if !ok {
                    warn!(field = %field, "skipping invalid field name in doc_fields");
                }
                ok
            })
            .collect();
        let fields = if valid.is_empty() {
            "*".to_string()
        } else {
            valid.join(", ")
        };
        format!("select {fields} from {} where {where_clause}", self.schema)
    }

    /// Translate the documents filter into a YQL predicate.
    ///
    /// Values are aggregated per field and deduplicated in first-seen order;
    /// invalid field names are skipped with a warning. An empty filter yields
    /// `true`.
    pub fn filter_to_where(documents_filter: &[FieldFilter]) -> String {
        let mut aggregated: IndexMap<&str, Vec<&str>> = IndexMap::new();
        for (field, values) in documents_filter.iter().flat_map(|entry| entry.iter()) {
            if values.is_empty() {
                continue;
            }
            if !FIELD_RE.is_match(field) {
                warn!(field = %field, "skipping invalid field name in filters");
                continue;
            }
            let slot = aggregated.entry(field.as_str()).or_default();
            for v in values {
                if !slot.contains(&v.as_str()) {
                    slot.push(v.as_str());
                }
            }
        }

        let clauses: Vec<String> = aggregated
            .into_iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(field, values)| match values.as_slice() {
                [single] => format!("{field} contains {}", escape_filter_value(single)),
                many => {
                    let ors: Vec<String> = many
                        .iter()
                        .map(|v| format!("{field} contains {}", escape_filter_value(v)))
                        .collect();
                    format!("({})", ors.join(" OR "))
                }
            })
            .collect();

        if clauses.is_empty() {
            "true".to_string()
        } else {
            clauses.join(" AND ")
        }
    }

    async fn post(&self, payload: &Value) -> Result<Value> {
        let url = self.search_url();
        debug!(url = %url, payload = %payload, "vespa request");
        let response = match self.client.post(&url).json(payload).send().await {
            Ok(r) => r,
            Err(e) => {
                error!(url = %url, error = %e, "request to vespa failed");
                return Err(e.into());
            }
        };
        json_response(response).await.inspect_err(|e| {
            error!(url = %url, error = %e, "request to vespa failed");
        })
    }
}

/// Quote a filter value for YQL: backslashes and quotes escaped, control characters blanked.
fn escape_filter_value(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", CTRL_RE.replace_all(&escaped, " "))
}

#[async_trait]
impl SearchEngine for Vespa {
    fn name(&self) -> &str {
        "vespa"
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
        info!(hits = number_of_docs, offset = start, "fetching documents for query generation");
        let yql = self.build_yql(doc_fields, &Self::filter_to_where(documents_filter));
        let payload = json!({
            "yql": yql,
            "hits": number_of_docs,
            "offset": start,
            "presentation.format": "json",
        });
        self.search(payload).await
    }

    async fn fetch_for_evaluation(
        &self,
        query_template: &Path,
        _doc_fields: &[String],
        keyword: &str,
    ) -> Result<Vec<Document>> {
        info!(template = %query_template.display(), "fetching documents for evaluation");
        let yql = std::fs::read_to_string(query_template)?;
        let kw = if keyword == "*" { "" } else { keyword };
        let payload = json!({
            "yql": yql.trim(),
            "kw": kw,
            "presentation.format": "json",
        });
        self.search(payload).await
    }

    async fn search(&self, payload: Value) -> Result<Vec<Document>> {
        let body = self.post(&payload).await?;
        let empty = serde_json::Map::new();
        let docs: Vec<Document> = body
            .pointer("/root/children")
            .and_then(Value::as_array)
            .map(|hits| {
                hits.iter()
                    .filter_map(|hit| {
                        let fields = hit.get("fields").and_then(Value::as_object).unwrap_or(&empty);
                        hit_to_document(self.name(), hit.get("id"), fields, &[])
                    })
                    .collect()
            })
            .unwrap_or_default();
        info!(count = docs.len(), "fetched documents from the engine");
        Ok(docs)
    }

    async fn total_hits(&self) -> Result<u64> {
        let payload = json!({
            "yql": self.build_yql(&[], "true"),
            "hits": 0,
            "presentation.format": "json",
        });
        let body = self.post(&payload).await?;
        Ok(body
            .pointer("/root/fields/totalCount")
            .and_then(Value::as_u64)
            .unwrap_or(0))
    }
}
