//! Search-engine adapters.
//!
//! A [`SearchEngine`] hides the query DSL and response shape of one engine
//! behind three document-fetching operations:
//!
//! | Operation | Purpose |
//! |-----------|---------|
//! | [`fetch_for_query_generation`](SearchEngine::fetch_for_query_generation) | Seed documents, honouring the configured filter |
//! | [`fetch_for_evaluation`](SearchEngine::fetch_for_evaluation) | Run a user query template with a keyword substituted in |
//! | [`fetch_all`](FetchAll) | Page through the whole index, 100 documents at a time |
//!
//! Every adapter normalizes hit fields through
//! [`normalize_fields`](crate::text::normalize_fields), so each stored field
//! value is a list of cleaned strings.
//!
//! # Filter DSL
//!
//! A filter is a list of single-key maps `field → [values]`. Values of one
//! field are OR-ed, fields are AND-ed, and an empty value list is skipped.
//!
//! # Failure Semantics
//!
//! - Non-2xx HTTP → [`Error::Transport`]
//! - Connection failure or timeout → [`Error::Http`]
//! - Undecodable query template or response body → [`Error::Validation`]
//!
//! Nothing is retried at this layer.

pub mod elasticsearch;
pub mod opensearch;
pub mod solr;
pub mod vespa;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::Document;
use crate::text::normalize_fields;

pub use elasticsearch::Elasticsearch;
pub use opensearch::OpenSearch;
pub use solr::Solr;
pub use vespa::Vespa;

/// Token replaced by the keyword in JSON query templates.
pub const QUERY_PLACEHOLDER: &str = "$query";

/// Page size used by [`FetchAll`].
pub const FETCH_ALL_BATCH_SIZE: usize = 100;

/// One entry of the documents filter: `field → allowed values`.
pub type FieldFilter = IndexMap<String, Vec<String>>;

/// Supported engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchEngineKind {
    Solr,
    Elasticsearch,
    Opensearch,
    Vespa,
}

impl SearchEngineKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Solr => "solr",
            Self::Elasticsearch => "elasticsearch",
            Self::Opensearch => "opensearch",
            Self::Vespa => "vespa",
        }
    }
}

impl std::fmt::Display for SearchEngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// SearchEngine Trait
// ═══════════════════════════════════════════════════════════════════════

/// Polymorphic contract over the supported search engines.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Engine identifier for logs.
    fn name(&self) -> &str;

    /// Field holding the document id.
    fn unique_key(&self) -> &str;

    /// Fetch up to `number_of_docs` documents starting at `start`,
    /// projecting `doc_fields` plus the unique key.
    async fn fetch_for_query_generation(
        &self,
        documents_filter: &[FieldFilter],
        number_of_docs: usize,
        doc_fields: &[String],
        start: usize,
    ) -> Result<Vec<Document>>;

    /// Run the query template at `query_template` with `keyword` substituted in.
    async fn fetch_for_evaluation(
        &self,
        query_template: &Path,
        doc_fields: &[String],
        keyword: &str,
    ) -> Result<Vec<Document>>;

    /// Execute a raw engine payload and normalize the hits.
    async fn search(&self, payload: Value) -> Result<Vec<Document>>;

    /// Number of documents matching the match-all query.
    async fn total_hits(&self) -> Result<u64>;
}

impl dyn SearchEngine + '_ {
    /// Lazily page through every document in the index.
    pub fn fetch_all(&self, doc_fields: &[String]) -> FetchAll<'_> {
        FetchAll::new(self, doc_fields)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// FetchAll
// ═══════════════════════════════════════════════════════════════════════

/// Non-restartable cursor over every document of an index.
///
/// Pages are requested with `start` advancing by [`FETCH_ALL_BATCH_SIZE`]
/// until the engine-reported total is reached or a page comes back empty.
/// The total is read once, on the first call to [`next`](Self::next).
pub struct FetchAll<'a> {
    engine: &'a dyn SearchEngine,
    doc_fields: Vec<String>,
    start: usize,
    total: Option<u64>,
    buffer: VecDeque<Document>,
    done: bool,
}

impl<'a> FetchAll<'a> {
    pub fn new(engine: &'a dyn SearchEngine, doc_fields: &[String]) -> Self {
        Self {
            engine,
            doc_fields: doc_fields.to_vec(),
            start: 0,
            total: None,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    pub async fn next(&mut self) -> Result<Option<Document>> {
        loop {
            if let Some(doc) = self.buffer.pop_front() {
                return Ok(Some(doc));
            }
            if self.done {
                return Ok(None);
            }

            let total = match self.total {
                Some(t) => t,
                None => {
                    let t = self.engine.total_hits().await?;
                    self.total = Some(t);
                    t
                }
            };
            if self.start as u64 >= total {
                self.done = true;
                continue;
            }

            let batch = self
                .engine
                .fetch_for_query_generation(&[], FETCH_ALL_BATCH_SIZE, &self.doc_fields, self.start)
                .await?;
            self.start += FETCH_ALL_BATCH_SIZE;
            if batch.is_empty() {
                self.done = true;
            }
            self.buffer.extend(batch);
        }
    }

    /// Drain the cursor into a vector.
    pub async fn collect_all(mut self) -> Result<Vec<Document>> {
        let mut docs = Vec::new();
        while let Some(doc) = self.next().await? {
            docs.push(doc);
        }
        Ok(docs)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Build the adapter for `kind` against `endpoint`.
///
/// | Kind | Adapter | Construction |
/// |------|---------|--------------|
/// | `solr` | [`Solr`] | discovers the unique key over HTTP |
/// | `elasticsearch` | [`Elasticsearch`] | offline |
/// | `opensearch` | [`OpenSearch`] | offline |
/// | `vespa` | [`Vespa`] | offline, schema from the endpoint path |
pub async fn create_engine(kind: SearchEngineKind, endpoint: &str) -> Result<Box<dyn SearchEngine>> {
    debug!(engine = %kind, endpoint, "creating search engine");
    Ok(match kind {
        SearchEngineKind::Solr => Box::new(Solr::connect(endpoint).await?),
        SearchEngineKind::Elasticsearch => Box::new(Elasticsearch::new(endpoint)),
        SearchEngineKind::Opensearch => Box::new(OpenSearch::new(endpoint)),
        SearchEngineKind::Vespa => Box::new(Vespa::new(endpoint)?),
    })
}

// ═══════════════════════════════════════════════════════════════════════
// Shared Helpers
// ═══════════════════════════════════════════════════════════════════════

/// Read and decode a JSON query template. The template must be a JSON object.
pub fn parse_query_template(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&content).map_err(|e| {
        Error::validation(format!(
            "invalid JSON query template {}: {e}",
            path.display()
        ))
    })?;
    if !value.is_object() {
        return Err(Error::validation(format!(
            "query template {} must be a JSON object",
            path.display()
        )));
    }
    Ok(value)
}

/// Replace every occurrence of `placeholder` inside string values, recursively.
/// Keys and non-string scalars are left untouched.
pub fn replace_placeholder(value: &Value, placeholder: &str, keyword: &str) -> Value {
    match value {
        Value::String(s) => Value::String(s.replace(placeholder, keyword)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| replace_placeholder(v, placeholder, keyword))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), replace_placeholder(v, placeholder, keyword)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Escape Lucene query syntax characters with a backslash.
pub fn lucene_escape(s: &str) -> String {
    const SPECIAL: &[char] = &[
        '\\', '+', '-', '!', '(', ')', ':', '^', '[', ']', '"', '{', '}', '~', '*', '?', '|', '&',
        '/',
    ];
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// `doc_fields` with `unique_key` appended unless already present.
pub fn unify_fields(doc_fields: &[String], unique_key: &str) -> Vec<String> {
    let mut fields = doc_fields.to_vec();
    if !fields.iter().any(|f| f == unique_key) {
        fields.push(unique_key.to_string());
    }
    fields
}

/// Decode a 2xx JSON response or map the status to [`Error::Transport`].
pub(crate) async fn json_response(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let url = response.url().to_string();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Transport {
            status: status.as_u16(),
            url,
            body,
        });
    }
    let text = response.text().await?;
    serde_json::from_str(&text)
        .map_err(|e| Error::validation(format!("malformed response from {url}: {e}")))
}

/// Render an engine id value (string or number) as a document id.
pub(crate) fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Build a [`Document`] from an engine hit, skipping it with a warning when
/// the id is missing or the normalized fields are empty.
pub(crate) fn hit_to_document(
    engine: &str,
    id: Option<&Value>,
    source: &Map<String, Value>,
    skip: &[&str],
) -> Option<Document> {
    let Some(id) = id.and_then(id_to_string) else {
        let keys: Vec<&String> = source.keys().collect();
        warn!(engine, fields = ?keys, "skipping hit without id");
        return None;
    };
    match Document::new(id.clone(), normalize_fields(source, skip)) {
        Ok(doc) => Some(doc),
        Err(e) => {
            warn!(engine, doc_id = %id, error = %e, "skipping invalid hit");
            None
        }
    }
}

/// Flatten a JSON object into repeated query parameters.
///
/// Arrays repeat the key, objects are sent as JSON text, `null` is dropped.
pub(crate) fn to_query_params(payload: &Value) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let Some(map) = payload.as_object() else {
        return params;
    };
    for (key, value) in map {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    if let Some(v) = scalar_param(item) {
                        params.push((key.clone(), v));
                    }
                }
            }
            other => {
                if let Some(v) = scalar_param(other) {
                    params.push((key.clone(), v));
                }
            }
        }
    }
    params
}

fn scalar_param(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Endpoint without trailing slashes, ready for `format!("{base}/...")`.
pub(crate) fn trim_endpoint(endpoint: &str) -> String {
    endpoint.trim_end_matches('/').to_string()
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::Router;

    /// Serve `router` on an ephemeral local port and return its base URL.
    pub async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    /// Decode a raw query string into ordered pairs.
    pub fn query_pairs(raw: &str) -> Vec<(String, String)> {
        reqwest::Url::parse(&format!("http://mock/?{raw}"))
            .unwrap()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn test_lucene_escape() {
        assert_eq!(lucene_escape("a+b"), r"a\+b");
        assert_eq!(lucene_escape("(1:2)"), r"\(1\:2\)");
        assert_eq!(lucene_escape("c++ / rust?"), r"c\+\+ \/ rust\?");
        assert_eq!(lucene_escape(r"back\slash"), r"back\\slash");
        assert_eq!(lucene_escape("plain words"), "plain words");
    }

    #[test]
    fn test_replace_placeholder_recursive() {
        let template = json!({
            "query": {"query_string": {"query": "title:$query OR body:$query"}},
            "boosts": ["$query", 3, null],
            "$query": "keys are untouched"
        });
        let out = replace_placeholder(&template, QUERY_PLACEHOLDER, "rust");
        assert_eq!(out["query"]["query_string"]["query"], "title:rust OR body:rust");
        assert_eq!(out["boosts"], json!(["rust", 3, null]));
        assert!(out.get("$query").is_some());
    }

    #[test]
    fn test_parse_query_template_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ nope").unwrap();
        assert!(matches!(parse_query_template(&bad), Err(Error::Validation(_))));

        let list = dir.path().join("list.json");
        std::fs::write(&list, "[1, 2]").unwrap();
        assert!(matches!(parse_query_template(&list), Err(Error::Validation(_))));

        let ok = dir.path().join("ok.json");
        std::fs::write(&ok, r#"{"q": "$query"}"#).unwrap();
        assert_eq!(parse_query_template(&ok).unwrap()["q"], "$query");
    }

    #[test]
    fn test_unify_fields() {
        let fields = vec!["title".to_string()];
        assert_eq!(unify_fields(&fields, "id"), vec!["title", "id"]);
        let with_id = vec!["id".to_string(), "title".to_string()];
        assert_eq!(unify_fields(&with_id, "id"), with_id);
    }

    #[test]
    fn test_to_query_params_repeats_arrays() {
        let params = to_query_params(&json!({
            "q": "*:*",
            "rows": 10,
            "fq": ["a:1", "b:(2 OR 3)"],
            "skip": null
        }));
        assert_eq!(
            params,
            vec![
                ("q".to_string(), "*:*".to_string()),
                ("rows".to_string(), "10".to_string()),
                ("fq".to_string(), "a:1".to_string()),
                ("fq".to_string(), "b:(2 OR 3)".to_string()),
            ]
        );
    }

    #[test]
    fn test_hit_to_document_skips_bad_hits() {
        let source = json!({"title": "A"}).as_object().cloned().unwrap();
        assert!(hit_to_document("test", None, &source, &[]).is_none());
        assert!(hit_to_document("test", Some(&json!(7)), &source, &[]).is_some());

        let only_id = json!({"id": "1"}).as_object().cloned().unwrap();
        assert!(hit_to_document("test", Some(&json!("1")), &only_id, &["id"]).is_none());
    }

    /// Engine serving `total` numbered documents, recording requested offsets.
    struct PagedEngine {
        total: usize,
        reported_total: u64,
        calls: AtomicUsize,
        starts: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl SearchEngine for PagedEngine {
        fn name(&self) -> &str {
            "paged"
        }
        fn unique_key(&self) -> &str {
            "id"
        }
        async fn fetch_for_query_generation(
            &self,
            _filter: &[FieldFilter],
            number_of_docs: usize,
            _doc_fields: &[String],
            start: usize,
        ) -> Result<Vec<Document>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.starts.lock().unwrap().push(start);
            let end = (start + number_of_docs).min(self.total);
            Ok((start..end)
                .map(|i| {
                    Document::new(
                        format!("d{i}"),
                        json!({"n": [i.to_string()]}).as_object().cloned().unwrap(),
                    )
                    .unwrap()
                })
                .collect())
        }
        async fn fetch_for_evaluation(
            &self,
            _query_template: &Path,
            _doc_fields: &[String],
            _keyword: &str,
        ) -> Result<Vec<Document>> {
            Ok(Vec::new())
        }
        async fn search(&self, _payload: Value) -> Result<Vec<Document>> {
            Ok(Vec::new())
        }
        async fn total_hits(&self) -> Result<u64> {
            Ok(self.reported_total)
        }
    }

    fn paged(total: usize, reported_total: u64) -> PagedEngine {
        PagedEngine {
            total,
            reported_total,
            calls: AtomicUsize::new(0),
            starts: Mutex::new(Vec::new()),
        }
    }

    #[tokio::test]
    async fn test_fetch_all_pages_until_total() {
        let engine = paged(250, 250);
        let dyn_engine: &dyn SearchEngine = &engine;
        let docs = dyn_engine.fetch_all(&[]).collect_all().await.unwrap();
        assert_eq!(docs.len(), 250);
        assert_eq!(docs[0].id, "d0");
        assert_eq!(docs[249].id, "d249");
        assert_eq!(*engine.starts.lock().unwrap(), vec![0, 100, 200]);
    }

    #[tokio::test]
    async fn test_fetch_all_stops_on_empty_batch() {
        // The engine over-reports its total; the empty page ends the scan.
        let engine = paged(120, 1_000);
        let dyn_engine: &dyn SearchEngine = &engine;
        let docs = dyn_engine.fetch_all(&[]).collect_all().await.unwrap();
        assert_eq!(docs.len(), 120);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fetch_all_empty_index() {
        let engine = paged(0, 0);
        let dyn_engine: &dyn SearchEngine = &engine;
        let mut cursor = dyn_engine.fetch_all(&[]);
        assert!(cursor.next().await.unwrap().is_none());
        assert!(cursor.next().await.unwrap().is_none());
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }
}
