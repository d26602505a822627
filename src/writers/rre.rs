//! RRE (Rated Ranking Evaluator) writer.
//!
//! Ratings are grouped by query text into `ratings.json`:
//!
//! ```json
//! {
//!   "index": "<collection>",
//!   "id_field": "id",
//!   "query_placeholder": "$query",
//!   "query_groups": [
//!     {
//!       "name": "<query text>",
//!       "queries": [{ "template": "<template file>", "placeholders": { "$query": "<query text>" } }],
//!       "relevant_documents": { "1": ["d1"], "0": ["d2"] }
//!     }
//!   ]
//! }
//! ```

use indexmap::IndexMap;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

use super::{ensure_dir, Writer, WriterConfig};
use crate::datastore::{write_atomically, DataStore};
use crate::error::{Error, Result};

pub const RRE_OUTPUT_FILENAME: &str = "ratings.json";

pub struct RreWriter {
    index: String,
    id_field: String,
    query_template: String,
    query_placeholder: String,
}

#[derive(Serialize)]
struct RreDocument<'a> {
    index: &'a str,
    id_field: &'a str,
    query_placeholder: &'a str,
    query_groups: Vec<QueryGroup<'a>>,
}

#[derive(Serialize)]
struct QueryGroup<'a> {
    name: &'a str,
    queries: Vec<TemplateBinding<'a>>,
    relevant_documents: IndexMap<String, Vec<&'a str>>,
}

#[derive(Serialize)]
struct TemplateBinding<'a> {
    template: &'a str,
    placeholders: IndexMap<&'a str, &'a str>,
}

impl RreWriter {
    pub fn new(config: &WriterConfig) -> Result<Self> {
        let required = |value: &Option<String>, key: &str| {
            value
                .clone()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::config(format!("{key} is required for the rre output format")))
        };
        Ok(Self {
            index: config.index.clone(),
            id_field: required(&config.id_field, "id_field")?,
            query_template: required(&config.query_template, "query_template")?,
            query_placeholder: required(&config.query_placeholder, "query_placeholder")?,
        })
    }

    fn build<'a>(&'a self, store: &'a DataStore) -> RreDocument<'a> {
        // query text → [(doc_id, score)], first-seen order
        let mut by_text: IndexMap<&str, Vec<(&str, u32)>> = IndexMap::new();
        for rating in store.get_ratings() {
            if let Some(query) = store.get_query(&rating.query_id) {
                by_text
                    .entry(query.text.as_str())
                    .or_default()
                    .push((rating.doc_id.as_str(), rating.score));
            }
        }

        let query_groups = by_text
            .into_iter()
            .map(|(text, docs)| {
                let mut relevant_documents: IndexMap<String, Vec<&str>> = IndexMap::new();
                for (doc_id, score) in docs {
                    relevant_documents.entry(score.to_string()).or_default().push(doc_id);
                }
                QueryGroup {
                    name: text,
                    queries: vec![TemplateBinding {
                        template: &self.query_template,
                        placeholders: [(self.query_placeholder.as_str(), text)].into_iter().collect(),
                    }],
                    relevant_documents,
                }
            })
            .collect();

        RreDocument {
            index: &self.index,
            id_field: &self.id_field,
            query_placeholder: &self.query_placeholder,
            query_groups,
        }
    }
}

impl Writer for RreWriter {
    fn write(&self, output_dir: &Path, store: &DataStore) -> Result<()> {
        ensure_dir(output_dir)?;
        let output_path = output_dir.join(RRE_OUTPUT_FILENAME);
        debug!("started writing rre records");
        let json = serde_json::to_string_pretty(&self.build(store))?;
        write_atomically(&output_path, json.as_bytes())?;
        info!(path = %output_path.display(), "rre ratings written");
        Ok(())
    }
}
