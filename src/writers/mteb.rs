//! MTEB retrieval-task writer.
//!
//! | File | Row |
//! |------|-----|
//! | `corpus.jsonl` | `{"id", "title", "text"}` |
//! | `queries.jsonl` | `{"id", "text"}` |
//! | `candidates.jsonl` | `{"query_id", "doc_id", "rating"}` |
//!
//! `title` is the document's `title` field as text; `text` joins every other
//! field except `id` and `title`.

use serde_json::json;
use std::path::Path;
use tracing::{error, info};

use super::{ensure_dir, Writer};
use crate::datastore::{write_atomically, DataStore};
use crate::error::Result;
use crate::text::{join_fields_as_text, value_to_text};

pub const CORPUS_FILENAME: &str = "corpus.jsonl";
pub const QUERIES_FILENAME: &str = "queries.jsonl";
pub const CANDIDATES_FILENAME: &str = "candidates.jsonl";

pub struct MtebWriter;

fn jsonl<I>(rows: I) -> String
where
    I: IntoIterator<Item = serde_json::Value>,
{
    let mut out = String::new();
    for row in rows {
        out.push_str(&row.to_string());
        out.push('\n');
    }
    out
}

impl MtebWriter {
    fn corpus(store: &DataStore) -> String {
        jsonl(store.get_documents().into_iter().map(|doc| {
            let title = doc.fields.get("title").map(value_to_text).unwrap_or_default();
            json!({
                "id": doc.id,
                "title": title,
                "text": join_fields_as_text(&doc.fields, &["id", "title"]),
            })
        }))
    }

    fn queries(store: &DataStore) -> String {
        jsonl(
            store
                .get_queries()
                .into_iter()
                .map(|q| json!({ "id": q.id, "text": q.text })),
        )
    }

    fn candidates(store: &DataStore) -> String {
        jsonl(store.get_ratings().into_iter().map(|r| {
            json!({ "query_id": r.query_id, "doc_id": r.doc_id, "rating": r.score })
        }))
    }

    fn write_all(output_dir: &Path, store: &DataStore) -> Result<()> {
        write_atomically(&output_dir.join(CORPUS_FILENAME), Self::corpus(store).as_bytes())?;
        info!("corpus written");
        write_atomically(&output_dir.join(QUERIES_FILENAME), Self::queries(store).as_bytes())?;
        info!("queries written");
        write_atomically(
            &output_dir.join(CANDIDATES_FILENAME),
            Self::candidates(store).as_bytes(),
        )?;
        info!("candidates written");
        Ok(())
    }
}

impl Writer for MtebWriter {
    fn write(&self, output_dir: &Path, store: &DataStore) -> Result<()> {
        ensure_dir(output_dir)?;
        Self::write_all(output_dir, store).inspect_err(|e| {
            error!(dir = %output_dir.display(), error = %e, "failed to write mteb files");
        })
    }
}
