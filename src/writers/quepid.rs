//! Quepid CSV writer: one `query,docid,rating` row per rating.

use std::path::Path;
use tracing::info;

use super::{ensure_dir, Writer};
use crate::datastore::{write_atomically, DataStore};
use crate::error::Result;

pub const QUEPID_OUTPUT_FILENAME: &str = "quepid.csv";

pub struct QuepidWriter;

impl Writer for QuepidWriter {
    /// Ratings whose query is missing are skipped.
    fn write(&self, output_dir: &Path, store: &DataStore) -> Result<()> {
        ensure_dir(output_dir)?;
        let output_path = output_dir.join(QUEPID_OUTPUT_FILENAME);

        let mut csv = csv::Writer::from_writer(Vec::new());
        csv.write_record(["query", "docid", "rating"])?;
        for rating in store.get_ratings() {
            let Some(query) = store.get_query(&rating.query_id) else {
                continue;
            };
            let score = rating.score.to_string();
            csv.write_record([query.text.as_str(), rating.doc_id.as_str(), score.as_str()])?;
        }
        let bytes = csv
            .into_inner()
            .map_err(|e| std::io::Error::other(e.to_string()))?;

        write_atomically(&output_path, &bytes)?;
        info!(path = %output_path.display(), "quepid ratings written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;
    use serde_json::json;

    #[test]
    fn test_writes_header_and_quoted_rows() {
        let mut store = DataStore::in_memory();
        store.add_document(
            Document::new("d1", json!({"t": ["x"]}).as_object().cloned().unwrap()).unwrap(),
        );
        let q = store.add_query("shoes, red \"cheap\"", None).unwrap();
        store.create_rating_score(&q.id, "d1", 1, None).unwrap();

        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("nested/out");
        QuepidWriter.write(&out, &store).unwrap();

        let content = std::fs::read_to_string(out.join(QUEPID_OUTPUT_FILENAME)).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "query,docid,rating");
        assert_eq!(lines[1], r#""shoes, red ""cheap""",d1,1"#);
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_empty_store_writes_header_only() {
        let dir = tempfile::TempDir::new().unwrap();
        QuepidWriter.write(dir.path(), &DataStore::in_memory()).unwrap();
        let content = std::fs::read_to_string(dir.path().join(QUEPID_OUTPUT_FILENAME)).unwrap();
        assert_eq!(content, "query,docid,rating\n");
    }
}
