//! Visualiser writer: the whole store as gzipped JSON.
//!
//! `max_rating_value` is the highest observed rating score, or `1` when the
//! store holds no ratings.

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::io::Write as _;
use std::path::Path;
use tracing::info;

use super::{ensure_dir, Writer};
use crate::datastore::{write_atomically, DataStore};
use crate::error::Result;
use crate::models::{Document, Query, Rating};

pub const VISUALIZER_OUTPUT_FILENAME: &str = "visualizer.json.gz";

pub struct VisualizerWriter;

#[derive(Serialize)]
struct VisualizerDocument<'a> {
    queries: Vec<&'a Query>,
    documents: Vec<&'a Document>,
    ratings: Vec<&'a Rating>,
    max_rating_value: u32,
}

impl Writer for VisualizerWriter {
    fn write(&self, output_dir: &Path, store: &DataStore) -> Result<()> {
        ensure_dir(output_dir)?;
        let output_path = output_dir.join(VISUALIZER_OUTPUT_FILENAME);

        let ratings = store.get_ratings();
        let max_rating_value = ratings.iter().map(|r| r.score).max().unwrap_or(1);
        let payload = VisualizerDocument {
            queries: store.get_queries(),
            documents: store.get_documents(),
            ratings,
            max_rating_value,
        };

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        serde_json::to_writer(&mut encoder, &payload)?;
        encoder.flush()?;
        let bytes = encoder.finish()?;

        write_atomically(&output_path, &bytes)?;
        info!(path = %output_path.display(), "visualizer records written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use serde_json::Value;
    use std::io::Read;

    #[test]
    fn test_empty_store_defaults_max_to_one() {
        let dir = tempfile::TempDir::new().unwrap();
        VisualizerWriter.write(dir.path(), &DataStore::in_memory()).unwrap();

        let file = std::fs::File::open(dir.path().join(VISUALIZER_OUTPUT_FILENAME)).unwrap();
        let mut json = String::new();
        GzDecoder::new(file).read_to_string(&mut json).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["max_rating_value"], 1);
        assert_eq!(value["queries"], serde_json::json!([]));
        assert_eq!(value["documents"], serde_json::json!([]));
        assert_eq!(value["ratings"], serde_json::json!([]));
    }
}
