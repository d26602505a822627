//! Output writers.
//!
//! Each writer turns a read-only [`DataStore`] into the files of one
//! evaluation tool. Output directories are created on demand and every file
//! is written UTF-8 through a temp-file-and-rename.
//!
//! | Format | Writer | Files |
//! |--------|--------|-------|
//! | `quepid` | [`QuepidWriter`] | `quepid.csv` |
//! | `rre` | [`RreWriter`] | `ratings.json` |
//! | `mteb` | [`MtebWriter`] | `corpus.jsonl`, `queries.jsonl`, `candidates.jsonl` |
//! | `visualizer` | [`VisualizerWriter`] | `visualizer.json.gz` |

pub mod mteb;
pub mod quepid;
pub mod rre;
pub mod visualizer;

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::datastore::DataStore;
use crate::error::{Error, Result};

pub use mteb::MtebWriter;
pub use quepid::QuepidWriter;
pub use rre::RreWriter;
pub use visualizer::VisualizerWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Quepid,
    Rre,
    Mteb,
    Visualizer,
}

impl OutputFormat {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quepid => "quepid",
            Self::Rre => "rre",
            Self::Mteb => "mteb",
            Self::Visualizer => "visualizer",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings shared by all writers; only RRE reads the optional fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterConfig {
    pub output_format: OutputFormat,
    /// Index / collection name of the search engine.
    pub index: String,
    pub id_field: Option<String>,
    /// File name of the query template referenced by RRE.
    pub query_template: Option<String>,
    pub query_placeholder: Option<String>,
}

impl WriterConfig {
    pub fn new(output_format: OutputFormat, index: impl Into<String>) -> Self {
        Self {
            output_format,
            index: index.into(),
            id_field: None,
            query_template: None,
            query_placeholder: None,
        }
    }
}

pub trait Writer {
    /// Write the store's content into `output_dir`.
    fn write(&self, output_dir: &Path, store: &DataStore) -> Result<()>;
}

/// Build the writer for `config.output_format`.
///
/// # Errors
///
/// [`Error::Config`] when the RRE writer is requested without `id_field`,
/// `query_template`, or `query_placeholder`.
pub fn create_writer(config: &WriterConfig) -> Result<Box<dyn Writer>> {
    info!(format = %config.output_format, "selected output format");
    Ok(match config.output_format {
        OutputFormat::Quepid => Box::new(QuepidWriter),
        OutputFormat::Rre => Box::new(RreWriter::new(config)?),
        OutputFormat::Mteb => Box::new(MtebWriter),
        OutputFormat::Visualizer => Box::new(VisualizerWriter),
    })
}

/// Create `output_dir` if needed.
pub(crate) fn ensure_dir(output_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(output_dir).map_err(Error::from)
}
