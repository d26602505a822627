//! Datastore statistics.
//!
//! Summarises a persisted datastore file: size, age, record counts, and the
//! rating distribution. Used by `reldata stats` to check a run's progress
//! without writing any output format.

use indexmap::IndexMap;
use std::path::{Path, PathBuf};

use crate::datastore::{DataStore, StoreOptions};
use crate::error::Result;

/// Summary of one datastore file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatastoreStats {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified_ts: Option<i64>,
    pub documents: usize,
    pub seed_documents: usize,
    pub queries: usize,
    pub ratings: usize,
    pub explained_ratings: usize,
    /// Score → rating count, ascending by score.
    pub by_score: IndexMap<u32, usize>,
}

/// Load the datastore at `path` read-only and count its contents.
pub fn collect_stats(path: &Path) -> Result<DatastoreStats> {
    let store = DataStore::open(path, StoreOptions::default())?;
    let metadata = std::fs::metadata(path).ok();
    let modified_ts = metadata
        .as_ref()
        .and_then(|m| m.modified().ok())
        .map(|t| chrono::DateTime::<chrono::Utc>::from(t).timestamp());

    let ratings = store.get_ratings();
    let mut scores: Vec<u32> = ratings.iter().map(|r| r.score).collect();
    scores.sort_unstable();
    let mut by_score = IndexMap::new();
    for score in scores {
        *by_score.entry(score).or_insert(0) += 1;
    }

    Ok(DatastoreStats {
        path: path.to_path_buf(),
        size_bytes: metadata.map(|m| m.len()).unwrap_or(0),
        modified_ts,
        documents: store.document_count(),
        seed_documents: store.get_cartesian_prod_docs().len(),
        queries: store.query_count(),
        ratings: ratings.len(),
        explained_ratings: ratings.iter().filter(|r| r.explanation.is_some()).count(),
        by_score,
    })
}

/// Run the stats command: load the datastore and print a summary.
pub fn run_stats(path: &Path) -> Result<()> {
    let stats = collect_stats(path)?;

    println!("Relevance Dataset — Datastore Stats");
    println!("===================================");
    println!();
    println!("  Datastore:   {}", stats.path.display());
    println!("  Size:        {}", format_bytes(stats.size_bytes));
    println!(
        "  Modified:    {}",
        stats
            .modified_ts
            .map(format_ts_relative)
            .unwrap_or_else(|| "never saved".to_string())
    );
    println!();
    println!(
        "  Documents:   {} ({} query seeds)",
        stats.documents, stats.seed_documents
    );
    println!("  Queries:     {}", stats.queries);
    println!(
        "  Ratings:     {} ({} with explanation)",
        stats.ratings, stats.explained_ratings
    );

    if !stats.by_score.is_empty() {
        println!();
        println!("  By score:");
        println!("  {:>6} {:>8} {:>6}", "SCORE", "RATINGS", "%");
        println!("  {}", "-".repeat(22));
        for (score, count) in &stats.by_score {
            println!(
                "  {:>6} {:>8} {:>5}%",
                score,
                count,
                (count * 100) / stats.ratings
            );
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return format_ts_iso(ts);
    }

    let plural = |n: i64| if n == 1 { "" } else { "s" };
    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        format!("{} min{} ago", delta / 60, plural(delta / 60))
    } else if delta < 86400 {
        format!("{} hour{} ago", delta / 3600, plural(delta / 3600))
    } else if delta < 86400 * 30 {
        format!("{} day{} ago", delta / 86400, plural(delta / 86400))
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
