//! In-memory dataset store with crash-resilient persistence.
//!
//! The [`DataStore`] is the single owner of the documents ↔ queries ↔
//! ratings graph. Every lookup is an average-O(1) hash probe and every
//! collection iterates in insertion order.
//!
//! # Invariants
//!
//! - A rating enters the store only if its query and document are present.
//! - A `(query_id, doc_id)` pair is rated at most once; the first rating wins.
//! - Query texts are deduplicated on [`query_text_key`]: the text key index
//!   and the id index always point at the same queries.
//! - Re-adding a document id is a no-op.
//!
//! # Persistence
//!
//! [`save`](DataStore::save) writes `{docs, queries, ratings}` to a sibling
//! temp file and renames it over the target, so a reader sees either the
//! previous or the new checkpoint, never a torn file. With autosave enabled
//! the store checkpoints itself after every N successful mutations; a failed
//! autosave is logged and retried on the next mutation.
//!
//! Mutators take `&mut self`, so a store shared across tasks must sit behind
//! a single-writer lock, which also serializes autosave with the mutators.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Document, Query, Rating};
use crate::text::query_text_key;

/// Default location of the persisted datastore.
pub const DEFAULT_DATASTORE_PATH: &str = "resources/tmp/datastore.json";

/// Options for [`DataStore::open`].
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Start empty even if a persisted store exists at the path.
    pub ignore_saved_data: bool,
    /// Checkpoint after every N successful mutations. `None` or `Some(0)` disables autosave.
    pub autosave_every_n_updates: Option<usize>,
}

#[derive(Serialize)]
struct PersistedStore<'a> {
    docs: Vec<&'a Document>,
    queries: Vec<&'a Query>,
    ratings: Vec<&'a Rating>,
}

#[derive(Deserialize)]
struct LoadedStore {
    #[serde(default)]
    docs: Vec<Value>,
    #[serde(default)]
    queries: Vec<Value>,
    #[serde(default)]
    ratings: Vec<Value>,
}

#[derive(Debug)]
pub struct DataStore {
    path: PathBuf,
    autosave_every_n_updates: Option<usize>,
    updates_since_last_save: usize,
    saves_completed: usize,
    loading: bool,

    docs: IndexMap<String, Document>,
    queries: IndexMap<String, Query>,
    rating_by_pair: IndexMap<(String, String), Rating>,
    query_text_to_query_id: HashMap<String, String>,
}

impl DataStore {
    /// Open a store backed by `path`, loading any saved state unless
    /// `options.ignore_saved_data` is set.
    pub fn open(path: impl Into<PathBuf>, options: StoreOptions) -> Result<Self> {
        let mut store = Self {
            path: path.into(),
            autosave_every_n_updates: options.autosave_every_n_updates.filter(|n| *n > 0),
            updates_since_last_save: 0,
            saves_completed: 0,
            loading: false,
            docs: IndexMap::new(),
            queries: IndexMap::new(),
            rating_by_pair: IndexMap::new(),
            query_text_to_query_id: HashMap::new(),
        };
        if !options.ignore_saved_data {
            info!(path = %store.path.display(), "loading datastore");
            store.load()?;
        }
        Ok(store)
    }

    /// An empty store at the default path that never reads saved data and never autosaves.
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DATASTORE_PATH),
            autosave_every_n_updates: None,
            updates_since_last_save: 0,
            saves_completed: 0,
            loading: false,
            docs: IndexMap::new(),
            queries: IndexMap::new(),
            rating_by_pair: IndexMap::new(),
            query_text_to_query_id: HashMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ── Existence checks ────────────────────────────────────────────

    pub fn has_document(&self, doc_id: &str) -> bool {
        self.docs.contains_key(doc_id)
    }

    pub fn has_query(&self, query_id: &str) -> bool {
        self.queries.contains_key(query_id)
    }

    pub fn has_rating_score(&self, query_id: &str, doc_id: &str) -> bool {
        self.rating_by_pair
            .contains_key(&(query_id.to_string(), doc_id.to_string()))
    }

    // ── Getters ─────────────────────────────────────────────────────

    pub fn get_document(&self, doc_id: &str) -> Option<&Document> {
        self.docs.get(doc_id)
    }

    pub fn get_documents(&self) -> Vec<&Document> {
        self.docs.values().collect()
    }

    /// Documents that seeded query generation.
    pub fn get_cartesian_prod_docs(&self) -> Vec<&Document> {
        self.docs
            .values()
            .filter(|d| d.is_used_to_generate_queries)
            .collect()
    }

    pub fn get_query(&self, query_id: &str) -> Option<&Query> {
        self.queries.get(query_id)
    }

    pub fn get_queries(&self) -> Vec<&Query> {
        self.queries.values().collect()
    }

    /// Look up a query by text, after normalization.
    pub fn find_query_by_text(&self, text: &str) -> Option<&Query> {
        self.query_text_to_query_id
            .get(&query_text_key(text))
            .and_then(|id| self.queries.get(id))
    }

    pub fn get_rating(&self, query_id: &str, doc_id: &str) -> Option<&Rating> {
        self.rating_by_pair
            .get(&(query_id.to_string(), doc_id.to_string()))
    }

    pub fn get_ratings(&self) -> Vec<&Rating> {
        self.rating_by_pair.values().collect()
    }

    pub fn document_count(&self) -> usize {
        self.docs.len()
    }

    pub fn query_count(&self) -> usize {
        self.queries.len()
    }

    pub fn rating_count(&self) -> usize {
        self.rating_by_pair.len()
    }

    /// Mutations counted toward the next autosave.
    pub fn pending_updates(&self) -> usize {
        self.updates_since_last_save
    }

    /// Number of successful [`save`](Self::save) calls on this instance.
    pub fn save_count(&self) -> usize {
        self.saves_completed
    }

    // ── Mutators ────────────────────────────────────────────────────

    /// Add a document. Returns `true` if it was inserted, `false` if the id already existed.
    pub fn add_document(&mut self, doc: Document) -> bool {
        if self.has_document(&doc.id) {
            debug!(doc_id = %doc.id, "[add_document] exists");
            return false;
        }
        debug!(doc_id = %doc.id, "[add_document] added");
        self.docs.insert(doc.id.clone(), doc);
        self.count_update_and_maybe_autosave();
        true
    }

    /// Flag a stored document as a query-generation seed.
    ///
    /// Returns `false` if the document is unknown. The flag is persisted by
    /// the next save; it does not count as an update.
    pub fn mark_used_for_generation(&mut self, doc_id: &str) -> bool {
        match self.docs.get_mut(doc_id) {
            Some(doc) => {
                doc.is_used_to_generate_queries = true;
                true
            }
            None => false,
        }
    }

    /// Add a query, deduplicating on normalized text.
    ///
    /// If the normalized text is already known the existing query is returned
    /// unchanged. Otherwise a new query is created with `query_id` (or a fresh
    /// UUID) and indexed by id and by text key. Text that normalizes to
    /// nothing (blank or markup only) is a validation error.
    pub fn add_query(&mut self, text: &str, query_id: Option<&str>) -> Result<Query> {
        let key = query_text_key(text);
        if key.is_empty() {
            return Err(Error::validation(format!(
                "query text {text:?} is empty after normalization"
            )));
        }
        if let Some(existing_id) = self.query_text_to_query_id.get(&key) {
            debug!(text, key = %key, existing_id = %existing_id, "[add_query] exists");
            return Ok(self.queries[existing_id].clone());
        }
        if let Some(existing) = query_id.and_then(|id| self.queries.get(id)) {
            warn!(
                query_id = %existing.id,
                text,
                "[add_query] id already bound to another text, keeping the first"
            );
            return Ok(existing.clone());
        }

        let query = match query_id {
            Some(id) => Query::with_id(id, text)?,
            None => Query::new(text)?,
        };
        debug!(query_id = %query.id, "[add_query] added");
        self.queries.insert(query.id.clone(), query.clone());
        self.query_text_to_query_id.insert(key, query.id.clone());
        self.count_update_and_maybe_autosave();
        Ok(query)
    }

    /// Create and store a rating for `(query_id, doc_id)`.
    ///
    /// - An existing rating for the pair is returned unchanged.
    /// - An invalid rating (negative score, empty explanation) is logged and `None` is returned.
    /// - A rating whose query or document is unknown is logged and `None` is returned.
    pub fn create_rating_score(
        &mut self,
        query_id: &str,
        doc_id: &str,
        score: i64,
        explanation: Option<String>,
    ) -> Option<Rating> {
        if let Some(existing) = self.get_rating(query_id, doc_id) {
            warn!(q = query_id, d = doc_id, "[create_rating_score] existing");
            return Some(existing.clone());
        }

        let rating = match Rating::new(query_id, doc_id, score, explanation) {
            Ok(r) => r,
            Err(e) => {
                warn!(
                    q = query_id,
                    d = doc_id,
                    score,
                    error = %e,
                    "[create_rating_score] validation_failed"
                );
                return None;
            }
        };
        self.add_rating(rating.clone()).then_some(rating)
    }

    /// Insert a validated rating. Missing references and duplicate pairs are
    /// logged and skipped.
    fn add_rating(&mut self, rating: Rating) -> bool {
        if !self.has_query(&rating.query_id) {
            warn!(query_id = %rating.query_id, "[add_rating] query_not_found");
            return false;
        }
        if !self.has_document(&rating.doc_id) {
            warn!(doc_id = %rating.doc_id, "[add_rating] doc_not_found");
            return false;
        }
        let key = (rating.query_id.clone(), rating.doc_id.clone());
        if self.rating_by_pair.contains_key(&key) {
            warn!(q = %key.0, d = %key.1, "[add_rating] exists");
            return false;
        }
        debug!(q = %key.0, d = %key.1, "[add_rating] added");
        self.rating_by_pair.insert(key, rating);
        self.count_update_and_maybe_autosave();
        true
    }

    // ── Autosave ────────────────────────────────────────────────────

    /// Count one successful mutation and save when the threshold is reached.
    ///
    /// A failed autosave leaves the counter untouched so the next mutation retries.
    fn count_update_and_maybe_autosave(&mut self) {
        let Some(every) = self.autosave_every_n_updates else {
            return;
        };
        if self.loading {
            return;
        }
        self.updates_since_last_save += 1;
        if self.updates_since_last_save < every {
            return;
        }
        match self.save() {
            Ok(()) => {
                debug!(
                    path = %self.path.display(),
                    updates = self.updates_since_last_save,
                    "[autosave] ok"
                );
                self.updates_since_last_save = 0;
            }
            Err(e) => {
                error!(
                    path = %self.path.display(),
                    error = %e,
                    "[autosave] failed, will retry on next update"
                );
            }
        }
    }

    // ── Persistence ─────────────────────────────────────────────────

    /// Atomically write the store to its path.
    pub fn save(&mut self) -> Result<()> {
        let data = PersistedStore {
            docs: self.docs.values().collect(),
            queries: self.queries.values().collect(),
            ratings: self.rating_by_pair.values().collect(),
        };
        let json = serde_json::to_string_pretty(&data)?;
        write_atomically(&self.path, json.as_bytes())?;
        self.saves_completed += 1;
        Ok(())
    }

    /// Replace in-memory state with the persisted store.
    ///
    /// A missing file leaves the store empty. An undecodable file is logged
    /// and the store starts clean. Invalid or orphaned records are skipped
    /// one by one. Records load in the order docs → queries → ratings.
    pub fn load(&mut self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        self.clear_all_data();

        let content = std::fs::read(&self.path)?;
        let data: LoadedStore = match serde_json::from_slice(&content) {
            Ok(d) => d,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "could not decode datastore, starting clean"
                );
                return Ok(());
            }
        };

        self.loading = true;
        for raw in data.docs {
            match serde_json::from_value::<Document>(raw.clone()) {
                Ok(doc) => {
                    self.add_document(doc);
                }
                Err(e) => warn!(data = %raw, error = %e, "[load] skip_doc_invalid"),
            }
        }
        for raw in data.queries {
            match serde_json::from_value::<Query>(raw.clone()) {
                Ok(q) => {
                    if let Err(e) = self.add_query(&q.text, Some(&q.id)) {
                        warn!(data = %raw, error = %e, "[load] skip_query_invalid");
                    }
                }
                Err(e) => warn!(data = %raw, error = %e, "[load] skip_query_invalid"),
            }
        }
        for raw in data.ratings {
            match serde_json::from_value::<Rating>(raw.clone()) {
                Ok(r) => {
                    self.add_rating(r);
                }
                Err(e) => warn!(data = %raw, error = %e, "[load] skip_rating_invalid"),
            }
        }
        self.loading = false;

        info!(
            docs = self.docs.len(),
            queries = self.queries.len(),
            ratings = self.rating_by_pair.len(),
            "datastore loaded"
        );
        Ok(())
    }

    fn clear_all_data(&mut self) {
        self.docs.clear();
        self.queries.clear();
        self.rating_by_pair.clear();
        self.query_text_to_query_id.clear();
    }

    /// Write `(query text, doc id, rating, explanation)` records as a JSON array.
    ///
    /// Ratings whose query is missing are skipped. Returns the number of records written.
    pub fn export_explanations(&self, output_path: &Path) -> Result<usize> {
        let records: Vec<Value> = self
            .rating_by_pair
            .values()
            .filter_map(|r| {
                let query = self.queries.get(&r.query_id)?;
                Some(serde_json::json!({
                    "query": query.text,
                    "doc_id": r.doc_id,
                    "rating": r.score,
                    "explanation": r.explanation.clone().unwrap_or_default(),
                }))
            })
            .collect();

        write_atomically(output_path, serde_json::to_string_pretty(&records)?.as_bytes())?;
        info!(path = %output_path.display(), records = records.len(), "[export] ok");
        Ok(records.len())
    }
}

/// Write `contents` to a sibling `<name>.<uuid>.tmp` file, then rename it over `path`.
///
/// The parent directory is created on demand. A reader of `path` sees either
/// the previous content or the new one.
pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let tmp_path = path.with_file_name(format!("{}.{}.tmp", file_name, Uuid::new_v4().simple()));

    let result = std::fs::write(&tmp_path, contents).and_then(|()| std::fs::rename(&tmp_path, path));
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }
    Ok(result?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn doc(id: &str, title: &str) -> Document {
        Document::new(id, json!({ "title": title }).as_object().cloned().unwrap()).unwrap()
    }

    fn store_at(dir: &TempDir, autosave: Option<usize>) -> DataStore {
        DataStore::open(
            dir.path().join("datastore.json"),
            StoreOptions {
                ignore_saved_data: false,
                autosave_every_n_updates: autosave,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_save_and_reload_single_rating() {
        let dir = TempDir::new().unwrap();
        let mut store = store_at(&dir, None);
        store.add_document(doc("d1", "A"));
        let q = store.add_query("hello", None).unwrap();
        store.create_rating_score(&q.id, "d1", 2, None).unwrap();
        store.save().unwrap();

        let reloaded = store_at(&dir, None);
        assert_eq!(reloaded.document_count(), 1);
        assert_eq!(reloaded.query_count(), 1);
        assert_eq!(reloaded.rating_count(), 1);
        assert_eq!(reloaded.get_rating(&q.id, "d1").unwrap().score, 2);
    }

    #[test]
    fn test_query_text_dedup() {
        let mut store = DataStore::in_memory();
        let a = store.add_query("  Hello   World  ", None).unwrap();
        let b = store.add_query("Hello <b>World</b>", None).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(store.query_count(), 1);
        assert_eq!(store.find_query_by_text("Hello World").unwrap().id, a.id);

        let c = store.add_query("hello world", None).unwrap();
        assert_ne!(a.id, c.id, "case is preserved in the key");
    }

    #[test]
    fn test_add_query_rejects_text_empty_after_normalization() {
        let mut store = DataStore::in_memory();
        for text in ["<b></b>", "   ", "&lt;i&gt;&lt;/i&gt;", ""] {
            let err = store.add_query(text, None).unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{text:?}: {err}");
        }
        assert_eq!(store.query_count(), 0);
    }

    #[test]
    fn test_add_query_with_explicit_id() {
        let mut store = DataStore::in_memory();
        let q = store.add_query("first", Some("q-1")).unwrap();
        assert_eq!(q.id, "q-1");
        let again = store.add_query("second", Some("q-1")).unwrap();
        assert_eq!(again.text, "first");
        assert_eq!(store.query_count(), 1);
    }

    #[test]
    fn test_add_document_is_idempotent() {
        let mut store = DataStore::in_memory();
        assert!(store.add_document(doc("d1", "A")));
        assert!(!store.add_document(doc("d1", "B")));
        assert_eq!(store.get_document("d1").unwrap().fields["title"], json!("A"));
    }

    #[test]
    fn test_autosave_every_two_updates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("datastore.json");
        let mut store = store_at(&dir, Some(2));

        store.add_document(doc("d1", "A"));
        assert!(!path.exists());

        store.add_query("hello", None).unwrap();
        assert!(path.exists());

        let reloaded = store_at(&dir, None);
        assert_eq!(reloaded.document_count(), 1);
        assert_eq!(reloaded.query_count(), 1);
    }

    #[test]
    fn test_autosave_count_is_floor_of_updates() {
        let dir = TempDir::new().unwrap();
        let mut store = store_at(&dir, Some(3));
        for i in 0..10 {
            store.add_document(doc(&format!("d{i}"), "t"));
            // duplicates do not count
            store.add_document(doc(&format!("d{i}"), "t"));
        }
        assert_eq!(store.save_count(), 10 / 3);
        assert_eq!(store.pending_updates(), 10 % 3);
    }

    #[test]
    fn test_autosave_failure_keeps_counter() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();
        let mut store = DataStore::open(
            blocker.join("datastore.json"),
            StoreOptions {
                ignore_saved_data: true,
                autosave_every_n_updates: Some(1),
            },
        )
        .unwrap();

        store.add_document(doc("d1", "A"));
        store.add_document(doc("d2", "B"));
        assert_eq!(store.document_count(), 2);
        assert_eq!(store.save_count(), 0);
        assert_eq!(store.pending_updates(), 2);
    }

    #[test]
    fn test_invalid_and_orphan_ratings_are_rejected() {
        let mut store = DataStore::in_memory();
        store.add_document(doc("d1", "A"));
        let q = store.add_query("q", None).unwrap();

        assert!(store.create_rating_score(&q.id, "d1", -1, None).is_none());
        assert!(store.create_rating_score("qX", "dX", 1, None).is_none());
        assert!(store
            .create_rating_score(&q.id, "d1", 1, Some(String::new()))
            .is_none());
        assert_eq!(store.rating_count(), 0);
    }

    #[test]
    fn test_first_rating_wins() {
        let mut store = DataStore::in_memory();
        store.add_document(doc("d1", "A"));
        let q = store.add_query("q", None).unwrap();
        store.create_rating_score(&q.id, "d1", 1, None).unwrap();
        let second = store.create_rating_score(&q.id, "d1", 0, None).unwrap();
        assert_eq!(second.score, 1);
        assert_eq!(store.rating_count(), 1);
        assert!(store.has_rating_score(&q.id, "d1"));
    }

    #[test]
    fn test_cartesian_docs_filter() {
        let mut store = DataStore::in_memory();
        let mut seed = doc("seed", "A");
        seed.is_used_to_generate_queries = true;
        store.add_document(seed);
        store.add_document(doc("other", "B"));
        store.add_document(doc("late", "C"));
        assert!(store.mark_used_for_generation("late"));
        assert!(!store.mark_used_for_generation("missing"));

        let ids: Vec<&str> = store
            .get_cartesian_prod_docs()
            .iter()
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(ids, vec!["seed", "late"]);
    }

    #[test]
    fn test_load_skips_invalid_and_orphaned_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("datastore.json");
        std::fs::write(
            &path,
            json!({
                "docs": [
                    {"id": "d1", "fields": {"title": ["A"]}},
                    {"id": "", "fields": {"title": ["bad"]}},
                    {"id": "d2", "fields": {}}
                ],
                "queries": [
                    {"id": "q1", "text": "hello"},
                    {"id": "q2", "text": ""},
                    {"id": "q3", "text": "<b></b>"}
                ],
                "ratings": [
                    {"query_id": "q1", "doc_id": "d1", "score": 1},
                    {"query_id": "q1", "doc_id": "missing", "score": 1},
                    {"query_id": "q1", "doc_id": "d1", "score": -2}
                ]
            })
            .to_string(),
        )
        .unwrap();

        let store = store_at(&dir, Some(1));
        assert_eq!(store.document_count(), 1);
        assert_eq!(store.query_count(), 1);
        assert_eq!(store.rating_count(), 1);
        assert_eq!(store.save_count(), 0, "loading must not autosave");
    }

    #[test]
    fn test_load_undecodable_file_starts_clean() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("datastore.json"), "{ not json").unwrap();
        let store = store_at(&dir, None);
        assert_eq!(store.document_count(), 0);
        assert_eq!(store.query_count(), 0);
    }

    #[test]
    fn test_load_non_utf8_file_starts_clean() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("datastore.json"), [0xff, 0xfe, 0x7b]).unwrap();
        let mut store = store_at(&dir, None);
        assert_eq!(store.document_count(), 0);

        store.add_document(doc("d1", "A"));
        store.save().unwrap();
        assert_eq!(store_at(&dir, None).document_count(), 1);
    }

    #[test]
    fn test_unicode_survives_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut store = store_at(&dir, None);
        store.add_document(doc("d-é", "Crème brûlée 東京"));
        let q = store.add_query("où est 東京", None).unwrap();
        store.create_rating_score(&q.id, "d-é", 1, Some("très bien".to_string()));
        store.save().unwrap();

        let raw = std::fs::read_to_string(dir.path().join("datastore.json")).unwrap();
        assert!(raw.contains("Crème brûlée 東京"), "non-ASCII must be written verbatim");

        let reloaded = store_at(&dir, None);
        assert_eq!(reloaded.get_query(&q.id).unwrap().text, "où est 東京");
        assert_eq!(
            reloaded.get_document("d-é").unwrap().fields["title"],
            json!("Crème brûlée 東京")
        );
        assert_eq!(
            reloaded.get_rating(&q.id, "d-é").unwrap().explanation.as_deref(),
            Some("très bien")
        );
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let mut store = store_at(&dir, None);
        store.add_document(doc("d1", "A"));
        store.save().unwrap();
        store.save().unwrap();
        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["datastore.json".to_string()]);
    }

    #[test]
    fn test_export_explanations() {
        let dir = TempDir::new().unwrap();
        let mut store = DataStore::in_memory();
        store.add_document(doc("d1", "A"));
        store.add_document(doc("d2", "B"));
        let q = store.add_query("q", None).unwrap();
        store.create_rating_score(&q.id, "d1", 1, Some("because".to_string()));
        store.create_rating_score(&q.id, "d2", 0, None);

        let out = dir.path().join("nested/explanations.json");
        assert_eq!(store.export_explanations(&out).unwrap(), 2);
        let records: Vec<Value> =
            serde_json::from_str(&std::fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(records[0]["explanation"], json!("because"));
        assert_eq!(records[1]["explanation"], json!(""));
        assert_eq!(records[0]["query"], json!("q"));
    }
}
