//! The dataset-generation run.
//!
//! Phases run strictly in order:
//!
//! | # | Phase | Engine | LLM |
//! |---|-------|--------|-----|
//! | 1 | Load user queries from the `queries` file | | |
//! | 2 | Fetch seed documents, flag them as generation seeds | `fetch_for_query_generation` | |
//! | 3 | Generate queries until `num_queries_needed` exist | | `generate_queries` |
//! | 4 | Score every query × seed pair (`enable_cartesian_product`) | | `generate_score` |
//! | 5 | Expand the document set per query (needs `query_template`) | `fetch_for_evaluation` | |
//! | 6 | Score every expanded pair | | `generate_score` |
//! | 7 | Save, export explanations, write the output format | | |
//!
//! A failed LLM call skips that document or pair and is counted in
//! [`RunSummary::llm_failures`]. A failed engine call aborts the run; the
//! store keeps whatever autosave already checkpointed.

use std::fmt;
use tracing::{info, warn};

use crate::config::{load_llm_config, Config};
use crate::datastore::{DataStore, StoreOptions};
use crate::error::{Error, Result};
use crate::llm::{LazyChatModel, LlmService};
use crate::models::Query;
use crate::progress::{NoProgress, PipelinePhase, PipelineProgress, PipelineProgressEvent};
use crate::search_engine::{create_engine, SearchEngine};
use crate::writers::create_writer;

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub documents: usize,
    pub queries: usize,
    pub ratings: usize,
    pub llm_failures: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} documents, {} queries, {} ratings ({} LLM failures)",
            self.documents, self.queries, self.ratings, self.llm_failures
        )
    }
}

pub struct Pipeline {
    config: Config,
    store: DataStore,
    engine: Box<dyn SearchEngine>,
    llm: LlmService,
    progress: Box<dyn PipelineProgress>,
    llm_failures: usize,
}

impl Pipeline {
    pub fn new(config: Config, store: DataStore, engine: Box<dyn SearchEngine>, llm: LlmService) -> Self {
        Self {
            config,
            store,
            engine,
            llm,
            progress: Box::new(NoProgress),
            llm_failures: 0,
        }
    }

    /// Wire the store, engine, and LLM described by `config`.
    ///
    /// The chat model is built lazily, so a missing API key surfaces on the
    /// first LLM call rather than here.
    pub async fn from_config(config: Config) -> Result<Self> {
        let store = DataStore::open(
            &config.datastore_path,
            StoreOptions {
                ignore_saved_data: false,
                autosave_every_n_updates: config.datastore_autosave_every_n_updates,
            },
        )?;
        let engine = create_engine(config.search_engine_type, &config.collection_endpoint()).await?;
        let llm_config = load_llm_config(&config.llm_configuration_file)?;
        let llm = LlmService::new(Box::new(LazyChatModel::new(llm_config)));
        Ok(Self::new(config, store, engine, llm))
    }

    pub fn with_progress(mut self, progress: Box<dyn PipelineProgress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn store(&self) -> &DataStore {
        &self.store
    }

    pub fn into_store(self) -> DataStore {
        self.store
    }

    pub async fn run(&mut self) -> Result<RunSummary> {
        self.load_user_queries()?;
        let seeds = self.fetch_seed_documents().await?;

        if self.config.generate_queries_from_documents {
            self.generate_queries(&seeds).await?;
        } else {
            info!("query generation from documents disabled");
        }

        if self.config.enable_cartesian_product {
            let pairs = self.cartesian_pairs();
            self.score_pairs(PipelinePhase::CartesianScoring, pairs).await?;
        }

        let expanded = self.expand_document_set().await?;
        self.score_pairs(PipelinePhase::ScoringExpansion, expanded).await?;

        self.finalize()?;

        let summary = RunSummary {
            documents: self.store.document_count(),
            queries: self.store.query_count(),
            ratings: self.store.rating_count(),
            llm_failures: self.llm_failures,
        };
        info!(%summary, "dataset generation finished");
        Ok(summary)
    }

    fn started(&self, phase: PipelinePhase, total: Option<usize>) {
        self.progress.report(PipelineProgressEvent::Started {
            phase,
            total: total.map(|t| t as u64),
        });
    }

    fn advanced(&self, phase: PipelinePhase, n: usize, total: usize) {
        self.progress.report(PipelineProgressEvent::Advanced {
            phase,
            n: n as u64,
            total: total as u64,
        });
    }

    // ── Phase 1 ─────────────────────────────────────────────────────

    fn load_user_queries(&mut self) -> Result<()> {
        let Some(path) = self.config.queries.clone() else {
            return Ok(());
        };
        self.started(PipelinePhase::LoadingQueries, None);

        let content = std::fs::read_to_string(&path)?;
        let mut added = 0;
        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match self.store.add_query(line, None) {
                Ok(_) => added += 1,
                Err(e) => warn!(line, error = %e, "skipping user query"),
            }
        }
        info!(path = %path.display(), added, "user queries loaded");
        Ok(())
    }

    // ── Phase 2 ─────────────────────────────────────────────────────

    /// Returns the ids of the seed documents in engine order.
    async fn fetch_seed_documents(&mut self) -> Result<Vec<String>> {
        self.started(PipelinePhase::FetchingDocuments, Some(self.config.number_of_docs));

        let docs = self
            .engine
            .fetch_for_query_generation(
                self.config.documents_filter(),
                self.config.number_of_docs,
                &self.config.doc_fields,
                0,
            )
            .await?;

        let mut seeds = Vec::with_capacity(docs.len());
        for doc in docs {
            let id = doc.id.clone();
            self.store.add_document(doc);
            self.store.mark_used_for_generation(&id);
            seeds.push(id);
        }
        info!(engine = self.engine.name(), count = seeds.len(), "seed documents fetched");
        Ok(seeds)
    }

    // ── Phase 3 ─────────────────────────────────────────────────────

    async fn generate_queries(&mut self, seeds: &[String]) -> Result<()> {
        let needed = self.config.num_queries_needed;
        if self.store.query_count() >= needed {
            info!(needed, existing = self.store.query_count(), "query target already met");
            return Ok(());
        }
        let per_doc = needed.div_ceil(self.config.number_of_docs);
        self.started(PipelinePhase::GeneratingQueries, Some(seeds.len()));

        for (i, doc_id) in seeds.iter().enumerate() {
            if self.store.query_count() >= needed {
                break;
            }
            let Some(doc) = self.store.get_document(doc_id).cloned() else {
                continue;
            };
            match self
                .llm
                .generate_queries(&doc, per_doc, self.config.max_query_terms)
                .await
            {
                Ok(texts) => {
                    for text in texts {
                        if self.store.query_count() >= needed {
                            break;
                        }
                        if let Err(e) = self.store.add_query(&text, None) {
                            warn!(doc_id = %doc_id, error = %e, "discarding generated query");
                        }
                    }
                }
                Err(e) => {
                    self.count_llm_failure(e)?;
                    warn!(doc_id = %doc_id, "query generation failed, skipping document");
                }
            }
            self.advanced(PipelinePhase::GeneratingQueries, i + 1, seeds.len());
        }
        info!(queries = self.store.query_count(), needed, "query generation done");
        Ok(())
    }

    // ── Phases 4 and 6 ──────────────────────────────────────────────

    fn cartesian_pairs(&self) -> Vec<(Query, String)> {
        let seeds = self.store.get_cartesian_prod_docs();
        self.store
            .get_queries()
            .into_iter()
            .flat_map(|q| seeds.iter().map(move |d| (q.clone(), d.id.clone())))
            .filter(|(q, d)| !self.store.has_rating_score(&q.id, d))
            .collect()
    }

    async fn score_pairs(&mut self, phase: PipelinePhase, pairs: Vec<(Query, String)>) -> Result<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        let total = pairs.len();
        self.started(phase, Some(total));
        let scale = self.config.relevance_scale;
        let explain = self.config.save_llm_explanation;

        for (i, (query, doc_id)) in pairs.into_iter().enumerate() {
            if self.store.has_rating_score(&query.id, &doc_id) {
                continue;
            }
            let Some(doc) = self.store.get_document(&doc_id).cloned() else {
                continue;
            };
            match self.llm.generate_score(&doc, &query.text, scale, explain).await {
                Ok(score) => {
                    self.store.create_rating_score(
                        &query.id,
                        &doc_id,
                        i64::from(score.score()),
                        score.explanation().map(str::to_string),
                    );
                }
                Err(e) => {
                    self.count_llm_failure(e)?;
                    warn!(query_id = %query.id, doc_id = %doc_id, "scoring failed, skipping pair");
                }
            }
            self.advanced(phase, i + 1, total);
        }
        Ok(())
    }

    /// Per-call LLM failures are counted; configuration errors abort the run.
    fn count_llm_failure(&mut self, e: Error) -> Result<()> {
        if matches!(e, Error::Config(_)) {
            return Err(e);
        }
        self.llm_failures += 1;
        warn!(error = %e, failures = self.llm_failures, "LLM call failed");
        Ok(())
    }

    // ── Phase 5 ─────────────────────────────────────────────────────

    /// Returns the unrated (query, document) pairs the engine linked.
    async fn expand_document_set(&mut self) -> Result<Vec<(Query, String)>> {
        let Some(template) = self.config.query_template.clone() else {
            info!("no query_template configured, skipping document expansion");
            return Ok(Vec::new());
        };
        let queries: Vec<Query> = self.store.get_queries().into_iter().cloned().collect();
        self.started(PipelinePhase::ExpandingDocuments, Some(queries.len()));

        let mut pairs = Vec::new();
        for (i, query) in queries.iter().enumerate() {
            let docs = self
                .engine
                .fetch_for_evaluation(&template, &self.config.doc_fields, &query.text)
                .await?;
            for doc in docs {
                let doc_id = doc.id.clone();
                self.store.add_document(doc);
                if !self.store.has_rating_score(&query.id, &doc_id) {
                    pairs.push((query.clone(), doc_id));
                }
            }
            self.advanced(PipelinePhase::ExpandingDocuments, i + 1, queries.len());
        }
        info!(pairs = pairs.len(), documents = self.store.document_count(), "document set expanded");
        Ok(pairs)
    }

    // ── Phase 7 ─────────────────────────────────────────────────────

    fn finalize(&mut self) -> Result<()> {
        self.started(PipelinePhase::Writing, None);
        self.store.save()?;

        if self.config.save_llm_explanation {
            if let Some(dest) = &self.config.llm_explanation_destination {
                let count = self.store.export_explanations(dest)?;
                info!(path = %dest.display(), count, "LLM explanations exported");
            }
        }

        let writer = create_writer(&self.config.writer_config())?;
        writer.write(&self.config.output_destination, &self.store)?;
        info!(
            format = %self.config.output_format,
            path = %self.config.output_destination.display(),
            "dataset written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatMessage, ChatModel, StructuredSchema};
    use crate::models::{Document, RelevanceScale};
    use crate::search_engine::{FieldFilter, SearchEngineKind};
    use crate::writers::quepid::QUEPID_OUTPUT_FILENAME;
    use crate::writers::OutputFormat;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn doc(id: &str, title: &str) -> Document {
        Document::new(id, json!({"title": [title]}).as_object().cloned().unwrap()).unwrap()
    }

    #[derive(Default)]
    struct MockEngine {
        seeds: Vec<Document>,
        expansion: Vec<Document>,
        fail_seeds: bool,
        keywords: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl SearchEngine for MockEngine {
        fn name(&self) -> &str {
            "mock"
        }
        fn unique_key(&self) -> &str {
            "id"
        }
        async fn fetch_for_query_generation(
            &self,
            _filter: &[FieldFilter],
            number_of_docs: usize,
            _doc_fields: &[String],
            _start: usize,
        ) -> Result<Vec<Document>> {
            if self.fail_seeds {
                return Err(Error::Transport {
                    status: 503,
                    url: "mock".into(),
                    body: "down".into(),
                });
            }
            Ok(self.seeds.iter().take(number_of_docs).cloned().collect())
        }
        async fn fetch_for_evaluation(
            &self,
            _template: &Path,
            _doc_fields: &[String],
            keyword: &str,
        ) -> Result<Vec<Document>> {
            self.keywords.lock().unwrap().push(keyword.to_string());
            Ok(self.expansion.clone())
        }
        async fn search(&self, _payload: Value) -> Result<Vec<Document>> {
            Ok(Vec::new())
        }
        async fn total_hits(&self) -> Result<u64> {
            Ok(self.seeds.len() as u64)
        }
    }

    /// Numbers generated queries globally; scores 1, or fails on queries containing "fail".
    #[derive(Default)]
    struct FakeModel {
        generated: AtomicUsize,
        generation_calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ChatModel for FakeModel {
        fn name(&self) -> &str {
            "fake"
        }
        async fn complete_structured(
            &self,
            messages: &[ChatMessage],
            schema: &StructuredSchema,
        ) -> Result<Value> {
            if schema.name == "generated_queries" {
                self.generation_calls.fetch_add(1, Ordering::SeqCst);
                let n = schema.schema["properties"]["queries"]["maxItems"].as_u64().unwrap();
                let queries: Vec<String> = (0..n)
                    .map(|_| format!("query {}", self.generated.fetch_add(1, Ordering::SeqCst)))
                    .collect();
                return Ok(json!({ "queries": queries }));
            }
            if messages[1].content.contains("fail") {
                return Err(Error::bad_llm_response("scripted failure"));
            }
            Ok(json!({"score": 1, "explanation": "looks relevant"}))
        }
    }

    fn config(dir: &Path) -> Config {
        Config {
            query_template: None,
            search_engine_type: SearchEngineKind::Solr,
            collection_name: "books".into(),
            vespa_schema: None,
            search_engine_url: "http://localhost:8983/solr".into(),
            documents_filter: None,
            number_of_docs: 2,
            doc_fields: vec!["title".into()],
            queries: None,
            generate_queries_from_documents: true,
            num_queries_needed: 3,
            relevance_scale: RelevanceScale::Binary,
            llm_configuration_file: dir.join("llm.yaml"),
            max_query_terms: None,
            output_format: OutputFormat::Quepid,
            output_destination: dir.join("out"),
            save_llm_explanation: false,
            llm_explanation_destination: None,
            id_field: None,
            rre_query_template: None,
            rre_query_placeholder: None,
            verbose: false,
            datastore_autosave_every_n_updates: None,
            enable_cartesian_product: true,
            datastore_path: dir.join("datastore.json"),
        }
    }

    fn pipeline(config: Config, engine: MockEngine, model: FakeModel) -> Pipeline {
        let store = DataStore::open(
            &config.datastore_path,
            StoreOptions {
                ignore_saved_data: true,
                autosave_every_n_updates: None,
            },
        )
        .unwrap();
        Pipeline::new(config, store, Box::new(engine), LlmService::new(Box::new(model)))
    }

    #[tokio::test]
    async fn test_full_run() {
        let dir = TempDir::new().unwrap();
        let template = dir.path().join("template.json");
        std::fs::write(&template, r#"{"q": "$query"}"#).unwrap();

        let mut cfg = config(dir.path());
        cfg.query_template = Some(template);
        cfg.save_llm_explanation = true;
        cfg.llm_explanation_destination = Some(dir.path().join("explanations.json"));

        let keywords = Arc::new(Mutex::new(Vec::new()));
        let engine = MockEngine {
            seeds: vec![doc("d1", "Dune"), doc("d2", "Emma")],
            expansion: vec![doc("e1", "Extra")],
            keywords: keywords.clone(),
            ..Default::default()
        };
        let mut p = pipeline(cfg.clone(), engine, FakeModel::default());
        let summary = p.run().await.unwrap();

        // 2 queries from d1, 1 from d2 (target reached)
        assert_eq!(summary.queries, 3);
        assert_eq!(summary.documents, 3);
        // 3 x 2 cartesian + 3 expansion
        assert_eq!(summary.ratings, 9);
        assert_eq!(summary.llm_failures, 0);

        let store = p.store();
        assert!(store.get_document("d1").unwrap().is_used_to_generate_queries);
        assert!(!store.get_document("e1").unwrap().is_used_to_generate_queries);
        assert_eq!(*keywords.lock().unwrap(), vec!["query 0", "query 1", "query 2"]);
        assert!(store
            .get_ratings()
            .iter()
            .all(|r| r.explanation.as_deref() == Some("looks relevant")));

        let reloaded = DataStore::open(&cfg.datastore_path, StoreOptions::default()).unwrap();
        assert_eq!(reloaded.rating_count(), 9);

        let csv = std::fs::read_to_string(cfg.output_destination.join(QUEPID_OUTPUT_FILENAME)).unwrap();
        assert_eq!(csv.lines().count(), 10);

        let explanations: Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("explanations.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(explanations.as_array().unwrap().len(), 9);
    }

    #[tokio::test]
    async fn test_user_queries_count_toward_target() {
        let dir = TempDir::new().unwrap();
        let queries = dir.path().join("queries.txt");
        std::fs::write(&queries, "dune\n\n  emma  \nfoundation\n").unwrap();
        let mut cfg = config(dir.path());
        cfg.queries = Some(queries);

        let calls = Arc::new(AtomicUsize::new(0));
        let model = FakeModel {
            generation_calls: calls.clone(),
            ..Default::default()
        };
        let engine = MockEngine {
            seeds: vec![doc("d1", "Dune"), doc("d2", "Emma")],
            ..Default::default()
        };
        let mut p = pipeline(cfg, engine, model);
        let summary = p.run().await.unwrap();

        assert_eq!(summary.queries, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(p.store().find_query_by_text("emma").is_some());
        // no template: cartesian only
        assert_eq!(summary.ratings, 6);
    }

    #[tokio::test]
    async fn test_llm_failures_skip_pairs() {
        let dir = TempDir::new().unwrap();
        let queries = dir.path().join("queries.txt");
        std::fs::write(&queries, "please fail\nworks\n").unwrap();
        let mut cfg = config(dir.path());
        cfg.queries = Some(queries);
        cfg.num_queries_needed = 2;
        cfg.generate_queries_from_documents = false;

        let engine = MockEngine {
            seeds: vec![doc("d1", "Dune"), doc("d2", "Emma")],
            ..Default::default()
        };
        let mut p = pipeline(cfg, engine, FakeModel::default());
        let summary = p.run().await.unwrap();

        assert_eq!(summary.llm_failures, 2);
        assert_eq!(summary.ratings, 2);
        let failing = p.store().find_query_by_text("please fail").unwrap().id.clone();
        assert!(!p.store().has_rating_score(&failing, "d1"));
    }

    #[tokio::test]
    async fn test_cartesian_disabled() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(dir.path());
        cfg.enable_cartesian_product = false;
        let engine = MockEngine {
            seeds: vec![doc("d1", "Dune"), doc("d2", "Emma")],
            ..Default::default()
        };
        let mut p = pipeline(cfg, engine, FakeModel::default());
        let summary = p.run().await.unwrap();
        assert_eq!(summary.queries, 3);
        assert_eq!(summary.ratings, 0);
    }

    #[tokio::test]
    async fn test_engine_failure_aborts() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path());
        let output: PathBuf = cfg.output_destination.clone();
        let engine = MockEngine {
            fail_seeds: true,
            ..Default::default()
        };
        let mut p = pipeline(cfg, engine, FakeModel::default());
        let err = p.run().await.unwrap_err();
        assert!(err.is_transport());
        assert!(!output.exists());
    }

    #[test]
    fn test_summary_display() {
        let s = RunSummary {
            documents: 3,
            queries: 2,
            ratings: 5,
            llm_failures: 1,
        };
        assert_eq!(s.to_string(), "3 documents, 2 queries, 5 ratings (1 LLM failures)");
    }
}
