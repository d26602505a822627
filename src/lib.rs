//! # Relevance Dataset
//!
//! Generates search-relevance judgement datasets with a language model as
//! the annotator.
//!
//! A run samples seed documents from a search engine, asks the LLM to write
//! queries a real user might type for them, grades (query, document) pairs
//! on a binary or graded scale, and exports the judgements for offline
//! evaluation tools.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Search engine│──▶│   Pipeline   │──▶│  DataStore   │
//! │ Solr/ES/OS/  │   │  generate +  │   │ JSON, atomic │
//! │ Vespa        │   │  score       │   │ autosave     │
//! └──────────────┘   └──────┬───────┘   └──────┬───────┘
//!                           │                  │
//!                    ┌──────▼───────┐   ┌──────▼───────┐
//!                    │ LLM service  │   │   Writers    │
//!                    │ OpenAI/Gemini│   │ Quepid, RRE, │
//!                    └──────────────┘   │ MTEB, visual │
//!                                       └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Run and LLM configuration parsing and validation |
//! | [`error`] | Shared error type and exit codes |
//! | [`text`] | Text cleaning and field normalisation |
//! | [`models`] | Documents, queries, ratings, relevance scales |
//! | [`datastore`] | Deduplicating, persisted store of the dataset |
//! | [`search_engine`] | Engine adapters and the `fetch_all` pager |
//! | [`llm`] | Chat-model providers and the query/score service |
//! | [`writers`] | Output formats |
//! | [`pipeline`] | The end-to-end generation run |
//! | [`progress`] | Phase progress on stderr |
//! | [`stats`] | Datastore summary |

pub mod config;
pub mod datastore;
pub mod error;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod search_engine;
pub mod stats;
pub mod text;
pub mod writers;

pub use error::{Error, Result};
