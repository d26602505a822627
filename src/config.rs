//! Run configuration and LLM provider configuration.
//!
//! Both files are YAML; a `.toml` extension switches the parser to TOML.
//! [`load_config`] and [`load_llm_config`] parse then validate, and every
//! problem surfaces as [`Error::Config`] naming the offending key.
//!
//! # Example
//!
//! ```yaml
//! search_engine_type: solr
//! search_engine_url: http://localhost:8983/solr/
//! collection_name: books
//! documents_filter:
//!   - genre: [fantasy, sci-fi]
//! number_of_docs: 20
//! doc_fields: [title, description]
//! num_queries_needed: 40
//! relevance_scale: graded
//! llm_configuration_file: llm_config.yaml
//! output_format: quepid
//! output_destination: output/
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::datastore::DEFAULT_DATASTORE_PATH;
use crate::error::{Error, Result};
use crate::models::RelevanceScale;
use crate::search_engine::{FieldFilter, SearchEngineKind};
use crate::writers::{OutputFormat, WriterConfig};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Template for fetch-for-evaluation (JSON, or YQL for Vespa).
    #[serde(default)]
    pub query_template: Option<PathBuf>,
    pub search_engine_type: SearchEngineKind,
    pub collection_name: String,
    #[serde(default)]
    pub vespa_schema: Option<String>,
    pub search_engine_url: String,
    #[serde(default)]
    pub documents_filter: Option<Vec<FieldFilter>>,
    pub number_of_docs: usize,
    pub doc_fields: Vec<String>,
    /// Optional `.txt` file of user queries, one per line.
    #[serde(default)]
    pub queries: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub generate_queries_from_documents: bool,
    pub num_queries_needed: usize,
    pub relevance_scale: RelevanceScale,
    pub llm_configuration_file: PathBuf,
    #[serde(default)]
    pub max_query_terms: Option<usize>,
    pub output_format: OutputFormat,
    pub output_destination: PathBuf,
    #[serde(default)]
    pub save_llm_explanation: bool,
    #[serde(default)]
    pub llm_explanation_destination: Option<PathBuf>,
    #[serde(default)]
    pub id_field: Option<String>,
    #[serde(default)]
    pub rre_query_template: Option<PathBuf>,
    #[serde(default)]
    pub rre_query_placeholder: Option<String>,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub datastore_autosave_every_n_updates: Option<usize>,
    #[serde(default = "default_true")]
    pub enable_cartesian_product: bool,
    #[serde(default = "default_datastore_path")]
    pub datastore_path: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_datastore_path() -> PathBuf {
    PathBuf::from(DEFAULT_DATASTORE_PATH)
}

impl Config {
    /// Engine endpoint for the configured collection: `<url>/<collection>/`,
    /// or `<url>/<vespa_schema>/` for Vespa.
    pub fn collection_endpoint(&self) -> String {
        let base = self.search_engine_url.trim_end_matches('/');
        let name = match self.search_engine_type {
            SearchEngineKind::Vespa => self.vespa_schema.as_deref().unwrap_or("doc"),
            _ => self.collection_name.as_str(),
        };
        format!("{base}/{name}/")
    }

    /// Writer settings; the RRE template is referenced by file name only,
    /// preferring `rre_query_template` over `query_template`.
    pub fn writer_config(&self) -> WriterConfig {
        let query_template = self
            .rre_query_template
            .as_ref()
            .or(self.query_template.as_ref())
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string());
        WriterConfig {
            output_format: self.output_format,
            index: self.collection_name.clone(),
            id_field: self.id_field.clone(),
            query_template,
            query_placeholder: self.rre_query_placeholder.clone(),
        }
    }

    pub fn documents_filter(&self) -> &[FieldFilter] {
        self.documents_filter.as_deref().unwrap_or(&[])
    }

    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.search_engine_url).map_err(|e| {
            Error::config(format!(
                "search_engine_url '{}' is not a valid URL: {e}",
                self.search_engine_url
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::config("search_engine_url must be an http(s) URL"));
        }
        if self.collection_name.trim().is_empty() {
            return Err(Error::config("collection_name must not be empty"));
        }
        if self.number_of_docs == 0 {
            return Err(Error::config("number_of_docs must be > 0"));
        }
        if self.num_queries_needed == 0 {
            return Err(Error::config("num_queries_needed must be > 0"));
        }
        if self.max_query_terms == Some(0) {
            return Err(Error::config("max_query_terms must be > 0"));
        }
        if self.datastore_autosave_every_n_updates == Some(0) {
            return Err(Error::config("datastore_autosave_every_n_updates must be > 0"));
        }
        if self.doc_fields.is_empty() {
            return Err(Error::config("doc_fields must not be empty"));
        }
        if self.doc_fields.iter().any(|f| f.trim().is_empty()) {
            return Err(Error::config("doc_fields cannot contain empty strings"));
        }

        if let Some(queries) = &self.queries {
            if !has_extension(queries, &["txt"]) {
                return Err(Error::config("queries file must have a .txt extension"));
            }
            require_file("queries", queries)?;
        }
        if let Some(template) = &self.query_template {
            require_file("query_template", template)?;
        }
        if let Some(template) = &self.rre_query_template {
            require_file("rre_query_template", template)?;
        }
        if !has_extension(&self.llm_configuration_file, &["yaml", "yml", "toml"]) {
            return Err(Error::config(
                "llm_configuration_file must have a .yaml or .yml extension",
            ));
        }
        require_file("llm_configuration_file", &self.llm_configuration_file)?;

        if self.save_llm_explanation && self.llm_explanation_destination.is_none() {
            return Err(Error::config(
                "llm_explanation_destination must be set when save_llm_explanation is true",
            ));
        }

        if self.output_format == OutputFormat::Rre {
            if is_blank(&self.id_field) {
                return Err(Error::config("id_field is required when output_format is rre"));
            }
            if is_blank(&self.rre_query_placeholder) {
                return Err(Error::config(
                    "rre_query_placeholder is required when output_format is rre",
                ));
            }
            if self.rre_query_template.is_none() && self.query_template.is_none() {
                return Err(Error::config(
                    "rre_query_template or query_template is required when output_format is rre",
                ));
            }
        }

        if self.search_engine_type == SearchEngineKind::Vespa && is_blank(&self.vespa_schema) {
            return Err(Error::config(
                "vespa_schema is required when search_engine_type is vespa",
            ));
        }
        Ok(())
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| allowed.contains(&e.to_ascii_lowercase().as_str()))
}

fn require_file(key: &str, path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(Error::config(format!(
            "{key} file not found: {}",
            path.display()
        )))
    }
}

/// Parse YAML, or TOML when the path ends in `.toml`.
fn parse_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::config(format!("failed to read config file {}: {e}", path.display()))
    })?;
    let parsed = if has_extension(path, &["toml"]) {
        toml::from_str(&content).map_err(|e| e.to_string())
    } else {
        serde_yaml::from_str(&content).map_err(|e| e.to_string())
    };
    parsed.map_err(|e| Error::config(format!("failed to parse {}: {e}", path.display())))
}

/// Load and validate the run configuration.
pub fn load_config(path: &Path) -> Result<Config> {
    let config: Config = parse_file(path)?;
    config.validate()?;
    debug!(path = %path.display(), "configuration file loaded");
    Ok(config)
}

// ═══════════════════════════════════════════════════════════════════════
// LLM configuration
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    Openai,
    Gemini,
}

impl LlmProviderKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Gemini => "gemini",
        }
    }

    /// Environment variable holding the API key when `api_key_env` is unset.
    pub const fn default_api_key_env(self) -> &'static str {
        match self {
            Self::Openai => "OPENAI_API_KEY",
            Self::Gemini => "GOOGLE_API_KEY",
        }
    }

    /// Accepted reasoning efforts; the first one is the fallback.
    pub const fn reasoning_efforts(self) -> &'static [&'static str] {
        match self {
            Self::Openai => &["minimal", "low", "medium", "high"],
            Self::Gemini => &["low", "high"],
        }
    }
}

impl std::fmt::Display for LlmProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub name: LlmProviderKind,
    pub model: String,
    #[serde(default)]
    pub reasoning_effort: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Override of the provider API root (proxies, tests).
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    60
}

impl LlmConfig {
    pub fn new(name: LlmProviderKind, model: impl Into<String>) -> Self {
        Self {
            name,
            model: model.into(),
            reasoning_effort: None,
            api_key_env: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            base_url: None,
        }
    }

    pub fn api_key_env(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or_else(|| self.name.default_api_key_env())
    }

    /// Replace an unsupported reasoning effort with the provider fallback.
    pub fn normalize_reasoning_effort(&mut self) {
        let allowed = self.name.reasoning_efforts();
        if let Some(effort) = &self.reasoning_effort {
            if !allowed.contains(&effort.as_str()) {
                warn!(
                    provider = %self.name,
                    effort = %effort,
                    fallback = allowed[0],
                    "unsupported reasoning_effort, using provider default"
                );
                self.reasoning_effort = Some(allowed[0].to_string());
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::config("llm model must not be empty"));
        }
        Ok(())
    }
}

/// Load the LLM provider configuration.
pub fn load_llm_config(path: &Path) -> Result<LlmConfig> {
    if !path.exists() {
        return Err(Error::config(format!(
            "LLM config file not found: {}",
            path.display()
        )));
    }
    let mut config: LlmConfig = parse_file(path)?;
    config.normalize_reasoning_effort();
    config.validate()?;
    debug!(path = %path.display(), "LLM configuration file loaded");
    Ok(config)
}
