//! Core data models: the documents, queries, and ratings that make up a
//! relevance dataset.
//!
//! All three types validate on construction and on deserialization, so a
//! persisted datastore containing an invalid record fails only that record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Error, Result};

/// A document fetched from the search engine.
///
/// `fields` maps field names to JSON values (engines produce lists of
/// cleaned strings). It is never empty and never has an empty key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDocument")]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
    pub is_used_to_generate_queries: bool,
}

#[derive(Deserialize)]
struct RawDocument {
    id: String,
    fields: Map<String, Value>,
    #[serde(default)]
    is_used_to_generate_queries: bool,
}

impl TryFrom<RawDocument> for Document {
    type Error = Error;

    fn try_from(raw: RawDocument) -> Result<Self> {
        let mut doc = Document::new(raw.id, raw.fields)?;
        doc.is_used_to_generate_queries = raw.is_used_to_generate_queries;
        Ok(doc)
    }
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::validation("document id must not be empty"));
        }
        if fields.is_empty() {
            return Err(Error::validation(format!(
                "document '{id}' has an empty fields map"
            )));
        }
        if fields.keys().any(|k| k.is_empty()) {
            return Err(Error::validation(format!(
                "document '{id}' has an empty field name"
            )));
        }
        Ok(Self {
            id,
            fields,
            is_used_to_generate_queries: false,
        })
    }

    /// JSON view of the document sent to the language model (without the generation flag).
    pub fn to_prompt_json(&self) -> String {
        serde_json::json!({ "id": self.id, "fields": self.fields }).to_string()
    }
}

/// A search query, either generated by the LLM or supplied by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawQuery")]
pub struct Query {
    pub id: String,
    pub text: String,
}

#[derive(Deserialize)]
struct RawQuery {
    #[serde(default)]
    id: Option<String>,
    text: String,
}

impl TryFrom<RawQuery> for Query {
    type Error = Error;

    fn try_from(raw: RawQuery) -> Result<Self> {
        match raw.id {
            Some(id) => Query::with_id(id, raw.text),
            None => Query::new(raw.text),
        }
    }
}

impl Query {
    /// Create a query with a fresh UUIDv4 id.
    pub fn new(text: impl Into<String>) -> Result<Self> {
        Self::with_id(Uuid::new_v4().to_string(), text)
    }

    pub fn with_id(id: impl Into<String>, text: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let text = text.into();
        if id.is_empty() {
            return Err(Error::validation("query id must not be empty"));
        }
        if text.is_empty() {
            return Err(Error::validation("query text must not be empty"));
        }
        Ok(Self { id, text })
    }
}

/// A relevance judgement of one document for one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRating")]
pub struct Rating {
    pub query_id: String,
    pub doc_id: String,
    pub score: u32,
    pub explanation: Option<String>,
}

#[derive(Deserialize)]
struct RawRating {
    query_id: String,
    doc_id: String,
    score: i64,
    #[serde(default)]
    explanation: Option<String>,
}

impl TryFrom<RawRating> for Rating {
    type Error = Error;

    fn try_from(raw: RawRating) -> Result<Self> {
        Rating::new(raw.query_id, raw.doc_id, raw.score, raw.explanation)
    }
}

impl Rating {
    pub fn new(
        query_id: impl Into<String>,
        doc_id: impl Into<String>,
        score: i64,
        explanation: Option<String>,
    ) -> Result<Self> {
        let query_id = query_id.into();
        let doc_id = doc_id.into();
        if query_id.is_empty() || doc_id.is_empty() {
            return Err(Error::validation("rating references must not be empty"));
        }
        let score = u32::try_from(score).map_err(|_| {
            Error::validation(format!("rating score must be non-negative, got {score}"))
        })?;
        if explanation.as_deref() == Some("") {
            return Err(Error::validation("rating explanation must not be empty"));
        }
        Ok(Self {
            query_id,
            doc_id,
            score,
            explanation,
        })
    }
}

/// Scale used by the LLM to judge relevance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelevanceScale {
    /// `0` not relevant, `1` relevant.
    Binary,
    /// `0` not relevant, `1` partially relevant, `2` is the answer.
    Graded,
}

impl RelevanceScale {
    pub const fn labels(self) -> &'static [u32] {
        match self {
            Self::Binary => &[0, 1],
            Self::Graded => &[0, 1, 2],
        }
    }

    pub const fn max(self) -> u32 {
        match self {
            Self::Binary => 1,
            Self::Graded => 2,
        }
    }

    pub fn contains(self, score: u32) -> bool {
        self.labels().contains(&score)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Graded => "graded",
        }
    }
}

impl std::fmt::Display for RelevanceScale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated relevance score produced by the LLM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Score {
    score: u32,
    scale: RelevanceScale,
    explanation: Option<String>,
}

impl Score {
    pub fn new(score: u32, scale: RelevanceScale, explanation: Option<String>) -> Result<Self> {
        if !scale.contains(score) {
            return Err(Error::validation(format!(
                "score {score} is outside the {scale} scale {:?}",
                scale.labels()
            )));
        }
        Ok(Self {
            score,
            scale,
            explanation: explanation.filter(|e| !e.trim().is_empty()),
        })
    }

    pub const fn score(&self) -> u32 {
        self.score
    }

    pub const fn scale(&self) -> RelevanceScale {
        self.scale
    }

    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }
}
