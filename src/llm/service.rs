//! Query generation and relevance scoring on top of a [`ChatModel`].

use tracing::{debug, info, warn};

use super::provider::{ChatMessage, ChatModel};
use super::schema::{queries_schema, score_schema, validate_queries, validate_score};
use crate::error::Result;
use crate::models::{Document, RelevanceScale, Score};

pub struct LlmService {
    model: Box<dyn ChatModel>,
}

impl LlmService {
    pub fn new(model: Box<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn build_query_generation_prompt(n: usize, max_query_terms: Option<usize>) -> String {
        let mut rules = vec![
            "1. **Strictly Relevant:** All queries MUST be based *only* on information present in the document.".to_string(),
            "2. **Natural:** Queries must sound like a real person searching, not robotic lists of keywords.".to_string(),
            "3. **Semantically Diverse (CRITICAL):** Each query must target a different *sub-topic, intent, \
             or angle* of the document. Do NOT generate queries that are just minor variations of each other. \
             This includes, but is not limited to:\n\
             \x20   - Simple plural/singular changes (e.g., 'car' vs 'cars').\n\
             \x20   - Minor grammatical changes (e.g., 'extend' vs 'extends').\n\
             \x20   - Adding/removing stop-words (e.g., 'a', 'the', 'for')."
                .to_string(),
            "4. **No Duplicates:** Do not generate identical queries.".to_string(),
        ];
        if let Some(max) = max_query_terms {
            rules.push(format!(
                "5. **Strict Length Limit:** Each query MUST contain *at most* {max} words. \
                 Do NOT exceed this limit."
            ));
        }
        format!(
            "You are an expert search query analyst. Your task is to generate {n} unique, \
             high-quality, and *semantically diverse* natural language search queries based \
             strictly on the given document.\n\
             **CRITICAL RULES:**\n{}\n\
             Return a structured object matching the provided schema.",
            rules.join("\n")
        )
    }

    pub fn build_score_prompt(scale: RelevanceScale, explain: bool) -> String {
        let mut prompt = format!(
            "You are a professional data labeler. Given a document with a set of fields and a query, \
             return the relevance score on a scale called {}. \
             Return a structured object matching the provided schema.",
            scale.as_str().to_uppercase()
        );
        if explain {
            prompt.push_str(
                " Include a clear explanation justifying your score in the `explanation` field \
                 based on the provided schema.",
            );
        } else {
            prompt.push_str(" Do not include any explanation.");
        }
        prompt
    }

    /// Ask for `n` queries about `document` and return the distinct ones in
    /// reply order. Fewer than `n` distinct queries is logged, not an error.
    pub async fn generate_queries(
        &self,
        document: &Document,
        n: usize,
        max_query_terms: Option<usize>,
    ) -> Result<Vec<String>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        info!(doc_id = %document.id, n, "generating queries");

        let messages = [
            ChatMessage::system(Self::build_query_generation_prompt(n, max_query_terms)),
            ChatMessage::user(format!("Document:\n{}", document.to_prompt_json())),
        ];
        let reply = self
            .model
            .complete_structured(&messages, &queries_schema(n))
            .await?;
        let queries = validate_queries(&reply, n)?;

        let mut unique: Vec<String> = Vec::with_capacity(queries.len());
        for query in queries {
            if !unique.contains(&query) {
                unique.push(query);
            }
        }
        if unique.len() != n {
            warn!(expected = n, got = unique.len(), doc_id = %document.id, "duplicate generated queries dropped");
        }
        info!(doc_id = %document.id, count = unique.len(), "generated unique queries");
        Ok(unique)
    }

    /// Rate `document` against `query`. The explanation is kept only when
    /// `explain` is set.
    pub async fn generate_score(
        &self,
        document: &Document,
        query: &str,
        scale: RelevanceScale,
        explain: bool,
    ) -> Result<Score> {
        debug!(doc_id = %document.id, query, "generating rating");

        let messages = [
            ChatMessage::system(Self::build_score_prompt(scale, explain)),
            ChatMessage::user(format!(
                "Document: {}\nQuery:{query}\n",
                document.to_prompt_json()
            )),
        ];
        let reply = self
            .model
            .complete_structured(&messages, &score_schema(scale))
            .await?;
        let score = validate_score(&reply, scale)?;

        debug!(doc_id = %document.id, query, score = score.score(), "generated rating");
        if explain {
            Ok(score)
        } else {
            Score::new(score.score(), scale, None)
        }
    }
}
