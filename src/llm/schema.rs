//! Structured-output schemas sent to the model, and the validators that
//! check its replies against them.
//!
//! Providers are asked for schema-constrained JSON, but the reply is still
//! validated here: a provider may ignore or loosen the schema.

use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::models::{RelevanceScale, Score};

/// A named JSON schema for a structured completion.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredSchema {
    pub name: String,
    pub schema: Value,
}

/// `{"queries": [string; n]}` with non-empty strings.
pub fn queries_schema(n: usize) -> StructuredSchema {
    StructuredSchema {
        name: "generated_queries".to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "queries": {
                    "type": "array",
                    "items": { "type": "string", "minLength": 1 },
                    "minItems": n,
                    "maxItems": n
                }
            },
            "required": ["queries"],
            "additionalProperties": false
        }),
    }
}

/// `{"score": <label>, "explanation": string | null}` for the given scale.
pub fn score_schema(scale: RelevanceScale) -> StructuredSchema {
    StructuredSchema {
        name: format!("{}_score", scale.as_str()),
        schema: json!({
            "type": "object",
            "properties": {
                "score": { "type": "integer", "enum": scale.labels() },
                "explanation": { "type": ["string", "null"] }
            },
            "required": ["score", "explanation"],
            "additionalProperties": false
        }),
    }
}

/// Extract exactly `n` trimmed, non-empty query strings.
pub fn validate_queries(value: &Value, n: usize) -> Result<Vec<String>> {
    let items = value
        .get("queries")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::bad_llm_response("expected an object with a 'queries' array"))?;

    if items.len() != n {
        return Err(Error::bad_llm_response(format!(
            "expected {n} queries, got {}",
            items.len()
        )));
    }

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let text = item
                .as_str()
                .ok_or_else(|| Error::bad_llm_response(format!("query #{i} is not a string")))?
                .trim();
            if text.is_empty() {
                return Err(Error::bad_llm_response(format!("query #{i} is empty")));
            }
            Ok(text.to_string())
        })
        .collect()
}

/// Extract an integer score on `scale` and an optional explanation.
pub fn validate_score(value: &Value, scale: RelevanceScale) -> Result<Score> {
    let raw = value
        .get("score")
        .ok_or_else(|| Error::bad_llm_response("missing 'score'"))?;
    // integers only: 1.0 and "1" are rejected
    let score = raw
        .as_u64()
        .and_then(|s| u32::try_from(s).ok())
        .ok_or_else(|| Error::bad_llm_response(format!("score must be an integer, got {raw}")))?;

    let explanation = match value.get("explanation") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            return Err(Error::bad_llm_response(format!(
                "explanation must be a string or null, got {other}"
            )))
        }
    };

    Score::new(score, scale, explanation).map_err(|e| Error::bad_llm_response(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queries_schema_pins_count() {
        let s = queries_schema(3);
        assert_eq!(s.schema["properties"]["queries"]["minItems"], 3);
        assert_eq!(s.schema["properties"]["queries"]["maxItems"], 3);
    }

    #[test]
    fn test_score_schema_enumerates_labels() {
        assert_eq!(
            score_schema(RelevanceScale::Binary).schema["properties"]["score"]["enum"],
            json!([0, 1])
        );
        assert_eq!(
            score_schema(RelevanceScale::Graded).schema["properties"]["score"]["enum"],
            json!([0, 1, 2])
        );
    }

    #[test]
    fn test_validate_queries() {
        let ok = validate_queries(&json!({"queries": [" red shoes ", "boots"]}), 2).unwrap();
        assert_eq!(ok, vec!["red shoes", "boots"]);

        assert!(matches!(
            validate_queries(&json!({"queries": ["a"]}), 2),
            Err(Error::BadLlmResponse(_))
        ));
        assert!(validate_queries(&json!({"queries": ["a", "  "]}), 2).is_err());
        assert!(validate_queries(&json!({"queries": ["a", 3]}), 2).is_err());
        assert!(validate_queries(&json!(["a", "b"]), 2).is_err());
        assert_eq!(validate_queries(&json!({"queries": []}), 0).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_validate_score() {
        let s = validate_score(&json!({"score": 2, "explanation": "exact match"}), RelevanceScale::Graded)
            .unwrap();
        assert_eq!(s.score(), 2);
        assert_eq!(s.explanation(), Some("exact match"));

        let s = validate_score(&json!({"score": 0, "explanation": null}), RelevanceScale::Binary).unwrap();
        assert_eq!(s.score(), 0);
        assert_eq!(s.explanation(), None);

        for bad in [
            json!({"score": 2}),
            json!({"score": 1.0}),
            json!({"score": "1"}),
            json!({"score": -1}),
            json!({"explanation": "x"}),
            json!({"score": 1, "explanation": 5}),
        ] {
            assert!(
                matches!(validate_score(&bad, RelevanceScale::Binary), Err(Error::BadLlmResponse(_))),
                "{bad} should be rejected"
            );
        }
    }
}
