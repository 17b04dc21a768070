//! LLM triple extractor
//!
//! Prompts a text-generation provider with the closed entity-type and
//! relationship vocabularies and asks for JSON-formatted triples. Output
//! is validated, types are normalized case-insensitively, and a per-chunk
//! cap bounds extraction.

use crate::error::GraphResult;
use crate::triple::{EntityType, Relationship, Triple};
use agent_brain_ingest::Chunk;
use agent_brain_providers::TextGeneratorRef;
use serde::Deserialize;

const ENTITY_VOCABULARY: &str = "Package, Module, Class, Method, Function, Interface, Enum, \
                                 DesignDoc, UserDoc, PRD, Runbook, README, APIDoc, \
                                 Service, Endpoint, Config, Dependency";

const RELATIONSHIP_VOCABULARY: &str =
    "calls, extends, implements, imports, contains, references, depends_on, defined_in";

#[derive(Deserialize)]
struct RawTriple {
    subject: String,
    predicate: String,
    object: String,
    #[serde(default)]
    subject_type: Option<String>,
    #[serde(default)]
    object_type: Option<String>,
}

/// Extracts typed triples from chunks through a text-generation provider
pub struct LlmExtractor {
    generator: TextGeneratorRef,
    max_triplets_per_chunk: usize,
}

impl LlmExtractor {
    /// Create an extractor with the configured per-chunk cap
    pub fn new(generator: TextGeneratorRef, max_triplets_per_chunk: usize) -> Self {
        Self {
            generator,
            max_triplets_per_chunk: max_triplets_per_chunk.max(1),
        }
    }

    /// Extract up to `max_triplets_per_chunk` triples from one chunk
    ///
    /// # Errors
    /// Returns `GraphError::Provider` when the generation call fails;
    /// unparseable output yields an empty list with a warning instead.
    pub async fn extract(&self, chunk: &Chunk) -> GraphResult<Vec<Triple>> {
        let prompt = self.build_prompt(chunk);
        let response = self.generator.generate(&prompt).await?;

        let raw = match parse_triples(&response) {
            Some(raw) => raw,
            None => {
                tracing::warn!(
                    "Extractor returned unparseable output for chunk {}",
                    chunk.chunk_id
                );
                return Ok(Vec::new());
            }
        };

        let triples = raw
            .into_iter()
            .filter(|t| !t.subject.trim().is_empty() && !t.object.trim().is_empty())
            .take(self.max_triplets_per_chunk)
            .map(|t| Triple {
                subject: t.subject.trim().to_string(),
                predicate: Relationship::normalize(t.predicate.trim()),
                object: t.object.trim().to_string(),
                subject_type: t.subject_type.as_deref().map(EntityType::normalize),
                object_type: t.object_type.as_deref().map(EntityType::normalize),
                chunk_id: Some(chunk.chunk_id.clone()),
            })
            .collect();
        Ok(triples)
    }

    fn build_prompt(&self, chunk: &Chunk) -> String {
        format!(
            "Extract up to {max} knowledge triples from the text below.\n\
             Respond with a JSON array only, no commentary. Each element:\n\
             {{\"subject\": str, \"predicate\": str, \"object\": str, \
             \"subject_type\": str?, \"object_type\": str?}}\n\
             Entity types: {ENTITY_VOCABULARY}\n\
             Relationships: {RELATIONSHIP_VOCABULARY}\n\
             \n\
             Text ({path}):\n{text}",
            max = self.max_triplets_per_chunk,
            path = chunk.source_path,
            text = chunk.text,
        )
    }
}

/// Parse a JSON array of triples, tolerating markdown code fences
fn parse_triples(response: &str) -> Option<Vec<RawTriple>> {
    let trimmed = response.trim();
    let without_fences = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map_or(trimmed, |rest| rest.trim_end_matches("```"));

    // Fall back to the first bracketed span if the model wrapped the array
    // in prose.
    if let Ok(parsed) = serde_json::from_str(without_fences.trim()) {
        return Some(parsed);
    }
    let start = without_fences.find('[')?;
    let end = without_fences.rfind(']')?;
    serde_json::from_str(without_fences.get(start..=end)?).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_brain_providers::{ProviderResult, TextGenerator};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct CannedGenerator(String);

    #[async_trait]
    impl TextGenerator for CannedGenerator {
        async fn generate(&self, _prompt: &str) -> ProviderResult<String> {
            Ok(self.0.clone())
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    fn chunk() -> Chunk {
        Chunk::document("docs/arch.md", 0, "The Indexer calls the Splitter.")
    }

    #[tokio::test]
    async fn parses_and_normalizes_triples() {
        let response = r#"[
            {"subject": "Indexer", "predicate": "CALLS", "object": "Splitter",
             "subject_type": "class", "object_type": "Class"}
        ]"#;
        let extractor = LlmExtractor::new(Arc::new(CannedGenerator(response.to_string())), 10);
        let triples = extractor.extract(&chunk()).await.unwrap();
        assert_eq!(triples.len(), 1);
        assert_eq!(triples[0].predicate, Relationship::Calls);
        assert_eq!(triples[0].subject_type, Some(EntityType::Class));
        assert_eq!(triples[0].chunk_id.as_deref(), Some("docs/arch.md#0"));
    }

    #[tokio::test]
    async fn cap_bounds_extraction() {
        let mut items = Vec::new();
        for i in 0..20 {
            items.push(format!(
                r#"{{"subject": "S{i}", "predicate": "references", "object": "O{i}"}}"#
            ));
        }
        let response = format!("[{}]", items.join(","));
        let extractor = LlmExtractor::new(Arc::new(CannedGenerator(response)), 10);
        let triples = extractor.extract(&chunk()).await.unwrap();
        assert_eq!(triples.len(), 10);
    }

    #[tokio::test]
    async fn code_fences_are_tolerated() {
        let response = "```json\n[{\"subject\": \"A\", \"predicate\": \"imports\", \"object\": \"B\"}]\n```";
        let extractor = LlmExtractor::new(Arc::new(CannedGenerator(response.to_string())), 5);
        let triples = extractor.extract(&chunk()).await.unwrap();
        assert_eq!(triples.len(), 1);
        assert_eq!(triples[0].predicate, Relationship::Imports);
    }

    #[tokio::test]
    async fn garbage_output_degrades_to_empty() {
        let extractor =
            LlmExtractor::new(Arc::new(CannedGenerator("not json at all".to_string())), 5);
        let triples = extractor.extract(&chunk()).await.unwrap();
        assert!(triples.is_empty());
    }

    #[tokio::test]
    async fn unknown_types_stay_free_form() {
        let response =
            r#"[{"subject": "A", "predicate": "mentions", "object": "B", "subject_type": "Widget"}]"#;
        let extractor = LlmExtractor::new(Arc::new(CannedGenerator(response.to_string())), 5);
        let triples = extractor.extract(&chunk()).await.unwrap();
        assert_eq!(
            triples[0].predicate,
            Relationship::Other("mentions".to_string())
        );
        assert_eq!(
            triples[0].subject_type,
            Some(EntityType::Other("Widget".to_string()))
        );
    }
}
