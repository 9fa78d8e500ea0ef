//! services/api/src/adapters/concept_map_llm.rs
//!
//! This module contains the adapter for the concept-map-generating LLM.
//! It implements the `ConceptMapGenerationService` port from the `core` crate.

use std::collections::HashSet;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use studius_core::{
    domain::{ConceptEdge, ConceptMap, ConceptNode, ModelTier},
    ports::{ConceptMapGenerationService, PortError, PortResult},
};

use super::{extract_json_block, ModelCatalog};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ConceptMapGenerationService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiConceptMapAdapter {
    client: Client<OpenAIConfig>,
    models: ModelCatalog,
}

impl OpenAiConceptMapAdapter {
    /// Creates a new `OpenAiConceptMapAdapter`.
    pub fn new(client: Client<OpenAIConfig>, models: ModelCatalog) -> Self {
        Self { client, models }
    }
}

//=========================================================================================
// Response Parsing
//=========================================================================================

#[derive(serde::Deserialize)]
struct ConceptMapPayload {
    #[serde(default)]
    nodes: Vec<serde_json::Value>,
    #[serde(default)]
    edges: Vec<serde_json::Value>,
}

/// Parses the model reply into a concept map. Duplicate node ids keep their
/// first occurrence and edges referencing unknown nodes are dropped.
fn parse_concept_map(raw: &str) -> PortResult<ConceptMap> {
    let block = extract_json_block(raw);
    let payload: ConceptMapPayload = serde_json::from_str(block)
        .map_err(|e| PortError::Unexpected(format!("Invalid concept map JSON: {}", e)))?;

    let mut seen = HashSet::new();
    let nodes: Vec<ConceptNode> = payload
        .nodes
        .into_iter()
        .filter_map(|v| serde_json::from_value::<ConceptNode>(v).ok())
        .filter(|n| !n.id.trim().is_empty() && !n.label.trim().is_empty())
        .filter(|n| seen.insert(n.id.clone()))
        .collect();

    let edges: Vec<ConceptEdge> = payload
        .edges
        .into_iter()
        .filter_map(|v| serde_json::from_value::<ConceptEdge>(v).ok())
        .filter(|e| seen.contains(&e.from) && seen.contains(&e.to))
        .collect();

    if nodes.is_empty() {
        return Err(PortError::Unexpected(
            "Concept map reply contained no usable nodes.".to_string(),
        ));
    }
    Ok(ConceptMap { nodes, edges })
}

//=========================================================================================
// `ConceptMapGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ConceptMapGenerationService for OpenAiConceptMapAdapter {
    async fn generate_concept_map(
        &self,
        text: &str,
        language: &str,
        tier: ModelTier,
    ) -> PortResult<ConceptMap> {
        let system_prompt = format!(
            "You are a knowledge mapper. From the study material provided by the user, build \
             a concept map of the 10-25 most important concepts and how they relate. Node \
             labels and edge labels are written in {language}; ids are short slugs. Respond \
             with ONLY valid JSON in this exact shape, no prose and no code fences: \
             {{\"nodes\": [{{\"id\": \"n1\", \"label\": \"...\"}}], \
             \"edges\": [{{\"from\": \"n1\", \"to\": \"n2\", \"label\": \"...\"}}]}}"
        );

        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_prompt)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(text.to_string())
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.models.model_for(tier))
            .messages(messages)
            .temperature(0.3)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        if let Some(choice) = response.choices.into_iter().next() {
            if let Some(content) = choice.message.content {
                parse_concept_map(&content)
            } else {
                Err(PortError::Unexpected(
                    "Concept map LLM response contained no text content.".to_string(),
                ))
            }
        } else {
            Err(PortError::Unexpected(
                "Concept map LLM returned no choices in its response.".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nodes_and_edges() {
        let raw = r#"{
            "nodes": [
                {"id": "cellula", "label": "Cellula"},
                {"id": "nucleo", "label": "Nucleo"}
            ],
            "edges": [
                {"from": "cellula", "to": "nucleo", "label": "contiene"}
            ]
        }"#;
        let map = parse_concept_map(raw).unwrap();
        assert_eq!(map.nodes.len(), 2);
        assert_eq!(map.edges.len(), 1);
        assert_eq!(map.edges[0].label.as_deref(), Some("contiene"));
    }

    #[test]
    fn drops_duplicate_nodes_and_dangling_edges() {
        let raw = r#"{
            "nodes": [
                {"id": "a", "label": "Primo"},
                {"id": "a", "label": "Doppione"},
                {"id": "b", "label": "Secondo"}
            ],
            "edges": [
                {"from": "a", "to": "b"},
                {"from": "a", "to": "manca"}
            ]
        }"#;
        let map = parse_concept_map(raw).unwrap();
        assert_eq!(map.nodes.len(), 2);
        assert_eq!(map.nodes[0].label, "Primo");
        assert_eq!(map.edges.len(), 1);
    }

    #[test]
    fn edges_are_optional() {
        let raw = r#"{"nodes": [{"id": "x", "label": "Solo"}]}"#;
        let map = parse_concept_map(raw).unwrap();
        assert!(map.edges.is_empty());
    }

    #[test]
    fn rejects_map_without_nodes() {
        assert!(parse_concept_map(r#"{"nodes": [], "edges": []}"#).is_err());
        assert!(parse_concept_map("non valido").is_err());
    }
}
