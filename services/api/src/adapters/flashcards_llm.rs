//! services/api/src/adapters/flashcards_llm.rs
//!
//! This module contains the adapter for the flashcard-generating LLM.
//! It implements the `FlashcardGenerationService` port from the `core` crate.

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
    domain::{Flashcard, ModelTier},
    ports::{FlashcardGenerationService, PortError, PortResult},
};

use super::{extract_json_block, ModelCatalog};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `FlashcardGenerationService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiFlashcardsAdapter {
    client: Client<OpenAIConfig>,
    models: ModelCatalog,
}

impl OpenAiFlashcardsAdapter {
    /// Creates a new `OpenAiFlashcardsAdapter`.
    pub fn new(client: Client<OpenAIConfig>, models: ModelCatalog) -> Self {
        Self { client, models }
    }
}

//=========================================================================================
// Response Parsing
//=========================================================================================

#[derive(serde::Deserialize)]
struct FlashcardsPayload {
    flashcards: Vec<serde_json::Value>,
}

/// Parses the model reply into flashcards. Individual malformed items are
/// skipped rather than failing the whole batch; an unparseable reply is an
/// error.
fn parse_flashcards(raw: &str) -> PortResult<Vec<Flashcard>> {
    let block = extract_json_block(raw);
    let items: Vec<serde_json::Value> =
        match serde_json::from_str::<FlashcardsPayload>(block) {
            Ok(payload) => payload.flashcards,
            // some replies are a bare array instead of the documented object
            Err(_) => serde_json::from_str(block)
                .map_err(|e| PortError::Unexpected(format!("Invalid flashcards JSON: {}", e)))?,
        };

    let cards: Vec<Flashcard> = items
        .into_iter()
        .filter_map(|v| serde_json::from_value::<Flashcard>(v).ok())
        .filter(|c| !c.front.trim().is_empty() && !c.back.trim().is_empty())
        .collect();

    if cards.is_empty() {
        return Err(PortError::Unexpected(
            "Flashcards reply contained no usable items.".to_string(),
        ));
    }
    Ok(cards)
}

//=========================================================================================
// `FlashcardGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl FlashcardGenerationService for OpenAiFlashcardsAdapter {
    async fn generate_flashcards(
        &self,
        text: &str,
        language: &str,
        count: usize,
        tier: ModelTier,
    ) -> PortResult<Vec<Flashcard>> {
        let system_prompt = format!(
            "You are a flashcard author for students. From the study material provided by \
             the user, create approximately {count} flashcards in {language}. Each card has a \
             short question or term on the front and a precise answer or definition on the \
             back, with an optional topical category. Respond with ONLY valid JSON in this \
             exact shape, no prose and no code fences: \
             {{\"flashcards\": [{{\"front\": \"...\", \"back\": \"...\", \"category\": \"...\"}}]}}"
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
            .temperature(0.4)
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
                parse_flashcards(&content)
            } else {
                Err(PortError::Unexpected(
                    "Flashcard LLM response contained no text content.".to_string(),
                ))
            }
        } else {
            Err(PortError::Unexpected(
                "Flashcard LLM returned no choices in its response.".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_documented_shape() {
        let raw = r#"{"flashcards": [
            {"front": "Cos'è la fotosintesi?", "back": "Il processo con cui le piante producono glucosio.", "category": "Biologia"},
            {"front": "Cos'è un mitocondrio?", "back": "L'organello che produce ATP."}
        ]}"#;
        let cards = parse_flashcards(raw).unwrap();
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].category.as_deref(), Some("Biologia"));
        assert!(cards[1].category.is_none());
    }

    #[test]
    fn parses_fenced_reply() {
        let raw = "Ecco le flashcard:\n```json\n{\"flashcards\": [{\"front\": \"A?\", \"back\": \"B\"}]}\n```";
        let cards = parse_flashcards(raw).unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].front, "A?");
    }

    #[test]
    fn parses_bare_array_reply() {
        let raw = r#"[{"front": "A?", "back": "B"}]"#;
        assert_eq!(parse_flashcards(raw).unwrap().len(), 1);
    }

    #[test]
    fn skips_malformed_items() {
        let raw = r#"{"flashcards": [
            {"front": "Valida?", "back": "Sì"},
            {"fronte": "campo sbagliato"},
            {"front": "  ", "back": "vuota"}
        ]}"#;
        let cards = parse_flashcards(raw).unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].front, "Valida?");
    }

    #[test]
    fn rejects_reply_with_no_usable_items() {
        assert!(parse_flashcards(r#"{"flashcards": []}"#).is_err());
        assert!(parse_flashcards("Mi dispiace, non posso farlo.").is_err());
    }
}
