//! services/api/src/adapters/quiz_llm.rs
//!
//! This module contains the adapter for the quiz-generating LLM.
//! It implements the `QuizGenerationService` port from the `core` crate.

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
    domain::{Difficulty, ModelTier, QuizQuestion},
    ports::{PortError, PortResult, QuizGenerationService},
};

use super::{extract_json_block, ModelCatalog};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `QuizGenerationService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiQuizAdapter {
    client: Client<OpenAIConfig>,
    models: ModelCatalog,
}

impl OpenAiQuizAdapter {
    /// Creates a new `OpenAiQuizAdapter`.
    pub fn new(client: Client<OpenAIConfig>, models: ModelCatalog) -> Self {
        Self { client, models }
    }
}

//=========================================================================================
// Response Parsing
//=========================================================================================

#[derive(serde::Deserialize)]
struct QuizPayload {
    questions: Vec<serde_json::Value>,
}

/// Normalizes a correct-option marker ("b", " C)", "Option D") to a single
/// letter A-D, or rejects the question.
fn normalize_option(raw: &str) -> Option<String> {
    let letter = raw
        .chars()
        .find(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase())?;
    if ('A'..='D').contains(&letter) {
        Some(letter.to_string())
    } else {
        None
    }
}

/// Parses the model reply into quiz questions. Items with a missing or
/// unusable answer key are skipped; an unparseable reply is an error.
fn parse_quiz(raw: &str) -> PortResult<Vec<QuizQuestion>> {
    let block = extract_json_block(raw);
    let items: Vec<serde_json::Value> = match serde_json::from_str::<QuizPayload>(block) {
        Ok(payload) => payload.questions,
        Err(_) => serde_json::from_str(block)
            .map_err(|e| PortError::Unexpected(format!("Invalid quiz JSON: {}", e)))?,
    };

    let questions: Vec<QuizQuestion> = items
        .into_iter()
        .filter_map(|v| serde_json::from_value::<QuizQuestion>(v).ok())
        .filter_map(|mut q| {
            q.correct_option = normalize_option(&q.correct_option)?;
            if q.question.trim().is_empty() {
                return None;
            }
            Some(q)
        })
        .collect();

    if questions.is_empty() {
        return Err(PortError::Unexpected(
            "Quiz reply contained no usable questions.".to_string(),
        ));
    }
    Ok(questions)
}

//=========================================================================================
// `QuizGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl QuizGenerationService for OpenAiQuizAdapter {
    async fn generate_quiz(
        &self,
        text: &str,
        language: &str,
        count: usize,
        difficulty: Option<Difficulty>,
        tier: ModelTier,
    ) -> PortResult<Vec<QuizQuestion>> {
        let difficulty_clause = match difficulty {
            Some(Difficulty::Easy) => "All questions must be Easy difficulty.".to_string(),
            Some(Difficulty::Medium) => "All questions must be Medium difficulty.".to_string(),
            Some(Difficulty::Hard) => "All questions must be Hard difficulty.".to_string(),
            None => "Mix Easy, Medium and Hard questions.".to_string(),
        };
        let system_prompt = format!(
            "You are an exam author. From the study material provided by the user, write \
             approximately {count} multiple-choice questions in {language}, each with exactly \
             four options and one correct answer. {difficulty_clause} Label every question \
             with its difficulty (Easy, Medium or Hard) and add a one-sentence explanation of \
             the correct answer. Respond with ONLY valid JSON in this exact shape, no prose \
             and no code fences: {{\"questions\": [{{\"question\": \"...\", \"option_a\": \"...\", \
             \"option_b\": \"...\", \"option_c\": \"...\", \"option_d\": \"...\", \
             \"correct_option\": \"A\", \"explanation\": \"...\", \"difficulty\": \"Medium\"}}]}}"
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
                parse_quiz(&content)
            } else {
                Err(PortError::Unexpected(
                    "Quiz LLM response contained no text content.".to_string(),
                ))
            }
        } else {
            Err(PortError::Unexpected(
                "Quiz LLM returned no choices in its response.".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question_json(correct: &str, difficulty: &str) -> String {
        format!(
            r#"{{"question": "Qual è la funzione dei ribosomi?",
                "option_a": "Sintesi proteica", "option_b": "Respirazione",
                "option_c": "Fotosintesi", "option_d": "Digestione",
                "correct_option": "{correct}", "explanation": "I ribosomi sintetizzano le proteine.",
                "difficulty": "{difficulty}"}}"#
        )
    }

    #[test]
    fn parses_and_keeps_fields() {
        let raw = format!(r#"{{"questions": [{}]}}"#, question_json("A", "Easy"));
        let questions = parse_quiz(&raw).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].correct_option, "A");
        assert_eq!(questions[0].difficulty, Difficulty::Easy);
        assert!(questions[0].explanation.is_some());
    }

    #[test]
    fn normalizes_sloppy_answer_keys() {
        let raw = format!(
            r#"{{"questions": [{}, {}]}}"#,
            question_json("b)", "Medium"),
            question_json("Option D", "Hard")
        );
        let questions = parse_quiz(&raw).unwrap();
        assert_eq!(questions[0].correct_option, "B");
        assert_eq!(questions[1].correct_option, "D");
    }

    #[test]
    fn drops_questions_with_unusable_answer_key() {
        let raw = format!(
            r#"{{"questions": [{}, {}]}}"#,
            question_json("E", "Easy"),
            question_json("C", "Easy")
        );
        let questions = parse_quiz(&raw).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].correct_option, "C");
    }

    #[test]
    fn unknown_difficulty_defaults_to_medium() {
        let raw = format!(r#"{{"questions": [{}]}}"#, question_json("A", "impossibile"));
        let questions = parse_quiz(&raw).unwrap();
        assert_eq!(questions[0].difficulty, Difficulty::Medium);
    }

    #[test]
    fn rejects_unparseable_reply() {
        assert!(parse_quiz("Nessuna domanda disponibile.").is_err());
        assert!(parse_quiz(r#"{"questions": []}"#).is_err());
    }
}
