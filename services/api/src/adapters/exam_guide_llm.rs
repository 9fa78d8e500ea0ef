//! services/api/src/adapters/exam_guide_llm.rs
//!
//! This module contains the adapter for the exam-guide-generating LLM.
//! It implements the `ExamGuideGenerationService` port from the `core` crate.

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
    domain::ModelTier,
    ports::{ExamGuideGenerationService, PortError, PortResult},
};

use super::ModelCatalog;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ExamGuideGenerationService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiExamGuideAdapter {
    client: Client<OpenAIConfig>,
    models: ModelCatalog,
}

impl OpenAiExamGuideAdapter {
    /// Creates a new `OpenAiExamGuideAdapter`.
    pub fn new(client: Client<OpenAIConfig>, models: ModelCatalog) -> Self {
        Self { client, models }
    }
}

//=========================================================================================
// `ExamGuideGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ExamGuideGenerationService for OpenAiExamGuideAdapter {
    /// Generates a markdown exam-preparation guide for the provided material.
    async fn generate_exam_guide(
        &self,
        text: &str,
        language: &str,
        tier: ModelTier,
    ) -> PortResult<String> {
        let system_prompt = format!(
            "You are a university tutor preparing a student for an exam on the material \
             provided by the user. Produce a markdown exam guide with these sections: the \
             key topics ranked by importance, the questions most likely to be asked, the \
             definitions worth memorizing word for word, and a short study plan. Write \
             entirely in {language}. Output only the guide, with no preamble and no code \
             fences."
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
                Ok(content.trim().to_string())
            } else {
                Err(PortError::Unexpected(
                    "Exam guide LLM response contained no text content.".to_string(),
                ))
            }
        } else {
            Err(PortError::Unexpected(
                "Exam guide LLM returned no choices in its response.".to_string(),
            ))
        }
    }
}
