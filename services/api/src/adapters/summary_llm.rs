//! services/api/src/adapters/summary_llm.rs
//!
//! This module contains the adapter for the summary-generating LLM.
//! It implements the `SummaryGenerationService` port from the `core` crate.

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
use regex::Regex;
use studius_core::{
    domain::ModelTier,
    ports::{PortError, PortResult, SummaryGenerationService},
};

use super::ModelCatalog;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `SummaryGenerationService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiSummaryAdapter {
    client: Client<OpenAIConfig>,
    models: ModelCatalog,
}

impl OpenAiSummaryAdapter {
    /// Creates a new `OpenAiSummaryAdapter`.
    pub fn new(client: Client<OpenAIConfig>, models: ModelCatalog) -> Self {
        Self { client, models }
    }
}

/// Removes a wrapping markdown fence and collapses runs of blank lines.
fn clean_summary(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(stripped) = text.strip_prefix("```markdown") {
        text = stripped;
    } else if let Some(stripped) = text.strip_prefix("```") {
        text = stripped;
    }
    text = text.strip_suffix("```").unwrap_or(text).trim();
    let blank_runs = Regex::new(r"\n{3,}").unwrap();
    blank_runs.replace_all(text, "\n\n").into_owned()
}

//=========================================================================================
// `SummaryGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl SummaryGenerationService for OpenAiSummaryAdapter {
    /// Generates a structured markdown summary of the provided study material.
    async fn generate_summary(
        &self,
        text: &str,
        language: &str,
        tier: ModelTier,
    ) -> PortResult<String> {
        let system_prompt = format!(
            "You are an expert study assistant. Summarize the study material provided by \
             the user into a thorough, well-structured markdown document: use `##` headings \
             for the main topics, bullet points for details, and bold for key terms and \
             definitions. Cover every major topic in the material. Write entirely in \
             {language}. Output only the summary, with no preamble and no code fences."
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

        // Extract the text content from the first choice in the response.
        if let Some(choice) = response.choices.into_iter().next() {
            if let Some(content) = choice.message.content {
                Ok(clean_summary(&content))
            } else {
                Err(PortError::Unexpected(
                    "Summary LLM response contained no text content.".to_string(),
                ))
            }
        } else {
            Err(PortError::Unexpected(
                "Summary LLM returned no choices in its response.".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_summary_strips_markdown_fence() {
        let raw = "```markdown\n## Fotosintesi\n\n- Le piante producono glucosio\n```";
        assert_eq!(
            clean_summary(raw),
            "## Fotosintesi\n\n- Le piante producono glucosio"
        );
    }

    #[test]
    fn clean_summary_collapses_blank_runs() {
        let raw = "## Parte 1\n\n\n\nTesto";
        assert_eq!(clean_summary(raw), "## Parte 1\n\nTesto");
    }

    #[test]
    fn clean_summary_leaves_plain_text_alone() {
        assert_eq!(clean_summary("## Titolo\n\nTesto"), "## Titolo\n\nTesto");
    }
}
