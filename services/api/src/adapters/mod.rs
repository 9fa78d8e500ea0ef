pub mod concept_map_llm;
pub mod db;
pub mod exam_guide_llm;
pub mod flashcards_llm;
pub mod parse_api;
pub mod paypal;
pub mod pdf_local;
pub mod quiz_llm;
pub mod summary_llm;

pub use concept_map_llm::OpenAiConceptMapAdapter;
pub use db::DbAdapter;
pub use exam_guide_llm::OpenAiExamGuideAdapter;
pub use flashcards_llm::OpenAiFlashcardsAdapter;
pub use parse_api::ParseApiAdapter;
pub use paypal::PayPalAdapter;
pub use pdf_local::LocalPdfExtractor;
pub use quiz_llm::OpenAiQuizAdapter;
pub use summary_llm::OpenAiSummaryAdapter;

use studius_core::domain::ModelTier;

/// Model names for each generation tier, loaded from configuration and
/// shared by all LLM adapters.
#[derive(Clone)]
pub struct ModelCatalog {
    pub standard: String,
    pub eco: String,
    pub premium: String,
}

impl ModelCatalog {
    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Standard => &self.standard,
            ModelTier::Eco => &self.eco,
            ModelTier::Premium => &self.premium,
        }
    }
}

/// Cuts a model reply down to the JSON it should contain. Handles replies
/// wrapped in ``` fences and replies with prose around the JSON body.
pub(crate) fn extract_json_block(raw: &str) -> &str {
    let trimmed = raw.trim();
    let fence_body = trimmed
        .find("```json")
        .map(|i| i + 7)
        .or_else(|| trimmed.find("```").map(|i| i + 3));
    if let Some(start) = fence_body {
        let body = &trimmed[start..];
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }
    let object_start = trimmed.find(['{', '[']);
    let object_end = trimmed.rfind(['}', ']']);
    if let (Some(start), Some(end)) = (object_start, object_end) {
        if start < end {
            return trimmed[start..=end].trim();
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_json() {
        let raw = "Ecco il risultato:\n```json\n{\"a\": 1}\n```\nSpero sia utile!";
        assert_eq!(extract_json_block(raw), "{\"a\": 1}");
    }

    #[test]
    fn extracts_bare_fence_without_language_tag() {
        let raw = "```\n[1, 2, 3]\n```";
        assert_eq!(extract_json_block(raw), "[1, 2, 3]");
    }

    #[test]
    fn extracts_json_surrounded_by_prose() {
        let raw = "Certo! {\"flashcards\": []} — fammi sapere.";
        assert_eq!(extract_json_block(raw), "{\"flashcards\": []}");
    }

    #[test]
    fn passes_through_clean_json() {
        assert_eq!(extract_json_block("  {\"x\": true} "), "{\"x\": true}");
    }
}
