//! services/api/src/web/exam.rs
//!
//! Exam simulation generation over an existing session. The standard route
//! makes one quiz call over the truncated text; the ultra route walks the
//! whole document section by section and merges the per-section questions.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use studius_core::{
    domain::{Difficulty, ModelTier, QuizQuestion},
    pricing::{credit_cost, Feature},
    section::{
        cap_items, dedup_by_key, section_item_budget, split_sections, truncate_chars, SplitOptions,
    },
};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::{
    owned_session, port_error_response, process::placeholder_question, state::AppState,
};

/// Document bytes handed to one quiz call.
const EXAM_CONTEXT_LIMIT: usize = 24_000;

/// Section size for the ultra pass.
const ULTRA_SECTION_SIZE: usize = 6_000;

/// Pause between per-section LLM calls, to stay under the upstream rate limit.
const SECTION_DELAY: Duration = Duration::from_millis(1_500);

const DEFAULT_QUESTIONS: usize = 10;
const MAX_QUESTIONS: usize = 30;
const ULTRA_DEFAULT_QUESTIONS: usize = 25;
const ULTRA_MAX_QUESTIONS: usize = 60;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct GenerateExamRequest {
    pub session_id: Uuid,
    /// Desired number of questions; clamped to the route's maximum.
    pub num_questions: Option<usize>,
    /// Target difficulty; omitted means a mixed exam.
    #[schema(value_type = Option<String>)]
    pub difficulty: Option<Difficulty>,
}

#[derive(Serialize, ToSchema)]
pub struct GenerateExamResponse {
    pub session_id: Uuid,
    #[schema(value_type = Vec<Object>)]
    pub questions: Vec<QuizQuestion>,
    pub credits_remaining: i32,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Generate an exam simulation from a session in a single pass.
#[utoipa::path(
    post,
    path = "/api/generate-exam",
    request_body = GenerateExamRequest,
    responses(
        (status = 200, description = "Exam generated", body = GenerateExamResponse),
        (status = 402, description = "Insufficient credits"),
        (status = 404, description = "Session not found"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn generate_exam_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<GenerateExamRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = owned_session(&state, user_id, req.session_id).await?;

    let credits_remaining = state
        .db
        .debit_credits(
            user_id,
            credit_cost(Feature::ExamGeneration, 0, 0),
            Feature::ExamGeneration.slug(),
            Feature::ExamGeneration.ledger_label(),
        )
        .await
        .map_err(port_error_response)?;

    let count = req
        .num_questions
        .unwrap_or(DEFAULT_QUESTIONS)
        .clamp(1, MAX_QUESTIONS);
    let context = truncate_chars(&session.text, EXAM_CONTEXT_LIMIT);

    let questions = state
        .quiz_adapter
        .generate_quiz(
            context,
            &session.language,
            count,
            req.difficulty,
            ModelTier::Standard,
        )
        .await
        .map_err(|e| {
            warn!(session_id = %session.id, "Exam generation failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Non è stato possibile generare la simulazione d'esame.".to_string(),
            )
        })?;

    let questions = cap_items(questions, count);
    state
        .db
        .store_quiz(session.id, &questions)
        .await
        .map_err(port_error_response)?;

    Ok(Json(GenerateExamResponse {
        session_id: session.id,
        questions,
        credits_remaining,
    }))
}

/// Generate an exam simulation over the full document, section by section.
#[utoipa::path(
    post,
    path = "/api/generate-exam-ultra",
    request_body = GenerateExamRequest,
    responses(
        (status = 200, description = "Exam generated", body = GenerateExamResponse),
        (status = 402, description = "Insufficient credits"),
        (status = 404, description = "Session not found"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn generate_exam_ultra_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<GenerateExamRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = owned_session(&state, user_id, req.session_id).await?;

    let credits_remaining = state
        .db
        .debit_credits(
            user_id,
            credit_cost(Feature::ExamGenerationUltra, 0, 0),
            Feature::ExamGenerationUltra.slug(),
            Feature::ExamGenerationUltra.ledger_label(),
        )
        .await
        .map_err(port_error_response)?;

    let total_target = req
        .num_questions
        .unwrap_or(ULTRA_DEFAULT_QUESTIONS)
        .clamp(1, ULTRA_MAX_QUESTIONS);
    let sections = split_sections(&session.text, &SplitOptions::with_target(ULTRA_SECTION_SIZE));
    if sections.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "La sessione non contiene testo da elaborare.".to_string(),
        ));
    }
    let per_section = section_item_budget(total_target, sections.len());
    info!(
        session_id = %session.id,
        sections = sections.len(),
        per_section,
        "Starting ultra exam generation"
    );

    // Sections run strictly in sequence with a pause between calls; one
    // failed section becomes a placeholder question, not a failed exam.
    let mut questions: Vec<QuizQuestion> = Vec::new();
    for (index, section) in sections.iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(SECTION_DELAY).await;
        }
        match state
            .quiz_adapter
            .generate_quiz(
                section,
                &session.language,
                per_section,
                req.difficulty,
                ModelTier::Standard,
            )
            .await
        {
            Ok(batch) => questions.extend(batch),
            Err(e) => {
                warn!(
                    session_id = %session.id,
                    section = index + 1,
                    "Section quiz generation failed: {e}"
                );
                questions.push(placeholder_question(Some(index + 1)));
            }
        }
    }

    let mut questions = dedup_by_key(questions, |q| q.question.as_str());
    // stable sort keeps section order within the same difficulty
    questions.sort_by_key(|q| q.difficulty);
    let questions = cap_items(questions, ULTRA_MAX_QUESTIONS);

    state
        .db
        .store_quiz(session.id, &questions)
        .await
        .map_err(port_error_response)?;

    Ok(Json(GenerateExamResponse {
        session_id: session.id,
        questions,
        credits_remaining,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(text: &str, difficulty: Difficulty) -> QuizQuestion {
        QuizQuestion {
            question: text.to_string(),
            option_a: "A".to_string(),
            option_b: "B".to_string(),
            option_c: "C".to_string(),
            option_d: "D".to_string(),
            correct_option: "A".to_string(),
            explanation: None,
            difficulty,
        }
    }

    #[test]
    fn merge_dedups_sorts_and_caps() {
        let merged = vec![
            question("Cos'è X?", Difficulty::Hard),
            question("cos'è x? ", Difficulty::Easy),
            question("Cos'è Y?", Difficulty::Easy),
            question("Cos'è Z?", Difficulty::Medium),
        ];
        let mut deduped = dedup_by_key(merged, |q| q.question.as_str());
        assert_eq!(deduped.len(), 3);
        // the first occurrence wins, including its difficulty
        assert_eq!(deduped[0].difficulty, Difficulty::Hard);

        deduped.sort_by_key(|q| q.difficulty);
        let capped = cap_items(deduped, 2);
        assert_eq!(capped.len(), 2);
        assert_eq!(capped[0].difficulty, Difficulty::Easy);
        assert_eq!(capped[1].difficulty, Difficulty::Medium);
    }

    #[test]
    fn request_difficulty_parses_leniently() {
        let req: GenerateExamRequest = serde_json::from_str(
            r#"{"session_id": "6f0b8f7e-17a5-44f0-9d59-14573df17c4d", "difficulty": "difficile"}"#,
        )
        .unwrap();
        assert_eq!(req.difficulty, Some(Difficulty::Hard));
        assert!(req.num_questions.is_none());
    }
}
