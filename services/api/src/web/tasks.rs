//! services/api/src/web/tasks.rs
//!
//! The long-running generation jobs ("Ultra Flashcards" and "Ultra Summary")
//! and their polling endpoint. Enqueueing writes a `generation_jobs` row and
//! spawns the runner; clients follow the job through `GET /api/tasks/{id}`.
//!
//! The runner claims the job with a single conditional UPDATE, so a job can
//! never be started twice, and merges progress into the job metadata with an
//! atomic jsonb patch after every section.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use studius_core::{
    domain::{Flashcard, GenerationJob, ModelTier, TaskType, TutorSession},
    ports::{PortError, PortResult},
    pricing::{credit_cost, Feature},
    section::{
        cap_items, dedup_by_key, scaled_target, section_item_budget, split_sections, SplitOptions,
    },
};
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::{
    owned_session, port_error_response, process::placeholder_flashcard, state::AppState,
};

/// Section size for the ultra passes.
const ULTRA_SECTION_SIZE: usize = 6_000;

/// Pause between per-section LLM calls, to stay under the upstream rate limit.
const SECTION_DELAY: Duration = Duration::from_millis(1_500);

/// A job body is re-run once before the job is marked failed.
const MAX_ATTEMPTS: i32 = 2;

/// Flashcard budget for the ultra pass: one card per 1,500 bytes of text,
/// between 30 and 150 in total.
const ULTRA_CARDS_PER_CHARS: usize = 1_500;
const ULTRA_CARDS_MIN: usize = 30;
const ULTRA_CARDS_MAX: usize = 150;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct StartTaskRequest {
    pub session_id: Uuid,
}

/// The 202 payload returned when a job is enqueued.
#[derive(Serialize, ToSchema)]
pub struct TaskStartedResponse {
    pub task_id: Uuid,
    pub task_type: String,
    pub status: String,
    pub poll_url: String,
    pub credits_remaining: i32,
}

#[derive(Serialize, ToSchema)]
pub struct TaskStatusResponse {
    pub task_id: Uuid,
    pub session_id: Uuid,
    pub task_type: String,
    pub status: String,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub error: Option<String>,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Start an Ultra Flashcards job over a session.
#[utoipa::path(
    post,
    path = "/api/generate-ultra-flashcards",
    request_body = StartTaskRequest,
    responses(
        (status = 202, description = "Job enqueued", body = TaskStartedResponse),
        (status = 400, description = "A job of this type is already running"),
        (status = 402, description = "Insufficient credits"),
        (status = 404, description = "Session not found")
    )
)]
pub async fn start_ultra_flashcards_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<StartTaskRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    start_task(state, user_id, req.session_id, TaskType::UltraFlashcards).await
}

/// Start an Ultra Summary job over a session.
#[utoipa::path(
    post,
    path = "/api/generate-ultra-summary",
    request_body = StartTaskRequest,
    responses(
        (status = 202, description = "Job enqueued", body = TaskStartedResponse),
        (status = 400, description = "A job of this type is already running"),
        (status = 402, description = "Insufficient credits"),
        (status = 404, description = "Session not found")
    )
)]
pub async fn start_ultra_summary_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<StartTaskRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    start_task(state, user_id, req.session_id, TaskType::UltraSummary).await
}

/// Poll a generation job.
#[utoipa::path(
    get,
    path = "/api/tasks/{task_id}",
    params(("task_id" = Uuid, Path, description = "The job to poll")),
    responses(
        (status = 200, description = "Current job state", body = TaskStatusResponse),
        (status = 404, description = "Job not found")
    )
)]
pub async fn task_status_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(task_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let job = state
        .db
        .get_job(task_id)
        .await
        .map_err(port_error_response)?;
    if job.user_id != user_id {
        return Err((
            StatusCode::NOT_FOUND,
            "Attività non trovata.".to_string(),
        ));
    }
    Ok(Json(TaskStatusResponse {
        task_id: job.id,
        session_id: job.session_id,
        task_type: job.task_type.as_str().to_string(),
        status: job.status.as_str().to_string(),
        metadata: job.metadata,
        error: job.error,
    }))
}

fn feature_for(task_type: TaskType) -> Feature {
    match task_type {
        TaskType::UltraFlashcards => Feature::UltraFlashcards,
        TaskType::UltraSummary => Feature::UltraSummary,
    }
}

async fn start_task(
    state: Arc<AppState>,
    user_id: Uuid,
    session_id: Uuid,
    task_type: TaskType,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = owned_session(&state, user_id, session_id).await?;
    if session.text.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "La sessione non contiene testo da elaborare.".to_string(),
        ));
    }

    if let Some(active) = state
        .db
        .find_active_job(session.id, task_type)
        .await
        .map_err(port_error_response)?
    {
        return Err((
            StatusCode::BAD_REQUEST,
            format!(
                "Un'elaborazione di questo tipo è già in corso per questa sessione (attività {}).",
                active.id
            ),
        ));
    }

    let feature = feature_for(task_type);
    let credits_remaining = state
        .db
        .debit_credits(
            user_id,
            credit_cost(feature, 0, 0),
            feature.slug(),
            feature.ledger_label(),
        )
        .await
        .map_err(port_error_response)?;

    let job = state
        .db
        .enqueue_job(session.id, user_id, task_type)
        .await
        .map_err(port_error_response)?;
    info!(job_id = %job.id, task_type = task_type.as_str(), "Generation job enqueued");

    tokio::spawn(run_generation_job(state.clone(), job.id));

    Ok((
        StatusCode::ACCEPTED,
        Json(TaskStartedResponse {
            task_id: job.id,
            task_type: task_type.as_str().to_string(),
            status: job.status.as_str().to_string(),
            poll_url: format!("/api/tasks/{}", job.id),
            credits_remaining,
        }),
    ))
}

//=========================================================================================
// The Job Runner
//=========================================================================================

/// Runs one generation job to completion. The claim is the gate against
/// double-starting; a claimed body that fails is retried once, then the job
/// is marked failed with the error recorded.
pub async fn run_generation_job(state: Arc<AppState>, job_id: Uuid) {
    let claimed = match state.db.claim_job(job_id).await {
        Ok(claimed) => claimed,
        Err(e) => {
            error!(job_id = %job_id, "Could not claim job: {e}");
            return;
        }
    };
    if !claimed {
        info!(job_id = %job_id, "Job was already claimed, skipping");
        return;
    }

    let job = match state.db.get_job(job_id).await {
        Ok(job) => job,
        Err(e) => {
            error!(job_id = %job_id, "Could not load claimed job: {e}");
            return;
        }
    };

    for attempt in 1..=MAX_ATTEMPTS {
        match run_job_body(&state, &job).await {
            Ok(()) => {
                if let Err(e) = state.db.complete_job(job_id).await {
                    error!(job_id = %job_id, "Could not mark job completed: {e}");
                }
                info!(job_id = %job_id, attempt, "Generation job completed");
                return;
            }
            Err(e) if attempt < MAX_ATTEMPTS => {
                warn!(job_id = %job_id, attempt, "Job attempt failed, retrying: {e}");
                if let Err(e) = state.db.record_job_retry(job_id).await {
                    error!(job_id = %job_id, "Could not record retry: {e}");
                }
            }
            Err(e) => {
                error!(job_id = %job_id, "Job failed after {attempt} attempts: {e}");
                if let Err(e) = state.db.fail_job(job_id, &e.to_string()).await {
                    error!(job_id = %job_id, "Could not mark job failed: {e}");
                }
                return;
            }
        }
    }
}

async fn run_job_body(state: &AppState, job: &GenerationJob) -> PortResult<()> {
    let session = state.db.get_tutor_session(job.session_id).await?;
    let sections = split_sections(&session.text, &SplitOptions::with_target(ULTRA_SECTION_SIZE));
    if sections.is_empty() {
        return Err(PortError::Unexpected(
            "La sessione non contiene testo da elaborare.".to_string(),
        ));
    }

    state
        .db
        .merge_job_metadata(
            job.id,
            &json!({ "sections_total": sections.len(), "sections_done": 0 }),
        )
        .await?;

    match job.task_type {
        TaskType::UltraFlashcards => run_ultra_flashcards(state, job, &session, &sections).await,
        TaskType::UltraSummary => run_ultra_summary(state, job, &session, &sections).await,
    }
}

async fn run_ultra_flashcards(
    state: &AppState,
    job: &GenerationJob,
    session: &TutorSession,
    sections: &[String],
) -> PortResult<()> {
    let total_target = scaled_target(
        session.text.len(),
        ULTRA_CARDS_PER_CHARS,
        ULTRA_CARDS_MIN,
        ULTRA_CARDS_MAX,
    );
    let per_section = section_item_budget(total_target, sections.len());

    let mut cards: Vec<Flashcard> = Vec::new();
    for (index, section) in sections.iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(SECTION_DELAY).await;
        }
        match state
            .flashcards_adapter
            .generate_flashcards(section, &session.language, per_section, ModelTier::Standard)
            .await
        {
            Ok(batch) => cards.extend(batch),
            Err(e) => {
                warn!(
                    job_id = %job.id,
                    section = index + 1,
                    "Section flashcard generation failed: {e}"
                );
                cards.push(placeholder_flashcard(Some(index + 1)));
            }
        }
        state
            .db
            .merge_job_metadata(job.id, &json!({ "sections_done": index + 1 }))
            .await?;
    }

    let cards = dedup_by_key(cards, |c| c.front.as_str());
    let cards = cap_items(cards, ULTRA_CARDS_MAX);

    state.db.store_flashcards(session.id, &cards).await?;
    state
        .db
        .merge_job_metadata(job.id, &json!({ "cards_generated": cards.len() }))
        .await?;
    Ok(())
}

async fn run_ultra_summary(
    state: &AppState,
    job: &GenerationJob,
    session: &TutorSession,
    sections: &[String],
) -> PortResult<()> {
    let mut parts: Vec<String> = Vec::new();
    for (index, section) in sections.iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(SECTION_DELAY).await;
        }
        let body = match state
            .summary_adapter
            .generate_summary(section, &session.language, ModelTier::Standard)
            .await
        {
            Ok(summary) => summary,
            Err(e) => {
                warn!(
                    job_id = %job.id,
                    section = index + 1,
                    "Section summary generation failed: {e}"
                );
                "*Questa sezione non è stata elaborata.*".to_string()
            }
        };
        if sections.len() > 1 {
            parts.push(format!("## Parte {}\n\n{}", index + 1, body));
        } else {
            parts.push(body);
        }
        state
            .db
            .merge_job_metadata(job.id, &json!({ "sections_done": index + 1 }))
            .await?;
    }

    let summary = parts.join("\n\n");
    state.db.store_summary(session.id, &summary).await?;
    state
        .db
        .merge_job_metadata(job.id, &json!({ "summary_chars": summary.len() }))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ultra_card_budget_scales_and_clamps() {
        assert_eq!(
            scaled_target(10_000, ULTRA_CARDS_PER_CHARS, ULTRA_CARDS_MIN, ULTRA_CARDS_MAX),
            30
        );
        assert_eq!(
            scaled_target(90_000, ULTRA_CARDS_PER_CHARS, ULTRA_CARDS_MIN, ULTRA_CARDS_MAX),
            60
        );
        assert_eq!(
            scaled_target(1_000_000, ULTRA_CARDS_PER_CHARS, ULTRA_CARDS_MIN, ULTRA_CARDS_MAX),
            150
        );
    }

    #[test]
    fn features_match_task_types() {
        assert_eq!(feature_for(TaskType::UltraFlashcards), Feature::UltraFlashcards);
        assert_eq!(feature_for(TaskType::UltraSummary), Feature::UltraSummary);
    }

    #[test]
    fn merged_cards_never_exceed_the_cap() {
        let cards: Vec<Flashcard> = (0..400)
            .map(|i| Flashcard {
                front: format!("Domanda {i}"),
                back: "Risposta".to_string(),
                category: None,
            })
            .collect();
        let merged = cap_items(dedup_by_key(cards, |c| c.front.as_str()), ULTRA_CARDS_MAX);
        assert_eq!(merged.len(), ULTRA_CARDS_MAX);
    }
}
