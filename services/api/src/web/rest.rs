//! services/api/src/web/rest.rs
//!
//! Dashboard and billing handlers (sessions, credits, PayPal capture) and the
//! master definition for the OpenAPI specification.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use studius_core::{
    domain::{ConceptMap, Flashcard, QuizQuestion, TutorSession, TutorSessionSummary},
    pricing::{credit_cost, pack_for_amount, Feature},
};
use tracing::{info, warn};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::web::{auth, exam, owned_session, port_error_response, process, state::AppState, stripe, tasks};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        process::process_pdf_handler,
        process::process_pdf_eco_handler,
        process::process_pdf_ocr_handler,
        process::process_pdf_premium_handler,
        process::process_pdf_raw_handler,
        exam::generate_exam_handler,
        exam::generate_exam_ultra_handler,
        tasks::start_ultra_flashcards_handler,
        tasks::start_ultra_summary_handler,
        tasks::task_status_handler,
        stripe::stripe_webhook_handler,
        list_sessions_handler,
        get_session_handler,
        credits_handler,
        consume_credits_handler,
        paypal_capture_handler,
    ),
    components(
        schemas(
            auth::SignupRequest,
            auth::LoginRequest,
            auth::AuthResponse,
            process::ProcessPdfResponse,
            exam::GenerateExamRequest,
            exam::GenerateExamResponse,
            tasks::StartTaskRequest,
            tasks::TaskStartedResponse,
            tasks::TaskStatusResponse,
            SessionSummaryResponse,
            SessionResponse,
            CreditsResponse,
            CreditEntryResponse,
            ConsumeCreditsRequest,
            ConsumeCreditsResponse,
            PayPalCaptureRequest,
            PayPalCaptureResponse,
        )
    ),
    tags(
        (name = "StudiusAI API", description = "Study material generation, credits and billing.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Sessions
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct SessionSummaryResponse {
    pub session_id: Uuid,
    pub title: String,
    pub source_filename: String,
    pub language: String,
    pub page_count: i32,
    pub created_at: DateTime<Utc>,
}

impl From<TutorSessionSummary> for SessionSummaryResponse {
    fn from(s: TutorSessionSummary) -> Self {
        Self {
            session_id: s.id,
            title: s.title,
            source_filename: s.source_filename,
            language: s.language,
            page_count: s.page_count,
            created_at: s.created_at,
        }
    }
}

/// A full session with its document text and every generated artifact.
#[derive(Serialize, ToSchema)]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub title: String,
    pub source_filename: String,
    pub language: String,
    pub page_count: i32,
    pub file_size_bytes: i64,
    pub text: String,
    pub summary: Option<String>,
    #[schema(value_type = Option<Vec<Object>>)]
    pub flashcards: Option<Vec<Flashcard>>,
    #[schema(value_type = Option<Vec<Object>>)]
    pub quiz: Option<Vec<QuizQuestion>>,
    #[schema(value_type = Option<Object>)]
    pub concept_map: Option<ConceptMap>,
    pub exam_guide: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<TutorSession> for SessionResponse {
    fn from(s: TutorSession) -> Self {
        Self {
            session_id: s.id,
            title: s.title,
            source_filename: s.source_filename,
            language: s.language,
            page_count: s.page_count,
            file_size_bytes: s.file_size_bytes,
            text: s.text,
            summary: s.summary,
            flashcards: s.flashcards,
            quiz: s.quiz,
            concept_map: s.concept_map,
            exam_guide: s.exam_guide,
            created_at: s.created_at,
        }
    }
}

/// List the caller's study sessions, newest first.
#[utoipa::path(
    get,
    path = "/api/sessions",
    responses(
        (status = 200, description = "The caller's sessions", body = [SessionSummaryResponse]),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_sessions_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let sessions = state
        .db
        .list_tutor_sessions(user_id)
        .await
        .map_err(port_error_response)?;
    let sessions: Vec<SessionSummaryResponse> =
        sessions.into_iter().map(Into::into).collect();
    Ok(Json(sessions))
}

/// Fetch one session with its materials.
#[utoipa::path(
    get,
    path = "/api/sessions/{session_id}",
    params(("session_id" = Uuid, Path, description = "The session to fetch")),
    responses(
        (status = 200, description = "The session", body = SessionResponse),
        (status = 404, description = "Session not found")
    )
)]
pub async fn get_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = owned_session(&state, user_id, session_id).await?;
    Ok(Json(SessionResponse::from(session)))
}

//=========================================================================================
// Credits
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct CreditEntryResponse {
    pub amount: i32,
    pub feature: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
pub struct CreditsResponse {
    pub credits: i32,
    pub plan: String,
    pub subscription_active: bool,
    pub history: Vec<CreditEntryResponse>,
}

/// Current balance and recent ledger entries.
#[utoipa::path(
    get,
    path = "/api/credits",
    responses(
        (status = 200, description = "Balance and recent movements", body = CreditsResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn credits_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user = state.db.get_user(user_id).await.map_err(port_error_response)?;
    let history = state
        .db
        .credit_history(user_id, 20)
        .await
        .map_err(port_error_response)?;
    Ok(Json(CreditsResponse {
        credits: user.credits,
        plan: user.plan.as_str().to_string(),
        subscription_active: user.subscription_active,
        history: history
            .into_iter()
            .map(|e| CreditEntryResponse {
                amount: e.amount,
                feature: e.feature,
                description: e.description,
                created_at: e.created_at,
            })
            .collect(),
    }))
}

#[derive(Deserialize, ToSchema)]
pub struct ConsumeCreditsRequest {
    /// Feature slug, e.g. `generate-exam` or `process-pdf-eco`.
    pub feature: String,
    pub description: Option<String>,
    /// Page count for page-tiered features; defaults to 0.
    pub page_count: Option<i32>,
    /// File size for size-based features; defaults to 0.
    pub file_size_bytes: Option<i64>,
}

#[derive(Serialize, ToSchema)]
pub struct ConsumeCreditsResponse {
    pub feature: String,
    pub cost: i32,
    pub credits_remaining: i32,
}

/// Explicitly consume credits for a feature. The processing routes debit
/// in-process; this endpoint serves clients that meter a feature themselves.
#[utoipa::path(
    post,
    path = "/api/credits/consume",
    request_body = ConsumeCreditsRequest,
    responses(
        (status = 200, description = "Credits debited", body = ConsumeCreditsResponse),
        (status = 400, description = "Unknown feature"),
        (status = 402, description = "Insufficient credits")
    )
)]
pub async fn consume_credits_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<ConsumeCreditsRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let feature = Feature::from_slug(&req.feature).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            format!("Funzionalità sconosciuta: {}.", req.feature),
        )
    })?;
    let cost = credit_cost(
        feature,
        req.page_count.unwrap_or(0),
        req.file_size_bytes.unwrap_or(0),
    );
    let description = req
        .description
        .unwrap_or_else(|| feature.ledger_label().to_string());
    let credits_remaining = state
        .db
        .debit_credits(user_id, cost, feature.slug(), &description)
        .await
        .map_err(port_error_response)?;
    Ok(Json(ConsumeCreditsResponse {
        feature: feature.slug().to_string(),
        cost,
        credits_remaining,
    }))
}

//=========================================================================================
// PayPal
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct PayPalCaptureRequest {
    pub order_id: String,
}

#[derive(Serialize, ToSchema)]
pub struct PayPalCaptureResponse {
    pub order_id: String,
    pub credits_added: i32,
    pub credits_remaining: i32,
}

/// Capture an approved PayPal order and credit the matching pack.
#[utoipa::path(
    post,
    path = "/api/paypal/capture",
    request_body = PayPalCaptureRequest,
    responses(
        (status = 200, description = "Payment captured and credits granted", body = PayPalCaptureResponse),
        (status = 400, description = "Unrecognized amount"),
        (status = 402, description = "Payment not completed"),
        (status = 500, description = "PayPal not configured")
    )
)]
pub async fn paypal_capture_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<PayPalCaptureRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let payments = state.payment_adapter.as_ref().ok_or((
        StatusCode::INTERNAL_SERVER_ERROR,
        "PayPal non è configurato.".to_string(),
    ))?;

    let captured = payments
        .capture_order(&req.order_id)
        .await
        .map_err(port_error_response)?;
    if !captured.completed {
        return Err((
            StatusCode::PAYMENT_REQUIRED,
            "Il pagamento non risulta completato.".to_string(),
        ));
    }

    let Some(pack) = pack_for_amount(captured.amount_cents) else {
        warn!(
            order_id = %captured.order_id,
            amount_cents = captured.amount_cents,
            "Captured amount matches no credit pack"
        );
        return Err((
            StatusCode::BAD_REQUEST,
            "L'importo pagato non corrisponde a nessun pacchetto di crediti.".to_string(),
        ));
    };

    let credits_remaining = state
        .db
        .grant_credits(user_id, pack.credits, "paypal", pack.label)
        .await
        .map_err(port_error_response)?;
    info!(
        user_id = %user_id,
        order_id = %captured.order_id,
        credits = pack.credits,
        "PayPal order fulfilled"
    );

    Ok(Json(PayPalCaptureResponse {
        order_id: captured.order_id,
        credits_added: pack.credits,
        credits_remaining,
    }))
}
