//! services/api/src/web/process.rs
//!
//! The PDF processing routes. Every variant runs the same pipeline: read the
//! upload, extract the text, debit the credits, generate the five study
//! artifacts with concurrent LLM calls, persist the session. Variants differ
//! only in how the text is extracted, which model tier answers, and how many
//! items are requested.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use serde::Serialize;
use std::sync::Arc;
use studius_core::{
    domain::{
        ConceptMap, ConceptNode, Flashcard, ModelTier, NewTutorSession, ParseMode, ParsedDocument,
        QuizQuestion, StudyMaterials,
    },
    ports::{PortError, PortResult},
    pricing::{credit_cost, Feature},
    section::{scaled_target, truncate_chars},
};
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::{port_error_response, state::AppState};

//=========================================================================================
// Variant Settings
//=========================================================================================

/// How a processing variant extracts the document text.
#[derive(Clone, Copy)]
enum TextSource {
    /// In-process extraction of the PDF text layer.
    Local,
    /// The hosted parsing service, in the given mode.
    Hosted(ParseMode),
}

/// An item budget scaled with document length: one item per `chars_per_item`
/// bytes, clamped to `[min, max]`.
#[derive(Clone, Copy)]
struct ItemBudget {
    chars_per_item: usize,
    min: usize,
    max: usize,
}

impl ItemBudget {
    fn for_text(&self, text_len: usize) -> usize {
        scaled_target(text_len, self.chars_per_item, self.min, self.max)
    }
}

/// Everything that distinguishes one processing variant from another.
struct VariantSettings {
    feature: Feature,
    tier: ModelTier,
    source: TextSource,
    /// Maximum bytes of document text passed to a single generation call.
    context_limit: usize,
    flashcards: ItemBudget,
    quiz: ItemBudget,
}

const STANDARD: VariantSettings = VariantSettings {
    feature: Feature::ProcessPdf,
    tier: ModelTier::Standard,
    source: TextSource::Hosted(ParseMode::Fast),
    context_limit: 24_000,
    flashcards: ItemBudget { chars_per_item: 2_500, min: 12, max: 60 },
    quiz: ItemBudget { chars_per_item: 3_000, min: 10, max: 30 },
};

const ECO: VariantSettings = VariantSettings {
    feature: Feature::ProcessPdfEco,
    tier: ModelTier::Eco,
    source: TextSource::Local,
    context_limit: 12_000,
    flashcards: ItemBudget { chars_per_item: 3_000, min: 8, max: 30 },
    quiz: ItemBudget { chars_per_item: 4_000, min: 6, max: 20 },
};

const OCR: VariantSettings = VariantSettings {
    feature: Feature::ProcessPdfOcr,
    tier: ModelTier::Standard,
    source: TextSource::Hosted(ParseMode::Ocr),
    context_limit: 24_000,
    flashcards: ItemBudget { chars_per_item: 2_500, min: 12, max: 60 },
    quiz: ItemBudget { chars_per_item: 3_000, min: 10, max: 30 },
};

const PREMIUM: VariantSettings = VariantSettings {
    feature: Feature::ProcessPdfPremium,
    tier: ModelTier::Premium,
    source: TextSource::Hosted(ParseMode::Premium),
    context_limit: 48_000,
    flashcards: ItemBudget { chars_per_item: 2_000, min: 15, max: 80 },
    quiz: ItemBudget { chars_per_item: 2_500, min: 12, max: 40 },
};

const RAW: VariantSettings = VariantSettings {
    feature: Feature::ProcessPdfRaw,
    tier: ModelTier::Standard,
    source: TextSource::Local,
    context_limit: 24_000,
    flashcards: ItemBudget { chars_per_item: 2_500, min: 12, max: 60 },
    quiz: ItemBudget { chars_per_item: 3_000, min: 10, max: 30 },
};

//=========================================================================================
// Placeholder Content (per-call failure recovery)
//=========================================================================================

pub(crate) const SUMMARY_PLACEHOLDER: &str =
    "Non è stato possibile generare il riassunto per questo documento. Riprova più tardi.";

pub(crate) const EXAM_GUIDE_PLACEHOLDER: &str =
    "Non è stato possibile generare la guida all'esame per questo documento. Riprova più tardi.";

/// A stand-in card written when one generation call fails, so the rest of the
/// batch is still delivered.
pub(crate) fn placeholder_flashcard(section: Option<usize>) -> Flashcard {
    let back = match section {
        Some(n) => format!("La sezione {n} del documento non è stata elaborata."),
        None => "Questa parte del documento non è stata elaborata.".to_string(),
    };
    Flashcard {
        front: "Contenuto non disponibile".to_string(),
        back,
        category: None,
    }
}

/// A stand-in question for a failed quiz call.
pub(crate) fn placeholder_question(section: Option<usize>) -> QuizQuestion {
    let question = match section {
        Some(n) => format!("La sezione {n} del documento non è stata elaborata. Continuare?"),
        None => "Questa parte del documento non è stata elaborata. Continuare?".to_string(),
    };
    QuizQuestion {
        question,
        option_a: "Sì".to_string(),
        option_b: "No".to_string(),
        option_c: "Riprova più tardi".to_string(),
        option_d: "Contatta l'assistenza".to_string(),
        correct_option: "A".to_string(),
        explanation: None,
        difficulty: Default::default(),
    }
}

fn placeholder_concept_map(title: &str) -> ConceptMap {
    ConceptMap {
        nodes: vec![ConceptNode {
            id: "documento".to_string(),
            label: title.to_string(),
        }],
        edges: Vec::new(),
    }
}

//=========================================================================================
// Response Payload
//=========================================================================================

/// The response payload sent after a successful processing pass.
#[derive(Serialize, ToSchema)]
pub struct ProcessPdfResponse {
    pub session_id: Uuid,
    pub title: String,
    pub language: String,
    pub page_count: i32,
    pub credits_remaining: i32,
    #[schema(value_type = Object)]
    pub materials: StudyMaterials,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Process a PDF with the hosted parsing service and the standard model.
#[utoipa::path(
    post,
    path = "/api/process-pdf",
    request_body(content_type = "multipart/form-data",
        description = "PDF file plus optional `language` and `title` fields."),
    responses(
        (status = 200, description = "Study materials generated", body = ProcessPdfResponse),
        (status = 400, description = "Missing or invalid upload"),
        (status = 402, description = "Insufficient credits"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn process_pdf_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    run_processing(state, user_id, multipart, &STANDARD).await
}

/// Process a PDF locally with the economy model.
#[utoipa::path(
    post,
    path = "/api/process-pdf-eco",
    request_body(content_type = "multipart/form-data",
        description = "PDF file plus optional `language` and `title` fields."),
    responses(
        (status = 200, description = "Study materials generated", body = ProcessPdfResponse),
        (status = 400, description = "Missing or invalid upload"),
        (status = 402, description = "Insufficient credits"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn process_pdf_eco_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    run_processing(state, user_id, multipart, &ECO).await
}

/// Process a scanned PDF through the hosted OCR pipeline.
#[utoipa::path(
    post,
    path = "/api/process-pdf-ocr",
    request_body(content_type = "multipart/form-data",
        description = "PDF file plus optional `language` and `title` fields."),
    responses(
        (status = 200, description = "Study materials generated", body = ProcessPdfResponse),
        (status = 400, description = "Missing or invalid upload"),
        (status = 402, description = "Insufficient credits"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn process_pdf_ocr_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    run_processing(state, user_id, multipart, &OCR).await
}

/// Process a PDF with layout-aware premium parsing and the premium model.
#[utoipa::path(
    post,
    path = "/api/process-pdf-premium",
    request_body(content_type = "multipart/form-data",
        description = "PDF file plus optional `language` and `title` fields."),
    responses(
        (status = 200, description = "Study materials generated", body = ProcessPdfResponse),
        (status = 400, description = "Missing or invalid upload"),
        (status = 402, description = "Insufficient credits"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn process_pdf_premium_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    run_processing(state, user_id, multipart, &PREMIUM).await
}

/// Process a PDF locally, text layer only, with the standard model.
#[utoipa::path(
    post,
    path = "/api/process-pdf-raw",
    request_body(content_type = "multipart/form-data",
        description = "PDF file plus optional `language` and `title` fields."),
    responses(
        (status = 200, description = "Study materials generated", body = ProcessPdfResponse),
        (status = 400, description = "Missing or invalid upload"),
        (status = 402, description = "Insufficient credits"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn process_pdf_raw_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    run_processing(state, user_id, multipart, &RAW).await
}

//=========================================================================================
// The Shared Pipeline
//=========================================================================================

struct Upload {
    filename: String,
    data: Vec<u8>,
    language: String,
    title: Option<String>,
}

/// Reads the multipart form: a required `file` part plus optional `language`
/// and `title` text parts.
async fn read_upload(mut multipart: Multipart) -> Result<Upload, (StatusCode, String)> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut language = "italiano".to_string();
    let mut title = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Impossibile leggere il modulo di caricamento: {e}"),
        )
    })? {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("documento.pdf").to_string();
                let data = field.bytes().await.map_err(|e| {
                    (
                        StatusCode::BAD_REQUEST,
                        format!("Impossibile leggere il file caricato: {e}"),
                    )
                })?;
                file = Some((filename, data.to_vec()));
            }
            Some("language") => {
                let value = field.text().await.unwrap_or_default();
                if !value.trim().is_empty() {
                    language = value.trim().to_string();
                }
            }
            Some("title") => {
                let value = field.text().await.unwrap_or_default();
                if !value.trim().is_empty() {
                    title = Some(value.trim().to_string());
                }
            }
            _ => {}
        }
    }

    let (filename, data) = file.ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            "Nessun file ricevuto: allega un PDF.".to_string(),
        )
    })?;

    Ok(Upload {
        filename,
        data,
        language,
        title,
    })
}

/// Derives a session title from the upload when the user did not name one.
fn title_from_filename(filename: &str) -> String {
    let stem = filename
        .rsplit('/')
        .next()
        .unwrap_or(filename)
        .trim_end_matches(".pdf")
        .trim_end_matches(".PDF");
    if stem.trim().is_empty() {
        "Documento senza titolo".to_string()
    } else {
        stem.replace(['_', '-'], " ").trim().to_string()
    }
}

async fn extract_text(
    state: &AppState,
    upload: &Upload,
    source: TextSource,
) -> PortResult<ParsedDocument> {
    match source {
        TextSource::Local => {
            state
                .local_parse_adapter
                .parse_pdf(&upload.data, &upload.filename, ParseMode::Fast)
                .await
        }
        TextSource::Hosted(mode) => {
            let adapter = state.parse_adapter.as_ref().ok_or_else(|| {
                PortError::Unexpected(
                    "Il servizio di analisi documenti non è configurato.".to_string(),
                )
            })?;
            adapter.parse_pdf(&upload.data, &upload.filename, mode).await
        }
    }
}

async fn run_processing(
    state: Arc<AppState>,
    user_id: Uuid,
    multipart: Multipart,
    variant: &VariantSettings,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let upload = read_upload(multipart).await?;

    if !upload.data.starts_with(b"%PDF") {
        return Err((
            StatusCode::BAD_REQUEST,
            "Il file caricato non è un PDF valido.".to_string(),
        ));
    }

    let parsed = extract_text(&state, &upload, variant.source)
        .await
        .map_err(|e| {
            error!(feature = variant.feature.slug(), "Text extraction failed: {e}");
            port_error_response(e)
        })?;
    if parsed.text.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Impossibile estrarre il testo dal documento. Se è una scansione, usa la modalità OCR."
                .to_string(),
        ));
    }

    let cost = credit_cost(
        variant.feature,
        parsed.page_count,
        upload.data.len() as i64,
    );
    let credits_remaining = state
        .db
        .debit_credits(
            user_id,
            cost,
            variant.feature.slug(),
            variant.feature.ledger_label(),
        )
        .await
        .map_err(port_error_response)?;

    let title = upload
        .title
        .clone()
        .unwrap_or_else(|| title_from_filename(&upload.filename));
    let session = state
        .db
        .create_tutor_session(NewTutorSession {
            user_id,
            title: title.clone(),
            source_filename: upload.filename.clone(),
            language: upload.language.clone(),
            page_count: parsed.page_count,
            file_size_bytes: upload.data.len() as i64,
            text: parsed.text.clone(),
        })
        .await
        .map_err(port_error_response)?;

    info!(
        session_id = %session.id,
        feature = variant.feature.slug(),
        pages = parsed.page_count,
        cost,
        "Processing uploaded document"
    );

    let context = truncate_chars(&parsed.text, variant.context_limit);
    let flashcard_target = variant.flashcards.for_text(parsed.text.len());
    let quiz_target = variant.quiz.for_text(parsed.text.len());
    let lang = upload.language.as_str();
    let tier = variant.tier;

    // The five generation calls run concurrently; any one failing is replaced
    // with placeholder content instead of failing the upload.
    let (summary, flashcards, quiz, concept_map, exam_guide) = tokio::join!(
        state.summary_adapter.generate_summary(context, lang, tier),
        state
            .flashcards_adapter
            .generate_flashcards(context, lang, flashcard_target, tier),
        state
            .quiz_adapter
            .generate_quiz(context, lang, quiz_target, None, tier),
        state
            .concept_map_adapter
            .generate_concept_map(context, lang, tier),
        state.exam_guide_adapter.generate_exam_guide(context, lang, tier),
    );

    let materials = StudyMaterials {
        summary: summary.unwrap_or_else(|e| {
            warn!(session_id = %session.id, "Summary generation failed: {e}");
            SUMMARY_PLACEHOLDER.to_string()
        }),
        flashcards: flashcards.unwrap_or_else(|e| {
            warn!(session_id = %session.id, "Flashcard generation failed: {e}");
            vec![placeholder_flashcard(None)]
        }),
        quiz: quiz.unwrap_or_else(|e| {
            warn!(session_id = %session.id, "Quiz generation failed: {e}");
            vec![placeholder_question(None)]
        }),
        concept_map: concept_map.unwrap_or_else(|e| {
            warn!(session_id = %session.id, "Concept map generation failed: {e}");
            placeholder_concept_map(&title)
        }),
        exam_guide: exam_guide.unwrap_or_else(|e| {
            warn!(session_id = %session.id, "Exam guide generation failed: {e}");
            EXAM_GUIDE_PLACEHOLDER.to_string()
        }),
    };

    state
        .db
        .store_materials(session.id, &materials)
        .await
        .map_err(port_error_response)?;

    Ok(Json(ProcessPdfResponse {
        session_id: session.id,
        title,
        language: upload.language,
        page_count: parsed.page_count,
        credits_remaining,
        materials,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_falls_back_to_a_cleaned_filename() {
        assert_eq!(title_from_filename("appunti_di_chimica.pdf"), "appunti di chimica");
        assert_eq!(title_from_filename("Storia-Romana.PDF"), "Storia Romana");
        assert_eq!(title_from_filename(".pdf"), "Documento senza titolo");
    }

    #[test]
    fn budgets_scale_with_document_length() {
        assert_eq!(STANDARD.flashcards.for_text(1_000), 12);
        assert_eq!(STANDARD.flashcards.for_text(75_000), 30);
        assert_eq!(STANDARD.flashcards.for_text(1_000_000), 60);
        assert_eq!(ECO.quiz.for_text(1_000_000), 20);
        assert_eq!(PREMIUM.quiz.for_text(1_000_000), 40);
    }

    #[test]
    fn placeholders_name_the_failed_section() {
        let card = placeholder_flashcard(Some(3));
        assert!(card.back.contains("sezione 3"));
        let question = placeholder_question(None);
        assert_eq!(question.correct_option, "A");
    }
}
