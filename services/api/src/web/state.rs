//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use std::sync::Arc;
use studius_core::ports::{
    ConceptMapGenerationService, DatabaseService, DocumentParsingService,
    ExamGuideGenerationService, FlashcardGenerationService, PaymentService,
    QuizGenerationService, SummaryGenerationService,
};

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
///
/// The hosted parsing service and PayPal are optional: when their credentials
/// are absent the routes that need them answer with a configuration error
/// instead of preventing startup.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub parse_adapter: Option<Arc<dyn DocumentParsingService>>,
    pub local_parse_adapter: Arc<dyn DocumentParsingService>,
    pub summary_adapter: Arc<dyn SummaryGenerationService>,
    pub flashcards_adapter: Arc<dyn FlashcardGenerationService>,
    pub quiz_adapter: Arc<dyn QuizGenerationService>,
    pub concept_map_adapter: Arc<dyn ConceptMapGenerationService>,
    pub exam_guide_adapter: Arc<dyn ExamGuideGenerationService>,
    pub payment_adapter: Option<Arc<dyn PaymentService>>,
}
