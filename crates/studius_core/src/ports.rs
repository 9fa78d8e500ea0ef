//! crates/studius_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    CapturedPayment, ConceptMap, CreditEntry, Difficulty, Flashcard, GenerationJob, ModelTier,
    NewTutorSession, ParseMode, ParsedDocument, QuizQuestion, StudyMaterials, SubscriptionPlan,
    TaskType, TutorSession, TutorSessionSummary, UserAccount, UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Insufficient credits: required {required}, available {available}")]
    InsufficientCredits { required: i32, available: i32 },
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- User Management ---
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<UserAccount>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn get_user(&self, user_id: Uuid) -> PortResult<UserAccount>;

    // --- Auth Methods ---
    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Credits ---
    /// Atomically removes `amount` credits and writes a ledger row.
    /// Returns the remaining balance, or `InsufficientCredits` without
    /// changing anything.
    async fn debit_credits(
        &self,
        user_id: Uuid,
        amount: i32,
        feature: &str,
        description: &str,
    ) -> PortResult<i32>;

    /// Adds `amount` credits and writes a ledger row. Returns the new balance.
    async fn grant_credits(
        &self,
        user_id: Uuid,
        amount: i32,
        feature: &str,
        description: &str,
    ) -> PortResult<i32>;

    async fn credit_history(&self, user_id: Uuid, limit: i64) -> PortResult<Vec<CreditEntry>>;

    // --- Billing ---
    async fn set_stripe_customer(&self, user_id: Uuid, customer_id: &str) -> PortResult<()>;

    async fn get_user_by_stripe_customer(&self, customer_id: &str) -> PortResult<UserAccount>;

    async fn update_subscription(
        &self,
        user_id: Uuid,
        plan: SubscriptionPlan,
        active: bool,
    ) -> PortResult<()>;

    // --- Study Sessions ---
    async fn create_tutor_session(&self, session: NewTutorSession) -> PortResult<TutorSession>;

    async fn get_tutor_session(&self, session_id: Uuid) -> PortResult<TutorSession>;

    async fn list_tutor_sessions(&self, user_id: Uuid) -> PortResult<Vec<TutorSessionSummary>>;

    /// Stores all five artifacts produced by a full processing pass.
    async fn store_materials(
        &self,
        session_id: Uuid,
        materials: &StudyMaterials,
    ) -> PortResult<()>;

    async fn store_quiz(&self, session_id: Uuid, quiz: &[QuizQuestion]) -> PortResult<()>;

    async fn store_flashcards(&self, session_id: Uuid, cards: &[Flashcard]) -> PortResult<()>;

    async fn store_summary(&self, session_id: Uuid, summary: &str) -> PortResult<()>;

    // --- Background Jobs ---
    async fn enqueue_job(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        task_type: TaskType,
    ) -> PortResult<GenerationJob>;

    async fn get_job(&self, job_id: Uuid) -> PortResult<GenerationJob>;

    /// Returns the queued or in-progress job of this type for the session,
    /// if one exists.
    async fn find_active_job(
        &self,
        session_id: Uuid,
        task_type: TaskType,
    ) -> PortResult<Option<GenerationJob>>;

    /// Moves a queued job to in-progress and bumps its attempt counter in a
    /// single statement. Returns false when the job was not claimable.
    async fn claim_job(&self, job_id: Uuid) -> PortResult<bool>;

    /// Bumps the attempt counter of an in-progress job before a retry.
    async fn record_job_retry(&self, job_id: Uuid) -> PortResult<()>;

    /// Merges `patch` into the job's metadata in a single statement, so
    /// concurrent progress writers cannot clobber each other.
    async fn merge_job_metadata(&self, job_id: Uuid, patch: &serde_json::Value) -> PortResult<()>;

    async fn complete_job(&self, job_id: Uuid) -> PortResult<()>;

    async fn fail_job(&self, job_id: Uuid, error: &str) -> PortResult<()>;
}

#[async_trait]
pub trait DocumentParsingService: Send + Sync {
    /// Extracts text from a PDF. Implementations may call out to a hosted
    /// parsing service or run locally.
    async fn parse_pdf(
        &self,
        data: &[u8],
        filename: &str,
        mode: ParseMode,
    ) -> PortResult<ParsedDocument>;
}

#[async_trait]
pub trait SummaryGenerationService: Send + Sync {
    /// Generates a structured markdown summary of the text.
    async fn generate_summary(
        &self,
        text: &str,
        language: &str,
        tier: ModelTier,
    ) -> PortResult<String>;
}

#[async_trait]
pub trait FlashcardGenerationService: Send + Sync {
    /// Generates around `count` flashcards from the text.
    async fn generate_flashcards(
        &self,
        text: &str,
        language: &str,
        count: usize,
        tier: ModelTier,
    ) -> PortResult<Vec<Flashcard>>;
}

#[async_trait]
pub trait QuizGenerationService: Send + Sync {
    /// Generates around `count` four-option multiple-choice questions.
    /// When `difficulty` is set, all questions target that level; otherwise
    /// the set mixes levels.
    async fn generate_quiz(
        &self,
        text: &str,
        language: &str,
        count: usize,
        difficulty: Option<Difficulty>,
        tier: ModelTier,
    ) -> PortResult<Vec<QuizQuestion>>;
}

#[async_trait]
pub trait ConceptMapGenerationService: Send + Sync {
    /// Generates a node/edge concept map of the text.
    async fn generate_concept_map(
        &self,
        text: &str,
        language: &str,
        tier: ModelTier,
    ) -> PortResult<ConceptMap>;
}

#[async_trait]
pub trait ExamGuideGenerationService: Send + Sync {
    /// Generates a markdown exam-preparation guide for the text.
    async fn generate_exam_guide(
        &self,
        text: &str,
        language: &str,
        tier: ModelTier,
    ) -> PortResult<String>;
}

#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Captures an approved PayPal order and reports what was charged.
    async fn capture_order(&self, order_id: &str) -> PortResult<CapturedPayment>;
}
