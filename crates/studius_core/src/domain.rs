//! crates/studius_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or HTTP framework; the
//! study-material types also define the JSON shape stored in Postgres and
//! returned by the LLM adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

//=========================================================================================
// Users, credits, subscriptions
//=========================================================================================

// Represents a user - used throughout app
#[derive(Debug, Clone)]
pub struct UserAccount {
    pub id: Uuid,
    pub email: String,
    pub credits: i32,
    pub plan: SubscriptionPlan,
    pub subscription_active: bool,
    pub stripe_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionPlan {
    Free,
    Base,
    Pro,
}

impl SubscriptionPlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionPlan::Free => "free",
            SubscriptionPlan::Base => "base",
            SubscriptionPlan::Pro => "pro",
        }
    }

    /// Parses the stored plan name. Unknown values fall back to `Free` so a
    /// bad row can never lock a user out of the product.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "base" => SubscriptionPlan::Base,
            "pro" => SubscriptionPlan::Pro,
            _ => SubscriptionPlan::Free,
        }
    }
}

/// One row of the credit ledger. Negative amounts are debits.
#[derive(Debug, Clone)]
pub struct CreditEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: i32,
    pub feature: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Result of capturing a PayPal order.
#[derive(Debug, Clone)]
pub struct CapturedPayment {
    pub order_id: String,
    pub currency: String,
    pub amount_cents: i64,
    pub completed: bool,
}

//=========================================================================================
// Study sessions and generated materials
//=========================================================================================

/// A study session: one uploaded document plus everything generated from it.
/// `text` holds the full extracted text and can be large; listings use
/// [`TutorSessionSummary`] instead.
#[derive(Debug, Clone)]
pub struct TutorSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub source_filename: String,
    pub language: String,
    pub page_count: i32,
    pub file_size_bytes: i64,
    pub text: String,
    pub summary: Option<String>,
    pub flashcards: Option<Vec<Flashcard>>,
    pub quiz: Option<Vec<QuizQuestion>>,
    pub concept_map: Option<ConceptMap>,
    pub exam_guide: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Listing row for a session, without the document text or materials.
#[derive(Debug, Clone)]
pub struct TutorSessionSummary {
    pub id: Uuid,
    pub title: String,
    pub source_filename: String,
    pub language: String,
    pub page_count: i32,
    pub created_at: DateTime<Utc>,
}

/// Everything needed to insert a session row.
#[derive(Debug, Clone)]
pub struct NewTutorSession {
    pub user_id: Uuid,
    pub title: String,
    pub source_filename: String,
    pub language: String,
    pub page_count: i32,
    pub file_size_bytes: i64,
    pub text: String,
}

/// The five artifacts produced by a full processing pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyMaterials {
    pub summary: String,
    pub flashcards: Vec<Flashcard>,
    pub quiz: Vec<QuizQuestion>,
    pub concept_map: ConceptMap,
    pub exam_guide: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flashcard {
    pub front: String,
    pub back: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// A four-option multiple-choice question. `correct_option` is one of
/// "A", "B", "C", "D".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub option_a: String,
    pub option_b: String,
    pub option_c: String,
    pub option_d: String,
    pub correct_option: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

// Models do not always respect the label contract ("facile", "EASY", ...),
// so deserialization is lenient: anything unrecognized becomes Medium.
impl<'de> Deserialize<'de> for Difficulty {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let lowered = raw.trim().to_lowercase();
        Ok(if lowered.starts_with("eas") || lowered.starts_with("fac") {
            Difficulty::Easy
        } else if lowered.starts_with("hard") || lowered.starts_with("diff") {
            Difficulty::Hard
        } else {
            Difficulty::Medium
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptMap {
    pub nodes: Vec<ConceptNode>,
    pub edges: Vec<ConceptEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptNode {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptEdge {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

//=========================================================================================
// Document parsing
//=========================================================================================

/// Text extracted from an uploaded PDF.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub text: String,
    pub page_count: i32,
}

/// How hard the parsing service should work on the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Plain text layer, no OCR.
    Fast,
    /// OCR pass for scanned documents.
    Ocr,
    /// Layout-aware premium parsing.
    Premium,
}

/// Which model class a generation call should run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Eco,
    Standard,
    Premium,
}

//=========================================================================================
// Background generation jobs
//=========================================================================================

#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub task_type: TaskType,
    pub status: JobStatus,
    pub attempts: i32,
    pub metadata: serde_json::Value,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    UltraFlashcards,
    UltraSummary,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::UltraFlashcards => "ultra_flashcards",
            TaskType::UltraSummary => "ultra_summary",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ultra_flashcards" => Some(TaskType::UltraFlashcards),
            "ultra_summary" => Some(TaskType::UltraSummary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(JobStatus::Queued),
            "in_progress" => Some(JobStatus::InProgress),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// Queued and in-progress jobs block a second job of the same type on the
    /// same session.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::InProgress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_orders_easy_to_hard() {
        assert!(Difficulty::Easy < Difficulty::Medium);
        assert!(Difficulty::Medium < Difficulty::Hard);
    }

    #[test]
    fn difficulty_deserialization_is_lenient() {
        let parse = |s: &str| serde_json::from_value::<Difficulty>(serde_json::json!(s));
        assert_eq!(parse("Easy").unwrap(), Difficulty::Easy);
        assert_eq!(parse("  EASY ").unwrap(), Difficulty::Easy);
        assert_eq!(parse("facile").unwrap(), Difficulty::Easy);
        assert_eq!(parse("difficile").unwrap(), Difficulty::Hard);
        assert_eq!(parse("hard").unwrap(), Difficulty::Hard);
        assert_eq!(parse("qualcosa").unwrap(), Difficulty::Medium);
    }

    #[test]
    fn quiz_question_defaults_difficulty_when_missing() {
        let q: QuizQuestion = serde_json::from_value(serde_json::json!({
            "question": "Qual è la capitale d'Italia?",
            "option_a": "Roma",
            "option_b": "Milano",
            "option_c": "Napoli",
            "option_d": "Torino",
            "correct_option": "A"
        }))
        .unwrap();
        assert_eq!(q.difficulty, Difficulty::Medium);
        assert!(q.explanation.is_none());
    }

    #[test]
    fn plan_parse_defaults_to_free() {
        assert_eq!(SubscriptionPlan::parse("pro"), SubscriptionPlan::Pro);
        assert_eq!(SubscriptionPlan::parse(" Base "), SubscriptionPlan::Base);
        assert_eq!(SubscriptionPlan::parse("enterprise"), SubscriptionPlan::Free);
    }

    #[test]
    fn task_type_round_trips_through_storage_names() {
        for t in [TaskType::UltraFlashcards, TaskType::UltraSummary] {
            assert_eq!(TaskType::parse(t.as_str()), Some(t));
        }
        assert_eq!(TaskType::parse("ultra_quiz"), None);
    }
}
