pub mod domain;
pub mod ports;
pub mod pricing;
pub mod section;

pub use domain::{
    CapturedPayment, ConceptMap, CreditEntry, Difficulty, Flashcard, GenerationJob,
    JobStatus, ModelTier, NewTutorSession, ParseMode, ParsedDocument, QuizQuestion, StudyMaterials,
    SubscriptionPlan, TaskType, TutorSession, TutorSessionSummary, UserAccount, UserCredentials,
};
pub use ports::{
    ConceptMapGenerationService, DatabaseService, DocumentParsingService,
    ExamGuideGenerationService, FlashcardGenerationService, PaymentService, PortError, PortResult,
    QuizGenerationService, SummaryGenerationService,
};
