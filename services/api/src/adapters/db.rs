//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use studius_core::domain::{
    CreditEntry, Flashcard, GenerationJob, JobStatus, NewTutorSession, QuizQuestion,
    StudyMaterials, SubscriptionPlan, TaskType, TutorSession, TutorSessionSummary, UserAccount,
    UserCredentials,
};
use studius_core::ports::{DatabaseService, PortError, PortResult};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    email: String,
    credits: i32,
    subscription_plan: String,
    subscription_active: bool,
    stripe_customer_id: Option<String>,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> UserAccount {
        UserAccount {
            id: self.id,
            email: self.email,
            credits: self.credits,
            plan: SubscriptionPlan::parse(&self.subscription_plan),
            subscription_active: self.subscription_active,
            stripe_customer_id: self.stripe_customer_id,
            created_at: self.created_at,
        }
    }
}

const USER_COLUMNS: &str = "id, email, credits, subscription_plan, subscription_active, \
                            stripe_customer_id, created_at";

#[derive(FromRow)]
struct CredentialsRecord {
    id: Uuid,
    email: String,
    hashed_password: String,
}
impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.id,
            email: self.email,
            hashed_password: self.hashed_password,
        }
    }
}

#[derive(FromRow)]
struct TutorSessionRecord {
    id: Uuid,
    user_id: Uuid,
    title: String,
    source_filename: String,
    language: String,
    page_count: i32,
    file_size_bytes: i64,
    extracted_text: String,
    summary: Option<String>,
    flashcards: Option<serde_json::Value>,
    quiz: Option<serde_json::Value>,
    concept_map: Option<serde_json::Value>,
    exam_guide: Option<String>,
    created_at: DateTime<Utc>,
}
impl TutorSessionRecord {
    fn to_domain(self) -> TutorSession {
        // artifact columns hold JSON written by this service; anything that
        // no longer parses is treated as absent
        TutorSession {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            source_filename: self.source_filename,
            language: self.language,
            page_count: self.page_count,
            file_size_bytes: self.file_size_bytes,
            text: self.extracted_text,
            summary: self.summary,
            flashcards: self
                .flashcards
                .and_then(|v| serde_json::from_value(v).ok()),
            quiz: self.quiz.and_then(|v| serde_json::from_value(v).ok()),
            concept_map: self
                .concept_map
                .and_then(|v| serde_json::from_value(v).ok()),
            exam_guide: self.exam_guide,
            created_at: self.created_at,
        }
    }
}

const SESSION_COLUMNS: &str = "id, user_id, title, source_filename, language, page_count, \
                               file_size_bytes, extracted_text, summary, flashcards, quiz, \
                               concept_map, exam_guide, created_at";

#[derive(FromRow)]
struct SessionSummaryRecord {
    id: Uuid,
    title: String,
    source_filename: String,
    language: String,
    page_count: i32,
    created_at: DateTime<Utc>,
}
impl SessionSummaryRecord {
    fn to_domain(self) -> TutorSessionSummary {
        TutorSessionSummary {
            id: self.id,
            title: self.title,
            source_filename: self.source_filename,
            language: self.language,
            page_count: self.page_count,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct CreditEntryRecord {
    id: Uuid,
    user_id: Uuid,
    amount: i32,
    feature: String,
    description: String,
    created_at: DateTime<Utc>,
}
impl CreditEntryRecord {
    fn to_domain(self) -> CreditEntry {
        CreditEntry {
            id: self.id,
            user_id: self.user_id,
            amount: self.amount,
            feature: self.feature,
            description: self.description,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct GenerationJobRecord {
    id: Uuid,
    session_id: Uuid,
    user_id: Uuid,
    task_type: String,
    status: String,
    attempts: i32,
    metadata: serde_json::Value,
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl GenerationJobRecord {
    fn to_domain(self) -> PortResult<GenerationJob> {
        let task_type = TaskType::parse(&self.task_type).ok_or_else(|| {
            PortError::Unexpected(format!("Unknown task type in job {}: {}", self.id, self.task_type))
        })?;
        let status = JobStatus::parse(&self.status).ok_or_else(|| {
            PortError::Unexpected(format!("Unknown job status in job {}: {}", self.id, self.status))
        })?;
        Ok(GenerationJob {
            id: self.id,
            session_id: self.session_id,
            user_id: self.user_id,
            task_type,
            status,
            attempts: self.attempts,
            metadata: self.metadata,
            error: self.error,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const JOB_COLUMNS: &str =
    "id, session_id, user_id, task_type, status, attempts, metadata, error, created_at, updated_at";

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<UserAccount> {
        let sql = format!(
            "INSERT INTO users (email, hashed_password) VALUES ($1, $2) RETURNING {USER_COLUMNS}"
        );
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(email)
            .bind(hashed_password)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db)
                    if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) =>
                {
                    PortError::Conflict(format!("User {} already exists", email))
                }
                _ => unexpected(e),
            })?;
        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, email, hashed_password FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", email)),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<UserAccount> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => {
                    PortError::NotFound(format!("User {} not found", user_id))
                }
                _ => unexpected(e),
            })?;
        Ok(record.to_domain())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > now()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        row.map(|(user_id,)| user_id).ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn debit_credits(
        &self,
        user_id: Uuid,
        amount: i32,
        feature: &str,
        description: &str,
    ) -> PortResult<i32> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        // The balance guard in the WHERE clause makes the debit atomic.
        let updated: Option<(i32,)> = sqlx::query_as(
            "UPDATE users SET credits = credits - $2 WHERE id = $1 AND credits >= $2 \
             RETURNING credits",
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&mut *tx)
        .await
        .map_err(unexpected)?;

        let Some((balance,)) = updated else {
            let available: Option<(i32,)> =
                sqlx::query_as("SELECT credits FROM users WHERE id = $1")
                    .bind(user_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(unexpected)?;
            return match available {
                Some((available,)) => Err(PortError::InsufficientCredits {
                    required: amount,
                    available,
                }),
                None => Err(PortError::NotFound(format!("User {} not found", user_id))),
            };
        };

        sqlx::query(
            "INSERT INTO credit_ledger (user_id, amount, feature, description) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(user_id)
        .bind(-amount)
        .bind(feature)
        .bind(description)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        Ok(balance)
    }

    async fn grant_credits(
        &self,
        user_id: Uuid,
        amount: i32,
        feature: &str,
        description: &str,
    ) -> PortResult<i32> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let updated: Option<(i32,)> = sqlx::query_as(
            "UPDATE users SET credits = credits + $2 WHERE id = $1 RETURNING credits",
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&mut *tx)
        .await
        .map_err(unexpected)?;

        let Some((balance,)) = updated else {
            return Err(PortError::NotFound(format!("User {} not found", user_id)));
        };

        sqlx::query(
            "INSERT INTO credit_ledger (user_id, amount, feature, description) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(user_id)
        .bind(amount)
        .bind(feature)
        .bind(description)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        Ok(balance)
    }

    async fn credit_history(&self, user_id: Uuid, limit: i64) -> PortResult<Vec<CreditEntry>> {
        let records = sqlx::query_as::<_, CreditEntryRecord>(
            "SELECT id, user_id, amount, feature, description, created_at \
             FROM credit_ledger WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn set_stripe_customer(&self, user_id: Uuid, customer_id: &str) -> PortResult<()> {
        sqlx::query("UPDATE users SET stripe_customer_id = $2 WHERE id = $1")
            .bind(user_id)
            .bind(customer_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn get_user_by_stripe_customer(&self, customer_id: &str) -> PortResult<UserAccount> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE stripe_customer_id = $1");
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;
        record
            .map(UserRecord::to_domain)
            .ok_or_else(|| PortError::NotFound(format!("No user for customer {}", customer_id)))
    }

    async fn update_subscription(
        &self,
        user_id: Uuid,
        plan: SubscriptionPlan,
        active: bool,
    ) -> PortResult<()> {
        sqlx::query(
            "UPDATE users SET subscription_plan = $2, subscription_active = $3 WHERE id = $1",
        )
        .bind(user_id)
        .bind(plan.as_str())
        .bind(active)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn create_tutor_session(&self, session: NewTutorSession) -> PortResult<TutorSession> {
        let sql = format!(
            "INSERT INTO tutor_sessions \
             (user_id, title, source_filename, language, page_count, file_size_bytes, extracted_text) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {SESSION_COLUMNS}"
        );
        let record = sqlx::query_as::<_, TutorSessionRecord>(&sql)
            .bind(session.user_id)
            .bind(&session.title)
            .bind(&session.source_filename)
            .bind(&session.language)
            .bind(session.page_count)
            .bind(session.file_size_bytes)
            .bind(&session.text)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_tutor_session(&self, session_id: Uuid) -> PortResult<TutorSession> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM tutor_sessions WHERE id = $1");
        let record = sqlx::query_as::<_, TutorSessionRecord>(&sql)
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => {
                    PortError::NotFound(format!("Session {} not found", session_id))
                }
                _ => unexpected(e),
            })?;
        Ok(record.to_domain())
    }

    async fn list_tutor_sessions(&self, user_id: Uuid) -> PortResult<Vec<TutorSessionSummary>> {
        let records = sqlx::query_as::<_, SessionSummaryRecord>(
            "SELECT id, title, source_filename, language, page_count, created_at \
             FROM tutor_sessions WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn store_materials(
        &self,
        session_id: Uuid,
        materials: &StudyMaterials,
    ) -> PortResult<()> {
        let flashcards = serde_json::to_value(&materials.flashcards)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let quiz = serde_json::to_value(&materials.quiz)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let concept_map = serde_json::to_value(&materials.concept_map)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        sqlx::query(
            "UPDATE tutor_sessions SET summary = $2, flashcards = $3, quiz = $4, \
             concept_map = $5, exam_guide = $6, updated_at = now() WHERE id = $1",
        )
        .bind(session_id)
        .bind(&materials.summary)
        .bind(flashcards)
        .bind(quiz)
        .bind(concept_map)
        .bind(&materials.exam_guide)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn store_quiz(&self, session_id: Uuid, quiz: &[QuizQuestion]) -> PortResult<()> {
        let quiz = serde_json::to_value(quiz).map_err(|e| PortError::Unexpected(e.to_string()))?;
        sqlx::query("UPDATE tutor_sessions SET quiz = $2, updated_at = now() WHERE id = $1")
            .bind(session_id)
            .bind(quiz)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn store_flashcards(&self, session_id: Uuid, cards: &[Flashcard]) -> PortResult<()> {
        let cards = serde_json::to_value(cards).map_err(|e| PortError::Unexpected(e.to_string()))?;
        sqlx::query("UPDATE tutor_sessions SET flashcards = $2, updated_at = now() WHERE id = $1")
            .bind(session_id)
            .bind(cards)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn store_summary(&self, session_id: Uuid, summary: &str) -> PortResult<()> {
        sqlx::query("UPDATE tutor_sessions SET summary = $2, updated_at = now() WHERE id = $1")
            .bind(session_id)
            .bind(summary)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn enqueue_job(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        task_type: TaskType,
    ) -> PortResult<GenerationJob> {
        let sql = format!(
            "INSERT INTO generation_jobs (session_id, user_id, task_type) \
             VALUES ($1, $2, $3) RETURNING {JOB_COLUMNS}"
        );
        let record = sqlx::query_as::<_, GenerationJobRecord>(&sql)
            .bind(session_id)
            .bind(user_id)
            .bind(task_type.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        record.to_domain()
    }

    async fn get_job(&self, job_id: Uuid) -> PortResult<GenerationJob> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM generation_jobs WHERE id = $1");
        let record = sqlx::query_as::<_, GenerationJobRecord>(&sql)
            .bind(job_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => {
                    PortError::NotFound(format!("Job {} not found", job_id))
                }
                _ => unexpected(e),
            })?;
        record.to_domain()
    }

    async fn find_active_job(
        &self,
        session_id: Uuid,
        task_type: TaskType,
    ) -> PortResult<Option<GenerationJob>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM generation_jobs \
             WHERE session_id = $1 AND task_type = $2 AND status IN ('queued', 'in_progress') \
             ORDER BY created_at DESC LIMIT 1"
        );
        let record = sqlx::query_as::<_, GenerationJobRecord>(&sql)
            .bind(session_id)
            .bind(task_type.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;
        record.map(GenerationJobRecord::to_domain).transpose()
    }

    async fn claim_job(&self, job_id: Uuid) -> PortResult<bool> {
        let result = sqlx::query(
            "UPDATE generation_jobs \
             SET status = 'in_progress', attempts = attempts + 1, updated_at = now() \
             WHERE id = $1 AND status = 'queued'",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(result.rows_affected() == 1)
    }

    async fn record_job_retry(&self, job_id: Uuid) -> PortResult<()> {
        sqlx::query(
            "UPDATE generation_jobs SET attempts = attempts + 1, updated_at = now() \
             WHERE id = $1",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn merge_job_metadata(&self, job_id: Uuid, patch: &serde_json::Value) -> PortResult<()> {
        // single-statement jsonb merge, safe under concurrent progress writes
        sqlx::query(
            "UPDATE generation_jobs SET metadata = metadata || $2, updated_at = now() \
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(patch)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn complete_job(&self, job_id: Uuid) -> PortResult<()> {
        sqlx::query(
            "UPDATE generation_jobs SET status = 'completed', error = NULL, updated_at = now() \
             WHERE id = $1",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn fail_job(&self, job_id: Uuid, error: &str) -> PortResult<()> {
        sqlx::query(
            "UPDATE generation_jobs SET status = 'failed', error = $2, updated_at = now() \
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }
}
