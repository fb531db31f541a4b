//! Repository pattern for database operations
//!
//! Every query on user-owned tables is scoped by `user_id`; the schema's RLS
//! policies cover direct client access, this layer covers the service role.

use crate::clients::StudyMaterial;
use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::Result;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbBackend, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, Statement,
};
use uuid::Uuid;

/// Fields for a new quiz result row
#[derive(Debug, Clone, Default)]
pub struct NewQuizResult {
    pub quiz_id: String,
    pub score: f64,
    pub answers: serde_json::Value,
    pub weak_topics: serde_json::Value,
    pub time_spent: Option<i32>,
    pub quiz_title: Option<String>,
    pub quiz_topics: Option<serde_json::Value>,
    pub correct_count: Option<i32>,
    pub wrong_count: Option<i32>,
    pub total_questions: Option<i32>,
    pub weak_areas: Option<serde_json::Value>,
    pub recommended_resources: Option<serde_json::Value>,
}

/// Fields applied when completing a quiz (summary write)
#[derive(Debug, Clone, Default)]
pub struct QuizSummaryUpdate {
    pub score: Option<f64>,
    pub answers: Option<serde_json::Value>,
    pub weak_topics: Option<serde_json::Value>,
    pub quiz_title: Option<String>,
    pub quiz_topics: Option<serde_json::Value>,
    pub correct_count: Option<i32>,
    pub wrong_count: Option<i32>,
    pub total_questions: Option<i32>,
    pub time_spent: Option<i32>,
    pub weak_areas: Option<serde_json::Value>,
    pub recommended_resources: Option<serde_json::Value>,
}

/// Fields for a new midterm analysis row
#[derive(Debug, Clone)]
pub struct NewMidtermAnalysis {
    pub filename: String,
    pub course_name: String,
    pub errors: serde_json::Value,
    pub extracted_text: String,
    pub recommended_resources: serde_json::Value,
    pub error_topics: serde_json::Value,
    pub total_errors: i32,
    pub correct_count: i32,
    pub wrong_count: i32,
    pub partially_correct_count: i32,
    pub total_marks_received: Option<f64>,
    pub total_marks_possible: Option<f64>,
}

/// Fields for a new uploaded material row
#[derive(Debug, Clone)]
pub struct NewUploadedMaterial {
    pub filename: String,
    pub file_type: String,
    pub file_size: i64,
    pub extracted_text: String,
    pub topics: serde_json::Value,
    pub subject: Option<String>,
}

/// Cached resources payload written by the curator
#[derive(Debug, Clone)]
pub struct CachedResourcesRecord {
    pub resources: serde_json::Value,
    pub recommended_topics: serde_json::Value,
    pub learning_path: String,
    pub total_weak_topics: i32,
    pub data_timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Quiz Operations
    // ========================================================================

    /// Persist a generated quiz
    pub async fn create_quiz(
        &self,
        user_id: Uuid,
        title: String,
        questions: serde_json::Value,
        topics: serde_json::Value,
    ) -> Result<Quiz> {
        let now = chrono::Utc::now();

        let quiz = QuizActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            title: Set(title),
            questions: Set(questions),
            topics: Set(topics),
            created_at: Set(now.into()),
        };

        quiz.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Find a quiz owned by the given user
    pub async fn find_quiz(&self, quiz_id: Uuid, user_id: Uuid) -> Result<Option<Quiz>> {
        QuizEntity::find_by_id(quiz_id)
            .filter(QuizColumn::UserId.eq(user_id))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Look up a quiz without an owner filter, for anonymous reads
    pub async fn find_quiz_unscoped(&self, quiz_id: Uuid) -> Result<Option<Quiz>> {
        QuizEntity::find_by_id(quiz_id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// List the user's quizzes, newest first
    pub async fn list_quizzes(&self, user_id: Uuid) -> Result<Vec<Quiz>> {
        QuizEntity::find()
            .filter(QuizColumn::UserId.eq(user_id))
            .order_by_desc(QuizColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Quiz Result Operations
    // ========================================================================

    /// Persist a quiz result
    pub async fn create_quiz_result(
        &self,
        user_id: Uuid,
        new: NewQuizResult,
    ) -> Result<QuizResult> {
        let now = chrono::Utc::now();

        let result = QuizResultActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            quiz_id: Set(new.quiz_id),
            score: Set(new.score),
            answers: Set(new.answers),
            weak_topics: Set(new.weak_topics),
            time_spent: Set(new.time_spent),
            quiz_title: Set(new.quiz_title),
            quiz_topics: Set(new.quiz_topics),
            correct_count: Set(new.correct_count),
            wrong_count: Set(new.wrong_count),
            total_questions: Set(new.total_questions),
            weak_areas: Set(new.weak_areas),
            recommended_resources: Set(new.recommended_resources),
            completed_at: Set(now.into()),
        };

        result.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Find a result by id, scoped to its owner
    pub async fn find_quiz_result(
        &self,
        result_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<QuizResult>> {
        QuizResultEntity::find_by_id(result_id)
            .filter(QuizResultColumn::UserId.eq(user_id))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// List the user's results, newest first
    pub async fn list_quiz_results(&self, user_id: Uuid) -> Result<Vec<QuizResult>> {
        QuizResultEntity::find()
            .filter(QuizResultColumn::UserId.eq(user_id))
            .order_by_desc(QuizResultColumn::CompletedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Newest result the user recorded for a quiz (quiz_id is opaque text)
    pub async fn find_result_for_quiz(
        &self,
        quiz_id: &str,
        user_id: Uuid,
    ) -> Result<Option<QuizResult>> {
        QuizResultEntity::find()
            .filter(QuizResultColumn::UserId.eq(user_id))
            .filter(QuizResultColumn::QuizId.eq(quiz_id))
            .order_by_desc(QuizResultColumn::CompletedAt)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Apply a completion summary to the result matched by (quiz_id, user_id),
    /// inserting a fresh row when none exists yet
    pub async fn update_quiz_summary(
        &self,
        quiz_id: &str,
        user_id: Uuid,
        summary: QuizSummaryUpdate,
    ) -> Result<QuizResult> {
        let now = chrono::Utc::now();

        if let Some(existing) = self.find_result_for_quiz(quiz_id, user_id).await? {
            let mut result: QuizResultActiveModel = existing.into();

            if let Some(score) = summary.score {
                result.score = Set(score);
            }
            if let Some(answers) = summary.answers {
                result.answers = Set(answers);
            }
            if let Some(weak_topics) = summary.weak_topics {
                result.weak_topics = Set(weak_topics);
            }
            if let Some(title) = summary.quiz_title {
                result.quiz_title = Set(Some(title));
            }
            if let Some(topics) = summary.quiz_topics {
                result.quiz_topics = Set(Some(topics));
            }
            if let Some(c) = summary.correct_count {
                result.correct_count = Set(Some(c));
            }
            if let Some(w) = summary.wrong_count {
                result.wrong_count = Set(Some(w));
            }
            if let Some(t) = summary.total_questions {
                result.total_questions = Set(Some(t));
            }
            if let Some(s) = summary.time_spent {
                result.time_spent = Set(Some(s));
            }
            if let Some(areas) = summary.weak_areas {
                result.weak_areas = Set(Some(areas));
            }
            if let Some(resources) = summary.recommended_resources {
                result.recommended_resources = Set(Some(resources));
            }
            result.completed_at = Set(now.into());

            result.update(self.write_conn()).await.map_err(Into::into)
        } else {
            self.create_quiz_result(
                user_id,
                NewQuizResult {
                    quiz_id: quiz_id.to_string(),
                    score: summary.score.unwrap_or(0.0),
                    answers: summary.answers.unwrap_or_else(|| serde_json::json!([])),
                    weak_topics: summary.weak_topics.unwrap_or_else(|| serde_json::json!([])),
                    time_spent: summary.time_spent,
                    quiz_title: summary.quiz_title,
                    quiz_topics: summary.quiz_topics,
                    correct_count: summary.correct_count,
                    wrong_count: summary.wrong_count,
                    total_questions: summary.total_questions,
                    weak_areas: summary.weak_areas,
                    recommended_resources: summary.recommended_resources,
                },
            )
            .await
        }
    }

    // ========================================================================
    // Midterm Analysis Operations
    // ========================================================================

    /// Persist a midterm analysis
    pub async fn create_midterm_analysis(
        &self,
        user_id: Uuid,
        new: NewMidtermAnalysis,
    ) -> Result<MidtermAnalysis> {
        let now = chrono::Utc::now();

        let analysis = MidtermAnalysisActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            filename: Set(new.filename),
            course_name: Set(new.course_name),
            errors: Set(new.errors),
            extracted_text: Set(new.extracted_text),
            recommended_resources: Set(new.recommended_resources),
            error_topics: Set(new.error_topics),
            total_errors: Set(new.total_errors),
            correct_count: Set(new.correct_count),
            wrong_count: Set(new.wrong_count),
            partially_correct_count: Set(new.partially_correct_count),
            total_marks_received: Set(new.total_marks_received),
            total_marks_possible: Set(new.total_marks_possible),
            created_at: Set(now.into()),
        };

        analysis.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Find an analysis by id, scoped to its owner
    pub async fn find_midterm_analysis(
        &self,
        analysis_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<MidtermAnalysis>> {
        MidtermAnalysisEntity::find_by_id(analysis_id)
            .filter(MidtermAnalysisColumn::UserId.eq(user_id))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// List the user's analyses, newest first
    pub async fn list_midterm_analyses(&self, user_id: Uuid) -> Result<Vec<MidtermAnalysis>> {
        MidtermAnalysisEntity::find()
            .filter(MidtermAnalysisColumn::UserId.eq(user_id))
            .order_by_desc(MidtermAnalysisColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Material & Resource Operations
    // ========================================================================

    /// Persist uploaded material metadata
    pub async fn save_uploaded_material(
        &self,
        user_id: Uuid,
        new: NewUploadedMaterial,
    ) -> Result<UploadedMaterial> {
        let now = chrono::Utc::now();

        let material = UploadedMaterialActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            filename: Set(new.filename),
            file_type: Set(new.file_type),
            file_size: Set(new.file_size),
            extracted_text: Set(new.extracted_text),
            topics: Set(new.topics),
            subject: Set(new.subject),
            created_at: Set(now.into()),
        };

        material.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Persist a batch of recommended resources for the topics they address
    pub async fn save_recommended_resources(
        &self,
        user_id: Uuid,
        topics: &[String],
        materials: &[StudyMaterial],
    ) -> Result<()> {
        let now = chrono::Utc::now();
        let topics_json = serde_json::to_value(topics)?;

        for material in materials {
            let row = RecommendedResourceActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(user_id),
                title: Set(material.title.clone()),
                description: Set(material.description.clone()),
                url: Set(material.url.clone()),
                topics: Set(topics_json.clone()),
                source: Set(material
                    .source
                    .clone()
                    .unwrap_or_else(|| "Perplexity".to_string())),
                created_at: Set(now.into()),
            };

            row.insert(self.write_conn()).await?;
        }

        Ok(())
    }

    // ========================================================================
    // Activity & Cache Operations
    // ========================================================================

    /// Timestamp of the user's newest activity (quiz result or midterm
    /// analysis), used for cache staleness checks
    pub async fn latest_activity_at(
        &self,
        user_id: Uuid,
    ) -> Result<Option<chrono::DateTime<chrono::FixedOffset>>> {
        let latest_quiz = QuizResultEntity::find()
            .filter(QuizResultColumn::UserId.eq(user_id))
            .order_by_desc(QuizResultColumn::CompletedAt)
            .one(self.read_conn())
            .await?
            .map(|r| r.completed_at);

        let latest_midterm = MidtermAnalysisEntity::find()
            .filter(MidtermAnalysisColumn::UserId.eq(user_id))
            .order_by_desc(MidtermAnalysisColumn::CreatedAt)
            .one(self.read_conn())
            .await?
            .map(|a| a.created_at);

        Ok(match (latest_quiz, latest_midterm) {
            (Some(q), Some(m)) => Some(q.max(m)),
            (Some(q), None) => Some(q),
            (None, Some(m)) => Some(m),
            (None, None) => None,
        })
    }

    /// Read the user's cached resources row
    pub async fn get_resources_cache(&self, user_id: Uuid) -> Result<Option<ResourcesCache>> {
        ResourcesCacheEntity::find()
            .filter(ResourcesCacheColumn::UserId.eq(user_id))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Write the user's cached resources row (one row per user)
    pub async fn upsert_resources_cache(
        &self,
        user_id: Uuid,
        record: CachedResourcesRecord,
    ) -> Result<()> {
        let now = chrono::Utc::now();

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO user_resources_cache (
                id, user_id, resources, recommended_topics, learning_path,
                total_weak_topics, cached_at, data_timestamp
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id) DO UPDATE SET
                resources = EXCLUDED.resources,
                recommended_topics = EXCLUDED.recommended_topics,
                learning_path = EXCLUDED.learning_path,
                total_weak_topics = EXCLUDED.total_weak_topics,
                cached_at = EXCLUDED.cached_at,
                data_timestamp = EXCLUDED.data_timestamp
            "#,
            vec![
                Uuid::new_v4().into(),
                user_id.into(),
                record.resources.into(),
                record.recommended_topics.into(),
                record.learning_path.into(),
                record.total_weak_topics.into(),
                now.into(),
                record.data_timestamp.into(),
            ],
        );

        use sea_orm::ConnectionTrait;
        self.write_conn().execute(stmt).await?;
        Ok(())
    }

    /// User ids that currently hold a cache row, oldest refresh first
    /// (used by the background refresh sweep)
    pub async fn list_cached_user_ids(&self, limit: u64) -> Result<Vec<Uuid>> {
        let rows = ResourcesCacheEntity::find()
            .order_by_asc(ResourcesCacheColumn::CachedAt)
            .limit(limit)
            .all(self.read_conn())
            .await?;

        Ok(rows.into_iter().map(|r| r.user_id).collect())
    }
}
