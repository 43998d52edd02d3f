//! SQLite-backed store.
//!
//! Multi-row invariants are delegated to unique indexes: `content_hash`
//! for global dedup, `(recipient_id, question_id)` for per-recipient
//! dedup. Selection and assignment run inside one transaction; a loser of
//! a concurrent claim retries once and surfaces fewer rows, never
//! duplicates.

use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::QueryBuilder;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::hash::content_hash;
use crate::models::{
    AssignOutcome, ImportOutcome, InsertOutcome, NewQuestion, Question, QuestionFilter, Recipient,
};

const SELECT_QUESTION_COLUMNS: &str =
    "SELECT id, prompt, options_json, answer, topic, min_age, max_age, content_hash, created_at \
     FROM questions";

#[derive(Debug, Clone, sqlx::FromRow)]
struct QuestionRow {
    id: i64,
    prompt: String,
    options_json: String,
    answer: String,
    topic: String,
    min_age: i64,
    max_age: i64,
    content_hash: String,
    created_at: String,
}

impl QuestionRow {
    fn into_question(self) -> Result<Question, StoreError> {
        let options = serde_json::from_str(&self.options_json)
            .map_err(|source| StoreError::CorruptRecord {
                id: self.id,
                source,
            })?;
        Ok(Question {
            id: self.id,
            prompt: self.prompt,
            options,
            answer: self.answer,
            topic: self.topic,
            min_age: self.min_age,
            max_age: self.max_age,
            content_hash: self.content_hash,
            created_at: self.created_at,
        })
    }
}

/// Question repository handle. Cheap to clone; all clones share one pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the database at `url` and ensure the schema.
    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new().max_connections(5).connect(url).await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// In-memory store for tests. A single connection keeps every query on
    /// the same database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS recipients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                identifier TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS questions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                prompt TEXT NOT NULL,
                options_json TEXT NOT NULL,
                answer TEXT NOT NULL,
                topic TEXT NOT NULL,
                min_age INTEGER NOT NULL,
                max_age INTEGER NOT NULL,
                content_hash TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_questions_topic ON questions(topic)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_questions_age ON questions(min_age, max_age)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS assignments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                recipient_id INTEGER NOT NULL REFERENCES recipients(id),
                question_id INTEGER NOT NULL REFERENCES questions(id),
                assigned_at TEXT NOT NULL,
                seen INTEGER NOT NULL DEFAULT 0,
                UNIQUE(recipient_id, question_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_assignments_recipient \
             ON assignments(recipient_id, question_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Look up a recipient by identifier, creating it on first use.
    pub async fn ensure_recipient(&self, identifier: &str) -> Result<Recipient, StoreError> {
        sqlx::query("INSERT INTO recipients (identifier, created_at) VALUES (?, ?) ON CONFLICT(identifier) DO NOTHING")
            .bind(identifier)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;

        let recipient: Recipient =
            sqlx::query_as("SELECT id, identifier, created_at FROM recipients WHERE identifier = ?")
                .bind(identifier)
                .fetch_one(&self.pool)
                .await?;
        Ok(recipient)
    }

    /// Insert one question under content-hash dedup.
    pub async fn insert_question(&self, q: &NewQuestion) -> Result<InsertOutcome, StoreError> {
        if let Err(reason) = q.validate() {
            return Ok(InsertOutcome::Invalid(reason));
        }

        let hash = content_hash(&q.prompt, &q.answer, &q.options);
        let options_json =
            serde_json::to_string(&q.options).expect("a Vec<String> always serializes");

        let result = sqlx::query(
            r#"
            INSERT INTO questions
                (prompt, options_json, answer, topic, min_age, max_age, content_hash, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(content_hash) DO NOTHING
            "#,
        )
        .bind(&q.prompt)
        .bind(&options_json)
        .bind(&q.answer)
        .bind(&q.topic)
        .bind(q.min_age)
        .bind(q.max_age)
        .bind(&hash)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(InsertOutcome::Duplicate);
        }
        Ok(InsertOutcome::Inserted(result.last_insert_rowid()))
    }

    /// Bulk import; each element is independent. Duplicates and invalid
    /// entries count as skipped.
    pub async fn import_batch(&self, batch: &[NewQuestion]) -> Result<ImportOutcome, StoreError> {
        let mut outcome = ImportOutcome::default();
        for q in batch {
            match self.insert_question(q).await? {
                InsertOutcome::Inserted(_) => outcome.imported += 1,
                InsertOutcome::Duplicate => outcome.skipped += 1,
                InsertOutcome::Invalid(reason) => {
                    warn!(reason, "skipping invalid question in import batch");
                    outcome.skipped += 1;
                }
            }
        }
        Ok(outcome)
    }

    fn select_unassigned_query<'a>(
        recipient_id: i64,
        filter: &'a QuestionFilter,
        limit: i64,
    ) -> QueryBuilder<'a, sqlx::Sqlite> {
        let mut qb = QueryBuilder::new(SELECT_QUESTION_COLUMNS);
        qb.push(" WHERE 1=1");
        if let Some(age) = filter.age {
            qb.push(" AND min_age <= ")
                .push_bind(age)
                .push(" AND max_age >= ")
                .push_bind(age);
        }
        if let Some(topic) = filter.effective_topic() {
            qb.push(" AND lower(topic) LIKE '%' || lower(")
                .push_bind(topic)
                .push(") || '%'");
        }
        qb.push(" AND id NOT IN (SELECT question_id FROM assignments WHERE recipient_id = ")
            .push_bind(recipient_id)
            .push(")");
        qb.push(" ORDER BY id ASC LIMIT ").push_bind(limit);
        qb
    }

    /// Matching questions not yet assigned to the recipient, read-only.
    pub async fn select_unassigned(
        &self,
        recipient_id: i64,
        filter: &QuestionFilter,
        limit: i64,
    ) -> Result<Vec<Question>, StoreError> {
        let mut qb = Self::select_unassigned_query(recipient_id, filter, limit);
        let rows: Vec<QuestionRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(QuestionRow::into_question).collect()
    }

    /// Record assignments as a single atomic unit. Any uniqueness
    /// violation rolls back the whole unit.
    pub async fn assign_many(
        &self,
        recipient_id: i64,
        question_ids: &[i64],
    ) -> Result<AssignOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().to_rfc3339();
        for question_id in question_ids {
            let result = sqlx::query(
                "INSERT INTO assignments (recipient_id, question_id, assigned_at, seen) \
                 VALUES (?, ?, ?, 0)",
            )
            .bind(recipient_id)
            .bind(question_id)
            .bind(&now)
            .execute(&mut *tx)
            .await;

            match result {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => {
                    tx.rollback().await?;
                    return Ok(AssignOutcome::Conflict);
                }
                Err(e) => return Err(e.into()),
            }
        }
        tx.commit().await?;
        Ok(AssignOutcome::Ok)
    }

    /// Select up to `limit` matching questions and assign them to the
    /// recipient in one transaction.
    ///
    /// A concurrent claim for the same recipient can race us to a row; the
    /// unique index turns that into a conflict and we retry once against
    /// the updated assignment set.
    pub async fn claim_unassigned(
        &self,
        recipient_id: i64,
        filter: &QuestionFilter,
        limit: i64,
    ) -> Result<Vec<Question>, StoreError> {
        for attempt in 0..2 {
            match self.try_claim(recipient_id, filter, limit).await? {
                Some(questions) => return Ok(questions),
                None => {
                    debug!(recipient_id, attempt, "assignment conflict, retrying claim");
                }
            }
        }
        // Both attempts lost the race; the caller sees an empty hand and
        // the auto-trigger policy takes it from there.
        Ok(Vec::new())
    }

    async fn try_claim(
        &self,
        recipient_id: i64,
        filter: &QuestionFilter,
        limit: i64,
    ) -> Result<Option<Vec<Question>>, StoreError> {
        if limit <= 0 {
            return Ok(Some(Vec::new()));
        }

        let mut tx = self.pool.begin().await?;

        let mut qb = Self::select_unassigned_query(recipient_id, filter, limit);
        let rows: Vec<QuestionRow> = qb.build_query_as().fetch_all(&mut *tx).await?;

        let now = Utc::now().to_rfc3339();
        for row in &rows {
            let result = sqlx::query(
                "INSERT INTO assignments (recipient_id, question_id, assigned_at, seen) \
                 VALUES (?, ?, ?, 0)",
            )
            .bind(recipient_id)
            .bind(row.id)
            .bind(&now)
            .execute(&mut *tx)
            .await;

            match result {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => {
                    tx.rollback().await?;
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            }
        }

        tx.commit().await?;
        rows.into_iter()
            .map(QuestionRow::into_question)
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    /// Count questions matching the filters, ignoring assignments.
    pub async fn count_matching(&self, filter: &QuestionFilter) -> Result<i64, StoreError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM questions WHERE 1=1");
        if let Some(age) = filter.age {
            qb.push(" AND min_age <= ")
                .push_bind(age)
                .push(" AND max_age >= ")
                .push_bind(age);
        }
        if let Some(topic) = filter.effective_topic() {
            qb.push(" AND lower(topic) LIKE '%' || lower(")
                .push_bind(topic)
                .push(") || '%'");
        }
        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count)
    }

    pub async fn count_questions(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM questions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn count_recipients(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM recipients")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Question ids assigned to a recipient, in assignment order.
    pub async fn assigned_question_ids(&self, recipient_id: i64) -> Result<Vec<i64>, StoreError> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT question_id FROM assignments WHERE recipient_id = ? ORDER BY id ASC",
        )
        .bind(recipient_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    /// Readiness check: the database answers a trivial query.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let _: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}
