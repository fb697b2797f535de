//! SQLite storage implementation.
//!
//! Embeddings, jobs, stored source files and search usage share one
//! database. Every write goes through [`SqliteStorage::mutate`]: one
//! IMMEDIATE transaction that also records the audit events.

use std::path::Path;
use std::time::Duration;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, Transaction};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{
    validate_retrieval, AgentSettings, AgentSettingsUpdate, EmbeddingFile, EmbeddingJob,
    EmbeddingRecord, EmbeddingUpdate, EmbeddingUsage, JobStatus, JobType, Metadata, NewEmbedding,
    RankedResult, SourceType, CONTENT_KEY, DEFAULT_SEARCH_LIMIT, DEFAULT_SEARCH_THRESHOLD,
};
use crate::storage::events::{get_events, insert_event, Event, EventType};
use crate::storage::schema::apply_schema;

const EMBEDDING_COLUMNS: &str = "id, name, description, source_type, source_id, embedding_model, \
     embedding, dimensions, metadata, owner_id, file_id, created_at, updated_at";

const JOB_COLUMNS: &str = "id, job_type, status, parameters, file_ids, result, error, owner_id, \
     created_at, updated_at, completed_at";

const AGENT_COLUMNS: &str =
    "agent_id, owner_id, enabled, result_limit, threshold, created_at, updated_at";

const FILE_COLUMNS: &str =
    "id, job_id, file_name, file_type, file_size, file_path, owner_id, created_at";

/// Actor recorded for job transitions driven by the pipeline.
const PIPELINE_ACTOR: &str = "pipeline";

/// SQLite-based storage backend.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

/// Context for a mutation operation, collecting audit events.
pub struct MutationContext {
    /// Name of the operation being performed.
    pub op_name: String,
    /// Actor performing the operation (owner id, pipeline, reaper).
    pub actor: String,
    /// Events to write at the end of the transaction.
    pub events: Vec<Event>,
}

impl MutationContext {
    #[must_use]
    pub fn new(op_name: &str, actor: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            actor: actor.to_string(),
            events: Vec::new(),
        }
    }

    /// Record an event for this operation.
    pub fn record_event(&mut self, entity_type: &str, entity_id: &str, event_type: EventType) {
        self.events.push(
            Event::new(entity_type, entity_id, event_type, &self.actor).with_comment(&self.op_name),
        );
    }

    /// Record an event with old/new values for field tracking.
    pub fn record_change(
        &mut self,
        entity_type: &str,
        entity_id: &str,
        event_type: EventType,
        old_value: Option<String>,
        new_value: Option<String>,
    ) {
        self.events.push(
            Event::new(entity_type, entity_id, event_type, &self.actor)
                .with_values(old_value, new_value)
                .with_comment(&self.op_name),
        );
    }
}

/// Outcome of deleting a record.
#[derive(Debug, Clone, Serialize)]
pub struct DeletedEmbedding {
    pub id: Uuid,

    /// Source file dropped because no record references it anymore
    pub removed_file: Option<EmbeddingFile>,
}

impl SqliteStorage {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        // Default 5 second timeout; serialises writers across processes
        conn.busy_timeout(Duration::from_millis(timeout_ms.unwrap_or(5000)))?;

        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Execute a mutation with the transaction protocol.
    ///
    /// 1. Begins an IMMEDIATE transaction (for write locking)
    /// 2. Executes the mutation closure
    /// 3. Writes audit events
    /// 4. Commits (dropping the transaction on error rolls back)
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails.
    pub fn mutate<F, R>(&mut self, op: &str, actor: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let mut ctx = MutationContext::new(op, actor);
        let result = f(&tx, &mut ctx)?;

        for event in &ctx.events {
            insert_event(&tx, event)?;
        }

        tx.commit()?;
        Ok(result)
    }

    // ====================
    // Embedding Operations
    // ====================

    /// Store a new embedding record.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` when the name is blank, the vector is empty or the
    /// metadata lacks a string `content` entry.
    pub fn insert_embedding(&mut self, new: &NewEmbedding) -> Result<Uuid> {
        if new.name.trim().is_empty() {
            return Err(Error::InvalidParameter("name must not be empty".into()));
        }
        if new.vector.is_empty() {
            return Err(Error::InvalidParameter("embedding vector must not be empty".into()));
        }
        require_content(&new.metadata)?;

        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let now = chrono::Utc::now().timestamp_millis();
        let metadata = serde_json::to_string(&new.metadata)?;
        let blob = vector_to_blob(&new.vector);

        self.mutate("insert_embedding", &new.owner_id.to_string(), |tx, ctx| {
            tx.execute(
                &format!(
                    "INSERT INTO embeddings ({EMBEDDING_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)"
                ),
                rusqlite::params![
                    id_str,
                    new.name,
                    new.description,
                    new.source_type.as_str(),
                    new.source_id,
                    new.embedding_model,
                    blob,
                    new.vector.len() as i64,
                    metadata,
                    new.owner_id.to_string(),
                    new.file_id,
                    now,
                ],
            )?;
            ctx.record_event("embedding", &id_str, EventType::EmbeddingCreated);
            Ok(())
        })?;

        Ok(id)
    }

    /// Get one record owned by `owner`.
    ///
    /// # Errors
    ///
    /// `EmbeddingNotFound` unless both id and owner match.
    pub fn get_embedding(&self, id: Uuid, owner: Uuid) -> Result<EmbeddingRecord> {
        self.conn
            .query_row(
                &format!("SELECT {EMBEDDING_COLUMNS} FROM embeddings WHERE id = ?1 AND owner_id = ?2"),
                rusqlite::params![id.to_string(), owner.to_string()],
                map_embedding,
            )
            .optional()?
            .ok_or_else(|| Error::EmbeddingNotFound { id: id.to_string() })
    }

    /// List an owner's records in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_embeddings(&self, owner: Uuid, limit: Option<usize>) -> Result<Vec<EmbeddingRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EMBEDDING_COLUMNS} FROM embeddings
             WHERE owner_id = ?1
             ORDER BY rowid ASC
             LIMIT ?2"
        ))?;

        let limit = limit.map_or(-1, |l| l as i64);
        let rows = stmt.query_map(rusqlite::params![owner.to_string(), limit], map_embedding)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    /// Count an owner's records.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_embeddings(&self, owner: Uuid) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM embeddings WHERE owner_id = ?1",
            [owner.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Exact nearest-neighbour search over an owner's records.
    ///
    /// Scores every vector of the query's dimensionality by cosine
    /// similarity, keeps those at or above `threshold`, and returns the best
    /// `limit` in descending order. Equal scores keep insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn search_embeddings(
        &self,
        owner: Uuid,
        query_vector: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<RankedResult>> {
        if query_vector.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(
            "SELECT id, name, metadata, embedding FROM embeddings
             WHERE owner_id = ?1 AND dimensions = ?2
             ORDER BY rowid ASC",
        )?;

        let rows = stmt.query_map(
            rusqlite::params![owner.to_string(), query_vector.len() as i64],
            |row| {
                Ok((
                    uuid_column(row, 0)?,
                    row.get::<_, String>(1)?,
                    json_column::<Metadata>(row, 2)?,
                    blob_to_vector(&row.get::<_, Vec<u8>>(3)?),
                ))
            },
        )?;

        let mut results = Vec::new();
        for row in rows {
            let (id, name, metadata, vector) = row?;
            let similarity = cosine_similarity(query_vector, &vector);
            if similarity < threshold {
                continue;
            }
            let content = metadata
                .get(CONTENT_KEY)
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string();
            results.push(RankedResult {
                id,
                name,
                content,
                metadata,
                similarity,
            });
        }

        // sort_by is stable: ties stay in rowid order
        results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        results.truncate(limit);

        Ok(results)
    }

    /// Apply a partial update to one record.
    ///
    /// # Errors
    ///
    /// `EmbeddingNotFound` unless both id and owner match; `InvalidParameter`
    /// for a blank name or replacement metadata without `content`.
    pub fn update_embedding(
        &mut self,
        id: Uuid,
        owner: Uuid,
        update: &EmbeddingUpdate,
    ) -> Result<EmbeddingRecord> {
        if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(Error::InvalidParameter("name must not be empty".into()));
        }
        if let Some(metadata) = &update.metadata {
            require_content(metadata)?;
        }

        let id_str = id.to_string();
        let owner_str = owner.to_string();
        let metadata = update.metadata.as_ref().map(serde_json::to_string).transpose()?;
        let now = chrono::Utc::now().timestamp_millis();

        self.mutate("update_embedding", &owner_str, |tx, ctx| {
            let old_name: Option<String> = tx
                .query_row(
                    "SELECT name FROM embeddings WHERE id = ?1 AND owner_id = ?2",
                    rusqlite::params![id_str, owner_str],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(old_name) = old_name else {
                return Err(Error::EmbeddingNotFound { id: id_str.clone() });
            };

            if update.is_empty() {
                return Ok(());
            }

            tx.execute(
                "UPDATE embeddings SET
                   name = COALESCE(?3, name),
                   description = COALESCE(?4, description),
                   metadata = COALESCE(?5, metadata),
                   updated_at = ?6
                 WHERE id = ?1 AND owner_id = ?2",
                rusqlite::params![id_str, owner_str, update.name, update.description, metadata, now],
            )?;

            ctx.record_change(
                "embedding",
                &id_str,
                EventType::EmbeddingUpdated,
                Some(old_name),
                update.name.clone(),
            );
            Ok(())
        })?;

        self.get_embedding(id, owner)
    }

    /// Delete one record, then its source file if nothing else uses it.
    ///
    /// The copied file on disk is removed after the transaction commits; a
    /// failure there is logged, not returned.
    ///
    /// # Errors
    ///
    /// `EmbeddingNotFound` unless both id and owner match.
    pub fn delete_embedding(&mut self, id: Uuid, owner: Uuid) -> Result<DeletedEmbedding> {
        let id_str = id.to_string();
        let owner_str = owner.to_string();

        let removed_file = self.mutate("delete_embedding", &owner_str, |tx, ctx| {
            let file_id: Option<Option<String>> = tx
                .query_row(
                    "SELECT file_id FROM embeddings WHERE id = ?1 AND owner_id = ?2",
                    rusqlite::params![id_str, owner_str],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(file_id) = file_id else {
                return Err(Error::EmbeddingNotFound { id: id_str.clone() });
            };

            tx.execute("DELETE FROM embeddings WHERE id = ?1", [&id_str])?;
            ctx.record_event("embedding", &id_str, EventType::EmbeddingDeleted);

            let Some(file_id) = file_id else {
                return Ok(None);
            };

            let remaining: i64 = tx.query_row(
                "SELECT COUNT(*) FROM embeddings WHERE file_id = ?1",
                [&file_id],
                |row| row.get(0),
            )?;
            if remaining > 0 {
                return Ok(None);
            }

            let file = tx
                .query_row(
                    &format!("SELECT {FILE_COLUMNS} FROM embedding_files WHERE id = ?1"),
                    [&file_id],
                    map_file,
                )
                .optional()?;

            if file.is_some() {
                tx.execute("DELETE FROM embedding_files WHERE id = ?1", [&file_id])?;
                ctx.record_event("file", &file_id, EventType::FileRemoved);
            }
            Ok(file)
        })?;

        if let Some(file) = &removed_file {
            if let Err(e) = std::fs::remove_file(&file.file_path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %file.file_path, error = %e, "Failed to remove stored file");
                }
            }
        }

        Ok(DeletedEmbedding { id, removed_file })
    }

    // ==============
    // Job Operations
    // ==============

    /// Create a job in `processing`.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn create_job(
        &mut self,
        job_type: JobType,
        owner: Uuid,
        parameters: &Metadata,
    ) -> Result<EmbeddingJob> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let now = chrono::Utc::now().timestamp_millis();
        let params_json = serde_json::to_string(parameters)?;

        self.mutate("create_job", &owner.to_string(), |tx, ctx| {
            tx.execute(
                "INSERT INTO embedding_jobs (id, job_type, status, parameters, owner_id, created_at, updated_at)
                 VALUES (?1, ?2, 'processing', ?3, ?4, ?5, ?5)",
                rusqlite::params![id_str, job_type.as_str(), params_json, owner.to_string(), now],
            )?;
            ctx.record_event("job", &id_str, EventType::JobCreated);
            Ok(())
        })?;

        Ok(EmbeddingJob {
            id,
            job_type,
            status: JobStatus::Processing,
            parameters: parameters.clone(),
            file_ids: None,
            result: None,
            error: None,
            owner_id: owner,
            created_at: now,
            updated_at: now,
            completed_at: None,
        })
    }

    /// Attach stored source files to a job.
    ///
    /// # Errors
    ///
    /// `JobNotFound` if the job does not exist.
    pub fn set_job_files(&mut self, job_id: Uuid, file_ids: &[String]) -> Result<()> {
        let file_ids = serde_json::to_string(file_ids)?;
        let now = chrono::Utc::now().timestamp_millis();
        let changed = self.conn.execute(
            "UPDATE embedding_jobs SET file_ids = ?2, updated_at = ?3 WHERE id = ?1",
            rusqlite::params![job_id.to_string(), file_ids, now],
        )?;
        if changed == 0 {
            return Err(Error::JobNotFound { id: job_id.to_string() });
        }
        Ok(())
    }

    /// Record progress on a running job.
    ///
    /// Keeps `updated_at` fresh so [`Self::fail_stale_jobs`] leaves it alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn touch_job(&mut self, job_id: Uuid) -> Result<()> {
        self.conn.execute(
            "UPDATE embedding_jobs SET updated_at = ?2 WHERE id = ?1 AND status = 'processing'",
            rusqlite::params![job_id.to_string(), chrono::Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }

    /// Move a job to `completed`.
    ///
    /// # Errors
    ///
    /// `JobNotFound`, or `InvalidJobTransition` if the job is not processing.
    pub fn complete_job(&mut self, job_id: Uuid, result: &Metadata) -> Result<EmbeddingJob> {
        self.finish_job(job_id, JobStatus::Completed, Some(result), None)
    }

    /// Move a job to `failed`, optionally with partial-progress counts.
    ///
    /// # Errors
    ///
    /// `JobNotFound`, or `InvalidJobTransition` if the job is not processing.
    pub fn fail_job(
        &mut self,
        job_id: Uuid,
        error: &str,
        result: Option<&Metadata>,
    ) -> Result<EmbeddingJob> {
        self.finish_job(job_id, JobStatus::Failed, result, Some(error))
    }

    fn finish_job(
        &mut self,
        job_id: Uuid,
        next: JobStatus,
        result: Option<&Metadata>,
        error: Option<&str>,
    ) -> Result<EmbeddingJob> {
        let id_str = job_id.to_string();
        let result = result.map(serde_json::to_string).transpose()?;
        let now = chrono::Utc::now().timestamp_millis();
        let (op, event) = match next {
            JobStatus::Completed => ("complete_job", EventType::JobCompleted),
            _ => ("fail_job", EventType::JobFailed),
        };

        self.mutate(op, PIPELINE_ACTOR, |tx, ctx| {
            let status: Option<String> = tx
                .query_row(
                    "SELECT status FROM embedding_jobs WHERE id = ?1",
                    [&id_str],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(status) = status else {
                return Err(Error::JobNotFound { id: id_str.clone() });
            };
            let current = JobStatus::from_str(&status)
                .ok_or_else(|| Error::Store(format!("job {id_str} has unknown status '{status}'")))?;

            if !current.can_transition_to(next) {
                return Err(Error::InvalidJobTransition {
                    id: id_str.clone(),
                    from: current.as_str().to_string(),
                    to: next.as_str().to_string(),
                });
            }

            tx.execute(
                "UPDATE embedding_jobs SET
                   status = ?2,
                   result = COALESCE(?3, result),
                   error = ?4,
                   updated_at = ?5,
                   completed_at = ?5
                 WHERE id = ?1",
                rusqlite::params![id_str, next.as_str(), result, error, now],
            )?;

            ctx.record_change(
                "job",
                &id_str,
                event,
                Some(current.as_str().to_string()),
                Some(next.as_str().to_string()),
            );
            Ok(())
        })?;

        self.load_job(job_id)
    }

    fn load_job(&self, job_id: Uuid) -> Result<EmbeddingJob> {
        self.conn
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM embedding_jobs WHERE id = ?1"),
                [job_id.to_string()],
                map_job,
            )
            .optional()?
            .ok_or_else(|| Error::JobNotFound { id: job_id.to_string() })
    }

    /// Get a job owned by `owner`.
    ///
    /// # Errors
    ///
    /// `JobNotFound` when missing or owned by someone else.
    pub fn get_job(&self, job_id: Uuid, owner: Uuid) -> Result<EmbeddingJob> {
        self.conn
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM embedding_jobs WHERE id = ?1 AND owner_id = ?2"),
                rusqlite::params![job_id.to_string(), owner.to_string()],
                map_job,
            )
            .optional()?
            .ok_or_else(|| Error::JobNotFound { id: job_id.to_string() })
    }

    /// List an owner's jobs, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_jobs(
        &self,
        owner: Uuid,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<EmbeddingJob>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM embedding_jobs
             WHERE owner_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?3"
        ))?;

        let rows = stmt.query_map(
            rusqlite::params![owner.to_string(), status.map(|s| s.as_str()), limit as i64],
            map_job,
        )?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    /// Fail every `processing` job without progress for `max_age`.
    ///
    /// An ingestion that died mid-run would otherwise stay `processing`
    /// forever and pollers would never see a terminal state.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn fail_stale_jobs(&mut self, max_age: Duration) -> Result<Vec<Uuid>> {
        let now = chrono::Utc::now().timestamp_millis();
        let cutoff = now.saturating_sub(i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX));
        let message = format!("abandoned: no progress for over {}s", max_age.as_secs());

        let ids: Vec<String> = self.mutate("fail_stale_jobs", "reaper", |tx, ctx| {
            let ids: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM embedding_jobs
                     WHERE status = 'processing' AND updated_at < ?1
                     ORDER BY created_at ASC",
                )?;
                let rows = stmt.query_map([cutoff], |row| row.get(0))?;
                rows.collect::<std::result::Result<_, _>>()?
            };

            for id in &ids {
                tx.execute(
                    "UPDATE embedding_jobs SET status = 'failed', error = ?2, updated_at = ?3, completed_at = ?3
                     WHERE id = ?1 AND status = 'processing'",
                    rusqlite::params![id, message, now],
                )?;
                ctx.record_change(
                    "job",
                    id,
                    EventType::JobFailed,
                    Some(JobStatus::Processing.as_str().to_string()),
                    Some(JobStatus::Failed.as_str().to_string()),
                );
            }
            Ok(ids)
        })?;

        ids.iter()
            .map(|id| {
                Uuid::parse_str(id).map_err(|e| Error::Store(format!("invalid job id '{id}': {e}")))
            })
            .collect()
    }

    // ===============
    // File Operations
    // ===============

    /// Record a stored source file.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails (e.g. unknown job).
    pub fn insert_file(&mut self, file: &EmbeddingFile) -> Result<()> {
        self.mutate("insert_file", &file.owner_id.to_string(), |tx, ctx| {
            tx.execute(
                &format!(
                    "INSERT INTO embedding_files ({FILE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                ),
                rusqlite::params![
                    file.id,
                    file.job_id.to_string(),
                    file.file_name,
                    file.file_type,
                    file.file_size as i64,
                    file.file_path,
                    file.owner_id.to_string(),
                    file.created_at,
                ],
            )?;
            ctx.record_event("file", &file.id, EventType::FileStored);
            Ok(())
        })
    }

    /// Get a stored file by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_file(&self, id: &str) -> Result<Option<EmbeddingFile>> {
        self.conn
            .query_row(
                &format!("SELECT {FILE_COLUMNS} FROM embedding_files WHERE id = ?1"),
                [id],
                map_file,
            )
            .optional()
            .map_err(Error::from)
    }

    /// Files stored for a job, in upload order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_job_files(&self, job_id: Uuid) -> Result<Vec<EmbeddingFile>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {FILE_COLUMNS} FROM embedding_files WHERE job_id = ?1 ORDER BY rowid ASC"
        ))?;
        let rows = stmt.query_map([job_id.to_string()], map_file)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // ================
    // Usage Operations
    // ================

    /// Log which records a search served.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn record_usage(
        &mut self,
        owner: Uuid,
        query: &str,
        agent_id: Option<&str>,
        hits: &[RankedResult],
    ) -> Result<usize> {
        if hits.is_empty() {
            return Ok(0);
        }
        let now = chrono::Utc::now().timestamp_millis();
        let owner_str = owner.to_string();

        self.mutate("record_usage", &owner_str, |tx, _ctx| {
            let mut stmt = tx.prepare(
                "INSERT INTO embedding_usage (embedding_id, agent_id, query, similarity, owner_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for hit in hits {
                stmt.execute(rusqlite::params![
                    hit.id.to_string(),
                    agent_id,
                    query,
                    f64::from(hit.similarity),
                    owner_str,
                    now,
                ])?;
            }
            Ok(hits.len())
        })
    }

    /// Usage history of one record, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_usage(
        &self,
        embedding_id: Uuid,
        owner: Uuid,
        limit: usize,
    ) -> Result<Vec<EmbeddingUsage>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, embedding_id, agent_id, query, similarity, owner_id, created_at
             FROM embedding_usage
             WHERE embedding_id = ?1 AND owner_id = ?2
             ORDER BY created_at DESC, id DESC
             LIMIT ?3",
        )?;

        let rows = stmt.query_map(
            rusqlite::params![embedding_id.to_string(), owner.to_string(), limit as i64],
            |row| {
                Ok(EmbeddingUsage {
                    id: row.get(0)?,
                    embedding_id: uuid_column(row, 1)?,
                    agent_id: row.get(2)?,
                    query: row.get(3)?,
                    similarity: row.get::<_, f64>(4)? as f32,
                    owner_id: uuid_column(row, 5)?,
                    created_at: row.get(6)?,
                })
            },
        )?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // ==============
    // Audit History
    // ==============

    /// Audit events of one record, newest first.
    ///
    /// # Errors
    ///
    /// `EmbeddingNotFound` unless both id and owner match.
    pub fn embedding_history(&self, id: Uuid, owner: Uuid, limit: Option<u32>) -> Result<Vec<Event>> {
        self.get_embedding(id, owner)?;
        Ok(get_events(&self.conn, "embedding", &id.to_string(), limit)?)
    }

    /// Audit events of one job, newest first.
    ///
    /// # Errors
    ///
    /// `JobNotFound` when missing or owned by someone else.
    pub fn job_history(&self, job_id: Uuid, owner: Uuid, limit: Option<u32>) -> Result<Vec<Event>> {
        self.get_job(job_id, owner)?;
        Ok(get_events(&self.conn, "job", &job_id.to_string(), limit)?)
    }

    // ========================
    // Agent Settings Operations
    // ========================

    /// Saved retrieval settings of an agent, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_agent_settings(&self, owner: Uuid, agent_id: &str) -> Result<Option<AgentSettings>> {
        self.conn
            .query_row(
                &format!("SELECT {AGENT_COLUMNS} FROM agent_settings WHERE owner_id = ?1 AND agent_id = ?2"),
                rusqlite::params![owner.to_string(), agent_id],
                map_agent_settings,
            )
            .optional()
            .map_err(Error::from)
    }

    /// Create or change an agent's retrieval settings.
    ///
    /// Fields left `None` keep their saved value, or the search default for
    /// a new agent.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` for a blank agent id, a zero limit or a threshold
    /// outside [-1, 1].
    pub fn save_agent_settings(
        &mut self,
        owner: Uuid,
        agent_id: &str,
        update: &AgentSettingsUpdate,
    ) -> Result<AgentSettings> {
        let agent_id = agent_id.trim();
        if agent_id.is_empty() {
            return Err(Error::InvalidParameter("agent id must not be empty".into()));
        }

        let existing = self.get_agent_settings(owner, agent_id)?;
        let now = chrono::Utc::now().timestamp_millis();
        let settings = AgentSettings {
            agent_id: agent_id.to_string(),
            owner_id: owner,
            enabled: update
                .enabled
                .or(existing.as_ref().map(|s| s.enabled))
                .unwrap_or(true),
            limit: update
                .limit
                .or(existing.as_ref().map(|s| s.limit))
                .unwrap_or(DEFAULT_SEARCH_LIMIT),
            threshold: update
                .threshold
                .or(existing.as_ref().map(|s| s.threshold))
                .unwrap_or(DEFAULT_SEARCH_THRESHOLD),
            created_at: existing.as_ref().map_or(now, |s| s.created_at),
            updated_at: now,
        };
        validate_retrieval(settings.limit, settings.threshold)?;

        let old_value = existing.as_ref().map(serde_json::to_string).transpose()?;
        let new_value = serde_json::to_string(&settings)?;
        let owner_str = owner.to_string();

        self.mutate("save_agent_settings", &owner_str, |tx, ctx| {
            tx.execute(
                "INSERT INTO agent_settings (owner_id, agent_id, enabled, result_limit, threshold, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (owner_id, agent_id) DO UPDATE SET
                   enabled = excluded.enabled,
                   result_limit = excluded.result_limit,
                   threshold = excluded.threshold,
                   updated_at = excluded.updated_at",
                rusqlite::params![
                    owner_str,
                    settings.agent_id,
                    settings.enabled,
                    settings.limit as i64,
                    f64::from(settings.threshold),
                    settings.created_at,
                    settings.updated_at,
                ],
            )?;
            ctx.record_change(
                "agent_settings",
                &settings.agent_id,
                EventType::AgentSettingsSaved,
                old_value,
                Some(new_value),
            );
            Ok(())
        })?;

        Ok(settings)
    }
}

fn require_content(metadata: &Metadata) -> Result<()> {
    if metadata.get(CONTENT_KEY).is_some_and(serde_json::Value::is_string) {
        Ok(())
    } else {
        Err(Error::InvalidParameter(format!(
            "metadata must carry a string '{CONTENT_KEY}' entry"
        )))
    }
}

fn conversion_error(idx: usize, ty: Type, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, message.into())
}

fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let value: String = row.get(idx)?;
    Uuid::parse_str(&value)
        .map_err(|e| conversion_error(idx, Type::Text, format!("invalid uuid '{value}': {e}")))
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let value: String = row.get(idx)?;
    serde_json::from_str(&value)
        .map_err(|e| conversion_error(idx, Type::Text, format!("invalid json: {e}")))
}

fn optional_json_column<T: serde::de::DeserializeOwned>(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => json_column(row, idx).map(Some),
        None => Ok(None),
    }
}

fn map_embedding(row: &Row<'_>) -> rusqlite::Result<EmbeddingRecord> {
    let dimensions: i64 = row.get(7)?;
    Ok(EmbeddingRecord {
        id: uuid_column(row, 0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        source_type: SourceType::from_str(&row.get::<_, String>(3)?),
        source_id: row.get(4)?,
        embedding_model: row.get(5)?,
        vector: blob_to_vector(&row.get::<_, Vec<u8>>(6)?),
        dimensions: dimensions as usize,
        metadata: json_column(row, 8)?,
        owner_id: uuid_column(row, 9)?,
        file_id: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn map_job(row: &Row<'_>) -> rusqlite::Result<EmbeddingJob> {
    let job_type: String = row.get(1)?;
    let status: String = row.get(2)?;
    Ok(EmbeddingJob {
        id: uuid_column(row, 0)?,
        job_type: JobType::from_str(&job_type)
            .ok_or_else(|| conversion_error(1, Type::Text, format!("unknown job type '{job_type}'")))?,
        status: JobStatus::from_str(&status)
            .ok_or_else(|| conversion_error(2, Type::Text, format!("unknown job status '{status}'")))?,
        parameters: json_column(row, 3)?,
        file_ids: optional_json_column(row, 4)?,
        result: optional_json_column(row, 5)?,
        error: row.get(6)?,
        owner_id: uuid_column(row, 7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        completed_at: row.get(10)?,
    })
}

fn map_agent_settings(row: &Row<'_>) -> rusqlite::Result<AgentSettings> {
    let limit: i64 = row.get(3)?;
    Ok(AgentSettings {
        agent_id: row.get(0)?,
        owner_id: uuid_column(row, 1)?,
        enabled: row.get(2)?,
        limit: limit.max(1) as usize,
        threshold: row.get::<_, f64>(4)? as f32,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn map_file(row: &Row<'_>) -> rusqlite::Result<EmbeddingFile> {
    let file_size: i64 = row.get(4)?;
    Ok(EmbeddingFile {
        id: row.get(0)?,
        job_id: uuid_column(row, 1)?,
        file_name: row.get(2)?,
        file_type: row.get(3)?,
        file_size: file_size.max(0) as u64,
        file_path: row.get(5)?,
        owner_id: uuid_column(row, 6)?,
        created_at: row.get(7)?,
    })
}

/// Encode a vector as little-endian f32 bytes.
#[must_use]
pub fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode little-endian f32 bytes. Trailing partial values are ignored.
#[must_use]
pub fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .collect()
}

/// Compute cosine similarity between two vectors.
///
/// Returns a value between -1.0 and 1.0, where:
/// - 1.0 means identical direction
/// - 0.0 means orthogonal (no similarity)
/// - -1.0 means opposite direction
///
/// Mismatched lengths and zero vectors score 0.0.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot_product = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;

    for (x, y) in a.iter().zip(b.iter()) {
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let magnitude = (norm_a * norm_b).sqrt();
    if magnitude == 0.0 {
        0.0
    } else {
        dot_product / magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn owner() -> Uuid {
        Uuid::new_v4()
    }

    fn content_meta(content: &str) -> Metadata {
        let mut meta = Metadata::new();
        meta.insert(CONTENT_KEY.into(), json!(content));
        meta
    }

    fn new_embedding(owner: Uuid, name: &str, content: &str, vector: Vec<f32>) -> NewEmbedding {
        NewEmbedding {
            name: name.to_string(),
            description: None,
            source_type: SourceType::Text,
            source_id: None,
            embedding_model: "hash-embed".into(),
            vector,
            metadata: content_meta(content),
            owner_id: owner,
            file_id: None,
        }
    }

    fn stored_file(storage: &mut SqliteStorage, owner: Uuid, path: &str) -> (Uuid, String) {
        let job = storage.create_job(JobType::FileUpload, owner, &Metadata::new()).unwrap();
        let file = EmbeddingFile {
            id: format!("file-{}", Uuid::new_v4()),
            job_id: job.id,
            file_name: "notes.txt".into(),
            file_type: "text/plain".into(),
            file_size: 12,
            file_path: path.to_string(),
            owner_id: owner,
            created_at: 0,
        };
        storage.insert_file(&file).unwrap();
        (job.id, file.id)
    }

    #[test]
    fn test_open_memory() {
        assert!(SqliteStorage::open_memory().is_ok());
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/data/docembed.db");
        SqliteStorage::open(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_insert_and_get_roundtrip() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let alice = owner();
        let mut new = new_embedding(alice, "kb", "hello world", vec![0.5, -0.25, 1.0]);
        new.metadata.insert("chunkIndex".into(), json!(3));

        let id = storage.insert_embedding(&new).unwrap();
        let record = storage.get_embedding(id, alice).unwrap();

        assert_eq!(record.name, "kb");
        assert_eq!(record.vector, vec![0.5, -0.25, 1.0]);
        assert_eq!(record.dimensions, 3);
        assert_eq!(record.content(), "hello world");
        assert_eq!(record.metadata["chunkIndex"], 3);
        assert_eq!(record.source_type, SourceType::Text);

        let events = get_events(storage.conn(), "embedding", &id.to_string(), None).unwrap();
        assert_eq!(events[0].event_type, EventType::EmbeddingCreated);
    }

    #[test]
    fn test_insert_validation() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let alice = owner();

        let mut missing_content = new_embedding(alice, "kb", "x", vec![1.0]);
        missing_content.metadata.clear();
        assert!(matches!(
            storage.insert_embedding(&missing_content),
            Err(Error::InvalidParameter(_))
        ));

        let empty_vector = new_embedding(alice, "kb", "x", vec![]);
        assert!(matches!(
            storage.insert_embedding(&empty_vector),
            Err(Error::InvalidParameter(_))
        ));

        assert_eq!(storage.count_embeddings(alice).unwrap(), 0);
    }

    #[test]
    fn test_ownership_isolation() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let alice = owner();
        let bob = owner();
        let id = storage
            .insert_embedding(&new_embedding(alice, "kb", "secret", vec![1.0, 0.0]))
            .unwrap();

        assert!(matches!(storage.get_embedding(id, bob), Err(Error::EmbeddingNotFound { .. })));
        assert!(storage.search_embeddings(bob, &[1.0, 0.0], -1.0, 10).unwrap().is_empty());
        assert!(storage.list_embeddings(bob, None).unwrap().is_empty());

        let update = EmbeddingUpdate {
            name: Some("stolen".into()),
            ..Default::default()
        };
        assert!(matches!(
            storage.update_embedding(id, bob, &update),
            Err(Error::EmbeddingNotFound { .. })
        ));
        assert!(matches!(storage.delete_embedding(id, bob), Err(Error::EmbeddingNotFound { .. })));

        // Untouched for the real owner
        assert_eq!(storage.get_embedding(id, alice).unwrap().name, "kb");
    }

    #[test]
    fn test_search_ranking_threshold_and_ties() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let alice = owner();

        let first_tie = storage
            .insert_embedding(&new_embedding(alice, "kb", "tie a", vec![1.0, 1.0]))
            .unwrap();
        let best = storage
            .insert_embedding(&new_embedding(alice, "kb", "best", vec![1.0, 0.0]))
            .unwrap();
        let second_tie = storage
            .insert_embedding(&new_embedding(alice, "kb", "tie b", vec![2.0, 2.0]))
            .unwrap();
        storage
            .insert_embedding(&new_embedding(alice, "kb", "opposite", vec![-1.0, 0.0]))
            .unwrap();
        storage
            .insert_embedding(&new_embedding(alice, "kb", "other dims", vec![1.0, 0.0, 0.0]))
            .unwrap();

        let results = storage.search_embeddings(alice, &[1.0, 0.0], 0.5, 10).unwrap();
        let ids: Vec<Uuid> = results.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![best, first_tie, second_tie]);
        assert!((results[0].similarity - 1.0).abs() < 1e-6);
        assert_eq!(results[0].content, "best");
        assert!(results.iter().all(|r| r.similarity >= 0.5));

        // Deterministic across calls
        let again = storage.search_embeddings(alice, &[1.0, 0.0], 0.5, 10).unwrap();
        assert_eq!(again, results);

        let limited = storage.search_embeddings(alice, &[1.0, 0.0], -1.0, 2).unwrap();
        assert_eq!(limited.len(), 2);

        assert!(storage.search_embeddings(alice, &[1.0, 0.0], 0.5, 0).unwrap().is_empty());
    }

    #[test]
    fn test_update_partial() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let alice = owner();
        let mut new = new_embedding(alice, "kb", "text", vec![1.0]);
        new.description = Some("original".into());
        let id = storage.insert_embedding(&new).unwrap();

        let updated = storage
            .update_embedding(
                id,
                alice,
                &EmbeddingUpdate {
                    name: Some("renamed".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.name, "renamed");
        assert_eq!(updated.description.as_deref(), Some("original"));
        assert_eq!(updated.content(), "text");

        let mut meta = content_meta("rewritten");
        meta.insert("tag".into(), json!("x"));
        let updated = storage
            .update_embedding(
                id,
                alice,
                &EmbeddingUpdate {
                    metadata: Some(meta),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.content(), "rewritten");
        assert_eq!(updated.metadata["tag"], "x");

        let err = storage
            .update_embedding(
                id,
                alice,
                &EmbeddingUpdate {
                    metadata: Some(Metadata::new()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));

        let missing = storage
            .update_embedding(Uuid::new_v4(), alice, &EmbeddingUpdate::default())
            .unwrap_err();
        assert!(matches!(missing, Error::EmbeddingNotFound { .. }));
    }

    #[test]
    fn test_delete_removes_file_with_last_reference() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello there").unwrap();

        let mut storage = SqliteStorage::open_memory().unwrap();
        let alice = owner();
        let (_job, file_id) = stored_file(&mut storage, alice, path.to_str().unwrap());

        let mut ids = Vec::new();
        for content in ["hello", "there"] {
            let mut new = new_embedding(alice, "notes", content, vec![1.0, 0.0]);
            new.file_id = Some(file_id.clone());
            ids.push(storage.insert_embedding(&new).unwrap());
        }

        let first = storage.delete_embedding(ids[0], alice).unwrap();
        assert!(first.removed_file.is_none());
        assert!(storage.get_file(&file_id).unwrap().is_some());
        assert!(path.exists());

        let second = storage.delete_embedding(ids[1], alice).unwrap();
        assert_eq!(second.removed_file.map(|f| f.id), Some(file_id.clone()));
        assert!(storage.get_file(&file_id).unwrap().is_none());
        assert!(!path.exists());

        assert!(matches!(
            storage.delete_embedding(ids[1], alice),
            Err(Error::EmbeddingNotFound { .. })
        ));
    }

    #[test]
    fn test_job_lifecycle() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let alice = owner();
        let mut params = Metadata::new();
        params.insert("name".into(), json!("kb"));

        let job = storage.create_job(JobType::TextInput, alice, &params).unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(storage.get_job(job.id, alice).unwrap().parameters["name"], "kb");

        let mut result = Metadata::new();
        result.insert("chunkCount".into(), json!(3));
        let done = storage.complete_job(job.id, &result).unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.result.unwrap()["chunkCount"], 3);
        assert!(done.completed_at.is_some());

        // Terminal states are final
        let err = storage.fail_job(job.id, "late", None).unwrap_err();
        assert!(matches!(err, Error::InvalidJobTransition { .. }));
        let err = storage.complete_job(job.id, &result).unwrap_err();
        assert!(matches!(err, Error::InvalidJobTransition { .. }));
        assert_eq!(storage.get_job(job.id, alice).unwrap().status, JobStatus::Completed);

        assert!(matches!(storage.get_job(job.id, owner()), Err(Error::JobNotFound { .. })));
        assert!(matches!(
            storage.complete_job(Uuid::new_v4(), &result),
            Err(Error::JobNotFound { .. })
        ));
    }

    #[test]
    fn test_fail_job_keeps_partial_result_and_files() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let alice = owner();
        let job = storage.create_job(JobType::FileUpload, alice, &Metadata::new()).unwrap();
        storage.set_job_files(job.id, &["f1".to_string(), "f2".to_string()]).unwrap();

        let mut partial = Metadata::new();
        partial.insert("storedCount".into(), json!(1));
        let failed = storage.fail_job(job.id, "provider down", Some(&partial)).unwrap();

        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("provider down"));
        assert_eq!(failed.result.unwrap()["storedCount"], 1);
        assert_eq!(failed.file_ids, Some(vec!["f1".to_string(), "f2".to_string()]));

        assert!(matches!(
            storage.set_job_files(Uuid::new_v4(), &[]),
            Err(Error::JobNotFound { .. })
        ));
    }

    #[test]
    fn test_list_jobs_newest_first_with_filter() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let alice = owner();
        let a = storage.create_job(JobType::TextInput, alice, &Metadata::new()).unwrap();
        let b = storage.create_job(JobType::TextInput, alice, &Metadata::new()).unwrap();
        storage.create_job(JobType::TextInput, owner(), &Metadata::new()).unwrap();
        storage.complete_job(a.id, &Metadata::new()).unwrap();

        let all = storage.list_jobs(alice, None, 10).unwrap();
        assert_eq!(all.iter().map(|j| j.id).collect::<Vec<_>>(), vec![b.id, a.id]);

        let processing = storage.list_jobs(alice, Some(JobStatus::Processing), 10).unwrap();
        assert_eq!(processing.len(), 1);
        assert_eq!(processing[0].id, b.id);

        assert_eq!(storage.list_jobs(alice, None, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_fail_stale_jobs() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let alice = owner();
        let stale = storage.create_job(JobType::TextInput, alice, &Metadata::new()).unwrap();
        let fresh = storage.create_job(JobType::TextInput, alice, &Metadata::new()).unwrap();
        let done = storage.create_job(JobType::TextInput, alice, &Metadata::new()).unwrap();
        storage.complete_job(done.id, &Metadata::new()).unwrap();

        storage
            .conn()
            .execute(
                "UPDATE embedding_jobs SET updated_at = 0 WHERE id IN (?1, ?2)",
                rusqlite::params![stale.id.to_string(), done.id.to_string()],
            )
            .unwrap();

        let reaped = storage.fail_stale_jobs(Duration::from_secs(60)).unwrap();
        assert_eq!(reaped, vec![stale.id]);

        let job = storage.get_job(stale.id, alice).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().starts_with("abandoned"));
        assert_eq!(storage.get_job(fresh.id, alice).unwrap().status, JobStatus::Processing);
        assert_eq!(storage.get_job(done.id, alice).unwrap().status, JobStatus::Completed);
    }

    #[test]
    fn test_usage_recorded_and_cascaded() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let alice = owner();
        let id = storage
            .insert_embedding(&new_embedding(alice, "kb", "hello", vec![1.0, 0.0]))
            .unwrap();

        let hits = storage.search_embeddings(alice, &[1.0, 0.0], 0.0, 5).unwrap();
        assert_eq!(storage.record_usage(alice, "hello?", Some("agent-7"), &hits).unwrap(), 1);

        let usage = storage.list_usage(id, alice, 10).unwrap();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].agent_id.as_deref(), Some("agent-7"));
        assert_eq!(usage[0].query, "hello?");

        storage.delete_embedding(id, alice).unwrap();
        assert!(storage.list_usage(id, alice, 10).unwrap().is_empty());
    }

    #[test]
    fn test_history_is_owner_scoped() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let alice = owner();
        let id = storage
            .insert_embedding(&new_embedding(alice, "kb", "hello", vec![1.0, 0.0]))
            .unwrap();
        let update = EmbeddingUpdate {
            name: Some("renamed".into()),
            ..Default::default()
        };
        storage.update_embedding(id, alice, &update).unwrap();

        let events = storage.embedding_history(id, alice, None).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::EmbeddingUpdated);
        assert_eq!(events[0].new_value.as_deref(), Some("renamed"));
        assert_eq!(events[1].event_type, EventType::EmbeddingCreated);

        assert!(matches!(
            storage.embedding_history(id, owner(), None),
            Err(Error::EmbeddingNotFound { .. })
        ));

        let job = storage.create_job(JobType::TextInput, alice, &Metadata::new()).unwrap();
        storage.complete_job(job.id, &Metadata::new()).unwrap();
        let job_events = storage.job_history(job.id, alice, Some(10)).unwrap();
        assert_eq!(job_events.len(), 2);
        assert!(matches!(
            storage.job_history(job.id, owner(), None),
            Err(Error::JobNotFound { .. })
        ));
    }

    #[test]
    fn test_agent_settings_defaults_merge_and_scope() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let alice = owner();
        assert!(storage.get_agent_settings(alice, "bot").unwrap().is_none());

        let first = storage
            .save_agent_settings(
                alice,
                "bot",
                &AgentSettingsUpdate {
                    limit: Some(3),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(first.enabled);
        assert_eq!(first.limit, 3);
        assert!((first.threshold - DEFAULT_SEARCH_THRESHOLD).abs() < f32::EPSILON);

        let second = storage
            .save_agent_settings(
                alice,
                "bot",
                &AgentSettingsUpdate {
                    enabled: Some(false),
                    threshold: Some(0.25),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(!second.enabled);
        assert_eq!(second.limit, 3);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(storage.get_agent_settings(alice, "bot").unwrap(), Some(second));

        // Another owner's agent of the same name is separate
        assert!(storage.get_agent_settings(owner(), "bot").unwrap().is_none());

        let events = get_events(storage.conn(), "agent_settings", "bot", None).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].old_value.is_some());
        assert!(events[1].old_value.is_none());
    }

    #[test]
    fn test_agent_settings_validation() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let alice = owner();
        let zero = AgentSettingsUpdate {
            limit: Some(0),
            ..Default::default()
        };
        let wide = AgentSettingsUpdate {
            threshold: Some(-1.5),
            ..Default::default()
        };
        for (agent, update) in [("bot", zero), ("bot", wide), ("  ", AgentSettingsUpdate::default())] {
            assert!(matches!(
                storage.save_agent_settings(alice, agent, &update),
                Err(Error::InvalidParameter(_))
            ));
        }
        assert!(storage.get_agent_settings(alice, "bot").unwrap().is_none());
    }

    #[test]
    fn test_blob_roundtrip_and_cosine() {
        let v = vec![0.1f32, -2.5, 3.75];
        assert_eq!(blob_to_vector(&vector_to_blob(&v)), v);

        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
