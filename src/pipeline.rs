//! Embedding pipeline.
//!
//! Orchestrates one ingestion: validate, open a job, chunk, embed every
//! chunk, store one record per chunk, then close the job. Also serves
//! similarity search over the stored records.
//!
//! Writes are not atomic across chunks. When chunk `k` fails, the records
//! already stored stay in place and the failed job reports how many there
//! are (`storedCount`), so a caller can clean up or re-ingest.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::embeddings::chunking::{chunk_document, ChunkConfig};
use crate::embeddings::client::EmbeddingClient;
use crate::error::{Error, Result};
use crate::model::{
    validate_retrieval, AgentSettings, AgentSettingsUpdate, Chunk, Document, EmbeddingFile,
    EmbeddingJob, EmbeddingRecord, EmbeddingUpdate, EmbeddingUsage, JobStatus, JobType, Metadata,
    NewEmbedding, RankedResult, SourceType, DEFAULT_SEARCH_LIMIT, DEFAULT_SEARCH_THRESHOLD,
};
use crate::storage::{DeletedEmbedding, Event, SqliteStorage};

/// File name recorded for pasted text.
pub const TEXT_INPUT_FILE_NAME: &str = "text-input.txt";

/// Store shared between the pipeline and its embedding tasks.
pub type SharedStore = Arc<Mutex<SqliteStorage>>;

/// Pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Model id passed to the provider on every call
    pub model: String,

    /// Parallel embedding calls per ingestion; 1 means sequential
    pub concurrency: usize,

    /// Root directory for copies of uploaded files
    pub files_dir: PathBuf,
}

impl PipelineConfig {
    pub fn new(model: impl Into<String>, files_dir: impl Into<PathBuf>) -> Self {
        Self {
            model: model.into(),
            concurrency: 1,
            files_dir: files_dir.into(),
        }
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

/// Caller-supplied ingestion parameters.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub owner_id: Uuid,

    /// Collection name stored on every record
    pub name: String,

    pub description: Option<String>,
    pub chunk: ChunkConfig,

    /// Copied into every chunk's metadata
    pub metadata: Metadata,
}

impl IngestRequest {
    pub fn new(owner_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            owner_id,
            name: name.into(),
            description: None,
            chunk: ChunkConfig::default(),
            metadata: Metadata::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_chunking(mut self, chunk: ChunkConfig) -> Self {
        self.chunk = chunk;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidParameter("name must not be empty".into()));
        }
        self.chunk.validate()
    }
}

/// An uploaded file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub file_name: String,
    pub file_type: String,
    pub content: Vec<u8>,
}

impl SourceFile {
    pub fn new(file_name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        let file_name = file_name.into();
        Self {
            file_type: guess_file_type(&file_name).to_string(),
            file_name,
            content: content.into(),
        }
    }

    /// Read a file from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or has no file name.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| Error::InvalidParameter(format!("not a file: {}", path.display())))?;
        Ok(Self::new(file_name, std::fs::read(path)?))
    }

    fn text(&self) -> Result<&str> {
        std::str::from_utf8(&self.content).map_err(|_| {
            Error::InvalidInput(format!("{} is not valid UTF-8 text", self.file_name))
        })
    }
}

fn guess_file_type(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

/// Similarity search parameters.
///
/// Unset limit and threshold fall back to the agent's saved settings, then
/// to [`DEFAULT_SEARCH_LIMIT`] and [`DEFAULT_SEARCH_THRESHOLD`].
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub owner_id: Uuid,
    pub limit: Option<usize>,
    pub threshold: Option<f32>,

    /// Selects saved settings and is recorded with each usage row
    pub agent_id: Option<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, owner_id: Uuid) -> Self {
        Self {
            query: query.into(),
            owner_id,
            limit: None,
            threshold: None,
            agent_id: None,
        }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    #[must_use]
    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Effective `(limit, threshold)` given the agent's saved settings.
    fn resolve(&self, agent: Option<&AgentSettings>) -> Result<(usize, f32)> {
        if let Some(agent) = agent.filter(|a| !a.enabled) {
            return Err(Error::InvalidParameter(format!(
                "retrieval is disabled for agent '{}'",
                agent.agent_id
            )));
        }
        let limit = self
            .limit
            .or(agent.map(|a| a.limit))
            .unwrap_or(DEFAULT_SEARCH_LIMIT);
        let threshold = self
            .threshold
            .or(agent.map(|a| a.threshold))
            .unwrap_or(DEFAULT_SEARCH_THRESHOLD);
        validate_retrieval(limit, threshold)?;
        Ok((limit, threshold))
    }
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub job: EmbeddingJob,

    /// Stored records in chunk order
    pub record_ids: Vec<Uuid>,

    pub chunk_count: usize,
}

/// Fields shared by every record of one ingestion.
#[derive(Debug)]
struct RecordTemplate {
    job_id: Uuid,
    owner_id: Uuid,
    name: String,
    description: Option<String>,
    source_type: SourceType,
    model: String,
}

/// One chunk waiting to be embedded.
#[derive(Debug)]
struct WorkItem {
    position: usize,
    chunk: Chunk,
    file_id: Option<String>,
}

/// An ingestion that stopped part way.
struct PartialFailure {
    error: Error,
    stored: usize,
}

/// The embedding pipeline.
pub struct EmbeddingPipeline {
    client: Arc<EmbeddingClient>,
    store: SharedStore,
    config: PipelineConfig,
}

impl EmbeddingPipeline {
    pub fn new(client: EmbeddingClient, store: SharedStore, config: PipelineConfig) -> Self {
        Self {
            client: Arc::new(client),
            store,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Ingest a document as a `text_input` job.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` before any side effect for a blank name, blank
    /// text or invalid chunking. Failures after the job exists are returned
    /// as `JobFailed` carrying the job id and the cause.
    pub async fn ingest_document(&self, document: Document, req: &IngestRequest) -> Result<IngestReport> {
        self.ingest_single(document, req, SourceType::Document).await
    }

    /// Ingest pasted text as a `text_input` job named `text-input.txt`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::ingest_document`].
    pub async fn ingest_text(&self, text: &str, req: &IngestRequest) -> Result<IngestReport> {
        let document = Document::new(TEXT_INPUT_FILE_NAME, text);
        self.ingest_single(document, req, SourceType::Text).await
    }

    async fn ingest_single(
        &self,
        mut document: Document,
        req: &IngestRequest,
        source_type: SourceType,
    ) -> Result<IngestReport> {
        req.validate()?;
        if document.raw_text.trim().is_empty() {
            return Err(Error::InvalidParameter("text must not be empty".into()));
        }
        merge_metadata(&mut document.metadata, &req.metadata);

        let mut parameters = self.job_parameters(req);
        parameters.insert("textLength".into(), json!(document.raw_text.chars().count()));
        let job = self.lock_store()?.create_job(JobType::TextInput, req.owner_id, &parameters)?;

        info!(job_id = %job.id, name = %req.name, "Ingestion started");

        let chunks = match chunk_document(&document, &req.chunk) {
            Ok(chunks) => chunks,
            Err(e) => return Err(self.fail(job.id, PartialFailure { error: e, stored: 0 }, 0)),
        };
        let items = chunks
            .into_iter()
            .enumerate()
            .map(|(position, chunk)| WorkItem {
                position,
                chunk,
                file_id: None,
            })
            .collect();

        self.run_job(job.id, req, source_type, items, "Successfully processed text and created embeddings", None)
            .await
    }

    /// Ingest uploaded files as one `file_upload` job.
    ///
    /// Each file is copied to `<files_dir>/<owner>/<millis>-<name>` and
    /// recorded before any chunk is embedded; every record carries the id
    /// of the file it came from.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` / `InvalidInput` before any side effect for an
    /// empty file list, blank or non-UTF-8 files, or invalid parameters.
    /// Later failures are returned as `JobFailed`.
    pub async fn ingest_files(&self, files: Vec<SourceFile>, req: &IngestRequest) -> Result<IngestReport> {
        req.validate()?;
        if files.is_empty() {
            return Err(Error::InvalidParameter("at least one file is required".into()));
        }
        for file in &files {
            if file.text()?.trim().is_empty() {
                return Err(Error::InvalidParameter(format!("{} is empty", file.file_name)));
            }
        }

        let mut parameters = self.job_parameters(req);
        parameters.insert("fileCount".into(), json!(files.len()));
        let job = self.lock_store()?.create_job(JobType::FileUpload, req.owner_id, &parameters)?;

        info!(job_id = %job.id, files = files.len(), name = %req.name, "File ingestion started");

        let items = match self.store_files(job.id, req, &files) {
            Ok(items) => items,
            Err(e) => return Err(self.fail(job.id, PartialFailure { error: e, stored: 0 }, 0)),
        };

        self.run_job(
            job.id,
            req,
            SourceType::Document,
            items,
            "Successfully processed files and created embeddings",
            Some(files.len()),
        )
        .await
    }

    /// Copy files into the file store, record them and chunk their text.
    fn store_files(&self, job_id: Uuid, req: &IngestRequest, files: &[SourceFile]) -> Result<Vec<WorkItem>> {
        let owner_dir = self.config.files_dir.join(req.owner_id.to_string());
        std::fs::create_dir_all(&owner_dir)?;

        let mut file_ids = Vec::with_capacity(files.len());
        let mut items = Vec::new();

        for file in files {
            let path = unique_file_path(&owner_dir, &file.file_name);
            std::fs::write(&path, &file.content)?;

            let record = EmbeddingFile {
                id: Uuid::new_v4().to_string(),
                job_id,
                file_name: file.file_name.clone(),
                file_type: file.file_type.clone(),
                file_size: file.content.len() as u64,
                file_path: path.to_string_lossy().to_string(),
                owner_id: req.owner_id,
                created_at: chrono::Utc::now().timestamp_millis(),
            };
            self.lock_store()?.insert_file(&record)?;
            debug!(file = %record.file_name, path = %record.file_path, "Stored source file");

            let document = Document::new(file.file_name.clone(), file.text()?)
                .with_metadata(req.metadata.clone());
            for chunk in chunk_document(&document, &req.chunk)? {
                items.push(WorkItem {
                    position: items.len(),
                    chunk,
                    file_id: Some(record.id.clone()),
                });
            }
            file_ids.push(record.id);
        }

        self.lock_store()?.set_job_files(job_id, &file_ids)?;
        Ok(items)
    }

    async fn run_job(
        &self,
        job_id: Uuid,
        req: &IngestRequest,
        source_type: SourceType,
        items: Vec<WorkItem>,
        message: &str,
        file_count: Option<usize>,
    ) -> Result<IngestReport> {
        let chunk_count = items.len();
        let template = Arc::new(RecordTemplate {
            job_id,
            owner_id: req.owner_id,
            name: req.name.clone(),
            description: req.description.clone(),
            source_type,
            model: self.config.model.clone(),
        });

        let outcome = if self.config.concurrency <= 1 {
            self.embed_sequential(&template, items).await
        } else {
            self.embed_parallel(&template, items).await
        };

        let record_ids = match outcome {
            Ok(ids) => ids,
            Err(partial) => return Err(self.fail(job_id, partial, chunk_count)),
        };

        let mut result = Metadata::new();
        result.insert("message".into(), json!(message));
        result.insert("chunkCount".into(), json!(chunk_count));
        result.insert("storedCount".into(), json!(record_ids.len()));
        if let Some(count) = file_count {
            result.insert("fileCount".into(), json!(count));
        }

        let job = self.lock_store()?.complete_job(job_id, &result)?;
        info!(job_id = %job_id, chunks = chunk_count, "Ingestion completed");

        Ok(IngestReport {
            job,
            record_ids,
            chunk_count,
        })
    }

    async fn embed_sequential(
        &self,
        template: &RecordTemplate,
        items: Vec<WorkItem>,
    ) -> std::result::Result<Vec<Uuid>, PartialFailure> {
        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            match embed_and_store(&self.client, &self.store, template, item).await {
                Ok((_, id)) => ids.push(id),
                Err(error) => {
                    return Err(PartialFailure {
                        error,
                        stored: ids.len(),
                    });
                }
            }
        }
        Ok(ids)
    }

    /// Embed with at most `concurrency` calls in flight.
    ///
    /// The first failure aborts the remaining tasks. Records written by
    /// tasks that finished before the abort are kept and counted.
    async fn embed_parallel(
        &self,
        template: &Arc<RecordTemplate>,
        items: Vec<WorkItem>,
    ) -> std::result::Result<Vec<Uuid>, PartialFailure> {
        let max_concurrent = self.config.concurrency;
        let mut pending = items.into_iter();
        let mut join_set = JoinSet::new();
        let mut stored: Vec<(usize, Uuid)> = Vec::new();
        let mut failure = None;

        loop {
            while join_set.len() < max_concurrent {
                let Some(item) = pending.next() else { break };
                let client = Arc::clone(&self.client);
                let store = Arc::clone(&self.store);
                let template = Arc::clone(template);
                join_set.spawn(async move { embed_and_store(&client, &store, &template, item).await });
            }

            let Some(joined) = join_set.join_next().await else { break };
            match joined {
                Ok(Ok(stored_item)) => stored.push(stored_item),
                Ok(Err(e)) => {
                    failure = Some(e);
                    break;
                }
                Err(e) => {
                    failure = Some(Error::Other(format!("embedding task failed: {e}")));
                    break;
                }
            }
        }

        if let Some(error) = failure {
            join_set.abort_all();
            while let Some(joined) = join_set.join_next().await {
                if let Ok(Ok(stored_item)) = joined {
                    stored.push(stored_item);
                }
            }
            return Err(PartialFailure {
                error,
                stored: stored.len(),
            });
        }

        stored.sort_by_key(|(position, _)| *position);
        Ok(stored.into_iter().map(|(_, id)| id).collect())
    }

    /// Mark the job failed and wrap the cause.
    fn fail(&self, job_id: Uuid, partial: PartialFailure, chunk_count: usize) -> Error {
        warn!(
            job_id = %job_id,
            stored = partial.stored,
            chunks = chunk_count,
            error = %partial.error,
            "Ingestion failed"
        );

        let mut result = Metadata::new();
        result.insert("chunkCount".into(), json!(chunk_count));
        result.insert("storedCount".into(), json!(partial.stored));

        let message = partial.error.to_string();
        match self.lock_store() {
            Ok(mut store) => {
                if let Err(e) = store.fail_job(job_id, &message, Some(&result)) {
                    warn!(job_id = %job_id, error = %e, "Could not mark job failed");
                }
            }
            Err(e) => warn!(job_id = %job_id, error = %e, "Could not mark job failed"),
        }

        Error::job_failed(job_id.to_string(), partial.error)
    }

    fn job_parameters(&self, req: &IngestRequest) -> Metadata {
        let mut parameters = Metadata::new();
        parameters.insert("name".into(), json!(req.name));
        parameters.insert("description".into(), json!(req.description));
        parameters.insert("modelId".into(), json!(self.config.model));
        parameters.insert("chunkSize".into(), json!(req.chunk.chunk_size));
        parameters.insert("chunkOverlap".into(), json!(req.chunk.chunk_overlap));
        parameters
    }

    fn lock_store(&self) -> Result<MutexGuard<'_, SqliteStorage>> {
        lock(&self.store)
    }

    /// Embed a query and return the closest records.
    ///
    /// Every hit is logged as usage. A failure to log is reported but does
    /// not fail the search.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` for a zero limit, a threshold outside [-1, 1] or
    /// a disabled agent, `InvalidInput` for a blank query, or the
    /// provider's error.
    pub async fn search(&self, req: &SearchRequest) -> Result<Vec<RankedResult>> {
        let agent = match req.agent_id.as_deref() {
            Some(agent_id) => self.lock_store()?.get_agent_settings(req.owner_id, agent_id)?,
            None => None,
        };
        let (limit, threshold) = req.resolve(agent.as_ref())?;

        let vector = self.client.embed(&req.query, &self.config.model).await?;
        let mut store = self.lock_store()?;
        let results = store.search_embeddings(req.owner_id, &vector, threshold, limit)?;

        if let Err(e) = store.record_usage(req.owner_id, &req.query, req.agent_id.as_deref(), &results) {
            warn!(error = %e, "Failed to record search usage");
        }

        debug!(hits = results.len(), limit, threshold, "Search completed");
        Ok(results)
    }

    /// Saved retrieval settings of an agent.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn agent_settings(&self, owner: Uuid, agent_id: &str) -> Result<Option<AgentSettings>> {
        self.lock_store()?.get_agent_settings(owner, agent_id)
    }

    /// Create or change an agent's retrieval settings.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` for a blank agent id, a zero limit or a threshold
    /// outside [-1, 1].
    pub fn save_agent_settings(
        &self,
        owner: Uuid,
        agent_id: &str,
        update: &AgentSettingsUpdate,
    ) -> Result<AgentSettings> {
        self.lock_store()?.save_agent_settings(owner, agent_id, update)
    }

    // Store delegation for callers holding only the pipeline.

    /// # Errors
    ///
    /// `JobNotFound` when missing or owned by someone else.
    pub fn get_job(&self, job_id: Uuid, owner: Uuid) -> Result<EmbeddingJob> {
        self.lock_store()?.get_job(job_id, owner)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_jobs(&self, owner: Uuid, status: Option<JobStatus>, limit: usize) -> Result<Vec<EmbeddingJob>> {
        self.lock_store()?.list_jobs(owner, status, limit)
    }

    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn reap_stale_jobs(&self, max_age: Duration) -> Result<Vec<Uuid>> {
        self.lock_store()?.fail_stale_jobs(max_age)
    }

    /// # Errors
    ///
    /// `EmbeddingNotFound` unless both id and owner match.
    pub fn get(&self, id: Uuid, owner: Uuid) -> Result<EmbeddingRecord> {
        self.lock_store()?.get_embedding(id, owner)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list(&self, owner: Uuid, limit: Option<usize>) -> Result<Vec<EmbeddingRecord>> {
        self.lock_store()?.list_embeddings(owner, limit)
    }

    /// # Errors
    ///
    /// `EmbeddingNotFound` unless both id and owner match.
    pub fn update(&self, id: Uuid, owner: Uuid, update: &EmbeddingUpdate) -> Result<EmbeddingRecord> {
        self.lock_store()?.update_embedding(id, owner, update)
    }

    /// # Errors
    ///
    /// `EmbeddingNotFound` unless both id and owner match.
    pub fn delete(&self, id: Uuid, owner: Uuid) -> Result<DeletedEmbedding> {
        self.lock_store()?.delete_embedding(id, owner)
    }

    /// Searches that returned a record, newest first.
    ///
    /// # Errors
    ///
    /// `EmbeddingNotFound` unless both id and owner match.
    pub fn usage(&self, id: Uuid, owner: Uuid, limit: usize) -> Result<Vec<EmbeddingUsage>> {
        let store = self.lock_store()?;
        store.get_embedding(id, owner)?;
        store.list_usage(id, owner, limit)
    }

    /// # Errors
    ///
    /// `EmbeddingNotFound` unless both id and owner match.
    pub fn history(&self, id: Uuid, owner: Uuid, limit: Option<u32>) -> Result<Vec<Event>> {
        self.lock_store()?.embedding_history(id, owner, limit)
    }

    /// # Errors
    ///
    /// `JobNotFound` when missing or owned by someone else.
    pub fn job_history(&self, job_id: Uuid, owner: Uuid, limit: Option<u32>) -> Result<Vec<Event>> {
        self.lock_store()?.job_history(job_id, owner, limit)
    }
}

/// Lock the shared store.
///
/// # Errors
///
/// `Store` if another thread panicked while holding the lock.
pub fn lock(store: &SharedStore) -> Result<MutexGuard<'_, SqliteStorage>> {
    store
        .lock()
        .map_err(|_| Error::Store("store lock poisoned".into()))
}

/// Embed one chunk and store its record. The lock is held only for the
/// synchronous write.
async fn embed_and_store(
    client: &EmbeddingClient,
    store: &SharedStore,
    template: &RecordTemplate,
    item: WorkItem,
) -> Result<(usize, Uuid)> {
    debug!(chunk = %item.chunk.id, "Embedding chunk");
    let vector = client.embed(&item.chunk.content, &template.model).await?;

    let record = NewEmbedding {
        name: template.name.clone(),
        description: template.description.clone(),
        source_type: template.source_type.clone(),
        source_id: Some(item.chunk.id.clone()),
        embedding_model: template.model.clone(),
        vector,
        metadata: item.chunk.record_metadata(),
        owner_id: template.owner_id,
        file_id: item.file_id,
    };

    let id = {
        let mut guard = lock(store)?;
        let id = guard.insert_embedding(&record)?;
        guard.touch_job(template.job_id)?;
        id
    };
    Ok((item.position, id))
}

/// Caller keys fill in without overriding the document's own.
fn merge_metadata(target: &mut Metadata, extra: &Metadata) {
    for (key, value) in extra {
        target.entry(key.clone()).or_insert_with(|| value.clone());
    }
}

/// `<millis>-<name>`, with a counter if that name is taken.
fn unique_file_path(dir: &Path, file_name: &str) -> PathBuf {
    let safe_name = Path::new(file_name)
        .file_name()
        .map_or_else(|| "upload".to_string(), |n| n.to_string_lossy().to_string());
    let millis = chrono::Utc::now().timestamp_millis();

    let mut path = dir.join(format!("{millis}-{safe_name}"));
    let mut counter = 1;
    while path.exists() {
        path = dir.join(format!("{millis}-{counter}-{safe_name}"));
        counter += 1;
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::hash::HashProvider;

    struct Fixture {
        pipeline: EmbeddingPipeline,
        store: SharedStore,
        _dir: tempfile::TempDir,
        files_dir: PathBuf,
    }

    fn fixture(provider: HashProvider, concurrency: usize) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let files_dir = dir.path().join("files");
        let store: SharedStore = Arc::new(Mutex::new(SqliteStorage::open_memory().unwrap()));
        let config = PipelineConfig::new("hash-embed", &files_dir).with_concurrency(concurrency);
        let pipeline = EmbeddingPipeline::new(EmbeddingClient::from_provider(provider), Arc::clone(&store), config);
        Fixture {
            pipeline,
            store,
            _dir: dir,
            files_dir,
        }
    }

    fn text(len: usize) -> String {
        "Parcels ship within two business days of payment. "
            .chars()
            .cycle()
            .take(len)
            .collect()
    }

    fn count(map: &Metadata, key: &str) -> usize {
        map.get(key).and_then(serde_json::Value::as_u64).unwrap_or_default() as usize
    }

    #[tokio::test]
    async fn test_ingest_text_stores_one_record_per_chunk() {
        let fx = fixture(HashProvider::new(), 1);
        let owner = Uuid::new_v4();
        let req = IngestRequest::new(owner, "shipping-faq")
            .with_description("FAQ")
            .with_chunking(ChunkConfig::new(1000, 200));

        let report = fx.pipeline.ingest_text(&text(2600), &req).await.unwrap();

        assert_eq!(report.chunk_count, 3);
        assert_eq!(report.record_ids.len(), 3);
        assert_eq!(report.job.status, JobStatus::Completed);
        assert_eq!(report.job.job_type, JobType::TextInput);

        let result = report.job.result.as_ref().unwrap();
        assert_eq!(count(result, "chunkCount"), 3);
        assert_eq!(report.job.parameters["textLength"], 2600);
        assert_eq!(report.job.parameters["modelId"], "hash-embed");

        let records = fx.pipeline.list(owner, None).unwrap();
        assert_eq!(records.len(), 3);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.id, report.record_ids[i]);
            assert_eq!(record.name, "shipping-faq");
            assert_eq!(record.source_type, SourceType::Text);
            assert_eq!(record.source_id.as_deref(), Some(format!("text-input.txt-chunk-{i}").as_str()));
            assert_eq!(record.metadata["chunkIndex"], i);
            assert_eq!(record.dimensions, 256);
            assert!(!record.content().is_empty());
        }
        assert_eq!(records[1].metadata["startIndex"], 800);
    }

    #[tokio::test]
    async fn test_caller_metadata_cannot_override_chunk_position() {
        let fx = fixture(HashProvider::new(), 1);
        let owner = Uuid::new_v4();
        let metadata: Metadata = serde_json::from_value(json!({
            "fileName": "evil.txt",
            "chunkIndex": 99,
            "startIndex": "bogus",
            "content": "spoofed",
            "team": "ops"
        }))
        .unwrap();
        let req = IngestRequest::new(owner, "kb")
            .with_chunking(ChunkConfig::new(100, 0))
            .with_metadata(metadata);

        let report = fx.pipeline.ingest_text(&text(300), &req).await.unwrap();
        assert_eq!(report.chunk_count, 3);

        for (i, id) in report.record_ids.iter().enumerate() {
            let record = fx.pipeline.get(*id, owner).unwrap();
            assert_eq!(record.source_id.as_deref(), Some(format!("text-input.txt-chunk-{i}").as_str()));
            assert_eq!(record.metadata["fileName"], "text-input.txt");
            assert_eq!(record.metadata["chunkIndex"], i);
            assert_eq!(record.metadata["startIndex"], i * 100);
            assert_eq!(record.metadata["endIndex"], (i + 1) * 100);
            assert_ne!(record.content(), "spoofed");
            assert_eq!(record.metadata["team"], "ops");
        }
    }

    #[tokio::test]
    async fn test_failure_on_kth_chunk_keeps_earlier_records() {
        let fx = fixture(HashProvider::new().failing_on_call(3), 1);
        let owner = Uuid::new_v4();
        let req = IngestRequest::new(owner, "kb").with_chunking(ChunkConfig::new(100, 0));

        let err = fx.pipeline.ingest_text(&text(1000), &req).await.unwrap_err();

        let Error::JobFailed { job_id, source } = &err else {
            panic!("expected JobFailed, got {err:?}");
        };
        assert!(matches!(**source, Error::Upstream(_)));
        assert_eq!(err.error_code(), crate::error::ErrorCode::UpstreamError);

        let job = fx.pipeline.get_job(job_id.parse().unwrap(), owner).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("injected failure"));
        let result = job.result.unwrap();
        assert_eq!(count(&result, "storedCount"), 2);
        assert_eq!(count(&result, "chunkCount"), 10);

        assert_eq!(fx.pipeline.list(owner, None).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_surfaces_through_job_failure() {
        let fx = fixture(HashProvider::new().rate_limited_on_call(1), 1);
        let owner = Uuid::new_v4();
        let err = fx
            .pipeline
            .ingest_text("short text", &IngestRequest::new(owner, "kb"))
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), crate::error::ErrorCode::RateLimited);
        assert!(err.error_code().is_retryable());
        assert!(fx.pipeline.list(owner, None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validation_happens_before_any_job() {
        let fx = fixture(HashProvider::new(), 1);
        let owner = Uuid::new_v4();

        let blank_name = IngestRequest::new(owner, "  ");
        let bad_chunks = IngestRequest::new(owner, "kb").with_chunking(ChunkConfig::new(100, 100));
        let zero_size = IngestRequest::new(owner, "kb").with_chunking(ChunkConfig::new(0, 0));

        for req in [&blank_name, &bad_chunks, &zero_size] {
            let err = fx.pipeline.ingest_text("some text", req).await.unwrap_err();
            assert!(matches!(err, Error::InvalidParameter(_)), "{err:?}");
        }
        let err = fx
            .pipeline
            .ingest_text("   ", &IngestRequest::new(owner, "kb"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));

        let err = fx
            .pipeline
            .ingest_files(Vec::new(), &IngestRequest::new(owner, "kb"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));

        let binary = SourceFile::new("blob.bin", vec![0xff, 0xfe, 0x00]);
        let err = fx
            .pipeline
            .ingest_files(vec![binary], &IngestRequest::new(owner, "kb"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        assert!(fx.pipeline.list_jobs(owner, None, 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_fails_job() {
        let fx = fixture(HashProvider::new(), 1);
        let owner = Uuid::new_v4();
        lock(&fx.store)
            .unwrap()
            .conn()
            .execute_batch("DROP TABLE embedding_usage; DROP TABLE embeddings;")
            .unwrap();

        let err = fx
            .pipeline
            .ingest_text(&text(300), &IngestRequest::new(owner, "kb"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), crate::error::ErrorCode::StoreError);

        let jobs = fx.pipeline.list_jobs(owner, None, 10).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Failed);
        assert_eq!(count(jobs[0].result.as_ref().unwrap(), "storedCount"), 0);
    }

    #[tokio::test]
    async fn test_parallel_ingestion_keeps_chunk_order() {
        let provider = HashProvider::new().with_delay(Duration::from_millis(5));
        let fx = fixture(provider, 4);
        let owner = Uuid::new_v4();
        let req = IngestRequest::new(owner, "kb").with_chunking(ChunkConfig::new(100, 10));

        let report = fx.pipeline.ingest_text(&text(1000), &req).await.unwrap();
        assert_eq!(report.record_ids.len(), report.chunk_count);

        for (i, id) in report.record_ids.iter().enumerate() {
            let record = fx.pipeline.get(*id, owner).unwrap();
            assert_eq!(record.metadata["chunkIndex"], i);
        }
    }

    #[tokio::test]
    async fn test_parallel_failure_reports_what_was_stored() {
        let provider = HashProvider::new()
            .failing_on_call(4)
            .with_delay(Duration::from_millis(5));
        let fx = fixture(provider, 3);
        let owner = Uuid::new_v4();
        let req = IngestRequest::new(owner, "kb").with_chunking(ChunkConfig::new(50, 0));

        let err = fx.pipeline.ingest_text(&text(1000), &req).await.unwrap_err();
        let Error::JobFailed { job_id, .. } = &err else {
            panic!("expected JobFailed, got {err:?}");
        };

        let job = fx.pipeline.get_job(job_id.parse().unwrap(), owner).unwrap();
        assert_eq!(job.status, JobStatus::Failed);

        let result = job.result.unwrap();
        let stored = fx.pipeline.list(owner, None).unwrap().len();
        assert_eq!(count(&result, "storedCount"), stored);
        assert!(stored < count(&result, "chunkCount"));
    }

    #[tokio::test]
    async fn test_ingest_files_records_and_copies_sources() {
        let fx = fixture(HashProvider::new(), 1);
        let owner = Uuid::new_v4();
        let req = IngestRequest::new(owner, "manuals").with_chunking(ChunkConfig::new(200, 20));

        let files = vec![
            SourceFile::new("a.txt", text(500)),
            SourceFile::new("b.md", text(150)),
        ];
        let report = fx.pipeline.ingest_files(files, &req).await.unwrap();

        assert_eq!(report.job.job_type, JobType::FileUpload);
        let result = report.job.result.as_ref().unwrap();
        assert_eq!(count(result, "fileCount"), 2);
        // 500 chars -> 3 windows, 150 chars -> 1
        assert_eq!(count(result, "chunkCount"), 4);

        let file_ids = report.job.file_ids.clone().unwrap();
        assert_eq!(file_ids.len(), 2);

        let store = lock(&fx.store).unwrap();
        let stored = store.list_job_files(report.job.id).unwrap();
        assert_eq!(stored[1].file_type, "text/markdown");
        for file in &stored {
            let path = PathBuf::from(&file.file_path);
            assert!(path.starts_with(fx.files_dir.join(owner.to_string())));
            assert!(path.exists());
        }

        let records = store.list_embeddings(owner, None).unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].file_id.as_deref(), Some(file_ids[0].as_str()));
        assert_eq!(records[3].file_id.as_deref(), Some(file_ids[1].as_str()));
        assert_eq!(records[3].source_id.as_deref(), Some("b.md-chunk-0"));
        assert_eq!(records[0].source_type, SourceType::Document);
    }

    #[tokio::test]
    async fn test_search_ranks_and_records_usage() {
        let fx = fixture(HashProvider::new(), 1);
        let owner = Uuid::new_v4();

        for (name, body) in [
            ("returns", "Refunds are issued within fourteen days for damaged parcels."),
            ("billing", "Invoices are sent monthly to the billing contact."),
        ] {
            fx.pipeline
                .ingest_text(body, &IngestRequest::new(owner, name))
                .await
                .unwrap();
        }

        let req = SearchRequest::new("Refunds are issued within fourteen days for damaged parcels.", owner)
            .with_agent("agent-1");
        let results = fx.pipeline.search(&req).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "returns");
        assert!(results[0].similarity > 0.99);

        let usage = lock(&fx.store)
            .unwrap()
            .list_usage(results[0].id, owner, 10)
            .unwrap();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].agent_id.as_deref(), Some("agent-1"));

        // Other owners see nothing
        let other = SearchRequest::new("Refunds", Uuid::new_v4()).with_threshold(-1.0);
        assert!(fx.pipeline.search(&other).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_parameter_validation() {
        let fx = fixture(HashProvider::new(), 1);
        let owner = Uuid::new_v4();

        let zero = SearchRequest::new("q", owner).with_limit(0);
        assert!(matches!(fx.pipeline.search(&zero).await, Err(Error::InvalidParameter(_))));

        let high = SearchRequest::new("q", owner).with_threshold(1.5);
        assert!(matches!(fx.pipeline.search(&high).await, Err(Error::InvalidParameter(_))));

        let blank = SearchRequest::new("  ", owner);
        assert!(matches!(fx.pipeline.search(&blank).await, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_search_uses_agent_settings() {
        let fx = fixture(HashProvider::new(), 1);
        let owner = Uuid::new_v4();
        for name in ["a", "b", "c"] {
            fx.pipeline
                .ingest_text(&format!("parcel tracking note {name}"), &IngestRequest::new(owner, name))
                .await
                .unwrap();
        }

        let update = AgentSettingsUpdate {
            limit: Some(2),
            threshold: Some(-1.0),
            ..Default::default()
        };
        fx.pipeline.save_agent_settings(owner, "bot", &update).unwrap();

        let by_agent = SearchRequest::new("parcel tracking", owner).with_agent("bot");
        assert_eq!(fx.pipeline.search(&by_agent).await.unwrap().len(), 2);

        // Explicit values win over saved ones
        let explicit = by_agent.clone().with_limit(3);
        assert_eq!(fx.pipeline.search(&explicit).await.unwrap().len(), 3);

        // Unknown agents get the defaults
        let unknown = SearchRequest::new("parcel tracking", owner)
            .with_agent("other")
            .with_threshold(-1.0);
        assert_eq!(fx.pipeline.search(&unknown).await.unwrap().len(), 3);

        let off = AgentSettingsUpdate {
            enabled: Some(false),
            ..Default::default()
        };
        fx.pipeline.save_agent_settings(owner, "bot", &off).unwrap();
        let err = fx.pipeline.search(&by_agent).await.unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)), "{err:?}");

        // Settings belong to one owner
        assert!(fx.pipeline.agent_settings(Uuid::new_v4(), "bot").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_usage_and_history_need_a_visible_record() {
        let fx = fixture(HashProvider::new(), 1);
        let owner = Uuid::new_v4();
        let body = "Invoices are sent monthly to the billing contact.";
        let report = fx
            .pipeline
            .ingest_text(body, &IngestRequest::new(owner, "billing"))
            .await
            .unwrap();
        let id = report.record_ids[0];

        fx.pipeline
            .search(&SearchRequest::new(body, owner).with_agent("bot"))
            .await
            .unwrap();

        let usage = fx.pipeline.usage(id, owner, 10).unwrap();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].query, body);

        let history = fx.pipeline.history(id, owner, None).unwrap();
        assert_eq!(history[0].event_type, crate::storage::EventType::EmbeddingCreated);
        let job_events = fx.pipeline.job_history(report.job.id, owner, None).unwrap();
        assert_eq!(job_events.len(), 2);

        let stranger = Uuid::new_v4();
        assert!(matches!(
            fx.pipeline.usage(id, stranger, 10),
            Err(Error::EmbeddingNotFound { .. })
        ));
        assert!(matches!(
            fx.pipeline.history(id, stranger, None),
            Err(Error::EmbeddingNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_reap_fails_abandoned_job() {
        let fx = fixture(HashProvider::new(), 1);
        let owner = Uuid::new_v4();
        let job = lock(&fx.store)
            .unwrap()
            .create_job(JobType::TextInput, owner, &Metadata::new())
            .unwrap();
        lock(&fx.store)
            .unwrap()
            .conn()
            .execute("UPDATE embedding_jobs SET updated_at = 0 WHERE id = ?1", [job.id.to_string()])
            .unwrap();

        let reaped = fx.pipeline.reap_stale_jobs(Duration::from_secs(60)).unwrap();
        assert_eq!(reaped, vec![job.id]);

        let job = fx.pipeline.get_job(job.id, owner).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().starts_with("abandoned"));
    }

    #[test]
    fn test_defaults() {
        let (limit, threshold) = SearchRequest::new("q", Uuid::nil()).resolve(None).unwrap();
        assert_eq!(limit, 5);
        assert!((threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(ChunkConfig::default(), ChunkConfig::new(1000, 200));
        assert_eq!(guess_file_type("Notes.MD"), "text/markdown");
    }
}
