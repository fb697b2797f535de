//! Database schema definitions.
//!
//! Base DDL for a fresh database. Changes to existing databases go through
//! [`super::migrations`].

use rusqlite::{Connection, Result};

/// Current schema version for migration tracking.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema for the docembed database.
///
/// Note: Timestamps are stored as INTEGER (Unix milliseconds). Vectors are
/// little-endian f32 BLOBs with their length in `dimensions`.
pub const SCHEMA_SQL: &str = r#"
-- ====================
-- Schema Version Tracking
-- ====================

CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- ====================
-- Jobs
-- ====================

CREATE TABLE IF NOT EXISTS embedding_jobs (
    id TEXT PRIMARY KEY,
    job_type TEXT NOT NULL CHECK (job_type IN ('file_upload', 'text_input')),
    status TEXT NOT NULL DEFAULT 'processing'
        CHECK (status IN ('processing', 'completed', 'failed')),
    parameters TEXT NOT NULL DEFAULT '{}',
    file_ids TEXT,
    result TEXT,
    error TEXT,
    owner_id TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    completed_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_jobs_owner ON embedding_jobs(owner_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_jobs_status ON embedding_jobs(status, updated_at);

-- ====================
-- Stored source files
-- ====================

CREATE TABLE IF NOT EXISTS embedding_files (
    id TEXT PRIMARY KEY,
    job_id TEXT NOT NULL REFERENCES embedding_jobs(id) ON DELETE CASCADE,
    file_name TEXT NOT NULL,
    file_type TEXT NOT NULL,
    file_size INTEGER NOT NULL,
    file_path TEXT NOT NULL,
    owner_id TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_files_job ON embedding_files(job_id);

-- ====================
-- Embeddings
-- ====================

CREATE TABLE IF NOT EXISTS embeddings (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    source_type TEXT NOT NULL,
    source_id TEXT,
    embedding_model TEXT NOT NULL,
    embedding BLOB NOT NULL,
    dimensions INTEGER NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    owner_id TEXT NOT NULL,
    file_id TEXT REFERENCES embedding_files(id) ON DELETE SET NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_embeddings_owner ON embeddings(owner_id, dimensions);
CREATE INDEX IF NOT EXISTS idx_embeddings_file ON embeddings(file_id);

-- ====================
-- Search usage
-- ====================

CREATE TABLE IF NOT EXISTS embedding_usage (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    embedding_id TEXT NOT NULL REFERENCES embeddings(id) ON DELETE CASCADE,
    agent_id TEXT,
    query TEXT NOT NULL,
    similarity REAL NOT NULL,
    owner_id TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_usage_embedding ON embedding_usage(embedding_id, created_at DESC);

-- ====================
-- Agent retrieval settings
-- ====================

CREATE TABLE IF NOT EXISTS agent_settings (
    owner_id TEXT NOT NULL,
    agent_id TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    result_limit INTEGER NOT NULL CHECK (result_limit > 0),
    threshold REAL NOT NULL CHECK (threshold BETWEEN -1.0 AND 1.0),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (owner_id, agent_id)
);

-- ====================
-- Audit Events
-- ====================

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    actor TEXT NOT NULL,
    old_value TEXT,
    new_value TEXT,
    comment TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);
CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type);
CREATE INDEX IF NOT EXISTS idx_events_created ON events(created_at DESC);
"#;

/// Apply the schema to a database connection.
///
/// Sets pragmas, creates tables and runs pending migrations.
///
/// # Errors
///
/// Returns an error if any statement fails.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    // Set pragmas before schema creation
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    conn.execute_batch(SCHEMA_SQL)?;

    super::migrations::run_migrations(conn)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![
            format!("v{CURRENT_SCHEMA_VERSION}"),
            chrono::Utc::now().timestamp_millis()
        ],
    )?;

    Ok(())
}
