//! Audit event storage and retrieval.
//!
//! Every store mutation records what changed, on which entity, for whom.

use rusqlite::{Connection, Result};
use serde::Serialize;

/// Event types for audit logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // Embedding events
    EmbeddingCreated,
    EmbeddingUpdated,
    EmbeddingDeleted,

    // Job events
    JobCreated,
    JobCompleted,
    JobFailed,

    // File events
    FileStored,
    FileRemoved,

    // Agent events
    AgentSettingsSaved,
}

impl EventType {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::EmbeddingCreated => "embedding_created",
            Self::EmbeddingUpdated => "embedding_updated",
            Self::EmbeddingDeleted => "embedding_deleted",
            Self::JobCreated => "job_created",
            Self::JobCompleted => "job_completed",
            Self::JobFailed => "job_failed",
            Self::FileStored => "file_stored",
            Self::FileRemoved => "file_removed",
            Self::AgentSettingsSaved => "agent_settings_saved",
        }
    }

    /// Parse from storage.
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "embedding_created" => Self::EmbeddingCreated,
            "embedding_updated" => Self::EmbeddingUpdated,
            "embedding_deleted" => Self::EmbeddingDeleted,
            "job_created" => Self::JobCreated,
            "job_completed" => Self::JobCompleted,
            "job_failed" => Self::JobFailed,
            "file_stored" => Self::FileStored,
            "file_removed" => Self::FileRemoved,
            "agent_settings_saved" => Self::AgentSettingsSaved,
            _ => return None,
        })
    }
}

/// An audit event record.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: String,
    pub event_type: EventType,
    pub actor: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub comment: Option<String>,
    pub created_at: i64,
}

impl Event {
    /// Create a new event (id will be assigned by database).
    #[must_use]
    pub fn new(entity_type: &str, entity_id: &str, event_type: EventType, actor: &str) -> Self {
        Self {
            id: 0,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            event_type,
            actor: actor.to_string(),
            old_value: None,
            new_value: None,
            comment: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Add old/new values for field change tracking.
    #[must_use]
    pub fn with_values(mut self, old: Option<String>, new: Option<String>) -> Self {
        self.old_value = old;
        self.new_value = new;
        self
    }

    #[must_use]
    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }
}

/// Insert an event into the database.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_event(conn: &Connection, event: &Event) -> Result<i64> {
    conn.execute(
        "INSERT INTO events (entity_type, entity_id, event_type, actor, old_value, new_value, comment, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            event.entity_type,
            event.entity_id,
            event.event_type.as_str(),
            event.actor,
            event.old_value,
            event.new_value,
            event.comment,
            event.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Get events for an entity, newest first.
///
/// Rows with an unknown event type are skipped.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_events(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
    limit: Option<u32>,
) -> Result<Vec<Event>> {
    let limit = limit.unwrap_or(100);
    let mut stmt = conn.prepare(
        "SELECT id, entity_type, entity_id, event_type, actor, old_value, new_value, comment, created_at
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY created_at DESC, id DESC
         LIMIT ?3",
    )?;

    let rows = stmt.query_map(rusqlite::params![entity_type, entity_id, limit], |row| {
        let Some(event_type) = EventType::from_str(&row.get::<_, String>(3)?) else {
            return Ok(None);
        };
        Ok(Some(Event {
            id: row.get(0)?,
            entity_type: row.get(1)?,
            entity_id: row.get(2)?,
            event_type,
            actor: row.get(4)?,
            old_value: row.get(5)?,
            new_value: row.get(6)?,
            comment: row.get(7)?,
            created_at: row.get(8)?,
        }))
    })?;

    let mut events = Vec::new();
    for row in rows {
        if let Some(event) = row? {
            events.push(event);
        }
    }
    Ok(events)
}
