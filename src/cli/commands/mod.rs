//! Command implementations.

pub mod agent;
pub mod chunk;
pub mod completions;
pub mod config;
pub mod ingest;
pub mod job;
pub mod records;
pub mod search;
pub mod version;

use crate::cli::ChunkArgs;
use crate::config::{resolve_db_path, resolve_files_dir};
use crate::embeddings::{create_client, resolve_settings, ChunkConfig, ResolvedSettings};
use crate::error::{Error, Result};
use crate::model::Metadata;
use crate::pipeline::{EmbeddingPipeline, PipelineConfig};
use crate::storage::{Event, SqliteStorage};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Open the store, creating the database on first use.
pub(crate) fn open_storage(db_path: Option<&PathBuf>) -> Result<(SqliteStorage, PathBuf)> {
    let path = resolve_db_path(db_path.map(PathBuf::as_path))
        .ok_or_else(|| Error::Config("could not determine home directory; pass --db".into()))?;
    let storage = SqliteStorage::open(&path)?;
    Ok((storage, path))
}

/// Effective provider settings from config file and environment.
pub(crate) fn load_settings() -> Result<ResolvedSettings> {
    Ok(ResolvedSettings::from_settings(&resolve_settings()?))
}

/// Build a pipeline over the resolved store and provider.
pub(crate) fn build_pipeline(
    db_path: Option<&PathBuf>,
    settings: &ResolvedSettings,
    concurrency: Option<usize>,
) -> Result<EmbeddingPipeline> {
    let (storage, path) = open_storage(db_path)?;
    let client = create_client(settings)?;
    let config = PipelineConfig::new(settings.model.clone(), resolve_files_dir(&path))
        .with_concurrency(concurrency.unwrap_or(settings.concurrency));

    Ok(EmbeddingPipeline::new(
        client,
        Arc::new(Mutex::new(storage)),
        config,
    ))
}

/// Apply command-line chunking overrides to configured defaults.
pub(crate) fn chunk_config(args: ChunkArgs, defaults: ChunkConfig) -> ChunkConfig {
    ChunkConfig::new(
        args.chunk_size.unwrap_or(defaults.chunk_size),
        args.chunk_overlap.unwrap_or(defaults.chunk_overlap),
    )
}

/// Parse a `--metadata` argument into a JSON object.
pub(crate) fn parse_metadata(raw: Option<&str>) -> Result<Metadata> {
    let Some(raw) = raw else {
        return Ok(Metadata::new());
    };
    match serde_json::from_str(raw) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err(Error::InvalidParameter("metadata must be a JSON object".into())),
        Err(e) => Err(Error::InvalidParameter(format!("metadata is not valid JSON: {e}"))),
    }
}

/// Parse a UUID argument, mapping failures to the not-found error of the entity.
pub(crate) fn parse_id(raw: &str, not_found: impl FnOnce(String) -> Error) -> Result<uuid::Uuid> {
    uuid::Uuid::parse_str(raw.trim()).map_err(|_| not_found(raw.to_string()))
}

/// Create the runtime async commands block on.
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))
}

/// Shorten text for one-line display.
pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{cut}...")
}

/// Format Unix milliseconds for humans.
pub(crate) fn format_timestamp(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map_or_else(|| millis.to_string(), |dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// Print audit events one per line, newest first.
pub(crate) fn print_events(events: &[Event]) {
    if events.is_empty() {
        println!("No events found.");
        return;
    }
    for event in events {
        let change = match (&event.old_value, &event.new_value) {
            (Some(old), Some(new)) => format!(" {} -> {}", truncate(old, 40), truncate(new, 40)),
            (None, Some(new)) => format!(" {}", truncate(new, 40)),
            _ => String::new(),
        };
        println!(
            "{} {} by {}{change}",
            format_timestamp(event.created_at),
            event.event_type.as_str(),
            event.actor
        );
    }
}
