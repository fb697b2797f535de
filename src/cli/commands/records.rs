//! Record command implementations (list, show, update, delete, usage, history).

use crate::cli::commands::{
    format_timestamp, open_storage, parse_id, parse_metadata, print_events, truncate,
};
use crate::cli::UpdateArgs;
use crate::config::resolve_owner;
use crate::error::{Error, Result};
use crate::model::{EmbeddingRecord, EmbeddingUpdate, EmbeddingUsage};
use crate::storage::Event;
use serde::Serialize;
use std::path::PathBuf;

/// Output for list.
#[derive(Serialize)]
struct ListOutput {
    records: Vec<EmbeddingRecord>,
    count: usize,
    total: usize,
}

/// Output for delete.
#[derive(Serialize)]
struct DeleteOutput {
    id: String,
    deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    removed_file: Option<String>,
}

/// Output for usage.
#[derive(Serialize)]
struct UsageOutput {
    id: String,
    usage: Vec<EmbeddingUsage>,
    count: usize,
}

/// Output for history.
#[derive(Serialize)]
struct HistoryOutput {
    id: String,
    events: Vec<Event>,
    count: usize,
}

fn not_found(id: String) -> Error {
    Error::EmbeddingNotFound { id }
}

/// List an owner's records without their vectors.
///
/// # Errors
///
/// Returns an error if the owner is missing or the query fails.
pub fn list(limit: Option<usize>, db_path: Option<&PathBuf>, owner: Option<&str>, json: bool) -> Result<()> {
    let owner_id = resolve_owner(owner)?;
    let (storage, _) = open_storage(db_path)?;

    let mut records = storage.list_embeddings(owner_id, limit)?;
    let total = storage.count_embeddings(owner_id)?;
    for record in &mut records {
        record.vector.clear();
    }

    if json {
        let output = ListOutput {
            count: records.len(),
            records,
            total,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No records found.");
        return Ok(());
    }

    println!("Records ({} of {total}):", records.len());
    println!();
    for record in &records {
        let chunk = record
            .metadata
            .get("chunkIndex")
            .map(ToString::to_string)
            .unwrap_or_default();
        println!("{} {} [{}] #{chunk}", record.id, record.name, record.source_type.as_str());
        println!("  {}", truncate(record.content(), 80));
    }
    Ok(())
}

/// Show one record.
///
/// # Errors
///
/// `EmbeddingNotFound` unless the id exists for this owner.
pub fn show(id: &str, db_path: Option<&PathBuf>, owner: Option<&str>, json: bool) -> Result<()> {
    let owner_id = resolve_owner(owner)?;
    let id = parse_id(id, not_found)?;
    let (storage, _) = open_storage(db_path)?;

    let mut record = storage.get_embedding(id, owner_id)?;
    record.vector.clear();

    if json {
        println!("{}", serde_json::to_string(&record)?);
        return Ok(());
    }

    print_record(&record);
    Ok(())
}

/// Update name, description or metadata.
///
/// # Errors
///
/// `InvalidParameter` when nothing would change, `EmbeddingNotFound`
/// unless the id exists for this owner.
pub fn update(args: &UpdateArgs, db_path: Option<&PathBuf>, owner: Option<&str>, json: bool) -> Result<()> {
    let owner_id = resolve_owner(owner)?;
    let id = parse_id(&args.id, not_found)?;

    let update = EmbeddingUpdate {
        name: args.name.clone(),
        description: args.description.clone(),
        metadata: args
            .metadata
            .as_deref()
            .map(|raw| parse_metadata(Some(raw)))
            .transpose()?,
    };
    if update.is_empty() {
        return Err(Error::InvalidParameter(
            "nothing to update: pass --name, --description or --metadata".into(),
        ));
    }

    let (mut storage, _) = open_storage(db_path)?;
    let mut record = storage.update_embedding(id, owner_id, &update)?;
    record.vector.clear();

    if json {
        println!("{}", serde_json::to_string(&record)?);
    } else {
        println!("Updated record: {}", record.id);
    }
    Ok(())
}

/// Delete a record, removing its source file once nothing references it.
///
/// # Errors
///
/// `EmbeddingNotFound` unless the id exists for this owner.
pub fn delete(id: &str, db_path: Option<&PathBuf>, owner: Option<&str>, json: bool) -> Result<()> {
    let owner_id = resolve_owner(owner)?;
    let id = parse_id(id, not_found)?;
    let (mut storage, _) = open_storage(db_path)?;

    let deleted = storage.delete_embedding(id, owner_id)?;
    let removed_file = deleted.removed_file.map(|f| f.file_name);

    if json {
        let output = DeleteOutput {
            id: deleted.id.to_string(),
            deleted: true,
            removed_file,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Deleted record: {}", deleted.id);
        if let Some(file) = removed_file {
            println!("  Removed source file: {file}");
        }
    }
    Ok(())
}

/// Show which searches returned a record.
///
/// # Errors
///
/// `EmbeddingNotFound` unless the id exists for this owner.
pub fn usage(
    id: &str,
    limit: usize,
    db_path: Option<&PathBuf>,
    owner: Option<&str>,
    json: bool,
) -> Result<()> {
    let owner_id = resolve_owner(owner)?;
    let id = parse_id(id, not_found)?;
    let (storage, _) = open_storage(db_path)?;

    storage.get_embedding(id, owner_id)?;
    let usage = storage.list_usage(id, owner_id, limit)?;

    if json {
        let output = UsageOutput {
            id: id.to_string(),
            count: usage.len(),
            usage,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if usage.is_empty() {
        println!("No searches have returned {id}.");
        return Ok(());
    }

    for row in &usage {
        println!(
            "{} {:.3} {} {}",
            format_timestamp(row.created_at),
            row.similarity,
            row.agent_id.as_deref().unwrap_or("-"),
            truncate(&row.query, 60)
        );
    }
    Ok(())
}

/// Show a record's audit trail.
///
/// # Errors
///
/// `EmbeddingNotFound` unless the id exists for this owner.
pub fn history(
    id: &str,
    limit: Option<u32>,
    db_path: Option<&PathBuf>,
    owner: Option<&str>,
    json: bool,
) -> Result<()> {
    let owner_id = resolve_owner(owner)?;
    let id = parse_id(id, not_found)?;
    let (storage, _) = open_storage(db_path)?;
    let events = storage.embedding_history(id, owner_id, limit)?;

    if json {
        let output = HistoryOutput {
            id: id.to_string(),
            count: events.len(),
            events,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    print_events(&events);
    Ok(())
}

fn print_record(record: &EmbeddingRecord) {
    println!("{}", record.id);
    println!("  Name:        {}", record.name);
    if let Some(description) = &record.description {
        println!("  Description: {description}");
    }
    println!("  Source:      {}", record.source_type.as_str());
    if let Some(source_id) = &record.source_id {
        println!("  Chunk:       {source_id}");
    }
    println!("  Model:       {} ({} dims)", record.embedding_model, record.dimensions);
    println!("  Created:     {}", format_timestamp(record.created_at));
    println!();
    println!("{}", record.content());
}
