//! Job command implementations.

use crate::cli::commands::{format_timestamp, open_storage, parse_id, print_events};
use crate::cli::JobCommands;
use crate::config::resolve_owner;
use crate::error::{Error, Result};
use crate::model::{EmbeddingJob, JobStatus};
use crate::storage::Event;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Output for job list.
#[derive(Serialize)]
struct JobListOutput {
    jobs: Vec<EmbeddingJob>,
    count: usize,
}

/// Output for job history.
#[derive(Serialize)]
struct JobHistoryOutput {
    id: String,
    events: Vec<Event>,
    count: usize,
}

/// Output for job reap.
#[derive(Serialize)]
struct ReapOutput {
    failed: Vec<String>,
    count: usize,
}

/// Execute job commands.
///
/// # Errors
///
/// `JobNotFound` for unknown ids, `InvalidParameter` for an unknown status.
pub fn execute(command: &JobCommands, db_path: Option<&PathBuf>, owner: Option<&str>, json: bool) -> Result<()> {
    match command {
        JobCommands::Show { id } => show(id, db_path, owner, json),
        JobCommands::List { status, limit } => list(status.as_deref(), *limit, db_path, owner, json),
        JobCommands::History { id } => history(id, db_path, owner, json),
        JobCommands::Reap { max_age_secs } => reap(*max_age_secs, db_path, json),
    }
}

fn show(id: &str, db_path: Option<&PathBuf>, owner: Option<&str>, json: bool) -> Result<()> {
    let owner_id = resolve_owner(owner)?;
    let id = parse_id(id, |id| Error::JobNotFound { id })?;
    let (storage, _) = open_storage(db_path)?;
    let job = storage.get_job(id, owner_id)?;

    if json {
        println!("{}", serde_json::to_string(&job)?);
        return Ok(());
    }

    println!("{} {}", job.id, status_label(job.status));
    println!("  Type:     {}", job.job_type.as_str());
    println!("  Created:  {}", format_timestamp(job.created_at));
    if let Some(completed) = job.completed_at {
        println!("  Finished: {}", format_timestamp(completed));
    }
    if let Some(error) = &job.error {
        println!("  Error:    {error}");
    }
    if let Some(result) = &job.result {
        println!("  Result:   {}", serde_json::Value::Object(result.clone()));
    }
    Ok(())
}

fn list(
    status: Option<&str>,
    limit: usize,
    db_path: Option<&PathBuf>,
    owner: Option<&str>,
    json: bool,
) -> Result<()> {
    let owner_id = resolve_owner(owner)?;
    let status = status
        .map(|s| {
            JobStatus::from_str(s).ok_or_else(|| {
                Error::InvalidParameter(format!(
                    "unknown status '{s}' (expected processing, completed or failed)"
                ))
            })
        })
        .transpose()?;

    let (storage, _) = open_storage(db_path)?;
    let jobs = storage.list_jobs(owner_id, status, limit)?;

    if json {
        let output = JobListOutput {
            count: jobs.len(),
            jobs,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if jobs.is_empty() {
        println!("No jobs found.");
        return Ok(());
    }

    for job in &jobs {
        println!(
            "{} {} {} {}",
            job.id,
            status_label(job.status),
            job.job_type.as_str(),
            format_timestamp(job.created_at).dimmed()
        );
    }
    Ok(())
}

fn history(id: &str, db_path: Option<&PathBuf>, owner: Option<&str>, json: bool) -> Result<()> {
    let owner_id = resolve_owner(owner)?;
    let id = parse_id(id, |id| Error::JobNotFound { id })?;
    let (storage, _) = open_storage(db_path)?;
    let events = storage.job_history(id, owner_id, None)?;

    if json {
        let output = JobHistoryOutput {
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

fn reap(max_age_secs: u64, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let (mut storage, _) = open_storage(db_path)?;
    let failed = storage.fail_stale_jobs(Duration::from_secs(max_age_secs))?;

    if json {
        let output = ReapOutput {
            count: failed.len(),
            failed: failed.iter().map(ToString::to_string).collect(),
        };
        println!("{}", serde_json::to_string(&output)?);
    } else if failed.is_empty() {
        println!("No stale jobs.");
    } else {
        println!("Failed {} stale job(s):", failed.len());
        for id in &failed {
            println!("  {id}");
        }
    }
    Ok(())
}

fn status_label(status: JobStatus) -> colored::ColoredString {
    match status {
        JobStatus::Processing => status.as_str().yellow(),
        JobStatus::Completed => status.as_str().green(),
        JobStatus::Failed => status.as_str().red(),
    }
}
