//! Ingest command implementations.

use crate::cli::commands::{build_pipeline, chunk_config, load_settings, parse_metadata, runtime};
use crate::cli::{IngestArgs, IngestCommands};
use crate::config::resolve_owner;
use crate::error::{Error, Result};
use crate::pipeline::{IngestReport, IngestRequest, SourceFile};
use std::io::Read;
use std::path::PathBuf;

/// Execute ingest commands.
///
/// # Errors
///
/// Validation errors before anything is written, or `JobFailed` once the
/// job exists.
pub fn execute(
    command: &IngestCommands,
    db_path: Option<&PathBuf>,
    owner: Option<&str>,
    json: bool,
) -> Result<()> {
    let owner_id = resolve_owner(owner)?;
    let settings = load_settings()?;

    let common = match command {
        IngestCommands::Text { common, .. } | IngestCommands::File { common, .. } => common,
    };
    let request = build_request(owner_id, common, &settings.chunk)?;
    let pipeline = build_pipeline(db_path, &settings, common.concurrency)?;

    let rt = runtime()?;
    let report = match command {
        IngestCommands::Text { text, .. } => {
            let text = match text {
                Some(text) => text.clone(),
                None => read_stdin()?,
            };
            rt.block_on(pipeline.ingest_text(&text, &request))?
        }
        IngestCommands::File { paths, .. } => {
            let files = paths
                .iter()
                .map(|p| SourceFile::from_path(p))
                .collect::<Result<Vec<_>>>()?;
            rt.block_on(pipeline.ingest_files(files, &request))?
        }
    };

    print_report(&report, json)
}

fn build_request(
    owner_id: uuid::Uuid,
    args: &IngestArgs,
    defaults: &crate::embeddings::ChunkConfig,
) -> Result<IngestRequest> {
    let mut request = IngestRequest::new(owner_id, args.name.clone())
        .with_chunking(chunk_config(args.chunking, *defaults))
        .with_metadata(parse_metadata(args.metadata.as_deref())?);
    if let Some(description) = &args.description {
        request = request.with_description(description.clone());
    }
    Ok(request)
}

fn read_stdin() -> Result<String> {
    if std::io::IsTerminal::is_terminal(&std::io::stdin()) {
        return Err(Error::InvalidParameter(
            "no text given: pass it as an argument or pipe it on stdin".into(),
        ));
    }
    let mut text = String::new();
    std::io::stdin().read_to_string(&mut text)?;
    Ok(text)
}

fn print_report(report: &IngestReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
        return Ok(());
    }

    let message = report
        .job
        .result
        .as_ref()
        .and_then(|r| r.get("message"))
        .and_then(serde_json::Value::as_str)
        .unwrap_or("Ingestion completed");

    println!("{message}");
    println!("  Job:     {}", report.job.id);
    println!("  Chunks:  {}", report.chunk_count);
    println!("  Records: {}", report.record_ids.len());
    if let Some(files) = &report.job.file_ids {
        println!("  Files:   {}", files.len());
    }
    Ok(())
}
