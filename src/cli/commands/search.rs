//! Search command implementation.

use crate::cli::commands::{build_pipeline, load_settings, runtime, truncate};
use crate::cli::SearchArgs;
use crate::config::resolve_owner;
use crate::error::Result;
use crate::model::RankedResult;
use crate::pipeline::SearchRequest;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

/// Output for search.
#[derive(Serialize)]
struct SearchOutput<'a> {
    query: &'a str,
    results: &'a [RankedResult],
    count: usize,
}

/// Execute the search command.
///
/// # Errors
///
/// `InvalidParameter` for a bad limit or threshold or a disabled agent, or
/// the provider's error.
pub fn execute(args: &SearchArgs, db_path: Option<&PathBuf>, owner: Option<&str>, json: bool) -> Result<()> {
    let owner_id = resolve_owner(owner)?;
    let settings = load_settings()?;
    let pipeline = build_pipeline(db_path, &settings, None)?;

    let mut request = SearchRequest::new(args.query.clone(), owner_id);
    if let Some(limit) = args.limit {
        request = request.with_limit(limit);
    }
    if let Some(threshold) = args.threshold {
        request = request.with_threshold(threshold);
    }
    if let Some(agent) = &args.agent {
        request = request.with_agent(agent.clone());
    }

    let results = runtime()?.block_on(pipeline.search(&request))?;

    if json {
        let output = SearchOutput {
            query: &args.query,
            results: &results,
            count: results.len(),
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No records above the similarity threshold.");
        return Ok(());
    }

    println!("Results for \"{}\" ({} found):", args.query, results.len());
    println!();
    for hit in &results {
        println!(
            "{} {} {}",
            format!("{:.3}", hit.similarity).green(),
            hit.name.bold(),
            hit.id.to_string().dimmed()
        );
        println!("  {}", truncate(&hit.content, 100));
        println!();
    }
    Ok(())
}
