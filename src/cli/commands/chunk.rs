//! Chunk preview command.
//!
//! Shows where a file would be split without calling a provider or
//! touching the database.

use crate::cli::commands::{chunk_config, load_settings, truncate};
use crate::cli::ChunkArgs;
use crate::embeddings::chunk_text;
use crate::error::Result;
use crate::pipeline::SourceFile;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct ChunkPreview {
    id: String,
    start_index: usize,
    end_index: usize,
    chars: usize,
    preview: String,
}

#[derive(Serialize)]
struct ChunkOutput {
    file_name: String,
    chunk_size: usize,
    chunk_overlap: usize,
    chunks: Vec<ChunkPreview>,
    count: usize,
}

/// Execute the chunk preview.
///
/// # Errors
///
/// Returns an error if the file is unreadable, not UTF-8, or the chunking
/// parameters are invalid.
pub fn execute(path: &Path, args: ChunkArgs, json: bool) -> Result<()> {
    let config = chunk_config(args, load_settings()?.chunk);
    let file = SourceFile::from_path(path)?;
    let text = String::from_utf8(file.content).map_err(|_| {
        crate::error::Error::InvalidInput(format!("{} is not valid UTF-8 text", file.file_name))
    })?;

    let chunks = chunk_text(&text, &file.file_name, &config)?;
    let previews: Vec<ChunkPreview> = chunks
        .iter()
        .map(|c| ChunkPreview {
            id: c.id.clone(),
            start_index: c.metadata.start_index,
            end_index: c.metadata.end_index,
            chars: c.metadata.end_index - c.metadata.start_index,
            preview: truncate(&c.content, 60),
        })
        .collect();

    if json {
        let output = ChunkOutput {
            file_name: file.file_name,
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            count: previews.len(),
            chunks: previews,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!(
        "{}: {} chunk(s) (size {}, overlap {})",
        file.file_name,
        previews.len(),
        config.chunk_size,
        config.chunk_overlap
    );
    for p in &previews {
        println!("  [{:>6}..{:<6}] {}", p.start_index, p.end_index, p.preview);
    }
    Ok(())
}
