//! Text chunking for embeddings.
//!
//! Splits a document into fixed-size, overlapping character windows.
//!
//! # Design Decisions
//!
//! - **Character-based chunking**: offsets count Unicode scalar values, so
//!   every window is valid UTF-8 and offsets mean the same thing for any
//!   language.
//! - **No boundary snapping**: windows are exact, which keeps
//!   `content == text[start..end]` and makes reassembly lossless.
//! - **Overlapping windows**: consecutive chunks share `chunk_overlap`
//!   characters so retrieval keeps context at the seams.

use crate::error::{Error, Result};
use crate::model::{Chunk, ChunkMetadata, Document, Metadata};

/// Configuration for text chunking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// Characters per chunk. Must be positive.
    pub chunk_size: usize,

    /// Characters shared by consecutive chunks. Must be below `chunk_size`.
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkConfig {
    #[must_use]
    pub const fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    /// Reject configurations that cannot make progress.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidParameter(
                "chunk_size must be greater than 0".into(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::InvalidParameter(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    /// Upper bound on the number of windows for a text of `len` chars.
    #[must_use]
    pub fn max_chunks(&self, len: usize) -> usize {
        let stride = self.chunk_size.saturating_sub(self.chunk_overlap).max(1);
        len.div_ceil(stride)
    }
}

/// Split text into overlapping chunks.
///
/// # Examples
///
/// ```rust,ignore
/// use docembed::embeddings::chunking::{chunk_text, ChunkConfig};
///
/// let text = "a".repeat(2600);
/// let chunks = chunk_text(&text, "doc.txt", &ChunkConfig::new(1000, 200))?;
/// let bounds: Vec<_> = chunks
///     .iter()
///     .map(|c| (c.metadata.start_index, c.metadata.end_index))
///     .collect();
/// assert_eq!(bounds, vec![(0, 1000), (800, 1800), (1600, 2600)]);
/// ```
///
/// # Errors
///
/// Returns `InvalidParameter` for a zero `chunk_size` or an overlap that
/// is not smaller than the chunk size.
pub fn chunk_text(raw_text: &str, file_name: &str, config: &ChunkConfig) -> Result<Vec<Chunk>> {
    config.validate()?;

    // Byte offset of every char, plus the end of the text, so char ranges
    // slice without rescanning.
    let mut boundaries: Vec<usize> = raw_text.char_indices().map(|(i, _)| i).collect();
    let len = boundaries.len();
    boundaries.push(raw_text.len());

    let mut chunks = Vec::with_capacity(config.max_chunks(len));
    let mut start = 0;

    while start < len {
        let end = (start + config.chunk_size).min(len);
        let index = chunks.len();

        chunks.push(Chunk {
            id: Chunk::make_id(file_name, index),
            content: raw_text[boundaries[start]..boundaries[end]].to_string(),
            metadata: ChunkMetadata {
                file_name: file_name.to_string(),
                chunk_index: index,
                start_index: start,
                end_index: end,
                extra: Metadata::new(),
            },
        });

        if end == len {
            break;
        }

        let next = end - config.chunk_overlap;
        if next <= start {
            break;
        }
        start = next;
    }

    Ok(chunks)
}

/// Chunk a document, copying its metadata into every chunk.
///
/// # Errors
///
/// Same as [`chunk_text`].
pub fn chunk_document(document: &Document, config: &ChunkConfig) -> Result<Vec<Chunk>> {
    let mut chunks = chunk_text(&document.raw_text, &document.name, config)?;
    for chunk in &mut chunks {
        chunk.metadata.extra = document.metadata.clone();
    }
    Ok(chunks)
}

/// Rebuild the source text from overlapping chunks.
///
/// Each chunk contributes only the characters past the previous chunk's end.
#[must_use]
pub fn reassemble(chunks: &[Chunk]) -> String {
    let mut text = String::new();
    let mut covered: usize = 0;
    for chunk in chunks {
        let skip = covered.saturating_sub(chunk.metadata.start_index);
        text.extend(chunk.content.chars().skip(skip));
        covered = covered.max(chunk.metadata.end_index);
    }
    text
}
