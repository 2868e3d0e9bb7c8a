//! Fixed-size character windows with overlap.
//!
//! Each step advances to `end - overlap`; if that would not move forward, or
//! the window was whitespace only, the next window starts at `end` instead.
//! The final window therefore repeats up to `overlap` chars of the previous
//! one, and blank windows are skipped without consuming a chunk index.

use crate::error::RagError;
use crate::models::{Chunk, ChunkMetadata};

use super::SourceText;

/// A raw window before it becomes a chunk.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Window {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

pub(crate) fn sliding_windows(content: &str, size: usize, overlap: usize) -> Vec<Window> {
    let source = SourceText::new(content);
    let len = source.len();
    let mut windows = Vec::new();
    let mut start = 0usize;

    while start < len {
        let end = (start + size).min(len);
        let text = source.slice(start, end).trim();
        if text.is_empty() {
            start = end;
            continue;
        }
        windows.push(Window {
            start,
            end,
            text: text.to_string(),
        });
        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }

    windows
}

#[derive(Debug, Clone, Copy)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    overlap: usize,
}

impl FixedSizeChunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, RagError> {
        if chunk_size == 0 {
            return Err(RagError::InvalidOptions("chunk size must be positive".into()));
        }
        if overlap >= chunk_size {
            return Err(RagError::InvalidOptions(format!(
                "overlap {overlap} must be smaller than chunk size {chunk_size}"
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Chunks without source attribution.
    pub fn chunk_text(&self, content: &str) -> Vec<Chunk> {
        self.build(content, None)
    }

    pub fn chunk_document(&self, content: &str, source_path: &str) -> Vec<Chunk> {
        self.build(content, Some(source_path))
    }

    fn build(&self, content: &str, source_path: Option<&str>) -> Vec<Chunk> {
        sliding_windows(content, self.chunk_size, self.overlap)
            .into_iter()
            .enumerate()
            .map(|(i, w)| {
                let mut meta = ChunkMetadata::new(w.start, w.end, i);
                if let Some(path) = source_path {
                    meta = meta.with_source(path);
                }
                Chunk::new(w.text, meta)
            })
            .collect()
    }
}

impl Default for FixedSizeChunker {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            overlap: 50,
        }
    }
}
