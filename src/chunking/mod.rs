//! Document chunking: fixed-size windows, embedding-driven semantic groups,
//! and parent/child hierarchies, plus optional metadata enrichment.
//!
//! All offsets are character indices into the original document, so
//! `SourceText::slice(start, end)` reproduces a chunk's span.

pub mod fixed;
pub mod hierarchical;
pub mod metadata;
pub mod semantic;

pub use fixed::FixedSizeChunker;
pub use hierarchical::{HierarchicalChunker, HierarchyIndex};
pub use metadata::MetadataExtractor;
pub use semantic::SemanticChunker;

/// A document with a char-index to byte-offset table.
pub struct SourceText<'a> {
    text: &'a str,
    /// Byte offset of every char, plus `text.len()` as the final entry.
    offsets: Vec<usize>,
}

impl<'a> SourceText<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut offsets: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        offsets.push(text.len());
        Self { text, offsets }
    }

    /// Length in chars.
    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Chars `[start, end)`, clamped to the document.
    pub fn slice(&self, start: usize, end: usize) -> &'a str {
        let end = end.min(self.len());
        let start = start.min(end);
        &self.text[self.offsets[start]..self.offsets[end]]
    }
}

/// A sentence and its trimmed char span in the source document.
#[derive(Debug, Clone, PartialEq)]
pub struct Sentence {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Split on runs of `.`, `!` or `?` followed by whitespace or end of text.
/// Punctuation stays with its sentence; surrounding whitespace is dropped.
pub fn split_sentences(text: &str) -> Vec<Sentence> {
    let source = SourceText::new(text);
    let len = source.len();
    let chars: Vec<char> = text.chars().collect();

    let mut sentences = Vec::new();
    let mut seg_start = 0usize;
    let mut i = 0usize;

    while i < len {
        if !is_terminal(chars[i]) {
            i += 1;
            continue;
        }
        let mut j = i;
        while j < len && is_terminal(chars[j]) {
            j += 1;
        }
        if j == len || chars[j].is_whitespace() {
            push_trimmed(&source, &chars, seg_start, j, &mut sentences);
            while j < len && chars[j].is_whitespace() {
                j += 1;
            }
            seg_start = j;
        }
        i = j;
    }
    if seg_start < len {
        push_trimmed(&source, &chars, seg_start, len, &mut sentences);
    }

    sentences
}

fn push_trimmed(
    source: &SourceText<'_>,
    chars: &[char],
    mut start: usize,
    mut end: usize,
    out: &mut Vec<Sentence>,
) {
    while start < end && chars[start].is_whitespace() {
        start += 1;
    }
    while end > start && chars[end - 1].is_whitespace() {
        end -= 1;
    }
    if start < end {
        out.push(Sentence {
            text: source.slice(start, end).to_string(),
            start,
            end,
        });
    }
}
