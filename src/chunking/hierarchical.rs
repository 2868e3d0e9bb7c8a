//! Two-level chunking: small child windows for precise matching, grouped
//! into larger parents that carry surrounding context.
//!
//! Parents start up to `parent_overlap` chars before the previous parent's
//! end. Parent chunk indices continue after the last child index so that
//! identity keys never collide within a document.

use std::collections::{HashMap, HashSet};

use crate::error::RagError;
use crate::models::{Chunk, ChunkMetadata, ChunkRole};

use super::fixed::{sliding_windows, Window};
use super::SourceText;

#[derive(Debug, Clone, Copy)]
pub struct HierarchicalChunker {
    child_size: usize,
    child_overlap: usize,
    parent_size: usize,
    parent_overlap: usize,
}

impl Default for HierarchicalChunker {
    fn default() -> Self {
        Self {
            child_size: 250,
            child_overlap: 30,
            parent_size: 1200,
            parent_overlap: 100,
        }
    }
}

impl HierarchicalChunker {
    pub fn new(
        child_size: usize,
        child_overlap: usize,
        parent_size: usize,
        parent_overlap: usize,
    ) -> Result<Self, RagError> {
        if child_size == 0 || parent_size == 0 {
            return Err(RagError::InvalidOptions("chunk sizes must be positive".into()));
        }
        if child_overlap >= child_size {
            return Err(RagError::InvalidOptions(format!(
                "child overlap {child_overlap} must be smaller than child size {child_size}"
            )));
        }
        if parent_overlap >= parent_size {
            return Err(RagError::InvalidOptions(format!(
                "parent overlap {parent_overlap} must be smaller than parent size {parent_size}"
            )));
        }
        Ok(Self {
            child_size,
            child_overlap,
            parent_size,
            parent_overlap,
        })
    }

    /// All children first, then all parents.
    pub fn chunk_document(&self, content: &str, source_path: &str) -> Vec<Chunk> {
        let windows = sliding_windows(content, self.child_size, self.child_overlap);
        if windows.is_empty() {
            return Vec::new();
        }

        let mut children: Vec<Chunk> = windows
            .iter()
            .enumerate()
            .map(|(i, w)| {
                Chunk::new(
                    w.text.clone(),
                    ChunkMetadata::new(w.start, w.end, i).with_source(source_path),
                )
            })
            .collect();

        let source = SourceText::new(content);
        let mut parents = Vec::new();
        for group in self.group_children(&windows) {
            let text = source.slice(group.start, group.end).trim();
            if text.is_empty() {
                continue;
            }
            let meta = ChunkMetadata::new(group.start, group.end, children.len() + parents.len())
                .with_source(source_path);
            let mut parent = Chunk::new(text, meta);
            let parent_key = parent.key();

            let child_ids = group
                .members
                .iter()
                .map(|&i| {
                    children[i].make_child(parent_key.clone());
                    children[i].key()
                })
                .collect();
            parent.make_parent(child_ids);
            parents.push(parent);
        }

        children.extend(parents);
        children
    }

    fn group_children(&self, windows: &[Window]) -> Vec<ParentGroup> {
        let mut groups = Vec::new();
        let mut current: Option<ParentGroup> = None;
        let mut carry_start: Option<usize> = None;

        for (i, w) in windows.iter().enumerate() {
            if let Some(group) = current.take() {
                if w.end.saturating_sub(group.start) > self.parent_size {
                    carry_start = Some(group.end.saturating_sub(self.parent_overlap));
                    groups.push(group);
                } else {
                    current = Some(group);
                }
            }

            let group = current.get_or_insert_with(|| ParentGroup {
                start: carry_start.map_or(w.start, |c| c.min(w.start)),
                end: w.end,
                members: Vec::new(),
            });
            group.end = w.end;
            group.members.push(i);
        }

        groups.extend(current);
        groups
    }
}

struct ParentGroup {
    start: usize,
    end: usize,
    members: Vec<usize>,
}

/// Key-addressed view over a chunk collection for hierarchy navigation.
pub struct HierarchyIndex<'a> {
    chunks: &'a [Chunk],
    by_key: HashMap<String, usize>,
}

impl<'a> HierarchyIndex<'a> {
    pub fn new(chunks: &'a [Chunk]) -> Self {
        let by_key = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (c.key(), i))
            .collect();
        Self { chunks, by_key }
    }

    pub fn get(&self, key: &str) -> Option<&'a Chunk> {
        self.by_key.get(key).map(|&i| &self.chunks[i])
    }

    pub fn parent_of(&self, chunk: &Chunk) -> Option<&'a Chunk> {
        let parent = self.get(chunk.metadata.parent_id.as_deref()?)?;
        (parent.role() == ChunkRole::Parent).then_some(parent)
    }

    pub fn children_of(&self, parent: &Chunk) -> Vec<&'a Chunk> {
        parent
            .metadata
            .child_ids
            .iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    /// Inserts each retrieved child's parent right after the first child that
    /// references it. A chunk never appears twice.
    pub fn include_parents(&self, retrieved: Vec<Chunk>) -> Vec<Chunk> {
        let mut seen: HashSet<String> = retrieved.iter().map(|c| c.key()).collect();
        let mut out = Vec::with_capacity(retrieved.len());

        for chunk in retrieved {
            let parent = self.parent_of(&chunk).cloned();
            out.push(chunk);
            if let Some(parent) = parent {
                if seen.insert(parent.key()) {
                    out.push(parent);
                }
            }
        }

        out
    }
}
