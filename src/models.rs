use serde::{Deserialize, Serialize};

/// How abstract a chunk's content is, used as an enrichment label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbstractionLevel {
    High,
    Medium,
    Low,
}

impl AbstractionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbstractionLevel::High => "high",
            AbstractionLevel::Medium => "medium",
            AbstractionLevel::Low => "low",
        }
    }
}

/// Position of a chunk in a parent/child hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkRole {
    Standalone,
    Parent,
    Child,
}

/// Offsets are character (Unicode scalar) indices into the source document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    pub start_index: usize,
    pub end_index: usize,
    pub chunk_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,

    // Enrichment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abstraction_level: Option<AbstractionLevel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    // Hierarchy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_parent: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_child: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl ChunkMetadata {
    pub fn new(start_index: usize, end_index: usize, chunk_index: usize) -> Self {
        Self {
            start_index,
            end_index,
            chunk_index,
            ..Self::default()
        }
    }

    /// Sets both source fields to the same path.
    pub fn with_source(mut self, path: &str) -> Self {
        self.source_file = Some(path.to_string());
        self.source_path = Some(path.to_string());
        self
    }

    /// The path the chunk was read from: `source_path`, else `source_file`.
    pub fn source(&self) -> Option<&str> {
        self.source_path.as_deref().or(self.source_file.as_deref())
    }

    /// Stable identity of a chunk across search lists and hierarchy links.
    pub fn key(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.source().unwrap_or(""),
            self.chunk_index,
            self.start_index,
            self.end_index
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    /// Empty until the indexer embeds the chunk.
    #[serde(default)]
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn new(text: impl Into<String>, metadata: ChunkMetadata) -> Self {
        Self {
            text: text.into(),
            embedding: Vec::new(),
            metadata,
        }
    }

    pub fn key(&self) -> String {
        self.metadata.key()
    }

    pub fn role(&self) -> ChunkRole {
        if self.metadata.is_parent {
            ChunkRole::Parent
        } else if self.metadata.is_child {
            ChunkRole::Child
        } else {
            ChunkRole::Standalone
        }
    }

    /// Marks this chunk as a parent of `child_ids`. Clears any child role.
    pub fn make_parent(&mut self, child_ids: Vec<String>) {
        self.metadata.is_parent = true;
        self.metadata.is_child = false;
        self.metadata.parent_id = None;
        self.metadata.child_ids = child_ids;
    }

    /// Marks this chunk as a child of `parent_id`. Clears any parent role.
    pub fn make_child(&mut self, parent_id: String) {
        self.metadata.is_child = true;
        self.metadata.is_parent = false;
        self.metadata.child_ids.clear();
        self.metadata.parent_id = Some(parent_id);
    }
}

/// A chunk paired with a ranking score (similarity, BM25 or fused score).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// One indexed path, or several. Serialized as a bare string or an array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentPath {
    Single(String),
    Many(Vec<String>),
}

impl DocumentPath {
    pub fn from_paths(mut paths: Vec<String>) -> Self {
        if paths.len() == 1 {
            DocumentPath::Single(paths.remove(0))
        } else {
            DocumentPath::Many(paths)
        }
    }

    pub fn paths(&self) -> Vec<String> {
        match self {
            DocumentPath::Single(p) => vec![p.clone()],
            DocumentPath::Many(ps) => ps.clone(),
        }
    }
}

/// Feature toggles for indexing and querying.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RagOptions {
    /// Use the JSON store instead of the binary one
    pub json: bool,
    pub semantic_chunking: bool,
    /// At index time: build parent/child chunks. At query time: attach
    /// parents of retrieved children.
    pub hierarchical_chunking: bool,
    pub enrich_metadata: bool,
    pub expand_queries: bool,
    pub rerank: bool,
    pub expand_context: bool,
    pub multi_pass: bool,
    pub hybrid: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_uses_source_path_then_source_file() {
        let mut meta = ChunkMetadata::new(10, 20, 3);
        assert_eq!(meta.key(), "_3_10_20");
        meta.source_file = Some("notes.md".into());
        assert_eq!(meta.key(), "notes.md_3_10_20");
        meta.source_path = Some("/docs/notes.md".into());
        assert_eq!(meta.key(), "/docs/notes.md_3_10_20");
    }

    #[test]
    fn test_roles_are_exclusive() {
        let mut chunk = Chunk::new("x", ChunkMetadata::new(0, 1, 0));
        assert_eq!(chunk.role(), ChunkRole::Standalone);
        chunk.make_child("p".into());
        assert_eq!(chunk.role(), ChunkRole::Child);
        chunk.make_parent(vec!["c".into()]);
        assert_eq!(chunk.role(), ChunkRole::Parent);
        assert!(chunk.metadata.parent_id.is_none());
        assert!(!chunk.metadata.is_child);
    }

    #[test]
    fn test_metadata_serializes_camel_case_and_skips_empty() {
        let meta = ChunkMetadata::new(0, 5, 0).with_source("a.txt");
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["startIndex"], 0);
        assert_eq!(json["sourcePath"], "a.txt");
        assert!(json.get("keywords").is_none());
        assert!(json.get("isParent").is_none());
    }

    #[test]
    fn test_abstraction_level_serializes_lowercase() {
        let json = serde_json::to_value(AbstractionLevel::Medium).unwrap();
        assert_eq!(json, "medium");
    }

    #[test]
    fn test_document_path_single_or_many() {
        let single = DocumentPath::from_paths(vec!["a".into()]);
        assert_eq!(serde_json::to_value(&single).unwrap(), "a");
        let many = DocumentPath::from_paths(vec!["a".into(), "b".into()]);
        assert_eq!(
            serde_json::to_value(&many).unwrap(),
            serde_json::json!(["a", "b"])
        );
        let back: DocumentPath = serde_json::from_str("\"x\"").unwrap();
        assert_eq!(back.paths(), vec!["x".to_string()]);
    }

    #[test]
    fn test_options_default_off() {
        let opts: RagOptions = serde_json::from_str("{\"hybrid\":true}").unwrap();
        assert!(opts.hybrid);
        assert!(!opts.rerank);
    }
}
