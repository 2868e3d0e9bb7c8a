use serde::{Deserialize, Serialize};

use anyhow::{Context, Result};

use crate::models::{Chunk, DocumentPath};

/// Textual store document, as read back from disk.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonStore {
    pub chunks: Vec<Chunk>,
    pub document_path: DocumentPath,
    pub indexed_at: String,
    #[serde(default)]
    pub file_count: Option<usize>,
    #[serde(default)]
    pub total_chunks: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonStoreRef<'a> {
    chunks: &'a [Chunk],
    document_path: DocumentPath,
    indexed_at: &'a str,
    file_count: usize,
    total_chunks: usize,
}

pub fn encode(chunks: &[Chunk], file_paths: &[String], indexed_at: &str) -> Result<String> {
    let doc = JsonStoreRef {
        chunks,
        document_path: DocumentPath::from_paths(file_paths.to_vec()),
        indexed_at,
        file_count: file_paths.len(),
        total_chunks: chunks.len(),
    };
    serde_json::to_string_pretty(&doc).context("Failed to serialize vector store")
}

pub fn decode(data: &str) -> Result<JsonStore> {
    serde_json::from_str(data).context("Failed to parse vector store JSON")
}
