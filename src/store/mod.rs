pub mod binary;
pub mod json;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use parking_lot::RwLock;

use crate::error::RagError;
use crate::models::{Chunk, DocumentPath};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFormat {
    Json,
    Binary,
}

impl StoreFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            StoreFormat::Json
        } else {
            StoreFormat::Binary
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            StoreFormat::Json => "vector-store.json",
            StoreFormat::Binary => "vector-store.bin",
        }
    }
}

/// In-memory view of a loaded or freshly saved store.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    pub chunks: Arc<Vec<Chunk>>,
    pub document_paths: Vec<String>,
    pub indexed_at: String,
}

/// File-backed chunk collection in one of the two encodings.
pub struct VectorStore {
    path: PathBuf,
    format: StoreFormat,
    snapshot: RwLock<Option<StoreSnapshot>>,
}

impl VectorStore {
    pub fn new(path: impl Into<PathBuf>, format: StoreFormat) -> Self {
        Self {
            path: path.into(),
            format,
            snapshot: RwLock::new(None),
        }
    }

    /// Store using the default file name for `format` inside `dir`.
    pub fn in_dir(dir: &Path, format: StoreFormat) -> Self {
        Self::new(dir.join(format.file_name()), format)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> StoreFormat {
        self.format
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot.read().is_some()
    }

    /// Reads the store file. Returns false when it is absent or cannot be
    /// decoded; never errors.
    pub fn load(&self) -> bool {
        if !self.path.exists() {
            tracing::debug!("No vector store at {}", self.path.display());
            return false;
        }

        match self.read_snapshot() {
            Ok(snapshot) => {
                tracing::info!(
                    "Loaded {} chunks from {} file(s) ({})",
                    snapshot.chunks.len(),
                    snapshot.document_paths.len(),
                    self.path.display()
                );
                *self.snapshot.write() = Some(snapshot);
                true
            }
            Err(e) => {
                tracing::warn!("Failed to load vector store {}: {e:#}", self.path.display());
                false
            }
        }
    }

    fn read_snapshot(&self) -> Result<StoreSnapshot> {
        match self.format {
            StoreFormat::Json => {
                let data = std::fs::read_to_string(&self.path).context("Failed to read vector store")?;
                let store = json::decode(&data)?;
                Ok(StoreSnapshot {
                    chunks: Arc::new(store.chunks),
                    document_paths: store.document_path.paths(),
                    indexed_at: store.indexed_at,
                })
            }
            StoreFormat::Binary => {
                let data = std::fs::read(&self.path).context("Failed to read vector store")?;
                let store = binary::decode(&data)?;
                Ok(StoreSnapshot {
                    chunks: Arc::new(store.chunks),
                    document_paths: store.file_paths,
                    indexed_at: store.indexed_at,
                })
            }
        }
    }

    /// Replaces the store on disk and in memory. Duplicate paths are
    /// collapsed, first occurrence wins.
    pub fn save(&self, chunks: Vec<Chunk>, document_paths: &[String]) -> Result<()> {
        let mut paths: Vec<String> = Vec::with_capacity(document_paths.len());
        for p in document_paths {
            if !paths.contains(p) {
                paths.push(p.clone());
            }
        }
        let indexed_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

        let data = match self.format {
            StoreFormat::Json => json::encode(&chunks, &paths, &indexed_at)?.into_bytes(),
            StoreFormat::Binary => {
                if chunks.iter().any(has_extended_metadata) {
                    tracing::warn!(
                        "Binary store keeps only offsets and source; enrichment and hierarchy metadata will not be persisted"
                    );
                }
                binary::encode(&chunks, &paths, &indexed_at)?
            }
        };

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create store directory {}", dir.display()))?;
        }

        // Atomic write via temp file + rename
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        std::fs::write(&tmp_path, &data).context("Failed to write vector store")?;
        std::fs::rename(&tmp_path, &self.path).context("Failed to replace vector store")?;

        tracing::info!(
            "Saved {} chunks from {} file(s) to {}",
            chunks.len(),
            paths.len(),
            self.path.display()
        );

        *self.snapshot.write() = Some(StoreSnapshot {
            chunks: Arc::new(chunks),
            document_paths: paths,
            indexed_at,
        });
        Ok(())
    }

    /// Shared handle to the loaded chunks.
    pub fn chunks(&self) -> Result<Arc<Vec<Chunk>>, RagError> {
        self.snapshot
            .read()
            .as_ref()
            .map(|s| s.chunks.clone())
            .ok_or(RagError::StoreNotLoaded)
    }

    /// True when the store file exists and records every one of `paths`.
    /// Only path membership is checked, not file contents or mtimes.
    pub fn exists_for_document(&self, paths: &[String]) -> bool {
        if !self.path.exists() {
            return false;
        }
        if !self.is_loaded() && !self.load() {
            return false;
        }

        let guard = self.snapshot.read();
        match guard.as_ref() {
            Some(snapshot) => paths.iter().all(|p| snapshot.document_paths.contains(p)),
            None => false,
        }
    }

    pub fn document_path(&self) -> Option<DocumentPath> {
        self.snapshot
            .read()
            .as_ref()
            .map(|s| DocumentPath::from_paths(s.document_paths.clone()))
    }

    pub fn indexed_at(&self) -> Option<String> {
        self.snapshot.read().as_ref().map(|s| s.indexed_at.clone())
    }
}

fn has_extended_metadata(chunk: &Chunk) -> bool {
    let m = &chunk.metadata;
    m.is_parent
        || m.is_child
        || m.document_type.is_some()
        || m.section.is_some()
        || m.abstraction_level.is_some()
        || !m.keywords.is_empty()
        || m.timestamp.is_some()
        || m.source_file.as_deref() != m.source_path.as_deref()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;

    fn sample_chunks() -> Vec<Chunk> {
        (0..3)
            .map(|i| {
                let mut c = Chunk::new(
                    format!("chunk number {i}"),
                    ChunkMetadata::new(i * 20, i * 20 + 14, i).with_source("/docs/a.md"),
                );
                c.embedding = vec![i as f32, 0.5, -1.0];
                c
            })
            .collect()
    }

    #[test]
    fn test_chunks_before_load_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::in_dir(dir.path(), StoreFormat::Binary);
        assert!(matches!(store.chunks(), Err(RagError::StoreNotLoaded)));
        assert!(!store.load());
        assert_eq!(store.document_path(), None);
    }

    #[test]
    fn test_save_then_load_both_formats() {
        for format in [StoreFormat::Json, StoreFormat::Binary] {
            let dir = tempfile::tempdir().unwrap();
            let paths = vec!["/docs/a.md".to_string()];
            VectorStore::in_dir(dir.path(), format)
                .save(sample_chunks(), &paths)
                .unwrap();

            let reopened = VectorStore::in_dir(dir.path(), format);
            assert!(reopened.load(), "{format:?} store should load");
            assert_eq!(*reopened.chunks().unwrap(), sample_chunks());
            assert_eq!(reopened.document_path(), Some(DocumentPath::Single("/docs/a.md".into())));
            assert!(reopened.indexed_at().unwrap().ends_with('Z'));
        }
    }

    #[test]
    fn test_save_creates_directory_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = VectorStore::in_dir(&nested, StoreFormat::Json);
        store.save(sample_chunks(), &["/docs/a.md".to_string()]).unwrap();

        let names: Vec<String> = std::fs::read_dir(&nested)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["vector-store.json"]);
    }

    #[test]
    fn test_save_dedupes_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::in_dir(dir.path(), StoreFormat::Binary);
        let paths = vec!["/b".to_string(), "/a".to_string(), "/b".to_string()];
        store.save(Vec::new(), &paths).unwrap();
        assert_eq!(
            store.document_path(),
            Some(DocumentPath::Many(vec!["/b".into(), "/a".into()]))
        );
    }

    #[test]
    fn test_exists_for_document_is_path_membership() {
        let dir = tempfile::tempdir().unwrap();
        let paths = vec!["/docs/a.md".to_string(), "/docs/b.md".to_string()];
        VectorStore::in_dir(dir.path(), StoreFormat::Json)
            .save(sample_chunks(), &paths)
            .unwrap();

        let store = VectorStore::in_dir(dir.path(), StoreFormat::Json);
        assert!(store.exists_for_document(&["/docs/b.md".to_string()]));
        assert!(store.exists_for_document(&paths));
        assert!(!store.exists_for_document(&["/docs/a.md".to_string(), "/docs/c.md".to_string()]));
        assert!(store.is_loaded());

        let other = VectorStore::in_dir(dir.path(), StoreFormat::Binary);
        assert!(!other.exists_for_document(&paths));
    }

    #[test]
    fn test_corrupt_file_does_not_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::in_dir(dir.path(), StoreFormat::Binary);
        std::fs::write(store.path(), b"NOPE-not-a-store").unwrap();
        assert!(!store.load());
        assert!(!store.exists_for_document(&[]));

        let json = VectorStore::in_dir(dir.path(), StoreFormat::Json);
        std::fs::write(json.path(), "{").unwrap();
        assert!(!json.load());
    }
}
