use std::collections::HashSet;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::error::RagError;

pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "txt", "md", "js", "ts", "json", "py", "java", "cpp", "c", "h", "rs",
];

pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

const SKIPPED_DIRS: &[&str] = &["node_modules", "dist", "build"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedFile {
    pub path: PathBuf,
    pub extension: String,
    pub size: u64,
}

impl CollectedFile {
    pub fn path_string(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// Supported files under every path, in walk order, each absolute path
/// once. A missing path is an error; so is finding nothing at all.
pub fn collect_files<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<CollectedFile>, RagError> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for path in paths {
        let path = path.as_ref();
        let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        if !absolute.exists() {
            return Err(RagError::PathNotFound(absolute));
        }

        for file in collect_path(&absolute) {
            if seen.insert(file.path.clone()) {
                files.push(file);
            }
        }
    }

    if files.is_empty() {
        return Err(RagError::NoSupportedFiles);
    }
    tracing::info!("Collected {} file(s) from {} path(s)", files.len(), paths.len());
    Ok(files)
}

fn collect_path(root: &Path) -> Vec<CollectedFile> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden_or_ignored(e))
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(file) = supported_file(entry.path()) {
            files.push(file);
        }
    }

    files
}

fn is_hidden_or_ignored(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref())
}

fn supported_file(path: &Path) -> Option<CollectedFile> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        return None;
    }

    let size = std::fs::metadata(path).ok()?.len();
    if size > MAX_FILE_SIZE {
        tracing::warn!("Skipping {} ({} bytes exceeds limit)", path.display(), size);
        return None;
    }

    Some(CollectedFile {
        path: path.to_path_buf(),
        extension,
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "content").unwrap();
    }

    fn names(files: &[CollectedFile], root: &Path) -> Vec<String> {
        files
            .iter()
            .map(|f| f.path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn test_walks_directories_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "a.md");
        touch(root, "image.png");
        touch(root, "src/lib.rs");
        touch(root, "node_modules/pkg/index.js");
        touch(root, "build/out.txt");
        touch(root, ".git/config.txt");
        touch(root, "docs/.hidden.md");
        touch(root, "docs/guide.MD");

        let files = collect_files(&[root]).unwrap();
        assert_eq!(names(&files, root), vec!["a.md", "docs/guide.MD", "src/lib.rs"]);
        assert_eq!(files[1].extension, "md");
    }

    #[test]
    fn test_single_file_and_dedupe() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "notes.txt");
        let file = root.join("notes.txt");

        let files = collect_files(&[file.clone(), root.to_path_buf(), file]).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].size, 7);
    }

    #[test]
    fn test_missing_path_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            collect_files(&[missing]),
            Err(RagError::PathNotFound(_))
        ));
    }

    #[test]
    fn test_no_supported_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "photo.jpg");
        assert!(matches!(
            collect_files(&[dir.path()]),
            Err(RagError::NoSupportedFiles)
        ));
    }

    #[test]
    fn test_oversized_file_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let big = dir.path().join("big.txt");
        let f = std::fs::File::create(&big).unwrap();
        f.set_len(MAX_FILE_SIZE + 1).unwrap();
        touch(dir.path(), "small.txt");

        let files = collect_files(&[dir.path()]).unwrap();
        assert_eq!(names(&files, dir.path()), vec!["small.txt"]);
    }
}
