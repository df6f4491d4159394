//! Directory enumeration and the canonical set of known image paths.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use thiserror::Error;
use tracing::{debug, warn};

use super::image_path::{ImagePath, SUPPORTED_IMAGE_EXTENSIONS, is_supported_image};

/// Failure to enumerate the watched directory as a whole.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),
}

/// List the recognized images directly inside `dir`, deduplicated and sorted.
///
/// Merges a case-insensitive glob per extension with a plain directory listing. Entries that
/// cannot be read are skipped.
pub fn scan(dir: &Path) -> Result<Vec<ImagePath>, ScanError> {
    if !dir.is_dir() {
        return Err(ScanError::NotADirectory(dir.to_path_buf()));
    }
    let mut found: BTreeSet<ImagePath> = BTreeSet::new();
    for path in glob_images(dir) {
        found.insert(ImagePath::new(path));
    }
    for path in list_images(dir)? {
        found.insert(ImagePath::new(path));
    }
    Ok(found.into_iter().collect())
}

fn glob_images(dir: &Path) -> Vec<PathBuf> {
    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    let base = Pattern::escape(&dir.to_string_lossy());
    let mut paths = Vec::new();
    for ext in SUPPORTED_IMAGE_EXTENSIONS {
        let pattern = format!("{base}/*.{ext}");
        let entries = match glob::glob_with(&pattern, options) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(pattern = %pattern, error = %err, "Skipping invalid scan pattern");
                continue;
            }
        };
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => paths.push(path),
                Ok(_) => {}
                Err(err) => debug!(error = %err, "Skipping unreadable glob entry"),
            }
        }
    }
    paths
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>, ScanError> {
    let entries = std::fs::read_dir(dir).map_err(|source| ScanError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "Skipping unreadable directory entry");
                continue;
            }
        };
        let is_file = entry.file_type().map(|kind| kind.is_file()).unwrap_or(false);
        let path = entry.path();
        if is_file && is_supported_image(&path) {
            paths.push(path);
        }
    }
    Ok(paths)
}

/// Canonical, deduplicated, sorted set of image paths the pipeline knows about.
#[derive(Debug, Default, Clone)]
pub struct PathIndex {
    paths: BTreeSet<ImagePath>,
}

impl PathIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an index from a directory scan.
    pub fn from_scan(dir: &Path) -> Result<Self, ScanError> {
        Ok(Self {
            paths: scan(dir)?.into_iter().collect(),
        })
    }

    /// Returns false when the path was already present.
    pub fn add(&mut self, path: ImagePath) -> bool {
        self.paths.insert(path)
    }

    pub fn remove(&mut self, path: &ImagePath) -> bool {
        self.paths.remove(path)
    }

    pub fn contains(&self, path: &ImagePath) -> bool {
        self.paths.contains(path)
    }

    /// Replace `from` with `to`, keeping `to` even if `from` was unknown.
    pub fn rename(&mut self, from: &ImagePath, to: ImagePath) {
        self.paths.remove(from);
        self.paths.insert(to);
    }

    pub fn paths(&self) -> impl Iterator<Item = &ImagePath> {
        self.paths.iter()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn scan_filters_sorts_and_ignores_case() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "b.PNG");
        touch(dir.path(), "a.jpg");
        touch(dir.path(), "c.TIF");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), "archive.jpg.bak");
        std::fs::create_dir(dir.path().join("folder.jpg")).unwrap();

        let names: Vec<String> = scan(dir.path())
            .unwrap()
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["a.jpg", "b.PNG", "c.TIF"]);
    }

    #[test]
    fn scan_never_reports_duplicates() {
        let dir = tempdir().unwrap();
        for idx in 0..20 {
            touch(dir.path(), &format!("img_{idx:02}.jpeg"));
        }
        let first = scan(dir.path()).unwrap();
        let second = scan(dir.path()).unwrap();
        assert_eq!(first.len(), 20);
        assert_eq!(first, second);
        assert!(first.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn scan_handles_glob_metacharacters_in_directory() {
        let dir = tempdir().unwrap();
        let odd = dir.path().join("batch [1]");
        std::fs::create_dir(&odd).unwrap();
        touch(&odd, "x.gif");
        assert_eq!(scan(&odd).unwrap().len(), 1);
    }

    #[test]
    fn scan_of_missing_directory_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            scan(&dir.path().join("missing")),
            Err(ScanError::NotADirectory(_))
        ));
    }

    #[test]
    fn index_rename_swaps_entries() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "a.png");
        let mut index = PathIndex::from_scan(dir.path()).unwrap();
        let old = ImagePath::new(dir.path().join("a.png"));
        let new = ImagePath::new(dir.path().join("2024-01-01 12-00-00.png"));
        assert!(index.contains(&old));

        index.rename(&old, new.clone());

        assert!(!index.contains(&old));
        assert!(index.contains(&new));
        assert_eq!(index.len(), 1);
        assert!(!index.add(new));
    }
}
