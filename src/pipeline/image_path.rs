use std::cmp::Ordering;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Component, Path, PathBuf};

/// Image extensions the pipeline picks up, compared case-insensitively.
pub const SUPPORTED_IMAGE_EXTENSIONS: [&str; 8] =
    ["jpg", "jpeg", "png", "gif", "bmp", "webp", "tiff", "tif"];

/// True when `path` carries one of [`SUPPORTED_IMAGE_EXTENSIONS`].
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| {
            SUPPORTED_IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// An absolute candidate path plus its normalized identity.
///
/// Equality, ordering and hashing use the normalized key only, so two spellings of the same file
/// collapse into one entry.
#[derive(Clone)]
pub struct ImagePath {
    path: PathBuf,
    key: OsString,
}

impl ImagePath {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = normalize(path.as_ref());
        let key = normalized_key(&path);
        Self { path, key }
    }

    pub fn as_path(&self) -> &Path {
        &self.path
    }

    pub fn key(&self) -> &OsStr {
        &self.key
    }

    pub fn file_name(&self) -> Option<&OsStr> {
        self.path.file_name()
    }

    pub fn extension(&self) -> Option<&OsStr> {
        self.path.extension()
    }

    pub fn parent(&self) -> Option<&Path> {
        self.path.parent()
    }

    pub fn display(&self) -> std::path::Display<'_> {
        self.path.display()
    }
}

impl fmt::Debug for ImagePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.path, f)
    }
}

impl PartialEq for ImagePath {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ImagePath {}

impl Hash for ImagePath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for ImagePath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ImagePath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl AsRef<Path> for ImagePath {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

impl From<&Path> for ImagePath {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}

impl From<PathBuf> for ImagePath {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}

/// Make `path` absolute and drop `.`/`..` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(windows)]
fn normalized_key(path: &Path) -> OsString {
    OsString::from(path.to_string_lossy().replace('/', "\\").to_lowercase())
}

// Raw bytes, so names that differ only in non-UTF-8 bytes stay distinct.
#[cfg(not(windows))]
fn normalized_key(path: &Path) -> OsString {
    path.as_os_str().to_os_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_match_ignores_case() {
        assert!(is_supported_image(Path::new("scan.JPG")));
        assert!(is_supported_image(Path::new("scan.Tiff")));
        assert!(!is_supported_image(Path::new("scan.jpg.part")));
        assert!(!is_supported_image(Path::new("README")));
    }

    #[test]
    fn dot_segments_collapse_to_one_identity() {
        let base = std::env::temp_dir();
        let direct = ImagePath::new(base.join("a.png"));
        let dotted = ImagePath::new(base.join(".").join("sub").join("..").join("a.png"));
        assert_eq!(direct, dotted);
        assert!(direct.as_path().is_absolute());
    }

    #[test]
    fn relative_paths_become_absolute() {
        let path = ImagePath::new("relative.png");
        assert!(path.as_path().is_absolute());
        assert_eq!(path.file_name(), Some(OsStr::new("relative.png")));
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_names_keep_distinct_identities() {
        use std::collections::HashSet;
        use std::os::unix::ffi::OsStrExt;

        let base = std::env::temp_dir();
        let first = ImagePath::new(base.join(OsStr::from_bytes(b"shot-\xff.png")));
        let second = ImagePath::new(base.join(OsStr::from_bytes(b"shot-\xfe.png")));
        assert_ne!(first, second);

        let set: HashSet<ImagePath> = [first.clone(), second, first].into_iter().collect();
        assert_eq!(set.len(), 2);
    }
}
