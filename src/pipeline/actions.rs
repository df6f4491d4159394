//! Turn a verdict into a rename or delete, with bounded retries on locked files.

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use time::OffsetDateTime;
use time::format_description::FormatItem;
use time::macros::format_description;
use tracing::{info, warn};

use crate::classifier::{Label, Verdict};

use super::failure::FailureClass;
use super::image_path::ImagePath;
use super::record::Outcome;
use super::retry::{RetryConfig, retry_with_delay};

const ARCHIVE_NAME_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]-[minute]-[second]");

/// Wall-clock source used for archive names.
pub type Clock = Arc<dyn Fn() -> OffsetDateTime + Send + Sync>;

/// Executes the filesystem action for a verdict. Shared by all workers.
pub struct ActionResolver {
    retry: RetryConfig,
    clock: Clock,
    // Held from picking an archive name until the rename lands so workers never pick the same one.
    naming: Mutex<()>,
}

impl std::fmt::Debug for ActionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionResolver")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ActionResolver {
    pub fn new(retry: RetryConfig) -> Self {
        Self::with_clock(retry, Arc::new(crate::logging::now_local_or_utc))
    }

    pub fn with_clock(retry: RetryConfig, clock: Clock) -> Self {
        Self {
            retry,
            clock,
            naming: Mutex::new(()),
        }
    }

    /// Defect: archive in place. Not defect: delete. Error: leave the file alone.
    ///
    /// Never fails; problems are reported through the returned [`Outcome`].
    pub fn resolve(&self, path: &ImagePath, verdict: &Verdict, cancel: &AtomicBool) -> Outcome {
        let result = match verdict.label {
            Label::Error => return Outcome::Untouched,
            Label::Defect => self.with_retries(path, cancel, || self.archive(path)),
            Label::NotDefect => self.with_retries(path, cancel, || {
                std::fs::remove_file(path.as_path()).map(|()| Outcome::Deleted)
            }),
        };
        match result {
            Ok(outcome) => {
                info!(path = %path.display(), %outcome, "Photo resolved");
                outcome
            }
            Err(err) if FailureClass::of_io(&err) == Some(FailureClass::NotFound) => {
                info!(path = %path.display(), "Photo vanished before it could be resolved");
                Outcome::Vanished
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Giving up on photo action");
                Outcome::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }

    fn with_retries<F>(
        &self,
        path: &ImagePath,
        cancel: &AtomicBool,
        mut action: F,
    ) -> io::Result<Outcome>
    where
        F: FnMut() -> io::Result<Outcome>,
    {
        retry_with_delay(
            self.retry,
            cancel,
            |attempt| {
                action().inspect_err(|err| {
                    if FailureClass::is_transient_io(err) {
                        warn!(
                            path = %path.display(),
                            attempt,
                            error = %err,
                            "Photo is locked; retrying"
                        );
                    }
                })
            },
            FailureClass::is_transient_io,
        )
    }

    fn archive(&self, path: &ImagePath) -> io::Result<Outcome> {
        let dir = path.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "photo has no parent directory")
        })?;
        let _naming = self.naming.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let target = free_archive_path(dir, (self.clock)(), path.extension())?;
        std::fs::rename(path.as_path(), &target)?;
        Ok(Outcome::Renamed {
            from: path.clone(),
            to: ImagePath::new(target),
        })
    }
}

/// `YYYY-MM-DD HH-MM-SS[_N].<ext>` for the given time and collision suffix.
pub fn archive_file_name(
    now: OffsetDateTime,
    extension: Option<&OsStr>,
    suffix: usize,
) -> io::Result<String> {
    let stamp = now.format(ARCHIVE_NAME_FORMAT).map_err(io::Error::other)?;
    let mut name = if suffix == 0 {
        stamp
    } else {
        format!("{stamp}_{suffix}")
    };
    if let Some(ext) = extension {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    Ok(name)
}

/// First archive name in `dir` not already taken.
fn free_archive_path(
    dir: &Path,
    now: OffsetDateTime,
    extension: Option<&OsStr>,
) -> io::Result<PathBuf> {
    let mut suffix = 0usize;
    loop {
        let candidate = dir.join(archive_file_name(now, extension, suffix)?);
        if !candidate.try_exists()? {
            return Ok(candidate);
        }
        suffix += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;
    use time::macros::datetime;

    const FAST: RetryConfig = RetryConfig::new(3, Duration::from_millis(0));

    fn fixed_resolver() -> ActionResolver {
        ActionResolver::with_clock(FAST, Arc::new(|| datetime!(2024-01-01 12:00:00 UTC)))
    }

    fn verdict(label: Label) -> Verdict {
        Verdict {
            label,
            confidence: 0.9,
            demo: false,
        }
    }

    fn photo(dir: &Path, name: &str) -> ImagePath {
        let path = dir.join(name);
        std::fs::write(&path, b"pixels").unwrap();
        ImagePath::new(path)
    }

    #[test]
    fn defect_is_archived_with_timestamp_name() {
        let dir = tempdir().unwrap();
        let cancel = AtomicBool::new(false);
        let path = photo(dir.path(), "a.jpg");

        let outcome = fixed_resolver().resolve(&path, &verdict(Label::Defect), &cancel);

        let expected = ImagePath::new(dir.path().join("2024-01-01 12-00-00.jpg"));
        assert_eq!(
            outcome,
            Outcome::Renamed {
                from: path.clone(),
                to: expected.clone()
            }
        );
        assert!(!path.as_path().exists());
        assert_eq!(std::fs::read(expected.as_path()).unwrap(), b"pixels");
    }

    #[test]
    fn same_second_defects_get_distinct_suffixes() {
        let dir = tempdir().unwrap();
        let cancel = AtomicBool::new(false);
        let resolver = fixed_resolver();
        let first = photo(dir.path(), "a.png");
        let second = photo(dir.path(), "b.png");

        resolver.resolve(&first, &verdict(Label::Defect), &cancel);
        resolver.resolve(&second, &verdict(Label::Defect), &cancel);

        assert!(dir.path().join("2024-01-01 12-00-00.png").is_file());
        assert!(dir.path().join("2024-01-01 12-00-00_1.png").is_file());
    }

    #[test]
    fn concurrent_archives_never_collide() {
        let dir = tempdir().unwrap();
        let resolver = Arc::new(fixed_resolver());
        let paths: Vec<ImagePath> = (0..8)
            .map(|idx| photo(dir.path(), &format!("p{idx}.jpg")))
            .collect();

        let handles: Vec<_> = paths
            .into_iter()
            .map(|path| {
                let resolver = Arc::clone(&resolver);
                std::thread::spawn(move || {
                    let cancel = AtomicBool::new(false);
                    resolver.resolve(&path, &verdict(Label::Defect), &cancel)
                })
            })
            .collect();
        for handle in handles {
            assert!(matches!(handle.join().unwrap(), Outcome::Renamed { .. }));
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 8);
    }

    #[test]
    fn not_defect_is_deleted_without_replacement() {
        let dir = tempdir().unwrap();
        let cancel = AtomicBool::new(false);
        let path = photo(dir.path(), "b.png");

        let outcome = fixed_resolver().resolve(&path, &verdict(Label::NotDefect), &cancel);

        assert_eq!(outcome, Outcome::Deleted);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn error_verdict_leaves_file_alone() {
        let dir = tempdir().unwrap();
        let cancel = AtomicBool::new(false);
        let path = photo(dir.path(), "c.png");
        let outcome = fixed_resolver().resolve(&path, &Verdict::error(false), &cancel);
        assert_eq!(outcome, Outcome::Untouched);
        assert!(path.as_path().is_file());
    }

    #[test]
    fn missing_file_is_reported_as_vanished() {
        let dir = tempdir().unwrap();
        let cancel = AtomicBool::new(false);
        let path = ImagePath::new(dir.path().join("gone.png"));
        let resolver = fixed_resolver();
        assert_eq!(resolver.resolve(&path, &verdict(Label::NotDefect), &cancel), Outcome::Vanished);
        assert_eq!(resolver.resolve(&path, &verdict(Label::Defect), &cancel), Outcome::Vanished);
    }

    #[test]
    fn permanent_failure_is_reported_not_raised() {
        let dir = tempdir().unwrap();
        let cancel = AtomicBool::new(false);
        let folder = dir.path().join("folder.png");
        std::fs::create_dir(&folder).unwrap();
        let outcome =
            fixed_resolver().resolve(&ImagePath::new(&folder), &verdict(Label::NotDefect), &cancel);
        assert!(matches!(outcome, Outcome::Failed { .. }));
        assert!(folder.is_dir());
    }

    #[test]
    fn archive_name_keeps_extension_case() {
        let name = archive_file_name(
            datetime!(2023-07-09 08:05:03 UTC),
            Some(OsStr::new("JPG")),
            2,
        )
        .unwrap();
        assert_eq!(name, "2023-07-09 08-05-03_2.JPG");
    }
}
