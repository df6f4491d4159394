use std::io;

/// How a failure inside the pipeline is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Lock, permission or partial-write trouble; retried with a bounded delay.
    TransientIo,
    /// The file vanished; treated as already resolved.
    NotFound,
    /// Preprocessing or inference failed; the photo gets an error verdict.
    ModelFailure,
    /// A subsystem was unavailable at startup; the pipeline degrades to a fallback.
    ConfigurationFailure,
}

impl FailureClass {
    /// Classify an I/O error. `None` means the failure is permanent and must not be retried.
    pub fn of_io(err: &io::Error) -> Option<Self> {
        match err.kind() {
            io::ErrorKind::NotFound => Some(Self::NotFound),
            io::ErrorKind::PermissionDenied
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::ResourceBusy
            | io::ErrorKind::Interrupted
            | io::ErrorKind::TimedOut => Some(Self::TransientIo),
            _ if is_sharing_violation(err) => Some(Self::TransientIo),
            _ => None,
        }
    }

    pub fn is_transient_io(err: &io::Error) -> bool {
        Self::of_io(err) == Some(Self::TransientIo)
    }
}

#[cfg(windows)]
fn is_sharing_violation(err: &io::Error) -> bool {
    // ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION
    matches!(err.raw_os_error(), Some(32) | Some(33))
}

#[cfg(not(windows))]
fn is_sharing_violation(_err: &io::Error) -> bool {
    false
}
