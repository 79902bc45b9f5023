//! Error types for bluecode operations
//!
//! Each controller has its own error enum so callers can tell a fatal
//! lifecycle failure apart from a dropped hotplug event. Variants carry the
//! path or index involved so a single log line is enough to diagnose.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure of the secure erasure primitive.
///
/// An overwrite that cannot be performed is NOT an error: it downgrades the
/// outcome to [`crate::erase::EraseOutcome::Degraded`]. Only the inability to
/// remove the file at all is reported here.
#[derive(Debug, Error)]
pub enum EraseError {
    /// The path could not be inspected (missing, or parent unreadable)
    #[error("cannot inspect {}: {source}", path.display())]
    Inspect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The path is a directory; erasure only applies to files
    #[error("refusing to erase directory {}", path.display())]
    IsDirectory { path: PathBuf },

    /// Final unlink failed, the content may still be reachable
    #[error("failed to unlink {}: {source}", path.display())]
    Unlink {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failure of `start()` / `stop()` on the RAM-only database lifecycle.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Caller lacks the privileges needed to mount and erase
    #[error("{operation} requires root privileges")]
    PermissionDenied { operation: &'static str },

    /// Mounting or detaching a volatile layer failed
    #[error("mount operation on {} failed: {source}", path.display())]
    Mount {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Backing up or restoring the client database failed
    #[error("copy {} -> {} failed: {source}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The copied database does not match its source
    #[error(
        "copy {} -> {} corrupted: crc32c expected 0x{expected:08x}, got 0x{actual:08x}",
        from.display(),
        to.display()
    )]
    CopyVerification {
        from: PathBuf,
        to: PathBuf,
        expected: u32,
        actual: u32,
    },

    /// A step after the original was erased failed; the staged copy is
    /// discarded with staging
    #[error("client database lost during remount: {source}")]
    DatabaseLost {
        #[source]
        source: Box<LifecycleError>,
    },

    /// Erasing a database copy failed outright
    #[error(transparent)]
    Erase(#[from] EraseError),

    /// Any other filesystem operation
    #[error("I/O error on {}: {message} ({source})", path.display())]
    Io {
        path: PathBuf,
        message: String,
        #[source]
        source: io::Error,
    },
}

/// Failure reported by a wireless interface record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing configuration system rejected the request
    #[error("configuration backend error: {0}")]
    Backend(String),

    /// A stored value could not be understood
    #[error("malformed record {index}: {reason}")]
    Malformed { index: usize, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Failure while handling a hotplug button event.
#[derive(Debug, Error)]
pub enum ToggleError {
    #[error("{operation} requires root privileges")]
    PermissionDenied { operation: &'static str },

    /// Reading or staging interface records failed
    #[error("interface store: {0}")]
    Store(#[from] StoreError),

    /// Commit was rejected; the store keeps its pre-commit state
    #[error("commit failed: {0}")]
    Commit(#[source] StoreError),

    /// Changes are committed but the radios were not reloaded
    #[error("radio reload failed: {0}")]
    Reload(#[source] StoreError),
}

/// Failure invoking the external randomization engine.
#[derive(Debug, Error)]
pub enum RandomizeError {
    #[error("failed to launch {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} exited with {status}: {stderr}", program.display())]
    Failed {
        program: PathBuf,
        status: String,
        stderr: String,
    },

    /// The request would reboot the device, which the boot path never allows
    #[error("target set {0} requires a reboot and must be operator-initiated")]
    RebootRequired(String),
}

/// Result alias for erasure
pub type EraseResult<T> = Result<T, EraseError>;

/// Result alias for lifecycle operations
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Result alias for hotplug handling
pub type ToggleResult<T> = Result<T, ToggleError>;
