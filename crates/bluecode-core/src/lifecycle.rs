//! RAM-only client database lifecycle
//!
//! `start()` relocates the client database onto a tmpfs layer bound at its
//! own directory, so nothing written while the service runs ever reaches
//! flash. `stop()` destroys it.
//!
//! **Start sequence** (each step fatal, no rollback; re-running repairs):
//! 1. Create a staging directory and mount a volatile layer on it
//! 2. Copy the current database into staging (CRC32C verified), erase the original
//! 3. Detach any volatile layer already bound at the database directory
//! 4. Ensure the database directory exists
//! 5. Mount a fresh volatile layer on it
//! 6. Restore the staged copy (CRC32C verified)
//! 7. Detach and remove staging
//!
//! A failure in steps 3-6 after step 2 erased the original is reported as
//! [`LifecycleError::DatabaseLost`]: staging is still removed, taking the
//! only remaining copy with it.
//!
//! Step 3 also erases any database file exposed in a lower layer, so a stale
//! copy left on flash by an earlier crash never survives a start or stop.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::erase::{EraseOutcome, Eraser};
use crate::error::{LifecycleError, LifecycleResult, RandomizeError};
use crate::mount::VolatileMounter;
use crate::privilege::is_root;
use crate::randomize::{RandomizeRequest, RandomizeTarget, Randomizer};

/// Upper bound on stacked volatile layers detached in one pass.
const MAX_STACKED_LAYERS: usize = 16;

const STAGING_PREFIX: &str = ".bluecode-stage-";

/// Whether the database directory is currently RAM-backed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceLifecycleState {
    Stopped,
    Running,
}

/// Orchestrates volatile storage for the client database.
///
/// Instantiated once per process from a [`Config`]; `start` and `stop` are
/// both idempotent.
pub struct LifecycleController<M> {
    mounter: M,
    eraser: Eraser,
    db_dir: PathBuf,
    db_file: String,
    staging_root: PathBuf,
    require_root: bool,
    randomize_on_start: bool,
    boot_targets: BTreeSet<RandomizeTarget>,
    randomizer: Option<Box<dyn Randomizer>>,
}

impl<M: VolatileMounter> LifecycleController<M> {
    pub fn new(config: &Config, mounter: M) -> Self {
        Self {
            mounter,
            eraser: Eraser::new(config.erase_passes),
            db_dir: config.db_dir.clone(),
            db_file: config.db_file.clone(),
            staging_root: config.staging_root.clone(),
            require_root: config.require_root,
            randomize_on_start: config.randomize_on_start,
            boot_targets: config.boot_targets.clone(),
            randomizer: None,
        }
    }

    /// Engine invoked after a successful start when `randomize_on_start` is set.
    pub fn with_randomizer(mut self, randomizer: Box<dyn Randomizer>) -> Self {
        self.randomizer = Some(randomizer);
        self
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_dir.join(&self.db_file)
    }

    pub fn mounter(&self) -> &M {
        &self.mounter
    }

    /// Current state, derived from the mount table.
    pub fn state(&self) -> LifecycleResult<ServiceLifecycleState> {
        let volatile = self.mounter.is_volatile(&self.db_dir).map_err(|e| LifecycleError::Mount {
            path: self.db_dir.clone(),
            source: e,
        })?;
        Ok(if volatile {
            ServiceLifecycleState::Running
        } else {
            ServiceLifecycleState::Stopped
        })
    }

    /// Move the client database onto a fresh volatile layer.
    pub fn start(&self) -> LifecycleResult<()> {
        self.ensure_privileged("start")?;
        info!(db = %self.db_path().display(), "securing client database in RAM");

        let staging = self.open_staging()?;
        let shuttled = self.shuttle(staging.path());
        let closed = self.close_staging(staging);
        if let (Err(_), Err(e)) = (&shuttled, &closed) {
            warn!(error = %e, "staging cleanup also failed");
        }
        shuttled?;
        closed?;

        info!(dir = %self.db_dir.display(), "client database secured with tmpfs (RAM-only storage)");
        self.randomize_after_start();
        Ok(())
    }

    /// Destroy the database and detach the volatile layer.
    pub fn stop(&self) -> LifecycleResult<()> {
        self.ensure_privileged("stop")?;

        let db_path = self.db_path();
        if file_present(&db_path) {
            self.erase(&db_path)?;
        }
        let detached = self.detach_volatile_layers()?;

        info!(dir = %self.db_dir.display(), detached, "client database destroyed");
        Ok(())
    }

    fn ensure_privileged(&self, operation: &'static str) -> LifecycleResult<()> {
        if self.require_root && !is_root() {
            return Err(LifecycleError::PermissionDenied { operation });
        }
        Ok(())
    }

    fn open_staging(&self) -> LifecycleResult<TempDir> {
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&self.staging_root)
            .map_err(|e| io_error(&self.staging_root, "failed to create staging directory", e))?;

        self.mounter.mount_volatile(staging.path()).map_err(|e| LifecycleError::Mount {
            path: staging.path().to_path_buf(),
            source: e,
        })?;

        debug!(staging = %staging.path().display(), "staging area mounted");
        Ok(staging)
    }

    /// Steps 2-6: carry the database across the remount.
    fn shuttle(&self, staging: &Path) -> LifecycleResult<()> {
        let db_path = self.db_path();
        if !db_path.is_file() {
            return self.remount(None);
        }

        let staged = staging.join(&self.db_file);
        let bytes = copy_verified(&db_path, &staged)?;
        debug!(bytes, "client database staged");
        self.erase(&db_path)?;

        // From here on the staged copy is the only one left
        self.remount(Some(&staged)).map_err(|e| {
            error!(
                db = %db_path.display(),
                error = %e,
                "client database lost: remount failed after the original was erased"
            );
            LifecycleError::DatabaseLost { source: Box::new(e) }
        })
    }

    /// Steps 3-6, restoring `staged` when there is one.
    fn remount(&self, staged: Option<&Path>) -> LifecycleResult<()> {
        self.detach_volatile_layers()?;

        fs::create_dir_all(&self.db_dir)
            .map_err(|e| io_error(&self.db_dir, "failed to create database directory", e))?;

        self.mounter.mount_volatile(&self.db_dir).map_err(|e| LifecycleError::Mount {
            path: self.db_dir.clone(),
            source: e,
        })?;

        if let Some(staged) = staged {
            copy_verified(staged, &self.db_path())?;
            debug!("client database restored into RAM");
        }
        Ok(())
    }

    fn close_staging(&self, staging: TempDir) -> LifecycleResult<()> {
        let path = staging.path().to_path_buf();
        self.mounter.detach(&path).map_err(|e| LifecycleError::Mount {
            path: path.clone(),
            source: e,
        })?;
        staging
            .close()
            .map_err(|e| io_error(&path, "failed to remove staging directory", e))
    }

    /// Detach every volatile layer at the database directory.
    ///
    /// Detach failures are logged and ignored. A database file exposed in
    /// the layer underneath is erased; failing that is fatal.
    fn detach_volatile_layers(&self) -> LifecycleResult<usize> {
        let db_path = self.db_path();
        let mut detached = 0;

        for _ in 0..MAX_STACKED_LAYERS {
            match self.mounter.detach(&self.db_dir) {
                Ok(true) => {
                    detached += 1;
                    if file_present(&db_path) {
                        warn!(path = %db_path.display(), "stale database exposed under volatile layer");
                        self.erase(&db_path)?;
                    }
                }
                Ok(false) => break,
                Err(e) => {
                    warn!(dir = %self.db_dir.display(), error = %e, "ignoring detach failure");
                    break;
                }
            }
        }
        Ok(detached)
    }

    fn erase(&self, path: &Path) -> LifecycleResult<()> {
        if self.eraser.erase(path)? == EraseOutcome::Degraded {
            warn!(
                path = %path.display(),
                security = true,
                "secure overwrite unavailable, file was only unlinked"
            );
        }
        Ok(())
    }

    fn randomize_after_start(&self) {
        if !self.randomize_on_start {
            return;
        }
        let Some(randomizer) = &self.randomizer else {
            warn!("randomize_on_start is set but no randomization engine is configured");
            return;
        };

        let request = RandomizeRequest::boot(&self.boot_targets);
        if request.requires_reboot() {
            let err = RandomizeError::RebootRequired(request.target_list());
            warn!(error = %err, "skipping boot randomization");
            return;
        }

        // The RAM-only guarantee already holds, so engine failures do not fail start().
        match randomizer.randomize(&request) {
            Ok(()) => info!(targets = %request.target_list(), "boot randomization complete"),
            Err(e) => warn!(targets = %request.target_list(), error = %e, "boot randomization failed"),
        }
    }
}

/// Something other than a directory exists at `path` (symlinks included).
fn file_present(path: &Path) -> bool {
    fs::symlink_metadata(path).map(|m| !m.is_dir()).unwrap_or(false)
}

/// Copy `from` to `to` and verify both sides hash the same.
///
/// Owner, group, permission bits and mtime are carried over like `cp -a`.
fn copy_verified(from: &Path, to: &Path) -> LifecycleResult<u64> {
    let copy_err = |e: io::Error| LifecycleError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source: e,
    };

    let bytes = fs::copy(from, to).map_err(copy_err)?;
    preserve_attributes(from, to).map_err(copy_err)?;
    let expected = file_crc(from).map_err(copy_err)?;
    let actual = file_crc(to).map_err(copy_err)?;
    if expected != actual {
        return Err(LifecycleError::CopyVerification {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            expected,
            actual,
        });
    }
    Ok(bytes)
}

/// `fs::copy` already carries the permission bits.
fn preserve_attributes(from: &Path, to: &Path) -> io::Result<()> {
    let meta = fs::metadata(from)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        let dest = fs::metadata(to)?;
        if (dest.uid(), dest.gid()) != (meta.uid(), meta.gid()) {
            match std::os::unix::fs::chown(to, Some(meta.uid()), Some(meta.gid())) {
                Ok(()) => {}
                // Like `cp -a`, ownership is best effort without root
                Err(e) if e.kind() == io::ErrorKind::PermissionDenied && !is_root() => {
                    debug!(path = %to.display(), "cannot preserve owner without root");
                }
                Err(e) => return Err(e),
            }
        }
    }
    // futimens needs ownership, not write access
    File::open(to)?.set_modified(meta.modified()?)
}

fn file_crc(path: &Path) -> io::Result<u32> {
    let mut file = File::open(path)?;
    let mut buf = [0u8; 8192];
    let mut crc = 0u32;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            return Ok(crc);
        }
        crc = crc32c::crc32c_append(crc, &buf[..n]);
    }
}

fn io_error(path: &Path, message: &str, source: io::Error) -> LifecycleError {
    LifecycleError::Io {
        path: path.to_path_buf(),
        message: message.to_string(),
        source,
    }
}
