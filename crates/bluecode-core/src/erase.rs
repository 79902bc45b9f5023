//! Secure erasure primitive
//!
//! Overwrite-then-unlink for single files:
//! 1. Random pattern passes (`passes - 1` of them)
//! 2. One final all-zero pass
//! 3. `durable_sync` after every pass so each pass reaches the medium
//! 4. Unlink
//!
//! When the file cannot be overwritten in place (not a regular file, open
//! for write refused, sync unsupported) the file is still unlinked and the
//! outcome is [`EraseOutcome::Degraded`]. That is a security warning for the
//! caller to log, not a failure.

use std::fs::{self, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;

use rand::RngCore;
use tracing::{debug, warn};

use crate::config::MIN_ERASE_PASSES;
use crate::error::{EraseError, EraseResult};
use crate::platform_durability::durable_sync;

/// Overwrite buffer size
const CHUNK_SIZE: usize = 64 * 1024;

/// How thoroughly a file was destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseOutcome {
    /// Every overwrite pass completed and synced before unlink
    Secure,
    /// Content was only unlinked; old blocks may still be recoverable
    Degraded,
}

/// Secure erasure with a fixed pass count.
#[derive(Debug, Clone, Copy)]
pub struct Eraser {
    passes: u32,
}

impl Eraser {
    /// Passes below the minimum (one pattern + one zero) are raised to it.
    pub fn new(passes: u32) -> Self {
        Self { passes: passes.max(MIN_ERASE_PASSES) }
    }

    pub fn passes(&self) -> u32 {
        self.passes
    }

    /// Destroy the contents of `path` and remove it.
    ///
    /// Symlinks are never followed: the link itself is removed and the
    /// outcome is `Degraded`.
    pub fn erase(&self, path: &Path) -> EraseResult<EraseOutcome> {
        let meta = fs::symlink_metadata(path).map_err(|e| EraseError::Inspect {
            path: path.to_path_buf(),
            source: e,
        })?;

        if meta.is_dir() {
            return Err(EraseError::IsDirectory { path: path.to_path_buf() });
        }

        let outcome = if meta.file_type().is_file() {
            match overwrite(path, meta.len(), self.passes) {
                Ok(()) => EraseOutcome::Secure,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "overwrite unavailable, falling back to plain unlink");
                    EraseOutcome::Degraded
                }
            }
        } else {
            warn!(path = %path.display(), "not a regular file, falling back to plain unlink");
            EraseOutcome::Degraded
        };

        fs::remove_file(path).map_err(|e| EraseError::Unlink {
            path: path.to_path_buf(),
            source: e,
        })?;

        debug!(path = %path.display(), ?outcome, passes = self.passes, "erased");
        Ok(outcome)
    }
}

impl Default for Eraser {
    fn default() -> Self { Self::new(3) }
}

/// Overwrite every byte of the file `passes` times, zeros last.
fn overwrite(path: &Path, len: u64, passes: u32) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    let mut rng = rand::thread_rng();
    let mut buf = vec![0u8; CHUNK_SIZE];

    for pass in 0..passes {
        let zero_pass = pass + 1 == passes;
        file.seek(SeekFrom::Start(0))?;

        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(CHUNK_SIZE as u64) as usize;
            if zero_pass {
                buf[..n].fill(0);
            } else {
                rng.fill_bytes(&mut buf[..n]);
            }
            file.write_all(&buf[..n])?;
            remaining -= n as u64;
        }

        durable_sync(&file)?;
    }
    Ok(())
}
