//! tmpfs mounter backed by mount(2) and the kernel mount table.
//!
//! Layer detection reads `/proc/self/mountinfo`. When several filesystems
//! are stacked on one mount point the last matching line is the visible one,
//! so only that entry decides whether the target is volatile.

use std::ffi::CString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bluecode_core::VolatileMounter;
use tracing::debug;

const DEFAULT_MOUNTINFO: &str = "/proc/self/mountinfo";

/// Filesystem types treated as volatile.
const VOLATILE_FSTYPES: [&str; 2] = ["tmpfs", "ramfs"];

/// One parsed `mountinfo` line, only the fields we need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub mount_point: PathBuf,
    pub fstype: String,
}

impl MountEntry {
    pub fn is_volatile(&self) -> bool {
        VOLATILE_FSTYPES.contains(&self.fstype.as_str())
    }
}

/// Parse one line of `/proc/<pid>/mountinfo`.
///
/// Format: `id parent major:minor root mount_point options [optional...] - fstype source super_options`
pub fn parse_mountinfo_line(line: &str) -> Option<MountEntry> {
    let (head, tail) = line.split_once(" - ")?;
    let mount_point = head.split_whitespace().nth(4)?;
    let fstype = tail.split_whitespace().next()?;
    Some(MountEntry {
        mount_point: PathBuf::from(unescape_octal(mount_point)),
        fstype: fstype.to_string(),
    })
}

/// Undo the kernel's `\ooo` escaping of spaces, tabs, newlines and backslashes.
fn unescape_octal(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|b| (b'0'..=b'7').contains(b)) {
                let value = digits.iter().fold(0u16, |acc, b| acc * 8 + u16::from(b - b'0'));
                if let Ok(value) = u8::try_from(value) {
                    out.push(value);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Mounts tmpfs layers with `MS_NOSUID | MS_NODEV | MS_NOEXEC`.
#[derive(Debug, Clone)]
pub struct TmpfsMounter {
    mountinfo: PathBuf,
}

impl Default for TmpfsMounter {
    fn default() -> Self {
        Self::new()
    }
}

impl TmpfsMounter {
    pub fn new() -> Self {
        Self {
            mountinfo: PathBuf::from(DEFAULT_MOUNTINFO),
        }
    }

    /// Read the mount table from another file (tests, alternate namespaces).
    pub fn with_mountinfo(path: impl Into<PathBuf>) -> Self {
        Self { mountinfo: path.into() }
    }

    /// Topmost mount entry at exactly `target`, if any.
    pub fn top_entry(&self, target: &Path) -> io::Result<Option<MountEntry>> {
        let table = fs::read_to_string(&self.mountinfo)?;
        // Mount points are recorded canonicalized
        let target = fs::canonicalize(target).unwrap_or_else(|_| target.to_path_buf());
        Ok(table
            .lines()
            .filter_map(parse_mountinfo_line)
            .filter(|e| e.mount_point == target)
            .last())
    }
}

/// tmpfs options that keep the mode and ownership of the covered directory,
/// so whoever could reach it before the mount still can.
pub fn tmpfs_options(covered: &fs::Metadata) -> String {
    use std::os::unix::fs::MetadataExt;
    format!("mode={:04o},uid={},gid={}", covered.mode() & 0o7777, covered.uid(), covered.gid())
}

impl VolatileMounter for TmpfsMounter {
    fn mount_volatile(&self, target: &Path) -> io::Result<()> {
        let options = tmpfs_options(&fs::metadata(target)?);
        sys::mount_tmpfs(target, &options)?;
        debug!(target = %target.display(), %options, "tmpfs mounted");
        Ok(())
    }

    fn detach(&self, target: &Path) -> io::Result<bool> {
        match self.top_entry(target)? {
            Some(entry) if entry.is_volatile() => {}
            _ => return Ok(false),
        }
        let detached = sys::detach(target)?;
        if detached {
            debug!(target = %target.display(), "tmpfs detached");
        }
        Ok(detached)
    }

    fn is_volatile(&self, target: &Path) -> io::Result<bool> {
        Ok(self.top_entry(target)?.map_or(false, |e| e.is_volatile()))
    }
}

fn c_path(path: &Path) -> io::Result<CString> {
    use std::os::unix::ffi::OsStrExt;
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL byte"))
}

#[cfg(target_os = "linux")]
mod sys {
    use super::*;

    pub fn mount_tmpfs(target: &Path, options: &str) -> io::Result<()> {
        let source = CString::new("tmpfs")?;
        let fstype = CString::new("tmpfs")?;
        let target = c_path(target)?;
        let data = CString::new(options)?;
        let flags = libc::MS_NOSUID | libc::MS_NODEV | libc::MS_NOEXEC;

        // SAFETY: all pointers come from live CStrings that outlive the call
        let rc = unsafe {
            libc::mount(
                source.as_ptr(),
                target.as_ptr(),
                fstype.as_ptr(),
                flags,
                data.as_ptr() as *const libc::c_void,
            )
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Lazy unmount. `Ok(false)` when `target` is not a mount point.
    pub fn detach(target: &Path) -> io::Result<bool> {
        let target = c_path(target)?;
        // SAFETY: target is a valid NUL-terminated string
        let rc = unsafe { libc::umount2(target.as_ptr(), libc::MNT_DETACH) };
        if rc == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINVAL) {
            return Ok(false);
        }
        Err(err)
    }
}

#[cfg(not(target_os = "linux"))]
mod sys {
    use super::*;

    fn unsupported() -> io::Error {
        io::Error::new(io::ErrorKind::Unsupported, "tmpfs mounts require Linux")
    }

    pub fn mount_tmpfs(target: &Path, _options: &str) -> io::Result<()> {
        c_path(target)?;
        Err(unsupported())
    }

    pub fn detach(target: &Path) -> io::Result<bool> {
        c_path(target)?;
        Err(unsupported())
    }
}
