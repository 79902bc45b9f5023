//! Platform-specific durable sync
//!
//! An overwrite pass only counts if it reached the storage medium. A pass
//! that sits in the page cache when the file is unlinked can be dropped by
//! the kernel without ever touching the old blocks.

use std::fs::File;
use std::io;

/// Ensures data is durably written to the backing medium before returning.
///
/// Platform behaviors:
/// - Linux: fdatasync() - syncs data but not metadata
/// - macOS: fcntl(F_FULLFSYNC) - bypasses the disk cache
/// - Other: file.sync_data() - Rust stdlib fallback
///
/// # Safety
/// This function makes system calls that may block for extended periods on
/// slow flash. The caller must not hold locks across it.
pub fn durable_sync(file: &File) -> io::Result<()> {
    #[cfg(target_os = "linux")]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: fdatasync is a POSIX system call that operates on a valid file descriptor.
        // We obtain the fd from a valid File reference, so it is guaranteed to be open.
        let result = unsafe { libc::fdatasync(fd) };
        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(target_os = "macos")]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: fcntl with F_FULLFSYNC operates on a valid fd obtained from a live File.
        let result = unsafe { libc::fcntl(fd, libc::F_FULLFSYNC) };
        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        file.sync_data()
    }
}
