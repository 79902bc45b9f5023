//! Status channel for toggle notices.
//!
//! Each notice is appended as one JSON line to the status file (read by the
//! LED/UI helpers) and mirrored to syslog at `LOG_NOTICE`.

use std::ffi::CString;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bluecode_core::Notifier;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One line on the status channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub source: String,
    pub msg: String,
}

pub struct StatusNotifier {
    channel: PathBuf,
    source: String,
    syslog: Option<Syslog>,
}

impl StatusNotifier {
    /// File-only notifier.
    pub fn new(channel: impl Into<PathBuf>, source: &str) -> Self {
        Self {
            channel: channel.into(),
            source: source.to_string(),
            syslog: None,
        }
    }

    /// Also mirror notices to syslog under `tag`.
    pub fn with_syslog(mut self, tag: &str) -> Self {
        match Syslog::open(tag) {
            Ok(syslog) => self.syslog = Some(syslog),
            Err(e) => warn!(tag, error = %e, "syslog unavailable"),
        }
        self
    }

    pub fn channel(&self) -> &Path {
        &self.channel
    }

    fn append(&self, message: &StatusMessage) -> io::Result<()> {
        if let Some(parent) = self.channel.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');
        let mut file = OpenOptions::new().create(true).append(true).open(&self.channel)?;
        file.write_all(&line)
    }
}

impl Notifier for StatusNotifier {
    fn notify(&self, message: &str) {
        let status = StatusMessage {
            source: self.source.clone(),
            msg: message.to_string(),
        };
        if let Err(e) = self.append(&status) {
            warn!(channel = %self.channel.display(), error = %e, "status channel write failed");
        }
        if let Some(syslog) = &self.syslog {
            syslog.notice(message);
        }
    }
}

/// Process-wide syslog handle; closed on drop.
struct Syslog {
    // openlog(3) keeps the pointer, so the string must outlive the handle
    _ident: CString,
}

impl Syslog {
    fn open(tag: &str) -> io::Result<Self> {
        let ident = CString::new(tag)?;
        // SAFETY: ident is stored in the returned value and lives until closelog
        unsafe { libc::openlog(ident.as_ptr(), libc::LOG_PID, libc::LOG_USER) };
        Ok(Self { _ident: ident })
    }

    fn notice(&self, message: &str) {
        let Ok(message) = CString::new(message.replace('\0', " ")) else {
            return;
        };
        // SAFETY: constant format string with one %s argument backed by a live CString
        unsafe { libc::syslog(libc::LOG_NOTICE, b"%s\0".as_ptr() as *const libc::c_char, message.as_ptr()) };
    }
}

impl Drop for Syslog {
    fn drop(&mut self) {
        // SAFETY: closelog has no preconditions
        unsafe { libc::closelog() };
    }
}
