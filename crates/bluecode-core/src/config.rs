//! Configuration management for bluecode
//!
//! Provides a device preset, an environment overlay and validation.
//! One `Config` drives both controllers so the paths used at start and stop
//! can never drift apart.

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::randomize::{parse_targets, RandomizeTarget, BOOT_TARGETS};

/// Minimum overwrite passes: one pattern pass and one zero pass.
pub const MIN_ERASE_PASSES: u32 = 2;

/// bluecode configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory holding the client database; becomes the tmpfs mount point
    pub db_dir: PathBuf,
    /// Database file name inside `db_dir`
    pub db_file: String,
    /// Where transient staging directories are created during `start()`
    pub staging_root: PathBuf,
    /// Invoke the randomization engine once `start()` has mounted
    pub randomize_on_start: bool,
    /// Targets for the boot-time randomization
    pub boot_targets: BTreeSet<RandomizeTarget>,
    /// Overwrite passes before unlink (last pass is always zeros)
    pub erase_passes: u32,
    /// Refuse to mutate anything unless running as root
    pub require_root: bool,
    /// Operator status channel that receives `{"msg": ...}` objects
    pub status_channel: PathBuf,
    /// Tag for syslog notices
    pub syslog_tag: String,
    /// Randomization engine executable
    pub engine_program: PathBuf,
}

impl Config {
    /// GL.iNet router layout: client database under `/etc/oui-tertf`.
    pub fn glinet() -> Self {
        Self {
            db_dir: PathBuf::from("/etc/oui-tertf"),
            db_file: "client.db".to_string(),
            staging_root: PathBuf::from("/tmp"),
            randomize_on_start: true,
            boot_targets: BOOT_TARGETS.into_iter().collect(),
            erase_passes: 3,
            require_root: true,
            status_channel: PathBuf::from("/tmp/bluecode/status"),
            syslog_tag: "bluecode".to_string(),
            engine_program: PathBuf::from("/usr/bin/blue-code"),
        }
    }

    /// Full path of the client database file.
    pub fn db_path(&self) -> PathBuf {
        self.db_dir.join(&self.db_file)
    }

    /// Overlay `BLUECODE_*` environment variables onto this configuration.
    pub fn from_env() -> Result<Self, String> {
        Self::glinet().overlay(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// - `BLUECODE_DB_DIR`, `BLUECODE_DB_FILE`, `BLUECODE_STAGING_ROOT`
    /// - `BLUECODE_RANDOMIZE_ON_START` (bool), `BLUECODE_BOOT_TARGETS` (list)
    /// - `BLUECODE_ERASE_PASSES` (u32), `BLUECODE_REQUIRE_ROOT` (bool)
    /// - `BLUECODE_STATUS_CHANNEL`, `BLUECODE_SYSLOG_TAG`, `BLUECODE_ENGINE`
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("BLUECODE_DB_DIR") {
            self.db_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("BLUECODE_DB_FILE") {
            self.db_file = v;
        }
        if let Some(v) = lookup("BLUECODE_STAGING_ROOT") {
            self.staging_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("BLUECODE_RANDOMIZE_ON_START") {
            self.randomize_on_start = parse_bool("BLUECODE_RANDOMIZE_ON_START", &v)?;
        }
        if let Some(v) = lookup("BLUECODE_BOOT_TARGETS") {
            self.boot_targets = parse_targets(&v)?;
        }
        if let Some(v) = lookup("BLUECODE_ERASE_PASSES") {
            self.erase_passes = v
                .trim()
                .parse()
                .map_err(|e| format!("BLUECODE_ERASE_PASSES: {}", e))?;
        }
        if let Some(v) = lookup("BLUECODE_REQUIRE_ROOT") {
            self.require_root = parse_bool("BLUECODE_REQUIRE_ROOT", &v)?;
        }
        if let Some(v) = lookup("BLUECODE_STATUS_CHANNEL") {
            self.status_channel = PathBuf::from(v);
        }
        if let Some(v) = lookup("BLUECODE_SYSLOG_TAG") {
            self.syslog_tag = v;
        }
        if let Some(v) = lookup("BLUECODE_ENGINE") {
            self.engine_program = PathBuf::from(v);
        }
        Ok(self)
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if !self.db_dir.is_absolute() {
            return Err("db_dir must be an absolute path".into());
        }
        if self.db_dir.parent().is_none() {
            return Err("db_dir must not be the filesystem root".into());
        }
        if self.db_file.is_empty() || self.db_file.contains('/') || self.db_file == ".." {
            return Err("db_file must be a plain file name".into());
        }
        if !self.staging_root.is_absolute() {
            return Err("staging_root must be an absolute path".into());
        }
        if self.staging_root.starts_with(&self.db_dir) {
            return Err("staging_root must not live inside db_dir".into());
        }
        if self.erase_passes < MIN_ERASE_PASSES || self.erase_passes > 35 {
            return Err(format!("erase_passes must be in [{}, 35]", MIN_ERASE_PASSES));
        }
        if let Some(t) = self.boot_targets.iter().find(|t| t.requires_reboot()) {
            return Err(format!(
                "boot_targets must not contain '{}': it reboots the device",
                t
            ));
        }
        if self.randomize_on_start && self.boot_targets.is_empty() {
            return Err("boot_targets must not be empty when randomize_on_start is set".into());
        }
        if self.syslog_tag.is_empty() || self.syslog_tag.contains('\0') {
            return Err("syslog_tag must be a non-empty C string".into());
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self { Self::glinet() }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("{}: expected a boolean, got '{}'", key, other)),
    }
}
