//! UCI-backed wireless configuration store.
//!
//! Records are the anonymous `wifi-iface` sections of `/etc/config/wireless`,
//! addressed as `wireless.@wifi-iface[i]`. Writes are staged in the UCI delta
//! directory until `commit`; `reload` runs `wifi reload`.

use std::path::{Path, PathBuf};

use bluecode_core::{ConfigStore, InterfaceMode, InterfaceRecord, StoreError, StoreResult};
use tracing::{debug, warn};

use crate::runner::{CommandOutput, CommandRunner, SystemRunner};

const PACKAGE: &str = "wireless";
const SECTION_TYPE: &str = "wifi-iface";

/// Probe limit when counting sections.
const MAX_SECTIONS: usize = 64;

pub struct UciStore<R = SystemRunner> {
    runner: R,
    uci: PathBuf,
    wifi: PathBuf,
}

impl UciStore<SystemRunner> {
    pub fn new() -> Self {
        Self::with_runner(SystemRunner)
    }
}

impl Default for UciStore<SystemRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: CommandRunner> UciStore<R> {
    pub fn with_runner(runner: R) -> Self {
        Self {
            runner,
            uci: PathBuf::from("uci"),
            wifi: PathBuf::from("wifi"),
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    fn section(index: usize) -> String {
        format!("{}.@{}[{}]", PACKAGE, SECTION_TYPE, index)
    }

    fn exec(&self, program: &Path, args: &[&str]) -> StoreResult<CommandOutput> {
        self.runner.run(program, args).map_err(StoreError::Io)
    }

    /// `uci -q get`; `None` when the key does not exist.
    fn get_option(&self, key: &str) -> StoreResult<Option<String>> {
        let out = self.exec(&self.uci, &["-q", "get", key])?;
        if !out.success {
            return Ok(None);
        }
        Ok(Some(out.stdout.trim().to_string()))
    }

    fn exists(&self, index: usize) -> StoreResult<bool> {
        Ok(self.get_option(&Self::section(index))?.is_some())
    }

    fn mode_of(&self, index: usize) -> StoreResult<InterfaceMode> {
        // wifi-iface sections without a mode default to ap
        Ok(self
            .get_option(&format!("{}.mode", Self::section(index)))?
            .map_or(InterfaceMode::Ap, |m| InterfaceMode::parse(&m)))
    }

    fn expect_success(out: CommandOutput, what: &str) -> StoreResult<()> {
        if out.success {
            return Ok(());
        }
        Err(StoreError::Backend(format!("{} failed ({}): {}", what, out.status, out.stderr)))
    }
}

impl<R: CommandRunner> ConfigStore for UciStore<R> {
    fn len(&self) -> StoreResult<usize> {
        let mut n = 0;
        while n < MAX_SECTIONS && self.exists(n)? {
            n += 1;
        }
        if n == MAX_SECTIONS && self.exists(n)? {
            warn!(limit = MAX_SECTIONS, "wifi-iface section limit reached, ignoring the rest");
        }
        Ok(n)
    }

    fn get(&self, index: usize) -> StoreResult<Option<InterfaceRecord>> {
        if !self.exists(index)? {
            return Ok(None);
        }
        let mode = self.mode_of(index)?;
        let disabled = match self.get_option(&format!("{}.disabled", Self::section(index)))? {
            None => false,
            Some(raw) => parse_bool(&raw).ok_or_else(|| StoreError::Malformed {
                index,
                reason: format!("disabled='{}'", raw),
            })?,
        };
        Ok(Some(InterfaceRecord::new(mode, disabled)))
    }

    fn mode(&self, index: usize) -> StoreResult<Option<InterfaceMode>> {
        if !self.exists(index)? {
            return Ok(None);
        }
        Ok(Some(self.mode_of(index)?))
    }

    fn set_disabled(&self, index: usize, disabled: bool) -> StoreResult<bool> {
        if !self.exists(index)? {
            return Ok(false);
        }
        let assignment = format!("{}.disabled={}", Self::section(index), u8::from(disabled));
        let out = self.exec(&self.uci, &["set", &assignment])?;
        Self::expect_success(out, "uci set")?;
        debug!(%assignment, "uci staged");
        Ok(true)
    }

    fn commit(&self) -> StoreResult<()> {
        let out = self.exec(&self.uci, &["commit", PACKAGE])?;
        if out.success {
            return Ok(());
        }
        if let Err(e) = self.revert() {
            warn!(error = %e, "uci revert failed");
        }
        Self::expect_success(out, "uci commit")
    }

    fn revert(&self) -> StoreResult<()> {
        let out = self.exec(&self.uci, &["revert", PACKAGE])?;
        Self::expect_success(out, "uci revert")
    }

    fn reload(&self) -> StoreResult<()> {
        let out = self.exec(&self.wifi, &["reload"])?;
        Self::expect_success(out, "wifi reload")
    }
}

/// UCI boolean spellings, as accepted by `uci_parse_bool` in libuci.
fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "" | "0" | "false" | "no" | "off" | "disabled" => Some(false),
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        _ => None,
    }
}
