//! Wireless interface record store.
//!
//! The persistent wireless configuration is an ordered list of interface
//! records. The toggle controller only reads `mode` and writes `disabled`;
//! everything else belongs to the administrator and the randomization engine.
//!
//! Writes are staged and only take effect on `commit()`. `reload()` then
//! pushes the committed configuration to the radios.

use std::fmt;

use parking_lot::Mutex;

use crate::error::{StoreError, StoreResult};

/// Operating mode of a wireless interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterfaceMode {
    /// Local access point
    Ap,
    /// Station: client of an upstream network
    Sta,
    /// Anything else (mesh, monitor, wds, ...), kept verbatim
    Other(String),
}

impl InterfaceMode {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "ap" => InterfaceMode::Ap,
            "sta" => InterfaceMode::Sta,
            other => InterfaceMode::Other(other.to_string()),
        }
    }
}

impl fmt::Display for InterfaceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterfaceMode::Ap => f.write_str("ap"),
            InterfaceMode::Sta => f.write_str("sta"),
            InterfaceMode::Other(s) => f.write_str(s),
        }
    }
}

/// One wireless interface as seen by the toggle controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceRecord {
    pub mode: InterfaceMode,
    pub disabled: bool,
}

impl InterfaceRecord {
    pub fn new(mode: InterfaceMode, disabled: bool) -> Self {
        Self { mode, disabled }
    }
}

/// Index-addressable wireless configuration with staged writes.
///
/// All methods take `&self`: implementations wrap an external, shared
/// resource and commit is last-writer-wins.
pub trait ConfigStore {
    /// Number of interface records.
    fn len(&self) -> StoreResult<usize>;

    /// Record at `index`, `None` if it does not exist.
    fn get(&self, index: usize) -> StoreResult<Option<InterfaceRecord>>;

    /// Mode of the record at `index`, without interpreting anything else.
    fn mode(&self, index: usize) -> StoreResult<Option<InterfaceMode>> {
        Ok(self.get(index)?.map(|record| record.mode))
    }

    /// Stage `disabled` for `index`. Returns `false` when no record exists.
    fn set_disabled(&self, index: usize, disabled: bool) -> StoreResult<bool>;

    /// Atomically apply all staged writes. On error nothing is applied.
    fn commit(&self) -> StoreResult<()>;

    /// Discard every staged write.
    fn revert(&self) -> StoreResult<()>;

    /// Activate the committed configuration on the radios.
    fn reload(&self) -> StoreResult<()>;
}

impl<S: ConfigStore + ?Sized> ConfigStore for &S {
    fn len(&self) -> StoreResult<usize> { (**self).len() }
    fn get(&self, index: usize) -> StoreResult<Option<InterfaceRecord>> { (**self).get(index) }
    fn mode(&self, index: usize) -> StoreResult<Option<InterfaceMode>> { (**self).mode(index) }
    fn set_disabled(&self, index: usize, disabled: bool) -> StoreResult<bool> {
        (**self).set_disabled(index, disabled)
    }
    fn commit(&self) -> StoreResult<()> { (**self).commit() }
    fn revert(&self) -> StoreResult<()> { (**self).revert() }
    fn reload(&self) -> StoreResult<()> { (**self).reload() }
}

#[derive(Debug, Default)]
struct MemoryState {
    committed: Vec<InterfaceRecord>,
    staged: Vec<InterfaceRecord>,
    live: Vec<InterfaceRecord>,
    commits: usize,
    reloads: usize,
    writes: usize,
    reverts: usize,
    fail_commit: bool,
    fail_write_at: Option<usize>,
}

/// In-memory [`ConfigStore`] with call accounting.
///
/// Reads see staged values, like `uci get` after `uci set`. A failing commit
/// discards the staged writes, like `uci revert`.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    state: Mutex<MemoryState>,
}

impl MemoryConfigStore {
    pub fn new(records: Vec<InterfaceRecord>) -> Self {
        let state = MemoryState {
            committed: records.clone(),
            staged: records.clone(),
            live: records,
            ..MemoryState::default()
        };
        Self { state: Mutex::new(state) }
    }

    /// All interfaces enabled, one per mode.
    pub fn with_modes(modes: &[InterfaceMode]) -> Self {
        Self::new(modes.iter().cloned().map(|m| InterfaceRecord::new(m, false)).collect())
    }

    /// Make the next commits fail (or succeed again).
    pub fn set_fail_commit(&self, fail: bool) {
        self.state.lock().fail_commit = fail;
    }

    /// Make `set_disabled` fail once `writes` writes have been staged.
    pub fn set_fail_write_at(&self, writes: Option<usize>) {
        self.state.lock().fail_write_at = writes;
    }

    pub fn committed(&self) -> Vec<InterfaceRecord> {
        self.state.lock().committed.clone()
    }

    /// Configuration the radios are currently running.
    pub fn live(&self) -> Vec<InterfaceRecord> {
        self.state.lock().live.clone()
    }

    pub fn commit_count(&self) -> usize {
        self.state.lock().commits
    }

    pub fn reload_count(&self) -> usize {
        self.state.lock().reloads
    }

    /// Number of `set_disabled` calls that hit a record.
    pub fn write_count(&self) -> usize {
        self.state.lock().writes
    }

    pub fn revert_count(&self) -> usize {
        self.state.lock().reverts
    }
}

impl ConfigStore for MemoryConfigStore {
    fn len(&self) -> StoreResult<usize> {
        Ok(self.state.lock().staged.len())
    }

    fn get(&self, index: usize) -> StoreResult<Option<InterfaceRecord>> {
        Ok(self.state.lock().staged.get(index).cloned())
    }

    fn set_disabled(&self, index: usize, disabled: bool) -> StoreResult<bool> {
        let mut state = self.state.lock();
        if state.fail_write_at == Some(state.writes) {
            return Err(StoreError::Backend("write rejected".into()));
        }
        match state.staged.get_mut(index) {
            Some(record) => {
                record.disabled = disabled;
                state.writes += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn commit(&self) -> StoreResult<()> {
        let mut state = self.state.lock();
        state.commits += 1;
        if state.fail_commit {
            state.staged = state.committed.clone();
            return Err(StoreError::Backend("commit rejected".into()));
        }
        state.committed = state.staged.clone();
        Ok(())
    }

    fn revert(&self) -> StoreResult<()> {
        let mut state = self.state.lock();
        state.reverts += 1;
        state.staged = state.committed.clone();
        Ok(())
    }

    fn reload(&self) -> StoreResult<()> {
        let mut state = self.state.lock();
        state.reloads += 1;
        state.live = state.committed.clone();
        Ok(())
    }
}
