//! End-to-end scenarios for both controllers.
//!
//! The lifecycle runs against `LayeredMounter`, which models mount stacking
//! on plain directories: mounting hides the current contents in a stash,
//! detaching discards the volatile contents and brings the stash back. The
//! bottom of each stack is the "persistent" layer.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tempfile::TempDir;

use bluecode_core::{
    ButtonAction, ButtonEvent, Config, ConfigStore, Control, HotplugToggle, InterfaceMode,
    InterfaceRecord, LifecycleController, MemoryConfigStore, Notifier, ServiceLifecycleState,
    ToggleOutcome, VolatileMounter,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct LayeredMounter {
    stash_root: TempDir,
    stacks: Mutex<HashMap<PathBuf, Vec<PathBuf>>>,
    next: AtomicUsize,
}

impl LayeredMounter {
    fn new() -> Self {
        Self {
            stash_root: TempDir::new().unwrap(),
            stacks: Mutex::new(HashMap::new()),
            next: AtomicUsize::new(0),
        }
    }

    fn depth(&self, target: &Path) -> usize {
        self.stacks.lock().get(target).map_or(0, Vec::len)
    }

    /// File names present in the bottom (non-volatile) layer of `target`.
    fn persistent_names(&self, target: &Path) -> Vec<String> {
        let bottom = self
            .stacks
            .lock()
            .get(target)
            .and_then(|s| s.first().cloned())
            .unwrap_or_else(|| target.to_path_buf());
        if !bottom.is_dir() {
            return Vec::new();
        }
        let mut names: Vec<String> = fs::read_dir(bottom)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

fn move_contents(from: &Path, to: &Path) -> io::Result<()> {
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        fs::rename(entry.path(), to.join(entry.file_name()))?;
    }
    Ok(())
}

fn clear_contents(dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            fs::remove_dir_all(path)?;
        } else {
            fs::remove_file(path)?;
        }
    }
    Ok(())
}

impl VolatileMounter for LayeredMounter {
    fn mount_volatile(&self, target: &Path) -> io::Result<()> {
        if !target.is_dir() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "mount point missing"));
        }
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        let stash = self.stash_root.path().join(format!("layer-{}", n));
        fs::create_dir(&stash)?;
        move_contents(target, &stash)?;
        self.stacks.lock().entry(target.to_path_buf()).or_default().push(stash);
        Ok(())
    }

    fn detach(&self, target: &Path) -> io::Result<bool> {
        let stash = match self.stacks.lock().get_mut(target).and_then(Vec::pop) {
            Some(stash) => stash,
            None => return Ok(false),
        };
        clear_contents(target)?;
        move_contents(&stash, target)?;
        fs::remove_dir(&stash)?;
        Ok(true)
    }

    fn is_volatile(&self, target: &Path) -> io::Result<bool> {
        Ok(self.depth(target) > 0)
    }
}

struct Fixture {
    _root: TempDir,
    config: Config,
}

fn fixture() -> Fixture {
    let root = TempDir::new().unwrap();
    let staging = root.path().join("tmp");
    fs::create_dir_all(&staging).unwrap();

    let mut config = Config::glinet();
    config.db_dir = root.path().join("etc/oui-tertf");
    config.staging_root = staging;
    config.require_root = false;
    config.randomize_on_start = false;
    config.validate().unwrap();
    Fixture { _root: root, config }
}

fn seed_database(config: &Config, content: &[u8]) {
    fs::create_dir_all(&config.db_dir).unwrap();
    fs::write(config.db_path(), content).unwrap();
}

#[derive(Default)]
struct Notices(Mutex<Vec<String>>);

impl Notifier for Notices {
    fn notify(&self, message: &str) {
        self.0.lock().push(message.to_string());
    }
}

fn router_store(index3_disabled: bool) -> MemoryConfigStore {
    MemoryConfigStore::new(vec![
        InterfaceRecord::new(InterfaceMode::Ap, false),
        InterfaceRecord::new(InterfaceMode::Ap, false),
        InterfaceRecord::new(InterfaceMode::Sta, false),
        InterfaceRecord::new(InterfaceMode::Other("mesh".into()), index3_disabled),
    ])
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn test_start_moves_database_into_ram() {
    let fx = fixture();
    seed_database(&fx.config, b"CLIENTDATA");

    let ctl = LifecycleController::new(&fx.config, LayeredMounter::new());
    ctl.start().unwrap();

    assert_eq!(fs::read(fx.config.db_path()).unwrap(), b"CLIENTDATA");
    assert_eq!(ctl.state().unwrap(), ServiceLifecycleState::Running);
    assert!(ctl.mounter().persistent_names(&fx.config.db_dir).is_empty());
    assert_eq!(fs::read_dir(&fx.config.staging_root).unwrap().count(), 0);
}

#[test]
fn test_start_then_stop_leaves_nothing() {
    let fx = fixture();
    seed_database(&fx.config, b"CLIENTDATA");

    let ctl = LifecycleController::new(&fx.config, LayeredMounter::new());
    ctl.start().unwrap();
    ctl.stop().unwrap();

    assert!(!fx.config.db_path().exists());
    assert_eq!(ctl.state().unwrap(), ServiceLifecycleState::Stopped);
    assert!(ctl.mounter().persistent_names(&fx.config.db_dir).is_empty());
}

#[test]
fn test_double_start_matches_single_start() {
    let fx = fixture();
    seed_database(&fx.config, b"CLIENTDATA");

    let ctl = LifecycleController::new(&fx.config, LayeredMounter::new());
    ctl.start().unwrap();
    ctl.start().unwrap();

    assert_eq!(fs::read(fx.config.db_path()).unwrap(), b"CLIENTDATA");
    assert_eq!(ctl.mounter().depth(&fx.config.db_dir), 1);
    assert!(ctl.mounter().persistent_names(&fx.config.db_dir).is_empty());
}

#[test]
fn test_writes_while_running_survive_restart_only_in_ram() {
    let fx = fixture();
    seed_database(&fx.config, b"v1");

    let ctl = LifecycleController::new(&fx.config, LayeredMounter::new());
    ctl.start().unwrap();
    fs::write(fx.config.db_path(), b"v2 written while running").unwrap();
    ctl.start().unwrap();

    assert_eq!(fs::read(fx.config.db_path()).unwrap(), b"v2 written while running");
    assert!(ctl.mounter().persistent_names(&fx.config.db_dir).is_empty());
}

#[test]
fn test_stale_persistent_copy_is_erased() {
    let fx = fixture();
    seed_database(&fx.config, b"STALE");

    // A crashed earlier run left a tmpfs over the stale flash copy.
    let mounter = LayeredMounter::new();
    mounter.mount_volatile(&fx.config.db_dir).unwrap();
    fs::write(fx.config.db_path(), b"CURRENT").unwrap();

    let ctl = LifecycleController::new(&fx.config, mounter);
    ctl.start().unwrap();

    assert_eq!(fs::read(fx.config.db_path()).unwrap(), b"CURRENT");
    assert_eq!(ctl.mounter().depth(&fx.config.db_dir), 1);
    assert!(ctl.mounter().persistent_names(&fx.config.db_dir).is_empty());
}

#[test]
fn test_stacked_layers_from_interrupted_starts() {
    let fx = fixture();
    fs::create_dir_all(&fx.config.db_dir).unwrap();

    let mounter = LayeredMounter::new();
    mounter.mount_volatile(&fx.config.db_dir).unwrap();
    mounter.mount_volatile(&fx.config.db_dir).unwrap();
    fs::write(fx.config.db_path(), b"TOP").unwrap();

    let ctl = LifecycleController::new(&fx.config, mounter);
    ctl.start().unwrap();

    assert_eq!(ctl.mounter().depth(&fx.config.db_dir), 1);
    assert_eq!(fs::read(fx.config.db_path()).unwrap(), b"TOP");
}

#[test]
fn test_stop_without_start() {
    let fx = fixture();
    let ctl = LifecycleController::new(&fx.config, LayeredMounter::new());
    ctl.stop().unwrap();
    assert!(!fx.config.db_path().exists());

    // A database sitting on flash while stopped is destroyed too.
    seed_database(&fx.config, b"CLIENTDATA");
    ctl.stop().unwrap();
    assert!(!fx.config.db_path().exists());
    assert!(fx.config.db_dir.is_dir());
}

#[test]
fn test_other_files_in_directory_are_untouched_by_stop() {
    let fx = fixture();
    seed_database(&fx.config, b"CLIENTDATA");
    fs::write(fx.config.db_dir.join("README"), b"keep").unwrap();

    let ctl = LifecycleController::new(&fx.config, LayeredMounter::new());
    ctl.stop().unwrap();

    assert!(!fx.config.db_path().exists());
    assert_eq!(fs::read(fx.config.db_dir.join("README")).unwrap(), b"keep");
}

// ---------------------------------------------------------------------------
// Hotplug toggle
// ---------------------------------------------------------------------------

#[test]
fn test_press_enables_ap_and_keeps_station() {
    let toggle = HotplugToggle::new(router_store(true), Notices::default());
    toggle.store().set_disabled(0, true).unwrap();
    toggle.store().set_disabled(1, true).unwrap();
    toggle.store().commit().unwrap();

    let outcome = toggle
        .handle_event(&ButtonEvent::new(Control::Primary, ButtonAction::Pressed))
        .unwrap();
    assert_eq!(outcome, ToggleOutcome::ApEnabled);

    let live = toggle.store().live();
    assert!(!live[0].disabled);
    assert!(!live[1].disabled);
    assert!(!live[2].disabled);
    assert!(live[3].disabled, "index 3 unchanged");
    assert_eq!(*toggle.notifier().0.lock(), vec!["access point enabled".to_string()]);
}

#[test]
fn test_release_disables_ap_and_keeps_station() {
    let toggle = HotplugToggle::new(router_store(false), Notices::default());

    let outcome = toggle
        .handle_event(&ButtonEvent::new(Control::Primary, ButtonAction::Released))
        .unwrap();
    assert_eq!(outcome, ToggleOutcome::ApDisabled);

    let live = toggle.store().live();
    assert!(live[0].disabled);
    assert!(live[1].disabled);
    assert!(!live[2].disabled);
    assert!(!live[3].disabled, "index 3 unchanged");
    assert_eq!(toggle.store().commit_count(), 1);
    assert_eq!(toggle.store().reload_count(), 1);
    assert_eq!(*toggle.notifier().0.lock(), vec!["access point disabled".to_string()]);
}

#[test]
fn test_unknown_control_touches_nothing() {
    let toggle = HotplugToggle::new(router_store(false), Notices::default());

    let event = ButtonEvent::parse("other", "released").unwrap();
    let outcome = toggle.handle_event(&event).unwrap();

    assert_eq!(outcome, ToggleOutcome::Ignored);
    assert_eq!(toggle.store().write_count(), 0);
    assert_eq!(toggle.store().commit_count(), 0);
    assert_eq!(toggle.store().reload_count(), 0);
    assert!(toggle.notifier().0.lock().is_empty());
}

#[test]
fn test_duplicate_delivery_is_harmless() {
    let toggle = HotplugToggle::new(router_store(false), Notices::default());
    let event = ButtonEvent::new(Control::Reset, ButtonAction::Released);

    toggle.handle_event(&event).unwrap();
    let once = toggle.store().live();
    toggle.handle_event(&event).unwrap();

    assert_eq!(toggle.store().live(), once);
}
