//! Button events through the UCI store and status channel, with `uci` and
//! `wifi` replaced by a scripted runner.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use bluecode_core::{ButtonEvent, ConfigStore, HotplugToggle, ToggleError, ToggleOutcome};
use bluecode_openwrt::{CommandOutput, CommandRunner, StatusMessage, StatusNotifier, UciStore};
use tempfile::TempDir;

/// `uci` with separate staged and committed views.
struct ScriptedUci {
    committed: Mutex<BTreeMap<String, String>>,
    staged: Mutex<BTreeMap<String, String>>,
    log: Mutex<Vec<String>>,
    commit_fails: bool,
    rejected_set: Option<String>,
}

impl ScriptedUci {
    fn router(modes: &[&str], commit_fails: bool) -> Self {
        let mut values = BTreeMap::new();
        for (i, mode) in modes.iter().enumerate() {
            let section = format!("wireless.@wifi-iface[{}]", i);
            values.insert(format!("{}.mode", section), mode.to_string());
            values.insert(section, "wifi-iface".to_string());
        }
        Self {
            committed: Mutex::new(values.clone()),
            staged: Mutex::new(values),
            log: Mutex::new(Vec::new()),
            commit_fails,
            rejected_set: None,
        }
    }

    /// Set an option on disk, as an administrator editing the file would.
    fn with_option(mut self, index: usize, option: &str, value: &str) -> Self {
        let key = format!("wireless.@wifi-iface[{}].{}", index, option);
        self.committed.get_mut().unwrap().insert(key.clone(), value.to_string());
        self.staged.get_mut().unwrap().insert(key, value.to_string());
        self
    }

    /// Make `uci set` fail for the section at `index`.
    fn rejecting_set(mut self, index: usize) -> Self {
        self.rejected_set = Some(format!("wireless.@wifi-iface[{}].", index));
        self
    }

    fn staged_disabled(&self, index: usize) -> Option<String> {
        self.staged
            .lock()
            .unwrap()
            .get(&format!("wireless.@wifi-iface[{}].disabled", index))
            .cloned()
    }

    fn committed_disabled(&self, index: usize) -> Option<String> {
        self.committed
            .lock()
            .unwrap()
            .get(&format!("wireless.@wifi-iface[{}].disabled", index))
            .cloned()
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl CommandRunner for ScriptedUci {
    fn run(&self, program: &Path, args: &[&str]) -> io::Result<CommandOutput> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{} {}", program.display(), args.join(" ")));

        let out = match args {
            ["-q", "get", key] => match self.staged.lock().unwrap().get(*key) {
                Some(v) => CommandOutput::ok(&format!("{}\n", v)),
                None => CommandOutput::failed(1, ""),
            },
            ["set", assignment]
                if self
                    .rejected_set
                    .as_deref()
                    .map_or(false, |prefix| assignment.starts_with(prefix)) =>
            {
                CommandOutput::failed(1, "Invalid argument")
            }
            ["set", assignment] => {
                let (k, v) = assignment.split_once('=').unwrap();
                self.staged.lock().unwrap().insert(k.to_string(), v.to_string());
                CommandOutput::ok("")
            }
            ["commit", _] if self.commit_fails => CommandOutput::failed(1, "read-only filesystem"),
            ["commit", _] => {
                *self.committed.lock().unwrap() = self.staged.lock().unwrap().clone();
                CommandOutput::ok("")
            }
            ["revert", _] => {
                *self.staged.lock().unwrap() = self.committed.lock().unwrap().clone();
                CommandOutput::ok("")
            }
            _ => CommandOutput::ok(""),
        };
        Ok(out)
    }
}

fn notices(channel: &Path) -> Vec<String> {
    fs::read_to_string(channel)
        .unwrap_or_default()
        .lines()
        .map(|l| serde_json::from_str::<StatusMessage>(l).unwrap().msg)
        .collect()
}

#[test]
fn test_release_then_press() {
    let dir = TempDir::new().unwrap();
    let channel = dir.path().join("status");
    let uci = ScriptedUci::router(&["ap", "ap", "sta"], false);
    let toggle = HotplugToggle::new(UciStore::with_runner(&uci), StatusNotifier::new(&channel, "hotplug"));

    let released = ButtonEvent::parse("primary", "released").unwrap();
    assert_eq!(toggle.handle_event(&released).unwrap(), ToggleOutcome::ApDisabled);
    assert_eq!(uci.committed_disabled(0).as_deref(), Some("1"));
    assert_eq!(uci.committed_disabled(1).as_deref(), Some("1"));
    assert_eq!(uci.committed_disabled(2).as_deref(), Some("0"));

    let pressed = ButtonEvent::parse("reset", "pressed").unwrap();
    assert_eq!(toggle.handle_event(&pressed).unwrap(), ToggleOutcome::ApEnabled);
    assert_eq!(uci.committed_disabled(0).as_deref(), Some("0"));
    assert_eq!(uci.committed_disabled(2).as_deref(), Some("0"));

    assert_eq!(notices(&channel), vec!["access point disabled", "access point enabled"]);
    assert_eq!(uci.log().iter().filter(|l| *l == "wifi reload").count(), 2);
}

#[test]
fn test_single_radio_router() {
    let dir = TempDir::new().unwrap();
    let channel = dir.path().join("status");
    let uci = ScriptedUci::router(&["ap"], false);
    let toggle = HotplugToggle::new(UciStore::with_runner(&uci), StatusNotifier::new(&channel, "hotplug"));

    let released = ButtonEvent::parse("primary", "released").unwrap();
    assert_eq!(toggle.handle_event(&released).unwrap(), ToggleOutcome::ApDisabled);
    assert_eq!(uci.committed_disabled(0).as_deref(), Some("1"));
    assert_eq!(uci.committed_disabled(1), None);
    assert!(!uci.log().iter().any(|l| l.starts_with("uci set wireless.@wifi-iface[1]")));
}

#[test]
fn test_failed_commit_reverts_and_notifies() {
    let dir = TempDir::new().unwrap();
    let channel = dir.path().join("status");
    let uci = ScriptedUci::router(&["ap", "ap", "sta"], true);
    let toggle = HotplugToggle::new(UciStore::with_runner(&uci), StatusNotifier::new(&channel, "hotplug"));

    let released = ButtonEvent::parse("primary", "released").unwrap();
    let err = toggle.handle_event(&released).unwrap_err();
    assert!(matches!(err, ToggleError::Commit(_)));

    // staged writes rolled back, radios never reloaded
    assert!(!toggle.store().get(0).unwrap().unwrap().disabled);
    assert!(uci.log().contains(&"uci revert wireless".to_string()));
    assert!(!uci.log().contains(&"wifi reload".to_string()));

    let messages = notices(&channel);
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("wifi toggle failed"));
}

#[test]
fn test_other_button_ignored() {
    let dir = TempDir::new().unwrap();
    let channel = dir.path().join("status");
    let uci = ScriptedUci::router(&["ap", "ap", "sta"], false);
    let toggle = HotplugToggle::new(UciStore::with_runner(&uci), StatusNotifier::new(&channel, "hotplug"));

    let event = ButtonEvent::parse("wps", "released").unwrap();
    assert_eq!(toggle.handle_event(&event).unwrap(), ToggleOutcome::Ignored);
    assert!(uci.log().is_empty());
    assert!(notices(&channel).is_empty());
}

#[test]
fn test_station_written_as_true_is_reenabled() {
    let dir = TempDir::new().unwrap();
    let channel = dir.path().join("status");
    let uci = ScriptedUci::router(&["ap", "ap", "sta"], false).with_option(2, "disabled", "true");
    let toggle = HotplugToggle::new(UciStore::with_runner(&uci), StatusNotifier::new(&channel, "hotplug"));

    let released = ButtonEvent::parse("primary", "released").unwrap();
    assert_eq!(toggle.handle_event(&released).unwrap(), ToggleOutcome::ApDisabled);
    assert_eq!(uci.committed_disabled(0).as_deref(), Some("1"));
    assert_eq!(uci.committed_disabled(2).as_deref(), Some("0"));
    assert_eq!(notices(&channel), vec!["access point disabled"]);
}

#[test]
fn test_failed_staging_leaves_no_pending_writes() {
    let dir = TempDir::new().unwrap();
    let channel = dir.path().join("status");
    let uci = ScriptedUci::router(&["ap", "ap", "sta"], false).rejecting_set(1);
    let toggle = HotplugToggle::new(UciStore::with_runner(&uci), StatusNotifier::new(&channel, "hotplug"));

    let released = ButtonEvent::parse("primary", "released").unwrap();
    let err = toggle.handle_event(&released).unwrap_err();
    assert!(matches!(err, ToggleError::Store(_)));

    // index 0 was staged before index 1 failed; a later commit must not apply it
    assert_eq!(uci.staged_disabled(0), None);
    let log = uci.log();
    assert!(log.contains(&"uci set wireless.@wifi-iface[0].disabled=1".to_string()));
    assert!(log.contains(&"uci revert wireless".to_string()));
    assert!(!log.contains(&"uci commit wireless".to_string()));
    assert_eq!(notices(&channel).len(), 1);
}
