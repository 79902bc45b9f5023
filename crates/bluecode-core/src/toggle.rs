//! Hotplug wireless toggle
//!
//! A physical button switches the local access point radios on or off.
//! Every transition is "set to value", never "flip", so a dispatcher that
//! delivers the same event twice is harmless.
//!
//! Record layout convention:
//! - indices 0 and 1 are the AP interfaces (index 1 may be missing)
//! - indices >= 2 are classified by mode; station uplinks are forced on
//!   in both directions so disabling the AP never drops the upstream link

use std::fmt;
use std::str::FromStr;

use tracing::{debug, error, info, warn};

use crate::error::{ToggleError, ToggleResult};
use crate::privilege::is_root;
use crate::store::{ConfigStore, InterfaceMode};

/// Record indices reserved for the access point.
pub const AP_INDICES: [usize; 2] = [0, 1];

/// First index whose role is decided by its mode.
pub const FIRST_MODE_INDEX: usize = 2;

pub const MSG_AP_ENABLED: &str = "access point enabled";
pub const MSG_AP_DISABLED: &str = "access point disabled";

/// Which physical control fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    Primary,
    Reset,
    /// Any other button; ignored
    Other(String),
}

impl Control {
    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "primary" => Control::Primary,
            "reset" => Control::Reset,
            other => Control::Other(other.to_string()),
        }
    }

    pub fn is_handled(&self) -> bool {
        !matches!(self, Control::Other(_))
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Control::Primary => f.write_str("primary"),
            Control::Reset => f.write_str("reset"),
            Control::Other(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    Pressed,
    Released,
}

impl FromStr for ButtonAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pressed" => Ok(ButtonAction::Pressed),
            "released" => Ok(ButtonAction::Released),
            other => Err(format!("unknown button action '{}'", other)),
        }
    }
}

/// A single button transition delivered by the hotplug dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonEvent {
    pub control: Control,
    pub action: ButtonAction,
}

impl ButtonEvent {
    pub fn new(control: Control, action: ButtonAction) -> Self {
        Self { control, action }
    }

    /// Build from the dispatcher's raw `BUTTON` / `ACTION` strings.
    pub fn parse(control: &str, action: &str) -> Result<Self, String> {
        Ok(Self::new(Control::parse(control), action.parse()?))
    }
}

/// Operator-facing status sink.
///
/// Delivery problems are the notifier's to log; they never fail a toggle.
pub trait Notifier {
    fn notify(&self, message: &str);
}

impl<N: Notifier + ?Sized> Notifier for &N {
    fn notify(&self, message: &str) {
        (**self).notify(message)
    }
}

/// What `handle_event` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// Event came from a control we do not act on
    Ignored,
    ApEnabled,
    ApDisabled,
}

/// Button-driven AP toggle over a [`ConfigStore`].
pub struct HotplugToggle<S, N> {
    store: S,
    notifier: N,
    require_root: bool,
}

impl<S: ConfigStore, N: Notifier> HotplugToggle<S, N> {
    pub fn new(store: S, notifier: N) -> Self {
        Self { store, notifier, require_root: false }
    }

    /// Refuse to touch the store unless running as root.
    pub fn require_root(mut self, require: bool) -> Self {
        self.require_root = require;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// React to one button event.
    ///
    /// Failures are also written to the notice channel; the event is then
    /// dropped; pressing the button again is the retry.
    pub fn handle_event(&self, event: &ButtonEvent) -> ToggleResult<ToggleOutcome> {
        if !event.control.is_handled() {
            debug!(control = %event.control, "ignoring button");
            return Ok(ToggleOutcome::Ignored);
        }

        let disable = event.action == ButtonAction::Released;
        match self.apply(disable) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(control = %event.control, action = ?event.action, error = %e, "wifi toggle failed");
                self.notifier.notify(&format!("wifi toggle failed: {}", e));
                Err(e)
            }
        }
    }

    /// Force every station interface at index >= 2 to enabled.
    ///
    /// Returns how many station records were touched. With fewer than three
    /// records this does nothing.
    pub fn enforce_station_interfaces_enabled(&self) -> ToggleResult<usize> {
        let len = self.store.len()?;
        let mut enforced = 0;
        for index in FIRST_MODE_INDEX..len {
            // Only the mode matters; `disabled` is about to be overwritten
            if self.store.mode(index)? == Some(InterfaceMode::Sta) {
                self.store.set_disabled(index, false)?;
                enforced += 1;
            }
        }
        Ok(enforced)
    }

    fn apply(&self, disable: bool) -> ToggleResult<ToggleOutcome> {
        if self.require_root && !is_root() {
            return Err(ToggleError::PermissionDenied { operation: "wifi toggle" });
        }

        let stations = match self.stage(disable) {
            Ok(stations) => stations,
            Err(e) => {
                if let Err(revert) = self.store.revert() {
                    warn!(error = %revert, "failed to discard staged wireless writes");
                }
                return Err(e);
            }
        };

        self.store.commit().map_err(ToggleError::Commit)?;
        self.store.reload().map_err(ToggleError::Reload)?;

        let (outcome, message) = if disable {
            (ToggleOutcome::ApDisabled, MSG_AP_DISABLED)
        } else {
            (ToggleOutcome::ApEnabled, MSG_AP_ENABLED)
        };
        info!(stations, "{}", message);
        self.notifier.notify(message);
        Ok(outcome)
    }

    /// Stage the AP writes and station enforcement. Nothing is committed.
    fn stage(&self, disable: bool) -> ToggleResult<usize> {
        for index in AP_INDICES {
            if !self.store.set_disabled(index, disable)? {
                debug!(index, "no AP record at index");
            }
        }
        self.enforce_station_interfaces_enabled()
    }
}
